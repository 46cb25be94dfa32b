//! `PostgreSQL` persistence for holder points snapshots.
//!
//! ```text
//! Snapshot cycle
//!     |
//!     +-- upsert_snapshots --> holder_snapshots (one row per address)
//! ```
//!
//! # Modules
//!
//! - [`postgres`] -- Opening the pool and applying migrations
//! - [`snapshot_store`] -- Batched snapshot upserts and queries
//! - [`error`] -- Shared error types

pub mod error;
pub mod postgres;
pub mod snapshot_store;

// Re-export primary types for convenience.
pub use error::DbError;
pub use postgres::{SnapshotDb, open};
pub use snapshot_store::{SnapshotRow, SnapshotStore};
