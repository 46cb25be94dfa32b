//! Configuration, snapshot building, and cycle orchestration for the holder
//! points tracker.
//!
//! Each cycle rebuilds current ownership from the full transfer history,
//! scores every address that has ever held a unit, and persists one
//! snapshot per address. Cycles run once at startup and then hourly.
//!
//! # Modules
//!
//! - [`config`] -- Configuration loading from `points-config.yaml` into
//!   strongly-typed structs, with environment overrides and validation.
//! - [`source`] -- [`EventSource`], [`BalanceSource`], and [`SnapshotSink`]
//!   collaborator traits.
//! - [`snapshot`] -- The [`SnapshotBuilder`] with bounded-concurrency
//!   balance lookups and per-address failure isolation.
//! - [`run`] -- [`run_once`], a single cycle from chain head to sink.
//! - [`scheduler`] -- [`run_scheduled`], the periodic non-overlapping loop.
//!
//! [`EventSource`]: source::EventSource
//! [`BalanceSource`]: source::BalanceSource
//! [`SnapshotSink`]: source::SnapshotSink
//! [`SnapshotBuilder`]: snapshot::SnapshotBuilder
//! [`run_once`]: run::run_once
//! [`run_scheduled`]: scheduler::run_scheduled

pub mod config;
pub mod run;
pub mod scheduler;
pub mod snapshot;
pub mod source;
