//! Collaborator traits for the snapshot cycle.
//!
//! The cycle reads transfer history from an [`EventSource`], balances and
//! the chain head from a [`BalanceSource`], and writes results to a
//! [`SnapshotSink`]. The binary wires these to the Ethereum JSON-RPC client
//! and `PostgreSQL`; tests use in-memory implementations.

use std::future::Future;

use points_types::{Address, BalanceQuote, HolderSnapshot, TransferEvent};

/// Errors reported by a collaborator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    /// The remote endpoint could not be reached or returned a transport error.
    #[error("source unavailable: {0}")]
    Unavailable(String),

    /// The remote endpoint answered with an error.
    #[error("source rejected request: {0}")]
    Rejected(String),

    /// A response could not be decoded.
    #[error("malformed response: {0}")]
    Malformed(String),

    /// A persistence write failed.
    #[error("store error: {0}")]
    Store(String),
}

/// Supplies the collection's transfer history.
pub trait EventSource: Sync {
    /// Every transfer event from the collection's deployment up to and
    /// including `to_block`, in any order.
    fn fetch_events(
        &self,
        to_block: u64,
    ) -> impl Future<Output = Result<Vec<TransferEvent>, SourceError>> + Send;
}

/// Supplies fungible-token balances and the current chain head.
pub trait BalanceSource: Sync {
    /// The latest block number.
    fn chain_head(&self) -> impl Future<Output = Result<u64, SourceError>> + Send;

    /// The raw token balance of `address` as of `block`.
    fn balance_of(
        &self,
        address: &Address,
        block: u64,
    ) -> impl Future<Output = Result<BalanceQuote, SourceError>> + Send;
}

/// Receives the snapshots produced by one cycle.
pub trait SnapshotSink: Sync {
    /// Insert or replace one snapshot per address, atomically.
    ///
    /// Returns the number of rows written.
    fn upsert_snapshots(
        &self,
        snapshots: &[HolderSnapshot],
    ) -> impl Future<Output = Result<usize, SourceError>> + Send;
}
