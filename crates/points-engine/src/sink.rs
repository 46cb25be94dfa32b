//! `PostgreSQL`-backed snapshot sink.

use points_core::source::{SnapshotSink, SourceError};
use points_db::SnapshotDb;
use points_types::HolderSnapshot;

/// Writes each cycle's snapshots to `holder_snapshots` in one transaction.
pub struct PgSnapshotSink {
    db: SnapshotDb,
    min_block: u64,
}

impl PgSnapshotSink {
    /// Create a sink that rejects snapshots computed before `min_block`.
    pub const fn new(db: SnapshotDb, min_block: u64) -> Self {
        Self { db, min_block }
    }
}

impl SnapshotSink for PgSnapshotSink {
    async fn upsert_snapshots(&self, snapshots: &[HolderSnapshot]) -> Result<usize, SourceError> {
        self.db
            .snapshots(self.min_block)
            .upsert_snapshots(snapshots)
            .await
            .map_err(|e| SourceError::Store(e.to_string()))
    }
}
