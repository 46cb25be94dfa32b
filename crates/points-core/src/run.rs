//! A single snapshot cycle, from chain head to persisted snapshots.
//!
//! [`run_once`] performs the whole cycle:
//!
//! 1. Read the chain head; it becomes the cycle's `as_of_block`.
//! 2. Fetch the full transfer history up to that block.
//! 3. Replay it into an [`OwnershipLedger`] and verify exclusive ownership.
//! 4. Build snapshots, isolating per-address balance failures.
//! 5. Upsert every snapshot through the sink in one write.
//!
//! Any [`RunError`] aborts the cycle before the sink is called, so a failed
//! cycle never leaves a partial snapshot set behind.
//!
//! [`OwnershipLedger`]: points_ledger::OwnershipLedger

use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{error, info, warn};

use points_ledger::{OwnershipResult, ReplayStats, replay_with_stats, verify_exclusive_ownership};
use points_scoring::FallbackCounts;
use points_types::UnitId;

use crate::snapshot::{AddressFailure, SnapshotBuilder};
use crate::source::{BalanceSource, EventSource, SnapshotSink, SourceError};

/// Maximum number of fallback unit ids included in one log line.
const FALLBACK_LOG_LIMIT: usize = 50;

/// Errors that abort a whole cycle.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// The chain head could not be read.
    #[error("failed to read chain head: {0}")]
    ChainHead(SourceError),

    /// The transfer history could not be fetched.
    #[error("failed to fetch transfer events: {0}")]
    EventSource(SourceError),

    /// Every balance lookup failed.
    #[error("balance source unavailable: all {failed} lookups failed")]
    BalanceSourceUnavailable {
        /// Number of failed lookups.
        failed: usize,
    },

    /// Replay produced a ledger that violates exclusive ownership.
    #[error("{0}")]
    OwnershipAnomaly(points_ledger::OwnershipAnomaly),

    /// The snapshot write failed; nothing was persisted.
    #[error("failed to write snapshots: {0}")]
    Sink(SourceError),
}

/// Summary of a completed cycle.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Block every snapshot in the cycle was computed at.
    pub as_of_block: u64,
    /// Transfer events replayed.
    pub events: usize,
    /// Addresses in the replayed ledger.
    pub holders: usize,
    /// Snapshots written by the sink.
    pub snapshots_written: usize,
    /// Addresses excluded from the cycle.
    pub failures: Vec<AddressFailure>,
    /// Resolution branch counts across all scored units.
    pub fallbacks: FallbackCounts,
    /// Snapshots whose points were clamped to the largest `Decimal`.
    pub saturated: u64,
    /// Replay counters.
    pub replay_stats: ReplayStats,
    /// Wall-clock duration of the cycle.
    pub elapsed: Duration,
}

/// Run one full snapshot cycle.
///
/// # Errors
///
/// Returns [`RunError`] if the chain head, the event history, every balance
/// lookup, the ownership check, or the sink write fails. Individual address
/// failures do not abort the cycle; they are reported in
/// [`RunReport::failures`].
pub async fn run_once<E, B, S>(
    events: &E,
    balances: &B,
    sink: &S,
    builder: &SnapshotBuilder,
) -> Result<RunReport, RunError>
where
    E: EventSource,
    B: BalanceSource,
    S: SnapshotSink,
{
    let started = Instant::now();
    let as_of_time = Utc::now();

    let as_of_block = balances.chain_head().await.map_err(RunError::ChainHead)?;
    info!(as_of_block, "Starting snapshot cycle");

    let history = events
        .fetch_events(as_of_block)
        .await
        .map_err(RunError::EventSource)?;
    info!(events = history.len(), "Fetched transfer events");

    let (ledger, replay_stats) = replay_with_stats(&history);
    if let OwnershipResult::Anomaly(anomaly) = verify_exclusive_ownership(&ledger) {
        error!(
            conflicts = anomaly.conflicts.len(),
            index_mismatches = anomaly.index_mismatches.len(),
            "{}",
            anomaly.message
        );
        return Err(RunError::OwnershipAnomaly(anomaly));
    }
    info!(holders = ledger.holder_count(), units = ledger.unit_count(), "Identified holders");

    let outcome = builder
        .build(&ledger, balances, as_of_block, as_of_time)
        .await;

    if outcome.all_lookups_failed() {
        return Err(RunError::BalanceSourceUnavailable {
            failed: outcome.failures.len(),
        });
    }

    if !outcome.fallback_units.is_empty() {
        let sample: Vec<u64> = outcome
            .fallback_units
            .iter()
            .take(FALLBACK_LOG_LIMIT)
            .copied()
            .map(UnitId::into_inner)
            .collect();
        warn!(
            missing_record = outcome.counts.missing_record,
            rank_outside_tiers = outcome.counts.rank_outside_tiers,
            distinct_units = outcome.fallback_units.len(),
            units = ?sample,
            "Units scored with the default multiplier"
        );
    }

    let snapshots_written = if outcome.snapshots.is_empty() {
        0
    } else {
        sink.upsert_snapshots(&outcome.snapshots)
            .await
            .map_err(RunError::Sink)?
    };

    let report = RunReport {
        as_of_block,
        events: history.len(),
        holders: ledger.holder_count(),
        snapshots_written,
        failures: outcome.failures,
        fallbacks: outcome.counts,
        saturated: outcome.saturated,
        replay_stats,
        elapsed: started.elapsed(),
    };

    info!(
        as_of_block,
        holders = report.holders,
        snapshots_written,
        failures = report.failures.len(),
        saturated = report.saturated,
        reassigned = report.replay_stats.reassigned,
        elapsed_ms = u64::try_from(report.elapsed.as_millis()).unwrap_or(u64::MAX),
        "Snapshot cycle completed"
    );

    Ok(report)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use points_scoring::{RarityTable, ScalingFactors};
    use points_types::{RarityTier, UnitId, UnitRecord};
    use rust_decimal_macros::dec;

    use super::*;
    use crate::source::fakes::{FakeBalances, FakeEvents, FakeSink, addr, event};

    fn builder() -> SnapshotBuilder {
        let table = RarityTable::new(
            vec![RarityTier {
                name: "All".to_owned(),
                start_rank: 1,
                end_rank: 3,
                min_multiplier: dec!(1.0),
                max_multiplier: dec!(2.0),
            }],
            vec![],
            (1..=3)
                .map(|i| UnitRecord {
                    unit_id: UnitId(i),
                    rank: u32::try_from(i).unwrap(),
                    score: None,
                })
                .collect(),
        )
        .unwrap();
        SnapshotBuilder::new(
            Arc::new(table),
            ScalingFactors::new(dec!(10), dec!(1000)).unwrap(),
            100,
        )
    }

    fn scenario_events() -> FakeEvents {
        FakeEvents {
            // Delivered out of order; replay sorts by sequence.
            events: vec![
                event(Some(2), Some(3), 1, 3, 0),
                event(None, Some(1), 1, 1, 0),
                event(None, Some(2), 3, 3, 1),
                event(Some(1), Some(2), 1, 2, 0),
                event(None, Some(1), 2, 1, 1),
            ],
            fail: false,
        }
    }

    fn head(block: u64) -> FakeBalances {
        FakeBalances {
            head: block,
            ..FakeBalances::default()
        }
    }

    #[tokio::test]
    async fn end_to_end_cycle_writes_expected_snapshots() {
        let sink = FakeSink::default();

        let report = run_once(&scenario_events(), &head(3), &sink, &builder())
            .await
            .unwrap();

        assert_eq!(report.as_of_block, 3);
        assert_eq!(report.events, 5);
        assert_eq!(report.holders, 3);
        assert_eq!(report.snapshots_written, 3);
        assert!(report.failures.is_empty());
        assert_eq!(report.replay_stats.mints, 3);
        assert_eq!(report.replay_stats.transfers, 2);

        let batches = sink.batches();
        assert_eq!(batches.len(), 1);
        let points: BTreeMap<_, _> = batches[0]
            .iter()
            .map(|s| (s.address.clone(), s.points.round_dp(4)))
            .collect();
        assert_eq!(points[&addr(1)], dec!(0.1667));
        assert_eq!(points[&addr(2)], dec!(0.2000));
        assert_eq!(points[&addr(3)], dec!(0.1333));
        assert!(batches[0].iter().all(|s| s.as_of_block == 3));
    }

    #[tokio::test]
    async fn events_after_head_are_not_replayed() {
        let sink = FakeSink::default();

        let report = run_once(&scenario_events(), &head(2), &sink, &builder())
            .await
            .unwrap();

        assert_eq!(report.events, 3);
        assert_eq!(report.holders, 2);
    }

    #[tokio::test]
    async fn event_source_failure_writes_nothing() {
        let sink = FakeSink::default();
        let events = FakeEvents {
            events: vec![],
            fail: true,
        };

        let result = run_once(&events, &head(3), &sink, &builder()).await;

        assert!(matches!(result, Err(RunError::EventSource(_))));
        assert!(sink.batches().is_empty());
    }

    #[tokio::test]
    async fn all_balances_failing_is_systemic() {
        let sink = FakeSink::default();
        let balances = FakeBalances {
            head: 3,
            fail_all: true,
            ..FakeBalances::default()
        };

        let result = run_once(&scenario_events(), &balances, &sink, &builder()).await;

        assert!(matches!(
            result,
            Err(RunError::BalanceSourceUnavailable { failed: 3 })
        ));
        assert!(sink.batches().is_empty());
    }

    #[tokio::test]
    async fn one_balance_failing_is_isolated() {
        let sink = FakeSink::default();
        let balances = FakeBalances {
            head: 3,
            failing: [addr(3)].into_iter().collect(),
            ..FakeBalances::default()
        };

        let report = run_once(&scenario_events(), &balances, &sink, &builder())
            .await
            .unwrap();

        assert_eq!(report.snapshots_written, 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].address, addr(3));
    }

    #[tokio::test]
    async fn sink_failure_is_systemic() {
        let sink = FakeSink {
            fail: true,
            ..FakeSink::default()
        };

        let result = run_once(&scenario_events(), &head(3), &sink, &builder()).await;

        assert!(matches!(result, Err(RunError::Sink(_))));
    }

    #[tokio::test]
    async fn empty_history_writes_nothing() {
        let sink = FakeSink::default();
        let events = FakeEvents {
            events: vec![],
            fail: false,
        };

        let report = run_once(&events, &head(3), &sink, &builder()).await.unwrap();

        assert_eq!(report.holders, 0);
        assert_eq!(report.snapshots_written, 0);
        assert!(sink.batches().is_empty());
    }
}
