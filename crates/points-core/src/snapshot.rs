//! Snapshot building: one scored record per ledger address.
//!
//! The builder reads each address's fungible balance through a
//! [`BalanceSource`], at most `concurrency` lookups in flight, and scores the
//! address's units together with that balance. Lookups complete in any
//! order; results are merged by address, so the output is ordered by
//! address regardless of completion order.
//!
//! A failed lookup excludes only that address. It is reported as an
//! [`AddressFailure`] and logged; the remaining addresses proceed. Every
//! balance the source returns is scored: a balance term too large for a
//! `Decimal` saturates and is logged rather than dropped.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use tracing::{info, warn};

use points_ledger::OwnershipLedger;
use points_scoring::{FallbackCounts, RarityTable, ScalingFactors, ScoreBreakdown, score_breakdown};
use points_types::{Address, BalanceQuote, HolderSnapshot, UnitId};

use crate::source::{BalanceSource, SourceError};

/// An address excluded from a run because its balance lookup failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressFailure {
    /// The excluded address.
    pub address: Address,
    /// The lookup error.
    pub error: SourceError,
}

/// Snapshots and failures from one build.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildOutcome {
    /// One snapshot per successfully scored address, ordered by address.
    pub snapshots: Vec<HolderSnapshot>,
    /// Addresses excluded from the build, ordered by address.
    pub failures: Vec<AddressFailure>,
    /// Resolution branch counts across every scored unit.
    pub counts: FallbackCounts,
    /// Distinct units that fell back to the default multiplier.
    pub fallback_units: BTreeSet<UnitId>,
    /// Snapshots whose balance term was clamped to the largest `Decimal`.
    pub saturated: u64,
}

impl BuildOutcome {
    /// Whether every address failed its balance lookup.
    pub fn all_lookups_failed(&self) -> bool {
        self.snapshots.is_empty() && !self.failures.is_empty()
    }
}

/// Builds holder snapshots from a replayed ledger.
#[derive(Debug, Clone)]
pub struct SnapshotBuilder {
    table: Arc<RarityTable>,
    factors: ScalingFactors,
    concurrency: usize,
}

impl SnapshotBuilder {
    /// Create a builder. A `concurrency` of zero is treated as one.
    pub fn new(table: Arc<RarityTable>, factors: ScalingFactors, concurrency: usize) -> Self {
        Self {
            table,
            factors,
            concurrency: concurrency.max(1),
        }
    }

    /// Lookups in flight at once.
    pub const fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Build one snapshot per ledger address.
    ///
    /// Every snapshot carries `as_of_block` and `as_of_time`, the chain
    /// position and wall-clock time at which the run started. Addresses whose
    /// units set is empty still get a snapshot, scored from balance alone.
    pub async fn build<B: BalanceSource>(
        &self,
        ledger: &OwnershipLedger,
        balances: &B,
        as_of_block: u64,
        as_of_time: DateTime<Utc>,
    ) -> BuildOutcome {
        let quotes = self.fetch_balances(ledger, balances, as_of_block).await;

        let mut outcome = BuildOutcome::default();
        for (address, units) in ledger.holders() {
            let quote = match quotes.get(address) {
                Some(Ok(quote)) => *quote,
                Some(Err(e)) => {
                    outcome.failures.push(failure(address, e.clone()));
                    continue;
                }
                None => {
                    let error = SourceError::Malformed("no balance returned".to_owned());
                    outcome.failures.push(failure(address, error));
                    continue;
                }
            };

            let (snapshot, breakdown) =
                self.score_holder(address, units, quote, as_of_block, as_of_time);
            if breakdown.saturated {
                warn!(
                    address = %address,
                    balance = %quote.raw,
                    "Balance term exceeds decimal range; points clamped"
                );
                outcome.saturated = outcome.saturated.saturating_add(1);
            }
            outcome.counts.merge(&breakdown.counts);
            outcome.fallback_units.extend(breakdown.fallback_units);
            outcome.snapshots.push(snapshot);
        }

        outcome
    }

    async fn fetch_balances<B: BalanceSource>(
        &self,
        ledger: &OwnershipLedger,
        balances: &B,
        as_of_block: u64,
    ) -> BTreeMap<Address, Result<BalanceQuote, SourceError>> {
        let total = ledger.holder_count();
        let batch_total = total.div_ceil(self.concurrency);

        let mut lookups = stream::iter(ledger.addresses().map(|address| async move {
            let result = balances.balance_of(address, as_of_block).await;
            (address.clone(), result)
        }))
        .buffer_unordered(self.concurrency);

        let mut quotes = BTreeMap::new();
        while let Some((address, result)) = lookups.next().await {
            quotes.insert(address, result);
            let completed = quotes.len();
            if completed.checked_rem(self.concurrency) == Some(0) || completed == total {
                info!(
                    batch = completed.div_ceil(self.concurrency),
                    batch_total,
                    completed,
                    total,
                    "Processed balance batch"
                );
            }
        }
        quotes
    }

    fn score_holder(
        &self,
        address: &Address,
        units: &BTreeSet<UnitId>,
        quote: BalanceQuote,
        as_of_block: u64,
        as_of_time: DateTime<Utc>,
    ) -> (HolderSnapshot, ScoreBreakdown) {
        let unit_ids: Vec<UnitId> = units.iter().copied().collect();
        let breakdown = score_breakdown(&self.factors, &self.table, &unit_ids, quote.raw);

        let snapshot = HolderSnapshot {
            address: address.clone(),
            unit_ids,
            fungible_balance: quote.raw,
            points: breakdown.points,
            as_of_block,
            as_of_time,
        };
        (snapshot, breakdown)
    }
}

fn failure(address: &Address, error: SourceError) -> AddressFailure {
    warn!(address = %address, error = %error, "Excluding address from snapshot");
    AddressFailure {
        address: address.clone(),
        error,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use alloy_primitives::U256;
    use points_ledger::replay;
    use points_types::{RarityTier, UnitRecord};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    use super::*;
    use crate::source::fakes::{FakeBalances, addr, event};

    fn table() -> Arc<RarityTable> {
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
        Arc::new(table)
    }

    fn builder(concurrency: usize) -> SnapshotBuilder {
        SnapshotBuilder::new(
            table(),
            ScalingFactors::new(dec!(10), dec!(1000)).unwrap(),
            concurrency,
        )
    }

    fn scenario() -> OwnershipLedger {
        replay(&[
            event(None, Some(1), 1, 1, 0),
            event(None, Some(1), 2, 1, 1),
            event(Some(1), Some(2), 1, 2, 0),
            event(Some(2), Some(3), 1, 3, 0),
            event(None, Some(2), 3, 3, 1),
        ])
    }

    #[tokio::test]
    async fn builds_one_snapshot_per_address() {
        let ledger = scenario();
        let balances = FakeBalances {
            head: 10,
            ..FakeBalances::default()
        };
        let now = Utc::now();

        let outcome = builder(2).build(&ledger, &balances, 10, now).await;

        assert!(outcome.failures.is_empty());
        assert_eq!(outcome.snapshots.len(), 3);
        let by_addr: BTreeMap<_, _> = outcome
            .snapshots
            .iter()
            .map(|s| (s.address.clone(), s))
            .collect();
        assert_eq!(by_addr[&addr(1)].unit_ids, vec![UnitId(2)]);
        assert_eq!(by_addr[&addr(2)].unit_ids, vec![UnitId(3)]);
        assert_eq!(by_addr[&addr(3)].unit_ids, vec![UnitId(1)]);
        assert_eq!(by_addr[&addr(1)].points.round_dp(4), dec!(0.1667));
        assert_eq!(by_addr[&addr(2)].points, dec!(0.2));
        assert_eq!(by_addr[&addr(3)].points.round_dp(4), dec!(0.1333));
        assert!(outcome.snapshots.iter().all(|s| s.as_of_block == 10 && s.as_of_time == now));
        assert_eq!(outcome.counts.tiered, 3);
    }

    #[tokio::test]
    async fn empty_holder_scores_balance_only() {
        let ledger = replay(&[
            event(None, Some(1), 1, 1, 0),
            event(Some(1), None, 1, 2, 0),
        ]);
        let balances = FakeBalances {
            balances: [(addr(1), U256::from(5000_u32))].into_iter().collect(),
            ..FakeBalances::default()
        };

        let outcome = builder(4).build(&ledger, &balances, 2, Utc::now()).await;

        assert_eq!(outcome.snapshots.len(), 1);
        let snapshot = &outcome.snapshots[0];
        assert!(snapshot.unit_ids.is_empty());
        assert_eq!(snapshot.fungible_balance, U256::from(5000_u32));
        assert_eq!(snapshot.points, dec!(5));
    }

    #[tokio::test]
    async fn failed_lookup_excludes_only_that_address() {
        let ledger = scenario();
        let balances = FakeBalances {
            failing: [addr(2)].into_iter().collect(),
            ..FakeBalances::default()
        };

        let outcome = builder(3).build(&ledger, &balances, 5, Utc::now()).await;

        assert_eq!(outcome.snapshots.len(), 2);
        assert!(outcome.snapshots.iter().all(|s| s.address != addr(2)));
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].address, addr(2));
        assert!(matches!(outcome.failures[0].error, SourceError::Unavailable(_)));
        assert!(!outcome.all_lookups_failed());
    }

    #[tokio::test]
    async fn all_lookups_failing_is_detected() {
        let ledger = scenario();
        let balances = FakeBalances {
            fail_all: true,
            ..FakeBalances::default()
        };

        let outcome = builder(2).build(&ledger, &balances, 5, Utc::now()).await;

        assert!(outcome.snapshots.is_empty());
        assert_eq!(outcome.failures.len(), 3);
        assert!(outcome.all_lookups_failed());
    }

    #[tokio::test]
    async fn balances_wider_than_a_decimal_are_scored() {
        let ledger = replay(&[
            event(None, Some(1), 1, 1, 0),
            event(None, Some(2), 2, 1, 1),
        ]);
        let wide = U256::from(2_u8).pow(U256::from(100_u8));
        let balances = FakeBalances {
            balances: [(addr(1), wide), (addr(2), U256::MAX)].into_iter().collect(),
            ..FakeBalances::default()
        };

        let outcome = builder(2).build(&ledger, &balances, 1, Utc::now()).await;

        assert!(outcome.failures.is_empty());
        assert_eq!(outcome.snapshots.len(), 2);
        let first = &outcome.snapshots[0];
        assert_eq!(first.fungible_balance, wide);
        assert!(first.points > dec!(1000000000000000000000000000));
        let second = &outcome.snapshots[1];
        assert_eq!(second.fungible_balance, U256::MAX);
        assert_eq!(second.points, Decimal::MAX);
        assert_eq!(outcome.saturated, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn results_are_ordered_by_address_under_concurrency() {
        let events: Vec<_> = (1..=40_u8)
            .map(|i| event(None, Some(i), u64::from(i), 1, u64::from(i)))
            .collect();
        let ledger = replay(&events);
        let balances = FakeBalances {
            delay: Some(Duration::from_millis(5)),
            ..FakeBalances::default()
        };

        let outcome = builder(7).build(&ledger, &balances, 1, Utc::now()).await;

        assert_eq!(balances.calls.load(Ordering::SeqCst), 40);
        let addresses: Vec<_> = outcome.snapshots.iter().map(|s| s.address.clone()).collect();
        let mut sorted = addresses.clone();
        sorted.sort();
        assert_eq!(addresses, sorted);
        // Units 4..=40 have no rank record and fall back.
        assert_eq!(outcome.fallback_units.len(), 37);
        assert_eq!(outcome.counts.missing_record, 37);
        assert!(outcome.snapshots.iter().all(|s| s.points >= Decimal::ZERO));
    }
}
