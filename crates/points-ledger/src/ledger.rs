//! The ownership ledger: current holdings rebuilt from transfer history.
//!
//! The [`OwnershipLedger`] is the in-memory result of folding the
//! collection's transfer log from an empty state. It is rebuilt from scratch
//! every run and never persisted.
//!
//! # Design
//!
//! - **Explicit fold**: [`replay`] sorts events by sequence and applies them
//!   one at a time. Restarting means starting from [`OwnershipLedger::new`].
//! - **Set semantics**: removing a unit an address does not hold is a no-op,
//!   so replaying already-applied history leaves the ledger unchanged.
//! - **Exclusive ownership**: a reverse index (unit to holder) is kept in
//!   step with the holdings, and a unit credited to a new holder is taken
//!   away from any stale holder first.
//! - **Retained holders**: an address stays in the ledger after its set
//!   becomes empty, so it still receives a (zero-unit) snapshot.

use std::collections::{BTreeMap, BTreeSet};

use points_types::{Address, TransferEvent, TransferKind, UnitId};

// ---------------------------------------------------------------------------
// Replay statistics
// ---------------------------------------------------------------------------

/// Counters collected while replaying a transfer log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    /// Events with no source address.
    pub mints: u64,
    /// Events with no destination address.
    pub burns: u64,
    /// Events with both addresses present.
    pub transfers: u64,
    /// Events with neither address present.
    pub void: u64,
    /// Removals of a unit the source address did not hold.
    pub stale_removals: u64,
    /// Credits that took a unit away from a different recorded holder.
    pub reassigned: u64,
}

impl ReplayStats {
    /// Total number of events applied.
    pub const fn total(&self) -> u64 {
        self.mints
            .saturating_add(self.burns)
            .saturating_add(self.transfers)
            .saturating_add(self.void)
    }
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// Current ownership of every unit, keyed by holder.
///
/// Two indexes are maintained together:
/// 1. holder to the set of units it holds;
/// 2. unit to its single current holder.
///
/// A unit appears in at most one holder's set, and in none while burned or
/// before its first mint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OwnershipLedger {
    holdings: BTreeMap<Address, BTreeSet<UnitId>>,
    owners: BTreeMap<UnitId, Address>,
}

impl OwnershipLedger {
    /// Create an empty ledger.
    pub const fn new() -> Self {
        Self {
            holdings: BTreeMap::new(),
            owners: BTreeMap::new(),
        }
    }

    /// Apply a single transfer event.
    ///
    /// The source (if any) loses the unit, then the destination (if any)
    /// gains it. Never fails: malformed events are applied as given.
    pub fn apply(&mut self, event: &TransferEvent, stats: &mut ReplayStats) {
        match event.kind() {
            TransferKind::Mint => stats.mints = stats.mints.saturating_add(1),
            TransferKind::Burn => stats.burns = stats.burns.saturating_add(1),
            TransferKind::Transfer => stats.transfers = stats.transfers.saturating_add(1),
            TransferKind::Void => stats.void = stats.void.saturating_add(1),
        }

        let unit = event.unit_id;

        if let Some(from) = &event.from {
            let held = self.holdings.entry(from.clone()).or_default();
            if held.remove(&unit) {
                if self.owners.get(&unit) == Some(from) {
                    self.owners.remove(&unit);
                }
            } else {
                stats.stale_removals = stats.stale_removals.saturating_add(1);
                tracing::trace!(
                    %unit,
                    from = %from,
                    sequence = %event.sequence,
                    "removal of a unit the source does not hold"
                );
            }
        }

        if let Some(to) = &event.to {
            if let Some(previous) = self.owners.insert(unit, to.clone()) {
                if previous != *to {
                    if let Some(stale) = self.holdings.get_mut(&previous) {
                        stale.remove(&unit);
                    }
                    stats.reassigned = stats.reassigned.saturating_add(1);
                    tracing::debug!(
                        %unit,
                        previous = %previous,
                        to = %to,
                        sequence = %event.sequence,
                        "unit credited while recorded under another holder"
                    );
                }
            }
            self.holdings.entry(to.clone()).or_default().insert(unit);
        }
    }

    /// Units held by `address`, if the address has ever appeared.
    pub fn units_of(&self, address: &Address) -> Option<&BTreeSet<UnitId>> {
        self.holdings.get(address)
    }

    /// The current holder of `unit`, if it is in circulation.
    pub fn owner_of(&self, unit: UnitId) -> Option<&Address> {
        self.owners.get(&unit)
    }

    /// Iterate over every known holder and its units, ordered by address.
    ///
    /// Holders whose set became empty are included.
    pub fn holders(&self) -> impl Iterator<Item = (&Address, &BTreeSet<UnitId>)> {
        self.holdings.iter()
    }

    /// Addresses present in the ledger, ordered.
    pub fn addresses(&self) -> impl Iterator<Item = &Address> {
        self.holdings.keys()
    }

    /// Number of addresses present (including empty holders).
    pub fn holder_count(&self) -> usize {
        self.holdings.len()
    }

    /// Number of units currently in circulation.
    pub fn unit_count(&self) -> usize {
        self.owners.len()
    }

    /// Whether no address has ever appeared.
    pub fn is_empty(&self) -> bool {
        self.holdings.is_empty()
    }

    /// Iterate over the unit-to-holder index.
    pub(crate) fn owner_index(&self) -> impl Iterator<Item = (&UnitId, &Address)> {
        self.owners.iter()
    }
}

// ---------------------------------------------------------------------------
// Replay
// ---------------------------------------------------------------------------

/// Rebuild current ownership from a transfer log.
///
/// Events are applied in ascending [`sequence`] order; events sharing a
/// sequence keep their supplied order.
///
/// [`sequence`]: TransferEvent::sequence
pub fn replay(events: &[TransferEvent]) -> OwnershipLedger {
    replay_with_stats(events).0
}

/// Rebuild current ownership and report what the replay encountered.
pub fn replay_with_stats(events: &[TransferEvent]) -> (OwnershipLedger, ReplayStats) {
    let mut ordered: Vec<&TransferEvent> = events.iter().collect();
    // Stable sort: ties keep their supplied order.
    ordered.sort_by_key(|event| event.sequence);

    let mut ledger = OwnershipLedger::new();
    let mut stats = ReplayStats::default();
    for event in ordered {
        ledger.apply(event, &mut stats);
    }

    tracing::debug!(
        events = stats.total(),
        holders = ledger.holder_count(),
        units = ledger.unit_count(),
        stale_removals = stats.stale_removals,
        reassigned = stats.reassigned,
        "Replayed transfer log"
    );

    (ledger, stats)
}
