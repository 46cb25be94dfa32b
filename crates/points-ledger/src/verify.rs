//! Exclusive-ownership verification for a replayed ledger.
//!
//! Replay keeps the holder index and the unit index in step, so this check
//! passes by construction. It runs once per replay, before any snapshot is
//! built, so that a broken invariant fails the run instead of persisting
//! scores for units counted twice.
//!
//! For every unit U the check is:
//!
//! ```text
//! |{ holder H : U in holdings(H) }| <= 1
//! holdings(H) contains U  <=>  owner(U) == H
//! ```
//!
//! A violation produces an [`OwnershipAnomaly`].

use std::collections::BTreeMap;

use points_types::{Address, UnitId};

use crate::OwnershipAnomaly;
use crate::ledger::OwnershipLedger;

/// The result of an exclusive-ownership check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OwnershipResult {
    /// Every unit has at most one holder and both indexes agree.
    Exclusive,
    /// One or more units violate the invariant.
    Anomaly(OwnershipAnomaly),
}

/// Verify that no unit is held by two addresses and that the unit index
/// matches the holder sets.
pub fn verify_exclusive_ownership(ledger: &OwnershipLedger) -> OwnershipResult {
    let mut seen: BTreeMap<UnitId, Address> = BTreeMap::new();
    let mut conflicts: BTreeMap<UnitId, Vec<Address>> = BTreeMap::new();

    for (holder, units) in ledger.holders() {
        for unit in units {
            if let Some(first) = seen.insert(*unit, holder.clone()) {
                let entry = conflicts.entry(*unit).or_insert_with(|| vec![first]);
                entry.push(holder.clone());
            }
        }
    }

    // Reverse index must agree with the holder sets in both directions.
    let mut index_mismatches: Vec<UnitId> = Vec::new();
    for (unit, owner) in ledger.owner_index() {
        if seen.get(unit) != Some(owner) {
            index_mismatches.push(*unit);
        }
    }
    for unit in seen.keys() {
        if ledger.owner_of(*unit).is_none() {
            index_mismatches.push(*unit);
        }
    }
    index_mismatches.sort_unstable();
    index_mismatches.dedup();

    if conflicts.is_empty() && index_mismatches.is_empty() {
        OwnershipResult::Exclusive
    } else {
        let message = format!(
            "OWNERSHIP_ANOMALY: {} unit(s) held by multiple addresses, {} unit(s) with mismatched index",
            conflicts.len(),
            index_mismatches.len(),
        );
        OwnershipResult::Anomaly(OwnershipAnomaly {
            conflicts,
            index_mismatches,
            message,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use points_types::{EventSequence, TransferEvent};

    use super::*;
    use crate::ledger::replay;

    fn addr(last: u8) -> Address {
        Address::parse(&format!("0x{last:040x}")).unwrap()
    }

    #[test]
    fn empty_ledger_is_exclusive() {
        assert_eq!(
            verify_exclusive_ownership(&OwnershipLedger::new()),
            OwnershipResult::Exclusive
        );
    }

    #[test]
    fn replayed_ledger_is_exclusive() {
        let events: Vec<TransferEvent> = (0..20_u64)
            .map(|i| TransferEvent {
                from: (i >= 10).then(|| addr(1)),
                to: Some(addr(u8::try_from(i % 3).unwrap().saturating_add(1))),
                unit_id: UnitId(i % 10),
                sequence: EventSequence::new(i, 0),
            })
            .collect();
        let ledger = replay(&events);
        assert_eq!(verify_exclusive_ownership(&ledger), OwnershipResult::Exclusive);
    }
}
