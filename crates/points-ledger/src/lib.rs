//! Ownership ledger replay for the holder points tracker.
//!
//! Current ownership of every collectible unit is reconstructed by folding
//! the collection's append-only transfer log into an index-backed set
//! structure. The log may arrive unordered and may repeat history; replay
//! sorts it by chain position and applies set semantics, so both are
//! tolerated.
//!
//! # Architecture
//!
//! The ledger crate provides two modules:
//!
//! - [`ledger`] -- The [`OwnershipLedger`] and the [`replay`] fold.
//! - [`verify`] -- Exclusive-ownership verification.
//!
//! # Event semantics
//!
//! | Kind | From | To | Effect |
//! |------|------|----|--------|
//! | Mint | none | holder | holder gains unit |
//! | Transfer | holder | holder | source loses unit, destination gains it |
//! | Burn | holder | none | source loses unit |
//! | Void | none | none | no change |
//!
//! # Usage
//!
//! ```
//! use points_ledger::{replay, verify_exclusive_ownership, OwnershipResult};
//! use points_types::{Address, EventSequence, TransferEvent, UnitId};
//!
//! let alice = Address::parse("0x00000000000000000000000000000000000000a1").ok();
//! let bob = Address::parse("0x00000000000000000000000000000000000000b2").ok();
//!
//! let events = vec![
//!     TransferEvent { from: None, to: alice.clone(), unit_id: UnitId(1), sequence: EventSequence::new(1, 0) },
//!     TransferEvent { from: alice.clone(), to: bob.clone(), unit_id: UnitId(1), sequence: EventSequence::new(2, 0) },
//! ];
//!
//! let ledger = replay(&events);
//! assert_eq!(ledger.owner_of(UnitId(1)), bob.as_ref());
//! assert_eq!(verify_exclusive_ownership(&ledger), OwnershipResult::Exclusive);
//! ```

pub mod ledger;
pub mod verify;

// Re-export primary types at crate root.
pub use ledger::{OwnershipLedger, ReplayStats, replay, replay_with_stats};
pub use verify::{OwnershipResult, verify_exclusive_ownership};

use std::collections::BTreeMap;

use points_types::{Address, UnitId};

/// An exclusive-ownership violation detected after replay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnershipAnomaly {
    /// Units found in more than one holder's set, with every such holder.
    pub conflicts: BTreeMap<UnitId, Vec<Address>>,
    /// Units whose recorded owner disagrees with the holder sets.
    pub index_mismatches: Vec<UnitId>,
    /// Human-readable description of the anomaly.
    pub message: String,
}

impl core::fmt::Display for OwnershipAnomaly {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.message)
    }
}
