//! Shared type definitions for the holder points tracker.
//!
//! This crate is the single source of truth for the records that flow
//! between the replay engine, the scoring engine, the snapshot builder,
//! and the persistence layer. Snapshot and rarity types flow downstream to
//! `TypeScript` via `ts-rs` for the leaderboard frontend.
//!
//! # Modules
//!
//! - [`ids`] -- Validated addresses, unit ids, and event ordinals
//! - [`structs`] -- Transfer events, rarity configuration, balances, snapshots

pub mod ids;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use ids::{Address, AddressParseError, EventSequence, UnitId};
pub use structs::{
    BalanceQuote, HolderSnapshot, OverrideEntry, RarityTier, TransferEvent, TransferKind,
    UnitRecord,
};

#[cfg(test)]
mod tests {
    //! Integration tests for type exports and `TypeScript` binding generation.

    #[test]
    fn export_bindings() {
        // Calling export_all writes the bindings to the `bindings/`
        // directory relative to the crate root.
        use ts_rs::TS;

        let _ = crate::ids::Address::export_all();
        let _ = crate::ids::UnitId::export_all();
        let _ = crate::structs::RarityTier::export_all();
        let _ = crate::structs::OverrideEntry::export_all();
        let _ = crate::structs::UnitRecord::export_all();
        let _ = crate::structs::HolderSnapshot::export_all();
    }
}
