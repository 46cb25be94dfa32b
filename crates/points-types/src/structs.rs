//! Core records: transfer events, rarity configuration, and holder snapshots.

use alloy_primitives::U256;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::ids::{Address, EventSequence, UnitId};

// ---------------------------------------------------------------------------
// Transfer events
// ---------------------------------------------------------------------------

/// Classification of a transfer by which side carries the null sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TransferKind {
    /// No source address: the unit comes into existence.
    Mint,
    /// No destination address: the unit leaves circulation.
    Burn,
    /// Both sides present.
    Transfer,
    /// Neither side present. Carries no ownership change.
    Void,
}

/// One ownership change of a single unit, as emitted by the collection.
///
/// `None` on either side encodes the "no address" sentinel (the zero
/// address on-chain).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferEvent {
    /// Previous holder, or `None` for a mint.
    pub from: Option<Address>,
    /// New holder, or `None` for a burn.
    pub to: Option<Address>,
    /// The unit that moved.
    pub unit_id: UnitId,
    /// Chain position used for replay ordering.
    pub sequence: EventSequence,
}

impl TransferEvent {
    /// Classify the event as mint, burn, transfer, or void.
    pub const fn kind(&self) -> TransferKind {
        match (&self.from, &self.to) {
            (None, Some(_)) => TransferKind::Mint,
            (Some(_), None) => TransferKind::Burn,
            (Some(_), Some(_)) => TransferKind::Transfer,
            (None, None) => TransferKind::Void,
        }
    }
}

// ---------------------------------------------------------------------------
// Rarity configuration
// ---------------------------------------------------------------------------

/// A contiguous rank range whose multipliers ramp linearly from
/// `min_multiplier` to `max_multiplier`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct RarityTier {
    /// Display name of the tier (e.g. "Celestial").
    pub name: String,
    /// First rank in the tier, inclusive.
    pub start_rank: u32,
    /// Last rank in the tier, inclusive.
    pub end_rank: u32,
    /// Lower bound of the multiplier ramp.
    #[ts(as = "String")]
    pub min_multiplier: Decimal,
    /// Multiplier of the last rank in the tier.
    #[ts(as = "String")]
    pub max_multiplier: Decimal,
}

impl RarityTier {
    /// Whether `rank` falls within `[start_rank, end_rank]`.
    pub const fn contains(&self, rank: u32) -> bool {
        rank >= self.start_rank && rank <= self.end_rank
    }

    /// Number of ranks covered by the tier.
    pub const fn len(&self) -> u32 {
        self.end_rank.saturating_sub(self.start_rank).saturating_add(1)
    }

    /// Whether the tier is degenerate (end before start).
    pub const fn is_empty(&self) -> bool {
        self.end_rank < self.start_rank
    }
}

/// A fixed multiplier for one unit that bypasses tier interpolation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct OverrideEntry {
    /// The overridden unit.
    #[serde(alias = "tokenId")]
    pub unit_id: UnitId,
    /// The multiplier applied instead of the tier ramp.
    #[ts(as = "String")]
    pub multiplier: Decimal,
}

/// Static rarity metadata for one unit of the collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct UnitRecord {
    /// The unit.
    #[serde(alias = "tokenId")]
    pub unit_id: UnitId,
    /// Rarity ordinal; 1 is the rarest.
    pub rank: u32,
    /// Pre-computed trait score the rank was derived from.
    #[serde(default)]
    #[ts(as = "Option<String>")]
    pub score: Option<Decimal>,
}

// ---------------------------------------------------------------------------
// Balances and snapshots
// ---------------------------------------------------------------------------

/// A fungible balance read at a specific block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceQuote {
    /// Raw integer amount in the token's smallest unit.
    #[serde(with = "u256_string")]
    pub raw: U256,
    /// Block the balance was read at.
    pub block_number: u64,
}

/// One run's computed record of an address's holdings and score.
///
/// Persisted keyed by `address`; a newer snapshot replaces the older one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct HolderSnapshot {
    /// The holder.
    pub address: Address,
    /// Units currently held, ascending.
    pub unit_ids: Vec<UnitId>,
    /// Raw fungible balance in the token's smallest unit.
    #[serde(with = "u256_string")]
    #[ts(as = "String")]
    pub fungible_balance: U256,
    /// Computed points.
    #[ts(as = "String")]
    pub points: Decimal,
    /// Block the snapshot was computed at.
    pub as_of_block: u64,
    /// Wall-clock time of the run that produced the snapshot.
    pub as_of_time: DateTime<Utc>,
}

/// Serde helper that writes 256-bit amounts as decimal strings so they
/// survive JSON consumers limited to 53-bit integers.
mod u256_string {
    use alloy_primitives::U256;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
        let raw = String::deserialize(deserializer)?;
        U256::from_str_radix(&raw, 10).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    fn addr(last: u8) -> Address {
        Address::parse(&format!("0x{last:040x}")).unwrap()
    }

    #[test]
    fn transfer_kind_follows_null_sides() {
        let mut event = TransferEvent {
            from: None,
            to: Some(addr(1)),
            unit_id: UnitId(7),
            sequence: EventSequence::new(1, 0),
        };
        assert_eq!(event.kind(), TransferKind::Mint);

        event.from = Some(addr(2));
        assert_eq!(event.kind(), TransferKind::Transfer);

        event.to = None;
        assert_eq!(event.kind(), TransferKind::Burn);

        event.from = None;
        assert_eq!(event.kind(), TransferKind::Void);
    }

    #[test]
    fn tier_contains_is_inclusive() {
        let tier = RarityTier {
            name: "Celestial".to_owned(),
            start_rank: 1,
            end_rank: 429,
            min_multiplier: dec!(1.6),
            max_multiplier: dec!(1.8),
        };
        assert!(tier.contains(1));
        assert!(tier.contains(429));
        assert!(!tier.contains(430));
        assert!(!tier.contains(0));
        assert_eq!(tier.len(), 429);
    }

    #[test]
    fn unit_record_accepts_collection_metadata_shape() {
        let json = r#"{"tokenId": 1888, "score": 312.5, "rank": 4}"#;
        let record: Result<UnitRecord, _> = serde_json::from_str(json);
        let record = record.ok();
        assert_eq!(record.as_ref().map(|r| r.unit_id), Some(UnitId(1888)));
        assert_eq!(record.as_ref().map(|r| r.rank), Some(4));
        assert_eq!(record.and_then(|r| r.score), Some(dec!(312.5)));
    }

    #[test]
    fn snapshot_balance_serializes_as_string() {
        let snapshot = HolderSnapshot {
            address: addr(3),
            unit_ids: vec![UnitId(1), UnitId(2)],
            fungible_balance: U256::MAX,
            points: dec!(0.2),
            as_of_block: 20_000_000,
            as_of_time: Utc::now(),
        };
        let json = serde_json::to_value(&snapshot).unwrap_or_default();
        assert_eq!(
            json.get("fungibleBalance").and_then(serde_json::Value::as_str),
            Some(
                "115792089237316195423570985008687907853269984665640564039457584007913129639935"
            )
        );
        let back: Result<HolderSnapshot, _> = serde_json::from_value(json);
        assert_eq!(back.ok(), Some(snapshot));
    }
}
