//! Error types for rarity table loading and scoring preconditions.

use rust_decimal::Decimal;

use points_types::UnitId;

/// Errors that can occur when loading or validating the rarity table.
///
/// All of these are fatal at startup: the tables are loaded once and a
/// process with inconsistent tiers never starts scoring.
#[derive(Debug, thiserror::Error)]
pub enum RarityError {
    /// Failed to read a table file from disk.
    #[error("failed to read rarity table {path}: {source}")]
    Io {
        /// Path that could not be read.
        path: String,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A table file was not valid JSON for the expected shape.
    #[error("failed to parse rarity table: {0}")]
    Json(#[from] serde_json::Error),

    /// No tiers were configured.
    #[error("rarity table has no tiers")]
    NoTiers,

    /// The first tier does not start at rank 1.
    #[error("first tier {name} starts at rank {start}, expected 1")]
    FirstTierNotAtOne {
        /// Tier name.
        name: String,
        /// Configured start rank.
        start: u32,
    },

    /// A tier ends before it starts.
    #[error("tier {name} has start rank {start} after end rank {end}")]
    EmptyTier {
        /// Tier name.
        name: String,
        /// Configured start rank.
        start: u32,
        /// Configured end rank.
        end: u32,
    },

    /// Two consecutive tiers leave a gap or overlap.
    #[error("tier {name} starts at rank {found}, expected {expected}")]
    NotContiguous {
        /// Tier name.
        name: String,
        /// The rank the tier should start at.
        expected: u32,
        /// The rank it actually starts at.
        found: u32,
    },

    /// A tier's minimum multiplier exceeds its maximum.
    #[error("tier {name} has min multiplier {min} above max {max}")]
    InvertedMultipliers {
        /// Tier name.
        name: String,
        /// Configured minimum.
        min: Decimal,
        /// Configured maximum.
        max: Decimal,
    },

    /// A multiplier is negative.
    #[error("negative multiplier {value} in {context}")]
    NegativeMultiplier {
        /// Where the multiplier was found.
        context: String,
        /// The rejected value.
        value: Decimal,
    },

    /// The same unit has two override entries.
    #[error("duplicate override for unit {0}")]
    DuplicateOverride(UnitId),

    /// The same unit has two rank records.
    #[error("duplicate rank record for unit {0}")]
    DuplicateUnit(UnitId),

    /// No unit rank records were loaded, so no unit could reach a tier.
    #[error("no unit rank records loaded; set units in the table or a units file")]
    NoUnits,
}

/// Errors raised by the scoring preconditions.
#[derive(Debug, thiserror::Error)]
pub enum ScoringError {
    /// A scaling factor is zero or negative.
    #[error("{name} scaling factor must be positive, got {value}")]
    InvalidScalingFactor {
        /// Which factor was rejected.
        name: &'static str,
        /// The rejected value.
        value: Decimal,
    },

    /// The configured token precision exceeds what a 256-bit balance has.
    #[error("token decimals {decimals} exceed the maximum of {max}")]
    InvalidTokenDecimals {
        /// The rejected precision.
        decimals: u32,
        /// Largest accepted precision.
        max: u32,
    },
}
