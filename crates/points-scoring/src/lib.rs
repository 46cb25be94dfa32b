//! Rarity multipliers and points scoring for the holder points tracker.
//!
//! # Modules
//!
//! - [`rarity`] -- The immutable [`RarityTable`] and its resolution chain
//!   (override, then tier interpolation, then the default multiplier).
//! - [`scoring`] -- The points formula over a holder's units and balance.
//! - [`error`] -- Load-time and precondition errors.
//!
//! The table is loaded once at startup, validated, and shared read-only for
//! the life of the process. Multipliers are [`rust_decimal::Decimal`] so tier
//! boundaries land exactly on the configured values.

pub mod error;
pub mod rarity;
pub mod scoring;

pub use error::{RarityError, ScoringError};
pub use rarity::{DEFAULT_MULTIPLIER, MultiplierResolution, RarityTable, RarityTableFile};
pub use scoring::{
    FallbackCounts, MAX_TOKEN_DECIMALS, ScalingFactors, ScoreBreakdown, score, score_breakdown,
    token_points,
};
