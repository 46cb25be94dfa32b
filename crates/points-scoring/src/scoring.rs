//! Points scoring: rarity-weighted holdings plus a fungible-balance term.
//!
//! ```text
//! points = sum(multiplier(u) for u in units) / nft_factor
//!        + fungible_balance / 10^token_decimals / token_factor
//! ```
//!
//! `fungible_balance` is the raw integer the token contract reports.
//! `token_decimals` defaults to 0, which scores the raw amount directly.
//!
//! Scoring is pure and deterministic. Duplicate unit ids are summed again;
//! callers that want uniqueness must deduplicate first. Scaling factors are
//! validated once when [`ScalingFactors`] is constructed, so scoring itself
//! never divides by zero.
//!
//! Balances are full 256-bit integers. Amounts wider than a [`Decimal`]
//! mantissa keep their leading 28 digits. A token term beyond the range of
//! [`Decimal`] saturates at [`Decimal::MAX`] and is flagged in the
//! [`ScoreBreakdown`].

use alloy_primitives::U256;
use rust_decimal::Decimal;

use points_types::UnitId;

use crate::error::ScoringError;
use crate::rarity::{MultiplierResolution, RarityTable};

/// Maximum scale supported by [`Decimal`].
const MAX_DECIMAL_SCALE: u32 = 28;

/// Largest token precision accepted: a `U256` has 78 decimal digits.
pub const MAX_TOKEN_DECIMALS: u32 = 77;

/// Largest [`Decimal`] mantissa, `2^96 - 1`.
const MANTISSA_MAX: U256 = U256::from_limbs([u64::MAX, 0xFFFF_FFFF, 0, 0]);

/// The divisors of the points formula.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScalingFactors {
    nft: Decimal,
    token: Decimal,
    token_decimals: u32,
}

impl ScalingFactors {
    /// Create scaling factors, rejecting zero or negative values.
    ///
    /// Balances are scored raw (`token_decimals` of 0) unless
    /// [`with_token_decimals`](Self::with_token_decimals) is applied.
    ///
    /// # Errors
    ///
    /// Returns [`ScoringError::InvalidScalingFactor`] naming the offending
    /// factor.
    pub fn new(nft: Decimal, token: Decimal) -> Result<Self, ScoringError> {
        if nft <= Decimal::ZERO {
            return Err(ScoringError::InvalidScalingFactor {
                name: "nft",
                value: nft,
            });
        }
        if token <= Decimal::ZERO {
            return Err(ScoringError::InvalidScalingFactor {
                name: "token",
                value: token,
            });
        }
        Ok(Self {
            nft,
            token,
            token_decimals: 0,
        })
    }

    /// Divide balances by `10^decimals` before applying the token factor.
    ///
    /// # Errors
    ///
    /// Returns [`ScoringError::InvalidTokenDecimals`] above
    /// [`MAX_TOKEN_DECIMALS`].
    pub const fn with_token_decimals(mut self, decimals: u32) -> Result<Self, ScoringError> {
        if decimals > MAX_TOKEN_DECIMALS {
            return Err(ScoringError::InvalidTokenDecimals {
                decimals,
                max: MAX_TOKEN_DECIMALS,
            });
        }
        self.token_decimals = decimals;
        Ok(self)
    }

    /// Divisor applied to the summed unit multipliers.
    pub const fn nft(&self) -> Decimal {
        self.nft
    }

    /// Divisor applied to the fungible balance.
    pub const fn token(&self) -> Decimal {
        self.token
    }

    /// Decimal places stripped from the raw balance.
    pub const fn token_decimals(&self) -> u32 {
        self.token_decimals
    }
}

/// How many units took each branch of the resolution chain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FallbackCounts {
    /// Units resolved by a fixed override.
    pub overridden: u64,
    /// Units resolved by tier interpolation.
    pub tiered: u64,
    /// Units with no rank record (default multiplier).
    pub missing_record: u64,
    /// Units whose rank is not covered by a tier (default multiplier).
    pub rank_outside_tiers: u64,
}

impl FallbackCounts {
    /// Count one resolution.
    pub const fn record(&mut self, resolution: &MultiplierResolution) {
        match resolution {
            MultiplierResolution::Override { .. } => {
                self.overridden = self.overridden.saturating_add(1);
            }
            MultiplierResolution::Tier { .. } => self.tiered = self.tiered.saturating_add(1),
            MultiplierResolution::MissingRecord => {
                self.missing_record = self.missing_record.saturating_add(1);
            }
            MultiplierResolution::RankOutsideTiers { .. } => {
                self.rank_outside_tiers = self.rank_outside_tiers.saturating_add(1);
            }
        }
    }

    /// Add another set of counts into this one.
    pub const fn merge(&mut self, other: &Self) {
        self.overridden = self.overridden.saturating_add(other.overridden);
        self.tiered = self.tiered.saturating_add(other.tiered);
        self.missing_record = self.missing_record.saturating_add(other.missing_record);
        self.rank_outside_tiers = self
            .rank_outside_tiers
            .saturating_add(other.rank_outside_tiers);
    }

    /// Units that fell back to the default multiplier.
    pub const fn fallbacks(&self) -> u64 {
        self.missing_record.saturating_add(self.rank_outside_tiers)
    }
}

/// A score together with its components and resolution counts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreBreakdown {
    /// Sum of unit multipliers.
    pub nft_sum: Decimal,
    /// `nft_sum / nft_factor`.
    pub nft_points: Decimal,
    /// `fungible_balance / 10^token_decimals / token_factor`.
    pub token_points: Decimal,
    /// Whether `token_points` was clamped to [`Decimal::MAX`].
    pub saturated: bool,
    /// Total points.
    pub points: Decimal,
    /// Resolution branch counts for the scored units.
    pub counts: FallbackCounts,
    /// Units that fell back to the default multiplier, in input order.
    pub fallback_units: Vec<UnitId>,
}

/// Compute points for a holder from its units and raw fungible balance.
pub fn score(
    factors: &ScalingFactors,
    table: &RarityTable,
    unit_ids: &[UnitId],
    fungible_balance: U256,
) -> Decimal {
    score_breakdown(factors, table, unit_ids, fungible_balance).points
}

/// Compute points for a holder and report how each unit was resolved.
pub fn score_breakdown(
    factors: &ScalingFactors,
    table: &RarityTable,
    unit_ids: &[UnitId],
    fungible_balance: U256,
) -> ScoreBreakdown {
    let mut nft_sum = Decimal::ZERO;
    let mut counts = FallbackCounts::default();
    let mut fallback_units = Vec::new();

    for &unit in unit_ids {
        let resolution = table.resolve(unit);
        counts.record(&resolution);
        if resolution.is_fallback() {
            fallback_units.push(unit);
        }
        nft_sum = nft_sum.saturating_add(resolution.multiplier());
    }

    // Factors are validated positive, so checked_div only fails on overflow.
    let nft_points = nft_sum.checked_div(factors.nft).unwrap_or(Decimal::MAX);
    let token = token_points(fungible_balance, factors);

    ScoreBreakdown {
        nft_sum,
        nft_points,
        token_points: token.unwrap_or(Decimal::MAX),
        saturated: token.is_none(),
        points: nft_points.saturating_add(token.unwrap_or(Decimal::MAX)),
        counts,
        fallback_units,
    }
}

/// The balance term `raw / 10^token_decimals / token_factor`.
///
/// Returns `None` when the result exceeds the range of [`Decimal`]. The
/// result is exact whenever `raw` fits a [`Decimal`] mantissa and the
/// division terminates within 28 decimal places.
pub fn token_points(raw: U256, factors: &ScalingFactors) -> Option<Decimal> {
    let (mantissa, dropped) = fit_mantissa(raw);
    let mantissa = u128::try_from(mantissa)
        .ok()
        .and_then(|m| i128::try_from(m).ok())?;
    let exponent = i64::from(dropped).checked_sub(i64::from(factors.token_decimals))?;

    if exponent > 0 {
        let mut points = Decimal::try_from_i128_with_scale(mantissa, 0)
            .ok()?
            .checked_div(factors.token)?;
        for _ in 0..exponent {
            points = points.checked_mul(Decimal::TEN)?;
        }
        return Some(points);
    }

    let scale = u32::try_from(exponent.unsigned_abs()).ok()?;
    let tokens = Decimal::try_from_i128_with_scale(mantissa, scale.min(MAX_DECIMAL_SCALE)).ok()?;
    let mut points = tokens.checked_div(factors.token)?;
    for _ in MAX_DECIMAL_SCALE..scale {
        if points.is_zero() {
            break;
        }
        points = points.checked_div(Decimal::TEN)?;
    }
    Some(points.normalize())
}

/// Drop low-order decimal digits until `raw` fits a [`Decimal`] mantissa.
///
/// Returns the remaining digits and how many were dropped.
fn fit_mantissa(raw: U256) -> (U256, u32) {
    let ten = U256::from(10_u8);
    let mut mantissa = raw;
    let mut dropped = 0_u32;
    while mantissa > MANTISSA_MAX {
        let Some(next) = mantissa.checked_div(ten) else {
            break;
        };
        mantissa = next;
        dropped = dropped.saturating_add(1);
    }
    (mantissa, dropped)
}
