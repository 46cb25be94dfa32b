//! Static rarity tables and per-unit multiplier resolution.
//!
//! The [`RarityTable`] holds three read-only lookups loaded once at
//! startup: unit rank records, the ordered tier partition of the rank
//! range, and fixed per-unit overrides. It is shared across tasks behind an
//! `Arc` and never mutated after construction.
//!
//! # Resolution chain
//!
//! ```text
//! override?  --yes--> Override { multiplier }
//!    | no
//! rank record? --no--> MissingRecord            (multiplier 1.0)
//!    | yes
//! tier for rank? --no--> RankOutsideTiers       (multiplier 1.0)
//!    | yes
//! Tier { min + (max - min) * p / total }
//! ```
//!
//! Each step is a distinct [`MultiplierResolution`] variant so callers can
//! count how many units fell through to the default.

use std::collections::BTreeMap;
use std::path::Path;

use rust_decimal::Decimal;
use serde::Deserialize;

use points_types::{OverrideEntry, RarityTier, UnitId, UnitRecord};

use crate::error::RarityError;

/// Multiplier used when a unit cannot be resolved through the tables.
pub const DEFAULT_MULTIPLIER: Decimal = Decimal::ONE;

/// The outcome of resolving one unit through the rarity chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MultiplierResolution {
    /// The unit has a fixed override.
    Override {
        /// The override multiplier.
        multiplier: Decimal,
    },
    /// The unit's rank fell inside a tier and was interpolated.
    Tier {
        /// Index of the tier in [`RarityTable::tiers`].
        tier_index: usize,
        /// The unit's rank.
        rank: u32,
        /// 1-based position of the rank within the tier.
        position: u32,
        /// Number of ranks in the tier.
        total: u32,
        /// The interpolated multiplier.
        multiplier: Decimal,
    },
    /// No rank record exists for the unit.
    MissingRecord,
    /// The unit's rank is not covered by any tier.
    RankOutsideTiers {
        /// The uncovered rank.
        rank: u32,
    },
}

impl MultiplierResolution {
    /// The multiplier this resolution contributes.
    pub const fn multiplier(&self) -> Decimal {
        match self {
            Self::Override { multiplier } | Self::Tier { multiplier, .. } => *multiplier,
            Self::MissingRecord | Self::RankOutsideTiers { .. } => DEFAULT_MULTIPLIER,
        }
    }

    /// Whether the default multiplier was used because the tables were
    /// incomplete.
    pub const fn is_fallback(&self) -> bool {
        matches!(self, Self::MissingRecord | Self::RankOutsideTiers { .. })
    }
}

/// On-disk shape of the rarity table file.
///
/// `units` may be left empty and supplied from a separate collection
/// metadata file instead (see [`RarityTable::load`]).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RarityTableFile {
    /// Ordered tier partition of the rank range.
    pub tiers: Vec<RarityTier>,
    /// Fixed per-unit multipliers.
    #[serde(default)]
    pub overrides: Vec<OverrideEntry>,
    /// Rank record for every unit of the collection.
    #[serde(default)]
    pub units: Vec<UnitRecord>,
}

/// Read-only rarity lookups for the whole collection.
#[derive(Debug, Clone)]
pub struct RarityTable {
    tiers: Vec<RarityTier>,
    overrides: BTreeMap<UnitId, Decimal>,
    ranks: BTreeMap<UnitId, u32>,
}

impl RarityTable {
    /// Build a table from its parts, validating the tier partition.
    ///
    /// # Errors
    ///
    /// Returns [`RarityError`] if tiers are missing, do not start at rank
    /// 1, leave gaps or overlap, have inverted or negative multipliers, or
    /// if an override or unit record is duplicated.
    pub fn new(
        tiers: Vec<RarityTier>,
        overrides: Vec<OverrideEntry>,
        units: Vec<UnitRecord>,
    ) -> Result<Self, RarityError> {
        validate_tiers(&tiers)?;

        let mut override_map = BTreeMap::new();
        for entry in overrides {
            if entry.multiplier.is_sign_negative() && !entry.multiplier.is_zero() {
                return Err(RarityError::NegativeMultiplier {
                    context: format!("override for unit {}", entry.unit_id),
                    value: entry.multiplier,
                });
            }
            if override_map.insert(entry.unit_id, entry.multiplier).is_some() {
                return Err(RarityError::DuplicateOverride(entry.unit_id));
            }
        }

        let mut ranks = BTreeMap::new();
        for record in units {
            if ranks.insert(record.unit_id, record.rank).is_some() {
                return Err(RarityError::DuplicateUnit(record.unit_id));
            }
        }

        Ok(Self {
            tiers,
            overrides: override_map,
            ranks,
        })
    }

    /// Build a table from a parsed [`RarityTableFile`].
    ///
    /// # Errors
    ///
    /// Returns [`RarityError`] if validation fails.
    pub fn from_file_contents(file: RarityTableFile) -> Result<Self, RarityError> {
        Self::new(file.tiers, file.overrides, file.units)
    }

    /// Parse a table from a JSON string.
    ///
    /// # Errors
    ///
    /// Returns [`RarityError::Json`] on malformed input or any validation
    /// error from [`RarityTable::new`].
    pub fn parse(json: &str) -> Result<Self, RarityError> {
        let file: RarityTableFile = serde_json::from_str(json)?;
        Self::from_file_contents(file)
    }

    /// Load the table from `path`, optionally taking unit records from a
    /// separate collection metadata file (`[{ "tokenId", "score", "rank" }]`).
    ///
    /// Records from `units_path` are appended to any records in the main
    /// file; a unit present in both is a duplicate.
    ///
    /// # Errors
    ///
    /// Returns [`RarityError::Io`] if a file cannot be read,
    /// [`RarityError::NoUnits`] if neither file holds a rank record, or any
    /// parse or validation error.
    pub fn load(path: &Path, units_path: Option<&Path>) -> Result<Self, RarityError> {
        let mut file: RarityTableFile = serde_json::from_str(&read(path)?)?;

        if let Some(units_path) = units_path {
            let records: Vec<UnitRecord> = serde_json::from_str(&read(units_path)?)?;
            file.units.extend(records);
        }
        if file.units.is_empty() {
            return Err(RarityError::NoUnits);
        }

        let table = Self::from_file_contents(file)?;
        tracing::info!(
            tiers = table.tiers.len(),
            overrides = table.overrides.len(),
            units = table.ranks.len(),
            path = %path.display(),
            "Rarity table loaded"
        );
        Ok(table)
    }

    /// Resolve `unit` through override, rank record, and tier lookup.
    pub fn resolve(&self, unit: UnitId) -> MultiplierResolution {
        if let Some(multiplier) = self.overrides.get(&unit) {
            return MultiplierResolution::Override {
                multiplier: *multiplier,
            };
        }

        let Some(&rank) = self.ranks.get(&unit) else {
            return MultiplierResolution::MissingRecord;
        };

        let Some((tier_index, tier)) = self
            .tiers
            .iter()
            .enumerate()
            .find(|(_, tier)| tier.contains(rank))
        else {
            return MultiplierResolution::RankOutsideTiers { rank };
        };

        let position = rank.saturating_sub(tier.start_rank).saturating_add(1);
        let total = tier.len();

        MultiplierResolution::Tier {
            tier_index,
            rank,
            position,
            total,
            multiplier: interpolate(tier, position, total),
        }
    }

    /// The multiplier for `unit`, with fallbacks resolved to `1.0`.
    pub fn multiplier_for(&self, unit: UnitId) -> Decimal {
        self.resolve(unit).multiplier()
    }

    /// The ordered tier partition.
    pub fn tiers(&self) -> &[RarityTier] {
        &self.tiers
    }

    /// The tier covering `rank`, if any.
    pub fn tier_for_rank(&self, rank: u32) -> Option<&RarityTier> {
        self.tiers.iter().find(|tier| tier.contains(rank))
    }

    /// The rank recorded for `unit`, if any.
    pub fn rank_of(&self, unit: UnitId) -> Option<u32> {
        self.ranks.get(&unit).copied()
    }

    /// Number of units with a rank record.
    pub fn unit_count(&self) -> usize {
        self.ranks.len()
    }

    /// Number of override entries.
    pub fn override_count(&self) -> usize {
        self.overrides.len()
    }
}

/// Forward linear ramp within a tier: `min + (max - min) * position / total`.
///
/// Position 1 evaluates strictly above `min`; position `total` evaluates to
/// exactly `max`.
fn interpolate(tier: &RarityTier, position: u32, total: u32) -> Decimal {
    let range = tier.max_multiplier.saturating_sub(tier.min_multiplier);
    let step = range
        .saturating_mul(Decimal::from(position))
        .checked_div(Decimal::from(total))
        .unwrap_or(range);
    tier.min_multiplier.saturating_add(step)
}

fn read(path: &Path) -> Result<String, RarityError> {
    std::fs::read_to_string(path).map_err(|source| RarityError::Io {
        path: path.display().to_string(),
        source,
    })
}

fn validate_tiers(tiers: &[RarityTier]) -> Result<(), RarityError> {
    let first = tiers.first().ok_or(RarityError::NoTiers)?;
    if first.start_rank != 1 {
        return Err(RarityError::FirstTierNotAtOne {
            name: first.name.clone(),
            start: first.start_rank,
        });
    }

    let mut expected_start = 1_u32;
    for tier in tiers {
        if tier.is_empty() {
            return Err(RarityError::EmptyTier {
                name: tier.name.clone(),
                start: tier.start_rank,
                end: tier.end_rank,
            });
        }
        if tier.start_rank != expected_start {
            return Err(RarityError::NotContiguous {
                name: tier.name.clone(),
                expected: expected_start,
                found: tier.start_rank,
            });
        }
        if tier.min_multiplier.is_sign_negative() && !tier.min_multiplier.is_zero() {
            return Err(RarityError::NegativeMultiplier {
                context: format!("tier {}", tier.name),
                value: tier.min_multiplier,
            });
        }
        if tier.min_multiplier > tier.max_multiplier {
            return Err(RarityError::InvertedMultipliers {
                name: tier.name.clone(),
                min: tier.min_multiplier,
                max: tier.max_multiplier,
            });
        }
        expected_start = tier.end_rank.saturating_add(1);
    }

    Ok(())
}
