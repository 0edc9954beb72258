//! # Price Normalizer
//!
//! Converts heterogeneous retail pricing (per bag, per bunch, per bottle)
//! into a common per-kg / per-L basis so shopping-list costs aggregate
//! across differently-packaged ingredients.
//!
//! Resolution order: direct kg/L units, then a weight parsed out of the
//! free-text pack description, then the retail-unit typical-weight table
//! (ingredient-specific override first, category default second). When
//! nothing resolves the normalized price stays `None` and the entry is
//! flagged for manual weight entry; aggregation treats `None` as
//! "excluded and flagged", never as zero.

use crate::catalog::IngredientEntry;
use anyhow::{Context, Result};
use lazy_static::lazy_static;
use log::{debug, trace};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

lazy_static! {
    /// "120g", "1.5kg", "120-150g", "750 ml"
    static ref PACK_SIZE: Regex =
        Regex::new(r"(?i)(\d+(?:\.\d+)?)(?:\s*[-–]\s*(\d+(?:\.\d+)?))?\s*(g|kg|ml|l)\b").unwrap();
}

/// Typical weight for one retail unit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetailUnitWeight {
    /// Grams for one of this unit when nothing more specific is known
    pub default: f64,
    /// Ingredient-specific overrides, keyed by ingredient id
    #[serde(default)]
    pub by_ingredient: BTreeMap<String, f64>,
}

/// Versioned retail-unit → typical-weight lookup, consumed read-only
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetailWeightTable {
    #[serde(rename = "_version")]
    pub version: u64,
    pub units: BTreeMap<String, RetailUnitWeight>,
}

impl RetailWeightTable {
    /// Built-in defaults for common retail units
    pub fn builtin() -> Self {
        let mut units = BTreeMap::new();

        let mut bunch_overrides = BTreeMap::new();
        bunch_overrides.insert("carrot".to_string(), 300.0);
        bunch_overrides.insert("banana".to_string(), 600.0);
        units.insert(
            "bunch".to_string(),
            RetailUnitWeight {
                default: 30.0,
                by_ingredient: bunch_overrides,
            },
        );

        units.insert(
            "head".to_string(),
            RetailUnitWeight {
                default: 500.0,
                by_ingredient: BTreeMap::new(),
            },
        );
        units.insert(
            "can".to_string(),
            RetailUnitWeight {
                default: 400.0,
                by_ingredient: BTreeMap::new(),
            },
        );
        units.insert(
            "packet".to_string(),
            RetailUnitWeight {
                default: 250.0,
                by_ingredient: BTreeMap::new(),
            },
        );
        units.insert(
            "loaf".to_string(),
            RetailUnitWeight {
                default: 800.0,
                by_ingredient: BTreeMap::new(),
            },
        );

        Self { version: 1, units }
    }

    /// Load a retail-weight table document from disk
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read retail weight table {}", path.display()))?;
        serde_json::from_str(&data).context("Failed to parse retail weight table")
    }

    /// Typical grams for one `unit` of `ingredient_id`
    pub fn grams_for(&self, unit: &str, ingredient_id: &str) -> Option<f64> {
        let entry = self.units.get(&unit.to_lowercase())?;
        Some(
            entry
                .by_ingredient
                .get(ingredient_id)
                .copied()
                .unwrap_or(entry.default),
        )
    }
}

/// A price could not be normalized
#[derive(Debug, Clone, PartialEq)]
pub enum PriceError {
    /// The entry carries no pricing at all
    MissingPricing { id: String },
    /// No weight could be determined for the retail unit
    WeightUnknown { id: String, unit: String },
}

impl fmt::Display for PriceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PriceError::MissingPricing { id } => write!(f, "entry '{}' has no pricing", id),
            PriceError::WeightUnknown { id, unit } => {
                write!(f, "no typical weight for one '{}' of '{}'", unit, id)
            }
        }
    }
}

impl std::error::Error for PriceError {}

/// How the normalized price was derived
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PriceBasis {
    /// Retail unit was already kg or L
    DirectUnit,
    /// Weight parsed out of the free-text pack description
    PackSize,
    /// Retail-unit typical-weight table
    TypicalWeight,
}

/// A price on the common per-kg / per-L basis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedPrice {
    pub price_per_kg: Option<f64>,
    pub price_per_l: Option<f64>,
    pub basis: PriceBasis,
}

/// Weight or volume read from a pack description
#[derive(Debug, Clone, Copy, PartialEq)]
struct PackAmount {
    grams: Option<f64>,
    milliliters: Option<f64>,
}

/// Parse "<number><g|kg|ml|L>" out of a free-text pack description
///
/// Ranges like "120-150g" resolve to the midpoint, the same rule applied
/// to quantity ranges in recipe lines.
fn parse_pack_size(text: &str) -> Option<PackAmount> {
    let caps = PACK_SIZE.captures(text)?;
    let low: f64 = caps[1].parse().ok()?;
    let amount = match caps.get(2) {
        Some(high) => {
            let high: f64 = high.as_str().parse().ok()?;
            (low + high) / 2.0
        }
        None => low,
    };

    let pack = match caps[3].to_lowercase().as_str() {
        "g" => PackAmount {
            grams: Some(amount),
            milliliters: None,
        },
        "kg" => PackAmount {
            grams: Some(amount * 1000.0),
            milliliters: None,
        },
        "ml" => PackAmount {
            grams: None,
            milliliters: Some(amount),
        },
        "l" => PackAmount {
            grams: None,
            milliliters: Some(amount * 1000.0),
        },
        _ => return None,
    };
    trace!("Parsed pack size '{}' -> {:?}", text, pack);
    Some(pack)
}

/// Normalize an entry's retail price to per-kg and/or per-L
pub fn normalize_price(
    entry: &IngredientEntry,
    table: &RetailWeightTable,
) -> Result<NormalizedPrice, PriceError> {
    let pricing = entry
        .pricing
        .as_ref()
        .ok_or_else(|| PriceError::MissingPricing {
            id: entry.id.clone(),
        })?;

    let unit = pricing.unit.to_lowercase();

    // Already on the target basis
    match unit.as_str() {
        "kg" => {
            return Ok(NormalizedPrice {
                price_per_kg: Some(pricing.average_price),
                price_per_l: None,
                basis: PriceBasis::DirectUnit,
            })
        }
        "l" => {
            return Ok(NormalizedPrice {
                price_per_kg: None,
                price_per_l: Some(pricing.average_price),
                basis: PriceBasis::DirectUnit,
            })
        }
        "g" => {
            return Ok(NormalizedPrice {
                price_per_kg: Some(pricing.average_price * 1000.0),
                price_per_l: None,
                basis: PriceBasis::DirectUnit,
            })
        }
        "ml" => {
            return Ok(NormalizedPrice {
                price_per_kg: None,
                price_per_l: Some(pricing.average_price * 1000.0),
                basis: PriceBasis::DirectUnit,
            })
        }
        _ => {}
    }

    // Weight or volume hidden in the pack description
    if let Some(pack) = pricing.unit_size.as_deref().and_then(parse_pack_size) {
        if let Some(grams) = pack.grams {
            debug!(
                "Normalized '{}' via pack size: {} per {} g",
                entry.id, pricing.average_price, grams
            );
            return Ok(NormalizedPrice {
                price_per_kg: Some(pricing.average_price / grams * 1000.0),
                price_per_l: None,
                basis: PriceBasis::PackSize,
            });
        }
        if let Some(ml) = pack.milliliters {
            return Ok(NormalizedPrice {
                price_per_kg: None,
                price_per_l: Some(pricing.average_price / ml * 1000.0),
                basis: PriceBasis::PackSize,
            });
        }
    }

    // Typical weight for the retail unit: explicit entry figure first,
    // then the lookup table
    let grams = pricing
        .typical_weight_grams
        .or_else(|| table.grams_for(&unit, &entry.id));

    match grams {
        Some(grams) if grams > 0.0 => Ok(NormalizedPrice {
            price_per_kg: Some(pricing.average_price / grams * 1000.0),
            price_per_l: None,
            basis: PriceBasis::TypicalWeight,
        }),
        _ => Err(PriceError::WeightUnknown {
            id: entry.id.clone(),
            unit: pricing.unit.clone(),
        }),
    }
}

/// Normalize in place, writing the derived figures back onto the entry
///
/// Used by maintenance tooling; the resolution pipeline never mutates.
pub fn normalize_entry(
    entry: &mut IngredientEntry,
    table: &RetailWeightTable,
) -> Result<NormalizedPrice, PriceError> {
    let normalized = normalize_price(entry, table)?;
    if let Some(pricing) = entry.pricing.as_mut() {
        pricing.price_per_kg = normalized.price_per_kg;
        pricing.price_per_l = normalized.price_per_l;
    }
    Ok(normalized)
}
