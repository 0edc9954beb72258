//! # Unit Converter
//!
//! Converts a parsed (quantity, unit) into the resolved entry's canonical
//! unit. Volume-to-mass conversion consults the entry's own density table
//! first and falls back to category defaults keyed by the entry's tags;
//! when neither applies the line is kept as an unconverted diagnostic
//! rather than given a fabricated number.

use crate::catalog::{CanonicalUnit, IngredientEntry};
use crate::normalizer::ParsedLine;
use crate::units::{category_density_per_cup, vague_unit_grams, Unit};
use log::{debug, warn};
use std::fmt;

/// Milliliters in one cup, the basis of the category density table
const ML_PER_CUP: f64 = 240.0;

/// How a conversion arrived at its value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionPath {
    /// Unit already canonical, or a trivial multiple (kg→g, L→ml)
    TrivialScale,
    /// Entry's own density table
    EntryDensity,
    /// Category default density from the entry's tags
    CategoryDensity,
    /// Vague-quantity constant
    VagueConstant,
    /// Count unit passed through unchanged
    CountPassthrough,
}

/// A quantity expressed in the entry's canonical unit
#[derive(Debug, Clone, PartialEq)]
pub struct Converted {
    pub value: f64,
    pub unit: CanonicalUnit,
    pub via: ConversionPath,
}

/// A line that could not be converted
#[derive(Debug, Clone, PartialEq)]
pub enum ConversionError {
    /// The line carried no numeric quantity
    MissingQuantity { raw: String },
    /// No density is known for this unit on this entry or its categories
    DensityUnknown { id: String, unit: Unit },
    /// A volume or mass unit applied to a count-based ingredient; surfaced
    /// as a data-quality warning, never silently dropped
    CountUnitMismatch { id: String, unit: Unit },
    /// A mass- or volume-canonical entry needs an explicit unit
    UnitRequired { id: String },
}

impl ConversionError {
    /// Warnings indicate suspicious data rather than an impossible ask
    pub fn is_warning(&self) -> bool {
        matches!(self, ConversionError::CountUnitMismatch { .. })
    }
}

impl fmt::Display for ConversionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversionError::MissingQuantity { raw } => {
                write!(f, "no quantity to convert in '{}'", raw)
            }
            ConversionError::DensityUnknown { id, unit } => {
                write!(f, "no density known for '{}' in {}", id, unit)
            }
            ConversionError::CountUnitMismatch { id, unit } => {
                write!(f, "{} given for count-based ingredient '{}'", unit, id)
            }
            ConversionError::UnitRequired { id } => {
                write!(f, "'{}' requires an explicit unit", id)
            }
        }
    }
}

impl std::error::Error for ConversionError {}

/// Convert a parsed line's quantity into the entry's canonical unit
pub fn to_canonical(
    parsed: &ParsedLine,
    entry: &IngredientEntry,
) -> Result<Converted, ConversionError> {
    let qty = parsed
        .quantity
        .as_ref()
        .and_then(|q| q.estimated_value())
        .ok_or_else(|| ConversionError::MissingQuantity {
            raw: parsed.raw.clone(),
        })?;

    let unit = match &parsed.unit {
        Some(unit) => unit,
        None => {
            // A bare count like "3 eggs" is fine for count-based entries
            return if entry.canonical_unit == CanonicalUnit::Whole {
                Ok(Converted {
                    value: qty,
                    unit: CanonicalUnit::Whole,
                    via: ConversionPath::CountPassthrough,
                })
            } else {
                Err(ConversionError::UnitRequired {
                    id: entry.id.clone(),
                })
            };
        }
    };

    if unit.is_vague() {
        return convert_vague(qty, unit, entry);
    }

    match entry.canonical_unit {
        CanonicalUnit::Whole => {
            if unit.is_count() {
                Ok(Converted {
                    value: qty,
                    unit: CanonicalUnit::Whole,
                    via: ConversionPath::CountPassthrough,
                })
            } else {
                warn!(
                    "Unit {} on count-based ingredient '{}' looks like a data defect",
                    unit, entry.id
                );
                Err(ConversionError::CountUnitMismatch {
                    id: entry.id.clone(),
                    unit: unit.clone(),
                })
            }
        }
        CanonicalUnit::Grams => {
            if let Some(factor) = unit.to_grams() {
                return Ok(Converted {
                    value: qty * factor,
                    unit: CanonicalUnit::Grams,
                    via: ConversionPath::TrivialScale,
                });
            }
            grams_per_unit(entry, unit)
                .map(|(per_unit, via)| Converted {
                    value: qty * per_unit,
                    unit: CanonicalUnit::Grams,
                    via,
                })
                .ok_or_else(|| ConversionError::DensityUnknown {
                    id: entry.id.clone(),
                    unit: unit.clone(),
                })
        }
        CanonicalUnit::Milliliters => {
            if let Some(factor) = unit.to_milliliters() {
                return Ok(Converted {
                    value: qty * factor,
                    unit: CanonicalUnit::Milliliters,
                    via: ConversionPath::TrivialScale,
                });
            }
            // Mass into a volume-canonical entry would need an inverse
            // density; not fabricated
            Err(ConversionError::DensityUnknown {
                id: entry.id.clone(),
                unit: unit.clone(),
            })
        }
    }
}

/// Vague units convert through entry overrides then category constants
fn convert_vague(
    qty: f64,
    unit: &Unit,
    entry: &IngredientEntry,
) -> Result<Converted, ConversionError> {
    if entry.canonical_unit == CanonicalUnit::Whole {
        return Err(ConversionError::CountUnitMismatch {
            id: entry.id.clone(),
            unit: unit.clone(),
        });
    }

    if let Some((per_unit, _)) = entry_density_for(entry, unit) {
        return Ok(Converted {
            value: qty * per_unit,
            unit: entry.canonical_unit,
            via: ConversionPath::EntryDensity,
        });
    }

    let grams = vague_unit_grams(unit, entry.primary_category()).ok_or_else(|| {
        ConversionError::DensityUnknown {
            id: entry.id.clone(),
            unit: unit.clone(),
        }
    })?;

    debug!(
        "Vague {} of '{}' ({}): {} g each",
        unit,
        entry.id,
        entry.primary_category().unwrap_or("uncategorized"),
        grams
    );

    // These constants are gram figures; for the few ml-canonical entries
    // they serve as-is at the precision a pinch warrants
    Ok(Converted {
        value: qty * grams,
        unit: entry.canonical_unit,
        via: ConversionPath::VagueConstant,
    })
}

/// Grams for one of `unit`, from the entry table or category defaults
fn grams_per_unit(entry: &IngredientEntry, unit: &Unit) -> Option<(f64, ConversionPath)> {
    if let Some(hit) = entry_density_for(entry, unit) {
        return Some(hit);
    }

    if unit.is_volume() {
        let category = entry.primary_category()?;
        let per_cup = category_density_per_cup(category)?;
        let ml = unit.to_milliliters()?;
        return Some((per_cup * ml / ML_PER_CUP, ConversionPath::CategoryDensity));
    }

    None
}

fn entry_density_for(entry: &IngredientEntry, unit: &Unit) -> Option<(f64, ConversionPath)> {
    let density = entry.density.as_ref()?;
    let key = unit.density_key()?;
    density
        .get(key)
        .map(|&grams| (grams, ConversionPath::EntryDensity))
}

/// Invert a conversion: canonical grams back into a volume unit
///
/// Uses the same density lookups as the forward direction, so a
/// cup→grams→cup trip recovers the original amount.
pub fn canonical_to_volume(entry: &IngredientEntry, grams: f64, unit: &Unit) -> Option<f64> {
    let (per_unit, _) = grams_per_unit(entry, unit)?;
    if per_unit <= 0.0 {
        return None;
    }
    Some(grams / per_unit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CanonicalUnit, IngredientEntry};
    use crate::normalizer::LineNormalizer;
    use crate::units::Quantity;
    use std::collections::BTreeMap;

    fn basil_entry() -> IngredientEntry {
        let mut density = BTreeMap::new();
        density.insert("cup".to_string(), 20.0);
        IngredientEntry::new("basil", "basil", CanonicalUnit::Grams)
            .with_tag("herb")
            .with_density(density)
    }

    fn parse(line: &str) -> ParsedLine {
        LineNormalizer::new().parse_line(line).unwrap()
    }

    #[test]
    fn test_entry_density_conversion() {
        let parsed = parse("2 cups chopped fresh basil");
        let converted = to_canonical(&parsed, &basil_entry()).unwrap();
        assert_eq!(converted.value, 40.0);
        assert_eq!(converted.unit, CanonicalUnit::Grams);
        assert_eq!(converted.via, ConversionPath::EntryDensity);
    }

    #[test]
    fn test_trivial_mass_scale() {
        let entry = IngredientEntry::new("flour", "flour", CanonicalUnit::Grams);
        let parsed = parse("1.5kg flour");
        let converted = to_canonical(&parsed, &entry).unwrap();
        assert_eq!(converted.value, 1500.0);
        assert_eq!(converted.via, ConversionPath::TrivialScale);
    }

    #[test]
    fn test_trivial_volume_scale() {
        let entry = IngredientEntry::new("milk", "milk", CanonicalUnit::Milliliters);
        let parsed = parse("2 l milk");
        let converted = to_canonical(&parsed, &entry).unwrap();
        assert_eq!(converted.value, 2000.0);
    }

    #[test]
    fn test_category_density_fallback() {
        // No density table on the entry; the oil category supplies 216 g/cup
        let entry = IngredientEntry::new("olive oil", "olive oil", CanonicalUnit::Grams)
            .with_tag("oil");
        let parsed = parse("1 cup olive oil");
        let converted = to_canonical(&parsed, &entry).unwrap();
        assert_eq!(converted.value, 216.0);
        assert_eq!(converted.via, ConversionPath::CategoryDensity);
    }

    #[test]
    fn test_category_density_scales_to_tbsp() {
        let entry = IngredientEntry::new("olive oil", "olive oil", CanonicalUnit::Grams)
            .with_tag("oil");
        let parsed = parse("2 tbsp olive oil");
        let converted = to_canonical(&parsed, &entry).unwrap();
        // 216 g/cup, one tbsp is 15/240 of a cup
        assert!((converted.value - 27.0).abs() < 1e-9);
    }

    #[test]
    fn test_density_unknown_is_diagnostic() {
        let entry = IngredientEntry::new("tofu", "tofu", CanonicalUnit::Grams);
        let parsed = parse("1 cup tofu");
        let err = to_canonical(&parsed, &entry).unwrap_err();
        assert!(matches!(err, ConversionError::DensityUnknown { .. }));
        assert!(!err.is_warning());
    }

    #[test]
    fn test_count_passthrough() {
        let entry = IngredientEntry::new("egg", "egg", CanonicalUnit::Whole);
        let parsed = parse("3 eggs");
        let converted = to_canonical(&parsed, &entry).unwrap();
        assert_eq!(converted.value, 3.0);
        assert_eq!(converted.unit, CanonicalUnit::Whole);
        assert_eq!(converted.via, ConversionPath::CountPassthrough);
    }

    #[test]
    fn test_count_unit_passthrough() {
        let entry = IngredientEntry::new("garlic", "garlic", CanonicalUnit::Whole);
        let parsed = parse("2 cloves garlic");
        let converted = to_canonical(&parsed, &entry).unwrap();
        assert_eq!(converted.value, 2.0);
    }

    #[test]
    fn test_volume_on_count_entry_warns() {
        let entry = IngredientEntry::new("egg", "egg", CanonicalUnit::Whole);
        let parsed = parse("1 cup eggs");
        let err = to_canonical(&parsed, &entry).unwrap_err();
        assert!(matches!(err, ConversionError::CountUnitMismatch { .. }));
        assert!(err.is_warning());
    }

    #[test]
    fn test_vague_handful_uses_category() {
        let entry = IngredientEntry::new("spinach", "spinach", CanonicalUnit::Grams)
            .with_tag("leafy_green");
        let parsed = parse("1 handful spinach");
        assert!(parsed.was_vague_quantity);
        let converted = to_canonical(&parsed, &entry).unwrap();
        assert_eq!(converted.value, 35.0);
        assert_eq!(converted.via, ConversionPath::VagueConstant);
    }

    #[test]
    fn test_vague_entry_override_wins() {
        let mut density = BTreeMap::new();
        density.insert("leaf".to_string(), 0.4);
        let entry = IngredientEntry::new("basil", "basil", CanonicalUnit::Grams)
            .with_tag("herb")
            .with_density(density);
        let parsed = parse("10 leaves basil");
        let converted = to_canonical(&parsed, &entry).unwrap();
        assert!((converted.value - 4.0).abs() < 1e-9);
        assert_eq!(converted.via, ConversionPath::EntryDensity);
    }

    #[test]
    fn test_missing_quantity() {
        let entry = basil_entry();
        let parsed = parse("basil");
        let err = to_canonical(&parsed, &entry).unwrap_err();
        assert!(matches!(err, ConversionError::MissingQuantity { .. }));
    }

    #[test]
    fn test_unit_required_for_measured_entry() {
        let entry = basil_entry();
        let parsed = ParsedLine {
            quantity: Some(Quantity::exact(2.0)),
            unit: None,
            identity_text: "basil".to_string(),
            preparation_notes: vec![],
            was_vague_quantity: false,
            state_hint: None,
            raw: "2 basil".to_string(),
        };
        let err = to_canonical(&parsed, &entry).unwrap_err();
        assert!(matches!(err, ConversionError::UnitRequired { .. }));
    }

    #[test]
    fn test_round_trip_cup_to_grams_and_back() {
        let entry = basil_entry();
        let parsed = parse("1 cup basil");
        let converted = to_canonical(&parsed, &entry).unwrap();
        let cups = canonical_to_volume(&entry, converted.value, &Unit::Cups).unwrap();
        assert!((cups - 1.0).abs() < 1e-9);
    }
}
