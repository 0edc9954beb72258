//! # Unit & Quantity Table
//!
//! This module defines the measurement unit vocabulary and the quantity
//! model used throughout the resolution pipeline, plus the static
//! conversion data: vague-quantity constants ("pinch", "handful", "sprig")
//! and category default densities for volume-to-mass conversion.
//!
//! ## Core Concepts
//!
//! - **Unit**: a token from the closed measurement vocabulary (cups, grams,
//!   handfuls, ...), classified as volume, mass, count, or vague
//! - **Quantity**: a parsed amount that can be exact, fractional, or a range
//! - **Vague quantity**: an informal unit requiring a category-sensitive
//!   gram constant instead of arithmetic conversion
//!
//! ## Usage
//!
//! ```rust
//! use larder::units::{Quantity, Unit};
//!
//! let unit = Unit::parse("cups").unwrap();
//! assert!(unit.is_volume());
//!
//! let qty = Quantity::fraction(Some(1), 1, 2);
//! assert_eq!(qty.estimated_value(), Some(1.5));
//! ```

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Measurement units from the closed ingredient-line vocabulary
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Unit {
    // Volume units
    /// Teaspoons
    Teaspoons,
    /// Tablespoons
    Tablespoons,
    /// Fluid ounces
    FluidOunces,
    /// Cups
    Cups,
    /// Pints
    Pints,
    /// Quarts
    Quarts,
    /// Gallons
    Gallons,
    /// Milliliters
    Milliliters,
    /// Centiliters
    Centiliters,
    /// Deciliters
    Deciliters,
    /// Liters
    Liters,

    // Mass units
    /// Milligrams
    Milligrams,
    /// Grams
    Grams,
    /// Kilograms
    Kilograms,
    /// Ounces
    Ounces,
    /// Pounds
    Pounds,

    // Count units
    /// Individual whole items
    Whole,
    /// Cloves (for garlic)
    Cloves,
    /// Slices
    Slices,
    /// Cans
    Cans,
    /// Bottles
    Bottles,
    /// Packets
    Packets,
    /// Bags
    Bags,
    /// Bunches
    Bunches,
    /// Sticks (for butter, celery)
    Sticks,

    // Vague units, converted via category-sensitive constants
    /// Pinches (very small amounts)
    Pinches,
    /// Dashes (small amounts)
    Dashes,
    /// Smidgens (tiny amounts)
    Smidgens,
    /// Handfuls
    Handfuls,
    /// Sprigs (for herbs)
    Sprigs,
    /// Leaves
    Leaves,

    /// Servings — context-dependent, always rejected rather than guessed
    Servings,

    /// Unknown or unspecified unit
    Unknown(String),
}

lazy_static! {
    /// Token → unit lookup covering abbreviations and plural forms
    static ref UNIT_TOKENS: HashMap<&'static str, Unit> = {
        let mut map = HashMap::new();

        // Volume units
        map.insert("tsp", Unit::Teaspoons);
        map.insert("teaspoon", Unit::Teaspoons);
        map.insert("teaspoons", Unit::Teaspoons);
        map.insert("tbsp", Unit::Tablespoons);
        map.insert("tablespoon", Unit::Tablespoons);
        map.insert("tablespoons", Unit::Tablespoons);
        map.insert("cup", Unit::Cups);
        map.insert("cups", Unit::Cups);
        map.insert("fl oz", Unit::FluidOunces);
        map.insert("fluid ounce", Unit::FluidOunces);
        map.insert("fluid ounces", Unit::FluidOunces);
        map.insert("pint", Unit::Pints);
        map.insert("pints", Unit::Pints);
        map.insert("pt", Unit::Pints);
        map.insert("quart", Unit::Quarts);
        map.insert("quarts", Unit::Quarts);
        map.insert("qt", Unit::Quarts);
        map.insert("gallon", Unit::Gallons);
        map.insert("gallons", Unit::Gallons);
        map.insert("gal", Unit::Gallons);
        map.insert("ml", Unit::Milliliters);
        map.insert("milliliter", Unit::Milliliters);
        map.insert("milliliters", Unit::Milliliters);
        map.insert("millilitre", Unit::Milliliters);
        map.insert("millilitres", Unit::Milliliters);
        map.insert("cl", Unit::Centiliters);
        map.insert("dl", Unit::Deciliters);
        map.insert("l", Unit::Liters);
        map.insert("liter", Unit::Liters);
        map.insert("liters", Unit::Liters);
        map.insert("litre", Unit::Liters);
        map.insert("litres", Unit::Liters);

        // Mass units
        map.insert("mg", Unit::Milligrams);
        map.insert("g", Unit::Grams);
        map.insert("gram", Unit::Grams);
        map.insert("grams", Unit::Grams);
        map.insert("gramme", Unit::Grams);
        map.insert("grammes", Unit::Grams);
        map.insert("kg", Unit::Kilograms);
        map.insert("kilogram", Unit::Kilograms);
        map.insert("kilograms", Unit::Kilograms);
        map.insert("oz", Unit::Ounces);
        map.insert("ounce", Unit::Ounces);
        map.insert("ounces", Unit::Ounces);
        map.insert("lb", Unit::Pounds);
        map.insert("lbs", Unit::Pounds);
        map.insert("pound", Unit::Pounds);
        map.insert("pounds", Unit::Pounds);

        // Count units
        map.insert("whole", Unit::Whole);
        map.insert("piece", Unit::Whole);
        map.insert("pieces", Unit::Whole);
        map.insert("clove", Unit::Cloves);
        map.insert("cloves", Unit::Cloves);
        map.insert("slice", Unit::Slices);
        map.insert("slices", Unit::Slices);
        map.insert("can", Unit::Cans);
        map.insert("cans", Unit::Cans);
        map.insert("bottle", Unit::Bottles);
        map.insert("bottles", Unit::Bottles);
        map.insert("packet", Unit::Packets);
        map.insert("packets", Unit::Packets);
        map.insert("pkg", Unit::Packets);
        map.insert("bag", Unit::Bags);
        map.insert("bags", Unit::Bags);
        map.insert("bunch", Unit::Bunches);
        map.insert("bunches", Unit::Bunches);
        map.insert("stick", Unit::Sticks);
        map.insert("sticks", Unit::Sticks);

        // Vague units
        map.insert("pinch", Unit::Pinches);
        map.insert("pinches", Unit::Pinches);
        map.insert("dash", Unit::Dashes);
        map.insert("dashes", Unit::Dashes);
        map.insert("smidgen", Unit::Smidgens);
        map.insert("smidgens", Unit::Smidgens);
        map.insert("handful", Unit::Handfuls);
        map.insert("handfuls", Unit::Handfuls);
        map.insert("sprig", Unit::Sprigs);
        map.insert("sprigs", Unit::Sprigs);
        map.insert("leaf", Unit::Leaves);
        map.insert("leaves", Unit::Leaves);

        map.insert("serving", Unit::Servings);
        map.insert("servings", Unit::Servings);
        map.insert("portion", Unit::Servings);
        map.insert("portions", Unit::Servings);

        map
    };
}

impl Unit {
    /// Parse a unit token from the closed vocabulary
    ///
    /// Returns `None` for tokens that are not measurement units at all,
    /// so callers can treat the token as part of the ingredient name.
    pub fn parse(token: &str) -> Option<Unit> {
        let token = token.trim().trim_end_matches('.').to_lowercase();
        UNIT_TOKENS.get(token.as_str()).cloned()
    }

    /// Get a human-readable string representation of the unit
    pub fn display_name(&self) -> &str {
        match self {
            Unit::Teaspoons => "tsp",
            Unit::Tablespoons => "tbsp",
            Unit::FluidOunces => "fl oz",
            Unit::Cups => "cups",
            Unit::Pints => "pints",
            Unit::Quarts => "quarts",
            Unit::Gallons => "gallons",
            Unit::Milliliters => "ml",
            Unit::Centiliters => "cl",
            Unit::Deciliters => "dl",
            Unit::Liters => "L",
            Unit::Milligrams => "mg",
            Unit::Grams => "g",
            Unit::Kilograms => "kg",
            Unit::Ounces => "oz",
            Unit::Pounds => "lbs",
            Unit::Whole => "whole",
            Unit::Cloves => "cloves",
            Unit::Slices => "slices",
            Unit::Cans => "cans",
            Unit::Bottles => "bottles",
            Unit::Packets => "packets",
            Unit::Bags => "bags",
            Unit::Bunches => "bunches",
            Unit::Sticks => "sticks",
            Unit::Pinches => "pinches",
            Unit::Dashes => "dashes",
            Unit::Smidgens => "smidgens",
            Unit::Handfuls => "handfuls",
            Unit::Sprigs => "sprigs",
            Unit::Leaves => "leaves",
            Unit::Servings => "servings",
            Unit::Unknown(_) => "unknown",
        }
    }

    /// Check if this is a volume unit
    pub fn is_volume(&self) -> bool {
        matches!(
            self,
            Unit::Teaspoons
                | Unit::Tablespoons
                | Unit::FluidOunces
                | Unit::Cups
                | Unit::Pints
                | Unit::Quarts
                | Unit::Gallons
                | Unit::Milliliters
                | Unit::Centiliters
                | Unit::Deciliters
                | Unit::Liters
        )
    }

    /// Check if this is a mass unit
    pub fn is_mass(&self) -> bool {
        matches!(
            self,
            Unit::Milligrams | Unit::Grams | Unit::Kilograms | Unit::Ounces | Unit::Pounds
        )
    }

    /// Check if this is a count unit
    pub fn is_count(&self) -> bool {
        matches!(
            self,
            Unit::Whole
                | Unit::Cloves
                | Unit::Slices
                | Unit::Cans
                | Unit::Bottles
                | Unit::Packets
                | Unit::Bags
                | Unit::Bunches
                | Unit::Sticks
        )
    }

    /// Check if this is a vague unit requiring constant-based conversion
    pub fn is_vague(&self) -> bool {
        matches!(
            self,
            Unit::Pinches
                | Unit::Dashes
                | Unit::Smidgens
                | Unit::Handfuls
                | Unit::Sprigs
                | Unit::Leaves
        )
    }

    /// Milliliters per one of this unit, for volume units
    pub fn to_milliliters(&self) -> Option<f64> {
        match self {
            Unit::Teaspoons => Some(5.0),
            Unit::Tablespoons => Some(15.0),
            Unit::FluidOunces => Some(29.5735),
            Unit::Cups => Some(240.0),
            Unit::Pints => Some(473.176),
            Unit::Quarts => Some(946.353),
            Unit::Gallons => Some(3785.41),
            Unit::Milliliters => Some(1.0),
            Unit::Centiliters => Some(10.0),
            Unit::Deciliters => Some(100.0),
            Unit::Liters => Some(1000.0),
            _ => None,
        }
    }

    /// Key under which an entry's density table stores this unit
    ///
    /// Density tables are keyed by singular tokens ("cup", "bunch",
    /// "leaf"), covering volume, count, and vague units.
    pub fn density_key(&self) -> Option<&'static str> {
        match self {
            Unit::Teaspoons => Some("tsp"),
            Unit::Tablespoons => Some("tbsp"),
            Unit::FluidOunces => Some("fl oz"),
            Unit::Cups => Some("cup"),
            Unit::Pints => Some("pint"),
            Unit::Quarts => Some("quart"),
            Unit::Gallons => Some("gallon"),
            Unit::Milliliters => Some("ml"),
            Unit::Centiliters => Some("cl"),
            Unit::Deciliters => Some("dl"),
            Unit::Liters => Some("l"),
            Unit::Cloves => Some("clove"),
            Unit::Slices => Some("slice"),
            Unit::Cans => Some("can"),
            Unit::Bottles => Some("bottle"),
            Unit::Packets => Some("packet"),
            Unit::Bags => Some("bag"),
            Unit::Bunches => Some("bunch"),
            Unit::Sticks => Some("stick"),
            Unit::Pinches => Some("pinch"),
            Unit::Dashes => Some("dash"),
            Unit::Smidgens => Some("smidgen"),
            Unit::Handfuls => Some("handful"),
            Unit::Sprigs => Some("sprig"),
            Unit::Leaves => Some("leaf"),
            _ => None,
        }
    }

    /// Grams per one of this unit, for mass units
    pub fn to_grams(&self) -> Option<f64> {
        match self {
            Unit::Milligrams => Some(0.001),
            Unit::Grams => Some(1.0),
            Unit::Kilograms => Some(1000.0),
            Unit::Ounces => Some(28.3495),
            Unit::Pounds => Some(453.592),
            _ => None,
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unit::Unknown(token) => write!(f, "{}", token),
            other => write!(f, "{}", other.display_name()),
        }
    }
}

/// A parsed amount with support for exact, fractional, and range formats
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quantity {
    /// The type of quantity measurement
    pub measurement: QuantityType,
}

/// Different types of quantity measurements
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum QuantityType {
    /// Exact amount (e.g., "2", "1.5")
    Exact(f64),

    /// Fractional amount (e.g., "1/2", "2 1/4", "1½")
    Fraction {
        /// Whole number part (optional)
        whole: Option<u32>,
        /// Numerator of the fraction
        numerator: u32,
        /// Denominator of the fraction
        denominator: u32,
    },

    /// Range of amounts (e.g., "2-3"); evaluated at the midpoint
    Range {
        /// Minimum amount
        min: f64,
        /// Maximum amount
        max: f64,
    },
}

impl Quantity {
    /// Create an exact quantity
    pub fn exact(amount: f64) -> Self {
        Self {
            measurement: QuantityType::Exact(amount),
        }
    }

    /// Create a fractional quantity
    pub fn fraction(whole: Option<u32>, numerator: u32, denominator: u32) -> Self {
        Self {
            measurement: QuantityType::Fraction {
                whole,
                numerator,
                denominator,
            },
        }
    }

    /// Create a range quantity
    pub fn range(min: f64, max: f64) -> Self {
        Self {
            measurement: QuantityType::Range { min, max },
        }
    }

    /// Get the numeric value of this quantity
    ///
    /// Fractions evaluate exactly; ranges evaluate to their midpoint.
    /// Returns `None` only for a zero denominator.
    pub fn estimated_value(&self) -> Option<f64> {
        match &self.measurement {
            QuantityType::Exact(amount) => Some(*amount),
            QuantityType::Fraction {
                whole,
                numerator,
                denominator,
            } => {
                if *denominator == 0 {
                    return None;
                }
                let whole_part = whole.unwrap_or(0) as f64;
                Some(whole_part + *numerator as f64 / *denominator as f64)
            }
            QuantityType::Range { min, max } => Some((min + max) / 2.0),
        }
    }

    /// Check if this quantity represents a range
    pub fn is_range(&self) -> bool {
        matches!(self.measurement, QuantityType::Range { .. })
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.measurement {
            QuantityType::Exact(amount) => {
                if amount.fract() == 0.0 {
                    write!(f, "{}", *amount as i64)
                } else {
                    write!(f, "{}", amount)
                }
            }
            QuantityType::Fraction {
                whole,
                numerator,
                denominator,
            } => {
                if let Some(w) = whole {
                    write!(f, "{} {}/{}", w, numerator, denominator)
                } else {
                    write!(f, "{}/{}", numerator, denominator)
                }
            }
            QuantityType::Range { min, max } => write!(f, "{}-{}", min, max),
        }
    }
}

/// Category labels recognized by the vague-quantity and density tables
///
/// These correspond to `tags` values on catalog entries. The first tag on
/// an entry that appears here decides which constant applies.
pub const DENSITY_CATEGORIES: &[&str] = &[
    "oil",
    "herb",
    "herb_leafy",
    "leafy_green",
    "nut",
    "vegetable",
    "cheese",
    "flour",
    "sugar",
    "liquid",
];

/// Approximate grams for one of a vague unit, given an ingredient category
///
/// Constants are intentionally coarse; they exist so a "handful of spinach"
/// becomes a usable number instead of an unmatched line. A pinch is always
/// within (0, 1] grams regardless of category.
pub fn vague_unit_grams(unit: &Unit, category: Option<&str>) -> Option<f64> {
    match unit {
        Unit::Pinches => Some(0.3),
        Unit::Dashes => Some(0.6),
        Unit::Smidgens => Some(0.2),
        Unit::Handfuls => Some(match category {
            Some("herb") | Some("herb_leafy") => 10.0,
            Some("nut") => 25.0,
            Some("leafy_green") => 35.0,
            Some("vegetable") => 40.0,
            _ => 30.0,
        }),
        Unit::Sprigs => Some(match category {
            Some("herb") | Some("herb_leafy") => 2.5,
            _ => 3.0,
        }),
        Unit::Leaves => Some(match category {
            Some("herb") | Some("herb_leafy") => 0.5,
            Some("leafy_green") => 5.0,
            _ => 1.0,
        }),
        _ => None,
    }
}

/// Default grams per cup for a category, used when an entry has no density
pub fn category_density_per_cup(category: &str) -> Option<f64> {
    match category {
        "oil" => Some(216.0),
        "herb" | "herb_leafy" => Some(20.0),
        "leafy_green" => Some(30.0),
        "cheese" => Some(113.0),
        "flour" => Some(125.0),
        "sugar" => Some(200.0),
        "liquid" => Some(240.0),
        "nut" => Some(140.0),
        _ => None,
    }
}
