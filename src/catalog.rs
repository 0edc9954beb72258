//! # Ingredient Catalog
//!
//! The canonical ingredient dictionary: entries keyed by a stable id, each
//! carrying display name, canonical unit, density table, aliases, tags,
//! per-100g nutrition, and normalized pricing.
//!
//! The catalog is persisted as a single versioned snapshot document.
//! Every mutation rewrites the whole document and bumps `_version`; the
//! resolution pipeline only ever reads an already-valid snapshot.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::path::Path;

/// Physical range a process yield factor may occupy
pub const YIELD_FACTOR_MIN: f64 = 0.05;
/// Upper bound of the documented yield factor range
pub const YIELD_FACTOR_MAX: f64 = 3.0;
/// Yield factors beyond these are legal but suspicious
pub const YIELD_FACTOR_WARN_LOW: f64 = 0.1;
pub const YIELD_FACTOR_WARN_HIGH: f64 = 2.0;

/// Physical state of a catalog ingredient
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngredientState {
    Fresh,
    Frozen,
    Canned,
    Dried,
    Other,
}

impl Default for IngredientState {
    fn default() -> Self {
        IngredientState::Other
    }
}

/// The unit in which an ingredient's quantities are expressed internally
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CanonicalUnit {
    /// Mass in grams
    #[serde(rename = "g")]
    Grams,
    /// Volume in milliliters
    #[serde(rename = "ml")]
    Milliliters,
    /// Count of whole items
    #[serde(rename = "whole")]
    Whole,
}

impl fmt::Display for CanonicalUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CanonicalUnit::Grams => write!(f, "g"),
            CanonicalUnit::Milliliters => write!(f, "ml"),
            CanonicalUnit::Whole => write!(f, "whole"),
        }
    }
}

/// Per-100g nutrition vector
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NutritionFacts {
    pub calories: f64,
    pub protein: f64,
    pub fat: f64,
    pub carbs: f64,
    pub fiber: f64,
    pub sugar: f64,
    pub saturated_fat: f64,
    pub sodium: f64,
    pub cholesterol: f64,
    /// Vitamin name → amount (units per 100 g, as sourced)
    pub vitamins: BTreeMap<String, f64>,
    /// Mineral name → amount (units per 100 g, as sourced)
    pub minerals: BTreeMap<String, f64>,
}

/// Retail pricing for one catalog entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pricing {
    /// Average observed retail price for one retail unit
    pub average_price: f64,
    /// Retail unit as sold ("kg", "bag", "bunch", ...)
    pub unit: String,
    /// Free-text pack description ("120-150g bag"), if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_size: Option<String>,
    /// Typical weight of one retail unit in grams, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typical_weight_grams: Option<f64>,
    /// Normalized price per kilogram, if derivable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_per_kg: Option<f64>,
    /// Normalized price per liter, if derivable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_per_l: Option<f64>,
    pub currency: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// Shelf-life metadata; carried in the snapshot but unused by the pipeline
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageInfo {
    pub pantry_days: Option<u32>,
    pub fridge_days: Option<u32>,
    pub freezer_days: Option<u32>,
    pub notes: Option<String>,
}

/// One canonical ingredient
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngredientEntry {
    /// Stable unique key; immutable once referenced by recipes
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub state: IngredientState,
    pub canonical_unit: CanonicalUnit,
    /// Volume unit token → grams for one of that unit; absent for
    /// count-based ingredients
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub density: Option<BTreeMap<String, f64>>,
    /// Alternate names; each must map to exactly one id catalog-wide
    #[serde(default)]
    pub aliases: BTreeSet<String>,
    /// Category labels driving fallback density/nutrition/price defaults
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nutrition: Option<NutritionFacts>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pricing: Option<Pricing>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<StorageInfo>,
    /// How often recipes have referenced this entry; used as a fuzzy-match
    /// tie-breaker and by merge tooling
    #[serde(default)]
    pub usage_count: u64,
}

impl IngredientEntry {
    /// Create a new entry with the given id and display name
    pub fn new(id: &str, display_name: &str, canonical_unit: CanonicalUnit) -> Self {
        Self {
            id: id.to_string(),
            display_name: display_name.to_string(),
            state: IngredientState::Other,
            canonical_unit,
            density: None,
            aliases: BTreeSet::new(),
            tags: BTreeSet::new(),
            nutrition: None,
            pricing: None,
            storage: None,
            usage_count: 0,
        }
    }

    /// Set the physical state
    pub fn with_state(mut self, state: IngredientState) -> Self {
        self.state = state;
        self
    }

    /// Set the density table (volume unit token → grams)
    pub fn with_density(mut self, density: BTreeMap<String, f64>) -> Self {
        self.density = Some(density);
        self
    }

    /// Add an alias
    pub fn with_alias(mut self, alias: &str) -> Self {
        self.aliases.insert(alias.to_string());
        self
    }

    /// Add a category tag
    pub fn with_tag(mut self, tag: &str) -> Self {
        self.tags.insert(tag.to_string());
        self
    }

    /// Set per-100g nutrition
    pub fn with_nutrition(mut self, nutrition: NutritionFacts) -> Self {
        self.nutrition = Some(nutrition);
        self
    }

    /// Set retail pricing
    pub fn with_pricing(mut self, pricing: Pricing) -> Self {
        self.pricing = Some(pricing);
        self
    }

    /// First tag recognized by the category tables, if any
    pub fn primary_category(&self) -> Option<&str> {
        self.tags
            .iter()
            .map(String::as_str)
            .find(|t| crate::units::DENSITY_CATEGORIES.contains(t))
    }
}

/// A catalog entry violates a schema invariant
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// The same alias string maps to two different ids
    AliasCollision {
        alias: String,
        first_id: String,
        second_id: String,
    },
    /// A density value is zero or negative
    BadDensity { id: String, unit: String, value: f64 },
    /// Entry has an empty id or display name
    EmptyIdentity { id: String },
    /// A referenced canonical id does not exist (merge rules)
    MissingEntry { id: String },
    /// A yield factor outside the documented physical range
    YieldOutOfRange { method: String, value: f64 },
    /// A process step references a multiplier method that is not defined
    UnknownMultiplierRef { method: String },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::AliasCollision {
                alias,
                first_id,
                second_id,
            } => write!(
                f,
                "alias '{}' maps to both '{}' and '{}'",
                alias, first_id, second_id
            ),
            ValidationError::BadDensity { id, unit, value } => {
                write!(f, "entry '{}' has non-positive density {} for '{}'", id, value, unit)
            }
            ValidationError::EmptyIdentity { id } => {
                write!(f, "entry '{}' has an empty id or display name", id)
            }
            ValidationError::MissingEntry { id } => {
                write!(f, "referenced entry '{}' does not exist", id)
            }
            ValidationError::YieldOutOfRange { method, value } => write!(
                f,
                "process '{}' yield factor {} outside [{}, {}]",
                method, value, YIELD_FACTOR_MIN, YIELD_FACTOR_MAX
            ),
            ValidationError::UnknownMultiplierRef { method } => {
                write!(f, "process references unknown multiplier method '{}'", method)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Non-fatal finding from catalog validation
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationWarning {
    pub id: String,
    pub detail: String,
}

/// The whole-catalog snapshot document
///
/// Unknown fields in the document are tolerated on read (forward
/// compatibility); writers always emit the full document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(rename = "_version")]
    pub version: u64,
    #[serde(rename = "_lastUpdated", default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(rename = "_totalEntries", default)]
    pub total_entries: usize,
    pub ingredients: BTreeMap<String, IngredientEntry>,
}

impl Catalog {
    /// Create an empty catalog at version 1
    pub fn new() -> Self {
        Self {
            version: 1,
            last_updated: None,
            total_entries: 0,
            ingredients: BTreeMap::new(),
        }
    }

    /// Insert an entry, keyed by its id
    pub fn insert(&mut self, entry: IngredientEntry) {
        self.ingredients.insert(entry.id.clone(), entry);
        self.total_entries = self.ingredients.len();
    }

    /// Look up an entry by id
    pub fn get(&self, id: &str) -> Option<&IngredientEntry> {
        self.ingredients.get(id)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.ingredients.len()
    }

    /// True when the catalog holds no entries
    pub fn is_empty(&self) -> bool {
        self.ingredients.is_empty()
    }

    /// Load and validate a snapshot from disk
    ///
    /// Validation failures are fatal here: a pipeline must never run
    /// against a snapshot that violates the schema invariants.
    pub fn load(path: &Path) -> Result<Self> {
        info!("Loading catalog snapshot from {}", path.display());
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read catalog snapshot {}", path.display()))?;
        let catalog: Catalog =
            serde_json::from_str(&data).context("Failed to parse catalog snapshot")?;
        let warnings = catalog
            .validate()
            .context("Catalog snapshot failed validation")?;
        for w in &warnings {
            warn!("Catalog warning for '{}': {}", w.id, w.detail);
        }
        info!(
            "Loaded catalog v{} with {} entries",
            catalog.version,
            catalog.len()
        );
        Ok(catalog)
    }

    /// Persist the full snapshot, bumping the version and stamping the time
    ///
    /// Writes are whole-document; a snapshot on disk is always internally
    /// consistent.
    pub fn save(&mut self, path: &Path) -> Result<()> {
        self.version += 1;
        self.last_updated = Some(Utc::now());
        self.total_entries = self.ingredients.len();
        let data = serde_json::to_string_pretty(self).context("Failed to serialize catalog")?;
        std::fs::write(path, data)
            .with_context(|| format!("Failed to write catalog snapshot {}", path.display()))?;
        info!(
            "Wrote catalog snapshot v{} ({} entries) to {}",
            self.version,
            self.len(),
            path.display()
        );
        Ok(())
    }

    /// Check the schema invariants across the whole catalog
    ///
    /// Returns warnings for borderline data; errors for violations that
    /// would corrupt resolution (alias collisions, bad densities).
    pub fn validate(&self) -> Result<Vec<ValidationWarning>, ValidationError> {
        let mut warnings = Vec::new();
        let mut alias_owner: HashMap<String, &str> = HashMap::new();

        for (id, entry) in &self.ingredients {
            if id.trim().is_empty() || entry.display_name.trim().is_empty() {
                return Err(ValidationError::EmptyIdentity { id: id.clone() });
            }

            // An entry's own normalized name participates in alias-space
            let own_key = normalize_key(&entry.display_name);
            if let Some(&owner) = alias_owner.get(&own_key) {
                if owner != id.as_str() {
                    return Err(ValidationError::AliasCollision {
                        alias: entry.display_name.clone(),
                        first_id: owner.to_string(),
                        second_id: id.clone(),
                    });
                }
            }
            alias_owner.insert(own_key, id);

            for alias in &entry.aliases {
                let key = normalize_key(alias);
                if let Some(&owner) = alias_owner.get(&key) {
                    if owner != id.as_str() {
                        return Err(ValidationError::AliasCollision {
                            alias: alias.clone(),
                            first_id: owner.to_string(),
                            second_id: id.clone(),
                        });
                    }
                }
                alias_owner.insert(key, id);
            }

            if let Some(density) = &entry.density {
                for (unit, value) in density {
                    if *value <= 0.0 {
                        return Err(ValidationError::BadDensity {
                            id: id.clone(),
                            unit: unit.clone(),
                            value: *value,
                        });
                    }
                }
                if entry.canonical_unit == CanonicalUnit::Whole {
                    warnings.push(ValidationWarning {
                        id: id.clone(),
                        detail: "density table on a count-based ingredient".to_string(),
                    });
                }
            }

            if entry.canonical_unit == CanonicalUnit::Grams
                && entry.density.is_none()
                && entry.primary_category().is_none()
            {
                debug!(
                    "Entry '{}' has no density and no category fallback; volume lines will not convert",
                    id
                );
            }
        }

        Ok(warnings)
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}

/// Normalize a name or alias for use as a matching key
///
/// Lowercases and collapses interior whitespace. All exact and alias
/// matching goes through this, so "Olive  Oil" and "olive oil" meet.
pub fn normalize_key(text: &str) -> String {
    text.trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<&str>>()
        .join(" ")
}
