//! # Nutrition Chain Calculator
//!
//! Propagates nutrition through an ordered list of cooking processes.
//! Each step applies a yield factor to the current mass (water loss or
//! gain) and a per-nutrient multiplier set to the composition. A full
//! before/after snapshot is recorded per step: a single mis-ordered or
//! duplicated step silently compounds errors, and the trace is the only
//! way to catch that in testing.
//!
//! All scaling is linear `f64` arithmetic; nothing is rounded until
//! display.

use crate::catalog::{
    NutritionFacts, ValidationError, ValidationWarning, YIELD_FACTOR_MAX, YIELD_FACTOR_MIN,
    YIELD_FACTOR_WARN_HIGH, YIELD_FACTOR_WARN_LOW,
};
use anyhow::{Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// The multiplier reference that leaves composition unchanged
pub const RAW_METHOD: &str = "raw";

impl NutritionFacts {
    /// Multiply every field, including vitamins and minerals, by `factor`
    pub fn scaled(&self, factor: f64) -> NutritionFacts {
        let mut out = self.clone();
        out.calories *= factor;
        out.protein *= factor;
        out.fat *= factor;
        out.carbs *= factor;
        out.fiber *= factor;
        out.sugar *= factor;
        out.saturated_fat *= factor;
        out.sodium *= factor;
        out.cholesterol *= factor;
        for value in out.vitamins.values_mut() {
            *value *= factor;
        }
        for value in out.minerals.values_mut() {
            *value *= factor;
        }
        out
    }

    /// Mutable access to a named field, macro or vitamin/mineral
    fn field_mut(&mut self, name: &str) -> Option<&mut f64> {
        match name {
            "calories" => Some(&mut self.calories),
            "protein" => Some(&mut self.protein),
            "fat" => Some(&mut self.fat),
            "carbs" => Some(&mut self.carbs),
            "fiber" => Some(&mut self.fiber),
            "sugar" => Some(&mut self.sugar),
            "saturated_fat" => Some(&mut self.saturated_fat),
            "sodium" => Some(&mut self.sodium),
            "cholesterol" => Some(&mut self.cholesterol),
            other => self
                .vitamins
                .get_mut(other)
                .or_else(|| self.minerals.get_mut(other)),
        }
    }

    /// Apply a multiplier set; fields absent from the set are unchanged
    pub fn apply_multipliers(&mut self, multipliers: &BTreeMap<String, f64>) {
        for (field, factor) in multipliers {
            if let Some(value) = self.field_mut(field) {
                *value *= factor;
            }
        }
    }
}

/// Multipliers for one cooking method
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MethodMultipliers {
    /// Nutrient field → composition factor
    #[serde(default)]
    pub multipliers: BTreeMap<String, f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Versioned lookup of cooking-method nutrition multipliers
///
/// Consumed read-only by the chain calculator; maintained externally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultiplierTable {
    #[serde(rename = "_version")]
    pub version: u64,
    pub methods: BTreeMap<String, MethodMultipliers>,
}

impl MultiplierTable {
    /// Built-in defaults covering common cooking methods
    pub fn builtin() -> Self {
        let mut methods = BTreeMap::new();

        methods.insert(RAW_METHOD.to_string(), MethodMultipliers::default());

        let mut grilled = BTreeMap::new();
        grilled.insert("fat".to_string(), 0.85);
        grilled.insert("vitamin_c".to_string(), 0.75);
        grilled.insert("vitamin_b1".to_string(), 0.8);
        methods.insert(
            "grilled".to_string(),
            MethodMultipliers {
                multipliers: grilled,
                notes: Some("fat drip loss, heat-sensitive vitamin loss".to_string()),
            },
        );

        let mut boiled = BTreeMap::new();
        boiled.insert("vitamin_c".to_string(), 0.5);
        boiled.insert("vitamin_b1".to_string(), 0.6);
        boiled.insert("sodium".to_string(), 0.9);
        boiled.insert("potassium".to_string(), 0.7);
        methods.insert(
            "boiled".to_string(),
            MethodMultipliers {
                multipliers: boiled,
                notes: Some("water-soluble nutrients leach into cooking water".to_string()),
            },
        );

        let mut steamed = BTreeMap::new();
        steamed.insert("vitamin_c".to_string(), 0.85);
        methods.insert(
            "steamed".to_string(),
            MethodMultipliers {
                multipliers: steamed,
                notes: None,
            },
        );

        let mut fried = BTreeMap::new();
        fried.insert("fat".to_string(), 1.6);
        fried.insert("calories".to_string(), 1.3);
        fried.insert("vitamin_c".to_string(), 0.7);
        methods.insert(
            "fried".to_string(),
            MethodMultipliers {
                multipliers: fried,
                notes: Some("absorbed cooking oil".to_string()),
            },
        );

        let mut roasted = BTreeMap::new();
        roasted.insert("vitamin_c".to_string(), 0.8);
        roasted.insert("vitamin_b1".to_string(), 0.85);
        methods.insert(
            "roasted".to_string(),
            MethodMultipliers {
                multipliers: roasted,
                notes: None,
            },
        );

        Self {
            version: 1,
            methods,
        }
    }

    /// Load a multiplier table document from disk
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read multiplier table {}", path.display()))?;
        serde_json::from_str(&data).context("Failed to parse multiplier table")
    }

    /// Look up a method's multipliers
    pub fn get(&self, method: &str) -> Option<&MethodMultipliers> {
        self.methods.get(method)
    }
}

/// One cooking transformation applied in sequence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessStep {
    /// Key into the multiplier table ("raw", "grilled", ...)
    pub method: String,
    /// Mass multiplier modelling water loss or gain
    pub yield_factor: f64,
    /// Per-ingredient yield overrides, keyed by ingredient id
    #[serde(default)]
    pub yield_overrides: BTreeMap<String, f64>,
}

impl ProcessStep {
    /// A step with no overrides
    pub fn new(method: &str, yield_factor: f64) -> Self {
        Self {
            method: method.to_string(),
            yield_factor,
            yield_overrides: BTreeMap::new(),
        }
    }

    fn yield_for(&self, ingredient_id: &str) -> f64 {
        self.yield_overrides
            .get(ingredient_id)
            .copied()
            .unwrap_or(self.yield_factor)
    }
}

/// Validate steps against the physical yield range and the table
///
/// Out-of-range yields are errors; extreme-but-legal ones are warnings.
/// A step naming a method the table does not define is an error: running
/// it would silently skip the composition change.
pub fn validate_steps(
    steps: &[ProcessStep],
    table: &MultiplierTable,
) -> Result<Vec<ValidationWarning>, ValidationError> {
    let mut warnings = Vec::new();

    for step in steps {
        let mut yields = vec![step.yield_factor];
        yields.extend(step.yield_overrides.values().copied());

        for value in yields {
            if !(YIELD_FACTOR_MIN..=YIELD_FACTOR_MAX).contains(&value) {
                return Err(ValidationError::YieldOutOfRange {
                    method: step.method.clone(),
                    value,
                });
            }
            if !(YIELD_FACTOR_WARN_LOW..=YIELD_FACTOR_WARN_HIGH).contains(&value) {
                warnings.push(ValidationWarning {
                    id: step.method.clone(),
                    detail: format!("yield factor {} is near the physical limit", value),
                });
            }
        }

        if table.get(&step.method).is_none() {
            return Err(ValidationError::UnknownMultiplierRef {
                method: step.method.clone(),
            });
        }
    }

    Ok(warnings)
}

/// Before/after snapshot of one chain step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepTrace {
    pub method: String,
    pub yield_applied: f64,
    pub mass_before: f64,
    pub mass_after: f64,
    pub nutrition_before: NutritionFacts,
    pub nutrition_after: NutritionFacts,
}

/// Final nutrition, final mass, and the full per-step audit trace
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainResult {
    pub initial_mass_g: f64,
    pub final_mass_g: f64,
    pub nutrition: NutritionFacts,
    pub trace: Vec<StepTrace>,
}

impl ChainResult {
    /// Re-express the final nutrition per 100 g of the final mass, for
    /// comparison against reference values
    pub fn per_100g_of_final(&self) -> NutritionFacts {
        if self.final_mass_g <= 0.0 {
            return NutritionFacts::default();
        }
        self.nutrition.scaled(100.0 / self.final_mass_g)
    }
}

/// Apply an ordered process chain to a canonical quantity of an ingredient
///
/// Starts from the per-100g base scaled to `quantity_g`, then per step:
/// mass is multiplied by the yield factor (per-ingredient override first),
/// and composition by the method's multipliers ("raw" is the identity).
pub fn apply_chain(
    ingredient_id: &str,
    per_100g: &NutritionFacts,
    quantity_g: f64,
    steps: &[ProcessStep],
    table: &MultiplierTable,
) -> Result<ChainResult, ValidationError> {
    validate_steps(steps, table)?;

    let mut nutrition = per_100g.scaled(quantity_g / 100.0);
    let mut mass = quantity_g;
    let mut trace = Vec::with_capacity(steps.len());

    for step in steps {
        let yield_applied = step.yield_for(ingredient_id);
        let mass_before = mass;
        let nutrition_before = nutrition.clone();

        mass *= yield_applied;

        if step.method != RAW_METHOD {
            // Presence already validated
            if let Some(method) = table.get(&step.method) {
                nutrition.apply_multipliers(&method.multipliers);
            }
        }

        debug!(
            "Step '{}' on '{}': mass {} -> {}",
            step.method, ingredient_id, mass_before, mass
        );

        trace.push(StepTrace {
            method: step.method.clone(),
            yield_applied,
            mass_before,
            mass_after: mass,
            nutrition_before,
            nutrition_after: nutrition.clone(),
        });
    }

    info!(
        "Applied {}-step chain to '{}': {} g -> {} g",
        steps.len(),
        ingredient_id,
        quantity_g,
        mass
    );

    Ok(ChainResult {
        initial_mass_g: quantity_g,
        final_mass_g: mass,
        nutrition,
        trace,
    })
}
