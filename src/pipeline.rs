//! # Resolution Pipeline
//!
//! Glues the stages together: raw line → normalizer → resolver → unit
//! converter, producing one normalized line item per matched ingredient
//! plus a batch diagnostics report. Per-line failures are non-fatal; the
//! failing line is excluded from totals and recorded with enough context
//! to fix later.
//!
//! The shopping-list aggregation at the end consumes the normalized
//! `{ingredient_id, canonical_quantity, unit}` tuples and sums by id;
//! items that could not be converted or priced are carried separately so
//! a consumer can show "couldn't price N items" instead of a wrong total.

use crate::catalog::{CanonicalUnit, Catalog};
use crate::converter;
use crate::diagnostics::BatchReport;
use crate::normalizer::{LineNormalizer, ParsedLine};
use crate::pricing::{self, RetailWeightTable};
use crate::resolver::{MatchMethod, ResolutionResult, Resolver};
use log::{debug, info};
use std::collections::BTreeMap;

/// One matched ingredient from a line, in canonical units where possible
#[derive(Debug, Clone)]
pub struct ResolvedItem {
    pub ingredient_id: String,
    pub confidence: f64,
    pub matched_via: MatchMethod,
    /// Quantity in the entry's canonical unit; `None` when conversion
    /// failed (the failure is recorded in the report and in `note`)
    pub canonical_quantity: Option<f64>,
    pub canonical_unit: Option<CanonicalUnit>,
    pub was_vague_quantity: bool,
    /// Human-readable conversion caveat, if any
    pub note: Option<String>,
}

/// Everything the pipeline produced for one raw line
#[derive(Debug, Clone)]
pub struct LineOutcome {
    pub raw: String,
    /// `None` when the line failed to parse outright (e.g. bare "serving")
    pub parsed: Option<ParsedLine>,
    pub resolutions: Vec<ResolutionResult>,
    pub items: Vec<ResolvedItem>,
}

/// A processed batch: per-line outcomes plus the diagnostics report
#[derive(Debug)]
pub struct BatchRun {
    pub outcomes: Vec<LineOutcome>,
    pub report: BatchReport,
}

/// Process a batch of raw ingredient lines against a catalog snapshot
///
/// The catalog is read-only here; resolution never mutates it.
pub fn process_lines(catalog: &Catalog, lines: &[String]) -> BatchRun {
    let normalizer = LineNormalizer::new();
    let resolver = Resolver::new(catalog);
    let mut report = BatchReport::new();
    let mut outcomes = Vec::with_capacity(lines.len());

    info!("Processing batch of {} lines", lines.len());

    for raw in lines {
        report.record_line();

        let parsed = match normalizer.parse_line(raw) {
            Ok(parsed) => parsed,
            Err(err) => {
                debug!("Parse error for '{}': {}", raw, err);
                report.record_parse_error();
                outcomes.push(LineOutcome {
                    raw: raw.clone(),
                    parsed: None,
                    resolutions: Vec::new(),
                    items: Vec::new(),
                });
                continue;
            }
        };

        let resolutions = resolver.resolve(&parsed.identity_text, parsed.state_hint);
        let mut items = Vec::new();

        for resolution in &resolutions {
            match resolution {
                ResolutionResult::Matched {
                    ingredient_id,
                    confidence,
                    matched_via,
                } => {
                    report.record_matched();
                    let entry = catalog
                        .get(ingredient_id)
                        .expect("resolver only returns catalog ids");

                    let (canonical_quantity, canonical_unit, note) = if parsed.quantity.is_some() {
                        match converter::to_canonical(&parsed, entry) {
                            Ok(converted) => {
                                (Some(converted.value), Some(converted.unit), None)
                            }
                            Err(err) => {
                                if err.is_warning() {
                                    report.record_conversion_warning();
                                } else {
                                    report.record_conversion_failure();
                                }
                                (None, None, Some(err.to_string()))
                            }
                        }
                    } else {
                        // No quantity on the line; nothing to convert
                        (None, None, None)
                    };

                    items.push(ResolvedItem {
                        ingredient_id: ingredient_id.clone(),
                        confidence: *confidence,
                        matched_via: *matched_via,
                        canonical_quantity,
                        canonical_unit,
                        was_vague_quantity: parsed.was_vague_quantity,
                        note,
                    });
                }
                ResolutionResult::Unmatched {
                    identity_text,
                    reason,
                } => {
                    report.record_unmatched(identity_text, *reason, raw);
                }
            }
        }

        outcomes.push(LineOutcome {
            raw: raw.clone(),
            parsed: Some(parsed),
            resolutions,
            items,
        });
    }

    info!(
        "Batch done: {} matched, {} unmatched",
        report.matched,
        report.unmatched_total()
    );

    BatchRun { outcomes, report }
}

/// One aggregated shopping-list position
#[derive(Debug, Clone, PartialEq)]
pub struct ShoppingListEntry {
    pub ingredient_id: String,
    pub quantity: f64,
    pub unit: CanonicalUnit,
    /// `None` when the entry's price could not be normalized; such
    /// entries are excluded from the subtotal and flagged, never zeroed
    pub estimated_cost: Option<f64>,
}

/// Canonical quantities summed by ingredient id, with cost where priceable
#[derive(Debug, Clone)]
pub struct ShoppingList {
    pub entries: BTreeMap<String, ShoppingListEntry>,
    /// Raw lines that produced no usable canonical quantity
    pub flagged: Vec<String>,
    /// Sum over entries with a known cost
    pub subtotal: f64,
    /// Entries whose cost is unknown and excluded from the subtotal
    pub unpriced_count: usize,
}

/// Aggregate a batch into a shopping list
pub fn aggregate_shopping_list(
    run: &BatchRun,
    catalog: &Catalog,
    weight_table: &RetailWeightTable,
) -> ShoppingList {
    let mut entries: BTreeMap<String, ShoppingListEntry> = BTreeMap::new();
    let mut flagged = Vec::new();

    for outcome in &run.outcomes {
        if outcome.parsed.is_none() {
            flagged.push(outcome.raw.clone());
            continue;
        }
        let mut line_contributed = false;

        for item in &outcome.items {
            let (quantity, unit) = match (item.canonical_quantity, item.canonical_unit) {
                (Some(quantity), Some(unit)) => (quantity, unit),
                _ => continue,
            };
            line_contributed = true;

            let slot = entries
                .entry(item.ingredient_id.clone())
                .or_insert_with(|| ShoppingListEntry {
                    ingredient_id: item.ingredient_id.clone(),
                    quantity: 0.0,
                    unit,
                    estimated_cost: None,
                });
            slot.quantity += quantity;
        }

        if !line_contributed {
            flagged.push(outcome.raw.clone());
        }
    }

    let mut subtotal = 0.0;
    let mut unpriced_count = 0;

    for slot in entries.values_mut() {
        let cost = catalog.get(&slot.ingredient_id).and_then(|entry| {
            let normalized = pricing::normalize_price(entry, weight_table).ok()?;
            match slot.unit {
                CanonicalUnit::Grams => normalized
                    .price_per_kg
                    .map(|per_kg| per_kg * slot.quantity / 1000.0),
                CanonicalUnit::Milliliters => normalized
                    .price_per_l
                    .map(|per_l| per_l * slot.quantity / 1000.0),
                // Count items need a per-piece price, which the per-kg/L
                // basis cannot supply
                CanonicalUnit::Whole => None,
            }
        });

        match cost {
            Some(cost) => subtotal += cost,
            None => unpriced_count += 1,
        }
        slot.estimated_cost = cost;
    }

    ShoppingList {
        entries,
        flagged,
        subtotal,
        unpriced_count,
    }
}
