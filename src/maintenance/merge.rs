//! # Duplicate Merge & Alias Expansion
//!
//! One configurable merge-rule table executed by one idempotent merge
//! function, replacing ad hoc per-script merge heuristics. The rule table
//! is externalized and versioned; re-running the same rules against an
//! already-merged catalog is a no-op.

use crate::catalog::{normalize_key, Catalog, ValidationError};
use crate::maintenance::ChangeLog;
use anyhow::{Context, Result};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Merge directives for one canonical id
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MergeRule {
    /// Ids to absorb into the canonical entry
    #[serde(default)]
    pub absorb: Vec<String>,
    /// Extra aliases to attach to the canonical entry
    #[serde(default)]
    pub add_aliases: Vec<String>,
}

/// Versioned, externalized merge-rule table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeRules {
    #[serde(rename = "_version")]
    pub version: u64,
    /// Canonical id → directives
    pub rules: BTreeMap<String, MergeRule>,
}

impl MergeRules {
    /// Load a rule table document from disk
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read merge rules {}", path.display()))?;
        serde_json::from_str(&data).context("Failed to parse merge rules")
    }
}

/// What a merge run did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeOutcome {
    /// Losing entries removed and folded into their canonical id
    pub absorbed: usize,
    /// Aliases newly attached
    pub aliases_added: usize,
    /// Directives that were already satisfied
    pub skipped: usize,
}

/// Execute a merge-rule table against the catalog
///
/// For each absorbed id: its id, display name, and aliases become aliases
/// of the canonical entry, usage counters are summed, data fields the
/// canonical entry lacks are taken over, and the losing entry is deleted.
/// The catalog is re-validated afterwards; on error the catalog must not
/// be persisted.
pub fn apply_merge_rules(
    catalog: &mut Catalog,
    rules: &MergeRules,
    log: &mut ChangeLog,
) -> Result<MergeOutcome, ValidationError> {
    let mut outcome = MergeOutcome::default();

    for (canonical_id, rule) in &rules.rules {
        if catalog.get(canonical_id).is_none() {
            return Err(ValidationError::MissingEntry {
                id: canonical_id.clone(),
            });
        }

        for loser_id in &rule.absorb {
            if loser_id == canonical_id {
                warn!("Rule for '{}' tries to absorb itself; ignored", canonical_id);
                outcome.skipped += 1;
                continue;
            }

            let loser = match catalog.ingredients.remove(loser_id) {
                Some(loser) => loser,
                None => {
                    // Already absorbed by an earlier run
                    debug!("'{}' already absent; skipping", loser_id);
                    outcome.skipped += 1;
                    continue;
                }
            };

            let winner = catalog
                .ingredients
                .get_mut(canonical_id)
                .expect("canonical presence checked above");

            winner.aliases.insert(loser.id.clone());
            winner.aliases.insert(loser.display_name.clone());
            winner.aliases.extend(loser.aliases.iter().cloned());
            winner.usage_count += loser.usage_count;

            if winner.nutrition.is_none() {
                winner.nutrition = loser.nutrition;
            }
            if winner.pricing.is_none() {
                winner.pricing = loser.pricing;
            }
            if winner.storage.is_none() {
                winner.storage = loser.storage;
            }
            if winner.density.is_none() {
                winner.density = loser.density;
            }
            winner.tags.extend(loser.tags.iter().cloned());

            log.record(
                "merge",
                format!("absorbed '{}' into '{}'", loser_id, canonical_id),
            );
            outcome.absorbed += 1;
        }

        for alias in &rule.add_aliases {
            match add_alias(catalog, canonical_id, alias)? {
                true => {
                    log.record(
                        "merge",
                        format!("added alias '{}' to '{}'", alias, canonical_id),
                    );
                    outcome.aliases_added += 1;
                }
                false => outcome.skipped += 1,
            }
        }
    }

    catalog.total_entries = catalog.ingredients.len();
    catalog.validate()?;

    info!(
        "Merge run: {} absorbed, {} aliases added, {} skipped",
        outcome.absorbed, outcome.aliases_added, outcome.skipped
    );
    Ok(outcome)
}

/// Attach one alias to an entry, enforcing catalog-wide alias uniqueness
///
/// Returns `Ok(false)` when the alias is already in place (idempotent),
/// an error when it belongs to a different entry.
pub fn add_alias(
    catalog: &mut Catalog,
    id: &str,
    alias: &str,
) -> Result<bool, ValidationError> {
    let key = normalize_key(alias);

    for (other_id, entry) in &catalog.ingredients {
        let owns = normalize_key(&entry.display_name) == key
            || entry.aliases.iter().any(|a| normalize_key(a) == key);
        if owns && other_id != id {
            return Err(ValidationError::AliasCollision {
                alias: alias.to_string(),
                first_id: other_id.clone(),
                second_id: id.to_string(),
            });
        }
    }

    let entry = catalog
        .ingredients
        .get_mut(id)
        .ok_or_else(|| ValidationError::MissingEntry { id: id.to_string() })?;

    if normalize_key(&entry.display_name) == key
        || entry.aliases.iter().any(|a| normalize_key(a) == key)
    {
        return Ok(false);
    }

    entry.aliases.insert(alias.to_string());
    Ok(true)
}
