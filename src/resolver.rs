//! # Resolver
//!
//! Matches an identity string against the ingredient catalog. Strategies
//! are tried in order, short-circuiting on the first hit:
//!
//! 1. Exact match against primary keys (case/whitespace-normalized)
//! 2. Alias match against each entry's alias set
//! 3. Fuzzy match by normalized edit-distance similarity, restricted to
//!    the same state bucket when the line's state is known
//! 4. Compound-split retry for lines naming two ingredients ("salt and
//!    pepper"), suppressed when a product keyword indicates the connector
//!    is part of one name ("sweet and sour sauce")
//!
//! Failures are structured, never silent: an unmatched line carries a
//! reason category so diagnostics can drive catalog expansion.

use crate::catalog::{normalize_key, Catalog, IngredientState};
use lazy_static::lazy_static;
use log::{debug, trace};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Confidence assigned to an alias hit
const ALIAS_CONFIDENCE: f64 = 0.9;

/// How a line was matched to a catalog entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MatchMethod {
    Exact,
    Alias,
    Fuzzy,
    CompoundSplit,
}

/// Why a line failed to match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UnmatchedReason {
    /// Empty, numeric-only, or containing "=" / "equivalent"
    Malformed,
    /// A connector was present but a product keyword suppressed the split
    Compound,
    /// Nothing in the catalog came close
    NoCandidate,
}

impl fmt::Display for UnmatchedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnmatchedReason::Malformed => write!(f, "malformed"),
            UnmatchedReason::Compound => write!(f, "compound"),
            UnmatchedReason::NoCandidate => write!(f, "noCandidate"),
        }
    }
}

/// Outcome of resolving one identity string
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ResolutionResult {
    Matched {
        ingredient_id: String,
        /// 1.0 exact, 0.9 alias, similarity score for fuzzy
        confidence: f64,
        matched_via: MatchMethod,
    },
    Unmatched {
        identity_text: String,
        reason: UnmatchedReason,
    },
}

impl ResolutionResult {
    /// True for the `Matched` variant
    pub fn is_matched(&self) -> bool {
        matches!(self, ResolutionResult::Matched { .. })
    }
}

/// Configuration options for resolution
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Minimum normalized similarity for a fuzzy hit
    pub fuzzy_threshold: f64,
    /// Words that mark a connector as part of a single product name
    pub product_keywords: Vec<String>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            fuzzy_threshold: 0.70,
            product_keywords: vec![
                "sauce".to_string(),
                "dressing".to_string(),
                "mix".to_string(),
                "cream".to_string(),
                "soup".to_string(),
                "paste".to_string(),
                "spread".to_string(),
                "blend".to_string(),
                "syrup".to_string(),
            ],
        }
    }
}

lazy_static! {
    /// Lines that are only digits, punctuation, or measure leftovers
    static ref NUMERIC_ONLY: Regex = Regex::new(r"^[\d\s./,\-]+$").unwrap();
}

/// Connector tokens that may join two ingredients in one line
const CONNECTORS: &[&str] = &[" and ", " & ", " or ", " with "];

/// Catalog matcher; builds its lookup indexes once per catalog snapshot
pub struct Resolver<'a> {
    catalog: &'a Catalog,
    config: ResolverConfig,
    /// Normalized primary key → id
    exact_index: HashMap<String, String>,
    /// Normalized alias → id
    alias_index: HashMap<String, String>,
}

impl<'a> Resolver<'a> {
    /// Create a resolver over a validated catalog snapshot
    pub fn new(catalog: &'a Catalog) -> Self {
        Self::with_config(catalog, ResolverConfig::default())
    }

    /// Create a resolver with custom configuration
    pub fn with_config(catalog: &'a Catalog, config: ResolverConfig) -> Self {
        let mut exact_index = HashMap::new();
        let mut alias_index = HashMap::new();

        for (id, entry) in &catalog.ingredients {
            exact_index.insert(normalize_key(id), id.clone());
            exact_index.insert(normalize_key(&entry.display_name), id.clone());
            for alias in &entry.aliases {
                alias_index.insert(normalize_key(alias), id.clone());
            }
        }

        debug!(
            "Resolver indexed {} primary keys and {} aliases",
            exact_index.len(),
            alias_index.len()
        );

        Self {
            catalog,
            config,
            exact_index,
            alias_index,
        }
    }

    /// Resolve an identity string against the catalog
    ///
    /// Usually returns one result; a successful compound split returns one
    /// result per fragment, in line order.
    pub fn resolve(
        &self,
        identity_text: &str,
        state: Option<IngredientState>,
    ) -> Vec<ResolutionResult> {
        let identity = normalize_key(identity_text);

        if is_malformed(&identity) {
            trace!("Identity '{}' judged malformed", identity_text);
            return vec![ResolutionResult::Unmatched {
                identity_text: identity_text.to_string(),
                reason: UnmatchedReason::Malformed,
            }];
        }

        if let Some(result) = self.resolve_single(&identity, state) {
            return vec![result];
        }

        // Compound-split retry: split at the first connector unless a
        // product keyword says the connector is part of one name
        if let Some((left, right)) = split_compound(&identity) {
            if self.contains_product_keyword(&identity) {
                debug!(
                    "Connector present but product keyword suppressed split: '{}'",
                    identity
                );
                return vec![ResolutionResult::Unmatched {
                    identity_text: identity_text.to_string(),
                    reason: UnmatchedReason::Compound,
                }];
            }

            debug!("Compound split '{}' -> '{}' + '{}'", identity, left, right);
            return [left, right]
                .iter()
                .map(|part| match self.resolve_single(part, state) {
                    Some(ResolutionResult::Matched {
                        ingredient_id,
                        confidence,
                        ..
                    }) => ResolutionResult::Matched {
                        ingredient_id,
                        confidence,
                        matched_via: MatchMethod::CompoundSplit,
                    },
                    _ => ResolutionResult::Unmatched {
                        identity_text: part.clone(),
                        reason: UnmatchedReason::NoCandidate,
                    },
                })
                .collect();
        }

        vec![ResolutionResult::Unmatched {
            identity_text: identity_text.to_string(),
            reason: UnmatchedReason::NoCandidate,
        }]
    }

    /// Try exact, alias, then fuzzy for one normalized identity
    fn resolve_single(
        &self,
        identity: &str,
        state: Option<IngredientState>,
    ) -> Option<ResolutionResult> {
        if let Some(id) = self.exact_index.get(identity) {
            trace!("Exact match '{}' -> '{}'", identity, id);
            return Some(ResolutionResult::Matched {
                ingredient_id: id.clone(),
                confidence: 1.0,
                matched_via: MatchMethod::Exact,
            });
        }

        if let Some(id) = self.alias_index.get(identity) {
            trace!("Alias match '{}' -> '{}'", identity, id);
            return Some(ResolutionResult::Matched {
                ingredient_id: id.clone(),
                confidence: ALIAS_CONFIDENCE,
                matched_via: MatchMethod::Alias,
            });
        }

        self.fuzzy_match(identity, state)
    }

    /// Best fuzzy candidate at or above the similarity threshold
    ///
    /// Ties on edit distance fall to the entry with the higher usage
    /// count, preferring common ingredients.
    fn fuzzy_match(
        &self,
        identity: &str,
        state: Option<IngredientState>,
    ) -> Option<ResolutionResult> {
        let mut best: Option<(usize, u64, &str, f64)> = None;

        let candidates = self
            .exact_index
            .iter()
            .chain(self.alias_index.iter());

        for (key, id) in candidates {
            let entry = match self.catalog.get(id) {
                Some(entry) => entry,
                None => continue,
            };
            // When the line declares a state, candidates must share it;
            // cross-state hits match fresh produce to canned synonyms
            if let Some(wanted) = state {
                if entry.state != wanted {
                    continue;
                }
            }

            let similarity = strsim::normalized_levenshtein(identity, key);
            if similarity < self.config.fuzzy_threshold {
                continue;
            }
            let distance = strsim::levenshtein(identity, key);

            let better = match &best {
                None => true,
                Some((best_distance, best_usage, _, _)) => {
                    distance < *best_distance
                        || (distance == *best_distance && entry.usage_count > *best_usage)
                }
            };
            if better {
                best = Some((distance, entry.usage_count, id, similarity));
            }
        }

        best.map(|(distance, _, id, similarity)| {
            debug!(
                "Fuzzy match '{}' -> '{}' (distance {}, similarity {:.2})",
                identity, id, distance, similarity
            );
            ResolutionResult::Matched {
                ingredient_id: id.to_string(),
                confidence: similarity,
                matched_via: MatchMethod::Fuzzy,
            }
        })
    }

    fn contains_product_keyword(&self, identity: &str) -> bool {
        identity
            .split_whitespace()
            .any(|word| self.config.product_keywords.iter().any(|k| k == word))
    }
}

/// Split at the first connector into two identity strings
fn split_compound(identity: &str) -> Option<(String, String)> {
    for connector in CONNECTORS {
        if let Some(pos) = identity.find(connector) {
            let left = identity[..pos].trim().to_string();
            let right = identity[pos + connector.len()..].trim().to_string();
            if !left.is_empty() && !right.is_empty() {
                return Some((left, right));
            }
        }
    }
    None
}

/// Empty, numeric-only, or measurement-algebra leftovers
fn is_malformed(identity: &str) -> bool {
    identity.is_empty()
        || NUMERIC_ONLY.is_match(identity)
        || identity.contains('=')
        || identity.contains("equivalent")
}
