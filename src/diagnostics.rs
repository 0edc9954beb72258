//! # Diagnostics Report
//!
//! Per-batch accounting of how lines fared: matched/unmatched counts by
//! category, top unmatched identities by frequency, and a priority score
//! to drive catalog expansion. Failing lines never abort a batch; they
//! end up here with enough context to fix by hand or by tooling.

use crate::resolver::UnmatchedReason;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// How many raw examples to keep per unmatched identity
const MAX_EXAMPLES: usize = 5;

/// Aggregated record for one unmatched identity string
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnmatchedRecord {
    pub count: u64,
    pub reason: UnmatchedReason,
    /// A few raw lines that produced this identity
    pub raw_examples: Vec<String>,
}

/// An unmatched identity ranked for catalog expansion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnmatchedSummary {
    pub identity_text: String,
    pub count: u64,
    pub reason: UnmatchedReason,
    /// `frequency * 10` plus bonuses for clean failures and clustering
    pub priority: u64,
    pub raw_examples: Vec<String>,
}

/// Counters and tallies for one batch run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchReport {
    pub total_lines: usize,
    pub matched: usize,
    pub unmatched_malformed: usize,
    pub unmatched_compound: usize,
    pub unmatched_no_candidate: usize,
    pub parse_errors: usize,
    pub conversion_failures: usize,
    pub conversion_warnings: usize,
    pub price_failures: usize,
    unmatched_identities: BTreeMap<String, UnmatchedRecord>,
}

impl BatchReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_line(&mut self) {
        self.total_lines += 1;
    }

    pub fn record_matched(&mut self) {
        self.matched += 1;
    }

    pub fn record_parse_error(&mut self) {
        self.parse_errors += 1;
    }

    pub fn record_conversion_failure(&mut self) {
        self.conversion_failures += 1;
    }

    pub fn record_conversion_warning(&mut self) {
        self.conversion_warnings += 1;
    }

    pub fn record_price_failure(&mut self) {
        self.price_failures += 1;
    }

    /// Tally an unmatched identity with the raw line that produced it
    pub fn record_unmatched(&mut self, identity_text: &str, reason: UnmatchedReason, raw: &str) {
        match reason {
            UnmatchedReason::Malformed => self.unmatched_malformed += 1,
            UnmatchedReason::Compound => self.unmatched_compound += 1,
            UnmatchedReason::NoCandidate => self.unmatched_no_candidate += 1,
        }

        let record = self
            .unmatched_identities
            .entry(identity_text.to_string())
            .or_insert_with(|| UnmatchedRecord {
                count: 0,
                reason,
                raw_examples: Vec::new(),
            });
        record.count += 1;
        let raw = raw.to_string();
        if record.raw_examples.len() < MAX_EXAMPLES && !record.raw_examples.contains(&raw) {
            record.raw_examples.push(raw);
        }
    }

    /// Total unmatched lines across all categories
    pub fn unmatched_total(&self) -> usize {
        self.unmatched_malformed + self.unmatched_compound + self.unmatched_no_candidate
    }

    /// The top-N unmatched identities by expansion priority
    ///
    /// Clean no-candidate failures get a bonus (a new catalog entry fixes
    /// them outright), as do identities seen under several raw spellings
    /// (one entry plus aliases clears the whole cluster).
    pub fn top_unmatched(&self, n: usize) -> Vec<UnmatchedSummary> {
        let mut summaries: Vec<UnmatchedSummary> = self
            .unmatched_identities
            .iter()
            .map(|(identity, record)| {
                let mut priority = record.count * 10;
                if record.reason == UnmatchedReason::NoCandidate {
                    priority += 5;
                }
                if record.raw_examples.len() >= 3 {
                    priority += 3;
                }
                UnmatchedSummary {
                    identity_text: identity.clone(),
                    count: record.count,
                    reason: record.reason,
                    priority,
                    raw_examples: record.raw_examples.clone(),
                }
            })
            .collect();

        summaries.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.identity_text.cmp(&b.identity_text)));
        summaries.truncate(n);
        summaries
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Batch report: {} lines, {} matched, {} unmatched",
            self.total_lines,
            self.matched,
            self.unmatched_total()
        )?;
        writeln!(
            f,
            "  unmatched by category: {} malformed, {} compound, {} no candidate",
            self.unmatched_malformed, self.unmatched_compound, self.unmatched_no_candidate
        )?;
        writeln!(
            f,
            "  {} parse errors, {} conversion failures ({} warnings), {} price failures",
            self.parse_errors,
            self.conversion_failures,
            self.conversion_warnings,
            self.price_failures
        )?;

        let top = self.top_unmatched(10);
        if !top.is_empty() {
            writeln!(f, "Top unmatched identities:")?;
            for summary in top {
                writeln!(
                    f,
                    "  {:>4}  {} ({}x, {})",
                    summary.priority, summary.identity_text, summary.count, summary.reason
                )?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_by_category() {
        let mut report = BatchReport::new();
        report.record_line();
        report.record_matched();
        report.record_line();
        report.record_unmatched("dragonfruit", UnmatchedReason::NoCandidate, "2 dragonfruit");
        report.record_line();
        report.record_unmatched("", UnmatchedReason::Malformed, "12");

        assert_eq!(report.total_lines, 3);
        assert_eq!(report.matched, 1);
        assert_eq!(report.unmatched_total(), 2);
        assert_eq!(report.unmatched_no_candidate, 1);
        assert_eq!(report.unmatched_malformed, 1);
    }

    #[test]
    fn test_priority_favors_frequency() {
        let mut report = BatchReport::new();
        for _ in 0..5 {
            report.record_unmatched("gochujang", UnmatchedReason::NoCandidate, "1 tbsp gochujang");
        }
        report.record_unmatched("dragonfruit", UnmatchedReason::NoCandidate, "2 dragonfruit");

        let top = report.top_unmatched(10);
        assert_eq!(top[0].identity_text, "gochujang");
        assert_eq!(top[0].count, 5);
        assert_eq!(top[0].priority, 55);
        assert_eq!(top[1].priority, 15);
    }

    #[test]
    fn test_clustering_bonus() {
        let mut report = BatchReport::new();
        report.record_unmatched("ghee", UnmatchedReason::NoCandidate, "1 tbsp ghee");
        report.record_unmatched("ghee", UnmatchedReason::NoCandidate, "2 tsp ghee");
        report.record_unmatched("ghee", UnmatchedReason::NoCandidate, "ghee for frying");

        let top = report.top_unmatched(1);
        // 3 hits * 10 + clean 5 + cluster 3
        assert_eq!(top[0].priority, 38);
    }

    #[test]
    fn test_examples_capped_and_deduped() {
        let mut report = BatchReport::new();
        for i in 0..10 {
            report.record_unmatched(
                "ghee",
                UnmatchedReason::NoCandidate,
                &format!("{} tbsp ghee", i),
            );
        }
        report.record_unmatched("ghee", UnmatchedReason::NoCandidate, "0 tbsp ghee");

        let top = report.top_unmatched(1);
        assert_eq!(top[0].count, 11);
        assert_eq!(top[0].raw_examples.len(), MAX_EXAMPLES);
    }

    #[test]
    fn test_report_serializes() {
        let mut report = BatchReport::new();
        report.record_line();
        report.record_unmatched("ghee", UnmatchedReason::NoCandidate, "1 tbsp ghee");
        let json = serde_json::to_string(&report).unwrap();
        let back: BatchReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back.total_lines, 1);
        assert_eq!(back.top_unmatched(1)[0].identity_text, "ghee");
    }
}
