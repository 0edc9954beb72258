//! # Catalog Maintenance Tools
//!
//! Batch utilities that mutate the catalog: duplicate merging, alias
//! expansion, and research-backed backfill of missing nutrition, pricing,
//! and storage data. This module is the only mutation path; the
//! resolution pipeline reads snapshots and never writes.
//!
//! Every tool validates before persisting (a `ValidationError` is fatal
//! to the tool, not to readers of the previous snapshot), writes a full
//! versioned snapshot, and appends to a human-readable change log.

pub mod enrichment;
pub mod merge;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::info;
use std::fmt::Write as _;
use std::path::Path;

/// One line of the human-readable change log
#[derive(Debug, Clone)]
pub struct ChangeLogEntry {
    pub timestamp: DateTime<Utc>,
    pub tool: String,
    pub detail: String,
}

/// Accumulates change records for one maintenance run
#[derive(Debug, Default)]
pub struct ChangeLog {
    entries: Vec<ChangeLogEntry>,
}

impl ChangeLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one change made by `tool`
    pub fn record(&mut self, tool: &str, detail: String) {
        self.entries.push(ChangeLogEntry {
            timestamp: Utc::now(),
            tool: tool.to_string(),
            detail,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[ChangeLogEntry] {
        &self.entries
    }

    /// Append this run's records to the change log file
    pub fn append_to_file(&self, path: &Path) -> Result<()> {
        if self.entries.is_empty() {
            return Ok(());
        }

        let mut text = String::new();
        for entry in &self.entries {
            writeln!(
                text,
                "{} [{}] {}",
                entry.timestamp.format("%Y-%m-%dT%H:%M:%SZ"),
                entry.tool,
                entry.detail
            )
            .expect("writing to a String cannot fail");
        }

        let existing = std::fs::read_to_string(path).unwrap_or_default();
        std::fs::write(path, existing + &text)
            .with_context(|| format!("Failed to append change log {}", path.display()))?;

        info!(
            "Appended {} change log entries to {}",
            self.entries.len(),
            path.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_changelog_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("CHANGELOG.txt");

        let mut log = ChangeLog::new();
        log.record("merge", "absorbed 'coriander-fresh' into 'coriander'".to_string());
        log.append_to_file(&path).unwrap();

        let mut second = ChangeLog::new();
        second.record("backfill", "filled nutrition for 'basil'".to_string());
        second.append_to_file(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("[merge] absorbed"));
        assert!(text.contains("[backfill] filled nutrition"));
        assert_eq!(text.lines().count(), 2);
    }

    #[test]
    fn test_empty_changelog_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("CHANGELOG.txt");
        ChangeLog::new().append_to_file(&path).unwrap();
        assert!(!path.exists());
    }
}
