//! # Research Backfill
//!
//! Resumable batch jobs that fill missing nutrition, pricing, or storage
//! data from an external research collaborator. Calls are rate-limited
//! with a fixed inter-call delay and retried with jittered backoff; the
//! run checkpoints a full catalog snapshot every N processed entries, so
//! a crash or quota exhaustion loses at most one checkpoint interval.
//!
//! Backfill is idempotent: entries that already carry the field are
//! skipped, which is also what makes a rerun resume where the last
//! checkpoint left off. With more than one worker, results for a
//! checkpoint interval are merged into the catalog only after every
//! worker for that interval has finished; the shared catalog never sees
//! interleaved partial writes.

use crate::catalog::{Catalog, IngredientEntry, NutritionFacts, Pricing, StorageInfo};
use crate::maintenance::ChangeLog;
use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, info, warn};
use rand::Rng;
use serde::Deserialize;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;

/// Which optional field a backfill run fills
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackfillField {
    Nutrition,
    Pricing,
    Storage,
}

impl BackfillField {
    fn name(self) -> &'static str {
        match self {
            BackfillField::Nutrition => "nutrition",
            BackfillField::Pricing => "pricing",
            BackfillField::Storage => "storage",
        }
    }

    fn is_present(self, entry: &IngredientEntry) -> bool {
        match self {
            BackfillField::Nutrition => entry.nutrition.is_some(),
            BackfillField::Pricing => entry.pricing.is_some(),
            BackfillField::Storage => entry.storage.is_some(),
        }
    }
}

impl fmt::Display for BackfillField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for BackfillField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "nutrition" => Ok(BackfillField::Nutrition),
            "pricing" => Ok(BackfillField::Pricing),
            "storage" => Ok(BackfillField::Storage),
            other => Err(format!("unknown backfill field '{}'", other)),
        }
    }
}

/// One researched value, matching the requested field
#[derive(Debug, Clone)]
pub enum ResearchFinding {
    Nutrition(NutritionFacts),
    Pricing(Pricing),
    Storage(StorageInfo),
}

/// Errors from the research collaborator
#[derive(Debug)]
pub enum ResearchError {
    Http(String),
    InvalidResponse(String),
}

impl fmt::Display for ResearchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResearchError::Http(detail) => write!(f, "research request failed: {}", detail),
            ResearchError::InvalidResponse(detail) => {
                write!(f, "research response invalid: {}", detail)
            }
        }
    }
}

impl std::error::Error for ResearchError {}

/// An external service that can research missing ingredient data
#[async_trait]
pub trait ResearchProvider: Send + Sync {
    async fn research(
        &self,
        entry: &IngredientEntry,
        field: BackfillField,
    ) -> Result<ResearchFinding, ResearchError>;
}

#[derive(Debug, Deserialize)]
struct ResearchResponse {
    nutrition: Option<NutritionFacts>,
    pricing: Option<Pricing>,
    storage: Option<StorageInfo>,
}

/// HTTP-backed research collaborator
pub struct HttpResearchProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpResearchProvider {
    pub fn new(base_url: &str, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }
}

#[async_trait]
impl ResearchProvider for HttpResearchProvider {
    async fn research(
        &self,
        entry: &IngredientEntry,
        field: BackfillField,
    ) -> Result<ResearchFinding, ResearchError> {
        let url = format!("{}/research", self.base_url);
        let mut request = self.client.post(&url).json(&serde_json::json!({
            "id": entry.id,
            "display_name": entry.display_name,
            "tags": entry.tags,
            "field": field.name(),
        }));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ResearchError::Http(e.to_string()))?;
        if !response.status().is_success() {
            return Err(ResearchError::Http(format!(
                "status {} for '{}'",
                response.status(),
                entry.id
            )));
        }

        let body: ResearchResponse = response
            .json()
            .await
            .map_err(|e| ResearchError::InvalidResponse(e.to_string()))?;

        match field {
            BackfillField::Nutrition => body.nutrition.map(ResearchFinding::Nutrition),
            BackfillField::Pricing => body.pricing.map(ResearchFinding::Pricing),
            BackfillField::Storage => body.storage.map(ResearchFinding::Storage),
        }
        .ok_or_else(|| {
            ResearchError::InvalidResponse(format!("no {} in response for '{}'", field, entry.id))
        })
    }
}

/// Rate limiting, retry, and checkpoint settings for a backfill run
#[derive(Debug, Clone)]
pub struct BackfillConfig {
    /// Snapshot the catalog after this many processed entries
    pub checkpoint_every: usize,
    /// Fixed delay between consecutive research calls, per worker
    pub call_delay_ms: u64,
    /// Maximum retry attempts per entry
    pub max_retries: u32,
    /// Base delay between retries in milliseconds
    pub base_retry_delay_ms: u64,
    /// Maximum delay between retries in milliseconds
    pub max_retry_delay_ms: u64,
    /// Concurrent research workers per checkpoint interval
    pub workers: usize,
}

impl Default for BackfillConfig {
    fn default() -> Self {
        Self {
            checkpoint_every: 25,
            call_delay_ms: 500,
            max_retries: 3,
            base_retry_delay_ms: 1000,
            max_retry_delay_ms: 10000,
            workers: 1,
        }
    }
}

/// Tallies from one backfill run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BackfillSummary {
    /// Entries sent to the research provider
    pub processed: usize,
    /// Entries whose field was filled
    pub filled: usize,
    /// Entries skipped because the field was already present
    pub skipped: usize,
    /// Entries that failed after all retries
    pub failed: usize,
    /// Snapshots written
    pub checkpoints: usize,
    /// True when the run was cancelled before finishing
    pub cancelled: bool,
}

/// Drives a resumable backfill over the catalog
pub struct BackfillRunner {
    provider: Arc<dyn ResearchProvider>,
    config: BackfillConfig,
}

impl BackfillRunner {
    pub fn new(provider: Arc<dyn ResearchProvider>, config: BackfillConfig) -> Self {
        Self { provider, config }
    }

    /// Fill `field` for every entry that lacks it
    ///
    /// Cancellation is cooperative: the flag is checked between entries
    /// and between checkpoint intervals, and a cancelled run still writes
    /// its last completed interval.
    pub async fn run(
        &self,
        catalog: &mut Catalog,
        field: BackfillField,
        snapshot_path: &Path,
        log: &mut ChangeLog,
        cancel: &AtomicBool,
    ) -> Result<BackfillSummary> {
        let mut summary = BackfillSummary::default();

        let pending: Vec<String> = catalog
            .ingredients
            .iter()
            .filter(|(_, entry)| !field.is_present(entry))
            .map(|(id, _)| id.clone())
            .collect();
        summary.skipped = catalog.len() - pending.len();

        info!(
            "Backfill {}: {} entries pending, {} already filled",
            field,
            pending.len(),
            summary.skipped
        );

        let interval_size = self.config.checkpoint_every.max(1);
        for interval in pending.chunks(interval_size) {
            if cancel.load(Ordering::Relaxed) {
                summary.cancelled = true;
                break;
            }

            let results = if self.config.workers > 1 {
                self.research_interval_pooled(catalog, interval, field, cancel)
                    .await
            } else {
                self.research_interval_sequential(catalog, interval, field, cancel)
                    .await
            };

            // Merge the whole interval's results at once, then checkpoint
            let mut interval_filled = 0;
            for (id, outcome) in results {
                summary.processed += 1;
                match outcome {
                    Ok(finding) => {
                        if let Some(entry) = catalog.ingredients.get_mut(&id) {
                            apply_finding(entry, finding);
                            log.record("backfill", format!("filled {} for '{}'", field, id));
                            interval_filled += 1;
                        }
                    }
                    Err(err) => {
                        warn!("Backfill failed for '{}': {}", id, err);
                        summary.failed += 1;
                    }
                }
            }
            summary.filled += interval_filled;

            if interval_filled > 0 {
                catalog
                    .save(snapshot_path)
                    .context("Failed to write checkpoint snapshot")?;
                summary.checkpoints += 1;
                debug!(
                    "Checkpoint {} written after {} filled entries",
                    summary.checkpoints, summary.filled
                );
            }

            if cancel.load(Ordering::Relaxed) {
                summary.cancelled = true;
                break;
            }
        }

        info!(
            "Backfill {} finished: {} filled, {} failed, {} skipped, {} checkpoints{}",
            field,
            summary.filled,
            summary.failed,
            summary.skipped,
            summary.checkpoints,
            if summary.cancelled { " (cancelled)" } else { "" }
        );
        Ok(summary)
    }

    /// One entry at a time with a fixed delay between calls
    async fn research_interval_sequential(
        &self,
        catalog: &Catalog,
        interval: &[String],
        field: BackfillField,
        cancel: &AtomicBool,
    ) -> Vec<(String, Result<ResearchFinding, ResearchError>)> {
        let mut results = Vec::with_capacity(interval.len());

        for (i, id) in interval.iter().enumerate() {
            if cancel.load(Ordering::Relaxed) {
                break;
            }
            let entry = match catalog.get(id) {
                Some(entry) => entry.clone(),
                None => continue,
            };

            if i > 0 {
                tokio::time::sleep(Duration::from_millis(self.config.call_delay_ms)).await;
            }

            let outcome = self.research_with_retry(&entry, field).await;
            results.push((id.clone(), outcome));
        }

        results
    }

    /// Bounded worker pool; all workers finish before the caller merges
    async fn research_interval_pooled(
        &self,
        catalog: &Catalog,
        interval: &[String],
        field: BackfillField,
        cancel: &AtomicBool,
    ) -> Vec<(String, Result<ResearchFinding, ResearchError>)> {
        let mut results = Vec::with_capacity(interval.len());
        let mut queue: std::collections::VecDeque<(String, IngredientEntry)> = interval
            .iter()
            .filter_map(|id| catalog.get(id).map(|e| (id.clone(), e.clone())))
            .collect();

        let mut pool: JoinSet<(String, Result<ResearchFinding, ResearchError>)> = JoinSet::new();

        loop {
            while pool.len() < self.config.workers && !cancel.load(Ordering::Relaxed) {
                let (id, entry) = match queue.pop_front() {
                    Some(next) => next,
                    None => break,
                };
                let provider = Arc::clone(&self.provider);
                let config = self.config.clone();
                pool.spawn(async move {
                    let outcome =
                        research_with_retry_inner(provider.as_ref(), &entry, field, &config).await;
                    tokio::time::sleep(Duration::from_millis(config.call_delay_ms)).await;
                    (id, outcome)
                });
            }

            match pool.join_next().await {
                Some(Ok(result)) => results.push(result),
                Some(Err(join_err)) => warn!("Backfill worker panicked: {}", join_err),
                None => break,
            }
        }

        results
    }

    async fn research_with_retry(
        &self,
        entry: &IngredientEntry,
        field: BackfillField,
    ) -> Result<ResearchFinding, ResearchError> {
        research_with_retry_inner(self.provider.as_ref(), entry, field, &self.config).await
    }
}

/// Retry with exponential backoff and random jitter
async fn research_with_retry_inner(
    provider: &dyn ResearchProvider,
    entry: &IngredientEntry,
    field: BackfillField,
    config: &BackfillConfig,
) -> Result<ResearchFinding, ResearchError> {
    let mut attempt: u32 = 0;
    loop {
        match provider.research(entry, field).await {
            Ok(finding) => return Ok(finding),
            Err(err) => {
                attempt += 1;
                if attempt > config.max_retries {
                    return Err(err);
                }
                let backoff = config
                    .base_retry_delay_ms
                    .saturating_mul(1 << (attempt - 1))
                    .min(config.max_retry_delay_ms);
                let jitter = {
                    let mut rng = rand::thread_rng();
                    rng.gen_range(0..=backoff / 4)
                };
                debug!(
                    "Retry {}/{} for '{}' in {} ms",
                    attempt,
                    config.max_retries,
                    entry.id,
                    backoff + jitter
                );
                tokio::time::sleep(Duration::from_millis(backoff + jitter)).await;
            }
        }
    }
}

fn apply_finding(entry: &mut IngredientEntry, finding: ResearchFinding) {
    match finding {
        ResearchFinding::Nutrition(nutrition) => entry.nutrition = Some(nutrition),
        ResearchFinding::Pricing(pricing) => entry.pricing = Some(pricing),
        ResearchFinding::Storage(storage) => entry.storage = Some(storage),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CanonicalUnit;
    use std::sync::Mutex;

    /// Scripted provider: succeeds for listed ids, fails for the rest
    struct ScriptedProvider {
        fail_ids: Vec<String>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedProvider {
        fn new(fail_ids: &[&str]) -> Self {
            Self {
                fail_ids: fail_ids.iter().map(|s| s.to_string()).collect(),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ResearchProvider for ScriptedProvider {
        async fn research(
            &self,
            entry: &IngredientEntry,
            _field: BackfillField,
        ) -> Result<ResearchFinding, ResearchError> {
            self.calls.lock().unwrap().push(entry.id.clone());
            if self.fail_ids.contains(&entry.id) {
                return Err(ResearchError::Http("scripted failure".to_string()));
            }
            Ok(ResearchFinding::Nutrition(NutritionFacts {
                calories: 42.0,
                ..Default::default()
            }))
        }
    }

    fn fast_config() -> BackfillConfig {
        BackfillConfig {
            checkpoint_every: 2,
            call_delay_ms: 0,
            max_retries: 1,
            base_retry_delay_ms: 1,
            max_retry_delay_ms: 2,
            workers: 1,
        }
    }

    fn catalog_with(ids: &[&str]) -> Catalog {
        let mut catalog = Catalog::new();
        for id in ids {
            catalog.insert(IngredientEntry::new(id, id, CanonicalUnit::Grams));
        }
        catalog
    }

    #[tokio::test]
    async fn test_backfill_fills_missing_and_checkpoints() {
        let mut catalog = catalog_with(&["basil", "mint", "sage"]);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        let mut log = ChangeLog::new();

        let runner = BackfillRunner::new(Arc::new(ScriptedProvider::new(&[])), fast_config());
        let summary = runner
            .run(
                &mut catalog,
                BackfillField::Nutrition,
                &path,
                &mut log,
                &AtomicBool::new(false),
            )
            .await
            .unwrap();

        assert_eq!(summary.filled, 3);
        assert_eq!(summary.failed, 0);
        // 3 entries at 2 per interval: two checkpoint writes
        assert_eq!(summary.checkpoints, 2);
        assert!(catalog.get("sage").unwrap().nutrition.is_some());
        assert_eq!(log.len(), 3);

        // The snapshot on disk reflects the finished run
        let reloaded = Catalog::load(&path).unwrap();
        assert!(reloaded.get("basil").unwrap().nutrition.is_some());
    }

    #[tokio::test]
    async fn test_backfill_is_idempotent() {
        let mut catalog = catalog_with(&["basil", "mint"]);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");

        let provider = Arc::new(ScriptedProvider::new(&[]));
        let runner = BackfillRunner::new(Arc::clone(&provider) as Arc<dyn ResearchProvider>, fast_config());

        let mut log = ChangeLog::new();
        runner
            .run(&mut catalog, BackfillField::Nutrition, &path, &mut log, &AtomicBool::new(false))
            .await
            .unwrap();

        let mut log = ChangeLog::new();
        let second = runner
            .run(&mut catalog, BackfillField::Nutrition, &path, &mut log, &AtomicBool::new(false))
            .await
            .unwrap();

        // Everything already filled: no calls, no snapshots
        assert_eq!(second.processed, 0);
        assert_eq!(second.skipped, 2);
        assert_eq!(second.checkpoints, 0);
        assert_eq!(provider.calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_backfill_failure_is_per_entry() {
        let mut catalog = catalog_with(&["basil", "mint"]);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        let mut log = ChangeLog::new();

        let runner =
            BackfillRunner::new(Arc::new(ScriptedProvider::new(&["mint"])), fast_config());
        let summary = runner
            .run(
                &mut catalog,
                BackfillField::Nutrition,
                &path,
                &mut log,
                &AtomicBool::new(false),
            )
            .await
            .unwrap();

        assert_eq!(summary.filled, 1);
        assert_eq!(summary.failed, 1);
        assert!(catalog.get("basil").unwrap().nutrition.is_some());
        assert!(catalog.get("mint").unwrap().nutrition.is_none());
    }

    #[tokio::test]
    async fn test_cancellation_stops_before_next_interval() {
        let mut catalog = catalog_with(&["basil", "mint", "sage", "thyme"]);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        let mut log = ChangeLog::new();

        let cancel = AtomicBool::new(true);
        let runner = BackfillRunner::new(Arc::new(ScriptedProvider::new(&[])), fast_config());
        let summary = runner
            .run(&mut catalog, BackfillField::Nutrition, &path, &mut log, &cancel)
            .await
            .unwrap();

        assert!(summary.cancelled);
        assert_eq!(summary.processed, 0);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_worker_pool_merges_per_interval() {
        let mut catalog = catalog_with(&["basil", "mint", "sage", "thyme", "dill"]);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        let mut log = ChangeLog::new();

        let config = BackfillConfig {
            workers: 3,
            checkpoint_every: 5,
            ..fast_config()
        };
        let runner = BackfillRunner::new(Arc::new(ScriptedProvider::new(&[])), config);
        let summary = runner
            .run(
                &mut catalog,
                BackfillField::Nutrition,
                &path,
                &mut log,
                &AtomicBool::new(false),
            )
            .await
            .unwrap();

        assert_eq!(summary.filled, 5);
        // One interval, one snapshot after all workers finished
        assert_eq!(summary.checkpoints, 1);
    }

    #[tokio::test]
    async fn test_retry_then_success() {
        /// Fails the first call for an id, succeeds afterwards
        struct FlakyProvider {
            seen: Mutex<Vec<String>>,
        }

        #[async_trait]
        impl ResearchProvider for FlakyProvider {
            async fn research(
                &self,
                entry: &IngredientEntry,
                _field: BackfillField,
            ) -> Result<ResearchFinding, ResearchError> {
                let mut seen = self.seen.lock().unwrap();
                if seen.contains(&entry.id) {
                    Ok(ResearchFinding::Nutrition(NutritionFacts::default()))
                } else {
                    seen.push(entry.id.clone());
                    Err(ResearchError::Http("first call always fails".to_string()))
                }
            }
        }

        let mut catalog = catalog_with(&["basil"]);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        let mut log = ChangeLog::new();

        let runner = BackfillRunner::new(
            Arc::new(FlakyProvider {
                seen: Mutex::new(Vec::new()),
            }),
            fast_config(),
        );
        let summary = runner
            .run(
                &mut catalog,
                BackfillField::Nutrition,
                &path,
                &mut log,
                &AtomicBool::new(false),
            )
            .await
            .unwrap();

        assert_eq!(summary.filled, 1);
        assert_eq!(summary.failed, 0);
    }
}
