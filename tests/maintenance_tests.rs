//! Integration tests for catalog maintenance: merge rules against a
//! snapshot on disk, change-log emission, and resumable research
//! backfill with checkpointing.

use async_trait::async_trait;
use larder::catalog::{CanonicalUnit, Catalog, IngredientEntry, NutritionFacts};
use larder::maintenance::enrichment::{
    BackfillConfig, BackfillField, BackfillRunner, ResearchError, ResearchFinding,
    ResearchProvider,
};
use larder::maintenance::merge::{apply_merge_rules, MergeRule, MergeRules};
use larder::maintenance::ChangeLog;
use std::collections::BTreeMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

fn entry(id: &str) -> IngredientEntry {
    IngredientEntry::new(id, id, CanonicalUnit::Grams)
}

#[test]
fn merge_persists_snapshot_and_changelog() {
    let dir = tempfile::tempdir().unwrap();
    let catalog_path = dir.path().join("catalog.json");
    let changelog_path = dir.path().join("catalog.changelog.txt");

    let mut catalog = Catalog::new();
    catalog.insert(entry("coriander"));
    catalog.insert(entry("cilantro-fresh").with_alias("cilantro"));
    catalog.save(&catalog_path).unwrap();
    let version_before = catalog.version;

    let mut rules_map = BTreeMap::new();
    rules_map.insert(
        "coriander".to_string(),
        MergeRule {
            absorb: vec!["cilantro-fresh".to_string()],
            add_aliases: vec!["chinese parsley".to_string()],
        },
    );
    let rules = MergeRules {
        version: 1,
        rules: rules_map,
    };

    let mut log = ChangeLog::new();
    let outcome = apply_merge_rules(&mut catalog, &rules, &mut log).unwrap();
    assert_eq!(outcome.absorbed, 1);
    assert_eq!(outcome.aliases_added, 1);

    catalog.save(&catalog_path).unwrap();
    log.append_to_file(&changelog_path).unwrap();

    // The whole-snapshot rewrite bumped the version
    let reloaded = Catalog::load(&catalog_path).unwrap();
    assert_eq!(reloaded.version, version_before + 1);
    assert_eq!(reloaded.len(), 1);
    let winner = reloaded.get("coriander").unwrap();
    assert!(winner.aliases.contains("cilantro"));
    assert!(winner.aliases.contains("chinese parsley"));

    let log_text = std::fs::read_to_string(&changelog_path).unwrap();
    assert!(log_text.contains("absorbed 'cilantro-fresh' into 'coriander'"));
    assert!(log_text.contains("added alias 'chinese parsley'"));
}

#[test]
fn merging_twice_equals_merging_once() {
    let mut catalog = Catalog::new();
    catalog.insert(entry("oats"));
    catalog.insert(entry("rolled-oats").with_alias("porridge oats"));

    let mut rules_map = BTreeMap::new();
    rules_map.insert(
        "oats".to_string(),
        MergeRule {
            absorb: vec!["rolled-oats".to_string()],
            add_aliases: vec![],
        },
    );
    let rules = MergeRules {
        version: 1,
        rules: rules_map,
    };

    let mut log = ChangeLog::new();
    apply_merge_rules(&mut catalog, &rules, &mut log).unwrap();
    let aliases_once = catalog.get("oats").unwrap().aliases.clone();
    let len_once = catalog.len();

    apply_merge_rules(&mut catalog, &rules, &mut log).unwrap();
    assert_eq!(catalog.get("oats").unwrap().aliases, aliases_once);
    assert_eq!(catalog.len(), len_once);
}

/// Succeeds for every id, counting calls
struct CountingProvider {
    calls: Mutex<usize>,
}

#[async_trait]
impl ResearchProvider for CountingProvider {
    async fn research(
        &self,
        _entry: &IngredientEntry,
        _field: BackfillField,
    ) -> Result<ResearchFinding, ResearchError> {
        *self.calls.lock().unwrap() += 1;
        Ok(ResearchFinding::Nutrition(NutritionFacts {
            calories: 42.0,
            ..Default::default()
        }))
    }
}

/// Fails ids in the list, simulating quota exhaustion mid-run
struct PartialProvider {
    fail_ids: Vec<String>,
}

#[async_trait]
impl ResearchProvider for PartialProvider {
    async fn research(
        &self,
        entry: &IngredientEntry,
        _field: BackfillField,
    ) -> Result<ResearchFinding, ResearchError> {
        if self.fail_ids.contains(&entry.id) {
            return Err(ResearchError::Http("quota exhausted".to_string()));
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
        max_retries: 0,
        base_retry_delay_ms: 1,
        max_retry_delay_ms: 2,
        workers: 1,
    }
}

#[tokio::test]
async fn interrupted_backfill_resumes_from_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("catalog.json");

    let mut catalog = Catalog::new();
    for id in ["basil", "mint", "sage", "thyme"] {
        catalog.insert(entry(id));
    }
    catalog.save(&path).unwrap();

    // First run: the provider fails the later entries
    let mut catalog = Catalog::load(&path).unwrap();
    let mut log = ChangeLog::new();
    let runner = BackfillRunner::new(
        Arc::new(PartialProvider {
            fail_ids: vec!["sage".to_string(), "thyme".to_string()],
        }),
        fast_config(),
    );
    let first = runner
        .run(
            &mut catalog,
            BackfillField::Nutrition,
            &path,
            &mut log,
            &AtomicBool::new(false),
        )
        .await
        .unwrap();
    assert_eq!(first.filled, 2);
    assert_eq!(first.failed, 2);

    // Resume against the checkpoint on disk: only the missing entries
    // are researched again
    let mut catalog = Catalog::load(&path).unwrap();
    let provider = Arc::new(CountingProvider {
        calls: Mutex::new(0),
    });
    let runner = BackfillRunner::new(
        Arc::clone(&provider) as Arc<dyn ResearchProvider>,
        fast_config(),
    );
    let mut log = ChangeLog::new();
    let second = runner
        .run(
            &mut catalog,
            BackfillField::Nutrition,
            &path,
            &mut log,
            &AtomicBool::new(false),
        )
        .await
        .unwrap();

    assert_eq!(second.skipped, 2);
    assert_eq!(second.filled, 2);
    assert_eq!(*provider.calls.lock().unwrap(), 2);

    let final_catalog = Catalog::load(&path).unwrap();
    assert!(final_catalog
        .ingredients
        .values()
        .all(|entry| entry.nutrition.is_some()));
}

#[tokio::test]
async fn backfill_writes_versioned_checkpoints() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("catalog.json");

    let mut catalog = Catalog::new();
    for id in ["basil", "mint", "sage"] {
        catalog.insert(entry(id));
    }
    catalog.save(&path).unwrap();
    let version_before = catalog.version;

    let mut log = ChangeLog::new();
    let runner = BackfillRunner::new(
        Arc::new(CountingProvider {
            calls: Mutex::new(0),
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

    // 3 pending at 2 per interval: two checkpoints, two version bumps
    assert_eq!(summary.checkpoints, 2);
    let reloaded = Catalog::load(&path).unwrap();
    assert_eq!(reloaded.version, version_before + 2);
}
