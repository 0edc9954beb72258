use anyhow::{bail, Context, Result};
use larder::catalog::Catalog;
use larder::maintenance::enrichment::{
    BackfillConfig, BackfillField, BackfillRunner, HttpResearchProvider,
};
use larder::maintenance::merge::{apply_merge_rules, MergeRules};
use larder::maintenance::ChangeLog;
use larder::pipeline;
use larder::pricing::RetailWeightTable;
use log::info;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    env_logger::init();

    // Load environment variables from .env file
    dotenv::dotenv().ok();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        print_usage(&args[0]);
        bail!("no command given");
    }

    match args[1].as_str() {
        "resolve" => {
            let (catalog_path, lines_path) = two_paths(&args)?;
            cmd_resolve(&catalog_path, &lines_path)
        }
        "validate" => {
            let catalog_path = one_path(&args)?;
            cmd_validate(&catalog_path)
        }
        "merge" => {
            let (catalog_path, rules_path) = two_paths(&args)?;
            cmd_merge(&catalog_path, &rules_path)
        }
        "backfill" => {
            let catalog_path = one_path(&args)?;
            let field: BackfillField = args
                .get(3)
                .context("usage: backfill <catalog.json> <nutrition|pricing|storage>")?
                .parse()
                .map_err(|e: String| anyhow::anyhow!(e))?;
            cmd_backfill(&catalog_path, field).await
        }
        other => {
            print_usage(&args[0]);
            bail!("unknown command '{}'", other);
        }
    }
}

fn print_usage(program: &str) {
    eprintln!("Usage: {} <command> [args]", program);
    eprintln!("  resolve  <catalog.json> <lines.txt>   resolve a batch of ingredient lines");
    eprintln!("  validate <catalog.json>               check catalog invariants");
    eprintln!("  merge    <catalog.json> <rules.json>  run the duplicate-merge rule table");
    eprintln!("  backfill <catalog.json> <field>       research missing nutrition|pricing|storage");
}

fn one_path(args: &[String]) -> Result<PathBuf> {
    args.get(2)
        .map(PathBuf::from)
        .context("missing catalog path argument")
}

fn two_paths(args: &[String]) -> Result<(PathBuf, PathBuf)> {
    Ok((
        one_path(args)?,
        args.get(3)
            .map(PathBuf::from)
            .context("missing second path argument")?,
    ))
}

fn changelog_path(catalog_path: &Path) -> PathBuf {
    env::var("CHANGELOG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| catalog_path.with_extension("changelog.txt"))
}

fn cmd_resolve(catalog_path: &Path, lines_path: &Path) -> Result<()> {
    let catalog = Catalog::load(catalog_path)?;
    let text = std::fs::read_to_string(lines_path)
        .with_context(|| format!("Failed to read lines file {}", lines_path.display()))?;
    let lines: Vec<String> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();

    let run = pipeline::process_lines(&catalog, &lines);

    for outcome in &run.outcomes {
        for item in &outcome.items {
            match (item.canonical_quantity, item.canonical_unit) {
                (Some(quantity), Some(unit)) => {
                    println!("{} -> {} {:.1} {}", outcome.raw, item.ingredient_id, quantity, unit)
                }
                _ => println!(
                    "{} -> {} (unconverted{})",
                    outcome.raw,
                    item.ingredient_id,
                    item.note.as_deref().map(|n| format!(": {}", n)).unwrap_or_default()
                ),
            }
        }
    }

    println!();
    print!("{}", run.report);

    let list = pipeline::aggregate_shopping_list(&run, &catalog, &RetailWeightTable::builtin());
    if !list.entries.is_empty() {
        println!("\nShopping list:");
        for entry in list.entries.values() {
            match entry.estimated_cost {
                Some(cost) => println!(
                    "  {} {:.1} {} (~{:.2})",
                    entry.ingredient_id, entry.quantity, entry.unit, cost
                ),
                None => println!(
                    "  {} {:.1} {} (unpriced)",
                    entry.ingredient_id, entry.quantity, entry.unit
                ),
            }
        }
        println!(
            "  subtotal {:.2} ({} items unpriced, {} lines flagged)",
            list.subtotal,
            list.unpriced_count,
            list.flagged.len()
        );
    }

    Ok(())
}

fn cmd_validate(catalog_path: &Path) -> Result<()> {
    let catalog = Catalog::load(catalog_path)?;
    println!(
        "Catalog v{} is valid: {} entries",
        catalog.version,
        catalog.len()
    );
    Ok(())
}

fn cmd_merge(catalog_path: &Path, rules_path: &Path) -> Result<()> {
    let mut catalog = Catalog::load(catalog_path)?;
    let rules = MergeRules::load(rules_path)?;
    let mut log = ChangeLog::new();

    let outcome = apply_merge_rules(&mut catalog, &rules, &mut log)
        .context("Merge aborted; catalog left untouched on disk")?;

    catalog.save(catalog_path)?;
    log.append_to_file(&changelog_path(catalog_path))?;

    println!(
        "Merge complete: {} absorbed, {} aliases added, {} skipped; catalog now v{}",
        outcome.absorbed, outcome.aliases_added, outcome.skipped, catalog.version
    );
    Ok(())
}

async fn cmd_backfill(catalog_path: &Path, field: BackfillField) -> Result<()> {
    let mut catalog = Catalog::load(catalog_path)?;

    let base_url = env::var("RESEARCH_API_URL").expect("RESEARCH_API_URL must be set");
    let api_key = env::var("RESEARCH_API_KEY").ok();
    let provider = Arc::new(HttpResearchProvider::new(&base_url, api_key));

    // Cooperative cancellation: first Ctrl-C finishes the current
    // checkpoint interval, then the run stops cleanly
    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = Arc::clone(&cancel);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Cancellation requested; stopping after current interval");
                cancel.store(true, Ordering::Relaxed);
            }
        });
    }

    let runner = BackfillRunner::new(provider, BackfillConfig::default());
    let mut log = ChangeLog::new();
    let summary = runner
        .run(&mut catalog, field, catalog_path, &mut log, &cancel)
        .await?;
    log.append_to_file(&changelog_path(catalog_path))?;

    println!(
        "Backfill {}: {} filled, {} failed, {} skipped, {} checkpoints{}",
        field,
        summary.filled,
        summary.failed,
        summary.skipped,
        summary.checkpoints,
        if summary.cancelled { " (cancelled)" } else { "" }
    );
    Ok(())
}
