use anyhow::{Context, Result};
use clap::Parser;
use docgraph::db::Db;
use docgraph::enrich::{Enricher, EnrichmentSettings};
use docgraph::llm::ProviderChain;
use docgraph::pipeline::{SyncOptions, SyncPass, SyncRegistry};
use docgraph::remote::ConfluenceClient;
use docgraph::store::RecordStore;
use docgraph::Config;
use std::sync::Arc;
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(name = "sync")]
#[command(about = "Fetch a page subtree and enrich new or modified pages (incremental by default)")]
struct Args {
    /// Root page id of the subtree to sync
    root_id: String,

    /// Re-enrich every fetched page, ignoring stored fingerprints
    #[arg(short, long)]
    force: bool,

    /// Pages enriched concurrently (defaults to enrichment.concurrency)
    #[arg(short, long)]
    concurrency: Option<usize>,

    /// Print the final report as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::load()?;
    env_logger::Builder::from_env(
        env_logger::Env::default().filter_or("RUST_LOG", config.docgraph.log_level.as_str()),
    )
    .init();

    log::info!("Starting DocGraph sync");
    log::info!("Database path: {}", config.db_path().display());

    let db = Db::new(config.db_path());
    db.migrate(config.migrations_dir())
        .await
        .context("applying migrations")?;
    let store = RecordStore::new(db);

    let client = ConfluenceClient::from_config(&config.remote)?;
    let chain = ProviderChain::from_config(&config.providers)?;
    let enricher = Enricher::new(Arc::new(chain), EnrichmentSettings::from(&config.enrichment));

    let mut options = SyncOptions::from(&config.enrichment);
    options.force = args.force;
    if let Some(concurrency) = args.concurrency {
        options.concurrency = concurrency.max(1);
    }
    if options.force {
        log::info!("Mode: full re-enrichment (all pages)");
    }

    let pass = SyncPass::new(Arc::new(client), store, enricher, options);
    let registry = SyncRegistry::new();
    let handle = registry.begin(&args.root_id);

    let interrupt = handle.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupt received; finishing in-flight pages and stopping");
            interrupt.cancel();
        }
    });

    let start = Instant::now();
    let report = pass
        .run_tracked(&args.root_id, &handle)
        .await
        .with_context(|| format!("sync pass {} failed", handle.pass_id()))?;
    let elapsed = start.elapsed();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("\n=== Sync Complete ===");
    println!("Pass:                {}", handle.pass_id());
    println!("Fetched:             {}", report.fetched);
    println!("Processed:           {}", report.processed);
    println!("Skipped (unchanged): {}", report.skipped);
    println!("Partially enriched:  {}", report.partially_enriched);
    println!("Failed:              {}", report.failed.len());
    println!("Failed branches:     {}", report.failed_branches.len());
    println!("Malformed:           {}", report.malformed.len());
    println!("Time:                {:.2}s", elapsed.as_secs_f64());
    if report.cancelled {
        println!("Cancelled:           {} page(s) not started", report.not_started);
    }

    for failure in &report.failed {
        println!("  ✗ {} ({:?}): {}", failure.id, failure.class, failure.message);
    }
    for branch in &report.failed_branches {
        println!("  ✗ branch {} ({:?}): {}", branch.node_id, branch.kind, branch.message);
    }
    if !report.absent.is_empty() {
        if report.is_complete() {
            println!(
                "\n{} stored page(s) were not returned by the remote; run `purge` to remove them:",
                report.absent.len()
            );
        } else {
            println!(
                "\n{} stored page(s) were not returned by the remote (fetch incomplete, re-sync before purging):",
                report.absent.len()
            );
        }
        for id in &report.absent {
            println!("  {}", id);
        }
    }

    Ok(())
}
