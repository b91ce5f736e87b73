use anyhow::{Context, Result};
use clap::Parser;
use docgraph::db::Db;
use docgraph::store::RecordStore;
use docgraph::Config;

#[derive(Parser, Debug)]
#[command(name = "purge")]
#[command(about = "Delete pages and their enrichment records from the store")]
struct Args {
    /// Page ids to delete
    #[arg(required = true)]
    ids: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::load()?;
    env_logger::Builder::from_env(
        env_logger::Env::default().filter_or("RUST_LOG", config.docgraph.log_level.as_str()),
    )
    .init();

    let db = Db::new(config.db_path());
    db.migrate(config.migrations_dir())
        .await
        .context("applying migrations")?;
    let store = RecordStore::new(db);

    let deleted = store.purge_records(&args.ids).await?;
    log::info!("Purged {} of {} requested page(s)", deleted, args.ids.len());
    println!("Deleted {} page(s)", deleted);
    if deleted < args.ids.len() {
        println!("{} id(s) were not in the store", args.ids.len() - deleted);
    }
    Ok(())
}
