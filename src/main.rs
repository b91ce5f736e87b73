use anyhow::{Context, Result};
use docgraph::db::{migrate, Db};
use docgraph::error::DocgraphError;
use docgraph::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;
    env_logger::Builder::from_env(
        env_logger::Env::default().filter_or("RUST_LOG", config.docgraph.log_level.as_str()),
    )
    .init();

    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("verify");

    match command {
        "verify" => run_schema_verification(&config).await?,
        other => {
            anyhow::bail!(
                "unknown command '{}'; use `docgraph verify` or the sync/graph/stats/purge binaries",
                other
            );
        }
    }

    Ok(())
}

/// Apply migrations and check the schema is usable.
async fn run_schema_verification(config: &Config) -> Result<()> {
    log::info!("Starting DocGraph v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Database path: {}", config.db_path().display());
    log::info!("Remote corpus: {}", config.remote.base_url);
    log::info!("Provider order: {}", config.providers.order.join(" -> "));

    let db = Db::new(config.db_path());
    db.migrate(config.migrations_dir())
        .await
        .with_context(|| format!("applying migrations from {}", config.migrations_dir().display()))?;
    log::info!("Database initialized successfully");

    verify_database_schema(&db).await?;
    Ok(())
}

/// Verify that all expected database objects exist
async fn verify_database_schema(db: &Db) -> Result<()> {
    db.with_connection(|conn| {
        let mut stmt = conn.prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")?;
        let tables: Vec<String> = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;

        let expected_tables = [
            "documents",
            "enriched_records",
            "person_relations",
            "persons",
            "record_keywords",
            "schema_migrations",
        ];
        let missing: Vec<&str> = expected_tables
            .iter()
            .copied()
            .filter(|table| !tables.iter().any(|t| t == table))
            .collect();
        for table in &missing {
            log::error!("Missing table: {}", table);
        }
        if !missing.is_empty() {
            return Err(DocgraphError::Config("Not all required tables exist".to_string()));
        }

        let applied = migrate::get_applied_migrations(conn)?;
        log::debug!("✓ {} migrations applied", applied.len());

        let journal_mode: String = conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))?;
        if !journal_mode.eq_ignore_ascii_case("wal") {
            return Err(DocgraphError::Config(format!("Journal mode is not WAL: {}", journal_mode)));
        }

        let foreign_keys: i32 = conn.query_row("PRAGMA foreign_keys", [], |row| row.get(0))?;
        if foreign_keys != 1 {
            return Err(DocgraphError::Config("Foreign keys not enabled".to_string()));
        }

        let integrity: String = conn.query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
        if integrity != "ok" {
            return Err(DocgraphError::Config(format!(
                "Database integrity check failed: {}",
                integrity
            )));
        }
        log::info!("✓ Database integrity: OK");
        Ok(())
    })
    .await?;

    log::info!("✓ Database schema verification complete");
    Ok(())
}
