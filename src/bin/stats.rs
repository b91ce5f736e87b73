use anyhow::{Context, Result};
use clap::Parser;
use docgraph::db::Db;
use docgraph::store::RecordStore;
use docgraph::Config;

#[derive(Parser, Debug)]
#[command(name = "stats")]
#[command(about = "Print corpus, space, keyword and person statistics")]
struct Args {
    /// Per-space breakdown for this space only
    #[arg(long)]
    space: Option<String>,

    /// Statistics for one person (any spelling of the name)
    #[arg(long)]
    person: Option<String>,

    /// Keywords to list
    #[arg(long, default_value_t = 20)]
    top: usize,
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

    if let Some(name) = &args.person {
        return print_person(&store, name).await;
    }

    println!("\n=== DocGraph Corpus Statistics ===\n");
    let corpus = store.corpus_stats().await?;
    println!("{:<22} {:>8}", "Documents", corpus.documents);
    println!("{:<22} {:>8}", "Enriched", corpus.enriched);
    println!("{:<22} {:>8}", "  valid", corpus.valid);
    println!("{:<22} {:>8}", "  stale", corpus.stale);
    println!("{:<22} {:>8}", "  partial", corpus.partial);
    println!("{:<22} {:>8}", "Distinct keywords", corpus.keywords);
    println!("{:<22} {:>8}", "Persons", corpus.persons);
    println!("{:<22} {:>8}", "Spaces", corpus.spaces);

    let spaces = match &args.space {
        Some(space) => vec![space.clone()],
        None => store
            .list_spaces()
            .await?
            .into_iter()
            .map(|s| s.space_key)
            .collect(),
    };
    if !spaces.is_empty() {
        println!("\nSpaces:\n");
        println!("{:-<72}", "");
        println!(
            "{:<16} {:>8} {:>9} {:>7} {:>8} {:>9} {:>8}",
            "Space", "Docs", "Enriched", "Valid", "Partial", "Keywords", "Persons"
        );
        println!("{:-<72}", "");
        for space in &spaces {
            let s = store.space_stats(space).await?;
            println!(
                "{:<16} {:>8} {:>9} {:>7} {:>8} {:>9} {:>8}",
                s.space_key, s.documents, s.enriched, s.valid, s.partial, s.keywords, s.persons
            );
        }
        println!("{:-<72}", "");
    }

    let keywords = store
        .list_keywords(args.space.as_deref(), Some(args.top))
        .await?;
    if !keywords.is_empty() {
        println!("\nTop keywords:\n");
        for kw in &keywords {
            println!("  {:<30} {:>6}", kw.keyword, kw.documents);
        }
    }

    let persons = store.list_persons().await?;
    if !persons.is_empty() {
        println!("\nMost mentioned persons:\n");
        for person in persons.iter().take(args.top) {
            println!("  {:<30} {:>6}", person.display_name, person.mention_count);
        }
    }

    Ok(())
}

async fn print_person(store: &RecordStore, name: &str) -> Result<()> {
    let person = store
        .person_by_name(name)
        .await?
        .with_context(|| format!("no person named '{}'", name))?;
    let stats = store.person_stats(person.person_id).await?;

    println!("\n=== {} ===\n", person.display_name);
    if let Some(email) = &person.email {
        println!("Email:       {}", email);
    }
    if let Some(department) = &person.department {
        println!("Department:  {}", department);
    }
    if let Some(role) = &person.role {
        println!("Role:        {}", role);
    }
    println!("Created:     {}", stats.created);
    println!("Modified:    {}", stats.modified);
    println!("Mentioned:   {}", stats.mentioned);
    println!("Documents:   {}", stats.total);

    let relations = store.person_relations(person.person_id, None).await?;
    if !relations.is_empty() {
        println!();
        for rel in &relations {
            println!("  {:<24} {:<10} {:.2}", rel.doc_id, rel.relation.as_str(), rel.confidence);
        }
    }
    Ok(())
}
