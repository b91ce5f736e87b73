use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use docgraph::cache::GraphCache;
use docgraph::db::Db;
use docgraph::graph::{GraphSettings, GraphViews, ViewQuery, ViewRequest};
use docgraph::models::RelationKind;
use docgraph::store::RecordStore;
use docgraph::Config;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "graph")]
#[command(about = "Print a relationship graph view as JSON")]
struct Args {
    #[command(subcommand)]
    mode: Mode,

    /// Restrict the view to one space
    #[arg(long, global = true)]
    space: Option<String>,

    /// Minimum Jaccard weight for an edge (defaults to graph.threshold)
    #[arg(long, global = true)]
    threshold: Option<f64>,

    /// Compact single-line output
    #[arg(long, global = true)]
    compact: bool,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// A page and its descendants
    Subtree {
        root_id: String,
        #[arg(long)]
        max_depth: Option<usize>,
    },
    /// All enriched pages, most recent first up to a limit (0 = no limit)
    Global {
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Pages carrying one keyword
    Keyword { keyword: String },
    /// Keyword co-occurrence network
    Keywords {
        #[arg(long)]
        top_k: Option<usize>,
    },
    /// One person and the pages they relate to
    Person {
        name: String,
        /// creator, modifier or mentioned
        #[arg(long)]
        relation: Option<RelationKind>,
    },
}

impl From<Mode> for ViewRequest {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Subtree { root_id, max_depth } => ViewRequest::Subtree { root_id, max_depth },
            Mode::Global { limit } => ViewRequest::Global { limit },
            Mode::Keyword { keyword } => ViewRequest::Keyword { keyword },
            Mode::Keywords { top_k } => ViewRequest::KeywordNetwork { top_k },
            Mode::Person { name, relation } => ViewRequest::Person { name, relation },
        }
    }
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

    let views = GraphViews::new(store, GraphSettings::from(&config.graph))
        .with_cache(Arc::new(GraphCache::new(config.graph.cache_capacity)));

    let mut query = ViewQuery::new(args.mode.into()).in_space(args.space.as_deref());
    query.threshold = args.threshold;

    let graph = views.render(&query).await?;
    log::info!(
        "Rendered {} node(s), {} edge(s)",
        graph.nodes.len(),
        graph.edges.len()
    );

    let out = if args.compact {
        serde_json::to_string(&graph)?
    } else {
        serde_json::to_string_pretty(&graph)?
    };
    println!("{}", out);
    Ok(())
}
