pub mod cache;
pub mod config;
pub mod db;
pub mod enrich;
pub mod error;
pub mod graph;
pub mod ingest;
pub mod llm;
pub mod models;
pub mod pipeline;
pub mod remote;
pub mod store;

pub use config::Config;
pub use error::{DocgraphError, Result};
pub use graph::{build_graph, Graph, GraphViews, ViewQuery, ViewRequest};
pub use pipeline::{SyncPass, SyncReport};
pub use store::RecordStore;
