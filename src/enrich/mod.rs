//! Enrichment Orchestrator: summary, keywords, and person mentions per document.

pub mod chunker;
pub mod keywords;
pub mod orchestrator;
pub mod persons;

pub use chunker::{chunk_text, ChunkSpec};
pub use keywords::{heuristic_keywords, PLACEHOLDER_SUMMARY};
pub use orchestrator::{Enricher, EnrichmentSettings};
pub use persons::{extract_name_candidates, structural_mentions};
