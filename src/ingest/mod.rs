//! Document Store Adapter and Change Detector.

pub mod fetch;
pub mod incremental;

pub use fetch::{fetch_subtree, FailedBranch, SubtreeFetch};
pub use incremental::{
    classify_documents, find_absent_documents, select_stale, DocumentClassification,
};
