//! Breadth-first subtree fetch that survives failing branches.

use std::collections::{HashSet, VecDeque};

use serde::Serialize;

use crate::error::Result;
use crate::models::Document;
use crate::pipeline::CancelToken;
use crate::remote::{CorpusClient, RemoteError, RemoteErrorKind};

/// A branch whose listing could not be completed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedBranch {
    pub node_id: String,
    pub kind: RemoteErrorKind,
    pub message: String,
}

impl From<RemoteError> for FailedBranch {
    fn from(e: RemoteError) -> Self {
        Self {
            node_id: e.node_id,
            kind: e.kind,
            message: e.message,
        }
    }
}

/// Documents reachable from a root, plus what could not be reached.
#[derive(Debug, Default)]
pub struct SubtreeFetch {
    pub root_id: String,
    /// Root first, then breadth-first order.
    pub documents: Vec<Document>,
    pub failed_branches: Vec<FailedBranch>,
    /// Listed children skipped for missing metadata.
    pub malformed: Vec<String>,
    pub cancelled: bool,
}

impl SubtreeFetch {
    pub fn is_complete(&self) -> bool {
        self.failed_branches.is_empty() && self.malformed.is_empty() && !self.cancelled
    }
}

/// Fetch `root_id` and all of its descendants.
///
/// Only a failure to fetch the root itself is returned as an error. A child
/// listing that fails is recorded in `failed_branches` and its subtree is
/// skipped; children already listed on earlier pages are kept.
pub async fn fetch_subtree(
    client: &dyn CorpusClient,
    root_id: &str,
    cancel: &CancelToken,
) -> Result<SubtreeFetch> {
    let root = client.get_content(root_id).await?;

    let mut result = SubtreeFetch {
        root_id: root_id.to_string(),
        ..SubtreeFetch::default()
    };
    let mut visited: HashSet<String> = HashSet::new();
    let mut queue: VecDeque<String> = VecDeque::new();

    visited.insert(root.id.clone());
    queue.push_back(root.id.clone());
    result.documents.push(root);

    while let Some(parent_id) = queue.pop_front() {
        if cancel.is_cancelled() {
            log::info!("Subtree fetch of {} cancelled with {} node(s) pending", root_id, queue.len() + 1);
            result.cancelled = true;
            break;
        }

        let mut page = 0;
        loop {
            match client.list_children(&parent_id, page).await {
                Ok(listing) => {
                    result.malformed.extend(listing.malformed);
                    for doc in listing.documents {
                        // guards against cycles and duplicate listings
                        if visited.insert(doc.id.clone()) {
                            queue.push_back(doc.id.clone());
                            result.documents.push(doc);
                        }
                    }
                    if !listing.has_more {
                        break;
                    }
                    page += 1;
                }
                Err(e) => {
                    log::warn!("Skipping branch {} (page {}): {}", parent_id, page, e);
                    result.failed_branches.push(e.into());
                    break;
                }
            }
        }
    }

    log::info!(
        "Fetched subtree {}: {} document(s), {} failed branch(es), {} malformed",
        root_id,
        result.documents.len(),
        result.failed_branches.len(),
        result.malformed.len()
    );
    Ok(result)
}
