//! BFS over the stored document hierarchy.

use std::collections::{HashSet, VecDeque};

use crate::error::Result;
use crate::store::RecordStore;

/// Root plus every stored descendant within `max_depth` hops, in BFS order.
///
/// `None` walks the whole subtree. Cycles in `parent_id` links are visited once.
pub async fn descendant_ids(
    store: &RecordStore,
    root_id: &str,
    max_depth: Option<usize>,
) -> Result<Vec<String>> {
    let mut visited = HashSet::new();
    let mut queue = VecDeque::new();
    let mut result = Vec::new();

    queue.push_back((root_id.to_string(), 0usize));
    visited.insert(root_id.to_string());
    result.push(root_id.to_string());

    while let Some((id, depth)) = queue.pop_front() {
        if max_depth.is_some_and(|max| depth >= max) {
            continue;
        }

        for child in store.children_of(&id).await? {
            if visited.insert(child.clone()) {
                queue.push_back((child.clone(), depth + 1));
                result.push(child);
            }
        }
    }

    Ok(result)
}
