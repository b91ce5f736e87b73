use lru::LruCache;
use sha2::{Digest, Sha256};
use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard};

use crate::error::Result;
use crate::graph::{Graph, ViewQuery};

/// Thread-safe LRU cache of rendered graphs.
///
/// Keys fold in the store generation, so any committed write makes every
/// older entry unreachable; those age out through normal LRU eviction.
pub struct GraphCache {
    cache: Mutex<LruCache<String, Graph>>,
}

impl GraphCache {
    /// Create a cache holding at most `capacity` graphs (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: Mutex::new(LruCache::new(cap)),
        }
    }

    /// SHA-256 over the serialized request and the store generation.
    pub fn key(query: &ViewQuery, generation: u64) -> Result<String> {
        let mut hasher = Sha256::new();
        hasher.update(serde_json::to_vec(query)?);
        hasher.update(generation.to_le_bytes());
        Ok(format!("{:x}", hasher.finalize()))
    }

    pub fn get(&self, key: &str) -> Option<Graph> {
        self.lock().get(key).cloned()
    }

    pub fn put(&self, key: String, graph: Graph) {
        self.lock().put(key, graph);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<String, Graph>> {
        self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{ViewRequest, ViewScope};

    fn graph(center: &str) -> Graph {
        Graph {
            center: Some(center.to_string()),
            ..Graph::default()
        }
    }

    fn global() -> ViewQuery {
        ViewQuery::new(ViewRequest::Global { limit: None })
    }

    #[test]
    fn test_cache_put_and_get() {
        let cache = GraphCache::new(10);
        let key = GraphCache::key(&global(), 1).unwrap();
        cache.put(key.clone(), graph("a"));
        assert_eq!(cache.get(&key), Some(graph("a")));
        assert!(cache.get("missing").is_none());
    }

    #[test]
    fn test_key_depends_on_request_and_generation() {
        let base = GraphCache::key(&global(), 1).unwrap();
        assert_eq!(base, GraphCache::key(&global(), 1).unwrap());
        assert_ne!(base, GraphCache::key(&global(), 2).unwrap());
        assert_ne!(base, GraphCache::key(&global().with_threshold(0.5), 1).unwrap());

        let mut scoped = global();
        scoped.scope = ViewScope::space("ENG");
        assert_ne!(base, GraphCache::key(&scoped, 1).unwrap());
    }

    #[test]
    fn test_cache_eviction() {
        let cache = GraphCache::new(2);
        cache.put("k1".to_string(), graph("1"));
        cache.put("k2".to_string(), graph("2"));
        let _ = cache.get("k1");
        cache.put("k3".to_string(), graph("3"));

        assert!(cache.get("k1").is_some());
        assert!(cache.get("k2").is_none());
        assert!(cache.get("k3").is_some());
    }

    #[test]
    fn test_zero_capacity_holds_one() {
        let cache = GraphCache::new(0);
        cache.put("k1".to_string(), graph("1"));
        cache.put("k2".to_string(), graph("2"));
        assert_eq!(cache.len(), 1);
        cache.clear();
        assert!(cache.is_empty());
    }
}
