//! Jaccard similarity over keyword sets and document co-occurrence sets.

use std::collections::BTreeSet;

use crate::models::KeywordSet;

/// `|a ∩ b| / |a ∪ b|`; an empty union scores 0.
pub fn jaccard(a: &KeywordSet, b: &KeywordSet) -> f64 {
    let union = a.union_len(b);
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).len() as f64 / union as f64
}

/// Jaccard over arbitrary ordered sets.
pub fn jaccard_sets<T: Ord>(a: &BTreeSet<T>, b: &BTreeSet<T>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}
