//! Incremental sync: skip documents whose enrichment fingerprint still matches.
//!
//! The fingerprint is the document's `modified_at` captured when its record was
//! produced. Comparison is pure; loading fingerprints lives in the store.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};

use crate::models::{normalize_timestamp, Document};

/// Result of classifying fetched documents against stored fingerprints.
#[derive(Debug, Default)]
pub struct DocumentClassification {
    /// No enrichment record at all (always re-enriched).
    pub new_documents: Vec<Document>,
    /// Record present but produced from an older (or different) version.
    pub modified_documents: Vec<Document>,
    /// Record fingerprint equals the current `modified_at` (skipped).
    pub unchanged_documents: Vec<Document>,
}

impl DocumentClassification {
    /// New and modified documents, in fetch order.
    pub fn stale(&self) -> Vec<Document> {
        let mut out = Vec::with_capacity(self.new_documents.len() + self.modified_documents.len());
        out.extend(self.new_documents.iter().cloned());
        out.extend(self.modified_documents.iter().cloned());
        out
    }
}

/// Classify documents into new, modified, or unchanged.
pub fn classify_documents(
    documents: &[Document],
    existing: &HashMap<String, DateTime<Utc>>,
) -> DocumentClassification {
    let mut classification = DocumentClassification::default();

    for doc in documents {
        match existing.get(&doc.id) {
            None => classification.new_documents.push(doc.clone()),
            Some(stored) if normalize_timestamp(*stored) != normalize_timestamp(doc.modified_at) => {
                classification.modified_documents.push(doc.clone())
            }
            Some(_) => classification.unchanged_documents.push(doc.clone()),
        }
    }

    classification
}

/// Documents that need (re-)enrichment, in input order.
pub fn select_stale(
    documents: &[Document],
    existing: &HashMap<String, DateTime<Utc>>,
) -> Vec<Document> {
    documents
        .iter()
        .filter(|doc| match existing.get(&doc.id) {
            None => true,
            Some(stored) => normalize_timestamp(*stored) != normalize_timestamp(doc.modified_at),
        })
        .cloned()
        .collect()
}

/// Stored ids under a subtree that the latest fetch did not return.
///
/// Reported only; absence never triggers deletion because a failed branch
/// looks exactly like a deleted one.
pub fn find_absent_documents(stored_ids: &[String], fetched: &[Document]) -> Vec<String> {
    let fetched: HashSet<&str> = fetched.iter().map(|d| d.id.as_str()).collect();
    let mut absent: Vec<String> = stored_ids
        .iter()
        .filter(|id| !fetched.contains(id.as_str()))
        .cloned()
        .collect();
    absent.sort();
    absent
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn doc(id: &str, modified: DateTime<Utc>) -> Document {
        Document {
            id: id.to_string(),
            title: id.to_string(),
            raw_content: String::new(),
            space_key: "ENG".to_string(),
            url: String::new(),
            parent_id: None,
            created_at: modified,
            modified_at: modified,
            created_by: None,
            modified_by: None,
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_new_documents_always_selected() {
        let docs = vec![doc("a", t0()), doc("b", t0())];
        let existing = HashMap::new();
        let stale = select_stale(&docs, &existing);
        assert_eq!(stale.len(), 2);

        let classification = classify_documents(&docs, &existing);
        assert_eq!(classification.new_documents.len(), 2);
        assert!(classification.unchanged_documents.is_empty());
    }

    #[test]
    fn test_unchanged_never_selected() {
        let docs = vec![doc("a", t0())];
        let mut existing = HashMap::new();
        existing.insert("a".to_string(), t0());
        assert!(select_stale(&docs, &existing).is_empty());
        assert_eq!(classify_documents(&docs, &existing).unchanged_documents.len(), 1);
    }

    #[test]
    fn test_modified_selected_in_either_direction() {
        let docs = vec![doc("newer", t0()), doc("older", t0())];
        let mut existing = HashMap::new();
        existing.insert("newer".to_string(), t0() - Duration::hours(1));
        // a restored older version is still a different fingerprint
        existing.insert("older".to_string(), t0() + Duration::hours(1));

        let classification = classify_documents(&docs, &existing);
        assert_eq!(classification.modified_documents.len(), 2);
        assert_eq!(select_stale(&docs, &existing).len(), 2);
    }

    #[test]
    fn test_sub_millisecond_noise_ignored() {
        let docs = vec![doc("a", t0() + Duration::microseconds(300))];
        let mut existing = HashMap::new();
        existing.insert("a".to_string(), t0());
        assert!(select_stale(&docs, &existing).is_empty());
    }

    #[test]
    fn test_stale_preserves_new_then_modified() {
        let docs = vec![doc("m", t0()), doc("n", t0()), doc("u", t0())];
        let mut existing = HashMap::new();
        existing.insert("m".to_string(), t0() - Duration::days(1));
        existing.insert("u".to_string(), t0());
        let ids: Vec<_> = classify_documents(&docs, &existing)
            .stale()
            .into_iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(ids, vec!["n".to_string(), "m".to_string()]);
    }

    #[test]
    fn test_absent_documents_reported_sorted() {
        let stored = vec!["z".to_string(), "a".to_string(), "b".to_string()];
        let fetched = vec![doc("b", t0())];
        assert_eq!(find_absent_documents(&stored, &fetched), vec!["a", "z"]);
    }
}
