//! Core records shared by the sync pipeline, the store and the graph builder.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DocgraphError, Result};

/// A page fetched from the remote corpus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub title: String,
    pub raw_content: String,
    pub space_key: String,
    pub url: String,
    /// Containment parent; `None` for the root of a fetched subtree.
    pub parent_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub created_by: Option<String>,
    pub modified_by: Option<String>,
}

impl Document {
    /// Reject documents the pipeline cannot enrich.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(DocgraphError::structural("<unknown>", "empty document id"));
        }
        if self.title.trim().is_empty() {
            return Err(DocgraphError::structural(&self.id, "missing title"));
        }
        Ok(())
    }
}

/// Canonical timestamp form: UTC, millisecond precision.
///
/// Staleness fingerprints are compared after this normalization, so a value
/// survives a store round trip unchanged.
pub fn normalize_timestamp(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.trunc_subsecs(3)
}

pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|dt| normalize_timestamp(dt.with_timezone(&Utc)))
        .map_err(|e| DocgraphError::InvalidInput(format!("bad timestamp '{}': {}", raw, e)))
}

/// Deduplicated, case-normalized keyword set.
///
/// Backed by a `BTreeSet` so iteration order never depends on hashing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeywordSet(BTreeSet<String>);

impl KeywordSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalize a single keyword: trimmed, lowercase, inner whitespace collapsed.
    pub fn normalize(raw: &str) -> Option<String> {
        let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
        let kw = collapsed.to_lowercase();
        if kw.is_empty() {
            None
        } else {
            Some(kw)
        }
    }

    /// Insert a keyword; returns false when it normalized to nothing or was present.
    pub fn insert(&mut self, raw: &str) -> bool {
        match Self::normalize(raw) {
            Some(kw) => self.0.insert(kw),
            None => false,
        }
    }

    pub fn contains(&self, keyword: &str) -> bool {
        Self::normalize(keyword)
            .map(|kw| self.0.contains(&kw))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.0.iter()
    }

    /// Shared keywords, sorted.
    pub fn intersection(&self, other: &KeywordSet) -> Vec<String> {
        self.0.intersection(&other.0).cloned().collect()
    }

    pub fn union_len(&self, other: &KeywordSet) -> usize {
        self.0.union(&other.0).count()
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.0.iter().cloned().collect()
    }
}

impl<S: AsRef<str>> FromIterator<S> for KeywordSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = KeywordSet::new();
        for kw in iter {
            set.insert(kw.as_ref());
        }
        set
    }
}

/// How a person relates to a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationKind {
    Creator,
    Modifier,
    Mentioned,
}

impl RelationKind {
    pub const ALL: [RelationKind; 3] = [
        RelationKind::Creator,
        RelationKind::Modifier,
        RelationKind::Mentioned,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RelationKind::Creator => "creator",
            RelationKind::Modifier => "modifier",
            RelationKind::Mentioned => "mentioned",
        }
    }
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RelationKind {
    type Err = DocgraphError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "creator" => Ok(RelationKind::Creator),
            "modifier" => Ok(RelationKind::Modifier),
            "mentioned" => Ok(RelationKind::Mentioned),
            other => Err(DocgraphError::InvalidInput(format!(
                "unknown relation kind: {}",
                other
            ))),
        }
    }
}

/// A person attached to one enriched document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonMention {
    pub name: String,
    pub relation: RelationKind,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl PersonMention {
    pub fn structural(name: &str, relation: RelationKind) -> Self {
        Self {
            name: name.trim().to_string(),
            relation,
            confidence: 1.0,
            department: None,
            role: None,
            email: None,
            context: None,
        }
    }

    pub fn normalized_name(&self) -> String {
        PersonEntity::normalize_name(&self.name)
    }
}

/// Per-field outcome of an enrichment run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichmentFlags {
    pub summary_failed: bool,
    pub keywords_failed: bool,
    pub persons_failed: bool,
    pub alt_summary_failed: bool,
    /// The worker timed out before the document finished.
    pub transient_failure: bool,
}

impl EnrichmentFlags {
    /// True when a primary sub-task degraded to its placeholder.
    pub fn is_partial(&self) -> bool {
        self.summary_failed || self.keywords_failed || self.persons_failed
    }
}

/// Enrichment output for one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedRecord {
    pub id: String,
    pub summary: String,
    pub alt_summary: Option<String>,
    pub keywords: KeywordSet,
    pub persons: Vec<PersonMention>,
    /// The document's `modified_at` when this record was produced.
    pub source_modified_at: DateTime<Utc>,
    pub flags: EnrichmentFlags,
    pub enriched_at: DateTime<Utc>,
}

impl EnrichedRecord {
    /// A record is valid only while its fingerprint matches the document.
    pub fn is_valid_for(&self, document: &Document) -> bool {
        self.id == document.id
            && normalize_timestamp(self.source_modified_at) == normalize_timestamp(document.modified_at)
    }
}

/// A person deduplicated across the corpus by normalized name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonEntity {
    pub person_id: i64,
    pub normalized_name: String,
    pub display_name: String,
    pub email: Option<String>,
    pub department: Option<String>,
    pub role: Option<String>,
    pub mention_count: i64,
}

impl PersonEntity {
    /// Dedup key: trimmed, whitespace collapsed, honorifics stripped, lowercase.
    pub fn normalize_name(name: &str) -> String {
        let collapsed = name.split_whitespace().collect::<Vec<_>>().join(" ");
        let mut stripped = collapsed.as_str();
        for suffix in ["님", "씨"] {
            if let Some(rest) = stripped.strip_suffix(suffix) {
                if rest.chars().count() >= 2 {
                    stripped = rest;
                }
            }
        }
        stripped.trim().to_lowercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn doc(modified: DateTime<Utc>) -> Document {
        Document {
            id: "100".to_string(),
            title: "Release plan".to_string(),
            raw_content: "body".to_string(),
            space_key: "ENG".to_string(),
            url: "https://wiki/100".to_string(),
            parent_id: None,
            created_at: modified,
            modified_at: modified,
            created_by: Some("Kim".to_string()),
            modified_by: None,
        }
    }

    #[test]
    fn test_keyword_set_normalizes_and_dedupes() {
        let set: KeywordSet = ["Rust", " rust ", "Async  IO", "", "async io"].into_iter().collect();
        assert_eq!(set.len(), 2);
        assert!(set.contains("RUST"));
        assert!(set.contains("async io"));
        assert_eq!(set.to_vec(), vec!["async io".to_string(), "rust".to_string()]);
    }

    #[test]
    fn test_keyword_set_intersection_sorted() {
        let a: KeywordSet = ["z", "y", "x"].into_iter().collect();
        let b: KeywordSet = ["w", "z", "y"].into_iter().collect();
        assert_eq!(a.intersection(&b), vec!["y".to_string(), "z".to_string()]);
        assert_eq!(a.union_len(&b), 4);
    }

    #[test]
    fn test_keyword_set_serializes_as_array() {
        let set: KeywordSet = ["b", "a"].into_iter().collect();
        let json = serde_json::to_string(&set).unwrap();
        assert_eq!(json, r#"["a","b"]"#);
        let back: KeywordSet = serde_json::from_str(&json).unwrap();
        assert_eq!(back, set);
    }

    #[test]
    fn test_relation_kind_parse() {
        assert_eq!("Creator".parse::<RelationKind>().unwrap(), RelationKind::Creator);
        assert_eq!(RelationKind::Mentioned.to_string(), "mentioned");
        assert!("owner".parse::<RelationKind>().is_err());
    }

    #[test]
    fn test_record_validity_tracks_fingerprint() {
        let t1 = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(2024, 1, 2, 9, 0, 0).unwrap();
        let record = EnrichedRecord {
            id: "100".to_string(),
            summary: "s".to_string(),
            alt_summary: None,
            keywords: KeywordSet::new(),
            persons: vec![],
            source_modified_at: t1,
            flags: EnrichmentFlags::default(),
            enriched_at: t1,
        };
        assert!(record.is_valid_for(&doc(t1)));
        assert!(!record.is_valid_for(&doc(t2)));
    }

    #[test]
    fn test_timestamp_round_trip_millis() {
        let parsed = parse_timestamp("2024-03-05T10:20:30.123456+09:00").unwrap();
        let formatted = format_timestamp(&parsed);
        assert_eq!(formatted, "2024-03-05T01:20:30.123Z");
        assert_eq!(parse_timestamp(&formatted).unwrap(), parsed);
        assert!(parse_timestamp("yesterday").is_err());
    }

    #[test]
    fn test_person_name_normalization() {
        assert_eq!(PersonEntity::normalize_name("  김철수님 "), "김철수");
        assert_eq!(PersonEntity::normalize_name("이영희씨"), "이영희");
        assert_eq!(PersonEntity::normalize_name("Jane   DOE"), "jane doe");
        // two-syllable names ending in the honorific character stay intact
        assert_eq!(PersonEntity::normalize_name("김님"), "김님");
    }

    #[test]
    fn test_document_validate() {
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert!(doc(t).validate().is_ok());
        let mut bad = doc(t);
        bad.title = "  ".to_string();
        assert!(matches!(bad.validate(), Err(DocgraphError::Structural { .. })));
    }
}
