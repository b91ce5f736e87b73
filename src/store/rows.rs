//! Row mapping shared by store queries.

use rusqlite::Row;

use crate::error::Result;
use crate::models::{parse_timestamp, Document, EnrichedRecord, PersonEntity};

pub(crate) const DOCUMENT_COLUMNS: &str = "d.doc_id, d.title, d.raw_content, d.space_key, d.url, \
     d.parent_id, d.created_at, d.modified_at, d.created_by, d.modified_by";

/// Record columns; callers select `r.doc_id` immediately before these.
pub(crate) const RECORD_COLUMNS: &str = "r.summary, r.alt_summary, r.keywords_json, r.persons_json, \
     r.source_modified_at, r.flags_json, r.enriched_at";

pub(crate) const DOCUMENT_COLUMN_COUNT: usize = 10;

pub(crate) const PERSON_COLUMNS: &str =
    "person_id, normalized_name, display_name, email, department, role, mention_count";

/// Raw document columns; timestamps are parsed outside the row closure.
pub(crate) struct DocumentRow {
    id: String,
    title: String,
    raw_content: String,
    space_key: String,
    url: String,
    parent_id: Option<String>,
    created_at: String,
    modified_at: String,
    created_by: Option<String>,
    modified_by: Option<String>,
}

impl DocumentRow {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            title: row.get(1)?,
            raw_content: row.get(2)?,
            space_key: row.get(3)?,
            url: row.get(4)?,
            parent_id: row.get(5)?,
            created_at: row.get(6)?,
            modified_at: row.get(7)?,
            created_by: row.get(8)?,
            modified_by: row.get(9)?,
        })
    }

    pub(crate) fn into_document(self) -> Result<Document> {
        Ok(Document {
            created_at: parse_timestamp(&self.created_at)?,
            modified_at: parse_timestamp(&self.modified_at)?,
            id: self.id,
            title: self.title,
            raw_content: self.raw_content,
            space_key: self.space_key,
            url: self.url,
            parent_id: self.parent_id,
            created_by: self.created_by,
            modified_by: self.modified_by,
        })
    }
}

pub(crate) struct RecordRow {
    id: String,
    summary: String,
    alt_summary: Option<String>,
    keywords_json: String,
    persons_json: String,
    source_modified_at: String,
    flags_json: String,
    enriched_at: String,
}

impl RecordRow {
    /// Read `r.doc_id` at `offset` followed by `RECORD_COLUMNS`.
    pub(crate) fn from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(offset)?,
            summary: row.get(offset + 1)?,
            alt_summary: row.get(offset + 2)?,
            keywords_json: row.get(offset + 3)?,
            persons_json: row.get(offset + 4)?,
            source_modified_at: row.get(offset + 5)?,
            flags_json: row.get(offset + 6)?,
            enriched_at: row.get(offset + 7)?,
        })
    }

    pub(crate) fn into_record(self) -> Result<EnrichedRecord> {
        Ok(EnrichedRecord {
            id: self.id,
            summary: self.summary,
            alt_summary: self.alt_summary,
            keywords: serde_json::from_str(&self.keywords_json)?,
            persons: serde_json::from_str(&self.persons_json)?,
            source_modified_at: parse_timestamp(&self.source_modified_at)?,
            flags: serde_json::from_str(&self.flags_json)?,
            enriched_at: parse_timestamp(&self.enriched_at)?,
        })
    }
}

pub(crate) fn person_from_row(row: &Row<'_>) -> rusqlite::Result<PersonEntity> {
    Ok(PersonEntity {
        person_id: row.get(0)?,
        normalized_name: row.get(1)?,
        display_name: row.get(2)?,
        email: row.get(3)?,
        department: row.get(4)?,
        role: row.get(5)?,
        mention_count: row.get(6)?,
    })
}
