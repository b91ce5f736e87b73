//! Lazy, restartable scans over enrichment records.
//!
//! Pages are keyset-paginated by document id, so a scan can be resumed from
//! its last cursor after the process restarts or the store changes.

use serde::{Deserialize, Serialize};

use super::rows::{DocumentRow, RecordRow, DOCUMENT_COLUMNS, DOCUMENT_COLUMN_COUNT, RECORD_COLUMNS};
use super::RecordStore;
use crate::error::Result;
use crate::models::{Document, EnrichedRecord, KeywordSet};

const DEFAULT_BATCH_SIZE: usize = 200;

/// Which records a scan yields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScanFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub space_key: Option<String>,
    /// Only records carrying this keyword (normalized before matching).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyword: Option<String>,
    /// Restrict to these document ids.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ids: Option<Vec<String>>,
    /// Also yield stale records.
    #[serde(default)]
    pub include_stale: bool,
}

impl ScanFilter {
    pub fn valid() -> Self {
        Self::default()
    }

    pub fn in_space(mut self, space_key: Option<&str>) -> Self {
        self.space_key = space_key.map(str::to_string);
        self
    }

    pub fn with_keyword(mut self, keyword: &str) -> Self {
        self.keyword = Some(keyword.to_string());
        self
    }

    pub fn with_ids(mut self, ids: Vec<String>) -> Self {
        self.ids = Some(ids);
        self
    }
}

/// A document joined with its record.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanItem {
    pub document: Document,
    pub record: EnrichedRecord,
}

pub struct RecordScan {
    store: RecordStore,
    filter: ScanFilter,
    /// Sorted, deduplicated id restriction.
    ids: Option<Vec<String>>,
    cursor: Option<String>,
    batch_size: usize,
    done: bool,
}

impl RecordStore {
    pub fn scan(&self, filter: ScanFilter) -> RecordScan {
        self.scan_from(filter, None)
    }

    /// Resume a scan after `cursor` (the last id of a previous batch).
    pub fn scan_from(&self, filter: ScanFilter, cursor: Option<String>) -> RecordScan {
        let ids = filter.ids.clone().map(|mut ids| {
            ids.sort();
            ids.dedup();
            ids
        });
        RecordScan {
            store: self.clone(),
            filter,
            ids,
            cursor,
            batch_size: DEFAULT_BATCH_SIZE,
            done: false,
        }
    }
}

impl RecordScan {
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Last id handed out; pass to `RecordStore::scan_from` to resume.
    pub fn cursor(&self) -> Option<&str> {
        self.cursor.as_deref()
    }

    /// Next page in id order, or `None` once the scan is exhausted.
    pub async fn next_batch(&mut self) -> Result<Option<Vec<ScanItem>>> {
        while !self.done {
            let window = match &self.ids {
                Some(ids) => {
                    let start = match &self.cursor {
                        Some(c) => ids.partition_point(|id| id <= c),
                        None => 0,
                    };
                    let window: Vec<String> =
                        ids[start..].iter().take(self.batch_size).cloned().collect();
                    if window.is_empty() {
                        self.done = true;
                        break;
                    }
                    Some(window)
                }
                None => None,
            };

            let items = self.fetch_page(window.clone()).await?;

            match window {
                // advance past the whole window even when some ids had no record
                Some(window) => {
                    self.cursor = window.last().cloned();
                    if !items.is_empty() {
                        return Ok(Some(items));
                    }
                }
                None => {
                    if items.len() < self.batch_size {
                        self.done = true;
                    }
                    if let Some(last) = items.last() {
                        self.cursor = Some(last.document.id.clone());
                        return Ok(Some(items));
                    }
                }
            }
        }
        Ok(None)
    }

    /// Drain the remaining batches.
    pub async fn collect_all(mut self) -> Result<Vec<ScanItem>> {
        let mut out = Vec::new();
        while let Some(batch) = self.next_batch().await? {
            out.extend(batch);
        }
        Ok(out)
    }

    async fn fetch_page(&self, window: Option<Vec<String>>) -> Result<Vec<ScanItem>> {
        let mut sql = format!(
            "SELECT {}, r.doc_id, {} FROM enriched_records r JOIN documents d ON d.doc_id = r.doc_id WHERE 1 = 1",
            DOCUMENT_COLUMNS, RECORD_COLUMNS
        );
        let mut params: Vec<Box<dyn rusqlite::ToSql + Send>> = Vec::new();

        if !self.filter.include_stale {
            sql.push_str(" AND r.source_modified_at = d.modified_at");
        }
        if let Some(space) = &self.filter.space_key {
            sql.push_str(" AND d.space_key = ?");
            params.push(Box::new(space.clone()));
        }
        if let Some(keyword) = &self.filter.keyword {
            sql.push_str(
                " AND EXISTS (SELECT 1 FROM record_keywords k WHERE k.doc_id = r.doc_id AND k.keyword = ?)",
            );
            params.push(Box::new(KeywordSet::normalize(keyword).unwrap_or_default()));
        }
        match &window {
            Some(ids) => {
                let placeholders = vec!["?"; ids.len()].join(",");
                sql.push_str(&format!(" AND d.doc_id IN ({})", placeholders));
                for id in ids {
                    params.push(Box::new(id.clone()));
                }
            }
            None => {
                if let Some(cursor) = &self.cursor {
                    sql.push_str(" AND d.doc_id > ?");
                    params.push(Box::new(cursor.clone()));
                }
            }
        }
        sql.push_str(" ORDER BY d.doc_id");
        if window.is_none() {
            sql.push_str(&format!(" LIMIT {}", self.batch_size));
        }

        self.store
            .db()
            .with_connection(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let raw = stmt.query_map(
                    rusqlite::params_from_iter(params.iter().map(|p| p.as_ref() as &dyn rusqlite::ToSql)),
                    |row| {
                        Ok((
                            DocumentRow::from_row(row)?,
                            RecordRow::from_row(row, DOCUMENT_COLUMN_COUNT)?,
                        ))
                    },
                )?;
                let mut out = Vec::new();
                for item in raw {
                    let (doc, rec) = item?;
                    out.push(ScanItem {
                        document: doc.into_document()?,
                        record: rec.into_record()?,
                    });
                }
                Ok(out)
            })
            .await
    }
}
