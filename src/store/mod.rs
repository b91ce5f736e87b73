//! Enrichment Store: documents, enrichment records, and person relations.
//!
//! Every write is one SQLite transaction, so a record, its keyword rows, and
//! its person relations appear together or not at all. Readers never see a
//! half-written record. Write transactions take the write lock up front so
//! concurrent writers wait on `busy_timeout` instead of failing on upgrade.

mod rows;
pub mod scan;
pub mod stats;

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Transaction, TransactionBehavior};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::db::Db;
use crate::error::{DocgraphError, Result};
use crate::models::{
    format_timestamp, normalize_timestamp, parse_timestamp, Document, EnrichedRecord, PersonEntity,
};

pub use scan::{RecordScan, ScanFilter, ScanItem};
pub use stats::{CorpusStats, KeywordCount, PersonRelation, PersonStats, SpaceCount, SpaceStats};

/// Bound on SQL parameters per `IN (...)` list.
const IN_CHUNK: usize = 500;

#[derive(Debug, Clone)]
pub struct RecordStore {
    db: Db,
    generation: Arc<AtomicU64>,
}

impl RecordStore {
    pub fn new(db: Db) -> Self {
        Self {
            db,
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    /// Monotonic counter bumped after every committed write.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    fn bump(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Upsert fetched documents in a single transaction.
    pub async fn put_documents(&self, documents: &[Document]) -> Result<usize> {
        if documents.is_empty() {
            return Ok(0);
        }
        let documents = documents.to_vec();
        let count = self
            .db
            .with_connection(move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let fetched_at = format_timestamp(&Utc::now());
                for doc in &documents {
                    upsert_document(&tx, doc, &fetched_at)?;
                }
                tx.commit()?;
                Ok(documents.len())
            })
            .await?;
        self.bump();
        Ok(count)
    }

    pub async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        let id = id.to_string();
        self.db
            .with_connection(move |conn| {
                let row = conn
                    .query_row(
                        &format!("SELECT {} FROM documents d WHERE d.doc_id = ?1", rows::DOCUMENT_COLUMNS),
                        [&id],
                        rows::DocumentRow::from_row,
                    )
                    .optional()?;
                row.map(rows::DocumentRow::into_document).transpose()
            })
            .await
    }

    /// Atomically replace the record for `record.id`.
    ///
    /// The document must already be stored. Keyword rows and person
    /// relations of the previous record are replaced, and mention counts of
    /// every affected person are recomputed in the same transaction.
    pub async fn put_enriched(&self, record: &EnrichedRecord) -> Result<()> {
        let record = record.clone();
        self.db
            .with_connection(move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let exists: bool = tx.query_row(
                    "SELECT EXISTS(SELECT 1 FROM documents WHERE doc_id = ?1)",
                    [&record.id],
                    |row| row.get(0),
                )?;
                if !exists {
                    return Err(DocgraphError::DocumentNotFound(record.id.clone()));
                }

                tx.execute(
                    r#"
                    INSERT INTO enriched_records (
                        doc_id, summary, alt_summary, keywords_json, persons_json,
                        source_modified_at, flags_json, enriched_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                    ON CONFLICT(doc_id) DO UPDATE SET
                        summary = excluded.summary,
                        alt_summary = excluded.alt_summary,
                        keywords_json = excluded.keywords_json,
                        persons_json = excluded.persons_json,
                        source_modified_at = excluded.source_modified_at,
                        flags_json = excluded.flags_json,
                        enriched_at = excluded.enriched_at
                    "#,
                    params![
                        record.id,
                        record.summary,
                        record.alt_summary,
                        serde_json::to_string(&record.keywords)?,
                        serde_json::to_string(&record.persons)?,
                        format_timestamp(&record.source_modified_at),
                        serde_json::to_string(&record.flags)?,
                        format_timestamp(&record.enriched_at),
                    ],
                )?;

                tx.execute("DELETE FROM record_keywords WHERE doc_id = ?1", [&record.id])?;
                {
                    let mut stmt = tx.prepare(
                        "INSERT OR IGNORE INTO record_keywords (doc_id, keyword) VALUES (?1, ?2)",
                    )?;
                    for keyword in record.keywords.iter() {
                        stmt.execute(params![record.id, keyword])?;
                    }
                }

                replace_person_relations(&tx, &record)?;
                tx.commit()?;
                Ok(())
            })
            .await?;
        self.bump();
        Ok(())
    }

    /// The stored record, valid or stale.
    pub async fn get(&self, id: &str) -> Result<Option<EnrichedRecord>> {
        let id = id.to_string();
        self.db
            .with_connection(move |conn| {
                let row = conn
                    .query_row(
                        &format!(
                            "SELECT r.doc_id, {} FROM enriched_records r WHERE r.doc_id = ?1",
                            rows::RECORD_COLUMNS
                        ),
                        [&id],
                        |row| rows::RecordRow::from_row(row, 0),
                    )
                    .optional()?;
                row.map(rows::RecordRow::into_record).transpose()
            })
            .await
    }

    /// Delete a document with its record, keywords, and relations.
    ///
    /// Person rows stay; only their mention counts change.
    pub async fn delete(&self, id: &str) -> Result<bool> {
        Ok(self.purge_records(&[id.to_string()]).await? > 0)
    }

    /// Delete several documents in one transaction; returns how many existed.
    pub async fn purge_records(&self, ids: &[String]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let ids = ids.to_vec();
        let deleted = self
            .db
            .with_connection(move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let mut affected: BTreeSet<i64> = BTreeSet::new();
                let mut deleted = 0;
                for id in &ids {
                    affected.extend(person_ids_for_doc(&tx, id)?);
                    deleted += tx.execute("DELETE FROM documents WHERE doc_id = ?1", [id])?;
                }
                recompute_mention_counts(&tx, &affected)?;
                tx.commit()?;
                Ok(deleted)
            })
            .await?;
        if deleted > 0 {
            log::info!("Purged {} document(s)", deleted);
            self.bump();
        }
        Ok(deleted)
    }

    /// `source_modified_at` of stored records for the given ids.
    pub async fn fingerprints(&self, ids: &[String]) -> Result<HashMap<String, DateTime<Utc>>> {
        let ids = ids.to_vec();
        self.db
            .with_connection(move |conn| {
                let mut out = HashMap::new();
                for chunk in ids.chunks(IN_CHUNK) {
                    let placeholders = vec!["?"; chunk.len()].join(",");
                    let mut stmt = conn.prepare(&format!(
                        "SELECT doc_id, source_modified_at FROM enriched_records WHERE doc_id IN ({})",
                        placeholders
                    ))?;
                    let rows = stmt.query_map(rusqlite::params_from_iter(chunk.iter()), |row| {
                        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                    })?;
                    for row in rows {
                        let (id, ts) = row?;
                        out.insert(id, parse_timestamp(&ts)?);
                    }
                }
                Ok(out)
            })
            .await
    }

    /// Direct children of `parent_id`, sorted by id.
    pub async fn children_of(&self, parent_id: &str) -> Result<Vec<String>> {
        let parent_id = parent_id.to_string();
        self.db
            .with_connection(move |conn| {
                let mut stmt =
                    conn.prepare("SELECT doc_id FROM documents WHERE parent_id = ?1 ORDER BY doc_id")?;
                let rows = stmt.query_map([&parent_id], |row| row.get::<_, String>(0))?;
                let mut out = Vec::new();
                for row in rows {
                    out.push(row?);
                }
                Ok(out)
            })
            .await
    }

    /// Ids of the `limit` most recently modified documents with a valid record.
    pub async fn recent_valid_ids(&self, space_key: Option<&str>, limit: usize) -> Result<Vec<String>> {
        let space_key = space_key.map(str::to_string);
        self.db
            .with_connection(move |conn| {
                let mut stmt = conn.prepare(
                    r#"
                    SELECT d.doc_id FROM documents d
                    JOIN enriched_records r ON r.doc_id = d.doc_id
                    WHERE r.source_modified_at = d.modified_at
                      AND (?1 IS NULL OR d.space_key = ?1)
                    ORDER BY d.modified_at DESC, d.doc_id ASC
                    LIMIT ?2
                    "#,
                )?;
                let rows = stmt.query_map(params![space_key, limit as i64], |row| row.get::<_, String>(0))?;
                let mut out = Vec::new();
                for row in rows {
                    out.push(row?);
                }
                Ok(out)
            })
            .await
    }

    /// Person by any spelling of their name.
    pub async fn person_by_name(&self, name: &str) -> Result<Option<PersonEntity>> {
        let normalized = PersonEntity::normalize_name(name);
        self.db
            .with_connection(move |conn| {
                Ok(conn
                    .query_row(
                        &format!("SELECT {} FROM persons WHERE normalized_name = ?1", rows::PERSON_COLUMNS),
                        [&normalized],
                        rows::person_from_row,
                    )
                    .optional()?)
            })
            .await
    }
}

fn upsert_document(tx: &Transaction<'_>, doc: &Document, fetched_at: &str) -> Result<()> {
    tx.execute(
        r#"
        INSERT INTO documents (
            doc_id, title, raw_content, space_key, url, parent_id,
            created_at, modified_at, created_by, modified_by, fetched_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
        ON CONFLICT(doc_id) DO UPDATE SET
            title = excluded.title,
            raw_content = excluded.raw_content,
            space_key = excluded.space_key,
            url = excluded.url,
            parent_id = excluded.parent_id,
            created_at = excluded.created_at,
            modified_at = excluded.modified_at,
            created_by = excluded.created_by,
            modified_by = excluded.modified_by,
            fetched_at = excluded.fetched_at
        "#,
        params![
            doc.id,
            doc.title,
            doc.raw_content,
            doc.space_key,
            doc.url,
            doc.parent_id,
            format_timestamp(&normalize_timestamp(doc.created_at)),
            format_timestamp(&normalize_timestamp(doc.modified_at)),
            doc.created_by,
            doc.modified_by,
            fetched_at,
        ],
    )?;
    Ok(())
}

fn person_ids_for_doc(tx: &Transaction<'_>, doc_id: &str) -> Result<Vec<i64>> {
    let mut stmt = tx.prepare("SELECT DISTINCT person_id FROM person_relations WHERE doc_id = ?1")?;
    let rows = stmt.query_map([doc_id], |row| row.get::<_, i64>(0))?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

fn replace_person_relations(tx: &Transaction<'_>, record: &EnrichedRecord) -> Result<()> {
    let mut affected: BTreeSet<i64> = person_ids_for_doc(tx, &record.id)?.into_iter().collect();
    tx.execute("DELETE FROM person_relations WHERE doc_id = ?1", [&record.id])?;

    let now = format_timestamp(&Utc::now());
    for mention in &record.persons {
        let normalized = mention.normalized_name();
        if normalized.is_empty() {
            continue;
        }
        tx.execute(
            r#"
            INSERT INTO persons (
                normalized_name, display_name, email, department, role,
                mention_count, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?6)
            ON CONFLICT(normalized_name) DO UPDATE SET
                email = COALESCE(excluded.email, persons.email),
                department = COALESCE(excluded.department, persons.department),
                role = COALESCE(excluded.role, persons.role),
                updated_at = excluded.updated_at
            "#,
            params![
                normalized,
                mention.name,
                mention.email,
                mention.department,
                mention.role,
                now
            ],
        )?;
        let person_id: i64 = tx.query_row(
            "SELECT person_id FROM persons WHERE normalized_name = ?1",
            [&normalized],
            |row| row.get(0),
        )?;
        tx.execute(
            r#"
            INSERT OR REPLACE INTO person_relations (person_id, doc_id, relation_kind, confidence, context)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                person_id,
                record.id,
                mention.relation.as_str(),
                mention.confidence.clamp(0.0, 1.0),
                mention.context
            ],
        )?;
        affected.insert(person_id);
    }

    recompute_mention_counts(tx, &affected)
}

fn recompute_mention_counts(tx: &Transaction<'_>, person_ids: &BTreeSet<i64>) -> Result<()> {
    let mut stmt = tx.prepare(
        r#"
        UPDATE persons SET mention_count = (
            SELECT COUNT(*) FROM person_relations
            WHERE person_relations.person_id = persons.person_id
              AND relation_kind = 'mentioned'
        )
        WHERE person_id = ?1
        "#,
    )?;
    for id in person_ids {
        stmt.execute([id])?;
    }
    Ok(())
}
