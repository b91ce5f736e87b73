//! Corpus statistics read by the request layer and the `stats` binary.

use serde::Serialize;

use super::rows::{person_from_row, PERSON_COLUMNS};
use super::RecordStore;
use crate::error::{DocgraphError, Result};
use crate::models::{PersonEntity, RelationKind};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeywordCount {
    pub keyword: String,
    pub documents: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpaceCount {
    pub space_key: String,
    pub documents: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SpaceStats {
    pub space_key: String,
    pub documents: i64,
    pub enriched: i64,
    pub valid: i64,
    pub partial: i64,
    pub keywords: i64,
    pub persons: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CorpusStats {
    pub documents: i64,
    pub enriched: i64,
    pub valid: i64,
    pub stale: i64,
    pub partial: i64,
    pub keywords: i64,
    pub persons: i64,
    pub spaces: i64,
}

/// One person-to-document relation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PersonRelation {
    pub doc_id: String,
    pub relation: RelationKind,
    pub confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PersonStats {
    pub created: i64,
    pub modified: i64,
    pub mentioned: i64,
    /// Distinct documents related in any way.
    pub total: i64,
}

/// SQL predicate for a partially enriched record.
const PARTIAL_PREDICATE: &str = "(json_extract(r.flags_json, '$.summary_failed') = 1 \
     OR json_extract(r.flags_json, '$.keywords_failed') = 1 \
     OR json_extract(r.flags_json, '$.persons_failed') = 1)";

impl RecordStore {
    /// Keywords of valid records with document counts, most used first.
    pub async fn list_keywords(&self, space_key: Option<&str>, limit: Option<usize>) -> Result<Vec<KeywordCount>> {
        let space_key = space_key.map(str::to_string);
        let limit = limit.map(|l| l as i64).unwrap_or(-1);
        self.db()
            .with_connection(move |conn| {
                let mut stmt = conn.prepare(
                    r#"
                    SELECT k.keyword, COUNT(*) AS n
                    FROM record_keywords k
                    JOIN enriched_records r ON r.doc_id = k.doc_id
                    JOIN documents d ON d.doc_id = k.doc_id
                    WHERE r.source_modified_at = d.modified_at
                      AND (?1 IS NULL OR d.space_key = ?1)
                    GROUP BY k.keyword
                    ORDER BY n DESC, k.keyword ASC
                    LIMIT ?2
                    "#,
                )?;
                let rows = stmt.query_map(rusqlite::params![space_key, limit], |row| {
                    Ok(KeywordCount {
                        keyword: row.get(0)?,
                        documents: row.get(1)?,
                    })
                })?;
                let mut out = Vec::new();
                for row in rows {
                    out.push(row?);
                }
                Ok(out)
            })
            .await
    }

    pub async fn list_spaces(&self) -> Result<Vec<SpaceCount>> {
        self.db()
            .with_connection(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT space_key, COUNT(*) FROM documents GROUP BY space_key ORDER BY space_key",
                )?;
                let rows = stmt.query_map([], |row| {
                    Ok(SpaceCount {
                        space_key: row.get(0)?,
                        documents: row.get(1)?,
                    })
                })?;
                let mut out = Vec::new();
                for row in rows {
                    out.push(row?);
                }
                Ok(out)
            })
            .await
    }

    pub async fn space_stats(&self, space_key: &str) -> Result<SpaceStats> {
        let space_key = space_key.to_string();
        self.db()
            .with_connection(move |conn| {
                let sql = format!(
                    r#"
                    SELECT
                        COUNT(*),
                        COUNT(r.doc_id),
                        COALESCE(SUM(r.source_modified_at = d.modified_at), 0),
                        COALESCE(SUM(r.doc_id IS NOT NULL AND {partial}), 0),
                        (SELECT COUNT(DISTINCT k.keyword) FROM record_keywords k
                            JOIN documents d2 ON d2.doc_id = k.doc_id WHERE d2.space_key = ?1),
                        (SELECT COUNT(DISTINCT p.person_id) FROM person_relations p
                            JOIN documents d3 ON d3.doc_id = p.doc_id WHERE d3.space_key = ?1)
                    FROM documents d
                    LEFT JOIN enriched_records r ON r.doc_id = d.doc_id
                    WHERE d.space_key = ?1
                    "#,
                    partial = PARTIAL_PREDICATE
                );
                let stats = conn.query_row(&sql, [&space_key], |row| {
                    Ok(SpaceStats {
                        space_key: space_key.clone(),
                        documents: row.get(0)?,
                        enriched: row.get(1)?,
                        valid: row.get(2)?,
                        partial: row.get(3)?,
                        keywords: row.get(4)?,
                        persons: row.get(5)?,
                    })
                })?;
                Ok(stats)
            })
            .await
    }

    pub async fn corpus_stats(&self) -> Result<CorpusStats> {
        self.db()
            .with_connection(|conn| {
                let sql = format!(
                    r#"
                    SELECT
                        COUNT(*),
                        COUNT(r.doc_id),
                        COALESCE(SUM(r.source_modified_at = d.modified_at), 0),
                        COALESCE(SUM(r.source_modified_at != d.modified_at), 0),
                        COALESCE(SUM(r.doc_id IS NOT NULL AND {partial}), 0),
                        (SELECT COUNT(DISTINCT keyword) FROM record_keywords),
                        (SELECT COUNT(*) FROM persons),
                        COUNT(DISTINCT d.space_key)
                    FROM documents d
                    LEFT JOIN enriched_records r ON r.doc_id = d.doc_id
                    "#,
                    partial = PARTIAL_PREDICATE
                );
                Ok(conn.query_row(&sql, [], |row| {
                    Ok(CorpusStats {
                        documents: row.get(0)?,
                        enriched: row.get(1)?,
                        valid: row.get(2)?,
                        stale: row.get(3)?,
                        partial: row.get(4)?,
                        keywords: row.get(5)?,
                        persons: row.get(6)?,
                        spaces: row.get(7)?,
                    })
                })?)
            })
            .await
    }

    /// All persons, most mentioned first.
    pub async fn list_persons(&self) -> Result<Vec<PersonEntity>> {
        self.db()
            .with_connection(|conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM persons ORDER BY mention_count DESC, normalized_name ASC",
                    PERSON_COLUMNS
                ))?;
                let rows = stmt.query_map([], person_from_row)?;
                let mut out = Vec::new();
                for row in rows {
                    out.push(row?);
                }
                Ok(out)
            })
            .await
    }

    /// Relations of one person, optionally of a single kind, ordered by document id.
    pub async fn person_relations(
        &self,
        person_id: i64,
        kind: Option<RelationKind>,
    ) -> Result<Vec<PersonRelation>> {
        let kind = kind.map(|k| k.as_str().to_string());
        self.db()
            .with_connection(move |conn| {
                let mut stmt = conn.prepare(
                    r#"
                    SELECT doc_id, relation_kind, confidence, context
                    FROM person_relations
                    WHERE person_id = ?1 AND (?2 IS NULL OR relation_kind = ?2)
                    ORDER BY doc_id, relation_kind
                    "#,
                )?;
                let rows = stmt.query_map(rusqlite::params![person_id, kind], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, f64>(2)?,
                        row.get::<_, Option<String>>(3)?,
                    ))
                })?;
                let mut out = Vec::new();
                for row in rows {
                    let (doc_id, relation, confidence, context) = row?;
                    out.push(PersonRelation {
                        doc_id,
                        relation: relation.parse()?,
                        confidence,
                        context,
                    });
                }
                Ok(out)
            })
            .await
    }

    pub async fn person_stats(&self, person_id: i64) -> Result<PersonStats> {
        self.db()
            .with_connection(move |conn| {
                let exists: bool = conn.query_row(
                    "SELECT EXISTS(SELECT 1 FROM persons WHERE person_id = ?1)",
                    [person_id],
                    |row| row.get(0),
                )?;
                if !exists {
                    return Err(DocgraphError::PersonNotFound(person_id.to_string()));
                }
                Ok(conn.query_row(
                    r#"
                    SELECT
                        COALESCE(SUM(relation_kind = 'creator'), 0),
                        COALESCE(SUM(relation_kind = 'modifier'), 0),
                        COALESCE(SUM(relation_kind = 'mentioned'), 0),
                        COUNT(DISTINCT doc_id)
                    FROM person_relations WHERE person_id = ?1
                    "#,
                    [person_id],
                    |row| {
                        Ok(PersonStats {
                            created: row.get(0)?,
                            modified: row.get(1)?,
                            mentioned: row.get(2)?,
                            total: row.get(3)?,
                        })
                    },
                )?)
            })
            .await
    }
}
