//! Per-document enrichment with record-level partial success.

use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::chunker::{chunk_text, ChunkSpec};
use super::keywords::{
    collect_keywords, heuristic_keywords, top_up, NO_CONTENT_KEYWORD, PLACEHOLDER_SUMMARY,
};
use super::persons::{extract_name_candidates, matches_candidate, structural_mentions};
use crate::config::EnrichmentConfig;
use crate::error::Result;
use crate::llm::{ProviderError, SummaryOptions, TextGenerator};
use crate::models::{
    normalize_timestamp, Document, EnrichedRecord, EnrichmentFlags, KeywordSet, PersonMention,
    RelationKind,
};

/// Below this many characters a document has no usable body.
const EMPTY_CONTENT_CHARS: usize = 10;
/// Below this many characters the body itself is the summary.
const SHORT_CONTENT_CHARS: usize = 100;
/// Above this many characters a retrieval-oriented summary is also produced.
const ALT_SUMMARY_MIN_CHARS: usize = 512;
/// Provider keyword lists shorter than this are topped up heuristically.
const MIN_PROVIDER_KEYWORDS: usize = 2;
/// Joined chunk summaries longer than this are summarized once more.
const COMBINED_SUMMARY_CHARS: usize = 1000;

#[derive(Debug, Clone)]
pub struct EnrichmentSettings {
    pub max_keywords: usize,
    pub max_name_candidates: usize,
    pub min_person_confidence: f64,
    pub retrieval_summary: bool,
    /// Bodies longer than `chunk.size` are summarized and mined per chunk.
    pub chunk: ChunkSpec,
    /// Leading chunks sent to providers; the rest of the body is ignored.
    pub max_chunks: usize,
}

impl Default for EnrichmentSettings {
    fn default() -> Self {
        Self {
            max_keywords: 15,
            max_name_candidates: 20,
            min_person_confidence: 0.3,
            retrieval_summary: true,
            chunk: ChunkSpec::default(),
            max_chunks: 5,
        }
    }
}

impl From<&EnrichmentConfig> for EnrichmentSettings {
    fn from(config: &EnrichmentConfig) -> Self {
        Self {
            max_keywords: config.max_keywords,
            max_name_candidates: config.max_name_candidates,
            min_person_confidence: config.min_person_confidence,
            retrieval_summary: config.retrieval_summary,
            chunk: ChunkSpec::new(config.chunk_chars, config.chunk_overlap_chars),
            max_chunks: config.max_chunks.max(1),
        }
    }
}

/// Drives summary, keyword, and person extraction for one document.
#[derive(Clone)]
pub struct Enricher {
    generator: Arc<dyn TextGenerator>,
    settings: EnrichmentSettings,
}

impl Enricher {
    pub fn new(generator: Arc<dyn TextGenerator>, settings: EnrichmentSettings) -> Self {
        Self {
            generator,
            settings,
        }
    }

    pub fn settings(&self) -> &EnrichmentSettings {
        &self.settings
    }

    /// Enrich one document.
    ///
    /// Provider failures never surface here: each sub-task degrades to its
    /// placeholder and sets a flag. The only error is a structurally invalid
    /// document.
    pub async fn enrich(&self, doc: &Document) -> Result<EnrichedRecord> {
        doc.validate()?;

        let content = doc.raw_content.trim();
        let content_chars = content.chars().count();
        let mut flags = EnrichmentFlags::default();
        let mut persons = structural_mentions(doc);

        let (summary, alt_summary, keywords) = if content_chars < EMPTY_CONTENT_CHARS {
            log::debug!("Document {} has no usable content", doc.id);
            let mut keywords = KeywordSet::new();
            keywords.insert(NO_CONTENT_KEYWORD);
            keywords.insert(&doc.title);
            (format!("Page title: {}", doc.title), None, keywords)
        } else if content_chars < SHORT_CONTENT_CHARS {
            let text = format!("{} {}", doc.title, content);
            let max = self.settings.max_keywords;
            let mut keywords = collect_keywords(&heuristic_keywords(&text, max), max);
            if keywords.is_empty() {
                keywords.insert(&doc.title);
            }
            persons.extend(self.mentioned_persons(doc, content, &mut flags).await);
            (content.to_string(), None, keywords)
        } else {
            let summary = self.summary(doc, content, &mut flags).await;
            let alt_summary = self.alt_summary(doc, content, content_chars, &mut flags).await;
            let keywords = self.keywords(doc, content, &mut flags).await;
            persons.extend(self.mentioned_persons(doc, content, &mut flags).await);
            (summary, alt_summary, keywords)
        };

        if flags.is_partial() {
            log::warn!(
                "Document {} partially enriched (summary_failed={}, keywords_failed={}, persons_failed={})",
                doc.id,
                flags.summary_failed,
                flags.keywords_failed,
                flags.persons_failed
            );
        }

        Ok(EnrichedRecord {
            id: doc.id.clone(),
            summary,
            alt_summary,
            keywords,
            persons,
            source_modified_at: normalize_timestamp(doc.modified_at),
            flags,
            enriched_at: normalize_timestamp(Utc::now()),
        })
    }

    async fn summary(&self, doc: &Document, content: &str, flags: &mut EnrichmentFlags) -> String {
        match self
            .summarize_body(content, &SummaryOptions::general(&doc.title))
            .await
        {
            Ok(summary) => summary,
            Err(e) => {
                note_failure(flags, &e);
                flags.summary_failed = true;
                log::warn!("Summary for {} degraded to placeholder: {}", doc.id, e);
                PLACEHOLDER_SUMMARY.to_string()
            }
        }
    }

    async fn alt_summary(
        &self,
        doc: &Document,
        content: &str,
        content_chars: usize,
        flags: &mut EnrichmentFlags,
    ) -> Option<String> {
        if !self.settings.retrieval_summary || content_chars <= ALT_SUMMARY_MIN_CHARS {
            return None;
        }
        match self
            .summarize_body(content, &SummaryOptions::retrieval(&doc.title))
            .await
        {
            Ok(summary) => Some(summary),
            Err(e) => {
                note_failure(flags, &e);
                flags.alt_summary_failed = true;
                log::debug!("Retrieval summary for {} skipped: {}", doc.id, e);
                None
            }
        }
    }

    async fn keywords(&self, doc: &Document, content: &str, flags: &mut EnrichmentFlags) -> KeywordSet {
        let max = self.settings.max_keywords;
        let text = format!("{}\n\n{}", doc.title, content);

        match self.extract_body_keywords(&doc.title, content, max).await {
            Ok(terms) => {
                let mut keywords = collect_keywords(&terms, max);
                if keywords.len() < MIN_PROVIDER_KEYWORDS {
                    top_up(&mut keywords, &text, max);
                }
                keywords
            }
            Err(e) => {
                note_failure(flags, &e);
                flags.keywords_failed = true;
                log::warn!("Keywords for {} degraded to heuristic extraction: {}", doc.id, e);
                collect_keywords(&heuristic_keywords(&text, max), max)
            }
        }
    }

    fn chunks(&self, content: &str) -> Option<Vec<String>> {
        if content.chars().count() <= self.settings.chunk.size {
            return None;
        }
        let mut chunks = chunk_text(content, self.settings.chunk);
        chunks.truncate(self.settings.max_chunks);
        Some(chunks)
    }

    /// Summarize the body directly, or chunk by chunk when it is long.
    ///
    /// Failed chunks are skipped; the call fails only when every chunk did.
    /// Joined chunk summaries above `COMBINED_SUMMARY_CHARS` are condensed by
    /// one more call, falling back to the clipped join.
    async fn summarize_body(
        &self,
        content: &str,
        opts: &SummaryOptions,
    ) -> std::result::Result<String, ProviderError> {
        let Some(chunks) = self.chunks(content) else {
            return self.generator.summarize(content, opts).await;
        };

        let mut parts = Vec::new();
        let mut last_error = None;
        for (i, chunk) in chunks.iter().enumerate() {
            match self.generator.summarize(chunk, opts).await {
                Ok(part) if !part.trim().is_empty() => parts.push(part.trim().to_string()),
                Ok(_) => log::debug!("Chunk {} produced an empty summary", i),
                Err(e) => {
                    log::debug!("Chunk {} summary failed: {}", i, e);
                    last_error = Some(e);
                }
            }
        }
        if parts.is_empty() {
            return Err(last_error.unwrap_or_else(|| ProviderError::fatal("enricher", "no chunk summaries")));
        }
        log::debug!("Summarized {} of {} chunk(s)", parts.len(), chunks.len());

        let combined = parts.join(" ");
        if combined.chars().count() <= COMBINED_SUMMARY_CHARS {
            return Ok(combined);
        }
        match self.generator.summarize(&combined, opts).await {
            Ok(condensed) if !condensed.trim().is_empty() => Ok(condensed),
            _ => Ok(clip_chars(&combined, COMBINED_SUMMARY_CHARS)),
        }
    }

    /// Provider keywords for the body, ranked by how many chunks named them.
    async fn extract_body_keywords(
        &self,
        title: &str,
        content: &str,
        max: usize,
    ) -> std::result::Result<Vec<String>, ProviderError> {
        let Some(chunks) = self.chunks(content) else {
            let text = format!("{}\n\n{}", title, content);
            return self.generator.extract_keywords(&text, max).await;
        };

        // keyword -> (chunks naming it, first position)
        let mut seen: HashMap<String, (usize, usize)> = HashMap::new();
        let mut answered = 0;
        let mut last_error = None;
        for chunk in &chunks {
            let text = format!("{}\n\n{}", title, chunk);
            match self.generator.extract_keywords(&text, max).await {
                Ok(terms) => {
                    answered += 1;
                    let mut in_chunk = HashSet::new();
                    for term in terms {
                        let Some(kw) = KeywordSet::normalize(&term) else { continue };
                        if in_chunk.insert(kw.clone()) {
                            let position = seen.len();
                            seen.entry(kw).or_insert((0, position)).0 += 1;
                        }
                    }
                }
                Err(e) => last_error = Some(e),
            }
        }
        if answered == 0 {
            return Err(last_error.unwrap_or_else(|| ProviderError::fatal("enricher", "no chunk keywords")));
        }

        let mut ranked: Vec<(String, (usize, usize))> = seen.into_iter().collect();
        ranked.sort_by(|a, b| b.1 .0.cmp(&a.1 .0).then(a.1 .1.cmp(&b.1 .1)));
        Ok(ranked.into_iter().take(max).map(|(kw, _)| kw).collect())
    }

    /// Two-stage extraction: regex candidates, then provider confirmation.
    async fn mentioned_persons(
        &self,
        doc: &Document,
        content: &str,
        flags: &mut EnrichmentFlags,
    ) -> Vec<PersonMention> {
        let candidates = extract_name_candidates(content, self.settings.max_name_candidates);
        if candidates.is_empty() {
            return Vec::new();
        }

        let confirmed = match self
            .generator
            .validate_candidate_names(content, &doc.title, &candidates)
            .await
        {
            Ok(confirmed) => confirmed,
            Err(e) => {
                note_failure(flags, &e);
                flags.persons_failed = true;
                log::warn!("Person validation for {} failed: {}", doc.id, e);
                return Vec::new();
            }
        };

        let mut seen: HashSet<String> = HashSet::new();
        confirmed
            .into_iter()
            .filter(|p| p.confidence > self.settings.min_person_confidence)
            .filter(|p| matches_candidate(&p.name, &candidates))
            .filter_map(|p| {
                let mention = PersonMention {
                    name: p.name,
                    relation: RelationKind::Mentioned,
                    confidence: p.confidence,
                    department: p.department,
                    role: p.role,
                    email: p.email,
                    context: p.context,
                };
                seen.insert(mention.normalized_name()).then_some(mention)
            })
            .collect()
    }
}

fn clip_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

fn note_failure(flags: &mut EnrichmentFlags, e: &ProviderError) {
    if e.retryable {
        flags.transient_failure = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DocgraphError;
    use crate::llm::{ConfirmedPerson, StubGenerator};
    use chrono::TimeZone;

    fn doc(content: &str) -> Document {
        let t = Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap();
        Document {
            id: "p1".to_string(),
            title: "Release Plan".to_string(),
            raw_content: content.to_string(),
            space_key: "ENG".to_string(),
            url: "http://wiki/p1".to_string(),
            parent_id: None,
            created_at: t,
            modified_at: t,
            created_by: Some("Jane Doe".to_string()),
            modified_by: Some("John Smith".to_string()),
        }
    }

    fn long_content() -> String {
        "The release of the billing service moves to tokio. Jane Doe reviewed the rollout plan \
         and John Smith owns the database migration. 김철수님 will verify the staging deploy."
            .to_string()
    }

    fn with_stub(stub: StubGenerator) -> (Enricher, Arc<StubGenerator>) {
        let stub = Arc::new(stub);
        (Enricher::new(stub.clone(), EnrichmentSettings::default()), stub)
    }

    #[tokio::test]
    async fn test_full_enrichment() {
        let (enricher, stub) = with_stub(
            StubGenerator::new("stub")
                .with_keywords(|_, _| Ok(vec!["Billing".into(), "Tokio".into(), "billing".into()]))
                .with_persons(vec![
                    ConfirmedPerson::new("김철수", 0.95),
                    ConfirmedPerson::new("Nobody Known", 0.9),
                    ConfirmedPerson::new("Jane Doe", 0.2),
                ]),
        );
        let document = doc(&long_content());
        let record = enricher.enrich(&document).await.unwrap();

        assert_eq!(record.id, "p1");
        assert!(record.is_valid_for(&document));
        assert_eq!(record.keywords.to_vec(), vec!["billing", "tokio"]);
        assert!(!record.flags.is_partial());
        assert_eq!(record.alt_summary, None);

        let kinds: Vec<_> = record.persons.iter().map(|p| (p.name.as_str(), p.relation)).collect();
        assert_eq!(
            kinds,
            vec![
                ("Jane Doe", RelationKind::Creator),
                ("John Smith", RelationKind::Modifier),
                ("김철수", RelationKind::Mentioned),
            ]
        );
        assert_eq!(stub.person_calls(), 1);
    }

    #[tokio::test]
    async fn test_failing_summary_yields_partial_record() {
        let (enricher, _) = with_stub(
            StubGenerator::new("stub")
                .failing_summary(false)
                .with_keywords(|_, _| Ok(vec!["billing".into(), "tokio".into()])),
        );
        let record = enricher.enrich(&doc(&long_content())).await.unwrap();

        assert_eq!(record.summary, PLACEHOLDER_SUMMARY);
        assert_eq!(record.keywords.len(), 2);
        assert!(record.flags.summary_failed);
        assert!(record.flags.is_partial());
        assert!(!record.flags.transient_failure);
    }

    #[tokio::test]
    async fn test_failing_keywords_fall_back_to_heuristic() {
        let (enricher, _) = with_stub(StubGenerator::new("stub").failing_keywords(true));
        let record = enricher.enrich(&doc(&long_content())).await.unwrap();

        assert!(record.flags.keywords_failed);
        assert!(record.flags.transient_failure);
        assert!(record.keywords.contains("release"));
        assert!(record.keywords.len() <= 15);
    }

    #[tokio::test]
    async fn test_thin_provider_keywords_topped_up() {
        let (enricher, _) =
            with_stub(StubGenerator::new("stub").with_keywords(|_, _| Ok(vec!["billing".into()])));
        let record = enricher.enrich(&doc(&long_content())).await.unwrap();
        assert!(record.keywords.len() > 1);
        assert!(record.keywords.contains("billing"));
        assert!(!record.flags.keywords_failed);
    }

    #[tokio::test]
    async fn test_empty_content_skips_providers() {
        let (enricher, stub) = with_stub(StubGenerator::new("stub"));
        let record = enricher.enrich(&doc("  hi ")).await.unwrap();

        assert_eq!(record.summary, "Page title: Release Plan");
        assert_eq!(record.keywords.to_vec(), vec!["no-content", "release plan"]);
        assert_eq!(stub.total_calls(), 0);
        assert_eq!(record.persons.len(), 2);
    }

    #[tokio::test]
    async fn test_short_content_is_its_own_summary() {
        let (enricher, stub) = with_stub(StubGenerator::new("stub"));
        let record = enricher.enrich(&doc("Billing migration notes for tokio")).await.unwrap();

        assert_eq!(record.summary, "Billing migration notes for tokio");
        assert!(record.keywords.contains("billing"));
        assert_eq!(stub.summary_calls(), 0);
        assert_eq!(stub.keyword_calls(), 0);
    }

    #[tokio::test]
    async fn test_alt_summary_for_long_content() {
        let (enricher, stub) = with_stub(StubGenerator::new("stub"));
        let content = long_content().repeat(4);
        let record = enricher.enrich(&doc(&content)).await.unwrap();
        assert!(record.alt_summary.is_some());
        assert_eq!(stub.summary_calls(), 2);

        let (enricher, _) = with_stub(StubGenerator::new("stub").failing_summary(false));
        let record = enricher.enrich(&doc(&content)).await.unwrap();
        assert!(record.flags.summary_failed);
        assert!(record.flags.alt_summary_failed);
    }

    fn chunked(stub: StubGenerator, max_keywords: usize) -> (Enricher, Arc<StubGenerator>) {
        let stub = Arc::new(stub);
        let settings = EnrichmentSettings {
            max_keywords,
            retrieval_summary: false,
            chunk: ChunkSpec::new(200, 20),
            max_chunks: 3,
            ..EnrichmentSettings::default()
        };
        (Enricher::new(stub.clone(), settings), stub)
    }

    #[tokio::test]
    async fn test_long_body_enriched_per_chunk() {
        let calls = std::sync::atomic::AtomicUsize::new(0);
        let stub = StubGenerator::new("stub").with_keywords(move |_, _| {
            let i = calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(vec![format!("part{}", i), "shared".to_string()])
        });
        let (enricher, stub) = chunked(stub, 15);
        let record = enricher.enrich(&doc(&long_content().repeat(10))).await.unwrap();

        assert_eq!(stub.summary_calls(), 3);
        assert_eq!(stub.keyword_calls(), 3);
        assert_eq!(record.keywords.to_vec(), vec!["part0", "part1", "part2", "shared"]);
        assert!(record.summary.starts_with("The release of the billing service moves to tokio."));
        assert!(!record.flags.is_partial());
    }

    #[tokio::test]
    async fn test_chunk_keywords_ranked_by_agreement() {
        let calls = std::sync::atomic::AtomicUsize::new(0);
        let stub = StubGenerator::new("stub").with_keywords(move |_, _| {
            let i = calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(vec![format!("part{}", i), "shared".to_string()])
        });
        let (enricher, _) = chunked(stub, 2);
        let record = enricher.enrich(&doc(&long_content().repeat(10))).await.unwrap();
        assert_eq!(record.keywords.to_vec(), vec!["part0", "shared"]);
    }

    #[tokio::test]
    async fn test_failed_chunk_skipped_in_summary() {
        let calls = std::sync::atomic::AtomicUsize::new(0);
        let stub = StubGenerator::new("stub").with_summary(move |text| {
            if calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst) == 0 {
                Err(ProviderError::retryable("stub", "overloaded"))
            } else {
                Ok(format!("part of {} chars.", text.chars().count()))
            }
        });
        let (enricher, _) = chunked(stub, 15);
        let record = enricher.enrich(&doc(&long_content().repeat(10))).await.unwrap();

        assert!(!record.flags.summary_failed);
        assert_eq!(record.summary.matches("part of").count(), 2);

        let (enricher, _) = chunked(StubGenerator::new("stub").failing_summary(true), 15);
        let record = enricher.enrich(&doc(&long_content().repeat(10))).await.unwrap();
        assert_eq!(record.summary, PLACEHOLDER_SUMMARY);
        assert!(record.flags.summary_failed);
        assert!(record.flags.transient_failure);
    }

    #[tokio::test]
    async fn test_long_joined_summary_condensed() {
        let stub = StubGenerator::new("stub").with_summary(|text| {
            if text.starts_with('#') {
                Ok("condensed".to_string())
            } else {
                Ok("#".repeat(400))
            }
        });
        let (enricher, stub) = chunked(stub, 15);
        let record = enricher.enrich(&doc(&long_content().repeat(10))).await.unwrap();
        assert_eq!(record.summary, "condensed");
        assert_eq!(stub.summary_calls(), 4);
    }

    #[tokio::test]
    async fn test_person_validation_failure_keeps_structural_persons() {
        let (enricher, _) = with_stub(StubGenerator::new("stub").failing_persons(true));
        let record = enricher.enrich(&doc(&long_content())).await.unwrap();
        assert!(record.flags.persons_failed);
        assert_eq!(record.persons.len(), 2);
    }

    #[tokio::test]
    async fn test_invalid_document_is_structural_error() {
        let (enricher, _) = with_stub(StubGenerator::new("stub"));
        let mut bad = doc(&long_content());
        bad.title = String::new();
        let err = enricher.enrich(&bad).await.unwrap_err();
        assert!(matches!(err, DocgraphError::Structural { .. }));
    }

    #[tokio::test]
    async fn test_idempotent_keywords_with_deterministic_stub() {
        let (enricher, _) = with_stub(StubGenerator::new("stub"));
        let document = doc(&long_content());
        let first = enricher.enrich(&document).await.unwrap();
        let second = enricher.enrich(&document).await.unwrap();
        assert_eq!(first.keywords, second.keywords);
    }
}
