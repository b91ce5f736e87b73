//! One sync pass over a remote subtree.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};
use serde::Serialize;
use tokio::task::JoinSet;

use super::cancel::CancelToken;
use super::status::SyncHandle;
use crate::config::EnrichmentConfig;
use crate::enrich::Enricher;
use crate::error::{DocgraphError, ErrorClass, Result};
use crate::graph::descendant_ids;
use crate::ingest::{
    classify_documents, fetch_subtree, find_absent_documents, FailedBranch, SubtreeFetch,
};
use crate::models::Document;
use crate::remote::CorpusClient;
use crate::store::RecordStore;

#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Re-enrich every fetched document, ignoring fingerprints.
    pub force: bool,
    /// Documents enriched at once.
    pub concurrency: usize,
    /// Budget for one document, all provider calls included.
    pub document_timeout: Duration,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            force: false,
            concurrency: 4,
            document_timeout: Duration::from_secs(300),
        }
    }
}

impl From<&EnrichmentConfig> for SyncOptions {
    fn from(config: &EnrichmentConfig) -> Self {
        Self {
            force: false,
            concurrency: config.concurrency,
            document_timeout: Duration::from_secs(config.document_timeout_secs),
        }
    }
}

/// A document that produced no record this pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedDocument {
    pub id: String,
    pub class: ErrorClass,
    pub message: String,
}

/// Outcome counts of a sync pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    pub root_id: String,
    /// Documents returned by the subtree fetch.
    pub fetched: usize,
    /// Records written, partial ones included.
    pub processed: usize,
    /// Documents whose record was still valid.
    pub skipped: usize,
    /// Written records with at least one degraded sub-task.
    pub partially_enriched: usize,
    pub failed: Vec<FailedDocument>,
    /// Listed children dropped for missing metadata.
    pub malformed: Vec<String>,
    pub failed_branches: Vec<FailedBranch>,
    /// Stored documents under the root that a visited listing no longer
    /// returned. Subtrees behind failed or malformed listings are excluded.
    pub absent: Vec<String>,
    pub cancelled: bool,
    /// Selected documents never started because the pass was cancelled.
    pub not_started: usize,
}

impl SyncReport {
    /// Whether every listing under the root was fetched.
    pub fn is_complete(&self) -> bool {
        self.failed_branches.is_empty() && self.malformed.is_empty() && !self.cancelled
    }
}

enum Outcome {
    Written { partial: bool },
    Failed(FailedDocument),
}

/// Fetch, detect changes, enrich and store, for one subtree.
///
/// Clients and stores are passed in per pass; nothing is shared between
/// concurrent passes except the store itself.
#[derive(Clone)]
pub struct SyncPass {
    client: Arc<dyn CorpusClient>,
    store: RecordStore,
    enricher: Enricher,
    options: SyncOptions,
}

impl SyncPass {
    pub fn new(
        client: Arc<dyn CorpusClient>,
        store: RecordStore,
        enricher: Enricher,
        options: SyncOptions,
    ) -> Self {
        Self {
            client,
            store,
            enricher,
            options,
        }
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    /// Run the pass until done or cancelled.
    ///
    /// Per-document failures land in the report. Only fatal errors (an
    /// unreachable root, rejected credentials, store failures) abort the
    /// pass; records written before the abort stay.
    pub async fn run(&self, root_id: &str, cancel: &CancelToken) -> Result<SyncReport> {
        self.execute(root_id, cancel, None).await
    }

    /// Run the pass and publish progress through `handle`.
    pub async fn run_tracked(&self, root_id: &str, handle: &SyncHandle) -> Result<SyncReport> {
        let result = self.execute(root_id, &handle.token(), Some(handle)).await;
        handle.finish(&result);
        result
    }

    async fn execute(
        &self,
        root_id: &str,
        cancel: &CancelToken,
        handle: Option<&SyncHandle>,
    ) -> Result<SyncReport> {
        let start = Instant::now();
        match handle {
            Some(h) => info!("Starting sync pass {} for root {}", h.pass_id(), root_id),
            None => info!("Starting sync pass for root {}", root_id),
        }

        let fetch = fetch_subtree(self.client.as_ref(), root_id, cancel).await?;
        for branch in &fetch.failed_branches {
            warn!(
                "Branch {} not fetched ({:?}): {}",
                branch.node_id, branch.kind, branch.message
            );
        }

        let mut report = SyncReport {
            root_id: root_id.to_string(),
            fetched: fetch.documents.len(),
            malformed: fetch.malformed.clone(),
            failed_branches: fetch.failed_branches.clone(),
            cancelled: fetch.cancelled,
            ..SyncReport::default()
        };

        report.absent = self.absent_documents(root_id, &fetch).await?;
        if !report.absent.is_empty() {
            info!(
                "{} stored document(s) no longer under {}; purge them explicitly if deleted",
                report.absent.len(),
                root_id
            );
        }

        self.store.put_documents(&fetch.documents).await?;
        let ids: Vec<String> = fetch.documents.iter().map(|d| d.id.clone()).collect();
        let fingerprints = self.store.fingerprints(&ids).await?;
        let classification = classify_documents(&fetch.documents, &fingerprints);
        info!(
            "Classification: new={}, modified={}, unchanged={}",
            classification.new_documents.len(),
            classification.modified_documents.len(),
            classification.unchanged_documents.len()
        );

        let selected = if self.options.force {
            info!("Mode: forced re-enrichment of all {} document(s)", fetch.documents.len());
            fetch.documents
        } else {
            classification.stale()
        };
        report.skipped = report.fetched - selected.len();
        if let Some(h) = handle {
            h.set_total(selected.len());
        }

        self.enrich_all(selected, cancel, handle, &mut report).await?;

        info!(
            "Sync pass for {} finished in {:.1}s: processed={}, skipped={}, partial={}, failed={}, failed_branches={}, cancelled={}",
            root_id,
            start.elapsed().as_secs_f64(),
            report.processed,
            report.skipped,
            report.partially_enriched,
            report.failed.len(),
            report.failed_branches.len(),
            report.cancelled
        );
        Ok(report)
    }

    /// Stored descendants of `root_id` the fetch should have returned but did not.
    ///
    /// Subtrees behind a failed or malformed listing were never visited, so
    /// their stored documents are left out. A cancelled fetch reports nothing.
    async fn absent_documents(&self, root_id: &str, fetch: &SubtreeFetch) -> Result<Vec<String>> {
        if fetch.cancelled {
            return Ok(Vec::new());
        }
        let mut unreached: HashSet<String> = HashSet::new();
        let blocked = fetch
            .failed_branches
            .iter()
            .map(|b| b.node_id.as_str())
            .chain(fetch.malformed.iter().map(String::as_str));
        for node_id in blocked {
            unreached.extend(descendant_ids(&self.store, node_id, None).await?);
        }
        let stored: Vec<String> = descendant_ids(&self.store, root_id, None)
            .await?
            .into_iter()
            .filter(|id| !unreached.contains(id))
            .collect();
        Ok(find_absent_documents(&stored, &fetch.documents))
    }

    /// Bounded worker pool over the selected documents.
    async fn enrich_all(
        &self,
        selected: Vec<Document>,
        cancel: &CancelToken,
        handle: Option<&SyncHandle>,
        report: &mut SyncReport,
    ) -> Result<()> {
        let total = selected.len();
        let concurrency = self.options.concurrency.max(1);
        let mut queue = selected.into_iter();
        let mut workers: JoinSet<(String, Result<Outcome>)> = JoinSet::new();
        let mut started = 0usize;

        loop {
            while workers.len() < concurrency && !report.cancelled {
                if cancel.is_cancelled() {
                    info!("Sync pass cancelled; {} document(s) not started", total - started);
                    report.cancelled = true;
                    break;
                }
                let Some(doc) = queue.next() else {
                    break;
                };
                started += 1;
                debug!("[{}/{}] Enriching {}", started, total, doc.id);

                let enricher = self.enricher.clone();
                let store = self.store.clone();
                let timeout = self.options.document_timeout;
                workers.spawn(async move {
                    let outcome = process_document(&enricher, &store, &doc, timeout).await;
                    (doc.id, outcome)
                });
            }

            let Some(joined) = workers.join_next().await else {
                break;
            };
            if let Some(h) = handle {
                h.document_done();
            }
            match joined {
                Ok((_, Ok(Outcome::Written { partial }))) => {
                    report.processed += 1;
                    if partial {
                        report.partially_enriched += 1;
                    }
                }
                Ok((_, Ok(Outcome::Failed(failure)))) => report.failed.push(failure),
                Ok((id, Err(e))) => {
                    error!("Aborting sync pass at {}: {}", id, e);
                    workers.shutdown().await;
                    return Err(e);
                }
                Err(e) => {
                    error!("Enrichment worker crashed: {}", e);
                    report.failed.push(FailedDocument {
                        id: String::new(),
                        class: ErrorClass::Structural,
                        message: e.to_string(),
                    });
                }
            }
        }

        report.not_started = total - started;
        Ok(())
    }
}

/// Enrich and store one document. `Err` means the pass must stop.
async fn process_document(
    enricher: &Enricher,
    store: &RecordStore,
    doc: &Document,
    timeout: Duration,
) -> Result<Outcome> {
    let record = match tokio::time::timeout(timeout, enricher.enrich(doc)).await {
        Ok(Ok(record)) => record,
        Ok(Err(e)) => return classify_failure(&doc.id, e),
        Err(_) => {
            warn!("Enrichment of {} timed out after {:?}", doc.id, timeout);
            return Ok(Outcome::Failed(FailedDocument {
                id: doc.id.clone(),
                class: ErrorClass::Transient,
                message: format!("timed out after {}s", timeout.as_secs_f64()),
            }));
        }
    };

    if let Err(e) = store.put_enriched(&record).await {
        return classify_failure(&doc.id, e);
    }

    let partial = record.flags.is_partial();
    info!(
        "✓ {} ({} keywords, {} persons{})",
        doc.id,
        record.keywords.len(),
        record.persons.len(),
        if partial { ", partial" } else { "" }
    );
    Ok(Outcome::Written { partial })
}

fn classify_failure(id: &str, e: DocgraphError) -> Result<Outcome> {
    match e.class() {
        ErrorClass::Fatal => Err(e),
        class => {
            warn!("✗ {} skipped ({:?}): {}", id, class, e);
            Ok(Outcome::Failed(FailedDocument {
                id: id.to_string(),
                class,
                message: e.to_string(),
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrich::EnrichmentSettings;
    use crate::ingest::fetch::tests::StubCorpus;
    use crate::llm::StubGenerator;
    use crate::pipeline::{cancel_pair, SyncRegistry, SyncState};
    use crate::remote::RemoteErrorKind;
    use crate::store::tests::setup_store;
    use crate::store::ScanFilter;

    fn lengthen(doc: &mut Document) {
        doc.raw_content =
            format!("{} covers release planning for the storage engine. ", doc.title).repeat(4);
    }

    /// r -> (a -> a1), b, c; bodies long enough to reach the providers.
    fn corpus() -> StubCorpus {
        let mut corpus = StubCorpus::with_root("r")
            .children("r", vec![vec!["a", "b"], vec!["c"]])
            .children("a", vec![vec!["a1"]]);
        corpus.roots.values_mut().for_each(lengthen);
        for pages in corpus.pages.values_mut() {
            pages.iter_mut().flatten().for_each(lengthen);
        }
        corpus
    }

    fn pass(corpus: StubCorpus, store: &RecordStore, stub: StubGenerator, options: SyncOptions) -> (SyncPass, Arc<StubGenerator>) {
        let stub = Arc::new(stub);
        let enricher = Enricher::new(stub.clone(), EnrichmentSettings::default());
        (
            SyncPass::new(Arc::new(corpus), store.clone(), enricher, options),
            stub,
        )
    }

    #[tokio::test]
    async fn test_first_pass_enriches_everything() {
        let (store, _temp) = setup_store().await;
        let (pass, _) = pass(corpus(), &store, StubGenerator::new("stub"), SyncOptions::default());

        let report = pass.run("r", &CancelToken::never()).await.unwrap();
        assert_eq!(report.fetched, 5);
        assert_eq!(report.processed, 5);
        assert_eq!(report.skipped, 0);
        assert!(report.failed.is_empty());
        assert!(!report.cancelled);

        let valid = store.scan(ScanFilter::valid()).collect_all().await.unwrap();
        assert_eq!(valid.len(), 5);
    }

    #[tokio::test]
    async fn test_second_pass_skips_unchanged() {
        let (store, _temp) = setup_store().await;
        let (first, _) = pass(corpus(), &store, StubGenerator::new("stub"), SyncOptions::default());
        first.run("r", &CancelToken::never()).await.unwrap();

        let (second, stub) = pass(corpus(), &store, StubGenerator::new("stub"), SyncOptions::default());
        let report = second.run("r", &CancelToken::never()).await.unwrap();
        assert_eq!(report.processed, 0);
        assert_eq!(report.skipped, 5);
        assert_eq!(stub.total_calls(), 0);

        let forced = SyncOptions {
            force: true,
            ..SyncOptions::default()
        };
        let (third, _) = pass(corpus(), &store, StubGenerator::new("stub"), forced);
        let report = third.run("r", &CancelToken::never()).await.unwrap();
        assert_eq!(report.processed, 5);
    }

    #[tokio::test]
    async fn test_failed_branch_reported_and_siblings_enriched() {
        let (store, _temp) = setup_store().await;
        let corpus = corpus().failing("a", RemoteErrorKind::Transient);
        let (pass, _) = pass(corpus, &store, StubGenerator::new("stub"), SyncOptions::default());

        let report = pass.run("r", &CancelToken::never()).await.unwrap();
        assert_eq!(report.failed_branches.len(), 1);
        assert_eq!(report.failed_branches[0].node_id, "a");
        // r, a, b, c fetched; a1 is behind the failed listing
        assert_eq!(report.processed, 4);
    }

    #[tokio::test]
    async fn test_failed_branch_subtree_not_reported_absent() {
        let (store, _temp) = setup_store().await;
        let (first, _) = pass(corpus(), &store, StubGenerator::new("stub"), SyncOptions::default());
        let report = first.run("r", &CancelToken::never()).await.unwrap();
        assert!(report.is_complete());
        assert!(report.absent.is_empty());

        let failing = corpus().failing("a", RemoteErrorKind::Transient);
        let (second, _) = pass(failing, &store, StubGenerator::new("stub"), SyncOptions::default());
        let report = second.run("r", &CancelToken::never()).await.unwrap();
        assert!(!report.is_complete());
        assert!(report.absent.is_empty());
        assert!(store.get("a1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_missing_child_reported_absent_on_complete_fetch() {
        let (store, _temp) = setup_store().await;
        let (first, _) = pass(corpus(), &store, StubGenerator::new("stub"), SyncOptions::default());
        first.run("r", &CancelToken::never()).await.unwrap();

        let mut shrunk = StubCorpus::with_root("r").children("r", vec![vec!["a", "b"]]);
        shrunk.roots.values_mut().for_each(lengthen);
        for pages in shrunk.pages.values_mut() {
            pages.iter_mut().flatten().for_each(lengthen);
        }
        let (second, _) = pass(shrunk, &store, StubGenerator::new("stub"), SyncOptions::default());
        let report = second.run("r", &CancelToken::never()).await.unwrap();
        // a lists no children now, so a1 is gone along with c
        assert!(report.is_complete());
        assert_eq!(report.absent, vec!["a1".to_string(), "c".to_string()]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_workers_commit_every_document() {
        let (store, _temp) = setup_store().await;
        let ids: Vec<String> = (0..12).map(|i| format!("w{:02}", i)).collect();
        let mut corpus = StubCorpus::with_root("r")
            .children("r", vec![ids.iter().map(String::as_str).collect()]);
        corpus.roots.values_mut().for_each(lengthen);
        for pages in corpus.pages.values_mut() {
            pages.iter_mut().flatten().for_each(lengthen);
        }
        let options = SyncOptions {
            concurrency: 6,
            ..SyncOptions::default()
        };
        let (pass, _) = pass(corpus, &store, StubGenerator::new("stub"), options);

        let report = pass.run("r", &CancelToken::never()).await.unwrap();
        assert_eq!(report.processed, 13);
        assert!(report.failed.iter().all(|f| f.class != ErrorClass::Fatal));
        assert!(report.failed.is_empty());
        let valid = store.scan(ScanFilter::valid()).collect_all().await.unwrap();
        assert_eq!(valid.len(), 13);
    }

    #[tokio::test]
    async fn test_partial_records_counted() {
        let (store, _temp) = setup_store().await;
        let stub = StubGenerator::new("stub").failing_summary(false);
        let (pass, _) = pass(corpus(), &store, stub, SyncOptions::default());

        let report = pass.run("r", &CancelToken::never()).await.unwrap();
        assert_eq!(report.processed, 5);
        assert_eq!(report.partially_enriched, 5);
        assert!(report.failed.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_document_is_structural_failure() {
        let (store, _temp) = setup_store().await;
        let mut corpus = corpus();
        if let Some(page) = corpus.pages.get_mut("r").and_then(|p| p.first_mut()) {
            page[1].title = "  ".to_string();
        }
        let (pass, _) = pass(corpus, &store, StubGenerator::new("stub"), SyncOptions::default());

        let report = pass.run("r", &CancelToken::never()).await.unwrap();
        assert_eq!(report.processed, 4);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].id, "b");
        assert_eq!(report.failed[0].class, ErrorClass::Structural);
    }

    #[tokio::test]
    async fn test_timeout_fails_document_without_record() {
        let (store, _temp) = setup_store().await;
        let corpus = corpus();

        let stub = StubGenerator::new("stub").with_delay(Duration::from_millis(200));
        let options = SyncOptions {
            document_timeout: Duration::from_millis(20),
            ..SyncOptions::default()
        };
        let (pass, _) = pass(corpus, &store, stub, options);

        let report = pass.run("r", &CancelToken::never()).await.unwrap();
        assert_eq!(report.processed, 0);
        assert_eq!(report.failed.len(), 5);
        assert_eq!(report.failed[0].class, ErrorClass::Transient);
        assert!(store.get("r").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cancel_before_enrichment() {
        let (store, _temp) = setup_store().await;
        let (pass, stub) = pass(corpus(), &store, StubGenerator::new("stub"), SyncOptions::default());
        let (handle, token) = cancel_pair();
        handle.cancel();

        let report = pass.run("r", &token).await.unwrap();
        assert!(report.cancelled);
        assert_eq!(report.processed, 0);
        assert_eq!(stub.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_tracked_run_publishes_status() {
        let (store, _temp) = setup_store().await;
        let (pass, _) = pass(corpus(), &store, StubGenerator::new("stub"), SyncOptions::default());
        let registry = SyncRegistry::new();
        let handle = registry.begin("r");

        pass.run_tracked("r", &handle).await.unwrap();
        let status = registry.status(&handle.pass_id()).unwrap();
        assert_eq!(status.state, SyncState::Completed);
        assert_eq!(status.total, 5);
        assert_eq!(status.completed, 5);
        assert_eq!(status.report.unwrap().processed, 5);
    }

    #[tokio::test]
    async fn test_root_failure_fails_tracked_pass() {
        let (store, _temp) = setup_store().await;
        let (pass, _) = pass(StubCorpus::default(), &store, StubGenerator::new("stub"), SyncOptions::default());
        let registry = SyncRegistry::new();
        let handle = registry.begin("missing");

        assert!(pass.run_tracked("missing", &handle).await.is_err());
        let status = registry.status(&handle.pass_id()).unwrap();
        assert_eq!(status.state, SyncState::Failed);
        assert!(status.error.is_some());
    }
}
