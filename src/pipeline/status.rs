//! Polled status of sync passes, keyed by pass id.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::cancel::{cancel_pair, CancelHandle, CancelToken};
use super::sync::SyncReport;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    Running,
    Completed,
    Cancelled,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncStatus {
    pub pass_id: Uuid,
    pub root_id: String,
    pub state: SyncState,
    /// Documents selected for enrichment.
    pub total: usize,
    /// Documents finished, successfully or not.
    pub completed: usize,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<SyncReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

struct Entry {
    status: SyncStatus,
    cancel: CancelHandle,
}

/// Registry of passes started in this process.
#[derive(Clone, Default)]
pub struct SyncRegistry {
    passes: Arc<Mutex<HashMap<Uuid, Entry>>>,
}

impl SyncRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new running pass.
    pub fn begin(&self, root_id: &str) -> SyncHandle {
        let pass_id = Uuid::new_v4();
        let (cancel, token) = cancel_pair();
        let status = SyncStatus {
            pass_id,
            root_id: root_id.to_string(),
            state: SyncState::Running,
            total: 0,
            completed: 0,
            started_at: Utc::now(),
            finished_at: None,
            report: None,
            error: None,
        };
        self.lock().insert(
            pass_id,
            Entry {
                status,
                cancel: cancel.clone(),
            },
        );
        SyncHandle {
            pass_id,
            registry: self.clone(),
            cancel,
            token,
        }
    }

    pub fn status(&self, pass_id: &Uuid) -> Option<SyncStatus> {
        self.lock().get(pass_id).map(|e| e.status.clone())
    }

    /// All known passes, oldest first.
    pub fn list(&self) -> Vec<SyncStatus> {
        let mut out: Vec<SyncStatus> = self.lock().values().map(|e| e.status.clone()).collect();
        out.sort_by(|a, b| a.started_at.cmp(&b.started_at).then_with(|| a.pass_id.cmp(&b.pass_id)));
        out
    }

    /// Signal a running pass to stop; false if unknown or already finished.
    pub fn cancel(&self, pass_id: &Uuid) -> bool {
        match self.lock().get(pass_id) {
            Some(entry) if entry.status.state == SyncState::Running => {
                entry.cancel.cancel();
                true
            }
            _ => false,
        }
    }

    fn update(&self, pass_id: &Uuid, f: impl FnOnce(&mut SyncStatus)) {
        if let Some(entry) = self.lock().get_mut(pass_id) {
            f(&mut entry.status);
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, Entry>> {
        self.passes.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// One pass's view of the registry.
#[derive(Clone)]
pub struct SyncHandle {
    pass_id: Uuid,
    registry: SyncRegistry,
    cancel: CancelHandle,
    token: CancelToken,
}

impl SyncHandle {
    pub fn pass_id(&self) -> Uuid {
        self.pass_id
    }

    pub fn token(&self) -> CancelToken {
        self.token.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub(crate) fn set_total(&self, total: usize) {
        self.registry.update(&self.pass_id, |s| s.total = total);
    }

    pub(crate) fn document_done(&self) {
        self.registry.update(&self.pass_id, |s| s.completed += 1);
    }

    pub(crate) fn finish(&self, result: &Result<SyncReport>) {
        self.registry.update(&self.pass_id, |s| {
            s.finished_at = Some(Utc::now());
            match result {
                Ok(report) => {
                    s.state = if report.cancelled {
                        SyncState::Cancelled
                    } else {
                        SyncState::Completed
                    };
                    s.report = Some(report.clone());
                }
                Err(e) => {
                    s.state = SyncState::Failed;
                    s.error = Some(e.to_string());
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DocgraphError;

    #[test]
    fn test_begin_registers_running_pass() {
        let registry = SyncRegistry::new();
        let handle = registry.begin("root");
        let status = registry.status(&handle.pass_id()).unwrap();
        assert_eq!(status.state, SyncState::Running);
        assert_eq!(status.root_id, "root");
        assert_eq!(handle.pass_id().get_version_num(), 4);
        assert!(registry.status(&Uuid::new_v4()).is_none());
    }

    #[test]
    fn test_progress_and_completion() {
        let registry = SyncRegistry::new();
        let handle = registry.begin("root");
        handle.set_total(2);
        handle.document_done();
        assert_eq!(registry.status(&handle.pass_id()).unwrap().completed, 1);

        let report = SyncReport {
            processed: 2,
            ..SyncReport::default()
        };
        handle.finish(&Ok(report));
        let status = registry.status(&handle.pass_id()).unwrap();
        assert_eq!(status.state, SyncState::Completed);
        assert_eq!(status.report.unwrap().processed, 2);
        assert!(status.finished_at.is_some());
    }

    #[test]
    fn test_cancel_through_registry() {
        let registry = SyncRegistry::new();
        let handle = registry.begin("root");
        assert!(registry.cancel(&handle.pass_id()));
        assert!(handle.token().is_cancelled());

        handle.finish(&Ok(SyncReport {
            cancelled: true,
            ..SyncReport::default()
        }));
        assert_eq!(
            registry.status(&handle.pass_id()).unwrap().state,
            SyncState::Cancelled
        );
        // finished passes cannot be cancelled again
        assert!(!registry.cancel(&handle.pass_id()));
    }

    #[test]
    fn test_failure_records_error() {
        let registry = SyncRegistry::new();
        let handle = registry.begin("root");
        handle.finish(&Err(DocgraphError::Config("no providers".to_string())));
        let status = registry.status(&handle.pass_id()).unwrap();
        assert_eq!(status.state, SyncState::Failed);
        assert!(status.error.unwrap().contains("no providers"));
        assert_eq!(registry.list().len(), 1);
    }
}
