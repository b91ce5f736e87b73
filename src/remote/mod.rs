//! Remote corpus boundary: the client trait the sync pass consumes and the
//! status taxonomy it reacts to.

mod confluence;
mod html;

pub use confluence::ConfluenceClient;
pub use html::html_to_text;

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

use crate::models::Document;

/// Coarse status classes surfaced by the remote service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteErrorKind {
    /// 401/403: credentials rejected.
    Auth,
    /// 404: the node disappeared or is not visible.
    NotFound,
    /// Timeouts, connection resets, 408/429/5xx.
    Transient,
    /// The response could not be decoded into documents.
    Malformed,
    /// The request itself could not be built or sent (bad URL, redirect loop).
    Request,
}

impl fmt::Display for RemoteErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RemoteErrorKind::Auth => "auth failure",
            RemoteErrorKind::NotFound => "not found",
            RemoteErrorKind::Transient => "transient failure",
            RemoteErrorKind::Malformed => "malformed response",
            RemoteErrorKind::Request => "invalid request",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Error)]
#[error("{kind} while fetching {node_id}: {message}")]
pub struct RemoteError {
    pub kind: RemoteErrorKind,
    pub node_id: String,
    pub message: String,
}

impl RemoteError {
    pub fn new(kind: RemoteErrorKind, node_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            node_id: node_id.into(),
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind == RemoteErrorKind::Transient
    }

    /// Classify a client-side failure: only network faults are transient.
    pub fn from_reqwest(node_id: &str, e: reqwest::Error) -> Self {
        let kind = if e.is_timeout() || e.is_connect() || e.is_request() || e.is_body() {
            RemoteErrorKind::Transient
        } else if e.is_decode() {
            RemoteErrorKind::Malformed
        } else {
            RemoteErrorKind::Request
        };
        Self::new(kind, node_id, e.to_string())
    }

    /// Map an HTTP status code onto the taxonomy.
    pub fn kind_for_status(status: u16) -> RemoteErrorKind {
        match status {
            401 | 403 => RemoteErrorKind::Auth,
            404 | 410 => RemoteErrorKind::NotFound,
            408 | 429 | 500..=599 => RemoteErrorKind::Transient,
            _ => RemoteErrorKind::Malformed,
        }
    }
}

/// One page of a child listing.
#[derive(Debug, Clone, Default)]
pub struct ChildPage {
    pub documents: Vec<Document>,
    /// Ids of listed children that lacked required metadata.
    pub malformed: Vec<String>,
    pub has_more: bool,
}

/// Read access to the remote containment hierarchy.
///
/// Implementations are constructed per sync pass and passed in explicitly;
/// they hold connection state only for their own lifetime.
#[async_trait]
pub trait CorpusClient: Send + Sync {
    /// List the children of `parent_id`, zero-based `page` of results.
    async fn list_children(&self, parent_id: &str, page: usize) -> Result<ChildPage, RemoteError>;

    /// Fetch a single document with content and metadata.
    async fn get_content(&self, id: &str) -> Result<Document, RemoteError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(RemoteError::kind_for_status(401), RemoteErrorKind::Auth);
        assert_eq!(RemoteError::kind_for_status(403), RemoteErrorKind::Auth);
        assert_eq!(RemoteError::kind_for_status(404), RemoteErrorKind::NotFound);
        assert_eq!(RemoteError::kind_for_status(429), RemoteErrorKind::Transient);
        assert_eq!(RemoteError::kind_for_status(503), RemoteErrorKind::Transient);
        assert_eq!(RemoteError::kind_for_status(400), RemoteErrorKind::Malformed);
    }

    #[tokio::test]
    async fn test_reqwest_errors_classified() {
        let client = reqwest::Client::new();

        let invalid = client.get("not a url").send().await.unwrap_err();
        let err = RemoteError::from_reqwest("7", invalid);
        assert_eq!(err.kind, RemoteErrorKind::Request);
        assert!(!err.is_transient());

        // nothing listens on the discard port
        let refused = client.get("http://127.0.0.1:9/").send().await.unwrap_err();
        assert!(RemoteError::from_reqwest("7", refused).is_transient());
    }

    #[test]
    fn test_error_display_names_node() {
        let err = RemoteError::new(RemoteErrorKind::NotFound, "12345", "HTTP 404");
        assert_eq!(err.to_string(), "not found while fetching 12345: HTTP 404");
        assert!(!err.is_transient());
    }
}
