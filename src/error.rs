use serde::Serialize;
use thiserror::Error;

use crate::llm::ProviderError;
use crate::remote::RemoteError;

/// Main error type for DocGraph
#[derive(Error, Debug)]
pub enum DocgraphError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// File system I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization errors for stored payloads
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Remote content service errors
    #[error("Remote corpus error: {0}")]
    Remote(#[from] RemoteError),

    /// Text-generation provider errors
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Malformed document or missing required metadata
    #[error("Malformed document {id}: {reason}")]
    Structural { id: String, reason: String },

    /// Document not found
    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    /// Person not found
    #[error("Person not found: {0}")]
    PersonNotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Failure classes a sync pass reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorClass {
    /// Timeouts and rate limits: retried with backoff, then degraded.
    Transient,
    /// One enrichment sub-task failed while the others succeeded.
    Partial,
    /// Document skipped for this pass, retried on the next one.
    Structural,
    /// Aborts the whole pass.
    Fatal,
}

impl DocgraphError {
    /// Map the error onto the sync-pass failure taxonomy.
    pub fn class(&self) -> ErrorClass {
        match self {
            DocgraphError::Remote(e) if e.is_transient() => ErrorClass::Transient,
            DocgraphError::Provider(e) if e.retryable => ErrorClass::Transient,
            DocgraphError::Provider(_) => ErrorClass::Partial,
            DocgraphError::Structural { .. } | DocgraphError::DocumentNotFound(_) => {
                ErrorClass::Structural
            }
            DocgraphError::Remote(e)
                if matches!(
                    e.kind,
                    crate::remote::RemoteErrorKind::Auth | crate::remote::RemoteErrorKind::Request
                ) =>
            {
                ErrorClass::Fatal
            }
            DocgraphError::Remote(_) => ErrorClass::Structural,
            _ => ErrorClass::Fatal,
        }
    }

    pub fn structural(id: impl Into<String>, reason: impl Into<String>) -> Self {
        DocgraphError::Structural {
            id: id.into(),
            reason: reason.into(),
        }
    }
}

/// Convenient Result type using DocgraphError
pub type Result<T> = std::result::Result<T, DocgraphError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::RemoteErrorKind;

    #[test]
    fn test_error_display() {
        let err = DocgraphError::Config("Test error".to_string());
        assert!(err.to_string().contains("Configuration error"));
        assert!(err.to_string().contains("Test error"));
    }

    #[test]
    fn test_error_from_rusqlite() {
        let rusqlite_err = rusqlite::Error::InvalidQuery;
        let err: DocgraphError = rusqlite_err.into();
        assert!(matches!(err, DocgraphError::Database(_)));
        assert_eq!(err.class(), ErrorClass::Fatal);
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: DocgraphError = io_err.into();
        assert!(matches!(err, DocgraphError::Io(_)));
    }

    #[test]
    fn test_error_class_remote() {
        let transient: DocgraphError =
            RemoteError::new(RemoteErrorKind::Transient, "p1", "timeout").into();
        assert_eq!(transient.class(), ErrorClass::Transient);

        let auth: DocgraphError = RemoteError::new(RemoteErrorKind::Auth, "p1", "401").into();
        assert_eq!(auth.class(), ErrorClass::Fatal);

        let missing: DocgraphError =
            RemoteError::new(RemoteErrorKind::NotFound, "p1", "404").into();
        assert_eq!(missing.class(), ErrorClass::Structural);

        let bad_url: DocgraphError =
            RemoteError::new(RemoteErrorKind::Request, "p1", "relative URL without a base").into();
        assert_eq!(bad_url.class(), ErrorClass::Fatal);
    }

    #[test]
    fn test_error_class_provider_and_structural() {
        let retryable: DocgraphError = ProviderError::retryable("ollama", "503").into();
        assert_eq!(retryable.class(), ErrorClass::Transient);

        let hard: DocgraphError = ProviderError::fatal("ollama", "bad model").into();
        assert_eq!(hard.class(), ErrorClass::Partial);

        let malformed = DocgraphError::structural("42", "missing modified_at");
        assert_eq!(malformed.class(), ErrorClass::Structural);
        assert!(malformed.to_string().contains("42"));
    }
}
