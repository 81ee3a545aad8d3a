//! Error types for the inference verification engine.

use std::time::Duration;
use thiserror::Error;

pub use crate::transport::TransportError;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// A single field that did not match its expectation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMismatch {
    /// Field identifier (response-map role or JSON pointer)
    pub field: String,
    /// Expected value or pattern
    pub expected: String,
    /// Value actually observed, `None` when the field was missing
    pub actual: Option<String>,
}

impl std::fmt::Display for FieldMismatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.actual {
            Some(actual) => write!(
                f,
                "{}: expected {:?}, got {:?}",
                self.field, self.expected, actual
            ),
            None => write!(f, "{}: expected {:?}, field missing", self.field, self.expected),
        }
    }
}

fn render_mismatches(mismatches: &[FieldMismatch]) -> String {
    mismatches
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Error types for inference verification and convergence polling
#[derive(Debug, Error)]
pub enum Error {
    /// Registry miss, missing default query, missing response-field mapping.
    /// Never retried.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The request could not be issued
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// One or more response fields did not match
    #[error("Validation mismatch ({} field(s)): {}", .mismatches.len(), render_mismatches(.mismatches))]
    ValidationMismatch { mismatches: Vec<FieldMismatch> },

    /// Authorization rejection did not carry the expected reason
    #[error("Authorization check failed: {0}")]
    Authorization(String),

    /// Poll budget exhausted without satisfaction
    #[error(
        "Timed out after {elapsed:?} ({ticks} samples) waiting for {description}; last sample: {}",
        .last_sample.as_deref().unwrap_or("<none>")
    )]
    TimedOut {
        description: String,
        elapsed: Duration,
        ticks: u32,
        last_sample: Option<String>,
    },

    /// Canary traffic estimate outside the tolerance band
    #[error("Canary estimate out of tolerance: {0}")]
    CanaryOutOfTolerance(String),

    /// Invalid template or regex
    #[error("Template error: {0}")]
    Template(String),

    /// Kubernetes API error
    #[cfg(feature = "kubernetes")]
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse error classification used by poller allow-lists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Configuration,
    Transport,
    Validation,
    Authorization,
    TimedOut,
    Canary,
    Cluster,
    Other,
}

impl Error {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Configuration(_) | Error::Template(_) => ErrorKind::Configuration,
            Error::Transport(_) => ErrorKind::Transport,
            Error::ValidationMismatch { .. } => ErrorKind::Validation,
            Error::Authorization(_) => ErrorKind::Authorization,
            Error::TimedOut { .. } => ErrorKind::TimedOut,
            Error::CanaryOutOfTolerance(_) => ErrorKind::Canary,
            #[cfg(feature = "kubernetes")]
            Error::Kube(_) => ErrorKind::Cluster,
            Error::Json(_) | Error::Io(_) => ErrorKind::Other,
        }
    }

    /// Configuration errors signal a test/config bug rather than cluster state
    pub fn is_configuration(&self) -> bool {
        self.kind() == ErrorKind::Configuration
    }

    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Error::Configuration(msg.into())
    }
}
