//! Transport Errors
//!
//! Error types for issuing a request over the wire

use std::time::Duration;
use thiserror::Error;

/// Transport-specific error types. A transport error means the request could
/// not be issued at all; a runtime answering with a failure status is an
/// unsuccessful [`InvocationResult`](super::InvocationResult) instead.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request to {target} failed: {message}")]
    Request { target: String, message: String },

    #[error("command `{command}` could not be run: {message}; captured output: {output}")]
    Command {
        command: String,
        message: String,
        output: String,
    },

    #[error("request to {target} timed out after {timeout:?}")]
    Timeout { target: String, timeout: Duration },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("scripted transport has no reply left for {0}")]
    Exhausted(String),
}

impl TransportError {
    /// Destination or command the failure relates to
    pub fn target(&self) -> Option<&str> {
        match self {
            TransportError::Request { target, .. } | TransportError::Timeout { target, .. } => {
                Some(target)
            }
            TransportError::Command { command, .. } => Some(command),
            _ => None,
        }
    }
}
