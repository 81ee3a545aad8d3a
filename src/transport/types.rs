//! Transport Types
//!
//! Common types for transport implementations

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Information about a transport implementation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportInfo {
    pub transport_type: TransportType,
    pub description: String,
}

/// Types of supported transports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportType {
    /// In-process HTTP(S) client
    Http,
    /// `grpcurl` subprocess
    Grpcurl,
    /// Replays scripted replies
    Scripted,
}

impl fmt::Display for TransportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportType::Http => write!(f, "http"),
            TransportType::Grpcurl => write!(f, "grpcurl"),
            TransportType::Scripted => write!(f, "scripted"),
        }
    }
}

/// Raw output parsed as JSON when possible
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedOutput {
    Json(Value),
    Text(String),
}

impl ParsedOutput {
    /// Parse `raw` as JSON, falling back to plain text
    pub fn parse(raw: &str) -> Self {
        match serde_json::from_str::<Value>(raw.trim()) {
            Ok(value) => ParsedOutput::Json(value),
            Err(_) => ParsedOutput::Text(raw.to_string()),
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            ParsedOutput::Json(value) => Some(value),
            ParsedOutput::Text(_) => None,
        }
    }
}

/// Outcome of a single invocation
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationResult {
    pub success: bool,
    /// HTTP status code; `None` for gRPC
    pub status_code: Option<u16>,
    pub status_line: Option<String>,
    pub headers: Vec<(String, String)>,
    pub raw_output: String,
    pub parsed_output: ParsedOutput,
}

impl InvocationResult {
    /// Result carrying `raw_output`, parsed eagerly
    pub fn new(success: bool, raw_output: impl Into<String>) -> Self {
        let raw_output = raw_output.into();
        Self {
            success,
            status_code: None,
            status_line: None,
            headers: Vec::new(),
            parsed_output: ParsedOutput::parse(&raw_output),
            raw_output,
        }
    }

    pub fn ok(raw_output: impl Into<String>) -> Self {
        Self::new(true, raw_output)
    }

    pub fn failed(raw_output: impl Into<String>) -> Self {
        Self::new(false, raw_output)
    }

    pub fn with_status(mut self, code: u16, line: impl Into<String>) -> Self {
        self.status_code = Some(code);
        self.status_line = Some(line.into());
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Per-transport request counters
#[derive(Debug, Default)]
pub struct TransportStats {
    requests: AtomicU64,
    failures: AtomicU64,
    bytes_received: AtomicU64,
}

impl TransportStats {
    pub(crate) fn record_result(&self, result: &InvocationResult) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        if !result.success {
            self.failures.fetch_add(1, Ordering::Relaxed);
        }
        self.bytes_received
            .fetch_add(result.raw_output.len() as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_error(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`TransportStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub requests: u64,
    pub failures: u64,
    pub bytes_received: u64,
}
