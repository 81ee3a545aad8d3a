//! Response normalization and validation
//!
//! Raw transport output is parsed as JSON when possible, the configured
//! response field is extracted through the runtime's [`ResponseFieldMap`],
//! and the result is compared to the expectation exactly or by regex search.

pub mod auth;
pub mod stream;

pub use auth::{
    detect_auth_rejection, validate_auth_rejection, AuthExpectation, AuthRejection,
    AUTH_REASON_HEADER, REASON_MISSING_CREDENTIAL, REASON_REJECTED_CREDENTIAL,
};
pub use stream::{fragments, reassemble_stream};

use crate::error::{Error, FieldMismatch, Result};
use crate::registry::{DefaultQuery, ResponseFieldMap};
use crate::transport::{InvocationResult, ParsedOutput};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// How an expected value is compared
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    /// Text byte-equal; structured payloads equal as JSON values
    #[default]
    Exact,
    /// Expected value is a pattern searched anywhere in the output
    Regex,
}

/// Whether validation stops at the first mismatch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strictness {
    /// Report every mismatching field
    #[default]
    StrictAll,
    /// Report only the first mismatch
    FailFast,
}

/// Expectation on a field addressed by JSON pointer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldExpectation {
    pub pointer: String,
    pub expected: String,
    pub mode: MatchMode,
}

/// What a response must look like
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Expectation {
    /// Expected value of the mapped text/output field
    pub expected: Option<String>,
    pub mode: MatchMode,
    /// Always reassemble the text field from streamed fragments
    pub streaming: bool,
    pub fields: Vec<FieldExpectation>,
    /// When set, the response must be an authorization rejection and no
    /// field validation happens
    pub auth: Option<AuthExpectation>,
}

impl Expectation {
    pub fn exact(expected: impl Into<String>) -> Self {
        Self {
            expected: Some(expected.into()),
            ..Default::default()
        }
    }

    pub fn regex(pattern: impl Into<String>) -> Self {
        Self {
            expected: Some(pattern.into()),
            mode: MatchMode::Regex,
            ..Default::default()
        }
    }

    /// Only require a successful invocation
    pub fn success() -> Self {
        Self::default()
    }

    pub fn auth_rejection(auth: AuthExpectation) -> Self {
        Self {
            auth: Some(auth),
            ..Default::default()
        }
    }

    /// Expectation declared by a runtime's default query
    pub fn from_default_query(query: &DefaultQuery) -> Self {
        Self {
            expected: query.query_output.clone(),
            mode: if query.use_regex {
                MatchMode::Regex
            } else {
                MatchMode::Exact
            },
            ..Default::default()
        }
    }

    pub fn streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    pub fn with_field(mut self, pointer: &str, expected: &str, mode: MatchMode) -> Self {
        self.fields.push(FieldExpectation {
            pointer: pointer.to_string(),
            expected: expected.to_string(),
            mode,
        });
        self
    }
}

/// Value pulled out of a response for comparison
#[derive(Debug, Clone, PartialEq)]
pub enum Extracted {
    Text(String),
    Structured(Value),
}

impl Extracted {
    /// Text form used for regex search and diagnostics
    pub fn render(&self) -> String {
        match self {
            Extracted::Text(text) => text.clone(),
            Extracted::Structured(Value::String(text)) => text.clone(),
            Extracted::Structured(value) => value.to_string(),
        }
    }
}

/// Validates invocation results against expectations
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseValidator {
    strictness: Strictness,
}

impl ResponseValidator {
    pub fn new(strictness: Strictness) -> Self {
        Self { strictness }
    }

    pub fn strictness(&self) -> Strictness {
        self.strictness
    }

    /// Validate `result` against `expectation`
    pub fn validate(
        &self,
        result: &InvocationResult,
        field_map: &ResponseFieldMap,
        expectation: &Expectation,
    ) -> Result<()> {
        if let Some(auth) = &expectation.auth {
            let rejection = validate_auth_rejection(result, auth)?;
            debug!(reason = ?rejection.reason, "Authorization rejection confirmed");
            return Ok(());
        }

        if !result.success {
            return Err(Error::ValidationMismatch {
                mismatches: vec![FieldMismatch {
                    field: "status".to_string(),
                    expected: "successful invocation".to_string(),
                    actual: Some(
                        result
                            .status_line
                            .clone()
                            .unwrap_or_else(|| result.raw_output.clone()),
                    ),
                }],
            });
        }

        let mut mismatches = Vec::new();

        if let Some(expected) = &expectation.expected {
            let (role, _) = primary_role(field_map)?;
            let extracted = extract(result, field_map, expectation.streaming)?;
            if let Some(mismatch) = compare(role, expected, extracted.as_ref(), expectation.mode)? {
                mismatches.push(mismatch);
            }
        }

        for field in &expectation.fields {
            if self.strictness == Strictness::FailFast && !mismatches.is_empty() {
                break;
            }
            let actual = result
                .parsed_output
                .as_json()
                .and_then(|json| json.pointer(&field.pointer))
                .cloned()
                .map(Extracted::Structured);
            if let Some(mismatch) =
                compare(&field.pointer, &field.expected, actual.as_ref(), field.mode)?
            {
                mismatches.push(mismatch);
            }
        }

        if mismatches.is_empty() {
            Ok(())
        } else {
            if self.strictness == Strictness::FailFast {
                mismatches.truncate(1);
            }
            Err(Error::ValidationMismatch { mismatches })
        }
    }
}

fn primary_role(field_map: &ResponseFieldMap) -> Result<(&'static str, &str)> {
    if let Some(key) = &field_map.response_text {
        Ok(("response_text", key))
    } else if let Some(key) = &field_map.response_output {
        Ok(("response_output", key))
    } else {
        Err(Error::config(
            "response field map declares neither response_text nor response_output",
        ))
    }
}

/// Extract the field the map designates as the comparison target
///
/// Returns `Ok(None)` when the field is absent from the response.
pub fn extract(
    result: &InvocationResult,
    field_map: &ResponseFieldMap,
    streaming: bool,
) -> Result<Option<Extracted>> {
    let (role, key) = primary_role(field_map)?;
    let is_text = role == "response_text";

    if is_text && streaming {
        return Ok(reassembled(&result.raw_output, key));
    }

    match &result.parsed_output {
        ParsedOutput::Json(payload) => {
            let mut node = payload;
            if let Some(wrapper) = &field_map.response {
                match node.get(wrapper) {
                    Some(inner) => node = inner,
                    None => return Ok(None),
                }
            }
            if let Value::Array(items) = node {
                match items.first() {
                    Some(first) => node = first,
                    None => return Ok(None),
                }
            }
            Ok(node.get(key).map(|value| {
                if is_text {
                    match value {
                        Value::String(text) => Extracted::Text(text.clone()),
                        other => Extracted::Text(other.to_string()),
                    }
                } else {
                    Extracted::Structured(value.clone())
                }
            }))
        }
        // Several concatenated messages or plain text
        ParsedOutput::Text(raw) => {
            if is_text {
                if let Some(text) = reassembled(raw, key) {
                    return Ok(Some(text));
                }
            }
            Ok(Some(Extracted::Text(raw.trim().to_string())))
        }
    }
}

fn reassembled(raw: &str, key: &str) -> Option<Extracted> {
    let parts = fragments(raw, key);
    if parts.is_empty() {
        None
    } else {
        Some(Extracted::Text(parts.concat()))
    }
}

fn compare(
    field: &str,
    expected: &str,
    actual: Option<&Extracted>,
    mode: MatchMode,
) -> Result<Option<FieldMismatch>> {
    let Some(actual) = actual else {
        return Ok(Some(FieldMismatch {
            field: field.to_string(),
            expected: expected.to_string(),
            actual: None,
        }));
    };

    let matched = match mode {
        MatchMode::Exact => exact_match(expected, actual),
        MatchMode::Regex => {
            let re = Regex::new(expected)
                .map_err(|e| Error::Template(format!("invalid pattern {:?}: {}", expected, e)))?;
            re.is_match(&actual.render())
        }
    };

    Ok((!matched).then(|| FieldMismatch {
        field: field.to_string(),
        expected: expected.to_string(),
        actual: Some(actual.render()),
    }))
}

fn exact_match(expected: &str, actual: &Extracted) -> bool {
    match actual {
        Extracted::Text(text) => text == expected,
        Extracted::Structured(value) => match serde_json::from_str::<Value>(expected) {
            Ok(expected_value) => *value == expected_value,
            Err(_) => matches!(value, Value::String(text) if text == expected),
        },
    }
}
