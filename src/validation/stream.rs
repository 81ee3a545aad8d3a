//! Streaming response reassembly
//!
//! Streamed token fragments arrive as repeated occurrences of the text field
//! (`grpcurl` prints one JSON message per frame, HTTP streaming endpoints emit
//! `data:` lines). The full text is the in-order concatenation of every
//! occurrence.

use regex::Regex;

/// Concatenate every `"<field>": "<value>"` occurrence in `raw`, in order
///
/// Values are JSON-unescaped before joining; an occurrence whose value cannot
/// be unescaped contributes its raw text.
pub fn reassemble_stream(raw: &str, field: &str) -> String {
    fragments(raw, field).concat()
}

/// Individual fragment values, in arrival order
pub fn fragments(raw: &str, field: &str) -> Vec<String> {
    let pattern = format!(r#""{}"\s*:\s*"((?:[^"\\]|\\.)*)""#, regex::escape(field));
    let Ok(re) = Regex::new(&pattern) else {
        return Vec::new();
    };

    re.captures_iter(raw)
        .filter_map(|caps| caps.get(1))
        .map(|m| unescape(m.as_str()))
        .collect()
}

fn unescape(escaped: &str) -> String {
    serde_json::from_str::<String>(&format!("\"{}\"", escaped))
        .unwrap_or_else(|_| escaped.to_string())
}
