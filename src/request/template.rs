//! Safe `$name` / `${name}` substitution
//!
//! Unknown placeholders are left in place instead of raising, so a partially
//! specified template fails later at the transport or validation stage.

use regex::{Captures, Regex};
use std::collections::HashMap;
use std::sync::OnceLock;

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)\$(?:(?P<escaped>\$)|(?P<named>[_a-z][_a-z0-9]*)|\{(?P<braced>[_a-z][_a-z0-9]*)\})")
            .expect("placeholder pattern is valid")
    })
}

/// Substitute placeholders found in `vars`, leaving every other `$...` literal.
/// `$$` collapses to a single `$`.
pub fn safe_substitute(source: &str, vars: &HashMap<&str, String>) -> String {
    placeholder_pattern()
        .replace_all(source, |caps: &Captures<'_>| {
            if caps.name("escaped").is_some() {
                return "$".to_string();
            }
            let name = caps
                .name("named")
                .or_else(|| caps.name("braced"))
                .map(|m| m.as_str())
                .unwrap_or_default();
            match vars.get(name) {
                Some(value) => value.clone(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// Placeholder identifiers referenced by `source`, in order of appearance
pub fn placeholders(source: &str) -> Vec<String> {
    placeholder_pattern()
        .captures_iter(source)
        .filter_map(|caps| caps.name("named").or_else(|| caps.name("braced")))
        .map(|m| m.as_str().to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&'static str, &str)]) -> HashMap<&'static str, String> {
        pairs.iter().map(|(k, v)| (*k, v.to_string())).collect()
    }

    #[test]
    fn test_named_and_braced() {
        let out = safe_substitute(
            "$model_name/${model_name}_v2",
            &vars(&[("model_name", "flan")]),
        );
        assert_eq!(out, "flan/flan_v2");
    }

    #[test]
    fn test_unknown_placeholder_left_literal() {
        let out = safe_substitute(
            r#"{"a": "$query_input", "b": "$missing", "c": "${other}"}"#,
            &vars(&[("query_input", "hi")]),
        );
        assert_eq!(out, r#"{"a": "hi", "b": "$missing", "c": "${other}"}"#);
    }

    #[test]
    fn test_escape_and_lone_dollar() {
        let out = safe_substitute("cost: $$5 and $ alone", &vars(&[]));
        assert_eq!(out, "cost: $5 and $ alone");
    }

    #[test]
    fn test_placeholders_listing() {
        assert_eq!(
            placeholders("$a ${b} $$c $"),
            vec!["a".to_string(), "b".to_string()]
        );
    }
}
