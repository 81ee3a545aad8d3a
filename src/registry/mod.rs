//! Runtime query registry
//!
//! Maps `(runtime, inference type, protocol)` to the request template used to
//! call a model-serving runtime. The registry is built once and shared
//! read-only behind an `Arc`.

mod builtin;

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Runtime identifiers shipped in the built-in table
pub mod runtimes {
    pub const CAIKIT_TGIS: &str = "caikit-tgis";
    pub const CAIKIT_STANDALONE: &str = "caikit-standalone";
    pub const TGIS: &str = "tgis";
    pub const VLLM: &str = "vllm";
    pub const KSERVE_V2: &str = "kserve-v2";
}

/// Inference types shipped in the built-in table
pub mod inference_types {
    pub const ALL_TOKENS: &str = "all-tokens";
    pub const STREAMING: &str = "streaming";
    pub const TOKENIZE: &str = "tokenize";
    pub const EMBEDDING: &str = "embedding";
    pub const RERANK: &str = "rerank";
    pub const SENTENCE_SIMILARITY: &str = "sentence-similarity";
    pub const COMPLETIONS: &str = "completions";
    pub const CHAT_COMPLETIONS: &str = "chat-completions";
    pub const INFER: &str = "infer";
}

/// Wire protocol used to reach a runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Http,
    Https,
    Grpc,
}

impl Protocol {
    /// Key of the template table serving this protocol. HTTP and HTTPS
    /// share one table.
    pub fn table_key(self) -> &'static str {
        match self {
            Protocol::Http | Protocol::Https => "http",
            Protocol::Grpc => "grpc",
        }
    }

    pub fn is_http(self) -> bool {
        matches!(self, Protocol::Http | Protocol::Https)
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Http => write!(f, "http"),
            Protocol::Https => write!(f, "https"),
            Protocol::Grpc => write!(f, "grpc"),
        }
    }
}

impl FromStr for Protocol {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "http" => Ok(Protocol::Http),
            "https" => Ok(Protocol::Https),
            "grpc" => Ok(Protocol::Grpc),
            other => Err(Error::config(format!("unknown protocol '{}'", other))),
        }
    }
}

/// Logical roles mapping a runtime's wire format onto the generic validator
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseFieldMap {
    /// Key of the structured payload to compare
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_output: Option<String>,
    /// Key of the text to compare; reassembled across streamed fragments
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_text: Option<String>,
    /// Key of the wrapper node holding the fields
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
}

impl ResponseFieldMap {
    pub fn text(key: &str) -> Self {
        Self {
            response_text: Some(key.to_string()),
            ..Default::default()
        }
    }

    pub fn output(key: &str) -> Self {
        Self {
            response_output: Some(key.to_string()),
            ..Default::default()
        }
    }

    pub fn within(mut self, wrapper: &str) -> Self {
        self.response = Some(wrapper.to_string());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.response_output.is_none() && self.response_text.is_none()
    }
}

/// Request template for one runtime / inference type / protocol
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestTemplate {
    /// URL path (HTTP) or fully-qualified method (gRPC)
    pub endpoint: String,
    #[serde(default)]
    pub header: String,
    #[serde(default)]
    pub body: String,
    #[serde(default, alias = "response_fields_map")]
    pub response_field_map: ResponseFieldMap,
}

/// Default query declared by a runtime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefaultQuery {
    /// Query text (string) or structured payload
    pub query_input: serde_json::Value,
    /// Expected output for the default query
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_output: Option<String>,
    /// Compare `query_output` as a regex pattern
    #[serde(default)]
    pub use_regex: bool,
}

impl DefaultQuery {
    pub fn text(input: &str, output: &str) -> Self {
        Self {
            query_input: serde_json::Value::String(input.to_string()),
            query_output: Some(output.to_string()),
            use_regex: false,
        }
    }
}

/// Templates for one inference type
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InferenceTypeQueries {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_query: Option<DefaultQuery>,
    #[serde(default)]
    pub protocols: BTreeMap<String, RequestTemplate>,
}

/// Templates for one runtime
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuntimeQueries {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_query: Option<DefaultQuery>,
    #[serde(default)]
    pub inference_types: BTreeMap<String, InferenceTypeQueries>,
}

/// Immutable `(runtime × inference type × protocol) → template` table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuntimeQueryRegistry {
    #[serde(default)]
    runtimes: BTreeMap<String, RuntimeQueries>,
}

impl RuntimeQueryRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry populated with the shipped runtime templates
    pub fn builtin() -> Self {
        builtin::registry()
    }

    /// Parse a registry table from YAML
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        serde_yaml_ng::from_str(content)
            .map_err(|e| Error::config(format!("invalid registry YAML: {}", e)))
    }

    /// Parse a registry table from TOML
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::config(format!("invalid registry TOML: {}", e)))
    }

    /// Load a registry table, choosing the format by file extension
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::from_toml_str(&content),
            Some("yaml") | Some("yml") => Self::from_yaml_str(&content),
            _ => Err(Error::config(format!(
                "unsupported registry file extension: {}",
                path.display()
            ))),
        }
    }

    /// Overlay `other` on top of this registry. Templates and defaults in
    /// `other` win.
    pub fn merge(mut self, other: RuntimeQueryRegistry) -> Self {
        for (runtime, queries) in other.runtimes {
            let entry = self.runtimes.entry(runtime).or_default();
            if queries.default_query.is_some() {
                entry.default_query = queries.default_query;
            }
            for (inference_type, type_queries) in queries.inference_types {
                let type_entry = entry.inference_types.entry(inference_type).or_default();
                if type_queries.default_query.is_some() {
                    type_entry.default_query = type_queries.default_query;
                }
                type_entry.protocols.extend(type_queries.protocols);
            }
        }
        self
    }

    /// Add a template. Used while constructing a registry.
    pub fn insert(
        &mut self,
        runtime: &str,
        inference_type: &str,
        protocol: Protocol,
        template: RequestTemplate,
    ) {
        self.runtimes
            .entry(runtime.to_string())
            .or_default()
            .inference_types
            .entry(inference_type.to_string())
            .or_default()
            .protocols
            .insert(protocol.table_key().to_string(), template);
    }

    /// Declare a runtime-level default query
    pub fn set_default_query(&mut self, runtime: &str, query: DefaultQuery) {
        self.runtimes.entry(runtime.to_string()).or_default().default_query = Some(query);
    }

    /// Declare an inference-type default query, overriding the runtime one
    pub fn set_type_default_query(&mut self, runtime: &str, inference_type: &str, query: DefaultQuery) {
        self.runtimes
            .entry(runtime.to_string())
            .or_default()
            .inference_types
            .entry(inference_type.to_string())
            .or_default()
            .default_query = Some(query);
    }

    /// Resolve the template for a runtime / inference type / protocol.
    pub fn lookup(
        &self,
        runtime: &str,
        inference_type: &str,
        protocol: Protocol,
    ) -> Result<&RequestTemplate> {
        let queries = self.runtime(runtime)?;
        let type_queries = queries.inference_types.get(inference_type).ok_or_else(|| {
            Error::config(format!(
                "runtime '{}' has no inference type '{}'",
                runtime, inference_type
            ))
        })?;
        type_queries
            .protocols
            .get(protocol.table_key())
            .ok_or_else(|| {
                Error::config(format!(
                    "runtime '{}' inference type '{}' does not support protocol '{}'",
                    runtime, inference_type, protocol
                ))
            })
    }

    /// Default query for a runtime / inference type
    pub fn default_query(&self, runtime: &str, inference_type: &str) -> Result<&DefaultQuery> {
        let queries = self.runtime(runtime)?;
        queries
            .inference_types
            .get(inference_type)
            .and_then(|t| t.default_query.as_ref())
            .or(queries.default_query.as_ref())
            .ok_or_else(|| {
                Error::config(format!(
                    "runtime '{}' declares no default query for '{}'",
                    runtime, inference_type
                ))
            })
    }

    fn runtime(&self, runtime: &str) -> Result<&RuntimeQueries> {
        self.runtimes
            .get(runtime)
            .ok_or_else(|| Error::config(format!("unknown runtime '{}'", runtime)))
    }

    /// Known runtime names
    pub fn runtime_names(&self) -> impl Iterator<Item = &str> {
        self.runtimes.keys().map(String::as_str)
    }

    /// `(inference type, protocol)` pairs declared for a runtime
    pub fn capabilities(&self, runtime: &str) -> Result<Vec<(String, String)>> {
        let queries = self.runtime(runtime)?;
        Ok(queries
            .inference_types
            .iter()
            .flat_map(|(t, q)| q.protocols.keys().map(move |p| (t.clone(), p.clone())))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_parse_and_table_key() {
        assert_eq!("HTTPS".parse::<Protocol>().unwrap(), Protocol::Https);
        assert_eq!(Protocol::Https.table_key(), "http");
        assert_eq!(Protocol::Grpc.table_key(), "grpc");
        assert!("websocket".parse::<Protocol>().unwrap_err().is_configuration());
    }

    #[test]
    fn test_builtin_lookup() {
        let registry = RuntimeQueryRegistry::builtin();
        let template = registry
            .lookup(runtimes::CAIKIT_TGIS, inference_types::ALL_TOKENS, Protocol::Https)
            .unwrap();
        assert_eq!(template.endpoint, "api/v1/task/text-generation");
        assert_eq!(
            template.response_field_map.response_text.as_deref(),
            Some("generated_text")
        );
    }

    #[test]
    fn test_lookup_miss_is_configuration_error() {
        let registry = RuntimeQueryRegistry::builtin();
        for err in [
            registry.lookup("nope", inference_types::ALL_TOKENS, Protocol::Http),
            registry.lookup(runtimes::CAIKIT_TGIS, "nope", Protocol::Http),
            registry.lookup(runtimes::VLLM, inference_types::COMPLETIONS, Protocol::Grpc),
        ] {
            assert!(err.unwrap_err().is_configuration());
        }
    }

    #[test]
    fn test_default_query_fallback_order() {
        let mut registry = RuntimeQueryRegistry::new();
        registry.set_default_query("rt", DefaultQuery::text("runtime-level", "a"));
        registry.set_type_default_query("rt", "special", DefaultQuery::text("type-level", "b"));
        registry.insert(
            "rt",
            "plain",
            Protocol::Http,
            RequestTemplate {
                endpoint: "x".into(),
                header: String::new(),
                body: String::new(),
                response_field_map: ResponseFieldMap::text("t"),
            },
        );

        assert_eq!(
            registry.default_query("rt", "special").unwrap().query_input,
            "type-level"
        );
        assert_eq!(
            registry.default_query("rt", "plain").unwrap().query_input,
            "runtime-level"
        );

        let mut bare = RuntimeQueryRegistry::new();
        bare.insert("rt", "plain", Protocol::Http, registry.lookup("rt", "plain", Protocol::Http).unwrap().clone());
        assert!(bare.default_query("rt", "plain").unwrap_err().is_configuration());
    }

    #[test]
    fn test_yaml_load_and_merge() {
        let yaml = r#"
runtimes:
  custom-rt:
    default_query:
      query_input: "hello"
      query_output: "world"
    inference_types:
      all-tokens:
        protocols:
          http:
            endpoint: "v1/generate"
            header: "Content-Type: application/json"
            body: '{"prompt": "$query_input"}'
            response_fields_map:
              response_text: "text"
"#;
        let custom = RuntimeQueryRegistry::from_yaml_str(yaml).unwrap();
        let merged = RuntimeQueryRegistry::builtin().merge(custom);

        let template = merged
            .lookup("custom-rt", inference_types::ALL_TOKENS, Protocol::Http)
            .unwrap();
        assert_eq!(template.endpoint, "v1/generate");
        assert!(merged
            .lookup(runtimes::CAIKIT_TGIS, inference_types::STREAMING, Protocol::Grpc)
            .is_ok());
        assert!(merged.runtime_names().any(|n| n == "custom-rt"));
    }

    #[test]
    fn test_toml_load() {
        let toml = r#"
[runtimes.echo.inference_types.infer.protocols.grpc]
endpoint = "echo.Echo/Say"
body = '{"msg": "$query_input"}'
response_field_map = { response_text = "msg" }
"#;
        let registry = RuntimeQueryRegistry::from_toml_str(toml).unwrap();
        let template = registry.lookup("echo", "infer", Protocol::Grpc).unwrap();
        assert_eq!(template.header, "");
        assert_eq!(template.response_field_map.response_text.as_deref(), Some("msg"));
        assert_eq!(
            registry.capabilities("echo").unwrap(),
            vec![("infer".to_string(), "grpc".to_string())]
        );
    }
}
