//! Request builder
//!
//! Resolves a [`RequestTemplate`] against the parameters of one inference
//! call. Template resolution is identical for every protocol; the protocol
//! only changes how the target address is formatted.

pub mod template;

use crate::error::{Error, Result};
use crate::registry::{Protocol, RequestTemplate, RuntimeQueryRegistry};
use secrecy::SecretString;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;
use url::Url;

pub use template::{placeholders, safe_substitute};

/// Query payload substituted for `$query_input` / `$query_text`
#[derive(Debug, Clone, PartialEq)]
pub enum QueryPayload {
    /// Free text. JSON-escaped when substituted.
    Text(String),
    /// Structured payload, substituted as compact JSON
    Json(Value),
}

impl QueryPayload {
    /// Render for substitution. Strings are escaped but not quoted, so
    /// templates place them inside their own quotes.
    pub fn render(&self) -> String {
        match self {
            QueryPayload::Text(text) => escape_json_string(text),
            QueryPayload::Json(Value::String(text)) => escape_json_string(text),
            QueryPayload::Json(value) => value.to_string(),
        }
    }
}

impl From<&str> for QueryPayload {
    fn from(text: &str) -> Self {
        QueryPayload::Text(text.to_string())
    }
}

impl From<String> for QueryPayload {
    fn from(text: String) -> Self {
        QueryPayload::Text(text)
    }
}

impl From<Value> for QueryPayload {
    fn from(value: Value) -> Self {
        QueryPayload::Json(value)
    }
}

fn escape_json_string(text: &str) -> String {
    let quoted = Value::String(text.to_string()).to_string();
    quoted[1..quoted.len() - 1].to_string()
}

/// One inference call against a runtime
#[derive(Debug, Clone)]
pub struct InferenceCall {
    pub runtime: String,
    pub inference_type: String,
    pub model_name: String,
    pub query: Option<QueryPayload>,
    /// Pull the query from the registry default instead of `query`
    pub use_default_query: bool,
    pub token: Option<SecretString>,
}

impl InferenceCall {
    pub fn new(runtime: &str, inference_type: &str, model_name: &str) -> Self {
        Self {
            runtime: runtime.to_string(),
            inference_type: inference_type.to_string(),
            model_name: model_name.to_string(),
            query: None,
            use_default_query: false,
            token: None,
        }
    }

    pub fn with_query(mut self, query: impl Into<QueryPayload>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn with_default_query(mut self) -> Self {
        self.use_default_query = true;
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(SecretString::new(token.into().into_boxed_str()));
        self
    }
}

/// Fully-formed, protocol-specific request
#[derive(Debug, Clone)]
pub struct ResolvedRequest {
    pub protocol: Protocol,
    /// URL for HTTP(S), `host:port` for gRPC
    pub target: String,
    /// URL path or fully-qualified gRPC method
    pub endpoint: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
    pub port: Option<u16>,
    pub token: Option<SecretString>,
    /// Skip certificate verification
    pub insecure: bool,
    /// gRPC without TLS
    pub plaintext: bool,
}

impl ResolvedRequest {
    /// Human-readable destination for logs and errors
    pub fn destination(&self) -> String {
        if self.protocol.is_http() {
            self.target.clone()
        } else {
            format!("{}/{}", self.target, self.endpoint)
        }
    }
}

/// Where the runtime is served, resolved by the caller
#[derive(Debug, Clone)]
pub struct ServiceEndpoint {
    /// `host`, `host:port` or a URL
    pub address: String,
    pub port: Option<u16>,
}

impl ServiceEndpoint {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            port: None,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }
}

/// Builds [`ResolvedRequest`]s for one protocol and endpoint
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    registry: Arc<RuntimeQueryRegistry>,
    protocol: Protocol,
    endpoint: ServiceEndpoint,
    insecure: bool,
    plaintext: bool,
}

impl RequestBuilder {
    pub fn new(
        registry: Arc<RuntimeQueryRegistry>,
        protocol: Protocol,
        endpoint: ServiceEndpoint,
    ) -> Self {
        Self {
            registry,
            protocol,
            endpoint,
            insecure: false,
            plaintext: false,
        }
    }

    pub fn insecure(mut self, insecure: bool) -> Self {
        self.insecure = insecure;
        self
    }

    /// gRPC over a plaintext connection (port-forwards, in-cluster services)
    pub fn plaintext(mut self, plaintext: bool) -> Self {
        self.plaintext = plaintext;
        self
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn registry(&self) -> &Arc<RuntimeQueryRegistry> {
        &self.registry
    }

    /// Resolve the query payload for a call, honouring `use_default_query`
    pub fn query_for(&self, call: &InferenceCall) -> Result<QueryPayload> {
        if call.use_default_query {
            let default = self
                .registry
                .default_query(&call.runtime, &call.inference_type)?;
            return Ok(QueryPayload::Json(default.query_input.clone()));
        }
        call.query.clone().ok_or_else(|| {
            Error::config(format!(
                "no query supplied for {}/{} and default query not requested",
                call.runtime, call.inference_type
            ))
        })
    }

    /// Look up the template for `call` and resolve it
    pub fn build(&self, call: &InferenceCall) -> Result<ResolvedRequest> {
        let template = self
            .registry
            .lookup(&call.runtime, &call.inference_type, self.protocol)?;
        let query = self.query_for(call)?;
        self.build_from_template(template, &call.model_name, &query, call.token.clone())
    }

    /// Resolve an explicit template
    pub fn build_from_template(
        &self,
        template: &RequestTemplate,
        model_name: &str,
        query: &QueryPayload,
        token: Option<SecretString>,
    ) -> Result<ResolvedRequest> {
        let rendered_query = query.render();
        let vars: HashMap<&str, String> = HashMap::from([
            ("model_name", model_name.to_string()),
            ("query_input", rendered_query.clone()),
            ("query_text", rendered_query),
        ]);

        let endpoint = safe_substitute(&template.endpoint, &vars);
        let header = safe_substitute(&template.header, &vars);
        let body = safe_substitute(&template.body, &vars);
        let headers = parse_headers(&header);

        let target = match self.protocol {
            Protocol::Http | Protocol::Https => self.http_url(&endpoint)?,
            Protocol::Grpc => self.grpc_authority()?,
        };

        debug!(
            protocol = %self.protocol,
            destination = %target,
            endpoint = %endpoint,
            "Resolved inference request"
        );

        Ok(ResolvedRequest {
            protocol: self.protocol,
            target,
            endpoint,
            headers,
            body,
            port: self.endpoint.port,
            token,
            insecure: self.insecure,
            plaintext: self.plaintext,
        })
    }

    fn http_url(&self, endpoint: &str) -> Result<String> {
        let scheme = match self.protocol {
            Protocol::Https => "https",
            _ => "http",
        };
        let address = self.endpoint.address.trim_end_matches('/');
        let raw = if address.contains("://") {
            address.to_string()
        } else {
            format!("{}://{}", scheme, address)
        };
        let mut url = Url::parse(&raw)
            .map_err(|e| Error::config(format!("invalid endpoint '{}': {}", raw, e)))?;
        if let Some(port) = self.endpoint.port {
            url.set_port(Some(port))
                .map_err(|_| Error::config(format!("cannot set port on '{}'", raw)))?;
        }
        let base = url.as_str().trim_end_matches('/');
        Ok(format!("{}/{}", base, endpoint.trim_start_matches('/')))
    }

    fn grpc_authority(&self) -> Result<String> {
        let address = self
            .endpoint
            .address
            .split("://")
            .last()
            .unwrap_or_default()
            .trim_end_matches('/');
        if address.is_empty() {
            return Err(Error::config("empty gRPC endpoint address"));
        }
        let (host, embedded_port) = match address.rsplit_once(':') {
            Some((host, port)) if port.chars().all(|c| c.is_ascii_digit()) => {
                (host, port.parse::<u16>().ok())
            }
            _ => (address, None),
        };
        let default_port = if self.plaintext { 80 } else { 443 };
        let port = self.endpoint.port.or(embedded_port).unwrap_or(default_port);
        Ok(format!("{}:{}", host, port))
    }
}

/// Split a header template into `name: value` pairs, one per line
fn parse_headers(header: &str) -> Vec<(String, String)> {
    header
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| {
            line.split_once(':')
                .map(|(name, value)| (name.trim().to_string(), value.trim().to_string()))
        })
        .collect()
}
