//! HTTP(S) transport
//!
//! Issues resolved requests with an in-process `reqwest` client and captures
//! the status line, headers and body.

use crate::request::ResolvedRequest;
use crate::transport::{
    InvocationResult, StatsSnapshot, Transport, TransportConfig, TransportError, TransportInfo,
    TransportStats, TransportType,
};
use async_trait::async_trait;
use secrecy::ExposeSecret;
use tracing::{debug, warn};

/// HTTP transport implementation
#[derive(Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
    /// Same client without certificate verification
    insecure_client: reqwest::Client,
    config: TransportConfig,
    stats: TransportStats,
}

impl HttpTransport {
    /// Create a new HTTP transport
    pub fn new(config: TransportConfig) -> Result<Self, TransportError> {
        let build = |insecure: bool| {
            reqwest::Client::builder()
                .timeout(config.request_timeout())
                .connect_timeout(config.connect_timeout())
                .danger_accept_invalid_certs(insecure)
                .build()
                .map_err(|e| {
                    TransportError::Configuration(format!("failed to build HTTP client: {}", e))
                })
        };

        Ok(Self {
            client: build(false)?,
            insecure_client: build(true)?,
            config,
            stats: TransportStats::default(),
        })
    }

    fn client_for(&self, request: &ResolvedRequest) -> &reqwest::Client {
        if request.insecure || self.config.insecure {
            &self.insecure_client
        } else {
            &self.client
        }
    }

    async fn send(&self, request: &ResolvedRequest) -> Result<InvocationResult, TransportError> {
        if !request.protocol.is_http() {
            return Err(TransportError::InvalidRequest(format!(
                "HTTP transport cannot carry {} requests",
                request.protocol
            )));
        }

        let client = self.client_for(request);
        let mut builder = if request.body.is_empty() {
            client.get(&request.target)
        } else {
            client.post(&request.target).body(request.body.clone())
        };
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(token) = &request.token {
            builder = builder.bearer_auth(token.expose_secret());
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout {
                    target: request.target.clone(),
                    timeout: self.config.request_timeout(),
                }
            } else {
                TransportError::Request {
                    target: request.target.clone(),
                    message: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        let status_line = format!("{:?} {}", response.version(), status);
        let headers: Vec<(String, String)> = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        let body = response.text().await.map_err(|e| TransportError::Request {
            target: request.target.clone(),
            message: format!("failed to read response body: {}", e),
        })?;

        let mut result = InvocationResult::new(status.is_success(), body)
            .with_status(status.as_u16(), status_line);
        result.headers = headers;
        Ok(result)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(
        &self,
        request: &ResolvedRequest,
    ) -> Result<InvocationResult, TransportError> {
        debug!(destination = %request.target, "Sending HTTP inference request");
        match self.send(request).await {
            Ok(result) => {
                self.stats.record_result(&result);
                if !result.success {
                    warn!(
                        destination = %request.target,
                        status = ?result.status_code,
                        "HTTP inference request returned non-success status"
                    );
                }
                Ok(result)
            }
            Err(e) => {
                self.stats.record_error();
                Err(e)
            }
        }
    }

    fn transport_info(&self) -> TransportInfo {
        TransportInfo {
            transport_type: TransportType::Http,
            description: "In-process HTTP(S) client".to_string(),
        }
    }

    fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Protocol;

    fn request(protocol: Protocol, target: &str) -> ResolvedRequest {
        ResolvedRequest {
            protocol,
            target: target.to_string(),
            endpoint: String::new(),
            headers: Vec::new(),
            body: String::new(),
            port: None,
            token: None,
            insecure: false,
            plaintext: false,
        }
    }

    #[tokio::test]
    async fn test_http_transport_creation() {
        let transport = HttpTransport::new(TransportConfig::default());
        assert!(transport.is_ok());
        assert_eq!(
            transport.unwrap().transport_info().transport_type,
            TransportType::Http
        );
    }

    #[tokio::test]
    async fn test_rejects_grpc_request() {
        let transport = HttpTransport::new(TransportConfig::default()).unwrap();
        let err = transport
            .execute(&request(Protocol::Grpc, "localhost:8033"))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::InvalidRequest(_)));
        assert_eq!(transport.stats().failures, 1);
    }

    #[tokio::test]
    async fn test_connection_failure_is_transport_error() {
        let transport = HttpTransport::new(TransportConfig::default()).unwrap();
        // Port 9 (discard) is closed on test hosts
        let err = transport
            .execute(&request(Protocol::Http, "http://127.0.0.1:9/infer"))
            .await
            .unwrap_err();
        assert_eq!(err.target(), Some("http://127.0.0.1:9/infer"));
    }
}
