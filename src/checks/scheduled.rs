//! Scheduled metric computations
//!
//! Explainability services register recurring metric computations and list
//! them under `metrics/all/requests`. A registration is confirmed by its
//! opaque request id, not by the metric values.

use crate::error::{Error, ErrorKind, Result};
use crate::poller::{PollTiming, Poller};
use crate::transport::TransportError;
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};

/// Path listing scheduled requests, relative to the service base URL
pub const SCHEDULED_REQUESTS_PATH: &str = "metrics/all/requests";

/// One scheduled computation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledRequest {
    pub id: String,
    /// Request definition, kept opaque
    #[serde(default)]
    pub request: Value,
}

/// Lists scheduled computations
#[async_trait]
pub trait ScheduledMetricSource: Send + Sync {
    async fn scheduled_requests(&self) -> Result<Vec<ScheduledRequest>>;
}

/// Parse a listing: `{"requests": [...]}` or a bare array
pub fn parse_scheduled_requests(body: &str) -> Result<Vec<ScheduledRequest>> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Listing {
        Wrapped { requests: Vec<ScheduledRequest> },
        Bare(Vec<ScheduledRequest>),
    }

    Ok(match serde_json::from_str::<Listing>(body)? {
        Listing::Wrapped { requests } | Listing::Bare(requests) => requests,
    })
}

/// [`ScheduledMetricSource`] reading the HTTP listing endpoint
#[derive(Debug, Clone)]
pub struct HttpScheduledMetricSource {
    client: reqwest::Client,
    base_url: String,
    token: Option<SecretString>,
}

impl HttpScheduledMetricSource {
    pub fn new(base_url: impl Into<String>, timeout: Duration, insecure: bool) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(insecure)
            .build()
            .map_err(|e| Error::config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            token: None,
        })
    }

    pub fn with_token(mut self, token: SecretString) -> Self {
        self.token = Some(token);
        self
    }

    pub fn url(&self) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            SCHEDULED_REQUESTS_PATH
        )
    }
}

#[async_trait]
impl ScheduledMetricSource for HttpScheduledMetricSource {
    async fn scheduled_requests(&self) -> Result<Vec<ScheduledRequest>> {
        let url = self.url();
        let mut request = self.client.get(&url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token.expose_secret());
        }

        let request_error = |message: String| {
            Error::Transport(TransportError::Request {
                target: url.clone(),
                message,
            })
        };

        let response = request.send().await.map_err(|e| request_error(e.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| request_error(e.to_string()))?;
        if !status.is_success() {
            return Err(request_error(format!("status {}: {}", status, body)));
        }
        parse_scheduled_requests(&body)
    }
}

/// Wait until exactly one scheduled request carries `request_id`
///
/// Listing failures count as unsatisfied samples.
pub async fn wait_for_scheduled_request(
    source: &dyn ScheduledMetricSource,
    request_id: &str,
    timing: PollTiming,
) -> Result<ScheduledRequest> {
    let listing = Poller::new(
        format!("scheduled metric request {}", request_id),
        timing,
        || source.scheduled_requests(),
    )
    .retry_on(&[ErrorKind::Transport])
    .wait(|requests| {
        let matches = requests.iter().filter(|r| r.id == request_id).count();
        debug!(request_id, matches, listed = requests.len(), "Scheduled requests listed");
        matches == 1
    })
    .await?;

    info!(request_id, "Scheduled metric request registered");
    listing
        .into_iter()
        .find(|r| r.id == request_id)
        .ok_or_else(|| Error::config(format!("scheduled request {} vanished", request_id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_parse_wrapped_and_bare() {
        let wrapped = r#"{"requests": [{"id": "abc", "request": {"metricName": "SPD"}}]}"#;
        let bare = r#"[{"id": "abc"}]"#;
        assert_eq!(parse_scheduled_requests(wrapped).unwrap()[0].id, "abc");
        assert_eq!(parse_scheduled_requests(bare).unwrap()[0].request, Value::Null);
        assert!(parse_scheduled_requests("not json").is_err());
    }

    #[test]
    fn test_url() {
        let source =
            HttpScheduledMetricSource::new("https://trustyai.example.com/", Duration::from_secs(5), true)
                .unwrap();
        assert_eq!(
            source.url(),
            "https://trustyai.example.com/metrics/all/requests"
        );
    }

    struct Growing {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ScheduledMetricSource for Growing {
        async fn scheduled_requests(&self) -> Result<Vec<ScheduledRequest>> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                return Err(Error::Transport(TransportError::Request {
                    target: "svc".to_string(),
                    message: "connection refused".to_string(),
                }));
            }
            Ok((0..n)
                .map(|i| ScheduledRequest {
                    id: if i == 1 { "target".to_string() } else { format!("other-{}", i) },
                    request: Value::Null,
                })
                .collect())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_for_exactly_one_entry() {
        let source = Growing {
            calls: AtomicUsize::new(0),
        };
        let found = wait_for_scheduled_request(&source, "target", PollTiming::from_secs(60, 5))
            .await
            .unwrap();
        assert_eq!(found.id, "target");
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_ids_do_not_satisfy() {
        struct Duplicated;

        #[async_trait]
        impl ScheduledMetricSource for Duplicated {
            async fn scheduled_requests(&self) -> Result<Vec<ScheduledRequest>> {
                let entry = ScheduledRequest {
                    id: "dup".to_string(),
                    request: Value::Null,
                };
                Ok(vec![entry.clone(), entry])
            }
        }

        let err = wait_for_scheduled_request(&Duplicated, "dup", PollTiming::from_secs(10, 5))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::TimedOut { .. }));
    }
}
