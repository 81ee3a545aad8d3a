//! # serving-probe
//!
//! Inference invocation and verification for Kubernetes model-serving
//! platforms, plus deadline-bounded convergence polling.
//!
//! A call selects a runtime, an inference type and a protocol. The
//! [`RuntimeQueryRegistry`] yields the request template, the
//! [`RequestBuilder`] resolves it, a [`Transport`] issues it and the
//! [`ResponseValidator`] checks the answer. Cluster-side convergence
//! (replica counts, canary splits, scheduled metrics) is observed through the
//! [`Poller`] state machine and the checks built on it.

pub mod checks;
#[cfg(feature = "kubernetes")]
pub mod cluster;
pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod poller;
pub mod registry;
pub mod request;
pub mod transport;
pub mod validation;

pub use engine::{FanOutSummary, InferenceEngine};
pub use error::{Error, ErrorKind, FieldMismatch, Result};
pub use poller::{PollOutcome, PollState, PollTiming, Poller};
pub use registry::{Protocol, RequestTemplate, ResponseFieldMap, RuntimeQueryRegistry};
pub use request::{InferenceCall, QueryPayload, RequestBuilder, ResolvedRequest, ServiceEndpoint};
pub use transport::{InvocationResult, Transport, TransportError};
pub use validation::{Expectation, MatchMode, ResponseValidator, Strictness};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = Error::Configuration("unknown runtime 'x'".to_string());
        assert!(err.to_string().contains("unknown runtime"));
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }
}
