//! Transport abstraction layer for inference invocation.
//!
//! HTTP(S) requests go through an in-process client; gRPC requests are
//! issued by a `grpcurl` subprocess. A scripted transport replays canned
//! replies for tests.

pub mod command;
pub mod config;
pub mod error;
pub mod factory;
pub mod grpc;
pub mod http;
pub mod scripted;
pub mod transport_trait;
pub mod types;

pub use command::{CommandOutput, CommandRunner, TokioCommandRunner};
pub use config::TransportConfig;
pub use error::TransportError;
pub use factory::TransportFactory;
pub use grpc::GrpcurlTransport;
pub use http::HttpTransport;
pub use scripted::ScriptedTransport;
pub use transport_trait::Transport;
pub use types::{
    InvocationResult, ParsedOutput, StatsSnapshot, TransportInfo, TransportStats, TransportType,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_info_serialization() {
        let info = TransportInfo {
            transport_type: TransportType::Grpcurl,
            description: "gRPC via grpcurl".to_string(),
        };

        let json = serde_json::to_string(&info).unwrap();
        let deserialized: TransportInfo = serde_json::from_str(&json).unwrap();

        assert_eq!(format!("{:?}", info), format!("{:?}", deserialized));
    }

    #[test]
    fn test_transport_type_display() {
        assert_eq!(TransportType::Http.to_string(), "http");
        assert_eq!(TransportType::Grpcurl.to_string(), "grpcurl");
    }

    #[test]
    fn test_invocation_result_header_lookup() {
        let result = InvocationResult::failed("denied")
            .with_status(401, "HTTP/1.1 401 Unauthorized")
            .with_header("X-Ext-Auth-Reason", "credential not found");
        assert_eq!(result.header("x-ext-auth-reason"), Some("credential not found"));
        assert_eq!(result.status_code, Some(401));
        assert!(matches!(result.parsed_output, ParsedOutput::Text(_)));
    }
}
