//! Transport Factory
//!
//! Picks the transport that can carry a protocol

use super::config::TransportConfig;
use super::error::TransportError;
use super::grpc::GrpcurlTransport;
use super::http::HttpTransport;
use super::transport_trait::Transport;
use crate::registry::Protocol;
use std::sync::Arc;

/// Transport factory for creating transport instances
pub struct TransportFactory;

impl TransportFactory {
    /// Create the transport for `protocol`
    pub fn create(
        protocol: Protocol,
        config: &TransportConfig,
    ) -> Result<Arc<dyn Transport>, TransportError> {
        match protocol {
            Protocol::Http | Protocol::Https => Ok(Arc::new(HttpTransport::new(config.clone())?)),
            Protocol::Grpc => Ok(Arc::new(GrpcurlTransport::new(config.clone()))),
        }
    }
}
