//! Transport Trait
//!
//! Core trait for all transport implementations

use async_trait::async_trait;
use std::fmt;

use super::error::TransportError;
use super::types::{InvocationResult, StatsSnapshot, TransportInfo};
use crate::request::ResolvedRequest;

/// Issues one resolved request and reports what came back. Implementations
/// never retry; retry policy belongs to the convergence poller.
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    /// Execute the request once
    async fn execute(&self, request: &ResolvedRequest)
        -> Result<InvocationResult, TransportError>;

    /// Get transport information
    fn transport_info(&self) -> TransportInfo;

    /// Get request statistics
    fn stats(&self) -> StatsSnapshot;
}
