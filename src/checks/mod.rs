//! Convergence checks
//!
//! Domain consumers of the [`Poller`](crate::poller::Poller): replica counts,
//! scale-to-zero, pod readiness, canary traffic splits and scheduled metric
//! requests. Cluster state is read through the [`DeploymentProbe`] and
//! [`PodProbe`] traits so the checks run against any backend.

pub mod canary;
pub mod pods;
pub mod replicas;
pub mod scheduled;

pub use canary::{wait_for_traffic_split, CanaryEstimator, CanaryReport, CanarySample};
pub use pods::{wait_for_pods_ready, wait_for_scale_to_zero};
pub use replicas::{wait_for_replicas, ReplicaTarget};
pub use scheduled::{
    wait_for_scheduled_request, HttpScheduledMetricSource, ScheduledMetricSource,
    ScheduledRequest,
};

use crate::error::Result;
use async_trait::async_trait;

/// Observed state of a deployment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentStatus {
    /// Object identity; changes when the deployment is recreated
    pub uid: String,
    pub generation: Option<i64>,
    pub desired_replicas: i32,
    pub ready_replicas: i32,
}

/// Observed state of a pod
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodStatus {
    pub name: String,
    /// Pod phase (`Pending`, `Running`, ...)
    pub phase: String,
    /// `Ready` condition is true
    pub ready: bool,
    /// Deletion has been requested
    pub terminating: bool,
}

impl PodStatus {
    pub fn is_serving(&self) -> bool {
        self.phase == "Running" && self.ready && !self.terminating
    }
}

/// Reads deployments
#[async_trait]
pub trait DeploymentProbe: Send + Sync {
    /// `Ok(None)` when the deployment does not exist (yet)
    async fn deployment(&self, namespace: &str, name: &str) -> Result<Option<DeploymentStatus>>;
}

/// Lists pods by label selector
#[async_trait]
pub trait PodProbe: Send + Sync {
    async fn pods(&self, namespace: &str, selector: &str) -> Result<Vec<PodStatus>>;
}
