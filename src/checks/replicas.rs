//! Replica count convergence

use super::{DeploymentProbe, DeploymentStatus};
use crate::error::{Error, ErrorKind, Result};
use crate::poller::{PollTiming, Poller};
use tokio::time::Instant;
use tracing::{info, warn};

/// Deployment and replica count to wait for
#[derive(Debug, Clone)]
pub struct ReplicaTarget<'a> {
    pub namespace: &'a str,
    pub name: &'a str,
    pub ready_replicas: i32,
    /// How often a recreated deployment may restart the wait
    pub max_restarts: u32,
}

impl<'a> ReplicaTarget<'a> {
    pub fn new(namespace: &'a str, name: &'a str, ready_replicas: i32) -> Self {
        Self {
            namespace,
            name,
            ready_replicas,
            max_restarts: 3,
        }
    }

    pub fn max_restarts(mut self, max_restarts: u32) -> Self {
        self.max_restarts = max_restarts;
        self
    }
}

/// Wait until a deployment reports the target number of ready replicas
///
/// A missing deployment keeps the poll going. When the deployment is
/// recreated under a new UID the wait restarts against the new object with a
/// fresh budget.
pub async fn wait_for_replicas(
    probe: &dyn DeploymentProbe,
    target: &ReplicaTarget<'_>,
    timing: PollTiming,
) -> Result<DeploymentStatus> {
    let description = format!(
        "deployment {}/{} to reach {} ready replicas",
        target.namespace, target.name, target.ready_replicas
    );
    let mut pinned_uid: Option<String> = None;
    let mut restarts = 0u32;
    let mut ticks = 0u32;
    let started = Instant::now();

    loop {
        let outcome = Poller::new(description.clone(), timing, || {
            probe.deployment(target.namespace, target.name)
        })
        .retry_on(&[ErrorKind::Cluster])
        .until(|sample| {
            let Some(status) = sample else {
                return false;
            };
            match &pinned_uid {
                // Recreated; hand the new object back for a restart
                Some(uid) if *uid != status.uid => true,
                Some(_) => status.ready_replicas == target.ready_replicas,
                None => {
                    pinned_uid = Some(status.uid.clone());
                    status.ready_replicas == target.ready_replicas
                }
            }
        })
        .await?;
        ticks += outcome.ticks();

        let observed = outcome.into_result().map_err(|e| match e {
            Error::TimedOut {
                description,
                last_sample,
                ..
            } => Error::TimedOut {
                description,
                elapsed: started.elapsed(),
                ticks,
                last_sample,
            },
            other => other,
        })?;
        let Some(status) = observed else {
            continue;
        };
        if pinned_uid.as_deref() == Some(status.uid.as_str()) {
            info!(
                namespace = target.namespace,
                deployment = target.name,
                replicas = status.ready_replicas,
                "Replica count converged"
            );
            return Ok(status);
        }

        restarts += 1;
        if restarts > target.max_restarts {
            return Err(Error::TimedOut {
                description: format!("{} (recreated {} times)", description, restarts),
                elapsed: started.elapsed(),
                ticks,
                last_sample: Some(format!("{:?}", status)),
            });
        }
        warn!(
            namespace = target.namespace,
            deployment = target.name,
            previous_uid = ?pinned_uid,
            uid = %status.uid,
            "Deployment recreated, restarting replica wait"
        );
        pinned_uid = Some(status.uid);
    }
}
