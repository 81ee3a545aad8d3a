//! Pod lifecycle convergence

use super::{PodProbe, PodStatus};
use crate::error::{ErrorKind, Result};
use crate::poller::{PollTiming, Poller};
use tracing::{debug, info};

/// Wait until no pod matches `selector`
///
/// Pods still terminating are in-flight teardown, not a failure; the poll
/// simply continues.
pub async fn wait_for_scale_to_zero(
    probe: &dyn PodProbe,
    namespace: &str,
    selector: &str,
    timing: PollTiming,
) -> Result<()> {
    Poller::new(
        format!("pods matching '{}' in {} to scale to zero", selector, namespace),
        timing,
        || probe.pods(namespace, selector),
    )
    .retry_on(&[ErrorKind::Cluster])
    .wait(|pods| {
        if !pods.is_empty() {
            debug!(
                namespace,
                selector,
                remaining = pods.len(),
                terminating = pods.iter().filter(|p| p.terminating).count(),
                "Pods still present"
            );
        }
        pods.is_empty()
    })
    .await?;

    info!(namespace, selector, "Scaled to zero");
    Ok(())
}

/// Wait until exactly `count` pods matching `selector` are running and ready
pub async fn wait_for_pods_ready(
    probe: &dyn PodProbe,
    namespace: &str,
    selector: &str,
    count: usize,
    timing: PollTiming,
) -> Result<Vec<PodStatus>> {
    let pods = Poller::new(
        format!("{} ready pods matching '{}' in {}", count, selector, namespace),
        timing,
        || probe.pods(namespace, selector),
    )
    .retry_on(&[ErrorKind::Cluster])
    .wait(|pods| pods.iter().filter(|p| p.is_serving()).count() == count)
    .await?;

    info!(namespace, selector, count, "Pods ready");
    Ok(pods.into_iter().filter(PodStatus::is_serving).collect())
}
