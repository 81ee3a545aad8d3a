use crate::error::{Error, Result};
use crate::logging::LogConfig;
use crate::poller::PollTiming;
use crate::registry::RuntimeQueryRegistry;
use crate::transport::TransportConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Logging configuration
    pub logging: LogConfig,

    /// Transport configuration
    pub transport: TransportConfig,

    /// Poll budgets per convergence check
    pub timeouts: TimeoutConfig,

    /// Canary estimation defaults
    pub canary: CanaryConfig,

    /// Fan-out defaults
    pub fan_out: FanOutConfig,

    /// Extra runtime templates merged over the built-in table
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registry_path: Option<PathBuf>,
}

/// Wait budget and interval for each kind of convergence check
///
/// Passed to the `checks` wait functions by library callers; the CLI reads
/// `route` for `canary --wait`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Deployment replica convergence
    pub replicas: PollTiming,

    /// Pod readiness and scale-to-zero
    pub pods: PollTiming,

    /// Route / traffic split propagation
    pub route: PollTiming,

    /// Scheduled metric registration
    pub scheduled_metrics: PollTiming,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CanaryConfig {
    /// Invocations per estimate
    pub iterations: u32,

    /// Allowed distance from the expected percentage, in percentage points
    pub tolerance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FanOutConfig {
    /// Maximum invocations in flight
    pub workers: usize,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            replicas: PollTiming::from_secs(600, 5),
            pods: PollTiming::from_secs(300, 5),
            route: PollTiming::from_secs(240, 5),
            scheduled_metrics: PollTiming::from_secs(900, 10),
        }
    }
}

impl Default for CanaryConfig {
    fn default() -> Self {
        Self {
            iterations: 20,
            tolerance: 10.0,
        }
    }
}

impl Default for FanOutConfig {
    fn default() -> Self {
        Self { workers: 4 }
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            logging: LogConfig::default(),
            transport: TransportConfig::default(),
            timeouts: TimeoutConfig::default(),
            canary: CanaryConfig::default(),
            fan_out: FanOutConfig::default(),
            registry_path: None,
        }
    }
}

impl ProbeConfig {
    /// Reject settings no check can run with
    pub fn validate(&self) -> Result<()> {
        let timings = [
            ("timeouts.replicas", &self.timeouts.replicas),
            ("timeouts.pods", &self.timeouts.pods),
            ("timeouts.route", &self.timeouts.route),
            ("timeouts.scheduled_metrics", &self.timeouts.scheduled_metrics),
        ];
        for (name, timing) in timings {
            if timing.budget.is_zero() {
                return Err(Error::config(format!("{}.budget must be positive", name)));
            }
            if timing.interval.is_zero() {
                return Err(Error::config(format!("{}.interval must be positive", name)));
            }
        }

        if !(0.0..=100.0).contains(&self.canary.tolerance) {
            return Err(Error::config(format!(
                "canary.tolerance must be within 0..=100, got {}",
                self.canary.tolerance
            )));
        }
        if self.canary.iterations == 0 {
            return Err(Error::config("canary.iterations must be positive"));
        }
        if self.fan_out.workers == 0 {
            return Err(Error::config("fan_out.workers must be positive"));
        }
        if self.transport.request_timeout_secs == 0 {
            return Err(Error::config("transport.request_timeout_secs must be positive"));
        }
        Ok(())
    }

    /// Built-in templates, overlaid with `registry_path` when set
    pub fn load_registry(&self) -> Result<RuntimeQueryRegistry> {
        let builtin = RuntimeQueryRegistry::builtin();
        match &self.registry_path {
            Some(path) => Ok(builtin.merge(RuntimeQueryRegistry::from_path(path)?)),
            None => Ok(builtin),
        }
    }
}
