//! Canary traffic-percentage estimation
//!
//! The share of traffic reaching the new model version is estimated by
//! sending the same call repeatedly and counting responses whose content
//! matches what only the new version produces. Routing metadata is not
//! consulted.

use crate::engine::InferenceEngine;
use crate::error::{Error, ErrorKind, Result};
use crate::poller::{PollTiming, Poller};
use crate::request::InferenceCall;
use crate::validation::Expectation;
use serde::Serialize;
use tracing::{debug, info, warn};

/// Counts from repeated invocations
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CanarySample {
    pub attempts: u32,
    pub successes: u32,
}

impl CanarySample {
    pub fn record(&mut self, success: bool) {
        self.attempts += 1;
        if success {
            self.successes += 1;
        }
    }

    /// `successes / attempts × 100`; zero for an empty sample
    pub fn percentage(&self) -> f64 {
        if self.attempts == 0 {
            return 0.0;
        }
        f64::from(self.successes) * 100.0 / f64::from(self.attempts)
    }
}

/// Result of one estimation run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanaryReport {
    pub sample: CanarySample,
    pub observed_percentage: f64,
    /// Old and new versions answer identically, so the estimate undercounts
    pub indistinguishable: bool,
}

impl CanaryReport {
    fn new(sample: CanarySample, indistinguishable: bool) -> Self {
        Self {
            observed_percentage: sample.percentage(),
            sample,
            indistinguishable,
        }
    }

    pub fn within(&self, expected: f64, tolerance: f64) -> bool {
        self.sample.successes > 0 && (self.observed_percentage - expected).abs() <= tolerance
    }

    /// Require the observed share to be within `tolerance` of `expected`
    ///
    /// Zero successes fail even inside the band: that is a total outage, not
    /// a skewed split.
    pub fn check(&self, expected: f64, tolerance: f64) -> Result<()> {
        if self.sample.successes == 0 {
            return Err(Error::CanaryOutOfTolerance(format!(
                "no successful responses in {} attempts",
                self.sample.attempts
            )));
        }
        if self.within(expected, tolerance) {
            Ok(())
        } else {
            Err(Error::CanaryOutOfTolerance(format!(
                "observed {:.1}% ({}/{}), expected {:.1}% ± {:.1}",
                self.observed_percentage,
                self.sample.successes,
                self.sample.attempts,
                expected,
                tolerance
            )))
        }
    }
}

/// Estimates the traffic share served by a new model version
#[derive(Debug)]
pub struct CanaryEstimator<'a> {
    engine: &'a InferenceEngine,
    new_version: Expectation,
    previous_version: Option<Expectation>,
}

impl<'a> CanaryEstimator<'a> {
    /// `new_version` describes responses only the new version produces
    pub fn new(engine: &'a InferenceEngine, new_version: Expectation) -> Self {
        Self {
            engine,
            new_version,
            previous_version: None,
        }
    }

    /// Responses of the version being replaced, used to flag ambiguity
    pub fn previous_version(mut self, previous: Expectation) -> Self {
        self.previous_version = Some(previous);
        self
    }

    pub fn indistinguishable(&self) -> bool {
        match &self.previous_version {
            Some(previous) => {
                previous.expected.is_some()
                    && previous.expected == self.new_version.expected
                    && previous.mode == self.new_version.mode
            }
            None => false,
        }
    }

    /// Send `call` `iterations` times and count new-version responses
    ///
    /// Transport failures and non-matching responses are non-success samples.
    /// Configuration errors abort the run.
    pub async fn estimate(&self, call: &InferenceCall, iterations: u32) -> Result<CanaryReport> {
        let indistinguishable = self.indistinguishable();
        if indistinguishable {
            warn!(
                runtime = %call.runtime,
                "Old and new versions produce the same response; canary estimate will undercount"
            );
        }

        let mut sample = CanarySample::default();
        for attempt in 0..iterations {
            match self.engine.verify(call, &self.new_version).await {
                Ok(_) => sample.record(true),
                Err(e) if matches!(e.kind(), ErrorKind::Transport | ErrorKind::Validation) => {
                    debug!(attempt, error = %e, "Canary sample not served by new version");
                    sample.record(false);
                }
                Err(e) => return Err(e),
            }
        }

        let report = CanaryReport::new(sample, indistinguishable);
        info!(
            attempts = report.sample.attempts,
            successes = report.sample.successes,
            percentage = report.observed_percentage,
            "Canary traffic estimated"
        );
        Ok(report)
    }
}

/// Re-estimate until the observed split is within tolerance
pub async fn wait_for_traffic_split(
    estimator: &CanaryEstimator<'_>,
    call: &InferenceCall,
    iterations: u32,
    expected: f64,
    tolerance: f64,
    timing: PollTiming,
) -> Result<CanaryReport> {
    Poller::new(
        format!("canary traffic at {}% ± {}", expected, tolerance),
        timing,
        || estimator.estimate(call, iterations),
    )
    .wait(|report| report.within(expected, tolerance))
    .await
}
