//! Convergence poller
//!
//! A deadline-bounded retry state machine for observing eventually-consistent
//! state. Each tick invokes a producer; the caller's predicate decides whether
//! the sample is satisfying. Between ticks the poller sleeps for the interval,
//! clamped to the time left.
//!
//! ```text
//! Polling ──predicate holds──▶ Satisfied
//!    │
//!    └────deadline reached───▶ TimedOut
//! ```
//!
//! Samples can be pulled lazily with [`Poller::next_sample`], or the whole
//! loop driven with [`Poller::until`], which returns a typed [`PollOutcome`].

use crate::error::{Error, ErrorKind, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

/// Wait budget and sleep interval of one poll loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollTiming {
    #[serde(with = "duration_secs")]
    pub budget: Duration,
    #[serde(with = "duration_secs")]
    pub interval: Duration,
}

impl PollTiming {
    pub fn new(budget: Duration, interval: Duration) -> Self {
        Self { budget, interval }
    }

    pub fn from_secs(budget: u64, interval: u64) -> Self {
        Self::new(Duration::from_secs(budget), Duration::from_secs(interval))
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

/// Poller state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Polling,
    Satisfied,
    TimedOut,
}

/// Result of driving a poller to completion
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome<T> {
    Satisfied {
        sample: T,
        ticks: u32,
        elapsed: Duration,
    },
    TimedOut {
        description: String,
        /// Last sample observed, for diagnostics
        last: Option<T>,
        /// Last swallowed producer error
        last_error: Option<String>,
        ticks: u32,
        elapsed: Duration,
    },
}

impl<T> PollOutcome<T> {
    pub fn is_satisfied(&self) -> bool {
        matches!(self, PollOutcome::Satisfied { .. })
    }

    pub fn ticks(&self) -> u32 {
        match self {
            PollOutcome::Satisfied { ticks, .. } | PollOutcome::TimedOut { ticks, .. } => *ticks,
        }
    }

    pub fn elapsed(&self) -> Duration {
        match self {
            PollOutcome::Satisfied { elapsed, .. } | PollOutcome::TimedOut { elapsed, .. } => {
                *elapsed
            }
        }
    }
}

impl<T: fmt::Debug> PollOutcome<T> {
    /// The satisfying sample, or [`Error::TimedOut`] carrying the last one
    pub fn into_result(self) -> Result<T> {
        match self {
            PollOutcome::Satisfied { sample, .. } => Ok(sample),
            PollOutcome::TimedOut {
                description,
                last,
                last_error,
                ticks,
                elapsed,
            } => Err(Error::TimedOut {
                description,
                elapsed,
                ticks,
                last_sample: last.map(|sample| format!("{:?}", sample)).or(last_error),
            }),
        }
    }
}

/// Deadline-bounded poll loop over an async producer
///
/// A finished poller yields no more samples; start over with a new one.
pub struct Poller<F> {
    description: String,
    timing: PollTiming,
    producer: F,
    state: PollState,
    started: Option<Instant>,
    ticks: u32,
    retry_on: Vec<ErrorKind>,
    last_error: Option<String>,
    aborted: bool,
}

impl<F> fmt::Debug for Poller<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Poller")
            .field("description", &self.description)
            .field("timing", &self.timing)
            .field("state", &self.state)
            .field("ticks", &self.ticks)
            .finish()
    }
}

impl<F, Fut, T> Poller<F>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    pub fn new(description: impl Into<String>, timing: PollTiming, producer: F) -> Self {
        Self {
            description: description.into(),
            timing,
            producer,
            state: PollState::Polling,
            started: None,
            ticks: 0,
            retry_on: Vec::new(),
            last_error: None,
            aborted: false,
        }
    }

    /// Treat producer errors of these kinds as unsatisfied samples
    pub fn retry_on(mut self, kinds: &[ErrorKind]) -> Self {
        self.retry_on.extend_from_slice(kinds);
        self
    }

    pub fn state(&self) -> PollState {
        self.state
    }

    pub fn ticks(&self) -> u32 {
        self.ticks
    }

    pub fn elapsed(&self) -> Duration {
        self.started.map(|s| s.elapsed()).unwrap_or_default()
    }

    /// Next sample, or `None` once the poller is finished
    ///
    /// The first call samples immediately. Later calls sleep for the interval
    /// first and end the loop as [`PollState::TimedOut`] once the deadline is
    /// reached. A producer error outside the retry allow-list is returned once
    /// and ends the loop.
    pub async fn next_sample(&mut self) -> Option<Result<T>> {
        loop {
            if self.state != PollState::Polling || self.aborted {
                return None;
            }

            match self.started {
                None => self.started = Some(Instant::now()),
                Some(started) => {
                    let deadline = started + self.timing.budget;
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    sleep(self.timing.interval.min(remaining)).await;
                    if Instant::now() >= deadline {
                        self.state = PollState::TimedOut;
                        warn!(
                            description = %self.description,
                            ticks = self.ticks,
                            "Poll budget exhausted"
                        );
                        return None;
                    }
                }
            }

            self.ticks += 1;
            match (self.producer)().await {
                Ok(sample) => return Some(Ok(sample)),
                Err(e) if self.retry_on.contains(&e.kind()) => {
                    debug!(
                        description = %self.description,
                        tick = self.ticks,
                        error = %e,
                        "Retryable producer error"
                    );
                    self.last_error = Some(e.to_string());
                }
                Err(e) => {
                    self.aborted = true;
                    return Some(Err(e));
                }
            }
        }
    }

    /// Poll until `predicate` holds or the budget runs out
    pub async fn until<P>(mut self, mut predicate: P) -> Result<PollOutcome<T>>
    where
        P: FnMut(&T) -> bool,
    {
        let mut last = None;
        while let Some(sample) = self.next_sample().await {
            let sample = sample?;
            if predicate(&sample) {
                self.state = PollState::Satisfied;
                debug!(
                    description = %self.description,
                    ticks = self.ticks,
                    "Poll satisfied"
                );
                return Ok(PollOutcome::Satisfied {
                    sample,
                    ticks: self.ticks,
                    elapsed: self.elapsed(),
                });
            }
            last = Some(sample);
        }

        Ok(PollOutcome::TimedOut {
            description: self.description.clone(),
            last,
            last_error: self.last_error.take(),
            ticks: self.ticks,
            elapsed: self.elapsed(),
        })
    }
}

impl<F, Fut, T> Poller<F>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    T: fmt::Debug,
{
    /// [`until`](Self::until), with a timeout reported as [`Error::TimedOut`]
    pub async fn wait(self, predicate: impl FnMut(&T) -> bool) -> Result<T> {
        self.until(predicate).await?.into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    /// Producer that is false for the first `k` calls
    fn false_for(k: u32) -> (Arc<AtomicU32>, impl FnMut() -> std::future::Ready<Result<bool>>) {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let producer = move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            std::future::ready(Ok(n >= k))
        };
        (calls, producer)
    }

    #[tokio::test(start_paused = true)]
    async fn test_satisfied_on_tick_k_plus_one() {
        let (_, producer) = false_for(3);
        let timing = PollTiming::from_secs(31, 10);
        let outcome = Poller::new("flag", timing, producer)
            .until(|v| *v)
            .await
            .unwrap();
        assert!(outcome.is_satisfied());
        assert_eq!(outcome.ticks(), 4);
        assert_eq!(outcome.elapsed(), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_when_budget_below_k_intervals() {
        let (calls, producer) = false_for(3);
        let timing = PollTiming::from_secs(25, 10);
        let outcome = Poller::new("flag", timing, producer)
            .until(|v| *v)
            .await
            .unwrap();
        assert!(!outcome.is_satisfied());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(outcome.elapsed(), Duration::from_secs(25));

        let err = outcome.into_result().unwrap_err();
        let Error::TimedOut { last_sample, ticks, .. } = err else {
            panic!("expected timeout");
        };
        assert_eq!(ticks, 3);
        assert_eq!(last_sample.as_deref(), Some("false"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_sample_is_taken_immediately() {
        let (calls, producer) = false_for(0);
        let mut poller = Poller::new("flag", PollTiming::from_secs(0, 10), producer);
        let first = poller.next_sample().await;
        assert!(matches!(first, Some(Ok(true))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        // Zero budget: no second tick
        assert!(poller.next_sample().await.is_none());
        assert_eq!(poller.state(), PollState::TimedOut);
        assert!(poller.next_sample().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_error_propagates() {
        let producer = || async { Err::<bool, _>(Error::config("unknown runtime 'x'")) };
        let result = Poller::new("lookup", PollTiming::from_secs(60, 1), producer)
            .retry_on(&[ErrorKind::Transport])
            .until(|v| *v)
            .await;
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_allow_listed_error_counts_as_unsatisfied() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let producer = move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(Error::Transport(TransportError::Request {
                        target: "http://svc".to_string(),
                        message: "connection refused".to_string(),
                    }))
                } else {
                    Ok(n)
                }
            }
        };
        let sample = Poller::new("route", PollTiming::from_secs(60, 5), producer)
            .retry_on(&[ErrorKind::Transport])
            .wait(|_| true)
            .await
            .unwrap();
        assert_eq!(sample, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_reports_last_error_without_samples() {
        let producer = || async {
            Err::<u32, _>(Error::Transport(TransportError::Exhausted("svc".to_string())))
        };
        let err = Poller::new("route", PollTiming::from_secs(3, 1), producer)
            .retry_on(&[ErrorKind::Transport])
            .wait(|_| true)
            .await
            .unwrap_err();
        let Error::TimedOut { last_sample, .. } = err else {
            panic!("expected timeout");
        };
        assert!(last_sample.unwrap().contains("svc"));
    }

    #[test]
    fn test_timing_deserializes_from_seconds() {
        let timing: PollTiming = serde_json::from_str(r#"{"budget": 600, "interval": 5}"#).unwrap();
        assert_eq!(timing, PollTiming::from_secs(600, 5));
    }
}
