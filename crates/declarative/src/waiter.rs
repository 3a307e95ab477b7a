//! Polling until a remote operation converges.
//!
//! A [`Waiter`] drives a caller-supplied refresh probe on a timer. Each
//! observed status is classified as pending, target or unexpected; transient
//! probe errors keep the waiter polling, anything else ends it. Cancellation
//! is checked around every poll and interrupts the sleep between polls.

use crate::context::WaitObserver;
use crate::error::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;

/// Status reported by presence probes when the resource exists.
pub const PRESENT: &str = "present";
/// Status reported by presence probes when the resource is gone.
pub const MISSING: &str = "missing";

/// One result of a refresh probe.
#[derive(Debug, Clone, PartialEq)]
pub struct Observed<T> {
    pub value: T,
    pub status: String,
}

impl<T> Observed<T> {
    pub fn new(value: T, status: impl Into<String>) -> Self {
        Self {
            value,
            status: status.into(),
        }
    }
}

impl<T> Observed<Option<T>> {
    /// Map a lookup to [`PRESENT`] or [`MISSING`].
    pub fn presence(value: Option<T>) -> Self {
        let status = if value.is_some() { PRESENT } else { MISSING };
        Self::new(value, status)
    }
}

/// Where a waiter is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitState {
    Polling,
    Converged,
    Failed,
}

/// Parameters of one wait.
pub struct WaiterSpec<'a, F> {
    pub label: String,
    pub pending: Vec<String>,
    pub target: Vec<String>,
    pub refresh: F,
    pub poll_interval: Duration,
    /// Delay before the first poll. Zero polls immediately.
    pub min_timeout: Duration,
    pub timeout: Duration,
    pub observer: Option<&'a dyn WaitObserver>,
}

impl<'a, F> WaiterSpec<'a, F> {
    pub fn new(label: impl Into<String>, pending: &[&str], target: &[&str], refresh: F) -> Self {
        Self {
            label: label.into(),
            pending: pending.iter().map(|s| s.to_string()).collect(),
            target: target.iter().map(|s| s.to_string()).collect(),
            refresh,
            poll_interval: Duration::from_secs(10),
            min_timeout: Duration::ZERO,
            timeout: Duration::from_secs(20 * 60),
            observer: None,
        }
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn min_timeout(mut self, delay: Duration) -> Self {
        self.min_timeout = delay;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn observer(mut self, observer: &'a dyn WaitObserver) -> Self {
        self.observer = Some(observer);
        self
    }
}

/// A single-use polling state machine.
pub struct Waiter<'a, F> {
    spec: WaiterSpec<'a, F>,
    state: WaitState,
    polls: u32,
    last_status: Option<String>,
}

impl<'a, F, Fut, T> Waiter<'a, F>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Observed<T>>>,
{
    pub fn new(spec: WaiterSpec<'a, F>) -> Self {
        Self {
            spec,
            state: WaitState::Polling,
            polls: 0,
            last_status: None,
        }
    }

    pub fn state(&self) -> WaitState {
        self.state
    }

    /// Number of refresh calls made so far.
    pub fn polls(&self) -> u32 {
        self.polls
    }

    pub fn last_status(&self) -> Option<&str> {
        self.last_status.as_deref()
    }

    fn describe_target(&self) -> String {
        format!("{} to reach {}", self.spec.label, self.spec.target.join(" or "))
    }

    fn finish(&mut self, state: WaitState) {
        self.state = state;
        if let Some(observer) = self.spec.observer {
            observer.on_wait_complete(&self.spec.label, state);
        }
    }

    fn cancelled(&mut self) -> Error {
        self.finish(WaitState::Failed);
        log::debug!("{}: wait cancelled after {} polls", self.spec.label, self.polls);
        Error::WaitCancelled {
            target: self.describe_target(),
            last_status: self.last_status.clone(),
        }
    }

    fn timed_out(&mut self) -> Error {
        self.finish(WaitState::Failed);
        Error::WaitTimeout {
            target: self.describe_target(),
            timeout: self.spec.timeout,
            last_status: self.last_status.clone(),
        }
    }

    /// Sleep until `when`, returning early with an error on cancellation.
    async fn pause_until(&mut self, when: Instant, cancel: &CancellationToken) -> Result<()> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(self.cancelled()),
            _ = sleep_until(when) => Ok(()),
        }
    }

    /// Poll until a target status is observed.
    ///
    /// Returns the converging observation. Fails with `WaitTimeout` once
    /// the deadline passes, `WaitCancelled` when `cancel` fires,
    /// `UnexpectedStatus` on a status outside both sets, or the probe's own
    /// error when it is not transient.
    pub async fn wait(&mut self, cancel: &CancellationToken) -> Result<Observed<T>> {
        let start = Instant::now();
        let deadline = start + self.spec.timeout;
        if let Some(observer) = self.spec.observer {
            observer.on_wait_start(&self.spec.label, &self.spec.target);
        }
        log::debug!(
            "{}: waiting up to {:?} for {:?} (pending {:?})",
            self.spec.label,
            self.spec.timeout,
            self.spec.target,
            self.spec.pending
        );

        if !self.spec.min_timeout.is_zero() {
            self.pause_until((start + self.spec.min_timeout).min(deadline), cancel)
                .await?;
        }

        loop {
            if cancel.is_cancelled() {
                return Err(self.cancelled());
            }

            self.polls += 1;
            let probe = (self.spec.refresh)();
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(self.cancelled()),
                _ = sleep_until(deadline) => {
                    log::warn!("{}: probe still running at the deadline", self.spec.label);
                    return Err(self.timed_out());
                }
                outcome = probe => outcome,
            };

            match outcome {
                Ok(observed) => {
                    self.last_status = Some(observed.status.clone());
                    if let Some(observer) = self.spec.observer {
                        observer.on_poll(
                            &self.spec.label,
                            self.polls,
                            Some(&observed.status),
                            start.elapsed(),
                        );
                    }
                    if self.spec.target.contains(&observed.status) {
                        log::debug!(
                            "{}: reached {} after {} polls",
                            self.spec.label,
                            observed.status,
                            self.polls
                        );
                        self.finish(WaitState::Converged);
                        return Ok(observed);
                    }
                    if !self.spec.pending.contains(&observed.status) {
                        self.finish(WaitState::Failed);
                        return Err(Error::UnexpectedStatus {
                            status: observed.status,
                            target: self.describe_target(),
                        });
                    }
                    log::trace!("{}: still {}", self.spec.label, observed.status);
                }
                Err(err) if err.is_retryable() => {
                    log::warn!("{}: transient error while polling: {err}", self.spec.label);
                    if let Some(observer) = self.spec.observer {
                        observer.on_poll(&self.spec.label, self.polls, None, start.elapsed());
                    }
                }
                Err(err) => {
                    self.finish(WaitState::Failed);
                    return Err(err);
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(self.timed_out());
            }
            self.pause_until((now + self.spec.poll_interval).min(deadline), cancel)
                .await?;
        }
    }
}
