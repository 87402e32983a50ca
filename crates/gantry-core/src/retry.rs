//! Bounded retry with exponential backoff and a hard deadline
//!
//! [`poll_until`] drives a condition closure until it reports ready, an
//! attempt fails with a real error, or a hard timeout elapses. The deadline
//! is checked against [`ClockEffects::now`] after every attempt, so a poll
//! can overshoot its timeout by at most one backoff interval.

use std::future::Future;
use std::time::Duration;

use rand::Rng;

use crate::effects::time::ClockEffects;

/// Exponential backoff schedule
///
/// Delays grow from `min` by `factor` per attempt and cap at `max`. With
/// jitter enabled each delay is drawn uniformly from `[min, grown]`.
#[derive(Debug, Clone)]
pub struct Backoff {
    min: Duration,
    max: Duration,
    factor: f64,
    jitter: bool,
    attempt: u32,
}

impl Backoff {
    /// Schedule growing from `min` by `factor` per attempt, capped at `max`
    pub fn new(min: Duration, max: Duration, factor: f64) -> Self {
        Self {
            min,
            max,
            factor,
            jitter: false,
            attempt: 0,
        }
    }

    /// Draw each delay uniformly from `[min, grown]` instead of using the
    /// grown value directly
    pub fn with_jitter(mut self) -> Self {
        self.jitter = true;
        self
    }

    /// Start the schedule over from `min`
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Next delay in the schedule
    pub fn next_delay(&mut self) -> Duration {
        let grown = self.min.as_secs_f64() * self.factor.powi(self.attempt as i32);
        let capped = grown.min(self.max.as_secs_f64());
        // Stop counting attempts once the schedule saturates at `max`.
        if grown < self.max.as_secs_f64() {
            self.attempt = self.attempt.saturating_add(1);
        }
        if !self.jitter {
            return Duration::from_secs_f64(capped);
        }
        let low = self.min.as_millis() as u64;
        let high = (capped * 1000.0) as u64;
        if high <= low {
            return self.min;
        }
        Duration::from_millis(rand::thread_rng().gen_range(low..=high))
    }
}

/// Outcome of one poll attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStatus<T> {
    /// The awaited condition holds
    Ready(T),
    /// Not there yet; the string describes what was observed
    Pending(String),
}

/// Why a poll gave up
#[derive(Debug, thiserror::Error)]
pub enum PollError<E: std::error::Error> {
    /// The hard deadline elapsed before the condition held
    #[error("timed out after {elapsed:?} waiting for {what}")]
    Timeout {
        /// What was being waited for
        what: String,
        /// Time spent waiting
        elapsed: Duration,
        /// Last pending observation, if any attempt completed
        last_seen: Option<String>,
    },
    /// An attempt failed outright
    #[error(transparent)]
    Condition(#[from] E),
}

/// Poll `condition` until it reports ready or `hard_timeout` elapses
///
/// Errors from `condition` abort the poll immediately; callers that want
/// an error retried map it to [`PollStatus::Pending`] instead.
pub async fn poll_until<T, E, F, Fut>(
    clock: &dyn ClockEffects,
    what: &str,
    mut backoff: Backoff,
    hard_timeout: Duration,
    mut condition: F,
) -> Result<T, PollError<E>>
where
    E: std::error::Error,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<PollStatus<T>, E>>,
{
    let started = clock.now().await;
    let mut last_seen = None;
    loop {
        match condition().await? {
            PollStatus::Ready(value) => return Ok(value),
            PollStatus::Pending(seen) => {
                tracing::debug!(what, observed = %seen, "condition not met yet");
                last_seen = Some(seen);
            }
        }
        let elapsed = clock.now().await.saturating_sub(started);
        if elapsed >= hard_timeout {
            return Err(PollError::Timeout {
                what: what.to_string(),
                elapsed,
                last_seen,
            });
        }
        clock.sleep(backoff.next_delay()).await;
    }
}
