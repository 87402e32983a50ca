//! Waiting for a resource to reach a lifecycle state.

use std::time::Duration;

use gantry_core::effects::{ClockEffects, ResourceEffects};
use gantry_core::retry::{poll_until, Backoff, PollError, PollStatus};
use gantry_core::{AppName, PlatformError, ResourceId, ResourceState};

/// Delay before the first retry.
const WAIT_MIN: Duration = Duration::from_millis(500);
/// Ceiling on the delay between retries.
const WAIT_MAX: Duration = Duration::from_secs(2);
/// Growth factor between retries.
const WAIT_FACTOR: f64 = 2.0;
/// Budget handed to each individual remote wait call.
const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(30);

/// Polls the platform until `id` reaches `target`, retrying transient
/// failures with exponential backoff up to `timeout` overall.
///
/// Each attempt is a bounded remote long-poll; an attempt that reports the
/// resource missing or the request malformed fails immediately, anything
/// else is treated as "not yet" and retried.
pub async fn wait_for_resource_state(
    clock: &dyn ClockEffects,
    resources: &dyn ResourceEffects,
    app: &AppName,
    id: &ResourceId,
    target: ResourceState,
    timeout: Duration,
) -> Result<(), PollError<PlatformError>> {
    let what = format!("resource {id} to reach state '{target}'");
    let backoff = Backoff::new(WAIT_MIN, WAIT_MAX, WAIT_FACTOR);
    poll_until(clock, &what, backoff, timeout, move || async move {
        match resources.wait_for_state(app, id, target, ATTEMPT_TIMEOUT).await {
            Ok(()) => Ok(PollStatus::Ready(())),
            Err(err) if err.is_not_found() || err.is_invalid_input() => Err(err),
            Err(err) => Ok(PollStatus::Pending(err.to_string())),
        }
    })
    .await
}
