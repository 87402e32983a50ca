//! Virtual clock for deterministic timing tests
//!
//! Time only moves when a task sleeps on the clock, so an hour-long
//! drain wait runs instantly and every sleep interval can be asserted
//! afterwards.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use gantry_core::effects::ClockEffects;
use parking_lot::Mutex;

#[derive(Debug, Default)]
struct ClockState {
    now: Duration,
    sleeps: Vec<Duration>,
}

/// Clock whose time advances by exactly the slept amount
#[derive(Debug, Clone, Default)]
pub struct VirtualClock {
    state: Arc<Mutex<ClockState>>,
}

impl VirtualClock {
    /// Create a clock at time zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Total virtual time elapsed so far
    pub fn elapsed(&self) -> Duration {
        self.state.lock().now
    }

    /// Every sleep requested, in call order
    pub fn recorded_sleeps(&self) -> Vec<Duration> {
        self.state.lock().sleeps.clone()
    }
}

#[async_trait]
impl ClockEffects for VirtualClock {
    async fn now(&self) -> Duration {
        self.state.lock().now
    }

    async fn sleep(&self, duration: Duration) {
        {
            let mut state = self.state.lock();
            state.now += duration;
            state.sleeps.push(duration);
        }
        // Give concurrent tasks a chance to run between virtual ticks.
        tokio::task::yield_now().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sleeping_advances_time_by_the_requested_amount() {
        let clock = VirtualClock::new();
        clock.sleep(Duration::from_secs(300)).await;
        clock.sleep(Duration::from_millis(500)).await;
        assert_eq!(clock.elapsed(), Duration::from_millis(300_500));
        assert_eq!(
            clock.recorded_sleeps(),
            vec![Duration::from_secs(300), Duration::from_millis(500)]
        );
    }
}
