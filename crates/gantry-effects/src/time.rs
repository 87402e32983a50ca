//! Real clock handler backed by the system monotonic clock

use std::time::{Duration, Instant};

use async_trait::async_trait;
use gantry_core::effects::ClockEffects;

/// Monotonic system clock
///
/// Readings are measured from the moment the handler was created, which
/// keeps them safe against wall-clock adjustments.
#[derive(Debug, Clone)]
pub struct SystemClock {
    started: Instant,
}

impl SystemClock {
    /// Create a clock anchored at the current instant
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ClockEffects for SystemClock {
    async fn now(&self) -> Duration {
        self.started.elapsed()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
