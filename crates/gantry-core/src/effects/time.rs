//! Clock effect interface
//!
//! All elapsed-time math and sleeping in the workspace goes through this
//! trait so tests can substitute a virtual clock and run hour-long waits
//! instantly.

use std::time::Duration;

use async_trait::async_trait;

/// Clock access for handlers that measure elapsed time or pause
#[async_trait]
pub trait ClockEffects: Send + Sync {
    /// Monotonic reading since an unspecified epoch
    ///
    /// Only differences between two readings are meaningful.
    async fn now(&self) -> Duration;

    /// Pause the current task for `duration`
    async fn sleep(&self, duration: Duration);
}

/// Blanket implementation for Arc<T> where T: ClockEffects
#[async_trait]
impl<T: ClockEffects + ?Sized> ClockEffects for std::sync::Arc<T> {
    async fn now(&self) -> Duration {
        (**self).now().await
    }

    async fn sleep(&self, duration: Duration) {
        (**self).sleep(duration).await;
    }
}
