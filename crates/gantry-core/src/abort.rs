//! Cooperative cancellation flag
//!
//! Set once from a signal handler or test hook, polled by the
//! orchestration loop between steps. Never reset.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared one-way abort switch
#[derive(Debug, Clone, Default)]
pub struct AbortFlag {
    requested: Arc<AtomicBool>,
}

impl AbortFlag {
    /// Create an unset flag
    pub fn new() -> Self {
        Self::default()
    }

    /// Request an abort; idempotent
    pub fn request(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    /// True once any holder of this flag has requested an abort
    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}
