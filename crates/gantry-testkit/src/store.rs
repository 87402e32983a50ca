//! Config store that records writes in memory

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use gantry_core::effects::ConfigStoreEffects;
use gantry_core::errors::Result;
use gantry_core::{AppConfig, PlatformError};
use parking_lot::Mutex;

#[derive(Debug, Default)]
struct StoreState {
    writes: Vec<(PathBuf, AppConfig)>,
    fail_next: Option<PlatformError>,
}

/// In-memory config store
#[derive(Debug, Clone, Default)]
pub struct MemoryConfigStore {
    state: Arc<Mutex<StoreState>>,
}

impl MemoryConfigStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next write with `error`
    pub fn fail_next_write(&self, error: PlatformError) {
        self.state.lock().fail_next = Some(error);
    }

    /// Every write performed, in order
    pub fn writes(&self) -> Vec<(PathBuf, AppConfig)> {
        self.state.lock().writes.clone()
    }
}

#[async_trait]
impl ConfigStoreEffects for MemoryConfigStore {
    async fn write_config(&self, config: &AppConfig, path: &Path) -> Result<()> {
        let mut state = self.state.lock();
        if let Some(error) = state.fail_next.take() {
            return Err(error);
        }
        state.writes.push((path.to_path_buf(), config.clone()));
        Ok(())
    }
}
