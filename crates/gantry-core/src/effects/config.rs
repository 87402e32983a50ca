//! Config persistence effect interface

use std::path::Path;

use async_trait::async_trait;

use crate::appconfig::AppConfig;
use crate::errors::Result;

/// Persistence of the application definition to local storage
#[async_trait]
pub trait ConfigStoreEffects: Send + Sync {
    /// Write `config` to `path`, replacing any existing file
    async fn write_config(&self, config: &AppConfig, path: &Path) -> Result<()>;
}
