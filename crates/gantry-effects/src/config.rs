//! Config persistence to a TOML file on the local filesystem

use std::path::Path;

use async_trait::async_trait;
use gantry_core::effects::ConfigStoreEffects;
use gantry_core::errors::Result;
use gantry_core::{AppConfig, PlatformError};

/// Writes the application definition as pretty-printed TOML
#[derive(Debug, Clone, Default)]
pub struct TomlConfigStore;

impl TomlConfigStore {
    /// Create a new store
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ConfigStoreEffects for TomlConfigStore {
    async fn write_config(&self, config: &AppConfig, path: &Path) -> Result<()> {
        let rendered = toml::to_string_pretty(config)
            .map_err(|err| PlatformError::storage(format!("serialize app config: {err}")))?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(path, rendered).await?;
        tracing::info!(path = %path.display(), "wrote app config");
        Ok(())
    }
}
