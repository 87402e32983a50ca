//! Deployment effect interface

use async_trait::async_trait;

use crate::appconfig::AppConfig;
use crate::errors::Result;
use crate::identifiers::AppName;

/// The cutover rollout onto resources created ahead of time
#[async_trait]
pub trait DeployEffects: Send + Sync {
    /// Roll `config` at `image` out across the application's resources
    async fn deploy(&self, app: &AppName, config: &AppConfig, image: &str) -> Result<()>;
}
