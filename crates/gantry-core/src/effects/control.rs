//! Control-plane effect interface
//!
//! Covers the legacy scheduler and the application-level control plane:
//! snapshots, locking, platform ownership, group counts, and releases.
//! Mutations made while an application lock is held carry the lock token;
//! the control plane rejects mismatched tokens.

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::appconfig::AppConfig;
use crate::errors::Result;
use crate::identifiers::{AppName, LockToken, ProcessGroup};
use crate::platform::{
    App, AppLock, AutoscalingConfig, ImageDetails, LegacyInstance, LegacyVmSize, PlatformVersion,
    Release, ReleaseSpec,
};

/// Application control plane and legacy scheduler operations
#[async_trait]
pub trait ControlPlaneEffects: Send + Sync {
    /// Fetch the application record
    async fn get_app(&self, app: &AppName) -> Result<App>;

    /// Application definition as the control plane currently knows it
    async fn get_app_config(&self, app: &AppName) -> Result<AppConfig>;

    /// All workload units currently running on the legacy scheduler
    async fn list_legacy_instances(&self, app: &AppName) -> Result<Vec<LegacyInstance>>;

    /// Legacy autoscaling policy, if one is configured
    async fn autoscaling_config(&self, app: &AppName) -> Result<Option<AutoscalingConfig>>;

    /// Image the application currently runs
    async fn current_image(&self, app: &AppName) -> Result<ImageDetails>;

    /// VM sizing preset assigned to the application on the legacy scheduler
    async fn legacy_vm_size(&self, app: &AppName) -> Result<LegacyVmSize>;

    /// Take the exclusive application lock, pausing the deploy pipeline
    async fn lock_app(&self, app: &AppName) -> Result<AppLock>;

    /// Release the application lock
    async fn unlock_app(&self, app: &AppName, token: &LockToken) -> Result<()>;

    /// Reactivate the deploy pipeline after a lock
    ///
    /// Fails with `AlreadyRunning` when the pipeline was never paused.
    async fn resume_app(&self, app: &AppName) -> Result<()>;

    /// Record which scheduler owns the application's workload
    async fn set_platform_version(
        &self,
        app: &AppName,
        version: PlatformVersion,
        token: Option<&LockToken>,
    ) -> Result<()>;

    /// Set the desired instance count per process group on the legacy
    /// scheduler
    async fn set_group_counts(
        &self,
        app: &AppName,
        counts: &BTreeMap<ProcessGroup, u32>,
        token: Option<&LockToken>,
    ) -> Result<()>;

    /// Create a release record
    async fn create_release(
        &self,
        app: &AppName,
        spec: &ReleaseSpec,
        token: Option<&LockToken>,
    ) -> Result<Release>;
}
