//! Control-plane entities: applications, locks, releases, legacy instances

use serde::{Deserialize, Serialize};

use crate::appconfig::AppConfig;
use crate::identifiers::{InstanceId, LockToken, ProcessGroup, RegionCode, ReleaseId, VolumeId};

/// Which scheduler owns the application's workload
///
/// The marker is stored on the control plane and gates which deploy path
/// the platform takes. `Detached` is the transitional value: the old
/// scheduler stops managing the workload, the new one has not taken over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformVersion {
    /// Workload is owned by the legacy scheduler
    Legacy,
    /// Neither scheduler owns the workload
    Detached,
    /// Workload is owned by the resource platform
    Resources,
}

impl PlatformVersion {
    /// Wire representation stored on the control plane
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Legacy => "legacy",
            Self::Detached => "detached",
            Self::Resources => "resources",
        }
    }
}

impl std::fmt::Display for PlatformVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An application as reported by the control plane
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct App {
    /// Application name, unique per organization
    pub name: crate::identifiers::AppName,
    /// Owning organization slug
    pub organization: String,
    /// Which scheduler currently owns the workload
    pub platform_version: PlatformVersion,
}

/// A single unit of workload running on the legacy scheduler
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegacyInstance {
    /// Instance identifier
    pub id: InstanceId,
    /// Region the instance runs in
    pub region: RegionCode,
    /// Process group the instance belongs to
    pub process_group: ProcessGroup,
    /// Volumes attached to this instance, if any
    #[serde(default)]
    pub attached_volumes: Vec<VolumeId>,
}

/// Legacy autoscaling policy for an application
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoscalingConfig {
    /// Whether the legacy scheduler adjusts counts on its own
    pub enabled: bool,
    /// Lower bound on instance count
    pub min_count: u32,
    /// Upper bound on instance count
    pub max_count: u32,
}

/// The container image the application currently runs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageDetails {
    /// Registry host
    pub registry: String,
    /// Repository path within the registry
    pub repository: String,
    /// Image tag
    pub tag: String,
}

impl ImageDetails {
    /// Full image reference in `registry/repository:tag` form
    pub fn reference(&self) -> String {
        format!("{}/{}:{}", self.registry, self.repository, self.tag)
    }
}

/// VM sizing preset assigned to a process group on the legacy scheduler
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegacyVmSize {
    /// Preset name, e.g. `shared-cpu-1x` or `dedicated-cpu-2x`
    pub name: String,
    /// Memory allotted to each instance, in MiB
    pub memory_mb: u32,
}

/// Proof of an exclusive hold on an application
///
/// The token must accompany every mutation made while the hold is active;
/// the control plane rejects mismatched tokens with
/// [`PlatformError::LockRejected`](crate::errors::PlatformError::LockRejected).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppLock {
    /// Token to present on subsequent mutations
    pub token: LockToken,
    /// Expiry as milliseconds since the epoch
    pub expires_at_ms: u64,
}

/// A deployment record on the control plane
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Release {
    /// Release identifier
    pub id: ReleaseId,
    /// Monotonically increasing release version
    pub version: u32,
}

/// Parameters for creating a new release
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseSpec {
    /// Scheduler ownership the release is created under
    pub platform_version: PlatformVersion,
    /// Deployment strategy label
    pub strategy: String,
    /// Full image reference the release pins
    pub image: String,
    /// Application definition snapshot attached to the release
    pub definition: AppConfig,
}
