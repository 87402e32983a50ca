//! Resource-platform entities: specs, created resources, leases

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::appconfig::{HealthCheck, MetricsConfig, ServiceConfig, StaticMapping};
use crate::errors::PlatformError;
use crate::identifiers::{AppName, LeaseToken, RegionCode, ResourceId, VolumeId};

/// Metadata keys stamped onto every resource created by a migration
pub mod metadata {
    /// Key marking which platform generation owns the resource
    pub const PLATFORM_VERSION: &str = "gantry_platform_version";
    /// Value stored under [`PLATFORM_VERSION`] for resource-platform resources
    pub const PLATFORM_VERSION_VALUE: &str = "v2";
    /// Key carrying the release id the resource was created from
    pub const RELEASE_ID: &str = "gantry_release_id";
    /// Key carrying the release version the resource was created from
    pub const RELEASE_VERSION: &str = "gantry_release_version";
    /// Key carrying the process group the resource serves
    pub const PROCESS_GROUP: &str = "gantry_process_group";
}

/// Lifecycle state of a resource as reported by the resource API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceState {
    /// Allocated but not yet running
    Created,
    /// Running
    Started,
    /// Stopped but still allocated
    Stopped,
    /// Deallocated
    Destroyed,
}

impl ResourceState {
    /// Wire representation used by the resource API
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Started => "started",
            Self::Stopped => "stopped",
            Self::Destroyed => "destroyed",
        }
    }
}

impl std::fmt::Display for ResourceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// CPU and memory allotment for a resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestSpec {
    /// CPU class, `shared` or `performance`
    pub cpu_kind: String,
    /// Number of CPUs
    pub cpus: u32,
    /// Memory in MiB
    pub memory_mb: u32,
}

impl GuestSpec {
    /// Resolve a sizing preset name such as `shared-cpu-1x` or
    /// `performance-2x` into a concrete guest
    ///
    /// Memory defaults to 256 MiB per shared CPU and 2048 MiB per
    /// performance CPU; callers that know the previous allotment override
    /// `memory_mb` afterwards.
    pub fn from_preset(name: &str) -> Result<Self, PlatformError> {
        let unknown = || PlatformError::invalid_input(format!("unknown guest preset: {name}"));
        let rest = name.strip_suffix('x').ok_or_else(unknown)?;
        let (kind, count) = rest.rsplit_once('-').ok_or_else(unknown)?;
        let cpus: u32 = count.parse().map_err(|_| unknown())?;
        if cpus == 0 {
            return Err(unknown());
        }
        let (cpu_kind, memory_per_cpu) = match kind {
            "shared-cpu" => ("shared", 256),
            "performance" => ("performance", 2048),
            _ => return Err(unknown()),
        };
        Ok(Self {
            cpu_kind: cpu_kind.to_string(),
            cpus,
            memory_mb: cpus * memory_per_cpu,
        })
    }
}

/// A volume attachment on a resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceMount {
    /// Volume to attach
    pub volume: VolumeId,
    /// Mount path inside the resource
    pub path: String,
}

/// Everything needed to create one resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceSpec {
    /// Application the resource belongs to
    pub app: AppName,
    /// Region to place the resource in
    pub region: RegionCode,
    /// CPU and memory allotment
    pub guest: GuestSpec,
    /// Full image reference to run
    pub image: String,
    /// Environment variables
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Resource metadata, see [`metadata`] for the well-known keys
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    /// Network services the resource exposes
    #[serde(default)]
    pub services: Vec<ServiceConfig>,
    /// Health checks to run against the resource
    #[serde(default)]
    pub checks: Vec<HealthCheck>,
    /// Volume attachments
    #[serde(default)]
    pub mounts: Vec<ResourceMount>,
    /// Static asset mappings served without hitting the workload
    #[serde(default)]
    pub statics: Vec<StaticMapping>,
    /// Metrics endpoint the application declares, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<MetricsConfig>,
    /// Command override for the process group, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub init_cmd: Option<Vec<String>>,
}

/// A resource that exists on the resource platform
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedResource {
    /// Resource identifier
    pub id: ResourceId,
    /// Region the resource was placed in
    pub region: RegionCode,
    /// Last observed lifecycle state
    pub state: ResourceState,
}

/// An exclusive hold on a single resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lease {
    /// Token to present when mutating or releasing the resource
    pub token: LeaseToken,
    /// Expiry as milliseconds since the epoch
    pub expires_at_ms: u64,
}
