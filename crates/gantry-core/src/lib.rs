//! Gantry Core - domain types and effect interfaces
//!
//! This crate provides the foundational types shared by the gantry operator
//! tools: identifiers, the application/fleet data model, the app config
//! model persisted to disk, and the pure effect interfaces through which
//! the rest of the workspace talks to the control plane, the per-instance
//! resource API, and the local environment.
//!
//! Nothing in this crate performs I/O. Effect handlers live in
//! `gantry-effects` (real implementations) and `gantry-testkit`
//! (deterministic in-memory implementations).

#![forbid(unsafe_code)]

/// Shared abort flag polled at orchestration checkpoints
pub mod abort;

/// Application configuration model (the file written after migration)
pub mod appconfig;

/// Pure effect interfaces (no implementations)
pub mod effects;

/// Unified error handling for remote and storage operations
pub mod errors;

/// Identifier newtypes for applications, instances, resources, and tokens
pub mod identifiers;

/// Control-plane data model: applications, legacy instances, releases
pub mod platform;

/// Resource-platform data model: specs, created resources, leases
pub mod resource;

/// Bounded retry with exponential backoff and a hard deadline
pub mod retry;

pub use abort::AbortFlag;
pub use appconfig::{
    AppConfig, HealthCheck, MetricsConfig, MountsConfig, ProcessConfig, ServiceConfig,
    StaticMapping,
};
pub use errors::PlatformError;
pub use identifiers::{
    AppName, InstanceId, LeaseToken, LockToken, ProcessGroup, RegionCode, ReleaseId, ResourceId,
    VolumeId,
};
pub use platform::{
    App, AppLock, AutoscalingConfig, ImageDetails, LegacyInstance, LegacyVmSize, PlatformVersion,
    Release, ReleaseSpec,
};
pub use resource::{CreatedResource, GuestSpec, Lease, ResourceMount, ResourceSpec, ResourceState};
pub use retry::{poll_until, Backoff, PollError, PollStatus};
