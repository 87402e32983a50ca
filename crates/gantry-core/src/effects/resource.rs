//! Resource-platform effect interface
//!
//! The per-resource API: create, inspect, destroy, and the lease
//! operations that fence concurrent mutation of a single resource.

use std::time::Duration;

use async_trait::async_trait;

use crate::errors::Result;
use crate::identifiers::{AppName, LeaseToken, ResourceId};
use crate::resource::{CreatedResource, Lease, ResourceSpec, ResourceState};

/// Operations against individual resources on the resource platform
#[async_trait]
pub trait ResourceEffects: Send + Sync {
    /// Create one resource from a spec
    async fn create_resource(&self, spec: &ResourceSpec) -> Result<CreatedResource>;

    /// Block until the resource reaches `target`, up to `timeout`
    ///
    /// One bounded attempt against the remote wait endpoint. Transient
    /// failures are expected; callers retry through
    /// [`poll_until`](crate::retry::poll_until).
    async fn wait_for_state(
        &self,
        app: &AppName,
        id: &ResourceId,
        target: ResourceState,
        timeout: Duration,
    ) -> Result<()>;

    /// Take an exclusive lease on a resource for `ttl`
    async fn acquire_lease(&self, app: &AppName, id: &ResourceId, ttl: Duration) -> Result<Lease>;

    /// Extend a held lease by another `ttl`
    async fn renew_lease(
        &self,
        app: &AppName,
        id: &ResourceId,
        token: &LeaseToken,
        ttl: Duration,
    ) -> Result<Lease>;

    /// Release a held lease
    async fn release_lease(&self, app: &AppName, id: &ResourceId, token: &LeaseToken)
        -> Result<()>;

    /// Destroy a resource; `force` tears it down even while running
    async fn destroy_resource(&self, app: &AppName, id: &ResourceId, force: bool) -> Result<()>;
}
