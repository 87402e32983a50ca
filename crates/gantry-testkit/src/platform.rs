//! In-memory implementation of the platform effect interfaces
//!
//! [`TestPlatform`] plays both control-plane generations at once: it holds
//! a legacy fleet, accepts locks, releases, resource creation, leases, and
//! the cutover deploy, and records every call in an ordered operation log.
//! Failures can be injected on the k-th occurrence of any operation, and
//! an [`AbortFlag`] can be tripped mid-migration the same way.
//!
//! Uses blocking `parking_lot` locks; no handler holds a guard across an
//! await point.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use gantry_core::effects::{ControlPlaneEffects, DeployEffects, ResourceEffects};
use gantry_core::errors::Result;
use gantry_core::platform::{
    App, AppLock, AutoscalingConfig, ImageDetails, LegacyInstance, LegacyVmSize, PlatformVersion,
    Release, ReleaseSpec,
};
use gantry_core::resource::{CreatedResource, Lease, ResourceSpec, ResourceState};
use gantry_core::{
    AbortFlag, AppConfig, AppName, LeaseToken, LockToken, PlatformError, ProcessGroup, ReleaseId,
    ResourceId,
};
use parking_lot::Mutex;

use crate::fixtures;

/// Base for the wall-clock expiry values handed out with locks and leases
const EXPIRY_EPOCH_MS: u64 = 1_700_000_000_000;

/// One recorded effect call
#[derive(Debug, Clone)]
pub struct RecordedOp {
    /// Operation name, e.g. `create_resource`
    pub name: &'static str,
    /// Operation-specific detail, e.g. the resource id or marker value
    pub detail: String,
    /// Whether the operation mutates remote state
    pub mutating: bool,
}

#[derive(Debug, Clone)]
struct FailurePlan {
    attempt: u32,
    error: PlatformError,
    seen: u32,
}

#[derive(Debug, Clone)]
struct AbortHook {
    op: String,
    attempt: u32,
    seen: u32,
    flag: AbortFlag,
}

#[derive(Debug)]
struct ResourceRecord {
    resource: CreatedResource,
    spec: ResourceSpec,
    lease: Option<Lease>,
    polls_until_started: u32,
    renewals: u32,
}

#[derive(Debug)]
struct PlatformState {
    app: App,
    remote_config: AppConfig,
    instances: Vec<LegacyInstance>,
    original_instances: Vec<LegacyInstance>,
    autoscaling: Option<AutoscalingConfig>,
    image: ImageDetails,
    vm_size: LegacyVmSize,
    group_counts: BTreeMap<ProcessGroup, u32>,
    lock: Option<LockToken>,
    pipeline_paused: bool,
    resources: BTreeMap<ResourceId, ResourceRecord>,
    releases: Vec<(Release, ReleaseSpec)>,
    next_release_version: u32,
    drain_polls: u32,
    drain_polls_remaining: Option<u32>,
    start_polls: u32,
    counter: u32,
    ops: Vec<RecordedOp>,
    failures: HashMap<&'static str, FailurePlan>,
    abort_hooks: Vec<AbortHook>,
}

/// Scripted two-generation platform for tests
#[derive(Debug, Clone)]
pub struct TestPlatform {
    state: Arc<Mutex<PlatformState>>,
}

impl TestPlatform {
    /// Platform hosting `name` with the given per-group legacy instance
    /// counts
    ///
    /// The app starts on the legacy platform, unlocked, autoscaling off,
    /// with a matching remote config, a `shared-cpu-1x` sizing preset, and
    /// instant drain and resource start.
    pub fn with_fleet(name: &str, groups: &[(&str, u32)]) -> Self {
        let instances = fixtures::fleet(groups);
        let group_names: Vec<&str> = groups.iter().map(|(group, _)| *group).collect();
        let mut group_counts = BTreeMap::new();
        for (group, count) in groups {
            group_counts.insert(ProcessGroup::from(*group), *count);
        }
        Self {
            state: Arc::new(Mutex::new(PlatformState {
                app: App {
                    name: AppName::from(name),
                    organization: "acme".into(),
                    platform_version: PlatformVersion::Legacy,
                },
                remote_config: fixtures::app_config(name, &group_names),
                original_instances: instances.clone(),
                instances,
                autoscaling: None,
                image: fixtures::image(),
                vm_size: fixtures::vm_size("shared-cpu-1x", 256),
                group_counts,
                lock: None,
                pipeline_paused: false,
                resources: BTreeMap::new(),
                releases: Vec::new(),
                next_release_version: 1,
                drain_polls: 0,
                drain_polls_remaining: None,
                start_polls: 0,
                counter: 0,
                ops: Vec::new(),
                failures: HashMap::new(),
                abort_hooks: Vec::new(),
            })),
        }
    }

    /// Fail the `attempt`-th call (1-based) of `op` with `error`
    pub fn fail_nth(&self, op: &'static str, attempt: u32, error: PlatformError) {
        self.state.lock().failures.insert(
            op,
            FailurePlan {
                attempt,
                error,
                seen: 0,
            },
        );
    }

    /// Request an abort on `flag` during the `attempt`-th call of `op`
    pub fn abort_during(&self, op: &str, attempt: u32, flag: AbortFlag) {
        self.state.lock().abort_hooks.push(AbortHook {
            op: op.to_string(),
            attempt,
            seen: 0,
            flag,
        });
    }

    /// Number of `list_legacy_instances` calls after a scale-to-zero that
    /// still see the old fleet before it reads as drained
    pub fn set_drain_polls(&self, polls: u32) {
        self.state.lock().drain_polls = polls;
    }

    /// Number of failed `wait_for_state` attempts before a new resource
    /// reports started
    pub fn set_start_polls(&self, polls: u32) {
        self.state.lock().start_polls = polls;
    }

    /// Replace the legacy sizing preset
    pub fn set_vm_size(&self, size: LegacyVmSize) {
        self.state.lock().vm_size = size;
    }

    /// Install or clear a legacy autoscaling policy
    pub fn set_autoscaling(&self, autoscaling: Option<AutoscalingConfig>) {
        self.state.lock().autoscaling = autoscaling;
    }

    /// Overwrite the platform ownership marker directly
    pub fn seed_platform_version(&self, version: PlatformVersion) {
        self.state.lock().app.platform_version = version;
    }

    /// Replace the config the control plane reports
    pub fn set_remote_config(&self, config: AppConfig) {
        self.state.lock().remote_config = config;
    }

    /// Attach a volume to an existing legacy instance
    pub fn attach_volume(&self, instance: &str, volume: &str) {
        let mut state = self.state.lock();
        for candidate in &mut state.instances {
            if candidate.id.as_str() == instance {
                candidate.attached_volumes.push(volume.into());
            }
        }
    }

    /// Every recorded call, in order
    pub fn ops(&self) -> Vec<RecordedOp> {
        self.state.lock().ops.clone()
    }

    /// Names of all mutating calls, in order
    pub fn mutating_op_names(&self) -> Vec<&'static str> {
        self.state
            .lock()
            .ops
            .iter()
            .filter(|op| op.mutating)
            .map(|op| op.name)
            .collect()
    }

    /// How many times `name` was called
    pub fn count_op(&self, name: &str) -> usize {
        self.state
            .lock()
            .ops
            .iter()
            .filter(|op| op.name == name)
            .count()
    }

    /// How many mutating calls have been made
    pub fn mutating_op_count(&self) -> usize {
        self.state.lock().ops.iter().filter(|op| op.mutating).count()
    }

    /// Resources that currently exist
    pub fn live_resources(&self) -> Vec<CreatedResource> {
        self.state
            .lock()
            .resources
            .values()
            .map(|record| record.resource.clone())
            .collect()
    }

    /// Specs of every resource created so far, in id order
    pub fn resource_specs(&self) -> Vec<ResourceSpec> {
        self.state
            .lock()
            .resources
            .values()
            .map(|record| record.spec.clone())
            .collect()
    }

    /// Current platform ownership marker
    pub fn current_platform_version(&self) -> PlatformVersion {
        self.state.lock().app.platform_version
    }

    /// Whether the application lock is held
    pub fn is_locked(&self) -> bool {
        self.state.lock().lock.is_some()
    }

    /// Whether the deploy pipeline is accepting work
    pub fn is_pipeline_active(&self) -> bool {
        !self.state.lock().pipeline_paused
    }

    /// Current legacy per-group counts
    pub fn group_counts(&self) -> BTreeMap<ProcessGroup, u32> {
        self.state.lock().group_counts.clone()
    }

    /// Legacy instances currently running
    pub fn legacy_instance_count(&self) -> usize {
        self.state.lock().instances.len()
    }

    /// Total lease renewals across all resources
    pub fn total_lease_renewals(&self) -> u32 {
        self.state
            .lock()
            .resources
            .values()
            .map(|record| record.renewals)
            .sum()
    }

    /// Leases currently held against resources
    pub fn held_lease_count(&self) -> usize {
        self.state
            .lock()
            .resources
            .values()
            .filter(|record| record.lease.is_some())
            .count()
    }

    /// Releases registered so far
    pub fn release_count(&self) -> usize {
        self.state.lock().releases.len()
    }

    fn begin_op(
        state: &mut PlatformState,
        name: &'static str,
        detail: String,
        mutating: bool,
    ) -> Result<()> {
        state.ops.push(RecordedOp {
            name,
            detail,
            mutating,
        });
        for hook in &mut state.abort_hooks {
            if hook.op == name {
                hook.seen += 1;
                if hook.seen == hook.attempt {
                    hook.flag.request();
                }
            }
        }
        if let Some(plan) = state.failures.get_mut(name) {
            plan.seen += 1;
            if plan.seen == plan.attempt {
                return Err(plan.error.clone());
            }
        }
        Ok(())
    }

    fn ensure_app(state: &PlatformState, app: &AppName) -> Result<()> {
        if state.app.name != *app {
            return Err(PlatformError::not_found(format!("unknown app {app}")));
        }
        Ok(())
    }

    fn check_token(state: &PlatformState, token: Option<&LockToken>) -> Result<()> {
        match (&state.lock, token) {
            (Some(held), Some(given)) if held == given => Ok(()),
            (Some(_), Some(_)) => Err(PlatformError::lock_rejected(
                "token does not match the held application lock",
            )),
            (Some(_), None) => Err(PlatformError::lock_rejected(
                "application is locked; mutation requires the lock token",
            )),
            (None, Some(_)) => Err(PlatformError::lock_rejected(
                "no application lock is held but a token was supplied",
            )),
            (None, None) => Ok(()),
        }
    }

    fn render_counts(counts: &BTreeMap<ProcessGroup, u32>) -> String {
        counts
            .iter()
            .map(|(group, count)| format!("{group}={count}"))
            .collect::<Vec<_>>()
            .join(",")
    }
}

#[async_trait]
impl ControlPlaneEffects for TestPlatform {
    async fn get_app(&self, app: &AppName) -> Result<App> {
        let mut state = self.state.lock();
        Self::begin_op(&mut state, "get_app", app.to_string(), false)?;
        Self::ensure_app(&state, app)?;
        Ok(state.app.clone())
    }

    async fn get_app_config(&self, app: &AppName) -> Result<AppConfig> {
        let mut state = self.state.lock();
        Self::begin_op(&mut state, "get_app_config", app.to_string(), false)?;
        Self::ensure_app(&state, app)?;
        Ok(state.remote_config.clone())
    }

    async fn list_legacy_instances(&self, app: &AppName) -> Result<Vec<LegacyInstance>> {
        let mut state = self.state.lock();
        Self::begin_op(&mut state, "list_legacy_instances", app.to_string(), false)?;
        Self::ensure_app(&state, app)?;
        if let Some(remaining) = state.drain_polls_remaining {
            if remaining == 0 {
                state.instances.clear();
                state.drain_polls_remaining = None;
            } else {
                state.drain_polls_remaining = Some(remaining - 1);
            }
        }
        Ok(state.instances.clone())
    }

    async fn autoscaling_config(&self, app: &AppName) -> Result<Option<AutoscalingConfig>> {
        let mut state = self.state.lock();
        Self::begin_op(&mut state, "autoscaling_config", app.to_string(), false)?;
        Self::ensure_app(&state, app)?;
        Ok(state.autoscaling.clone())
    }

    async fn current_image(&self, app: &AppName) -> Result<ImageDetails> {
        let mut state = self.state.lock();
        Self::begin_op(&mut state, "current_image", app.to_string(), false)?;
        Self::ensure_app(&state, app)?;
        Ok(state.image.clone())
    }

    async fn legacy_vm_size(&self, app: &AppName) -> Result<LegacyVmSize> {
        let mut state = self.state.lock();
        Self::begin_op(&mut state, "legacy_vm_size", app.to_string(), false)?;
        Self::ensure_app(&state, app)?;
        Ok(state.vm_size.clone())
    }

    async fn lock_app(&self, app: &AppName) -> Result<AppLock> {
        let mut state = self.state.lock();
        Self::begin_op(&mut state, "lock_app", app.to_string(), true)?;
        Self::ensure_app(&state, app)?;
        if state.lock.is_some() {
            return Err(PlatformError::lock_rejected(
                "application is already locked",
            ));
        }
        let token = LockToken::new(uuid::Uuid::new_v4().to_string());
        state.lock = Some(token.clone());
        state.pipeline_paused = true;
        Ok(AppLock {
            token,
            expires_at_ms: EXPIRY_EPOCH_MS + 3_600_000,
        })
    }

    async fn unlock_app(&self, app: &AppName, token: &LockToken) -> Result<()> {
        let mut state = self.state.lock();
        Self::begin_op(&mut state, "unlock_app", app.to_string(), true)?;
        Self::ensure_app(&state, app)?;
        match &state.lock {
            None => Err(PlatformError::not_found("no application lock is held")),
            Some(held) if held != token => Err(PlatformError::lock_rejected(
                "token does not match the held application lock",
            )),
            Some(_) => {
                state.lock = None;
                state.pipeline_paused = false;
                Ok(())
            }
        }
    }

    async fn resume_app(&self, app: &AppName) -> Result<()> {
        let mut state = self.state.lock();
        Self::begin_op(&mut state, "resume_app", app.to_string(), true)?;
        Self::ensure_app(&state, app)?;
        if !state.pipeline_paused {
            return Err(PlatformError::already_running(
                "deploy pipeline is already active",
            ));
        }
        state.pipeline_paused = false;
        Ok(())
    }

    async fn set_platform_version(
        &self,
        app: &AppName,
        version: PlatformVersion,
        token: Option<&LockToken>,
    ) -> Result<()> {
        let mut state = self.state.lock();
        Self::begin_op(
            &mut state,
            "set_platform_version",
            version.as_str().to_string(),
            true,
        )?;
        Self::ensure_app(&state, app)?;
        Self::check_token(&state, token)?;
        state.app.platform_version = version;
        Ok(())
    }

    async fn set_group_counts(
        &self,
        app: &AppName,
        counts: &BTreeMap<ProcessGroup, u32>,
        token: Option<&LockToken>,
    ) -> Result<()> {
        let mut state = self.state.lock();
        Self::begin_op(
            &mut state,
            "set_group_counts",
            Self::render_counts(counts),
            true,
        )?;
        Self::ensure_app(&state, app)?;
        Self::check_token(&state, token)?;
        state.group_counts = counts.clone();
        if counts.values().all(|count| *count == 0) {
            state.drain_polls_remaining = Some(state.drain_polls);
        } else {
            // Restoring counts relaunches the snapshot fleet.
            state.instances = state.original_instances.clone();
            state.drain_polls_remaining = None;
        }
        Ok(())
    }

    async fn create_release(
        &self,
        app: &AppName,
        spec: &ReleaseSpec,
        token: Option<&LockToken>,
    ) -> Result<Release> {
        let mut state = self.state.lock();
        Self::begin_op(
            &mut state,
            "create_release",
            spec.platform_version.to_string(),
            true,
        )?;
        Self::ensure_app(&state, app)?;
        Self::check_token(&state, token)?;
        state.counter += 1;
        let release = Release {
            id: ReleaseId::new(format!("rel-{:04}", state.counter)),
            version: state.next_release_version,
        };
        state.next_release_version += 1;
        state.releases.push((release.clone(), spec.clone()));
        Ok(release)
    }
}

#[async_trait]
impl ResourceEffects for TestPlatform {
    async fn create_resource(&self, spec: &ResourceSpec) -> Result<CreatedResource> {
        let mut state = self.state.lock();
        let group = spec
            .metadata
            .get(gantry_core::resource::metadata::PROCESS_GROUP)
            .cloned()
            .unwrap_or_default();
        Self::begin_op(&mut state, "create_resource", group, true)?;
        Self::ensure_app(&state, &spec.app)?;
        state.counter += 1;
        let resource = CreatedResource {
            id: ResourceId::new(format!("res-{:04}", state.counter)),
            region: spec.region.clone(),
            state: ResourceState::Created,
        };
        let polls = state.start_polls;
        state.resources.insert(
            resource.id.clone(),
            ResourceRecord {
                resource: resource.clone(),
                spec: spec.clone(),
                lease: None,
                polls_until_started: polls,
                renewals: 0,
            },
        );
        Ok(resource)
    }

    async fn wait_for_state(
        &self,
        app: &AppName,
        id: &ResourceId,
        target: ResourceState,
        timeout: Duration,
    ) -> Result<()> {
        let mut state = self.state.lock();
        Self::begin_op(&mut state, "wait_for_state", id.to_string(), false)?;
        Self::ensure_app(&state, app)?;
        let record = state
            .resources
            .get_mut(id)
            .ok_or_else(|| PlatformError::not_found(format!("resource {id} not found")))?;
        if record.polls_until_started > 0 {
            record.polls_until_started -= 1;
            return Err(PlatformError::api(format!(
                "resource {id} still {} after {timeout:?}",
                record.resource.state
            )));
        }
        if record.resource.state == ResourceState::Created {
            record.resource.state = ResourceState::Started;
        }
        if record.resource.state == target {
            Ok(())
        } else {
            Err(PlatformError::api(format!(
                "resource {id} is {}, not {target}",
                record.resource.state
            )))
        }
    }

    async fn acquire_lease(&self, app: &AppName, id: &ResourceId, ttl: Duration) -> Result<Lease> {
        let mut state = self.state.lock();
        Self::begin_op(&mut state, "acquire_lease", id.to_string(), true)?;
        Self::ensure_app(&state, app)?;
        let record = state
            .resources
            .get_mut(id)
            .ok_or_else(|| PlatformError::not_found(format!("resource {id} not found")))?;
        if record.lease.is_some() {
            return Err(PlatformError::api(format!(
                "resource {id} is already leased"
            )));
        }
        let lease = Lease {
            token: LeaseToken::new(uuid::Uuid::new_v4().to_string()),
            expires_at_ms: EXPIRY_EPOCH_MS + ttl.as_millis() as u64,
        };
        record.lease = Some(lease.clone());
        Ok(lease)
    }

    async fn renew_lease(
        &self,
        app: &AppName,
        id: &ResourceId,
        token: &LeaseToken,
        ttl: Duration,
    ) -> Result<Lease> {
        let mut state = self.state.lock();
        Self::begin_op(&mut state, "renew_lease", id.to_string(), true)?;
        Self::ensure_app(&state, app)?;
        let record = state
            .resources
            .get_mut(id)
            .ok_or_else(|| PlatformError::not_found(format!("resource {id} not found")))?;
        match &mut record.lease {
            None => Err(PlatformError::not_found(format!(
                "no lease held on resource {id}"
            ))),
            Some(lease) if lease.token != *token => Err(PlatformError::lock_rejected(
                "token does not match the held lease",
            )),
            Some(lease) => {
                lease.expires_at_ms += ttl.as_millis() as u64;
                record.renewals += 1;
                Ok(lease.clone())
            }
        }
    }

    async fn release_lease(
        &self,
        app: &AppName,
        id: &ResourceId,
        token: &LeaseToken,
    ) -> Result<()> {
        let mut state = self.state.lock();
        Self::begin_op(&mut state, "release_lease", id.to_string(), true)?;
        Self::ensure_app(&state, app)?;
        let record = state
            .resources
            .get_mut(id)
            .ok_or_else(|| PlatformError::not_found(format!("resource {id} not found")))?;
        match &record.lease {
            None => Ok(()),
            Some(lease) if lease.token != *token => Err(PlatformError::lock_rejected(
                "token does not match the held lease",
            )),
            Some(_) => {
                record.lease = None;
                Ok(())
            }
        }
    }

    async fn destroy_resource(&self, app: &AppName, id: &ResourceId, force: bool) -> Result<()> {
        let mut state = self.state.lock();
        Self::begin_op(&mut state, "destroy_resource", id.to_string(), true)?;
        Self::ensure_app(&state, app)?;
        let record = state
            .resources
            .get(id)
            .ok_or_else(|| PlatformError::not_found(format!("resource {id} not found")))?;
        if record.lease.is_some() && !force {
            return Err(PlatformError::api(format!("resource {id} is leased")));
        }
        state.resources.remove(id);
        Ok(())
    }
}

#[async_trait]
impl DeployEffects for TestPlatform {
    async fn deploy(&self, app: &AppName, _config: &AppConfig, image: &str) -> Result<()> {
        let mut state = self.state.lock();
        Self::begin_op(&mut state, "deploy", image.to_string(), true)?;
        Self::ensure_app(&state, app)?;
        if state.app.platform_version == PlatformVersion::Legacy {
            return Err(PlatformError::api(
                "workload is still owned by the legacy scheduler",
            ));
        }
        Ok(())
    }
}
