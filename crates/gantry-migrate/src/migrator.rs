//! The migration state machine.
//!
//! [`PlatformMigrator`] walks the migration as a fixed sequence of steps,
//! each gated on an abort checkpoint and each recording its irreversible
//! effects in the recovery ledger before moving on. Construction performs
//! the read-only half (snapshot, validation, planning); [`migrate`] runs
//! the mutating half.
//!
//! [`migrate`]: PlatformMigrator::migrate

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use gantry_core::effects::{
    ClockEffects, ConfigStoreEffects, ControlPlaneEffects, DeployEffects, PromptEffects,
    ResourceEffects,
};
use gantry_core::platform::PlatformVersion;
use gantry_core::retry::{poll_until, Backoff, PollStatus};
use gantry_core::{
    AbortFlag, AppConfig, AppName, LockToken, PlatformError, ProcessGroup, RegionCode, ResourceId,
    ResourceState,
};

use crate::error::MigrateError;
use crate::leases::{self, LeasedResourceSet};
use crate::plan::{self, FleetSnapshot, MigrationPlan};
use crate::preflight;
use crate::recovery::{self, RecoveryState};
use crate::wait;

/// Where the updated config lands unless the caller says otherwise.
const DEFAULT_CONFIG_PATH: &str = "gantry.toml";
/// Lease ttl requested for each created resource.
const DEFAULT_LEASE_TTL: Duration = Duration::from_secs(13);
/// Ceiling on waiting for the legacy fleet to drain.
const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(60 * 60);
/// Ceiling on waiting for each resource to report started.
const DEFAULT_RESOURCE_START_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Delay before the first drain re-check.
const DRAIN_BACKOFF_MIN: Duration = Duration::from_secs(2);
/// Ceiling on the delay between drain re-checks.
const DRAIN_BACKOFF_MAX: Duration = Duration::from_secs(300);
/// Growth factor between drain re-checks.
const DRAIN_BACKOFF_FACTOR: f64 = 1.2;

/// Steps of the migration, in execution order.
///
/// The phase only ever moves forward, and only after the step it names has
/// fully succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationPhase {
    /// Nothing has happened yet.
    NotStarted,
    /// Snapshot taken and preconditions hold.
    Validated,
    /// A primary region is settled.
    PrimaryRegionChosen,
    /// The plan is computed.
    PlanPrepared,
    /// The application lock is held.
    Locked,
    /// Legacy fleet scaled to zero before the cutover (downtime path).
    LegacyScaledToZeroEarly,
    /// The app is detached from the legacy pipeline.
    PlatformDetached,
    /// The migration release is registered.
    ReleaseRegistered,
    /// All resources are created and started.
    ResourcesCreated,
    /// Every resource is protected by a lease.
    LeasesAcquired,
    /// The application lock is released for the cutover.
    Unlocked,
    /// Traffic is cut over to the new resources.
    CutoverTriggered,
    /// Legacy fleet scaled to zero after the cutover.
    LegacyScaledToZero,
    /// The platform marker points at the resource platform.
    PlatformSwitched,
    /// The updated config is written out.
    ConfigPersisted,
    /// All done.
    Done,
}

impl fmt::Display for MigrationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::NotStarted => "initialization",
            Self::Validated => "validation",
            Self::PrimaryRegionChosen => "primary region selection",
            Self::PlanPrepared => "planning",
            Self::Locked => "application lock",
            Self::LegacyScaledToZeroEarly => "early legacy scale-down",
            Self::PlatformDetached => "platform detach",
            Self::ReleaseRegistered => "release registration",
            Self::ResourcesCreated => "resource creation",
            Self::LeasesAcquired => "lease acquisition",
            Self::Unlocked => "application unlock",
            Self::CutoverTriggered => "cutover",
            Self::LegacyScaledToZero => "legacy scale-down",
            Self::PlatformSwitched => "platform switch",
            Self::ConfigPersisted => "config persistence",
            Self::Done => "completion",
        };
        f.write_str(label)
    }
}

/// Effect handlers the migrator drives.
#[derive(Clone)]
pub struct PlatformHandles {
    /// Control plane and legacy scheduler.
    pub control: Arc<dyn ControlPlaneEffects>,
    /// Resource platform operations.
    pub resources: Arc<dyn ResourceEffects>,
    /// Deployment pipeline.
    pub deploy: Arc<dyn DeployEffects>,
    /// Config persistence.
    pub config_store: Arc<dyn ConfigStoreEffects>,
    /// Operator confirmation.
    pub prompt: Arc<dyn PromptEffects>,
    /// Time source for waits and lease renewal.
    pub clock: Arc<dyn ClockEffects>,
}

/// Caller-tunable knobs for one migration.
#[derive(Debug, Clone)]
pub struct MigrateOptions {
    /// Application to migrate.
    pub app: AppName,
    /// Config to migrate with; fetched from the control plane when absent.
    pub config: Option<AppConfig>,
    /// Where the updated config is written after the cutover.
    pub config_path: PathBuf,
    /// Primary region override; falls back to the config's value.
    pub primary_region: Option<RegionCode>,
    /// Keep the legacy fleet serving until the new resources are up.
    pub avoid_downtime: bool,
    /// Lease ttl requested for each resource.
    pub lease_ttl: Duration,
    /// Lease renewal cadence; derived from the ttl when absent.
    pub lease_renew_interval: Option<Duration>,
    /// Ceiling on waiting for the legacy fleet to drain.
    pub drain_timeout: Duration,
    /// Ceiling on waiting for each resource to start.
    pub resource_start_timeout: Duration,
}

impl MigrateOptions {
    /// Defaults for migrating `app`.
    pub fn new(app: AppName) -> Self {
        Self {
            app,
            config: None,
            config_path: PathBuf::from(DEFAULT_CONFIG_PATH),
            primary_region: None,
            avoid_downtime: true,
            lease_ttl: DEFAULT_LEASE_TTL,
            lease_renew_interval: None,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
            resource_start_timeout: DEFAULT_RESOURCE_START_TIMEOUT,
        }
    }
}

/// How a migration run ended without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// The app now runs on the resource platform.
    Completed,
    /// The operator declined the confirmation; nothing was mutated.
    Declined,
}

/// Orchestrates one migration of one application.
pub struct PlatformMigrator {
    handles: PlatformHandles,
    options: MigrateOptions,
    config: AppConfig,
    plan: MigrationPlan,
    recovery: RecoveryState,
    phase: MigrationPhase,
    abort: AbortFlag,
    leases: Option<LeasedResourceSet>,
}

impl fmt::Debug for PlatformMigrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // `handles` and `leases` hold non-`Debug` trait objects.
        f.debug_struct("PlatformMigrator")
            .field("options", &self.options)
            .field("config", &self.config)
            .field("plan", &self.plan)
            .field("recovery", &self.recovery)
            .field("phase", &self.phase)
            .field("abort", &self.abort)
            .finish_non_exhaustive()
    }
}

fn remote(step: MigrationPhase) -> impl Fn(PlatformError) -> MigrateError {
    move |source| MigrateError::Remote { step, source }
}

impl PlatformMigrator {
    /// Snapshots the app, validates it, and computes the plan.
    ///
    /// Read-only: a failure here means nothing was mutated. `abort` is
    /// checked between later steps; requesting it stops the migration at
    /// the next checkpoint.
    pub async fn new(
        handles: PlatformHandles,
        options: MigrateOptions,
        abort: AbortFlag,
    ) -> Result<Self, MigrateError> {
        let app_name = options.app.clone();
        tracing::debug!(app = %app_name, phase = %MigrationPhase::NotStarted, "snapshotting");

        let control = &handles.control;
        let (app, instances, autoscaling, image, vm_size) = futures::join!(
            control.get_app(&app_name),
            control.list_legacy_instances(&app_name),
            control.autoscaling_config(&app_name),
            control.current_image(&app_name),
            control.legacy_vm_size(&app_name),
        );
        let snapshot = FleetSnapshot {
            app: app.map_err(remote(MigrationPhase::Validated))?,
            instances: instances.map_err(remote(MigrationPhase::Validated))?,
            autoscaling: autoscaling.map_err(remote(MigrationPhase::Validated))?,
            image: image.map_err(remote(MigrationPhase::Validated))?,
            vm_size: vm_size.map_err(remote(MigrationPhase::Validated))?,
        };

        let mut config = match &options.config {
            Some(config) => config.clone(),
            None => handles
                .control
                .get_app_config(&app_name)
                .await
                .map_err(remote(MigrationPhase::Validated))?,
        };
        if config.app_name != app_name {
            return Err(MigrateError::precondition(format!(
                "config is for app '{}', not '{app_name}'",
                config.app_name
            )));
        }

        preflight::check(&snapshot, &config)?;
        tracing::debug!(app = %app_name, phase = %MigrationPhase::Validated, "validated");

        let primary_region = options
            .primary_region
            .clone()
            .or_else(|| config.primary_region.clone())
            .ok_or_else(|| {
                MigrateError::precondition(
                    "no primary region: pass one or set primary_region in the config",
                )
            })?;
        config.primary_region = Some(primary_region.clone());
        tracing::debug!(app = %app_name, region = %primary_region, "primary region settled");

        let plan = plan::build(&snapshot, &config, &primary_region, &options.config_path)?;
        tracing::info!(
            app = %app_name,
            resources = plan.specs.len(),
            image = %plan.image,
            "migration plan prepared"
        );

        Ok(Self {
            handles,
            options,
            config,
            plan,
            recovery: RecoveryState::new(),
            phase: MigrationPhase::PlanPrepared,
            abort,
            leases: None,
        })
    }

    /// The computed plan.
    pub fn plan(&self) -> &MigrationPlan {
        &self.plan
    }

    /// The step most recently completed.
    pub fn phase(&self) -> MigrationPhase {
        self.phase
    }

    /// The recovery ledger as it stands.
    pub fn recovery(&self) -> &RecoveryState {
        &self.recovery
    }

    /// Confirms with the operator and executes the migration.
    ///
    /// On failure before the platform marker switch, everything recorded
    /// in the recovery ledger is rolled back and the original error is
    /// returned; if the rollback itself fails too, both errors are
    /// returned together. After the marker switch the migration is
    /// reported as-is, rollback is off the table.
    pub async fn migrate(mut self) -> Result<MigrationOutcome, MigrateError> {
        let summary = self.plan.summary();
        let confirmed = self
            .handles
            .prompt
            .confirm(&summary)
            .await
            .map_err(|err| {
                MigrateError::precondition(format!("confirmation unavailable: {err}"))
            })?;
        if !confirmed {
            tracing::info!(app = %self.plan.app, "operator declined the migration");
            return Ok(MigrationOutcome::Declined);
        }

        let outcome = self.run().await;

        // Leases never outlive the run, whichever way it ended.
        if let Some(set) = self.leases.take() {
            set.release_leases().await;
            for warning in set.warnings() {
                tracing::warn!(%warning, "lease cleanup");
            }
        }

        match outcome {
            Ok(()) => {
                self.phase = MigrationPhase::Done;
                tracing::info!(app = %self.plan.app, "migration complete");
                Ok(MigrationOutcome::Completed)
            }
            Err(err) if self.recovery.past_point_of_no_return => Err(err),
            Err(err) => {
                tracing::error!(app = %self.plan.app, %err, "migration failed; rolling back");
                let rolled = recovery::roll_back(
                    &mut self.recovery,
                    self.handles.control.as_ref(),
                    self.handles.resources.as_ref(),
                    &self.plan.app,
                    &self.plan.group_counts,
                )
                .await;
                match rolled {
                    Ok(()) => Err(err),
                    Err(rollback) => Err(MigrateError::RollbackFailed {
                        original: Box::new(err),
                        rollback,
                    }),
                }
            }
        }
    }

    async fn run(&mut self) -> Result<(), MigrateError> {
        let app = self.plan.app.clone();

        self.checkpoint()?;
        let lock = self
            .handles
            .control
            .lock_app(&app)
            .await
            .map_err(remote(MigrationPhase::Locked))?;
        self.recovery.lock = Some(lock);
        self.phase = MigrationPhase::Locked;
        tracing::info!(%app, "application locked");
        self.checkpoint()?;

        if !self.options.avoid_downtime {
            self.scale_legacy_to_zero(MigrationPhase::LegacyScaledToZeroEarly)
                .await?;
            self.checkpoint()?;
        }

        self.set_marker(PlatformVersion::Detached, MigrationPhase::PlatformDetached)
            .await?;
        self.checkpoint()?;

        let token = self.lock_token();
        let release = self
            .handles
            .control
            .create_release(&app, &self.plan.release_spec, token.as_ref())
            .await
            .map_err(remote(MigrationPhase::ReleaseRegistered))?;
        tracing::info!(release = %release.id, version = release.version, "release registered");
        self.plan.stamp_release(&release);
        self.phase = MigrationPhase::ReleaseRegistered;
        self.checkpoint()?;

        // Created strictly one at a time so a failure leaves a known
        // prefix for the rollback to destroy.
        let mut created = Vec::with_capacity(self.plan.specs.len());
        for index in 0..self.plan.specs.len() {
            let resource = self
                .handles
                .resources
                .create_resource(&self.plan.specs[index])
                .await
                .map_err(remote(MigrationPhase::ResourcesCreated))?;
            tracing::info!(resource = %resource.id, region = %resource.region, "resource created");
            self.recovery.resources_created.push(resource.id.clone());
            created.push(resource);
        }
        for resource in &created {
            wait::wait_for_resource_state(
                self.handles.clock.as_ref(),
                self.handles.resources.as_ref(),
                &app,
                &resource.id,
                ResourceState::Started,
                self.options.resource_start_timeout,
            )
            .await
            .map_err(|err| MigrateError::from_poll(MigrationPhase::ResourcesCreated, err))?;
        }
        self.phase = MigrationPhase::ResourcesCreated;
        self.checkpoint()?;

        let ids: Vec<ResourceId> = created.iter().map(|resource| resource.id.clone()).collect();
        let ttl = self.options.lease_ttl;
        let interval = self
            .options
            .lease_renew_interval
            .unwrap_or_else(|| leases::default_renew_interval(ttl));
        let acquired = {
            let set = self.leases.insert(LeasedResourceSet::new(
                app.clone(),
                ids,
                self.handles.resources.clone(),
            ));
            set.acquire_leases(ttl).await
        };
        acquired.map_err(remote(MigrationPhase::LeasesAcquired))?;
        if let Some(set) = &self.leases {
            set.start_background_renewal(self.handles.clock.clone(), ttl, interval);
        }
        self.phase = MigrationPhase::LeasesAcquired;
        tracing::info!(%app, leases = created.len(), "leases acquired");
        self.checkpoint()?;

        if let Some(lock) = self.recovery.lock.clone() {
            self.handles
                .control
                .unlock_app(&app, &lock.token)
                .await
                .map_err(remote(MigrationPhase::Unlocked))?;
            self.recovery.lock = None;
        }
        self.phase = MigrationPhase::Unlocked;
        self.checkpoint()?;

        self.handles
            .deploy
            .deploy(&app, &self.config, &self.plan.image)
            .await
            .map_err(remote(MigrationPhase::CutoverTriggered))?;
        self.phase = MigrationPhase::CutoverTriggered;
        tracing::info!(%app, "cutover complete");

        // The platform owns the resources from here; drop the leases
        // before the long drain rather than renewing through it.
        if let Some(set) = self.leases.take() {
            set.release_leases().await;
            for warning in set.warnings() {
                tracing::warn!(%warning, "lease cleanup");
            }
        }
        self.checkpoint()?;

        if !self.recovery.scaled_to_zero {
            self.scale_legacy_to_zero(MigrationPhase::LegacyScaledToZero)
                .await?;
            self.checkpoint()?;
        }

        self.set_marker(PlatformVersion::Resources, MigrationPhase::PlatformSwitched)
            .await?;
        // The workload now runs on the resource platform; undoing that
        // would be a second migration, not a rollback.
        self.recovery.past_point_of_no_return = true;

        self.handles
            .config_store
            .write_config(&self.config, &self.options.config_path)
            .await
            .map_err(|source| MigrateError::PostSuccessPersistFailed {
                path: self.options.config_path.clone(),
                source,
            })?;
        self.phase = MigrationPhase::ConfigPersisted;
        tracing::info!(path = %self.options.config_path.display(), "config persisted");

        Ok(())
    }

    fn checkpoint(&self) -> Result<(), MigrateError> {
        if self.abort.is_requested() {
            tracing::warn!(phase = %self.phase, "abort requested; stopping at checkpoint");
            return Err(MigrateError::Aborted);
        }
        Ok(())
    }

    fn lock_token(&self) -> Option<LockToken> {
        self.recovery.lock.as_ref().map(|lock| lock.token.clone())
    }

    /// Scales every legacy group to zero and waits for the fleet to drain.
    async fn scale_legacy_to_zero(&mut self, phase: MigrationPhase) -> Result<(), MigrateError> {
        let app = self.plan.app.clone();
        let zero: BTreeMap<ProcessGroup, u32> = self
            .plan
            .group_counts
            .keys()
            .cloned()
            .map(|group| (group, 0))
            .collect();
        let token = self.lock_token();
        self.handles
            .control
            .set_group_counts(&app, &zero, token.as_ref())
            .await
            .map_err(remote(phase))?;
        self.recovery.scaled_to_zero = true;
        tracing::info!(%app, groups = zero.len(), "legacy groups set to zero");

        let backoff = Backoff::new(DRAIN_BACKOFF_MIN, DRAIN_BACKOFF_MAX, DRAIN_BACKOFF_FACTOR)
            .with_jitter();
        let control = self.handles.control.clone();
        poll_until(
            self.handles.clock.as_ref(),
            "legacy instances to drain",
            backoff,
            self.options.drain_timeout,
            || {
                let control = control.clone();
                let app = app.clone();
                async move {
                    let instances = control.list_legacy_instances(&app).await?;
                    if instances.is_empty() {
                        Ok(PollStatus::Ready(()))
                    } else {
                        Ok(PollStatus::Pending(format!(
                            "{} legacy instances remaining",
                            instances.len()
                        )))
                    }
                }
            },
        )
        .await
        .map_err(|err| MigrateError::from_poll(phase, err))?;

        self.phase = phase;
        tracing::info!(%app, "legacy fleet drained");
        Ok(())
    }

    /// Writes the platform marker and records it in the ledger.
    async fn set_marker(
        &mut self,
        version: PlatformVersion,
        phase: MigrationPhase,
    ) -> Result<(), MigrateError> {
        let token = self.lock_token();
        self.handles
            .control
            .set_platform_version(&self.plan.app, version, token.as_ref())
            .await
            .map_err(remote(phase))?;
        self.recovery.platform_version = version;
        self.phase = phase;
        tracing::info!(app = %self.plan.app, marker = %version, "platform marker set");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_match_the_platform_contract() {
        let options = MigrateOptions::new(AppName::from("acme-api"));
        assert_eq!(options.lease_ttl, Duration::from_secs(13));
        assert_eq!(options.drain_timeout, Duration::from_secs(3600));
        assert_eq!(options.resource_start_timeout, Duration::from_secs(300));
        assert_eq!(options.config_path, PathBuf::from("gantry.toml"));
        assert!(options.avoid_downtime);
        assert!(options.lease_renew_interval.is_none());
    }

    #[test]
    fn phases_render_operator_friendly_labels() {
        assert_eq!(MigrationPhase::ResourcesCreated.to_string(), "resource creation");
        assert_eq!(MigrationPhase::CutoverTriggered.to_string(), "cutover");
        assert_eq!(MigrationPhase::PlatformSwitched.to_string(), "platform switch");
    }
}
