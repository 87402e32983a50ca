//! Turning a legacy fleet snapshot into a concrete migration plan.
//!
//! The plan is computed once, before anything is mutated, and drives every
//! later step: one resource spec per legacy instance, the release record to
//! register, the per-group counts to restore on rollback, and the summary
//! shown to the operator.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use gantry_core::platform::{
    App, AutoscalingConfig, ImageDetails, LegacyInstance, LegacyVmSize, PlatformVersion, Release,
    ReleaseSpec,
};
use gantry_core::resource::metadata;
use gantry_core::{
    AppConfig, AppName, GuestSpec, ProcessConfig, ProcessGroup, RegionCode, ResourceSpec,
};

use crate::error::MigrateError;

/// Environment variable carrying the chosen primary region into every
/// resource.
pub const PRIMARY_REGION_ENV: &str = "PRIMARY_REGION";

/// Release strategy recorded for migrations.
const RELEASE_STRATEGY: &str = "simple";

/// Legacy sizing class that maps onto the performance CPU class.
const DEDICATED_PRESET_PREFIX: &str = "dedicated-cpu";
const PERFORMANCE_PRESET_PREFIX: &str = "performance";

/// Immutable view of the application taken before any mutation.
#[derive(Debug, Clone)]
pub struct FleetSnapshot {
    /// Application record, including the current platform marker.
    pub app: App,
    /// Instances running on the legacy scheduler right now.
    pub instances: Vec<LegacyInstance>,
    /// Legacy autoscaling policy, when one exists.
    pub autoscaling: Option<AutoscalingConfig>,
    /// Image the application currently runs.
    pub image: ImageDetails,
    /// VM sizing preset assigned on the legacy scheduler.
    pub vm_size: LegacyVmSize,
}

impl FleetSnapshot {
    /// Per-group instance counts observed at snapshot time.
    pub fn group_counts(&self) -> BTreeMap<ProcessGroup, u32> {
        let mut counts = BTreeMap::new();
        for instance in &self.instances {
            *counts.entry(instance.process_group.clone()).or_insert(0) += 1;
        }
        counts
    }
}

/// Everything the orchestrator needs to execute one migration.
#[derive(Debug, Clone)]
pub struct MigrationPlan {
    /// Application being migrated.
    pub app: AppName,
    /// Region every resource advertises as primary.
    pub primary_region: RegionCode,
    /// Full image reference the resources will run.
    pub image: String,
    /// Per-group counts at snapshot time; restored on rollback.
    pub group_counts: BTreeMap<ProcessGroup, u32>,
    /// One spec per legacy instance, in snapshot order.
    pub specs: Vec<ResourceSpec>,
    /// Release record to register before creating resources.
    pub release_spec: ReleaseSpec,
    /// Release returned by the control plane, once registered.
    pub release: Option<Release>,
    /// Where the updated config is persisted after the cutover.
    pub config_path: PathBuf,
}

/// Builds the migration plan for `snapshot`.
///
/// Fails with a precondition error when an instance's process group has no
/// matching process configuration or the legacy VM size has no resource
/// platform equivalent.
pub fn build(
    snapshot: &FleetSnapshot,
    config: &AppConfig,
    primary_region: &RegionCode,
    config_path: &Path,
) -> Result<MigrationPlan, MigrateError> {
    let guest = guest_for_size(&snapshot.vm_size)?;
    let image = snapshot.image.reference();
    let processes = config.process_configs();

    let mut specs = Vec::with_capacity(snapshot.instances.len());
    for instance in &snapshot.instances {
        let process = processes.get(&instance.process_group).ok_or_else(|| {
            MigrateError::precondition(format!(
                "instance {} runs process group '{}' which has no process configuration",
                instance.id.short(),
                instance.process_group
            ))
        })?;
        specs.push(spec_for_instance(
            snapshot,
            config,
            instance,
            process,
            &guest,
            &image,
            primary_region,
        ));
    }

    Ok(MigrationPlan {
        app: snapshot.app.name.clone(),
        primary_region: primary_region.clone(),
        image: image.clone(),
        group_counts: snapshot.group_counts(),
        specs,
        release_spec: ReleaseSpec {
            platform_version: PlatformVersion::Resources,
            strategy: RELEASE_STRATEGY.into(),
            image,
            definition: config.clone(),
        },
        release: None,
        config_path: config_path.to_path_buf(),
    })
}

fn guest_for_size(size: &LegacyVmSize) -> Result<GuestSpec, MigrateError> {
    // Dedicated CPUs map onto the performance class.
    let preset = size
        .name
        .replace(DEDICATED_PRESET_PREFIX, PERFORMANCE_PRESET_PREFIX);
    let mut guest = GuestSpec::from_preset(&preset).map_err(|err| {
        MigrateError::precondition(format!("unsupported vm size '{}': {err}", size.name))
    })?;
    if size.memory_mb > 0 {
        guest.memory_mb = size.memory_mb;
    }
    Ok(guest)
}

fn spec_for_instance(
    snapshot: &FleetSnapshot,
    config: &AppConfig,
    instance: &LegacyInstance,
    process: &ProcessConfig,
    guest: &GuestSpec,
    image: &str,
    primary_region: &RegionCode,
) -> ResourceSpec {
    let mut env = config.env.clone();
    env.insert(PRIMARY_REGION_ENV.into(), primary_region.to_string());

    let mut meta = BTreeMap::new();
    meta.insert(
        metadata::PLATFORM_VERSION.into(),
        metadata::PLATFORM_VERSION_VALUE.into(),
    );
    meta.insert(
        metadata::PROCESS_GROUP.into(),
        instance.process_group.to_string(),
    );

    ResourceSpec {
        app: snapshot.app.name.clone(),
        // Each replacement lands where the instance it replaces ran.
        region: instance.region.clone(),
        guest: guest.clone(),
        image: image.to_string(),
        env,
        metadata: meta,
        services: process.services.clone(),
        checks: process.checks.clone(),
        mounts: Vec::new(),
        statics: config.statics.clone(),
        metrics: config.metrics.clone(),
        init_cmd: if process.cmd.is_empty() {
            None
        } else {
            Some(process.cmd.clone())
        },
    }
}

impl MigrationPlan {
    /// Records the registered release and stamps its identity into every
    /// spec's metadata.
    pub fn stamp_release(&mut self, release: &Release) {
        for spec in &mut self.specs {
            spec.metadata
                .insert(metadata::RELEASE_ID.into(), release.id.to_string());
            spec.metadata
                .insert(metadata::RELEASE_VERSION.into(), release.version.to_string());
        }
        self.release = Some(release.clone());
    }

    /// Operator-facing description of what the migration will do.
    pub fn summary(&self) -> String {
        let breakdown = self
            .group_counts
            .iter()
            .map(|(group, count)| format!("{group}: {count}"))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "This will migrate app '{app}' to the resource platform:\n\
             \x20 * lock the application\n\
             \x20 * create {total} resources ({breakdown})\n\
             \x20 * trigger a health-gated cutover\n\
             \x20 * scale the legacy process groups to zero\n\
             \x20 * switch the platform marker to '{marker}'\n\
             \x20 * write the updated config to {path}",
            app = self.app,
            total = self.specs.len(),
            marker = PlatformVersion::Resources,
            path = self.config_path.display(),
        )
    }
}

#[cfg(test)]
mod tests {
    use gantry_core::{InstanceId, MetricsConfig, ReleaseId};
    use gantry_testkit::fixtures;
    use proptest::prelude::*;

    use super::*;

    fn snapshot(groups: &[(&str, u32)]) -> FleetSnapshot {
        FleetSnapshot {
            app: App {
                name: AppName::from("acme-api"),
                organization: "acme".into(),
                platform_version: PlatformVersion::Legacy,
            },
            instances: fixtures::fleet(groups),
            autoscaling: None,
            image: fixtures::image(),
            vm_size: fixtures::vm_size("shared-cpu-1x", 256),
        }
    }

    fn region() -> RegionCode {
        RegionCode::from(fixtures::FIXTURE_REGION)
    }

    #[test]
    fn one_spec_per_instance_with_group_metadata() {
        let snapshot = snapshot(&[("web", 2), ("worker", 1)]);
        let config = fixtures::app_config("acme-api", &["web", "worker"]);
        let plan = build(&snapshot, &config, &region(), Path::new("gantry.toml")).unwrap();

        assert_eq!(plan.specs.len(), 3);
        for (spec, instance) in plan.specs.iter().zip(&snapshot.instances) {
            assert_eq!(spec.region, instance.region);
            assert_eq!(
                spec.metadata.get(metadata::PROCESS_GROUP),
                Some(&instance.process_group.to_string())
            );
            assert_eq!(
                spec.metadata.get(metadata::PLATFORM_VERSION),
                Some(&metadata::PLATFORM_VERSION_VALUE.to_string())
            );
            assert_eq!(spec.image, fixtures::image().reference());
        }
        assert_eq!(
            plan.group_counts.get(&ProcessGroup::from("web")),
            Some(&2u32)
        );
        assert_eq!(
            plan.group_counts.get(&ProcessGroup::from("worker")),
            Some(&1u32)
        );
    }

    #[test]
    fn instances_keep_their_regions() {
        let mut snapshot = snapshot(&[("web", 2)]);
        snapshot.instances[1].region = RegionCode::from("lhr");
        let config = fixtures::app_config("acme-api", &["web"]);
        let plan = build(&snapshot, &config, &region(), Path::new("gantry.toml")).unwrap();

        assert_eq!(plan.specs[0].region, RegionCode::from("iad"));
        assert_eq!(plan.specs[1].region, RegionCode::from("lhr"));
        // The primary region is advertised regardless of placement.
        for spec in &plan.specs {
            assert_eq!(spec.env.get(PRIMARY_REGION_ENV), Some(&"iad".to_string()));
        }
    }

    #[test]
    fn dedicated_sizes_translate_to_the_performance_class() {
        let mut snapshot = snapshot(&[("web", 1)]);
        snapshot.vm_size = fixtures::vm_size("dedicated-cpu-2x", 8192);
        let config = fixtures::app_config("acme-api", &["web"]);
        let plan = build(&snapshot, &config, &region(), Path::new("gantry.toml")).unwrap();

        let guest = &plan.specs[0].guest;
        assert_eq!(guest.cpu_kind, "performance");
        assert_eq!(guest.cpus, 2);
        assert_eq!(guest.memory_mb, 8192);
    }

    #[test]
    fn snapshot_memory_overrides_the_preset_default() {
        let mut snapshot = snapshot(&[("web", 1)]);
        snapshot.vm_size = fixtures::vm_size("shared-cpu-1x", 1024);
        let config = fixtures::app_config("acme-api", &["web"]);
        let plan = build(&snapshot, &config, &region(), Path::new("gantry.toml")).unwrap();

        assert_eq!(plan.specs[0].guest.memory_mb, 1024);
    }

    #[test]
    fn app_metrics_are_carried_onto_every_spec() {
        let snapshot = snapshot(&[("web", 2), ("worker", 1)]);
        let mut config = fixtures::app_config("acme-api", &["web", "worker"]);
        config.metrics = Some(MetricsConfig {
            port: 9091,
            path: "/metrics".into(),
        });
        let plan = build(&snapshot, &config, &region(), Path::new("gantry.toml")).unwrap();

        for spec in &plan.specs {
            let metrics = spec.metrics.as_ref().unwrap();
            assert_eq!(metrics.port, 9091);
            assert_eq!(metrics.path, "/metrics");
        }
    }

    #[test]
    fn unknown_vm_size_is_a_precondition_failure() {
        let mut snapshot = snapshot(&[("web", 1)]);
        snapshot.vm_size = fixtures::vm_size("quantum-9000", 0);
        let config = fixtures::app_config("acme-api", &["web"]);
        let err = build(&snapshot, &config, &region(), Path::new("gantry.toml")).unwrap_err();

        assert!(matches!(err, MigrateError::PreconditionFailed { .. }));
        assert!(err.to_string().contains("quantum-9000"));
    }

    #[test]
    fn unmatched_process_group_is_a_precondition_failure() {
        let snapshot = snapshot(&[("web", 1), ("cron", 1)]);
        let config = fixtures::app_config("acme-api", &["web"]);
        let err = build(&snapshot, &config, &region(), Path::new("gantry.toml")).unwrap_err();

        assert!(matches!(err, MigrateError::PreconditionFailed { .. }));
        assert!(err.to_string().contains("cron"));
    }

    #[test]
    fn stamping_a_release_reaches_every_spec() {
        let snapshot = snapshot(&[("web", 2), ("worker", 1)]);
        let config = fixtures::app_config("acme-api", &["web", "worker"]);
        let mut plan = build(&snapshot, &config, &region(), Path::new("gantry.toml")).unwrap();

        plan.stamp_release(&Release {
            id: ReleaseId::from("rel-0042"),
            version: 42,
        });

        for spec in &plan.specs {
            assert_eq!(
                spec.metadata.get(metadata::RELEASE_ID),
                Some(&"rel-0042".to_string())
            );
            assert_eq!(
                spec.metadata.get(metadata::RELEASE_VERSION),
                Some(&"42".to_string())
            );
        }
        assert_eq!(plan.release.as_ref().map(|r| r.version), Some(42));
    }

    #[test]
    fn release_spec_targets_the_resource_platform() {
        let snapshot = snapshot(&[("web", 1)]);
        let config = fixtures::app_config("acme-api", &["web"]);
        let plan = build(&snapshot, &config, &region(), Path::new("gantry.toml")).unwrap();

        assert_eq!(
            plan.release_spec.platform_version,
            PlatformVersion::Resources
        );
        assert_eq!(plan.release_spec.strategy, "simple");
        assert_eq!(plan.release_spec.image, plan.image);
    }

    #[test]
    fn summary_names_the_work() {
        let snapshot = snapshot(&[("web", 2), ("worker", 1)]);
        let config = fixtures::app_config("acme-api", &["web", "worker"]);
        let plan = build(
            &snapshot,
            &config,
            &region(),
            Path::new("deploy/gantry.toml"),
        )
        .unwrap();

        let summary = plan.summary();
        assert!(summary.contains("create 3 resources"), "{summary}");
        assert!(summary.contains("web: 2, worker: 1"), "{summary}");
        assert!(summary.contains("deploy/gantry.toml"), "{summary}");
        assert!(summary.contains("'resources'"), "{summary}");
    }

    #[test]
    fn empty_fleet_plans_zero_resources() {
        let snapshot = snapshot(&[]);
        let config = fixtures::app_config("acme-api", &["web"]);
        let plan = build(&snapshot, &config, &region(), Path::new("gantry.toml")).unwrap();

        assert!(plan.specs.is_empty());
        assert!(plan.group_counts.is_empty());
    }

    proptest! {
        #[test]
        fn spec_count_always_matches_the_fleet(
            web in 0u32..5,
            worker in 0u32..5,
            cron in 0u32..5,
        ) {
            let snapshot = snapshot(&[("web", web), ("worker", worker), ("cron", cron)]);
            let config = fixtures::app_config("acme-api", &["web", "worker", "cron"]);
            let plan = build(&snapshot, &config, &region(), Path::new("gantry.toml")).unwrap();

            prop_assert_eq!(plan.specs.len() as u32, web + worker + cron);
            let planned: u32 = plan.group_counts.values().sum();
            prop_assert_eq!(planned, web + worker + cron);
            for (spec, instance) in plan.specs.iter().zip(&snapshot.instances) {
                prop_assert_eq!(
                    spec.metadata.get(metadata::PROCESS_GROUP),
                    Some(&instance.process_group.to_string())
                );
            }
        }
    }

    #[test]
    fn instance_ids_do_not_leak_into_specs() {
        // Specs are derived from instances but identify resources by
        // metadata, never by the legacy id.
        let snapshot = snapshot(&[("web", 1)]);
        let config = fixtures::app_config("acme-api", &["web"]);
        let plan = build(&snapshot, &config, &region(), Path::new("gantry.toml")).unwrap();

        let id = InstanceId::new("i-0001");
        let rendered = format!("{:?}", plan.specs[0]);
        assert!(!rendered.contains(id.as_str()));
    }
}
