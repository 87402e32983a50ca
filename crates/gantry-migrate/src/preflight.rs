//! Pre-mutation validation.
//!
//! Everything here runs before the first remote mutation; a failure means
//! the app was left exactly as found.

use gantry_core::platform::PlatformVersion;
use gantry_core::AppConfig;

use crate::error::MigrateError;
use crate::plan::FleetSnapshot;

/// Checks that the snapshot and config describe an app this orchestrator
/// can migrate. First violation wins.
pub fn check(snapshot: &FleetSnapshot, config: &AppConfig) -> Result<(), MigrateError> {
    match snapshot.app.platform_version {
        PlatformVersion::Legacy => {}
        PlatformVersion::Resources => {
            return Err(MigrateError::precondition(
                "app is already on the resource platform",
            ));
        }
        PlatformVersion::Detached => {
            return Err(MigrateError::precondition(
                "app is detached, likely from an interrupted migration; \
                 resolve that before migrating",
            ));
        }
    }

    config.validate_for_resource_platform().map_err(|err| {
        MigrateError::precondition(format!("config is not valid for the resource platform: {err}"))
    })?;

    if let Some(autoscaling) = &snapshot.autoscaling {
        if autoscaling.enabled {
            return Err(MigrateError::precondition(
                "legacy autoscaling is enabled; disable it before migrating",
            ));
        }
    }

    if config.mounts.is_some() {
        return Err(MigrateError::precondition(
            "the config declares a volume mount; volume migration is not supported",
        ));
    }
    for instance in &snapshot.instances {
        if !instance.attached_volumes.is_empty() {
            return Err(MigrateError::precondition(format!(
                "instance {} has attached volumes; volume migration is not supported",
                instance.id.short()
            )));
        }
    }

    let processes = config.process_configs();
    for instance in &snapshot.instances {
        if !processes.contains_key(&instance.process_group) {
            return Err(MigrateError::precondition(format!(
                "instance {} runs process group '{}' which has no process configuration",
                instance.id.short(),
                instance.process_group
            )));
        }
    }

    Ok(())
}
