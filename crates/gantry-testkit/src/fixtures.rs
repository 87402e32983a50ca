//! Builders for fleets and app configs used across tests

use gantry_core::platform::{ImageDetails, LegacyInstance, LegacyVmSize};
use gantry_core::{
    AppConfig, AppName, HealthCheck, InstanceId, ProcessConfig, ProcessGroup, RegionCode,
    ServiceConfig,
};

/// Region used by fixture fleets
pub const FIXTURE_REGION: &str = "iad";

/// A legacy fleet with the given per-group instance counts
///
/// Instance ids are sequential (`i-0001`, `i-0002`, ...) across groups in
/// the order given, all placed in [`FIXTURE_REGION`].
pub fn fleet(groups: &[(&str, u32)]) -> Vec<LegacyInstance> {
    let mut instances = Vec::new();
    let mut next = 1u32;
    for (group, count) in groups {
        for _ in 0..*count {
            instances.push(LegacyInstance {
                id: InstanceId::new(format!("i-{next:04}")),
                region: RegionCode::from(FIXTURE_REGION),
                process_group: ProcessGroup::from(*group),
                attached_volumes: Vec::new(),
            });
            next += 1;
        }
    }
    instances
}

/// An app config declaring one serviced process group per name given
pub fn app_config(name: &str, groups: &[&str]) -> AppConfig {
    let mut config = AppConfig {
        app_name: AppName::from(name),
        primary_region: Some(RegionCode::from(FIXTURE_REGION)),
        ..AppConfig::default()
    };
    config.env.insert("LOG_LEVEL".into(), "info".into());
    for group in groups {
        config.processes.insert(
            ProcessGroup::from(*group),
            ProcessConfig {
                cmd: vec![format!("bin/{group}")],
                services: vec![ServiceConfig {
                    protocol: "tcp".into(),
                    internal_port: 8080,
                    external_ports: vec![80, 443],
                }],
                checks: vec![HealthCheck {
                    check_type: "tcp".into(),
                    interval_ms: 15_000,
                    timeout_ms: 2_000,
                    path: None,
                }],
            },
        );
    }
    config
}

/// The image fixture apps currently run
pub fn image() -> ImageDetails {
    ImageDetails {
        registry: "registry.gantry.dev".into(),
        repository: "acme/api".into(),
        tag: "v41".into(),
    }
}

/// A legacy VM sizing preset
pub fn vm_size(name: &str, memory_mb: u32) -> LegacyVmSize {
    LegacyVmSize {
        name: name.into(),
        memory_mb,
    }
}
