//! Application definition as persisted in the project's config file
//!
//! This is the document the migration rewrites at the very end: the
//! structure survives a serialize/deserialize round trip unchanged so a
//! persisted config can be read back and compared.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::errors::PlatformError;
use crate::identifiers::{AppName, ProcessGroup, RegionCode};

/// Process group assumed when the config declares none
pub const DEFAULT_PROCESS_GROUP: &str = "app";

/// Top-level application definition
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application name
    pub app_name: AppName,
    /// Preferred region for new workload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_region: Option<RegionCode>,
    /// Environment variables shared by all process groups
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Per-process-group configuration
    #[serde(default)]
    pub processes: BTreeMap<ProcessGroup, ProcessConfig>,
    /// Volume mount, at most one per application
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mounts: Option<MountsConfig>,
    /// Static asset mappings served without hitting the workload
    #[serde(default)]
    pub statics: Vec<StaticMapping>,
    /// Prometheus-style metrics endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<MetricsConfig>,
}

/// Configuration for one process group
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessConfig {
    /// Command override; empty means the image default
    #[serde(default)]
    pub cmd: Vec<String>,
    /// Network services the group exposes
    #[serde(default)]
    pub services: Vec<ServiceConfig>,
    /// Health checks run against the group's workload
    #[serde(default)]
    pub checks: Vec<HealthCheck>,
}

/// One exposed network service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Transport protocol, `tcp` or `udp`
    pub protocol: String,
    /// Port the workload listens on
    pub internal_port: u16,
    /// Edge ports forwarded to the internal port
    #[serde(default)]
    pub external_ports: Vec<u16>,
}

/// One health check definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheck {
    /// Check kind, `tcp` or `http`
    pub check_type: String,
    /// Interval between probes, in milliseconds
    pub interval_ms: u64,
    /// Per-probe timeout, in milliseconds
    pub timeout_ms: u64,
    /// Request path for `http` checks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// Volume mount declaration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MountsConfig {
    /// Volume name
    pub source: String,
    /// Mount path inside the workload
    pub destination: String,
}

/// One static asset mapping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticMapping {
    /// Directory inside the image to serve
    pub guest_path: String,
    /// URL prefix the directory is served under
    pub url_prefix: String,
}

/// Metrics endpoint declaration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Port the metrics endpoint listens on
    pub port: u16,
    /// Scrape path
    pub path: String,
}

impl AppConfig {
    /// Per-group configuration, synthesizing the default group when the
    /// config declares none
    pub fn process_configs(&self) -> BTreeMap<ProcessGroup, ProcessConfig> {
        if self.processes.is_empty() {
            let mut groups = BTreeMap::new();
            groups.insert(
                ProcessGroup::from(DEFAULT_PROCESS_GROUP),
                ProcessConfig::default(),
            );
            return groups;
        }
        self.processes.clone()
    }

    /// Names of all process groups, synthesized default included
    pub fn process_group_names(&self) -> Vec<ProcessGroup> {
        self.process_configs().into_keys().collect()
    }

    /// Mount path declared in the config, if any
    pub fn mounts_destination(&self) -> Option<&str> {
        self.mounts.as_ref().map(|m| m.destination.as_str())
    }

    /// Check that the definition is expressible on the resource platform
    pub fn validate_for_resource_platform(&self) -> Result<(), PlatformError> {
        if self.app_name.as_str().is_empty() {
            return Err(PlatformError::invalid_input("app name must not be empty"));
        }
        for (group, process) in &self.processes {
            for service in &process.services {
                if service.internal_port == 0 {
                    return Err(PlatformError::invalid_input(format!(
                        "process group '{group}' declares a service with internal port 0"
                    )));
                }
            }
            for check in &process.checks {
                if check.check_type != "tcp" && check.check_type != "http" {
                    return Err(PlatformError::invalid_input(format!(
                        "process group '{group}' declares unsupported check type '{}'",
                        check.check_type
                    )));
                }
                if check.check_type == "http" && check.path.is_none() {
                    return Err(PlatformError::invalid_input(format!(
                        "process group '{group}' declares an http check without a path"
                    )));
                }
            }
        }
        if let Some(mounts) = &self.mounts {
            if !mounts.destination.starts_with('/') {
                return Err(PlatformError::invalid_input(format!(
                    "mount destination '{}' must be an absolute path",
                    mounts.destination
                )));
            }
        }
        for mapping in &self.statics {
            if !mapping.url_prefix.starts_with('/') {
                return Err(PlatformError::invalid_input(format!(
                    "static url prefix '{}' must start with '/'",
                    mapping.url_prefix
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> AppConfig {
        AppConfig {
            app_name: AppName::from("acme-api"),
            ..AppConfig::default()
        }
    }

    #[test]
    fn empty_processes_synthesize_default_group() {
        let config = minimal();
        let groups = config.process_configs();
        assert_eq!(groups.len(), 1);
        assert!(groups.contains_key(&ProcessGroup::from(DEFAULT_PROCESS_GROUP)));
    }

    #[test]
    fn declared_processes_are_returned_as_is() {
        let mut config = minimal();
        config
            .processes
            .insert(ProcessGroup::from("web"), ProcessConfig::default());
        config
            .processes
            .insert(ProcessGroup::from("worker"), ProcessConfig::default());
        let names = config.process_group_names();
        assert_eq!(names.len(), 2);
        assert!(!names.contains(&ProcessGroup::from(DEFAULT_PROCESS_GROUP)));
    }

    #[test]
    fn validation_rejects_port_zero() {
        let mut config = minimal();
        config.processes.insert(
            ProcessGroup::from("web"),
            ProcessConfig {
                services: vec![ServiceConfig {
                    protocol: "tcp".into(),
                    internal_port: 0,
                    external_ports: vec![80],
                }],
                ..ProcessConfig::default()
            },
        );
        let err = config.validate_for_resource_platform().unwrap_err();
        assert!(err.is_invalid_input());
    }

    #[test]
    fn validation_rejects_http_check_without_path() {
        let mut config = minimal();
        config.processes.insert(
            ProcessGroup::from("web"),
            ProcessConfig {
                checks: vec![HealthCheck {
                    check_type: "http".into(),
                    interval_ms: 15_000,
                    timeout_ms: 2_000,
                    path: None,
                }],
                ..ProcessConfig::default()
            },
        );
        assert!(config.validate_for_resource_platform().is_err());
    }

    #[test]
    fn validation_rejects_relative_mount_destination() {
        let mut config = minimal();
        config.mounts = Some(MountsConfig {
            source: "data".into(),
            destination: "data".into(),
        });
        assert!(config.validate_for_resource_platform().is_err());
    }

    #[test]
    fn config_round_trips_through_serde() {
        let mut config = minimal();
        config.primary_region = Some(RegionCode::from("iad"));
        config.env.insert("LOG_LEVEL".into(), "debug".into());
        config.processes.insert(
            ProcessGroup::from("web"),
            ProcessConfig {
                cmd: vec!["bin/server".into()],
                services: vec![ServiceConfig {
                    protocol: "tcp".into(),
                    internal_port: 8080,
                    external_ports: vec![80, 443],
                }],
                checks: vec![],
            },
        );
        let json = serde_json::to_string(&config).unwrap();
        let back: AppConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.app_name, config.app_name);
        assert_eq!(back.primary_region, config.primary_region);
        assert_eq!(back.env, config.env);
        assert_eq!(back.processes.len(), 1);
    }
}
