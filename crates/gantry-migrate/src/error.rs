//! Migration failure taxonomy.
//!
//! Every failure an operator can see maps onto exactly one variant here, so
//! callers can decide between "fix your input", "retry later", and "go do
//! manual cleanup" without parsing message strings.

use std::path::PathBuf;
use std::time::Duration;

use gantry_core::retry::PollError;
use gantry_core::PlatformError;

use crate::migrator::MigrationPhase;

/// Error returned by the migration orchestrator.
#[derive(Debug, thiserror::Error)]
pub enum MigrateError {
    /// The app cannot be migrated as-is. Nothing was mutated.
    #[error("precondition failed: {reason}")]
    PreconditionFailed {
        /// Human-readable explanation of what to fix.
        reason: String,
    },

    /// A remote call failed partway through the migration.
    #[error("{step} failed: {source}")]
    Remote {
        /// Step that was executing when the call failed.
        step: MigrationPhase,
        /// Underlying platform error.
        source: PlatformError,
    },

    /// A wait loop ran out of time before its condition held.
    #[error("timed out after {elapsed:?} waiting for {what}")]
    Timeout {
        /// What the loop was waiting for.
        what: String,
        /// Total time spent waiting.
        elapsed: Duration,
        /// Last observation before giving up, when there was one.
        last_seen: Option<String>,
    },

    /// The operator requested an abort and a checkpoint honored it.
    #[error("migration aborted by operator request")]
    Aborted,

    /// The migration failed and the rollback also failed.
    #[error(
        "rollback failed: {rollback}; original failure: {original}; \
         the app may be in a mixed state and needs manual cleanup"
    )]
    RollbackFailed {
        /// Failure that triggered the rollback.
        original: Box<MigrateError>,
        /// First error encountered while rolling back.
        rollback: PlatformError,
    },

    /// The migration itself succeeded but the updated config could not be
    /// written. The app is on the resource platform; no rollback happens.
    #[error(
        "migration succeeded but writing the config to {} failed: {source}; \
         re-save it manually",
        .path.display()
    )]
    PostSuccessPersistFailed {
        /// Destination the write was attempted against.
        path: PathBuf,
        /// Underlying storage error.
        source: PlatformError,
    },
}

impl MigrateError {
    /// Precondition failure with the given reason.
    pub fn precondition(reason: impl Into<String>) -> Self {
        Self::PreconditionFailed {
            reason: reason.into(),
        }
    }

    /// Remote failure attributed to `step`.
    pub fn remote(step: MigrationPhase, source: PlatformError) -> Self {
        Self::Remote { step, source }
    }

    pub(crate) fn from_poll(step: MigrationPhase, err: PollError<PlatformError>) -> Self {
        match err {
            PollError::Timeout {
                what,
                elapsed,
                last_seen,
            } => Self::Timeout {
                what,
                elapsed,
                last_seen,
            },
            PollError::Condition(source) => Self::Remote { step, source },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_errors_name_the_step() {
        let err = MigrateError::remote(
            MigrationPhase::ResourcesCreated,
            PlatformError::api("quota exceeded"),
        );
        assert_eq!(
            err.to_string(),
            "resource creation failed: api error: quota exceeded"
        );
    }

    #[test]
    fn poll_timeouts_keep_the_last_observation() {
        let err = MigrateError::from_poll(
            MigrationPhase::LegacyScaledToZero,
            PollError::Timeout {
                what: "legacy instances to drain".into(),
                elapsed: Duration::from_secs(3600),
                last_seen: Some("2 legacy instances remaining".into()),
            },
        );
        match err {
            MigrateError::Timeout { last_seen, .. } => {
                assert_eq!(last_seen.as_deref(), Some("2 legacy instances remaining"));
            }
            other => panic!("expected timeout, got {other}"),
        }
    }

    #[test]
    fn persist_failures_point_at_the_path() {
        let err = MigrateError::PostSuccessPersistFailed {
            path: PathBuf::from("ops/gantry.toml"),
            source: PlatformError::storage("disk full"),
        };
        let text = err.to_string();
        assert!(text.contains("ops/gantry.toml"), "{text}");
        assert!(text.contains("re-save it manually"), "{text}");
    }
}
