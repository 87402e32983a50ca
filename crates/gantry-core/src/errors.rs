//! Unified error type for remote and storage operations
//!
//! Every effect interface in this crate reports failures through
//! [`PlatformError`]. The orchestration layer in `gantry-migrate` wraps it
//! into its own taxonomy; here we only distinguish the shapes that change
//! behavior: lock rejection is fatal, not-found and already-running are
//! benign on the compensation path.

use serde::{Deserialize, Serialize};

/// Unified error type for control-plane, resource-API, and storage calls
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
pub enum PlatformError {
    /// Generic remote API failure
    #[error("api error: {message}")]
    Api {
        /// Description of the remote failure
        message: String,
    },

    /// The named entity does not exist on the remote side
    #[error("not found: {message}")]
    NotFound {
        /// Description of what was not found
        message: String,
    },

    /// A mutation carried a lock token the control plane did not accept
    #[error("lock rejected: {message}")]
    LockRejected {
        /// Description of the rejected lock
        message: String,
    },

    /// The application is already in the requested run state
    #[error("already running: {message}")]
    AlreadyRunning {
        /// Description of the redundant transition
        message: String,
    },

    /// The request was malformed or refers to an unsupported configuration
    #[error("invalid input: {message}")]
    InvalidInput {
        /// Description of the invalid input
        message: String,
    },

    /// Local persistence failed
    #[error("storage error: {message}")]
    Storage {
        /// Description of the storage failure
        message: String,
    },
}

impl PlatformError {
    /// Create a generic remote API error
    pub fn api(message: impl Into<String>) -> Self {
        Self::Api {
            message: message.into(),
        }
    }

    /// Create a not-found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Create a lock-rejected error
    pub fn lock_rejected(message: impl Into<String>) -> Self {
        Self::LockRejected {
            message: message.into(),
        }
    }

    /// Create an already-running error
    pub fn already_running(message: impl Into<String>) -> Self {
        Self::AlreadyRunning {
            message: message.into(),
        }
    }

    /// Create an invalid-input error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create a storage error
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// True when the target no longer exists; benign while compensating
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// True when resuming an application that never stopped
    pub fn is_already_running(&self) -> bool {
        matches!(self, Self::AlreadyRunning { .. })
    }

    /// True when a mutation was refused because of its lock token
    pub fn is_lock_rejected(&self) -> bool {
        matches!(self, Self::LockRejected { .. })
    }

    /// True when the request itself was malformed (retrying cannot help)
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, Self::InvalidInput { .. })
    }
}

impl From<std::io::Error> for PlatformError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::not_found(err.to_string()),
            _ => Self::storage(err.to_string()),
        }
    }
}

/// Standard Result type for platform operations
pub type Result<T> = std::result::Result<T, PlatformError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn benignity_predicates_match_their_variants() {
        assert!(PlatformError::not_found("gone").is_not_found());
        assert!(PlatformError::already_running("up").is_already_running());
        assert!(PlatformError::lock_rejected("held elsewhere").is_lock_rejected());
        assert!(!PlatformError::api("boom").is_not_found());
    }

    #[test]
    fn io_not_found_maps_to_not_found() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err = PlatformError::from(io);
        assert!(err.is_not_found());
    }

    #[test]
    fn io_other_kinds_map_to_storage() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope");
        let err = PlatformError::from(io);
        assert!(matches!(err, PlatformError::Storage { .. }));
    }
}
