//! Identifier newtypes used across the gantry workspace
//!
//! All identifiers here originate on the remote control plane and are opaque
//! strings from gantry's point of view. Wrapping them keeps call sites honest
//! about which kind of id they are passing around.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            /// Wrap a raw identifier string
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// View the identifier as a string slice
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id! {
    /// Name of an application registered with the control plane
    AppName
}

string_id! {
    /// Identifier of one running legacy-platform instance
    InstanceId
}

string_id! {
    /// Identifier of a resource on the new per-instance platform
    ResourceId
}

string_id! {
    /// Identifier of a release record created for a deployment or migration
    ReleaseId
}

string_id! {
    /// Application-wide mutual-exclusion token handed out by the control plane
    LockToken
}

string_id! {
    /// Mutual-exclusion token for a single resource
    LeaseToken
}

string_id! {
    /// Process-group name a legacy instance or resource belongs to
    ProcessGroup
}

string_id! {
    /// Region code where an instance or resource is placed
    RegionCode
}

string_id! {
    /// Identifier of an attached storage volume
    VolumeId
}

impl InstanceId {
    /// Truncated form used in operator-facing messages
    pub fn short(&self) -> &str {
        // Cut after eight characters, never inside one.
        self.0
            .char_indices()
            .nth(8)
            .map_or(self.0.as_str(), |(end, _)| &self.0[..end])
    }
}
