//! Migration of a running application from the legacy scheduler to the
//! resource platform.
//!
//! The orchestrator takes an immutable snapshot of the legacy fleet, turns
//! it into a [`plan::MigrationPlan`], and then walks a fixed sequence of
//! remote steps: lock the app, detach it from the legacy pipeline, create
//! one resource per legacy instance, guard them with leases, cut traffic
//! over, drain the legacy fleet, and switch the platform marker. Every
//! irreversible side effect is recorded in a [`recovery::RecoveryState`]
//! ledger so that a failure at any step before the marker switch can be
//! rolled back to the starting state.
//!
//! Entry point is [`migrator::PlatformMigrator`]; everything else in this
//! crate exists in service of it.

#![forbid(unsafe_code)]

pub mod error;
pub mod leases;
pub mod migrator;
pub mod plan;
pub mod preflight;
pub mod recovery;
pub mod wait;

pub use error::MigrateError;
pub use leases::LeasedResourceSet;
pub use migrator::{
    MigrateOptions, MigrationOutcome, MigrationPhase, PlatformHandles, PlatformMigrator,
};
pub use plan::{FleetSnapshot, MigrationPlan};
pub use recovery::{roll_back, RecoveryState};
pub use wait::wait_for_resource_state;
