//! Recovery ledger and rollback.
//!
//! [`RecoveryState`] records every irreversible side effect the moment it
//! lands, so the ledger always matches remote reality even when the
//! process dies mid-step. [`roll_back`] reads nothing else: given the same
//! ledger it always attempts the same remediation, which is what makes a
//! second rollback after a partial first one safe.

use std::collections::BTreeMap;

use gantry_core::effects::{ControlPlaneEffects, ResourceEffects};
use gantry_core::platform::{AppLock, PlatformVersion};
use gantry_core::{AppName, PlatformError, ProcessGroup, ResourceId};

/// Ledger of irreversible side effects performed so far.
#[derive(Debug, Clone)]
pub struct RecoveryState {
    /// Resources created, in creation order.
    pub resources_created: Vec<ResourceId>,
    /// The application lock, while held.
    pub lock: Option<AppLock>,
    /// Whether the legacy fleet was scaled to zero.
    pub scaled_to_zero: bool,
    /// Platform marker last successfully written.
    pub platform_version: PlatformVersion,
    /// Set once the marker points at the resource platform; from then on
    /// failures are reported, never rolled back.
    pub past_point_of_no_return: bool,
}

impl RecoveryState {
    /// A fresh ledger for an app still owned by the legacy scheduler.
    pub fn new() -> Self {
        Self {
            resources_created: Vec::new(),
            lock: None,
            scaled_to_zero: false,
            platform_version: PlatformVersion::Legacy,
            past_point_of_no_return: false,
        }
    }

    /// Resources a rollback would destroy.
    pub fn created_resources(&self) -> &[ResourceId] {
        &self.resources_created
    }

    /// Whether the application lock is currently held.
    pub fn holds_lock(&self) -> bool {
        self.lock.is_some()
    }
}

impl Default for RecoveryState {
    fn default() -> Self {
        Self::new()
    }
}

/// Unwinds the side effects recorded in `recovery`, restoring the app to
/// its pre-migration shape.
///
/// Remediation continues past individual failures; the first error is
/// returned at the end and everything that could not be undone stays in
/// the ledger, so calling again retries exactly the remaining work.
/// A resource that is already gone counts as undone.
pub async fn roll_back(
    recovery: &mut RecoveryState,
    control: &dyn ControlPlaneEffects,
    resources: &dyn ResourceEffects,
    app: &AppName,
    original_counts: &BTreeMap<ProcessGroup, u32>,
) -> Result<(), PlatformError> {
    let mut first_error: Option<PlatformError> = None;

    let created = std::mem::take(&mut recovery.resources_created);
    for id in created {
        match resources.destroy_resource(app, &id, true).await {
            Ok(()) => {
                tracing::info!(resource = %id, "destroyed during rollback");
            }
            Err(err) if err.is_not_found() => {
                tracing::debug!(resource = %id, "already gone during rollback");
            }
            Err(err) => {
                tracing::error!(resource = %id, %err, "rollback could not destroy resource");
                // Not undone; keep it for the next attempt.
                recovery.resources_created.push(id);
                first_error.get_or_insert(err);
            }
        }
    }

    if recovery.platform_version != PlatformVersion::Legacy {
        let token = recovery.lock.as_ref().map(|lock| lock.token.clone());
        match control
            .set_platform_version(app, PlatformVersion::Legacy, token.as_ref())
            .await
        {
            Ok(()) => {
                recovery.platform_version = PlatformVersion::Legacy;
                tracing::info!(%app, "platform marker restored to legacy");
            }
            Err(err) => {
                tracing::error!(%app, %err, "rollback could not restore the platform marker");
                first_error.get_or_insert(err);
            }
        }
    }

    if recovery.scaled_to_zero {
        if recovery.lock.is_none() {
            // Count changes need the lock; reacquire it if the migration
            // already gave it up.
            match control.lock_app(app).await {
                Ok(lock) => recovery.lock = Some(lock),
                Err(err) => {
                    tracing::warn!(%app, %err, "could not reacquire the lock to restore counts");
                }
            }
        }
        let token = recovery.lock.as_ref().map(|lock| lock.token.clone());
        match control
            .set_group_counts(app, original_counts, token.as_ref())
            .await
        {
            Ok(()) => {
                recovery.scaled_to_zero = false;
                tracing::info!(%app, "legacy group counts restored");
            }
            Err(err) => {
                tracing::error!(%app, %err, "rollback could not restore group counts");
                first_error.get_or_insert(err);
            }
        }
    }

    if let Some(lock) = recovery.lock.take() {
        match control.unlock_app(app, &lock.token).await {
            Ok(()) => {}
            Err(err) if err.is_not_found() => {}
            Err(err) => {
                tracing::error!(%app, %err, "rollback could not release the app lock");
                recovery.lock = Some(lock);
                first_error.get_or_insert(err);
            }
        }
    }

    // The pipeline may or may not have been paused by now; resuming an
    // active pipeline is harmless.
    match control.resume_app(app).await {
        Ok(()) => {}
        Err(err) if err.is_already_running() => {}
        Err(err) => {
            tracing::error!(%app, %err, "rollback could not resume the deploy pipeline");
            first_error.get_or_insert(err);
        }
    }

    match first_error {
        None => Ok(()),
        Some(err) => Err(err),
    }
}
