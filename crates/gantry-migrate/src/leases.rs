//! Exclusive leases over the migration's resources.
//!
//! While the application lock is released for the cutover, per-resource
//! leases are the only thing preventing concurrent mutation of the newly
//! created resources. The set acquires all leases up front, renews them
//! from a background task on a cadence well inside the ttl, and releases
//! them when the migration settles, successfully or not.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use gantry_core::effects::{ClockEffects, ResourceEffects};
use gantry_core::resource::Lease;
use gantry_core::{AppName, PlatformError, ResourceId};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Margin kept between the renewal cadence and the lease ttl.
const RENEW_SAFETY_MARGIN: Duration = Duration::from_secs(1);

/// Renewal interval giving three renewal opportunities per lease window.
pub fn default_renew_interval(ttl: Duration) -> Duration {
    ttl.saturating_sub(RENEW_SAFETY_MARGIN) / 3
}

struct LeaseSetInner {
    app: AppName,
    resources: Arc<dyn ResourceEffects>,
    held: tokio::sync::Mutex<HashMap<ResourceId, Lease>>,
    warnings: parking_lot::Mutex<Vec<String>>,
}

/// The set of leases held over the migration's resources.
pub struct LeasedResourceSet {
    inner: Arc<LeaseSetInner>,
    members: Vec<ResourceId>,
    shutdown: watch::Sender<bool>,
    renewal: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl LeasedResourceSet {
    /// A set covering `members`, with nothing acquired yet.
    pub fn new(
        app: AppName,
        members: Vec<ResourceId>,
        resources: Arc<dyn ResourceEffects>,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            inner: Arc::new(LeaseSetInner {
                app,
                resources,
                held: tokio::sync::Mutex::new(HashMap::new()),
                warnings: parking_lot::Mutex::new(Vec::new()),
            }),
            members,
            shutdown,
            renewal: parking_lot::Mutex::new(None),
        }
    }

    /// Acquires a lease on every member concurrently.
    ///
    /// Successful leases are kept even when others fail, so the caller can
    /// release them through the usual path before rolling back.
    pub async fn acquire_leases(&self, ttl: Duration) -> Result<(), PlatformError> {
        let attempts = join_all(self.members.iter().map(|id| {
            let inner = self.inner.clone();
            async move {
                let lease = inner.resources.acquire_lease(&inner.app, id, ttl).await?;
                Ok::<_, PlatformError>((id.clone(), lease))
            }
        }))
        .await;

        let total = attempts.len();
        let mut failures = Vec::new();
        {
            let mut held = self.inner.held.lock().await;
            for attempt in attempts {
                match attempt {
                    Ok((id, lease)) => {
                        held.insert(id, lease);
                    }
                    Err(err) => failures.push(err),
                }
            }
        }

        match failures.first() {
            None => Ok(()),
            Some(first) => Err(PlatformError::api(format!(
                "failed to acquire {} of {total} leases: {first}",
                failures.len()
            ))),
        }
    }

    /// Starts the background renewal task. Idempotent.
    ///
    /// Each tick renews every held lease; a failed renewal is recorded as a
    /// warning and retried on the next tick rather than aborting the
    /// migration mid-flight.
    pub fn start_background_renewal(
        &self,
        clock: Arc<dyn ClockEffects>,
        lease_ttl: Duration,
        renew_interval: Duration,
    ) {
        let mut guard = self.renewal.lock();
        if guard.is_some() {
            return;
        }
        let inner = self.inner.clone();
        let mut shutdown = self.shutdown.subscribe();
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    _ = clock.sleep(renew_interval) => {
                        let mut held = inner.held.lock().await;
                        for (id, lease) in held.iter_mut() {
                            match inner
                                .resources
                                .renew_lease(&inner.app, id, &lease.token, lease_ttl)
                                .await
                            {
                                Ok(renewed) => *lease = renewed,
                                Err(err) => {
                                    tracing::warn!(resource = %id, %err, "lease renewal failed");
                                    inner
                                        .warnings
                                        .lock()
                                        .push(format!("renew lease on {id}: {err}"));
                                }
                            }
                        }
                    }
                }
            }
        });
        *guard = Some(handle);
    }

    /// Stops renewal and releases every held lease. Idempotent.
    ///
    /// Release failures become warnings; the leases expire on their own
    /// once renewal stops, so there is nothing further to do about them.
    pub async fn release_leases(&self) {
        let handle = {
            let mut guard = self.renewal.lock();
            let _ = self.shutdown.send(true);
            guard.take()
        };
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                if !err.is_cancelled() {
                    tracing::warn!(%err, "lease renewal task ended abnormally");
                }
            }
        }

        let drained: Vec<(ResourceId, Lease)> = {
            let mut held = self.inner.held.lock().await;
            held.drain().collect()
        };
        for (id, lease) in drained {
            if let Err(err) = self
                .inner
                .resources
                .release_lease(&self.inner.app, &id, &lease.token)
                .await
            {
                tracing::warn!(resource = %id, %err, "lease release failed");
                self.inner
                    .warnings
                    .lock()
                    .push(format!("release lease on {id}: {err}"));
            }
        }
    }

    /// Non-fatal problems observed while holding the set.
    pub fn warnings(&self) -> Vec<String> {
        self.inner.warnings.lock().clone()
    }

    /// Number of leases currently held.
    pub async fn held_count(&self) -> usize {
        self.inner.held.lock().await.len()
    }
}

impl Drop for LeasedResourceSet {
    fn drop(&mut self) {
        if let Some(handle) = self.renewal.get_mut().take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use gantry_core::{GuestSpec, RegionCode, ResourceSpec};
    use gantry_effects::SystemClock;
    use gantry_testkit::{fixtures, TestPlatform};

    use super::*;

    const APP: &str = "acme-api";

    fn spec() -> ResourceSpec {
        ResourceSpec {
            app: AppName::from(APP),
            region: RegionCode::from(fixtures::FIXTURE_REGION),
            guest: GuestSpec {
                cpu_kind: "shared".into(),
                cpus: 1,
                memory_mb: 256,
            },
            image: fixtures::image().reference(),
            env: BTreeMap::new(),
            metadata: BTreeMap::new(),
            services: Vec::new(),
            checks: Vec::new(),
            mounts: Vec::new(),
            statics: Vec::new(),
            metrics: None,
            init_cmd: None,
        }
    }

    async fn set_with_resources(platform: &TestPlatform, count: usize) -> LeasedResourceSet {
        let mut ids = Vec::new();
        for _ in 0..count {
            ids.push(platform.create_resource(&spec()).await.unwrap().id);
        }
        LeasedResourceSet::new(AppName::from(APP), ids, Arc::new(platform.clone()))
    }

    #[test]
    fn renew_interval_leaves_a_margin_under_the_ttl() {
        assert_eq!(
            default_renew_interval(Duration::from_secs(13)),
            Duration::from_secs(4)
        );
        let nine = default_renew_interval(Duration::from_secs(9));
        assert!(nine > Duration::from_millis(2600));
        assert!(nine < Duration::from_millis(2700));
        // Three renewal opportunities always fit inside the window.
        assert!(nine * 3 < Duration::from_secs(9));
    }

    #[tokio::test]
    async fn acquires_and_releases_every_member() {
        let platform = TestPlatform::with_fleet(APP, &[("web", 1)]);
        let set = set_with_resources(&platform, 3).await;

        set.acquire_leases(Duration::from_secs(13)).await.unwrap();
        assert_eq!(set.held_count().await, 3);
        assert_eq!(platform.held_lease_count(), 3);

        set.release_leases().await;
        assert_eq!(set.held_count().await, 0);
        assert_eq!(platform.held_lease_count(), 0);
        assert!(set.warnings().is_empty());
    }

    #[tokio::test]
    async fn partial_acquisition_keeps_the_successes() {
        let platform = TestPlatform::with_fleet(APP, &[("web", 1)]);
        let set = set_with_resources(&platform, 3).await;
        platform.fail_nth("acquire_lease", 2, PlatformError::api("lease contended"));

        let err = set.acquire_leases(Duration::from_secs(13)).await.unwrap_err();
        assert!(err.to_string().contains("1 of 3"), "{err}");
        assert_eq!(set.held_count().await, 2);

        // The usual release path cleans up the partial set.
        set.release_leases().await;
        assert_eq!(platform.held_lease_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn background_renewal_keeps_leases_alive() {
        let platform = TestPlatform::with_fleet(APP, &[("web", 1)]);
        let set = set_with_resources(&platform, 2).await;

        let ttl = Duration::from_secs(9);
        set.acquire_leases(ttl).await.unwrap();
        set.start_background_renewal(
            Arc::new(SystemClock::new()),
            ttl,
            default_renew_interval(ttl),
        );

        // Across a 10s window with a ~2.67s cadence each lease renews at
        // least three times, so no lease ever gets within the safety
        // margin of expiry.
        tokio::time::sleep(Duration::from_secs(10)).await;
        set.release_leases().await;

        assert!(
            platform.total_lease_renewals() >= 6,
            "saw {} renewals",
            platform.total_lease_renewals()
        );
        assert_eq!(platform.held_lease_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn renewal_failures_warn_and_keep_going() {
        let platform = TestPlatform::with_fleet(APP, &[("web", 1)]);
        let set = set_with_resources(&platform, 1).await;

        let ttl = Duration::from_secs(9);
        set.acquire_leases(ttl).await.unwrap();
        platform.fail_nth("renew_lease", 1, PlatformError::api("transient"));
        set.start_background_renewal(
            Arc::new(SystemClock::new()),
            ttl,
            default_renew_interval(ttl),
        );

        tokio::time::sleep(Duration::from_secs(10)).await;
        set.release_leases().await;

        assert_eq!(set.warnings().len(), 1);
        assert!(set.warnings()[0].contains("transient"));
        // Later ticks still renewed.
        assert!(platform.total_lease_renewals() >= 1);
    }

    #[tokio::test]
    async fn release_is_idempotent() {
        let platform = TestPlatform::with_fleet(APP, &[("web", 1)]);
        let set = set_with_resources(&platform, 2).await;

        set.acquire_leases(Duration::from_secs(13)).await.unwrap();
        set.release_leases().await;
        let releases = platform.count_op("release_lease");
        set.release_leases().await;
        assert_eq!(platform.count_op("release_lease"), releases);
    }

    #[tokio::test]
    async fn starting_renewal_twice_spawns_one_task() {
        let platform = TestPlatform::with_fleet(APP, &[("web", 1)]);
        let set = set_with_resources(&platform, 1).await;
        set.acquire_leases(Duration::from_secs(13)).await.unwrap();

        let clock: Arc<dyn ClockEffects> = Arc::new(SystemClock::new());
        let interval = Duration::from_secs(4);
        set.start_background_renewal(clock.clone(), Duration::from_secs(13), interval);
        set.start_background_renewal(clock, Duration::from_secs(13), interval);
        assert!(set.renewal.lock().is_some());
        set.release_leases().await;
        assert!(set.renewal.lock().is_none());
    }
}
