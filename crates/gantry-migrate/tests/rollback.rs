//! Rollback behavior driven directly through the recovery ledger.

use std::collections::BTreeMap;

use gantry_core::effects::{ControlPlaneEffects, ResourceEffects};
use gantry_core::platform::PlatformVersion;
use gantry_core::{AppName, GuestSpec, ProcessGroup, RegionCode, ResourceId, ResourceSpec};
use gantry_migrate::{roll_back, RecoveryState};
use gantry_testkit::{fixtures, init_test_tracing, TestPlatform};

const APP: &str = "acme-api";

fn app() -> AppName {
    AppName::from(APP)
}

fn original_counts() -> BTreeMap<ProcessGroup, u32> {
    let mut counts = BTreeMap::new();
    counts.insert(ProcessGroup::from("web"), 2);
    counts
}

fn spec() -> ResourceSpec {
    ResourceSpec {
        app: app(),
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

async fn create_resources(platform: &TestPlatform, count: usize) -> Vec<ResourceId> {
    let mut ids = Vec::new();
    for _ in 0..count {
        ids.push(platform.create_resource(&spec()).await.unwrap().id);
    }
    ids
}

#[tokio::test]
async fn destroys_exactly_the_ledgered_resources() {
    init_test_tracing();
    let platform = TestPlatform::with_fleet(APP, &[("web", 2)]);
    let ids = create_resources(&platform, 3).await;
    // One extra resource the migration never recorded.
    let unrelated = platform.create_resource(&spec()).await.unwrap().id;

    let mut recovery = RecoveryState::new();
    recovery.resources_created = ids.clone();
    roll_back(&mut recovery, &platform, &platform, &app(), &original_counts())
        .await
        .unwrap();

    let live: Vec<ResourceId> = platform
        .live_resources()
        .into_iter()
        .map(|resource| resource.id)
        .collect();
    assert_eq!(live, vec![unrelated]);
    assert!(recovery.created_resources().is_empty());
}

#[tokio::test]
async fn missing_resources_count_as_already_undone() {
    init_test_tracing();
    let platform = TestPlatform::with_fleet(APP, &[("web", 2)]);
    let ids = create_resources(&platform, 2).await;

    let mut recovery = RecoveryState::new();
    recovery.resources_created = vec![
        ids[0].clone(),
        ResourceId::from("res-9999"),
        ids[1].clone(),
    ];
    roll_back(&mut recovery, &platform, &platform, &app(), &original_counts())
        .await
        .unwrap();

    assert!(platform.live_resources().is_empty());
    assert!(recovery.created_resources().is_empty());
    assert_eq!(platform.count_op("destroy_resource"), 3);
}

#[tokio::test]
async fn destroy_failures_continue_and_surface_the_first_error() {
    init_test_tracing();
    let platform = TestPlatform::with_fleet(APP, &[("web", 2)]);
    let ids = create_resources(&platform, 3).await;
    platform.fail_nth(
        "destroy_resource",
        1,
        gantry_core::PlatformError::api("destroy refused"),
    );

    let mut recovery = RecoveryState::new();
    recovery.resources_created = ids.clone();
    let err = roll_back(&mut recovery, &platform, &platform, &app(), &original_counts())
        .await
        .unwrap_err();

    assert!(err.to_string().contains("destroy refused"));
    // The two later destroys still ran.
    assert_eq!(platform.live_resources().len(), 1);
    // The failed one stays in the ledger for another attempt.
    assert_eq!(recovery.created_resources(), &ids[..1]);
}

#[tokio::test]
async fn a_second_rollback_finishes_what_the_first_could_not() {
    init_test_tracing();
    let platform = TestPlatform::with_fleet(APP, &[("web", 2)]);
    let ids = create_resources(&platform, 2).await;
    platform.fail_nth(
        "destroy_resource",
        1,
        gantry_core::PlatformError::api("transient"),
    );

    let mut recovery = RecoveryState::new();
    recovery.resources_created = ids;
    roll_back(&mut recovery, &platform, &platform, &app(), &original_counts())
        .await
        .unwrap_err();
    assert_eq!(recovery.created_resources().len(), 1);

    roll_back(&mut recovery, &platform, &platform, &app(), &original_counts())
        .await
        .unwrap();
    assert!(platform.live_resources().is_empty());
    assert!(recovery.created_resources().is_empty());
}

#[tokio::test]
async fn restores_marker_and_counts_with_the_held_lock() {
    init_test_tracing();
    let platform = TestPlatform::with_fleet(APP, &[("web", 2)]);
    let lock = platform.lock_app(&app()).await.unwrap();
    platform.seed_platform_version(PlatformVersion::Detached);
    let mut zero = BTreeMap::new();
    zero.insert(ProcessGroup::from("web"), 0u32);
    platform
        .set_group_counts(&app(), &zero, Some(&lock.token))
        .await
        .unwrap();

    let mut recovery = RecoveryState::new();
    recovery.lock = Some(lock);
    recovery.platform_version = PlatformVersion::Detached;
    recovery.scaled_to_zero = true;
    roll_back(&mut recovery, &platform, &platform, &app(), &original_counts())
        .await
        .unwrap();

    assert_eq!(
        platform.current_platform_version(),
        PlatformVersion::Legacy
    );
    assert_eq!(
        platform.group_counts().get(&ProcessGroup::from("web")),
        Some(&2)
    );
    assert_eq!(platform.legacy_instance_count(), 2);
    // The held lock was used, not a fresh one, and was given back.
    assert_eq!(platform.count_op("lock_app"), 1);
    assert_eq!(platform.count_op("unlock_app"), 1);
    assert!(!platform.is_locked());
    assert!(!recovery.holds_lock());
    assert!(!recovery.scaled_to_zero);
}

#[tokio::test]
async fn reacquires_a_lock_when_none_is_held() {
    init_test_tracing();
    let platform = TestPlatform::with_fleet(APP, &[("web", 2)]);
    // Scale to zero while locked, then give the lock back, as the
    // migration does before its cutover.
    let lock = platform.lock_app(&app()).await.unwrap();
    let mut zero = BTreeMap::new();
    zero.insert(ProcessGroup::from("web"), 0u32);
    platform
        .set_group_counts(&app(), &zero, Some(&lock.token))
        .await
        .unwrap();
    platform.unlock_app(&app(), &lock.token).await.unwrap();

    let mut recovery = RecoveryState::new();
    recovery.scaled_to_zero = true;
    roll_back(&mut recovery, &platform, &platform, &app(), &original_counts())
        .await
        .unwrap();

    assert_eq!(platform.count_op("lock_app"), 2);
    assert_eq!(platform.count_op("unlock_app"), 2);
    assert_eq!(
        platform.group_counts().get(&ProcessGroup::from("web")),
        Some(&2)
    );
    assert!(!platform.is_locked());
    assert!(platform.is_pipeline_active());
}

#[tokio::test]
async fn resume_is_tolerated_on_an_active_pipeline() {
    init_test_tracing();
    let platform = TestPlatform::with_fleet(APP, &[("web", 2)]);

    // Nothing recorded: the only remote call is the unconditional resume.
    let mut recovery = RecoveryState::new();
    roll_back(&mut recovery, &platform, &platform, &app(), &original_counts())
        .await
        .unwrap();

    assert_eq!(platform.count_op("resume_app"), 1);
    assert_eq!(platform.mutating_op_count(), 1);
    assert!(platform.is_pipeline_active());

    // Running it again changes nothing and still succeeds.
    roll_back(&mut recovery, &platform, &platform, &app(), &original_counts())
        .await
        .unwrap();
    assert_eq!(platform.count_op("resume_app"), 2);
    assert_eq!(platform.count_op("destroy_resource"), 0);
    assert_eq!(platform.count_op("set_group_counts"), 0);
}

#[tokio::test]
async fn unlock_failure_keeps_the_lock_in_the_ledger() {
    init_test_tracing();
    let platform = TestPlatform::with_fleet(APP, &[("web", 2)]);
    let lock = platform.lock_app(&app()).await.unwrap();
    platform.fail_nth(
        "unlock_app",
        1,
        gantry_core::PlatformError::api("control plane hiccup"),
    );

    let mut recovery = RecoveryState::new();
    recovery.lock = Some(lock);
    let err = roll_back(&mut recovery, &platform, &platform, &app(), &original_counts())
        .await
        .unwrap_err();

    assert!(err.to_string().contains("control plane hiccup"));
    assert!(recovery.holds_lock());

    // A retry can still finish the job.
    roll_back(&mut recovery, &platform, &platform, &app(), &original_counts())
        .await
        .unwrap();
    assert!(!recovery.holds_lock());
    assert!(!platform.is_locked());
}
