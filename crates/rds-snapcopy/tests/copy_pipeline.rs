//! End-to-end tests of the copy pipeline against in-memory regions.
//!
//! These tests drive the loop driver over a source and a target region
//! and check copy selection, idempotency, the in-flight bound, and
//! retention in the target region.

use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use rds_snapcopy::{
    CopierConfig, CopyDispatcher, CopyOptions, CopyOutcome, DbInstance, DbSnapshot, InMemoryRds,
    InstanceStatus, LoopDriver, Pacing, SnapshotStatus, Tag,
};
use std::sync::Arc;

const SOURCE: &str = "us-east-1";
const TARGET: &str = "us-west-2";
const TAG: &str = "CopySnapshots";

fn config() -> CopierConfig {
    CopierConfig {
        tag: TAG.to_string(),
        source_region: SOURCE.to_string(),
        target_region: TARGET.to_string(),
        pacing: Pacing::immediate(),
        ..CopierConfig::default()
    }
}

/// Add an available, tagged instance with `count` daily automated snapshots.
fn seed_instance(region: &InMemoryRds, id: &str, count: u32) {
    region.insert_instance(
        DbInstance::new(id, InstanceStatus::Available, format!("arn:aws:rds:{}:1:db:{}", SOURCE, id)),
        vec![Tag::new(TAG, "true")],
    );
    let base = Utc.with_ymd_and_hms(2024, 3, 1, 4, 0, 0).unwrap();
    for day in 0..count {
        let created = base + ChronoDuration::days(day as i64);
        let snap_id = format!("rds:{}-{}", id, created.format("%Y-%m-%d-%H-%M"));
        region.insert_snapshot(DbSnapshot::new(
            id,
            snap_id.clone(),
            format!("arn:aws:rds:{}:1:snapshot:{}", SOURCE, snap_id),
            Some(created),
            SnapshotStatus::Available,
        ));
    }
}

#[tokio::test]
async fn test_end_to_end_copies_latest_per_instance() {
    let source = Arc::new(InMemoryRds::new(SOURCE));
    let target = Arc::new(InMemoryRds::new(TARGET).with_copy_polls(2));
    seed_instance(&source, "orders", 3);
    seed_instance(&source, "billing", 1);
    source.insert_instance(
        DbInstance::new("scratch", InstanceStatus::Available, "arn:aws:rds:us-east-1:1:db:scratch"),
        vec![Tag::new("team", "data")],
    );

    let mut driver = LoopDriver::new(config(), source, target.clone());
    let report = driver.run_once().await.unwrap();

    assert_eq!(report.instances_seen, 3);
    assert_eq!(report.in_scope, 2);
    assert_eq!(report.queued, 2);
    assert_eq!(report.dispatch.completed(), 2);
    assert!(target.contains_snapshot("orders-2024-03-03-04-00-copyfrom-us-east-1"));
    assert!(target.contains_snapshot("billing-2024-03-01-04-00-copyfrom-us-east-1"));
    assert!(!target.contains_snapshot("orders-2024-03-01-04-00-copyfrom-us-east-1"));
    assert!(target.snapshots().iter().all(|s| s.status.is_available()));

    for request in target.copy_requests() {
        assert_eq!(request.source_region, SOURCE);
        assert_eq!(request.destination_region, TARGET);
        assert!(request.kms_key_id.is_none());
        assert!(request.pre_signed_url.is_none());
    }
}

#[tokio::test]
async fn test_rerun_after_success_queues_nothing() {
    let source = Arc::new(InMemoryRds::new(SOURCE));
    let target = Arc::new(InMemoryRds::new(TARGET));
    seed_instance(&source, "orders", 2);

    let mut driver = LoopDriver::new(config(), source.clone(), target.clone());
    assert_eq!(driver.run_once().await.unwrap().queued, 1);

    let second = driver.run_once().await.unwrap();
    assert_eq!(second.queued, 0);
    assert_eq!(second.dispatch.total(), 0);
    assert_eq!(target.calls("copy_snapshot"), 1);

    // A new automated snapshot produces exactly one new copy.
    source.insert_snapshot(DbSnapshot::new(
        "orders",
        "rds:orders-2024-03-09-04-00",
        "arn:aws:rds:us-east-1:1:snapshot:rds:orders-2024-03-09-04-00",
        Some(Utc.with_ymd_and_hms(2024, 3, 9, 4, 0, 0).unwrap()),
        SnapshotStatus::Available,
    ));
    let third = driver.run_once().await.unwrap();
    assert_eq!(third.queued, 1);
    assert!(target.contains_snapshot("orders-2024-03-09-04-00-copyfrom-us-east-1"));
}

#[tokio::test]
async fn test_in_flight_copies_never_exceed_worker_count() {
    let source = Arc::new(InMemoryRds::new(SOURCE));
    let target = Arc::new(InMemoryRds::new(TARGET).with_copy_polls(4));
    for i in 0..6 {
        seed_instance(&source, &format!("db-{}", i), 2);
    }

    let config = CopierConfig {
        max_copy_in_flight: 2,
        ..config()
    };
    let mut driver = LoopDriver::new(config, source, target.clone());
    let report = driver.run_once().await.unwrap();

    assert_eq!(report.dispatch.completed(), 6);
    assert_eq!(target.max_in_flight(), 2);

    let workers: std::collections::HashSet<_> = report.dispatch.results.iter().map(|r| r.worker).collect();
    assert!(workers.iter().all(|w| (1..=2).contains(w)));
}

#[tokio::test]
async fn test_single_worker_copies_sequentially() {
    let source = Arc::new(InMemoryRds::new(SOURCE));
    let target = Arc::new(InMemoryRds::new(TARGET).with_copy_polls(3));
    for i in 0..3 {
        seed_instance(&source, &format!("db-{}", i), 1);
    }

    let config = CopierConfig {
        max_copy_in_flight: 1,
        ..config()
    };
    let mut driver = LoopDriver::new(config, source, target.clone());
    let report = driver.run_once().await.unwrap();

    assert_eq!(report.dispatch.completed(), 3);
    assert_eq!(target.max_in_flight(), 1);
    let mut results = report.dispatch.results.clone();
    results.sort_by_key(|r| r.started);
    for pair in results.windows(2) {
        assert!(pair[0].finished <= pair[1].started);
    }
}

#[tokio::test]
async fn test_instances_without_snapshots_queue_nothing() {
    let source = Arc::new(InMemoryRds::new(SOURCE));
    let target = Arc::new(InMemoryRds::new(TARGET));
    seed_instance(&source, "fresh", 0);

    let mut driver = LoopDriver::new(config(), source, target.clone());
    let report = driver.run_once().await.unwrap();

    assert_eq!(report.in_scope, 1);
    assert_eq!(report.queued, 0);
    assert_eq!(target.calls("copy_snapshot"), 0);
}

#[tokio::test]
async fn test_encrypted_copy_carries_presigned_source_request() {
    let source = Arc::new(InMemoryRds::new(SOURCE));
    let target = Arc::new(InMemoryRds::new(TARGET));
    seed_instance(&source, "orders", 1);

    let config = CopierConfig {
        target_kms_key: Some("arn:aws:kms:us-west-2:1:key/dr".to_string()),
        ..config()
    };
    let dispatcher = CopyDispatcher::new(source.clone(), target.clone(), CopyOptions::from_config(&config));
    let instances = vec![DbInstance::new(
        "orders",
        InstanceStatus::Available,
        "arn:aws:rds:us-east-1:1:db:orders",
    )];
    let summary = dispatcher.run(&instances).await;

    assert_eq!(summary.completed(), 1);
    assert_eq!(source.calls("presign_copy"), 1);
    let request = &target.copy_requests()[0];
    assert_eq!(request.kms_key_id.as_deref(), Some("arn:aws:kms:us-west-2:1:key/dr"));
    let url = request.pre_signed_url.as_deref().unwrap();
    assert!(url.starts_with("https://rds.us-east-1.amazonaws.com/"));
    assert!(url.contains("X-Amz-Expires=100"));
}

#[tokio::test]
async fn test_one_failed_copy_does_not_stop_others() {
    let source = Arc::new(InMemoryRds::new(SOURCE));
    let target = Arc::new(InMemoryRds::new(TARGET));
    seed_instance(&source, "orders", 1);
    seed_instance(&source, "billing", 1);
    target.fail_on("copy_snapshot", "orders-2024-03-01-04-00-copyfrom-us-east-1");

    let mut driver = LoopDriver::new(config(), source, target.clone());
    let report = driver.run_once().await.unwrap();

    assert_eq!(report.dispatch.total(), 2);
    assert_eq!(report.dispatch.failed(), 1);
    assert_eq!(report.dispatch.completed(), 1);
    let failed = report
        .dispatch
        .results
        .iter()
        .find(|r| matches!(r.outcome, CopyOutcome::Failed(_)))
        .unwrap();
    assert_eq!(failed.instance, "orders");
    assert!(target.contains_snapshot("billing-2024-03-01-04-00-copyfrom-us-east-1"));
}

#[tokio::test]
async fn test_retention_keeps_newest_copies() {
    let source = Arc::new(InMemoryRds::new(SOURCE));
    let target = Arc::new(InMemoryRds::new(TARGET));
    seed_instance(&source, "orders", 1);

    let config = CopierConfig {
        max_snapshots: 2,
        ..config()
    };
    let mut driver = LoopDriver::new(config, source.clone(), target.clone());

    for day in 2..=4 {
        let snap_id = format!("rds:orders-2024-03-0{}-04-00", day);
        source.insert_snapshot(DbSnapshot::new(
            "orders",
            snap_id.clone(),
            format!("arn:aws:rds:us-east-1:1:snapshot:{}", snap_id),
            Some(Utc.with_ymd_and_hms(2024, 3, day, 4, 0, 0).unwrap()),
            SnapshotStatus::Available,
        ));
        driver.run_once().await.unwrap();
    }

    let mut copies: Vec<_> = target.snapshots().into_iter().map(|s| s.identifier).collect();
    copies.sort();
    assert_eq!(
        copies,
        vec![
            "orders-2024-03-03-04-00-copyfrom-us-east-1",
            "orders-2024-03-04-04-00-copyfrom-us-east-1",
        ]
    );
    assert_eq!(target.calls("delete_snapshot"), 1);
}

#[tokio::test]
async fn test_dry_run_touches_nothing() {
    let source = Arc::new(InMemoryRds::new(SOURCE));
    let target = Arc::new(InMemoryRds::new(TARGET));
    seed_instance(&source, "orders", 2);
    seed_instance(&source, "billing", 2);

    let config = CopierConfig {
        dry_run: true,
        max_snapshots: 1,
        ..config()
    };
    let mut driver = LoopDriver::new(config, source, target.clone());
    let report = driver.run_once().await.unwrap();

    assert_eq!(report.queued, 2);
    assert_eq!(report.dispatch.dry_run(), 2);
    assert_eq!(target.calls("copy_snapshot"), 0);
    assert_eq!(target.calls("delete_snapshot"), 0);
    assert!(target.snapshots().is_empty());
}
