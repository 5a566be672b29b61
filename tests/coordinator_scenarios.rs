//! End-to-end coordinator scenarios covering enumeration ordering, ghost
//! linking, quota rotation, abort, and retry exhaustion.

mod common;

use common::{file, wait_for_terminal, FakeMover};
use conveyor::classify::Ruleset;
use conveyor::coordinator::job::JobOptions;
use conveyor::coordinator::Coordinator;
use conveyor::credential::{CredentialPool, SecretBlob};
use conveyor::model::{Provider, Quota};
use std::sync::Arc;
use std::time::Duration;

const TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Small local tree, no credentials: noise is ignored, both real files
/// transfer, largest dispatched first.
#[tokio::test]
async fn test_s1_small_tree_no_credentials() {
    let mover = Arc::new(
        FakeMover::new().with_manifest(
            "local-src",
            vec![
                file("a.txt", 100),
                file("b.mp4", 10 * 1024 * 1024),
                file(".DS_Store", 6 * 1024),
            ],
        ),
    );
    let pool = CredentialPool::new(-8);
    let coordinator = Coordinator::spawn(mover.clone(), pool, Ruleset::Default, 3);

    coordinator
        .start("local-src".to_string(), "local-dst".to_string(), JobOptions { workers: Some(1), ..Default::default() })
        .await
        .expect("start should succeed");

    let snap = wait_for_terminal(&coordinator, TEST_TIMEOUT).await;
    assert_eq!(snap.status, "completed");
    assert_eq!(snap.completed, 2);
    assert_eq!(snap.failed, 0);

    // b.mp4 (10 MB) is larger than a.txt (100 B); largest-first means it
    // was dispatched before a.txt.
    let copies = mover.copies();
    assert_eq!(copies[0], "b.mp4");
}

/// Largest-first ordering under 2 workers: the two largest files dispatch
/// before the smallest.
#[tokio::test]
async fn test_s2_largest_first_two_workers() {
    let mover = Arc::new(FakeMover::new().with_manifest(
        "local-src",
        vec![
            file("huge.bin", 5 * 1024 * 1024 * 1024 - 1),
            file("big.bin", 1024 * 1024 * 1024),
            file("small.bin", 100 * 1024 * 1024),
        ],
    ));
    let pool = CredentialPool::new(-8);
    let coordinator = Coordinator::spawn(mover.clone(), pool, Ruleset::Default, 3);

    coordinator
        .start("local-src".to_string(), "local-dst".to_string(), JobOptions { workers: Some(2), ..Default::default() })
        .await
        .expect("start should succeed");

    let snap = wait_for_terminal(&coordinator, TEST_TIMEOUT).await;
    assert_eq!(snap.status, "completed");
    assert_eq!(snap.completed, 3);

    let copies = mover.copies();
    let first_two: std::collections::HashSet<_> = copies[..2].iter().cloned().collect();
    assert!(first_two.contains("huge.bin"));
    assert!(first_two.contains("big.bin"));
    assert_eq!(copies[2], "small.bin");
}

/// Ghost link at the 5 GiB boundary: only the file at exactly the
/// threshold transfers; one byte over is ghost-linked instead.
#[tokio::test]
async fn test_s3_ghost_link_boundary() {
    let threshold = 5u64 * 1024 * 1024 * 1024;
    let mover = Arc::new(
        FakeMover::new().with_manifest("local-src", vec![file("at_threshold.bin", threshold), file("over_threshold.bin", threshold + 1)]),
    );
    let pool = CredentialPool::new(-8);
    let coordinator = Coordinator::spawn(mover.clone(), pool, Ruleset::Default, 3);

    coordinator
        .start("local-src".to_string(), "local-dst".to_string(), JobOptions { workers: Some(1), ..Default::default() })
        .await
        .expect("start should succeed");

    let snap = wait_for_terminal(&coordinator, TEST_TIMEOUT).await;
    assert_eq!(snap.status, "completed");
    assert_eq!(snap.completed, 1);

    let copies = mover.copies();
    assert_eq!(copies, vec!["at_threshold.bin".to_string()]);
}

/// Quota rotation: two gdrive credentials at 1 GB each; a manifest of
/// three 600 MB files. By completion neither credential exceeds its 95%
/// safety margin.
#[tokio::test]
async fn test_s4_quota_rotation_respects_safety_margin() {
    let size = 600 * 1024 * 1024u64;
    let mover = Arc::new(FakeMover::new().with_manifest("local-src", vec![file("f1.bin", size), file("f2.bin", size), file("f3.bin", size)]));

    let pool = CredentialPool::new(-8);
    pool.add(Provider::Gdrive, SecretBlob(vec![1]), Some("a".into()), Quota::Limited(1_000_000_000)).await;
    pool.add(Provider::Gdrive, SecretBlob(vec![2]), Some("b".into()), Quota::Limited(1_000_000_000)).await;

    let coordinator = Coordinator::spawn(mover.clone(), pool.clone(), Ruleset::Default, 3);

    coordinator
        .start("local-src".to_string(), "gdrive:Backups/2024".to_string(), JobOptions { workers: Some(2), ..Default::default() })
        .await
        .expect("start should succeed");

    let _ = wait_for_terminal(&coordinator, TEST_TIMEOUT).await;

    let margin = (1_000_000_000f64 * 0.95).floor() as u64;
    for snap in pool.status().await {
        assert!(snap.bytes_used_today <= margin, "credential {} exceeded its safety margin", snap.id);
    }
}

/// The destination is a real fs string (`"provider:path"`, not a bare
/// provider name), so the provider tag must be parsed out of it rather
/// than matched against the whole string: worker-count derivation should
/// still find the registered credentials for that provider.
#[tokio::test]
async fn test_destination_fs_string_with_path_resolves_provider() {
    let mover = Arc::new(FakeMover::new().with_manifest(
        "local-src",
        vec![file("f1.bin", 10), file("f2.bin", 10), file("f3.bin", 10)],
    ));

    let pool = CredentialPool::new(-8);
    pool.add(Provider::Gdrive, SecretBlob(vec![1]), Some("a".into()), Quota::Unlimited).await;
    pool.add(Provider::Gdrive, SecretBlob(vec![2]), Some("b".into()), Quota::Unlimited).await;
    pool.add(Provider::Gdrive, SecretBlob(vec![3]), Some("c".into()), Quota::Unlimited).await;

    let coordinator = Coordinator::spawn(mover.clone(), pool.clone(), Ruleset::Default, 3);

    coordinator
        .start("local-src".to_string(), "gdrive:Backups/2024".to_string(), JobOptions { workers: None, ..Default::default() })
        .await
        .expect("start should succeed");

    let _ = wait_for_terminal(&coordinator, TEST_TIMEOUT).await;
    let snap = coordinator.status().await;
    assert_eq!(snap.completed, 3);

    // The credential pool itself must resolve the same fs string to the
    // provider that has credentials registered, not to `Unknown`.
    assert_eq!(pool.count_for(&Provider::from_fs("gdrive:Backups/2024")).await, 3);
    assert_eq!(pool.count_for(&Provider::from_fs("gdrive:Backups/2024")).await, pool.count_for(&Provider::Gdrive).await);
}

/// Abort mid-flight: issuing abort drops the queue and empties the worker
/// set within a bounded delay.
#[tokio::test]
async fn test_s5_abort_mid_flight() {
    let files: Vec<_> = (0..100).map(|i| file(&format!("f{i}.bin"), 1024)).collect();
    let mover = Arc::new(FakeMover::new().with_manifest("local-src", files));
    let pool = CredentialPool::new(-8);
    let coordinator = Coordinator::spawn(mover.clone(), pool, Ruleset::Default, 3);

    coordinator
        .start("local-src".to_string(), "local-dst".to_string(), JobOptions { workers: Some(4), ..Default::default() })
        .await
        .expect("start should succeed");

    // Let a handful complete before aborting.
    loop {
        if mover.copy_count() >= 4 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    coordinator.abort().await.expect("abort should succeed while running");

    tokio::time::sleep(Duration::from_millis(200)).await;
    let snap = coordinator.status().await;
    assert_eq!(snap.status, "aborted");
    assert_eq!(snap.queued, 0);
    assert_eq!(snap.active_workers, 0);
}

/// Retry exhaustion: a file whose copy always fails is retried exactly up
/// to the retry budget, then recorded as a permanent failure without
/// blocking the rest of the job.
#[tokio::test]
async fn test_s6_retry_exhaustion() {
    let mover = Arc::new(
        FakeMover::new()
            .with_manifest("local-src", vec![file("flaky.bin", 1024), file("fine.bin", 512)])
            .fail_path_forever("flaky.bin"),
    );
    let pool = CredentialPool::new(-8);
    let coordinator = Coordinator::spawn(mover.clone(), pool, Ruleset::Default, 3);

    coordinator
        .start("local-src".to_string(), "local-dst".to_string(), JobOptions { workers: Some(1), ..Default::default() })
        .await
        .expect("start should succeed");

    // Backoff schedule is 1s/5s before the 2nd/3rd attempts.
    let snap = wait_for_terminal(&coordinator, Duration::from_secs(30)).await;
    assert_eq!(snap.status, "completed");
    assert_eq!(snap.completed, 1);
    assert_eq!(snap.failed, 1);
    assert_eq!(snap.failed_files[0].path, "flaky.bin");
    assert_eq!(snap.failed_files[0].attempts, 3);

    // Exactly 3 attempts at the flaky file, plus 1 for the unrelated file.
    let flaky_attempts = mover.copies().iter().filter(|p| p.as_str() == "flaky.bin").count();
    assert_eq!(flaky_attempts, 3);
}

/// `add` followed by `checkout(provider, 0)` returns the same credential
/// when it is the only one registered.
#[tokio::test]
async fn test_add_then_checkout_zero_bytes_roundtrip() {
    let pool = CredentialPool::new(-8);
    let id = pool.add(Provider::S3, SecretBlob(vec![9]), None, Quota::Unlimited).await;

    match pool.checkout(&Provider::S3, 0).await {
        conveyor::credential::Checkout::Granted(snap) => assert_eq!(snap.id, id),
        other => panic!("expected Granted, got {:?}", other),
    }
}

/// `start` while a job is already running returns `transfer_in_progress`
/// rather than starting a second job.
#[tokio::test]
async fn test_at_most_one_active_job() {
    let mover = Arc::new(FakeMover::new().with_manifest("local-src", vec![file("f.bin", 1024 * 1024 * 1024)]));
    let pool = CredentialPool::new(-8);
    let coordinator = Coordinator::spawn(mover, pool, Ruleset::Default, 3);

    coordinator
        .start("local-src".to_string(), "local-dst".to_string(), JobOptions { workers: Some(1), ..Default::default() })
        .await
        .expect("first start should succeed");

    let second = coordinator.start("local-src".to_string(), "local-dst".to_string(), JobOptions::default()).await;
    assert!(matches!(second, Err(conveyor::error::CoordinatorError::TransferInProgress)));
}

/// Dry-run short-circuits after enumeration/classification with zero
/// transfer side effects (no copy calls issued).
#[tokio::test]
async fn test_dry_run_has_no_side_effects() {
    let mover = Arc::new(FakeMover::new().with_manifest("local-src", vec![file("a.txt", 100), file("b.bin", 200)]));
    let pool = CredentialPool::new(-8);
    let coordinator = Coordinator::spawn(mover.clone(), pool, Ruleset::Default, 3);

    coordinator
        .start(
            "local-src".to_string(),
            "local-dst".to_string(),
            JobOptions { dry_run: true, ..Default::default() },
        )
        .await
        .expect("dry run start should succeed");

    let snap = wait_for_terminal(&coordinator, TEST_TIMEOUT).await;
    assert_eq!(snap.status, "dry_run_complete");
    assert_eq!(mover.copy_count(), 0);
}
