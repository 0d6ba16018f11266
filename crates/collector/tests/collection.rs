// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Collection runs against in-memory servers and stores

use bytes::Bytes;
use chrono::{TimeZone, Utc};
use collector::testing::{
    ArchiveCall, MemoryConnector, MemorySession, RecordingArchive, TokioClock,
};
use collector::{
    Clock, CollectionRun, CollectorError, DEFAULT_TIME_ZONE, Endpoint, FileNamePolicy, FixedClock,
    Orchestrator, RemoteSession, ReplicationTarget, Replicator, RunOptions, RunOutcome, Secret,
    ServerProfile, ServerStatus, TransferError, TransferStage, parse_time_zone,
};
use std::sync::Arc;
use std::time::Duration;

fn endpoint(host: &str) -> Endpoint {
    Endpoint {
        host: host.to_string(),
        port: 22,
        user: "collector".to_string(),
        secret: Secret::new("hunter2"),
    }
}

fn profile(name: &str) -> ServerProfile {
    ServerProfile::new(name, endpoint(name), "/outgoing", "import")
}

fn new_year() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0)
        .single()
        .expect("valid time")
}

fn clock() -> Arc<FixedClock> {
    Arc::new(FixedClock::new(new_year()))
}

fn quick() -> RunOptions {
    RunOptions {
        pacing: Duration::ZERO,
        write_timeout: Duration::from_secs(5),
    }
}

fn collection(
    profile: ServerProfile,
    session: &Arc<MemorySession>,
    store: &Arc<RecordingArchive>,
    options: RunOptions,
) -> CollectionRun {
    collection_with_clock(profile, session, store, options, clock())
}

fn collection_with_clock(
    profile: ServerProfile,
    session: &Arc<MemorySession>,
    store: &Arc<RecordingArchive>,
    options: RunOptions,
    clock: Arc<dyn Clock>,
) -> CollectionRun {
    let time_zone = parse_time_zone(DEFAULT_TIME_ZONE).expect("known zone");
    let policy = FileNamePolicy::from_profile(&profile, time_zone).expect("valid profile");
    CollectionRun::new(
        profile,
        policy,
        Arc::clone(session) as Arc<dyn RemoteSession>,
        Arc::clone(store) as Arc<dyn collector::ArchiveStore>,
        clock,
        options,
    )
}

#[tokio::test]
async fn test_primary_failure_skips_copies_and_delete() -> anyhow::Result<()> {
    let session = Arc::new(MemorySession::new());
    session.add_file("/outgoing", "a.ic", "abc");
    let store = Arc::new(RecordingArchive::new());
    store.fail_write("import/a.ic");

    let mut profile = profile("airgate");
    profile.secondary_destination_dirs = vec!["raw".to_string(), "raw2".to_string()];
    profile.delete_on_success = true;

    let report = collection(profile, &session, &store, quick()).run().await?;

    assert!(store.copy_calls().is_empty());
    assert!(session.removed().is_empty());
    assert!(session.contains("/outgoing/a.ic"));
    assert!(matches!(
        report.outcome("a.ic"),
        Some(RunOutcome::ReplicationFailed {
            stage: TransferStage::PrimaryWrite,
            ..
        })
    ));
    Ok(())
}

#[tokio::test]
async fn test_second_of_three_copies_fails() -> anyhow::Result<()> {
    let session = MemorySession::new();
    session.add_file("/outgoing", "F20210101.ic", "cdr");
    let store = RecordingArchive::new();
    store.fail_copy("raw2/F20210101.ic");

    let target = ReplicationTarget::new(
        "import",
        "F20210101.ic",
        &["raw1".to_string(), "raw2".to_string(), "raw3".to_string()],
        "F20210101.ic",
    );
    let result = Replicator::default()
        .replicate(&session, &store, "/outgoing/F20210101.ic", &target)
        .await;

    match result {
        Err(err @ TransferError::SecondaryWrite { .. }) => {
            assert_eq!(err.target(), "raw2/F20210101.ic");
        }
        other => panic!("expected secondary write failure, got {other:?}"),
    }
    assert_eq!(
        store.copy_calls(),
        vec![
            ("import/F20210101.ic".to_string(), "raw1/F20210101.ic".to_string()),
            ("import/F20210101.ic".to_string(), "raw2/F20210101.ic".to_string()),
        ]
    );
    // No rollback of what already landed
    assert_eq!(store.get("import/F20210101.ic").await, Some(Bytes::from("cdr")));
    assert_eq!(store.get("raw1/F20210101.ic").await, Some(Bytes::from("cdr")));
    assert_eq!(store.get("raw2/F20210101.ic").await, None);
    Ok(())
}

#[tokio::test]
async fn test_copies_follow_primary_write() -> anyhow::Result<()> {
    let session = MemorySession::new();
    session.add_file("/outgoing", "a.ic", "abc");
    let store = RecordingArchive::new();
    let target = ReplicationTarget::new("import", "a.ic", &["raw".to_string()], "a.ic");

    let written = Replicator::default()
        .replicate(&session, &store, "/outgoing/a.ic", &target)
        .await?;

    assert_eq!(written, 3);
    assert_eq!(
        store.calls(),
        vec![
            ArchiveCall::Write("import/a.ic".to_string()),
            ArchiveCall::Copy {
                from: "import/a.ic".to_string(),
                to: "raw/a.ic".to_string(),
            },
        ]
    );
    assert_eq!(session.opened(), vec!["/outgoing/a.ic".to_string()]);
    Ok(())
}

#[tokio::test]
async fn test_failing_file_does_not_stop_run() -> anyhow::Result<()> {
    let session = Arc::new(MemorySession::new());
    for i in 1..=5 {
        session.add_file("/outgoing", &format!("file{i}.ic"), format!("data{i}"));
    }
    session.fail_open("/outgoing/file3.ic");
    let store = Arc::new(RecordingArchive::new());

    let report = collection(profile("airgate"), &session, &store, quick())
        .run()
        .await?;

    assert_eq!(session.opened().len(), 5);
    assert_eq!(report.outcomes.len(), 5);
    assert_eq!(report.replicated(), 4);
    assert_eq!(report.failed(), 1);
    assert!(matches!(
        report.outcome("file3.ic"),
        Some(RunOutcome::ReplicationFailed {
            stage: TransferStage::Open,
            ..
        })
    ));
    let names: Vec<&str> = report.outcomes.iter().map(|o| o.name.as_str()).collect();
    assert_eq!(
        names,
        vec!["file1.ic", "file2.ic", "file3.ic", "file4.ic", "file5.ic"]
    );
    Ok(())
}

#[tokio::test]
async fn test_delete_only_after_success() -> anyhow::Result<()> {
    let session = Arc::new(MemorySession::new());
    session.add_file("/outgoing", "good.ic", "ok");
    session.add_file("/outgoing", "bad.ic", "nope");
    let store = Arc::new(RecordingArchive::new());
    store.fail_write("import/bad.ic");

    let mut profile = profile("airgate");
    profile.delete_on_success = true;
    let report = collection(profile, &session, &store, quick()).run().await?;

    assert_eq!(session.removed(), vec!["/outgoing/good.ic".to_string()]);
    assert!(!session.contains("/outgoing/good.ic"));
    assert!(session.contains("/outgoing/bad.ic"));
    assert_eq!(report.replicated(), 1);
    assert_eq!(report.failed(), 1);
    Ok(())
}

#[tokio::test]
async fn test_delete_failure_is_recorded_not_fatal() -> anyhow::Result<()> {
    let session = Arc::new(MemorySession::new());
    session.add_file("/outgoing", "a.ic", "abc");
    session.add_file("/outgoing", "b.ic", "def");
    session.fail_remove("/outgoing/a.ic");
    let store = Arc::new(RecordingArchive::new());

    let mut profile = profile("airgate");
    profile.delete_on_success = true;
    let report = collection(profile, &session, &store, quick()).run().await?;

    assert!(matches!(
        report.outcome("a.ic"),
        Some(RunOutcome::DeleteFailed { .. })
    ));
    assert!(matches!(
        report.outcome("b.ic"),
        Some(RunOutcome::Replicated { .. })
    ));
    assert_eq!(report.replicated(), 2);
    assert_eq!(report.delete_failed(), 1);
    assert_eq!(store.get("import/a.ic").await, Some(Bytes::from("abc")));
    Ok(())
}

#[tokio::test]
async fn test_filter_end_to_end() -> anyhow::Result<()> {
    let session = Arc::new(MemorySession::new());
    session.add_file("/outgoing", "F20210101.ic", "cdr");
    session.add_file("/outgoing", "README.txt", "docs");
    let store = Arc::new(RecordingArchive::new());

    let mut profile = profile("airgate");
    profile.filename_filter = Some("^F2021".to_string());
    let report = collection(profile, &session, &store, quick()).run().await?;

    assert_eq!(store.write_calls(), vec!["import/F20210101.ic".to_string()]);
    assert_eq!(store.keys().await, vec!["import/F20210101.ic".to_string()]);
    assert_eq!(report.outcome("README.txt"), Some(&RunOutcome::FilteredOut));
    assert_eq!(session.opened(), vec!["/outgoing/F20210101.ic".to_string()]);
    Ok(())
}

#[tokio::test]
async fn test_rename_keeps_original_name_for_secondaries() -> anyhow::Result<()> {
    let session = Arc::new(MemorySession::new());
    session.add_file("/outgoing", "F20210101.ic", "cdr");
    let store = Arc::new(RecordingArchive::new());

    let mut profile = profile("airgate");
    profile.rename_enabled = true;
    profile.rename_prefix = Some("airgate".to_string());
    profile.secondary_destination_dirs = vec!["raw/airgate".to_string()];
    let report = collection(profile, &session, &store, quick()).run().await?;

    // 2021-01-01T00:00:00Z is 13:00 in Auckland
    assert_eq!(
        report.outcome("F20210101.ic"),
        Some(&RunOutcome::Replicated {
            primary_key: "import/airgate_20210101130000.ic".to_string(),
            bytes: 3,
        })
    );
    assert_eq!(
        store.keys().await,
        vec![
            "import/airgate_20210101130000.ic".to_string(),
            "raw/airgate/F20210101.ic".to_string(),
        ]
    );
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_paced_renames_get_distinct_names() -> anyhow::Result<()> {
    let session = Arc::new(MemorySession::new());
    session.add_file("/outgoing", "a.ic", "AAA");
    session.add_file("/outgoing", "b.ic", "BBB");
    let store = Arc::new(RecordingArchive::new());

    let mut profile = profile("airgate");
    profile.rename_enabled = true;
    profile.rename_prefix = Some("airgate".to_string());
    profile.delete_on_success = true;
    let options = RunOptions {
        pacing: Duration::from_secs(1),
        write_timeout: Duration::from_secs(20),
    };
    let clock = Arc::new(TokioClock::new(new_year()));
    let report = collection_with_clock(profile, &session, &store, options, clock)
        .run()
        .await?;

    // 13:00:00 and 13:00:01 in Auckland, one pacing pause apart
    assert_eq!(
        report.outcome("a.ic"),
        Some(&RunOutcome::Replicated {
            primary_key: "import/airgate_20210101130000.ic".to_string(),
            bytes: 3,
        })
    );
    assert_eq!(
        report.outcome("b.ic"),
        Some(&RunOutcome::Replicated {
            primary_key: "import/airgate_20210101130001.ic".to_string(),
            bytes: 3,
        })
    );
    assert_eq!(
        store.get("import/airgate_20210101130000.ic").await,
        Some(Bytes::from("AAA"))
    );
    assert_eq!(
        store.get("import/airgate_20210101130001.ic").await,
        Some(Bytes::from("BBB"))
    );
    assert_eq!(session.removed().len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_every_secondary_receives_every_file() -> anyhow::Result<()> {
    let session = Arc::new(MemorySession::new());
    session.add_file("/outgoing", "a.ic", "abc");
    session.add_file("/outgoing", "b.ic", "def");
    session.add_file("/outgoing", "notes.txt", "skip");
    let store = Arc::new(RecordingArchive::new());

    let mut profile = profile("airgate");
    profile.filename_filter = Some(r"\.ic$".to_string());
    profile.secondary_destination_dirs = vec!["raw".to_string(), "backup".to_string()];
    let report = collection(profile, &session, &store, quick()).run().await?;

    assert_eq!(report.replicated(), 2);
    assert_eq!(
        store.keys().await,
        vec![
            "backup/a.ic".to_string(),
            "backup/b.ic".to_string(),
            "import/a.ic".to_string(),
            "import/b.ic".to_string(),
            "raw/a.ic".to_string(),
            "raw/b.ic".to_string(),
        ]
    );
    assert_eq!(store.get("backup/b.ic").await, Some(Bytes::from("def")));
    Ok(())
}

#[tokio::test]
async fn test_directories_are_not_transferred() -> anyhow::Result<()> {
    let session = Arc::new(MemorySession::new());
    session.add_directory("/outgoing", "archive");
    session.add_file("/outgoing", "a.ic", "abc");
    let store = Arc::new(RecordingArchive::new());

    let report = collection(profile("airgate"), &session, &store, quick())
        .run()
        .await?;

    assert_eq!(report.outcome("archive"), Some(&RunOutcome::FilteredOut));
    assert_eq!(session.opened(), vec!["/outgoing/a.ic".to_string()]);
    Ok(())
}

#[tokio::test]
async fn test_listing_failure_is_reported() {
    let session = Arc::new(MemorySession::new());
    session.fail_list("/outgoing");
    let store = Arc::new(RecordingArchive::new());

    let result = collection(profile("airgate"), &session, &store, quick())
        .run()
        .await;
    assert!(matches!(result, Err(CollectorError::List { .. })));
    assert!(store.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_pacing_between_files() -> anyhow::Result<()> {
    let session = Arc::new(MemorySession::new());
    for name in ["a.ic", "b.ic", "c.ic"] {
        session.add_file("/outgoing", name, "x");
    }
    let store = Arc::new(RecordingArchive::new());
    let options = RunOptions {
        pacing: Duration::from_secs(1),
        write_timeout: Duration::from_secs(20),
    };

    let started = tokio::time::Instant::now();
    let report = collection(profile("airgate"), &session, &store, options)
        .run()
        .await?;
    let elapsed = started.elapsed();

    assert_eq!(report.replicated(), 3);
    // Two pauses: between a and b, between b and c
    assert!(elapsed >= Duration::from_secs(2), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_secs(3), "elapsed {elapsed:?}");
    Ok(())
}

#[tokio::test]
async fn test_unreachable_server_does_not_block_others() {
    let connector = Arc::new(MemoryConnector::new());
    let alpha = connector.add_host("alpha");
    alpha.add_file("/outgoing", "a.ic", "abc");
    connector.refuse("beta");
    let gamma = connector.add_host("gamma");
    gamma.add_file("/outgoing", "c.ic", "ghi");
    let store = Arc::new(RecordingArchive::new());

    let profiles = ["alpha", "beta", "gamma"]
        .iter()
        .map(|name| ServerProfile::new(*name, endpoint(name), "/outgoing", format!("import/{name}")))
        .collect();
    let orchestrator = Orchestrator::new(
        Arc::clone(&connector) as Arc<dyn collector::SessionConnector>,
        Arc::clone(&store) as Arc<dyn collector::ArchiveStore>,
        clock(),
        parse_time_zone(DEFAULT_TIME_ZONE).expect("known zone"),
    )
    .with_options(quick());

    let report = tokio::time::timeout(Duration::from_secs(10), orchestrator.run_all(profiles))
        .await
        .expect("orchestrator finished");

    assert!(matches!(report.get("alpha"), Some(ServerStatus::Completed(_))));
    assert!(matches!(
        report.get("beta"),
        Some(ServerStatus::Skipped(CollectorError::Connection { .. }))
    ));
    assert!(matches!(report.get("gamma"), Some(ServerStatus::Completed(_))));
    assert_eq!(
        store.keys().await,
        vec!["import/alpha/a.ic".to_string(), "import/gamma/c.ic".to_string()]
    );
}
