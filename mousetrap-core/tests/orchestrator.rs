mod support;

use std::sync::Arc;
use std::time::Duration;

use mousetrap_contracts::{Notifier, TaskStore};
use mousetrap_core::infra::{InMemoryStorage, InMemoryTaskStore};
use mousetrap_core::orchestration::{
    ClaimOutcome, NotifierSet, OrchestratorConfig, StaleTaskReaper,
    TaskClaimer, TaskOrchestrator, now_millis,
};
use mousetrap_model::{
    NewTask, RESULT_TAG, ScanResult, ScanState, Task, TaskTransition, Verdict,
};
use tokio_util::sync::CancellationToken;

use support::{
    DEFAULT_CHANNEL, FailingNotifier, Harness, MissingTableStore,
    RecordingNotifier, ScriptedEngine, TagFailingStorage, fast_config,
    megabyte,
};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_claims_have_exactly_one_winner() {
    const WORKERS: usize = 8;

    let store = InMemoryTaskStore::new();
    let storage = InMemoryStorage::new();
    storage.put("s3://bucket/a.csv", megabyte()).await;
    store
        .create(
            NewTask {
                file_path: "s3://bucket/a.csv".into(),
                size_mb: 1.0,
                file_hash: "etag".into(),
                notify_channels: vec![],
            },
            now_millis(),
        )
        .await
        .unwrap();
    let snapshot = store.list_by_states(&[ScanState::Pending]).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..WORKERS {
        let claimer = TaskClaimer::new(
            Arc::new(store.clone()),
            Arc::new(storage.clone()),
            NotifierSet::default(),
        );
        let snapshot = snapshot.clone();
        handles.push(tokio::spawn(async move {
            claimer.claim_next(&snapshot).await.unwrap()
        }));
    }

    let mut claimed = 0;
    let mut lost = 0;
    for handle in handles {
        match handle.await.unwrap() {
            ClaimOutcome::Claimed(_) => claimed += 1,
            ClaimOutcome::RaceLost(_) => lost += 1,
            other => panic!("unexpected outcome {other:?}"),
        }
    }
    assert_eq!(claimed, 1);
    assert_eq!(lost, WORKERS - 1);

    let row = store.get("s3://bucket/a.csv").await.unwrap().unwrap();
    assert_eq!(row.scan_state, ScanState::Scanning);
}

#[tokio::test]
async fn claims_oldest_pending_first() {
    let harness = Harness::new(ScriptedEngine::new(Verdict::Clean));
    for path in ["s3://bucket/new", "s3://bucket/old"] {
        harness.storage.put(path, b"data".to_vec()).await;
    }
    harness.seed_pending("s3://bucket/new", 200).await;
    harness.seed_pending("s3://bucket/old", 100).await;

    let report = harness.orchestrator.tick().await.unwrap();
    let claimed = report.claim.as_ref().and_then(ClaimOutcome::claimed).unwrap();
    assert_eq!(claimed.file_path, "s3://bucket/old");
    harness.orchestrator.wait_idle().await;
}

#[tokio::test]
async fn stale_task_is_reclaimed_without_counting_an_attempt() {
    let config = OrchestratorConfig {
        stale_after_ms: 5_000,
        ..fast_config()
    };
    let harness =
        Harness::with_config(ScriptedEngine::new(Verdict::Clean), config);
    harness.storage.put("s3://bucket/stuck", b"data".to_vec()).await;
    harness.seed_pending("s3://bucket/stuck", 1).await;
    harness
        .store
        .transition(
            "s3://bucket/stuck",
            TaskTransition::claim(now_millis() - 10_000),
        )
        .await
        .unwrap();

    let report = harness.orchestrator.tick().await.unwrap();
    assert_eq!(report.reclaimed, 1);
    assert_eq!(report.claim, Some(ClaimOutcome::NothingPending));

    let row = harness.task("s3://bucket/stuck").await.unwrap();
    assert_eq!(row.scan_state, ScanState::Pending);
    assert_eq!(row.scan_attempts, 0);

    let report = harness.orchestrator.tick().await.unwrap();
    assert!(matches!(report.claim, Some(ClaimOutcome::Claimed(ref t)) if t.file_path == "s3://bucket/stuck"));
    harness.orchestrator.wait_idle().await;
    let row = harness.task("s3://bucket/stuck").await.unwrap();
    assert_eq!(row.scan_state, ScanState::Finished);
    assert_eq!(row.scan_attempts, 1);
}

#[tokio::test]
async fn fresh_scanning_task_is_left_alone() {
    let harness = Harness::new(ScriptedEngine::new(Verdict::Clean));
    harness.seed_pending("s3://bucket/busy", 1).await;
    harness
        .store
        .transition("s3://bucket/busy", TaskTransition::claim(now_millis()))
        .await
        .unwrap();

    let report = harness.orchestrator.tick().await.unwrap();
    assert_eq!(report.reclaimed, 0);
    assert_eq!(report.scanning, 1);
    let row = harness.task("s3://bucket/busy").await.unwrap();
    assert_eq!(row.scan_state, ScanState::Scanning);
}

#[tokio::test]
async fn reaper_skips_rows_finished_after_the_listing() {
    let harness = Harness::new(ScriptedEngine::new(Verdict::Clean));
    harness.seed_pending("s3://bucket/a", 1).await;
    harness.seed_pending("s3://bucket/b", 1).await;
    for path in ["s3://bucket/a", "s3://bucket/b"] {
        harness
            .store
            .transition(path, TaskTransition::claim(10))
            .await
            .unwrap();
    }
    let listing = harness
        .store
        .list_by_states(&[ScanState::Scanning])
        .await
        .unwrap();
    assert_eq!(listing.len(), 2);

    // The owning worker commits "a" after the listing was taken.
    harness
        .store
        .set_terminal("s3://bucket/a", ScanResult::Clean, &[], 500)
        .await
        .unwrap();

    let reaper = StaleTaskReaper::new(Arc::new(harness.store.clone()), 100, 5);
    assert_eq!(reaper.reap(&listing, 1_000).await, 1);

    let a = harness.task("s3://bucket/a").await.unwrap();
    assert_eq!(a.scan_state, ScanState::Finished);
    assert_eq!(a.scan_result, ScanResult::Clean);
    let b = harness.task("s3://bucket/b").await.unwrap();
    assert_eq!(b.scan_state, ScanState::Pending);
    assert_eq!(b.scan_attempts, 0);
}

#[tokio::test]
async fn file_deleted_before_claim_leaves_row_untouched() {
    let harness = Harness::new(ScriptedEngine::new(Verdict::Clean));
    harness.storage.put("s3://bucket/gone", b"data".to_vec()).await;
    harness.seed_pending("s3://bucket/gone", 1).await;
    harness.storage.remove("s3://bucket/gone").await;

    let report = harness.orchestrator.tick().await.unwrap();
    assert_eq!(
        report.claim,
        Some(ClaimOutcome::FileMissing("s3://bucket/gone".into()))
    );
    assert!(!harness.orchestrator.slot().is_busy());

    let row = harness.task("s3://bucket/gone").await.unwrap();
    assert_eq!(row.scan_state, ScanState::Pending);
    assert_eq!(row.scan_start_ts, -1);

    let errors = harness.notifier.errors().await;
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].1.error.code, "FILE_NOT_EXIST");
    assert_eq!(harness.engine.calls(), 0);
}

#[tokio::test]
async fn scan_past_deadline_fails_with_one_attempt() {
    let config = OrchestratorConfig {
        scan_timeout_ms: 50,
        ..fast_config()
    };
    let engine =
        ScriptedEngine::new(Verdict::Clean).with_delay(Duration::from_secs(5));
    let harness = Harness::with_config(engine, config);
    harness.storage.put("s3://bucket/slow", megabyte()).await;
    harness.seed_pending("s3://bucket/slow", 1).await;

    harness.orchestrator.tick().await.unwrap();
    harness.orchestrator.wait_idle().await;

    let row = harness.task("s3://bucket/slow").await.unwrap();
    assert_eq!(row.scan_state, ScanState::Failed);
    assert_eq!(row.scan_attempts, 1);
    assert_ne!(row.scan_result, ScanResult::Clean);
    assert_ne!(row.scan_end_ts, -1);
    assert_eq!(harness.engine.completed(), 0);

    let tags = harness.storage.tags("s3://bucket/slow").await.unwrap();
    assert_eq!(tags[RESULT_TAG], "FAILED");
    let scans = harness.notifier.scans().await;
    assert_eq!(scans.len(), 1);
    assert_eq!(scans[0].1.scan_result, ScanResult::Failed);
}

#[tokio::test]
async fn indeterminate_verdict_is_a_failure() {
    let harness = Harness::new(ScriptedEngine::new(Verdict::Indeterminate));
    harness.storage.put("s3://bucket/odd", b"data".to_vec()).await;
    harness.seed_pending("s3://bucket/odd", 1).await;

    harness.orchestrator.tick().await.unwrap();
    harness.orchestrator.wait_idle().await;

    let row = harness.task("s3://bucket/odd").await.unwrap();
    assert_eq!(row.scan_state, ScanState::Failed);
    assert_eq!(row.scan_result, ScanResult::Pending);
}

#[tokio::test]
async fn failed_result_is_recorded_when_configured() {
    let config = OrchestratorConfig {
        record_failed_result: true,
        ..fast_config()
    };
    let harness =
        Harness::with_config(ScriptedEngine::new(Verdict::Indeterminate), config);
    harness.storage.put("s3://bucket/odd", b"data".to_vec()).await;
    harness.seed_pending("s3://bucket/odd", 1).await;

    harness.orchestrator.tick().await.unwrap();
    harness.orchestrator.wait_idle().await;

    let row = harness.task("s3://bucket/odd").await.unwrap();
    assert_eq!(row.scan_result, ScanResult::Failed);
}

#[tokio::test]
async fn shutdown_reverts_in_flight_task() {
    let engine =
        ScriptedEngine::new(Verdict::Clean).with_delay(Duration::from_secs(30));
    let harness = Harness::new(engine);
    harness.storage.put("s3://bucket/long", megabyte()).await;
    harness.seed_pending("s3://bucket/long", 1).await;

    let report = harness.orchestrator.tick().await.unwrap();
    assert!(report.claim.as_ref().and_then(ClaimOutcome::claimed).is_some());
    assert_eq!(
        harness.orchestrator.current_task().map(|t| t.file_path),
        Some("s3://bucket/long".to_string())
    );

    harness.orchestrator.shutdown().await;

    let row = harness.task("s3://bucket/long").await.unwrap();
    assert_eq!(row.scan_state, ScanState::Pending);
    assert_eq!(row.scan_attempts, 0);
    assert_eq!(harness.engine.completed(), 0);
}

#[tokio::test]
async fn run_stops_on_cancel_and_reverts() {
    let engine =
        ScriptedEngine::new(Verdict::Clean).with_delay(Duration::from_secs(30));
    let harness = Arc::new(Harness::new(engine));
    harness.storage.put("s3://bucket/long", megabyte()).await;
    harness.seed_pending("s3://bucket/long", 1).await;

    let token = CancellationToken::new();
    let runner = {
        let harness = Arc::clone(&harness);
        let token = token.clone();
        tokio::spawn(async move { harness.orchestrator.run(token).await })
    };

    let mut rx = harness.orchestrator.slot().subscribe();
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(Option::is_some))
        .await
        .expect("scan should start")
        .unwrap();

    token.cancel();
    runner.await.unwrap().unwrap();

    let row = harness.task("s3://bucket/long").await.unwrap();
    assert_eq!(row.scan_state, ScanState::Pending);
}

#[tokio::test]
async fn busy_worker_skips_claiming_and_backs_off() {
    let engine =
        ScriptedEngine::new(Verdict::Clean).with_delay(Duration::from_secs(30));
    let harness = Harness::new(engine);
    for path in ["s3://bucket/first", "s3://bucket/second"] {
        harness.storage.put(path, b"data".to_vec()).await;
    }
    harness.seed_pending("s3://bucket/first", 1).await;
    harness.seed_pending("s3://bucket/second", 2).await;

    let idle_interval = harness.orchestrator.next_interval();
    harness.orchestrator.tick().await.unwrap();
    assert_eq!(harness.orchestrator.next_interval(), idle_interval * 5);

    let report = harness.orchestrator.tick().await.unwrap();
    assert_eq!(report.claim, None);
    assert_eq!(report.pending, 1);
    let row = harness.task("s3://bucket/second").await.unwrap();
    assert_eq!(row.scan_state, ScanState::Pending);

    harness.orchestrator.shutdown().await;
}

#[tokio::test]
async fn tag_and_notify_failures_do_not_reopen_the_task() {
    let storage = InMemoryStorage::new();
    let wrapped = Arc::new(TagFailingStorage(storage.clone()));
    let harness =
        Harness::with_storage(ScriptedEngine::new(Verdict::Clean), storage, wrapped);
    harness.storage.put("s3://bucket/a.csv", b"data".to_vec()).await;
    harness.seed_pending("s3://bucket/a.csv", 1).await;

    harness.orchestrator.tick().await.unwrap();
    harness.orchestrator.wait_idle().await;

    let row = harness.task("s3://bucket/a.csv").await.unwrap();
    assert_eq!(row.scan_state, ScanState::Finished);
    assert_eq!(row.scan_result, ScanResult::Clean);
    assert_eq!(harness.notifier.scans().await.len(), 1);
}

#[tokio::test]
async fn failing_notifier_is_swallowed() {
    let store = InMemoryTaskStore::new();
    let storage = InMemoryStorage::new();
    storage.put("s3://bucket/a.csv", b"data".to_vec()).await;
    store
        .create(
            NewTask {
                file_path: "s3://bucket/a.csv".into(),
                size_mb: 0.0,
                file_hash: "etag".into(),
                notify_channels: vec![],
            },
            1,
        )
        .await
        .unwrap();
    let recording = Arc::new(RecordingNotifier::default());
    let notifiers = NotifierSet::new(vec![
        Arc::new(FailingNotifier) as Arc<dyn Notifier>,
        recording.clone(),
    ]);
    let orchestrator = TaskOrchestrator::new(
        fast_config(),
        Arc::new(store.clone()),
        Arc::new(storage),
        Arc::new(ScriptedEngine::new(Verdict::Clean)),
        notifiers,
    );

    orchestrator.tick().await.unwrap();
    orchestrator.wait_idle().await;

    let row: Task = store.get("s3://bucket/a.csv").await.unwrap().unwrap();
    assert_eq!(row.scan_state, ScanState::Finished);
    // The failing provider's default channel is the only merged channel and
    // the recording provider does not own it.
    assert!(recording.scans().await.is_empty());
}

#[tokio::test]
async fn missing_table_stops_the_scheduler() {
    let orchestrator = TaskOrchestrator::new(
        fast_config(),
        Arc::new(MissingTableStore),
        Arc::new(InMemoryStorage::new()),
        Arc::new(ScriptedEngine::new(Verdict::Clean)),
        NotifierSet::default(),
    );

    let err = tokio::time::timeout(
        Duration::from_secs(5),
        orchestrator.run(CancellationToken::new()),
    )
    .await
    .expect("fatal error should stop the loop")
    .unwrap_err();
    assert!(err.is_fatal());
}

#[tokio::test]
async fn merged_channels_receive_one_notification_each() {
    let harness = Harness::new(ScriptedEngine::new(Verdict::Clean));
    harness.storage.put("s3://bucket/a.csv", b"data".to_vec()).await;
    harness
        .store
        .create(
            NewTask {
                file_path: "s3://bucket/a.csv".into(),
                size_mb: 0.0,
                file_hash: "etag".into(),
                notify_channels: vec![
                    "https://hooks.test/team".into(),
                    DEFAULT_CHANNEL.into(),
                ],
            },
            1,
        )
        .await
        .unwrap();

    harness.orchestrator.tick().await.unwrap();
    harness.orchestrator.wait_idle().await;

    let channels: Vec<String> = harness
        .notifier
        .scans()
        .await
        .into_iter()
        .map(|(channel, _)| channel)
        .collect();
    assert_eq!(channels, vec!["https://hooks.test/team", DEFAULT_CHANNEL]);
}
