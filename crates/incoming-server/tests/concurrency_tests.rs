//! Concurrent runs over the same file name

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{remote_path, FakeSource, Harness, MemoryLedger, MemoryLoader, CALL_LOG};
use incoming_server::ingest::{ImportLedger, IngestStatus};

const NAME: &str = "2025-10-17_VocalCom_Incoming.csv";

/// Check-then-write on the ledger alone does not exclude a second run
#[tokio::test]
async fn test_ledger_check_alone_races() {
    let ledger = MemoryLedger::new();

    let first = ledger.already_imported(NAME).await.unwrap();
    let second = ledger.already_imported(NAME).await.unwrap();
    assert!(!first && !second);

    assert!(ledger.log_import(NAME).await.unwrap());
    assert!(!ledger.log_import(NAME).await.unwrap(), "second write is a no-op");
}

#[tokio::test]
async fn test_concurrent_runs_load_once() {
    let remote = FakeSource::new().with_file(&remote_path(NAME), CALL_LOG);
    let h = Harness::build(
        remote,
        MemoryLedger::new(),
        MemoryLoader::new().with_delay(Duration::from_millis(20)),
    );

    let a = {
        let orchestrator = h.orchestrator.clone();
        tokio::spawn(async move { orchestrator.ingest_remote_path(&remote_path(NAME)).await })
    };
    let b = {
        let orchestrator = h.orchestrator.clone();
        tokio::spawn(async move { orchestrator.ingest_remote_path(&remote_path(NAME)).await })
    };

    let (a, b) = (a.await.unwrap(), b.await.unwrap());
    let mut statuses = vec![a.status, b.status];
    statuses.sort_by_key(|s| format!("{:?}", s));

    assert_eq!(statuses, vec![IngestStatus::Skipped, IngestStatus::Success]);
    assert_eq!(h.loader.row_count(), 5);
    assert_eq!(h.remote.reads(), 1);
}

#[tokio::test]
async fn test_different_files_run_in_parallel() {
    let remote = FakeSource::new()
        .with_file(&remote_path("a.csv"), CALL_LOG)
        .with_file(&remote_path("b.csv"), CALL_LOG);
    let h = Harness::build(
        remote,
        MemoryLedger::new(),
        MemoryLoader::new().with_delay(Duration::from_millis(50)),
    );

    let orchestrator = Arc::clone(&h.orchestrator);
    let path_a = remote_path("a.csv");
    let path_b = remote_path("b.csv");
    let (a, b) = tokio::join!(
        orchestrator.ingest_remote_path(&path_a),
        orchestrator.ingest_remote_path(&path_b),
    );

    assert!(a.is_success() && b.is_success());
    assert_eq!(h.loader.row_count(), 10);
    assert_eq!(h.ledger.len(), 2);
}
