//! In-memory stand-ins for the ingestion seams
//!
//! - [`FakeSource`]: a file origin that can refuse reads with a permission error
//! - [`MemoryLedger`]: a set of imported file names
//! - [`MemoryLoader`]: collects appended chunks, optionally failing one of them
//! - [`Harness`]: an orchestrator wired to all three

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use incoming_server::ingest::config::PipelineConfig;
use incoming_server::ingest::models::{CleanedRecordBatch, SourceOrigin};
use incoming_server::ingest::source::SourceSession;
use incoming_server::ingest::{
    BatchLoader, ImportLedger, IngestOrchestrator, SourceConnector, SourceError, StorageError,
};

pub const REMOTE_DIR: &str = "/exports";

pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("incoming_server=debug")
        .with_test_writer()
        .try_init();
}

// ============================================================================
// Source
// ============================================================================

#[derive(Default)]
struct FakeState {
    files: BTreeMap<String, Vec<u8>>,
    denials_left: u32,
    reads: u32,
    sessions_open: i32,
}

/// Remote origin backed by a map of path to bytes
#[derive(Clone, Default)]
pub struct FakeSource {
    state: Arc<Mutex<FakeState>>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(self, path: &str, data: impl Into<Vec<u8>>) -> Self {
        self.add_file(path, data);
        self
    }

    pub fn add_file(&self, path: &str, data: impl Into<Vec<u8>>) {
        self.state.lock().unwrap().files.insert(path.to_string(), data.into());
    }

    /// Refuse the next `count` reads with a permission error
    pub fn deny_reads(self, count: u32) -> Self {
        self.state.lock().unwrap().denials_left = count;
        self
    }

    /// Read attempts so far, refused ones included
    pub fn reads(&self) -> u32 {
        self.state.lock().unwrap().reads
    }

    /// Sessions connected but not yet closed
    pub fn sessions_open(&self) -> i32 {
        self.state.lock().unwrap().sessions_open
    }
}

#[async_trait]
impl SourceConnector for FakeSource {
    fn origin(&self) -> SourceOrigin {
        SourceOrigin::Remote
    }

    async fn connect(&self) -> Result<Box<dyn SourceSession>, SourceError> {
        self.state.lock().unwrap().sessions_open += 1;
        Ok(Box::new(FakeSession {
            state: self.state.clone(),
            closed: false,
        }))
    }
}

struct FakeSession {
    state: Arc<Mutex<FakeState>>,
    closed: bool,
}

#[async_trait]
impl SourceSession for FakeSession {
    async fn read_file(&mut self, path: &str) -> Result<Vec<u8>, SourceError> {
        let mut state = self.state.lock().unwrap();
        state.reads += 1;
        if state.denials_left > 0 {
            state.denials_left -= 1;
            return Err(SourceError::PermissionDenied(format!(
                "550 {}: Permission denied",
                path
            )));
        }
        state
            .files
            .get(path)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(format!("550 {}: No such file", path)))
    }

    async fn list_files(&mut self, dir: &str) -> Result<Vec<String>, SourceError> {
        let prefix = format!("{}/", dir.trim_end_matches('/'));
        let names: Vec<String> = self
            .state
            .lock()
            .unwrap()
            .files
            .keys()
            .filter_map(|path| path.strip_prefix(&prefix))
            .filter(|name| !name.contains('/'))
            .map(str::to_string)
            .collect();
        if names.is_empty() {
            return Err(SourceError::NotFound(format!("550 {}: No such directory", dir)));
        }
        Ok(names)
    }

    async fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.state.lock().unwrap().sessions_open -= 1;
        }
    }
}

// ============================================================================
// Ledger
// ============================================================================

#[derive(Default)]
pub struct MemoryLedger {
    names: Mutex<HashSet<String>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_imported(self, name: &str) -> Self {
        self.names.lock().unwrap().insert(name.to_string());
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.lock().unwrap().contains(name)
    }

    pub fn len(&self) -> usize {
        self.names.lock().unwrap().len()
    }
}

#[async_trait]
impl ImportLedger for MemoryLedger {
    async fn already_imported(&self, file_name: &str) -> Result<bool, StorageError> {
        Ok(self.contains(file_name))
    }

    async fn log_import(&self, file_name: &str) -> Result<bool, StorageError> {
        Ok(self.names.lock().unwrap().insert(file_name.to_string()))
    }
}

// ============================================================================
// Loader
// ============================================================================

#[derive(Default)]
pub struct MemoryLoader {
    batches: Mutex<Vec<CleanedRecordBatch>>,
    /// One-based chunk number to reject
    fail_on_chunk: Option<usize>,
    /// Time spent in every append
    delay: Option<Duration>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on_chunk(chunk: usize) -> Self {
        Self {
            fail_on_chunk: Some(chunk),
            ..Self::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn batches(&self) -> Vec<CleanedRecordBatch> {
        self.batches.lock().unwrap().clone()
    }

    pub fn row_count(&self) -> usize {
        self.batches.lock().unwrap().iter().map(|b| b.len()).sum()
    }
}

#[async_trait]
impl BatchLoader for MemoryLoader {
    async fn append(&self, batch: &CleanedRecordBatch) -> Result<u64, StorageError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_on_chunk == Some(batch.index + 1) {
            return Err(StorageError::Rejected(format!(
                "chunk {} refused",
                batch.index + 1
            )));
        }
        self.batches.lock().unwrap().push(batch.clone());
        Ok(batch.len() as u64)
    }
}

// ============================================================================
// Harness
// ============================================================================

pub fn pipeline_config(quarantine_dir: &Path) -> PipelineConfig {
    PipelineConfig {
        chunk_size: 2,
        quarantine_dir: quarantine_dir.to_path_buf(),
        ..PipelineConfig::default()
    }
}

pub struct Harness {
    pub orchestrator: Arc<IngestOrchestrator>,
    pub remote: FakeSource,
    pub ledger: Arc<MemoryLedger>,
    pub loader: Arc<MemoryLoader>,
    pub shutdown: CancellationToken,
    pub dir: TempDir,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(FakeSource::new(), MemoryLedger::new(), MemoryLoader::new())
    }

    pub fn build(remote: FakeSource, ledger: MemoryLedger, loader: MemoryLoader) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Arc::new(ledger);
        let loader = Arc::new(loader);
        let shutdown = CancellationToken::new();

        let orchestrator = IngestOrchestrator::new(
            pipeline_config(&dir.path().join("quarantine")),
            Arc::new(remote.clone()),
            ledger.clone(),
            loader.clone(),
        )
        .with_remote_dir(REMOTE_DIR)
        .with_shutdown(shutdown.clone());

        Self {
            orchestrator: Arc::new(orchestrator),
            remote,
            ledger,
            loader,
            shutdown,
            dir,
        }
    }

    /// Write `data` as a local file and return its path
    pub fn local_file(&self, name: &str, data: impl AsRef<[u8]>) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, data).unwrap();
        path
    }

    pub fn quarantine_dir(&self) -> PathBuf {
        self.dir.path().join("quarantine")
    }
}

pub fn remote_path(name: &str) -> String {
    format!("{}/{}", REMOTE_DIR, name)
}

/// Five data rows with a comment column holding a stray quote
pub const CALL_LOG: &str = "\
ID_APPEL,DATE_APPEL,AGENT,DUREE,COMMENTAIRE,STATUT
1,2025-10-17,Martin,125,client \"pressé,OK
2,2025-10-17,Durand,42,rappel demain, 9h,OK
3,2025-10-17,Petit,,,KO
4,2025-10-17,NA,310,,OK
5,2025-10-17,Moreau,18,ras,OK
";
