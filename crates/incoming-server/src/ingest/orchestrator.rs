//! Ingestion orchestrator
//!
//! Runs one file through ledger check, acquisition, encoding detection,
//! comment stripping, chunked parsing, normalization and loading, then records
//! the import. Every entry point returns an [`IngestOutcome`]; failures are
//! logged and reported, never raised.
//!
//! Runs for the same file name are serialized by a per-file lock held from
//! the ledger check to the ledger write, so a concurrent duplicate observes
//! the entry and is skipped. The ledger's unique key covers other processes.

use chrono::{Local, NaiveDate};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OwnedMutexGuard;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::comment::CommentStripper;
use super::config::{join_remote, PipelineConfig};
use super::encoding::{self, EncodingDetector, FALLBACK_ENCODING};
use super::error::{IngestError, IngestPhase};
use super::jobs::{yesterday_file_name, IngestJob, IngestStats};
use super::ledger::ImportLedger;
use super::models::{IngestOutcome, SourceFile, SourceOrigin};
use super::normalizer::{RowNormalizer, StandardNormalizer};
use super::parser::{BadLine, ChunkedRecords};
use super::quarantine::QuarantineWriter;
use super::source::{fetch_file, list_directory, LocalConnector, SourceConnector};
use super::storage::BatchLoader;

/// Async locks keyed by file name
#[derive(Debug, Clone, Default)]
pub struct FileLocks {
    inner: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
}

impl FileLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `file_name`
    pub async fn acquire(&self, file_name: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            // Entries nobody holds or waits on can go
            map.retain(|_, lock| Arc::strong_count(lock) > 1);
            map.entry(file_name.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }
}

#[derive(Debug, Default)]
struct RunReport {
    encoding: Option<String>,
    bad_lines: u64,
    quarantine_file: Option<String>,
}

pub struct IngestOrchestrator {
    pipeline: PipelineConfig,
    remote_dir: String,
    remote: Arc<dyn SourceConnector>,
    local: Arc<dyn SourceConnector>,
    ledger: Arc<dyn ImportLedger>,
    loader: Arc<dyn BatchLoader>,
    normalizer: Arc<dyn RowNormalizer>,
    detector: EncodingDetector,
    stripper: CommentStripper,
    quarantine: QuarantineWriter,
    locks: FileLocks,
    shutdown: CancellationToken,
}

impl IngestOrchestrator {
    pub fn new(
        pipeline: PipelineConfig,
        remote: Arc<dyn SourceConnector>,
        ledger: Arc<dyn ImportLedger>,
        loader: Arc<dyn BatchLoader>,
    ) -> Self {
        Self {
            detector: EncodingDetector::new(pipeline.encoding_sample_bytes),
            quarantine: QuarantineWriter::new(pipeline.quarantine_dir.clone()),
            pipeline,
            remote_dir: String::new(),
            remote,
            local: Arc::new(LocalConnector),
            ledger,
            loader,
            normalizer: Arc::new(StandardNormalizer),
            stripper: CommentStripper::default(),
            locks: FileLocks::new(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Directory the daily file is read from
    pub fn with_remote_dir(mut self, dir: impl Into<String>) -> Self {
        self.remote_dir = dir.into();
        self
    }

    pub fn with_local_connector(mut self, local: Arc<dyn SourceConnector>) -> Self {
        self.local = local;
        self
    }

    pub fn with_normalizer(mut self, normalizer: Arc<dyn RowNormalizer>) -> Self {
        self.normalizer = normalizer;
        self
    }

    /// Cancelling this token aborts runs waiting on a permission retry
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn pipeline(&self) -> &PipelineConfig {
        &self.pipeline
    }

    pub async fn ingest_local_path(&self, path: &str) -> IngestOutcome {
        self.run(self.local.as_ref(), path).await
    }

    pub async fn ingest_remote_path(&self, path: &str) -> IngestOutcome {
        self.run(self.remote.as_ref(), path).await
    }

    /// Ingest every `*.csv` file of a local directory in name order
    pub async fn ingest_local_folder(&self, dir: &str) -> Vec<IngestOutcome> {
        self.ingest_folder(self.local.as_ref(), dir).await
    }

    /// Ingest every `*.csv` file of a remote directory in name order
    pub async fn ingest_remote_folder(&self, dir: &str) -> Vec<IngestOutcome> {
        self.ingest_folder(self.remote.as_ref(), dir).await
    }

    /// Ingest the remote file delivered for yesterday
    pub async fn ingest_yesterday(&self) -> IngestOutcome {
        self.ingest_yesterday_on(Local::now().date_naive()).await
    }

    pub async fn ingest_yesterday_on(&self, today: NaiveDate) -> IngestOutcome {
        let path = join_remote(&self.remote_dir, &yesterday_file_name(today));
        info!(path = %path, "Daily ingestion triggered");
        self.ingest_remote_path(&path).await
    }

    pub async fn execute_job(&self, job: &IngestJob) -> IngestOutcome {
        match job {
            IngestJob::Yesterday => self.ingest_yesterday().await,
            IngestJob::RemoteFile { path } => self.ingest_remote_path(path).await,
            IngestJob::LocalFile { path } => self.ingest_local_path(path).await,
        }
    }

    async fn ingest_folder(&self, connector: &dyn SourceConnector, dir: &str) -> Vec<IngestOutcome> {
        let names = match list_directory(connector, dir).await {
            Ok(names) => names,
            Err(e) => {
                error!(dir = %dir, error = %e, "Failed to list folder");
                return vec![IngestOutcome::error(dir, format!("failed to list folder: {}", e))];
            },
        };

        let files: Vec<String> = names.into_iter().filter(|name| is_csv(name)).collect();
        info!(dir = %dir, origin = %connector.origin(), files = files.len(), "Ingesting folder");

        let mut outcomes = Vec::with_capacity(files.len());
        for name in files {
            let path = match connector.origin() {
                SourceOrigin::Remote => join_remote(dir, &name),
                SourceOrigin::Local => Path::new(dir).join(&name).to_string_lossy().into_owned(),
            };
            outcomes.push(self.run(connector, &path).await);
        }
        outcomes
    }

    async fn run(&self, connector: &dyn SourceConnector, path: &str) -> IngestOutcome {
        let mut file = SourceFile::new(path, connector.origin());
        let _guard = self.locks.acquire(&file.name).await;

        info!(file = %file.name, path = %file.path, origin = %file.origin, "Ingestion started");
        let mut report = RunReport::default();

        match self.execute(connector, &mut file, &mut report).await {
            Ok(None) => {
                info!(file = %file.name, "File already imported, skipping");
                IngestOutcome::skipped(&file.name)
            },
            Ok(Some(rows)) => IngestOutcome::success(
                &file.name,
                rows,
                report.encoding.unwrap_or_else(|| FALLBACK_ENCODING.to_string()),
            )
            .with_bad_lines(report.bad_lines, report.quarantine_file),
            Err(e) => {
                error!(file = %file.name, phase = %e.phase, error = %e, "Ingestion failed");
                IngestOutcome::error(&file.name, e.to_string())
                    .with_encoding(report.encoding)
                    .with_bad_lines(report.bad_lines, report.quarantine_file)
            },
        }
    }

    /// `Ok(None)` when the ledger already has the file
    async fn execute(
        &self,
        connector: &dyn SourceConnector,
        file: &mut SourceFile,
        report: &mut RunReport,
    ) -> Result<Option<u64>, IngestError> {
        let imported = self
            .ledger
            .already_imported(&file.name)
            .await
            .map_err(|e| IngestError::new(IngestPhase::NotStarted, e))?;
        debug!(file = %file.name, phase = %IngestPhase::LedgerChecked, imported, "Ledger checked");
        if imported {
            return Ok(None);
        }

        let mut stats = IngestStats::new();
        let data = self.acquire(connector, file).await?;
        file.size_bytes = data.len() as u64;
        stats.bytes_read = file.size_bytes;
        debug!(file = %file.name, phase = %IngestPhase::Acquired, bytes = file.size_bytes, "File acquired");

        let detected = self.detector.detect(&data);
        file.encoding = Some(encoding::label(detected));
        report.encoding = file.encoding.clone();
        debug!(
            file = %file.name,
            phase = %IngestPhase::EncodingDetected,
            encoding = detected.name(),
            "Encoding detected"
        );

        let text = self
            .stripper
            .strip(&data, detected)
            .map_err(|e| IngestError::new(IngestPhase::EncodingDetected, e))?;
        drop(data);

        let mut records = ChunkedRecords::new(
            &text,
            self.pipeline.chunk_size,
            self.pipeline.bad_line_policy,
        )
        .map_err(|e| IngestError::new(IngestPhase::Stripped, e))?;

        let loaded = self.load_chunks(&mut records, file, &mut stats).await;

        // Quarantine whatever was captured, even when loading failed
        stats.rows_parsed = records.records_read();
        let bad_lines = records.take_bad_lines();
        stats.rows_malformed = bad_lines.len() as u64;
        report.bad_lines = stats.rows_malformed;
        report.quarantine_file = self.write_quarantine(&file.name, &bad_lines).await;

        let rows = loaded?;

        let recorded = self
            .ledger
            .log_import(&file.name)
            .await
            .map_err(|e| IngestError::new(IngestPhase::Recording, e))?;
        if !recorded {
            warn!(file = %file.name, "Ledger entry already existed when recording import");
        }

        stats.complete();
        info!(
            file = %file.name,
            phase = %IngestPhase::Completed,
            rows,
            chunks = stats.chunks_loaded,
            malformed = stats.rows_malformed,
            dropped = stats.rows_dropped,
            encoding = ?file.encoding,
            duration_secs = stats.duration_secs,
            rows_per_sec = stats.rows_per_second(),
            "Ingestion completed"
        );
        Ok(Some(rows))
    }

    /// Read the file, waiting out permission failures on remote files
    ///
    /// There is no attempt cap: the loop ends on success, on any other error,
    /// or when the shutdown token fires. Local permission failures are final.
    async fn acquire(
        &self,
        connector: &dyn SourceConnector,
        file: &SourceFile,
    ) -> Result<Vec<u8>, IngestError> {
        let delay = self.pipeline.permission_retry_delay();
        let mut attempt: u32 = 1;

        loop {
            debug!(file = %file.name, phase = %IngestPhase::Acquiring, attempt, "Reading file");
            match fetch_file(connector, &file.path).await {
                Ok(data) => return Ok(data),
                Err(e) if e.is_permission_denied() && connector.origin() == SourceOrigin::Remote => {
                    warn!(
                        file = %file.name,
                        attempt,
                        retry_in_secs = delay.as_secs(),
                        error = %e,
                        "Permission denied, retrying later"
                    );
                    tokio::select! {
                        _ = self.shutdown.cancelled() => {
                            return Err(IngestError::cancelled(IngestPhase::RetryingPermission));
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                },
                Err(e) => return Err(IngestError::new(IngestPhase::Acquiring, e)),
            }
        }
    }

    async fn load_chunks(
        &self,
        records: &mut ChunkedRecords<'_>,
        file: &SourceFile,
        stats: &mut IngestStats,
    ) -> Result<u64, IngestError> {
        let mut phase = IngestPhase::Stripped;

        for batch in records.by_ref() {
            let batch = batch.map_err(|e| IngestError::new(phase, e))?;
            let chunk = batch.index + 1;
            phase = IngestPhase::Loading(chunk);

            let raw_rows = batch.len();
            let cleaned = self.normalizer.normalize(batch, &file.name);
            let written = self
                .loader
                .append(&cleaned)
                .await
                .map_err(|e| IngestError::new(phase, e))?;

            stats.add_chunk(raw_rows, written, cleaned.len());
            debug!(file = %file.name, chunk, rows = written, "Chunk loaded");
        }

        Ok(stats.rows_loaded)
    }

    async fn write_quarantine(&self, file_name: &str, bad_lines: &[BadLine]) -> Option<String> {
        match self.quarantine.write(file_name, bad_lines).await {
            Ok(path) => path.map(|p| p.display().to_string()),
            Err(e) => {
                error!(file = %file_name, error = %e, "Failed to write quarantine file");
                None
            },
        }
    }
}

fn is_csv(name: &str) -> bool {
    Path::new(name)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_is_csv() {
        assert!(is_csv("a.csv"));
        assert!(is_csv("2025-10-17_VocalCom_Incoming.CSV"));
        assert!(!is_csv("a.csv.bak"));
        assert!(!is_csv("csv"));
    }

    #[tokio::test]
    async fn test_file_locks_serialize_same_name() {
        let locks = FileLocks::new();
        let guard = locks.acquire("a.csv").await;

        let other = locks.clone();
        let waiter = tokio::spawn(async move {
            let _guard = other.acquire("a.csv").await;
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn test_file_locks_independent_names() {
        let locks = FileLocks::new();
        let _a = locks.acquire("a.csv").await;
        let _b = tokio::time::timeout(Duration::from_secs(1), locks.acquire("b.csv"))
            .await
            .unwrap();
    }
}
