//! Job definitions for scheduled ingestion

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Suffix of the file delivered every day
pub const DAILY_FILE_SUFFIX: &str = "_VocalCom_Incoming.csv";

/// An invocation the scheduler can run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IngestJob {
    /// Import yesterday's remote file
    Yesterday,
    RemoteFile { path: String },
    LocalFile { path: String },
}

impl fmt::Display for IngestJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngestJob::Yesterday => write!(f, "yesterday"),
            IngestJob::RemoteFile { path } => write!(f, "remote:{}", path),
            IngestJob::LocalFile { path } => write!(f, "local:{}", path),
        }
    }
}

/// A one-shot deferred run
///
/// `attempt` is 1 for the follow-up of a failed scheduled run. Follow-ups are
/// never followed up themselves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledRetryTask {
    pub id: Uuid,
    pub run_at: DateTime<Utc>,
    pub job: IngestJob,
    pub attempt: u32,
}

impl ScheduledRetryTask {
    pub fn new(job: IngestJob, run_at: DateTime<Utc>, attempt: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            run_at,
            job,
            attempt,
        }
    }

    pub fn is_follow_up(&self) -> bool {
        self.attempt > 0
    }
}

/// Name of the file expected on `today`: yesterday's ISO date plus the suffix
pub fn yesterday_file_name(today: NaiveDate) -> String {
    let yesterday = today.pred_opt().unwrap_or(today);
    format!("{}{}", yesterday.format("%Y-%m-%d"), DAILY_FILE_SUFFIX)
}

/// Counters collected while ingesting one file
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct IngestStats {
    /// Data records read by the parser
    pub rows_parsed: u64,
    /// Rows written to the destination
    pub rows_loaded: u64,
    /// Records that failed structural parsing
    pub rows_malformed: u64,
    /// Rows removed by the normalizer
    pub rows_dropped: u64,
    pub chunks_loaded: u64,
    pub bytes_read: u64,
    pub duration_secs: f64,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl IngestStats {
    pub fn new() -> Self {
        Self {
            started_at: Some(Utc::now()),
            ..Default::default()
        }
    }

    pub fn complete(&mut self) {
        self.completed_at = Some(Utc::now());
        if let (Some(start), Some(end)) = (self.started_at, self.completed_at) {
            self.duration_secs = (end - start).num_milliseconds() as f64 / 1000.0;
        }
    }

    pub fn add_chunk(&mut self, raw_rows: usize, loaded: u64, cleaned_rows: usize) {
        self.chunks_loaded += 1;
        self.rows_loaded += loaded;
        self.rows_dropped += raw_rows.saturating_sub(cleaned_rows) as u64;
    }

    pub fn rows_per_second(&self) -> f64 {
        if self.duration_secs > 0.0 {
            self.rows_loaded as f64 / self.duration_secs
        } else {
            0.0
        }
    }
}
