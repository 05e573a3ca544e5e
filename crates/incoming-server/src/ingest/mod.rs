//! Call-log file ingestion
//!
//! # Architecture
//!
//! - **source**: FTP and local file readers behind one connector/session contract
//! - **encoding**: byte-to-text encoding detection from a leading sample
//! - **comment**: positional removal of the free-text `COMMENTAIRE` column
//! - **parser**: chunked CSV parsing with a malformed-row policy
//! - **quarantine**: side file for malformed lines
//! - **normalizer**: raw chunk to cleaned chunk
//! - **ledger**: which files have been fully imported
//! - **storage**: appends cleaned chunks to the destination table
//! - **orchestrator**: sequences the above for one file
//! - **retry**: one follow-up for a failed scheduled run
//! - **scheduler**: daily trigger and deferred one-shot tasks
//!
//! # Public API
//!
//! The HTTP triggers live in `features::ingest` and `features::scheduler`:
//! - `POST /ingest/path`, `/ingest/folder`, `/ingest/file`
//! - `POST /ingest/remote`, `/ingest/remote-folder`
//! - `POST /scheduler/daily`

pub mod comment;
pub mod config;
pub mod encoding;
pub mod error;
pub mod jobs;
pub mod ledger;
pub mod models;
pub mod normalizer;
pub mod orchestrator;
pub mod parser;
pub mod quarantine;
pub mod retry;
pub mod scheduler;
pub mod source;
pub mod storage;

pub use config::IngestConfig;
pub use error::{IngestError, IngestFailure, IngestPhase};
pub use jobs::{IngestJob, IngestStats, ScheduledRetryTask};
pub use ledger::{ImportLedger, PgImportLedger};
pub use models::{IngestOutcome, IngestStatus};
pub use orchestrator::IngestOrchestrator;
pub use retry::RescheduleController;
pub use scheduler::{JobScheduler, SchedulerHandle};
pub use source::{FtpConnector, LocalConnector, SourceConnector, SourceError};
pub use storage::{BatchLoader, PgBatchLoader, StorageError};
