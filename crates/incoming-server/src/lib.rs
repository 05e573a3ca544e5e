//! Incoming call-log ingestion server
//!
//! Fetches daily call-log exports (semicolon-delimited text) from an FTP
//! drop or the local filesystem and appends them to PostgreSQL.
//!
//! # Pipeline
//!
//! For each file:
//!
//! 1. Skip it when the `import_log` ledger already names it
//! 2. Fetch the bytes, waiting out permission errors until shutdown
//! 3. Detect the character encoding from a bounded sample
//! 4. Cut the free-text comment column and everything after it
//! 5. Parse in chunks, quarantining malformed lines
//! 6. Normalize and append every chunk
//! 7. Record the file name in the ledger
//!
//! A daily run at a configured time ingests yesterday's export; a failed
//! run gets exactly one follow-up after a delay.
//!
//! # Modules
//!
//! - [`ingest`]: the pipeline, its sources, ledger and scheduler
//! - [`features`]: HTTP triggers
//! - [`config`]: environment configuration
//! - [`db`]: pool and migrations
//! - [`middleware`]: CORS and request tracing

pub mod config;
pub mod db;
pub mod error;
pub mod features;
pub mod ingest;
pub mod middleware;

pub use error::AppError;
