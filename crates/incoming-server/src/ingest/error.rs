//! Run states and failures of the ingestion orchestrator

use std::fmt;
use thiserror::Error;

use super::comment::StripError;
use super::parser::ParseError;
use super::source::SourceError;
use super::storage::StorageError;

/// Where a run stands
///
/// ```text
/// NotStarted -> LedgerChecked -> Skipped
///                             -> Acquiring <-> RetryingPermission
///                                -> Acquired -> EncodingDetected -> Stripped
///                                -> Loading(1..n) -> Recording -> Completed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestPhase {
    NotStarted,
    LedgerChecked,
    Skipped,
    Acquiring,
    RetryingPermission,
    Acquired,
    EncodingDetected,
    Stripped,
    /// Loading the one-based chunk
    Loading(usize),
    Recording,
    Completed,
}

impl fmt::Display for IngestPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngestPhase::NotStarted => write!(f, "not started"),
            IngestPhase::LedgerChecked => write!(f, "ledger checked"),
            IngestPhase::Skipped => write!(f, "skipped"),
            IngestPhase::Acquiring => write!(f, "acquiring"),
            IngestPhase::RetryingPermission => write!(f, "retrying permission"),
            IngestPhase::Acquired => write!(f, "acquired"),
            IngestPhase::EncodingDetected => write!(f, "encoding detected"),
            IngestPhase::Stripped => write!(f, "stripped"),
            IngestPhase::Loading(chunk) => write!(f, "loading chunk {}", chunk),
            IngestPhase::Recording => write!(f, "recording import"),
            IngestPhase::Completed => write!(f, "completed"),
        }
    }
}

#[derive(Debug, Error)]
pub enum IngestFailure {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Strip(#[from] StripError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("shutdown requested")]
    Cancelled,
}

/// A failed run and the state it failed in
#[derive(Debug, Error)]
#[error("failed while {phase}: {failure}")]
pub struct IngestError {
    pub phase: IngestPhase,
    #[source]
    pub failure: IngestFailure,
}

impl IngestError {
    pub fn new(phase: IngestPhase, failure: impl Into<IngestFailure>) -> Self {
        Self {
            phase,
            failure: failure.into(),
        }
    }

    pub fn cancelled(phase: IngestPhase) -> Self {
        Self {
            phase,
            failure: IngestFailure::Cancelled,
        }
    }
}
