//! Data types that flow through one ingestion run

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a source file was read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceOrigin {
    Local,
    Remote,
}

impl fmt::Display for SourceOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceOrigin::Local => write!(f, "local"),
            SourceOrigin::Remote => write!(f, "remote"),
        }
    }
}

/// A file being ingested
///
/// Identified by its base name, never by its full path, so the same file
/// reached through different directories maps to one ledger entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub name: String,
    pub path: String,
    pub origin: SourceOrigin,
    pub encoding: Option<String>,
    pub size_bytes: u64,
}

impl SourceFile {
    pub fn new(path: impl Into<String>, origin: SourceOrigin) -> Self {
        let path = path.into();
        Self {
            name: file_name_of(&path).to_string(),
            path,
            origin,
            encoding: None,
            size_bytes: 0,
        }
    }
}

/// Base name of a local or remote path
///
/// Both separators are accepted since remote paths always use `/` while
/// local ones may not.
pub fn file_name_of(path: &str) -> &str {
    let trimmed = path.trim_end_matches(['/', '\\']);
    trimmed
        .rsplit(['/', '\\'])
        .next()
        .filter(|name| !name.is_empty())
        .unwrap_or(trimmed)
}

/// A chunk of parsed but uncleaned records
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecordBatch {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    /// Zero-based position of this chunk in the file
    pub index: usize,
    /// One-based data row number of the first row
    pub first_row: u64,
}

impl RawRecordBatch {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// One normalized row with its data row number in the source file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanedRow {
    pub number: u64,
    pub cells: Vec<Option<String>>,
}

/// A normalized chunk ready to be appended to storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanedRecordBatch {
    pub source_file: String,
    pub columns: Vec<String>,
    pub rows: Vec<CleanedRow>,
    pub index: usize,
}

impl CleanedRecordBatch {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Render a row as a JSON object keyed by column name
    pub fn row_as_json(&self, row: &CleanedRow) -> serde_json::Value {
        let object = self
            .columns
            .iter()
            .zip(&row.cells)
            .map(|(column, cell)| {
                let value = match cell {
                    Some(text) => serde_json::Value::String(text.clone()),
                    None => serde_json::Value::Null,
                };
                (column.clone(), value)
            })
            .collect();
        serde_json::Value::Object(object)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestStatus {
    Success,
    Skipped,
    Error,
}

/// Result of every ingestion entry point
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestOutcome {
    pub status: IngestStatus,
    pub file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub bad_lines: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quarantine_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

fn is_zero(n: &u64) -> bool {
    *n == 0
}

impl IngestOutcome {
    pub fn success(file: impl Into<String>, rows: u64, encoding: impl Into<String>) -> Self {
        Self {
            status: IngestStatus::Success,
            file: file.into(),
            rows: Some(rows),
            encoding: Some(encoding.into()),
            bad_lines: 0,
            quarantine_file: None,
            message: None,
        }
    }

    pub fn skipped(file: impl Into<String>) -> Self {
        Self {
            status: IngestStatus::Skipped,
            file: file.into(),
            rows: None,
            encoding: None,
            bad_lines: 0,
            quarantine_file: None,
            message: Some("already imported".to_string()),
        }
    }

    pub fn error(file: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status: IngestStatus::Error,
            file: file.into(),
            rows: None,
            encoding: None,
            bad_lines: 0,
            quarantine_file: None,
            message: Some(message.into()),
        }
    }

    pub fn with_bad_lines(mut self, count: u64, quarantine_file: Option<String>) -> Self {
        self.bad_lines = count;
        self.quarantine_file = quarantine_file;
        self
    }

    pub fn with_encoding(mut self, encoding: Option<String>) -> Self {
        if encoding.is_some() {
            self.encoding = encoding;
        }
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == IngestStatus::Success
    }

    pub fn is_error(&self) -> bool {
        self.status == IngestStatus::Error
    }
}
