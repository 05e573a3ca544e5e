//! Side file for malformed lines

use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::info;

use super::parser::BadLine;

/// Writes `bad_lines_{YYYYMMDD_HHMMSS}.csv` into a directory
#[derive(Debug, Clone)]
pub struct QuarantineWriter {
    dir: PathBuf,
}

impl QuarantineWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn file_name_at(at: DateTime<Local>) -> String {
        format!("bad_lines_{}.csv", at.format("%Y%m%d_%H%M%S"))
    }

    /// Write `lines` to a new side file, or append if one with the same
    /// timestamp exists. Nothing is written for an empty slice.
    pub async fn write(&self, source_file: &str, lines: &[BadLine]) -> anyhow::Result<Option<PathBuf>> {
        if lines.is_empty() {
            return Ok(None);
        }

        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(Self::file_name_at(Local::now()));
        let exists = tokio::fs::try_exists(&path).await.unwrap_or(false);

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(Vec::new());
        if !exists {
            writer.write_record(["source_file", "line_number", "reason", "raw"])?;
        }
        for line in lines {
            let number = line.line_number.to_string();
            writer.write_record([
                source_file,
                number.as_str(),
                line.reason.as_str(),
                line.raw.as_str(),
            ])?;
        }
        let bytes = writer.into_inner().map_err(|e| anyhow::anyhow!(e.to_string()))?;

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(&bytes).await?;
        file.flush().await?;

        info!(
            file = %source_file,
            bad_lines = lines.len(),
            path = %path.display(),
            "Malformed lines quarantined"
        );
        Ok(Some(path))
    }
}
