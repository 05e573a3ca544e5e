//! Local filesystem source reader

use async_trait::async_trait;
use std::io::ErrorKind;
use tracing::debug;

use super::{SourceConnector, SourceError, SourceSession};
use crate::ingest::models::SourceOrigin;

/// Reads files from the local filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalConnector;

impl LocalConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SourceConnector for LocalConnector {
    fn origin(&self) -> SourceOrigin {
        SourceOrigin::Local
    }

    async fn connect(&self) -> Result<Box<dyn SourceSession>, SourceError> {
        Ok(Box::new(LocalSession))
    }
}

pub struct LocalSession;

#[async_trait]
impl SourceSession for LocalSession {
    async fn read_file(&mut self, path: &str) -> Result<Vec<u8>, SourceError> {
        let data = tokio::fs::read(path)
            .await
            .map_err(|e| map_io_error(e, path))?;
        debug!(path = %path, bytes = data.len(), "Read local file");
        Ok(data)
    }

    async fn list_files(&mut self, dir: &str) -> Result<Vec<String>, SourceError> {
        let mut entries = tokio::fs::read_dir(dir)
            .await
            .map_err(|e| map_io_error(e, dir))?;

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| map_io_error(e, dir))? {
            let file_type = entry.file_type().await.map_err(|e| map_io_error(e, dir))?;
            if file_type.is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    async fn close(&mut self) {}
}

fn map_io_error(err: std::io::Error, path: &str) -> SourceError {
    let detail = format!("{}: {}", path, err);
    match err.kind() {
        ErrorKind::NotFound => SourceError::NotFound(detail),
        ErrorKind::PermissionDenied => SourceError::PermissionDenied(detail),
        _ => SourceError::Connection(detail),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::source::{fetch_file, list_directory};

    #[tokio::test]
    async fn test_read_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("calls.csv");
        std::fs::write(&path, b"A,B\n1,2\n").unwrap();

        let data = fetch_file(&LocalConnector, path.to_str().unwrap()).await.unwrap();
        assert_eq!(data, b"A,B\n1,2\n");
    }

    #[tokio::test]
    async fn test_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.csv");

        let err = fetch_file(&LocalConnector, path.to_str().unwrap()).await.unwrap_err();
        assert!(matches!(err, SourceError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_list_files_sorted_without_directories() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.csv"), b"x").unwrap();
        std::fs::write(dir.path().join("a.CSV"), b"x").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();

        let names = list_directory(&LocalConnector, dir.path().to_str().unwrap())
            .await
            .unwrap();
        assert_eq!(names, vec!["a.CSV".to_string(), "b.csv".to_string()]);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let mut session = LocalConnector.connect().await.unwrap();
        session.close().await;
        session.close().await;
    }
}
