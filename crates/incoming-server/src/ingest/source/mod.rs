//! Source readers
//!
//! A connector opens a session against a file origin; the session reads and
//! lists files and is closed afterwards. The remote FTP reader and the local
//! filesystem reader implement the same pair of traits so the orchestrator
//! treats both origins alike.

pub mod ftp;
pub mod local;

use async_trait::async_trait;
use thiserror::Error;

use super::models::SourceOrigin;

pub use ftp::{classify_reply, FtpConnector};
pub use local::LocalConnector;

/// Failure kinds of a source reader
///
/// `PermissionDenied` is kept apart from the others because the orchestrator
/// retries it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Connection error: {0}")]
    Connection(String),
}

impl SourceError {
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, SourceError::PermissionDenied(_))
    }
}

/// Opens sessions against one file origin
#[async_trait]
pub trait SourceConnector: Send + Sync {
    fn origin(&self) -> SourceOrigin;

    async fn connect(&self) -> Result<Box<dyn SourceSession>, SourceError>;
}

/// An open session
#[async_trait]
pub trait SourceSession: Send {
    /// Read the whole file into memory
    async fn read_file(&mut self, path: &str) -> Result<Vec<u8>, SourceError>;

    /// Names of the regular files in `dir`
    async fn list_files(&mut self, dir: &str) -> Result<Vec<String>, SourceError>;

    /// Release the session. Idempotent and never fails.
    async fn close(&mut self);
}

/// Connect, read one file, close
///
/// The session is closed whether or not the read succeeded.
pub async fn fetch_file(connector: &dyn SourceConnector, path: &str) -> Result<Vec<u8>, SourceError> {
    let mut session = connector.connect().await?;
    let result = session.read_file(path).await;
    session.close().await;
    result
}

/// Connect, list one directory, close
pub async fn list_directory(
    connector: &dyn SourceConnector,
    dir: &str,
) -> Result<Vec<String>, SourceError> {
    let mut session = connector.connect().await?;
    let result = session.list_files(dir).await;
    session.close().await;
    result
}
