//! FTP source reader
//!
//! `suppaftp`'s stream is blocking, so every call runs on the blocking pool.
//! The stream is moved into the blocking task and handed back with the result
//! so one login serves several reads.

use async_trait::async_trait;
use std::io::Read;
use std::net::{SocketAddr, ToSocketAddrs};
use suppaftp::types::FileType;
use suppaftp::{FtpError, FtpStream, Mode};
use tracing::{debug, info, warn};

use super::{SourceConnector, SourceError, SourceSession};
use crate::ingest::config::FtpConfig;
use crate::ingest::models::{file_name_of, SourceOrigin};

/// Opens FTP sessions from an [`FtpConfig`]
#[derive(Debug, Clone)]
pub struct FtpConnector {
    config: FtpConfig,
}

impl FtpConnector {
    pub fn new(config: FtpConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FtpConfig {
        &self.config
    }

    fn connect_sync(config: &FtpConfig) -> Result<FtpStream, SourceError> {
        let address = config.host.as_str();
        debug!(host = %config.host, port = config.port, "Connecting to FTP server");

        let addr: SocketAddr = (address, config.port)
            .to_socket_addrs()
            .map_err(|e| SourceError::Connection(format!("{}:{}: {}", config.host, config.port, e)))?
            .next()
            .ok_or_else(|| {
                SourceError::Connection(format!("{}:{}: no address", config.host, config.port))
            })?;

        let mut stream = FtpStream::connect_timeout(addr, config.timeout())
            .map_err(|e| map_ftp_error(e, &config.host))?;

        stream.set_mode(Mode::ExtendedPassive);

        debug!(user = %config.username, "Logging in");
        stream
            .login(&config.username, &config.password)
            .map_err(|e| map_ftp_error(e, &config.host))?;

        stream
            .transfer_type(FileType::Binary)
            .map_err(|e| map_ftp_error(e, &config.host))?;

        Ok(stream)
    }
}

#[async_trait]
impl SourceConnector for FtpConnector {
    fn origin(&self) -> SourceOrigin {
        SourceOrigin::Remote
    }

    async fn connect(&self) -> Result<Box<dyn SourceSession>, SourceError> {
        let config = self.config.clone();
        let stream = tokio::task::spawn_blocking(move || Self::connect_sync(&config))
            .await
            .map_err(|e| SourceError::Connection(format!("FTP connect task panicked: {}", e)))??;

        info!(host = %self.config.host, "FTP session opened");
        Ok(Box::new(FtpSession {
            stream: Some(stream),
        }))
    }
}

/// One logged-in FTP control connection
pub struct FtpSession {
    stream: Option<FtpStream>,
}

impl FtpSession {
    async fn with_stream<T, F>(&mut self, path: &str, op: F) -> Result<T, SourceError>
    where
        T: Send + 'static,
        F: FnOnce(&mut FtpStream) -> Result<T, SourceError> + Send + 'static,
    {
        let mut stream = self
            .stream
            .take()
            .ok_or_else(|| SourceError::Connection(format!("{}: session is closed", path)))?;

        let (stream, result) = tokio::task::spawn_blocking(move || {
            let result = op(&mut stream);
            (stream, result)
        })
        .await
        .map_err(|e| SourceError::Connection(format!("FTP task panicked: {}", e)))?;

        self.stream = Some(stream);
        result
    }
}

#[async_trait]
impl SourceSession for FtpSession {
    async fn read_file(&mut self, path: &str) -> Result<Vec<u8>, SourceError> {
        let remote = path.to_string();
        let data = self
            .with_stream(path, move |stream| {
                let mut reader = stream
                    .retr_as_buffer(&remote)
                    .map_err(|e| map_ftp_error(e, &remote))?;
                let mut data = Vec::new();
                reader
                    .read_to_end(&mut data)
                    .map_err(|e| SourceError::Connection(format!("{}: {}", remote, e)))?;
                Ok(data)
            })
            .await?;

        info!(path = %path, bytes = data.len(), "Downloaded remote file");
        Ok(data)
    }

    async fn list_files(&mut self, dir: &str) -> Result<Vec<String>, SourceError> {
        let remote = dir.to_string();
        let mut names: Vec<String> = self
            .with_stream(dir, move |stream| {
                stream
                    .nlst(Some(remote.as_str()))
                    .map_err(|e| map_ftp_error(e, &remote))
            })
            .await?
            .iter()
            .map(|entry| file_name_of(entry.trim()).to_string())
            .filter(|name| !name.is_empty() && name != "." && name != "..")
            .collect();
        names.sort();

        debug!(dir = %dir, entries = names.len(), "Listed remote directory");
        Ok(names)
    }

    async fn close(&mut self) {
        let Some(mut stream) = self.stream.take() else {
            return;
        };

        let quit = tokio::task::spawn_blocking(move || stream.quit()).await;
        match quit {
            Ok(Ok(())) => debug!("FTP session closed"),
            Ok(Err(e)) => warn!(error = %e, "Failed to quit FTP session gracefully"),
            Err(e) => warn!(error = %e, "FTP quit task panicked"),
        }
    }
}

/// Map an FTP reply to a source failure kind
///
/// 530/532 (not logged in / need account) and 550 replies mentioning
/// permission or access are permission failures; any other 550 and 450 mean
/// the file is missing; everything else is a transport fault.
pub fn classify_reply(code: u32, message: &str, path: &str) -> SourceError {
    let message = message.trim();
    let detail = format!("{}: {} {}", path, code, message);
    let lower = message.to_lowercase();

    match code {
        530 | 532 => SourceError::PermissionDenied(detail),
        550 if ["permission", "access", "denied"]
            .iter()
            .any(|word| lower.contains(word)) =>
        {
            SourceError::PermissionDenied(detail)
        },
        550 | 450 => SourceError::NotFound(detail),
        _ => SourceError::Connection(detail),
    }
}

fn map_ftp_error(err: FtpError, path: &str) -> SourceError {
    match err {
        FtpError::UnexpectedResponse(response) => classify_reply(
            response.status.code(),
            &String::from_utf8_lossy(&response.body),
            path,
        ),
        other => SourceError::Connection(format!("{}: {}", path, other)),
    }
}
