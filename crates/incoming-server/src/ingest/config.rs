//! Ingestion configuration
//!
//! Loaded from `INGEST_*` environment variables. Every value has a default so
//! a bare `DATABASE_URL` is enough to start the server against a local FTP.

use anyhow::Context;
use chrono::NaiveTime;
use incoming_common::env;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::parser::BadLinePolicy;

/// Rows per chunk handed to the normalizer and the loader
pub const DEFAULT_CHUNK_SIZE: usize = 5000;

/// Upper bound on the chunk size; each row binds three parameters and
/// PostgreSQL caps a statement at 65535
pub const MAX_CHUNK_SIZE: usize = 20_000;

/// Leading bytes fed to the encoding detector
pub const DEFAULT_ENCODING_SAMPLE_BYTES: usize = 20_000;

/// Wait between acquisition attempts while the source reports permission denied
pub const DEFAULT_PERMISSION_RETRY_SECS: u64 = 20 * 60;

/// Delay before the single follow-up of a failed scheduled run
pub const DEFAULT_RESCHEDULE_DELAY_SECS: u64 = 20 * 60;

pub const DEFAULT_DAILY_AT: &str = "06:00";

pub const DEFAULT_TABLE_NAME: &str = "call_logs";

/// Header of the free-text column dropped before parsing
pub const COMMENT_COLUMN: &str = "COMMENTAIRE";

/// Main ingestion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    pub ftp: FtpConfig,
    pub pipeline: PipelineConfig,
    pub schedule: ScheduleConfig,
    /// Destination table for cleaned rows
    pub table_name: String,
}

/// Remote file-transfer endpoint
#[derive(Clone, Serialize, Deserialize)]
pub struct FtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Directory holding received files, e.g. `/home/incoming/files/Received/`
    pub remote_dir: String,
    /// Connect and read timeout
    pub timeout_secs: u64,
}

// Keeps the password out of logs
impl std::fmt::Debug for FtpConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FtpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"***")
            .field("remote_dir", &self.remote_dir)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Per-file pipeline settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub chunk_size: usize,
    pub bad_line_policy: BadLinePolicy,
    /// Where `bad_lines_*.csv` side files are written
    pub quarantine_dir: PathBuf,
    pub encoding_sample_bytes: usize,
    pub permission_retry_secs: u64,
}

/// Daily trigger settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    pub enabled: bool,
    /// Local time of day the "yesterday" run fires
    pub daily_at: NaiveTime,
    pub reschedule_delay_secs: u64,
}

impl IngestConfig {
    /// Load ingestion configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        let config = Self {
            ftp: FtpConfig::from_env()?,
            pipeline: PipelineConfig::from_env()?,
            schedule: ScheduleConfig::from_env()?,
            table_name: env::string_or("INGEST_TABLE_NAME", DEFAULT_TABLE_NAME),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if !is_valid_identifier(&self.table_name) {
            anyhow::bail!(
                "INGEST_TABLE_NAME must be a plain SQL identifier, got: {}",
                self.table_name
            );
        }
        self.ftp.validate()?;
        self.pipeline.validate()?;
        Ok(())
    }
}

impl FtpConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            host: env::string_or("INGEST_FTP_HOST", &defaults.host),
            port: env::parse_or("INGEST_FTP_PORT", defaults.port)?,
            username: env::string_or("INGEST_FTP_USER", &defaults.username),
            password: env::string_or("INGEST_FTP_PASSWORD", &defaults.password),
            remote_dir: env::string_or("INGEST_FTP_REMOTE_DIR", &defaults.remote_dir),
            timeout_secs: env::parse_or("INGEST_FTP_TIMEOUT_SECS", defaults.timeout_secs)?,
        })
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.host.is_empty() {
            anyhow::bail!("INGEST_FTP_HOST cannot be empty");
        }
        if self.port == 0 {
            anyhow::bail!("INGEST_FTP_PORT must be greater than 0");
        }
        if self.timeout_secs == 0 {
            anyhow::bail!("INGEST_FTP_TIMEOUT_SECS must be greater than 0");
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Full remote path of `file_name` inside the received-files directory
    pub fn remote_path(&self, file_name: &str) -> String {
        join_remote(&self.remote_dir, file_name)
    }
}

/// Join a remote directory and a file name with exactly one `/`
pub fn join_remote(dir: &str, file_name: &str) -> String {
    if dir.is_empty() {
        file_name.to_string()
    } else if dir.ends_with('/') {
        format!("{}{}", dir, file_name)
    } else {
        format!("{}/{}", dir, file_name)
    }
}

impl PipelineConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            chunk_size: env::parse_or("INGEST_CHUNK_SIZE", defaults.chunk_size)?,
            bad_line_policy: env::parse_or("INGEST_BAD_LINE_POLICY", defaults.bad_line_policy)?,
            quarantine_dir: env::optional("INGEST_QUARANTINE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.quarantine_dir),
            encoding_sample_bytes: env::parse_or(
                "INGEST_ENCODING_SAMPLE_BYTES",
                defaults.encoding_sample_bytes,
            )?,
            permission_retry_secs: env::parse_or(
                "INGEST_PERMISSION_RETRY_SECS",
                defaults.permission_retry_secs,
            )?,
        })
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.chunk_size == 0 || self.chunk_size > MAX_CHUNK_SIZE {
            anyhow::bail!(
                "INGEST_CHUNK_SIZE must be between 1 and {}, got: {}",
                MAX_CHUNK_SIZE,
                self.chunk_size
            );
        }
        if self.encoding_sample_bytes == 0 {
            anyhow::bail!("INGEST_ENCODING_SAMPLE_BYTES must be greater than 0");
        }
        Ok(())
    }

    pub fn permission_retry_delay(&self) -> Duration {
        Duration::from_secs(self.permission_retry_secs)
    }
}

impl ScheduleConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();
        let daily_at = match env::optional("INGEST_DAILY_AT") {
            Some(raw) => parse_time_of_day(&raw)?,
            None => defaults.daily_at,
        };
        Ok(Self {
            enabled: env::parse_or("INGEST_SCHEDULE_ENABLED", defaults.enabled)?,
            daily_at,
            reschedule_delay_secs: env::parse_or(
                "INGEST_RESCHEDULE_DELAY_SECS",
                defaults.reschedule_delay_secs,
            )?,
        })
    }

    pub fn reschedule_delay(&self) -> Duration {
        Duration::from_secs(self.reschedule_delay_secs)
    }
}

/// Parse `HH:MM` or `HH:MM:SS`
pub fn parse_time_of_day(raw: &str) -> anyhow::Result<NaiveTime> {
    let raw = raw.trim();
    NaiveTime::parse_from_str(raw, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
        .with_context(|| format!("INGEST_DAILY_AT must look like HH:MM, got: {}", raw))
}

fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {},
        _ => return false,
    }
    name.len() <= 63 && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            ftp: FtpConfig::default(),
            pipeline: PipelineConfig::default(),
            schedule: ScheduleConfig::default(),
            table_name: DEFAULT_TABLE_NAME.to_string(),
        }
    }
}

impl Default for FtpConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 21,
            username: "anonymous".to_string(),
            password: String::new(),
            remote_dir: "/files/Received/".to_string(),
            timeout_secs: 60,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            bad_line_policy: BadLinePolicy::Skip,
            quarantine_dir: PathBuf::from("."),
            encoding_sample_bytes: DEFAULT_ENCODING_SAMPLE_BYTES,
            permission_retry_secs: DEFAULT_PERMISSION_RETRY_SECS,
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            daily_at: NaiveTime::from_hms_opt(6, 0, 0).unwrap_or(NaiveTime::MIN),
            reschedule_delay_secs: DEFAULT_RESCHEDULE_DELAY_SECS,
        }
    }
}
