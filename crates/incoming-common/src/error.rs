//! Error types shared across Incoming crates

use thiserror::Error;

/// Result type alias for shared operations
pub type Result<T> = std::result::Result<T, IncomingError>;

#[derive(Error, Debug)]
pub enum IncomingError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid value for {key}: {value:?} ({reason})")]
    InvalidEnv {
        key: String,
        value: String,
        reason: String,
    },
}

impl IncomingError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}
