//! Typed environment lookups
//!
//! Unset variables fall back to the supplied default. A variable that is set
//! but does not parse is an error rather than a silent fallback, so a typo in
//! `INGEST_CHUNK_SIZE` does not quietly run with the default.

use std::str::FromStr;

use crate::error::{IncomingError, Result};

/// Read `key` and parse it, or return `default` when unset or blank
pub fn parse_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => {
            raw.trim().parse().map_err(|e: T::Err| IncomingError::InvalidEnv {
                key: key.to_string(),
                value: raw.clone(),
                reason: e.to_string(),
            })
        },
        _ => Ok(default),
    }
}

/// Read `key` as a string, or return `default` when unset
pub fn string_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Read `key` as an optional string; blank counts as unset
pub fn optional(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
