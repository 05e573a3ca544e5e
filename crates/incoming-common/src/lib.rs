//! Incoming Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared pieces used by every Incoming workspace member:
//!
//! - **Error Handling**: the shared [`IncomingError`] and result alias
//! - **Environment**: typed `std::env` lookups with defaults
//! - **Logging**: `tracing` subscriber setup

pub mod env;
pub mod error;
pub mod logging;

pub use error::{IncomingError, Result};
