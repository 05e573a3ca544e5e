//! Ingestion triggers over HTTP

pub mod routes;

pub use routes::{ingest_routes, PathRequest};
