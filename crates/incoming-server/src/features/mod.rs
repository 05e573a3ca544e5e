//! HTTP feature slices
//!
//! - **ingest**: manual ingestion triggers (local path, folder, upload, remote)
//! - **scheduler**: on-demand run of the daily job

pub mod ingest;
pub mod scheduler;

use axum::Router;
use std::sync::Arc;

use crate::ingest::{IngestOrchestrator, RescheduleController};

/// Shared state for all feature routes
#[derive(Clone)]
pub struct FeatureState {
    pub orchestrator: Arc<IngestOrchestrator>,
    /// Registers the follow-up of a failed daily run
    pub controller: RescheduleController,
}

/// Router with every feature mounted under its prefix
///
/// - `/ingest` - ingestion triggers
/// - `/scheduler` - daily job
pub fn router(state: FeatureState) -> Router<()> {
    Router::new()
        .nest(
            "/ingest",
            ingest::ingest_routes().with_state(state.orchestrator.clone()),
        )
        .nest("/scheduler", scheduler::scheduler_routes().with_state(state))
}
