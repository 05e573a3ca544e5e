//! Scheduler routes

use axum::{extract::State, routing::post, Json, Router};

use crate::features::FeatureState;
use crate::ingest::jobs::IngestJob;
use crate::ingest::models::IngestOutcome;
use crate::ingest::retry::run_scheduled;

pub fn scheduler_routes() -> Router<FeatureState> {
    Router::new().route("/daily", post(run_daily))
}

/// POST /scheduler/daily
///
/// Same run as the daily trigger, follow-up on failure included.
async fn run_daily(State(state): State<FeatureState>) -> Json<IngestOutcome> {
    let outcome = run_scheduled(
        &state.orchestrator,
        &state.controller,
        &IngestJob::Yesterday,
        0,
    )
    .await;
    Json(outcome)
}
