//! Moderation status endpoint
//!
//! Reports, per collection, how many records are locked, waiting out their
//! quiet period, or being moderated right now.

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::orchestrator::CollectionStatus;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct CollectionStatusResponse {
    pub collection: String,
    pub locked: usize,
    pub pending: usize,
    pub running: usize,
}

impl From<CollectionStatus> for CollectionStatusResponse {
    fn from(status: CollectionStatus) -> Self {
        Self {
            collection: status.collection,
            locked: status.locked,
            pending: status.pending,
            running: status.running,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub uptime_seconds: u64,
    pub collections: Vec<CollectionStatusResponse>,
}

/// GET /status
pub async fn moderation_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let uptime = Utc::now().signed_duration_since(state.startup_time);

    Json(StatusResponse {
        uptime_seconds: uptime.num_seconds().max(0) as u64,
        collections: state
            .collections
            .iter()
            .map(|handle| handle.status().into())
            .collect(),
    })
}

/// Build status routes
pub fn status_routes() -> Router<AppState> {
    Router::new().route("/status", get(moderation_status))
}
