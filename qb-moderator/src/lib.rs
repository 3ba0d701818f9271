//! qb-moderator library interface
//!
//! Watches tracker collections for quote submissions, parses them, and
//! writes verdicts back. Exposed as a library for integration testing.

pub mod api;
pub mod error;
pub mod feedback;
pub mod lock;
pub mod orchestrator;
pub mod scheduler;
pub mod tracker;
pub mod verdict;

pub use crate::error::{Error, Result};

use axum::Router;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::lock::ExclusionLock;
use crate::orchestrator::{CollectionStatus, Moderator};
use crate::scheduler::DebounceScheduler;
use crate::tracker::TaskTracker;

/// Read-only view of one collection's lock and scheduler
#[derive(Clone)]
pub struct CollectionHandle {
    collection: String,
    lock: ExclusionLock,
    scheduler: DebounceScheduler,
}

impl CollectionHandle {
    pub fn new(
        collection: impl Into<String>,
        lock: ExclusionLock,
        scheduler: DebounceScheduler,
    ) -> Self {
        Self {
            collection: collection.into(),
            lock,
            scheduler,
        }
    }

    pub fn for_moderator<T: TaskTracker + 'static>(moderator: &Arc<Moderator<T>>) -> Self {
        Self::new(
            moderator.collection_id(),
            moderator.lock().clone(),
            moderator.scheduler().clone(),
        )
    }

    pub fn status(&self) -> CollectionStatus {
        CollectionStatus {
            collection: self.collection.clone(),
            locked: self.lock.len(),
            pending: self.scheduler.pending_count(),
            running: self.scheduler.running_count(),
        }
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub collections: Arc<Vec<CollectionHandle>>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(collections: Vec<CollectionHandle>) -> Self {
        Self {
            collections: Arc::new(collections),
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::health_routes())
        .merge(api::status_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
