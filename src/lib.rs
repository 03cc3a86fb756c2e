//! Bazaar server - job posting marketplace workflow

pub mod api;
pub mod error;
pub mod identity;
pub mod models;
pub mod rating;
pub mod store;
pub mod workflow;

use sqlx::SqlitePool;
use std::sync::Arc;

use crate::rating::{LogRecorder, RatingRecorder};
use crate::store::Store;
use crate::workflow::WorkflowEngine;

/// Application state shared across handlers
pub struct AppState {
    pub engine: WorkflowEngine,
}

impl AppState {
    pub fn new(pool: SqlitePool) -> Arc<Self> {
        Self::with_recorder(pool, Arc::new(LogRecorder))
    }

    /// Wire in a specific rating recorder (tests swap in a counting one)
    pub fn with_recorder(pool: SqlitePool, recorder: Arc<dyn RatingRecorder>) -> Arc<Self> {
        Arc::new(Self {
            engine: WorkflowEngine::new(Store::new(pool), recorder),
        })
    }
}
