use crate::aggregate::OperatingWindow;
use crate::clock::Clock;
use crate::state::AppState;
use crate::store::StateStore;
use axum::Router;
use axum::routing::get;
use std::sync::{Arc, RwLock};

pub mod handlers;
pub mod responses;

/// Everything the read-only handlers need; cloned per request.
#[derive(Debug, Clone)]
pub struct ApiContext {
    pub state: Arc<RwLock<AppState>>,
    pub store: Arc<dyn StateStore>,
    pub window: OperatingWindow,
    pub clock: Arc<dyn Clock>,
}

pub fn router(context: ApiContext) -> Router {
    Router::new()
        .route("/api/current", get(handlers::get_current))
        .route("/api/full", get(handlers::get_full))
        .route("/api/health", get(handlers::get_health))
        .with_state(context)
}
