use axum::{routing::get, Router};
use std::sync::Arc;

use super::engine::TrackingEngine;
use super::handlers::{favicon, health_check, track_click, track_open, track_open_by_path};

pub fn create_tracking_router(engine: Arc<TrackingEngine>) -> Router {
    Router::new()
        .route("/track", get(track_open))
        .route("/pixel", get(track_open))
        .route("/t/{track_id}", get(track_open_by_path))
        .route("/click/{track_id}/{*target_url}", get(track_click))
        .route("/c/{track_id}/{*target_url}", get(track_click))
        .route("/favicon.ico", get(favicon))
        .route("/health", get(health_check))
        .with_state(engine)
}
