use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::auth::{auth_middleware, AuthService};
use crate::storage::Storage;

use super::handlers::{export, generate, list_tracks, stats, track_detail, AppState};
use super::pixels::generate_pixels;

/// Admin routes, nested under `/api` by the caller
pub fn create_api_router(
    storage: Arc<dyn Storage>,
    auth_service: Arc<AuthService>,
    public_base_url: String,
) -> Router {
    let state = Arc::new(AppState {
        storage,
        public_base_url,
    });

    Router::new()
        .route("/stats", get(stats))
        .route("/tracks", get(list_tracks))
        .route("/track/{track_id}", get(track_detail))
        .route("/export", get(export))
        .route("/generate", post(generate))
        .route("/pixels/generate", post(generate_pixels))
        .route_layer(middleware::from_fn(move |headers, query, req, next| {
            let auth = Arc::clone(&auth_service);
            auth_middleware(auth, headers, query, req, next)
        }))
        .with_state(state)
}
