use axum::{
    extract::{rejection::QueryRejection, Query, Request},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::collections::HashMap;
use subtle::ConstantTimeEq;

pub const API_KEY_HEADER: &str = "X-API-Key";
pub const API_KEY_PARAM: &str = "api_key";

pub struct AuthService {
    enabled: bool,
    api_key: Option<String>,
}

impl AuthService {
    pub fn new(enabled: bool, api_key: Option<String>) -> Self {
        Self { enabled, api_key }
    }

    pub fn validate_key(&self, key: &str) -> bool {
        if !self.enabled {
            return true;
        }

        // Enabled without a configured key admits nobody
        match self.api_key.as_deref() {
            Some(expected) => bool::from(expected.as_bytes().ct_eq(key.as_bytes())),
            None => false,
        }
    }
}

pub async fn auth_middleware(
    auth_service: std::sync::Arc<AuthService>,
    headers: HeaderMap,
    query: Result<Query<HashMap<String, String>>, QueryRejection>,
    request: Request,
    next: Next,
) -> Response {
    let from_header = headers
        .get(API_KEY_HEADER)
        .and_then(|h| h.to_str().ok())
        .filter(|key| !key.is_empty())
        .map(str::to_string);
    let api_key = from_header
        .or_else(|| {
            query
                .ok()
                .and_then(|Query(mut params)| params.remove(API_KEY_PARAM))
        })
        .unwrap_or_default();

    if auth_service.validate_key(&api_key) {
        next.run(request).await
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "Unauthorized" })),
        )
            .into_response()
    }
}
