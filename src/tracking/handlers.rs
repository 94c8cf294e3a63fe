use axum::{
    extract::{
        rejection::{PathRejection, QueryRejection},
        ConnectInfo, Path, Query, State,
    },
    http::{header::HeaderMap, StatusCode, Uri},
    response::IntoResponse,
    Json,
};
use percent_encoding::percent_decode_str;
use serde::Serialize;
use std::borrow::Cow;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use super::engine::{ClickRequest, OpenRequest, TrackingEngine};
use super::response::{PixelResponse, RedirectResponse};
use crate::analytics::RequestContext;

type QueryParams = Result<Query<HashMap<String, String>>, QueryRejection>;

fn query_map(query: QueryParams) -> HashMap<String, String> {
    query.map(|Query(params)| params).unwrap_or_default()
}

/// Pixel addressed by the `id` query parameter (`/track`, `/pixel`)
pub async fn track_open(
    State(engine): State<Arc<TrackingEngine>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    query: QueryParams,
) -> PixelResponse {
    let request = OpenRequest::from_query(None, &query_map(query));
    let ctx = RequestContext::from_parts(&headers, addr);
    engine.handle_open(request, &ctx).await
}

/// Pixel addressed by path (`/t/{track_id}`)
pub async fn track_open_by_path(
    State(engine): State<Arc<TrackingEngine>>,
    path: Result<Path<String>, PathRejection>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    query: QueryParams,
) -> PixelResponse {
    let path_id = path.ok().map(|Path(id)| id);
    let request = OpenRequest::from_query(path_id.as_deref(), &query_map(query));
    let ctx = RequestContext::from_parts(&headers, addr);
    engine.handle_open(request, &ctx).await
}

/// `(track_id, target)` from `/<prefix>/{track_id}/{*target}`, decoded
/// lossily so a malformed escape never rejects the request.
fn click_path_params(path: &str) -> (Cow<'_, str>, Cow<'_, str>) {
    let mut segments = path.trim_start_matches('/').splitn(3, '/').skip(1);
    let track_id = segments.next().unwrap_or_default();
    let target = segments.next().unwrap_or_default();
    (
        percent_decode_str(track_id).decode_utf8_lossy(),
        percent_decode_str(target).decode_utf8_lossy(),
    )
}

/// Record the click and redirect to the decoded target
pub async fn track_click(
    State(engine): State<Arc<TrackingEngine>>,
    uri: Uri,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    query: QueryParams,
) -> RedirectResponse {
    let (track_id, target_url) = click_path_params(uri.path());
    let request = ClickRequest::new(&track_id, &target_url, &query_map(query));
    let ctx = RequestContext::from_parts(&headers, addr);
    engine.handle_click(request, &ctx).await
}

pub async fn favicon() -> StatusCode {
    StatusCode::NO_CONTENT
}

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
}

pub async fn health_check() -> impl IntoResponse {
    Json(HealthResponse { status: "OK" })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_click_path_params() {
        let (id, target) = click_path_params("/click/mail-1/https%3A%2F%2Fexample.com%2Fa/b");
        assert_eq!(id, "mail-1");
        assert_eq!(target, "https://example.com/a/b");

        let (id, target) = click_path_params("/c/ab%FFc/example.com%C3%28");
        assert_eq!(id, "ab\u{FFFD}c");
        assert_eq!(target, "example.com\u{FFFD}(");

        let (id, target) = click_path_params("/click");
        assert_eq!(id, "");
        assert_eq!(target, "");
    }
}
