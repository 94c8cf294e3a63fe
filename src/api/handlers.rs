use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use csv::WriterBuilder;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::models::{ClickEvent, DimensionCount, TrackDimension, TrackIdentity, TrackSummary};
use crate::storage::Storage;
use crate::tracking::sanitize::sanitize_id;

const TOP_COUNTRIES: i64 = 10;
const BREAKDOWN_LIMIT: i64 = 50;
const GENERATED_ID_LEN: usize = 12;
const DEFAULT_PAGE_SIZE: i64 = 100;
const MAX_PAGE_SIZE: i64 = 500;

/// Everything but `A-Za-z0-9-._~` is escaped inside a click path
const PATH_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

pub struct AppState {
    pub storage: Arc<dyn Storage>,
    /// Prefix for generated URLs, without a trailing slash
    pub public_base_url: String,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub(super) type ApiError = (StatusCode, Json<ErrorResponse>);

pub(super) fn api_error(status: StatusCode, message: &str) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.to_string(),
        }),
    )
}

pub(super) fn internal_error(err: anyhow::Error) -> ApiError {
    tracing::error!(error = %err, "storage query failed");
    api_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
}

#[derive(Serialize)]
pub struct StatsResponse {
    pub summary: TrackSummary,
    pub geographic: Vec<DimensionCount>,
    pub devices: Vec<DimensionCount>,
    pub browsers: Vec<DimensionCount>,
}

#[derive(Serialize)]
pub struct TrackDetailResponse {
    pub track: TrackIdentity,
    pub clicks: Vec<ClickEvent>,
}

#[derive(Serialize)]
pub struct TrackListResponse {
    pub tracks: Vec<TrackIdentity>,
    pub total: i64,
}

#[derive(Serialize)]
pub struct ExportResponse {
    pub tracks: Vec<TrackIdentity>,
}

#[derive(Deserialize)]
pub struct GenerateRequest {
    #[serde(default)]
    pub track_id: Option<String>,
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct GeneratedLinks {
    pub track_id: String,
    pub pixel_url: String,
    pub click_url: String,
}

fn generate_track_id() -> String {
    const CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    std::iter::repeat_with(|| CHARS[rand::random_range(0..CHARS.len())] as char)
        .take(GENERATED_ID_LEN)
        .collect()
}

/// Pixel and click URLs for a track id and destination
pub fn build_links(base_url: &str, track_id: &str, target_url: &str) -> GeneratedLinks {
    let base = base_url.trim_end_matches('/');
    let encoded = utf8_percent_encode(target_url, PATH_COMPONENT);
    GeneratedLinks {
        track_id: track_id.to_string(),
        pixel_url: format!("{}/track?id={}", base, track_id),
        click_url: format!("{}/click/{}/{}", base, track_id, encoded),
    }
}

/// Aggregate counters and the top enrichment values
pub async fn stats(
    State(state): State<Arc<AppState>>,
) -> Result<Json<StatsResponse>, ApiError> {
    let storage = &state.storage;

    let summary = storage.summary().await.map_err(internal_error)?;
    let geographic = storage
        .group_counts(TrackDimension::Country, TOP_COUNTRIES)
        .await
        .map_err(internal_error)?;
    let devices = storage
        .group_counts(TrackDimension::DeviceType, BREAKDOWN_LIMIT)
        .await
        .map_err(internal_error)?;
    let browsers = storage
        .group_counts(TrackDimension::Browser, BREAKDOWN_LIMIT)
        .await
        .map_err(internal_error)?;

    Ok(Json(StatsResponse {
        summary,
        geographic,
        devices,
        browsers,
    }))
}

/// `limit` clamped to `[0, 500]`, `offset` to non-negative. Unparsable
/// values fall back to the defaults.
fn page_params(query: &HashMap<String, String>) -> (i64, i64) {
    let number = |key: &str| query.get(key).and_then(|v| v.trim().parse::<i64>().ok());
    let limit = number("limit")
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(0, MAX_PAGE_SIZE);
    let offset = number("offset").unwrap_or(0).max(0);
    (limit, offset)
}

/// Tracks ordered by `last_seen`, paginated
pub async fn list_tracks(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<TrackListResponse>, ApiError> {
    let (limit, offset) = page_params(&query);

    let tracks = state
        .storage
        .list_tracks(limit, offset)
        .await
        .map_err(internal_error)?;
    let total = state
        .storage
        .summary()
        .await
        .map_err(internal_error)?
        .total_unique;

    Ok(Json(TrackListResponse { tracks, total }))
}

fn tracks_to_csv(tracks: &[TrackIdentity]) -> anyhow::Result<Vec<u8>> {
    let mut writer = WriterBuilder::new().from_writer(Vec::new());
    for track in tracks {
        writer.serialize(track)?;
    }
    writer
        .into_inner()
        .map_err(|err| anyhow::Error::new(err.into_error()))
}

/// Every track as JSON, or as a CSV attachment with `format=csv`
pub async fn export(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Response, ApiError> {
    let tracks = state
        .storage
        .export_tracks()
        .await
        .map_err(internal_error)?;

    let wants_csv = query.get("format").map(String::as_str) == Some("csv");
    if wants_csv && !tracks.is_empty() {
        let body = tracks_to_csv(&tracks).map_err(internal_error)?;
        return Ok((
            [
                (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
                (header::CONTENT_DISPOSITION, "attachment; filename=export.csv"),
            ],
            body,
        )
            .into_response());
    }

    Ok(Json(ExportResponse { tracks }).into_response())
}

/// One track with its clicks, newest first
pub async fn track_detail(
    State(state): State<Arc<AppState>>,
    Path(track_id): Path<String>,
) -> Result<Json<TrackDetailResponse>, ApiError> {
    let track_id = sanitize_id(&track_id);

    let track = state
        .storage
        .get_track(&track_id)
        .await
        .map_err(internal_error)?
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "Not found"))?;
    let clicks = state
        .storage
        .list_clicks(&track_id)
        .await
        .map_err(internal_error)?;

    Ok(Json(TrackDetailResponse { track, clicks }))
}

/// Build pixel and click URLs; a random id is issued when none is given
pub async fn generate(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<GenerateRequest>,
) -> Result<Json<GeneratedLinks>, ApiError> {
    let url = payload.url.trim();
    if url.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "URL required"));
    }

    let track_id = match payload.track_id.as_deref().map(str::trim) {
        Some(id) if !id.is_empty() => sanitize_id(id),
        _ => generate_track_id(),
    };

    Ok(Json(build_links(&state.public_base_url, &track_id, url)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_alphanumeric() {
        let a = generate_track_id();
        let b = generate_track_id();
        assert_eq!(a.len(), GENERATED_ID_LEN);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }

    #[test]
    fn test_page_params() {
        let query = |pairs: &[(&str, &str)]| -> HashMap<String, String> {
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
        };
        assert_eq!(page_params(&query(&[])), (100, 0));
        assert_eq!(page_params(&query(&[("limit", "20"), ("offset", "40")])), (20, 40));
        assert_eq!(page_params(&query(&[("limit", "9000")])), (500, 0));
        assert_eq!(page_params(&query(&[("limit", "-3"), ("offset", "-1")])), (0, 0));
        assert_eq!(page_params(&query(&[("limit", "ten")])), (100, 0));
    }

    #[test]
    fn test_build_links() {
        let links = build_links("https://t.example.com/", "abc", "https://shop.example.com/a b?x=1");
        assert_eq!(links.pixel_url, "https://t.example.com/track?id=abc");
        assert_eq!(
            links.click_url,
            "https://t.example.com/click/abc/https%3A%2F%2Fshop.example.com%2Fa%20b%3Fx%3D1"
        );

        let relative = build_links("", "abc", "example.com");
        assert_eq!(relative.pixel_url, "/track?id=abc");
        assert_eq!(relative.click_url, "/click/abc/example.com");
    }
}
