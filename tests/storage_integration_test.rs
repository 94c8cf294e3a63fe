//! Integration tests for the storage backends
//!
//! Tests can be filtered by database backend using the DATABASE_BACKEND environment variable:
//! - `DATABASE_BACKEND=sqlite cargo test` - Run only SQLite tests
//! - `DATABASE_BACKEND=postgres cargo test` - Run only PostgreSQL tests
//! - By default, both backends are tested
//!
//! PostgreSQL tests are skipped unless DATABASE_URL points at a server.

use naarad::models::{NewClick, TrackDimension, TrackHit, TrackSnapshot};
use naarad::storage::{PostgresStorage, SqliteStorage, Storage};
use std::sync::Arc;

/// Get the database backend to test from environment variable
fn should_test_backend(backend: &str) -> bool {
    match std::env::var("DATABASE_BACKEND") {
        Ok(val) => val.to_lowercase() == backend.to_lowercase(),
        Err(_) => true,
    }
}

async fn create_sqlite_storage() -> Arc<dyn Storage> {
    let storage = SqliteStorage::new("sqlite::memory:", 1).await.unwrap();
    storage.init().await.unwrap();
    Arc::new(storage)
}

async fn create_postgres_storage() -> Option<Arc<dyn Storage>> {
    let db_url = std::env::var("DATABASE_URL").ok()?;
    if !db_url.starts_with("postgres") {
        return None;
    }
    let storage = PostgresStorage::new(&db_url, 5).await.ok()?;
    storage.init().await.ok()?;
    Some(Arc::new(storage))
}

/// Identifiers unique per run, for databases that outlive the test
fn unique_id(prefix: &str) -> String {
    format!("{}-{}", prefix, chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default())
}

fn snapshot(country: &str, browser: &str) -> TrackSnapshot {
    TrackSnapshot {
        country: Some(country.to_string()),
        browser: Some(browser.to_string()),
        device_type: Some("Desktop".to_string()),
        latitude: Some(48.8566),
        longitude: Some(2.3522),
        is_mobile: Some(false),
        is_bot: Some(false),
        ..Default::default()
    }
}

fn new_click(track_id: &str, timestamp: i64) -> NewClick {
    NewClick {
        timestamp,
        track_id: track_id.to_string(),
        campaign_id: None,
        link_id: "0a1b2c3d".to_string(),
        target_url: "https://example.com".to_string(),
        ip_address: "8.8.8.8".to_string(),
        country: "France".to_string(),
        city: "Paris".to_string(),
        user_agent: "curl/8.0".to_string(),
        browser: "Unknown".to_string(),
        os: "Unknown".to_string(),
        device_type: "Unknown".to_string(),
        referer: "Direct".to_string(),
    }
}

async fn check_concurrent_first_hits(storage: Arc<dyn Storage>) {
    let track_id = unique_id("burst");

    let mut handles = vec![];
    for i in 0..20 {
        let storage = Arc::clone(&storage);
        let track_id = track_id.clone();
        handles.push(tokio::spawn(async move {
            let country = format!("Country{}", i);
            storage
                .record_hit(&track_id, TrackHit::Open, &snapshot(&country, "Firefox"), 1_000 + i)
                .await
                .unwrap()
        }));
    }

    let mut winners = 0;
    for handle in handles {
        let track = handle.await.unwrap();
        if track.open_count == 1 {
            winners += 1;
        }
    }
    assert_eq!(winners, 1, "exactly one hit creates the identity");

    let track = storage.get_track(&track_id).await.unwrap().unwrap();
    assert_eq!(track.open_count, 20);
    assert_eq!(track.last_seen, 1_019);
    assert!(track.first_seen <= track.last_seen);
}

async fn check_snapshot_is_frozen(storage: Arc<dyn Storage>) {
    let track_id = unique_id("frozen");

    storage
        .record_hit(&track_id, TrackHit::Open, &snapshot("France", "Chrome"), 10)
        .await
        .unwrap();
    storage
        .record_hit(&track_id, TrackHit::Click, &snapshot("Japan", "Safari"), 20)
        .await
        .unwrap();
    let track = storage
        .record_hit(&track_id, TrackHit::Open, &snapshot("Brazil", "Edge"), 30)
        .await
        .unwrap();

    assert_eq!(track.open_count, 2);
    assert_eq!(track.click_count, 1);
    assert_eq!(track.country.as_deref(), Some("France"));
    assert_eq!(track.browser.as_deref(), Some("Chrome"));
    assert_eq!(track.latitude, Some(48.8566));
    assert_eq!(track.is_mobile, Some(false));
    assert_eq!(track.first_seen, 10);
    assert_eq!(track.last_seen, 30);
}

async fn check_clicks_are_appended(storage: Arc<dyn Storage>) {
    let track_id = unique_id("clicks");

    for ts in [100, 300, 200] {
        storage.insert_click(&new_click(&track_id, ts)).await.unwrap();
    }

    let clicks = storage.list_clicks(&track_id).await.unwrap();
    let timestamps: Vec<i64> = clicks.iter().map(|c| c.timestamp).collect();
    assert_eq!(timestamps, vec![300, 200, 100]);
    assert!(storage.get_track(&track_id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_concurrent_first_hits_sqlite() {
    if !should_test_backend("sqlite") {
        return;
    }
    check_concurrent_first_hits(create_sqlite_storage().await).await;
}

#[tokio::test]
async fn test_concurrent_first_hits_postgres() {
    if !should_test_backend("postgres") {
        return;
    }
    let Some(storage) = create_postgres_storage().await else {
        return;
    };
    check_concurrent_first_hits(storage).await;
}

#[tokio::test]
async fn test_snapshot_is_frozen_sqlite() {
    if !should_test_backend("sqlite") {
        return;
    }
    check_snapshot_is_frozen(create_sqlite_storage().await).await;
}

#[tokio::test]
async fn test_snapshot_is_frozen_postgres() {
    if !should_test_backend("postgres") {
        return;
    }
    let Some(storage) = create_postgres_storage().await else {
        return;
    };
    check_snapshot_is_frozen(storage).await;
}

#[tokio::test]
async fn test_clicks_are_appended_sqlite() {
    if !should_test_backend("sqlite") {
        return;
    }
    check_clicks_are_appended(create_sqlite_storage().await).await;
}

#[tokio::test]
async fn test_clicks_are_appended_postgres() {
    if !should_test_backend("postgres") {
        return;
    }
    let Some(storage) = create_postgres_storage().await else {
        return;
    };
    check_clicks_are_appended(storage).await;
}

#[tokio::test]
async fn test_migrate_is_idempotent_postgres() {
    if !should_test_backend("postgres") {
        return;
    }
    let Some(storage) = create_postgres_storage().await else {
        return;
    };
    assert!(storage.migrate().await.unwrap().is_empty());
    storage.init().await.unwrap();
    assert!(storage.migrate().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_group_counts_fill_missing_values_sqlite() {
    if !should_test_backend("sqlite") {
        return;
    }
    let storage = create_sqlite_storage().await;

    storage
        .record_hit("with-country", TrackHit::Open, &snapshot("France", "Chrome"), 1)
        .await
        .unwrap();
    storage
        .record_hit("no-country", TrackHit::Open, &TrackSnapshot::default(), 1)
        .await
        .unwrap();

    let rows = storage
        .group_counts(TrackDimension::Country, 10)
        .await
        .unwrap();
    let values: Vec<&str> = rows.iter().map(|r| r.value.as_str()).collect();
    assert_eq!(values, vec!["France", "Unknown"]);
}
