use crate::models::{
    ClickEvent, DimensionCount, GeoCacheEntry, NewClick, TrackDimension, TrackHit, TrackIdentity,
    TrackSnapshot, TrackSummary,
};
use anyhow::Result;
use async_trait::async_trait;

#[async_trait]
pub trait Storage: Send + Sync {
    /// Initialize the storage (create tables and indexes)
    async fn init(&self) -> Result<()>;

    /// Add snapshot columns missing from an older `tracks` table.
    /// Returns the names of the columns that were added.
    async fn migrate(&self) -> Result<Vec<String>>;

    /// Record one open or click for `track_id` as a single atomic
    /// insert-or-increment. The snapshot is only written when the row is
    /// created; an existing row gets its counter bumped and `last_seen`
    /// moved forward.
    async fn record_hit(
        &self,
        track_id: &str,
        hit: TrackHit,
        snapshot: &TrackSnapshot,
        now: i64,
    ) -> Result<TrackIdentity>;

    /// Append a click event
    async fn insert_click(&self, click: &NewClick) -> Result<ClickEvent>;

    /// Get a track by its identifier
    async fn get_track(&self, track_id: &str) -> Result<Option<TrackIdentity>>;

    /// All clicks recorded for a track, newest first
    async fn list_clicks(&self, track_id: &str) -> Result<Vec<ClickEvent>>;

    /// One page of tracks, most recently seen first
    async fn list_tracks(&self, limit: i64, offset: i64) -> Result<Vec<TrackIdentity>>;

    /// Every track, newest first
    async fn export_tracks(&self) -> Result<Vec<TrackIdentity>>;

    /// Totals across every track
    async fn summary(&self) -> Result<TrackSummary>;

    /// Track counts grouped by one enrichment column, largest first
    async fn group_counts(
        &self,
        dimension: TrackDimension,
        limit: i64,
    ) -> Result<Vec<DimensionCount>>;

    async fn get_geo_cache(&self, ip_address: &str) -> Result<Option<GeoCacheEntry>>;

    /// Insert or replace the cache entry for `ip_address`
    async fn put_geo_cache(&self, ip_address: &str, data: &str, cached_at: i64) -> Result<()>;
}
