use crate::models::{
    ClickEvent, DimensionCount, GeoCacheEntry, NewClick, TrackDimension, TrackHit, TrackIdentity,
    TrackSnapshot, TrackSummary,
};
use crate::storage::schema::{bind_snapshot, Dialect, INDEX_STATEMENTS, SNAPSHOT_COLUMNS};
use crate::storage::Storage;
use anyhow::Result;
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;

const DIALECT: Dialect = Dialect::Postgres;

pub struct PostgresStorage {
    pool: Arc<PgPool>,
    upsert_track_sql: String,
    insert_click_sql: String,
}

impl PostgresStorage {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self {
            pool: Arc::new(pool),
            upsert_track_sql: DIALECT.upsert_track_sql(),
            insert_click_sql: DIALECT.insert_click_sql(),
        })
    }
}

#[async_trait]
impl Storage for PostgresStorage {
    async fn init(&self) -> Result<()> {
        for statement in [
            DIALECT.create_tracks_sql(),
            DIALECT.create_clicks_sql(),
            DIALECT.create_geo_cache_sql(),
        ] {
            sqlx::query(&statement)
                .execute(self.pool.as_ref())
                .await?;
        }

        self.migrate().await?;

        for statement in INDEX_STATEMENTS {
            sqlx::query(*statement)
                .execute(self.pool.as_ref())
                .await?;
        }

        Ok(())
    }

    async fn migrate(&self) -> Result<Vec<String>> {
        let existing = sqlx::query_scalar::<_, String>(
            r#"
            SELECT column_name::TEXT FROM information_schema.columns
            WHERE table_schema = current_schema() AND table_name = 'tracks'
            "#,
        )
        .fetch_all(self.pool.as_ref())
        .await?;

        let mut added = Vec::new();
        for (name, kind) in SNAPSHOT_COLUMNS {
            if existing.iter().any(|c| c == name) {
                continue;
            }
            sqlx::query(&DIALECT.add_column_sql(name, *kind))
                .execute(self.pool.as_ref())
                .await?;
            added.push(name.to_string());
        }

        Ok(added)
    }

    async fn record_hit(
        &self,
        track_id: &str,
        hit: TrackHit,
        snapshot: &TrackSnapshot,
        now: i64,
    ) -> Result<TrackIdentity> {
        let (opens, clicks) = hit.deltas();

        let query = sqlx::query_as::<_, TrackIdentity>(&self.upsert_track_sql).bind(track_id);
        let track = bind_snapshot!(query, snapshot)
            .bind(opens)
            .bind(clicks)
            .bind(now)
            .bind(now)
            .fetch_one(self.pool.as_ref())
            .await?;

        Ok(track)
    }

    async fn insert_click(&self, click: &NewClick) -> Result<ClickEvent> {
        let event = sqlx::query_as::<_, ClickEvent>(&self.insert_click_sql)
            .bind(click.timestamp)
            .bind(&click.track_id)
            .bind(click.campaign_id.as_deref())
            .bind(&click.link_id)
            .bind(&click.target_url)
            .bind(&click.ip_address)
            .bind(&click.country)
            .bind(&click.city)
            .bind(&click.user_agent)
            .bind(&click.browser)
            .bind(&click.os)
            .bind(&click.device_type)
            .bind(&click.referer)
            .fetch_one(self.pool.as_ref())
            .await?;

        Ok(event)
    }

    async fn get_track(&self, track_id: &str) -> Result<Option<TrackIdentity>> {
        let track = sqlx::query_as::<_, TrackIdentity>(
            r#"
            SELECT * FROM tracks
            WHERE track_id = $1
            "#,
        )
        .bind(track_id)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(track)
    }

    async fn list_clicks(&self, track_id: &str) -> Result<Vec<ClickEvent>> {
        let clicks = sqlx::query_as::<_, ClickEvent>(
            r#"
            SELECT * FROM clicks
            WHERE track_id = $1
            ORDER BY timestamp DESC, id DESC
            "#,
        )
        .bind(track_id)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(clicks)
    }

    async fn list_tracks(&self, limit: i64, offset: i64) -> Result<Vec<TrackIdentity>> {
        let tracks = sqlx::query_as::<_, TrackIdentity>(
            r#"
            SELECT * FROM tracks
            ORDER BY last_seen DESC, id DESC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(tracks)
    }

    async fn export_tracks(&self) -> Result<Vec<TrackIdentity>> {
        let tracks = sqlx::query_as::<_, TrackIdentity>(
            "SELECT * FROM tracks ORDER BY first_seen DESC, id DESC",
        )
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(tracks)
    }

    async fn summary(&self) -> Result<TrackSummary> {
        // SUM(BIGINT) is NUMERIC in PostgreSQL
        let (total, opens, clicks) = sqlx::query_as::<_, (i64, i64, i64)>(
            r#"
            SELECT COUNT(*),
                   COALESCE(SUM(open_count), 0)::BIGINT,
                   COALESCE(SUM(click_count), 0)::BIGINT
            FROM tracks
            "#,
        )
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(TrackSummary::from_totals(total, opens, clicks))
    }

    async fn group_counts(
        &self,
        dimension: TrackDimension,
        limit: i64,
    ) -> Result<Vec<DimensionCount>> {
        let sql = DIALECT.group_counts_sql(dimension.column());
        let rows = sqlx::query_as::<_, DimensionCount>(&sql)
            .bind(limit)
            .fetch_all(self.pool.as_ref())
            .await?;

        Ok(rows)
    }

    async fn get_geo_cache(&self, ip_address: &str) -> Result<Option<GeoCacheEntry>> {
        let entry = sqlx::query_as::<_, GeoCacheEntry>(
            r#"
            SELECT ip_address, data, cached_at
            FROM geo_cache
            WHERE ip_address = $1
            "#,
        )
        .bind(ip_address)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(entry)
    }

    async fn put_geo_cache(&self, ip_address: &str, data: &str, cached_at: i64) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO geo_cache (ip_address, data, cached_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (ip_address) DO UPDATE SET
                data = excluded.data,
                cached_at = excluded.cached_at
            "#,
        )
        .bind(ip_address)
        .bind(data)
        .bind(cached_at)
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }
}
