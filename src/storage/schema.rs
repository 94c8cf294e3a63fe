//! Table layout shared by the SQL backends
//!
//! The enrichment snapshot has three dozen columns; listing them once here
//! keeps the CREATE/INSERT/ALTER statements of both dialects in step with
//! `bind_snapshot!`.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ColumnKind {
    Text,
    Real,
    Bool,
}

/// Snapshot columns of `tracks`, in bind order. Must match `bind_snapshot!`.
pub(crate) const SNAPSHOT_COLUMNS: &[(&str, ColumnKind)] = &[
    ("campaign_id", ColumnKind::Text),
    ("label", ColumnKind::Text),
    ("sender", ColumnKind::Text),
    ("recipient", ColumnKind::Text),
    ("subject", ColumnKind::Text),
    ("sent_at", ColumnKind::Text),
    ("ip_address", ColumnKind::Text),
    ("country", ColumnKind::Text),
    ("region", ColumnKind::Text),
    ("city", ColumnKind::Text),
    ("latitude", ColumnKind::Real),
    ("longitude", ColumnKind::Real),
    ("timezone", ColumnKind::Text),
    ("isp", ColumnKind::Text),
    ("org", ColumnKind::Text),
    ("asn", ColumnKind::Text),
    ("user_agent", ColumnKind::Text),
    ("browser", ColumnKind::Text),
    ("browser_version", ColumnKind::Text),
    ("os", ColumnKind::Text),
    ("os_version", ColumnKind::Text),
    ("device_type", ColumnKind::Text),
    ("device_brand", ColumnKind::Text),
    ("is_mobile", ColumnKind::Bool),
    ("is_bot", ColumnKind::Bool),
    ("referer", ColumnKind::Text),
    ("accept_language", ColumnKind::Text),
    ("accept_encoding", ColumnKind::Text),
    ("accept_header", ColumnKind::Text),
    ("connection_type", ColumnKind::Text),
    ("do_not_track", ColumnKind::Text),
    ("cache_control", ColumnKind::Text),
    ("sec_ch_ua", ColumnKind::Text),
    ("sec_ch_ua_mobile", ColumnKind::Text),
    ("sec_ch_ua_platform", ColumnKind::Text),
];

/// Binds every `TrackSnapshot` field in `SNAPSHOT_COLUMNS` order
macro_rules! bind_snapshot {
    ($query:expr, $snapshot:expr) => {{
        let s = $snapshot;
        $query
            .bind(s.campaign_id.as_deref())
            .bind(s.label.as_deref())
            .bind(s.sender.as_deref())
            .bind(s.recipient.as_deref())
            .bind(s.subject.as_deref())
            .bind(s.sent_at.as_deref())
            .bind(s.ip_address.as_deref())
            .bind(s.country.as_deref())
            .bind(s.region.as_deref())
            .bind(s.city.as_deref())
            .bind(s.latitude)
            .bind(s.longitude)
            .bind(s.timezone.as_deref())
            .bind(s.isp.as_deref())
            .bind(s.org.as_deref())
            .bind(s.asn.as_deref())
            .bind(s.user_agent.as_deref())
            .bind(s.browser.as_deref())
            .bind(s.browser_version.as_deref())
            .bind(s.os.as_deref())
            .bind(s.os_version.as_deref())
            .bind(s.device_type.as_deref())
            .bind(s.device_brand.as_deref())
            .bind(s.is_mobile)
            .bind(s.is_bot)
            .bind(s.referer.as_deref())
            .bind(s.accept_language.as_deref())
            .bind(s.accept_encoding.as_deref())
            .bind(s.accept_header.as_deref())
            .bind(s.connection_type.as_deref())
            .bind(s.do_not_track.as_deref())
            .bind(s.cache_control.as_deref())
            .bind(s.sec_ch_ua.as_deref())
            .bind(s.sec_ch_ua_mobile.as_deref())
            .bind(s.sec_ch_ua_platform.as_deref())
    }};
}

pub(crate) use bind_snapshot;

const CLICK_COLUMNS: &[&str] = &[
    "timestamp",
    "track_id",
    "campaign_id",
    "link_id",
    "target_url",
    "ip_address",
    "country",
    "city",
    "user_agent",
    "browser",
    "os",
    "device_type",
    "referer",
];

pub(crate) const INDEX_STATEMENTS: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_track_id ON tracks(track_id)",
    "CREATE INDEX IF NOT EXISTS idx_last_seen ON tracks(last_seen)",
    "CREATE INDEX IF NOT EXISTS idx_country ON tracks(country)",
    "CREATE INDEX IF NOT EXISTS idx_device ON tracks(device_type)",
    "CREATE INDEX IF NOT EXISTS idx_clicks_track ON clicks(track_id)",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Dialect {
    Sqlite,
    Postgres,
}

impl Dialect {
    fn placeholders(self, count: usize) -> String {
        (1..=count)
            .map(|n| match self {
                Dialect::Sqlite => "?".to_string(),
                Dialect::Postgres => format!("${n}"),
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub(crate) fn column_type(self, kind: ColumnKind) -> &'static str {
        match (self, kind) {
            (_, ColumnKind::Text) => "TEXT",
            (Dialect::Sqlite, ColumnKind::Real) => "REAL",
            (Dialect::Postgres, ColumnKind::Real) => "DOUBLE PRECISION",
            (_, ColumnKind::Bool) => "BOOLEAN",
        }
    }

    fn id_column(self) -> &'static str {
        match self {
            Dialect::Sqlite => "id INTEGER PRIMARY KEY AUTOINCREMENT",
            Dialect::Postgres => "id BIGSERIAL PRIMARY KEY",
        }
    }

    fn integer(self) -> &'static str {
        match self {
            Dialect::Sqlite => "INTEGER",
            Dialect::Postgres => "BIGINT",
        }
    }

    fn greatest(self) -> &'static str {
        match self {
            Dialect::Sqlite => "MAX",
            Dialect::Postgres => "GREATEST",
        }
    }

    pub(crate) fn create_tracks_sql(self) -> String {
        let int = self.integer();
        let snapshot = SNAPSHOT_COLUMNS
            .iter()
            .map(|(name, kind)| format!("{name} {}", self.column_type(*kind)))
            .collect::<Vec<_>>()
            .join(",\n    ");

        format!(
            "CREATE TABLE IF NOT EXISTS tracks (
    {},
    track_id TEXT NOT NULL UNIQUE,
    {snapshot},
    open_count {int} NOT NULL DEFAULT 0,
    click_count {int} NOT NULL DEFAULT 0,
    first_seen {int} NOT NULL,
    last_seen {int} NOT NULL
)",
            self.id_column()
        )
    }

    pub(crate) fn create_clicks_sql(self) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS clicks (
    {},
    timestamp {} NOT NULL,
    track_id TEXT NOT NULL,
    campaign_id TEXT,
    link_id TEXT NOT NULL,
    target_url TEXT NOT NULL,
    ip_address TEXT,
    country TEXT,
    city TEXT,
    user_agent TEXT,
    browser TEXT,
    os TEXT,
    device_type TEXT,
    referer TEXT
)",
            self.id_column(),
            self.integer()
        )
    }

    pub(crate) fn create_geo_cache_sql(self) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS geo_cache (
    ip_address TEXT PRIMARY KEY,
    data TEXT NOT NULL,
    cached_at {} NOT NULL
)",
            self.integer()
        )
    }

    /// Insert-or-increment keyed by `track_id`. The enrichment snapshot is
    /// only written by the insert arm.
    pub(crate) fn upsert_track_sql(self) -> String {
        let snapshot_names = SNAPSHOT_COLUMNS
            .iter()
            .map(|(name, _)| *name)
            .collect::<Vec<_>>()
            .join(", ");
        let binds = SNAPSHOT_COLUMNS.len() + 5;

        format!(
            "INSERT INTO tracks (track_id, {snapshot_names}, open_count, click_count, first_seen, last_seen)
VALUES ({})
ON CONFLICT (track_id) DO UPDATE SET
    open_count = tracks.open_count + excluded.open_count,
    click_count = tracks.click_count + excluded.click_count,
    last_seen = {}(tracks.last_seen, excluded.last_seen)
RETURNING *",
            self.placeholders(binds),
            self.greatest()
        )
    }

    pub(crate) fn insert_click_sql(self) -> String {
        format!(
            "INSERT INTO clicks ({})
VALUES ({})
RETURNING *",
            CLICK_COLUMNS.join(", "),
            self.placeholders(CLICK_COLUMNS.len())
        )
    }

    pub(crate) fn add_column_sql(self, name: &str, kind: ColumnKind) -> String {
        let guard = match self {
            Dialect::Sqlite => "",
            Dialect::Postgres => "IF NOT EXISTS ",
        };
        format!(
            "ALTER TABLE tracks ADD COLUMN {guard}{name} {}",
            self.column_type(kind)
        )
    }

    pub(crate) fn group_counts_sql(self, column: &str) -> String {
        let limit = match self {
            Dialect::Sqlite => "?",
            Dialect::Postgres => "$1",
        };
        format!(
            "SELECT COALESCE({column}, 'Unknown') AS value, COUNT(*) AS count
FROM tracks
GROUP BY 1
ORDER BY 2 DESC, 1
LIMIT {limit}"
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upsert_has_one_placeholder_per_column() {
        let sql = Dialect::Postgres.upsert_track_sql();
        assert!(sql.contains("$40"));
        assert!(!sql.contains("$41"));
        assert_eq!(SNAPSHOT_COLUMNS.len(), 35);

        let sqlite = Dialect::Sqlite.upsert_track_sql();
        assert_eq!(sqlite.matches('?').count(), 40);
        assert!(sqlite.contains("MAX(tracks.last_seen"));
    }

    #[test]
    fn test_postgres_types() {
        let sql = Dialect::Postgres.create_tracks_sql();
        assert!(sql.contains("latitude DOUBLE PRECISION"));
        assert!(sql.contains("open_count BIGINT"));
        assert!(sql.contains("id BIGSERIAL PRIMARY KEY"));
    }

    #[test]
    fn test_add_column_guard() {
        assert_eq!(
            Dialect::Sqlite.add_column_sql("org", ColumnKind::Text),
            "ALTER TABLE tracks ADD COLUMN org TEXT"
        );
        assert_eq!(
            Dialect::Postgres.add_column_sql("is_bot", ColumnKind::Bool),
            "ALTER TABLE tracks ADD COLUMN IF NOT EXISTS is_bot BOOLEAN"
        );
    }

    #[test]
    fn test_click_insert_placeholders() {
        let sql = Dialect::Postgres.insert_click_sql();
        assert!(sql.contains("$13"));
        assert!(!sql.contains("$14"));
    }
}
