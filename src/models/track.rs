use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::analytics::{GeoFacts, RequestContext, UaFacts};

/// One tracked subject (e.g. one sent email), keyed by `track_id`.
///
/// Enrichment columns hold the facts of the first request that created the
/// row; later hits only move the counters and `last_seen`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct TrackIdentity {
    pub id: i64,
    pub track_id: String,
    pub campaign_id: Option<String>,
    pub label: Option<String>,
    pub sender: Option<String>,
    pub recipient: Option<String>,
    pub subject: Option<String>,
    pub sent_at: Option<String>,
    pub ip_address: Option<String>,
    pub country: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub timezone: Option<String>,
    pub isp: Option<String>,
    pub org: Option<String>,
    pub asn: Option<String>,
    pub user_agent: Option<String>,
    pub browser: Option<String>,
    pub browser_version: Option<String>,
    pub os: Option<String>,
    pub os_version: Option<String>,
    pub device_type: Option<String>,
    pub device_brand: Option<String>,
    pub is_mobile: Option<bool>,
    pub is_bot: Option<bool>,
    pub referer: Option<String>,
    pub accept_language: Option<String>,
    pub accept_encoding: Option<String>,
    pub accept_header: Option<String>,
    pub connection_type: Option<String>,
    pub do_not_track: Option<String>,
    pub cache_control: Option<String>,
    pub sec_ch_ua: Option<String>,
    pub sec_ch_ua_mobile: Option<String>,
    pub sec_ch_ua_platform: Option<String>,
    pub open_count: i64,
    pub click_count: i64,
    /// Unix timestamp (milliseconds)
    pub first_seen: i64,
    /// Unix timestamp (milliseconds)
    pub last_seen: i64,
}

/// Email context supplied on the pixel URL
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmailContext {
    pub campaign_id: Option<String>,
    pub label: Option<String>,
    pub sender: Option<String>,
    pub recipient: Option<String>,
    pub subject: Option<String>,
    pub sent_at: Option<String>,
}

/// Enrichment snapshot written when a `TrackIdentity` is created.
///
/// Field order here is irrelevant; the column order lives in
/// `storage::schema::SNAPSHOT_COLUMNS`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackSnapshot {
    pub campaign_id: Option<String>,
    pub label: Option<String>,
    pub sender: Option<String>,
    pub recipient: Option<String>,
    pub subject: Option<String>,
    pub sent_at: Option<String>,
    pub ip_address: Option<String>,
    pub country: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub timezone: Option<String>,
    pub isp: Option<String>,
    pub org: Option<String>,
    pub asn: Option<String>,
    pub user_agent: Option<String>,
    pub browser: Option<String>,
    pub browser_version: Option<String>,
    pub os: Option<String>,
    pub os_version: Option<String>,
    pub device_type: Option<String>,
    pub device_brand: Option<String>,
    pub is_mobile: Option<bool>,
    pub is_bot: Option<bool>,
    pub referer: Option<String>,
    pub accept_language: Option<String>,
    pub accept_encoding: Option<String>,
    pub accept_header: Option<String>,
    pub connection_type: Option<String>,
    pub do_not_track: Option<String>,
    pub cache_control: Option<String>,
    pub sec_ch_ua: Option<String>,
    pub sec_ch_ua_mobile: Option<String>,
    pub sec_ch_ua_platform: Option<String>,
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

impl TrackSnapshot {
    /// Everything known at a pixel open
    pub fn for_open(
        email: EmailContext,
        ctx: &RequestContext,
        geo: &GeoFacts,
        ua: &UaFacts,
    ) -> Self {
        Self {
            campaign_id: email.campaign_id,
            label: email.label,
            sender: email.sender,
            recipient: email.recipient,
            subject: email.subject,
            sent_at: email.sent_at,
            ip_address: Some(ctx.client_ip.clone()),
            country: Some(geo.country.clone()),
            region: Some(geo.region.clone()),
            city: Some(geo.city.clone()),
            latitude: Some(geo.latitude),
            longitude: Some(geo.longitude),
            timezone: Some(geo.timezone.clone()),
            isp: Some(geo.isp.clone()),
            org: Some(geo.org.clone()),
            asn: Some(geo.asn.clone()),
            user_agent: Some(ctx.user_agent.clone()),
            browser: Some(ua.browser.clone()),
            browser_version: Some(ua.browser_version.clone()),
            os: Some(ua.os.clone()),
            os_version: Some(ua.os_version.clone()),
            device_type: Some(ua.device_type.to_string()),
            device_brand: Some(ua.device_brand.clone()),
            is_mobile: Some(ua.is_mobile),
            is_bot: Some(ua.is_bot),
            referer: Some(ctx.referer.clone()),
            accept_language: non_empty(&ctx.accept_language),
            accept_encoding: non_empty(&ctx.accept_encoding),
            accept_header: non_empty(&ctx.accept),
            connection_type: non_empty(&ctx.connection),
            do_not_track: non_empty(&ctx.do_not_track),
            cache_control: non_empty(&ctx.cache_control),
            sec_ch_ua: non_empty(&ctx.sec_ch_ua),
            sec_ch_ua_mobile: non_empty(&ctx.sec_ch_ua_mobile),
            sec_ch_ua_platform: non_empty(&ctx.sec_ch_ua_platform),
        }
    }

    /// The partial snapshot available when a click creates the identity
    pub fn for_click(
        campaign_id: Option<String>,
        ctx: &RequestContext,
        geo: &GeoFacts,
        ua: &UaFacts,
    ) -> Self {
        Self {
            campaign_id,
            ip_address: Some(ctx.client_ip.clone()),
            country: Some(geo.country.clone()),
            region: Some(geo.region.clone()),
            city: Some(geo.city.clone()),
            latitude: Some(geo.latitude),
            longitude: Some(geo.longitude),
            user_agent: Some(ctx.user_agent.clone()),
            browser: Some(ua.browser.clone()),
            os: Some(ua.os.clone()),
            device_type: Some(ua.device_type.to_string()),
            referer: Some(ctx.referer.clone()),
            ..Default::default()
        }
    }
}

/// Which counter a hit increments
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackHit {
    Open,
    Click,
}

impl TrackHit {
    /// `(open_count, click_count)` deltas
    pub fn deltas(self) -> (i64, i64) {
        match self {
            TrackHit::Open => (1, 0),
            TrackHit::Click => (0, 1),
        }
    }
}

/// Append-only record of one link click
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ClickEvent {
    pub id: i64,
    /// Unix timestamp (milliseconds)
    pub timestamp: i64,
    pub track_id: String,
    pub campaign_id: Option<String>,
    pub link_id: String,
    pub target_url: String,
    pub ip_address: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub user_agent: Option<String>,
    pub browser: Option<String>,
    pub os: Option<String>,
    pub device_type: Option<String>,
    pub referer: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewClick {
    pub timestamp: i64,
    pub track_id: String,
    pub campaign_id: Option<String>,
    pub link_id: String,
    pub target_url: String,
    pub ip_address: String,
    pub country: String,
    pub city: String,
    pub user_agent: String,
    pub browser: String,
    pub os: String,
    pub device_type: String,
    pub referer: String,
}

/// Memoized geolocation result. `data` is the JSON encoded `GeoFacts`.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct GeoCacheEntry {
    pub ip_address: String,
    pub data: String,
    /// Unix timestamp (milliseconds)
    pub cached_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrackSummary {
    pub total_unique: i64,
    pub total_opens: i64,
    pub total_clicks: i64,
    pub avg_opens: f64,
}

impl TrackSummary {
    pub fn from_totals(total_unique: i64, total_opens: i64, total_clicks: i64) -> Self {
        let avg = total_opens as f64 / total_unique.max(1) as f64;
        Self {
            total_unique,
            total_opens,
            total_clicks,
            avg_opens: (avg * 100.0).round() / 100.0,
        }
    }
}

/// Column that `group_counts` aggregates over
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackDimension {
    Country,
    DeviceType,
    Browser,
}

impl TrackDimension {
    pub fn column(self) -> &'static str {
        match self {
            TrackDimension::Country => "country",
            TrackDimension::DeviceType => "device_type",
            TrackDimension::Browser => "browser",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct DimensionCount {
    pub value: String,
    pub count: i64,
}
