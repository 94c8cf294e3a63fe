//! Open and click recording
//!
//! Both paths are fail-open: [`TrackingEngine::handle_open`] always yields the
//! pixel and [`TrackingEngine::handle_click`] always yields the redirect.
//! Enrichment degrades to sentinels, store errors are logged, and webhook
//! notifications run on their own task after a successful write.

use anyhow::Result;
use chrono::Utc;
use percent_encoding::percent_decode_str;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use super::response::{PixelResponse, RedirectResponse};
use super::sanitize::{normalize_target_url, sanitize_id, short_hash};
use crate::analytics::{classify, GeoResolver, RequestContext};
use crate::models::{ClickEvent, EmailContext, NewClick, TrackHit, TrackIdentity, TrackSnapshot};
use crate::notify::{EventKind, Notification, Notifier};
use crate::storage::Storage;

/// First non-empty value among `keys`
fn first_param(query: &HashMap<String, String>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| query.get(*key))
        .map(|value| value.trim())
        .find(|value| !value.is_empty())
        .map(str::to_string)
}

/// A pixel hit, sanitized
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenRequest {
    pub track_id: String,
    pub email: EmailContext,
}

impl OpenRequest {
    /// `path_id` (from `/t/{track_id}`) wins over the `id` query parameter
    pub fn from_query(path_id: Option<&str>, query: &HashMap<String, String>) -> Self {
        let raw_id = path_id
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .or_else(|| first_param(query, &["id"]))
            .unwrap_or_default();

        Self {
            track_id: sanitize_id(&raw_id),
            email: EmailContext {
                campaign_id: first_param(query, &["c", "campaign"]),
                label: first_param(query, &["label"]),
                sender: first_param(query, &["sender", "from"]),
                recipient: first_param(query, &["recipient", "to"]),
                subject: first_param(query, &["subject"]),
                sent_at: first_param(query, &["sent_at"]),
            },
        }
    }
}

/// A link click, sanitized and with its target normalized
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClickRequest {
    pub track_id: String,
    pub target_url: String,
    pub campaign_id: Option<String>,
}

impl ClickRequest {
    /// Path values are decoded once more here, so a target that was
    /// percent-encoded inside the path survives the router's own decoding.
    pub fn new(raw_track_id: &str, raw_target: &str, query: &HashMap<String, String>) -> Self {
        Self {
            track_id: sanitize_id(&percent_decode_str(raw_track_id).decode_utf8_lossy()),
            target_url: normalize_target_url(raw_target),
            campaign_id: first_param(query, &["c"]),
        }
    }
}

pub struct TrackingEngine {
    store: Arc<dyn Storage>,
    geo: Arc<GeoResolver>,
    notifier: Arc<dyn Notifier>,
}

impl TrackingEngine {
    pub fn new(
        store: Arc<dyn Storage>,
        geo: Arc<GeoResolver>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            geo,
            notifier,
        }
    }

    pub async fn handle_open(&self, request: OpenRequest, ctx: &RequestContext) -> PixelResponse {
        if let Err(err) = self.record_open(&request, ctx).await {
            warn!(track_id = %request.track_id, error = %err, "failed to record open");
        }
        PixelResponse
    }

    pub async fn handle_click(
        &self,
        request: ClickRequest,
        ctx: &RequestContext,
    ) -> RedirectResponse {
        if let Err(err) = self.record_click(&request, ctx).await {
            warn!(track_id = %request.track_id, error = %err, "failed to record click");
        }
        RedirectResponse::new(request.target_url)
    }

    /// Enrich and store one open. The first open of an identifier writes
    /// the full snapshot, later opens only move the counters.
    pub async fn record_open(
        &self,
        request: &OpenRequest,
        ctx: &RequestContext,
    ) -> Result<TrackIdentity> {
        let geo = self.geo.resolve(&ctx.client_ip).await;
        let ua = classify(&ctx.user_agent);
        let snapshot = TrackSnapshot::for_open(request.email.clone(), ctx, &geo, &ua);

        let track = self
            .store
            .record_hit(&request.track_id, TrackHit::Open, &snapshot, now_ms())
            .await?;
        debug!(track_id = %track.track_id, open_count = track.open_count, "open recorded");

        self.dispatch(Notification::new(
            EventKind::Open,
            json!({
                "track_id": track.track_id,
                "location": geo.location_summary(),
            }),
        ));

        Ok(track)
    }

    /// Append the click event, then create or bump the identity
    pub async fn record_click(
        &self,
        request: &ClickRequest,
        ctx: &RequestContext,
    ) -> Result<(ClickEvent, TrackIdentity)> {
        let geo = self.geo.resolve(&ctx.client_ip).await;
        let ua = classify(&ctx.user_agent);
        let now = now_ms();

        let click = self
            .store
            .insert_click(&NewClick {
                timestamp: now,
                track_id: request.track_id.clone(),
                campaign_id: request.campaign_id.clone(),
                link_id: short_hash(&request.target_url),
                target_url: request.target_url.clone(),
                ip_address: ctx.client_ip.clone(),
                country: geo.country.clone(),
                city: geo.city.clone(),
                user_agent: ctx.user_agent.clone(),
                browser: ua.browser.clone(),
                os: ua.os.clone(),
                device_type: ua.device_type.to_string(),
                referer: ctx.referer.clone(),
            })
            .await?;

        let snapshot = TrackSnapshot::for_click(request.campaign_id.clone(), ctx, &geo, &ua);
        let track = self
            .store
            .record_hit(&request.track_id, TrackHit::Click, &snapshot, now)
            .await?;
        debug!(track_id = %track.track_id, link_id = %click.link_id, "click recorded");

        self.dispatch(Notification::new(
            EventKind::Click,
            json!({
                "track_id": track.track_id,
                "url": click.target_url,
            }),
        ));

        Ok((click, track))
    }

    fn dispatch(&self, notification: Notification) {
        let notifier = self.notifier.clone();
        tokio::spawn(async move {
            if let Err(err) = notifier.notify(&notification).await {
                warn!(event = ?notification.event, error = %err, "webhook notification failed");
            }
        });
    }
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::{DeviceType, GeoError, GeoFacts, GeoProvider};
    use crate::notify::NotifyError;
    use crate::storage::SqliteStorage;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::time::Duration;
    use tokio::sync::mpsc;

    const CHROME_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36";
    const IPHONE_UA: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1";

    struct CityProvider;

    #[async_trait]
    impl GeoProvider for CityProvider {
        async fn lookup(&self, ip: &str) -> Result<GeoFacts, GeoError> {
            Ok(GeoFacts {
                country: "France".to_string(),
                city: format!("Paris ({})", ip),
                ..GeoFacts::unknown()
            })
        }

        fn name(&self) -> &'static str {
            "city"
        }
    }

    struct ChannelNotifier(mpsc::UnboundedSender<(EventKind, Value)>);

    #[async_trait]
    impl Notifier for ChannelNotifier {
        async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
            let _ = self
                .0
                .send((notification.event, notification.data.clone()));
            Ok(())
        }
    }

    struct Harness {
        engine: Arc<TrackingEngine>,
        store: Arc<dyn Storage>,
        notifications: mpsc::UnboundedReceiver<(EventKind, Value)>,
    }

    async fn harness_with(store: SqliteStorage) -> Harness {
        let store: Arc<dyn Storage> = Arc::new(store);
        let geo = Arc::new(GeoResolver::new(
            Arc::new(CityProvider),
            store.clone(),
            Duration::from_secs(3600),
            Duration::from_secs(1),
        ));
        let (tx, notifications) = mpsc::unbounded_channel();
        let engine = Arc::new(TrackingEngine::new(
            store.clone(),
            geo,
            Arc::new(ChannelNotifier(tx)),
        ));
        Harness {
            engine,
            store,
            notifications,
        }
    }

    async fn harness() -> Harness {
        let store = SqliteStorage::new("sqlite::memory:", 1).await.unwrap();
        store.init().await.unwrap();
        harness_with(store).await
    }

    fn ctx(ip: &str, user_agent: &str) -> RequestContext {
        RequestContext {
            client_ip: ip.to_string(),
            user_agent: user_agent.to_string(),
            referer: "Direct".to_string(),
            ..Default::default()
        }
    }

    fn open_request(id: &str) -> OpenRequest {
        let query = HashMap::from([
            ("id".to_string(), id.to_string()),
            ("c".to_string(), "spring".to_string()),
            ("to".to_string(), "reader@example.com".to_string()),
        ]);
        OpenRequest::from_query(None, &query)
    }

    async fn next_notification(
        notifications: &mut mpsc::UnboundedReceiver<(EventKind, Value)>,
    ) -> (EventKind, Value) {
        tokio::time::timeout(Duration::from_secs(2), notifications.recv())
            .await
            .unwrap()
            .unwrap()
    }

    #[test]
    fn test_open_request_from_query() {
        let query = HashMap::from([
            ("id".to_string(), "query-id".to_string()),
            ("campaign".to_string(), "launch".to_string()),
            ("from".to_string(), "team@example.com".to_string()),
            ("recipient".to_string(), "".to_string()),
            ("to".to_string(), "a@example.com".to_string()),
            ("subject".to_string(), "Hello".to_string()),
        ]);

        let request = OpenRequest::from_query(None, &query);
        assert_eq!(request.track_id, "query-id");
        assert_eq!(request.email.campaign_id.as_deref(), Some("launch"));
        assert_eq!(request.email.sender.as_deref(), Some("team@example.com"));
        assert_eq!(request.email.recipient.as_deref(), Some("a@example.com"));
        assert_eq!(request.email.subject.as_deref(), Some("Hello"));
        assert_eq!(request.email.sent_at, None);

        let request = OpenRequest::from_query(Some("path<id>"), &query);
        assert_eq!(request.track_id, "pathid");

        let request = OpenRequest::from_query(None, &HashMap::new());
        assert_eq!(request.track_id, "unknown");
    }

    #[test]
    fn test_click_request_new() {
        let query = HashMap::from([("c".to_string(), "spring".to_string())]);
        let request = ClickRequest::new("user%40x", "example.com%2Fpricing", &query);

        assert_eq!(request.track_id, "user@x");
        assert_eq!(request.target_url, "https://example.com/pricing");
        assert_eq!(request.campaign_id.as_deref(), Some("spring"));
    }

    #[tokio::test]
    async fn test_repeat_opens_count_and_keep_first_snapshot() {
        let mut h = harness().await;

        let first = h
            .engine
            .record_open(&open_request("email-1"), &ctx("8.8.8.8", CHROME_UA))
            .await
            .unwrap();
        assert_eq!(first.open_count, 1);
        assert_eq!(first.first_seen, first.last_seen);

        let mut previous_last_seen = first.last_seen;
        for n in 2..=4 {
            let track = h
                .engine
                .record_open(&open_request("email-1"), &ctx("1.1.1.1", IPHONE_UA))
                .await
                .unwrap();
            assert_eq!(track.open_count, n);
            assert!(track.last_seen >= previous_last_seen);
            previous_last_seen = track.last_seen;
        }

        let stored = h.store.get_track("email-1").await.unwrap().unwrap();
        assert_eq!(stored.open_count, 4);
        assert_eq!(stored.click_count, 0);
        assert_eq!(stored.ip_address.as_deref(), Some("8.8.8.8"));
        assert_eq!(stored.city.as_deref(), Some("Paris (8.8.8.8)"));
        assert_eq!(stored.browser.as_deref(), Some("Chrome"));
        assert_eq!(stored.device_type.as_deref(), Some("Desktop"));
        assert_eq!(stored.campaign_id.as_deref(), Some("spring"));
        assert_eq!(stored.recipient.as_deref(), Some("reader@example.com"));

        let (event, data) = next_notification(&mut h.notifications).await;
        assert_eq!(event, EventKind::Open);
        assert_eq!(data["track_id"], "email-1");
        assert_eq!(data["location"], "Paris (8.8.8.8), France");
    }

    #[tokio::test]
    async fn test_every_click_is_appended() {
        let mut h = harness().await;
        let request = ClickRequest::new("email-2", "https%3A%2F%2Fexample.com%2Fa", &HashMap::new());

        for _ in 0..3 {
            h.engine
                .record_click(&request, &ctx("127.0.0.1", IPHONE_UA))
                .await
                .unwrap();
        }

        let clicks = h.store.list_clicks("email-2").await.unwrap();
        assert_eq!(clicks.len(), 3);
        assert!(clicks.iter().all(|c| c.target_url == "https://example.com/a"));
        assert!(clicks.iter().all(|c| c.link_id == short_hash("https://example.com/a")));
        assert_eq!(clicks[0].country.as_deref(), Some("Local"));
        assert_eq!(clicks[0].device_type.as_deref(), Some(DeviceType::Mobile.as_str()));

        let track = h.store.get_track("email-2").await.unwrap().unwrap();
        assert_eq!(track.click_count, 3);
        assert_eq!(track.open_count, 0);
        assert_eq!(track.os.as_deref(), Some("iOS"));
        assert_eq!(track.sender, None);

        let (event, data) = next_notification(&mut h.notifications).await;
        assert_eq!(event, EventKind::Click);
        assert_eq!(data["url"], "https://example.com/a");
    }

    #[tokio::test]
    async fn test_click_after_open_keeps_open_snapshot() {
        let h = harness().await;

        h.engine
            .record_open(&open_request("email-3"), &ctx("8.8.8.8", CHROME_UA))
            .await
            .unwrap();
        let (_, track) = h
            .engine
            .record_click(
                &ClickRequest::new("email-3", "example.com", &HashMap::new()),
                &ctx("9.9.9.9", IPHONE_UA),
            )
            .await
            .unwrap();

        assert_eq!(track.open_count, 1);
        assert_eq!(track.click_count, 1);
        assert_eq!(track.ip_address.as_deref(), Some("8.8.8.8"));
        assert_eq!(track.browser.as_deref(), Some("Chrome"));
    }

    #[tokio::test]
    async fn test_concurrent_first_opens_create_one_identity() {
        let h = harness().await;

        let mut handles = Vec::new();
        for i in 0..20 {
            let engine = h.engine.clone();
            handles.push(tokio::spawn(async move {
                engine
                    .record_open(
                        &open_request("burst"),
                        &ctx(&format!("8.8.8.{}", i), CHROME_UA),
                    )
                    .await
                    .unwrap()
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let summary = h.store.summary().await.unwrap();
        assert_eq!(summary.total_unique, 1);

        let track = h.store.get_track("burst").await.unwrap().unwrap();
        assert_eq!(track.open_count, 20);
    }

    #[tokio::test]
    async fn test_store_failure_still_serves_pixel_and_redirect() {
        // Tables are never created
        let store = SqliteStorage::new("sqlite::memory:", 1).await.unwrap();
        let mut h = harness_with(store).await;

        let context = ctx("127.0.0.1", CHROME_UA);
        assert!(h.engine.record_open(&open_request("x"), &context).await.is_err());

        let pixel = h.engine.handle_open(open_request("x"), &context).await;
        assert_eq!(pixel, PixelResponse);

        let redirect = h
            .engine
            .handle_click(
                ClickRequest::new("x", "example.com%2Fhome", &HashMap::new()),
                &context,
            )
            .await;
        assert_eq!(redirect.location, "https://example.com/home");

        tokio::task::yield_now().await;
        assert!(h.notifications.try_recv().is_err());
    }
}
