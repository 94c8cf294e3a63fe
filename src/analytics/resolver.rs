//! Time-bounded, store-backed geolocation
//!
//! [`GeoResolver::resolve`] never fails. Local addresses map to
//! [`GeoFacts::local`], provider failures and timeouts to
//! [`GeoFacts::unknown`]. Successful lookups are memoized in the store's
//! `geo_cache` table so every instance sharing the store shares the cache.

use chrono::Utc;
use std::borrow::Cow;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::analytics::geoip::{GeoError, GeoProvider};
use crate::analytics::models::GeoFacts;
use crate::storage::Storage;

const LOCAL_PREFIXES: &[&str] = &["127.", "10.", "172.", "192.168."];

/// Loopback and private ranges, plus `localhost` and the empty address.
/// IPv4-mapped IPv6 addresses are checked as their IPv4 form.
pub fn is_local_address(ip: &str) -> bool {
    let ip = match ip.parse::<IpAddr>() {
        Ok(addr) => Cow::Owned(addr.to_canonical().to_string()),
        Err(_) => Cow::Borrowed(ip),
    };
    ip.is_empty()
        || ip == "::1"
        || ip.eq_ignore_ascii_case("localhost")
        || LOCAL_PREFIXES.iter().any(|prefix| ip.starts_with(prefix))
}

pub struct GeoResolver {
    provider: Arc<dyn GeoProvider>,
    store: Arc<dyn Storage>,
    ttl: Duration,
    timeout: Duration,
}

impl GeoResolver {
    pub fn new(
        provider: Arc<dyn GeoProvider>,
        store: Arc<dyn Storage>,
        ttl: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            provider,
            store,
            ttl,
            timeout,
        }
    }

    pub async fn resolve(&self, ip: &str) -> GeoFacts {
        if is_local_address(ip) {
            return GeoFacts::local();
        }

        let now = Utc::now().timestamp_millis();

        if let Some(facts) = self.cached(ip, now).await {
            debug!(ip = %ip, "geo cache hit");
            return facts;
        }
        debug!(ip = %ip, provider = self.provider.name(), "geo cache miss");

        let facts = match self.lookup(ip).await {
            Ok(facts) => facts,
            Err(err) => {
                warn!(ip = %ip, provider = self.provider.name(), error = %err, "geolocation failed");
                return GeoFacts::unknown();
            }
        };

        match serde_json::to_string(&facts) {
            Ok(data) => {
                if let Err(err) = self.store.put_geo_cache(ip, &data, now).await {
                    warn!(ip = %ip, error = %err, "failed to write geo cache");
                }
            }
            Err(err) => warn!(ip = %ip, error = %err, "failed to encode geo facts"),
        }

        facts
    }

    /// A fresh, decodable cache entry. Anything else counts as a miss.
    async fn cached(&self, ip: &str, now: i64) -> Option<GeoFacts> {
        let entry = match self.store.get_geo_cache(ip).await {
            Ok(entry) => entry?,
            Err(err) => {
                warn!(ip = %ip, error = %err, "failed to read geo cache");
                return None;
            }
        };

        let ttl_ms = i64::try_from(self.ttl.as_millis()).unwrap_or(i64::MAX);
        if now.saturating_sub(entry.cached_at) >= ttl_ms {
            return None;
        }

        match serde_json::from_str(&entry.data) {
            Ok(facts) => Some(facts),
            Err(err) => {
                debug!(ip = %ip, error = %err, "discarding undecodable geo cache entry");
                None
            }
        }
    }

    async fn lookup(&self, ip: &str) -> Result<GeoFacts, GeoError> {
        match tokio::time::timeout(self.timeout, self.provider.lookup(ip)).await {
            Ok(result) => result,
            Err(_) => Err(GeoError::Timeout(self.timeout)),
        }
    }
}
