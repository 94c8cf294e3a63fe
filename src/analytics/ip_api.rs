//! ip-api.com compatible HTTP geolocation provider

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::trace;

use crate::analytics::geoip::{GeoError, GeoProvider};
use crate::analytics::models::GeoFacts;

const FIELDS: &str = "status,message,country,regionName,city,lat,lon,timezone,isp,org,as";

#[derive(Debug, Deserialize)]
struct IpApiResponse {
    status: String,
    #[serde(default)]
    message: Option<String>,
    country: Option<String>,
    #[serde(rename = "regionName")]
    region_name: Option<String>,
    city: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
    timezone: Option<String>,
    isp: Option<String>,
    org: Option<String>,
    #[serde(rename = "as")]
    asn: Option<String>,
}

impl IpApiResponse {
    fn into_facts(self) -> Result<GeoFacts, GeoError> {
        if self.status != "success" {
            return Err(GeoError::Provider(
                self.message.unwrap_or_else(|| self.status.clone()),
            ));
        }

        let or_unknown = |v: Option<String>| v.unwrap_or_else(|| "Unknown".to_string());

        Ok(GeoFacts {
            country: or_unknown(self.country),
            region: or_unknown(self.region_name),
            city: or_unknown(self.city),
            latitude: self.lat.unwrap_or(0.0),
            longitude: self.lon.unwrap_or(0.0),
            timezone: or_unknown(self.timezone),
            isp: or_unknown(self.isp),
            org: self.org.unwrap_or_default(),
            asn: self.asn.unwrap_or_default(),
        })
    }
}

pub struct IpApiProvider {
    base_url: String,
    client: Client,
}

impl IpApiProvider {
    /// `base_url` is the scheme and host, e.g. `http://ip-api.com`
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("naarad/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn lookup_url(&self, ip: &str) -> String {
        format!("{}/json/{}?fields={}", self.base_url, ip, FIELDS)
    }
}

#[async_trait]
impl GeoProvider for IpApiProvider {
    async fn lookup(&self, ip: &str) -> Result<GeoFacts, GeoError> {
        // The address ends up in the URL path
        if ip.parse::<std::net::IpAddr>().is_err() {
            return Err(GeoError::InvalidAddress(ip.to_string()));
        }

        let url = self.lookup_url(ip);
        trace!(url = %url, "querying geolocation provider");

        let response: IpApiResponse = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        response.into_facts()
    }

    fn name(&self) -> &'static str {
        "ip-api"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::Path, routing::get, Json, Router};
    use serde_json::{json, Value};

    async fn spawn_fake_api() -> String {
        async fn lookup(Path(ip): Path<String>) -> Json<Value> {
            if ip == "203.0.113.99" {
                return Json(json!({"status": "fail", "message": "reserved range"}));
            }
            Json(json!({
                "status": "success",
                "country": "United States",
                "regionName": "California",
                "city": "Mountain View",
                "lat": 37.4056,
                "lon": -122.0775,
                "timezone": "America/Los_Angeles",
                "isp": "Google LLC",
                "org": "Google Public DNS",
                "as": "AS15169 Google LLC"
            }))
        }

        let app = Router::new().route("/json/{ip}", get(lookup));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[test]
    fn test_lookup_url_format() {
        let provider = IpApiProvider::new("http://ip-api.com/", Duration::from_secs(5)).unwrap();
        assert_eq!(
            provider.lookup_url("8.8.8.8"),
            "http://ip-api.com/json/8.8.8.8?fields=status,message,country,regionName,city,lat,lon,timezone,isp,org,as"
        );
    }

    #[test]
    fn test_missing_fields_default() {
        let response: IpApiResponse =
            serde_json::from_value(json!({"status": "success", "country": "Germany"})).unwrap();
        let facts = response.into_facts().unwrap();
        assert_eq!(facts.country, "Germany");
        assert_eq!(facts.city, "Unknown");
        assert_eq!(facts.org, "");
        assert_eq!(facts.latitude, 0.0);
    }

    #[tokio::test]
    async fn test_lookup_against_fake_api() {
        let base = spawn_fake_api().await;
        let provider = IpApiProvider::new(&base, Duration::from_secs(5)).unwrap();

        let facts = provider.lookup("8.8.8.8").await.unwrap();
        assert_eq!(facts.country, "United States");
        assert_eq!(facts.region, "California");
        assert_eq!(facts.city, "Mountain View");
        assert_eq!(facts.latitude, 37.4056);
        assert_eq!(facts.asn, "AS15169 Google LLC");
    }

    #[tokio::test]
    async fn test_provider_failure_status() {
        let base = spawn_fake_api().await;
        let provider = IpApiProvider::new(&base, Duration::from_secs(5)).unwrap();

        let result = provider.lookup("203.0.113.99").await;
        assert!(matches!(result, Err(GeoError::Provider(msg)) if msg == "reserved range"));
    }

    #[tokio::test]
    async fn test_invalid_address_never_hits_network() {
        let provider =
            IpApiProvider::new("http://127.0.0.1:1", Duration::from_secs(5)).unwrap();
        let result = provider.lookup("../admin").await;
        assert!(matches!(result, Err(GeoError::InvalidAddress(_))));
    }

    #[tokio::test]
    async fn test_unreachable_provider_is_http_error() {
        let provider =
            IpApiProvider::new("http://127.0.0.1:1", Duration::from_secs(2)).unwrap();
        let result = provider.lookup("8.8.8.8").await;
        assert!(matches!(result, Err(GeoError::Http(_))));
    }
}
