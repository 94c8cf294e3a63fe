use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    /// Prefix for generated pixel/click URLs. Empty means relative URLs.
    pub public_base_url: String,
    pub geo: GeoConfig,
    pub webhook: WebhookConfig,
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub backend: DatabaseBackend,
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    Sqlite,
    Postgres,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeoProviderKind {
    /// ip-api.com compatible HTTP endpoint
    IpApi,
    /// Local MaxMind City/ASN databases
    MaxMind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoConfig {
    pub provider: GeoProviderKind,
    pub api_url: String,
    pub city_db_path: Option<String>,
    pub asn_db_path: Option<String>,
    pub cache_ttl_minutes: u64,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub url: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub require_auth: bool,
    pub api_key: Option<String>,
}

impl GeoConfig {
    pub const DEFAULT_API_URL: &'static str = "http://ip-api.com";
    pub const DEFAULT_CACHE_MINUTES: u64 = 60;
    pub const DEFAULT_TIMEOUT_SECS: u64 = 5;

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_minutes * 60)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for GeoConfig {
    fn default() -> Self {
        Self {
            provider: GeoProviderKind::IpApi,
            api_url: Self::DEFAULT_API_URL.to_string(),
            city_db_path: None,
            asn_db_path: None,
            cache_ttl_minutes: Self::DEFAULT_CACHE_MINUTES,
            timeout_secs: Self::DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl WebhookConfig {
    pub const DEFAULT_TIMEOUT_SECS: u64 = 5;

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_secs: Self::DEFAULT_TIMEOUT_SECS,
        }
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(false)
}

fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_u64(name: &str, default: u64) -> anyhow::Result<u64> {
    match std::env::var(name) {
        Ok(v) => v
            .parse::<u64>()
            .with_context(|| format!("{name} must be a non-negative integer, got '{v}'")),
        Err(_) => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let backend_str =
            std::env::var("DATABASE_BACKEND").unwrap_or_else(|_| "sqlite".to_string());

        let backend = match backend_str.to_lowercase().as_str() {
            "postgres" | "postgresql" => DatabaseBackend::Postgres,
            _ => DatabaseBackend::Sqlite,
        };

        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./naarad.db?mode=rwc".to_string());

        let max_connections = std::env::var("DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse::<u32>()?;

        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = std::env::var("PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse::<u16>()?;

        let public_base_url = std::env::var("PUBLIC_BASE_URL")
            .unwrap_or_default()
            .trim_end_matches('/')
            .to_string();

        let provider = match std::env::var("GEO_PROVIDER")
            .unwrap_or_else(|_| "ipapi".to_string())
            .to_lowercase()
            .as_str()
        {
            "ipapi" | "ip-api" => GeoProviderKind::IpApi,
            "maxmind" => GeoProviderKind::MaxMind,
            other => {
                tracing::warn!(
                    "Unknown GEO_PROVIDER '{other}', falling back to 'ipapi'. Supported values: ipapi, maxmind"
                );
                GeoProviderKind::IpApi
            }
        };

        let city_db_path = env_non_empty("GEOIP_CITY_DB_PATH");
        let asn_db_path = env_non_empty("GEOIP_ASN_DB_PATH");
        if provider == GeoProviderKind::MaxMind && city_db_path.is_none() && asn_db_path.is_none()
        {
            bail!("GEOIP_CITY_DB_PATH or GEOIP_ASN_DB_PATH must be set when GEO_PROVIDER=maxmind");
        }

        let geo = GeoConfig {
            provider,
            api_url: std::env::var("GEO_API_URL")
                .unwrap_or_else(|_| GeoConfig::DEFAULT_API_URL.to_string()),
            city_db_path,
            asn_db_path,
            cache_ttl_minutes: env_u64("GEO_CACHE_MINUTES", GeoConfig::DEFAULT_CACHE_MINUTES)?,
            timeout_secs: env_u64("GEO_TIMEOUT_SECS", GeoConfig::DEFAULT_TIMEOUT_SECS)?,
        };

        let webhook = WebhookConfig {
            url: env_non_empty("WEBHOOK_URL"),
            timeout_secs: env_u64("WEBHOOK_TIMEOUT_SECS", WebhookConfig::DEFAULT_TIMEOUT_SECS)?,
        };

        let require_auth = env_flag("REQUIRE_AUTH");
        let api_key = env_non_empty("API_KEY");
        if require_auth && api_key.is_none() {
            bail!("API_KEY must be set when REQUIRE_AUTH=true");
        }

        Ok(Config {
            database: DatabaseConfig {
                backend,
                url: database_url,
                max_connections,
            },
            server: ServerConfig { host, port },
            public_base_url,
            geo,
            webhook,
            api: ApiConfig {
                require_auth,
                api_key,
            },
        })
    }
}
