//! Wiring of configuration, storage and the HTTP surface

use anyhow::Result;
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::analytics::{GeoProvider, GeoResolver, IpApiProvider, MaxMindProvider};
use crate::api::create_api_router;
use crate::auth::AuthService;
use crate::config::{Config, GeoConfig, GeoProviderKind};
use crate::notify::WebhookNotifier;
use crate::storage::Storage;
use crate::tracking::{create_tracking_router, TrackingEngine};

pub fn build_geo_provider(config: &GeoConfig) -> Result<Arc<dyn GeoProvider>> {
    let provider: Arc<dyn GeoProvider> = match config.provider {
        GeoProviderKind::IpApi => {
            info!("Geolocation via ip-api at {}", config.api_url);
            Arc::new(IpApiProvider::new(&config.api_url, config.timeout())?)
        }
        GeoProviderKind::MaxMind => {
            info!(
                city = config.city_db_path.as_deref().unwrap_or("-"),
                asn = config.asn_db_path.as_deref().unwrap_or("-"),
                "Geolocation via MaxMind databases"
            );
            Arc::new(MaxMindProvider::new(
                config.city_db_path.as_deref(),
                config.asn_db_path.as_deref(),
            )?)
        }
    };
    Ok(provider)
}

/// Tracking routes at the root, admin routes under `/api`
pub fn build_router(config: &Config, storage: Arc<dyn Storage>) -> Result<Router> {
    let provider = build_geo_provider(&config.geo)?;
    let geo = Arc::new(GeoResolver::new(
        provider,
        Arc::clone(&storage),
        config.geo.cache_ttl(),
        config.geo.timeout(),
    ));

    let notifier = WebhookNotifier::new(config.webhook.url.clone(), config.webhook.timeout())?;
    if notifier.is_enabled() {
        info!("Webhook notifications enabled");
    }

    let engine = Arc::new(TrackingEngine::new(
        Arc::clone(&storage),
        geo,
        Arc::new(notifier),
    ));

    if config.api.require_auth {
        info!("🔐 Admin API requires X-API-Key");
    } else {
        info!("🔓 Admin API authentication is disabled");
    }
    let auth_service = Arc::new(AuthService::new(
        config.api.require_auth,
        config.api.api_key.clone(),
    ));

    Ok(create_tracking_router(engine)
        .nest(
            "/api",
            create_api_router(storage, auth_service, config.public_base_url.clone()),
        )
        .layer(CorsLayer::permissive()))
}
