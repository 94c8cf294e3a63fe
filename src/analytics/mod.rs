//! Request enrichment
//!
//! Everything the tracking pipeline learns about a request beyond its path:
//! client address and headers, geolocation, and user agent facts.

pub mod geoip;
pub mod ip_api;
pub mod ip_extractor;
pub mod models;
pub mod resolver;
pub mod user_agent;

pub use geoip::{GeoError, GeoProvider, MaxMindProvider};
pub use ip_api::IpApiProvider;
pub use ip_extractor::{extract_client_ip, RequestContext};
pub use models::{DeviceType, GeoFacts, UaFacts};
pub use resolver::GeoResolver;
pub use user_agent::classify;
