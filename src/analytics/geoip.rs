//! Geolocation providers
//!
//! A [`GeoProvider`] turns an IP address into [`GeoFacts`]. Two
//! implementations exist:
//! - [`IpApiProvider`](crate::analytics::ip_api::IpApiProvider), an ip-api.com
//!   compatible HTTP endpoint
//! - [`MaxMindProvider`], memory-mapped MaxMind GeoLite2/GeoIP2 databases
//!
//! Providers report failures; turning a failure into the "Unknown" sentinel
//! is the resolver's job.

use anyhow::{Context, Result};
use async_trait::async_trait;
use maxminddb::{geoip2, Mmap, Reader};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::analytics::models::GeoFacts;

#[derive(Debug, Error)]
pub enum GeoError {
    #[error("geolocation lookup timed out after {0:?}")]
    Timeout(Duration),
    #[error("geolocation request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("geolocation provider reported failure: {0}")]
    Provider(String),
    #[error("address '{0}' is not a valid IP")]
    InvalidAddress(String),
}

#[async_trait]
pub trait GeoProvider: Send + Sync {
    /// Look up the location of an IP address
    async fn lookup(&self, ip: &str) -> Result<GeoFacts, GeoError>;

    /// Provider name, for logs
    fn name(&self) -> &'static str;
}

/// GeoIP lookup service that supports both City and ASN databases
pub struct MaxMindProvider {
    city_reader: Option<Arc<Reader<Mmap>>>,
    asn_reader: Option<Arc<Reader<Mmap>>>,
}

impl MaxMindProvider {
    /// Create a new provider from MMDB file paths
    ///
    /// # Arguments
    /// * `city_path` - Optional path to the MaxMind GeoLite2-City or GeoIP2-City .mmdb file
    /// * `asn_path` - Optional path to the MaxMind GeoLite2-ASN .mmdb file
    pub fn new(city_path: Option<&str>, asn_path: Option<&str>) -> Result<Self> {
        let city_reader = if let Some(path) = city_path {
            let reader = unsafe { Reader::open_mmap(path) }
                .with_context(|| format!("Failed to open GeoIP City database at {}", path))?;
            Some(Arc::new(reader))
        } else {
            None
        };

        let asn_reader = if let Some(path) = asn_path {
            let reader = unsafe { Reader::open_mmap(path) }
                .with_context(|| format!("Failed to open GeoIP ASN database at {}", path))?;
            Some(Arc::new(reader))
        } else {
            None
        };

        Ok(Self {
            city_reader,
            asn_reader,
        })
    }

    fn lookup_ip(&self, ip: IpAddr) -> Result<GeoFacts, GeoError> {
        let mut facts = GeoFacts::unknown();
        let mut found = false;

        if let Some(ref reader) = self.city_reader {
            if let Ok(result) = reader.lookup(ip) {
                if let Ok(Some(city)) = result.decode::<geoip2::City>() {
                    extract_from_city(&city, &mut facts);
                    found = true;
                } else if let Ok(Some(country)) = result.decode::<geoip2::Country>() {
                    // City data missing, the record still carries country fields
                    if let Some(name) = country.country.names.english {
                        facts.country = name.to_string();
                    }
                    found = true;
                }
            }
        }

        if let Some(ref reader) = self.asn_reader {
            if let Ok(result) = reader.lookup(ip) {
                if let Ok(Some(asn)) = result.decode::<geoip2::Asn>() {
                    if let Some(org) = asn.autonomous_system_organization {
                        facts.isp = org.to_string();
                        facts.org = org.to_string();
                    }
                    if let Some(number) = asn.autonomous_system_number {
                        facts.asn = match asn.autonomous_system_organization {
                            Some(org) => format!("AS{number} {org}"),
                            None => format!("AS{number}"),
                        };
                    }
                    found = true;
                }
            }
        }

        if found {
            Ok(facts)
        } else {
            Err(GeoError::Provider(format!("no database record for {ip}")))
        }
    }
}

fn extract_from_city(city: &geoip2::City, facts: &mut GeoFacts) {
    if let Some(name) = city.country.names.english {
        facts.country = name.to_string();
    }
    if let Some(subdivision) = city.subdivisions.first() {
        if let Some(name) = subdivision.names.english {
            facts.region = name.to_string();
        }
    }
    if let Some(name) = city.city.names.english {
        facts.city = name.to_string();
    }
    facts.latitude = city.location.latitude.unwrap_or(0.0);
    facts.longitude = city.location.longitude.unwrap_or(0.0);
    if let Some(tz) = city.location.time_zone {
        facts.timezone = tz.to_string();
    }
}

#[async_trait]
impl GeoProvider for MaxMindProvider {
    async fn lookup(&self, ip: &str) -> Result<GeoFacts, GeoError> {
        let addr = ip
            .parse::<IpAddr>()
            .map_err(|_| GeoError::InvalidAddress(ip.to_string()))?;
        self.lookup_ip(addr)
    }

    fn name(&self) -> &'static str {
        "MaxMind"
    }
}
