//! Data models for request enrichment

use serde::{Deserialize, Serialize};
use std::fmt;

/// Geographic facts derived from a client IP address
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoFacts {
    /// Country name
    pub country: String,

    /// Region/state/province
    pub region: String,

    /// City name
    pub city: String,

    pub latitude: f64,

    pub longitude: f64,

    /// IANA timezone name (e.g., "Europe/Berlin")
    pub timezone: String,

    /// Internet service provider
    pub isp: String,

    /// Organisation owning the address block
    pub org: String,

    /// Autonomous system, as reported by the provider (e.g., "AS15169 Google LLC")
    pub asn: String,
}

impl GeoFacts {
    /// Every field set to `label`, coordinates zeroed
    fn sentinel(label: &str) -> Self {
        Self {
            country: label.to_string(),
            region: label.to_string(),
            city: label.to_string(),
            latitude: 0.0,
            longitude: 0.0,
            timezone: label.to_string(),
            isp: label.to_string(),
            org: label.to_string(),
            asn: label.to_string(),
        }
    }

    /// Returned for private, loopback and localhost addresses
    pub fn local() -> Self {
        Self::sentinel("Local")
    }

    /// Returned when the provider fails, times out or answers garbage
    pub fn unknown() -> Self {
        Self::sentinel("Unknown")
    }

    /// Human readable "city, country" summary used in notifications
    pub fn location_summary(&self) -> String {
        format!("{}, {}", self.city, self.country)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceType {
    Bot,
    Mobile,
    Tablet,
    Desktop,
    Unknown,
}

impl DeviceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceType::Bot => "Bot",
            DeviceType::Mobile => "Mobile",
            DeviceType::Tablet => "Tablet",
            DeviceType::Desktop => "Desktop",
            DeviceType::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Device and browser facts derived from a User-Agent header
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UaFacts {
    pub browser: String,
    pub browser_version: String,
    pub os: String,
    pub os_version: String,
    pub device_type: DeviceType,
    pub device_brand: String,
    pub is_mobile: bool,
    pub is_bot: bool,
}

impl Default for UaFacts {
    fn default() -> Self {
        Self {
            browser: "Unknown".to_string(),
            browser_version: String::new(),
            os: "Unknown".to_string(),
            os_version: String::new(),
            device_type: DeviceType::Unknown,
            device_brand: "Unknown".to_string(),
            is_mobile: false,
            is_bot: false,
        }
    }
}
