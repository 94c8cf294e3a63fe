//! Client IP extraction and the per-request context
//!
//! The client address is taken from, in order:
//! - `CF-Connecting-IP` (Cloudflare)
//! - `X-Real-IP`
//! - the first hop of `X-Forwarded-For`
//! - the socket remote address
//!
//! Header values that do not parse as an IP address are skipped.

use axum::http::HeaderMap;
use std::net::{IpAddr, SocketAddr};

const CLIENT_IP_HEADERS: &[&str] = &["cf-connecting-ip", "x-real-ip", "x-forwarded-for"];

/// Immutable facts about the inbound request, passed explicitly through the
/// tracking pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    pub client_ip: String,
    pub user_agent: String,
    /// `Referer` header, `"Direct"` when absent
    pub referer: String,
    pub accept_language: String,
    pub accept_encoding: String,
    pub accept: String,
    pub connection: String,
    pub do_not_track: String,
    pub cache_control: String,
    pub sec_ch_ua: String,
    pub sec_ch_ua_mobile: String,
    pub sec_ch_ua_platform: String,
}

fn header_str(headers: &HeaderMap, name: &str) -> String {
    headers
        .get(name)
        .and_then(|h| h.to_str().ok())
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

impl RequestContext {
    pub fn from_parts(headers: &HeaderMap, peer: SocketAddr) -> Self {
        let referer = header_str(headers, "referer");

        Self {
            client_ip: extract_client_ip(headers, peer.ip()).to_string(),
            user_agent: header_str(headers, "user-agent"),
            referer: if referer.is_empty() {
                "Direct".to_string()
            } else {
                referer
            },
            accept_language: header_str(headers, "accept-language"),
            accept_encoding: header_str(headers, "accept-encoding"),
            accept: header_str(headers, "accept"),
            connection: header_str(headers, "connection"),
            do_not_track: header_str(headers, "dnt"),
            cache_control: header_str(headers, "cache-control"),
            sec_ch_ua: header_str(headers, "sec-ch-ua"),
            sec_ch_ua_mobile: header_str(headers, "sec-ch-ua-mobile"),
            sec_ch_ua_platform: header_str(headers, "sec-ch-ua-platform"),
        }
    }
}

/// Extract the client IP address from proxy/CDN headers, falling back to the
/// socket address
pub fn extract_client_ip(headers: &HeaderMap, socket_addr: IpAddr) -> IpAddr {
    CLIENT_IP_HEADERS
        .iter()
        .find_map(|name| first_hop(headers, name))
        .unwrap_or(socket_addr)
}

fn first_hop(headers: &HeaderMap, name: &str) -> Option<IpAddr> {
    headers
        .get(name)?
        .to_str()
        .ok()?
        .split(',')
        .next()?
        .trim()
        .parse::<IpAddr>()
        .ok()
}
