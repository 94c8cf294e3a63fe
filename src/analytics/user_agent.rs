//! Heuristic User-Agent classification
//!
//! Best-effort and deterministic: every input string maps to a [`UaFacts`],
//! there is no failure path. Patterns are matched against the lowercased
//! header, in priority order, first match wins.

use regex::Regex;
use std::sync::LazyLock;

use crate::analytics::models::{DeviceType, UaFacts};

struct Pattern {
    regex: Regex,
    name: &'static str,
}

fn compile(patterns: &[(&str, &'static str)]) -> Vec<Pattern> {
    patterns
        .iter()
        .filter_map(|(pattern, name)| match Regex::new(pattern) {
            Ok(regex) => Some(Pattern { regex, name }),
            Err(err) => {
                tracing::error!(pattern = %pattern, error = %err, "invalid user agent pattern");
                None
            }
        })
        .collect()
}

static BROWSER_PATTERNS: LazyLock<Vec<Pattern>> = LazyLock::new(|| {
    compile(&[
        (r"edge?/([\d.]+)", "Edge"),
        (r"opr/([\d.]+)", "Opera"),
        (r"chrome/([\d.]+)", "Chrome"),
        (r"firefox/([\d.]+)", "Firefox"),
        (r"safari/([\d.]+)", "Safari"),
    ])
});

static CHROME_VERSION: LazyLock<Vec<Pattern>> =
    LazyLock::new(|| compile(&[(r"chrome/([\d.]+)", "Chrome")]));

static OS_PATTERNS: LazyLock<Vec<Pattern>> = LazyLock::new(|| {
    compile(&[
        (r"windows nt ([\d.]+)", "Windows"),
        (r"mac os x ([\d_.]+)", "macOS"),
        (r"android ([\d.]+)", "Android"),
        (r"iphone os ([\d_]+)", "iOS"),
        (r"linux", "Linux"),
    ])
});

const MOBILE_TOKENS: &[&str] = &["mobile", "android", "iphone"];
const TABLET_TOKENS: &[&str] = &["ipad", "tablet"];
const BOT_TOKENS: &[&str] = &["bot", "crawler", "spider", "preview"];
const APPLE_TOKENS: &[&str] = &["iphone", "ipad", "mac"];

/// Returns the name and captured version (or "") of the first matching pattern
fn first_match(patterns: &[Pattern], haystack: &str) -> Option<(&'static str, String)> {
    patterns.iter().find_map(|p| {
        p.regex.captures(haystack).map(|caps| {
            let version = caps
                .get(1)
                .map(|m| m.as_str().to_string())
                .unwrap_or_default();
            (p.name, version)
        })
    })
}

fn contains_any(haystack: &str, tokens: &[&str]) -> bool {
    tokens.iter().any(|t| haystack.contains(t))
}

/// Classify a User-Agent header value
pub fn classify(user_agent: &str) -> UaFacts {
    if user_agent.trim().is_empty() {
        return UaFacts::default();
    }

    let ua = user_agent.to_lowercase();

    let (mut browser, mut browser_version) = first_match(&BROWSER_PATTERNS, &ua)
        .map(|(name, version)| (name.to_string(), version))
        .unwrap_or_else(|| ("Other".to_string(), String::new()));

    // Chrome on iOS/Android also carries a Safari token
    if browser == "Safari" && ua.contains("chrome") {
        if let Some((name, version)) = first_match(&CHROME_VERSION, &ua) {
            browser = name.to_string();
            browser_version = version;
        }
    }

    let (os, os_version) = first_match(&OS_PATTERNS, &ua)
        .map(|(name, version)| (name.to_string(), version.replace('_', ".")))
        .unwrap_or_else(|| ("Other".to_string(), String::new()));

    let is_mobile = contains_any(&ua, MOBILE_TOKENS);
    let is_tablet = contains_any(&ua, TABLET_TOKENS);
    let is_bot = contains_any(&ua, BOT_TOKENS);

    let device_type = if is_bot {
        DeviceType::Bot
    } else if is_mobile {
        DeviceType::Mobile
    } else if is_tablet {
        DeviceType::Tablet
    } else {
        DeviceType::Desktop
    };

    let device_brand = if contains_any(&ua, APPLE_TOKENS) {
        "Apple"
    } else if ua.contains("samsung") {
        "Samsung"
    } else if ua.contains("pixel") {
        "Google"
    } else {
        "Unknown"
    };

    UaFacts {
        browser,
        browser_version,
        os,
        os_version,
        device_type,
        device_brand: device_brand.to_string(),
        is_mobile,
        is_bot,
    }
}
