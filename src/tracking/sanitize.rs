//! Normalisation of untrusted identifiers and redirect targets

use percent_encoding::percent_decode_str;
use sha2::{Digest, Sha256};

/// Longest identifier kept, in characters
pub const MAX_ID_LEN: usize = 100;

/// Identifier used when nothing usable is left after sanitizing
pub const UNKNOWN_ID: &str = "unknown";

fn is_id_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '@' | '.' | '+' | '-' | '_')
}

/// Keep `[A-Za-z0-9@.+_-]`, truncate to [`MAX_ID_LEN`], and fall back to
/// [`UNKNOWN_ID`] when empty.
pub fn sanitize_id(raw: &str) -> String {
    let id: String = raw.chars().filter(|c| is_id_char(*c)).take(MAX_ID_LEN).collect();
    if id.is_empty() {
        UNKNOWN_ID.to_string()
    } else {
        id
    }
}

/// First 4 bytes of SHA-256 as 8 lowercase hex characters
pub fn short_hash(url: &str) -> String {
    let digest = Sha256::digest(url.as_bytes());
    digest[..4].iter().map(|b| format!("{:02x}", b)).collect()
}

/// Percent-decode a redirect target and default it to `https://` when it
/// carries no http(s) scheme.
pub fn normalize_target_url(raw: &str) -> String {
    let decoded = percent_decode_str(raw.trim()).decode_utf8_lossy();
    let decoded = decoded.trim();

    let lower = decoded.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        decoded.to_string()
    } else {
        format!("https://{}", decoded)
    }
}
