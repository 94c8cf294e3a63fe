use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use tracing::warn;

/// Transparent 1x1 PNG
pub static PIXEL_PNG: [u8; 67] = [
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, // signature
    0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44, 0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00,
    0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F, 0x15, 0xC4, 0x89, // IHDR
    0x00, 0x00, 0x00, 0x0A, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9C, 0x63, 0x00, 0x01, 0x00, 0x00,
    0x05, 0x00, 0x01, 0x0D, 0x0A, 0x2D, 0xB4, // IDAT
    0x00, 0x00, 0x00, 0x00, 0x49, 0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82, // IEND
];

pub const ACCEPT_CH: &str = "Sec-CH-UA, Sec-CH-UA-Mobile, Sec-CH-UA-Platform";

/// Bytes that may not appear raw in a `Location` header
const LOCATION_ESCAPE: &AsciiSet = &CONTROLS.add(b' ').add(b'"').add(b'<').add(b'>');

/// The tracking pixel, served with headers that defeat caching
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelResponse;

impl IntoResponse for PixelResponse {
    fn into_response(self) -> Response {
        (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "image/png"),
                (header::CACHE_CONTROL, "no-cache, no-store, must-revalidate"),
                (header::PRAGMA, "no-cache"),
                (header::EXPIRES, "0"),
                (header::HeaderName::from_static("accept-ch"), ACCEPT_CH),
            ],
            &PIXEL_PNG[..],
        )
            .into_response()
    }
}

/// `302 Found` to the click target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectResponse {
    pub location: String,
}

impl RedirectResponse {
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
        }
    }
}

impl IntoResponse for RedirectResponse {
    fn into_response(self) -> Response {
        let encoded = utf8_percent_encode(&self.location, LOCATION_ESCAPE).to_string();
        let location = HeaderValue::from_str(&encoded).unwrap_or_else(|err| {
            warn!(error = %err, "redirect target is not a valid header value");
            HeaderValue::from_static("/")
        });
        (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[tokio::test]
    async fn test_pixel_response() {
        let response = PixelResponse.into_response();
        assert_eq!(response.status(), StatusCode::OK);

        let headers = response.headers();
        assert_eq!(headers[header::CONTENT_TYPE], "image/png");
        assert_eq!(
            headers[header::CACHE_CONTROL],
            "no-cache, no-store, must-revalidate"
        );
        assert_eq!(headers[header::PRAGMA], "no-cache");
        assert_eq!(headers[header::EXPIRES], "0");
        assert_eq!(headers["accept-ch"], ACCEPT_CH);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(body.as_ref(), PIXEL_PNG.as_slice());
        assert_eq!(&body[1..4], b"PNG");
    }

    #[test]
    fn test_redirect_response() {
        let response = RedirectResponse::new("https://example.com/a?b=1#c").into_response();
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(
            response.headers()[header::LOCATION],
            "https://example.com/a?b=1#c"
        );
    }

    #[test]
    fn test_redirect_escapes_unsafe_bytes() {
        let response = RedirectResponse::new("https://example.com/a b\n/ü").into_response();
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(
            response.headers()[header::LOCATION],
            "https://example.com/a%20b%0A/%C3%BC"
        );
    }

    #[test]
    fn test_redirect_survives_every_ascii_byte() {
        let target: String = (0u8..=0x7F).map(char::from).chain("日本".chars()).collect();
        let response = RedirectResponse::new(target).into_response();
        assert_eq!(response.status(), StatusCode::FOUND);

        let location = response.headers()[header::LOCATION].to_str().unwrap();
        assert!(location.starts_with("%00%01"));
        assert!(location.contains("%20!%22#"));
        assert!(location.ends_with("~%7F%E6%97%A5%E6%9C%AC"));
    }
}
