//! Batch generation of named, colored 1x1 tracking pixels

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::handlers::{api_error, ApiError, AppState};
use crate::tracking::sanitize::sanitize_id;

/// Most pixels produced by one request
pub const MAX_BATCH: usize = 20;

/// Colors handed out in order, wrapping around
pub const PALETTE: [(u8, u8, u8); 10] = [
    (255, 0, 0),
    (0, 0, 255),
    (0, 255, 0),
    (255, 165, 0),
    (128, 0, 128),
    (0, 255, 255),
    (255, 0, 255),
    (255, 255, 0),
    (255, 105, 180),
    (0, 128, 128),
];

const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

fn crc32(bytes: &[u8]) -> u32 {
    let mut crc = !0u32;
    for &byte in bytes {
        crc ^= u32::from(byte);
        for _ in 0..8 {
            let mask = (crc & 1).wrapping_neg();
            crc = (crc >> 1) ^ (0xEDB8_8320 & mask);
        }
    }
    !crc
}

fn adler32(bytes: &[u8]) -> u32 {
    let (mut a, mut b) = (1u32, 0u32);
    for &byte in bytes {
        a = (a + u32::from(byte)) % 65521;
        b = (b + a) % 65521;
    }
    (b << 16) | a
}

fn push_chunk(png: &mut Vec<u8>, kind: &[u8; 4], data: &[u8]) {
    let start = png.len() + 4;
    png.extend_from_slice(&(data.len() as u32).to_be_bytes());
    png.extend_from_slice(kind);
    png.extend_from_slice(data);
    let crc = crc32(&png[start..]);
    png.extend_from_slice(&crc.to_be_bytes());
}

/// Opaque 1x1 RGB PNG. The single scanline is stored uncompressed.
pub fn colored_png(r: u8, g: u8, b: u8) -> Vec<u8> {
    let scanline = [0, r, g, b];
    let len = scanline.len() as u16;

    // zlib header, one final stored block, adler32 trailer
    let mut idat = vec![0x78, 0x01, 0x01];
    idat.extend_from_slice(&len.to_le_bytes());
    idat.extend_from_slice(&(!len).to_le_bytes());
    idat.extend_from_slice(&scanline);
    idat.extend_from_slice(&adler32(&scanline).to_be_bytes());

    let mut ihdr = Vec::with_capacity(13);
    ihdr.extend_from_slice(&1u32.to_be_bytes());
    ihdr.extend_from_slice(&1u32.to_be_bytes());
    ihdr.extend_from_slice(&[8, 2, 0, 0, 0]);

    let mut png = PNG_SIGNATURE.to_vec();
    push_chunk(&mut png, b"IHDR", &ihdr);
    push_chunk(&mut png, b"IDAT", &idat);
    push_chunk(&mut png, b"IEND", &[]);
    png
}

#[derive(Deserialize)]
pub struct PixelBatchRequest {
    #[serde(default)]
    pub names: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct GeneratedPixel {
    pub name: String,
    /// `#rrggbb`
    pub color: String,
    pub track_url: String,
    pub png_base64: String,
}

#[derive(Serialize)]
pub struct PixelBatchResponse {
    pub generated: Vec<GeneratedPixel>,
}

/// One pixel per name, at most [`MAX_BATCH`], colored from [`PALETTE`]
pub fn build_pixels(base_url: &str, names: &[String]) -> Vec<GeneratedPixel> {
    let base = base_url.trim_end_matches('/');
    names
        .iter()
        .take(MAX_BATCH)
        .zip(PALETTE.iter().cycle())
        .map(|(name, &(r, g, b))| {
            let name = sanitize_id(name);
            GeneratedPixel {
                track_url: format!("{}/track?id={}", base, name),
                color: format!("#{:02x}{:02x}{:02x}", r, g, b),
                png_base64: STANDARD.encode(colored_png(r, g, b)),
                name,
            }
        })
        .collect()
}

pub async fn generate_pixels(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<PixelBatchRequest>, JsonRejection>,
) -> Result<Json<PixelBatchResponse>, ApiError> {
    let names = match payload {
        Ok(Json(request)) if !request.names.is_empty() => request.names,
        _ => return Err(api_error(StatusCode::BAD_REQUEST, "Provide list of names")),
    };

    Ok(Json(PixelBatchResponse {
        generated: build_pixels(&state.public_base_url, &names),
    }))
}
