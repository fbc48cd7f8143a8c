//! Request encoding and response decoding.
//!
//! ## Request body
//!
//! ```text
//! value[0]            f32 LE (4)   row 0, column 0
//! value[1]            f32 LE (4)   row 0, column 1
//! ...
//! value[w*h - 1]      f32 LE (4)   row h-1, column w-1
//! ```
//!
//! Width and height travel as query parameters, never inside the body.
//!
//! ## Response body
//!
//! ```text
//! {"image": "<base64 PNG>"}
//! ```
//!
//! The decoded image's own dimensions define the display frame; they do
//! not have to match the request.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::error::SandboxError;
use crate::stream::types::{DisplayFrame, HeightField};

/// MIME type of the request body.
pub const CONTENT_TYPE: &str = "application/octet-stream";

// ── RequestPayload ───────────────────────────────────────────────

/// An encoded height field, ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestPayload {
    pub width: u32,
    pub height: u32,
    /// `width * height` little-endian `f32` values.
    pub body: Bytes,
}

impl RequestPayload {
    /// Query string carrying the dimensions, without the leading `?`.
    pub fn query(&self) -> String {
        format!("width={}&height={}", self.width, self.height)
    }
}

// ── ServiceResponse ──────────────────────────────────────────────

/// The JSON reply of the processing service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceResponse {
    /// Base64-encoded raster image.
    #[serde(default)]
    pub image: Option<String>,
}

// ── PayloadCodec ─────────────────────────────────────────────────

/// Encoder/decoder for the service exchange.
///
/// Keeps a scratch buffer for the base64-decoded image bytes so that
/// steady-state decoding does not allocate for the intermediate blob.
#[derive(Debug, Default)]
pub struct PayloadCodec {
    blob: Vec<u8>,
}

impl PayloadCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flatten a height field into a request payload.
    pub fn encode(field: &HeightField<'_>) -> RequestPayload {
        let values = field.values();
        let mut body = BytesMut::with_capacity(values.len() * 4);
        for &v in values {
            body.put_f32_le(v);
        }
        RequestPayload {
            width: field.width(),
            height: field.height(),
            body: body.freeze(),
        }
    }

    /// Parse a raw response body into a [`ServiceResponse`].
    pub fn parse_response(body: &[u8]) -> Result<ServiceResponse, SandboxError> {
        Ok(serde_json::from_slice(body)?)
    }

    /// Decode the embedded image into RGBA8 pixels.
    pub fn decode(&mut self, response: &ServiceResponse) -> Result<DisplayFrame, SandboxError> {
        let text = match response.image.as_deref() {
            Some(text) if !text.is_empty() => text,
            _ => return Err(SandboxError::MissingField("image")),
        };

        self.blob.clear();
        STANDARD.decode_vec(text, &mut self.blob)?;

        let rgba = image::load_from_memory(&self.blob)?.to_rgba8();
        let (width, height) = rgba.dimensions();
        Ok(DisplayFrame {
            width,
            height,
            pixels: rgba.into_raw(),
        })
    }
}
