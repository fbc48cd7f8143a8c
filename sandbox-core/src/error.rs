//! Domain-specific error types for the sandbox streaming client.
//!
//! Every fallible operation returns `Result<T, SandboxError>`.
//! None of these errors is fatal to the tick loop: the scheduler absorbs
//! each one, logs it, and either skips or drops the current frame.

use std::time::Duration;
use thiserror::Error;

use crate::stream::types::SurfaceFormat;

/// The canonical error type for the sandbox client.
#[derive(Debug, Error)]
pub enum SandboxError {
    // ── Capture Errors ───────────────────────────────────────────
    /// The render surface is not a single-channel float target, or has
    /// no pixels at all.
    #[error("surface format mismatch: {format:?} {width}x{height} (expected single-channel float, non-empty)")]
    FormatMismatch {
        format: SurfaceFormat,
        width: u32,
        height: u32,
    },

    /// The surface readback returned fewer values than its dimensions imply.
    #[error("surface readback short: expected {expected} values, got {actual}")]
    ShortReadback { expected: usize, actual: usize },

    // ── Network Errors ───────────────────────────────────────────
    /// The TCP/IO layer reported an error.
    #[error("network I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The service answered with a non-success HTTP status.
    #[error("service returned HTTP {status}")]
    Status { status: u16 },

    /// The service reply was not valid HTTP/1.x.
    #[error("malformed HTTP response: {0}")]
    MalformedHttp(&'static str),

    /// A header block or body exceeded the configured limit.
    #[error("response too large: {size} bytes (max {max})")]
    ResponseTooLarge { size: usize, max: usize },

    /// The exchange exceeded its deadline.
    #[error("exchange timed out after {0:?}")]
    Timeout(Duration),

    /// The exchange task ended without reporting a result.
    #[error("exchange abandoned before completion")]
    ExchangeAbandoned,

    // ── Response Errors ──────────────────────────────────────────
    /// A required field was absent or empty in the service response.
    #[error("missing field in service response: {0}")]
    MissingField(&'static str),

    /// The response body, base64 text, or embedded image was malformed.
    #[error("codec error: {0}")]
    Codec(String),

    // ── State Errors ─────────────────────────────────────────────
    /// An exchange state transition was attempted from the wrong state.
    #[error("invalid exchange transition: {0}")]
    InvalidTransition(&'static str),
}

impl SandboxError {
    /// Whether this error came from the transport or the HTTP protocol,
    /// as opposed to the capture or decode stages.
    ///
    /// Network errors are the ones subject to the recovery policy.
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            Self::Io(_)
                | Self::Status { .. }
                | Self::MalformedHttp(_)
                | Self::ResponseTooLarge { .. }
                | Self::Timeout(_)
                | Self::ExchangeAbandoned
        )
    }
}

// ── Convenient From implementations ──────────────────────────────

impl From<serde_json::Error> for SandboxError {
    fn from(e: serde_json::Error) -> Self {
        SandboxError::Codec(format!("invalid response json: {e}"))
    }
}

impl From<base64::DecodeError> for SandboxError {
    fn from(e: base64::DecodeError) -> Self {
        SandboxError::Codec(format!("invalid base64 image: {e}"))
    }
}

impl From<image::ImageError> for SandboxError {
    fn from(e: image::ImageError) -> Self {
        SandboxError::Codec(format!("invalid image data: {e}"))
    }
}

impl From<tokio::sync::oneshot::error::RecvError> for SandboxError {
    fn from(_: tokio::sync::oneshot::error::RecvError) -> Self {
        SandboxError::ExchangeAbandoned
    }
}
