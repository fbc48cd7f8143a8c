//! # sandbox-core
//!
//! Frame-streaming core for the sandbox remote-processing client.
//!
//! This crate contains:
//! - **Stream**: sampler, payload codec, display buffer, and the per-tick
//!   `ExchangeScheduler`
//! - **Codec**: `HttpCodec` for framed HTTP/1.1 I/O via `tokio_util`
//! - **Network**: the `Exchange` seam and its `HttpExchange` implementation
//! - **State**: the `ExchangeState` machine and `RecoveryPolicy`
//! - **Error**: `SandboxError`, a typed, `thiserror`-based error hierarchy

pub mod codec;
pub mod error;
pub mod network;
pub mod state;
pub mod stream;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use codec::{HttpCodec, HttpRequest, HttpResponse};
pub use error::SandboxError;
pub use network::{Exchange, ExchangeConfig, HttpExchange, PendingExchange};
pub use state::{ExchangeState, RecoveryPolicy};
pub use stream::{
    DisplayBufferManager, DisplayFrame, ExchangeScheduler, ExchangeStats, FrameSampler,
    HeightField, PayloadCodec, RenderSurfaceSource, RequestPayload, SchedulerConfig,
    ServiceResponse, ShaderTextureSink, StaticSurface, SurfaceFormat, TextureHandle, TextureView,
    TickOutcome,
};
