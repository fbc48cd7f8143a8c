//! # stream: height-field streaming pipeline
//!
//! ## Architecture
//!
//! ```text
//!  HOST (render loop)                     NETWORK (tokio task)
//! ┌────────────────────────────┐        ┌───────────────────────────┐
//! │ tick()                     │        │                           │
//! │  FrameSampler::sample      │        │                           │
//! │   ↓                        │ submit │ HttpExchange::post        │
//! │  PayloadCodec::encode ─────┼──────► │   POST /sandbox?w&h       │
//! │                            │        │   ↓                       │
//! │ tick() (later)             │ oneshot│ HttpCodec (response)      │
//! │  PayloadCodec::decode ◄────┼─────── │                           │
//! │   ↓                        │        │                           │
//! │  DisplayBufferManager      │        │                           │
//! │   ↓                        │        │                           │
//! │  ShaderTextureSink         │        │                           │
//! └────────────────────────────┘        └───────────────────────────┘
//! ```
//!
//! ## Sub-modules
//!
//! | Module      | Purpose                                              |
//! |-------------|------------------------------------------------------|
//! | `types`     | Height field, display frame and surface format types |
//! | `surface`   | Host collaborator traits (source and sink)           |
//! | `sampler`   | Surface readback into a reusable scratch buffer      |
//! | `payload`   | Request body encoding, response decoding             |
//! | `display`   | Owner of the live display buffer                     |
//! | `latency`   | Round-trip and throughput statistics                 |
//! | `scheduler` | Per-tick state machine driver                        |

pub mod display;
pub mod latency;
pub mod payload;
pub mod sampler;
pub mod scheduler;
pub mod surface;
pub mod types;

// ── Re-exports ───────────────────────────────────────────────────

pub use display::{DisplayBufferManager, PublishOutcome};
pub use latency::LatencyTracker;
pub use payload::{PayloadCodec, RequestPayload, ServiceResponse};
pub use sampler::FrameSampler;
pub use scheduler::{ExchangeScheduler, ExchangeStats, SchedulerConfig, TickOutcome};
pub use surface::{
    RenderSurfaceSource, ShaderTextureSink, StaticSurface, TextureHandle, TextureView,
};
pub use types::{DisplayFrame, HeightField, SurfaceFormat};
