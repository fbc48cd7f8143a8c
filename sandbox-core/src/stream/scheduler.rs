//! Per-tick driver of the capture → exchange → display loop.
//!
//! The host calls [`ExchangeScheduler::tick`] once per rendered frame.
//! Each tick does exactly one of:
//!
//! 1. **Publish**: a response has landed, so decode it, publish it to the
//!    display buffer, and reopen the gate.
//! 2. **Send**: the gate is open, so sample the surface, encode it, issue
//!    the exchange, and close the gate.
//! 3. **Wait**: the exchange is still outstanding, or the gate is held
//!    closed by the recovery policy.
//!
//! Decode work and buffer mutation happen only here, on the tick caller's
//! thread. The network side just completes a one-shot channel.

use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::error::SandboxError;
use crate::network::exchange::Exchange;
use crate::state::exchange::{Completion, ExchangeState, RecoveryPolicy};
use crate::stream::display::{DEFAULT_TEXTURE_NAME, DisplayBufferManager};
use crate::stream::latency::LatencyTracker;
use crate::stream::payload::PayloadCodec;
use crate::stream::sampler::FrameSampler;
use crate::stream::surface::{RenderSurfaceSource, ShaderTextureSink};

// ── SchedulerConfig ──────────────────────────────────────────────

/// Configuration for [`ExchangeScheduler`].
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// What to do after a network failure.
    pub recovery: RecoveryPolicy,
    /// Shader property the processed image is bound to.
    pub texture_name: String,
    /// Rolling window for throughput statistics.
    pub stats_window: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            recovery: RecoveryPolicy::default(),
            texture_name: DEFAULT_TEXTURE_NAME.into(),
            stats_window: Duration::from_secs(1),
        }
    }
}

// ── TickOutcome ──────────────────────────────────────────────────

/// What a single tick did.
#[derive(Debug)]
pub enum TickOutcome {
    /// A new exchange was issued.
    Sent {
        frame: u64,
        width: u32,
        height: u32,
        bytes: usize,
    },
    /// The outstanding exchange has not completed yet.
    Waiting,
    /// A response was decoded and published.
    Published {
        frame: u64,
        width: u32,
        height: u32,
        reallocated: bool,
    },
    /// Capture failed; nothing was sent and the gate stays open.
    Skipped(SandboxError),
    /// The exchange failed or its response could not be decoded.
    Dropped { frame: u64, error: SandboxError },
    /// The gate is closed by the backoff policy.
    BackingOff { remaining: Duration },
    /// The gate is closed until [`ExchangeScheduler::resume`].
    Stalled,
}

// ── ExchangeStats ────────────────────────────────────────────────

/// Loop statistics exposed to the host.
#[derive(Debug, Clone, Default)]
pub struct ExchangeStats {
    pub frames_sent: u64,
    pub frames_published: u64,
    /// Frames lost to network or decode failures.
    pub frames_dropped: u64,
    /// Ticks whose capture failed.
    pub frames_skipped: u64,
    pub network_failures: u64,
    pub consecutive_failures: u32,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub reallocations: u64,
    pub smoothed_rtt: Duration,
    pub last_rtt: Duration,
    pub throughput_bps: u64,
    pub exchanges_per_sec: f64,
}

// ── ExchangeScheduler ────────────────────────────────────────────

/// Single-in-flight exchange loop.
///
/// # Lifetime
///
/// Drive with [`tick`](Self::tick). End with [`shutdown`](Self::shutdown)
/// to discard an outstanding exchange, or [`drain`](Self::drain) to wait
/// for it; both release the display buffer before returning.
pub struct ExchangeScheduler<E: Exchange> {
    exchange: E,
    sampler: FrameSampler,
    codec: PayloadCodec,
    display: DisplayBufferManager,
    latency: LatencyTracker,
    state: ExchangeState,
    recovery: RecoveryPolicy,
    next_frame: u64,
    stats: ExchangeStats,
}

impl<E: Exchange> ExchangeScheduler<E> {
    /// Create a scheduler with the default configuration.
    pub fn new(exchange: E) -> Self {
        Self::with_config(exchange, SchedulerConfig::default())
    }

    /// Create a scheduler with explicit configuration.
    pub fn with_config(exchange: E, config: SchedulerConfig) -> Self {
        Self {
            exchange,
            sampler: FrameSampler::new(),
            codec: PayloadCodec::new(),
            display: DisplayBufferManager::new(config.texture_name),
            latency: LatencyTracker::with_window(config.stats_window),
            state: ExchangeState::Idle,
            recovery: config.recovery,
            next_frame: 0,
            stats: ExchangeStats::default(),
        }
    }

    pub fn state(&self) -> &ExchangeState {
        &self.state
    }

    pub fn recovery(&self) -> RecoveryPolicy {
        self.recovery
    }

    pub fn display(&self) -> &DisplayBufferManager {
        &self.display
    }

    pub fn exchange(&self) -> &E {
        &self.exchange
    }

    /// Snapshot of the loop statistics.
    pub fn stats(&self) -> ExchangeStats {
        ExchangeStats {
            reallocations: self.display.reallocations(),
            smoothed_rtt: self.latency.smoothed_rtt(),
            last_rtt: self.latency.last_rtt(),
            throughput_bps: self.latency.throughput_bps(),
            exchanges_per_sec: self.latency.exchanges_per_sec(),
            ..self.stats.clone()
        }
    }

    /// Advance the loop by one frame.
    pub fn tick(
        &mut self,
        surface: &dyn RenderSurfaceSource,
        sink: &mut dyn ShaderTextureSink,
    ) -> TickOutcome {
        self.tick_at(Instant::now(), surface, sink)
    }

    /// [`tick`](Self::tick) with an explicit clock reading.
    pub fn tick_at(
        &mut self,
        now: Instant,
        surface: &dyn RenderSurfaceSource,
        sink: &mut dyn ShaderTextureSink,
    ) -> TickOutcome {
        match self.state {
            ExchangeState::Idle => self.begin_exchange(now, surface),
            ExchangeState::AwaitingResponse { .. } => self.poll_exchange(now, sink),
            ExchangeState::Backoff { until } => {
                if self.state.reopen_if_due(now) {
                    debug!("backoff elapsed; gate reopened");
                    self.begin_exchange(now, surface)
                } else {
                    TickOutcome::BackingOff {
                        remaining: until.saturating_duration_since(now),
                    }
                }
            }
            ExchangeState::Stalled => TickOutcome::Stalled,
            ExchangeState::Sending { .. } | ExchangeState::Decoding { .. } => {
                // Both are entered and left within a single tick.
                error!("tick entered in transient state {}", self.state);
                TickOutcome::Waiting
            }
        }
    }

    /// Reopen a gate closed by a network failure.
    ///
    /// Returns `false` if the gate was not closed by a failure.
    pub fn resume(&mut self) -> bool {
        match self.state.resume() {
            Ok(()) => {
                info!("exchange loop resumed");
                true
            }
            Err(_) => false,
        }
    }

    /// Discard any outstanding exchange and release the display buffer.
    pub fn shutdown(mut self, sink: &mut dyn ShaderTextureSink) -> ExchangeStats {
        if let Some(frame) = self.state.in_flight_frame() {
            info!("discarding outstanding exchange for frame #{frame}");
        }
        self.state = ExchangeState::Idle;
        self.display.teardown(sink);
        self.stats()
    }

    /// Wait up to `timeout` for the outstanding exchange, publish it if it
    /// succeeded, then shut down.
    pub async fn drain(
        mut self,
        timeout: Duration,
        sink: &mut dyn ShaderTextureSink,
    ) -> ExchangeStats {
        if let ExchangeState::AwaitingResponse { frame, pending, .. } = &mut self.state {
            let frame = *frame;
            if tokio::time::timeout(timeout, pending.wait()).await.is_err() {
                warn!("frame #{frame} still outstanding after {timeout:?}; discarding");
            } else {
                let outcome = self.poll_exchange(Instant::now(), sink);
                debug!("drained frame #{frame}: {outcome:?}");
            }
        }
        self.shutdown(sink)
    }

    // ── Internal ─────────────────────────────────────────────────

    /// Idle → Sending → AwaitingResponse.
    fn begin_exchange(&mut self, now: Instant, surface: &dyn RenderSurfaceSource) -> TickOutcome {
        let payload = match self.sampler.sample(surface) {
            Ok(field) => PayloadCodec::encode(&field),
            Err(e) => {
                warn!("capture skipped: {e}");
                self.stats.frames_skipped += 1;
                return TickOutcome::Skipped(e);
            }
        };

        let frame = self.next_frame;
        self.next_frame += 1;
        let (width, height, bytes) = (payload.width, payload.height, payload.body.len());

        Self::step(self.state.begin_send(frame, now));
        let pending = self.exchange.submit(payload);
        Self::step(self.state.await_response(pending));

        self.stats.frames_sent += 1;
        self.stats.bytes_sent += bytes as u64;
        debug!("frame #{frame} sent ({width}x{height}, {bytes} bytes)");

        TickOutcome::Sent {
            frame,
            width,
            height,
            bytes,
        }
    }

    /// AwaitingResponse → Decoding → Idle, or → Backoff/Stalled on failure.
    fn poll_exchange(&mut self, now: Instant, sink: &mut dyn ShaderTextureSink) -> TickOutcome {
        let Some(Completion {
            frame,
            started,
            bytes_out,
            result,
        }) = self.state.try_complete()
        else {
            return TickOutcome::Waiting;
        };

        let body = match result {
            Ok(body) => body,
            Err(error) if error.is_network() => return self.fail(frame, error, now),
            Err(error) => {
                // The round trip completed; only this frame is lost.
                Self::step(self.state.begin_decode());
                Self::step(self.state.finish());
                return self.drop_frame(frame, error);
            }
        };

        Self::step(self.state.begin_decode());
        self.stats.bytes_received += body.len() as u64;
        self.latency.record_at(
            now,
            (bytes_out + body.len()) as u64,
            now.saturating_duration_since(started),
        );

        let decoded =
            PayloadCodec::parse_response(&body).and_then(|response| self.codec.decode(&response));
        let outcome = match decoded {
            Ok(display_frame) => {
                let (width, height) = (display_frame.width, display_frame.height);
                let published = self.display.publish(display_frame, sink);
                self.stats.frames_published += 1;
                self.stats.consecutive_failures = 0;
                debug!("frame #{frame} published ({width}x{height})");
                TickOutcome::Published {
                    frame,
                    width,
                    height,
                    reallocated: published.reallocated(),
                }
            }
            Err(error) => self.drop_frame(frame, error),
        };

        Self::step(self.state.finish());
        outcome
    }

    /// Lose one frame without touching the gate or the published image.
    fn drop_frame(&mut self, frame: u64, error: SandboxError) -> TickOutcome {
        warn!("frame #{frame} dropped: {error}");
        self.stats.frames_dropped += 1;
        TickOutcome::Dropped { frame, error }
    }

    fn fail(&mut self, frame: u64, error: SandboxError, now: Instant) -> TickOutcome {
        self.stats.frames_dropped += 1;
        self.stats.network_failures += 1;
        self.stats.consecutive_failures = self.stats.consecutive_failures.saturating_add(1);

        let delay = self.recovery.delay_for(self.stats.consecutive_failures);
        match delay {
            Some(d) => warn!("frame #{frame} dropped: {error}; retrying in {d:?}"),
            None => error!("frame #{frame} dropped: {error}; exchange loop stalled"),
        }
        Self::step(self.state.fail(delay, now));
        TickOutcome::Dropped { frame, error }
    }

    /// Transitions issued by the scheduler are valid by construction; a
    /// rejected one means the state machine and the tick logic disagree.
    fn step(result: Result<(), SandboxError>) {
        if let Err(e) = result {
            error!("exchange state machine: {e}");
        }
    }
}
