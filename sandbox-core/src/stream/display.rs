//! Owner of the live display buffer.
//!
//! Exactly one decoded frame is live at a time. A publish with new
//! dimensions releases the previous buffer and allocates a fresh one
//! under a new [`TextureHandle`]; a publish with unchanged dimensions
//! copies pixels into the existing allocation.

use tracing::{debug, info};

use crate::stream::surface::{ShaderTextureSink, TextureHandle, TextureView};
use crate::stream::types::DisplayFrame;

/// Default shader property the processed image is bound to.
pub const DEFAULT_TEXTURE_NAME: &str = "_FireSurfaceTex";

// ── PublishOutcome ───────────────────────────────────────────────

/// What a publish did to the display buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// A new buffer was allocated (first frame or dimension change).
    Reallocated { handle: TextureHandle },
    /// Pixels were copied into the existing buffer.
    Updated { handle: TextureHandle },
}

impl PublishOutcome {
    pub fn handle(&self) -> TextureHandle {
        match self {
            Self::Reallocated { handle } | Self::Updated { handle } => *handle,
        }
    }

    pub fn reallocated(&self) -> bool {
        matches!(self, Self::Reallocated { .. })
    }
}

// ── DisplayBufferManager ─────────────────────────────────────────

struct DisplayBuffer {
    handle: TextureHandle,
    frame: DisplayFrame,
}

/// Manages the single live display buffer and its sink binding.
pub struct DisplayBufferManager {
    texture_name: String,
    buffer: Option<DisplayBuffer>,
    next_handle: u64,
    reallocations: u64,
}

impl DisplayBufferManager {
    /// Create a manager binding to `texture_name`.
    pub fn new(texture_name: impl Into<String>) -> Self {
        Self {
            texture_name: texture_name.into(),
            buffer: None,
            next_handle: 1,
            reallocations: 0,
        }
    }

    /// Shader property name used for the sink binding.
    pub fn texture_name(&self) -> &str {
        &self.texture_name
    }

    /// Take ownership of `frame` as the live display buffer and bind it.
    pub fn publish(
        &mut self,
        frame: DisplayFrame,
        sink: &mut dyn ShaderTextureSink,
    ) -> PublishOutcome {
        let reusable = self
            .buffer
            .as_mut()
            .filter(|buf| {
                buf.frame.same_size(frame.width, frame.height)
                    && buf.frame.pixels.len() == frame.byte_len()
                    && frame.pixels.len() == frame.byte_len()
            });
        let outcome = match reusable {
            Some(buf) => {
                buf.frame.pixels.copy_from_slice(&frame.pixels);
                PublishOutcome::Updated { handle: buf.handle }
            }
            None => {
                let handle = TextureHandle(self.next_handle);
                self.next_handle += 1;
                self.reallocations += 1;
                if let Some(old) = self.buffer.take() {
                    debug!(
                        "releasing display buffer {} ({}x{})",
                        old.handle, old.frame.width, old.frame.height
                    );
                }
                info!(
                    "allocated display buffer {handle} ({}x{})",
                    frame.width, frame.height
                );
                self.buffer = Some(DisplayBuffer { handle, frame });
                PublishOutcome::Reallocated { handle }
            }
        };

        if let Some(view) = self.current() {
            sink.bind_texture(&self.texture_name, view);
        }
        outcome
    }

    /// Borrow the live buffer, if any.
    pub fn current(&self) -> Option<TextureView<'_>> {
        self.buffer.as_ref().map(|buf| TextureView {
            handle: buf.handle,
            width: buf.frame.width,
            height: buf.frame.height,
            pixels: &buf.frame.pixels,
        })
    }

    /// Dimensions of the live buffer.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.buffer
            .as_ref()
            .map(|buf| (buf.frame.width, buf.frame.height))
    }

    /// Number of allocations performed since construction.
    pub fn reallocations(&self) -> u64 {
        self.reallocations
    }

    /// Release the live buffer and unbind it from the sink.
    ///
    /// Idempotent: a second call is a no-op.
    pub fn teardown(&mut self, sink: &mut dyn ShaderTextureSink) {
        if let Some(buf) = self.buffer.take() {
            info!("released display buffer {}", buf.handle);
            sink.unbind_texture(&self.texture_name);
        }
    }
}

impl Default for DisplayBufferManager {
    fn default() -> Self {
        Self::new(DEFAULT_TEXTURE_NAME)
    }
}
