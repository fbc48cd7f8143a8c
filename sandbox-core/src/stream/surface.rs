//! Collaborator interfaces at the edges of the pipeline.
//!
//! The host rendering engine implements [`RenderSurfaceSource`] for its
//! processed height target and [`ShaderTextureSink`] for whatever
//! material presents the result. Nothing here retains a host resource
//! past a single call.

use std::fmt;

use crate::error::SandboxError;
use crate::stream::types::SurfaceFormat;

// ── RenderSurfaceSource ──────────────────────────────────────────

/// A readable render target.
pub trait RenderSurfaceSource {
    /// Texel format of the target.
    fn format(&self) -> SurfaceFormat;

    /// Width in pixels.
    fn width(&self) -> u32;

    /// Height in pixels.
    fn height(&self) -> u32;

    /// Read the first channel of every pixel into `dst`, row-major.
    ///
    /// `dst` has exactly `width * height` elements. Returns the number of
    /// values written.
    fn read_pixels(&self, dst: &mut [f32]) -> Result<usize, SandboxError>;
}

/// An owned, in-memory surface.
///
/// Useful for hosts that perform their own GPU readback, and for tests.
#[derive(Debug, Clone)]
pub struct StaticSurface {
    format: SurfaceFormat,
    width: u32,
    height: u32,
    values: Vec<f32>,
}

impl StaticSurface {
    /// A single-channel `R32Float` surface holding `values`.
    ///
    /// `values` is truncated or zero-padded to `width * height`.
    pub fn new(width: u32, height: u32, mut values: Vec<f32>) -> Self {
        values.resize(width as usize * height as usize, 0.0);
        Self {
            format: SurfaceFormat::R32Float,
            width,
            height,
            values,
        }
    }

    /// Override the reported format tag.
    pub fn with_format(mut self, format: SurfaceFormat) -> Self {
        self.format = format;
        self
    }

    /// Mutable access to the backing values, for animating between ticks.
    pub fn values_mut(&mut self) -> &mut [f32] {
        &mut self.values
    }
}

impl RenderSurfaceSource for StaticSurface {
    fn format(&self) -> SurfaceFormat {
        self.format
    }

    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn read_pixels(&self, dst: &mut [f32]) -> Result<usize, SandboxError> {
        let n = dst.len().min(self.values.len());
        dst[..n].copy_from_slice(&self.values[..n]);
        Ok(n)
    }
}

// ── ShaderTextureSink ────────────────────────────────────────────

/// Identity of one display buffer allocation.
///
/// A new handle is issued every time the buffer is reallocated, so a
/// sink can tell a resize (new texture object) from an in-place update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureHandle(pub u64);

impl fmt::Display for TextureHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tex#{}", self.0)
    }
}

/// A borrowed view of the live display buffer.
///
/// The borrow ends when the sink call returns, so a sink can never hold
/// on to pixels across a subsequent publish.
#[derive(Debug, Clone, Copy)]
pub struct TextureView<'a> {
    pub handle: TextureHandle,
    pub width: u32,
    pub height: u32,
    /// RGBA8 pixel data.
    pub pixels: &'a [u8],
}

/// Receives the current display frame for presentation.
pub trait ShaderTextureSink {
    /// Bind (or rebind) `texture` under the shader property `name`.
    fn bind_texture(&mut self, name: &str, texture: TextureView<'_>);

    /// Remove the binding for `name`; its buffer has been released.
    fn unbind_texture(&mut self, name: &str);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_surface_pads_values() {
        let surface = StaticSurface::new(2, 2, vec![1.0, 2.0]);
        let mut dst = [9.0f32; 4];
        assert_eq!(surface.read_pixels(&mut dst).unwrap(), 4);
        assert_eq!(dst, [1.0, 2.0, 0.0, 0.0]);
    }

    #[test]
    fn texture_handle_display() {
        assert_eq!(TextureHandle(7).to_string(), "tex#7");
    }
}
