//! Shared types for the capture → exchange → display pipeline.
//!
//! [`HeightField`] is the transient capture product, borrowed from the
//! sampler's scratch buffer. [`DisplayFrame`] is the decoded result that
//! the display buffer manager takes over.

// ── SurfaceFormat ────────────────────────────────────────────────

/// Texel layout of a render surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SurfaceFormat {
    /// One 16-bit float channel.
    R16Float,
    /// One 32-bit float channel.
    R32Float,
    /// 4 bytes per pixel: Red, Green, Blue, Alpha.
    Rgba8,
    /// Four 16-bit float channels.
    Rgba16Float,
    /// 32-bit float depth attachment.
    Depth32Float,
}

impl SurfaceFormat {
    /// Whether the sampler can read this format as a height field.
    pub const fn is_single_channel_float(self) -> bool {
        matches!(self, SurfaceFormat::R16Float | SurfaceFormat::R32Float)
    }
}

// ── HeightField ──────────────────────────────────────────────────

/// A row-major scalar field, one finite `f32` per pixel.
///
/// Borrowed from [`FrameSampler`](crate::stream::sampler::FrameSampler)
/// and valid only until the next sample.
#[derive(Debug, Clone, Copy)]
pub struct HeightField<'a> {
    width: u32,
    height: u32,
    values: &'a [f32],
}

impl<'a> HeightField<'a> {
    /// Wrap `values`, returning `None` unless `values.len() == width * height`.
    pub fn new(width: u32, height: u32, values: &'a [f32]) -> Option<Self> {
        (values.len() == width as usize * height as usize).then_some(Self {
            width,
            height,
            values,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// All samples in row-major order.
    pub fn values(&self) -> &'a [f32] {
        self.values
    }
}

// ── DisplayFrame ─────────────────────────────────────────────────

/// A decoded RGBA8 image, tightly packed (`width * 4` bytes per row).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayFrame {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// RGBA8 pixel data, `width * height * 4` bytes.
    pub pixels: Vec<u8>,
}

impl DisplayFrame {
    /// Bytes per RGBA8 pixel.
    pub const BYTES_PER_PIXEL: usize = 4;

    /// Total byte size of the pixel buffer.
    pub fn byte_len(&self) -> usize {
        self.width as usize * self.height as usize * Self::BYTES_PER_PIXEL
    }

    /// Whether `other` has the same pixel dimensions.
    pub fn same_size(&self, width: u32, height: u32) -> bool {
        self.width == width && self.height == height
    }
}
