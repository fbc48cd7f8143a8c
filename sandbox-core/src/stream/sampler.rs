//! Render-surface readback into a height field.
//!
//! The sampler owns a scratch buffer sized to the current resolution and
//! lends it out as a [`HeightField`]. The buffer is only reallocated when
//! the surface dimensions change.

use tracing::{debug, warn};

use crate::error::SandboxError;
use crate::stream::surface::RenderSurfaceSource;
use crate::stream::types::HeightField;

/// Reads single-channel float surfaces into a reusable scratch buffer.
#[derive(Debug, Default)]
pub struct FrameSampler {
    scratch: Vec<f32>,
    width: u32,
    height: u32,
    /// Non-finite values replaced during the last sample.
    last_sanitized: usize,
}

impl FrameSampler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sample `surface` into a height field.
    ///
    /// Fails with [`SandboxError::FormatMismatch`] unless the surface is a
    /// non-empty single-channel float target. NaN and infinite samples
    /// are replaced with `0.0`.
    pub fn sample(
        &mut self,
        surface: &dyn RenderSurfaceSource,
    ) -> Result<HeightField<'_>, SandboxError> {
        let format = surface.format();
        let (width, height) = (surface.width(), surface.height());
        if !format.is_single_channel_float() || width == 0 || height == 0 {
            return Err(SandboxError::FormatMismatch {
                format,
                width,
                height,
            });
        }

        if width != self.width || height != self.height {
            debug!(
                "sampler scratch resize {}x{} -> {width}x{height}",
                self.width, self.height
            );
            self.scratch.clear();
            self.scratch.resize(width as usize * height as usize, 0.0);
            self.width = width;
            self.height = height;
        }

        let written = surface.read_pixels(&mut self.scratch)?;
        if written != self.scratch.len() {
            return Err(SandboxError::ShortReadback {
                expected: self.scratch.len(),
                actual: written,
            });
        }

        self.last_sanitized = 0;
        for v in self.scratch.iter_mut().filter(|v| !v.is_finite()) {
            *v = 0.0;
            self.last_sanitized += 1;
        }
        if self.last_sanitized > 0 {
            warn!("replaced {} non-finite samples", self.last_sanitized);
        }

        HeightField::new(width, height, &self.scratch).ok_or(SandboxError::ShortReadback {
            expected: width as usize * height as usize,
            actual: self.scratch.len(),
        })
    }

    /// Number of non-finite values replaced during the last sample.
    pub fn last_sanitized(&self) -> usize {
        self.last_sanitized
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::surface::StaticSurface;
    use crate::stream::types::SurfaceFormat;

    #[test]
    fn samples_row_major_values() {
        let surface = StaticSurface::new(3, 2, vec![0.0, 0.5, 1.0, 1.5, 2.0, 2.5]);
        let mut sampler = FrameSampler::new();
        let field = sampler.sample(&surface).unwrap();
        assert_eq!(field.width(), 3);
        assert_eq!(field.height(), 2);
        assert_eq!(field.values(), &[0.0, 0.5, 1.0, 1.5, 2.0, 2.5]);
    }

    #[test]
    fn wrong_format_is_rejected() {
        let surface = StaticSurface::new(4, 4, vec![]).with_format(SurfaceFormat::Rgba8);
        let mut sampler = FrameSampler::new();
        let err = sampler.sample(&surface).unwrap_err();
        assert!(matches!(
            err,
            SandboxError::FormatMismatch {
                format: SurfaceFormat::Rgba8,
                ..
            }
        ));
    }

    #[test]
    fn zero_dimension_is_rejected() {
        let surface = StaticSurface::new(0, 8, vec![]);
        let mut sampler = FrameSampler::new();
        assert!(matches!(
            sampler.sample(&surface),
            Err(SandboxError::FormatMismatch { width: 0, .. })
        ));
    }

    #[test]
    fn half_float_surfaces_are_accepted() {
        let surface = StaticSurface::new(2, 1, vec![0.25, 0.75]).with_format(SurfaceFormat::R16Float);
        let mut sampler = FrameSampler::new();
        assert_eq!(sampler.sample(&surface).unwrap().values(), &[0.25, 0.75]);
    }

    #[test]
    fn non_finite_values_are_zeroed() {
        let surface = StaticSurface::new(4, 1, vec![1.0, f32::NAN, f32::INFINITY, -2.0]);
        let mut sampler = FrameSampler::new();
        let values = sampler.sample(&surface).unwrap().values().to_vec();
        assert_eq!(values, vec![1.0, 0.0, 0.0, -2.0]);
        assert_eq!(sampler.last_sanitized(), 2);
    }

    #[test]
    fn scratch_is_reused_at_same_resolution() {
        let surface = StaticSurface::new(16, 16, vec![]);
        let mut sampler = FrameSampler::new();
        let ptr_a = sampler.sample(&surface).unwrap().values().as_ptr();
        let ptr_b = sampler.sample(&surface).unwrap().values().as_ptr();
        assert_eq!(ptr_a, ptr_b);

        let larger = StaticSurface::new(32, 32, vec![]);
        assert_eq!(sampler.sample(&larger).unwrap().values().len(), 32 * 32);
    }

    struct ShortSurface;

    impl RenderSurfaceSource for ShortSurface {
        fn format(&self) -> SurfaceFormat {
            SurfaceFormat::R32Float
        }
        fn width(&self) -> u32 {
            4
        }
        fn height(&self) -> u32 {
            4
        }
        fn read_pixels(&self, _dst: &mut [f32]) -> Result<usize, SandboxError> {
            Ok(3)
        }
    }

    #[test]
    fn short_readback_is_an_error() {
        let mut sampler = FrameSampler::new();
        assert!(matches!(
            sampler.sample(&ShortSurface),
            Err(SandboxError::ShortReadback {
                expected: 16,
                actual: 3
            })
        ));
    }
}
