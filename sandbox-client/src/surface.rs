//! Animated stand-in for the host's processed depth target.

use std::f32::consts::TAU;

use sandbox_core::{RenderSurfaceSource, SandboxError, SurfaceFormat};

/// Concentric ripple height field, `R32Float`.
///
/// Values lie in `[0, 1]`: a unit-amplitude wave centred on the surface,
/// biased and scaled so the trough touches zero.
#[derive(Debug, Clone)]
pub struct ProceduralSurface {
    width: u32,
    height: u32,
    /// Seconds of animation elapsed.
    time: f32,
    /// Spatial frequency, in waves across the shorter side.
    waves: f32,
    /// Temporal frequency in Hz.
    speed: f32,
}

impl ProceduralSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            time: 0.0,
            waves: 4.0,
            speed: 0.5,
        }
    }

    /// Advance the animation by `dt` seconds.
    pub fn advance(&mut self, dt: f32) {
        self.time += dt;
    }

    pub fn time(&self) -> f32 {
        self.time
    }

    fn sample(&self, x: u32, y: u32) -> f32 {
        let span = self.width.min(self.height).max(1) as f32;
        let dx = (x as f32 + 0.5 - self.width as f32 / 2.0) / span;
        let dy = (y as f32 + 0.5 - self.height as f32 / 2.0) / span;
        let r = (dx * dx + dy * dy).sqrt();
        let phase = TAU * (self.waves * r - self.speed * self.time);
        0.5 + 0.5 * phase.sin()
    }
}

impl RenderSurfaceSource for ProceduralSurface {
    fn format(&self) -> SurfaceFormat {
        SurfaceFormat::R32Float
    }

    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn read_pixels(&self, dst: &mut [f32]) -> Result<usize, SandboxError> {
        let mut written = 0;
        let rows = dst.chunks_exact_mut(self.width.max(1) as usize).take(self.height as usize);
        for (y, row) in rows.enumerate() {
            for (x, out) in row.iter_mut().enumerate() {
                *out = self.sample(x as u32, y as u32);
            }
            written += row.len();
        }
        Ok(written)
    }
}
