//! Headless presentation sink.

use std::path::Path;

use tracing::{debug, info};

use sandbox_core::{ShaderTextureSink, TextureHandle, TextureView};

/// Records what the display buffer binds, in place of a GPU material.
#[derive(Debug, Default)]
pub struct RecordingSink {
    name: Option<String>,
    handle: Option<TextureHandle>,
    width: u32,
    height: u32,
    last: Vec<u8>,
    binds: u64,
    rebinds: u64,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shader property currently bound, if any.
    pub fn bound_name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn handle(&self) -> Option<TextureHandle> {
        self.handle
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Total bind calls.
    pub fn binds(&self) -> u64 {
        self.binds
    }

    /// Binds that switched to a new texture object.
    pub fn rebinds(&self) -> u64 {
        self.rebinds
    }

    /// Write the last-bound frame as an RGBA PNG.
    ///
    /// Returns `Ok(false)` when nothing has been bound yet.
    pub fn save_png(&self, path: &Path) -> image::ImageResult<bool> {
        if self.last.is_empty() {
            return Ok(false);
        }
        image::save_buffer(
            path,
            &self.last,
            self.width,
            self.height,
            image::ExtendedColorType::Rgba8,
        )?;
        Ok(true)
    }
}

impl ShaderTextureSink for RecordingSink {
    fn bind_texture(&mut self, name: &str, texture: TextureView<'_>) {
        if self.handle != Some(texture.handle) {
            if self.handle.is_some() {
                self.rebinds += 1;
            }
            info!(
                "{name} bound to {} ({}x{})",
                texture.handle, texture.width, texture.height
            );
            self.handle = Some(texture.handle);
            self.name = Some(name.to_string());
        }
        self.binds += 1;
        self.width = texture.width;
        self.height = texture.height;
        self.last.clear();
        self.last.extend_from_slice(texture.pixels);
    }

    fn unbind_texture(&mut self, name: &str) {
        debug!("{name} unbound");
        self.name = None;
        self.handle = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view(handle: u64, w: u32, h: u32, pixels: &[u8]) -> TextureView<'_> {
        TextureView {
            handle: TextureHandle(handle),
            width: w,
            height: h,
            pixels,
        }
    }

    #[test]
    fn counts_binds_and_rebinds() {
        let mut sink = RecordingSink::new();
        let px = [0u8; 16];
        sink.bind_texture("_Tex", view(1, 2, 2, &px));
        sink.bind_texture("_Tex", view(1, 2, 2, &px));
        sink.bind_texture("_Tex", view(2, 1, 4, &px));
        assert_eq!(sink.binds(), 3);
        assert_eq!(sink.rebinds(), 1);
        assert_eq!(sink.dimensions(), (1, 4));
        assert_eq!(sink.handle(), Some(TextureHandle(2)));
    }

    #[test]
    fn unbind_clears_binding() {
        let mut sink = RecordingSink::new();
        sink.bind_texture("_Tex", view(1, 1, 1, &[1, 2, 3, 4]));
        assert_eq!(sink.bound_name(), Some("_Tex"));
        sink.unbind_texture("_Tex");
        assert!(sink.bound_name().is_none());
        assert!(sink.handle().is_none());
    }

    #[test]
    fn save_png_writes_last_frame() {
        let path = std::env::temp_dir().join(format!("sandbox-sink-{}.png", std::process::id()));
        let mut sink = RecordingSink::new();
        assert!(!sink.save_png(&path).unwrap());

        let px: Vec<u8> = (0..2 * 3 * 4).map(|i| i as u8).collect();
        sink.bind_texture("_Tex", view(1, 2, 3, &px));
        assert!(sink.save_png(&path).unwrap());

        let img = image::open(&path).unwrap().to_rgba8();
        assert_eq!(img.dimensions(), (2, 3));
        assert_eq!(img.as_raw(), &px);
        let _ = std::fs::remove_file(&path);
    }
}
