//! Off-screen surfaces used while capturing a frame.
//!
//! A [`Stage`] keeps track of every surface currently attached to it. Surfaces
//! are RAII guards: dropping one detaches it, so a capture cannot leave
//! surfaces behind no matter how it ends.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SurfaceKind {
    /// Holds the media pipeline for one video.
    Decode,
    /// Pixel canvas the decoded frame is drawn into.
    Raster,
}

/// Registry of live surfaces. Cheap to clone; clones share the same registry.
#[derive(Debug, Clone, Default)]
pub struct Stage {
    live: Arc<Mutex<HashMap<Uuid, SurfaceKind>>>,
}

impl Stage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self, kind: SurfaceKind) -> SurfaceGuard {
        let id = Uuid::new_v4();
        self.lock().insert(id, kind);
        SurfaceGuard {
            id,
            kind,
            stage: self.clone(),
        }
    }

    /// Number of surfaces currently attached.
    pub fn live_count(&self) -> usize {
        self.lock().len()
    }

    pub fn live_count_of(&self, kind: SurfaceKind) -> usize {
        self.lock().values().filter(|k| **k == kind).count()
    }

    fn detach(&self, id: Uuid) {
        self.lock().remove(&id);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, SurfaceKind>> {
        // The map stays consistent even if a holder panicked.
        self.live.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A surface attached to a [`Stage`]; detached on drop.
#[derive(Debug)]
pub struct SurfaceGuard {
    id: Uuid,
    kind: SurfaceKind,
    stage: Stage,
}

impl SurfaceGuard {
    pub fn kind(&self) -> SurfaceKind {
        self.kind
    }
}

impl Drop for SurfaceGuard {
    fn drop(&mut self) {
        self.stage.detach(self.id);
    }
}

/// An RGB24 canvas backed by a raster surface.
///
/// Starts without a size; [`RasterSurface::resize`] is called once the
/// video's native dimensions are known.
#[derive(Debug)]
pub struct RasterSurface {
    _guard: SurfaceGuard,
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl RasterSurface {
    pub fn attach(stage: &Stage) -> Self {
        Self {
            _guard: stage.attach(SurfaceKind::Raster),
            width: 0,
            height: 0,
            pixels: Vec::new(),
        }
    }

    /// Size the canvas. Fails when either dimension is zero, in which case
    /// nothing can ever be drawn.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), String> {
        if width == 0 || height == 0 {
            return Err(format!("cannot size raster to {width}x{height}"));
        }
        self.width = width;
        self.height = height;
        self.pixels = vec![0; width as usize * height as usize * 3];
        Ok(())
    }

    /// Copy a full RGB24 frame onto the canvas.
    pub fn draw(&mut self, width: u32, height: u32, rgb: &[u8]) -> Result<(), String> {
        if self.pixels.is_empty() {
            return Err("raster was never sized".into());
        }
        if (width, height) != (self.width, self.height) || rgb.len() != self.pixels.len() {
            return Err(format!(
                "frame is {width}x{height} ({} bytes) but raster is {}x{}",
                rgb.len(),
                self.width,
                self.height
            ));
        }
        self.pixels.copy_from_slice(rgb);
        Ok(())
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guards_detach_on_drop() {
        let stage = Stage::new();
        let decode = stage.attach(SurfaceKind::Decode);
        let raster = RasterSurface::attach(&stage);
        assert_eq!(stage.live_count(), 2);
        assert_eq!(stage.live_count_of(SurfaceKind::Raster), 1);
        assert_eq!(decode.kind(), SurfaceKind::Decode);

        drop(raster);
        assert_eq!(stage.live_count(), 1);
        drop(decode);
        assert_eq!(stage.live_count(), 0);
    }

    #[test]
    fn test_raster_draw_requires_matching_size() {
        let stage = Stage::new();
        let mut raster = RasterSurface::attach(&stage);
        assert!(raster.draw(2, 2, &[0; 12]).is_err());

        raster.resize(2, 2).unwrap();
        assert!(raster.draw(3, 2, &[0; 18]).is_err());
        raster.draw(2, 2, &[7; 12]).unwrap();
        assert_eq!(raster.pixels(), &[7; 12]);
    }

    #[test]
    fn test_raster_rejects_zero_size() {
        let stage = Stage::new();
        let mut raster = RasterSurface::attach(&stage);
        assert!(raster.resize(0, 240).is_err());
    }
}
