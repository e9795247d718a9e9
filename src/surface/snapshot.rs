//! Surface writing presented frames to disk as a PNG sequence
//!
//! Every `every`-th presented frame is saved as `frame_NNNNNN.png`, numbered
//! by presentation index. Rows are held at a 64-byte aligned stride, like a
//! typical window buffer.

use std::path::{Path, PathBuf};

use crate::error::PlaybackError;
use crate::media::ConvertedFrame;

use super::{BufferView, PresentationSurface};

const ROW_ALIGNMENT: usize = 64;

pub struct ImageSequenceSurface {
    directory: PathBuf,
    every: u32,
    buffer: Vec<u8>,
    width: u32,
    height: u32,
    stride: usize,
    locked: bool,
    presented: u64,
    written: Vec<PathBuf>,
}

impl ImageSequenceSurface {
    /// Save every `every`-th frame (at least every frame) into `directory`
    pub fn new<P: AsRef<Path>>(directory: P, every: u32) -> Self {
        Self {
            directory: directory.as_ref().to_path_buf(),
            every: every.max(1),
            buffer: Vec::new(),
            width: 0,
            height: 0,
            stride: 0,
            locked: false,
            presented: 0,
            written: Vec::new(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Frames presented so far
    pub fn presented(&self) -> u64 {
        self.presented
    }

    /// Files written so far, in order
    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }

    /// Pack the visible rows into a tightly packed RGB24 image
    fn packed_rows(&self) -> Vec<u8> {
        let row_bytes = self.width as usize * ConvertedFrame::FORMAT.bytes_per_pixel();
        let mut packed = Vec::with_capacity(row_bytes * self.height as usize);
        for y in 0..self.height as usize {
            let start = y * self.stride;
            packed.extend_from_slice(&self.buffer[start..start + row_bytes]);
        }
        packed
    }

    fn save_current(&mut self, index: u64) {
        let path = self.directory.join(format!("frame_{:06}.png", index));
        let Some(image) = image::RgbImage::from_raw(self.width, self.height, self.packed_rows())
        else {
            tracing::warn!(
                component = "surface",
                "Snapshot buffer does not match surface geometry"
            );
            return;
        };
        match image.save(&path) {
            Ok(()) => {
                tracing::debug!(component = "surface", path = %path.display(), "Wrote snapshot");
                self.written.push(path);
            }
            // A full disk is not a presentation failure
            Err(e) => tracing::warn!(
                component = "surface",
                path = %path.display(),
                "Failed to write snapshot: {}",
                e
            ),
        }
    }
}

impl PresentationSurface for ImageSequenceSurface {
    fn configure(&mut self, width: u32, height: u32) -> Result<(), PlaybackError> {
        if width == 0 || height == 0 {
            return Err(PlaybackError::SurfaceUnavailable(format!(
                "cannot size surface to {}x{}",
                width, height
            )));
        }
        std::fs::create_dir_all(&self.directory).map_err(|e| {
            PlaybackError::SurfaceUnavailable(format!("{}: {}", self.directory.display(), e))
        })?;

        let row_bytes = width as usize * ConvertedFrame::FORMAT.bytes_per_pixel();
        self.stride = row_bytes.div_ceil(ROW_ALIGNMENT) * ROW_ALIGNMENT;
        self.buffer = vec![0u8; self.stride * height as usize];
        self.width = width;
        self.height = height;
        Ok(())
    }

    fn lock(&mut self) -> Result<BufferView<'_>, PlaybackError> {
        if self.locked {
            return Err(PlaybackError::LockFailed("surface already locked".to_string()));
        }
        if self.buffer.is_empty() {
            return Err(PlaybackError::LockFailed("surface not configured".to_string()));
        }
        let Self {
            buffer,
            stride,
            width,
            height,
            locked,
            ..
        } = self;
        let view = BufferView::new(buffer, *stride, *width, *height)?;
        *locked = true;
        Ok(view)
    }

    fn unlock_and_present(&mut self) {
        if !self.locked {
            return;
        }
        self.locked = false;
        let index = self.presented;
        self.presented += 1;
        if index % self.every as u64 == 0 {
            self.save_current(index);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::write_frame;

    fn solid(width: u32, height: u32, rgb: [u8; 3]) -> ConvertedFrame {
        let mut frame = ConvertedFrame::new(width, height);
        for y in 0..height as usize {
            for px in frame.row_mut(y).chunks_exact_mut(3) {
                px.copy_from_slice(&rgb);
            }
        }
        frame
    }

    fn present(surface: &mut ImageSequenceSurface, frame: &ConvertedFrame) {
        let mut view = surface.lock().unwrap();
        write_frame(&mut view, frame);
        surface.unlock_and_present();
    }

    #[test]
    fn test_writes_every_nth_frame() {
        let dir = tempfile::tempdir().unwrap();
        let mut surface = ImageSequenceSurface::new(dir.path().join("frames"), 2);
        surface.configure(5, 3).unwrap();
        assert_eq!(surface.stride, 64);

        for _ in 0..5 {
            present(&mut surface, &solid(5, 3, [200, 10, 30]));
        }

        assert_eq!(surface.presented(), 5);
        let names: Vec<_> = surface
            .written()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, ["frame_000000.png", "frame_000002.png", "frame_000004.png"]);

        let image = image::open(&surface.written()[1]).unwrap().to_rgb8();
        assert_eq!(image.dimensions(), (5, 3));
        assert_eq!(image.get_pixel(4, 2).0, [200, 10, 30]);
    }

    #[test]
    fn test_unconfigured_lock_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut surface = ImageSequenceSurface::new(dir.path(), 1);
        assert!(surface.lock().is_err());
        assert!(surface.configure(0, 1).is_err());
    }

    #[test]
    fn test_failed_lock_saves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut surface = ImageSequenceSurface::new(dir.path(), 1);
        surface.configure(2, 2).unwrap();
        surface.buffer.truncate(1);

        assert!(surface.lock().is_err());
        assert!(!surface.locked);
        surface.unlock_and_present();
        assert_eq!(surface.presented(), 0);
        assert!(surface.written().is_empty());
    }
}
