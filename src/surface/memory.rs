//! Surface backed by a heap buffer
//!
//! Behaves like a native window buffer: rows can be padded past the visible
//! width, lock and present calls are counted, and the surface can be told to
//! stop accepting locks (a window that went away).

use crate::error::PlaybackError;
use crate::media::ConvertedFrame;

use super::{BufferView, PresentationSurface};

/// Fill value of a freshly configured buffer, padding included
pub const PADDING_BYTE: u8 = 0xAA;

/// One call made against a [`MemorySurface`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceEvent {
    Lock,
    Present,
}

#[derive(Debug, Default)]
pub struct MemorySurface {
    buffer: Vec<u8>,
    width: u32,
    height: u32,
    stride: usize,
    stride_padding: usize,
    configured: bool,
    locked: bool,
    expire_after: Option<u64>,
    lock_count: u64,
    present_count: u64,
    double_lock_attempts: u64,
    events: Vec<SurfaceEvent>,
}

impl MemorySurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pad every row by `bytes` beyond the visible width
    pub fn with_stride_padding(mut self, bytes: usize) -> Self {
        self.stride_padding = bytes;
        self
    }

    /// Refuse every lock once `presents` frames have been presented
    pub fn expire_after(mut self, presents: u64) -> Self {
        self.expire_after = Some(presents);
        self
    }

    pub fn is_configured(&self) -> bool {
        self.configured
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn lock_count(&self) -> u64 {
        self.lock_count
    }

    pub fn present_count(&self) -> u64 {
        self.present_count
    }

    /// Locks requested while the surface was already locked
    pub fn double_lock_attempts(&self) -> u64 {
        self.double_lock_attempts
    }

    /// Every lock and present, in call order
    pub fn events(&self) -> &[SurfaceEvent] {
        &self.events
    }

    /// Raw backing buffer including row padding
    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    /// Visible pixel bytes of row `y`
    pub fn row(&self, y: usize) -> &[u8] {
        let start = y * self.stride;
        let row_bytes = self.width as usize * ConvertedFrame::FORMAT.bytes_per_pixel();
        &self.buffer[start..start + row_bytes]
    }

    /// RGB triplet at (`x`, `y`)
    pub fn pixel(&self, x: usize, y: usize) -> [u8; 3] {
        let offset = y * self.stride + x * 3;
        [self.buffer[offset], self.buffer[offset + 1], self.buffer[offset + 2]]
    }
}

impl PresentationSurface for MemorySurface {
    fn configure(&mut self, width: u32, height: u32) -> Result<(), PlaybackError> {
        if width == 0 || height == 0 {
            return Err(PlaybackError::SurfaceUnavailable(format!(
                "cannot size surface to {}x{}",
                width, height
            )));
        }
        self.width = width;
        self.height = height;
        self.stride =
            width as usize * ConvertedFrame::FORMAT.bytes_per_pixel() + self.stride_padding;
        self.buffer = vec![PADDING_BYTE; self.stride * height as usize];
        self.configured = true;
        Ok(())
    }

    fn lock(&mut self) -> Result<BufferView<'_>, PlaybackError> {
        if !self.configured {
            return Err(PlaybackError::LockFailed("surface not configured".to_string()));
        }
        if self.locked {
            self.double_lock_attempts += 1;
            return Err(PlaybackError::LockFailed("surface already locked".to_string()));
        }
        if self.expire_after.is_some_and(|limit| self.present_count >= limit) {
            return Err(PlaybackError::LockFailed("surface is no longer valid".to_string()));
        }

        let Self {
            buffer,
            stride,
            width,
            height,
            locked,
            lock_count,
            events,
            ..
        } = self;
        let view = BufferView::new(buffer, *stride, *width, *height)?;
        *locked = true;
        *lock_count += 1;
        events.push(SurfaceEvent::Lock);
        Ok(view)
    }

    fn unlock_and_present(&mut self) {
        if !self.locked {
            tracing::warn!(component = "surface", "Present without a matching lock ignored");
            return;
        }
        self.locked = false;
        self.present_count += 1;
        self.events.push(SurfaceEvent::Present);
    }
}
