//! Presentation surfaces
//!
//! A surface is a host-owned drawable target. Each frame is presented with a
//! strict `lock` → [`write_frame`] → `unlock_and_present` sequence; the locked
//! [`BufferView`] borrows the surface, so a second lock cannot be taken while
//! a view is alive.

mod memory;
mod snapshot;

use crate::error::PlaybackError;
use crate::media::{ConvertedFrame, RawFrame};

pub use memory::{MemorySurface, SurfaceEvent, PADDING_BYTE};
pub use snapshot::ImageSequenceSurface;

/// Writable window onto a locked surface buffer
///
/// Rows start every `stride` bytes, which may be more than `width * 3`.
#[derive(Debug)]
pub struct BufferView<'a> {
    bits: &'a mut [u8],
    stride: usize,
    width: u32,
    height: u32,
}

impl<'a> BufferView<'a> {
    /// Wrap a locked RGB24 buffer
    ///
    /// Fails with `LockFailed` when the stride is shorter than a row or the
    /// buffer cannot hold `height` rows.
    pub fn new(
        bits: &'a mut [u8],
        stride: usize,
        width: u32,
        height: u32,
    ) -> Result<Self, PlaybackError> {
        let row_bytes = width as usize * ConvertedFrame::FORMAT.bytes_per_pixel();
        if stride < row_bytes {
            return Err(PlaybackError::LockFailed(format!(
                "stride {} shorter than row of {} bytes",
                stride, row_bytes
            )));
        }
        let required = match height as usize {
            0 => 0,
            rows => (rows - 1) * stride + row_bytes,
        };
        if bits.len() < required {
            return Err(PlaybackError::LockFailed(format!(
                "buffer of {} bytes cannot hold {}x{} at stride {}",
                bits.len(),
                width,
                height,
                stride
            )));
        }
        Ok(Self {
            bits,
            stride,
            width,
            height,
        })
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }
}

/// Copy a converted frame into a locked view, row by row at the view's stride
///
/// Copies the intersection of both geometries, so a mis-sized surface is
/// clipped rather than overrun. Returns the number of rows written.
pub fn write_frame(view: &mut BufferView<'_>, frame: &ConvertedFrame) -> usize {
    let rows = frame.height().min(view.height) as usize;
    let row_bytes =
        frame.width().min(view.width) as usize * ConvertedFrame::FORMAT.bytes_per_pixel();

    for y in 0..rows {
        let offset = y * view.stride;
        view.bits[offset..offset + row_bytes].copy_from_slice(&frame.row(y)[..row_bytes]);
    }
    rows
}

/// A drawable target frames are presented on
pub trait PresentationSurface {
    /// Size the surface's buffers for frames of `width` x `height`
    ///
    /// Called once, before the first lock.
    fn configure(&mut self, width: u32, height: u32) -> Result<(), PlaybackError>;

    /// Lock the backing buffer for writing
    ///
    /// Failure is permanent for the surface: the caller must stop presenting.
    fn lock(&mut self) -> Result<BufferView<'_>, PlaybackError>;

    /// Release the lock taken by [`lock`](Self::lock) and display the buffer
    fn unlock_and_present(&mut self);
}

impl<S: PresentationSurface + ?Sized> PresentationSurface for &mut S {
    fn configure(&mut self, width: u32, height: u32) -> Result<(), PlaybackError> {
        (**self).configure(width, height)
    }

    fn lock(&mut self) -> Result<BufferView<'_>, PlaybackError> {
        (**self).lock()
    }

    fn unlock_and_present(&mut self) {
        (**self).unlock_and_present()
    }
}

/// Host-side handle that resolves to a surface at `SurfaceReady`
///
/// Resolution is deferred until a decoder is open, so a source that fails
/// earlier never touches the host's surface.
pub trait SurfaceHandle {
    type Surface: PresentationSurface;

    fn acquire(self) -> Result<Self::Surface, PlaybackError>;
}

impl<'a, S: PresentationSurface + ?Sized> SurfaceHandle for &'a mut S {
    type Surface = &'a mut S;

    fn acquire(self) -> Result<Self::Surface, PlaybackError> {
        Ok(self)
    }
}

/// A missing handle is the analogue of a null native window
impl<S: PresentationSurface> SurfaceHandle for Option<S> {
    type Surface = S;

    fn acquire(self) -> Result<S, PlaybackError> {
        self.ok_or_else(|| PlaybackError::SurfaceUnavailable("no surface handle".to_string()))
    }
}
