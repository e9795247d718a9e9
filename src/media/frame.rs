//! Frame representations
//!
//! `ConvertedFrame` is the single long-lived RGB24 buffer every decoded frame
//! is converted into. `PlanarFrame` is the CPU-side raw frame used by the
//! in-memory backend and the software converter.

use serde::Serialize;

/// In-memory pixel layouts understood by the player
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PixelFormat {
    /// 4:2:0 planar: Y plane, then quarter-size U and V planes
    Yuv420p,
    /// 4:2:0 semi-planar: Y plane, then interleaved UV plane
    Nv12,
    /// Single luma plane
    Gray8,
    /// Packed 8-bit R, G, B
    Rgb24,
    /// Packed 8-bit B, G, R
    Bgr24,
    /// Packed 8-bit R, G, B, A
    Rgba,
    /// Packed 8-bit B, G, R, A
    Bgra,
    /// Any layout the player has no CPU path for (backend-converted only)
    Other,
}

impl PixelFormat {
    /// Bytes per pixel for packed formats, 0 for planar ones
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Rgb24 | PixelFormat::Bgr24 => 3,
            PixelFormat::Rgba | PixelFormat::Bgra => 4,
            _ => 0,
        }
    }

    /// Whether pixels are stored interleaved in a single plane
    pub fn is_packed(&self) -> bool {
        self.bytes_per_pixel() > 0
    }

    /// Per-plane `(row bytes, rows)` for a tightly packed image (alignment 1)
    ///
    /// Empty for `Other`, which has no known CPU layout.
    pub fn plane_layout(&self, width: usize, height: usize) -> Vec<(usize, usize)> {
        let chroma_width = (width + 1) / 2;
        let chroma_height = (height + 1) / 2;
        match self {
            PixelFormat::Yuv420p => vec![
                (width, height),
                (chroma_width, chroma_height),
                (chroma_width, chroma_height),
            ],
            PixelFormat::Nv12 => vec![(width, height), (chroma_width * 2, chroma_height)],
            PixelFormat::Gray8 => vec![(width, height)],
            PixelFormat::Rgb24 | PixelFormat::Bgr24 | PixelFormat::Rgba | PixelFormat::Bgra => {
                vec![(width * self.bytes_per_pixel(), height)]
            }
            PixelFormat::Other => Vec::new(),
        }
    }

    /// Byte size of a tightly packed image of this format (alignment 1)
    pub fn buffer_size(&self, width: usize, height: usize) -> usize {
        self.plane_layout(width, height)
            .iter()
            .map(|(row_bytes, rows)| row_bytes * rows)
            .sum()
    }
}

impl std::fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PixelFormat::Yuv420p => "yuv420p",
            PixelFormat::Nv12 => "nv12",
            PixelFormat::Gray8 => "gray",
            PixelFormat::Rgb24 => "rgb24",
            PixelFormat::Bgr24 => "bgr24",
            PixelFormat::Rgba => "rgba",
            PixelFormat::Bgra => "bgra",
            PixelFormat::Other => "other",
        };
        write!(f, "{}", name)
    }
}

/// Geometry shared by every frame type the pipeline handles
pub trait RawFrame {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
}

/// A decoded image held in CPU memory, one buffer per plane
#[derive(Debug, Clone, Default)]
pub struct PlanarFrame {
    format: Option<PixelFormat>,
    width: u32,
    height: u32,
    planes: Vec<Vec<u8>>,
    strides: Vec<usize>,
}

impl PlanarFrame {
    /// An empty frame, to be filled by a decoder
    pub fn empty() -> Self {
        Self::default()
    }

    /// A zeroed frame with tightly packed planes
    pub fn new(format: PixelFormat, width: u32, height: u32) -> Self {
        let mut frame = Self::empty();
        frame.reshape(format, width, height);
        frame
    }

    /// Build a frame from a contiguous tightly packed payload
    ///
    /// Returns `None` when the payload length does not match the layout.
    pub fn from_packed(
        format: PixelFormat,
        width: u32,
        height: u32,
        payload: &[u8],
    ) -> Option<Self> {
        let mut frame = Self::empty();
        frame.load(format, width, height, payload).then_some(frame)
    }

    /// Overwrite this frame with a contiguous tightly packed payload
    ///
    /// Plane buffers are reused when the geometry is unchanged. Returns false
    /// (leaving the frame untouched) when the payload does not fit the layout.
    pub fn load(&mut self, format: PixelFormat, width: u32, height: u32, payload: &[u8]) -> bool {
        if format.buffer_size(width as usize, height as usize) != payload.len()
            || format == PixelFormat::Other
        {
            return false;
        }
        self.reshape(format, width, height);
        let mut offset = 0;
        for plane in &mut self.planes {
            let len = plane.len();
            plane.copy_from_slice(&payload[offset..offset + len]);
            offset += len;
        }
        true
    }

    fn reshape(&mut self, format: PixelFormat, width: u32, height: u32) {
        if self.format == Some(format) && self.width == width && self.height == height {
            return;
        }
        let layout = format.plane_layout(width as usize, height as usize);
        self.planes = layout.iter().map(|(row_bytes, rows)| vec![0u8; row_bytes * rows]).collect();
        self.strides = layout.iter().map(|(row_bytes, _)| *row_bytes).collect();
        self.format = Some(format);
        self.width = width;
        self.height = height;
    }

    /// Pixel format, `None` until the frame has been filled
    pub fn format(&self) -> Option<PixelFormat> {
        self.format
    }

    /// Plane data, empty slice for a plane the format does not have
    pub fn plane(&self, index: usize) -> &[u8] {
        self.planes.get(index).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Mutable plane data
    pub fn plane_mut(&mut self, index: usize) -> &mut [u8] {
        match self.planes.get_mut(index) {
            Some(plane) => plane.as_mut_slice(),
            None => &mut [],
        }
    }

    /// Row stride in bytes of a plane, 0 for a missing plane
    pub fn stride(&self, index: usize) -> usize {
        self.strides.get(index).copied().unwrap_or(0)
    }

    /// Number of planes
    pub fn plane_count(&self) -> usize {
        self.planes.len()
    }
}

impl RawFrame for PlanarFrame {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }
}

/// The presentation-format image every raw frame is converted into
///
/// Sized once from the negotiated geometry and reused for every frame.
#[derive(Debug, Clone)]
pub struct ConvertedFrame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    stride: usize,
}

impl ConvertedFrame {
    /// Presentation pixel format
    pub const FORMAT: PixelFormat = PixelFormat::Rgb24;

    /// Allocate a zeroed RGB24 buffer for the given geometry
    pub fn new(width: u32, height: u32) -> Self {
        let size = Self::FORMAT.buffer_size(width as usize, height as usize);
        Self {
            data: vec![0u8; size],
            width,
            height,
            stride: width as usize * Self::FORMAT.bytes_per_pixel(),
        }
    }

    /// Bytes in one row of pixels (width * 3)
    pub fn row_bytes(&self) -> usize {
        self.width as usize * Self::FORMAT.bytes_per_pixel()
    }

    /// Distance in bytes between the starts of consecutive rows
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Pixel bytes of row `y`
    pub fn row(&self, y: usize) -> &[u8] {
        let start = y * self.stride;
        &self.data[start..start + self.row_bytes()]
    }

    /// Mutable pixel bytes of row `y`
    pub fn row_mut(&mut self, y: usize) -> &mut [u8] {
        let start = y * self.stride;
        let row_bytes = self.row_bytes();
        &mut self.data[start..start + row_bytes]
    }

    /// Whole backing buffer
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Mutable backing buffer
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl RawFrame for ConvertedFrame {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }
}
