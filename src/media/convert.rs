//! CPU pixel conversion to RGB24
//!
//! YUV input is treated as BT.601 limited range (Y 16-235, UV 16-240), the
//! same default libswscale applies to untagged SD content. Integer-only math
//! with pre-computed tables in the hot path.

use crate::error::PlaybackError;

use super::{ConvertedFrame, FrameConverter, PixelFormat, PlanarFrame, RawFrame};

/// 8.8 fixed-point contributions of each Y/U/V byte value
#[derive(Debug, Clone)]
struct YuvTables {
    y: [i32; 256],
    v_r: [i32; 256],
    u_g: [i32; 256],
    v_g: [i32; 256],
    u_b: [i32; 256],
}

impl YuvTables {
    fn bt601() -> Self {
        let mut tables = Self {
            y: [0; 256],
            v_r: [0; 256],
            u_g: [0; 256],
            v_g: [0; 256],
            u_b: [0; 256],
        };
        for i in 0..256 {
            let luma = i as i32 - 16;
            let chroma = i as i32 - 128;
            tables.y[i] = 298 * luma;
            tables.v_r[i] = 409 * chroma;
            tables.u_g[i] = -100 * chroma;
            tables.v_g[i] = -208 * chroma;
            tables.u_b[i] = 516 * chroma;
        }
        tables
    }

    #[inline]
    fn rgb(&self, y: u8, u: u8, v: u8) -> [u8; 3] {
        let luma = self.y[y as usize] + 128;
        let r = (luma + self.v_r[v as usize]) >> 8;
        let g = (luma + self.u_g[u as usize] + self.v_g[v as usize]) >> 8;
        let b = (luma + self.u_b[u as usize]) >> 8;
        [clamp_u8(r), clamp_u8(g), clamp_u8(b)]
    }
}

#[inline]
fn clamp_u8(value: i32) -> u8 {
    value.clamp(0, 255) as u8
}

/// Converts [`PlanarFrame`]s of one fixed format and geometry to RGB24
#[derive(Debug, Clone)]
pub struct SoftwareConverter {
    src_format: PixelFormat,
    width: u32,
    height: u32,
    tables: YuvTables,
}

impl SoftwareConverter {
    /// Build a converter for `src_format` frames of `width` x `height`
    pub fn new(src_format: PixelFormat, width: u32, height: u32) -> Result<Self, PlaybackError> {
        if width == 0 || height == 0 {
            return Err(PlaybackError::ConverterInitFailed(format!(
                "invalid geometry {}x{}",
                width, height
            )));
        }
        if src_format == PixelFormat::Other {
            return Err(PlaybackError::ConverterInitFailed(format!(
                "unsupported conversion: {} -> {}",
                src_format,
                ConvertedFrame::FORMAT
            )));
        }
        Ok(Self {
            src_format,
            width,
            height,
            tables: YuvTables::bt601(),
        })
    }

    pub fn src_format(&self) -> PixelFormat {
        self.src_format
    }

    fn yuv420p_to_rgb(&self, src: &PlanarFrame, dst: &mut ConvertedFrame) {
        let (y_plane, u_plane, v_plane) = (src.plane(0), src.plane(1), src.plane(2));
        let (y_stride, u_stride, v_stride) = (src.stride(0), src.stride(1), src.stride(2));

        for row in 0..self.height as usize {
            let y_row = &y_plane[row * y_stride..];
            let u_row = &u_plane[(row / 2) * u_stride..];
            let v_row = &v_plane[(row / 2) * v_stride..];
            let out = dst.row_mut(row);
            for x in 0..self.width as usize {
                let rgb = self.tables.rgb(y_row[x], u_row[x / 2], v_row[x / 2]);
                out[x * 3..x * 3 + 3].copy_from_slice(&rgb);
            }
        }
    }

    fn nv12_to_rgb(&self, src: &PlanarFrame, dst: &mut ConvertedFrame) {
        let (y_plane, uv_plane) = (src.plane(0), src.plane(1));
        let (y_stride, uv_stride) = (src.stride(0), src.stride(1));

        for row in 0..self.height as usize {
            let y_row = &y_plane[row * y_stride..];
            let uv_row = &uv_plane[(row / 2) * uv_stride..];
            let out = dst.row_mut(row);
            for x in 0..self.width as usize {
                let uv = (x / 2) * 2;
                let rgb = self.tables.rgb(y_row[x], uv_row[uv], uv_row[uv + 1]);
                out[x * 3..x * 3 + 3].copy_from_slice(&rgb);
            }
        }
    }

    fn gray_to_rgb(&self, src: &PlanarFrame, dst: &mut ConvertedFrame) {
        let (plane, stride) = (src.plane(0), src.stride(0));
        for row in 0..self.height as usize {
            let src_row = &plane[row * stride..];
            let out = dst.row_mut(row);
            for x in 0..self.width as usize {
                out[x * 3..x * 3 + 3].fill(src_row[x]);
            }
        }
    }

    /// Packed input: `order` gives the source offsets of R, G and B
    fn packed_to_rgb(
        &self,
        src: &PlanarFrame,
        dst: &mut ConvertedFrame,
        bpp: usize,
        order: [usize; 3],
    ) {
        let (plane, stride) = (src.plane(0), src.stride(0));
        for row in 0..self.height as usize {
            let src_row = &plane[row * stride..];
            let out = dst.row_mut(row);
            for x in 0..self.width as usize {
                let px = &src_row[x * bpp..x * bpp + bpp];
                out[x * 3] = px[order[0]];
                out[x * 3 + 1] = px[order[1]];
                out[x * 3 + 2] = px[order[2]];
            }
        }
    }
}

impl FrameConverter for SoftwareConverter {
    type Frame = PlanarFrame;

    fn convert(&mut self, raw: &PlanarFrame, out: &mut ConvertedFrame) -> bool {
        if raw.format() != Some(self.src_format)
            || raw.width() != self.width
            || raw.height() != self.height
            || out.width() != self.width
            || out.height() != self.height
        {
            tracing::warn!(
                component = "converter",
                expected = %self.src_format,
                width = raw.width(),
                height = raw.height(),
                "Frame does not match converter configuration"
            );
            return false;
        }

        match self.src_format {
            PixelFormat::Yuv420p => self.yuv420p_to_rgb(raw, out),
            PixelFormat::Nv12 => self.nv12_to_rgb(raw, out),
            PixelFormat::Gray8 => self.gray_to_rgb(raw, out),
            PixelFormat::Rgb24 => self.packed_to_rgb(raw, out, 3, [0, 1, 2]),
            PixelFormat::Bgr24 => self.packed_to_rgb(raw, out, 3, [2, 1, 0]),
            PixelFormat::Rgba => self.packed_to_rgb(raw, out, 4, [0, 1, 2]),
            PixelFormat::Bgra => self.packed_to_rgb(raw, out, 4, [2, 1, 0]),
            // Rejected in `new`
            PixelFormat::Other => return false,
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniform_yuv420p(width: u32, height: u32, y: u8, u: u8, v: u8) -> PlanarFrame {
        let mut frame = PlanarFrame::new(PixelFormat::Yuv420p, width, height);
        frame.plane_mut(0).fill(y);
        frame.plane_mut(1).fill(u);
        frame.plane_mut(2).fill(v);
        frame
    }

    fn assert_uniform(frame: &ConvertedFrame, expected: [u8; 3]) {
        for y in 0..frame.height() as usize {
            for px in frame.row(y).chunks_exact(3) {
                assert_eq!(px, expected, "row {}", y);
            }
        }
    }

    #[test]
    fn test_uniform_yuv_gives_uniform_rgb() {
        let mut converter = SoftwareConverter::new(PixelFormat::Yuv420p, 6, 4).unwrap();
        let mut out = ConvertedFrame::new(6, 4);

        assert!(converter.convert(&uniform_yuv420p(6, 4, 235, 128, 128), &mut out));
        assert_uniform(&out, [255, 255, 255]);

        assert!(converter.convert(&uniform_yuv420p(6, 4, 16, 128, 128), &mut out));
        assert_uniform(&out, [0, 0, 0]);

        // BT.601 red
        assert!(converter.convert(&uniform_yuv420p(6, 4, 81, 90, 240), &mut out));
        assert_uniform(&out, [255, 0, 0]);
    }

    #[test]
    fn test_odd_geometry_nv12() {
        let mut frame = PlanarFrame::new(PixelFormat::Nv12, 5, 3);
        frame.plane_mut(0).fill(126);
        frame.plane_mut(1).fill(128);
        let mut converter = SoftwareConverter::new(PixelFormat::Nv12, 5, 3).unwrap();
        let mut out = ConvertedFrame::new(5, 3);
        assert!(converter.convert(&frame, &mut out));
        // (298 * 110 + 128) >> 8
        assert_uniform(&out, [128, 128, 128]);
    }

    #[test]
    fn test_packed_channel_order() {
        let frame = PlanarFrame::from_packed(PixelFormat::Bgra, 1, 1, &[10, 20, 30, 255]).unwrap();
        let mut converter = SoftwareConverter::new(PixelFormat::Bgra, 1, 1).unwrap();
        let mut out = ConvertedFrame::new(1, 1);
        assert!(converter.convert(&frame, &mut out));
        assert_eq!(out.row(0), &[30, 20, 10]);
    }

    #[test]
    fn test_mismatched_frame_is_rejected() {
        let mut converter = SoftwareConverter::new(PixelFormat::Gray8, 2, 2).unwrap();
        let frame = PlanarFrame::from_packed(PixelFormat::Gray8, 1, 1, &[200]).unwrap();
        let mut out = ConvertedFrame::new(2, 2);
        assert!(!converter.convert(&frame, &mut out));
        assert!(out.data().iter().all(|&b| b == 0));

        // Right geometry, wrong layout
        let nv12 = PlanarFrame::new(PixelFormat::Nv12, 2, 2);
        assert!(!converter.convert(&nv12, &mut out));
    }

    #[test]
    fn test_rejects_unsupported_setup() {
        assert!(SoftwareConverter::new(PixelFormat::Other, 2, 2).is_err());
        assert!(SoftwareConverter::new(PixelFormat::Yuv420p, 0, 2).is_err());
    }
}
