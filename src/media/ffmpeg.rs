//! FFmpeg backend
//!
//! Demuxing, decoding and pixel conversion through the ffmpeg-next crate.
//! Opening and probing are kept as two separate libavformat calls so a
//! container that opens but cannot be probed is reported as such. Software
//! decode only.

use std::ffi::CString;
use std::os::raw::c_int;
use std::path::Path;
use std::ptr;

use ffmpeg_next::format::Pixel;
use ffmpeg_next::software::scaling;

use crate::error::PlaybackError;
use crate::settings::ScalingAlgorithm;

use super::{
    CompressedPacket, ContainerReader, ConvertedFrame, FrameConverter, MediaBackend, MediaType,
    PixelFormat, RawFrame, ReceiveOutcome, StreamInfo, StreamTable, VideoDecoder,
};

impl From<ScalingAlgorithm> for scaling::Flags {
    fn from(algorithm: ScalingAlgorithm) -> Self {
        match algorithm {
            ScalingAlgorithm::FastBilinear => scaling::Flags::FAST_BILINEAR,
            ScalingAlgorithm::Bilinear => scaling::Flags::BILINEAR,
            ScalingAlgorithm::Bicubic => scaling::Flags::BICUBIC,
            ScalingAlgorithm::Point => scaling::Flags::POINT,
            ScalingAlgorithm::Area => scaling::Flags::AREA,
            ScalingAlgorithm::Lanczos => scaling::Flags::LANCZOS,
        }
    }
}

/// Map an FFmpeg pixel format onto the player's formats
pub fn pixel_format_from(format: Pixel) -> PixelFormat {
    match format {
        Pixel::YUV420P => PixelFormat::Yuv420p,
        Pixel::NV12 => PixelFormat::Nv12,
        Pixel::GRAY8 => PixelFormat::Gray8,
        Pixel::RGB24 => PixelFormat::Rgb24,
        Pixel::BGR24 => PixelFormat::Bgr24,
        Pixel::RGBA => PixelFormat::Rgba,
        Pixel::BGRA => PixelFormat::Bgra,
        _ => PixelFormat::Other,
    }
}

/// Pixel format stored in a video stream's codec parameters
///
/// `None` when the container left it unset or the value is out of range.
fn stream_pixel_format(raw: c_int) -> Option<PixelFormat> {
    if raw < 0 || raw >= ffmpeg_next::ffi::AVPixelFormat::AV_PIX_FMT_NB as c_int {
        return None;
    }
    // In range of the C enum, whose values are contiguous
    let format = unsafe { std::mem::transmute::<c_int, ffmpeg_next::ffi::AVPixelFormat>(raw) };
    Some(pixel_format_from(Pixel::from(format)))
}

fn media_type_from(medium: ffmpeg_next::media::Type) -> MediaType {
    match medium {
        ffmpeg_next::media::Type::Video => MediaType::Video,
        ffmpeg_next::media::Type::Audio => MediaType::Audio,
        ffmpeg_next::media::Type::Subtitle => MediaType::Subtitle,
        ffmpeg_next::media::Type::Data | ffmpeg_next::media::Type::Attachment => MediaType::Data,
        ffmpeg_next::media::Type::Unknown => MediaType::Unknown,
    }
}

fn codec_name(id: ffmpeg_next::codec::Id) -> String {
    ffmpeg_next::decoder::find(id)
        .map(|codec| codec.name().to_string())
        .unwrap_or_else(|| format!("{:?}", id).to_lowercase())
}

/// Backend decoding files through libavformat / libavcodec / libswscale
pub struct FfmpegBackend {
    scaling_flags: scaling::Flags,
}

impl FfmpegBackend {
    /// Initialise FFmpeg (safe to call multiple times)
    pub fn new(scaling: ScalingAlgorithm) -> Result<Self, PlaybackError> {
        ffmpeg_next::init()
            .map_err(|e| {
                PlaybackError::OpenFailed(format!("FFmpeg initialisation failed: {}", e))
            })?;
        Ok(Self {
            scaling_flags: scaling.into(),
        })
    }
}

impl MediaBackend for FfmpegBackend {
    type Packet = FfmpegPacket;
    type Frame = ffmpeg_next::frame::Video;
    type Source = FfmpegSource;
    type Decoder = FfmpegDecoder;
    type Converter = SwsConverter;

    fn name(&self) -> &'static str {
        "ffmpeg"
    }

    fn open_source(&mut self, path: &Path) -> Result<FfmpegSource, PlaybackError> {
        let path_str = path.to_string_lossy().to_string();
        let c_path = CString::new(path_str.as_str())
            .map_err(|_| {
                PlaybackError::OpenFailed(format!("{}: path contains a NUL byte", path_str))
            })?;

        let mut context: *mut ffmpeg_next::ffi::AVFormatContext = ptr::null_mut();
        // On failure avformat_open_input frees the context itself
        let ret = unsafe {
            ffmpeg_next::ffi::avformat_open_input(
                &mut context,
                c_path.as_ptr(),
                ptr::null(),
                ptr::null_mut(),
            )
        };
        if ret < 0 {
            return Err(PlaybackError::OpenFailed(format!(
                "{}: {}",
                path_str,
                ffmpeg_next::Error::from(ret)
            )));
        }

        let input = unsafe { ffmpeg_next::format::context::Input::wrap(context) };
        Ok(FfmpegSource { input, path: path_str })
    }

    fn open_decoder(
        &mut self,
        source: &FfmpegSource,
        stream: &StreamInfo,
    ) -> Result<FfmpegDecoder, PlaybackError> {
        let container_stream = source.input.stream(stream.index).ok_or_else(|| {
            PlaybackError::DecoderOpenFailed(format!(
                "stream {} not present in {}",
                stream.index, source.path
            ))
        })?;
        let parameters = container_stream.parameters();

        let codec = ffmpeg_next::decoder::find(parameters.id())
            .ok_or_else(|| PlaybackError::DecoderNotFound(stream.codec.clone()))?;

        let mut context = ffmpeg_next::codec::context::Context::new_with_codec(codec);
        if unsafe { context.as_ptr().is_null() } {
            return Err(PlaybackError::ContextAllocFailed(codec.name().to_string()));
        }

        context
            .set_parameters(parameters)
            .map_err(|e| PlaybackError::ParamCopyFailed(e.to_string()))?;

        let decoder = context
            .decoder()
            .open_as(codec)
            .and_then(|opened| opened.video())
            .map_err(|e| PlaybackError::DecoderOpenFailed(format!("{}: {}", codec.name(), e)))?;

        Ok(FfmpegDecoder {
            decoder,
            codec_name: codec.name().to_string(),
        })
    }

    fn alloc_frame(&mut self) -> ffmpeg_next::frame::Video {
        ffmpeg_next::frame::Video::empty()
    }

    fn make_converter(&mut self, decoder: &FfmpegDecoder) -> Result<SwsConverter, PlaybackError> {
        let width = decoder.width();
        let height = decoder.height();
        let context = scaling::Context::get(
            decoder.decoder.format(),
            width,
            height,
            Pixel::RGB24,
            width,
            height,
            self.scaling_flags,
        )
        .map_err(|e| PlaybackError::ConverterInitFailed(e.to_string()))?;

        Ok(SwsConverter { context, width, height })
    }
}

/// Packet read by libavformat, unreferenced on drop
pub struct FfmpegPacket(ffmpeg_next::Packet);

impl CompressedPacket for FfmpegPacket {
    fn stream_index(&self) -> usize {
        self.0.stream()
    }
}

/// An opened input container, closed on drop
pub struct FfmpegSource {
    input: ffmpeg_next::format::context::Input,
    path: String,
}

impl ContainerReader for FfmpegSource {
    type Packet = FfmpegPacket;

    fn probe_streams(&mut self) -> Result<StreamTable, PlaybackError> {
        let ret = unsafe {
            ffmpeg_next::ffi::avformat_find_stream_info(self.input.as_mut_ptr(), ptr::null_mut())
        };
        if ret < 0 {
            return Err(PlaybackError::ProbeFailed(format!(
                "{}: {}",
                self.path,
                ffmpeg_next::Error::from(ret)
            )));
        }

        let streams = self
            .input
            .streams()
            .map(|stream| {
                let parameters = stream.parameters();
                let media_type = media_type_from(parameters.medium());
                let (width, height, format) = unsafe {
                    let raw = parameters.as_ptr();
                    ((*raw).width.max(0) as u32, (*raw).height.max(0) as u32, (*raw).format)
                };
                let pixel_format = match media_type {
                    MediaType::Video => stream_pixel_format(format),
                    _ => None,
                };
                StreamInfo {
                    index: stream.index(),
                    media_type,
                    codec: codec_name(parameters.id()),
                    width,
                    height,
                    pixel_format,
                }
            })
            .collect();

        Ok(StreamTable::new(streams))
    }

    fn read_packet(&mut self) -> Result<Option<FfmpegPacket>, PlaybackError> {
        let mut packet = ffmpeg_next::Packet::empty();
        match packet.read(&mut self.input) {
            Ok(()) => Ok(Some(FfmpegPacket(packet))),
            Err(ffmpeg_next::Error::Eof) => Ok(None),
            Err(e) => Err(PlaybackError::ReadFailed(e.to_string())),
        }
    }
}

/// An opened libavcodec video decoder, freed on drop
pub struct FfmpegDecoder {
    decoder: ffmpeg_next::decoder::Video,
    codec_name: String,
}

impl FfmpegDecoder {
    pub fn codec_name(&self) -> &str {
        &self.codec_name
    }
}

impl VideoDecoder for FfmpegDecoder {
    type Packet = FfmpegPacket;
    type Frame = ffmpeg_next::frame::Video;

    fn width(&self) -> u32 {
        self.decoder.width()
    }

    fn height(&self) -> u32 {
        self.decoder.height()
    }

    fn pixel_format(&self) -> PixelFormat {
        pixel_format_from(self.decoder.format())
    }

    fn send_packet(&mut self, packet: &FfmpegPacket) -> Result<(), PlaybackError> {
        self.decoder
            .send_packet(&packet.0)
            .map_err(|e| PlaybackError::SendFailed(e.to_string()))
    }

    fn send_eof(&mut self) -> Result<(), PlaybackError> {
        self.decoder
            .send_eof()
            .map_err(|e| PlaybackError::SendFailed(e.to_string()))
    }

    fn receive_frame(&mut self, frame: &mut ffmpeg_next::frame::Video) -> ReceiveOutcome {
        match self.decoder.receive_frame(frame) {
            Ok(()) => ReceiveOutcome::Frame,
            Err(ffmpeg_next::Error::Other {
                errno: ffmpeg_next::error::EAGAIN,
            }) => ReceiveOutcome::WouldBlock,
            Err(ffmpeg_next::Error::Eof) => ReceiveOutcome::EndOfStream,
            Err(e) => {
                // A corrupt frame ends this drain, not the playback
                tracing::warn!(
                    component = "decoder",
                    codec = %self.codec_name,
                    "Frame decode error: {}",
                    e
                );
                ReceiveOutcome::WouldBlock
            }
        }
    }
}

impl RawFrame for ffmpeg_next::frame::Video {
    fn width(&self) -> u32 {
        ffmpeg_next::frame::Video::width(self)
    }

    fn height(&self) -> u32 {
        ffmpeg_next::frame::Video::height(self)
    }
}

/// libswscale context converting decoder output to RGB24 at native size
pub struct SwsConverter {
    context: scaling::Context,
    width: u32,
    height: u32,
}

impl FrameConverter for SwsConverter {
    type Frame = ffmpeg_next::frame::Video;

    fn convert(&mut self, raw: &ffmpeg_next::frame::Video, out: &mut ConvertedFrame) -> bool {
        if raw.format() != self.context.input().format
            || raw.width() != self.width
            || raw.height() != self.height
        {
            tracing::warn!(
                component = "converter",
                format = ?raw.format(),
                width = raw.width(),
                height = raw.height(),
                "Frame does not match scaler configuration"
            );
            return false;
        }

        // Scale straight into the persistent RGB24 buffer; its stride is width * 3
        let dst_planes: [*mut u8; 4] = [
            out.data_mut().as_mut_ptr(),
            ptr::null_mut(),
            ptr::null_mut(),
            ptr::null_mut(),
        ];
        let dst_strides: [c_int; 4] = [out.stride() as c_int, 0, 0, 0];

        let rows = unsafe {
            let src = raw.as_ptr();
            ffmpeg_next::ffi::sws_scale(
                self.context.as_mut_ptr(),
                (*src).data.as_ptr() as *const *const u8,
                (*src).linesize.as_ptr(),
                0,
                self.height as c_int,
                dst_planes.as_ptr(),
                dst_strides.as_ptr(),
            )
        };
        if rows < 0 {
            tracing::warn!(
                component = "converter",
                "sws_scale failed: {}",
                ffmpeg_next::Error::from(rows)
            );
            return false;
        }
        true
    }
}
