//! Demux, decode and pixel conversion
//!
//! The pipeline driver only sees the capability traits defined here. Any
//! multimedia backend that can open a container, hand out packets, decode
//! them and convert the result to RGB24 can be plugged in:
//!
//! - [`MemoryBackend`]: uncompressed clips registered in memory
//! - `FfmpegBackend` (feature `ffmpeg`): files decoded through libav*

mod convert;
mod decoder;
#[cfg(feature = "ffmpeg")]
mod ffmpeg;
mod frame;
mod memory;
mod stream;

use std::path::Path;

use crate::error::PlaybackError;

pub use convert::SoftwareConverter;
pub use decoder::{DecodeState, DecoderSession};
#[cfg(feature = "ffmpeg")]
pub use ffmpeg::{FfmpegBackend, FfmpegDecoder, FfmpegPacket, FfmpegSource, SwsConverter};
pub use frame::{ConvertedFrame, PixelFormat, PlanarFrame, RawFrame};
pub use memory::{
    MemoryBackend, MemoryClip, MemoryConverter, MemoryDecoder, MemoryPacket, MemorySource,
    RAW_VIDEO_CODEC,
};
pub use stream::{MediaType, StreamInfo, StreamTable};

/// A unit of compressed data read from a container
///
/// Dropping the packet releases it.
pub trait CompressedPacket {
    /// Index of the stream this packet belongs to
    fn stream_index(&self) -> usize;
}

/// An opened media container
///
/// Not reentrant: every read advances the source's single read cursor.
pub trait ContainerReader {
    type Packet: CompressedPacket;

    /// Discover the stream table, reading ahead into the container if needed
    ///
    /// Must be called exactly once, before any packet is read.
    fn probe_streams(&mut self) -> Result<StreamTable, PlaybackError>;

    /// Blocking pull of the next packet in container order
    ///
    /// `Ok(None)` signals end of stream. Packets of every stream are returned
    /// interleaved; filtering by stream index is the caller's job.
    fn read_packet(&mut self) -> Result<Option<Self::Packet>, PlaybackError>;
}

/// Result of asking a decoder for its next frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveOutcome {
    /// A frame was written into the caller's frame buffer
    Frame,
    /// The decoder needs another packet before it can output more
    WouldBlock,
    /// The decoder was flushed and has no frames left
    EndOfStream,
}

/// A decoder bound to one stream's codec parameters
pub trait VideoDecoder {
    type Packet: CompressedPacket;
    type Frame: RawFrame;

    /// Negotiated frame width
    fn width(&self) -> u32;
    /// Negotiated frame height
    fn height(&self) -> u32;
    /// Native pixel format of decoded frames
    fn pixel_format(&self) -> PixelFormat;

    /// Feed one compressed packet
    fn send_packet(&mut self, packet: &Self::Packet) -> Result<(), PlaybackError>;

    /// Signal that no more packets will follow, so buffered frames can be drained
    fn send_eof(&mut self) -> Result<(), PlaybackError>;

    /// Write the next decoded frame into `frame`, overwriting its contents
    fn receive_frame(&mut self, frame: &mut Self::Frame) -> ReceiveOutcome;
}

/// Converts raw decoded frames into the RGB24 presentation format
///
/// Built once per playback with the negotiated geometry.
pub trait FrameConverter {
    type Frame: RawFrame;

    /// Fill `out` from `raw`. Returns `false`, leaving `out` unspecified, when
    /// the frame could not be converted.
    fn convert(&mut self, raw: &Self::Frame, out: &mut ConvertedFrame) -> bool;
}

/// A concrete multimedia backend: factory for every stage the driver runs
pub trait MediaBackend {
    type Packet: CompressedPacket;
    type Frame: RawFrame;
    type Source: ContainerReader<Packet = Self::Packet>;
    type Decoder: VideoDecoder<Packet = Self::Packet, Frame = Self::Frame>;
    type Converter: FrameConverter<Frame = Self::Frame>;

    /// Backend name for logging
    fn name(&self) -> &'static str;

    /// Open a media source. Probing is a separate step.
    fn open_source(&mut self, path: &Path) -> Result<Self::Source, PlaybackError>;

    /// Find, configure and open a decoder for `stream`
    fn open_decoder(
        &mut self,
        source: &Self::Source,
        stream: &StreamInfo,
    ) -> Result<Self::Decoder, PlaybackError>;

    /// Allocate the long-lived raw frame buffer decoders write into
    fn alloc_frame(&mut self) -> Self::Frame;

    /// Build a converter from the decoder's native format to RGB24 at the
    /// decoder's geometry
    fn make_converter(&mut self, decoder: &Self::Decoder) -> Result<Self::Converter, PlaybackError>;
}
