//! In-memory backend for uncompressed clips
//!
//! Clips are registered under a path and served as if they were files: the
//! stream table comes from the clip, packets carry tightly packed raw frames
//! (`rawvideo`), and decoding is a copy. A packet may hold several frames, and
//! the decoder can hold back a fixed number of frames to behave like a codec
//! with reordering delay.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::error::PlaybackError;

use super::{
    CompressedPacket, ContainerReader, MediaBackend, PixelFormat, PlanarFrame, ReceiveOutcome,
    SoftwareConverter, StreamInfo, StreamTable, VideoDecoder,
};

/// Codec identifier for uncompressed frames
pub const RAW_VIDEO_CODEC: &str = "rawvideo";

/// Counts a live backend resource until dropped
#[derive(Debug)]
struct LiveToken(Arc<AtomicUsize>);

impl LiveToken {
    fn new(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        Self(Arc::clone(counter))
    }
}

impl Drop for LiveToken {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// One packet of a memory clip
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryPacket {
    stream_index: usize,
    data: Vec<u8>,
}

impl MemoryPacket {
    pub fn new(stream_index: usize, data: Vec<u8>) -> Self {
        Self { stream_index, data }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

impl CompressedPacket for MemoryPacket {
    fn stream_index(&self) -> usize {
        self.stream_index
    }
}

/// A stream table plus packets in container order
#[derive(Debug, Clone, Default)]
pub struct MemoryClip {
    streams: Vec<StreamInfo>,
    packets: Vec<MemoryPacket>,
    decoder_delay: usize,
}

impl MemoryClip {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stream; its index is taken from the descriptor
    pub fn with_stream(mut self, stream: StreamInfo) -> Self {
        self.streams.push(stream);
        self
    }

    /// Append a packet with an arbitrary payload
    pub fn with_packet(mut self, stream_index: usize, data: Vec<u8>) -> Self {
        self.packets.push(MemoryPacket::new(stream_index, data));
        self
    }

    /// Append a packet carrying one raw frame
    pub fn with_frame(self, stream_index: usize, frame: &PlanarFrame) -> Self {
        let data = (0..frame.plane_count())
            .flat_map(|plane| frame.plane(plane).iter().copied())
            .collect();
        self.with_packet(stream_index, data)
    }

    /// Number of frames the decoder holds back before emitting
    pub fn with_decoder_delay(mut self, frames: usize) -> Self {
        self.decoder_delay = frames;
        self
    }

    pub fn streams(&self) -> &[StreamInfo] {
        &self.streams
    }

    pub fn packets(&self) -> &[MemoryPacket] {
        &self.packets
    }
}

/// Backend serving registered [`MemoryClip`]s
#[derive(Debug, Default)]
pub struct MemoryBackend {
    clips: HashMap<PathBuf, Arc<MemoryClip>>,
    live: Arc<AtomicUsize>,
    decoders_opened: usize,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `clip` openable under `path`
    pub fn register<P: AsRef<Path>>(&mut self, path: P, clip: MemoryClip) {
        self.clips.insert(path.as_ref().to_path_buf(), Arc::new(clip));
    }

    /// Sources, decoders and converters currently alive
    pub fn live_resources(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    /// Decoders opened over the backend's lifetime
    pub fn decoders_opened(&self) -> usize {
        self.decoders_opened
    }
}

impl MediaBackend for MemoryBackend {
    type Packet = MemoryPacket;
    type Frame = PlanarFrame;
    type Source = MemorySource;
    type Decoder = MemoryDecoder;
    type Converter = MemoryConverter;

    fn name(&self) -> &'static str {
        "memory"
    }

    fn open_source(&mut self, path: &Path) -> Result<MemorySource, PlaybackError> {
        let clip = self
            .clips
            .get(path)
            .ok_or_else(|| PlaybackError::OpenFailed(path.display().to_string()))?;
        Ok(MemorySource {
            clip: Arc::clone(clip),
            cursor: 0,
            probed: false,
            _live: LiveToken::new(&self.live),
        })
    }

    fn open_decoder(
        &mut self,
        source: &MemorySource,
        stream: &StreamInfo,
    ) -> Result<MemoryDecoder, PlaybackError> {
        self.decoders_opened += 1;
        let mut decoder = MemoryDecoder::new(stream, source.clip.decoder_delay)?;
        decoder._live = Some(LiveToken::new(&self.live));
        Ok(decoder)
    }

    fn alloc_frame(&mut self) -> PlanarFrame {
        PlanarFrame::empty()
    }

    fn make_converter(
        &mut self,
        decoder: &MemoryDecoder,
    ) -> Result<MemoryConverter, PlaybackError> {
        let inner =
            SoftwareConverter::new(decoder.pixel_format(), decoder.width(), decoder.height())?;
        Ok(MemoryConverter {
            inner,
            _live: LiveToken::new(&self.live),
        })
    }
}

/// Read cursor over a registered clip
#[derive(Debug)]
pub struct MemorySource {
    clip: Arc<MemoryClip>,
    cursor: usize,
    probed: bool,
    _live: LiveToken,
}

impl MemorySource {
    /// Packets read so far
    pub fn position(&self) -> usize {
        self.cursor
    }
}

impl ContainerReader for MemorySource {
    type Packet = MemoryPacket;

    fn probe_streams(&mut self) -> Result<StreamTable, PlaybackError> {
        for stream in self.clip.streams.iter().filter(|s| s.is_video()) {
            if stream.width == 0 || stream.height == 0 {
                return Err(PlaybackError::ProbeFailed(format!(
                    "stream {} has unknown geometry",
                    stream.index
                )));
            }
        }
        self.probed = true;
        Ok(StreamTable::new(self.clip.streams.clone()))
    }

    fn read_packet(&mut self) -> Result<Option<MemoryPacket>, PlaybackError> {
        if !self.probed {
            return Err(PlaybackError::ReadFailed("source read before probing".to_string()));
        }
        let packet = self.clip.packets.get(self.cursor).cloned();
        if packet.is_some() {
            self.cursor += 1;
        }
        Ok(packet)
    }
}

/// Copies raw frames out of packets, optionally holding some back
#[derive(Debug)]
pub struct MemoryDecoder {
    stream_index: usize,
    width: u32,
    height: u32,
    format: PixelFormat,
    delay: usize,
    pending: VecDeque<Vec<u8>>,
    eof: bool,
    _live: Option<LiveToken>,
}

impl MemoryDecoder {
    /// Configure a decoder for `stream`, holding back `delay` frames
    pub fn new(stream: &StreamInfo, delay: usize) -> Result<Self, PlaybackError> {
        if stream.codec != RAW_VIDEO_CODEC {
            return Err(PlaybackError::DecoderNotFound(stream.codec.clone()));
        }
        let format = stream.pixel_format.ok_or_else(|| {
            PlaybackError::ParamCopyFailed(format!(
                "stream {} declares no pixel format",
                stream.index
            ))
        })?;
        if format == PixelFormat::Other {
            return Err(PlaybackError::DecoderOpenFailed(format!(
                "no raw layout for pixel format of stream {}",
                stream.index
            )));
        }
        Ok(Self {
            stream_index: stream.index,
            width: stream.width,
            height: stream.height,
            format,
            delay,
            pending: VecDeque::new(),
            eof: false,
            _live: None,
        })
    }

    fn frame_size(&self) -> usize {
        self.format.buffer_size(self.width as usize, self.height as usize)
    }
}

impl VideoDecoder for MemoryDecoder {
    type Packet = MemoryPacket;
    type Frame = PlanarFrame;

    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn pixel_format(&self) -> PixelFormat {
        self.format
    }

    fn send_packet(&mut self, packet: &MemoryPacket) -> Result<(), PlaybackError> {
        if self.eof {
            return Err(PlaybackError::SendFailed("decoder already at end of stream".to_string()));
        }
        if packet.stream_index != self.stream_index {
            return Err(PlaybackError::SendFailed(format!(
                "packet of stream {} sent to decoder of stream {}",
                packet.stream_index, self.stream_index
            )));
        }
        let frame_size = self.frame_size();
        if packet.data.is_empty() || packet.data.len() % frame_size != 0 {
            return Err(PlaybackError::SendFailed(format!(
                "payload of {} bytes is not a whole number of {}x{} {} frames",
                packet.data.len(),
                self.width,
                self.height,
                self.format
            )));
        }
        self.pending
            .extend(packet.data.chunks_exact(frame_size).map(<[u8]>::to_vec));
        Ok(())
    }

    fn send_eof(&mut self) -> Result<(), PlaybackError> {
        self.eof = true;
        Ok(())
    }

    fn receive_frame(&mut self, frame: &mut PlanarFrame) -> ReceiveOutcome {
        let ready = self.pending.len() > self.delay || (self.eof && !self.pending.is_empty());
        if !ready {
            return if self.eof {
                ReceiveOutcome::EndOfStream
            } else {
                ReceiveOutcome::WouldBlock
            };
        }
        match self.pending.pop_front() {
            Some(payload) if frame.load(self.format, self.width, self.height, &payload) => {
                ReceiveOutcome::Frame
            }
            // Payload sizes are validated on send, so this only guards the queue
            _ => ReceiveOutcome::WouldBlock,
        }
    }
}

/// Software converter tracked as a live backend resource
#[derive(Debug)]
pub struct MemoryConverter {
    inner: SoftwareConverter,
    _live: LiveToken,
}

impl super::FrameConverter for MemoryConverter {
    type Frame = PlanarFrame;

    fn convert(&mut self, raw: &PlanarFrame, out: &mut super::ConvertedFrame) -> bool {
        self.inner.convert(raw, out)
    }
}
