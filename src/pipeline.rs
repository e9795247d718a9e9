//! Pipeline driver
//!
//! Runs one playback from start to finish on the caller's thread:
//!
//! ```text
//! Opening -> StreamsProbed -> StreamSelected -> DecoderReady -> SurfaceReady
//!         -> Running -> Draining -> Terminated
//! ```
//!
//! Every resource is a local owned by the call, declared in acquisition order,
//! so it is released in reverse order on every exit path. There is no retry:
//! the first error ends the playback and is returned in the report.

use std::path::Path;
use std::time::Instant;

use serde::{Serialize, Serializer};

use crate::error::PlaybackError;
use crate::media::{
    CompressedPacket, ContainerReader, ConvertedFrame, DecoderSession, FrameConverter, MediaBackend,
    RawFrame, ReceiveOutcome, StreamInfo, VideoDecoder,
};
use crate::settings::PlayerSettings;
use crate::surface::{write_frame, PresentationSurface, SurfaceHandle};
use crate::telemetry::{FrameProfiler, FrameStats};

/// Lifecycle of one playback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PipelineState {
    Opening,
    StreamsProbed,
    StreamSelected,
    DecoderReady,
    SurfaceReady,
    Running,
    Draining,
    Terminated,
}

/// Counters collected during a playback
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PlaybackStats {
    /// Packets pulled from the container, every stream included
    pub packets_read: u64,
    /// Packets of other streams, released without decoding
    pub packets_skipped: u64,
    /// Packets accepted by the decoder
    pub packets_sent: u64,
    pub frames_decoded: u64,
    pub frames_presented: u64,
    /// Decoded frames that were not presented: unexpected geometry or a
    /// failed conversion
    pub frames_dropped: u64,
    /// Time from lock to present, per frame
    pub present_latency: FrameStats,
    /// Interval between consecutive presents
    pub present_interval: FrameStats,
    pub fps: f64,
}

/// Outcome of [`PlaybackPipeline::play`]
#[derive(Debug, Clone, Serialize)]
pub struct PlaybackReport {
    /// Always `Terminated` once `play` returns
    pub state: PipelineState,
    /// State the pipeline was in when the error occurred
    pub failed_stage: Option<PipelineState>,
    /// The selected video stream, if selection was reached
    pub stream: Option<StreamInfo>,
    pub stats: PlaybackStats,
    #[serde(rename = "error", serialize_with = "serialize_result")]
    pub result: Result<(), PlaybackError>,
}

impl PlaybackReport {
    /// Played until the container ended
    pub fn is_complete(&self) -> bool {
        self.result.is_ok()
    }

    pub fn error(&self) -> Option<&PlaybackError> {
        self.result.as_ref().err()
    }
}

fn serialize_result<S: Serializer>(
    result: &Result<(), PlaybackError>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match result {
        Ok(()) => serializer.serialize_none(),
        Err(e) => serializer.serialize_some(&e.to_string()),
    }
}

/// Per-playback bookkeeping
struct Progress {
    state: PipelineState,
    stream: Option<StreamInfo>,
    stats: PlaybackStats,
    latency: FrameProfiler,
    intervals: FrameProfiler,
}

impl Progress {
    fn new() -> Self {
        Self {
            state: PipelineState::Opening,
            stream: None,
            stats: PlaybackStats::default(),
            latency: FrameProfiler::new(),
            intervals: FrameProfiler::new(),
        }
    }

    fn enter(&mut self, next: PipelineState) {
        tracing::debug!(component = "pipeline", from = ?self.state, to = ?next, "State transition");
        self.state = next;
    }

    fn into_stats(mut self) -> PlaybackStats {
        self.stats.present_latency = self.latency.stats();
        self.stats.present_interval = self.intervals.stats();
        self.stats.fps = self.intervals.fps();
        self.stats
    }
}

/// Decode-and-present driver over a media backend
pub struct PlaybackPipeline<B: MediaBackend> {
    backend: B,
    flush_decoder_at_eof: bool,
}

impl<B: MediaBackend> PlaybackPipeline<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            flush_decoder_at_eof: true,
        }
    }

    pub fn with_settings(backend: B, settings: &PlayerSettings) -> Self {
        Self {
            backend,
            flush_decoder_at_eof: settings.flush_decoder_at_eof,
        }
    }

    /// Whether frames still buffered in the decoder are presented at end of stream
    pub fn flush_decoder_at_eof(mut self, flush: bool) -> Self {
        self.flush_decoder_at_eof = flush;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn into_backend(self) -> B {
        self.backend
    }

    /// Play the first video stream of `path` onto the surface behind `handle`
    ///
    /// Blocks until the stream ends or an error stops playback. The surface
    /// handle is only resolved once a decoder is open.
    pub fn play<H: SurfaceHandle>(&mut self, path: impl AsRef<Path>, handle: H) -> PlaybackReport {
        let path = path.as_ref();
        let mut progress = Progress::new();
        tracing::info!(
            component = "pipeline",
            backend = self.backend.name(),
            path = %path.display(),
            "Starting playback"
        );

        let result = self.run(path, handle, &mut progress);
        let failed_stage = match &result {
            Ok(()) => None,
            Err(e) => {
                match e {
                    PlaybackError::NoVideoStream => {
                        tracing::warn!(component = e.component(), path = %path.display(), "{}", e)
                    }
                    _ => tracing::error!(
                        component = e.component(),
                        stage = ?progress.state,
                        path = %path.display(),
                        "Playback aborted: {}",
                        e
                    ),
                }
                Some(progress.state)
            }
        };
        progress.enter(PipelineState::Terminated);

        let stream = progress.stream.take();
        let stats = progress.into_stats();
        tracing::info!(
            component = "pipeline",
            packets_read = stats.packets_read,
            frames_decoded = stats.frames_decoded,
            frames_presented = stats.frames_presented,
            frames_dropped = stats.frames_dropped,
            completed = result.is_ok(),
            "Playback finished"
        );

        PlaybackReport {
            state: PipelineState::Terminated,
            failed_stage,
            stream,
            stats,
            result,
        }
    }

    fn run<H: SurfaceHandle>(
        &mut self,
        path: &Path,
        handle: H,
        progress: &mut Progress,
    ) -> Result<(), PlaybackError> {
        let backend = &mut self.backend;

        let mut source = backend.open_source(path)?;
        let table = source.probe_streams()?;
        tracing::debug!(component = "container", streams = table.len(), "Probed stream table");
        progress.enter(PipelineState::StreamsProbed);

        let stream = table.select_video_stream().cloned().ok_or(PlaybackError::NoVideoStream)?;
        tracing::info!(
            component = "selector",
            index = stream.index,
            codec = %stream.codec,
            width = stream.width,
            height = stream.height,
            "Selected video stream"
        );
        progress.stream = Some(stream.clone());
        progress.enter(PipelineState::StreamSelected);

        let mut session = DecoderSession::new(backend.open_decoder(&source, &stream)?);
        let mut raw = backend.alloc_frame();
        let width = session.decoder().width();
        let height = session.decoder().height();
        tracing::info!(
            component = "decoder",
            width,
            height,
            format = %session.decoder().pixel_format(),
            "Decoder ready"
        );
        progress.enter(PipelineState::DecoderReady);

        let mut surface = handle.acquire()?;
        surface.configure(width, height)?;
        let mut converter = backend.make_converter(session.decoder())?;
        let mut converted = ConvertedFrame::new(width, height);
        progress.enter(PipelineState::SurfaceReady);

        let mut stage = Stage {
            session: &mut session,
            raw: &mut raw,
            converter: &mut converter,
            converted: &mut converted,
            surface: &mut surface,
        };

        progress.enter(PipelineState::Running);
        pump_packets(&mut source, stream.index, &mut stage, progress)?;

        progress.enter(PipelineState::Draining);
        if self.flush_decoder_at_eof {
            stage.session.finish()?;
            stage.drain(progress)?;
        }
        Ok(())
    }
}

/// Mutable per-frame state borrowed from `run`
struct Stage<'a, D: VideoDecoder, C, S> {
    session: &'a mut DecoderSession<D>,
    raw: &'a mut D::Frame,
    converter: &'a mut C,
    converted: &'a mut ConvertedFrame,
    surface: &'a mut S,
}

impl<D, C, S> Stage<'_, D, C, S>
where
    D: VideoDecoder,
    C: FrameConverter<Frame = D::Frame>,
    S: PresentationSurface,
{
    /// Receive and present frames until the decoder wants input or is done
    fn drain(&mut self, progress: &mut Progress) -> Result<(), PlaybackError> {
        loop {
            match self.session.receive_frame(self.raw) {
                ReceiveOutcome::Frame => {
                    progress.stats.frames_decoded += 1;
                    self.present(progress)?;
                }
                ReceiveOutcome::WouldBlock | ReceiveOutcome::EndOfStream => return Ok(()),
            }
        }
    }

    /// Convert the current raw frame and run one lock / write / present cycle
    fn present(&mut self, progress: &mut Progress) -> Result<(), PlaybackError> {
        if self.raw.width() != self.converted.width()
            || self.raw.height() != self.converted.height()
        {
            tracing::warn!(
                component = "decoder",
                width = self.raw.width(),
                height = self.raw.height(),
                expected_width = self.converted.width(),
                expected_height = self.converted.height(),
                "Dropping frame with unexpected geometry"
            );
            progress.stats.frames_dropped += 1;
            return Ok(());
        }

        if !self.converter.convert(self.raw, self.converted) {
            tracing::warn!(component = "converter", "Dropping frame that could not be converted");
            progress.stats.frames_dropped += 1;
            return Ok(());
        }

        let started = Instant::now();
        {
            let mut view = self.surface.lock()?;
            write_frame(&mut view, self.converted);
        }
        self.surface.unlock_and_present();

        progress.latency.record(started.elapsed());
        progress.intervals.begin_frame();
        progress.stats.frames_presented += 1;
        Ok(())
    }
}

/// The `Running` loop: pull packets until end of stream or a fatal error
fn pump_packets<R, D, C, S>(
    source: &mut R,
    video_index: usize,
    stage: &mut Stage<'_, D, C, S>,
    progress: &mut Progress,
) -> Result<(), PlaybackError>
where
    R: ContainerReader<Packet = D::Packet>,
    D: VideoDecoder,
    C: FrameConverter<Frame = D::Frame>,
    S: PresentationSurface,
{
    while let Some(packet) = source.read_packet()? {
        progress.stats.packets_read += 1;
        if packet.stream_index() != video_index {
            progress.stats.packets_skipped += 1;
            continue;
        }

        stage.session.send_packet(&packet)?;
        progress.stats.packets_sent += 1;
        stage.drain(progress)?;
    }
    tracing::debug!(
        component = "container",
        packets = progress.stats.packets_read,
        "End of stream"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{MemoryBackend, MemoryClip, PixelFormat, PlanarFrame, RAW_VIDEO_CODEC};
    use crate::surface::{MemorySurface, SurfaceEvent, PADDING_BYTE};

    const CLIP: &str = "clip.raw";

    fn gray_stream(index: usize, width: u32, height: u32) -> StreamInfo {
        StreamInfo::video(index, RAW_VIDEO_CODEC, width, height, PixelFormat::Gray8)
    }

    fn gray_frame(width: u32, height: u32, luma: u8) -> PlanarFrame {
        let mut frame = PlanarFrame::new(PixelFormat::Gray8, width, height);
        frame.plane_mut(0).fill(luma);
        frame
    }

    /// A gray clip of `count` frames, one per packet, luma 10, 20, 30...
    fn gray_clip(count: usize) -> MemoryClip {
        (0..count).fold(MemoryClip::new().with_stream(gray_stream(0, 4, 3)), |clip, i| {
            clip.with_frame(0, &gray_frame(4, 3, 10 * (i as u8 + 1)))
        })
    }

    fn pipeline_with(clip: MemoryClip) -> PlaybackPipeline<MemoryBackend> {
        let mut backend = MemoryBackend::new();
        backend.register(CLIP, clip);
        PlaybackPipeline::new(backend)
    }

    #[test]
    fn test_presents_every_frame_in_alternation() {
        let mut pipeline = pipeline_with(gray_clip(5));
        let mut surface = MemorySurface::new();

        let report = pipeline.play(CLIP, &mut surface);

        assert!(report.is_complete());
        assert_eq!(report.state, PipelineState::Terminated);
        assert_eq!(report.failed_stage, None);
        assert_eq!(report.stats.frames_presented, 5);
        assert_eq!(surface.lock_count(), 5);
        assert_eq!(surface.present_count(), 5);
        assert_eq!(surface.double_lock_attempts(), 0);
        for pair in surface.events().chunks(2) {
            assert_eq!(pair, &[SurfaceEvent::Lock, SurfaceEvent::Present]);
        }
        assert!(!surface.is_locked());
        // Last frame is on screen
        assert_eq!(surface.pixel(3, 2), [50, 50, 50]);
        assert_eq!(pipeline.backend().live_resources(), 0);
    }

    #[test]
    fn test_no_video_stream_touches_nothing() {
        let clip = MemoryClip::new()
            .with_stream(StreamInfo::audio(0, "aac"))
            .with_packet(0, vec![1, 2, 3]);
        let mut pipeline = pipeline_with(clip);
        let mut surface = MemorySurface::new();

        let report = pipeline.play(CLIP, &mut surface);

        assert_eq!(report.error(), Some(&PlaybackError::NoVideoStream));
        assert_eq!(report.failed_stage, Some(PipelineState::StreamsProbed));
        assert_eq!(report.state, PipelineState::Terminated);
        assert_eq!(report.stats.packets_read, 0);
        assert_eq!(report.stats.frames_presented, 0);
        assert_eq!(pipeline.backend().decoders_opened(), 0);
        assert!(!surface.is_configured());
        assert_eq!(surface.lock_count(), 0);
        assert_eq!(pipeline.backend().live_resources(), 0);
    }

    #[test]
    fn test_selects_first_video_stream_and_skips_others() {
        let clip = MemoryClip::new()
            .with_stream(StreamInfo::audio(0, "aac"))
            .with_stream(gray_stream(1, 2, 2))
            .with_stream(gray_stream(2, 2, 2))
            .with_packet(0, vec![0; 7])
            .with_frame(1, &gray_frame(2, 2, 100))
            .with_packet(0, vec![0; 7])
            .with_frame(2, &gray_frame(2, 2, 200))
            .with_frame(1, &gray_frame(2, 2, 120));
        let mut pipeline = pipeline_with(clip);
        let mut surface = MemorySurface::new();

        let report = pipeline.play(CLIP, &mut surface);

        // The decoder rejects foreign packets, so completion proves the filter
        assert!(report.is_complete(), "{:?}", report.error());
        assert_eq!(report.stream.as_ref().map(|s| s.index), Some(1));
        assert_eq!(report.stats.packets_read, 5);
        assert_eq!(report.stats.packets_skipped, 3);
        assert_eq!(report.stats.packets_sent, 2);
        assert_eq!(report.stats.frames_presented, 2);
    }

    #[test]
    fn test_send_failure_halts_reading() {
        let clip = MemoryClip::new()
            .with_stream(gray_stream(0, 4, 3))
            .with_frame(0, &gray_frame(4, 3, 50))
            .with_packet(0, vec![0; 5])
            .with_frame(0, &gray_frame(4, 3, 60))
            .with_frame(0, &gray_frame(4, 3, 70));
        let mut pipeline = pipeline_with(clip);
        let mut surface = MemorySurface::new();

        let report = pipeline.play(CLIP, &mut surface);

        assert!(matches!(report.error(), Some(PlaybackError::SendFailed(_))));
        assert_eq!(report.failed_stage, Some(PipelineState::Running));
        assert_eq!(report.stats.packets_read, 2);
        assert_eq!(report.stats.frames_presented, 1);
        assert_eq!(surface.present_count(), 1);
        assert_eq!(pipeline.backend().live_resources(), 0);
    }

    #[test]
    fn test_lock_failure_aborts_loop() {
        let mut pipeline = pipeline_with(gray_clip(5));
        let mut surface = MemorySurface::new().expire_after(2);

        let report = pipeline.play(CLIP, &mut surface);

        assert!(matches!(report.error(), Some(PlaybackError::LockFailed(_))));
        assert_eq!(report.failed_stage, Some(PipelineState::Running));
        assert_eq!(report.stats.frames_presented, 2);
        // The third packet produced the frame that could not be shown
        assert_eq!(report.stats.packets_read, 3);
        assert_eq!(report.stats.frames_decoded, 3);
        assert_eq!(surface.present_count(), 2);
        assert!(!surface.is_locked());
        assert_eq!(pipeline.backend().live_resources(), 0);
    }

    #[test]
    fn test_lock_failure_while_flushing() {
        let mut pipeline = pipeline_with(gray_clip(4).with_decoder_delay(2));
        let mut surface = MemorySurface::new().expire_after(3);

        let report = pipeline.play(CLIP, &mut surface);

        assert!(matches!(report.error(), Some(PlaybackError::LockFailed(_))));
        assert_eq!(report.failed_stage, Some(PipelineState::Draining));
        assert_eq!(report.stats.packets_read, 4);
        assert_eq!(report.stats.frames_presented, 3);
        assert_eq!(pipeline.backend().live_resources(), 0);
    }

    #[test]
    fn test_flush_presents_delayed_frames() {
        let mut pipeline = pipeline_with(gray_clip(4).with_decoder_delay(2));
        let mut surface = MemorySurface::new();
        let report = pipeline.play(CLIP, &mut surface);
        assert!(report.is_complete());
        assert_eq!(report.stats.frames_presented, 4);

        let mut pipeline =
            pipeline_with(gray_clip(4).with_decoder_delay(2)).flush_decoder_at_eof(false);
        let mut surface = MemorySurface::new();
        let report = pipeline.play(CLIP, &mut surface);
        assert!(report.is_complete());
        assert_eq!(report.stats.frames_presented, 2);
    }

    #[test]
    fn test_multi_frame_packet() {
        let mut payload = Vec::new();
        for luma in [16u8, 128, 235] {
            payload.extend(gray_frame(2, 2, luma).plane(0));
        }
        let clip = MemoryClip::new().with_stream(gray_stream(0, 2, 2)).with_packet(0, payload);
        let mut pipeline = pipeline_with(clip);
        let mut surface = MemorySurface::new();

        let report = pipeline.play(CLIP, &mut surface);

        assert_eq!(report.stats.packets_sent, 1);
        assert_eq!(report.stats.frames_decoded, 3);
        assert_eq!(report.stats.frames_presented, 3);
        assert_eq!(surface.pixel(1, 1), [235, 235, 235]);
    }

    #[test]
    fn test_padded_surface_stride() {
        let mut pipeline = pipeline_with(gray_clip(1));
        let mut surface = MemorySurface::new().with_stride_padding(7);

        let report = pipeline.play(CLIP, &mut surface);

        assert!(report.is_complete());
        let row_bytes = 4 * 3;
        for y in 0..3 {
            assert!(surface.row(y).iter().all(|&b| b == 10));
            let row = &surface.buffer()[y * surface.stride()..(y + 1) * surface.stride()];
            assert!(
                row[row_bytes..].iter().all(|&b| b == PADDING_BYTE),
                "row {} padding touched",
                y
            );
        }
    }

    #[test]
    fn test_setup_failures_release_resources() {
        let mut pipeline = pipeline_with(gray_clip(1));
        let report = pipeline.play("missing.raw", &mut MemorySurface::new());
        assert!(matches!(report.error(), Some(PlaybackError::OpenFailed(_))));
        assert_eq!(report.failed_stage, Some(PipelineState::Opening));

        pipeline
            .backend_mut()
            .register("broken", MemoryClip::new().with_stream(gray_stream(0, 0, 0)));
        let report = pipeline.play("broken", &mut MemorySurface::new());
        assert!(matches!(report.error(), Some(PlaybackError::ProbeFailed(_))));

        pipeline.backend_mut().register(
            "h264",
            MemoryClip::new().with_stream(StreamInfo::video(0, "h264", 4, 4, PixelFormat::Yuv420p)),
        );
        let mut surface = MemorySurface::new();
        let report = pipeline.play("h264", &mut surface);
        assert!(matches!(report.error(), Some(PlaybackError::DecoderNotFound(_))));
        assert_eq!(report.failed_stage, Some(PipelineState::StreamSelected));
        assert!(!surface.is_configured());

        assert_eq!(pipeline.backend().live_resources(), 0);
    }

    #[test]
    fn test_missing_surface_after_decoder() {
        let mut pipeline = pipeline_with(gray_clip(2));

        let report = pipeline.play(CLIP, None::<MemorySurface>);

        assert!(matches!(report.error(), Some(PlaybackError::SurfaceUnavailable(_))));
        assert_eq!(report.failed_stage, Some(PipelineState::DecoderReady));
        assert_eq!(report.stats.packets_read, 0);
        assert_eq!(pipeline.backend().decoders_opened(), 1);
        assert_eq!(pipeline.backend().live_resources(), 0);
    }

    #[test]
    fn test_geometry_mismatch_is_dropped() {
        let stream = gray_stream(0, 2, 2);
        let decoder = crate::media::MemoryDecoder::new(&stream, 0).unwrap();
        let mut session = DecoderSession::new(decoder);
        let mut raw = gray_frame(3, 3, 90);
        let mut converter = crate::media::SoftwareConverter::new(PixelFormat::Gray8, 2, 2).unwrap();
        let mut converted = ConvertedFrame::new(2, 2);
        let mut surface = MemorySurface::new();
        surface.configure(2, 2).unwrap();
        let mut progress = Progress::new();

        let mut stage = Stage {
            session: &mut session,
            raw: &mut raw,
            converter: &mut converter,
            converted: &mut converted,
            surface: &mut surface,
        };
        stage.present(&mut progress).unwrap();

        assert_eq!(progress.stats.frames_dropped, 1);
        assert_eq!(progress.stats.frames_presented, 0);
        assert_eq!(surface.lock_count(), 0);
    }

    #[test]
    fn test_unconvertible_frame_is_dropped() {
        let stream = gray_stream(0, 2, 2);
        let decoder = crate::media::MemoryDecoder::new(&stream, 0).unwrap();
        let mut session = DecoderSession::new(decoder);
        // Negotiated geometry, but not the layout the converter was built for
        let mut raw = PlanarFrame::new(PixelFormat::Nv12, 2, 2);
        let mut converter = crate::media::SoftwareConverter::new(PixelFormat::Gray8, 2, 2).unwrap();
        let mut converted = ConvertedFrame::new(2, 2);
        let mut surface = MemorySurface::new();
        surface.configure(2, 2).unwrap();
        let mut progress = Progress::new();

        let mut stage = Stage {
            session: &mut session,
            raw: &mut raw,
            converter: &mut converter,
            converted: &mut converted,
            surface: &mut surface,
        };
        stage.present(&mut progress).unwrap();

        assert_eq!(progress.stats.frames_dropped, 1);
        assert_eq!(progress.stats.frames_presented, 0);
        assert_eq!(surface.lock_count(), 0);
        assert!(surface.buffer().iter().all(|&b| b == PADDING_BYTE));
    }

    #[test]
    fn test_report_serializes() {
        let mut pipeline = pipeline_with(gray_clip(1));
        let report = pipeline.play(CLIP, None::<MemorySurface>);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["state"], "Terminated");
        assert_eq!(json["failed_stage"], "DecoderReady");
        assert_eq!(json["stream"]["codec"], RAW_VIDEO_CODEC);
        assert!(json["error"].as_str().unwrap().starts_with("Presentation surface unavailable"));
    }
}
