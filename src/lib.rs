//! Surface Player Library
//!
//! Decodes the first video stream of a media container and presents it frame
//! by frame on a lockable drawable surface. Demuxing and decoding go through
//! a pluggable [`MediaBackend`](media::MediaBackend): FFmpeg (feature
//! `ffmpeg`) or uncompressed in-memory clips.

pub mod error;
pub mod media;
pub mod pipeline;
pub mod settings;
pub mod surface;
pub mod telemetry;

pub use error::PlaybackError;
#[cfg(feature = "ffmpeg")]
pub use media::FfmpegBackend;
pub use media::{MediaBackend, MemoryBackend, MemoryClip, PixelFormat, StreamInfo};
pub use pipeline::{PipelineState, PlaybackPipeline, PlaybackReport, PlaybackStats};
pub use settings::{PlayerSettings, ScalingAlgorithm, SettingsError};
pub use surface::{
    BufferView, ImageSequenceSurface, MemorySurface, PresentationSurface, SurfaceHandle,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
