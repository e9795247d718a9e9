//! Playback error taxonomy
//!
//! Every error is terminal for the playback attempt that raised it. There is
//! no retry anywhere in the pipeline.

use thiserror::Error;

/// Errors that end a playback attempt
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlaybackError {
    /// Source path inaccessible or not a recognised container
    #[error("Failed to open media source: {0}")]
    OpenFailed(String),
    /// Stream metadata could not be discovered
    #[error("Failed to probe stream information: {0}")]
    ProbeFailed(String),
    /// No entry in the stream table is a video stream
    #[error("No video stream found in source")]
    NoVideoStream,
    /// No decoder is available for the selected stream's codec
    #[error("No decoder found for codec: {0}")]
    DecoderNotFound(String),
    /// Decoder context could not be allocated
    #[error("Failed to allocate decoder context for codec: {0}")]
    ContextAllocFailed(String),
    /// Stream codec parameters could not be copied into the decoder context
    #[error("Failed to copy codec parameters: {0}")]
    ParamCopyFailed(String),
    /// Decoder refused to open
    #[error("Failed to open decoder: {0}")]
    DecoderOpenFailed(String),
    /// Pixel converter could not be constructed
    #[error("Failed to create pixel converter: {0}")]
    ConverterInitFailed(String),
    /// Drawable handle invalid or the surface could not be configured
    #[error("Presentation surface unavailable: {0}")]
    SurfaceUnavailable(String),
    /// Container read failed for a reason other than end of stream
    #[error("Failed to read packet: {0}")]
    ReadFailed(String),
    /// Decoder rejected a packet
    #[error("Decoder rejected packet: {0}")]
    SendFailed(String),
    /// Surface buffer could not be locked for a frame
    #[error("Failed to lock presentation surface: {0}")]
    LockFailed(String),
}

impl PlaybackError {
    /// Short stage name used as the `component` field in log events
    pub fn component(&self) -> &'static str {
        match self {
            PlaybackError::OpenFailed(_)
            | PlaybackError::ProbeFailed(_)
            | PlaybackError::ReadFailed(_) => "container",
            PlaybackError::NoVideoStream => "selector",
            PlaybackError::DecoderNotFound(_)
            | PlaybackError::ContextAllocFailed(_)
            | PlaybackError::ParamCopyFailed(_)
            | PlaybackError::DecoderOpenFailed(_)
            | PlaybackError::SendFailed(_) => "decoder",
            PlaybackError::ConverterInitFailed(_) => "converter",
            PlaybackError::SurfaceUnavailable(_) | PlaybackError::LockFailed(_) => "surface",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(PlaybackError::NoVideoStream.to_string(), "No video stream found in source");
        assert_eq!(
            PlaybackError::OpenFailed("/tmp/missing.mp4".into()).to_string(),
            "Failed to open media source: /tmp/missing.mp4"
        );
    }

    #[test]
    fn test_error_component() {
        assert_eq!(PlaybackError::SendFailed("x".into()).component(), "decoder");
        assert_eq!(PlaybackError::LockFailed("x".into()).component(), "surface");
        assert_eq!(PlaybackError::ProbeFailed("x".into()).component(), "container");
    }
}
