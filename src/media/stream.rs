//! Stream table and video stream selection

use serde::Serialize;

use super::PixelFormat;

/// Media type of an elementary stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MediaType {
    Video,
    Audio,
    Subtitle,
    Data,
    Unknown,
}

/// Static descriptor of one stream in a container
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamInfo {
    /// Position in the container's stream table
    pub index: usize,
    pub media_type: MediaType,
    /// Codec identifier as named by the backend (e.g. "h264", "rawvideo")
    pub codec: String,
    /// Width in pixels (0 for non-video streams)
    pub width: u32,
    /// Height in pixels (0 for non-video streams)
    pub height: u32,
    /// Native pixel format, when the container declares one
    pub pixel_format: Option<PixelFormat>,
}

impl StreamInfo {
    /// Descriptor for a video stream
    pub fn video(
        index: usize,
        codec: &str,
        width: u32,
        height: u32,
        pixel_format: PixelFormat,
    ) -> Self {
        Self {
            index,
            media_type: MediaType::Video,
            codec: codec.to_string(),
            width,
            height,
            pixel_format: Some(pixel_format),
        }
    }

    /// Descriptor for an audio stream
    pub fn audio(index: usize, codec: &str) -> Self {
        Self {
            index,
            media_type: MediaType::Audio,
            codec: codec.to_string(),
            width: 0,
            height: 0,
            pixel_format: None,
        }
    }

    pub fn is_video(&self) -> bool {
        self.media_type == MediaType::Video
    }
}

/// All streams discovered in a container, in container order
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StreamTable {
    streams: Vec<StreamInfo>,
}

impl StreamTable {
    pub fn new(streams: Vec<StreamInfo>) -> Self {
        Self { streams }
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&StreamInfo> {
        self.streams.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &StreamInfo> {
        self.streams.iter()
    }

    /// Pick the first video stream in table order
    ///
    /// No scoring: resolution and codec play no part in the choice.
    pub fn select_video_stream(&self) -> Option<&StreamInfo> {
        self.streams.iter().find(|stream| stream.is_video())
    }
}
