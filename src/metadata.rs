//! Video metadata types.
//!
//! [`VideoMetadata`] is read once when a [`VideoSource`](crate::VideoSource)
//! is opened and cached for its lifetime. The frame rate drives the sampling
//! stride used by the [`FrameExtractor`](crate::FrameExtractor).

use std::time::Duration;

/// Metadata for the primary video stream of a file.
///
/// # Example
///
/// ```no_run
/// use framelens::VideoSource;
///
/// let source = VideoSource::open("recording.webm").unwrap();
/// let metadata = source.metadata();
/// println!("{} fps, ~{} frames", metadata.frames_per_second, metadata.frame_count);
/// ```
#[derive(Debug, Clone, PartialEq)]
#[must_use]
pub struct VideoMetadata {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Frames per second, or `0.0` when the container does not declare one.
    pub frames_per_second: f64,
    /// Declared frame count, or an estimate from duration and frame rate.
    /// Zero when neither is known (common for browser-recorded WebM).
    pub frame_count: u64,
    /// Container-level duration.
    pub duration: Duration,
    /// Codec name (e.g. `"vp8"`, `"vp9"`, `"h264"`).
    pub codec: String,
    /// Container format name (e.g. `"matroska,webm"`).
    pub format: String,
}

impl VideoMetadata {
    /// Number of source frames between two sampled frames for the given
    /// interval. Never zero.
    pub fn sampling_stride(&self, interval_seconds: u64) -> u64 {
        crate::sampling::sampling_stride(self.frames_per_second, interval_seconds)
    }
}
