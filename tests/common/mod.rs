//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::{collections::VecDeque, path::Path, sync::Mutex};

use framelens::{CompletionBackend, CompletionRequest, FrameReference, FramelensError};
use image::{Rgb, RgbImage};
use tempfile::TempDir;

pub fn sample_video_path() -> &'static str {
    "tests/fixtures/sample_video.mp4"
}

pub fn has_sample_video() -> bool {
    Path::new(sample_video_path()).exists()
}

/// 5 s of 30 fps H.264, as written by `generate_fixtures.sh`.
pub const SAMPLE_VIDEO_FRAMES: u64 = 150;

/// Browser-style VP8 WebM recording: 3 s at 30 fps.
pub fn sample_webm_path() -> &'static str {
    "tests/fixtures/sample_video.webm"
}

pub const SAMPLE_WEBM_FRAMES: u64 = 90;

pub fn has_sample_webm() -> bool {
    Path::new(sample_webm_path()).exists()
}

/// A completion backend that records every request and replays scripted
/// replies in order, falling back to a fixed answer once they run out.
pub struct RecordingBackend {
    requests: Mutex<Vec<CompletionRequest>>,
    replies: Mutex<VecDeque<Result<String, FramelensError>>>,
    fallback: String,
}

impl RecordingBackend {
    pub fn answering(text: &str) -> Self {
        Self::scripted(Vec::new(), text)
    }

    pub fn scripted(replies: Vec<Result<String, FramelensError>>, fallback: &str) -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            replies: Mutex::new(replies.into()),
            fallback: fallback.to_string(),
        }
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl CompletionBackend for RecordingBackend {
    fn complete(&self, request: &CompletionRequest) -> Result<String, FramelensError> {
        self.requests.lock().unwrap().push(request.clone());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(self.fallback.clone()))
    }
}

/// Write `count` small, distinct JPEG frames into a fresh directory.
pub fn write_frames(count: usize) -> (TempDir, Vec<FrameReference>) {
    let directory = tempfile::tempdir().unwrap();
    let frames = (0..count)
        .map(|index| {
            let shade = (index * 60 % 256) as u8;
            let image = RgbImage::from_pixel(8, 8, Rgb([shade, 255 - shade, 128]));
            let path = directory.path().join(format!("frame_{index}.jpg"));
            image.save(&path).unwrap();
            FrameReference::new(index, path)
        })
        .collect();
    (directory, frames)
}
