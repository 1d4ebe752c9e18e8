//! Error types for the `framelens` crate.
//!
//! This module defines [`FramelensError`], the unified error type returned by
//! every fallible operation in the crate: opening and decoding video, writing
//! and reading sampled frames, decoding inbound payloads, and talking to the
//! remote completion service.

use std::{io::Error as IoError, path::PathBuf};

use ffmpeg_next::Error as FfmpegError;
use image::ImageError;
use thiserror::Error;

/// The unified error type for all `framelens` operations.
///
/// Variants carry enough context (paths, HTTP status codes, upstream
/// messages) to diagnose a failure without additional logging at the call
/// site. Use [`kind`](FramelensError::kind) for a stable, machine-readable
/// classification.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FramelensError {
    /// The video file could not be opened.
    #[error("Failed to open video file at {path}: {reason}")]
    FileOpen {
        /// Path that was passed to [`crate::VideoSource::open`].
        path: PathBuf,
        /// Underlying reason the open failed.
        reason: String,
    },

    /// The file does not contain a video stream.
    #[error("No video stream found in file")]
    NoVideoStream,

    /// A video frame could not be decoded or converted.
    #[error("Failed to decode video frame: {0}")]
    VideoDecodeError(String),

    /// An error originating from the FFmpeg libraries.
    #[error("FFmpeg error: {0}")]
    FfmpegError(String),

    /// The video decoded cleanly but yielded no frames.
    #[error("No frames could be extracted from the video")]
    NoFramesExtracted,

    /// An I/O error occurred while reading or writing files.
    #[error("I/O error: {0}")]
    IoError(#[from] IoError),

    /// An error from the `image` crate while writing a sampled frame.
    #[error("Image processing error: {0}")]
    ImageError(#[from] ImageError),

    /// An inbound payload was not a valid (data URI wrapped) base64 string.
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// The completion service could not be reached or the client failed.
    #[error("Completion request failed: {0}")]
    CompletionTransport(String),

    /// The completion service answered with a non-success status.
    #[error("Completion service returned {status}: {message}")]
    CompletionApi {
        /// HTTP status code returned by the service.
        status: u16,
        /// Error message reported by the service, or the raw body.
        message: String,
    },

    /// The completion service answered without any generated text.
    #[error("Completion service returned no content")]
    EmptyCompletion,

    /// A configuration value was missing or malformed.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl FramelensError {
    /// A short, stable tag describing the class of failure.
    ///
    /// Returned to HTTP clients alongside the human-readable message so that
    /// failures can be told apart from genuine model output without string
    /// inspection.
    pub fn kind(&self) -> &'static str {
        match self {
            FramelensError::FileOpen { .. }
            | FramelensError::NoVideoStream
            | FramelensError::VideoDecodeError(_)
            | FramelensError::FfmpegError(_)
            | FramelensError::NoFramesExtracted => "video",
            FramelensError::IoError(_) | FramelensError::ImageError(_) => "io",
            FramelensError::InvalidPayload(_) => "payload",
            FramelensError::CompletionTransport(_)
            | FramelensError::CompletionApi { .. }
            | FramelensError::EmptyCompletion => "completion",
            FramelensError::Configuration(_) => "configuration",
        }
    }
}

impl From<FfmpegError> for FramelensError {
    fn from(error: FfmpegError) -> Self {
        FramelensError::FfmpegError(error.to_string())
    }
}

impl From<reqwest::Error> for FramelensError {
    fn from(error: reqwest::Error) -> Self {
        FramelensError::CompletionTransport(error.to_string())
    }
}
