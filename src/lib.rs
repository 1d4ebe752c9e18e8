//! # framelens
//!
//! Sample still frames from recorded video and describe them with a
//! multimodal language model.
//!
//! `framelens` decodes a video with FFmpeg (via
//! [`ffmpeg-next`](https://crates.io/crates/ffmpeg-next)), keeps one frame
//! per time interval, and sends the frames to an OpenAI-compatible chat
//! completion service, either all at once or one by one. An optional HTTP
//! service (feature `server`) exposes the same pipeline to browser clients.
//!
//! ## Quick Start
//!
//! ### Extract Frames
//!
//! ```no_run
//! use framelens::extract_frames;
//!
//! let extracted = extract_frames("recording.webm", 2)?;
//! for frame in extracted.frames() {
//!     println!("{} -> {}", frame.index(), frame.path().display());
//! }
//! // The temporary frame directory is removed here.
//! drop(extracted);
//! # Ok::<(), framelens::FramelensError>(())
//! ```
//!
//! ### Describe a Video
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use framelens::{
//!     AnalysisRequest, CompletionConfig, FrameAnalyzer, OpenAiBackend, extract_frames,
//! };
//!
//! let config = CompletionConfig::default().with_api_key("sk-...");
//! let analyzer = FrameAnalyzer::new(Arc::new(OpenAiBackend::new(&config)?));
//!
//! let extracted = extract_frames("recording.webm", 1)?;
//! let request = AnalysisRequest::new("What is the person doing?")
//!     .with_system_message("Answer in one sentence.");
//!
//! for (index, outcome) in analyzer
//!     .analyze_sequential(extracted.frames(), &request)
//!     .into_iter()
//!     .enumerate()
//! {
//!     match outcome {
//!         Ok(text) => println!("frame {index}: {text}"),
//!         Err(error) => eprintln!("frame {index} failed: {error}"),
//!     }
//! }
//! # Ok::<(), framelens::FramelensError>(())
//! ```
//!
//! ## Features
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `server` (default) | axum HTTP service and the `framelens` binary |
//!
//! ## Requirements
//!
//! FFmpeg development libraries must be installed on your system.

pub mod analysis;
pub mod completion;
pub mod configuration;
pub mod encoding;
pub mod error;
pub mod extraction;
pub mod ffmpeg;
pub mod metadata;
pub mod progress;
pub mod sampling;
#[cfg(feature = "server")]
pub mod server;
pub mod source;
pub mod storage;

pub use analysis::{
    AnalysisMode, AnalysisRequest, BATCH_MAX_TOKENS, FRAME_MAX_TOKENS, FrameAnalyzer,
    FrameOutcome, build_messages, build_request,
};
pub use completion::{
    ChatMessage, CompletionBackend, CompletionRequest, ContentPart, ImageUrl, OpenAiBackend,
};
pub use configuration::{CompletionConfig, DEFAULT_MODEL, ExtractOptions, ServiceConfig};
pub use encoding::{DataUri, decode_data_uri, encode_image, image_data_uri};
pub use error::FramelensError;
pub use extraction::{ExtractedFrames, FrameExtractor, FrameReference, extract_frames};
pub use ffmpeg::{FfmpegLogLevel, get_ffmpeg_log_level, set_ffmpeg_log_level};
pub use metadata::VideoMetadata;
pub use progress::{OperationType, ProgressCallback, ProgressInfo};
pub use sampling::{FrameSampler, expected_sample_count, sampling_stride};
pub use source::{SampledFrames, VideoSource};
pub use storage::{StoredUpload, UploadStore};
