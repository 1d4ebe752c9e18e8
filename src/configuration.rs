//! Configuration.
//!
//! [`ExtractOptions`] threads progress callbacks and output settings through
//! frame extraction. [`CompletionConfig`] describes how to reach the
//! completion service. [`ServiceConfig`] gathers everything the HTTP service
//! needs and is loaded from environment variables; it is passed explicitly
//! to the components that need it rather than living in a global.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use framelens::{ExtractOptions, ProgressCallback, ProgressInfo};
//!
//! struct LogProgress;
//! impl ProgressCallback for LogProgress {
//!     fn on_progress(&self, info: &ProgressInfo) {
//!         println!("{:?}: {} done", info.operation, info.current);
//!     }
//! }
//!
//! let options = ExtractOptions::new()
//!     .with_progress(Arc::new(LogProgress))
//!     .with_jpeg_quality(85)
//!     .with_batch_size(5);
//! ```

use std::{
    fmt::{Debug, Formatter, Result as FmtResult},
    path::PathBuf,
    str::FromStr,
    sync::Arc,
    time::Duration,
};

use crate::{
    error::FramelensError,
    ffmpeg::FfmpegLogLevel,
    progress::{NoOpProgress, ProgressCallback},
};

/// Model used when a request does not name one.
pub const DEFAULT_MODEL: &str = "gpt-4o";

/// Base URL of the OpenAI-compatible completion API.
pub const DEFAULT_COMPLETION_BASE_URL: &str = "https://api.openai.com/v1";

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_UPLOAD_DIR: &str = "uploads";
const DEFAULT_MAX_BODY_BYTES: usize = 100 * 1024 * 1024;
const DEFAULT_JPEG_QUALITY: u8 = 95;

/// Options for frame extraction.
///
/// A default-constructed value writes quality-95 JPEGs into a fresh
/// directory under the system temporary directory and reports no progress.
#[derive(Clone)]
pub struct ExtractOptions {
    pub(crate) progress: Arc<dyn ProgressCallback>,
    pub(crate) batch_size: u64,
    pub(crate) jpeg_quality: u8,
    pub(crate) scratch_dir: Option<PathBuf>,
}

impl Debug for ExtractOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("ExtractOptions")
            .field("batch_size", &self.batch_size)
            .field("jpeg_quality", &self.jpeg_quality)
            .field("scratch_dir", &self.scratch_dir)
            .finish()
    }
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtractOptions {
    /// Create options with default settings.
    pub fn new() -> Self {
        Self {
            progress: Arc::new(NoOpProgress),
            batch_size: 1,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            scratch_dir: None,
        }
    }

    /// Attach a progress callback, fired every
    /// [`batch_size`](ExtractOptions::with_batch_size) sampled frames.
    #[must_use]
    pub fn with_progress(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress = callback;
        self
    }

    /// Set how often the progress callback fires. Clamped to at least 1.
    #[must_use]
    pub fn with_batch_size(mut self, size: u64) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// JPEG quality of the written frames, clamped to `1..=100`.
    #[must_use]
    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality.clamp(1, 100);
        self
    }

    /// Directory under which per-extraction temporary directories are
    /// created. `None` uses the system temporary directory.
    #[must_use]
    pub fn with_scratch_dir(mut self, directory: Option<PathBuf>) -> Self {
        self.scratch_dir = directory;
        self
    }

    /// Configured JPEG quality.
    pub fn jpeg_quality(&self) -> u8 {
        self.jpeg_quality
    }
}

/// Connection settings for the completion service.
#[derive(Clone, PartialEq, Eq)]
pub struct CompletionConfig {
    /// Base URL; `/chat/completions` is appended.
    pub base_url: String,
    /// Bearer token. Requests are sent unauthenticated when absent.
    pub api_key: Option<String>,
    /// Per-call timeout. `None` waits for the service indefinitely.
    pub timeout: Option<Duration>,
}

impl Debug for CompletionConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("CompletionConfig")
            .field("base_url", &self.base_url)
            .field("has_api_key", &self.api_key.is_some())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_COMPLETION_BASE_URL.to_string(),
            api_key: None,
            timeout: None,
        }
    }
}

impl CompletionConfig {
    /// Set the base URL. A trailing slash is ignored.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the bearer token.
    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Set a per-call timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Full URL of the chat completions endpoint.
    pub fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

/// Configuration of the HTTP service.
///
/// | Env var               | Default                     |
/// |-----------------------|-----------------------------|
/// | `HOST`                | `0.0.0.0`                   |
/// | `PORT`                | `8080`                      |
/// | `UPLOAD_DIR`          | `uploads`                   |
/// | `DEFAULT_MODEL`       | `gpt-4o`                    |
/// | `MAX_UPLOAD_BYTES`    | `104857600`                 |
/// | `STATIC_DIR`          | unset                       |
/// | `OPENAI_API_KEY`      | unset                       |
/// | `OPENAI_BASE_URL`     | `https://api.openai.com/v1` |
/// | `OPENAI_TIMEOUT_SECS` | unset (no timeout)          |
/// | `FFMPEG_LOG_LEVEL`    | unset                       |
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Bind address.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Storage root for persisted uploads.
    pub upload_dir: PathBuf,
    /// Model used when a request omits one.
    pub default_model: String,
    /// Maximum accepted request body, in bytes.
    pub max_body_bytes: usize,
    /// Directory served at `/`, if any.
    pub static_dir: Option<PathBuf>,
    /// FFmpeg verbosity to apply at start-up.
    pub ffmpeg_log_level: Option<FfmpegLogLevel>,
    /// Completion service settings.
    pub completion: CompletionConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            upload_dir: PathBuf::from(DEFAULT_UPLOAD_DIR),
            default_model: DEFAULT_MODEL.to_string(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            static_dir: None,
            ffmpeg_log_level: None,
            completion: CompletionConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Load configuration from process environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`FramelensError::Configuration`] if a numeric or enumerated
    /// variable cannot be parsed.
    pub fn from_env() -> Result<Self, FramelensError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, FramelensError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let defaults = Self::default();

        let mut completion = CompletionConfig::default();
        if let Some(base_url) = get("OPENAI_BASE_URL") {
            completion = completion.with_base_url(base_url);
        }
        if let Some(api_key) = get("OPENAI_API_KEY") {
            completion = completion.with_api_key(api_key);
        }
        if let Some(seconds) = get("OPENAI_TIMEOUT_SECS") {
            let seconds: u64 = parse_value("OPENAI_TIMEOUT_SECS", &seconds)?;
            completion = completion.with_timeout(Some(Duration::from_secs(seconds)));
        }

        Ok(Self {
            host: get("HOST").unwrap_or(defaults.host),
            port: get("PORT")
                .map(|value| parse_value("PORT", &value))
                .transpose()?
                .unwrap_or(defaults.port),
            upload_dir: get("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.upload_dir),
            default_model: get("DEFAULT_MODEL").unwrap_or(defaults.default_model),
            max_body_bytes: get("MAX_UPLOAD_BYTES")
                .map(|value| parse_value("MAX_UPLOAD_BYTES", &value))
                .transpose()?
                .unwrap_or(defaults.max_body_bytes),
            static_dir: get("STATIC_DIR").map(PathBuf::from),
            ffmpeg_log_level: get("FFMPEG_LOG_LEVEL")
                .map(|value| value.parse::<FfmpegLogLevel>())
                .transpose()?,
            completion,
        })
    }

    /// `host:port` string suitable for binding.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_value<T: FromStr>(name: &str, value: &str) -> Result<T, FramelensError>
where
    T::Err: std::fmt::Display,
{
    value
        .parse::<T>()
        .map_err(|error| FramelensError::Configuration(format!("{name}={value:?}: {error}")))
}
