//! FFmpeg log level configuration.
//!
//! FFmpeg prints its own diagnostics to stderr, independently of the Rust
//! [`log`](https://crates.io/crates/log) facade. Decoding browser-recorded
//! WebM files in particular tends to produce a steady stream of warnings, so
//! the server and CLI expose this knob through `FFMPEG_LOG_LEVEL` and
//! `--log-level`.
//!
//! # Example
//!
//! ```no_run
//! use framelens::FfmpegLogLevel;
//!
//! framelens::set_ffmpeg_log_level(FfmpegLogLevel::Error);
//! ```

use std::str::FromStr;

use ffmpeg_next::util::log::Level;

use crate::error::FramelensError;

/// FFmpeg internal log verbosity, most quiet first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FfmpegLogLevel {
    /// No output at all.
    Quiet,
    /// Conditions the process cannot recover from.
    Panic,
    /// Unrecoverable errors for the current context.
    Fatal,
    /// Recoverable errors.
    Error,
    /// Warnings (FFmpeg's default).
    Warning,
    /// Informational messages.
    Info,
    /// Verbose informational messages.
    Verbose,
    /// Debugging messages.
    Debug,
    /// Everything.
    Trace,
}

impl FfmpegLogLevel {
    fn level(self) -> Level {
        match self {
            FfmpegLogLevel::Quiet => Level::Quiet,
            FfmpegLogLevel::Panic => Level::Panic,
            FfmpegLogLevel::Fatal => Level::Fatal,
            FfmpegLogLevel::Error => Level::Error,
            FfmpegLogLevel::Warning => Level::Warning,
            FfmpegLogLevel::Info => Level::Info,
            FfmpegLogLevel::Verbose => Level::Verbose,
            FfmpegLogLevel::Debug => Level::Debug,
            FfmpegLogLevel::Trace => Level::Trace,
        }
    }
}

impl From<Level> for FfmpegLogLevel {
    fn from(level: Level) -> Self {
        match level {
            Level::Quiet => FfmpegLogLevel::Quiet,
            Level::Panic => FfmpegLogLevel::Panic,
            Level::Fatal => FfmpegLogLevel::Fatal,
            Level::Error => FfmpegLogLevel::Error,
            Level::Warning => FfmpegLogLevel::Warning,
            Level::Info => FfmpegLogLevel::Info,
            Level::Verbose => FfmpegLogLevel::Verbose,
            Level::Debug => FfmpegLogLevel::Debug,
            Level::Trace => FfmpegLogLevel::Trace,
        }
    }
}

impl FromStr for FfmpegLogLevel {
    type Err = FramelensError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "quiet" => Ok(FfmpegLogLevel::Quiet),
            "panic" => Ok(FfmpegLogLevel::Panic),
            "fatal" => Ok(FfmpegLogLevel::Fatal),
            "error" => Ok(FfmpegLogLevel::Error),
            "warning" | "warn" => Ok(FfmpegLogLevel::Warning),
            "info" => Ok(FfmpegLogLevel::Info),
            "verbose" => Ok(FfmpegLogLevel::Verbose),
            "debug" => Ok(FfmpegLogLevel::Debug),
            "trace" => Ok(FfmpegLogLevel::Trace),
            other => Err(FramelensError::Configuration(format!(
                "unknown FFmpeg log level: {other}"
            ))),
        }
    }
}

/// Set FFmpeg's stderr verbosity. Does not affect `log` output.
pub fn set_ffmpeg_log_level(level: FfmpegLogLevel) {
    ffmpeg_next::util::log::set_level(level.level());
}

/// Current FFmpeg stderr verbosity, if it maps to a known level.
pub fn get_ffmpeg_log_level() -> Option<FfmpegLogLevel> {
    ffmpeg_next::util::log::get_level()
        .ok()
        .map(FfmpegLogLevel::from)
}

#[cfg(test)]
mod tests {
    use super::{FfmpegLogLevel, get_ffmpeg_log_level, set_ffmpeg_log_level};

    #[test]
    fn parses_names_and_aliases() {
        assert_eq!("quiet".parse::<FfmpegLogLevel>().unwrap(), FfmpegLogLevel::Quiet);
        assert_eq!("WARN".parse::<FfmpegLogLevel>().unwrap(), FfmpegLogLevel::Warning);
        assert_eq!(" error ".parse::<FfmpegLogLevel>().unwrap(), FfmpegLogLevel::Error);
        assert!("loud".parse::<FfmpegLogLevel>().is_err());
    }

    #[test]
    fn set_level_is_read_back() {
        let previous = get_ffmpeg_log_level();

        for level in [FfmpegLogLevel::Error, FfmpegLogLevel::Quiet, FfmpegLogLevel::Debug] {
            set_ffmpeg_log_level(level);
            assert_eq!(get_ffmpeg_log_level(), Some(level));
        }

        set_ffmpeg_log_level(previous.unwrap_or(FfmpegLogLevel::Info));
    }
}
