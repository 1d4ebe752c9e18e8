//! Frame analysis orchestration.
//!
//! [`FrameAnalyzer`] packages sampled frames into completion requests:
//!
//! - **batch**: every frame in one request, one answer for the whole set;
//! - **sequential**: one request per frame, strictly in extraction order,
//!   each frame's outcome recorded independently;
//! - **single**: one request for one frame, used for live analysis.
//!
//! Results are always tagged: generated text is `Ok`, failures are `Err`
//! and never masquerade as model output.

use std::{
    fmt::{Debug, Display, Formatter, Result as FmtResult},
    str::FromStr,
    sync::Arc,
};

use crate::{
    completion::{ChatMessage, CompletionBackend, CompletionRequest, ContentPart},
    configuration::DEFAULT_MODEL,
    encoding::image_data_uri,
    error::FramelensError,
    extraction::FrameReference,
    progress::{NoOpProgress, OperationType, ProgressCallback, ProgressTracker},
};

/// Output token budget for a batch request.
pub const BATCH_MAX_TOKENS: u32 = 1000;

/// Output token budget for a single-frame request.
pub const FRAME_MAX_TOKENS: u32 = 500;

/// The outcome of analysing one frame in sequential mode.
pub type FrameOutcome = Result<String, FramelensError>;

/// What to ask about the frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisRequest {
    /// Question or instruction sent with the images.
    pub prompt: String,
    /// Optional system instruction. Ignored when blank.
    pub system_message: Option<String>,
    /// Model identifier.
    pub model: String,
}

impl AnalysisRequest {
    /// A request for `prompt` against the default model.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system_message: None,
            model: DEFAULT_MODEL.to_string(),
        }
    }

    /// Use `model` instead of the default.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Attach a system instruction.
    #[must_use]
    pub fn with_system_message(mut self, system_message: impl Into<String>) -> Self {
        self.system_message = Some(system_message.into());
        self
    }

    /// The system instruction, if it has any non-whitespace content.
    pub fn system_instruction(&self) -> Option<&str> {
        self.system_message
            .as_deref()
            .filter(|message| !message.trim().is_empty())
    }
}

/// How a set of frames is sent to the completion service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AnalysisMode {
    /// All frames in a single request.
    #[default]
    Batch,
    /// One request per frame.
    Sequential,
}

impl AnalysisMode {
    /// Interpret a selector received from a client.
    ///
    /// Only `"sequential"` selects sequential mode; every other value,
    /// including unknown ones, falls back to batch.
    pub fn from_wire(value: &str) -> Self {
        if value == "sequential" {
            AnalysisMode::Sequential
        } else {
            AnalysisMode::Batch
        }
    }

    /// Lower-case name of the mode.
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisMode::Batch => "batch",
            AnalysisMode::Sequential => "sequential",
        }
    }
}

impl Display for AnalysisMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalysisMode {
    type Err = FramelensError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "batch" => Ok(AnalysisMode::Batch),
            "sequential" => Ok(AnalysisMode::Sequential),
            other => Err(FramelensError::Configuration(format!(
                "unknown analysis mode {other:?} (expected \"batch\" or \"sequential\")"
            ))),
        }
    }
}

/// Build the conversation for a request: an optional system turn followed by
/// one user turn holding the prompt and then each image in order.
pub fn build_messages(request: &AnalysisRequest, image_urls: &[String]) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(2);

    if let Some(system_message) = request.system_instruction() {
        messages.push(ChatMessage::System {
            content: system_message.to_string(),
        });
    }

    let mut content = Vec::with_capacity(image_urls.len() + 1);
    content.push(ContentPart::text(request.prompt.clone()));
    content.extend(image_urls.iter().map(|url| ContentPart::image(url.clone())));
    messages.push(ChatMessage::User { content });

    messages
}

/// Build a complete completion request with the given output budget.
pub fn build_request(
    request: &AnalysisRequest,
    image_urls: &[String],
    max_tokens: u32,
) -> CompletionRequest {
    CompletionRequest {
        model: request.model.clone(),
        messages: build_messages(request, image_urls),
        max_tokens,
    }
}

/// Sends frames to a [`CompletionBackend`].
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
///
/// use framelens::{
///     AnalysisRequest, CompletionConfig, FrameAnalyzer, OpenAiBackend, extract_frames,
/// };
///
/// let backend = OpenAiBackend::new(&CompletionConfig::default().with_api_key("sk-..."))?;
/// let analyzer = FrameAnalyzer::new(Arc::new(backend));
///
/// let extracted = extract_frames("recording.webm", 2)?;
/// let request = AnalysisRequest::new("What happens in this clip?");
/// let summary = analyzer.analyze_batch(extracted.frames(), &request)?;
/// println!("{summary}");
/// # Ok::<(), framelens::FramelensError>(())
/// ```
#[derive(Clone)]
pub struct FrameAnalyzer {
    backend: Arc<dyn CompletionBackend>,
    progress: Arc<dyn ProgressCallback>,
}

impl Debug for FrameAnalyzer {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("FrameAnalyzer").finish_non_exhaustive()
    }
}

impl FrameAnalyzer {
    /// Create an analyzer over `backend`.
    pub fn new(backend: Arc<dyn CompletionBackend>) -> Self {
        Self {
            backend,
            progress: Arc::new(NoOpProgress),
        }
    }

    /// Report sequential analysis progress to `callback`, once per frame.
    #[must_use]
    pub fn with_progress(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress = callback;
        self
    }

    /// Analyse all `frames` in one request.
    ///
    /// Every frame is encoded before anything is sent; if any frame cannot
    /// be read, or the call fails, no partial answer is produced.
    ///
    /// # Errors
    ///
    /// - [`FramelensError::NoFramesExtracted`] if `frames` is empty.
    /// - [`FramelensError::IoError`] if a frame file cannot be read.
    /// - Any completion error from the backend.
    pub fn analyze_batch(
        &self,
        frames: &[FrameReference],
        request: &AnalysisRequest,
    ) -> Result<String, FramelensError> {
        if frames.is_empty() {
            return Err(FramelensError::NoFramesExtracted);
        }

        log::info!(
            "Analyzing {} frame(s) in batch mode with model {}",
            frames.len(),
            request.model
        );

        let image_urls = frames
            .iter()
            .map(image_data_uri)
            .collect::<Result<Vec<_>, _>>()?;

        let completion = build_request(request, &image_urls, BATCH_MAX_TOKENS);
        let text = self.backend.complete(&completion)?;
        log::info!("Batch analysis complete ({} chars)", text.len());
        Ok(text)
    }

    /// Analyse each frame in its own request, in order.
    ///
    /// A failure on one frame is recorded at that frame's position and the
    /// remaining frames are still analysed. The result always has one entry
    /// per input frame.
    pub fn analyze_sequential(
        &self,
        frames: &[FrameReference],
        request: &AnalysisRequest,
    ) -> Vec<FrameOutcome> {
        log::info!(
            "Analyzing {} frame(s) sequentially with model {}",
            frames.len(),
            request.model
        );

        let mut tracker = ProgressTracker::new(
            self.progress.clone(),
            OperationType::FrameAnalysis,
            Some(frames.len() as u64),
            1,
        );

        let mut outcomes = Vec::with_capacity(frames.len());
        for frame in frames {
            let outcome = self.analyze_one(frame, request);
            match &outcome {
                Ok(_) => log::debug!("Frame {} analyzed", frame.index()),
                Err(error) => log::warn!("Frame {} failed: {error}", frame.index()),
            }
            outcomes.push(outcome);
            tracker.advance(Some(frame.index() as u64));
        }
        tracker.finish();

        outcomes
    }

    /// Analyse a single frame.
    ///
    /// # Errors
    ///
    /// Returns [`FramelensError::IoError`] if the frame cannot be read, or
    /// any completion error from the backend.
    pub fn analyze_one(
        &self,
        frame: &FrameReference,
        request: &AnalysisRequest,
    ) -> Result<String, FramelensError> {
        let image_url = image_data_uri(frame)?;
        let completion = build_request(request, &[image_url], FRAME_MAX_TOKENS);
        self.backend.complete(&completion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_mode_falls_back_to_batch() {
        assert_eq!(AnalysisMode::from_wire("sequential"), AnalysisMode::Sequential);
        assert_eq!(AnalysisMode::from_wire("batch"), AnalysisMode::Batch);
        assert_eq!(AnalysisMode::from_wire("Sequential"), AnalysisMode::Batch);
        assert_eq!(AnalysisMode::from_wire(""), AnalysisMode::Batch);
    }

    #[test]
    fn parsed_mode_is_strict() {
        assert_eq!("Sequential".parse::<AnalysisMode>().unwrap(), AnalysisMode::Sequential);
        assert!("parallel".parse::<AnalysisMode>().is_err());
    }

    #[test]
    fn system_turn_comes_first_and_verbatim() {
        let request = AnalysisRequest::new("Describe").with_system_message("  Be terse.  ");
        let messages = build_messages(&request, &["data:image/jpeg;base64,AA==".to_string()]);

        assert_eq!(messages.len(), 2);
        assert_eq!(
            messages[0],
            ChatMessage::System {
                content: "  Be terse.  ".to_string()
            }
        );
        assert_eq!(
            messages[1],
            ChatMessage::User {
                content: vec![
                    ContentPart::text("Describe"),
                    ContentPart::image("data:image/jpeg;base64,AA=="),
                ]
            }
        );
    }

    #[test]
    fn blank_system_message_is_dropped() {
        let request = AnalysisRequest::new("Describe").with_system_message(" \n\t");
        let messages = build_messages(&request, &[]);
        assert_eq!(messages.len(), 1);
        assert!(matches!(messages[0], ChatMessage::User { .. }));
    }
}
