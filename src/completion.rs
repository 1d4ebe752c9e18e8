//! Client for OpenAI-compatible chat completion services.
//!
//! The wire types mirror the `/chat/completions` request body: a model name,
//! an optional system turn, and one user turn made of a text part followed by
//! image parts. [`CompletionBackend`] is the seam the analysis layer talks
//! through; [`OpenAiBackend`] is the HTTP implementation.

use std::fmt::{Debug, Formatter, Result as FmtResult};

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

use crate::{configuration::CompletionConfig, error::FramelensError};

/// Body of a chat completion request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Model identifier.
    pub model: String,
    /// Conversation turns, system turn first when present.
    pub messages: Vec<ChatMessage>,
    /// Upper bound on generated tokens.
    pub max_tokens: u32,
}

impl CompletionRequest {
    /// Number of image parts across all user turns.
    pub fn image_count(&self) -> usize {
        self.messages
            .iter()
            .map(|message| match message {
                ChatMessage::User { content } => content
                    .iter()
                    .filter(|part| matches!(part, ContentPart::ImageUrl { .. }))
                    .count(),
                ChatMessage::System { .. } => 0,
            })
            .sum()
    }
}

/// One conversation turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum ChatMessage {
    /// Instructions that frame the model's behaviour.
    System {
        /// Plain-text instructions.
        content: String,
    },
    /// The question and the images it refers to.
    User {
        /// Text and image parts in order.
        content: Vec<ContentPart>,
    },
}

/// One part of a multi-part user turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    /// A text fragment.
    Text {
        /// The text.
        text: String,
    },
    /// An image, referenced by URL or embedded as a data URI.
    ImageUrl {
        /// The image reference.
        image_url: ImageUrl,
    },
}

impl ContentPart {
    /// A text part.
    pub fn text(text: impl Into<String>) -> Self {
        ContentPart::Text { text: text.into() }
    }

    /// An image part.
    pub fn image(url: impl Into<String>) -> Self {
        ContentPart::ImageUrl {
            image_url: ImageUrl { url: url.into() },
        }
    }
}

/// Image reference within a [`ContentPart::ImageUrl`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageUrl {
    /// `https://` URL or `data:` URI.
    pub url: String,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Something that can turn a completion request into generated text.
///
/// Implementations block the calling thread until the service answers.
pub trait CompletionBackend: Send + Sync {
    /// Send `request` and return the first choice's text.
    ///
    /// # Errors
    ///
    /// Returns a completion error ([`FramelensError::CompletionTransport`],
    /// [`FramelensError::CompletionApi`] or
    /// [`FramelensError::EmptyCompletion`]) if no text could be obtained.
    fn complete(&self, request: &CompletionRequest) -> Result<String, FramelensError>;
}

/// [`CompletionBackend`] backed by an OpenAI-compatible HTTP API.
pub struct OpenAiBackend {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl Debug for OpenAiBackend {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("OpenAiBackend")
            .field("endpoint", &self.endpoint)
            .field("has_api_key", &self.api_key.is_some())
            .finish_non_exhaustive()
    }
}

impl OpenAiBackend {
    /// Build a client for the service described by `config`.
    ///
    /// The underlying client is blocking; construct and drop it outside of
    /// any async runtime.
    ///
    /// # Errors
    ///
    /// Returns [`FramelensError::CompletionTransport`] if the HTTP client
    /// cannot be initialised (for example, no TLS backend is available).
    pub fn new(config: &CompletionConfig) -> Result<Self, FramelensError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("framelens/", env!("CARGO_PKG_VERSION")))
            .build()?;

        if config.api_key.is_none() {
            log::warn!("No API key configured; completion requests will be unauthenticated");
        }

        Ok(Self {
            client,
            endpoint: config.endpoint(),
            api_key: config.api_key.clone(),
        })
    }

    /// URL requests are posted to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl CompletionBackend for OpenAiBackend {
    fn complete(&self, request: &CompletionRequest) -> Result<String, FramelensError> {
        log::debug!(
            "Requesting completion from {} (model={}, images={}, max_tokens={})",
            self.endpoint,
            request.model,
            request.image_count(),
            request.max_tokens,
        );

        let mut builder = self.client.post(&self.endpoint).json(request);
        if let Some(api_key) = &self.api_key {
            builder = builder.bearer_auth(api_key);
        }
        let response = builder.send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            let message = serde_json::from_str::<ErrorEnvelope>(&body)
                .map(|envelope| envelope.error.message)
                .unwrap_or(body);
            log::warn!("Completion service returned {status}: {message}");
            return Err(FramelensError::CompletionApi {
                status: status.as_u16(),
                message,
            });
        }

        let completion: CompletionResponse = response.json()?;
        completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or(FramelensError::EmptyCompletion)
    }
}
