//! HTTP surface.
//!
//! Exposes frame extraction and analysis to browser clients:
//!
//! | Route                 | Purpose                                        |
//! |-----------------------|------------------------------------------------|
//! | `GET /health`         | liveness probe                                 |
//! | `POST /process_video` | sample a recorded video and analyse the frames |
//! | `POST /analyze_frame` | analyse a single live frame                    |
//!
//! Analysis outcomes are always answered with `200 OK` and a `success` flag;
//! only requests that cannot be understood get a `4xx` status. Decoding,
//! disk I/O and remote calls are blocking and run on Tokio's blocking pool.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_http::{catch_panic::CatchPanicLayer, cors::CorsLayer, services::ServeDir};

use crate::{
    analysis::{AnalysisMode, AnalysisRequest, FrameAnalyzer},
    completion::CompletionBackend,
    configuration::{ExtractOptions, ServiceConfig},
    encoding::decode_data_uri,
    error::FramelensError,
    extraction::{FrameExtractor, FrameReference},
    storage::UploadStore,
};

/// Prompt used for videos when the client sends none.
pub const DEFAULT_VIDEO_PROMPT: &str = "What is in these images?";

/// Prompt used for live frames when the client sends none.
pub const DEFAULT_FRAME_PROMPT: &str = "What is in this image?";

const EXTRACTION_FAILED: &str = "Failed to extract frames from video";

/// Shared state handed to every request handler.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Service configuration.
    pub config: Arc<ServiceConfig>,
    /// Where uploaded payloads are written.
    pub store: Arc<UploadStore>,
    /// Samples frames from uploaded videos.
    pub extractor: FrameExtractor,
    /// Sends frames to the completion service.
    pub analyzer: FrameAnalyzer,
}

impl AppState {
    /// Assemble the state from configuration and a completion backend.
    ///
    /// # Errors
    ///
    /// Returns [`FramelensError::IoError`] if the upload directory cannot be
    /// created.
    pub fn new(
        config: ServiceConfig,
        backend: Arc<dyn CompletionBackend>,
    ) -> Result<Self, FramelensError> {
        let store = UploadStore::new(&config.upload_dir)?;
        Ok(Self {
            config: Arc::new(config),
            store: Arc::new(store),
            extractor: FrameExtractor::new(ExtractOptions::new()),
            analyzer: FrameAnalyzer::new(backend),
        })
    }
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    let body_limit = state.config.max_body_bytes;
    let static_dir = state.config.static_dir.clone();

    let mut router = Router::new()
        .route("/health", get(health))
        .route("/process_video", post(process_video))
        .route("/analyze_frame", post(analyze_frame));

    if let Some(directory) = static_dir {
        log::info!("Serving static files from {}", directory.display());
        router = router.fallback_service(ServeDir::new(directory));
    }

    router
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CatchPanicLayer::new())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind to the configured address and serve until Ctrl-C.
///
/// # Errors
///
/// Returns [`FramelensError::IoError`] if the address cannot be bound or the
/// server fails.
pub async fn serve(state: AppState) -> Result<(), FramelensError> {
    let address = state.config.bind_address();
    let listener = tokio::net::TcpListener::bind(&address).await?;
    log::info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    log::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        log::warn!("Failed to listen for Ctrl-C: {error}");
        std::future::pending::<()>().await;
    }
    log::info!("Shutdown requested");
}

// ── Requests ───────────────────────────────────────────────────────

/// Body of `POST /process_video`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessVideoRequest {
    /// Recorded video as a `data:video/...;base64,` URI.
    pub video: String,
    /// Question about the frames.
    pub prompt: Option<String>,
    /// Optional system instruction.
    pub system_message: Option<String>,
    /// Model identifier.
    pub model: Option<String>,
    /// Seconds between sampled frames.
    pub frame_interval: Option<FrameInterval>,
    /// `"batch"` or `"sequential"`.
    pub analysis_mode: Option<String>,
}

/// Body of `POST /analyze_frame`.
///
/// The caller's `frameNumber` is read from the raw body before this is
/// deserialised, so it can be echoed even when the rest is unusable.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeFrameRequest {
    /// Frame as a `data:image/...;base64,` URI.
    pub frame: String,
    /// Question about the frame.
    pub prompt: Option<String>,
    /// Optional system instruction.
    pub system_message: Option<String>,
    /// Model identifier.
    pub model: Option<String>,
}

/// The caller's sequence number, echoed back untouched. Defaults to `0`.
fn frame_number(body: &Value) -> Value {
    body.get("frameNumber")
        .cloned()
        .unwrap_or_else(|| Value::from(0))
}

/// A frame interval sent either as a JSON number or a numeric string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum FrameInterval {
    /// `"frameInterval": 2`
    Number(f64),
    /// `"frameInterval": "2"`
    Text(String),
}

impl FrameInterval {
    /// Whole seconds. Fractional numbers are truncated.
    fn seconds(&self) -> Result<u64, ApiError> {
        match self {
            FrameInterval::Number(value) if value.is_finite() && *value >= 0.0 => {
                Ok(value.trunc() as u64)
            }
            FrameInterval::Text(text) => text.trim().parse::<u64>().map_err(|_| {
                ApiError::BadRequest(format!("frameInterval must be a whole number, got {text:?}"))
            }),
            FrameInterval::Number(value) => Err(ApiError::BadRequest(format!(
                "frameInterval must be a non-negative number, got {value}"
            ))),
        }
    }
}

// ── Responses ──────────────────────────────────────────────────────

/// The `result` of a successful analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum AnalysisResult {
    /// Batch or single-frame answer.
    Text(String),
    /// One answer per frame, in extraction order.
    PerFrame(Vec<String>),
}

/// JSON body returned by the analysis routes.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResponse {
    /// `true` when `result` is populated.
    pub success: bool,
    /// Model output.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<AnalysisResult>,
    /// Positions of sequential results that hold an error description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_frames: Option<Vec<usize>>,
    /// Human-readable failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Machine-readable failure class, see [`FramelensError::kind`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<&'static str>,
    /// Echo of the caller's frame number (live frames only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_number: Option<Value>,
}

impl AnalysisResponse {
    fn success(result: AnalysisResult) -> Self {
        Self {
            success: true,
            result: Some(result),
            failed_frames: None,
            error: None,
            error_kind: None,
            frame_number: None,
        }
    }

    fn failure(error: String, error_kind: Option<&'static str>) -> Self {
        Self {
            success: false,
            result: None,
            failed_frames: None,
            error: Some(error),
            error_kind,
            frame_number: None,
        }
    }

    fn with_frame_number(mut self, frame_number: Value) -> Self {
        self.frame_number = Some(frame_number);
        self
    }
}

/// A request the service could not act on.
#[derive(Debug)]
pub enum ApiError {
    /// The body was not valid JSON or lacked a required field.
    Rejected(JsonRejection),
    /// A field held an unusable value.
    BadRequest(String),
    /// A live frame request that could not be read; the caller's frame
    /// number is still echoed.
    BadFrame {
        /// What was wrong with the body.
        message: String,
        /// `frameNumber` as received, or `0`.
        frame_number: Value,
    },
    /// The service failed before any analysis could start.
    Internal(String),
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Rejected(rejection)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, frame_number) = match self {
            ApiError::Rejected(rejection) => {
                let status = match &rejection {
                    JsonRejection::BytesRejection(_) => rejection.status(),
                    _ => StatusCode::BAD_REQUEST,
                };
                (status, rejection.body_text(), None)
            }
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message, None),
            ApiError::BadFrame {
                message,
                frame_number,
            } => (StatusCode::BAD_REQUEST, message, Some(frame_number)),
            ApiError::Internal(message) => {
                log::error!("{message}");
                (StatusCode::INTERNAL_SERVER_ERROR, message, None)
            }
        };
        log::warn!("Rejecting request ({status}): {message}");

        let mut body = AnalysisResponse::failure(message, None);
        body.frame_number = frame_number;
        (status, Json(body)).into_response()
    }
}

// ── Handlers ───────────────────────────────────────────────────────

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn process_video(
    State(state): State<AppState>,
    payload: Result<Json<ProcessVideoRequest>, JsonRejection>,
) -> Result<Json<AnalysisResponse>, ApiError> {
    let Json(payload) = payload?;
    log::info!("Received video processing request");

    let interval_seconds = payload
        .frame_interval
        .as_ref()
        .map(FrameInterval::seconds)
        .transpose()?
        .unwrap_or(1);
    let mode = AnalysisMode::from_wire(payload.analysis_mode.as_deref().unwrap_or("batch"));
    let request = analysis_request(
        &state.config,
        payload.prompt,
        DEFAULT_VIDEO_PROMPT,
        payload.system_message,
        payload.model,
    );
    let video = payload.video;

    let response = run_blocking(move || -> Result<AnalysisResponse, ApiError> {
        let video = decode_data_uri(&video)
            .map_err(|error| ApiError::BadRequest(error.to_string()))?;

        log::info!(
            "model={}, interval={interval_seconds}s, mode={mode}, system message: {}, video: {} bytes",
            request.model,
            if request.system_instruction().is_some() { "yes" } else { "no" },
            video.bytes.len(),
        );

        analyze_video(&state, &video.bytes, interval_seconds, mode, &request)
            .map_err(|error| ApiError::Internal(format!("Failed to store video: {error}")))
    })
    .await??;

    Ok(Json(response))
}

async fn analyze_frame(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<AnalysisResponse>, ApiError> {
    let Json(body) = body?;
    let frame_number = frame_number(&body);
    log::info!("Processing live frame #{frame_number}");

    let payload: AnalyzeFrameRequest =
        serde_json::from_value(body).map_err(|error| ApiError::BadFrame {
            message: format!("Invalid frame request: {error}"),
            frame_number: frame_number.clone(),
        })?;
    let request = analysis_request(
        &state.config,
        payload.prompt,
        DEFAULT_FRAME_PROMPT,
        payload.system_message,
        payload.model,
    );
    let frame = payload.frame;

    let outcome = run_blocking(move || -> Result<String, FramelensError> {
        let decoded = decode_data_uri(&frame)?;
        let upload = state
            .store
            .persist_frame(&decoded.bytes, decoded.mime_type.as_deref())?;
        let reference = FrameReference::new(0, upload.path());
        state.analyzer.analyze_one(&reference, &request)
    })
    .await?;

    let response = match outcome {
        Ok(text) => AnalysisResponse::success(AnalysisResult::Text(text)),
        Err(error) => {
            log::warn!("Live frame analysis failed: {error}");
            AnalysisResponse::failure(error.to_string(), Some(error.kind()))
        }
    };
    Ok(Json(response.with_frame_number(frame_number)))
}

fn analysis_request(
    config: &ServiceConfig,
    prompt: Option<String>,
    default_prompt: &str,
    system_message: Option<String>,
    model: Option<String>,
) -> AnalysisRequest {
    AnalysisRequest {
        prompt: prompt.unwrap_or_else(|| default_prompt.to_string()),
        system_message,
        model: model
            .filter(|model| !model.trim().is_empty())
            .unwrap_or_else(|| config.default_model.clone()),
    }
}

/// Persist, extract and analyse one video. Only a storage failure is an
/// `Err`; every other outcome is reported in the response body.
fn analyze_video(
    state: &AppState,
    video: &[u8],
    interval_seconds: u64,
    mode: AnalysisMode,
    request: &AnalysisRequest,
) -> Result<AnalysisResponse, FramelensError> {
    let upload = state.store.persist_video(video)?;
    log::info!("Saved video to {}", upload.path().display());

    let extracted = match state.extractor.extract(upload.path(), interval_seconds) {
        Ok(extracted) if !extracted.is_empty() => extracted,
        Ok(_) => {
            log::warn!("No frames could be read from the video");
            return Ok(AnalysisResponse::failure(EXTRACTION_FAILED.to_string(), None));
        }
        Err(error) => {
            log::warn!("Frame extraction failed: {error}");
            return Ok(AnalysisResponse::failure(EXTRACTION_FAILED.to_string(), None));
        }
    };
    log::info!("Extracted {} frame(s) from video", extracted.len());

    let response = match mode {
        AnalysisMode::Batch => {
            match state.analyzer.analyze_batch(extracted.frames(), request) {
                Ok(text) => AnalysisResponse::success(AnalysisResult::Text(text)),
                Err(error) => analysis_failed(&error),
            }
        }
        AnalysisMode::Sequential => {
            let outcomes = state.analyzer.analyze_sequential(extracted.frames(), request);
            sequential_response(outcomes)
        }
    };
    Ok(response)
}

fn sequential_response(outcomes: Vec<Result<String, FramelensError>>) -> AnalysisResponse {
    let failed_frames: Vec<usize> = outcomes
        .iter()
        .enumerate()
        .filter_map(|(index, outcome)| outcome.is_err().then_some(index))
        .collect();

    if failed_frames.len() == outcomes.len() {
        if let Some(Err(error)) = outcomes.first() {
            return analysis_failed(error);
        }
    }

    log::info!(
        "Sequential analysis complete: {} frame(s), {} failed",
        outcomes.len(),
        failed_frames.len()
    );

    let results = outcomes
        .into_iter()
        .map(|outcome| match outcome {
            Ok(text) => text,
            Err(error) => format!("Error analyzing frame: {error}"),
        })
        .collect();

    let mut response = AnalysisResponse::success(AnalysisResult::PerFrame(results));
    response.failed_frames = Some(failed_frames);
    response
}

fn analysis_failed(error: &FramelensError) -> AnalysisResponse {
    log::warn!("Frame analysis failed: {error}");
    AnalysisResponse::failure(
        format!("Error analyzing frames: {error}"),
        Some(error.kind()),
    )
}

async fn run_blocking<T, F>(task: F) -> Result<T, ApiError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|error| ApiError::Internal(format!("Background task failed: {error}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_interval_accepts_numbers_and_numeric_strings() {
        assert_eq!(FrameInterval::Number(2.0).seconds().unwrap(), 2);
        assert_eq!(FrameInterval::Number(2.9).seconds().unwrap(), 2);
        assert_eq!(FrameInterval::Text(" 3 ".to_string()).seconds().unwrap(), 3);
        assert!(FrameInterval::Text("soon".to_string()).seconds().is_err());
        assert!(FrameInterval::Number(-1.0).seconds().is_err());
    }

    #[test]
    fn frame_number_is_read_from_the_raw_body() {
        assert_eq!(frame_number(&serde_json::json!({ "frameNumber": 7 })), 7);
        assert_eq!(frame_number(&serde_json::json!({ "frame": "x" })), 0);
        assert_eq!(frame_number(&serde_json::json!(["not", "an", "object"])), 0);
    }

    #[test]
    fn sequential_marks_failed_positions() {
        let response = sequential_response(vec![
            Ok("a cat".to_string()),
            Err(FramelensError::EmptyCompletion),
            Ok("a dog".to_string()),
        ]);

        assert!(response.success);
        assert_eq!(response.failed_frames, Some(vec![1]));
        let Some(AnalysisResult::PerFrame(results)) = response.result else {
            panic!("expected per-frame results");
        };
        assert_eq!(results[0], "a cat");
        assert!(results[1].starts_with("Error analyzing frame: "));
        assert_eq!(results[2], "a dog");
    }

    #[test]
    fn sequential_all_failed_is_a_failure() {
        let response = sequential_response(vec![
            Err(FramelensError::EmptyCompletion),
            Err(FramelensError::EmptyCompletion),
        ]);

        assert!(!response.success);
        assert_eq!(response.error_kind, Some("completion"));
        assert!(
            response
                .error
                .unwrap()
                .starts_with("Error analyzing frames: ")
        );
    }
}
