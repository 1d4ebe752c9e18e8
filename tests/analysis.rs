//! Frame analysis orchestration tests.
//!
//! All tests run against a recording mock backend; no network access.

mod common;

use std::sync::{Arc, Mutex};

use common::{RecordingBackend, write_frames};
use framelens::{
    AnalysisRequest, BATCH_MAX_TOKENS, ChatMessage, ContentPart, FRAME_MAX_TOKENS,
    FrameAnalyzer, FrameReference, FramelensError, OperationType, ProgressCallback,
    ProgressInfo, image_data_uri,
};

fn analyzer(backend: &Arc<RecordingBackend>) -> FrameAnalyzer {
    FrameAnalyzer::new(backend.clone())
}

fn image_urls(message: &ChatMessage) -> Vec<String> {
    match message {
        ChatMessage::User { content } => content
            .iter()
            .filter_map(|part| match part {
                ContentPart::ImageUrl { image_url } => Some(image_url.url.clone()),
                ContentPart::Text { .. } => None,
            })
            .collect(),
        ChatMessage::System { .. } => Vec::new(),
    }
}

// ── Batch ──────────────────────────────────────────────────────────

#[test]
fn batch_sends_one_request_with_every_frame_in_order() {
    let (_directory, frames) = write_frames(3);
    let backend = Arc::new(RecordingBackend::answering("three frames of colour"));

    let result = analyzer(&backend)
        .analyze_batch(&frames, &AnalysisRequest::new("What changes?"))
        .unwrap();

    assert_eq!(result, "three frames of colour");

    let requests = backend.requests();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.max_tokens, BATCH_MAX_TOKENS);
    assert_eq!(request.model, "gpt-4o");
    assert_eq!(request.messages.len(), 1);

    let ChatMessage::User { content } = &request.messages[0] else {
        panic!("expected a user turn");
    };
    assert_eq!(content[0], ContentPart::text("What changes?"));

    let expected: Vec<String> = frames.iter().map(|f| image_data_uri(f).unwrap()).collect();
    assert_eq!(image_urls(&request.messages[0]), expected);
}

#[test]
fn batch_aborts_without_calling_when_a_frame_is_unreadable() {
    let (directory, mut frames) = write_frames(2);
    frames.push(FrameReference::new(2, directory.path().join("missing.jpg")));
    let backend = Arc::new(RecordingBackend::answering("unused"));

    let error = analyzer(&backend)
        .analyze_batch(&frames, &AnalysisRequest::new("Describe"))
        .unwrap_err();

    assert!(matches!(error, FramelensError::IoError(_)));
    assert!(backend.requests().is_empty());
}

#[test]
fn batch_propagates_backend_failure() {
    let (_directory, frames) = write_frames(2);
    let backend = Arc::new(RecordingBackend::scripted(
        vec![Err(FramelensError::CompletionApi {
            status: 401,
            message: "Incorrect API key provided".to_string(),
        })],
        "unused",
    ));

    let error = analyzer(&backend)
        .analyze_batch(&frames, &AnalysisRequest::new("Describe"))
        .unwrap_err();

    assert_eq!(error.kind(), "completion");
    assert!(error.to_string().contains("Incorrect API key"));
}

#[test]
fn batch_with_no_frames_is_an_error() {
    let backend = Arc::new(RecordingBackend::answering("unused"));
    let error = analyzer(&backend)
        .analyze_batch(&[], &AnalysisRequest::new("Describe"))
        .unwrap_err();
    assert!(matches!(error, FramelensError::NoFramesExtracted));
    assert!(backend.requests().is_empty());
}

// ── Sequential ─────────────────────────────────────────────────────

#[test]
fn sequential_returns_one_answer_per_frame_in_order() {
    let (_directory, frames) = write_frames(3);
    let backend = Arc::new(RecordingBackend::scripted(
        vec![
            Ok("first".to_string()),
            Ok("second".to_string()),
            Ok("third".to_string()),
        ],
        "unused",
    ));

    let outcomes = analyzer(&backend)
        .analyze_sequential(&frames, &AnalysisRequest::new("Describe").with_model("gpt-4o-mini"));

    let texts: Vec<String> = outcomes.into_iter().map(Result::unwrap).collect();
    assert_eq!(texts, ["first", "second", "third"]);

    let requests = backend.requests();
    assert_eq!(requests.len(), 3);
    for (request, frame) in requests.iter().zip(&frames) {
        assert_eq!(request.max_tokens, FRAME_MAX_TOKENS);
        assert_eq!(request.model, "gpt-4o-mini");
        assert_eq!(
            image_urls(request.messages.last().unwrap()),
            vec![image_data_uri(frame).unwrap()]
        );
    }
}

#[test]
fn sequential_isolates_a_failing_frame() {
    let (_directory, frames) = write_frames(3);
    let backend = Arc::new(RecordingBackend::scripted(
        vec![
            Ok("first".to_string()),
            Err(FramelensError::CompletionTransport("connection reset".to_string())),
            Ok("third".to_string()),
        ],
        "unused",
    ));

    let outcomes = analyzer(&backend).analyze_sequential(&frames, &AnalysisRequest::new("Describe"));

    assert_eq!(outcomes.len(), 3);
    assert_eq!(outcomes[0].as_deref().unwrap(), "first");
    assert!(matches!(
        outcomes[1],
        Err(FramelensError::CompletionTransport(_))
    ));
    assert_eq!(outcomes[2].as_deref().unwrap(), "third");
    assert_eq!(backend.requests().len(), 3);
}

#[test]
fn sequential_reports_progress_per_frame() {
    #[derive(Default)]
    struct Recorder(Mutex<Vec<(OperationType, u64, Option<u64>)>>);

    impl ProgressCallback for Recorder {
        fn on_progress(&self, info: &ProgressInfo) {
            self.0
                .lock()
                .unwrap()
                .push((info.operation, info.current, info.total));
        }
    }

    let (_directory, frames) = write_frames(3);
    let backend = Arc::new(RecordingBackend::answering("ok"));
    let recorder = Arc::new(Recorder::default());

    analyzer(&backend)
        .with_progress(recorder.clone())
        .analyze_sequential(&frames, &AnalysisRequest::new("Describe"));

    let reports = recorder.0.lock().unwrap();
    assert_eq!(
        *reports,
        vec![
            (OperationType::FrameAnalysis, 1, Some(3)),
            (OperationType::FrameAnalysis, 2, Some(3)),
            (OperationType::FrameAnalysis, 3, Some(3)),
        ]
    );
}

// ── System instruction ─────────────────────────────────────────────

#[test]
fn whitespace_system_message_is_omitted() {
    let (_directory, frames) = write_frames(1);
    let backend = Arc::new(RecordingBackend::answering("ok"));

    for system in ["", "   ", "\n\t"] {
        analyzer(&backend)
            .analyze_one(
                &frames[0],
                &AnalysisRequest::new("Describe").with_system_message(system),
            )
            .unwrap();
    }

    for request in backend.requests() {
        assert_eq!(request.messages.len(), 1);
        assert!(matches!(request.messages[0], ChatMessage::User { .. }));
    }
}

#[test]
fn system_message_is_the_first_turn_verbatim() {
    let (_directory, frames) = write_frames(2);
    let backend = Arc::new(RecordingBackend::answering("ok"));
    let request = AnalysisRequest::new("Describe").with_system_message("You are a narrator.");

    analyzer(&backend).analyze_batch(&frames, &request).unwrap();

    let sent = &backend.requests()[0];
    assert_eq!(sent.messages.len(), 2);
    assert_eq!(
        sent.messages[0],
        ChatMessage::System {
            content: "You are a narrator.".to_string()
        }
    );
}

// ── Single frame ───────────────────────────────────────────────────

#[test]
fn single_frame_sends_one_image() {
    let (_directory, frames) = write_frames(1);
    let backend = Arc::new(RecordingBackend::answering("a teal square"));

    let result = analyzer(&backend)
        .analyze_one(&frames[0], &AnalysisRequest::new("What is in this image?"))
        .unwrap();

    assert_eq!(result, "a teal square");
    let requests = backend.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].max_tokens, FRAME_MAX_TOKENS);
    assert_eq!(requests[0].image_count(), 1);
}

#[test]
fn single_frame_failure_is_tagged() {
    let (_directory, frames) = write_frames(1);
    let backend = Arc::new(RecordingBackend::scripted(
        vec![Err(FramelensError::EmptyCompletion)],
        "unused",
    ));

    let error = analyzer(&backend)
        .analyze_one(&frames[0], &AnalysisRequest::new("Describe"))
        .unwrap_err();
    assert!(matches!(error, FramelensError::EmptyCompletion));
}
