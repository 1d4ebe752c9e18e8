//! Image encoding tests.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use framelens::{FrameReference, FramelensError, decode_data_uri, encode_image, image_data_uri};

#[test]
fn encoding_preserves_bytes() {
    let directory = tempfile::tempdir().unwrap();
    let path = directory.path().join("frame_0.jpg");
    let bytes: Vec<u8> = (0..=255u8).cycle().take(4099).collect();
    std::fs::write(&path, &bytes).unwrap();

    let encoded = encode_image(&path).unwrap();

    assert_eq!(STANDARD.decode(&encoded).unwrap(), bytes);
    assert_eq!(decode_data_uri(&encoded).unwrap().bytes, bytes);
}

#[test]
fn data_uri_carries_mime_type_and_round_trips() {
    let directory = tempfile::tempdir().unwrap();
    let path = directory.path().join("still.png");
    std::fs::write(&path, b"\x89PNG not really").unwrap();

    let uri = image_data_uri(&FrameReference::new(0, &path)).unwrap();
    assert!(uri.starts_with("data:image/png;base64,"));

    let decoded = decode_data_uri(&uri).unwrap();
    assert_eq!(decoded.mime_type.as_deref(), Some("image/png"));
    assert_eq!(decoded.bytes, b"\x89PNG not really");
}

#[test]
fn decode_strips_video_prefix() {
    let payload = format!("data:video/webm;base64,{}", STANDARD.encode(b"webm!"));
    let decoded = decode_data_uri(&payload).unwrap();
    assert_eq!(decoded.mime_type.as_deref(), Some("video/webm"));
    assert_eq!(decoded.bytes, b"webm!");
}

#[test]
fn decode_rejects_invalid_base64() {
    let error = decode_data_uri("data:image/jpeg;base64,not*base64").unwrap_err();
    assert!(matches!(error, FramelensError::InvalidPayload(_)));
    assert_eq!(error.kind(), "payload");
}

#[test]
fn missing_file_fails_to_encode() {
    let directory = tempfile::tempdir().unwrap();
    let error = encode_image(directory.path().join("gone.jpg")).unwrap_err();
    assert!(matches!(error, FramelensError::IoError(_)));
}
