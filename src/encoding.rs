//! Base64 transport encoding for frame images.
//!
//! Outbound, a frame file becomes either a bare base64 string or a
//! `data:<mime>;base64,...` URI for embedding in a completion request.
//! Inbound, browser clients send frames as data URIs (or bare base64), which
//! [`decode_data_uri`] turns back into bytes.

use std::path::Path;

use base64::{Engine as _, engine::general_purpose::STANDARD};

use crate::{error::FramelensError, extraction::FrameReference};

/// Read an image file and return its bytes as standard padded base64.
///
/// # Errors
///
/// Returns [`FramelensError::IoError`] if the file cannot be read.
pub fn encode_image<P: AsRef<Path>>(path: P) -> Result<String, FramelensError> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)?;
    let encoded = STANDARD.encode(&bytes);
    log::debug!(
        "Encoded {} to base64 (~{:.1} KB)",
        path.display(),
        encoded.len() as f64 / 1024.0
    );
    Ok(encoded)
}

/// Build a `data:` URI for a frame, using the MIME type implied by its
/// file extension.
///
/// # Errors
///
/// Returns [`FramelensError::IoError`] if the frame file cannot be read.
pub fn image_data_uri(frame: &FrameReference) -> Result<String, FramelensError> {
    let encoded = encode_image(frame.path())?;
    Ok(format!("data:{};base64,{encoded}", frame.mime_type()))
}

/// A decoded inbound image payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUri {
    /// Declared MIME type, or `None` for bare base64.
    pub mime_type: Option<String>,
    /// Raw decoded bytes.
    pub bytes: Vec<u8>,
}

/// Decode a `data:<mime>;base64,<payload>` URI or a bare base64 string.
///
/// Surrounding whitespace is ignored.
///
/// # Errors
///
/// Returns [`FramelensError::InvalidPayload`] if the URI header is not a
/// base64 data URI or the payload is not valid base64.
///
/// # Example
///
/// ```
/// use framelens::decode_data_uri;
///
/// let decoded = decode_data_uri("data:image/png;base64,aGk=")?;
/// assert_eq!(decoded.mime_type.as_deref(), Some("image/png"));
/// assert_eq!(decoded.bytes, b"hi");
/// # Ok::<(), framelens::FramelensError>(())
/// ```
pub fn decode_data_uri(payload: &str) -> Result<DataUri, FramelensError> {
    let payload = payload.trim();

    let (mime_type, encoded) = match payload.strip_prefix("data:") {
        Some(rest) => {
            let (header, encoded) = rest.split_once(',').ok_or_else(|| {
                FramelensError::InvalidPayload("data URI has no ',' separator".to_string())
            })?;
            let mime_type = header.strip_suffix(";base64").ok_or_else(|| {
                FramelensError::InvalidPayload(format!(
                    "data URI is not base64 encoded: {header:?}"
                ))
            })?;
            let mime_type = (!mime_type.is_empty()).then(|| mime_type.to_string());
            (mime_type, encoded)
        }
        None => (None, payload),
    };

    if encoded.is_empty() {
        return Err(FramelensError::InvalidPayload(
            "image payload is empty".to_string(),
        ));
    }

    let bytes = STANDARD
        .decode(encoded)
        .map_err(|error| FramelensError::InvalidPayload(error.to_string()))?;

    Ok(DataUri { mime_type, bytes })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_base64_data_uri() {
        let error = decode_data_uri("data:text/plain,hello").unwrap_err();
        assert!(matches!(error, FramelensError::InvalidPayload(_)));
    }

    #[test]
    fn rejects_empty_payload() {
        assert!(decode_data_uri("data:image/jpeg;base64,").is_err());
        assert!(decode_data_uri("   ").is_err());
    }

    #[test]
    fn bare_base64_has_no_mime_type() {
        let decoded = decode_data_uri("aGVsbG8=").unwrap();
        assert_eq!(decoded.mime_type, None);
        assert_eq!(decoded.bytes, b"hello");
    }
}
