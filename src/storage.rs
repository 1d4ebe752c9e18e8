//! Persistence of uploaded payloads.
//!
//! Inbound videos and live frames are written under a storage root with
//! random file names so concurrent requests never collide. Each write hands
//! back a [`StoredUpload`] guard; the file is removed when the guard drops.

use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::error::FramelensError;

/// A directory that receives uploaded payloads.
#[derive(Debug, Clone)]
pub struct UploadStore {
    root: PathBuf,
}

impl UploadStore {
    /// Use `root` as the storage root, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns [`FramelensError::IoError`] if the directory cannot be created.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, FramelensError> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        log::debug!("Upload directory ready: {}", root.display());
        Ok(Self { root })
    }

    /// The storage root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write a recorded video as `<uuid>.webm`.
    ///
    /// # Errors
    ///
    /// Returns [`FramelensError::IoError`] if the file cannot be written.
    pub fn persist_video(&self, bytes: &[u8]) -> Result<StoredUpload, FramelensError> {
        let file_name = format!("{}.webm", Uuid::new_v4());
        self.write(file_name, bytes)
    }

    /// Write a live frame as `realtime_frame_<uuid>.<ext>`, the extension
    /// following `mime_type` (JPEG when unknown).
    ///
    /// # Errors
    ///
    /// Returns [`FramelensError::IoError`] if the file cannot be written.
    pub fn persist_frame(
        &self,
        bytes: &[u8],
        mime_type: Option<&str>,
    ) -> Result<StoredUpload, FramelensError> {
        let file_name = format!(
            "realtime_frame_{}.{}",
            Uuid::new_v4(),
            extension_for(mime_type)
        );
        self.write(file_name, bytes)
    }

    fn write(&self, file_name: String, bytes: &[u8]) -> Result<StoredUpload, FramelensError> {
        let path = self.root.join(file_name);
        std::fs::write(&path, bytes)?;
        log::debug!("Stored {} bytes at {}", bytes.len(), path.display());
        Ok(StoredUpload { path })
    }
}

/// A persisted upload, deleted from disk when dropped.
#[derive(Debug)]
pub struct StoredUpload {
    path: PathBuf,
}

impl StoredUpload {
    /// Location of the stored file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StoredUpload {
    fn drop(&mut self) {
        if let Err(error) = std::fs::remove_file(&self.path) {
            log::warn!("Failed to remove {}: {error}", self.path.display());
        }
    }
}

fn extension_for(mime_type: Option<&str>) -> &'static str {
    match mime_type.map(|mime| mime.trim().to_ascii_lowercase()).as_deref() {
        Some("image/png") => "png",
        Some("image/webp") => "webp",
        Some("image/gif") => "gif",
        Some("image/bmp") => "bmp",
        _ => "jpg",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uploads_are_removed_on_drop() {
        let root = tempfile::tempdir().unwrap();
        let store = UploadStore::new(root.path().join("uploads")).unwrap();

        let video = store.persist_video(b"webm bytes").unwrap();
        let frame = store.persist_frame(b"png bytes", Some("image/png")).unwrap();

        let video_path = video.path().to_path_buf();
        let frame_path = frame.path().to_path_buf();
        assert_eq!(std::fs::read(&video_path).unwrap(), b"webm bytes");
        assert_eq!(video_path.extension().unwrap(), "webm");
        assert!(
            frame_path
                .file_name()
                .unwrap()
                .to_string_lossy()
                .starts_with("realtime_frame_")
        );
        assert_eq!(frame_path.extension().unwrap(), "png");

        drop(video);
        drop(frame);
        assert!(!video_path.exists());
        assert!(!frame_path.exists());
    }

    #[test]
    fn unknown_mime_defaults_to_jpeg() {
        assert_eq!(extension_for(None), "jpg");
        assert_eq!(extension_for(Some("image/jpeg")), "jpg");
        assert_eq!(extension_for(Some("IMAGE/PNG")), "png");
    }
}
