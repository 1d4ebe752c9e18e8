//! Frame extraction.
//!
//! [`FrameExtractor`] samples one frame per interval out of a video, writes
//! each sample as a JPEG into a fresh temporary directory, and returns the
//! ordered [`FrameReference`]s wrapped in [`ExtractedFrames`]. The temporary
//! directory lives exactly as long as the `ExtractedFrames` value.

use std::{
    fs::File,
    io::BufWriter,
    path::{Path, PathBuf},
};

use image::{DynamicImage, codecs::jpeg::JpegEncoder};
use tempfile::TempDir;

use crate::{
    configuration::ExtractOptions,
    error::FramelensError,
    progress::{OperationType, ProgressTracker},
    sampling::{FrameSampler, expected_sample_count},
    source::VideoSource,
};

/// A still image on disk together with its position in extraction order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameReference {
    index: usize,
    path: PathBuf,
}

impl FrameReference {
    /// Refer to an existing image file.
    pub fn new(index: usize, path: impl Into<PathBuf>) -> Self {
        Self {
            index,
            path: path.into(),
        }
    }

    /// Zero-based position in extraction order.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Location of the image file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// MIME type implied by the file extension, defaulting to JPEG.
    pub fn mime_type(&self) -> &'static str {
        let extension = self
            .path
            .extension()
            .and_then(|extension| extension.to_str())
            .map(|extension| extension.to_ascii_lowercase());

        match extension.as_deref() {
            Some("png") => "image/png",
            Some("webp") => "image/webp",
            Some("gif") => "image/gif",
            Some("bmp") => "image/bmp",
            _ => "image/jpeg",
        }
    }
}

/// The frames sampled from one video.
///
/// Owns the temporary directory holding the frame files; dropping the value
/// deletes the directory and everything in it.
#[derive(Debug)]
pub struct ExtractedFrames {
    frames: Vec<FrameReference>,
    directory: TempDir,
    stride: u64,
    decoded_frames: u64,
}

impl ExtractedFrames {
    /// The sampled frames in extraction order.
    pub fn frames(&self) -> &[FrameReference] {
        &self.frames
    }

    /// Number of sampled frames.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// `true` if no frame could be read from the video.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Directory the frame files were written to.
    pub fn directory(&self) -> &Path {
        self.directory.path()
    }

    /// Source frames between consecutive samples.
    pub fn stride(&self) -> u64 {
        self.stride
    }

    /// Total frames decoded from the source.
    pub fn decoded_frames(&self) -> u64 {
        self.decoded_frames
    }
}

/// Samples frames from videos at a fixed time interval.
///
/// # Example
///
/// ```no_run
/// use framelens::{ExtractOptions, FrameExtractor};
///
/// let extractor = FrameExtractor::new(ExtractOptions::new().with_jpeg_quality(85));
/// let extracted = extractor.extract("recording.webm", 1)?;
/// for frame in extracted.frames() {
///     println!("#{} -> {}", frame.index(), frame.path().display());
/// }
/// # Ok::<(), framelens::FramelensError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct FrameExtractor {
    options: ExtractOptions,
}

impl FrameExtractor {
    /// Create an extractor with the given options.
    pub fn new(options: ExtractOptions) -> Self {
        Self { options }
    }

    /// Sample one frame every `interval_seconds` from the video at `path`.
    ///
    /// Every frame of the stream is decoded in order; a frame is kept when
    /// its zero-based position is a multiple of the stride
    /// `max(1, round(fps * interval_seconds))`. Kept frames are written as
    /// `frame_<n>.jpg`, `n` counting from zero in extraction order.
    ///
    /// A decode failure part-way through ends extraction early and keeps
    /// the frames already written. The result is empty when the stream
    /// yields no decodable frame at all.
    ///
    /// # Errors
    ///
    /// - [`FramelensError::FileOpen`] / [`FramelensError::NoVideoStream`] if
    ///   the video cannot be opened.
    /// - [`FramelensError::IoError`] / [`FramelensError::ImageError`] if the
    ///   temporary directory or a frame file cannot be written.
    /// - Any decode error raised before the first frame was produced.
    pub fn extract<P: AsRef<Path>>(
        &self,
        path: P,
        interval_seconds: u64,
    ) -> Result<ExtractedFrames, FramelensError> {
        let mut source = VideoSource::open(path)?;
        let metadata = source.metadata().clone();
        let stride = metadata.sampling_stride(interval_seconds);

        let directory = self.create_directory()?;
        log::debug!(
            "Created temporary directory for frames: {}",
            directory.path().display()
        );
        log::info!(
            "Sampling every {stride} frame(s) ({interval_seconds}s at {:.2} fps, ~{} frames total)",
            metadata.frames_per_second,
            metadata.frame_count,
        );

        let total = (metadata.frame_count > 0)
            .then(|| expected_sample_count(metadata.frame_count, stride));
        let mut tracker = ProgressTracker::new(
            self.options.progress.clone(),
            OperationType::FrameExtraction,
            total,
            self.options.batch_size,
        );

        let mut frames = Vec::with_capacity(total.unwrap_or(0) as usize);
        let mut samples = source.sampled_frames(FrameSampler::new(stride))?;

        for sample in samples.by_ref() {
            let (position, image) = match sample {
                Ok(sample) => sample,
                Err(error) if !frames.is_empty() => {
                    log::warn!(
                        "Stopping extraction after {} frame(s): {error}",
                        frames.len()
                    );
                    break;
                }
                Err(error) => return Err(error),
            };

            let index = frames.len();
            let frame_path = directory.path().join(format!("frame_{index}.jpg"));
            write_jpeg(&image, &frame_path, self.options.jpeg_quality)?;
            frames.push(FrameReference::new(index, frame_path));

            if frames.len() % 5 == 0 {
                log::debug!("Saved frame #{} at position {position}", frames.len());
            }
            tracker.advance(Some(index as u64));
        }

        let decoded_frames = samples.decoded_count();
        tracker.finish();

        log::info!(
            "Frame extraction complete: {} frame(s) from {decoded_frames} decoded",
            frames.len()
        );

        Ok(ExtractedFrames {
            frames,
            directory,
            stride,
            decoded_frames,
        })
    }

    fn create_directory(&self) -> Result<TempDir, FramelensError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("framelens-frames-");
        let directory = match &self.options.scratch_dir {
            Some(root) => {
                std::fs::create_dir_all(root)?;
                builder.tempdir_in(root)?
            }
            None => builder.tempdir()?,
        };
        Ok(directory)
    }
}

/// Sample frames from `path` every `interval_seconds` with default options.
///
/// See [`FrameExtractor::extract`].
pub fn extract_frames<P: AsRef<Path>>(
    path: P,
    interval_seconds: u64,
) -> Result<ExtractedFrames, FramelensError> {
    FrameExtractor::default().extract(path, interval_seconds)
}

fn write_jpeg(image: &DynamicImage, path: &Path, quality: u8) -> Result<(), FramelensError> {
    let writer = BufWriter::new(File::create(path)?);
    image.write_with_encoder(JpegEncoder::new_with_quality(writer, quality))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::FrameReference;

    #[test]
    fn mime_type_follows_extension() {
        assert_eq!(FrameReference::new(0, "a/frame_0.jpg").mime_type(), "image/jpeg");
        assert_eq!(FrameReference::new(0, "a/frame.PNG").mime_type(), "image/png");
        assert_eq!(FrameReference::new(0, "a/frame.webp").mime_type(), "image/webp");
        assert_eq!(FrameReference::new(0, "a/frame").mime_type(), "image/jpeg");
    }
}
