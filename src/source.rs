//! Opening video files and walking their frames.
//!
//! [`VideoSource`] wraps an FFmpeg demuxer positioned on the best video
//! stream of a file. [`SampledFrames`] decodes that stream from start to end
//! in decode order and yields only the frames picked by a
//! [`FrameSampler`], converted to RGB images.

use std::{
    fmt::{Debug, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
    time::Duration,
};

use ffmpeg_next::{
    Error as FfmpegError, Packet,
    codec::context::Context as CodecContext,
    decoder::Video as VideoDecoder,
    format::{Pixel, context::Input},
    frame::Video as VideoFrame,
    media::Type,
    software::scaling::{Context as ScalingContext, Flags as ScalingFlags},
};
use image::{DynamicImage, RgbImage};

use crate::{error::FramelensError, metadata::VideoMetadata, sampling::FrameSampler};

/// Consecutive demuxer read failures tolerated before the stream is treated
/// as finished.
const MAX_CONSECUTIVE_READ_ERRORS: u32 = 64;

/// An opened video file.
///
/// # Example
///
/// ```no_run
/// use framelens::{FrameSampler, VideoSource};
///
/// let mut source = VideoSource::open("recording.webm")?;
/// let stride = source.metadata().sampling_stride(2);
/// for sample in source.sampled_frames(FrameSampler::new(stride))? {
///     let (position, image) = sample?;
///     image.save(format!("frame_at_{position}.png"))?;
/// }
/// # Ok::<(), framelens::FramelensError>(())
/// ```
pub struct VideoSource {
    input_context: Input,
    metadata: VideoMetadata,
    video_stream_index: usize,
    file_path: PathBuf,
}

impl Debug for VideoSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("VideoSource")
            .field("metadata", &self.metadata)
            .field("video_stream_index", &self.video_stream_index)
            .field("file_path", &self.file_path)
            .finish_non_exhaustive()
    }
}

impl VideoSource {
    /// Open a video file and read its stream metadata.
    ///
    /// # Errors
    ///
    /// - [`FramelensError::FileOpen`] if FFmpeg cannot open or probe the file.
    /// - [`FramelensError::NoVideoStream`] if the file has no video stream.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, FramelensError> {
        let file_path = path.as_ref().to_path_buf();

        log::debug!("Opening video file: {}", file_path.display());

        ffmpeg_next::init().map_err(|error| FramelensError::FileOpen {
            path: file_path.clone(),
            reason: format!("FFmpeg initialisation failed: {error}"),
        })?;

        let input_context =
            ffmpeg_next::format::input(&file_path).map_err(|error| FramelensError::FileOpen {
                path: file_path.clone(),
                reason: error.to_string(),
            })?;

        let stream = input_context
            .streams()
            .best(Type::Video)
            .ok_or(FramelensError::NoVideoStream)?;
        let video_stream_index = stream.index();

        let decoder_context =
            CodecContext::from_parameters(stream.parameters()).map_err(|error| {
                FramelensError::FileOpen {
                    path: file_path.clone(),
                    reason: format!("Failed to read video codec parameters: {error}"),
                }
            })?;
        let decoder = decoder_context
            .decoder()
            .video()
            .map_err(|error| FramelensError::FileOpen {
                path: file_path.clone(),
                reason: format!("Failed to create video decoder: {error}"),
            })?;

        let duration_microseconds = input_context.duration();
        let duration = if duration_microseconds > 0 {
            Duration::from_micros(duration_microseconds as u64)
        } else {
            Duration::ZERO
        };

        let average_rate = stream.avg_frame_rate();
        let frames_per_second = if average_rate.denominator() != 0 && average_rate.numerator() > 0
        {
            average_rate.numerator() as f64 / average_rate.denominator() as f64
        } else {
            let rate = stream.rate();
            if rate.denominator() != 0 && rate.numerator() > 0 {
                rate.numerator() as f64 / rate.denominator() as f64
            } else {
                0.0
            }
        };

        let declared_frames = stream.frames();
        let frame_count = if declared_frames > 0 {
            declared_frames as u64
        } else if frames_per_second > 0.0 {
            (duration.as_secs_f64() * frames_per_second) as u64
        } else {
            0
        };

        let codec = decoder
            .codec()
            .map(|codec| codec.name().to_string())
            .unwrap_or_else(|| "unknown".to_string());

        let metadata = VideoMetadata {
            width: decoder.width(),
            height: decoder.height(),
            frames_per_second,
            frame_count,
            duration,
            codec,
            format: input_context.format().name().to_string(),
        };

        log::info!(
            "Opened video file: {} (format={}, {}x{}, {:.2} fps, ~{} frames, {:.2}s)",
            file_path.display(),
            metadata.format,
            metadata.width,
            metadata.height,
            metadata.frames_per_second,
            metadata.frame_count,
            metadata.duration.as_secs_f64(),
        );

        Ok(Self {
            input_context,
            metadata,
            video_stream_index,
            file_path,
        })
    }

    /// Cached metadata for the video stream.
    pub fn metadata(&self) -> &VideoMetadata {
        &self.metadata
    }

    /// Path the source was opened from.
    pub fn path(&self) -> &Path {
        &self.file_path
    }

    /// Decode the whole stream, yielding every frame.
    ///
    /// # Errors
    ///
    /// See [`sampled_frames`](VideoSource::sampled_frames).
    pub fn decoded_frames(&mut self) -> Result<SampledFrames<'_>, FramelensError> {
        self.sampled_frames(FrameSampler::new(1))
    }

    /// Decode the whole stream, yielding the frames `sampler` selects.
    ///
    /// Frames are decoded strictly in order from the start of the stream;
    /// the position passed to the sampler counts every decoded frame, so
    /// the yielded positions increase monotonically.
    ///
    /// # Errors
    ///
    /// Returns [`FramelensError::NoVideoStream`] or an FFmpeg error if the
    /// decoder cannot be created.
    pub fn sampled_frames(
        &mut self,
        sampler: FrameSampler,
    ) -> Result<SampledFrames<'_>, FramelensError> {
        let stream = self
            .input_context
            .stream(self.video_stream_index)
            .ok_or(FramelensError::NoVideoStream)?;
        let decoder_context = CodecContext::from_parameters(stream.parameters())?;
        let decoder = decoder_context.decoder().video()?;

        Ok(SampledFrames {
            input_context: &mut self.input_context,
            decoder,
            converter: None,
            video_stream_index: self.video_stream_index,
            sampler,
            position: 0,
            decoded_frame: VideoFrame::empty(),
            rgb_frame: VideoFrame::empty(),
            eof_sent: false,
            done: false,
        })
    }
}

/// RGB24 converter for one source pixel format and size.
struct FrameConverter {
    scaler: ScalingContext,
    format: Pixel,
    width: u32,
    height: u32,
}

impl FrameConverter {
    fn new(format: Pixel, width: u32, height: u32) -> Result<Self, FramelensError> {
        let scaler = ScalingContext::get(
            format,
            width,
            height,
            Pixel::RGB24,
            width,
            height,
            ScalingFlags::BILINEAR,
        )?;
        Ok(Self {
            scaler,
            format,
            width,
            height,
        })
    }

    fn matches(&self, format: Pixel, width: u32, height: u32) -> bool {
        self.format == format && self.width == width && self.height == height
    }
}

/// A lazy iterator over the sampled frames of a [`VideoSource`].
///
/// Yields `(position, image)` pairs where `position` is the zero-based index
/// of the frame among all decoded frames. Created via
/// [`VideoSource::sampled_frames`].
pub struct SampledFrames<'a> {
    input_context: &'a mut Input,
    decoder: VideoDecoder,
    converter: Option<FrameConverter>,
    video_stream_index: usize,
    sampler: FrameSampler,
    position: u64,
    decoded_frame: VideoFrame,
    rgb_frame: VideoFrame,
    eof_sent: bool,
    done: bool,
}

impl SampledFrames<'_> {
    /// Number of frames decoded so far, sampled or not.
    pub fn decoded_count(&self) -> u64 {
        self.position
    }

    /// Convert the current decoded frame to an RGB image.
    ///
    /// The converter is rebuilt whenever the stream changes pixel format or
    /// resolution mid-way, which browser recorders occasionally do.
    fn convert_current_frame(&mut self) -> Result<DynamicImage, FramelensError> {
        let format = self.decoded_frame.format();
        let width = self.decoded_frame.width();
        let height = self.decoded_frame.height();

        if self
            .converter
            .as_ref()
            .is_none_or(|converter| !converter.matches(format, width, height))
        {
            self.converter = Some(FrameConverter::new(format, width, height)?);
        }
        let Some(converter) = self.converter.as_mut() else {
            return Err(FramelensError::VideoDecodeError(
                "pixel format converter unavailable".to_string(),
            ));
        };

        converter
            .scaler
            .run(&self.decoded_frame, &mut self.rgb_frame)?;

        let buffer = frame_to_rgb_buffer(&self.rgb_frame, width, height);
        let image = RgbImage::from_raw(width, height, buffer).ok_or_else(|| {
            FramelensError::VideoDecodeError(
                "Failed to construct RGB image from decoded frame data".to_string(),
            )
        })?;
        Ok(DynamicImage::ImageRgb8(image))
    }
}

impl Iterator for SampledFrames<'_> {
    type Item = Result<(u64, DynamicImage), FramelensError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let mut read_errors = 0;

        loop {
            if self.decoder.receive_frame(&mut self.decoded_frame).is_ok() {
                let position = self.position;
                self.position += 1;

                if !self.sampler.offer(position) {
                    continue;
                }

                return match self.convert_current_frame() {
                    Ok(image) => Some(Ok((position, image))),
                    Err(error) => {
                        self.done = true;
                        Some(Err(error))
                    }
                };
            }

            if self.eof_sent {
                self.done = true;
                return None;
            }

            let mut packet = Packet::empty();
            match packet.read(self.input_context) {
                Ok(()) => {
                    read_errors = 0;
                    if packet.stream() != self.video_stream_index {
                        continue;
                    }
                    if let Err(error) = self.decoder.send_packet(&packet) {
                        // Damaged packets are skipped rather than ending the walk.
                        log::warn!("Skipping undecodable packet: {error}");
                    }
                }
                Err(FfmpegError::Eof) => {
                    if let Err(error) = self.decoder.send_eof() {
                        self.done = true;
                        return Some(Err(FramelensError::from(error)));
                    }
                    self.eof_sent = true;
                }
                Err(error) => {
                    read_errors += 1;
                    log::debug!("Demuxer read error ({read_errors}): {error}");
                    if read_errors >= MAX_CONSECUTIVE_READ_ERRORS {
                        log::warn!("Giving up on stream after {read_errors} read errors");
                        if self.decoder.send_eof().is_err() {
                            self.done = true;
                            return None;
                        }
                        self.eof_sent = true;
                    }
                }
            }
        }
    }
}

/// Copy an RGB24 frame into a tightly packed buffer, dropping row padding.
fn frame_to_rgb_buffer(video_frame: &VideoFrame, width: u32, height: u32) -> Vec<u8> {
    let stride = video_frame.stride(0);
    let row_bytes = (width as usize) * 3;
    let data = video_frame.data(0);

    if stride == row_bytes {
        data[..row_bytes * (height as usize)].to_vec()
    } else {
        let mut buffer = Vec::with_capacity(row_bytes * (height as usize));
        for row in 0..(height as usize) {
            let row_start = row * stride;
            buffer.extend_from_slice(&data[row_start..row_start + row_bytes]);
        }
        buffer
    }
}
