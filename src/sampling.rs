//! Frame sampling arithmetic.
//!
//! A video is sampled by walking every decoded frame in order and keeping
//! the ones whose zero-based position is a multiple of the *stride*: the
//! number of source frames that make up one sampling interval.

/// Compute the sampling stride for a frame rate and interval.
///
/// The stride is `round(frames_per_second * interval_seconds)` clamped to a
/// minimum of 1, so an interval of zero (or an unknown frame rate) samples
/// every frame instead of dividing by zero.
///
/// # Example
///
/// ```
/// use framelens::sampling_stride;
///
/// assert_eq!(sampling_stride(30.0, 2), 60);
/// assert_eq!(sampling_stride(29.97, 1), 30);
/// assert_eq!(sampling_stride(30.0, 0), 1);
/// ```
pub fn sampling_stride(frames_per_second: f64, interval_seconds: u64) -> u64 {
    let raw = (frames_per_second * interval_seconds as f64).round();
    if raw.is_finite() && raw >= 1.0 {
        raw as u64
    } else {
        1
    }
}

/// Number of frames a stream of `total_frames` yields at `stride`.
///
/// Equal to `ceil(total_frames / stride)`; a zero stride is treated as 1.
pub fn expected_sample_count(total_frames: u64, stride: u64) -> u64 {
    total_frames.div_ceil(stride.max(1))
}

/// Decides which decoded frames become samples.
///
/// Positions are offered in decode order; the sampler keeps track of how
/// many frames it has selected so far.
#[derive(Debug, Clone)]
pub struct FrameSampler {
    stride: u64,
    selected: u64,
}

impl FrameSampler {
    /// Create a sampler. A zero stride is clamped to 1.
    pub fn new(stride: u64) -> Self {
        Self {
            stride: stride.max(1),
            selected: 0,
        }
    }

    /// The effective stride.
    pub fn stride(&self) -> u64 {
        self.stride
    }

    /// Number of positions selected so far.
    pub fn selected(&self) -> u64 {
        self.selected
    }

    /// Returns `true` if the frame at `position` is a sample point.
    pub fn offer(&mut self, position: u64) -> bool {
        let keep = position % self.stride == 0;
        if keep {
            self.selected += 1;
        }
        keep
    }
}
