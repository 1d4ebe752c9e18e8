//! Sampling arithmetic tests.

use framelens::{FrameSampler, expected_sample_count, sampling_stride};

fn sample_positions(total_frames: u64, stride: u64) -> Vec<u64> {
    let mut sampler = FrameSampler::new(stride);
    (0..total_frames)
        .filter(|&position| sampler.offer(position))
        .collect()
}

#[test]
fn sample_count_is_ceiling_of_frames_over_stride() {
    for frames_per_second in [1.0, 12.5, 23.976, 24.0, 29.97, 30.0, 60.0] {
        for interval_seconds in 1..=4 {
            let stride = sampling_stride(frames_per_second, interval_seconds);
            for total_frames in [0, 1, 59, 60, 61, 299, 300, 1001] {
                let positions = sample_positions(total_frames, stride);
                assert_eq!(
                    positions.len() as u64,
                    expected_sample_count(total_frames, stride),
                    "fps={frames_per_second} interval={interval_seconds} frames={total_frames}"
                );
                assert_eq!(
                    positions.len() as u64,
                    total_frames.div_ceil(stride),
                );
            }
        }
    }
}

#[test]
fn samples_start_at_zero_and_increase_by_stride() {
    let positions = sample_positions(100, sampling_stride(30.0, 1));
    assert_eq!(positions, vec![0, 30, 60, 90]);
}

#[test]
fn zero_interval_samples_every_frame() {
    let stride = sampling_stride(30.0, 0);
    assert_eq!(stride, 1);
    assert_eq!(sample_positions(7, stride), (0..7).collect::<Vec<_>>());
    assert_eq!(expected_sample_count(7, stride), 7);
}

#[test]
fn zero_stride_is_treated_as_one() {
    assert_eq!(expected_sample_count(5, 0), 5);
    assert_eq!(sample_positions(5, 0).len(), 5);
}
