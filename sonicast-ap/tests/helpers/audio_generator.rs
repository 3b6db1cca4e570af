//! Audio Test File Generation Utilities
//!
//! Generates small deterministic WAV files for catalog and playback tests.
//! Constant-valued clips make it possible to tell from a transmitted packet
//! which clip it came from.

use hound::{SampleFormat, WavSpec, WavWriter};
use std::f32::consts::PI;
use std::path::Path;

/// Sample rate every valid test asset uses
pub const TEST_SAMPLE_RATE: u32 = 48_000;

/// Write interleaved 16-bit samples as a WAV file
pub fn write_wav<P: AsRef<Path>>(
    path: P,
    channels: u16,
    sample_rate: u32,
    samples: &[i16],
) -> Result<(), hound::Error> {
    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec)?;
    for &sample in samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()
}

/// Mono 48 kHz clip holding `frames` copies of `value`
pub fn generate_constant_wav<P: AsRef<Path>>(path: P, frames: usize, value: i16) -> Result<(), hound::Error> {
    write_wav(path, 1, TEST_SAMPLE_RATE, &vec![value; frames])
}

/// Mono 48 kHz sine tone
pub fn generate_tone_wav<P: AsRef<Path>>(
    path: P,
    duration_ms: u64,
    frequency_hz: f32,
    amplitude: f32,
) -> Result<(), hound::Error> {
    let frames = (TEST_SAMPLE_RATE as u64 * duration_ms / 1000) as usize;
    let peak = amplitude.clamp(0.0, 1.0) * i16::MAX as f32;
    let samples: Vec<i16> = (0..frames)
        .map(|i| {
            let t = i as f32 / TEST_SAMPLE_RATE as f32;
            ((2.0 * PI * frequency_hz * t).sin() * peak) as i16
        })
        .collect();
    write_wav(path, 1, TEST_SAMPLE_RATE, &samples)
}

/// Stereo clip at the right rate (fails the channel check)
pub fn generate_stereo_wav<P: AsRef<Path>>(path: P, frames: usize) -> Result<(), hound::Error> {
    write_wav(path, 2, TEST_SAMPLE_RATE, &vec![1000i16; frames * 2])
}

/// Mono clip at 44.1 kHz (fails the sample-rate check)
pub fn generate_wrong_rate_wav<P: AsRef<Path>>(path: P, frames: usize) -> Result<(), hound::Error> {
    write_wav(path, 1, 44_100, &vec![1000i16; frames])
}

/// Mono 48 kHz clip with no samples at all
pub fn generate_empty_wav<P: AsRef<Path>>(path: P) -> Result<(), hound::Error> {
    write_wav(path, 1, TEST_SAMPLE_RATE, &[])
}
