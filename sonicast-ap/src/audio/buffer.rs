//! Packet assembly buffer
//!
//! Decoding produces samples in large, irregular chunks while the encoder
//! needs exact fixed-size packets. [`PlaybackBuffer`] sits between the two:
//! a growable FIFO of f32 samples with an exact-count read.
//!
//! # Examples
//!
//! ```ignore
//! let mut buffer = PlaybackBuffer::new();
//! buffer.write_slice(&decoded);
//! let mut packet = [0.0f32; 480];
//! while buffer.len() >= packet.len() {
//!     buffer.read_to(&mut packet, 480)?;
//! }
//! ```

use crate::error::{Error, Result};
use std::collections::VecDeque;

/// FIFO of single-precision samples (no size limit)
#[derive(Debug, Default, Clone)]
pub struct PlaybackBuffer {
    samples: VecDeque<f32>,
}

impl PlaybackBuffer {
    /// Create an empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty buffer with room for `capacity` samples
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
        }
    }

    /// Append one sample
    pub fn write(&mut self, sample: f32) {
        self.samples.push_back(sample);
    }

    /// Append a run of samples
    pub fn write_slice(&mut self, samples: &[f32]) {
        self.samples.extend(samples.iter().copied());
    }

    /// Number of buffered samples
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the buffer holds no samples
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Drain exactly `count` samples into `dest[..count]`.
    ///
    /// # Errors
    /// `InvalidArgument` when fewer than `count` samples are buffered or
    /// `dest` cannot hold `count` samples. Nothing is consumed on error.
    pub fn read_to(&mut self, dest: &mut [f32], count: usize) -> Result<()> {
        if count > self.samples.len() {
            return Err(Error::InvalidArgument(format!(
                "read of {} samples from buffer holding {}",
                count,
                self.samples.len()
            )));
        }
        if count > dest.len() {
            return Err(Error::InvalidArgument(format!(
                "destination holds {} samples, {} requested",
                dest.len(),
                count
            )));
        }

        for (dst, sample) in dest.iter_mut().zip(self.samples.drain(..count)) {
            *dst = sample;
        }
        Ok(())
    }

    /// Discard all buffered samples
    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// Discard all samples and release the backing allocation
    pub fn release(&mut self) {
        self.samples = VecDeque::new();
    }
}

// ========================================
// Tests
// ========================================
