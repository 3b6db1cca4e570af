//! Decode session: the per-clip decode state machine
//!
//! One session exists per playing clip. The engine polls it once per tick;
//! a poll decodes until the sample queue holds more than one scratch buffer,
//! then yields. After end of stream the session keeps yielding until the
//! engine has drained the queue, then reports itself finished.

use crate::audio::{AudioAsset, ClipDecoder, PlaybackBuffer};
use crate::error::{Error, Result};
use ringbuf::{traits::*, HeapRb};
use std::sync::Arc;
use tracing::{debug, warn};

/// Producer of interleaved samples behind a session
pub trait SampleSource: Send {
    /// Fill `out`; zero means end of stream
    fn read(&mut self, out: &mut [f32]) -> Result<usize>;

    /// Make the next read return zero
    fn seek_to_end(&mut self);
}

impl SampleSource for ClipDecoder {
    fn read(&mut self, out: &mut [f32]) -> Result<usize> {
        ClipDecoder::read(self, out)
    }

    fn seek_to_end(&mut self) {
        ClipDecoder::seek_to_end(self);
    }
}

/// Fixed look-ahead added to every scratch buffer, in samples
pub const HEAD_SAMPLES: usize = 1920;

/// Scratch buffer size for a stream producing `nominal_rate` samples/s
pub fn scratch_len(nominal_rate: u32) -> usize {
    nominal_rate as usize / 5 + HEAD_SAMPLES
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Decoder still producing samples
    Streaming,
    /// Decoder exhausted; waiting for the queue to empty
    Draining,
}

/// Result of one poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollStatus {
    /// Yielded; poll again next tick
    Pending,
    /// Every sample was consumed; the session can be finalized
    Finished,
}

pub struct DecodeSession {
    clip: Arc<AudioAsset>,
    source: Box<dyn SampleSource>,
    scratch: Vec<f32>,
    /// Samples in `scratch` not yet moved to the queue
    scratch_fill: usize,
    queue: HeapRb<f32>,
    phase: Phase,
    ready: bool,
    halted: bool,
    nominal_rate: u32,
}

impl DecodeSession {
    /// Open a decoder for `clip` and size the buffers from its stream
    pub fn open(clip: Arc<AudioAsset>) -> Result<Self> {
        let decoder = ClipDecoder::open(&clip)?;
        let info = decoder.info();
        let nominal_rate = info.sample_rate * u32::from(info.channels);
        Self::from_source(clip, Box::new(decoder), nominal_rate)
    }

    /// Session over any sample source producing `nominal_rate` samples/s
    pub fn from_source(clip: Arc<AudioAsset>, source: Box<dyn SampleSource>, nominal_rate: u32) -> Result<Self> {
        if nominal_rate == 0 {
            return Err(Error::Decode(format!(
                "{}: stream reports no sample rate or channels",
                clip.id()
            )));
        }

        let scratch_len = scratch_len(nominal_rate);
        debug!(
            "Decode session for {}: nominal_rate={}, scratch={} samples",
            clip.id(),
            nominal_rate,
            scratch_len
        );

        Ok(Self {
            clip,
            source,
            scratch: vec![0.0; scratch_len],
            scratch_fill: 0,
            queue: HeapRb::new(scratch_len * 2),
            phase: Phase::Streaming,
            ready: false,
            halted: false,
            nominal_rate,
        })
    }

    pub fn clip(&self) -> &Arc<AudioAsset> {
        &self.clip
    }

    /// Samples per second across all channels
    pub fn nominal_rate(&self) -> u32 {
        self.nominal_rate
    }

    /// At least one scratch buffer has been queued
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Ended through [`halt`](Self::halt) rather than by running dry
    pub fn was_halted(&self) -> bool {
        self.halted
    }

    /// Decoded samples waiting to be drained
    pub fn queued(&self) -> usize {
        self.queue.occupied_len()
    }

    pub fn scratch_len(&self) -> usize {
        self.scratch.len()
    }

    /// Skip to end of stream and discard everything decoded so far
    pub fn halt(&mut self) {
        self.source.seek_to_end();
        while self.queue.try_pop().is_some() {}
        self.scratch_fill = 0;
        self.phase = Phase::Draining;
        self.ready = false;
        self.halted = true;
    }

    /// Advance decoding as far as backpressure allows
    pub fn poll(&mut self) -> PollStatus {
        if self.phase == Phase::Streaming {
            loop {
                if self.scratch_fill == 0 {
                    match self.source.read(&mut self.scratch) {
                        Ok(0) => {
                            self.phase = Phase::Draining;
                            break;
                        }
                        Ok(n) => self.scratch_fill = n,
                        Err(e) => {
                            // Already-queued samples still play out
                            warn!("Decode of {} failed, ending clip: {}", self.clip.id(), e);
                            self.phase = Phase::Draining;
                            break;
                        }
                    }
                }

                if self.queue.occupied_len() > self.scratch.len() {
                    return PollStatus::Pending;
                }

                let pushed = self.queue.push_slice(&self.scratch[..self.scratch_fill]);
                if pushed < self.scratch_fill {
                    // Keep the tail for the next poll
                    self.scratch.copy_within(pushed..self.scratch_fill, 0);
                    self.scratch_fill -= pushed;
                    return PollStatus::Pending;
                }
                self.scratch_fill = 0;
                self.ready = true;
            }
        }

        if self.queue.is_empty() {
            PollStatus::Finished
        } else {
            PollStatus::Pending
        }
    }

    /// Move up to `count` samples into `out`, scaled by `gain`.
    ///
    /// Returns the number moved.
    pub fn drain_into(&mut self, count: usize, gain: f32, out: &mut PlaybackBuffer) -> usize {
        let mut moved = 0;
        while moved < count {
            match self.queue.try_pop() {
                Some(sample) => {
                    out.write(sample * gain);
                    moved += 1;
                }
                None => break,
            }
        }
        moved
    }
}

impl std::fmt::Debug for DecodeSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodeSession")
            .field("clip", &self.clip.id())
            .field("phase", &self.phase)
            .field("queued", &self.queued())
            .field("ready", &self.ready)
            .finish()
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::{placeholder_clip, BrokenSource};
    use super::*;

    #[test]
    fn test_scratch_len() {
        assert_eq!(scratch_len(48_000), 9_600 + HEAD_SAMPLES);
        assert_eq!(scratch_len(0), HEAD_SAMPLES);
    }

    #[test]
    fn test_decode_error_plays_out_queued_samples_then_finishes() {
        let source = BrokenSource { good: 3_000, value: 0.5 };
        let mut session = DecodeSession::from_source(placeholder_clip("glitch"), Box::new(source), 48_000).unwrap();

        assert_eq!(session.poll(), PollStatus::Pending);
        assert!(session.is_ready());
        assert_eq!(session.queued(), 3_000);

        let mut out = PlaybackBuffer::with_capacity(4_096);
        assert_eq!(session.drain_into(3_000, 1.0, &mut out), 3_000);
        assert_eq!(session.poll(), PollStatus::Finished);
        assert!(!session.was_halted());
    }

    #[test]
    fn test_decode_error_before_any_sample_finishes_at_once() {
        let source = BrokenSource { good: 0, value: 0.5 };
        let mut session = DecodeSession::from_source(placeholder_clip("glitch"), Box::new(source), 48_000).unwrap();
        assert_eq!(session.poll(), PollStatus::Finished);
        assert!(!session.is_ready());
    }

    #[test]
    fn test_open_rejects_undecodable_clip() {
        let clip = Arc::new(AudioAsset::from_bytes(
            "noise",
            vec![0x13u8; 128],
            None,
            crate::audio::FormatRequirements::default(),
        ));
        assert!(matches!(DecodeSession::open(clip), Err(Error::Decode(_))));
    }
}
