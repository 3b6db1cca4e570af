//! Output codecs
//!
//! A [`FrameEncoder`] turns one transport packet of f32 samples into the
//! encoded payload handed to the listener transport. Encoders write into a
//! caller-owned fixed buffer so the per-tick path never allocates.

use crate::error::{Error, Result};
use serde::Deserialize;

/// Encodes one packet of samples into a transport payload
pub trait FrameEncoder: Send {
    /// Encode `pcm` into `out`, returning the payload length
    fn encode(&mut self, pcm: &[f32], out: &mut [u8]) -> Result<usize>;

    /// Payload bytes needed for `samples` input samples
    fn max_encoded_len(&self, samples: usize) -> usize;

    /// Codec name for logging
    fn name(&self) -> &'static str;
}

/// Configured output codec
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CodecKind {
    /// ITU-T G.711 μ-law, one byte per sample
    #[default]
    MuLaw,
    /// Signed 16-bit little-endian PCM
    Pcm16,
}

impl CodecKind {
    /// Build a fresh encoder instance
    pub fn build(self) -> Box<dyn FrameEncoder> {
        match self {
            CodecKind::MuLaw => Box::new(MuLawEncoder),
            CodecKind::Pcm16 => Box::new(Pcm16Encoder),
        }
    }

    /// Encoded bytes per input sample
    pub fn bytes_per_sample(self) -> usize {
        match self {
            CodecKind::MuLaw => 1,
            CodecKind::Pcm16 => 2,
        }
    }
}

fn check_buffers(pcm: &[f32], out: &[u8], needed: usize) -> Result<()> {
    if pcm.is_empty() {
        return Err(Error::InvalidArgument("empty sample packet".to_string()));
    }
    if out.is_empty() || out.len() < needed {
        return Err(Error::InvalidArgument(format!(
            "encode buffer holds {} bytes, {} needed",
            out.len(),
            needed
        )));
    }
    Ok(())
}

/// Convert a float sample to 16-bit PCM with clipping
#[inline]
fn to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

/// G.711 μ-law encoder
#[derive(Debug, Default, Clone, Copy)]
pub struct MuLawEncoder;

impl MuLawEncoder {
    const BIAS: i32 = 0x84;
    const CLIP: i32 = 32635;

    /// Compress one 16-bit sample
    pub fn encode_sample(sample: i16) -> u8 {
        let mut pcm = sample as i32;
        let sign = if pcm < 0 {
            pcm = -pcm;
            0x80
        } else {
            0
        };
        pcm = pcm.min(Self::CLIP) + Self::BIAS;

        // Segment = position of the highest set bit above bit 7
        let exponent = (31 - (pcm as u32).leading_zeros()) as i32 - 7;
        let mantissa = (pcm >> (exponent + 3)) & 0x0F;
        !((sign | (exponent << 4) | mantissa) as u8)
    }
}

impl FrameEncoder for MuLawEncoder {
    fn encode(&mut self, pcm: &[f32], out: &mut [u8]) -> Result<usize> {
        check_buffers(pcm, out, pcm.len())?;
        for (dst, &sample) in out.iter_mut().zip(pcm) {
            *dst = Self::encode_sample(to_i16(sample));
        }
        Ok(pcm.len())
    }

    fn max_encoded_len(&self, samples: usize) -> usize {
        samples
    }

    fn name(&self) -> &'static str {
        "mulaw"
    }
}

/// 16-bit little-endian PCM encoder
#[derive(Debug, Default, Clone, Copy)]
pub struct Pcm16Encoder;

impl FrameEncoder for Pcm16Encoder {
    fn encode(&mut self, pcm: &[f32], out: &mut [u8]) -> Result<usize> {
        let needed = pcm.len() * 2;
        check_buffers(pcm, out, needed)?;
        for (dst, &sample) in out.chunks_exact_mut(2).zip(pcm) {
            dst.copy_from_slice(&to_i16(sample).to_le_bytes());
        }
        Ok(needed)
    }

    fn max_encoded_len(&self, samples: usize) -> usize {
        samples * 2
    }

    fn name(&self) -> &'static str {
        "pcm16"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mulaw_reference_points() {
        assert_eq!(MuLawEncoder::encode_sample(0), 0xFF);
        assert_eq!(MuLawEncoder::encode_sample(i16::MAX), 0x80);
        assert_eq!(MuLawEncoder::encode_sample(-i16::MAX), 0x00);
    }

    #[test]
    fn test_mulaw_is_monotonic_for_positive_input() {
        // Larger magnitude never maps to a smaller inverted code
        let mut last = !MuLawEncoder::encode_sample(0);
        for s in (0..i16::MAX).step_by(97) {
            let code = !MuLawEncoder::encode_sample(s);
            assert!(code >= last, "non-monotonic at {}", s);
            last = code;
        }
    }

    #[test]
    fn test_pcm16_layout() {
        let mut enc = Pcm16Encoder;
        let mut out = [0u8; 4];
        let len = enc.encode(&[1.0, -1.0], &mut out).unwrap();
        assert_eq!(len, 4);
        assert_eq!(&out[..2], &i16::MAX.to_le_bytes());
        assert_eq!(&out[2..], &(-i16::MAX).to_le_bytes());
    }

    #[test]
    fn test_clipping() {
        let mut enc = Pcm16Encoder;
        let mut out = [0u8; 2];
        enc.encode(&[4.0], &mut out).unwrap();
        assert_eq!(i16::from_le_bytes(out), i16::MAX);
    }

    #[test]
    fn test_undersized_buffer_rejected() {
        let mut enc = MuLawEncoder;
        let mut out = [0u8; 3];
        assert!(matches!(
            enc.encode(&[0.0; 4], &mut out),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            enc.encode(&[0.0; 4], &mut []),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_empty_packet_rejected() {
        let mut enc = MuLawEncoder;
        let mut out = [0u8; 8];
        assert!(matches!(enc.encode(&[], &mut out), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_codec_kind_build() {
        assert_eq!(CodecKind::MuLaw.build().name(), "mulaw");
        assert_eq!(CodecKind::Pcm16.build().max_encoded_len(480), 960);
        assert_eq!(CodecKind::default(), CodecKind::MuLaw);
    }
}
