//! Streaming audio decoder using symphonia
//!
//! Decodes an asset's in-memory bytes packet by packet and hands samples out
//! in caller-sized chunks. Packets rarely line up with the caller's scratch
//! buffer, so decoded samples that do not fit are kept for the next read.
//!
//! # Sample Format
//!
//! - Output: interleaved f32 samples in the source channel layout
//! - No resampling: the catalog only admits assets at the output sample rate

use crate::error::{Error, Result};
use crate::audio::AudioAsset;
use std::io::Cursor;
use std::sync::Arc;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use thiserror::Error;
use tracing::{debug, warn};

/// Stream parameters discovered by probing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamInfo {
    /// Sample rate in Hz
    pub sample_rate: u32,

    /// Channel count
    pub channels: u16,

    /// Total frames, when the container declares it
    pub frames: Option<u64>,
}

/// Why an asset was rejected
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    /// The stream decodes to zero samples
    #[error("stream contains no samples")]
    NoSamples,

    /// Channel count differs from the required one
    #[error("expected {expected} channel(s), found {found}")]
    WrongChannelCount { expected: u16, found: u16 },

    /// Sample rate differs from the required one
    #[error("expected {expected} Hz, found {found} Hz")]
    WrongSampleRate { expected: u32, found: u32 },

    /// Container or codec could not be read
    #[error("decode failed: {0}")]
    Decode(String),
}

/// Opened symphonia stream for one asset
struct OpenStream {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    sample_rate: Option<u32>,
    channels: Option<u16>,
    frames: Option<u64>,
}

fn open_stream(bytes: &Arc<[u8]>, extension: Option<&str>) -> std::result::Result<OpenStream, String> {
    let source = Cursor::new(Arc::clone(bytes));
    let mss = MediaSourceStream::new(Box::new(source), Default::default());

    // Create hint from file extension
    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| format!("Failed to probe format: {}", e))?;

    let format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| "No audio track found".to_string())?;

    let track_id = track.id;
    let params = track.codec_params.clone();

    let decoder = symphonia::default::get_codecs()
        .make(&params, &DecoderOptions::default())
        .map_err(|e| format!("Failed to create decoder: {}", e))?;

    Ok(OpenStream {
        format,
        decoder,
        track_id,
        sample_rate: params.sample_rate,
        channels: params.channels.map(|c| c.count() as u16),
        frames: params.n_frames,
    })
}

/// Outcome of decoding one packet
enum Packet {
    /// Samples were appended
    Decoded,
    /// End of stream
    End,
}

impl OpenStream {
    /// Decode the next packet of our track, appending interleaved samples.
    ///
    /// Corrupt packets are skipped; only container-level failures are errors.
    fn decode_next(&mut self, out: &mut Vec<f32>) -> std::result::Result<Packet, String> {
        loop {
            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    return Ok(Packet::End);
                }
                Err(SymphoniaError::ResetRequired) => return Ok(Packet::End),
                Err(e) => return Err(format!("Error reading packet: {}", e)),
            };

            // Skip packets for other tracks
            if packet.track_id() != self.track_id {
                continue;
            }

            match self.decoder.decode(&packet) {
                Ok(decoded) => {
                    if decoded.frames() == 0 {
                        continue;
                    }
                    let spec = *decoded.spec();
                    // Containers without declared parameters learn them from the first packet
                    self.sample_rate.get_or_insert(spec.rate);
                    self.channels.get_or_insert(spec.channels.count() as u16);

                    let mut samples = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                    samples.copy_interleaved_ref(decoded);
                    out.extend_from_slice(samples.samples());
                    return Ok(Packet::Decoded);
                }
                Err(SymphoniaError::DecodeError(e)) => {
                    warn!("Skipping corrupt packet: {}", e);
                    continue;
                }
                Err(e) => return Err(format!("Decode error: {}", e)),
            }
        }
    }
}

/// Probe an encoded stream: parameters plus proof of at least one sample.
///
/// Decodes until the first non-empty packet, never the whole stream.
pub fn probe(bytes: &Arc<[u8]>, extension: Option<&str>) -> std::result::Result<StreamInfo, ProbeError> {
    if bytes.is_empty() {
        return Err(ProbeError::Decode("empty stream".to_string()));
    }

    let mut stream = open_stream(bytes, extension).map_err(ProbeError::Decode)?;
    if stream.frames == Some(0) {
        return Err(ProbeError::NoSamples);
    }

    let mut first = Vec::new();
    match stream.decode_next(&mut first).map_err(ProbeError::Decode)? {
        Packet::Decoded if !first.is_empty() => {}
        _ => return Err(ProbeError::NoSamples),
    }

    let sample_rate = stream
        .sample_rate
        .ok_or_else(|| ProbeError::Decode("sample rate not found".to_string()))?;
    let channels = stream
        .channels
        .ok_or_else(|| ProbeError::Decode("channel count not found".to_string()))?;

    Ok(StreamInfo {
        sample_rate,
        channels,
        frames: stream.frames,
    })
}

/// Streaming decoder for one playing clip.
///
/// ```ignore
/// let mut decoder = ClipDecoder::open(&asset)?;
/// let mut scratch = vec![0.0f32; 4096];
/// while decoder.read(&mut scratch)? > 0 {
///     // queue samples...
/// }
/// ```
pub struct ClipDecoder {
    clip_id: String,
    stream: OpenStream,
    info: StreamInfo,

    /// Decoded samples not yet handed to the caller
    carry: Vec<f32>,
    carry_pos: usize,

    finished: bool,
    /// Failure hit after samples were already handed out in the same read
    deferred_error: Option<String>,
    samples_read: u64,
}

impl ClipDecoder {
    /// Open a decoder over the asset's encoded bytes
    pub fn open(asset: &AudioAsset) -> Result<Self> {
        let stream = open_stream(asset.bytes(), asset.extension())
            .map_err(|e| Error::Decode(format!("{}: {}", asset.id(), e)))?;

        let info = StreamInfo {
            sample_rate: stream.sample_rate.unwrap_or(0),
            channels: stream.channels.unwrap_or(0),
            frames: stream.frames,
        };

        debug!(
            "Opened decoder for {}: sample_rate={}, channels={}, frames={:?}",
            asset.id(),
            info.sample_rate,
            info.channels,
            info.frames
        );

        Ok(Self {
            clip_id: asset.id().to_string(),
            stream,
            info,
            carry: Vec::new(),
            carry_pos: 0,
            finished: false,
            deferred_error: None,
            samples_read: 0,
        })
    }

    /// Fill `out` with decoded samples.
    ///
    /// Returns the number written; fewer than `out.len()` only at end of
    /// stream, zero once the stream is exhausted.
    ///
    /// # Errors
    /// `Decode` when the stream breaks. Samples decoded before the break are
    /// returned first and the error surfaces on the following read.
    pub fn read(&mut self, out: &mut [f32]) -> Result<usize> {
        if let Some(e) = self.deferred_error.take() {
            return Err(Error::Decode(e));
        }
        let mut written = 0;
        while written < out.len() {
            let available = self.carry.len() - self.carry_pos;
            if available > 0 {
                let n = available.min(out.len() - written);
                out[written..written + n]
                    .copy_from_slice(&self.carry[self.carry_pos..self.carry_pos + n]);
                self.carry_pos += n;
                written += n;
                continue;
            }
            if self.finished {
                break;
            }

            self.carry.clear();
            self.carry_pos = 0;
            match self.stream.decode_next(&mut self.carry) {
                Ok(Packet::Decoded) => {}
                Ok(Packet::End) => {
                    debug!("Reached end of {}", self.clip_id);
                    self.finished = true;
                }
                Err(e) => {
                    self.finished = true;
                    let message = format!("{}: {}", self.clip_id, e);
                    if written == 0 {
                        return Err(Error::Decode(message));
                    }
                    self.deferred_error = Some(message);
                    break;
                }
            }
        }
        self.samples_read += written as u64;
        Ok(written)
    }

    /// Jump to end of stream: the next read returns zero.
    ///
    /// Skip-to-finish rather than truncation: the caller still runs its
    /// normal end-of-stream path.
    pub fn seek_to_end(&mut self) {
        self.carry.clear();
        self.carry_pos = 0;
        self.finished = true;
        self.deferred_error = None;
    }

    /// Whether the stream is exhausted
    pub fn is_finished(&self) -> bool {
        self.finished && self.carry_pos >= self.carry.len()
    }

    /// Stream parameters
    pub fn info(&self) -> StreamInfo {
        self.info
    }

    /// Samples handed out so far
    pub fn samples_read(&self) -> u64 {
        self.samples_read
    }

    /// Clip being decoded
    pub fn clip_id(&self) -> &str {
        &self.clip_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_empty_stream() {
        let bytes: Arc<[u8]> = Arc::from(Vec::new());
        assert!(matches!(probe(&bytes, None), Err(ProbeError::Decode(_))));
    }

    #[test]
    fn test_probe_garbage() {
        let bytes: Arc<[u8]> = Arc::from(vec![0x42u8; 64]);
        assert!(matches!(probe(&bytes, Some("ogg")), Err(ProbeError::Decode(_))));
    }

    // Decoding real streams is covered by the integration tests, which
    // generate WAV fixtures with hound.
}
