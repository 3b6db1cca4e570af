//! Test helper modules for sonicast-ap integration tests
//!
//! Provides reusable test infrastructure components:
//! - audio_generator: deterministic WAV fixtures (hound)
//! - AssetFixture: temp asset directory plus a loaded catalog
//! - packet decoding and tick loops for engine tests

#![allow(dead_code)]

pub mod audio_generator;

pub use audio_generator::*;

use sonicast_ap::audio::{CodecKind, FormatRequirements};
use sonicast_ap::broadcast::{BroadcastGroup, ListenerTransport, SentFrame};
use sonicast_ap::catalog::AssetCatalog;
use sonicast_ap::playback::{EngineConfig, PlaybackEngine};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Samples per packet in engine tests; 240 PCM16 samples = 480 bytes
pub const TEST_PACKET_SAMPLES: usize = 240;

/// Engine settings whose payloads decode back to exact sample values
pub fn test_engine_config() -> EngineConfig {
    EngineConfig {
        packet_samples: TEST_PACKET_SAMPLES,
        codec: CodecKind::Pcm16,
    }
}

/// Temp asset directory with a catalog loaded from it
pub struct AssetFixture {
    pub dir: TempDir,
    pub catalog: Arc<AssetCatalog>,
}

impl AssetFixture {
    /// Write one constant-valued mono clip per `(id, frames, value)` and load
    pub fn with_constant_clips(clips: &[(&str, usize, i16)]) -> Self {
        let dir = TempDir::new().unwrap();
        for (id, frames, value) in clips {
            generate_constant_wav(dir.path().join(format!("{}.wav", id)), *frames, *value).unwrap();
        }
        let catalog = Arc::new(AssetCatalog::new(FormatRequirements::default()));
        catalog.load(dir.path()).unwrap();
        Self { dir, catalog }
    }

    pub fn path(&self, file: &str) -> PathBuf {
        self.dir.path().join(file)
    }

    pub fn dir_path(&self) -> &Path {
        self.dir.path()
    }
}

/// Decode a PCM16 payload
pub fn pcm16_samples(payload: &[u8]) -> Vec<i16> {
    payload
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]))
        .collect()
}

/// Name of the candidate whose value is nearest the packet's first sample
pub fn classify<'a>(frame: &SentFrame, candidates: &[(&'a str, i16)]) -> &'a str {
    let first = pcm16_samples(&frame.payload)[0] as i32;
    candidates
        .iter()
        .min_by_key(|(_, value)| (first - *value as i32).abs())
        .map(|(name, _)| *name)
        .unwrap()
}

/// Collapse consecutive repeats: [a, a, b, b, a] -> [a, b, a]
pub fn runs<'a>(labels: impl IntoIterator<Item = &'a str>) -> Vec<&'a str> {
    let mut out: Vec<&str> = Vec::new();
    for label in labels {
        if out.last() != Some(&label) {
            out.push(label);
        }
    }
    out
}

/// One driver step: poll the decoder, then update
pub fn tick(
    engine: &mut PlaybackEngine,
    group: Option<&BroadcastGroup>,
    transport: &dyn ListenerTransport,
    elapsed: Duration,
) -> usize {
    engine.poll_decoder().unwrap();
    engine.update(elapsed, group, transport).unwrap()
}

/// Run `count` ticks of `elapsed`; returns packets produced
pub fn run_ticks(
    engine: &mut PlaybackEngine,
    transport: &dyn ListenerTransport,
    count: usize,
    elapsed: Duration,
) -> usize {
    (0..count).map(|_| tick(engine, None, transport, elapsed)).sum()
}
