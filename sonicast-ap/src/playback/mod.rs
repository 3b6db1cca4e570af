//! Playback pipeline
//!
//! Per-clip decode, real-time pacing, packetization and transmission.

pub mod engine;
pub mod events;
pub mod queue;
pub mod session;

pub use engine::{EngineConfig, OutputRoute, PlaybackEngine};
pub use events::{EngineState, PlaybackEvent};
pub use queue::ClipQueue;
pub use session::{scratch_len, DecodeSession, PollStatus, SampleSource, HEAD_SAMPLES};
