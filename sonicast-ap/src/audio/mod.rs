//! Audio data types and codecs
//!
//! - [`AudioAsset`]: immutable encoded clip with memoized format validation
//! - [`ClipDecoder`]: streaming symphonia decoder over an asset's bytes
//! - [`FrameEncoder`]: output codecs producing transport payloads
//! - [`PlaybackBuffer`]: FIFO assembling fixed-size packets

pub mod asset;
pub mod buffer;
pub mod decoder;
pub mod encoder;

pub use asset::{asset_id_for, AssetValidity, AudioAsset, FormatRequirements};
pub use buffer::PlaybackBuffer;
pub use decoder::{probe, ClipDecoder, ProbeError, StreamInfo};
pub use encoder::{CodecKind, FrameEncoder, MuLawEncoder, Pcm16Encoder};
