//! # Sonicast Audio Playback Library (sonicast-ap)
//!
//! Server-driven audio playback: decode stored clips, pace them to real
//! time, cut them into fixed-size packets and push the encoded packets to
//! networked listeners through broadcast groups.
//!
//! **Architecture:** symphonia decode → ringbuf sample queue → paced drain →
//! packet buffer → frame encoder → listener transport, one pipeline per
//! [`playback::PlaybackEngine`], all driven by [`service::AudioService::tick`].

pub mod audio;
pub mod broadcast;
pub mod catalog;
pub mod config;
pub mod driver;
pub mod error;
pub mod playback;
pub mod service;

pub use error::{Error, Result};
pub use service::AudioService;
