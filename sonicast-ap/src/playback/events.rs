//! Engine lifecycle events and observable state

use serde::Serialize;

/// Lifecycle notifications published by a [`super::PlaybackEngine`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackEvent {
    /// Decoding of a clip began
    ClipStarted { engine: String, clip_id: String },

    /// A clip finished playing
    ///
    /// `stopped` is true when it ended through `stop()` or an override
    /// rather than by running out of samples.
    ClipFinished {
        engine: String,
        clip_id: String,
        stopped: bool,
    },

    /// The last clip ended and nothing is queued
    QueueDrained { engine: String },

    /// The engine released its resources
    Disposed { engine: String },
}

/// Externally visible engine state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    Idle,
    Playing,
    Paused,
    Stopping,
    Disposed,
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineState::Idle => write!(f, "idle"),
            EngineState::Playing => write!(f, "playing"),
            EngineState::Paused => write!(f, "paused"),
            EngineState::Stopping => write!(f, "stopping"),
            EngineState::Disposed => write!(f, "disposed"),
        }
    }
}
