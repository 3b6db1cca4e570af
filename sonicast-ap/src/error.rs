//! Error types for sonicast-ap
//!
//! Defines module-specific error types using thiserror for clear error propagation.
//!
//! Argument and state violations are always surfaced to the caller. Asset
//! probe failures are reported through [`crate::audio::ProbeError`] and never
//! escape the catalog as an `Error`.

use thiserror::Error;

/// Main error type for sonicast-ap
#[derive(Error, Debug)]
pub enum Error {
    /// Null, undersized or oversized buffers, malformed clip references,
    /// frame lengths beyond the transport maximum
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Asset, broadcast group or engine lookup miss
    #[error("Not found: {0}")]
    NotFound(String),

    /// Operation on a disposed engine or an unconfigured group/emitter
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Audio decoding errors
    #[error("Audio decode error: {0}")]
    Decode(String),

    /// Configuration file loading or validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Listener transport errors
    #[error("Transport error: {0}")]
    Transport(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<sonicast_common::Error> for Error {
    fn from(err: sonicast_common::Error) -> Self {
        match err {
            sonicast_common::Error::Io(e) => Error::Io(e),
            sonicast_common::Error::Config(msg) => Error::Config(msg),
            sonicast_common::Error::InvalidInput(msg) => Error::InvalidArgument(msg),
            sonicast_common::Error::Exhausted(msg) => Error::InvalidState(msg),
        }
    }
}

/// Convenience Result type using sonicast-ap Error
pub type Result<T> = std::result::Result<T, Error>;
