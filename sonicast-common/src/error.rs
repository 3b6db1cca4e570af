//! Common error types for sonicast

use thiserror::Error;

/// Common result type for sonicast operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across sonicast crates
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid caller input (unknown id, out-of-range value)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A bounded resource has no free slots left
    #[error("Exhausted: {0}")]
    Exhausted(String),
}
