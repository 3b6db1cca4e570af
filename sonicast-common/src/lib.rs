//! # Sonicast Common Library
//!
//! Shared code for the sonicast audio services including:
//! - Error type shared by configuration and id allocation
//! - Configuration file discovery and TOML loading
//! - Controller id allocation (one-byte, reference counted)

pub mod config;
pub mod error;
pub mod ids;

pub use error::{Error, Result};
pub use ids::ControllerIdPool;
