//! Encoded audio assets
//!
//! An [`AudioAsset`] is an immutable, named blob of encoded audio. Whether it
//! satisfies the process format contract (channel count, sample rate, at
//! least one sample) is computed on first access and memoized; a failed probe
//! is cached and never retried.

use crate::audio::decoder::{probe, ProbeError, StreamInfo};
use crate::error::{Error, Result};
use std::fmt;
use std::path::Path;
use std::sync::{Arc, OnceLock};

/// Format every playable asset must decode to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatRequirements {
    /// Required channel count (1 = mono)
    pub channels: u16,

    /// Required sample rate in Hz
    pub sample_rate: u32,
}

impl FormatRequirements {
    /// Check probed stream parameters against the requirements
    pub fn check(&self, info: &StreamInfo) -> std::result::Result<(), ProbeError> {
        if info.channels != self.channels {
            return Err(ProbeError::WrongChannelCount {
                expected: self.channels,
                found: info.channels,
            });
        }
        if info.sample_rate != self.sample_rate {
            return Err(ProbeError::WrongSampleRate {
                expected: self.sample_rate,
                found: info.sample_rate,
            });
        }
        Ok(())
    }
}

impl Default for FormatRequirements {
    fn default() -> Self {
        Self {
            channels: 1,
            sample_rate: 48_000,
        }
    }
}

/// Memoized validity of an asset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetValidity {
    /// Not probed yet
    Unknown,
    /// Probed and compliant
    Valid,
    /// Probed and rejected (reason available through [`AudioAsset::validate`])
    Invalid,
}

/// Immutable encoded audio clip
pub struct AudioAsset {
    id: String,
    bytes: Arc<[u8]>,
    /// File extension, used as a container hint when probing
    extension: Option<String>,
    requirements: FormatRequirements,
    probed: OnceLock<std::result::Result<StreamInfo, ProbeError>>,
}

impl AudioAsset {
    /// Create an asset from raw encoded bytes
    pub fn from_bytes(
        id: impl Into<String>,
        bytes: impl Into<Arc<[u8]>>,
        extension: Option<String>,
        requirements: FormatRequirements,
    ) -> Self {
        Self {
            id: id.into(),
            bytes: bytes.into(),
            extension,
            requirements,
            probed: OnceLock::new(),
        }
    }

    /// Read an asset from disk; the id is the file stem
    pub fn from_file(path: &Path, requirements: FormatRequirements) -> Result<Self> {
        let id = asset_id_for(path).ok_or_else(|| {
            Error::InvalidArgument(format!("no usable asset id in {}", path.display()))
        })?;
        let bytes = std::fs::read(path)?;
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        Ok(Self::from_bytes(id, bytes, extension, requirements))
    }

    /// Asset id
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Encoded bytes (shared, never copied)
    pub fn bytes(&self) -> &Arc<[u8]> {
        &self.bytes
    }

    /// Container hint
    pub fn extension(&self) -> Option<&str> {
        self.extension.as_deref()
    }

    /// Encoded size in bytes
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the encoded blob is empty
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Current validity without triggering a probe
    pub fn validity(&self) -> AssetValidity {
        match self.probed.get() {
            None => AssetValidity::Unknown,
            Some(Ok(_)) => AssetValidity::Valid,
            Some(Err(_)) => AssetValidity::Invalid,
        }
    }

    /// Probe (once) and report the stream info or the rejection reason
    pub fn validate(&self) -> std::result::Result<&StreamInfo, &ProbeError> {
        self.probed
            .get_or_init(|| {
                let info = probe(&self.bytes, self.extension.as_deref())?;
                self.requirements.check(&info)?;
                Ok(info)
            })
            .as_ref()
    }

    /// Probe (once) and report whether the asset is playable
    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }
}

impl fmt::Debug for AudioAsset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioAsset")
            .field("id", &self.id)
            .field("len", &self.bytes.len())
            .field("extension", &self.extension)
            .field("validity", &self.validity())
            .finish()
    }
}

/// Derive an asset id from a file path (the file stem)
pub fn asset_id_for(path: &Path) -> Option<String> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
