//! Configuration file discovery and TOML loading
//!
//! Config file resolution follows a fixed priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. Per-user config directory (`<config_dir>/sonicast/<file>`)
//! 4. System-wide location (`/etc/sonicast/<file>`, unix only)
//!
//! A missing config file is not an error: callers fall back to built-in
//! defaults and log a warning.

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Application directory name under the platform config directory
pub const APP_DIR: &str = "sonicast";

/// Resolves the location of a module's TOML config file.
#[derive(Debug, Clone)]
pub struct ConfigLocator {
    file_name: String,
    env_var: String,
}

impl ConfigLocator {
    /// Create a locator for `file_name`, overridable through `env_var`
    pub fn new(file_name: impl Into<String>, env_var: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            env_var: env_var.into(),
        }
    }

    /// Resolve the config path, or `None` when no candidate exists.
    ///
    /// An explicit CLI path is returned even when it does not exist so the
    /// caller reports the typo instead of silently using defaults.
    pub fn resolve(&self, cli_arg: Option<&Path>) -> Option<PathBuf> {
        // Priority 1: Command-line argument
        if let Some(path) = cli_arg {
            return Some(path.to_path_buf());
        }

        // Priority 2: Environment variable
        if let Ok(path) = std::env::var(&self.env_var) {
            if !path.is_empty() {
                return Some(PathBuf::from(path));
            }
        }

        // Priority 3/4: Platform locations
        self.candidates().into_iter().find(|p| p.exists())
    }

    /// Platform config file candidates, in priority order
    pub fn candidates(&self) -> Vec<PathBuf> {
        let mut candidates = Vec::new();
        if let Some(dir) = dirs::config_dir() {
            candidates.push(dir.join(APP_DIR).join(&self.file_name));
        }
        if cfg!(unix) {
            candidates.push(PathBuf::from("/etc").join(APP_DIR).join(&self.file_name));
        }
        candidates
    }
}

/// Parse a TOML document into `T`
pub fn parse_toml<T: DeserializeOwned>(content: &str) -> Result<T> {
    toml::from_str(content).map_err(|e| Error::Config(format!("Invalid TOML: {}", e)))
}

/// Load and parse a TOML file into `T`
pub fn load_toml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    debug!("Loading configuration from {}", path.display());
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read {}: {}", path.display(), e))
    })?;
    parse_toml(&content)
}

/// Load `T` from the resolved config path, falling back to `T::default()`
/// when no config file is found.
///
/// Parse errors in an existing file are still reported.
pub fn load_or_default<T>(locator: &ConfigLocator, cli_arg: Option<&Path>) -> Result<(T, Option<PathBuf>)>
where
    T: DeserializeOwned + Default,
{
    match locator.resolve(cli_arg) {
        Some(path) => {
            let config = load_toml(&path)?;
            Ok((config, Some(path)))
        }
        None => {
            warn!(
                "No {} found (checked {:?}), using built-in defaults",
                locator.file_name,
                locator.candidates()
            );
            Ok((T::default(), None))
        }
    }
}
