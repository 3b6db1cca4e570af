//! Configuration for the sonicast-ap server
//!
//! A single TOML bootstrap file describes the audio format contract, the
//! asset directory, the UDP transport and the groups/players to create at
//! startup. Every table is optional; missing values take built-in defaults.
//!
//! # Settings Sources Priority
//!
//! 1. Command-line arguments (`--assets`, `--bind`, `--tick-ms`)
//! 2. Environment variables (`SONICAST_AP_CONFIG`, `SONICAST_ASSETS`, `RUST_LOG`)
//! 3. TOML configuration file
//! 4. Built-in defaults
//!
//! ```toml
//! [audio]
//! sample_rate = 48000
//! channels = 1
//! packet_samples = 480
//! codec = "mulaw"
//! tick_ms = 20
//!
//! [catalog]
//! directory = "/srv/sonicast/assets"
//! watch = true
//!
//! [transport]
//! bind = "0.0.0.0:5750"
//! peers = ["10.0.0.12:5751"]
//!
//! [[groups]]
//! name = "lobby"
//! emitters = [{ name = "lobby-left", position = [-4.0, 1.5, 0.0] }]
//!
//! [[players]]
//! name = "announcer"
//! group = "lobby"
//! autoplay = ["welcome"]
//! ```

use crate::audio::{CodecKind, FormatRequirements};
use crate::error::{Error, Result};
use crate::playback::EngineConfig;
use serde::Deserialize;
use sonicast_common::config::{load_or_default, ConfigLocator};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// Config file name searched in the standard locations
pub const CONFIG_FILE_NAME: &str = "sonicast-ap.toml";

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "SONICAST_AP_CONFIG";

/// Bootstrap configuration as written in the TOML file
#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub audio: AudioSection,

    #[serde(default)]
    pub catalog: CatalogSection,

    #[serde(default)]
    pub transport: TransportSection,

    #[serde(default)]
    pub groups: Vec<GroupSection>,

    #[serde(default)]
    pub players: Vec<PlayerSection>,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Format contract and packetization
#[derive(Debug, Clone, Deserialize)]
pub struct AudioSection {
    /// Required sample rate of every asset (Hz)
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    /// Required channel count of every asset
    #[serde(default = "default_channels")]
    pub channels: u16,

    /// Samples per transport packet
    #[serde(default = "default_packet_samples")]
    pub packet_samples: usize,

    #[serde(default)]
    pub codec: CodecKind,

    /// Tick period of the driver loop
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
}

impl Default for AudioSection {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            channels: default_channels(),
            packet_samples: default_packet_samples(),
            codec: CodecKind::default(),
            tick_ms: default_tick_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogSection {
    /// Directory holding the audio assets
    #[serde(default)]
    pub directory: Option<PathBuf>,

    /// Hot-reload on file changes
    #[serde(default = "default_true")]
    pub watch: bool,
}

impl Default for CatalogSection {
    fn default() -> Self {
        Self {
            directory: None,
            watch: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransportSection {
    /// Local UDP address
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,

    /// Listener addresses; every peer counts as authenticated
    #[serde(default)]
    pub peers: Vec<SocketAddr>,

    /// Lowest controller id handed out to emitters
    #[serde(default)]
    pub first_controller_id: u8,
}

impl Default for TransportSection {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            peers: Vec::new(),
            first_controller_id: 0,
        }
    }
}

/// Broadcast group created at startup
#[derive(Debug, Clone, Deserialize)]
pub struct GroupSection {
    pub name: String,

    #[serde(default)]
    pub emitters: Vec<EmitterSection>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmitterSection {
    pub name: String,

    #[serde(default)]
    pub position: Option<[f32; 3]>,

    #[serde(default = "default_true")]
    pub spatial: bool,

    #[serde(default)]
    pub volume: Option<f32>,

    /// Audible range as `[min, max]`
    #[serde(default)]
    pub distance: Option<[f32; 2]>,
}

/// Playback engine created at startup
#[derive(Debug, Clone, Deserialize)]
pub struct PlayerSection {
    pub name: String,

    /// Group to send through
    #[serde(default)]
    pub group: Option<String>,

    /// Raw controller ids, used when no group is named
    #[serde(default)]
    pub controller_ids: Vec<u8>,

    /// 0-1 fraction or 0-100 percentage
    #[serde(default)]
    pub volume: Option<f32>,

    #[serde(default)]
    pub looping: bool,

    /// Clip ids played (then queued) at startup
    #[serde(default)]
    pub autoplay: Vec<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error); `RUST_LOG` wins
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_sample_rate() -> u32 {
    48_000
}

fn default_channels() -> u16 {
    1
}

fn default_packet_samples() -> usize {
    480
}

fn default_tick_ms() -> u64 {
    20
}

fn default_bind() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 5750))
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

/// Command-line configuration overrides
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub config_file: Option<PathBuf>,
    pub assets: Option<PathBuf>,
    pub bind: Option<SocketAddr>,
    pub peers: Vec<SocketAddr>,
    pub tick_ms: Option<u64>,
    pub no_watch: bool,
}

/// Resolved, validated configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// File the settings came from, if any
    pub source: Option<PathBuf>,
    pub assets_dir: PathBuf,
    pub watch: bool,
    pub requirements: FormatRequirements,
    pub engine: EngineConfig,
    pub tick: Duration,
    pub bind: SocketAddr,
    pub peers: Vec<SocketAddr>,
    pub first_controller_id: u8,
    pub groups: Vec<GroupSection>,
    pub players: Vec<PlayerSection>,
    pub log_level: String,
}

impl Config {
    /// Locate and read the TOML file, then apply `overrides`.
    ///
    /// A missing file is not an error; defaults apply.
    pub fn load(overrides: ConfigOverrides) -> Result<Self> {
        let locator = ConfigLocator::new(CONFIG_FILE_NAME, CONFIG_ENV_VAR);
        let (toml_config, source) =
            load_or_default::<TomlConfig>(&locator, overrides.config_file.as_deref())?;
        Self::resolve(toml_config, source, overrides)
    }

    /// Merge a parsed file with overrides and validate the result
    pub fn resolve(toml_config: TomlConfig, source: Option<PathBuf>, overrides: ConfigOverrides) -> Result<Self> {
        let TomlConfig {
            audio,
            catalog,
            transport,
            groups,
            players,
            logging,
        } = toml_config;

        let assets_dir = overrides.assets.or(catalog.directory).ok_or_else(|| {
            Error::Config("no asset directory: set [catalog].directory or pass --assets".to_string())
        })?;

        let mut peers = transport.peers;
        peers.extend(overrides.peers);

        let config = Self {
            source,
            assets_dir,
            watch: catalog.watch && !overrides.no_watch,
            requirements: FormatRequirements {
                channels: audio.channels,
                sample_rate: audio.sample_rate,
            },
            engine: EngineConfig {
                packet_samples: audio.packet_samples,
                codec: audio.codec,
            },
            tick: Duration::from_millis(overrides.tick_ms.unwrap_or(audio.tick_ms)),
            bind: overrides.bind.unwrap_or(transport.bind),
            peers,
            first_controller_id: transport.first_controller_id,
            groups,
            players,
            log_level: logging.level,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the server cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.requirements.sample_rate == 0 {
            return Err(Error::Config("audio.sample_rate must be positive".to_string()));
        }
        if self.requirements.channels == 0 {
            return Err(Error::Config("audio.channels must be positive".to_string()));
        }
        if self.tick.is_zero() {
            return Err(Error::Config("audio.tick_ms must be positive".to_string()));
        }
        self.engine.validate()?;

        let mut group_names = HashSet::new();
        for group in &self.groups {
            if !group_names.insert(group.name.as_str()) {
                return Err(Error::Config(format!("duplicate group '{}'", group.name)));
            }
            let mut emitter_names = HashSet::new();
            for emitter in &group.emitters {
                if !emitter_names.insert(emitter.name.as_str()) {
                    return Err(Error::Config(format!(
                        "duplicate emitter '{}' in group '{}'",
                        emitter.name, group.name
                    )));
                }
            }
        }

        let mut player_names = HashSet::new();
        for player in &self.players {
            if !player_names.insert(player.name.as_str()) {
                return Err(Error::Config(format!("duplicate player '{}'", player.name)));
            }
            match &player.group {
                Some(group) if !group_names.contains(group.as_str()) => {
                    return Err(Error::Config(format!(
                        "player '{}' names unknown group '{}'",
                        player.name, group
                    )));
                }
                Some(_) if !player.controller_ids.is_empty() => {
                    warn!(
                        "Player '{}' names a group; controller_ids are ignored",
                        player.name
                    );
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Directory the assets are loaded from
    pub fn assets_dir(&self) -> &Path {
        &self.assets_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sonicast_common::config::parse_toml;

    fn with_assets() -> ConfigOverrides {
        ConfigOverrides {
            assets: Some(PathBuf::from("/tmp/assets")),
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults() {
        let config = Config::resolve(TomlConfig::default(), None, with_assets()).unwrap();
        assert_eq!(config.requirements, FormatRequirements::default());
        assert_eq!(config.engine, EngineConfig::default());
        assert_eq!(config.tick, Duration::from_millis(20));
        assert_eq!(config.bind.port(), 5750);
        assert!(config.watch);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_missing_asset_directory() {
        let result = Config::resolve(TomlConfig::default(), None, ConfigOverrides::default());
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_cli_overrides_file() {
        let toml_config: TomlConfig = parse_toml(
            r#"
            [audio]
            tick_ms = 40
            [catalog]
            directory = "/srv/assets"
            [transport]
            peers = ["127.0.0.1:6000"]
            "#,
        )
        .unwrap();
        let overrides = ConfigOverrides {
            assets: Some(PathBuf::from("/override")),
            tick_ms: Some(10),
            peers: vec!["127.0.0.1:6001".parse().unwrap()],
            no_watch: true,
            ..Default::default()
        };

        let config = Config::resolve(toml_config, None, overrides).unwrap();
        assert_eq!(config.assets_dir(), Path::new("/override"));
        assert_eq!(config.tick, Duration::from_millis(10));
        assert_eq!(config.peers.len(), 2);
        assert!(!config.watch);
    }

    #[test]
    fn test_pcm16_packet_too_large() {
        let toml_config: TomlConfig = parse_toml(
            r#"
            [audio]
            codec = "pcm16"
            packet_samples = 480
            "#,
        )
        .unwrap();
        assert!(Config::resolve(toml_config, None, with_assets()).is_err());
    }

    #[test]
    fn test_player_unknown_group() {
        let toml_config: TomlConfig = parse_toml(
            r#"
            [[groups]]
            name = "lobby"

            [[players]]
            name = "p"
            group = "hall"
            "#,
        )
        .unwrap();
        let err = Config::resolve(toml_config, None, with_assets()).unwrap_err();
        assert!(err.to_string().contains("hall"));
    }

    #[test]
    fn test_groups_and_players_parse() {
        let toml_config: TomlConfig = parse_toml(
            r#"
            [[groups]]
            name = "lobby"
            emitters = [
                { name = "left", position = [-1.0, 0.0, 2.0], distance = [1.0, 20.0] },
                { name = "right", spatial = false },
            ]

            [[players]]
            name = "announcer"
            group = "lobby"
            volume = 0.8
            autoplay = ["welcome", "rules"]
            "#,
        )
        .unwrap();
        let config = Config::resolve(toml_config, None, with_assets()).unwrap();
        assert_eq!(config.groups[0].emitters.len(), 2);
        assert!(!config.groups[0].emitters[1].spatial);
        assert_eq!(config.players[0].autoplay, vec!["welcome", "rules"]);
    }
}
