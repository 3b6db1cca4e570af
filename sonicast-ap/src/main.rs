//! Audio Playback Server (sonicast-ap) - Main entry point
//!
//! Loads the asset directory, builds the broadcast groups and players named
//! in the configuration, then drives playback on a fixed tick until Ctrl+C.
//! Console commands on stdin (`play`, `stop`, `status`, ...) control the
//! players while the server runs.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sonicast_ap::broadcast::{LoggingEmitterHost, UdpTransport};
use sonicast_ap::catalog::{AssetCatalog, CatalogWatcher};
use sonicast_ap::config::{Config, ConfigOverrides, EmitterSection, PlayerSection};
use sonicast_ap::driver::{DriverHandle, ServiceCommand, TickDriver};
use sonicast_ap::AudioService;
use sonicast_common::ControllerIdPool;

/// Command-line arguments for sonicast-ap
#[derive(Parser, Debug)]
#[command(name = "sonicast-ap")]
#[command(about = "Server-driven audio playback engine")]
#[command(version)]
struct Args {
    /// Configuration file (overrides the standard search locations)
    #[arg(short, long, env = "SONICAST_AP_CONFIG")]
    config: Option<PathBuf>,

    /// Directory containing the audio assets
    #[arg(short, long, env = "SONICAST_ASSETS")]
    assets: Option<PathBuf>,

    /// Local UDP address to send from
    #[arg(short, long, env = "SONICAST_BIND")]
    bind: Option<SocketAddr>,

    /// Listener address (repeatable)
    #[arg(short, long = "peer")]
    peers: Vec<SocketAddr>,

    /// Tick period in milliseconds
    #[arg(long)]
    tick_ms: Option<u64>,

    /// Disable asset hot reload
    #[arg(long)]
    no_watch: bool,

    /// Do not read commands from stdin
    #[arg(long)]
    no_console: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let console = !args.no_console;

    let config = Config::load(ConfigOverrides {
        config_file: args.config,
        assets: args.assets,
        bind: args.bind,
        peers: args.peers,
        tick_ms: args.tick_ms,
        no_watch: args.no_watch,
    })
    .context("Failed to load configuration")?;

    // RUST_LOG wins over the configured level
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "sonicast_ap={level},sonicast_common={level}",
                    level = config.log_level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting sonicast-ap {} (git {}, {} build)",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_PROFILE")
    );
    match &config.source {
        Some(path) => info!("Configuration: {}", path.display()),
        None => info!("Configuration: built-in defaults"),
    }

    // Asset catalog
    let catalog = Arc::new(AssetCatalog::new(config.requirements));
    let loaded = catalog
        .load(config.assets_dir())
        .with_context(|| format!("Failed to load assets from {}", config.assets_dir().display()))?;
    if loaded == 0 {
        warn!("No playable assets in {}", config.assets_dir().display());
    }

    let watcher = if config.watch {
        Some(
            CatalogWatcher::spawn(Arc::clone(&catalog), config.assets_dir())
                .context("Failed to start asset watcher")?,
        )
    } else {
        None
    };

    // Listener transport
    let transport = UdpTransport::bind(config.bind).context("Failed to bind UDP transport")?;
    for peer in &config.peers {
        transport.add_peer(*peer, true);
    }
    if config.peers.is_empty() {
        warn!("No listener peers configured; packets will not leave the process");
    }

    let mut service = AudioService::new(
        config.engine,
        catalog,
        Arc::new(transport),
        Arc::new(LoggingEmitterHost),
    )
    .context("Failed to initialize audio service")?
    .with_id_pool(ControllerIdPool::new(config.first_controller_id));

    build_groups(&mut service, &config)?;
    build_players(&mut service, &config.players)?;

    let (driver, handle) = TickDriver::new(service, config.tick);
    if console {
        tokio::spawn(read_console(handle));
    }

    let mut service = driver.run(shutdown_signal()).await;
    service.shutdown();
    drop(watcher);

    info!("Shutdown complete");
    Ok(())
}

fn build_groups(service: &mut AudioService, config: &Config) -> Result<()> {
    for group in &config.groups {
        service
            .create_group(&group.name)
            .with_context(|| format!("Failed to create group '{}'", group.name))?;
        for section in &group.emitters {
            let (id, _) = service
                .ensure_group_emitter(&group.name, &section.name, |emitter, _| {
                    configure_emitter(emitter, section)
                })
                .with_context(|| format!("Failed to create emitter '{}'", section.name))?;
            info!("Group '{}': emitter '{}' on controller {}", group.name, section.name, id);
        }
    }
    Ok(())
}

fn configure_emitter(emitter: &mut sonicast_ap::broadcast::Emitter, section: &EmitterSection) {
    if let Some(position) = section.position {
        emitter.set_position(position);
    }
    emitter.set_spatial(section.spatial);
    if let Some(volume) = section.volume {
        emitter.set_volume(volume);
    }
    if let Some([min, max]) = section.distance {
        if let Err(e) = emitter.set_distance(min, max) {
            warn!("Emitter '{}': {}", section.name, e);
        }
    }
}

fn build_players(service: &mut AudioService, players: &[PlayerSection]) -> Result<()> {
    for player in players {
        let engine = service
            .create_engine(&player.name)
            .with_context(|| format!("Failed to create player '{}'", player.name))?;
        engine.set_looping(player.looping)?;
        if let Some(volume) = player.volume {
            engine.set_volume(volume)?;
        }
        if player.group.is_none() && !player.controller_ids.is_empty() {
            engine.set_controller_ids(player.controller_ids.clone())?;
        }
        if let Some(group) = &player.group {
            service.bind_engine(&player.name, group)?;
        }

        for clip in &player.autoplay {
            if let Err(e) = service.play(&player.name, clip, false) {
                warn!("Player '{}': cannot autoplay '{}': {}", player.name, clip, e);
            }
        }
    }
    Ok(())
}

/// Forward stdin lines to the tick driver as commands
async fn read_console(handle: DriverHandle) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!("Console read failed: {}", e);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match line.parse::<ServiceCommand>() {
            Ok(command) => {
                if handle.send(command).await.is_err() {
                    break;
                }
            }
            Err(e) => warn!("{}", e),
        }
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
