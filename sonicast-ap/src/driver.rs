//! Tick driver
//!
//! Owns the [`AudioService`] on a single task and calls
//! [`AudioService::tick`] on a fixed interval. Control requests from other
//! tasks (console, embedders) arrive as [`ServiceCommand`]s over an mpsc
//! channel and are applied at the start of the next tick, so the service
//! itself never needs a lock.

use crate::error::{Error, Result};
use crate::service::AudioService;
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Control request applied by the driver between ticks
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceCommand {
    Play {
        engine: String,
        clip: String,
        override_current: bool,
    },
    Stop {
        engine: String,
        clear_queue: bool,
    },
    Pause {
        engine: String,
    },
    Resume {
        engine: String,
    },
    SetVolume {
        engine: String,
        volume: f32,
    },
    SetLooping {
        engine: String,
        looping: bool,
    },
    /// Reload the asset directory
    Reload,
    /// Log the state of every engine
    Status,
}

fn usage(line: &str) -> Error {
    Error::InvalidArgument(format!(
        "unrecognized command '{}' (play|override|queue|stop|skip|pause|resume|volume|loop|reload|status)",
        line
    ))
}

impl FromStr for ServiceCommand {
    type Err = Error;

    /// Console syntax, one command per line:
    ///
    /// ```text
    /// play <engine> <clip>        start, or queue behind the current clip
    /// override <engine> <clip>    replace the current clip
    /// stop <engine>               stop and clear the queue
    /// skip <engine>               stop the current clip, keep the queue
    /// pause <engine> / resume <engine>
    /// volume <engine> <value>
    /// loop <engine> on|off
    /// reload / status
    /// ```
    fn from_str(line: &str) -> Result<Self> {
        let words: Vec<&str> = line.split_whitespace().collect();
        let command = match words.as_slice() {
            ["play" | "queue", engine, clip] => ServiceCommand::Play {
                engine: engine.to_string(),
                clip: clip.to_string(),
                override_current: false,
            },
            ["override", engine, clip] => ServiceCommand::Play {
                engine: engine.to_string(),
                clip: clip.to_string(),
                override_current: true,
            },
            ["stop", engine] => ServiceCommand::Stop {
                engine: engine.to_string(),
                clear_queue: true,
            },
            ["skip", engine] => ServiceCommand::Stop {
                engine: engine.to_string(),
                clear_queue: false,
            },
            ["pause", engine] => ServiceCommand::Pause {
                engine: engine.to_string(),
            },
            ["resume", engine] => ServiceCommand::Resume {
                engine: engine.to_string(),
            },
            ["volume", engine, value] => ServiceCommand::SetVolume {
                engine: engine.to_string(),
                volume: value
                    .parse()
                    .map_err(|_| Error::InvalidArgument(format!("invalid volume '{}'", value)))?,
            },
            ["loop", engine, flag] => ServiceCommand::SetLooping {
                engine: engine.to_string(),
                looping: match *flag {
                    "on" | "true" | "1" => true,
                    "off" | "false" | "0" => false,
                    _ => return Err(usage(line)),
                },
            },
            ["reload"] => ServiceCommand::Reload,
            ["status"] => ServiceCommand::Status,
            _ => return Err(usage(line)),
        };
        Ok(command)
    }
}

impl ServiceCommand {
    /// Apply to `service`
    pub fn apply(self, service: &mut AudioService) -> Result<()> {
        match self {
            ServiceCommand::Play {
                engine,
                clip,
                override_current,
            } => service.play(&engine, &clip, override_current),
            ServiceCommand::Stop { engine, clear_queue } => service.engine_mut(&engine)?.stop(clear_queue),
            ServiceCommand::Pause { engine } => service.engine_mut(&engine)?.pause(),
            ServiceCommand::Resume { engine } => service.engine_mut(&engine)?.resume(),
            ServiceCommand::SetVolume { engine, volume } => service.engine_mut(&engine)?.set_volume(volume),
            ServiceCommand::SetLooping { engine, looping } => service.engine_mut(&engine)?.set_looping(looping),
            // Runs on the blocking pool; the tick continues meanwhile
            ServiceCommand::Reload => service.reload_catalog().map(|_| ()),
            ServiceCommand::Status => {
                info!("Catalog: {} assets", service.catalog().len());
                for name in service.engine_names() {
                    let engine = service.engine(&name)?;
                    info!(
                        "Engine '{}': {} clip={:?} upcoming={:?} volume={} route={:?}",
                        name,
                        engine.state(),
                        engine.current_clip(),
                        engine.upcoming(),
                        engine.volume(),
                        engine.route()
                    );
                }
                Ok(())
            }
        }
    }
}

/// Sending side of the driver's command channel
#[derive(Debug, Clone)]
pub struct DriverHandle {
    commands: mpsc::Sender<ServiceCommand>,
}

impl DriverHandle {
    /// Queue a command for the next tick.
    ///
    /// # Errors
    /// `InvalidState` once the driver has stopped.
    pub async fn send(&self, command: ServiceCommand) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| Error::InvalidState("tick driver stopped".to_string()))
    }
}

/// Fixed-interval loop driving an [`AudioService`]
pub struct TickDriver {
    service: AudioService,
    commands: mpsc::Receiver<ServiceCommand>,
    period: Duration,
}

impl TickDriver {
    /// Driver ticking every `period`, plus the handle feeding it commands
    pub fn new(service: AudioService, period: Duration) -> (Self, DriverHandle) {
        let (tx, rx) = mpsc::channel(64);
        (
            Self {
                service,
                commands: rx,
                period,
            },
            DriverHandle { commands: tx },
        )
    }

    pub fn service(&self) -> &AudioService {
        &self.service
    }

    pub fn service_mut(&mut self) -> &mut AudioService {
        &mut self.service
    }

    /// Apply every queued command; returns how many were applied
    pub fn drain_commands(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(command) = self.commands.try_recv() {
            debug!("Applying {:?}", command);
            if let Err(e) = command.apply(&mut self.service) {
                warn!("Command failed: {}", e);
            }
            applied += 1;
        }
        applied
    }

    /// One tick: commands first, then every engine
    pub fn step(&mut self, elapsed: Duration) -> usize {
        self.drain_commands();
        self.service.tick(elapsed)
    }

    /// Tick until `shutdown` resolves; returns the service for teardown.
    ///
    /// Elapsed time is measured between ticks, so a late tick drains
    /// proportionally more samples.
    pub async fn run<F>(mut self, shutdown: F) -> AudioService
    where
        F: Future<Output = ()>,
    {
        let mut interval = tokio::time::interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        info!("Tick driver running every {:?}", self.period);
        let mut last = Instant::now();
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                now = interval.tick() => {
                    let elapsed = now.saturating_duration_since(last);
                    last = now;
                    self.step(elapsed);
                }
            }
        }

        info!("Tick driver stopped");
        self.service
    }
}
