//! Playback engine
//!
//! One engine plays one clip at a time. Each tick the owner calls
//! [`PlaybackEngine::poll_decoder`] to advance decoding, then
//! [`PlaybackEngine::update`] to drain exactly the samples real time allows,
//! cut them into fixed-size packets, encode and transmit them.
//!
//! State machine:
//! ```text
//! Idle --play--> Playing <--pause/resume--> Paused
//!                   |
//!                 stop / override
//!                   v
//!               Stopping --(next, loop or queued clip)--> Playing
//!                   |
//!                   +--(nothing resolved)--> Idle
//! ```
//!
//! A clip that runs dry hands over to its successor inside the same poll, and
//! the unspent pacing budget carries across, so a clip change costs no tick.

use super::events::{EngineState, PlaybackEvent};
use super::queue::ClipQueue;
use super::session::{DecodeSession, PollStatus};
use crate::audio::{AudioAsset, CodecKind, FrameEncoder, PlaybackBuffer};
use crate::broadcast::{fan_out, validate_frame, BroadcastGroup, ListenerTransport, ReceiveFilter, MAX_FRAME_LEN};
use crate::error::{Error, Result};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Per-engine packetization settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct EngineConfig {
    /// Samples per transport packet
    #[serde(default = "default_packet_samples")]
    pub packet_samples: usize,

    /// Output codec
    #[serde(default)]
    pub codec: CodecKind,
}

fn default_packet_samples() -> usize {
    480
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            packet_samples: default_packet_samples(),
            codec: CodecKind::default(),
        }
    }
}

impl EngineConfig {
    /// Check the packet size fits the transport.
    ///
    /// # Errors
    /// `Config` when packets are empty or encode past [`MAX_FRAME_LEN`].
    pub fn validate(&self) -> Result<()> {
        if self.packet_samples == 0 {
            return Err(Error::Config("packet_samples must be at least 1".to_string()));
        }
        let encoded = self.packet_samples * self.codec.bytes_per_sample();
        if encoded > MAX_FRAME_LEN {
            return Err(Error::Config(format!(
                "{} samples encode to {} bytes with {:?}, transport maximum is {}",
                self.packet_samples, encoded, self.codec, MAX_FRAME_LEN
            )));
        }
        Ok(())
    }
}

/// Where an engine's packets go
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum OutputRoute {
    /// Packets are produced and dropped
    #[default]
    Detached,
    /// Sent through the named broadcast group
    Group(String),
    /// Sent under each raw controller id to every authenticated listener
    Controllers(Vec<u8>),
}

/// Decode/encode pipeline for one stream of clips
pub struct PlaybackEngine {
    name: String,
    config: EngineConfig,

    queue: ClipQueue,
    session: Option<DecodeSession>,

    packet_buffer: PlaybackBuffer,
    packet: Vec<f32>,
    encoded: Vec<u8>,
    encoder: Option<Box<dyn FrameEncoder>>,

    /// Samples real time has allowed but not yet drained
    budget: f64,
    /// Percentage, 0-100
    volume: f32,
    looping: bool,
    paused: bool,
    stop_requested: bool,
    disposed: bool,

    route: OutputRoute,
    receive_filter: Option<ReceiveFilter>,

    events: broadcast::Sender<PlaybackEvent>,
}

/// Clip changes one poll may chain through; bounds a looping clip that
/// yields no samples
const MAX_HANDOVERS_PER_POLL: usize = 4;

impl PlaybackEngine {
    /// Create an idle, detached engine.
    ///
    /// # Errors
    /// `Config` when `config` fails [`EngineConfig::validate`].
    pub fn new(name: impl Into<String>, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let encoder = config.codec.build();
        let encoded_len = encoder.max_encoded_len(config.packet_samples);
        let (events, _) = broadcast::channel(64);

        Ok(Self {
            name: name.into(),
            config,
            queue: ClipQueue::new(),
            session: None,
            packet_buffer: PlaybackBuffer::with_capacity(config.packet_samples * 4),
            packet: vec![0.0; config.packet_samples],
            encoded: vec![0; encoded_len],
            encoder: Some(encoder),
            budget: 0.0,
            volume: 100.0,
            looping: false,
            paused: false,
            stop_requested: false,
            disposed: false,
            route: OutputRoute::Detached,
            receive_filter: None,
            events,
        })
    }

    fn ensure_live(&self) -> Result<()> {
        if self.disposed {
            return Err(Error::InvalidState(format!("engine '{}' is disposed", self.name)));
        }
        Ok(())
    }

    fn publish(&self, event: PlaybackEvent) {
        // No receivers is OK
        let _ = self.events.send(event);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> EngineConfig {
        self.config
    }

    /// Subscribe to lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<PlaybackEvent> {
        self.events.subscribe()
    }

    pub fn state(&self) -> EngineState {
        if self.disposed {
            EngineState::Disposed
        } else if self.session.is_none() {
            EngineState::Idle
        } else if self.stop_requested {
            EngineState::Stopping
        } else if self.paused {
            EngineState::Paused
        } else {
            EngineState::Playing
        }
    }

    pub fn is_playing(&self) -> bool {
        self.session.is_some()
    }

    /// Clip currently being decoded
    pub fn current_clip(&self) -> Option<&str> {
        self.queue.current().map(|c| c.id())
    }

    /// Override clip followed by pending clips, in play order
    pub fn upcoming(&self) -> Vec<String> {
        self.queue
            .next()
            .into_iter()
            .chain(self.queue.pending())
            .map(|c| c.id().to_string())
            .collect()
    }

    /// Start `clip`, or schedule it behind the current one.
    ///
    /// While a clip plays, `override_current` makes `clip` the next one and
    /// stops the current clip (lifting any pause); otherwise `clip` joins the
    /// back of the queue.
    ///
    /// # Errors
    /// `InvalidState` after dispose; `InvalidArgument` for a clip that fails
    /// validation; `Decode` when an idle engine cannot open the clip.
    pub fn play(&mut self, clip: Arc<AudioAsset>, override_current: bool) -> Result<()> {
        self.ensure_live()?;
        if let Err(reason) = clip.validate() {
            return Err(Error::InvalidArgument(format!(
                "clip '{}' is not playable: {}",
                clip.id(),
                reason
            )));
        }

        if self.session.is_none() {
            return self.start_clip(clip, false);
        }

        if override_current {
            debug!("Engine '{}': override with {}", self.name, clip.id());
            if let Some(displaced) = self.queue.set_next(clip) {
                debug!("Engine '{}': dropped override {}", self.name, displaced.id());
            }
            self.stop_requested = true;
            self.paused = false;
        } else {
            debug!("Engine '{}': queued {}", self.name, clip.id());
            self.queue.enqueue(clip);
        }
        Ok(())
    }

    /// Stop the current clip; with `clear_queue` nothing plays afterwards.
    ///
    /// A stopped clip is not replayed by looping.
    pub fn stop(&mut self, clear_queue: bool) -> Result<()> {
        self.ensure_live()?;
        if clear_queue {
            let dropped = self.queue.clear_upcoming();
            if dropped > 0 {
                debug!("Engine '{}': cleared {} queued clips", self.name, dropped);
            }
        }
        if self.session.is_some() {
            self.stop_requested = true;
            self.paused = false;
        }
        Ok(())
    }

    /// Suspend decoding and draining.
    ///
    /// Ignored when idle or while the current clip is stopping.
    pub fn pause(&mut self) -> Result<()> {
        self.ensure_live()?;
        if self.session.is_some() && !self.stop_requested {
            self.paused = true;
        }
        Ok(())
    }

    pub fn resume(&mut self) -> Result<()> {
        self.ensure_live()?;
        self.paused = false;
        Ok(())
    }

    pub fn set_looping(&mut self, looping: bool) -> Result<()> {
        self.ensure_live()?;
        self.looping = looping;
        Ok(())
    }

    pub fn is_looping(&self) -> bool {
        self.looping
    }

    /// Set output volume.
    ///
    /// Values above 1 are a percentage and used as-is; values in `0..=1`
    /// are a fraction and scaled to a percentage. The result is clamped to
    /// `0..=100`.
    ///
    /// # Errors
    /// `InvalidArgument` for NaN.
    pub fn set_volume(&mut self, volume: f32) -> Result<()> {
        self.ensure_live()?;
        if volume.is_nan() {
            return Err(Error::InvalidArgument("volume is NaN".to_string()));
        }
        let percent = if volume > 1.0 { volume } else { volume * 100.0 };
        self.volume = percent.clamp(0.0, 100.0);
        Ok(())
    }

    /// Volume as a percentage
    pub fn volume(&self) -> f32 {
        self.volume
    }

    /// Restrict which listeners receive packets
    pub fn set_receive_filter(&mut self, filter: Option<ReceiveFilter>) -> Result<()> {
        self.ensure_live()?;
        self.receive_filter = filter;
        Ok(())
    }

    /// Send packets through the named broadcast group
    pub fn bind_group(&mut self, group: impl Into<String>) -> Result<()> {
        self.ensure_live()?;
        self.route = OutputRoute::Group(group.into());
        Ok(())
    }

    /// Send packets under raw controller ids
    pub fn set_controller_ids(&mut self, ids: Vec<u8>) -> Result<()> {
        self.ensure_live()?;
        self.route = OutputRoute::Controllers(ids);
        Ok(())
    }

    /// Stop sending packets anywhere
    pub fn detach(&mut self) {
        self.route = OutputRoute::Detached;
    }

    pub fn route(&self) -> &OutputRoute {
        &self.route
    }

    /// Name of the bound broadcast group, if any
    pub fn bound_group(&self) -> Option<&str> {
        match &self.route {
            OutputRoute::Group(name) => Some(name),
            _ => None,
        }
    }

    /// Samples decoded but not yet drained
    pub fn queued_samples(&self) -> usize {
        self.session.as_ref().map_or(0, DecodeSession::queued)
    }

    /// Samples drained but not yet packetized
    pub fn buffered_samples(&self) -> usize {
        self.packet_buffer.len()
    }

    /// Open `clip` and make it current; `carry_budget` keeps the unspent
    /// pacing budget of the clip that just ran dry.
    fn start_clip(&mut self, clip: Arc<AudioAsset>, carry_budget: bool) -> Result<()> {
        let session = DecodeSession::open(Arc::clone(&clip))?;
        self.start_session(clip, session, carry_budget);
        Ok(())
    }

    fn start_session(&mut self, clip: Arc<AudioAsset>, session: DecodeSession, carry_budget: bool) {
        info!(
            "Engine '{}': playing {} ({} samples/s)",
            self.name,
            clip.id(),
            session.nominal_rate()
        );
        self.session = Some(session);
        if !carry_budget {
            self.budget = 0.0;
        }
        self.stop_requested = false;
        self.queue.set_current(Some(Arc::clone(&clip)));
        self.publish(PlaybackEvent::ClipStarted {
            engine: self.name.clone(),
            clip_id: clip.id().to_string(),
        });
    }

    /// Advance the decode state machine by one step; call once per tick.
    ///
    /// When the current clip is fully consumed the follow-up clip (override,
    /// loop, then queue) is started and polled in the same call, so the
    /// following [`update`](Self::update) already drains it.
    pub fn poll_decoder(&mut self) -> Result<()> {
        self.ensure_live()?;
        let Some(session) = self.session.as_mut() else {
            return Ok(());
        };

        if self.stop_requested {
            self.stop_requested = false;
            session.halt();
            // Samples of the stopped clip never reach the transport
            self.packet_buffer.clear();
        }
        if self.paused {
            return Ok(());
        }

        for _ in 0..MAX_HANDOVERS_PER_POLL {
            let Some(session) = self.session.as_mut() else {
                break;
            };
            if session.poll() != PollStatus::Finished {
                break;
            }
            self.finish_clip();
        }
        Ok(())
    }

    fn finish_clip(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        let stopped = session.was_halted();
        let clip_id = session.clip().id().to_string();
        drop(session);

        debug!("Engine '{}': finished {} (stopped={})", self.name, clip_id, stopped);
        self.publish(PlaybackEvent::ClipFinished {
            engine: self.name.clone(),
            clip_id,
            stopped,
        });

        loop {
            let replay = self.looping && !stopped;
            let Some(next) = self.queue.resolve_next(replay) else {
                break;
            };
            let is_replay = self
                .queue
                .current()
                .is_some_and(|current| Arc::ptr_eq(current, &next));
            match self.start_clip(next, !stopped) {
                Ok(()) => return,
                Err(e) => {
                    warn!("Engine '{}': cannot start next clip: {}", self.name, e);
                    if is_replay {
                        // The looping clip cannot be reopened
                        self.looping = false;
                    }
                }
            }
        }

        self.queue.set_current(None);
        self.paused = false;
        self.publish(PlaybackEvent::QueueDrained {
            engine: self.name.clone(),
        });
    }

    /// Drain the samples `elapsed` allows and transmit complete packets.
    ///
    /// `group` must be the group named by the engine's route when it is bound
    /// to one. Returns the number of packets produced.
    ///
    /// # Errors
    /// `InvalidState` after dispose or when the bound group is not supplied;
    /// encode and frame errors are surfaced as `InvalidArgument`.
    pub fn update(
        &mut self,
        elapsed: Duration,
        group: Option<&BroadcastGroup>,
        transport: &dyn ListenerTransport,
    ) -> Result<usize> {
        self.ensure_live()?;
        let Some(session) = self.session.as_mut() else {
            return Ok(0);
        };
        if !session.is_ready() || self.paused || self.stop_requested {
            return Ok(0);
        }

        let group = match &self.route {
            OutputRoute::Group(name) => match group {
                Some(group) if group.name() == name => Some(group),
                _ => {
                    return Err(Error::InvalidState(format!(
                        "engine '{}' is bound to group '{}' which was not supplied",
                        self.name, name
                    )))
                }
            },
            _ => None,
        };

        self.budget += elapsed.as_secs_f64() * f64::from(session.nominal_rate());
        let allowed = self.budget.floor() as usize;
        let drained = session.drain_into(allowed.min(session.queued()), self.volume / 100.0, &mut self.packet_buffer);
        self.budget -= drained as f64;

        let encoder = self
            .encoder
            .as_mut()
            .ok_or_else(|| Error::InvalidState(format!("engine '{}' has no encoder", self.name)))?;

        let packet_samples = self.packet.len();
        let mut packets = 0;
        while self.packet_buffer.len() >= packet_samples {
            self.packet_buffer.read_to(&mut self.packet, packet_samples)?;
            let len = encoder.encode(&self.packet, &mut self.encoded)?;
            let frame = &self.encoded[..];
            let filter = self.receive_filter.as_ref();

            match (&self.route, group) {
                (OutputRoute::Group(_), Some(group)) => {
                    group.transmit(frame, len, filter, transport)?;
                }
                (OutputRoute::Controllers(ids), _) => {
                    validate_frame(frame, len)?;
                    fan_out(ids.iter().copied(), &frame[..len], transport, filter);
                }
                _ => {}
            }
            packets += 1;
        }
        Ok(packets)
    }

    /// Release every resource; later calls other than `dispose` fail.
    ///
    /// Safe to call more than once.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;

        if let Some(mut session) = self.session.take() {
            session.halt();
        }
        self.queue.clear();
        self.packet_buffer.release();
        self.packet = Vec::new();
        self.encoded = Vec::new();
        self.encoder = None;
        self.route = OutputRoute::Detached;
        self.receive_filter = None;
        self.budget = 0.0;
        self.looping = false;
        self.paused = false;
        self.stop_requested = false;

        info!("Engine '{}' disposed", self.name);
        self.publish(PlaybackEvent::Disposed {
            engine: self.name.clone(),
        });
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for PlaybackEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackEngine")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("current", &self.current_clip())
            .field("route", &self.route)
            .field("volume", &self.volume)
            .finish()
    }
}
