//! Audio service
//!
//! The one object a process builds at startup. It owns the broadcast groups,
//! the named playback engines and the controller id pool, and holds shared
//! handles to the asset catalog and the collaborators (listener transport,
//! emitter host). The tick driver owns the service and calls
//! [`AudioService::tick`] once per frame.

use crate::audio::AudioAsset;
use crate::broadcast::{BroadcastGroup, Emitter, EmitterHost, EmitterRelease, ListenerTransport};
use crate::catalog::AssetCatalog;
use crate::error::{Error, Result};
use crate::playback::{EngineConfig, PlaybackEngine};
use sonicast_common::ControllerIdPool;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub struct AudioService {
    config: EngineConfig,
    catalog: Arc<AssetCatalog>,
    transport: Arc<dyn ListenerTransport>,
    host: Arc<dyn EmitterHost>,
    ids: ControllerIdPool,
    groups: HashMap<String, BroadcastGroup>,
    engines: HashMap<String, PlaybackEngine>,
    /// Catalog reload running on the blocking pool
    reload: Option<JoinHandle<()>>,
}

impl AudioService {
    /// Build the service.
    ///
    /// # Errors
    /// `Config` when `config` fails validation.
    pub fn new(
        config: EngineConfig,
        catalog: Arc<AssetCatalog>,
        transport: Arc<dyn ListenerTransport>,
        host: Arc<dyn EmitterHost>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            catalog,
            transport,
            host,
            ids: ControllerIdPool::default(),
            groups: HashMap::new(),
            engines: HashMap::new(),
            reload: None,
        })
    }

    /// Replace the controller id pool (e.g. to reserve low ids)
    pub fn with_id_pool(mut self, ids: ControllerIdPool) -> Self {
        self.ids = ids;
        self
    }

    pub fn catalog(&self) -> &Arc<AssetCatalog> {
        &self.catalog
    }

    pub fn transport(&self) -> &Arc<dyn ListenerTransport> {
        &self.transport
    }

    pub fn ids(&self) -> &ControllerIdPool {
        &self.ids
    }

    // ========================================
    // Broadcast groups
    // ========================================

    /// Create an empty broadcast group.
    ///
    /// # Errors
    /// `InvalidArgument` when the name is empty or taken.
    pub fn create_group(&mut self, name: &str) -> Result<&mut BroadcastGroup> {
        if name.is_empty() {
            return Err(Error::InvalidArgument("empty group name".to_string()));
        }
        if self.groups.contains_key(name) {
            return Err(Error::InvalidArgument(format!("group '{}' already exists", name)));
        }
        info!("Created broadcast group '{}'", name);
        Ok(self
            .groups
            .entry(name.to_string())
            .or_insert_with(|| BroadcastGroup::new(name, Arc::clone(&self.host))))
    }

    pub fn group(&self, name: &str) -> Result<&BroadcastGroup> {
        self.groups
            .get(name)
            .ok_or_else(|| Error::NotFound(format!("broadcast group '{}'", name)))
    }

    pub fn group_mut(&mut self, name: &str) -> Result<&mut BroadcastGroup> {
        self.groups
            .get_mut(name)
            .ok_or_else(|| Error::NotFound(format!("broadcast group '{}'", name)))
    }

    /// Group names, sorted
    pub fn group_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.groups.keys().cloned().collect();
        names.sort();
        names
    }

    /// Make sure `group` has an emitter called `name` with its own id.
    ///
    /// Returns the emitter's controller id and whether it was created.
    ///
    /// # Errors
    /// `NotFound` for an unknown group; `InvalidState` when the id pool is
    /// exhausted.
    pub fn ensure_group_emitter<F>(&mut self, group: &str, name: &str, configure: F) -> Result<(u8, bool)>
    where
        F: FnOnce(&mut Emitter, bool),
    {
        let target = self
            .groups
            .get_mut(group)
            .ok_or_else(|| Error::NotFound(format!("broadcast group '{}'", group)))?;

        if let Some(existing) = target.emitter(name) {
            let id = existing.controller_id();
            target.ensure_emitter(name, id, configure);
            return Ok((id, false));
        }

        let id = self.ids.lease()?;
        target.ensure_emitter(name, id, configure);
        Ok((id, true))
    }

    /// Add an emitter that shares `controller_id` with an existing one.
    ///
    /// # Errors
    /// `NotFound` for an unknown group; `InvalidArgument` when the id is not
    /// currently leased.
    pub fn ensure_shared_emitter<F>(
        &mut self,
        group: &str,
        name: &str,
        controller_id: u8,
        configure: F,
    ) -> Result<bool>
    where
        F: FnOnce(&mut Emitter, bool),
    {
        let target = self
            .groups
            .get_mut(group)
            .ok_or_else(|| Error::NotFound(format!("broadcast group '{}'", group)))?;

        self.ids.retain(controller_id)?;
        let created = target.ensure_emitter(name, controller_id, configure);
        if !created {
            self.ids.free(controller_id);
        }
        Ok(created)
    }

    /// Destroy a named emitter and return its id to the pool.
    ///
    /// # Errors
    /// `NotFound` for an unknown group.
    pub fn destroy_group_emitter(&mut self, group: &str, name: &str) -> Result<Option<EmitterRelease>> {
        let release = self.group_mut(group)?.destroy_emitter(name);
        if let Some(release) = release {
            if self.ids.free(release.controller_id) {
                debug!("Controller id {} returned to pool", release.controller_id);
            }
        }
        Ok(release)
    }

    /// Remove a group, destroying its emitters and detaching every engine
    /// bound to it. Returns the number of emitters destroyed.
    ///
    /// # Errors
    /// `NotFound` for an unknown group.
    pub fn remove_group(&mut self, name: &str) -> Result<usize> {
        let mut group = self
            .groups
            .remove(name)
            .ok_or_else(|| Error::NotFound(format!("broadcast group '{}'", name)))?;

        let leased: Vec<u8> = group
            .emitter_names()
            .filter_map(|n| group.emitter(n).map(Emitter::controller_id))
            .collect();
        let destroyed = group.destroy_all();
        for id in leased {
            self.ids.free(id);
        }

        for engine in self.engines.values_mut() {
            if engine.bound_group() == Some(name) {
                engine.detach();
                warn!("Engine '{}' detached from removed group '{}'", engine.name(), name);
            }
        }

        info!("Removed broadcast group '{}' ({} emitters)", name, destroyed);
        Ok(destroyed)
    }

    // ========================================
    // Engines
    // ========================================

    /// Create an idle engine.
    ///
    /// # Errors
    /// `InvalidArgument` when the name is empty or taken.
    pub fn create_engine(&mut self, name: &str) -> Result<&mut PlaybackEngine> {
        if name.is_empty() {
            return Err(Error::InvalidArgument("empty engine name".to_string()));
        }
        if self.engines.contains_key(name) {
            return Err(Error::InvalidArgument(format!("engine '{}' already exists", name)));
        }
        let engine = PlaybackEngine::new(name, self.config)?;
        info!("Created playback engine '{}'", name);
        Ok(self.engines.entry(name.to_string()).or_insert(engine))
    }

    pub fn engine(&self, name: &str) -> Result<&PlaybackEngine> {
        self.engines
            .get(name)
            .ok_or_else(|| Error::NotFound(format!("engine '{}'", name)))
    }

    pub fn engine_mut(&mut self, name: &str) -> Result<&mut PlaybackEngine> {
        self.engines
            .get_mut(name)
            .ok_or_else(|| Error::NotFound(format!("engine '{}'", name)))
    }

    /// Engine names, sorted
    pub fn engine_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.engines.keys().cloned().collect();
        names.sort();
        names
    }

    /// Bind an engine to an existing group.
    ///
    /// # Errors
    /// `NotFound` when either the engine or the group is unknown.
    pub fn bind_engine(&mut self, engine: &str, group: &str) -> Result<()> {
        self.group(group)?;
        self.engine_mut(engine)?.bind_group(group)
    }

    /// Dispose and remove an engine.
    ///
    /// # Errors
    /// `NotFound` for an unknown engine.
    pub fn dispose_engine(&mut self, name: &str) -> Result<()> {
        let mut engine = self
            .engines
            .remove(name)
            .ok_or_else(|| Error::NotFound(format!("engine '{}'", name)))?;
        engine.dispose();
        Ok(())
    }

    /// Resolve `clip_id` in the catalog and play it on `engine`.
    ///
    /// # Errors
    /// `NotFound` for an unknown engine or clip; otherwise as
    /// [`PlaybackEngine::play`].
    pub fn play(&mut self, engine: &str, clip_id: &str, override_current: bool) -> Result<()> {
        let clip: Arc<AudioAsset> = self.catalog.get(clip_id)?;
        self.engine_mut(engine)?.play(clip, override_current)
    }

    /// Start reloading the catalog directory on tokio's blocking pool.
    ///
    /// Returns `false` when a reload is already running. Engines keep
    /// ticking meanwhile; clips they hold stay alive through their `Arc`.
    ///
    /// # Errors
    /// `InvalidState` when the catalog was never loaded from a directory or
    /// no tokio runtime is running.
    pub fn reload_catalog(&mut self) -> Result<bool> {
        if self.reload.as_ref().is_some_and(|task| !task.is_finished()) {
            debug!("Catalog reload already running");
            return Ok(false);
        }
        let dir = self
            .catalog
            .directory()
            .ok_or_else(|| Error::InvalidState("catalog was never loaded".to_string()))?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| Error::InvalidState("catalog reload needs a tokio runtime".to_string()))?;

        let catalog = Arc::clone(&self.catalog);
        self.reload = Some(runtime.spawn_blocking(move || match catalog.load(&dir) {
            Ok(count) => info!("Reloaded {} assets from {}", count, dir.display()),
            Err(e) => warn!("Reload of {} failed: {}", dir.display(), e),
        }));
        Ok(true)
    }

    /// Wait for a running catalog reload, if any
    pub async fn reload_finished(&mut self) {
        if let Some(task) = self.reload.take() {
            if let Err(e) = task.await {
                warn!("Catalog reload task failed: {}", e);
            }
        }
    }

    /// Drive every engine by `elapsed`; returns packets produced.
    ///
    /// Per-engine errors are logged and do not stop other engines.
    pub fn tick(&mut self, elapsed: Duration) -> usize {
        let transport = self.transport.as_ref();
        let mut packets = 0;
        for engine in self.engines.values_mut() {
            if let Err(e) = engine.poll_decoder() {
                warn!("Engine '{}': decode poll failed: {}", engine.name(), e);
                continue;
            }
            let group = engine.bound_group().and_then(|g| self.groups.get(g));
            match engine.update(elapsed, group, transport) {
                Ok(n) => packets += n,
                Err(e) => warn!("Engine '{}': update failed: {}", engine.name(), e),
            }
        }
        packets
    }

    /// Dispose every engine, remove every group and release every id
    pub fn shutdown(&mut self) {
        for (_, mut engine) in self.engines.drain() {
            engine.dispose();
        }
        for (_, mut group) in self.groups.drain() {
            group.destroy_all();
        }
        let released = self.ids.free_all();
        info!("Audio service shut down ({} controller ids released)", released);
    }
}

impl Drop for AudioService {
    fn drop(&mut self) {
        if !self.engines.is_empty() || !self.groups.is_empty() {
            self.shutdown();
        }
    }
}

impl std::fmt::Debug for AudioService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioService")
            .field("config", &self.config)
            .field("groups", &self.group_names())
            .field("engines", &self.engine_names())
            .field("catalog", &self.catalog)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::FormatRequirements;
    use crate::broadcast::{LoggingEmitterHost, MemoryTransport};

    fn service() -> AudioService {
        AudioService::new(
            EngineConfig::default(),
            Arc::new(AssetCatalog::new(FormatRequirements::default())),
            Arc::new(MemoryTransport::new()),
            Arc::new(LoggingEmitterHost),
        )
        .unwrap()
    }

    #[test]
    fn test_duplicate_group_rejected() {
        let mut service = service();
        service.create_group("lobby").unwrap();
        assert!(matches!(service.create_group("lobby"), Err(Error::InvalidArgument(_))));
        assert!(matches!(service.group("hall"), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_ensure_group_emitter_leases_once() {
        let mut service = service();
        service.create_group("lobby").unwrap();

        let (id, created) = service.ensure_group_emitter("lobby", "a", |_, _| {}).unwrap();
        assert!(created);
        let (again, created) = service.ensure_group_emitter("lobby", "a", |_, _| {}).unwrap();
        assert!(!created);
        assert_eq!(id, again);
        assert_eq!(service.ids().holders(id), 1);

        let release = service.destroy_group_emitter("lobby", "a").unwrap().unwrap();
        assert!(release.id_released);
        assert!(!service.ids().is_leased(id));
    }

    #[test]
    fn test_shared_emitter_refcount() {
        let mut service = service();
        service.create_group("g").unwrap();
        let (id, _) = service.ensure_group_emitter("g", "a", |_, _| {}).unwrap();
        assert!(service.ensure_shared_emitter("g", "b", id, |_, _| {}).unwrap());
        assert_eq!(service.ids().holders(id), 2);

        service.destroy_group_emitter("g", "a").unwrap();
        assert!(service.ids().is_leased(id));
        assert!(service.group("g").unwrap().has_source_id(id));

        service.destroy_group_emitter("g", "b").unwrap();
        assert!(!service.ids().is_leased(id));
    }

    #[test]
    fn test_remove_group_detaches_engines() {
        let mut service = service();
        service.create_group("g").unwrap();
        let (id, _) = service.ensure_group_emitter("g", "a", |_, _| {}).unwrap();
        service.create_engine("e").unwrap();
        service.bind_engine("e", "g").unwrap();

        assert_eq!(service.remove_group("g").unwrap(), 1);
        assert!(!service.ids().is_leased(id));
        assert!(service.engine("e").unwrap().bound_group().is_none());
    }

    #[test]
    fn test_reload_needs_loaded_catalog() {
        let mut service = service();
        assert!(matches!(service.reload_catalog(), Err(Error::InvalidState(_))));
    }

    #[test]
    fn test_play_unknown_clip() {
        let mut service = service();
        service.create_engine("e").unwrap();
        assert!(matches!(service.play("e", "missing", false), Err(Error::NotFound(_))));
        assert!(matches!(service.dispose_engine("nope"), Err(Error::NotFound(_))));
        service.dispose_engine("e").unwrap();
        assert!(service.engine("e").is_err());
    }
}
