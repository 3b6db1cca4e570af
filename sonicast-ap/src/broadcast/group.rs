//! Broadcast groups
//!
//! A named set of emitters. Each emitter contributes its controller id to
//! the group's source set; transmitting a frame sends one copy per source id
//! to every matching listener. Several emitters may share one id, in which
//! case the id stays in the source set until the last of them is destroyed.

use super::emitter::{Emitter, EmitterHost};
use super::transport::{fan_out, validate_frame, ListenerTransport, ReceiveFilter};
use crate::error::{Error, Result};
use std::collections::{BTreeSet, HashMap};
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use tracing::{debug, info};

/// Outcome of destroying one named emitter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmitterRelease {
    /// Controller id the emitter used
    pub controller_id: u8,
    /// True when no other emitter shares the id and it left the source set
    pub id_released: bool,
}

/// Mutable emitter handle; the host is notified when it is dropped
pub struct EmitterMut<'a> {
    emitter: &'a mut Emitter,
    host: &'a dyn EmitterHost,
}

impl Deref for EmitterMut<'_> {
    type Target = Emitter;

    fn deref(&self) -> &Emitter {
        self.emitter
    }
}

impl DerefMut for EmitterMut<'_> {
    fn deref_mut(&mut self) -> &mut Emitter {
        self.emitter
    }
}

impl Drop for EmitterMut<'_> {
    fn drop(&mut self) {
        self.host.update(self.emitter);
    }
}

/// Named set of emitters sharing one output route
pub struct BroadcastGroup {
    name: String,
    source_ids: BTreeSet<u8>,
    emitters: HashMap<String, Emitter>,
    host: Arc<dyn EmitterHost>,
}

impl BroadcastGroup {
    /// Create an empty group whose emitters are materialized by `host`
    pub fn new(name: impl Into<String>, host: Arc<dyn EmitterHost>) -> Self {
        Self {
            name: name.into(),
            source_ids: BTreeSet::new(),
            emitters: HashMap::new(),
            host,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Controller ids frames are sent under, ascending
    pub fn source_ids(&self) -> impl Iterator<Item = u8> + '_ {
        self.source_ids.iter().copied()
    }

    pub fn has_source_id(&self, id: u8) -> bool {
        self.source_ids.contains(&id)
    }

    pub fn emitter(&self, name: &str) -> Option<&Emitter> {
        self.emitters.get(name)
    }

    /// Mutable access to a named emitter; changes reach the host on drop
    pub fn emitter_mut(&mut self, name: &str) -> Option<EmitterMut<'_>> {
        let host = self.host.as_ref();
        self.emitters
            .get_mut(name)
            .map(|emitter| EmitterMut { emitter, host })
    }

    /// Apply `f` to a named emitter and notify the host.
    ///
    /// # Errors
    /// `NotFound` when the group has no emitter called `name`.
    pub fn configure_emitter<R>(&mut self, name: &str, f: impl FnOnce(&mut Emitter) -> R) -> Result<R> {
        let group = self.name.clone();
        let mut emitter = self
            .emitter_mut(name)
            .ok_or_else(|| Error::NotFound(format!("emitter '{}' in group '{}'", name, group)))?;
        Ok(f(&mut emitter))
    }

    /// Names of all emitters (unordered)
    pub fn emitter_names(&self) -> impl Iterator<Item = &str> {
        self.emitters.keys().map(String::as_str)
    }

    pub fn emitter_count(&self) -> usize {
        self.emitters.len()
    }

    /// Make sure an emitter called `name` exists.
    ///
    /// A new emitter is created with `controller_id`, configured with
    /// `configure(&mut emitter, true)` and handed to the host; returns `true`.
    /// An existing one only gets `configure(&mut emitter, false)` and keeps
    /// its id; returns `false`.
    pub fn ensure_emitter<F>(&mut self, name: &str, controller_id: u8, configure: F) -> bool
    where
        F: FnOnce(&mut Emitter, bool),
    {
        if let Some(emitter) = self.emitters.get_mut(name) {
            configure(emitter, false);
            self.host.update(emitter);
            return false;
        }

        let mut emitter = Emitter::new(name, controller_id);
        configure(&mut emitter, true);
        self.host.create(&emitter);
        self.source_ids.insert(controller_id);
        self.emitters.insert(name.to_string(), emitter);
        debug!(
            "Group '{}': emitter '{}' on controller {}",
            self.name, name, controller_id
        );
        true
    }

    /// Destroy a named emitter; `None` when no such emitter exists
    pub fn destroy_emitter(&mut self, name: &str) -> Option<EmitterRelease> {
        let emitter = self.emitters.remove(name)?;
        let controller_id = emitter.controller_id();
        let shared = self
            .emitters
            .values()
            .any(|e| e.controller_id() == controller_id);
        if !shared {
            self.source_ids.remove(&controller_id);
        }
        self.host.destroy(&emitter);
        debug!("Group '{}': destroyed emitter '{}'", self.name, name);

        Some(EmitterRelease {
            controller_id,
            id_released: !shared,
        })
    }

    /// Destroy every emitter and forget every source id.
    ///
    /// Returns the number of emitters destroyed.
    pub fn destroy_all(&mut self) -> usize {
        let count = self.emitters.len();
        for (_, emitter) in self.emitters.drain() {
            self.host.destroy(&emitter);
        }
        self.source_ids.clear();
        if count > 0 {
            info!("Group '{}': destroyed {} emitters", self.name, count);
        }
        count
    }

    /// Add a raw controller id with no named emitter behind it
    pub fn add_source_id(&mut self, id: u8) -> bool {
        self.source_ids.insert(id)
    }

    /// Remove a raw controller id.
    ///
    /// # Errors
    /// `InvalidState` while a named emitter still uses the id.
    pub fn remove_source_id(&mut self, id: u8) -> Result<bool> {
        if let Some(emitter) = self.emitters.values().find(|e| e.controller_id() == id) {
            return Err(Error::InvalidState(format!(
                "controller {} still used by emitter '{}'",
                id,
                emitter.name()
            )));
        }
        Ok(self.source_ids.remove(&id))
    }

    /// Send `frame[..frame_len]` under every source id to every authenticated
    /// listener accepted by `filter`. Returns the number of sends performed.
    ///
    /// # Errors
    /// `InvalidArgument` when the frame breaks the transport limits; nothing
    /// is sent in that case.
    pub fn transmit(
        &self,
        frame: &[u8],
        frame_len: usize,
        filter: Option<&ReceiveFilter>,
        transport: &dyn ListenerTransport,
    ) -> Result<usize> {
        validate_frame(frame, frame_len)?;
        if self.source_ids.is_empty() {
            return Ok(0);
        }
        Ok(fan_out(
            self.source_ids.iter().copied(),
            &frame[..frame_len],
            transport,
            filter,
        ))
    }
}

impl std::fmt::Debug for BroadcastGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BroadcastGroup")
            .field("name", &self.name)
            .field("source_ids", &self.source_ids)
            .field("emitters", &self.emitters.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::{LoggingEmitterHost, MemoryTransport};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingHost {
        calls: Mutex<Vec<String>>,
    }

    impl EmitterHost for RecordingHost {
        fn create(&self, emitter: &Emitter) {
            self.calls.lock().unwrap().push(format!("create:{}", emitter.name()));
        }
        fn update(&self, emitter: &Emitter) {
            self.calls.lock().unwrap().push(format!("update:{}", emitter.name()));
        }
        fn destroy(&self, emitter: &Emitter) {
            self.calls.lock().unwrap().push(format!("destroy:{}", emitter.name()));
        }
    }

    fn group() -> BroadcastGroup {
        BroadcastGroup::new("lobby", Arc::new(LoggingEmitterHost))
    }

    #[test]
    fn test_ensure_is_idempotent() {
        let mut group = group();
        let mut seen = Vec::new();
        assert!(group.ensure_emitter("left", 4, |_, created| seen.push(created)));
        assert!(!group.ensure_emitter("left", 9, |_, created| seen.push(created)));
        assert_eq!(seen, vec![true, false]);
        assert_eq!(group.source_ids().collect::<Vec<_>>(), vec![4]);
        assert_eq!(group.emitter("left").unwrap().controller_id(), 4);
    }

    #[test]
    fn test_shared_id_released_by_last_emitter() {
        let mut group = group();
        group.ensure_emitter("a", 7, |_, _| {});
        group.ensure_emitter("b", 7, |_, _| {});

        let first = group.destroy_emitter("a").unwrap();
        assert!(!first.id_released);
        assert!(group.has_source_id(7));

        let second = group.destroy_emitter("b").unwrap();
        assert_eq!(second, EmitterRelease { controller_id: 7, id_released: true });
        assert!(!group.has_source_id(7));
        assert!(group.destroy_emitter("b").is_none());
    }

    #[test]
    fn test_host_sees_lifecycle() {
        let host = Arc::new(RecordingHost::default());
        let mut group = BroadcastGroup::new("g", host.clone());
        group.ensure_emitter("e", 1, |e, _| e.set_volume(0.5));
        group
            .configure_emitter("e", |e| e.set_position([1.0, 2.0, 3.0]))
            .unwrap();
        group.destroy_all();

        let calls = host.calls.lock().unwrap().clone();
        assert_eq!(calls, vec!["create:e", "update:e", "destroy:e"]);
    }

    #[test]
    fn test_configure_missing_emitter() {
        let mut group = group();
        assert!(matches!(
            group.configure_emitter("ghost", |_| ()),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_remove_source_id_in_use() {
        let mut group = group();
        group.ensure_emitter("e", 2, |_, _| {});
        assert!(group.remove_source_id(2).is_err());
        assert!(group.add_source_id(3));
        assert!(group.remove_source_id(3).unwrap());
    }

    #[test]
    fn test_transmit_without_sources_is_noop() {
        let group = group();
        let transport = MemoryTransport::new();
        transport.connect(1, true);
        assert_eq!(group.transmit(&[1, 2], 2, None, &transport).unwrap(), 0);
        assert_eq!(transport.sent_count(), 0);
    }

    #[test]
    fn test_transmit_rejects_bad_length_before_sending() {
        let mut group = group();
        group.add_source_id(5);
        let transport = MemoryTransport::new();
        transport.connect(1, true);

        assert!(group.transmit(&[0; 4], 5, None, &transport).is_err());
        assert_eq!(transport.sent_count(), 0);
    }

    #[test]
    fn test_transmit_truncates_to_frame_len() {
        let mut group = group();
        group.add_source_id(5);
        let transport = MemoryTransport::new();
        transport.connect(1, true);

        assert_eq!(group.transmit(&[1, 2, 3, 4], 2, None, &transport).unwrap(), 1);
        assert_eq!(transport.sent()[0].payload, vec![1, 2]);
    }
}
