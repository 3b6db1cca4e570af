//! Asset catalog
//!
//! Registry of playable [`AudioAsset`]s loaded from a flat directory. The
//! file stem is the asset id. Every asset is probe-validated before it is
//! admitted; files failing the format contract are logged and left out, and
//! a bad file never aborts a load or reload.
//!
//! The catalog is shared between the tick task (reads) and the directory
//! watcher (writes), so the entry set sits behind a single `RwLock`. A full
//! reload builds the new set off-lock and swaps it in one write.

pub mod watch;

use crate::audio::{asset_id_for, AudioAsset, FormatRequirements};
use crate::error::{Error, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

pub use watch::CatalogWatcher;

/// Change notification published by the catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogEvent {
    /// A new asset id became available
    Added(String),
    /// An existing asset was replaced with new content
    Updated(String),
    /// An asset id is no longer available
    Removed(String),
}

/// Insertion-ordered asset set keyed by id
#[derive(Default)]
struct AssetEntries {
    order: Vec<Arc<AudioAsset>>,
    index: HashMap<String, usize>,
}

impl AssetEntries {
    fn get(&self, id: &str) -> Option<&Arc<AudioAsset>> {
        self.index.get(id).map(|&i| &self.order[i])
    }

    /// Insert or replace; returns `true` when an existing entry was replaced
    fn upsert(&mut self, asset: Arc<AudioAsset>) -> bool {
        match self.index.get(asset.id()) {
            Some(&i) => {
                self.order[i] = asset;
                true
            }
            None => {
                self.index.insert(asset.id().to_string(), self.order.len());
                self.order.push(asset);
                false
            }
        }
    }

    fn remove(&mut self, id: &str) -> Option<Arc<AudioAsset>> {
        let i = self.index.remove(id)?;
        let removed = self.order.remove(i);
        for asset in &self.order[i..] {
            if let Some(slot) = self.index.get_mut(asset.id()) {
                *slot -= 1;
            }
        }
        Some(removed)
    }

    fn ids(&self) -> Vec<String> {
        self.order.iter().map(|a| a.id().to_string()).collect()
    }
}

/// Registry of validated audio assets
pub struct AssetCatalog {
    requirements: FormatRequirements,
    directory: RwLock<Option<PathBuf>>,
    entries: RwLock<AssetEntries>,
    events: broadcast::Sender<CatalogEvent>,
}

impl AssetCatalog {
    /// Create an empty catalog admitting assets matching `requirements`
    pub fn new(requirements: FormatRequirements) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            requirements,
            directory: RwLock::new(None),
            entries: RwLock::new(AssetEntries::default()),
            events,
        }
    }

    fn read_entries(&self) -> RwLockReadGuard<'_, AssetEntries> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_entries(&self) -> RwLockWriteGuard<'_, AssetEntries> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, event: CatalogEvent) {
        // No receivers is OK
        let _ = self.events.send(event);
    }

    /// Format contract enforced on every asset
    pub fn requirements(&self) -> FormatRequirements {
        self.requirements
    }

    /// Directory of the last full load
    pub fn directory(&self) -> Option<PathBuf> {
        self.directory
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Subscribe to catalog change notifications
    pub fn subscribe(&self) -> broadcast::Receiver<CatalogEvent> {
        self.events.subscribe()
    }

    /// Replace the whole catalog with the valid files of `dir`.
    ///
    /// Publishes `Removed` for every previously held asset, then `Added` for
    /// every loaded one. Returns the number of loaded assets.
    ///
    /// # Errors
    /// Only an unreadable directory is an error; bad files are skipped.
    pub fn load(&self, dir: &Path) -> Result<usize> {
        info!("Loading audio assets from {}", dir.display());

        let mut fresh = AssetEntries::default();
        let mut skipped = 0usize;
        for entry in std::fs::read_dir(dir)? {
            let path = match entry {
                Ok(entry) => entry.path(),
                Err(e) => {
                    warn!("Failed to read directory entry in {}: {}", dir.display(), e);
                    continue;
                }
            };
            if !path.is_file() {
                continue;
            }
            match self.load_file(&path) {
                Some(asset) => {
                    if fresh.upsert(asset) {
                        warn!("Duplicate asset id from {}, later file wins", path.display());
                    }
                }
                None => skipped += 1,
            }
        }

        let added = fresh.ids();
        let previous = std::mem::replace(&mut *self.write_entries(), fresh);
        *self.directory.write().unwrap_or_else(PoisonError::into_inner) = Some(dir.to_path_buf());

        for asset in &previous.order {
            self.publish(CatalogEvent::Removed(asset.id().to_string()));
        }
        for id in &added {
            self.publish(CatalogEvent::Added(id.clone()));
        }

        info!(
            "Loaded {} audio assets ({} skipped) from {}",
            added.len(),
            skipped,
            dir.display()
        );
        Ok(added.len())
    }

    /// Read and validate one file; failures are logged and yield `None`
    fn load_file(&self, path: &Path) -> Option<Arc<AudioAsset>> {
        let asset = match AudioAsset::from_file(path, self.requirements) {
            Ok(asset) => asset,
            Err(e) => {
                warn!("Skipping {}: {}", path.display(), e);
                return None;
            }
        };
        match asset.validate() {
            Ok(info) => {
                debug!(
                    "Validated asset {} ({} Hz, {} ch, {:?} frames)",
                    asset.id(),
                    info.sample_rate,
                    info.channels,
                    info.frames
                );
                Some(Arc::new(asset))
            }
            Err(reason) => {
                warn!("Skipping {}: {}", path.display(), reason);
                None
            }
        }
    }

    /// Add or replace an asset from raw bytes.
    ///
    /// # Errors
    /// `InvalidArgument` carrying the probe reason when the bytes do not meet
    /// the format contract; the catalog is unchanged.
    pub fn insert_bytes(
        &self,
        id: &str,
        bytes: impl Into<Arc<[u8]>>,
        extension: Option<&str>,
    ) -> Result<CatalogEvent> {
        if id.is_empty() {
            return Err(Error::InvalidArgument("empty asset id".to_string()));
        }
        let asset = AudioAsset::from_bytes(
            id,
            bytes,
            extension.map(str::to_ascii_lowercase),
            self.requirements,
        );
        if let Err(reason) = asset.validate() {
            return Err(Error::InvalidArgument(format!("asset {}: {}", id, reason)));
        }
        Ok(self.admit(Arc::new(asset)))
    }

    fn admit(&self, asset: Arc<AudioAsset>) -> CatalogEvent {
        let id = asset.id().to_string();
        let replaced = self.write_entries().upsert(asset);
        let event = if replaced {
            CatalogEvent::Updated(id)
        } else {
            CatalogEvent::Added(id)
        };
        self.publish(event.clone());
        event
    }

    /// Look up an asset by exact id
    pub fn get(&self, id: &str) -> Result<Arc<AudioAsset>> {
        self.try_get(id)
            .ok_or_else(|| Error::NotFound(format!("audio asset '{}'", id)))
    }

    /// Look up an asset by exact id, `None` on miss
    pub fn try_get(&self, id: &str) -> Option<Arc<AudioAsset>> {
        self.read_entries().get(id).cloned()
    }

    /// Whether an asset with `id` is loaded
    pub fn contains(&self, id: &str) -> bool {
        self.read_entries().index.contains_key(id)
    }

    /// Asset ids in insertion order
    pub fn ids(&self) -> Vec<String> {
        self.read_entries().ids()
    }

    /// Number of loaded assets
    pub fn len(&self) -> usize {
        self.read_entries().order.len()
    }

    /// Whether the catalog is empty
    pub fn is_empty(&self) -> bool {
        self.read_entries().order.is_empty()
    }

    /// File created in the watched directory
    pub fn on_created(&self, path: &Path) -> Option<CatalogEvent> {
        self.refresh_file(path)
    }

    /// File modified in the watched directory
    pub fn on_changed(&self, path: &Path) -> Option<CatalogEvent> {
        self.refresh_file(path)
    }

    /// Re-probe one file; a failed probe leaves the entry for its id untouched
    fn refresh_file(&self, path: &Path) -> Option<CatalogEvent> {
        if !path.is_file() {
            return None;
        }
        let asset = self.load_file(path)?;
        let event = self.admit(asset);
        info!("Hot reload: {:?} from {}", event, path.display());
        Some(event)
    }

    /// File removed from the watched directory
    pub fn on_deleted(&self, path: &Path) -> Option<CatalogEvent> {
        let id = asset_id_for(path)?;
        self.remove(&id)
    }

    /// Remove an asset by id
    pub fn remove(&self, id: &str) -> Option<CatalogEvent> {
        self.write_entries().remove(id)?;
        let event = CatalogEvent::Removed(id.to_string());
        info!("Removed audio asset {}", id);
        self.publish(event.clone());
        Some(event)
    }
}

impl std::fmt::Debug for AssetCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssetCatalog")
            .field("requirements", &self.requirements)
            .field("directory", &self.directory())
            .field("assets", &self.len())
            .finish()
    }
}
