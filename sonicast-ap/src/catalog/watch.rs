//! Directory watch for catalog hot reload
//!
//! `notify` delivers events on its own native thread. The callback only
//! forwards them over an unbounded channel; a tokio task collects the
//! touched paths, waits for the directory to go quiet, then applies each path
//! to the catalog on tokio's blocking pool, since each one is read and probed
//! with symphonia. Whether a path counts as created/changed or deleted is
//! decided by looking at the file at apply time, so a burst of rename and
//! write events collapses into one probe of the final file.

use super::AssetCatalog;
use crate::error::{Error, Result};
use notify::event::{EventKind, ModifyKind};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Quiet period before touched paths are applied
pub const WATCH_DEBOUNCE: Duration = Duration::from_millis(250);

/// Whether an event kind can change the catalog.
///
/// Attribute, creation, name and content changes count; access events and
/// unknown kinds do not.
pub fn is_relevant(kind: &EventKind) -> bool {
    match kind {
        EventKind::Create(_) | EventKind::Remove(_) => true,
        EventKind::Modify(modify) => matches!(
            modify,
            ModifyKind::Data(_) | ModifyKind::Metadata(_) | ModifyKind::Name(_) | ModifyKind::Any
        ),
        EventKind::Access(_) | EventKind::Any | EventKind::Other => false,
    }
}

/// Apply one touched path to the catalog
pub fn apply_path(catalog: &AssetCatalog, path: &Path) {
    if path.is_file() {
        if catalog.on_changed(path).is_none() {
            debug!("Hot reload left {} unchanged", path.display());
        }
    } else if !path.exists() {
        catalog.on_deleted(path);
    }
}

/// Apply a batch of touched paths off the async workers
pub async fn apply_paths(catalog: &Arc<AssetCatalog>, paths: Vec<PathBuf>) {
    if paths.is_empty() {
        return;
    }
    let catalog = Arc::clone(catalog);
    let applied = tokio::task::spawn_blocking(move || {
        for path in &paths {
            apply_path(&catalog, path);
        }
    })
    .await;
    if let Err(e) = applied {
        warn!("Hot reload batch failed: {}", e);
    }
}

/// Running directory watch; dropping it stops the watch
pub struct CatalogWatcher {
    _watcher: RecommendedWatcher,
    task: JoinHandle<()>,
    directory: PathBuf,
}

impl CatalogWatcher {
    /// Watch `dir` (non-recursive) and apply changes to `catalog`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(catalog: Arc<AssetCatalog>, dir: &Path) -> Result<Self> {
        let (fs_tx, fs_rx) = mpsc::unbounded_channel::<notify::Result<notify::Event>>();
        let mut watcher = notify::recommended_watcher(move |res| {
            let _ = fs_tx.send(res);
        })
        .map_err(|e| Error::Config(format!("fs watcher init failed: {}", e)))?;

        watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .map_err(|e| Error::Config(format!("cannot watch {}: {}", dir.display(), e)))?;

        info!("Watching {} for asset changes", dir.display());

        let task = tokio::spawn(run_apply_loop(catalog, fs_rx));

        Ok(Self {
            _watcher: watcher,
            task,
            directory: dir.to_path_buf(),
        })
    }

    /// Watched directory
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Stop applying events
    pub fn shutdown(self) {
        self.task.abort();
    }
}

impl Drop for CatalogWatcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run_apply_loop(
    catalog: Arc<AssetCatalog>,
    mut fs_rx: mpsc::UnboundedReceiver<notify::Result<notify::Event>>,
) {
    let mut dirty: HashSet<PathBuf> = HashSet::new();
    loop {
        let received = if dirty.is_empty() {
            fs_rx.recv().await
        } else {
            match tokio::time::timeout(WATCH_DEBOUNCE, fs_rx.recv()).await {
                Ok(received) => received,
                Err(_) => {
                    // Quiet period elapsed
                    apply_paths(&catalog, dirty.drain().collect()).await;
                    continue;
                }
            }
        };

        match received {
            Some(Ok(event)) => {
                if is_relevant(&event.kind) {
                    dirty.extend(event.paths);
                }
            }
            Some(Err(e)) => warn!("Directory watch error: {}", e),
            None => break,
        }
    }

    // Watcher dropped: flush what we already saw
    apply_paths(&catalog, dirty.drain().collect()).await;
    debug!("Catalog watch loop stopped");
}
