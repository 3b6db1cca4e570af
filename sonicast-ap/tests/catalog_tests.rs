//! Asset catalog integration tests
//!
//! Load real WAV files from a temp directory and check which ones are
//! admitted, what events are published, and that hot reload follows the
//! directory.

mod helpers;

use helpers::*;
use sonicast_ap::audio::FormatRequirements;
use sonicast_ap::catalog::watch::apply_paths;
use sonicast_ap::catalog::{AssetCatalog, CatalogEvent, CatalogWatcher};
use sonicast_ap::Error;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn catalog() -> AssetCatalog {
    AssetCatalog::new(FormatRequirements::default())
}

#[test]
fn test_load_admits_only_valid_mono_48k_files() {
    let dir = TempDir::new().unwrap();
    generate_constant_wav(dir.path().join("chime.wav"), 4_800, 1000).unwrap();
    generate_tone_wav(dir.path().join("tone.wav"), 100, 440.0, 0.5).unwrap();
    generate_stereo_wav(dir.path().join("stereo.wav"), 4_800).unwrap();
    generate_wrong_rate_wav(dir.path().join("cd_rate.wav"), 4_410).unwrap();
    generate_empty_wav(dir.path().join("silent.wav")).unwrap();
    std::fs::write(dir.path().join("notes.txt"), "not audio").unwrap();
    std::fs::create_dir(dir.path().join("nested")).unwrap();

    let catalog = catalog();
    let loaded = catalog.load(dir.path()).unwrap();

    assert_eq!(loaded, 2);
    let mut ids = catalog.ids();
    ids.sort();
    assert_eq!(ids, vec!["chime", "tone"]);
    assert!(catalog.get("chime").unwrap().is_valid());
    assert!(matches!(catalog.get("stereo"), Err(Error::NotFound(_))));
    assert!(catalog.try_get("cd_rate").is_none());
    assert_eq!(catalog.directory().as_deref(), Some(dir.path()));
}

#[test]
fn test_load_of_missing_directory_fails() {
    let dir = TempDir::new().unwrap();
    let catalog = catalog();
    assert!(catalog.load(&dir.path().join("absent")).is_err());
    assert!(catalog.is_empty());
}

#[test]
fn test_reload_publishes_removed_then_added() {
    let fixture = AssetFixture::with_constant_clips(&[("one", 2_400, 100)]);
    let mut events = fixture.catalog.subscribe();

    std::fs::remove_file(fixture.path("one.wav")).unwrap();
    generate_constant_wav(fixture.path("two.wav"), 2_400, 200).unwrap();
    assert_eq!(fixture.catalog.load(fixture.dir_path()).unwrap(), 1);

    assert_eq!(events.try_recv().unwrap(), CatalogEvent::Removed("one".to_string()));
    assert_eq!(events.try_recv().unwrap(), CatalogEvent::Added("two".to_string()));
    assert!(events.try_recv().is_err());
    assert_eq!(fixture.catalog.ids(), vec!["two"]);
}

#[test]
fn test_file_events_update_single_entries() {
    let fixture = AssetFixture::with_constant_clips(&[("bell", 2_400, 100)]);
    let catalog = &fixture.catalog;
    let before = catalog.get("bell").unwrap();

    generate_constant_wav(fixture.path("bell.wav"), 4_800, 300).unwrap();
    assert_eq!(
        catalog.on_changed(&fixture.path("bell.wav")),
        Some(CatalogEvent::Updated("bell".to_string()))
    );
    let after = catalog.get("bell").unwrap();
    assert!(!Arc::ptr_eq(&before, &after));
    assert!(after.len() > before.len());

    generate_constant_wav(fixture.path("gong.wav"), 2_400, 100).unwrap();
    assert_eq!(
        catalog.on_created(&fixture.path("gong.wav")),
        Some(CatalogEvent::Added("gong".to_string()))
    );

    std::fs::remove_file(fixture.path("bell.wav")).unwrap();
    assert_eq!(
        catalog.on_deleted(&fixture.path("bell.wav")),
        Some(CatalogEvent::Removed("bell".to_string()))
    );
    assert_eq!(catalog.ids(), vec!["gong"]);

    // Already gone
    assert_eq!(catalog.on_deleted(&fixture.path("bell.wav")), None);
}

#[test]
fn test_invalid_replacement_keeps_existing_entry() {
    let fixture = AssetFixture::with_constant_clips(&[("bell", 2_400, 100)]);
    let before = fixture.catalog.get("bell").unwrap();

    generate_stereo_wav(fixture.path("bell.wav"), 2_400).unwrap();
    assert_eq!(fixture.catalog.on_changed(&fixture.path("bell.wav")), None);
    assert!(Arc::ptr_eq(&before, &fixture.catalog.get("bell").unwrap()));

    generate_wrong_rate_wav(fixture.path("fresh.wav"), 2_400).unwrap();
    assert_eq!(fixture.catalog.on_created(&fixture.path("fresh.wav")), None);
    assert!(!fixture.catalog.contains("fresh"));
}

#[test]
fn test_insert_bytes_validates_format() {
    let dir = TempDir::new().unwrap();
    let good = dir.path().join("good.wav");
    let bad = dir.path().join("bad.wav");
    generate_constant_wav(&good, 2_400, 100).unwrap();
    generate_stereo_wav(&bad, 2_400).unwrap();

    let catalog = catalog();
    let event = catalog
        .insert_bytes("uploaded", std::fs::read(&good).unwrap(), Some("WAV"))
        .unwrap();
    assert_eq!(event, CatalogEvent::Added("uploaded".to_string()));
    assert_eq!(catalog.get("uploaded").unwrap().extension(), Some("wav"));

    let rejected = catalog.insert_bytes("uploaded", std::fs::read(&bad).unwrap(), Some("wav"));
    assert!(matches!(rejected, Err(Error::InvalidArgument(_))));
    assert_eq!(catalog.len(), 1);
}

#[tokio::test]
async fn test_apply_paths_batch_updates_catalog() {
    let fixture = AssetFixture::with_constant_clips(&[("old", 2_400, 100)]);
    let mut events = fixture.catalog.subscribe();

    generate_constant_wav(fixture.path("new.wav"), 2_400, 200).unwrap();
    std::fs::remove_file(fixture.path("old.wav")).unwrap();
    apply_paths(&fixture.catalog, vec![fixture.path("new.wav")]).await;
    apply_paths(&fixture.catalog, vec![fixture.path("old.wav")]).await;

    assert_eq!(events.try_recv().unwrap(), CatalogEvent::Added("new".to_string()));
    assert_eq!(events.try_recv().unwrap(), CatalogEvent::Removed("old".to_string()));
    assert_eq!(fixture.catalog.ids(), vec!["new"]);

    // Empty batch is a no-op
    apply_paths(&fixture.catalog, Vec::new()).await;
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_watcher_picks_up_new_file() {
    let fixture = AssetFixture::with_constant_clips(&[("first", 2_400, 100)]);
    let mut events = fixture.catalog.subscribe();
    let watcher = CatalogWatcher::spawn(Arc::clone(&fixture.catalog), fixture.dir_path()).unwrap();
    assert_eq!(watcher.directory(), fixture.dir_path());

    // Write elsewhere, then move in whole so the watcher never sees half a file
    let staging = TempDir::new_in(fixture.dir_path().parent().unwrap()).unwrap();
    let staged = staging.path().join("late.wav");
    generate_constant_wav(&staged, 2_400, 500).unwrap();
    std::fs::rename(&staged, fixture.path("late.wav")).unwrap();

    let added = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match events.recv().await {
                Ok(CatalogEvent::Added(id)) if id == "late" => break,
                Ok(_) => continue,
                Err(e) => panic!("event stream closed: {}", e),
            }
        }
    })
    .await;

    assert!(added.is_ok(), "watcher did not report the new file");
    assert!(fixture.catalog.contains("late"));
    watcher.shutdown();
}
