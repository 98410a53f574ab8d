mod common;

use async_trait::async_trait;
use bridge_traits::change_log::{ChangeEvent, ChangeKind};
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::storage::{BlobStore, SettingsStore};
use bytes::Bytes;
use common::*;
use core_library::{MediaKind, PathKey};
use core_runtime::events::{CatalogEvent, CoreEvent, ScanEvent};
use core_sync::settings::INCLUDE_REMOVABLE_KEY;
use core_sync::{LibrarySource, SyncError, SyncOutcome, SyncPath};
use mockall::mock;
use std::path::{Path, PathBuf};
use std::sync::Arc;

mock! {
    Blobs {}

    #[async_trait]
    impl BlobStore for Blobs {
        async fn load(&self, name: &str) -> BridgeResult<Option<Bytes>>;
        async fn save(&self, name: &str, data: Bytes) -> BridgeResult<()>;
        async fn delete(&self, name: &str) -> BridgeResult<()>;
    }
}

fn songs() -> Vec<bridge_traits::query::FolderItem> {
    vec![
        item("/music", "song1.mp3"),
        item("/music", "song2.flac"),
        item("/music", "cover.jpg"),
    ]
}

fn key(path: &str) -> PathKey {
    PathKey::new(Path::new(path))
}

fn drain(rx: &mut core_runtime::events::Receiver<CoreEvent>) -> Vec<CoreEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Runs one full crawl over `songs()` and leaves a snapshot in `blobs`.
async fn seed(blobs: Arc<SpyBlobStore>, log: Arc<ScriptedChangeLog>) {
    let h = harness(blobs);
    let query = Arc::new(ScriptedQuery::new("/music", songs()));
    h.sync
        .register_source(
            MediaKind::Music,
            LibrarySource::new(query).with_change_log(log),
        )
        .await;
    let outcome = h.sync.synchronize(MediaKind::Music, true).await.unwrap();
    assert!(matches!(outcome, SyncOutcome::FullCrawl(_)));
}

#[core_async::test]
async fn test_first_run_crawls_and_persists() {
    let blobs = Arc::new(SpyBlobStore::default());
    let log = Arc::new(ScriptedChangeLog::default());
    let h = harness(blobs.clone());
    let query = Arc::new(ScriptedQuery::new("/music", songs()));
    h.sync
        .register_source(
            MediaKind::Music,
            LibrarySource::new(query).with_change_log(log.clone()),
        )
        .await;

    let outcome = h.sync.synchronize(MediaKind::Music, true).await.unwrap();

    let report = match outcome {
        SyncOutcome::FullCrawl(report) => report,
        other => panic!("expected full crawl, got {other:?}"),
    };
    assert_eq!(report.path, SyncPath::Crawl);
    assert_eq!(report.records, 2);
    assert_eq!(report.added, 2);
    assert_eq!(report.removed, 0);
    assert_eq!(report.metadata_loaded, 2);
    assert_eq!(report.generation, 1);
    assert!(report.persisted);
    assert_eq!(blobs.save_count(), 1);

    let view = h.sync.get_catalog(MediaKind::Music);
    assert_eq!(view.len(), 2);
    assert!(view.records.iter().all(|r| r.membership_confirmed));
    assert_eq!(view.grouping.album_count(), 1);
    assert!(!h.sync.is_scanning(MediaKind::Music));
    assert!(h.sync.get_catalog(MediaKind::Video).is_empty());
}

#[core_async::test]
async fn test_second_run_reconciles_from_snapshot() {
    let blobs = Arc::new(SpyBlobStore::default());
    let log = Arc::new(ScriptedChangeLog::default());
    seed(blobs.clone(), log.clone()).await;

    log.push(ChangeEvent::file(
        ChangeKind::ContentsChanged,
        "/music/song1.mp3",
    ));

    let h = harness(blobs.clone());
    let query = Arc::new(ScriptedQuery::new("/music", songs()));
    h.sync
        .register_source(
            MediaKind::Music,
            LibrarySource::new(query.clone()).with_change_log(log.clone()),
        )
        .await;

    let outcome = h.sync.synchronize(MediaKind::Music, true).await.unwrap();

    let report = match outcome {
        SyncOutcome::Reconciled(report) => report,
        other => panic!("expected reconciled, got {other:?}"),
    };
    assert_eq!(report.path, SyncPath::Cache);
    assert_eq!(report.records, 2);
    assert_eq!(query.calls(), 0);
    assert_eq!(h.metadata.reads(), 0);
    assert_eq!(log.accepted(), 1);
    assert_eq!(blobs.save_count(), 2);

    let view = h.sync.get_catalog(MediaKind::Music);
    let song1 = view.record(&key("/music/song1.mp3")).unwrap();
    assert!(song1.needs_refresh);
    assert!(song1.metadata.is_some());
    assert!(!view.record(&key("/music/song2.flac")).unwrap().needs_refresh);
}

#[core_async::test]
async fn test_created_file_gets_metadata_on_cache_path() {
    let blobs = Arc::new(SpyBlobStore::default());
    let log = Arc::new(ScriptedChangeLog::default());
    seed(blobs.clone(), log.clone()).await;

    log.push(ChangeEvent::file(ChangeKind::Created, "/music/song3.mp3"));
    log.push(ChangeEvent::file(ChangeKind::Deleted, "/music/song2.flac"));
    log.push(ChangeEvent::file(ChangeKind::Created, "/music/notes.txt"));

    let h = harness(blobs);
    h.sync
        .register_source(
            MediaKind::Music,
            LibrarySource::new(Arc::new(ScriptedQuery::new("/music", songs())))
                .with_change_log(log.clone()),
        )
        .await;

    let outcome = h.sync.synchronize(MediaKind::Music, true).await.unwrap();
    let report = outcome.report().unwrap();
    assert_eq!(report.path, SyncPath::Cache);
    assert_eq!(report.metadata_loaded, 1);
    assert_eq!(h.metadata.reads(), 1);
    assert_eq!(log.accepted(), 3);

    let view = h.sync.get_catalog(MediaKind::Music);
    assert_eq!(view.len(), 2);
    assert!(view.record(&key("/music/song3.mp3")).unwrap().metadata.is_some());
    assert!(view.record(&key("/music/song2.flac")).is_none());
}

#[core_async::test]
async fn test_created_file_with_unreadable_metadata_is_kept_and_retried() {
    let blobs = Arc::new(SpyBlobStore::default());
    let log = Arc::new(ScriptedChangeLog::default());
    seed(blobs.clone(), log.clone()).await;

    log.push(ChangeEvent::file(ChangeKind::Created, "/music/broken.mp3"));

    let h = harness(blobs);
    let query = Arc::new(ScriptedQuery::new("/music", songs()));
    h.sync
        .register_source(
            MediaKind::Music,
            LibrarySource::new(query.clone()).with_change_log(log.clone()),
        )
        .await;

    let outcome = h.sync.synchronize(MediaKind::Music, true).await.unwrap();
    let report = outcome.report().unwrap();
    assert_eq!(report.path, SyncPath::Cache);
    assert_eq!(report.records, 3);
    assert_eq!(report.metadata_failures, 1);
    assert!(report.persisted);
    assert_eq!(log.accepted(), 1);

    let broken = key("/music/broken.mp3");
    let view = h.sync.get_catalog(MediaKind::Music);
    assert!(view.record(&broken).unwrap().metadata.is_none());
    assert_eq!(h.metadata.reads(), 1);

    // No new events: the record comes back from the snapshot and is read again.
    let outcome = h.sync.synchronize(MediaKind::Music, true).await.unwrap();
    let report = outcome.report().unwrap();
    assert_eq!(report.path, SyncPath::Cache);
    assert_eq!(report.records, 3);
    assert!(h.sync.get_catalog(MediaKind::Music).record(&broken).is_some());
    assert_eq!(h.metadata.reads(), 2);
    assert_eq!(query.calls(), 0);
}

#[core_async::test]
async fn test_folder_change_forces_crawl_but_reuses_metadata() {
    let blobs = Arc::new(SpyBlobStore::default());
    let log = Arc::new(ScriptedChangeLog::default());
    seed(blobs.clone(), log.clone()).await;

    let h = harness(blobs);
    let query = Arc::new(ScriptedQuery::new("/music", songs()));
    h.sync
        .register_source(
            MediaKind::Music,
            LibrarySource::new(query.clone())
                .with_folders(vec![PathBuf::from("/music"), PathBuf::from("/podcasts")])
                .with_change_log(log.clone()),
        )
        .await;

    let outcome = h.sync.synchronize(MediaKind::Music, true).await.unwrap();

    assert!(matches!(outcome, SyncOutcome::FullCrawl(_)));
    assert_eq!(log.reads(), 0);
    assert!(query.calls() > 0);
    // Snapshot records with unchanged size and mtime keep their metadata.
    assert_eq!(h.metadata.reads(), 0);
    assert_eq!(h.sync.get_catalog(MediaKind::Music).len(), 2);
}

#[core_async::test]
async fn test_tracking_lost_falls_back_to_crawl() {
    let blobs = Arc::new(SpyBlobStore::default());
    let log = Arc::new(ScriptedChangeLog::default());
    seed(blobs.clone(), log.clone()).await;

    log.push(ChangeEvent::tracking_lost());

    let h = harness(blobs);
    let mut items = songs();
    items.push(item("/music", "song3.mp3"));
    h.sync
        .register_source(
            MediaKind::Music,
            LibrarySource::new(Arc::new(ScriptedQuery::new("/music", items)))
                .with_change_log(log.clone()),
        )
        .await;

    let outcome = h.sync.synchronize(MediaKind::Music, true).await.unwrap();

    let report = outcome.report().unwrap();
    assert_eq!(report.path, SyncPath::Crawl);
    assert_eq!(report.records, 3);
    assert_eq!(h.metadata.reads(), 1);
    // The crawl covers everything up to the head captured before it started.
    assert_eq!(log.accepted(), 1);
}

#[core_async::test]
async fn test_corrupt_snapshot_is_treated_as_missing() {
    let blobs = Arc::new(SpyBlobStore::default());
    blobs
        .save("songs.cache", Bytes::from_static(b"{ not a snapshot"))
        .await
        .unwrap();
    let h = harness(blobs.clone());
    h.sync
        .register_source(
            MediaKind::Music,
            LibrarySource::new(Arc::new(ScriptedQuery::new("/music", songs())))
                .with_change_log(Arc::new(ScriptedChangeLog::default())),
        )
        .await;

    let outcome = h.sync.synchronize(MediaKind::Music, true).await.unwrap();

    assert_eq!(outcome.report().unwrap().path, SyncPath::Crawl);
    assert_eq!(h.sync.get_catalog(MediaKind::Music).len(), 2);
}

#[core_async::test]
async fn test_new_session_supersedes_running_one() {
    let blobs = Arc::new(SpyBlobStore::default());
    let h = harness(blobs.clone());
    let gate = Arc::new(Gate::default());
    let slow = Arc::new(ScriptedQuery::new("/music", vec![item("/music", "a.mp3")]).with_gate(gate.clone()));
    h.sync
        .register_source(MediaKind::Music, LibrarySource::new(slow))
        .await;

    let sync = Arc::clone(&h.sync);
    let first = core_async::spawn(async move { sync.synchronize(MediaKind::Music, false).await });
    gate.entered.notified().await;
    assert!(h.sync.is_scanning(MediaKind::Music));

    let fast = Arc::new(ScriptedQuery::new(
        "/music",
        vec![item("/music", "b.mp3"), item("/music", "c.mp3")],
    ));
    h.sync
        .register_source(MediaKind::Music, LibrarySource::new(fast))
        .await;
    let second = h.sync.synchronize(MediaKind::Music, false).await.unwrap();
    gate.release.notify_one();
    let first = first.await.unwrap();

    assert!(matches!(first, Err(SyncError::Cancelled)));
    assert_eq!(second.report().unwrap().records, 2);
    assert_eq!(blobs.save_count(), 1);

    let view = h.sync.get_catalog(MediaKind::Music);
    assert_eq!(view.generation, 1);
    assert!(view.record(&key("/music/b.mp3")).is_some());
    assert!(view.record(&key("/music/a.mp3")).is_none());
    assert!(!h.sync.is_scanning(MediaKind::Music));
}

#[core_async::test]
async fn test_cancel_discards_running_session() {
    let blobs = Arc::new(SpyBlobStore::default());
    let h = harness(blobs.clone());
    let mut events = h.events.subscribe();
    assert!(!h.sync.cancel(MediaKind::Music).await);

    let gate = Arc::new(Gate::default());
    let query = Arc::new(ScriptedQuery::new("/music", songs()).with_gate(gate.clone()));
    h.sync
        .register_source(MediaKind::Music, LibrarySource::new(query))
        .await;

    let sync = Arc::clone(&h.sync);
    let running = core_async::spawn(async move { sync.synchronize(MediaKind::Music, true).await });
    gate.entered.notified().await;

    assert!(h.sync.cancel(MediaKind::Music).await);
    gate.release.notify_one();

    assert!(matches!(running.await.unwrap(), Err(SyncError::Cancelled)));
    assert_eq!(blobs.save_count(), 0);
    assert_eq!(h.sync.get_catalog(MediaKind::Music).generation, 0);
    assert!(!h.sync.is_scanning(MediaKind::Music));

    let events = drain(&mut events);
    assert!(events
        .iter()
        .any(|e| matches!(e, CoreEvent::Scan(ScanEvent::Canceled { .. }))));
    assert!(!events
        .iter()
        .any(|e| matches!(e, CoreEvent::Catalog(CatalogEvent::Published { .. }))));
}

#[core_async::test]
async fn test_failed_save_keeps_catalog_and_checkpoint() {
    let mut blobs = MockBlobs::new();
    blobs.expect_load().returning(|_| Ok(None));
    blobs
        .expect_save()
        .times(1)
        .returning(|_, _| Err(BridgeError::OperationFailed("disk full".to_string())));

    let log = Arc::new(ScriptedChangeLog::default());
    log.push(ChangeEvent::file(ChangeKind::Created, "/music/song1.mp3"));

    let h = harness(Arc::new(blobs));
    let mut events = h.events.subscribe();
    h.sync
        .register_source(
            MediaKind::Music,
            LibrarySource::new(Arc::new(ScriptedQuery::new("/music", songs())))
                .with_change_log(log.clone()),
        )
        .await;

    let outcome = h.sync.synchronize(MediaKind::Music, true).await.unwrap();

    let report = outcome.report().unwrap();
    assert!(!report.persisted);
    assert_eq!(report.records, 2);
    assert_eq!(log.accepted(), 0);
    assert_eq!(h.sync.get_catalog(MediaKind::Music).len(), 2);
    assert!(drain(&mut events).iter().any(|e| matches!(
        e,
        CoreEvent::Catalog(CatalogEvent::SnapshotPersistFailed { .. })
    )));
}

#[core_async::test]
async fn test_vanished_file_is_removed_and_metadata_reused() {
    let h = harness(Arc::new(SpyBlobStore::default()));
    let query = Arc::new(ScriptedQuery::new("/music", songs()));
    h.sync
        .register_source(MediaKind::Music, LibrarySource::new(query.clone()))
        .await;
    h.sync.synchronize(MediaKind::Music, false).await.unwrap();
    let before = h.sync.get_catalog(MediaKind::Music);

    query.set_items(vec![item("/music", "song1.mp3")]);
    let outcome = h.sync.synchronize(MediaKind::Music, false).await.unwrap();

    let report = outcome.report().unwrap();
    assert_eq!(report.records, 1);
    assert_eq!(report.removed, 1);
    assert_eq!(report.added, 0);
    assert_eq!(report.generation, 2);
    assert_eq!(h.metadata.reads(), 2);

    let after = h.sync.get_catalog(MediaKind::Music);
    assert_eq!(after.len(), 1);
    assert!(after.records.iter().all(|r| r.membership_confirmed));
    assert!(after.record(&key("/music/song2.flac")).is_none());
    assert!(!after
        .grouping
        .references(&key("/music/song2.flac")));
    assert_eq!(
        after.record(&key("/music/song1.mp3")).unwrap().date_added,
        before.record(&key("/music/song1.mp3")).unwrap().date_added
    );
    // Readers holding the old view are unaffected.
    assert_eq!(before.len(), 2);
}

#[core_async::test]
async fn test_changed_mtime_reloads_metadata() {
    let h = harness(Arc::new(SpyBlobStore::default()));
    let query = Arc::new(ScriptedQuery::new("/music", songs()));
    h.sync
        .register_source(MediaKind::Music, LibrarySource::new(query.clone()))
        .await;
    h.sync.synchronize(MediaKind::Music, false).await.unwrap();

    let mut touched = songs();
    touched[0].modified_at = Some(modified() + chrono::Duration::minutes(5));
    query.set_items(touched);
    h.sync.synchronize(MediaKind::Music, false).await.unwrap();

    assert_eq!(h.metadata.reads(), 3);
}

#[core_async::test]
async fn test_unreadable_metadata_keeps_item_for_retry() {
    let h = harness(Arc::new(SpyBlobStore::default()));
    let query = Arc::new(ScriptedQuery::new(
        "/music",
        vec![item("/music", "good.mp3"), item("/music", "broken.mp3")],
    ));
    h.sync
        .register_source(MediaKind::Music, LibrarySource::new(query))
        .await;

    let outcome = h.sync.synchronize(MediaKind::Music, false).await.unwrap();

    let report = outcome.report().unwrap();
    assert_eq!(report.records, 2);
    assert_eq!(report.metadata_failures, 1);
    let view = h.sync.get_catalog(MediaKind::Music);
    assert!(view.record(&key("/music/good.mp3")).unwrap().metadata.is_some());
    assert!(view.record(&key("/music/broken.mp3")).unwrap().metadata.is_none());
    assert_eq!(h.metadata.reads(), 2);

    // The next crawl reads the failed file again and reuses the good one.
    let outcome = h.sync.synchronize(MediaKind::Music, false).await.unwrap();
    assert_eq!(outcome.report().unwrap().metadata_failures, 1);
    assert_eq!(h.metadata.reads(), 3);
}

#[core_async::test]
async fn test_failed_page_loses_only_that_page() {
    let h = harness(Arc::new(SpyBlobStore::default()));
    let items = (1..=6).map(|i| item("/music", &format!("{i}.mp3"))).collect();
    let query = Arc::new(ScriptedQuery::new("/music", items).failing_at(2));
    h.sync
        .register_source(MediaKind::Music, LibrarySource::new(query))
        .await;

    let outcome = h.sync.synchronize(MediaKind::Music, false).await.unwrap();

    let report = outcome.report().unwrap();
    assert_eq!(report.records, 4);
    assert_eq!(report.pages_lost, 1);
    let view = h.sync.get_catalog(MediaKind::Music);
    assert!(view.record(&key("/music/3.mp3")).is_none());
    assert!(view.record(&key("/music/5.mp3")).is_some());
}

#[core_async::test]
async fn test_removable_storage_follows_settings() {
    let h = harness(Arc::new(SpyBlobStore::default()));
    let local = Arc::new(ScriptedQuery::new("/music", vec![item("/music", "a.mp3")]));
    let removable = Arc::new(
        ScriptedQuery::new(
            "/sdcard",
            vec![item("/sdcard", "x.mp3"), item("/MUSIC", "A.mp3")],
        )
        .removable(true),
    );
    h.sync
        .register_source(
            MediaKind::Music,
            LibrarySource::new(local.clone()).with_removable(removable.clone()),
        )
        .await;

    h.sync.synchronize(MediaKind::Music, false).await.unwrap();
    assert_eq!(removable.calls(), 0);
    assert_eq!(h.sync.get_catalog(MediaKind::Music).len(), 1);

    h.settings.set_bool(INCLUDE_REMOVABLE_KEY, true).await.unwrap();
    let outcome = h.sync.synchronize(MediaKind::Music, false).await.unwrap();

    assert!(removable.calls() > 0);
    assert_eq!(outcome.report().unwrap().records, 2);
    let view = h.sync.get_catalog(MediaKind::Music);
    assert!(view.record(&key("/sdcard/x.mp3")).is_some());
    // The local observation of a duplicate path wins.
    assert_eq!(
        view.record(&key("/music/a.mp3")).unwrap().path,
        PathBuf::from("/music/a.mp3")
    );
}

#[core_async::test]
async fn test_unavailable_removable_storage_is_skipped() {
    let h = harness(Arc::new(SpyBlobStore::default()));
    h.settings.set_bool(INCLUDE_REMOVABLE_KEY, true).await.unwrap();
    let removable = Arc::new(
        ScriptedQuery::new("/sdcard", vec![item("/sdcard", "x.mp3")]).removable(false),
    );
    h.sync
        .register_source(
            MediaKind::Music,
            LibrarySource::new(Arc::new(ScriptedQuery::new("/music", songs())))
                .with_removable(removable.clone()),
        )
        .await;

    let outcome = h.sync.synchronize(MediaKind::Music, false).await.unwrap();

    assert_eq!(removable.calls(), 0);
    assert_eq!(outcome.report().unwrap().records, 2);
}

#[core_async::test]
async fn test_crawl_reports_progress_and_lifecycle_events() {
    let h = harness(Arc::new(SpyBlobStore::default()));
    let mut progress = h.sync.subscribe_progress();
    let mut events = h.events.subscribe();
    let items = (1..=5).map(|i| item("/music", &format!("{i}.mp3"))).collect();
    h.sync
        .register_source(
            MediaKind::Music,
            LibrarySource::new(Arc::new(ScriptedQuery::new("/music", items))),
        )
        .await;

    let outcome = h.sync.synchronize(MediaKind::Music, false).await.unwrap();
    let session_id = outcome.report().unwrap().session_id;

    let mut discovered = Vec::new();
    while let Ok(update) = progress.try_recv() {
        assert_eq!(update.session_id, session_id);
        assert_eq!(update.partition, MediaKind::Music);
        discovered.push(update.discovered);
    }
    assert_eq!(discovered, vec![2, 4, 5]);

    let events = drain(&mut events);
    assert!(matches!(
        events.first(),
        Some(CoreEvent::Scan(ScanEvent::Started { use_cache: false, .. }))
    ));
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e, CoreEvent::Scan(ScanEvent::Progress { .. })))
            .count(),
        3
    );
    assert!(events.iter().any(|e| matches!(
        e,
        CoreEvent::Catalog(CatalogEvent::Published { generation: 1, records: 5, .. })
    )));
    assert!(matches!(
        events.last(),
        Some(CoreEvent::Scan(ScanEvent::Completed { items: 5, .. }))
    ));
}

#[core_async::test]
async fn test_partitions_are_independent() {
    let h = harness(Arc::new(SpyBlobStore::default()));
    let videos = Arc::new(ScriptedQuery::new(
        "/videos",
        vec![item("/videos", "clip.mp4"), item("/videos", "theme.mp3")],
    ));
    h.sync
        .register_source(MediaKind::Video, LibrarySource::new(videos))
        .await;
    h.sync
        .register_source(
            MediaKind::Music,
            LibrarySource::new(Arc::new(ScriptedQuery::new("/music", songs()))),
        )
        .await;

    h.sync.synchronize(MediaKind::Video, false).await.unwrap();

    let video = h.sync.get_catalog(MediaKind::Video);
    assert_eq!(video.len(), 1);
    assert_eq!(video.records[0].kind, MediaKind::Video);
    assert_eq!(video.grouping.album_count(), 0);
    assert_eq!(h.sync.get_catalog(MediaKind::Music).generation, 0);
}

#[core_async::test]
async fn test_unregistered_partition_is_an_error() {
    let h = harness(Arc::new(SpyBlobStore::default()));

    let mut events = h.events.subscribe();

    let result = h.sync.synchronize(MediaKind::Video, true).await;

    assert!(matches!(
        result,
        Err(SyncError::LibraryNotConfigured { .. })
    ));
    assert!(!h.sync.is_scanning(MediaKind::Video));
    assert!(drain(&mut events).is_empty());
}

#[core_async::test]
async fn test_unregistered_partition_leaves_running_session_alone() {
    let h = harness(Arc::new(SpyBlobStore::default()));
    let gate = Arc::new(Gate::default());
    let query = Arc::new(ScriptedQuery::new("/music", songs()).with_gate(gate.clone()));
    h.sync
        .register_source(MediaKind::Music, LibrarySource::new(query))
        .await;

    let sync = Arc::clone(&h.sync);
    let running = core_async::spawn(async move { sync.synchronize(MediaKind::Music, false).await });
    gate.entered.notified().await;

    assert!(h.sync.synchronize(MediaKind::Video, false).await.is_err());
    gate.release.notify_one();

    let outcome = running.await.unwrap().unwrap();
    assert_eq!(outcome.report().unwrap().records, 2);
}
