//! In-memory fakes of the bridge traits shared by the synchronizer tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bridge_traits::change_log::{ChangeBatch, ChangeCheckpoint, ChangeEvent, ChangeLog};
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::query::{FolderItem, FolderQuery, QuerySource};
use bridge_traits::storage::{BlobStore, SettingsStore};
use bridge_traits::time::Clock;
use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use core_async::sync::Notify;
use core_library::{MediaKind, MusicMetadata, TypeMetadata, VideoMetadata};
use core_metadata::{MetadataError, MetadataReader};
use core_runtime::{CatalogConfig, EventBus};
use core_sync::CatalogSynchronizer;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn modified() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

pub fn item(root: &str, name: &str) -> FolderItem {
    FolderItem::file(Path::new(root).join(name), 1024, Some(modified()))
}

// ----------------------------------------------------------------------------
// Blob store
// ----------------------------------------------------------------------------

/// Blob store that records every save.
#[derive(Default)]
pub struct SpyBlobStore {
    blobs: Mutex<HashMap<String, Bytes>>,
    saves: Mutex<Vec<String>>,
}

impl SpyBlobStore {
    pub fn save_count(&self) -> usize {
        self.saves.lock().unwrap().len()
    }
}

#[async_trait]
impl BlobStore for SpyBlobStore {
    async fn load(&self, name: &str) -> BridgeResult<Option<Bytes>> {
        Ok(self.blobs.lock().unwrap().get(name).cloned())
    }

    async fn save(&self, name: &str, data: Bytes) -> BridgeResult<()> {
        self.saves.lock().unwrap().push(name.to_string());
        self.blobs.lock().unwrap().insert(name.to_string(), data);
        Ok(())
    }

    async fn delete(&self, name: &str) -> BridgeResult<()> {
        self.blobs.lock().unwrap().remove(name);
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Settings
// ----------------------------------------------------------------------------

#[derive(Default)]
pub struct MemorySettings {
    flags: Mutex<HashMap<String, bool>>,
}

#[async_trait]
impl SettingsStore for MemorySettings {
    async fn set_string(&self, _key: &str, _value: &str) -> BridgeResult<()> {
        Ok(())
    }

    async fn get_string(&self, _key: &str) -> BridgeResult<Option<String>> {
        Ok(None)
    }

    async fn set_bool(&self, key: &str, value: bool) -> BridgeResult<()> {
        self.flags.lock().unwrap().insert(key.to_string(), value);
        Ok(())
    }

    async fn get_bool(&self, key: &str) -> BridgeResult<Option<bool>> {
        Ok(self.flags.lock().unwrap().get(key).copied())
    }

    async fn delete(&self, key: &str) -> BridgeResult<()> {
        self.flags.lock().unwrap().remove(key);
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Folder query
// ----------------------------------------------------------------------------

/// Pauses the first page fetch until released.
#[derive(Default)]
pub struct Gate {
    pub entered: Notify,
    pub release: Notify,
    used: AtomicBool,
}

pub struct ScriptedQuery {
    source: QuerySource,
    roots: Vec<PathBuf>,
    items: Mutex<Vec<FolderItem>>,
    failing_offsets: Vec<usize>,
    available: bool,
    gate: Option<Arc<Gate>>,
    calls: AtomicUsize,
}

impl ScriptedQuery {
    pub fn new(root: &str, items: Vec<FolderItem>) -> Self {
        Self {
            source: QuerySource::Local,
            roots: vec![PathBuf::from(root)],
            items: Mutex::new(items),
            failing_offsets: Vec::new(),
            available: true,
            gate: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn removable(mut self, available: bool) -> Self {
        self.source = QuerySource::Removable;
        self.available = available;
        self
    }

    pub fn failing_at(mut self, offset: usize) -> Self {
        self.failing_offsets.push(offset);
        self
    }

    pub fn with_gate(mut self, gate: Arc<Gate>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn set_items(&self, items: Vec<FolderItem>) {
        *self.items.lock().unwrap() = items;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FolderQuery for ScriptedQuery {
    fn source(&self) -> QuerySource {
        self.source
    }

    fn roots(&self) -> Vec<PathBuf> {
        self.roots.clone()
    }

    async fn get_page(&self, offset: usize, size: usize) -> BridgeResult<Vec<FolderItem>> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(gate) = &self.gate {
            if !gate.used.swap(true, Ordering::SeqCst) {
                gate.entered.notify_one();
                gate.release.notified().await;
            }
        }
        if self.failing_offsets.contains(&offset) {
            return Err(BridgeError::OperationFailed(format!("page at {offset} unreadable")));
        }

        let items = self.items.lock().unwrap();
        Ok(items.iter().skip(offset).take(size).cloned().collect())
    }

    async fn is_available(&self) -> bool {
        self.available
    }
}

// ----------------------------------------------------------------------------
// Change log
// ----------------------------------------------------------------------------

/// Change log whose checkpoint is the number of events accepted so far.
#[derive(Default)]
pub struct ScriptedChangeLog {
    events: Mutex<Vec<ChangeEvent>>,
    accepted: Mutex<u64>,
    reads: AtomicUsize,
}

impl ScriptedChangeLog {
    pub fn push(&self, event: ChangeEvent) {
        self.events.lock().unwrap().push(event);
    }

    pub fn accepted(&self) -> u64 {
        *self.accepted.lock().unwrap()
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChangeLog for ScriptedChangeLog {
    async fn checkpoint(&self) -> BridgeResult<ChangeCheckpoint> {
        Ok(ChangeCheckpoint(self.accepted()))
    }

    async fn head(&self) -> BridgeResult<ChangeCheckpoint> {
        Ok(ChangeCheckpoint(self.events.lock().unwrap().len() as u64))
    }

    async fn read_batch_since(&self, checkpoint: ChangeCheckpoint) -> BridgeResult<ChangeBatch> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let events = self.events.lock().unwrap();
        Ok(ChangeBatch {
            events: events.iter().skip(checkpoint.0 as usize).cloned().collect(),
            through: ChangeCheckpoint(events.len() as u64),
        })
    }

    async fn accept_changes(&self, through: ChangeCheckpoint) -> BridgeResult<()> {
        let mut accepted = self.accepted.lock().unwrap();
        *accepted = (*accepted).max(through.0);
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Metadata
// ----------------------------------------------------------------------------

/// Returns canned metadata; files whose name contains "broken" fail.
#[derive(Default)]
pub struct StubMetadata {
    reads: AtomicUsize,
}

impl StubMetadata {
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MetadataReader for StubMetadata {
    async fn read(&self, path: &Path, kind: MediaKind) -> core_metadata::Result<TypeMetadata> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if path.to_string_lossy().contains("broken") {
            return Err(MetadataError::Unreadable {
                path: path.display().to_string(),
                message: "bad header".to_string(),
            });
        }
        Ok(match kind {
            MediaKind::Music => TypeMetadata::Music(MusicMetadata {
                album: Some("Album".to_string()),
                artists: vec!["Artist".to_string()],
                duration_ms: 180_000,
                ..Default::default()
            }),
            MediaKind::Video => TypeMetadata::Video(VideoMetadata::default()),
        })
    }
}

// ----------------------------------------------------------------------------
// Clock
// ----------------------------------------------------------------------------

/// Advances one second every time it is read.
pub struct TickingClock(Mutex<DateTime<Utc>>);

impl Default for TickingClock {
    fn default() -> Self {
        Self(Mutex::new(modified()))
    }
}

impl Clock for TickingClock {
    fn now(&self) -> DateTime<Utc> {
        let mut now = self.0.lock().unwrap();
        *now += chrono::Duration::seconds(1);
        *now
    }
}

// ----------------------------------------------------------------------------
// Harness
// ----------------------------------------------------------------------------

pub struct Harness {
    pub sync: Arc<CatalogSynchronizer>,
    pub settings: Arc<MemorySettings>,
    pub metadata: Arc<StubMetadata>,
    pub events: EventBus,
}

pub fn config(blobs: Arc<dyn BlobStore>, settings: Arc<MemorySettings>) -> CatalogConfig {
    CatalogConfig::builder()
        .cache_dir("/tmp/media-catalog-tests")
        .page_size(2)
        .progress_interval(Duration::from_secs(1))
        .music_extensions(["mp3", "flac"])
        .video_extensions(["mp4", "mkv"])
        .blob_store(blobs)
        .settings_store(settings)
        .clock(Arc::new(TickingClock::default()))
        .build()
        .expect("valid test config")
}

pub fn harness(blobs: Arc<dyn BlobStore>) -> Harness {
    let settings = Arc::new(MemorySettings::default());
    let metadata = Arc::new(StubMetadata::default());
    let events = EventBus::new(256);
    let sync = CatalogSynchronizer::new(
        config(blobs, Arc::clone(&settings)),
        metadata.clone(),
        events.clone(),
    );
    Harness {
        sync: Arc::new(sync),
        settings,
        metadata,
        events,
    }
}
