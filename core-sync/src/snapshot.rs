//! Persisted catalog snapshots.
//!
//! One blob per partition (`songs.cache`, `videos.cache`). The blob is a JSON
//! envelope holding a format tag, a version, the partition and a SHA-256
//! checksum of the payload. Anything that does not check out is reported as
//! [`SnapshotLoad::Corrupt`], which callers treat exactly like a missing
//! snapshot.

use bridge_traits::storage::BlobStore;
use bytes::Bytes;
use core_library::{MediaKind, MediaRecord, PathKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::{Result, SyncError};

const FORMAT: &str = "media-catalog-snapshot";
const VERSION: u32 = 1;

/// Persisted form of one partition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Watched folders that produced the records; only used for invalidation
    pub source_folders: Vec<PathBuf>,
    pub records: Vec<MediaRecord>,
}

impl Snapshot {
    pub fn new(source_folders: Vec<PathBuf>, records: Vec<MediaRecord>) -> Self {
        Self {
            source_folders,
            records,
        }
    }

    /// Whether the snapshot was produced from exactly `folders`
    /// (set equality, case-insensitive).
    pub fn matches_folders(&self, folders: &[PathBuf]) -> bool {
        folder_set(&self.source_folders) == folder_set(folders)
    }
}

fn folder_set(folders: &[PathBuf]) -> BTreeSet<PathKey> {
    folders.iter().map(|f| PathKey::new(f)).collect()
}

/// Result of reading a snapshot. Neither `NotFound` nor `Corrupt` is an error.
#[derive(Debug)]
pub enum SnapshotLoad {
    Loaded(Snapshot),
    NotFound,
    Corrupt(String),
}

#[derive(Serialize, Deserialize)]
struct Envelope {
    format: String,
    version: u32,
    partition: MediaKind,
    checksum: String,
    payload: String,
}

fn checksum(payload: &str) -> String {
    format!("{:x}", Sha256::digest(payload.as_bytes()))
}

/// Reads and writes snapshots through a [`BlobStore`].
#[derive(Clone)]
pub struct SnapshotStore {
    blobs: Arc<dyn BlobStore>,
}

impl SnapshotStore {
    pub fn new(blobs: Arc<dyn BlobStore>) -> Self {
        Self { blobs }
    }

    pub async fn load(&self, kind: MediaKind) -> SnapshotLoad {
        let name = kind.snapshot_name();
        let data = match self.blobs.load(name).await {
            Ok(Some(data)) => data,
            Ok(None) => return SnapshotLoad::NotFound,
            Err(e) => {
                warn!(blob = name, error = %e, "Snapshot unreadable");
                return SnapshotLoad::Corrupt(e.to_string());
            }
        };

        match decode(kind, &data) {
            Ok(snapshot) => {
                debug!(blob = name, records = snapshot.records.len(), "Loaded snapshot");
                SnapshotLoad::Loaded(snapshot)
            }
            Err(reason) => {
                warn!(blob = name, %reason, "Discarding corrupt snapshot");
                SnapshotLoad::Corrupt(reason)
            }
        }
    }

    /// Replace the partition's snapshot.
    pub async fn save(&self, kind: MediaKind, snapshot: &Snapshot) -> Result<()> {
        let payload =
            serde_json::to_string(snapshot).map_err(|e| SyncError::Snapshot(e.to_string()))?;
        let envelope = Envelope {
            format: FORMAT.to_string(),
            version: VERSION,
            partition: kind,
            checksum: checksum(&payload),
            payload,
        };
        let data =
            serde_json::to_vec(&envelope).map_err(|e| SyncError::Snapshot(e.to_string()))?;

        self.blobs.save(kind.snapshot_name(), Bytes::from(data)).await?;
        debug!(
            blob = kind.snapshot_name(),
            records = snapshot.records.len(),
            "Saved snapshot"
        );
        Ok(())
    }
}

fn decode(kind: MediaKind, data: &[u8]) -> std::result::Result<Snapshot, String> {
    let envelope: Envelope =
        serde_json::from_slice(data).map_err(|e| format!("invalid envelope: {e}"))?;

    if envelope.format != FORMAT {
        return Err(format!("unexpected format {:?}", envelope.format));
    }
    if envelope.version != VERSION {
        return Err(format!("unsupported version {}", envelope.version));
    }
    if envelope.partition != kind {
        return Err(format!("snapshot belongs to {}", envelope.partition));
    }
    if envelope.checksum != checksum(&envelope.payload) {
        return Err("checksum mismatch".to_string());
    }

    let snapshot: Snapshot =
        serde_json::from_str(&envelope.payload).map_err(|e| format!("invalid payload: {e}"))?;
    if let Some(stray) = snapshot.records.iter().find(|r| r.kind != kind) {
        return Err(format!("record {} is not {}", stray.path.display(), kind));
    }
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::{BridgeError, Result as BridgeResult};
    use chrono::Utc;
    use core_async::sync::Mutex;
    use std::collections::HashMap;

    #[derive(Default)]
    struct MemoryBlobs {
        blobs: Mutex<HashMap<String, Bytes>>,
    }

    #[async_trait]
    impl BlobStore for MemoryBlobs {
        async fn load(&self, name: &str) -> BridgeResult<Option<Bytes>> {
            Ok(self.blobs.lock().await.get(name).cloned())
        }

        async fn save(&self, name: &str, data: Bytes) -> BridgeResult<()> {
            self.blobs.lock().await.insert(name.to_string(), data);
            Ok(())
        }

        async fn delete(&self, name: &str) -> BridgeResult<()> {
            self.blobs.lock().await.remove(name);
            Ok(())
        }
    }

    struct FailingBlobs;

    #[async_trait]
    impl BlobStore for FailingBlobs {
        async fn load(&self, _name: &str) -> BridgeResult<Option<Bytes>> {
            Err(BridgeError::OperationFailed("disk gone".into()))
        }

        async fn save(&self, _name: &str, _data: Bytes) -> BridgeResult<()> {
            Err(BridgeError::OperationFailed("disk gone".into()))
        }

        async fn delete(&self, _name: &str) -> BridgeResult<()> {
            Ok(())
        }
    }

    fn sample() -> Snapshot {
        Snapshot::new(
            vec![PathBuf::from("/Music")],
            vec![MediaRecord::new("/Music/a.mp3", MediaKind::Music, Utc::now())],
        )
    }

    #[test]
    fn test_folder_match_is_case_insensitive_set_equality() {
        let snapshot = Snapshot::new(
            vec![PathBuf::from("/Music/A"), PathBuf::from("/Music/B")],
            Vec::new(),
        );
        assert!(snapshot.matches_folders(&[PathBuf::from("/music/b"), PathBuf::from("/MUSIC/a")]));
        assert!(!snapshot.matches_folders(&[PathBuf::from("/Music/A"), PathBuf::from("/Music/C")]));
        assert!(!snapshot.matches_folders(&[PathBuf::from("/Music/A")]));
    }

    #[core_async::test]
    async fn test_save_then_load() {
        let blobs = Arc::new(MemoryBlobs::default());
        let store = SnapshotStore::new(blobs.clone());
        let snapshot = sample();

        store.save(MediaKind::Music, &snapshot).await.unwrap();
        assert!(blobs.blobs.lock().await.contains_key("songs.cache"));

        match store.load(MediaKind::Music).await {
            SnapshotLoad::Loaded(loaded) => assert_eq!(loaded, snapshot),
            other => panic!("expected snapshot, got {other:?}"),
        }
    }

    #[core_async::test]
    async fn test_missing_blob_is_not_found() {
        let store = SnapshotStore::new(Arc::new(MemoryBlobs::default()));
        assert!(matches!(store.load(MediaKind::Video).await, SnapshotLoad::NotFound));
    }

    #[core_async::test]
    async fn test_foreign_bytes_are_corrupt() {
        let blobs = Arc::new(MemoryBlobs::default());
        blobs
            .save("songs.cache", Bytes::from_static(b"\x00\x01 definitely not json"))
            .await
            .unwrap();
        let store = SnapshotStore::new(blobs);
        assert!(matches!(store.load(MediaKind::Music).await, SnapshotLoad::Corrupt(_)));
    }

    #[core_async::test]
    async fn test_tampered_payload_fails_checksum() {
        let blobs = Arc::new(MemoryBlobs::default());
        let store = SnapshotStore::new(blobs.clone());
        store.save(MediaKind::Music, &sample()).await.unwrap();

        let raw = blobs.blobs.lock().await.get("songs.cache").cloned().unwrap();
        let tampered = String::from_utf8(raw.to_vec())
            .unwrap()
            .replace("a.mp3", "b.mp3");
        blobs
            .save("songs.cache", Bytes::from(tampered))
            .await
            .unwrap();

        match store.load(MediaKind::Music).await {
            SnapshotLoad::Corrupt(reason) => assert!(reason.contains("checksum")),
            other => panic!("expected corrupt, got {other:?}"),
        }
    }

    #[core_async::test]
    async fn test_snapshot_of_other_partition_is_corrupt() {
        let blobs = Arc::new(MemoryBlobs::default());
        let store = SnapshotStore::new(blobs.clone());
        store.save(MediaKind::Music, &sample()).await.unwrap();

        let raw = blobs.blobs.lock().await.get("songs.cache").cloned().unwrap();
        blobs.save("videos.cache", raw).await.unwrap();

        assert!(matches!(store.load(MediaKind::Video).await, SnapshotLoad::Corrupt(_)));
    }

    #[core_async::test]
    async fn test_store_failures() {
        let store = SnapshotStore::new(Arc::new(FailingBlobs));
        assert!(matches!(store.load(MediaKind::Music).await, SnapshotLoad::Corrupt(_)));
        assert!(matches!(
            store.save(MediaKind::Music, &sample()).await,
            Err(SyncError::Bridge(_))
        ));
    }
}
