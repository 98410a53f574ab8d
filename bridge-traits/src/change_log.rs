//! External Change Log
//!
//! An ordered journal of filesystem changes recorded by the host (a watcher,
//! an indexing service, a USN journal). The catalog engine reads the events
//! since its last accepted checkpoint, applies them, and only then accepts
//! them so a failed or abandoned reconciliation replays the same events.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::error::Result;

/// Opaque, monotonically increasing position in a change log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct ChangeCheckpoint(pub u64);

impl fmt::Display for ChangeCheckpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of change recorded in the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeKind {
    Created,
    Deleted,
    MovedIn,
    MovedOut,
    MovedOrRenamed,
    ContentsChanged,
    ContentsReplaced,
    IndexingStatusChanged,
    EncryptionChanged,
    /// The log dropped events; nothing read from it can be trusted.
    ChangeTrackingLost,
}

impl ChangeKind {
    /// Changes that carry no information the catalog cares about.
    pub fn is_ignorable(&self) -> bool {
        matches!(
            self,
            ChangeKind::IndexingStatusChanged | ChangeKind::EncryptionChanged
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Created => "created",
            ChangeKind::Deleted => "deleted",
            ChangeKind::MovedIn => "moved_in",
            ChangeKind::MovedOut => "moved_out",
            ChangeKind::MovedOrRenamed => "moved_or_renamed",
            ChangeKind::ContentsChanged => "contents_changed",
            ChangeKind::ContentsReplaced => "contents_replaced",
            ChangeKind::IndexingStatusChanged => "indexing_status_changed",
            ChangeKind::EncryptionChanged => "encryption_changed",
            ChangeKind::ChangeTrackingLost => "change_tracking_lost",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let kind = match value {
            "created" => ChangeKind::Created,
            "deleted" => ChangeKind::Deleted,
            "moved_in" => ChangeKind::MovedIn,
            "moved_out" => ChangeKind::MovedOut,
            "moved_or_renamed" => ChangeKind::MovedOrRenamed,
            "contents_changed" => ChangeKind::ContentsChanged,
            "contents_replaced" => ChangeKind::ContentsReplaced,
            "indexing_status_changed" => ChangeKind::IndexingStatusChanged,
            "encryption_changed" => ChangeKind::EncryptionChanged,
            "change_tracking_lost" => ChangeKind::ChangeTrackingLost,
            _ => return None,
        };
        Some(kind)
    }
}

/// One entry in the change log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    /// Current path of the subject
    pub path: PathBuf,
    /// Path before a move or rename
    pub previous_path: Option<PathBuf>,
    /// Whether the subject is a folder
    pub is_folder: bool,
    /// Size of the subject after the change, when known
    pub size: Option<u64>,
    /// Modification time of the subject after the change, when known
    pub modified_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl ChangeEvent {
    pub fn file(kind: ChangeKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
            previous_path: None,
            is_folder: false,
            size: None,
            modified_at: None,
        }
    }

    pub fn folder(kind: ChangeKind, path: impl Into<PathBuf>) -> Self {
        Self {
            is_folder: true,
            ..Self::file(kind, path)
        }
    }

    pub fn renamed(from: impl Into<PathBuf>, to: impl Into<PathBuf>) -> Self {
        Self {
            previous_path: Some(from.into()),
            ..Self::file(ChangeKind::MovedOrRenamed, to)
        }
    }

    pub fn tracking_lost() -> Self {
        Self::file(ChangeKind::ChangeTrackingLost, PathBuf::new())
    }

    /// Path the subject had before this event (the current path when it did not move).
    pub fn old_path(&self) -> &PathBuf {
        self.previous_path.as_ref().unwrap_or(&self.path)
    }
}

/// Events read from the log plus the position they run through.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeBatch {
    pub events: Vec<ChangeEvent>,
    /// Passing this to [`ChangeLog::accept_changes`] accepts exactly these events.
    pub through: ChangeCheckpoint,
}

impl ChangeBatch {
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Change log trait
///
/// # Contract
///
/// - `read_batch_since` returns events strictly after `checkpoint`, oldest first.
/// - When the log can no longer answer for `checkpoint` (pruned, overflowed),
///   the batch must contain a [`ChangeKind::ChangeTrackingLost`] event.
/// - `accept_changes` moves the accepted checkpoint forward; it never moves it back.
#[async_trait]
pub trait ChangeLog: Send + Sync {
    /// Last accepted position
    async fn checkpoint(&self) -> Result<ChangeCheckpoint>;

    /// Newest position recorded so far
    async fn head(&self) -> Result<ChangeCheckpoint>;

    /// Read every event after `checkpoint`
    async fn read_batch_since(&self, checkpoint: ChangeCheckpoint) -> Result<ChangeBatch>;

    /// Mark everything up to and including `through` as applied
    async fn accept_changes(&self, through: ChangeCheckpoint) -> Result<()>;
}
