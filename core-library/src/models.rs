//! Domain models for the media catalog
//!
//! A [`MediaRecord`] is one physical file known to a catalog partition. Its
//! identity is the case-insensitive [`PathKey`]; everything else (title,
//! type metadata, timestamps) is payload that a scan may refresh.

use bridge_traits::query::FolderItem;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::LibraryError;

// =============================================================================
// Partition
// =============================================================================

/// Catalog partition. Music and video are scanned, cached and published
/// independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Music,
    Video,
}

impl MediaKind {
    pub const ALL: [MediaKind; 2] = [MediaKind::Music, MediaKind::Video];

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Music => "music",
            MediaKind::Video => "video",
        }
    }

    /// Name of the persisted snapshot blob for this partition
    pub fn snapshot_name(&self) -> &'static str {
        match self {
            MediaKind::Music => "songs.cache",
            MediaKind::Video => "videos.cache",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaKind {
    type Err = LibraryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "music" => Ok(MediaKind::Music),
            "video" => Ok(MediaKind::Video),
            other => Err(LibraryError::InvalidInput {
                field: "media_kind".to_string(),
                message: format!("unknown partition '{}'", other),
            }),
        }
    }
}

// =============================================================================
// Identity
// =============================================================================

/// Case-insensitive identity of a media file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PathKey(String);

impl PathKey {
    pub fn new(path: &Path) -> Self {
        Self(path.to_string_lossy().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&Path> for PathKey {
    fn from(path: &Path) -> Self {
        Self::new(path)
    }
}

impl From<&PathBuf> for PathKey {
    fn from(path: &PathBuf) -> Self {
        Self::new(path)
    }
}

impl fmt::Display for PathKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Normalize a grouping or comparison string (trimmed, lowercase)
pub fn normalize(s: &str) -> String {
    s.trim().to_lowercase()
}

// =============================================================================
// Type metadata
// =============================================================================

/// Tag metadata of a music file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MusicMetadata {
    pub title: Option<String>,
    /// Track artists in tag order
    pub artists: Vec<String>,
    pub album: Option<String>,
    pub album_artist: Option<String>,
    pub track_number: Option<u32>,
    pub disc_number: Option<u32>,
    pub year: Option<i32>,
    pub genre: Option<String>,
    pub duration_ms: u64,
    pub bitrate_kbps: Option<u32>,
}

/// Container properties of a video file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoMetadata {
    pub duration_ms: u64,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub bitrate_kbps: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TypeMetadata {
    Music(MusicMetadata),
    Video(VideoMetadata),
}

impl TypeMetadata {
    pub fn kind(&self) -> MediaKind {
        match self {
            TypeMetadata::Music(_) => MediaKind::Music,
            TypeMetadata::Video(_) => MediaKind::Video,
        }
    }

    pub fn duration_ms(&self) -> u64 {
        match self {
            TypeMetadata::Music(m) => m.duration_ms,
            TypeMetadata::Video(v) => v.duration_ms,
        }
    }
}

// =============================================================================
// MediaRecord
// =============================================================================

/// One physical media file known to the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaRecord {
    pub path: PathBuf,
    pub display_title: String,
    pub kind: MediaKind,
    /// `None` until metadata has been loaded
    pub metadata: Option<TypeMetadata>,
    pub size: u64,
    /// Modification time observed when the record was last refreshed
    pub modified_at: Option<DateTime<Utc>>,
    pub date_added: DateTime<Utc>,
    /// Confirmed present under a watched folder by the latest scan
    #[serde(skip, default = "confirmed")]
    pub membership_confirmed: bool,
    /// Source content changed since `metadata` was read
    #[serde(default)]
    pub needs_refresh: bool,
}

fn confirmed() -> bool {
    true
}

impl MediaRecord {
    pub fn new(path: impl Into<PathBuf>, kind: MediaKind, date_added: DateTime<Utc>) -> Self {
        let path = path.into();
        let display_title = file_stem(&path);
        Self {
            path,
            display_title,
            kind,
            metadata: None,
            size: 0,
            modified_at: None,
            date_added,
            membership_confirmed: true,
            needs_refresh: false,
        }
    }

    /// Record for a file returned by a folder query
    pub fn from_item(item: &FolderItem, kind: MediaKind, date_added: DateTime<Utc>) -> Self {
        let mut record = Self::new(item.path.clone(), kind, date_added);
        if !item.display_name.is_empty() {
            record.display_title = item.display_name.clone();
        }
        record.size = item.size;
        record.modified_at = item.modified_at;
        record
    }

    pub fn path_key(&self) -> PathKey {
        PathKey::new(&self.path)
    }

    pub fn music(&self) -> Option<&MusicMetadata> {
        match &self.metadata {
            Some(TypeMetadata::Music(m)) => Some(m),
            _ => None,
        }
    }

    pub fn video(&self) -> Option<&VideoMetadata> {
        match &self.metadata {
            Some(TypeMetadata::Video(v)) => Some(v),
            _ => None,
        }
    }

    /// Attach freshly loaded metadata and clear the refresh flag.
    ///
    /// A non-empty tag title replaces the file-name title.
    pub fn set_metadata(&mut self, metadata: TypeMetadata) {
        if let TypeMetadata::Music(MusicMetadata {
            title: Some(title), ..
        }) = &metadata
        {
            if !title.trim().is_empty() {
                self.display_title = title.trim().to_string();
            }
        }
        self.metadata = Some(metadata);
        self.needs_refresh = false;
    }

    pub fn with_metadata(mut self, metadata: TypeMetadata) -> Self {
        self.set_metadata(metadata);
        self
    }

    /// Point the record at new source content. Metadata is kept but marked
    /// stale; it is reloaded on the next full crawl.
    pub fn refresh_source(&mut self, size: Option<u64>, modified_at: Option<DateTime<Utc>>) {
        if let Some(size) = size {
            self.size = size;
        }
        if modified_at.is_some() {
            self.modified_at = modified_at;
        }
        self.needs_refresh = true;
    }

    /// Move the record to a new path, keeping its metadata and `date_added`.
    pub fn relocate(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        let had_tag_title = self
            .music()
            .and_then(|m| m.title.as_deref())
            .is_some_and(|t| !t.trim().is_empty());
        if !had_tag_title {
            self.display_title = file_stem(&path);
        }
        self.path = path;
    }

    /// Whether `found` (a fresh observation of the same file) still matches
    /// what this record describes, so its metadata can be reused.
    pub fn is_current_for(&self, found: &MediaRecord) -> bool {
        !self.needs_refresh
            && self.metadata.is_some()
            && self.modified_at.is_some()
            && self.modified_at == found.modified_at
            && self.size == found.size
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

// =============================================================================
// Extension filter
// =============================================================================

/// Decides which files belong to a partition by extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionFilter {
    extensions: Vec<String>,
}

impl ExtensionFilter {
    /// `extensions` are lowercase, without the leading dot.
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            extensions: extensions.into_iter().map(Into::into).collect(),
        }
    }

    pub fn accepts(&self, path: &Path) -> bool {
        path.extension()
            .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
            .is_some_and(|ext| self.extensions.iter().any(|e| *e == ext))
    }
}
