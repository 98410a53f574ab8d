//! Tag and container metadata extraction.
//!
//! [`TagMetadataReader`] probes a file with `lofty` and maps what it finds onto
//! [`TypeMetadata`]. Parsing is synchronous, so it runs on the blocking pool.
//!
//! ```ignore
//! use core_metadata::{MetadataReader, TagMetadataReader};
//! use core_library::MediaKind;
//!
//! let reader = TagMetadataReader::new();
//! let metadata = reader.read(Path::new("song.flac"), MediaKind::Music).await?;
//! ```

use async_trait::async_trait;
use core_async::{fs, task};
use core_library::{MediaKind, MusicMetadata, TypeMetadata, VideoMetadata};
use lofty::config::ParseOptions;
use lofty::file::{AudioFile, TaggedFile, TaggedFileExt};
use lofty::probe::Probe;
use lofty::tag::{Accessor, ItemKey, Tag};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{MetadataError, Result};

/// Loads type-specific metadata for one file.
#[async_trait]
pub trait MetadataReader: Send + Sync {
    async fn read(&self, path: &Path, kind: MediaKind) -> Result<TypeMetadata>;
}

/// `lofty`-backed reader for music tags and video container properties.
#[derive(Debug, Clone, Copy)]
pub struct TagMetadataReader {
    parse_options: ParseOptions,
}

impl TagMetadataReader {
    pub fn new() -> Self {
        Self {
            parse_options: ParseOptions::new(),
        }
    }

    pub fn with_options(parse_options: ParseOptions) -> Self {
        Self { parse_options }
    }

    fn probe(path: &Path, options: ParseOptions) -> Result<TaggedFile> {
        let unreadable = |message: String| MetadataError::Unreadable {
            path: path.display().to_string(),
            message,
        };

        let probe = Probe::open(path)
            .map_err(|e| unreadable(e.to_string()))?
            .options(options)
            .guess_file_type()
            .map_err(|e| unreadable(e.to_string()))?;
        if probe.file_type().is_none() {
            return Err(MetadataError::UnsupportedFormat(path.display().to_string()));
        }
        probe.read().map_err(|e| unreadable(e.to_string()))
    }

    fn music_from(path: &Path, file: &TaggedFile) -> MusicMetadata {
        let properties = file.properties();
        let mut metadata = MusicMetadata {
            duration_ms: properties.duration().as_millis() as u64,
            bitrate_kbps: properties.audio_bitrate(),
            ..MusicMetadata::default()
        };

        let Some(tag) = file.primary_tag().or_else(|| file.first_tag()) else {
            debug!(file = %path.display(), "No tags found");
            return metadata;
        };

        Self::apply_tag(&mut metadata, tag);
        metadata
    }

    fn apply_tag(metadata: &mut MusicMetadata, tag: &Tag) {
        metadata.title = tag.title().and_then(|s| non_empty(&s));
        metadata.artists = tag.artist().map(|s| split_artists(&s)).unwrap_or_default();
        metadata.album = tag.album().and_then(|s| non_empty(&s));
        metadata.album_artist = tag.get_string(&ItemKey::AlbumArtist).and_then(non_empty);
        metadata.track_number = tag.track();
        metadata.disc_number = tag.disk();
        metadata.year = tag.year().map(|y| y as i32);
        metadata.genre = tag.genre().and_then(|s| non_empty(&s));
    }

    fn video_from(file: &TaggedFile) -> VideoMetadata {
        let properties = file.properties();
        VideoMetadata {
            duration_ms: properties.duration().as_millis() as u64,
            bitrate_kbps: properties.overall_bitrate(),
            ..VideoMetadata::default()
        }
    }
}

impl Default for TagMetadataReader {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MetadataReader for TagMetadataReader {
    async fn read(&self, path: &Path, kind: MediaKind) -> Result<TypeMetadata> {
        if let Err(e) = fs::metadata(path).await {
            return Err(match e.kind() {
                std::io::ErrorKind::NotFound => {
                    MetadataError::FileNotFound(path.display().to_string())
                }
                _ => MetadataError::Io(e),
            });
        }

        let owned: PathBuf = path.to_path_buf();
        let options = self.parse_options;
        let probed = task::spawn_blocking(move || Self::probe(&owned, options))
            .await
            .map_err(|e| MetadataError::Task(e.to_string()))?;

        match (kind, probed) {
            (MediaKind::Music, Ok(file)) => Ok(TypeMetadata::Music(Self::music_from(path, &file))),
            (MediaKind::Music, Err(e)) => Err(e),
            (MediaKind::Video, Ok(file)) => Ok(TypeMetadata::Video(Self::video_from(&file))),
            (MediaKind::Video, Err(e)) => {
                warn!(error = %e, "Video container not readable; using empty metadata");
                Ok(TypeMetadata::Video(VideoMetadata::default()))
            }
        }
    }
}

/// Collapse internal whitespace and drop control characters.
fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .filter(|c| !c.is_control())
        .collect()
}

fn non_empty(text: &str) -> Option<String> {
    let normalized = normalize_text(text);
    (!normalized.is_empty()).then_some(normalized)
}

/// Split a combined artist credit on `;` and `/`.
fn split_artists(text: &str) -> Vec<String> {
    text.split(&[';', '/'][..]).filter_map(non_empty).collect()
}
