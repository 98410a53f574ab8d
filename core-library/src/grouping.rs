//! Album and artist grouping
//!
//! Buckets are derived data: [`GroupingIndex::rebuild`] recomputes them from
//! the record list every time and never patches them in place. Records do
//! not point at their buckets; the [`Grouping`] keeps `PathKey -> bucket`
//! maps instead, so removing a record can never leave a dangling reference.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::models::{normalize, MediaKind, MediaRecord, PathKey};

pub const UNKNOWN_ALBUM: &str = "Unknown Album";
pub const UNKNOWN_ARTIST: &str = "Unknown Artist";

/// Normalized album identity. Two albums with the same name but different
/// album artists are different buckets.
///
/// The unknown album has an empty name and artist, so its key is identical
/// across rebuilds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AlbumKey {
    pub name: String,
    pub album_artist: String,
}

impl AlbumKey {
    pub fn unknown() -> Self {
        Self {
            name: String::new(),
            album_artist: String::new(),
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.name.is_empty()
    }
}

/// Normalized artist identity; empty for the unknown artist.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ArtistKey(pub String);

impl ArtistKey {
    pub fn unknown() -> Self {
        Self(String::new())
    }

    pub fn is_unknown(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlbumBucket {
    pub key: AlbumKey,
    /// Name as first seen in the tags
    pub title: String,
    pub album_artist: Option<String>,
    pub year: Option<i32>,
    /// Members in catalog order
    pub members: Vec<PathKey>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtistBucket {
    pub key: ArtistKey,
    pub name: String,
    pub members: Vec<PathKey>,
}

/// Result of a rebuild: the buckets plus the record-to-bucket index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Grouping {
    albums: BTreeMap<AlbumKey, AlbumBucket>,
    artists: BTreeMap<ArtistKey, ArtistBucket>,
    album_of: HashMap<PathKey, AlbumKey>,
    artists_of: HashMap<PathKey, Vec<ArtistKey>>,
}

impl Grouping {
    pub fn albums(&self) -> impl Iterator<Item = &AlbumBucket> {
        self.albums.values()
    }

    pub fn artists(&self) -> impl Iterator<Item = &ArtistBucket> {
        self.artists.values()
    }

    pub fn album(&self, key: &AlbumKey) -> Option<&AlbumBucket> {
        self.albums.get(key)
    }

    pub fn artist(&self, key: &ArtistKey) -> Option<&ArtistBucket> {
        self.artists.get(key)
    }

    pub fn album_count(&self) -> usize {
        self.albums.len()
    }

    pub fn artist_count(&self) -> usize {
        self.artists.len()
    }

    /// Album bucket the record belongs to
    pub fn album_for(&self, record: &PathKey) -> Option<&AlbumBucket> {
        self.album_of.get(record).and_then(|key| self.albums.get(key))
    }

    /// Artist buckets the record belongs to
    pub fn artists_for(&self, record: &PathKey) -> Vec<&ArtistBucket> {
        self.artists_of
            .get(record)
            .map(|keys| keys.iter().filter_map(|k| self.artists.get(k)).collect())
            .unwrap_or_default()
    }

    /// Whether any bucket references the record
    pub fn references(&self, record: &PathKey) -> bool {
        self.album_of.contains_key(record) || self.artists_of.contains_key(record)
    }

    /// Bucket keys only, for comparing two groupings.
    pub fn keys(&self) -> (Vec<AlbumKey>, Vec<ArtistKey>) {
        (
            self.albums.keys().cloned().collect(),
            self.artists.keys().cloned().collect(),
        )
    }
}

/// Builds [`Grouping`]s from music records.
pub struct GroupingIndex;

impl GroupingIndex {
    /// Recompute every bucket from `records`.
    ///
    /// Only music records that are still confirmed members of the library
    /// are grouped. Rebuilding the same input twice yields equal groupings.
    pub fn rebuild(records: &[MediaRecord]) -> Grouping {
        let mut grouping = Grouping::default();

        for record in records
            .iter()
            .filter(|r| r.kind == MediaKind::Music && r.membership_confirmed)
        {
            let path_key = record.path_key();
            let meta = record.music();

            let track_artists: Vec<&str> = meta
                .map(|m| m.artists.iter().map(String::as_str).collect())
                .unwrap_or_default();
            let album_artist = meta
                .and_then(|m| m.album_artist.as_deref())
                .filter(|a| !a.trim().is_empty());
            let album_name = meta
                .and_then(|m| m.album.as_deref())
                .filter(|a| !a.trim().is_empty());

            // Album
            let album_key = match album_name {
                Some(name) => AlbumKey {
                    name: normalize(name),
                    album_artist: normalize(
                        album_artist
                            .or_else(|| track_artists.first().copied())
                            .unwrap_or_default(),
                    ),
                },
                None => AlbumKey::unknown(),
            };
            let bucket = grouping
                .albums
                .entry(album_key.clone())
                .or_insert_with(|| AlbumBucket {
                    key: album_key.clone(),
                    title: album_name
                        .map(|n| n.trim().to_string())
                        .unwrap_or_else(|| UNKNOWN_ALBUM.to_string()),
                    album_artist: album_artist.map(|a| a.trim().to_string()),
                    year: None,
                    members: Vec::new(),
                });
            if bucket.year.is_none() {
                bucket.year = meta.and_then(|m| m.year);
            }
            bucket.members.push(path_key.clone());
            grouping.album_of.insert(path_key.clone(), album_key);

            // Artists
            let mut names: Vec<&str> = track_artists
                .iter()
                .copied()
                .filter(|a| !a.trim().is_empty())
                .collect();
            if names.is_empty() {
                names.extend(album_artist);
            }

            let mut keys: Vec<ArtistKey> = Vec::new();
            for name in names {
                let key = ArtistKey(normalize(name));
                if keys.contains(&key) {
                    continue;
                }
                keys.push(key);
            }
            if keys.is_empty() {
                keys.push(ArtistKey::unknown());
            }

            for key in &keys {
                let display = if key.is_unknown() {
                    UNKNOWN_ARTIST.to_string()
                } else {
                    track_artists
                        .iter()
                        .copied()
                        .chain(album_artist)
                        .find(|n| normalize(n) == key.0)
                        .map(|n| n.trim().to_string())
                        .unwrap_or_else(|| key.0.clone())
                };
                grouping
                    .artists
                    .entry(key.clone())
                    .or_insert_with(|| ArtistBucket {
                        key: key.clone(),
                        name: display,
                        members: Vec::new(),
                    })
                    .members
                    .push(path_key.clone());
            }
            grouping.artists_of.insert(path_key, keys);
        }

        grouping
    }
}
