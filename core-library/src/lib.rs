//! # Media Library Module
//!
//! In-memory data model of the media catalog.
//!
//! ## Overview
//!
//! This module manages:
//! - [`MediaRecord`](models::MediaRecord) and its type-specific metadata
//! - Album/artist buckets derived by [`GroupingIndex`](grouping::GroupingIndex)
//! - The [`CatalogReadModel`](catalog::CatalogReadModel) that readers query
//!
//! Nothing here performs I/O; scanning and persistence live in `core-sync`.

pub mod catalog;
pub mod error;
pub mod grouping;
pub mod models;

pub use catalog::{CatalogReadModel, CatalogView};
pub use error::{LibraryError, Result};
pub use grouping::{AlbumBucket, AlbumKey, ArtistBucket, ArtistKey, Grouping, GroupingIndex};
pub use models::{
    ExtensionFilter, MediaKind, MediaRecord, MusicMetadata, PathKey, TypeMetadata, VideoMetadata,
};
