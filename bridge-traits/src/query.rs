//! Paged Folder Listing
//!
//! A folder query enumerates every file below a set of watched roots in a
//! stable order and hands it out in pages. The catalog engine never walks the
//! filesystem itself; it only asks for `get_page(offset, size)` until a page
//! comes back empty.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::Result;

/// Where a query's items live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QuerySource {
    /// Folders the user added to the library
    Local,
    /// Removable storage (SD card, USB drive)
    Removable,
}

impl QuerySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuerySource::Local => "local",
            QuerySource::Removable => "removable",
        }
    }
}

/// One entry returned by a folder query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FolderItem {
    /// Absolute path of the item
    pub path: PathBuf,
    /// Name shown to the user (file stem for files)
    pub display_name: String,
    /// Size in bytes (0 for folders)
    pub size: u64,
    /// Last modification time, if the platform reports one
    pub modified_at: Option<DateTime<Utc>>,
    /// Whether the item is a folder rather than a file
    pub is_folder: bool,
}

impl FolderItem {
    /// Build a file item, deriving the display name from the file stem.
    pub fn file(path: impl Into<PathBuf>, size: u64, modified_at: Option<DateTime<Utc>>) -> Self {
        let path = path.into();
        let display_name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            path,
            display_name,
            size,
            modified_at,
            is_folder: false,
        }
    }

    /// Lowercased file extension, if any.
    pub fn extension(&self) -> Option<String> {
        self.path
            .extension()
            .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
    }
}

/// Paged folder query trait
///
/// Implementations list the files beneath their roots in a deterministic
/// order so that `offset` is meaningful across calls. Two implementations are
/// expected on every platform: one for the library's watched folders and one
/// for removable storage.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::query::FolderQuery;
///
/// async fn count(query: &dyn FolderQuery) -> Result<usize> {
///     let mut offset = 0;
///     loop {
///         let page = query.get_page(offset, 50).await?;
///         if page.is_empty() {
///             return Ok(offset);
///         }
///         offset += page.len();
///     }
/// }
/// ```
#[async_trait]
pub trait FolderQuery: Send + Sync {
    /// Which kind of storage this query reads
    fn source(&self) -> QuerySource;

    /// Root folders covered by this query
    fn roots(&self) -> Vec<PathBuf>;

    /// Fetch up to `size` items starting at `offset`
    ///
    /// An empty page means the listing is exhausted.
    async fn get_page(&self, offset: usize, size: usize) -> Result<Vec<FolderItem>>;

    /// Whether the underlying storage is currently reachable and permitted
    async fn is_available(&self) -> bool {
        true
    }
}
