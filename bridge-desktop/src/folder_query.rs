//! Paged folder queries backed by a directory walk

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    query::{FolderItem, FolderQuery, QuerySource},
};
use chrono::{DateTime, Utc};
use core_async::sync::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Walks a set of roots once per enumeration and serves pages from the
/// sorted listing.
///
/// A request for offset 0 starts a fresh enumeration; later offsets are
/// served from the listing captured at offset 0 so that pages stay
/// consistent while the enumerator pulls them.
struct FolderWalker {
    roots: Vec<PathBuf>,
    follow_links: bool,
    listing: Mutex<Option<Arc<Vec<FolderItem>>>>,
}

impl FolderWalker {
    fn new(roots: Vec<PathBuf>) -> Self {
        Self {
            roots,
            follow_links: false,
            listing: Mutex::new(None),
        }
    }

    async fn page(&self, offset: usize, size: usize) -> Result<Vec<FolderItem>> {
        let listing = {
            let mut cached = self.listing.lock().await;
            match cached.as_ref() {
                Some(listing) if offset > 0 => Arc::clone(listing),
                _ => {
                    let fresh = Arc::new(self.walk().await?);
                    *cached = Some(Arc::clone(&fresh));
                    fresh
                }
            }
        };

        Ok(listing.iter().skip(offset).take(size).cloned().collect())
    }

    async fn walk(&self) -> Result<Vec<FolderItem>> {
        let roots = self.roots.clone();
        let follow_links = self.follow_links;

        let items = core_async::task::spawn_blocking(move || walk_roots(&roots, follow_links))
            .await
            .map_err(|e| BridgeError::OperationFailed(format!("Folder walk panicked: {}", e)))?;

        debug!(roots = self.roots.len(), items = items.len(), "Walked folders");
        Ok(items)
    }
}

fn walk_roots(roots: &[PathBuf], follow_links: bool) -> Vec<FolderItem> {
    let mut items = Vec::new();

    for root in roots {
        let walker = WalkDir::new(root)
            .follow_links(follow_links)
            .sort_by_file_name();

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(root = ?root, error = %e, "Skipping unreadable entry");
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            let (size, modified_at) = match entry.metadata() {
                Ok(meta) => (
                    meta.len(),
                    meta.modified().ok().map(DateTime::<Utc>::from),
                ),
                Err(e) => {
                    warn!(path = ?entry.path(), error = %e, "Missing file metadata");
                    (0, None)
                }
            };

            items.push(FolderItem::file(entry.into_path(), size, modified_at));
        }
    }

    items
}

/// Query over the folders the user added to the library.
///
/// Missing roots contribute no items; they are not an error.
pub struct LocalFolderQuery {
    walker: FolderWalker,
}

impl LocalFolderQuery {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self {
            walker: FolderWalker::new(roots),
        }
    }

    /// Follow symbolic links while walking (off by default)
    pub fn follow_links(mut self, follow: bool) -> Self {
        self.walker.follow_links = follow;
        self
    }
}

#[async_trait]
impl FolderQuery for LocalFolderQuery {
    fn source(&self) -> QuerySource {
        QuerySource::Local
    }

    fn roots(&self) -> Vec<PathBuf> {
        self.walker.roots.clone()
    }

    async fn get_page(&self, offset: usize, size: usize) -> Result<Vec<FolderItem>> {
        self.walker.page(offset, size).await
    }
}

/// Query over mounted removable volumes.
///
/// Unlike [`LocalFolderQuery`], a volume that is unmounted or that the user
/// has not granted access to makes the query unavailable.
pub struct RemovableFolderQuery {
    walker: FolderWalker,
    permitted: bool,
}

impl RemovableFolderQuery {
    pub fn new(mount_points: Vec<PathBuf>, permitted: bool) -> Self {
        Self {
            walker: FolderWalker::new(mount_points),
            permitted,
        }
    }

    fn mounted(&self) -> bool {
        self.walker.roots.iter().any(|root| root.is_dir())
    }
}

#[async_trait]
impl FolderQuery for RemovableFolderQuery {
    fn source(&self) -> QuerySource {
        QuerySource::Removable
    }

    fn roots(&self) -> Vec<PathBuf> {
        self.walker.roots.clone()
    }

    async fn get_page(&self, offset: usize, size: usize) -> Result<Vec<FolderItem>> {
        if !self.permitted {
            return Err(BridgeError::PermissionDenied(
                "Removable storage access not granted".to_string(),
            ));
        }
        if !self.mounted() {
            return Err(BridgeError::NotAvailable(
                "No removable volume mounted".to_string(),
            ));
        }
        self.walker.page(offset, size).await
    }

    async fn is_available(&self) -> bool {
        self.permitted && self.mounted()
    }
}
