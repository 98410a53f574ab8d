//! Catalog read model
//!
//! Each partition is published as an immutable [`CatalogView`] behind a
//! `watch` channel. Publishing replaces the whole view in one step, so a
//! reader holding an `Arc<CatalogView>` keeps a consistent snapshot no matter
//! what happens afterwards, and never sees a half-applied scan.

use core_async::sync::watch;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::grouping::{Grouping, GroupingIndex};
use crate::models::{MediaKind, MediaRecord, PathKey};

/// Immutable view of one partition.
#[derive(Debug, Clone)]
pub struct CatalogView {
    pub kind: MediaKind,
    pub records: Arc<Vec<MediaRecord>>,
    /// Album/artist buckets; empty for video
    pub grouping: Arc<Grouping>,
    /// A scan for this partition is in progress
    pub is_scanning: bool,
    /// Increments on every publish; 0 means nothing was published yet
    pub generation: u64,
    index: Arc<HashMap<PathKey, usize>>,
}

impl CatalogView {
    pub fn empty(kind: MediaKind) -> Self {
        Self {
            kind,
            records: Arc::new(Vec::new()),
            grouping: Arc::new(Grouping::default()),
            is_scanning: false,
            generation: 0,
            index: Arc::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Look a record up by path (case-insensitive)
    pub fn record(&self, key: &PathKey) -> Option<&MediaRecord> {
        self.index.get(key).map(|&i| &self.records[i])
    }
}

/// Externally visible catalog, one view per partition.
pub struct CatalogReadModel {
    music: watch::Sender<Arc<CatalogView>>,
    video: watch::Sender<Arc<CatalogView>>,
}

impl Default for CatalogReadModel {
    fn default() -> Self {
        Self::new()
    }
}

impl CatalogReadModel {
    pub fn new() -> Self {
        let (music, _) = watch::channel(Arc::new(CatalogView::empty(MediaKind::Music)));
        let (video, _) = watch::channel(Arc::new(CatalogView::empty(MediaKind::Video)));
        Self { music, video }
    }

    fn sender(&self, kind: MediaKind) -> &watch::Sender<Arc<CatalogView>> {
        match kind {
            MediaKind::Music => &self.music,
            MediaKind::Video => &self.video,
        }
    }

    /// Current view of a partition
    pub fn get(&self, kind: MediaKind) -> Arc<CatalogView> {
        self.sender(kind).borrow().clone()
    }

    /// Receive every future view of a partition
    pub fn subscribe(&self, kind: MediaKind) -> watch::Receiver<Arc<CatalogView>> {
        self.sender(kind).subscribe()
    }

    /// Swap in a new record list for `kind`.
    ///
    /// Records that are no longer confirmed members are dropped here; music
    /// records are regrouped from scratch. The scanning flag is carried over
    /// from the previous view.
    pub fn publish(&self, kind: MediaKind, mut records: Vec<MediaRecord>) -> Arc<CatalogView> {
        records.retain(|r| r.membership_confirmed && r.kind == kind);

        let grouping = match kind {
            MediaKind::Music => GroupingIndex::rebuild(&records),
            MediaKind::Video => Grouping::default(),
        };
        let index = records
            .iter()
            .enumerate()
            .map(|(i, r)| (r.path_key(), i))
            .collect();

        let sender = self.sender(kind);
        let previous = sender.borrow().clone();
        let view = Arc::new(CatalogView {
            kind,
            records: Arc::new(records),
            grouping: Arc::new(grouping),
            is_scanning: previous.is_scanning,
            generation: previous.generation + 1,
            index: Arc::new(index),
        });
        sender.send_replace(Arc::clone(&view));

        debug!(
            partition = %kind,
            generation = view.generation,
            records = view.len(),
            albums = view.grouping.album_count(),
            "Published catalog view"
        );
        view
    }

    /// Flip the scanning flag without touching records.
    pub fn set_scanning(&self, kind: MediaKind, scanning: bool) {
        self.sender(kind).send_if_modified(|view| {
            if view.is_scanning == scanning {
                return false;
            }
            let mut next = (**view).clone();
            next.is_scanning = scanning;
            *view = Arc::new(next);
            true
        });
    }
}
