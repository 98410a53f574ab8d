//! Change-log reconciliation.
//!
//! Applies an ordered batch of change events to the records of a snapshot.
//! Pure computation: no I/O, no metadata reads. Either every event is applied
//! or the caller is told to fall back to a full crawl.

use bridge_traits::change_log::{ChangeEvent, ChangeKind};
use chrono::{DateTime, Utc};
use core_library::{ExtensionFilter, MediaKind, MediaRecord, PathKey};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::debug;

/// Why a batch could not be reconciled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RescanReason {
    /// The log reported that it lost track of changes
    TrackingLost,
    /// A folder was created, removed, moved or changed
    FolderChanged { kind: ChangeKind, path: PathBuf },
}

impl std::fmt::Display for RescanReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RescanReason::TrackingLost => f.write_str("change tracking lost"),
            RescanReason::FolderChanged { kind, path } => {
                write!(f, "folder {} at {}", kind.as_str(), path.display())
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    pub added: usize,
    pub removed: usize,
    pub moved: usize,
    pub refreshed: usize,
    /// No-op events plus events about files outside this partition
    pub ignored: usize,
}

#[derive(Debug)]
pub enum Reconciliation {
    Reconciled {
        records: Vec<MediaRecord>,
        stats: ReconcileStats,
    },
    MustRescan {
        reason: RescanReason,
    },
}

/// Record list with O(1) lookup by normalized path. Removed records leave an
/// empty slot so positions stay stable while events are applied.
struct Working {
    slots: Vec<Option<MediaRecord>>,
    index: HashMap<PathKey, usize>,
}

impl Working {
    fn new(records: Vec<MediaRecord>) -> Self {
        let mut working = Self {
            slots: Vec::with_capacity(records.len()),
            index: HashMap::with_capacity(records.len()),
        };
        for record in records {
            working.insert(record);
        }
        working
    }

    /// Insert or replace the record with the same normalized path.
    fn insert(&mut self, record: MediaRecord) {
        let key = record.path_key();
        match self.index.get(&key) {
            Some(&slot) => self.slots[slot] = Some(record),
            None => {
                self.index.insert(key, self.slots.len());
                self.slots.push(Some(record));
            }
        }
    }

    fn take(&mut self, key: &PathKey) -> Option<MediaRecord> {
        let slot = self.index.remove(key)?;
        self.slots[slot].take()
    }

    fn get_mut(&mut self, key: &PathKey) -> Option<&mut MediaRecord> {
        let slot = *self.index.get(key)?;
        self.slots[slot].as_mut()
    }

    fn contains(&self, key: &PathKey) -> bool {
        self.index.contains_key(key)
    }

    fn into_records(self) -> Vec<MediaRecord> {
        self.slots.into_iter().flatten().collect()
    }
}

pub struct ChangeReconciler {
    kind: MediaKind,
    filter: ExtensionFilter,
}

impl ChangeReconciler {
    pub fn new(kind: MediaKind, filter: ExtensionFilter) -> Self {
        Self { kind, filter }
    }

    /// Apply `events` in log order to `records`.
    ///
    /// Records created by events carry `now` as their added date and no
    /// metadata. A moved record keeps its metadata and added date.
    pub fn reconcile(
        &self,
        records: Vec<MediaRecord>,
        events: &[ChangeEvent],
        now: DateTime<Utc>,
    ) -> Reconciliation {
        let mut working = Working::new(records);
        let mut stats = ReconcileStats::default();

        for event in events {
            if event.kind == ChangeKind::ChangeTrackingLost {
                return Reconciliation::MustRescan {
                    reason: RescanReason::TrackingLost,
                };
            }
            if event.kind.is_ignorable() {
                stats.ignored += 1;
                continue;
            }
            if event.is_folder {
                return Reconciliation::MustRescan {
                    reason: RescanReason::FolderChanged {
                        kind: event.kind,
                        path: event.path.clone(),
                    },
                };
            }

            match event.kind {
                ChangeKind::Created | ChangeKind::MovedIn => {
                    self.apply_created(&mut working, event, now, &mut stats)
                }
                ChangeKind::Deleted | ChangeKind::MovedOut => {
                    match working.take(&PathKey::new(event.old_path())) {
                        Some(_) => stats.removed += 1,
                        None => stats.ignored += 1,
                    }
                }
                ChangeKind::MovedOrRenamed => {
                    self.apply_moved(&mut working, event, now, &mut stats)
                }
                ChangeKind::ContentsChanged | ChangeKind::ContentsReplaced => {
                    match working.get_mut(&PathKey::new(&event.path)) {
                        Some(record) => {
                            record.refresh_source(event.size, event.modified_at);
                            stats.refreshed += 1;
                        }
                        None => stats.ignored += 1,
                    }
                }
                ChangeKind::IndexingStatusChanged
                | ChangeKind::EncryptionChanged
                | ChangeKind::ChangeTrackingLost => {}
            }
        }

        debug!(
            partition = %self.kind,
            events = events.len(),
            added = stats.added,
            removed = stats.removed,
            moved = stats.moved,
            refreshed = stats.refreshed,
            "Reconciled change batch"
        );
        Reconciliation::Reconciled {
            records: working.into_records(),
            stats,
        }
    }

    fn new_record(&self, event: &ChangeEvent, now: DateTime<Utc>) -> MediaRecord {
        let mut record = MediaRecord::new(event.path.clone(), self.kind, now);
        record.size = event.size.unwrap_or_default();
        record.modified_at = event.modified_at;
        record
    }

    fn apply_created(
        &self,
        working: &mut Working,
        event: &ChangeEvent,
        now: DateTime<Utc>,
        stats: &mut ReconcileStats,
    ) {
        if !self.filter.accepts(&event.path) {
            stats.ignored += 1;
            return;
        }

        let key = PathKey::new(&event.path);
        match working.get_mut(&key) {
            // Already known: the later event describes the current content.
            Some(existing) => {
                existing.refresh_source(event.size, event.modified_at);
                stats.refreshed += 1;
            }
            None => {
                working.insert(self.new_record(event, now));
                stats.added += 1;
            }
        }
    }

    fn apply_moved(
        &self,
        working: &mut Working,
        event: &ChangeEvent,
        now: DateTime<Utc>,
        stats: &mut ReconcileStats,
    ) {
        let previous = working.take(&PathKey::new(event.old_path()));
        let accepted = self.filter.accepts(&event.path);

        match (previous, accepted) {
            (Some(mut record), true) => {
                // Metadata is carried over unverified.
                record.relocate(event.path.clone());
                if event.size.is_some() || event.modified_at.is_some() {
                    record.size = event.size.unwrap_or(record.size);
                    record.modified_at = event.modified_at.or(record.modified_at);
                }
                working.insert(record);
                stats.moved += 1;
            }
            (Some(_), false) => stats.removed += 1,
            (None, true) => {
                let key = PathKey::new(&event.path);
                if working.contains(&key) {
                    stats.ignored += 1;
                } else {
                    working.insert(self.new_record(event, now));
                    stats.added += 1;
                }
            }
            (None, false) => stats.ignored += 1,
        }
    }
}
