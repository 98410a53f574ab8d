//! # Catalog Synchronizer
//!
//! Orchestrates one partition's scan lifecycle: decides between the snapshot
//! cache and a full crawl, publishes the result to the [`CatalogReadModel`],
//! persists a new snapshot and advances the change-log checkpoint.
//!
//! ## Workflow
//!
//! 1. Supersede any running session for the partition (signal, don't wait)
//! 2. Cache attempt: load snapshot, compare watched folders, reconcile the
//!    change log
//! 3. Otherwise full crawl: enumerate every query, reuse metadata of
//!    unchanged files, load metadata for the rest
//! 4. Confirm membership, demote records that disappeared
//! 5. Publish, but only if this session is still the partition's current one
//! 6. Persist the snapshot; accept the change log only after a successful save
//!
//! Once a session has started, only cancellation is returned as an error from
//! [`CatalogSynchronizer::synchronize`]. Every other failure is logged and
//! reported as [`SyncOutcome::Unchanged`]; the previous catalog stays visible.
//! Calling it for a partition with no registered source is a caller error and
//! is rejected before any session starts.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_sync::{CatalogSynchronizer, LibrarySource};
//!
//! let synchronizer = CatalogSynchronizer::new(config, metadata_reader, event_bus);
//! synchronizer
//!     .register_source(MediaKind::Music, LibrarySource::new(local_query).with_change_log(journal))
//!     .await;
//!
//! let outcome = synchronizer.synchronize(MediaKind::Music, true).await?;
//! let view = synchronizer.get_catalog(MediaKind::Music);
//! ```

use bridge_traits::change_log::{ChangeCheckpoint, ChangeLog};
use bridge_traits::query::FolderQuery;
use core_async::sync::{broadcast, Mutex, RwLock};
use core_library::{
    CatalogReadModel, CatalogView, ExtensionFilter, MediaKind, MediaRecord, PathKey,
};
use core_metadata::MetadataReader;
use core_runtime::events::{CatalogEvent, CoreEvent, EventBus, ScanEvent};
use core_runtime::logging::strip_path;
use core_runtime::CatalogConfig;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn, Span};

use crate::enumerator::{BatchEnumerator, ProgressSink};
use crate::reconciler::{ChangeReconciler, Reconciliation};
use crate::session::{ScanSession, ScanState, SessionId};
use crate::settings::ScanSettings;
use crate::snapshot::{Snapshot, SnapshotLoad, SnapshotStore};
use crate::{Result, SyncError};

/// Where a partition's files come from.
#[derive(Clone)]
pub struct LibrarySource {
    /// Watched folders; compared against the snapshot's folder set
    pub folders: Vec<PathBuf>,
    pub query: Arc<dyn FolderQuery>,
    /// Crawled only when settings include removable storage and it is available
    pub removable: Option<Arc<dyn FolderQuery>>,
    /// Without a change log the snapshot cannot be verified and every scan crawls
    pub change_log: Option<Arc<dyn ChangeLog>>,
}

impl LibrarySource {
    /// Source whose watched folders are the query's roots
    pub fn new(query: Arc<dyn FolderQuery>) -> Self {
        Self {
            folders: query.roots(),
            query,
            removable: None,
            change_log: None,
        }
    }

    pub fn with_folders(mut self, folders: Vec<PathBuf>) -> Self {
        self.folders = folders;
        self
    }

    pub fn with_removable(mut self, query: Arc<dyn FolderQuery>) -> Self {
        self.removable = Some(query);
        self
    }

    pub fn with_change_log(mut self, log: Arc<dyn ChangeLog>) -> Self {
        self.change_log = Some(log);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPath {
    Cache,
    Crawl,
}

impl SyncPath {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncPath::Cache => "cache",
            SyncPath::Crawl => "crawl",
        }
    }
}

/// Counts for one completed session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub session_id: SessionId,
    pub partition: MediaKind,
    pub path: SyncPath,
    /// Records in the published view
    pub records: usize,
    /// Records not present in the previous view
    pub added: usize,
    /// Records of the previous view that were demoted
    pub removed: usize,
    pub metadata_loaded: usize,
    pub metadata_failures: usize,
    pub pages_lost: usize,
    /// Generation of the published view
    pub generation: u64,
    /// Whether the snapshot was written by this session
    pub persisted: bool,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Reconciled(SyncReport),
    FullCrawl(SyncReport),
    /// The session failed; the previous catalog is still published.
    Unchanged {
        session_id: SessionId,
        reason: String,
    },
}

impl SyncOutcome {
    pub fn report(&self) -> Option<&SyncReport> {
        match self {
            SyncOutcome::Reconciled(report) | SyncOutcome::FullCrawl(report) => Some(report),
            SyncOutcome::Unchanged { .. } => None,
        }
    }
}

/// Partial crawl results, broadcast while a full crawl runs.
#[derive(Debug, Clone)]
pub struct ScanProgress {
    pub session_id: SessionId,
    pub partition: MediaKind,
    /// Records found since the previous progress message
    pub records: Arc<Vec<MediaRecord>>,
    /// Running total for the session
    pub discovered: usize,
}

struct ActiveSession {
    id: SessionId,
    cancel: core_async::sync::CancellationToken,
}

/// Records ready to be published plus what the session learned on the way.
#[derive(Default)]
struct Prepared {
    records: Vec<MediaRecord>,
    accept_through: Option<ChangeCheckpoint>,
    metadata_loaded: usize,
    metadata_failures: usize,
    pages_lost: usize,
}

enum CacheResult {
    Hit(Prepared),
    /// Cache unusable; `prior` holds snapshot records whose metadata a
    /// crawl may still reuse.
    Miss { prior: Vec<MediaRecord> },
}

struct ProgressForwarder<'a> {
    sender: &'a broadcast::Sender<ScanProgress>,
    event_bus: &'a EventBus,
    session_id: SessionId,
    kind: MediaKind,
}

impl ProgressSink for ProgressForwarder<'_> {
    fn report(&self, batch: Vec<MediaRecord>, discovered: usize) {
        // No subscribers is fine.
        let _ = self.sender.send(ScanProgress {
            session_id: self.session_id,
            partition: self.kind,
            records: Arc::new(batch),
            discovered,
        });
        self.event_bus
            .emit(CoreEvent::Scan(ScanEvent::Progress {
                session_id: self.session_id.to_string(),
                partition: self.kind.to_string(),
                items_discovered: discovered as u64,
            }))
            .ok();
    }
}

pub struct CatalogSynchronizer {
    config: CatalogConfig,
    catalog: Arc<CatalogReadModel>,
    snapshots: SnapshotStore,
    metadata: Arc<dyn MetadataReader>,
    event_bus: EventBus,
    progress: broadcast::Sender<ScanProgress>,
    sources: RwLock<HashMap<MediaKind, LibrarySource>>,
    active: Mutex<HashMap<MediaKind, ActiveSession>>,
    /// Generation of the last snapshot written per partition
    persisted: Mutex<HashMap<MediaKind, u64>>,
}

impl CatalogSynchronizer {
    pub fn new(
        config: CatalogConfig,
        metadata: Arc<dyn MetadataReader>,
        event_bus: EventBus,
    ) -> Self {
        let (progress, _) = broadcast::channel(config.event_buffer_size.max(1));
        Self {
            snapshots: SnapshotStore::new(Arc::clone(&config.blob_store)),
            config,
            catalog: Arc::new(CatalogReadModel::new()),
            metadata,
            event_bus,
            progress,
            sources: RwLock::new(HashMap::new()),
            active: Mutex::new(HashMap::new()),
            persisted: Mutex::new(HashMap::new()),
        }
    }

    /// Register (or replace) the source of a partition.
    pub async fn register_source(&self, kind: MediaKind, source: LibrarySource) {
        info!(
            partition = %kind,
            folders = source.folders.len(),
            removable = source.removable.is_some(),
            change_log = source.change_log.is_some(),
            "Registered library source"
        );
        self.sources.write().await.insert(kind, source);
    }

    pub fn catalog(&self) -> Arc<CatalogReadModel> {
        Arc::clone(&self.catalog)
    }

    pub fn get_catalog(&self, kind: MediaKind) -> Arc<CatalogView> {
        self.catalog.get(kind)
    }

    pub fn is_scanning(&self, kind: MediaKind) -> bool {
        self.catalog.get(kind).is_scanning
    }

    pub fn subscribe_progress(&self) -> broadcast::Receiver<ScanProgress> {
        self.progress.subscribe()
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Cancel the running session of a partition without starting a new one.
    ///
    /// Returns `false` when nothing was running.
    pub async fn cancel(&self, kind: MediaKind) -> bool {
        let active = self.active.lock().await;
        match active.get(&kind) {
            Some(session) => {
                info!(partition = %kind, session = %session.id, "Cancelling scan");
                session.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Bring the partition's catalog up to date.
    ///
    /// Supersedes any session already running for `kind`. Returns
    /// [`SyncError::Cancelled`] when this session is itself superseded or
    /// cancelled before it publishes.
    ///
    /// # Errors
    ///
    /// [`SyncError::LibraryNotConfigured`] when no source was registered for
    /// `kind`. This is a precondition check: no session is started, no event
    /// is emitted and the running session (if any) is left alone.
    #[instrument(skip(self), fields(partition = %kind, session = tracing::field::Empty))]
    pub async fn synchronize(&self, kind: MediaKind, use_cache: bool) -> Result<SyncOutcome> {
        let source = self.source(kind).await?;
        let settings = ScanSettings::load(self.config.settings_store.as_ref()).await;
        let mut session = ScanSession::new(kind, use_cache, settings, self.config.clock.now());
        Span::current().record("session", tracing::field::display(session.id));

        self.begin(&session).await;

        let outcome = match self.run(&mut session, &source).await {
            Ok(report) => {
                info!(
                    path = report.path.as_str(),
                    records = report.records,
                    added = report.added,
                    removed = report.removed,
                    duration_ms = report.duration_ms,
                    "Scan completed"
                );
                self.emit(CoreEvent::Scan(ScanEvent::Completed {
                    session_id: session.id.to_string(),
                    partition: kind.to_string(),
                    path: report.path.as_str().to_string(),
                    items: report.records as u64,
                    removed: report.removed as u64,
                    duration_ms: report.duration_ms,
                }));
                Ok(match report.path {
                    SyncPath::Cache => SyncOutcome::Reconciled(report),
                    SyncPath::Crawl => SyncOutcome::FullCrawl(report),
                })
            }
            Err(e) if e.is_cancellation() => {
                if session.state().is_cancelable() {
                    session.transition(ScanState::Canceled).ok();
                }
                info!("Scan superseded or cancelled; result discarded");
                self.emit(CoreEvent::Scan(ScanEvent::Canceled {
                    session_id: session.id.to_string(),
                    partition: kind.to_string(),
                }));
                Err(SyncError::Cancelled)
            }
            Err(e) => {
                if session.state().is_cancelable() {
                    session.transition(ScanState::Failed).ok();
                }
                warn!(error = %e, "Scan failed; keeping previous catalog");
                self.emit(CoreEvent::Scan(ScanEvent::Failed {
                    session_id: session.id.to_string(),
                    partition: kind.to_string(),
                    message: e.to_string(),
                }));
                Ok(SyncOutcome::Unchanged {
                    session_id: session.id,
                    reason: e.to_string(),
                })
            }
        };

        self.finish(&session).await;
        outcome
    }

    async fn source(&self, kind: MediaKind) -> Result<LibrarySource> {
        self.sources
            .read()
            .await
            .get(&kind)
            .cloned()
            .ok_or_else(|| SyncError::LibraryNotConfigured {
                partition: kind.to_string(),
            })
    }

    fn emit(&self, event: CoreEvent) {
        self.event_bus.emit(event).ok();
    }

    fn filter(&self, kind: MediaKind) -> ExtensionFilter {
        match kind {
            MediaKind::Music => ExtensionFilter::new(self.config.music_extensions.clone()),
            MediaKind::Video => ExtensionFilter::new(self.config.video_extensions.clone()),
        }
    }

    async fn begin(&self, session: &ScanSession) {
        let previous = self.active.lock().await.insert(
            session.kind,
            ActiveSession {
                id: session.id,
                cancel: session.cancellation_token(),
            },
        );
        if let Some(previous) = previous {
            info!(superseded = %previous.id, "Superseding running scan");
            previous.cancel.cancel();
        }

        self.catalog.set_scanning(session.kind, true);
        self.emit(CoreEvent::Scan(ScanEvent::Started {
            session_id: session.id.to_string(),
            partition: session.kind.to_string(),
            use_cache: session.use_cache,
        }));
    }

    async fn finish(&self, session: &ScanSession) {
        let mut active = self.active.lock().await;
        if active.get(&session.kind).is_some_and(|a| a.id == session.id) {
            active.remove(&session.kind);
            self.catalog.set_scanning(session.kind, false);
        }
    }

    async fn run(&self, session: &mut ScanSession, source: &LibrarySource) -> Result<SyncReport> {
        let kind = session.kind;
        let previous = self.catalog.get(kind);

        let cached = if session.use_cache {
            session.transition(ScanState::CacheAttempt)?;
            self.try_cache(session, source).await?
        } else {
            CacheResult::Miss { prior: Vec::new() }
        };

        let (path, prepared) = match cached {
            CacheResult::Hit(prepared) => {
                session.transition(ScanState::Reconciled)?;
                (SyncPath::Cache, prepared)
            }
            CacheResult::Miss { prior } => {
                session.transition(ScanState::FullCrawl)?;
                (
                    SyncPath::Crawl,
                    self.full_crawl(session, source, &previous, prior).await?,
                )
            }
        };
        session.check_cancelled()?;

        let mut records = prepared.records;
        let found: HashSet<PathKey> = records.iter().map(MediaRecord::path_key).collect();
        for record in &mut records {
            record.membership_confirmed = true;
        }
        let added = found
            .iter()
            .filter(|key| previous.record(key).is_none())
            .count();

        // Records of the previous view that were not observed are dropped
        // from the new view; readers holding the old view still see them.
        let removed = previous
            .records
            .iter()
            .filter(|record| !found.contains(&record.path_key()))
            .count();

        let view = self.publish_if_current(session, records).await?;
        self.emit(CoreEvent::Catalog(CatalogEvent::Published {
            partition: kind.to_string(),
            generation: view.generation,
            records: view.len() as u64,
            albums: view.grouping.album_count() as u64,
            artists: view.grouping.artist_count() as u64,
        }));

        session.transition(ScanState::Persisting)?;
        let persisted = self
            .persist(kind, source, &view, prepared.accept_through)
            .await;
        session.transition(ScanState::Idle)?;

        Ok(SyncReport {
            session_id: session.id,
            partition: kind,
            path,
            records: view.len(),
            added,
            removed,
            metadata_loaded: prepared.metadata_loaded,
            metadata_failures: prepared.metadata_failures,
            pages_lost: prepared.pages_lost,
            generation: view.generation,
            persisted,
            duration_ms: self
                .config
                .clock
                .elapsed_since(session.started_at)
                .num_milliseconds()
                .max(0) as u64,
        })
    }

    async fn try_cache(
        &self,
        session: &ScanSession,
        source: &LibrarySource,
    ) -> Result<CacheResult> {
        let snapshot = match self.snapshots.load(session.kind).await {
            SnapshotLoad::Loaded(snapshot) => snapshot,
            SnapshotLoad::NotFound => {
                info!("No snapshot; full crawl");
                return Ok(CacheResult::Miss { prior: Vec::new() });
            }
            SnapshotLoad::Corrupt(reason) => {
                info!(%reason, "Snapshot rejected; full crawl");
                return Ok(CacheResult::Miss { prior: Vec::new() });
            }
        };
        session.check_cancelled()?;

        if !snapshot.matches_folders(&source.folders) {
            info!("Watched folders changed since snapshot; full crawl");
            return Ok(CacheResult::Miss {
                prior: snapshot.records,
            });
        }
        let Some(log) = &source.change_log else {
            info!("No change log to verify snapshot; full crawl");
            return Ok(CacheResult::Miss {
                prior: snapshot.records,
            });
        };

        let batch = match log.checkpoint().await {
            Ok(checkpoint) => log.read_batch_since(checkpoint).await,
            Err(e) => Err(e),
        };
        let batch = match batch {
            Ok(batch) => batch,
            Err(e) => {
                warn!(error = %e, "Change log unreadable; full crawl");
                return Ok(CacheResult::Miss {
                    prior: snapshot.records,
                });
            }
        };
        session.check_cancelled()?;

        let reconciler = ChangeReconciler::new(session.kind, self.filter(session.kind));
        let now = self.config.clock.now();
        match reconciler.reconcile(snapshot.records.clone(), &batch.events, now) {
            Reconciliation::MustRescan { reason } => {
                info!(%reason, "Change log cannot be reconciled; full crawl");
                Ok(CacheResult::Miss {
                    prior: snapshot.records,
                })
            }
            Reconciliation::Reconciled { records, stats } => {
                debug!(
                    events = batch.events.len(),
                    through = %batch.through,
                    ignored = stats.ignored,
                    "Snapshot reconciled"
                );
                // Records added by events have no metadata yet; refreshed
                // records keep theirs until the next crawl.
                let (records, loaded, failures) = self
                    .load_metadata(session, records, |r| r.metadata.is_none())
                    .await?;
                Ok(CacheResult::Hit(Prepared {
                    records,
                    accept_through: Some(batch.through),
                    metadata_loaded: loaded,
                    metadata_failures: failures,
                    pages_lost: 0,
                }))
            }
        }
    }

    async fn full_crawl(
        &self,
        session: &ScanSession,
        source: &LibrarySource,
        previous: &CatalogView,
        prior: Vec<MediaRecord>,
    ) -> Result<Prepared> {
        let kind = session.kind;

        // Events recorded while crawling are covered by the crawl.
        let head = match &source.change_log {
            Some(log) => match log.head().await {
                Ok(head) => Some(head),
                Err(e) => {
                    warn!(error = %e, "Change log head unreadable; checkpoint will not advance");
                    None
                }
            },
            None => None,
        };

        let mut queries: Vec<Arc<dyn FolderQuery>> = vec![Arc::clone(&source.query)];
        if session.settings.include_removable {
            if let Some(removable) = &source.removable {
                if removable.is_available().await {
                    queries.push(Arc::clone(removable));
                } else {
                    info!("Removable storage unavailable; skipping");
                }
            }
        }

        let enumerator = BatchEnumerator::new(kind, self.filter(kind), Arc::clone(&self.config.clock))
            .with_page_size(self.config.page_size)
            .with_progress_interval(self.config.progress_interval);
        let sink = ProgressForwarder {
            sender: &self.progress,
            event_bus: &self.event_bus,
            session_id: session.id,
            kind,
        };
        let cancel = session.cancellation_token();

        let mut seen = HashSet::new();
        let mut found = Vec::new();
        let mut pages_lost = 0;
        for query in &queries {
            let outcome = enumerator
                .enumerate(query.as_ref(), found.len(), &cancel, &sink)
                .collect()
                .await?;
            debug!(
                source = query.source().as_str(),
                pages = outcome.pages,
                records = outcome.records.len(),
                "Query crawled"
            );
            pages_lost += outcome.pages_lost;
            // First observation of a path wins.
            found.extend(
                outcome
                    .records
                    .into_iter()
                    .filter(|record| seen.insert(record.path_key())),
            );
        }

        // The live catalog is fresher than the snapshot.
        let mut known: HashMap<PathKey, MediaRecord> =
            prior.into_iter().map(|r| (r.path_key(), r)).collect();
        known.extend(previous.records.iter().map(|r| (r.path_key(), r.clone())));

        let merged: Vec<MediaRecord> = found
            .into_iter()
            .map(|mut record| match known.remove(&record.path_key()) {
                Some(mut existing) if existing.is_current_for(&record) => {
                    existing.path = record.path;
                    existing
                }
                Some(existing) => {
                    record.date_added = existing.date_added;
                    record
                }
                None => record,
            })
            .collect();

        let (records, loaded, failures) = self
            .load_metadata(session, merged, |r| r.metadata.is_none() || r.needs_refresh)
            .await?;

        Ok(Prepared {
            records,
            accept_through: head,
            metadata_loaded: loaded,
            metadata_failures: failures,
            pages_lost,
        })
    }

    /// Load metadata for every record matching `needs_load`.
    ///
    /// A record whose metadata cannot be read keeps its previous metadata (or
    /// none) and stays in the result. The checkpoint accepted after this
    /// session no longer mentions the file, so dropping it here would lose it
    /// until the next full crawl; kept, it is retried by the next session.
    async fn load_metadata<F>(
        &self,
        session: &ScanSession,
        records: Vec<MediaRecord>,
        needs_load: F,
    ) -> Result<(Vec<MediaRecord>, usize, usize)>
    where
        F: Fn(&MediaRecord) -> bool,
    {
        let mut loaded = 0;
        let mut failures = 0;
        let mut result = Vec::with_capacity(records.len());

        for mut record in records {
            if !needs_load(&record) {
                result.push(record);
                continue;
            }
            session.check_cancelled()?;
            match self.metadata.read(&record.path, session.kind).await {
                Ok(metadata) => {
                    record.set_metadata(metadata);
                    loaded += 1;
                    result.push(record);
                }
                Err(e) => {
                    failures += 1;
                    let path = record.path.to_string_lossy().into_owned();
                    warn!(
                        file = strip_path(&path),
                        error = %e,
                        "Metadata unreadable; keeping file for retry"
                    );
                    result.push(record);
                }
            }
        }

        Ok((result, loaded, failures))
    }

    async fn publish_if_current(
        &self,
        session: &ScanSession,
        records: Vec<MediaRecord>,
    ) -> Result<Arc<CatalogView>> {
        let active = self.active.lock().await;
        let current = active
            .get(&session.kind)
            .is_some_and(|a| a.id == session.id);
        if !current || session.is_cancelled() {
            return Err(SyncError::Cancelled);
        }
        Ok(self.catalog.publish(session.kind, records))
    }

    /// Write the snapshot for `view` unless a newer one is already on disk.
    async fn persist(
        &self,
        kind: MediaKind,
        source: &LibrarySource,
        view: &CatalogView,
        accept_through: Option<ChangeCheckpoint>,
    ) -> bool {
        let mut persisted = self.persisted.lock().await;
        if persisted.get(&kind).is_some_and(|&g| g >= view.generation) {
            debug!(generation = view.generation, "Newer snapshot already persisted");
            return false;
        }

        let snapshot = Snapshot::new(source.folders.clone(), view.records.as_ref().clone());
        if let Err(e) = self.snapshots.save(kind, &snapshot).await {
            warn!(error = %e, "Snapshot not saved; next start will crawl");
            self.emit(CoreEvent::Catalog(CatalogEvent::SnapshotPersistFailed {
                partition: kind.to_string(),
                message: e.to_string(),
            }));
            return false;
        }
        persisted.insert(kind, view.generation);
        self.emit(CoreEvent::Catalog(CatalogEvent::SnapshotPersisted {
            partition: kind.to_string(),
            records: view.len() as u64,
        }));

        if let (Some(log), Some(through)) = (&source.change_log, accept_through) {
            match log.accept_changes(through).await {
                Ok(()) => debug!(%through, "Change log accepted"),
                Err(e) => warn!(error = %e, "Failed to accept change log"),
            }
        }
        true
    }
}
