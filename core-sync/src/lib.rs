//! # Catalog Synchronization Module
//!
//! Keeps the in-memory media catalog consistent with the filesystem across
//! app sessions without re-crawling everything every time.
//!
//! ## Components
//!
//! - **Snapshot Store** (`snapshot`): Persisted per-partition catalog snapshots
//! - **Batch Enumerator** (`enumerator`): Paged crawl with throttled progress
//! - **Change Reconciler** (`reconciler`): Applies change-log batches to a snapshot
//! - **Scan Session** (`session`): Per-call state machine and cancellation handle
//! - **Scan Settings** (`settings`): Settings snapshot read at session start
//! - **Catalog Synchronizer** (`coordinator`): Orchestrates cache-vs-crawl,
//!   publish and persistence with supersession

pub mod coordinator;
pub mod enumerator;
pub mod error;
pub mod reconciler;
pub mod session;
pub mod settings;
pub mod snapshot;

pub use coordinator::{
    CatalogSynchronizer, LibrarySource, ScanProgress, SyncOutcome, SyncPath, SyncReport,
};
pub use enumerator::{BatchEnumerator, Enumeration, EnumerationOutcome, NullProgress, ProgressSink};
pub use error::{Result, SyncError};
pub use reconciler::{ChangeReconciler, ReconcileStats, Reconciliation, RescanReason};
pub use session::{ScanSession, ScanState, SessionId};
pub use settings::ScanSettings;
pub use snapshot::{Snapshot, SnapshotLoad, SnapshotStore};
