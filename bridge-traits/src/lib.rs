//! # Host Bridge Traits
//!
//! Capability traits the catalog core needs from its host platform.
//!
//! ## Overview
//!
//! The synchronization engine never touches the filesystem, a database or a
//! settings file directly. Everything it consumes from the outside world is
//! expressed as a trait here and implemented per platform (`bridge-desktop`
//! for desktop hosts, in-memory fakes in tests).
//!
//! ## Traits
//!
//! ### Catalog sources
//! - [`FolderQuery`](query::FolderQuery) - Paged listing of files under watched folders
//! - [`ChangeLog`](change_log::ChangeLog) - Ordered change events since a checkpoint
//!
//! ### Persistence
//! - [`BlobStore`](storage::BlobStore) - Whole-blob replace storage for snapshots
//! - [`SettingsStore`](storage::SettingsStore) - Key-value preferences storage
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Platform
//! implementations should convert their native errors and include context
//! (file paths, SQL statement kind) in the message.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so a single adapter can be shared
//! by concurrent scan sessions.

pub mod change_log;
pub mod error;
pub mod query;
pub mod storage;
pub mod time;

pub use error::BridgeError;

pub use change_log::{ChangeBatch, ChangeCheckpoint, ChangeEvent, ChangeKind, ChangeLog};
pub use query::{FolderItem, FolderQuery, QuerySource};
pub use storage::{BlobStore, SettingsStore};
pub use time::{Clock, LogEntry, LogLevel, LoggerSink, SystemClock};
