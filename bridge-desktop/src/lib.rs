//! # Desktop Bridge Implementations
//!
//! Default implementations of the catalog bridge traits for desktop
//! platforms (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! - `FolderQuery` using `walkdir`: [`LocalFolderQuery`] for watched library
//!   folders, [`RemovableFolderQuery`] for mounted removable volumes
//! - `BlobStore` using `tokio::fs` with temp-file + rename replacement
//! - `ChangeLog` using a SQLite journal fed by the host's file watcher
//! - `SettingsStore` using a SQLite-backed key-value table
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{FileBlobStore, LocalFolderQuery, SqliteChangeJournal};
//!
//! #[core_async::main]
//! async fn main() {
//!     let music = LocalFolderQuery::new(vec!["/home/me/Music".into()]);
//!     let blobs = FileBlobStore::default_location();
//!     let journal = SqliteChangeJournal::open("/home/me/.cache/journal.db".into(), "music")
//!         .await
//!         .unwrap();
//!     // Hand these to core_sync::LibrarySource
//! }
//! ```

mod blob_store;
mod change_journal;
mod folder_query;
mod settings;

pub use blob_store::FileBlobStore;
pub use change_journal::SqliteChangeJournal;
pub use folder_query::{LocalFolderQuery, RemovableFolderQuery};
pub use settings::SqliteSettingsStore;

use bridge_traits::error::{BridgeError, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;

/// Open (creating if needed) a SQLite database file.
pub(crate) async fn open_sqlite(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(BridgeError::Io)?;
    }

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true);

    SqlitePoolOptions::new()
        .connect_with(options)
        .await
        .map_err(|e| BridgeError::DatabaseError(format!("Failed to connect to DB: {}", e)))
}

/// Single-connection in-memory pool; every connection to `:memory:` is a new database.
pub(crate) async fn open_sqlite_in_memory() -> Result<SqlitePool> {
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .map_err(|e| BridgeError::DatabaseError(format!("Failed to connect to DB: {}", e)))
}
