//! Workspace facade crate.
//!
//! Re-exports the catalog crates so a host application can depend on
//! `media-catalog-workspace` alone. The `desktop-shims` feature (on by
//! default) pulls in the desktop bridge implementations and lets
//! [`CatalogConfig`](core_runtime::CatalogConfig) fall back to them when no
//! blob or settings store is injected.

pub use core_library as library;
pub use core_metadata as metadata;
pub use core_runtime as runtime;
pub use core_sync as sync;

#[cfg(feature = "desktop-shims")]
pub use bridge_desktop as desktop;

pub use core_library::{CatalogView, MediaKind, MediaRecord};
pub use core_metadata::TagMetadataReader;
pub use core_runtime::{CatalogConfig, EventBus};
pub use core_sync::{CatalogSynchronizer, LibrarySource, SyncError, SyncOutcome};
