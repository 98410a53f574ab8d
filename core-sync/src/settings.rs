//! Per-session settings snapshot.
//!
//! Read once when a session starts and never polled again, so a user toggling
//! a preference mid-scan cannot split one session across two configurations.

use bridge_traits::storage::SettingsStore;
use tracing::warn;

pub const INCLUDE_REMOVABLE_KEY: &str = "library.include_removable_storage";
pub const USE_SNAPSHOT_CACHE_KEY: &str = "library.use_snapshot_cache";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanSettings {
    /// Crawl the removable-storage query in addition to the watched folders
    pub include_removable: bool,
    /// Allow the snapshot + change-log path
    pub use_snapshot_cache: bool,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            include_removable: false,
            use_snapshot_cache: true,
        }
    }
}

impl ScanSettings {
    /// Read settings, falling back to defaults for missing or unreadable keys.
    pub async fn load(store: &dyn SettingsStore) -> Self {
        let defaults = Self::default();
        Self {
            include_removable: read_flag(store, INCLUDE_REMOVABLE_KEY, defaults.include_removable)
                .await,
            use_snapshot_cache: read_flag(
                store,
                USE_SNAPSHOT_CACHE_KEY,
                defaults.use_snapshot_cache,
            )
            .await,
        }
    }
}

async fn read_flag(store: &dyn SettingsStore, key: &str, default: bool) -> bool {
    match store.get_bool(key).await {
        Ok(value) => value.unwrap_or(default),
        Err(e) => {
            warn!(key, error = %e, "Failed to read setting; using default");
            default
        }
    }
}
