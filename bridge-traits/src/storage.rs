//! Storage Abstractions
//!
//! Named blob persistence for catalog snapshots and key-value settings
//! storage for user preferences read at scan start.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

/// Named blob storage trait
///
/// Each blob is addressed by a flat name (`songs.cache`, `videos.cache`).
/// Implementations must make `save` a whole-blob replace: a reader never
/// observes a partially written blob.
///
/// - Desktop: one file per blob under the application cache directory
/// - Mobile: app-sandboxed cache directory
/// - Tests: in-memory map
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::BlobStore;
///
/// async fn stash(store: &dyn BlobStore, data: Bytes) -> Result<()> {
///     store.save("songs.cache", data).await
/// }
/// ```
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Load a blob by name
    ///
    /// # Returns
    ///
    /// Returns `Ok(None)` if no blob with this name was ever saved.
    async fn load(&self, name: &str) -> Result<Option<Bytes>>;

    /// Replace the blob stored under `name`
    async fn save(&self, name: &str, data: Bytes) -> Result<()>;

    /// Remove a blob. Removing a missing blob is not an error.
    async fn delete(&self, name: &str) -> Result<()>;
}

/// Key-value settings storage trait
///
/// Abstracts platform-specific preferences storage:
/// - iOS: UserDefaults
/// - Android: SharedPreferences / DataStore
/// - Desktop: SQLite-backed key-value table
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::SettingsStore;
///
/// async fn save_preference(store: &dyn SettingsStore) -> Result<()> {
///     store.set_bool("library.include_removable_storage", true).await?;
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Store a string value
    async fn set_string(&self, key: &str, value: &str) -> Result<()>;

    /// Retrieve a string value
    async fn get_string(&self, key: &str) -> Result<Option<String>>;

    /// Store a boolean value
    async fn set_bool(&self, key: &str, value: bool) -> Result<()>;

    /// Retrieve a boolean value
    async fn get_bool(&self, key: &str) -> Result<Option<bool>>;

    /// Delete a setting
    async fn delete(&self, key: &str) -> Result<()>;

    /// Check if a setting exists
    async fn has_key(&self, key: &str) -> Result<bool> {
        Ok(self.get_string(key).await?.is_some())
    }
}
