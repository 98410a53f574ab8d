//! # Catalog Configuration
//!
//! Builder-based configuration for the media catalog engine.
//!
//! ## Overview
//!
//! [`CatalogConfig`] carries the tunables of a scan (page size, progress
//! interval, recognised extensions) together with the host capabilities the
//! engine needs that are not tied to a specific library source. The builder
//! validates everything up front so a misconfigured host fails at startup
//! rather than mid-scan.
//!
//! ## Required Dependencies
//!
//! - `cache_dir` - where snapshots and desktop databases live
//! - `BlobStore` - snapshot persistence
//! - `SettingsStore` - user preferences read at session start
//!
//! When the `desktop-shims` feature is enabled, a `FileBlobStore` rooted at
//! `cache_dir` and a `SqliteSettingsStore` at `cache_dir/settings.db` are
//! injected if not provided.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::CatalogConfig;
//! use std::time::Duration;
//!
//! let config = CatalogConfig::builder()
//!     .cache_dir("/home/me/.cache/media-catalog")
//!     .page_size(100)
//!     .progress_interval(Duration::from_secs(1))
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use bridge_traits::{BlobStore, Clock, SettingsStore, SystemClock};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Files fetched per folder-query page
pub const DEFAULT_PAGE_SIZE: usize = 50;
pub const MAX_PAGE_SIZE: usize = 1000;
/// Minimum wall-clock time between two partial-result reports
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_secs(3);
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

pub const DEFAULT_MUSIC_EXTENSIONS: &[&str] = &[
    "mp3", "flac", "m4a", "aac", "ogg", "opus", "wav", "wma", "aiff", "ape",
];
pub const DEFAULT_VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "mkv", "avi", "mov", "wmv", "m4v", "webm", "mpg", "mpeg", "3gp",
];

/// Configuration for the catalog engine.
///
/// Use [`CatalogConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CatalogConfig {
    /// Directory for snapshots and desktop databases
    pub cache_dir: PathBuf,

    /// Items requested per folder-query page
    pub page_size: usize,

    /// Minimum interval between partial-result progress reports
    pub progress_interval: Duration,

    /// Capacity of the event bus and progress channels
    pub event_buffer_size: usize,

    /// Lowercase extensions (no dot) that belong to the music partition
    pub music_extensions: Vec<String>,

    /// Lowercase extensions (no dot) that belong to the video partition
    pub video_extensions: Vec<String>,

    /// Snapshot persistence (required)
    pub blob_store: Arc<dyn BlobStore>,

    /// User preferences storage (required)
    pub settings_store: Arc<dyn SettingsStore>,

    /// Time source
    pub clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for CatalogConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogConfig")
            .field("cache_dir", &self.cache_dir)
            .field("page_size", &self.page_size)
            .field("progress_interval", &self.progress_interval)
            .field("event_buffer_size", &self.event_buffer_size)
            .field("music_extensions", &self.music_extensions)
            .field("video_extensions", &self.video_extensions)
            .field("blob_store", &"BlobStore { ... }")
            .field("settings_store", &"SettingsStore { ... }")
            .finish()
    }
}

impl CatalogConfig {
    pub fn builder() -> CatalogConfigBuilder {
        CatalogConfigBuilder::default()
    }

    /// Validates the configuration and returns an actionable error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.cache_dir.as_os_str().is_empty() {
            return Err(Error::Config("Cache directory cannot be empty".to_string()));
        }

        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            return Err(Error::Config(format!(
                "Page size must be between 1 and {} (got {})",
                MAX_PAGE_SIZE, self.page_size
            )));
        }

        if self.progress_interval.is_zero() {
            return Err(Error::Config(
                "Progress interval must be greater than zero".to_string(),
            ));
        }

        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than zero".to_string(),
            ));
        }

        if self.music_extensions.is_empty() && self.video_extensions.is_empty() {
            return Err(Error::Config(
                "At least one music or video extension must be configured".to_string(),
            ));
        }

        if let Some(ext) = self
            .music_extensions
            .iter()
            .find(|ext| self.video_extensions.contains(ext))
        {
            return Err(Error::Config(format!(
                "Extension '{}' cannot belong to both music and video",
                ext
            )));
        }

        Ok(())
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn capability_missing(capability: &str, purpose: &str) -> Error {
    Error::CapabilityMissing {
        capability: capability.to_string(),
        message: format!(
            "{} implementation is required for {}. \
             Desktop: enable the 'desktop-shims' feature to use the default adapter. \
             Mobile: inject the platform-native implementation.",
            capability, purpose
        ),
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_blob_store(cache_dir: &Path) -> Result<Arc<dyn BlobStore>> {
    use bridge_desktop::FileBlobStore;

    let store: Arc<dyn BlobStore> = Arc::new(FileBlobStore::new(cache_dir.to_path_buf()));
    Ok(store)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_blob_store(_cache_dir: &Path) -> Result<Arc<dyn BlobStore>> {
    Err(capability_missing("BlobStore", "snapshot persistence"))
}

#[cfg(feature = "desktop-shims")]
fn provide_default_settings_store(cache_dir: &Path) -> Result<Arc<dyn SettingsStore>> {
    use bridge_desktop::SqliteSettingsStore;
    use core_async::runtime::{Handle, Runtime};
    use std::thread;

    let path = cache_dir.join("settings.db");

    let init_store = |path: PathBuf| -> Result<SqliteSettingsStore> {
        let runtime = Runtime::new().map_err(|e| {
            Error::Internal(format!(
                "Failed to create runtime for default settings store: {}",
                e
            ))
        })?;

        runtime
            .block_on(SqliteSettingsStore::new(path))
            .map_err(|e| {
                Error::Internal(format!("Failed to initialize default SettingsStore: {}", e))
            })
    };

    // A runtime cannot be started from inside another one
    let store = match Handle::try_current() {
        Ok(_) => thread::spawn(move || init_store(path))
            .join()
            .map_err(|_| {
                Error::Internal(
                    "Worker thread panicked while creating default SettingsStore".to_string(),
                )
            })??,
        Err(_) => init_store(path)?,
    };

    let store: Arc<dyn SettingsStore> = Arc::new(store);
    Ok(store)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_settings_store(_cache_dir: &Path) -> Result<Arc<dyn SettingsStore>> {
    Err(capability_missing("SettingsStore", "user preferences"))
}

fn normalize_extensions(extensions: Vec<String>) -> Vec<String> {
    let mut normalized: Vec<String> = extensions
        .into_iter()
        .map(|ext| ext.trim().trim_start_matches('.').to_ascii_lowercase())
        .filter(|ext| !ext.is_empty())
        .collect();
    normalized.sort();
    normalized.dedup();
    normalized
}

fn defaults(list: &[&str]) -> Vec<String> {
    list.iter().map(|ext| ext.to_string()).collect()
}

/// Builder for [`CatalogConfig`].
#[derive(Default)]
pub struct CatalogConfigBuilder {
    cache_dir: Option<PathBuf>,
    page_size: Option<usize>,
    progress_interval: Option<Duration>,
    event_buffer_size: Option<usize>,
    music_extensions: Option<Vec<String>>,
    video_extensions: Option<Vec<String>>,
    blob_store: Option<Arc<dyn BlobStore>>,
    settings_store: Option<Arc<dyn SettingsStore>>,
    clock: Option<Arc<dyn Clock>>,
}

impl CatalogConfigBuilder {
    /// Sets the cache directory (required).
    pub fn cache_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.cache_dir = Some(path.into());
        self
    }

    /// Items fetched per folder-query page. Default: 50
    pub fn page_size(mut self, size: usize) -> Self {
        self.page_size = Some(size);
        self
    }

    /// Minimum time between partial-result reports. Default: 3 seconds
    pub fn progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = Some(interval);
        self
    }

    /// Capacity of broadcast channels. Default: 100
    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    /// Replace the music extension list. Leading dots and case are ignored.
    pub fn music_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.music_extensions = Some(extensions.into_iter().map(Into::into).collect());
        self
    }

    /// Replace the video extension list. Leading dots and case are ignored.
    pub fn video_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.video_extensions = Some(extensions.into_iter().map(Into::into).collect());
        self
    }

    pub fn blob_store(mut self, store: Arc<dyn BlobStore>) -> Self {
        self.blob_store = Some(store);
        self
    }

    pub fn settings_store(mut self, store: Arc<dyn SettingsStore>) -> Self {
        self.settings_store = Some(store);
        self
    }

    /// Override the time source (tests). Default: [`SystemClock`]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Builds and validates the configuration.
    ///
    /// # Errors
    ///
    /// - `Error::Config` when `cache_dir` is missing or a value is out of range
    /// - `Error::CapabilityMissing` when a required store is absent and no
    ///   desktop default is available
    pub fn build(self) -> Result<CatalogConfig> {
        let cache_dir = self.cache_dir.ok_or_else(|| {
            Error::Config("Cache directory is required. Use .cache_dir() to set it.".to_string())
        })?;

        let blob_store = match self.blob_store {
            Some(store) => store,
            None => provide_default_blob_store(&cache_dir)?,
        };

        let settings_store = match self.settings_store {
            Some(store) => store,
            None => provide_default_settings_store(&cache_dir)?,
        };

        let config = CatalogConfig {
            cache_dir,
            page_size: self.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
            progress_interval: self.progress_interval.unwrap_or(DEFAULT_PROGRESS_INTERVAL),
            event_buffer_size: self.event_buffer_size.unwrap_or(DEFAULT_EVENT_BUFFER_SIZE),
            music_extensions: normalize_extensions(
                self.music_extensions
                    .unwrap_or_else(|| defaults(DEFAULT_MUSIC_EXTENSIONS)),
            ),
            video_extensions: normalize_extensions(
                self.video_extensions
                    .unwrap_or_else(|| defaults(DEFAULT_VIDEO_EXTENSIONS)),
            ),
            blob_store,
            settings_store,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
        };

        config.validate()?;
        Ok(config)
    }
}
