//! Blob storage on the local filesystem

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    storage::BlobStore,
};
use bytes::Bytes;
use std::io::ErrorKind;
use std::path::PathBuf;
use tokio::fs;
use tracing::debug;

/// One file per blob under a root directory.
///
/// `save` writes `<name>.tmp` and renames it over `<name>`, so a crash
/// mid-write leaves the previous blob intact.
pub struct FileBlobStore {
    root: PathBuf,
}

impl FileBlobStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Store under the platform cache directory (`~/.cache/media-catalog` on Linux).
    pub fn default_location() -> Self {
        let root = dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("media-catalog");
        Self::new(root)
    }

    pub fn root(&self) -> &PathBuf {
        &self.root
    }

    fn path_for(&self, name: &str) -> Result<PathBuf> {
        if name.is_empty() || name.contains(&['/', '\\'][..]) || name == "." || name == ".." {
            return Err(BridgeError::OperationFailed(format!(
                "Invalid blob name: {:?}",
                name
            )));
        }
        Ok(self.root.join(name))
    }
}

#[async_trait]
impl BlobStore for FileBlobStore {
    async fn load(&self, name: &str) -> Result<Option<Bytes>> {
        let path = self.path_for(name)?;
        match fs::read(&path).await {
            Ok(data) => {
                debug!(blob = name, size = data.len(), "Loaded blob");
                Ok(Some(Bytes::from(data)))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(BridgeError::Io(e)),
        }
    }

    async fn save(&self, name: &str, data: Bytes) -> Result<()> {
        let path = self.path_for(name)?;
        fs::create_dir_all(&self.root).await?;

        let tmp = self.root.join(format!("{}.tmp", name));
        fs::write(&tmp, &data).await?;
        if let Err(e) = fs::rename(&tmp, &path).await {
            fs::remove_file(&tmp).await.ok();
            return Err(BridgeError::Io(e));
        }

        debug!(blob = name, size = data.len(), "Saved blob");
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<()> {
        let path = self.path_for(name)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(BridgeError::Io(e)),
        }
    }
}
