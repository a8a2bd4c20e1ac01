//! Filesystem-backed slice store: one file per key under a root directory.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::debug;

use super::{validate_key, SliceStorage};
use crate::error::{Error, Result, ResultExt};

#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    /// Open (and create if needed) a store rooted at `root`.
    pub async fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)
            .await
            .map_err(Error::from)
            .context(format!("failed to create storage dir {}", root.display()))?;
        Ok(Self { root })
    }

    fn path(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }

    /// Write to a temp file then rename, so readers never see a partial blob.
    async fn write_atomic(&self, path: &Path, value: &[u8]) -> Result<()> {
        let tmp = path.with_extension(format!("tmp-{}", uuid::Uuid::new_v4()));
        fs::write(&tmp, value).await?;
        if let Err(e) = fs::rename(&tmp, path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }
}

#[async_trait]
impl SliceStorage for LocalStorage {
    async fn save(&self, key: &str, value: &[u8]) -> Result<()> {
        let path = self.path(key)?;
        if fs::try_exists(&path).await.unwrap_or(false) {
            debug!(key, "blob already stored");
            return Ok(());
        }
        self.write_atomic(&path, value).await
    }

    async fn save_and_update(&self, key: &str, value: &[u8]) -> Result<()> {
        let path = self.path(key)?;
        self.write_atomic(&path, value).await
    }

    async fn load(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.path(key)?;
        fs::read(&path)
            .await
            .map_err(Error::from)
            .context(format!("failed to load {}", key))
    }

    async fn exist(&self, key: &str) -> bool {
        match self.path(key) {
            Ok(path) => fs::try_exists(&path).await.unwrap_or(false),
            Err(_) => false,
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.path(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
