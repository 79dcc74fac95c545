//! Shared-filesystem backend
//!
//! Serves a locally mounted directory (local disk or network share) through
//! the same contract as the remote backends. Modification times come from
//! file metadata.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sync_core::{Error, Result, SharedFsConfig};
use tokio::fs;
use tracing::{debug, instrument};

use crate::backend::{ensure_parent_dir, local_files, relative_name, strip_prefix_uri};
use crate::{RemoteObject, StorageBackend};

/// Shared-filesystem backend rooted at a mounted directory
#[derive(Debug, Clone)]
pub struct SharedFs {
    base_path: PathBuf,
    identity: String,
}

impl SharedFs {
    /// Build from a parsed shared-filesystem configuration
    pub fn from_config(config: &SharedFsConfig) -> Self {
        let identity = config
            .storage_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "shared-fs".to_string());
        Self {
            base_path: config.storage_path.clone(),
            identity,
        }
    }

    fn resolve(&self, name: &str) -> PathBuf {
        self.base_path.join(name)
    }
}

#[async_trait]
impl StorageBackend for SharedFs {
    fn identity(&self) -> &str {
        &self.identity
    }

    #[instrument(skip(self), fields(backend = "shared-fs"))]
    async fn list(&self, prefix: &str) -> Result<Vec<RemoteObject>> {
        let stripped = strip_prefix_uri(prefix);
        debug!(%stripped, "Listing shared filesystem");

        if !self.base_path.is_dir() {
            return Ok(Vec::new());
        }

        let mut results = Vec::new();
        for file in local_files(&self.base_path).await? {
            let name = relative_name(&self.base_path, &file)?;
            if !name.starts_with(stripped) {
                continue;
            }

            let metadata = match fs::metadata(&file).await {
                Ok(m) => m,
                Err(_) => continue,
            };
            let last_modified: DateTime<Utc> = metadata
                .modified()
                .map_err(|e| Error::Storage {
                    message: format!("no modification time for {:?}: {}", file, e),
                })?
                .into();

            results.push(RemoteObject {
                name,
                last_modified,
            });
        }

        debug!(count = results.len(), "Found files");
        Ok(results)
    }

    #[instrument(skip(self, dest), fields(backend = "shared-fs"))]
    async fn download(&self, name: &str, dest: &Path) -> Result<()> {
        ensure_parent_dir(dest).await?;
        fs::copy(self.resolve(name), dest)
            .await
            .map_err(|e| Error::Storage {
                message: format!("failed to copy '{}': {}", name, e),
            })?;
        Ok(())
    }

    #[instrument(skip(self, src), fields(backend = "shared-fs"))]
    async fn store(&self, storage_id: &str, src: &Path) -> Result<()> {
        let target_root = self.resolve(storage_id);
        for file in local_files(src).await? {
            let relative = relative_name(src, &file)?;
            let target = target_root.join(&relative);
            ensure_parent_dir(&target).await?;
            fs::copy(&file, &target).await.map_err(|e| Error::Storage {
                message: format!("failed to store '{}': {}", relative, e),
            })?;
        }
        Ok(())
    }

    #[instrument(skip(self, dest), fields(backend = "shared-fs"))]
    async fn restore(&self, storage_id: &str, dest: &Path) -> Result<()> {
        let source_root = self.resolve(storage_id);
        if !source_root.is_dir() {
            return Err(Error::StorageNotFound {
                storage_id: storage_id.to_string(),
            });
        }

        for file in local_files(&source_root).await? {
            let relative = relative_name(&source_root, &file)?;
            let target = dest.join(&relative);
            ensure_parent_dir(&target).await?;
            fs::copy(&file, &target).await.map_err(|e| Error::Storage {
                message: format!("failed to restore '{}': {}", relative, e),
            })?;
        }
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "shared-fs"))]
    async fn delete(&self, storage_id: &str) -> Result<()> {
        match fs::remove_dir_all(self.resolve(storage_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Storage {
                message: format!("failed to delete '{}': {}", storage_id, e),
            }),
        }
    }
}
