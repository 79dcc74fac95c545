//! In-memory storage backend
//!
//! Implements the full backend contract over an in-process map. Tests use
//! it to script remote listings, control modification timestamps, and
//! inject one-shot download failures without any network.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use sync_core::{Error, Result};

use crate::backend::{ensure_parent_dir, local_files, relative_name, strip_prefix_uri};
use crate::{RemoteObject, StorageBackend};

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    last_modified: DateTime<Utc>,
}

/// In-memory backend with scriptable contents
#[derive(Debug, Default)]
pub struct MemoryBackend {
    identity: String,
    objects: RwLock<BTreeMap<String, StoredObject>>,
    fail_once: RwLock<HashSet<String>>,
    corrupt_restores: AtomicBool,
}

impl MemoryBackend {
    /// Create an empty backend with the given identity
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            objects: RwLock::new(BTreeMap::new()),
            fail_once: RwLock::new(HashSet::new()),
            corrupt_restores: AtomicBool::new(false),
        }
    }

    /// Insert or replace an object with an explicit modification time
    pub fn put_object(
        &self,
        name: impl Into<String>,
        data: impl Into<Bytes>,
        last_modified: DateTime<Utc>,
    ) {
        self.objects.write().insert(
            name.into(),
            StoredObject {
                data: data.into(),
                last_modified,
            },
        );
    }

    /// Remove an object
    pub fn remove_object(&self, name: &str) {
        self.objects.write().remove(name);
    }

    /// Make the next download of `name` fail; later downloads succeed
    pub fn fail_next_download(&self, name: impl Into<String>) {
        self.fail_once.write().insert(name.into());
    }

    /// Make every restore hand back garbage bytes
    pub fn set_corrupt_restores(&self, corrupt: bool) {
        self.corrupt_restores.store(corrupt, Ordering::Relaxed);
    }

    /// Names of all stored objects
    pub fn object_names(&self) -> Vec<String> {
        self.objects.read().keys().cloned().collect()
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    fn identity(&self) -> &str {
        &self.identity
    }

    async fn list(&self, prefix: &str) -> Result<Vec<RemoteObject>> {
        let stripped = strip_prefix_uri(prefix);
        Ok(self
            .objects
            .read()
            .iter()
            .filter(|(name, _)| name.starts_with(stripped))
            .map(|(name, object)| RemoteObject {
                name: name.clone(),
                last_modified: object.last_modified,
            })
            .collect())
    }

    async fn download(&self, name: &str, dest: &Path) -> Result<()> {
        if self.fail_once.write().remove(name) {
            return Err(Error::Storage {
                message: format!("injected download failure for '{}'", name),
            });
        }

        let data = self
            .objects
            .read()
            .get(name)
            .map(|object| object.data.clone())
            .ok_or_else(|| Error::Storage {
                message: format!("no such object '{}'", name),
            })?;

        ensure_parent_dir(dest).await?;
        tokio::fs::write(dest, &data).await?;
        Ok(())
    }

    async fn store(&self, storage_id: &str, src: &Path) -> Result<()> {
        for file in local_files(src).await? {
            let relative = relative_name(src, &file)?;
            let data = tokio::fs::read(&file).await?;
            self.put_object(
                format!("{}/{}", storage_id, relative),
                data,
                Utc::now(),
            );
        }
        Ok(())
    }

    async fn restore(&self, storage_id: &str, dest: &Path) -> Result<()> {
        let root = format!("{}/", storage_id);
        let entries: Vec<(String, Bytes)> = self
            .objects
            .read()
            .iter()
            .filter(|(name, _)| name.starts_with(&root))
            .map(|(name, object)| (name.clone(), object.data.clone()))
            .collect();

        if entries.is_empty() {
            return Err(Error::StorageNotFound {
                storage_id: storage_id.to_string(),
            });
        }

        let corrupt = self.corrupt_restores.load(Ordering::Relaxed);
        for (name, data) in entries {
            let relative = name.strip_prefix(&root).unwrap_or(&name);
            let target = dest.join(relative);
            ensure_parent_dir(&target).await?;
            if corrupt {
                tokio::fs::write(&target, b"corrupted").await?;
            } else {
                tokio::fs::write(&target, &data).await?;
            }
        }
        Ok(())
    }

    async fn delete(&self, storage_id: &str) -> Result<()> {
        let root = format!("{}/", storage_id);
        self.objects.write().retain(|name, _| !name.starts_with(&root));
        Ok(())
    }
}
