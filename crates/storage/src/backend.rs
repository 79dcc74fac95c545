//! Storage backend trait definition
//!
//! Defines the async capability set that all storage backends implement:
//! listing objects under a prefix, downloading single objects, and the
//! directory-shaped store/restore/delete operations used for checkpoints.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sync_core::{Error, Result};
use tokio::fs;

/// A remote object visible under a watch prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteObject {
    /// Object name relative to the backend root
    pub name: String,
    /// Remote modification timestamp
    pub last_modified: DateTime<Utc>,
}

/// Async contract every storage backend satisfies
///
/// `list` and `download` serve the incremental fetcher; `store`, `restore`
/// and `delete` serve checkpoint persistence. All operations treat object
/// names as `/`-separated paths relative to the backend root.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Stable identity used as the mirror-directory component
    /// (bucket, container, or filesystem root name)
    fn identity(&self) -> &str;

    /// List objects under a prefix
    ///
    /// Pagination is handled internally; the full logical listing is
    /// returned. An empty listing is a normal outcome, not an error. The
    /// prefix may be a fully-qualified URI; scheme and host are stripped.
    async fn list(&self, prefix: &str) -> Result<Vec<RemoteObject>>;

    /// Download one object to a local destination file
    ///
    /// Intermediate directories are created as needed.
    async fn download(&self, name: &str, dest: &Path) -> Result<()>;

    /// Upload every file under `src` to `{storage_id}/{relative path}`
    async fn store(&self, storage_id: &str, src: &Path) -> Result<()>;

    /// Download everything under `{storage_id}/` into `dest`
    ///
    /// Fails with [`Error::StorageNotFound`] if nothing exists under the id.
    async fn restore(&self, storage_id: &str, dest: &Path) -> Result<()>;

    /// Remove everything under `{storage_id}/`
    ///
    /// Deleting an id that does not exist succeeds.
    async fn delete(&self, storage_id: &str) -> Result<()>;
}

/// Strip scheme, host, and leading separators from a prefix.
///
/// Callers may name the same remote location as a full URI
/// (`scheme://host/run/events`) or a bare path (`run/events`); both
/// spellings list identically.
pub fn strip_prefix_uri(prefix: &str) -> &str {
    let rest = match prefix.find("://") {
        Some(idx) => {
            let after = &prefix[idx + 3..];
            match after.find('/') {
                Some(slash) => &after[slash..],
                None => "",
            }
        }
        None => prefix,
    };
    rest.trim_start_matches('/')
}

/// Create the parent directory of a destination file
pub(crate) async fn ensure_parent_dir(dest: &Path) -> Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).await.map_err(|e| Error::Storage {
            message: format!("failed to create directory {:?}: {}", parent, e),
        })?;
    }
    Ok(())
}

/// Collect every file under a local directory tree
pub(crate) async fn local_files(root: &Path) -> Result<Vec<PathBuf>> {
    let mut results = Vec::new();
    let mut stack = vec![root.to_path_buf()];

    while let Some(dir) = stack.pop() {
        let mut entries = fs::read_dir(&dir).await.map_err(|e| Error::Storage {
            message: format!("failed to read directory {:?}: {}", dir, e),
        })?;

        while let Ok(Some(entry)) = entries.next_entry().await {
            let entry_path = entry.path();
            let metadata = match entry.metadata().await {
                Ok(m) => m,
                Err(_) => continue,
            };

            if metadata.is_dir() {
                stack.push(entry_path);
            } else if metadata.is_file() {
                results.push(entry_path);
            }
        }
    }

    results.sort();
    Ok(results)
}

/// Relative path of `file` under `root`, `/`-separated
pub(crate) fn relative_name(root: &Path, file: &Path) -> Result<String> {
    let relative = file.strip_prefix(root).map_err(|_| Error::Storage {
        message: format!("{:?} is not under {:?}", file, root),
    })?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Ok(parts.join("/"))
}
