//! Incremental fetch cycles

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use storage::{build_backend, StorageBackend};
use sync_core::{Result, StorageConfig};
use tracing::{debug, info, instrument};

use crate::FetchState;

/// Outcome of one fetch cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FetchReport {
    /// Objects downloaded this cycle
    pub downloaded: usize,
    /// Listed objects skipped as unchanged
    pub skipped: usize,
}

/// Mirrors remote prefixes into a local directory, one delta per cycle
///
/// Objects land at `{local_root}/{backend identity}/{object name}`. State
/// is recorded per object only after its download succeeds, so a failed
/// download is retried on the next cycle instead of being marked current.
pub struct Fetcher {
    backend: Arc<dyn StorageBackend>,
    paths: Vec<String>,
    local_root: PathBuf,
    state: FetchState,
}

impl std::fmt::Debug for Fetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fetcher")
            .field("paths", &self.paths)
            .field("local_root", &self.local_root)
            .finish_non_exhaustive()
    }
}

impl Fetcher {
    /// Build a fetcher from a raw storage configuration mapping
    pub async fn build(
        value: &Value,
        paths: Vec<String>,
        local_root: impl Into<PathBuf>,
    ) -> Result<Self> {
        let config = StorageConfig::from_value(value)?;
        let backend = build_backend(&config).await?;
        info!(kind = config.kind(), "Built fetcher");
        Ok(Self::with_backend(backend, paths, local_root))
    }

    /// Wrap an already-constructed backend
    pub fn with_backend(
        backend: Arc<dyn StorageBackend>,
        paths: Vec<String>,
        local_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            backend,
            paths,
            local_root: local_root.into(),
            state: FetchState::new(),
        }
    }

    /// The mirror directory this fetcher writes into
    pub fn mirror_root(&self) -> PathBuf {
        self.local_root.join(self.backend.identity())
    }

    /// Run one fetch cycle over every watch prefix
    #[instrument(skip(self))]
    pub async fn fetch_new(&mut self) -> Result<FetchReport> {
        // Names seen under several prefixes collapse to one entry; the
        // last-listed timestamp wins.
        let mut pending: BTreeMap<String, DateTime<Utc>> = BTreeMap::new();
        let mut skipped = 0;

        for path in &self.paths {
            debug!(%path, "Listing watch prefix");
            for object in self.backend.list(path).await? {
                if self.state.is_new(&object.name, object.last_modified) {
                    pending.insert(object.name, object.last_modified);
                } else {
                    skipped += 1;
                }
            }
        }

        let mirror_root = self.mirror_root();
        let mut downloaded = 0;

        for (name, last_modified) in pending {
            let dest = mirror_root.join(&name);
            self.backend.download(&name, &dest).await?;
            self.state.record(&name, last_modified);
            downloaded += 1;
            debug!(%name, ?dest, "Downloaded object");
        }

        if downloaded > 0 {
            info!(downloaded, skipped, "Fetch cycle complete");
        }
        Ok(FetchReport {
            downloaded,
            skipped,
        })
    }
}
