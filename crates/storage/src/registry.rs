//! Backend registry
//!
//! Maps each configuration discriminator to its backend constructor. Both
//! checkpoint management and log mirroring go through this one dispatch
//! point, so a new backend variant registers here exactly once.

use std::sync::Arc;

use sync_core::{Result, StorageConfig};

use crate::{BlobContainer, DistributedFs, SharedFs, StorageBackend};

/// Construct the backend named by a parsed configuration
pub async fn build_backend(config: &StorageConfig) -> Result<Arc<dyn StorageBackend>> {
    match config {
        StorageConfig::BlobContainer(c) => Ok(Arc::new(BlobContainer::from_config(c)?)),
        #[cfg(feature = "bucket-store")]
        StorageConfig::BucketStore(c) => Ok(Arc::new(crate::BucketStore::from_config(c).await?)),
        #[cfg(not(feature = "bucket-store"))]
        StorageConfig::BucketStore(_) => Err(sync_core::Error::InvalidConfig {
            message: "built without bucket-store support".to_string(),
        }),
        StorageConfig::SharedFs(c) => Ok(Arc::new(SharedFs::from_config(c))),
        StorageConfig::DistributedFs(c) => Ok(Arc::new(DistributedFs::from_config(c)?)),
    }
}
