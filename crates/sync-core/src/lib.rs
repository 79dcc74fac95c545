//! Sync Core - Foundation for the viewer sync runtime
//!
//! Provides the error taxonomy and configuration types shared by the
//! storage backends, the incremental fetcher, and the sync supervisor.

pub mod config;
pub mod error;

pub use config::{
    BlobContainerConfig, BucketStoreConfig, DistributedFsConfig, SharedFsConfig, StorageConfig,
    SupervisorConfig,
};
pub use error::{Error, Result};
