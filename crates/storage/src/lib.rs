//! Storage - Pluggable remote storage backends
//!
//! Provides one async contract over heterogeneous remote systems:
//! - Bucket stores (S3 and S3-compatible endpoints, `bucket-store` feature)
//! - Blob containers (SAS-authorized REST)
//! - Shared filesystems (local or network-mounted directories)
//! - Distributed filesystems (WebHDFS)
//!
//! The [`StorageManager`] layers scoped checkpoint store/restore semantics
//! and a round-trip [`validate`] self-test on top of any backend.
//!
//! # Example
//!
//! ```no_run
//! use storage::{SharedFs, StorageBackend};
//! use sync_core::SharedFsConfig;
//!
//! # async fn example() -> sync_core::Result<()> {
//! let backend = SharedFs::from_config(&SharedFsConfig {
//!     storage_path: "/mnt/experiments".into(),
//! });
//! let objects = backend.list("run-7/").await?;
//! # Ok(())
//! # }
//! ```

mod backend;
mod blob;
#[cfg(feature = "bucket-store")]
mod bucket;
mod credentials;
mod dfs;
mod manager;
mod memory;
mod registry;
mod shared;

pub use backend::{strip_prefix_uri, RemoteObject, StorageBackend};
pub use blob::BlobContainer;
#[cfg(feature = "bucket-store")]
pub use bucket::BucketStore;
pub use credentials::CredentialSource;
pub use dfs::DistributedFs;
pub use manager::{validate, RestoreGuard, StorageManager, StoreGuard};
pub use memory::MemoryBackend;
pub use registry::build_backend;
pub use shared::SharedFs;

/// Bound on any single REST request made by a backend
pub(crate) const REST_REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);
