//! Configuration types for storage backends and the sync supervisor

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Error, Result};

/// Keys consumed by retention policy handling, never by backends.
const MANAGER_ONLY_KEYS: &[&str] = &[
    "save_experiment_best",
    "save_trial_best",
    "save_trial_latest",
];

/// Legacy aliases folded into `storage_path` for shared filesystems.
const SHARED_FS_PATH_ALIASES: &[&str] = &["events_path", "checkpoint_path"];

/// Blob-container backend configuration
///
/// Authorization is either a connection string carrying `BlobEndpoint` and
/// `SharedAccessSignature`, or an account URL plus a SAS credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobContainerConfig {
    /// Container name
    pub container: String,

    /// Connection string (`Key=Value;...` pairs)
    #[serde(default)]
    pub connection_string: Option<String>,

    /// Account endpoint URL, e.g. `https://acct.blob.example.net`
    #[serde(default)]
    pub account_url: Option<String>,

    /// SAS token used with `account_url`
    #[serde(default)]
    pub credential: Option<String>,

    /// Optional key prefix applied to stored artifacts
    #[serde(default)]
    pub prefix: Option<String>,
}

/// Bucket-store backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BucketStoreConfig {
    /// Bucket name
    pub bucket: String,

    /// Custom endpoint URL (S3-compatible services)
    #[serde(default)]
    pub endpoint_url: Option<String>,

    /// Static access key; ambient environment credentials when absent
    #[serde(default)]
    pub access_key: Option<String>,

    /// Static secret key; ambient environment credentials when absent
    #[serde(default)]
    pub secret_key: Option<String>,

    /// Optional key prefix applied to stored artifacts
    #[serde(default)]
    pub prefix: Option<String>,
}

/// Shared-filesystem backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedFsConfig {
    /// Root directory of the shared filesystem
    pub storage_path: PathBuf,
}

/// Distributed-filesystem backend configuration (WebHDFS)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistributedFsConfig {
    /// Namenode HTTP endpoint, e.g. `http://namenode:9870`
    pub namenode_url: String,

    /// Remote username appended to requests
    #[serde(default)]
    pub user: Option<String>,

    /// Base path under which artifacts live
    #[serde(default)]
    pub base_path: Option<String>,
}

/// Parsed storage configuration, discriminated by the `type` key
#[derive(Debug, Clone)]
pub enum StorageConfig {
    BlobContainer(BlobContainerConfig),
    BucketStore(BucketStoreConfig),
    SharedFs(SharedFsConfig),
    DistributedFs(DistributedFsConfig),
}

impl StorageConfig {
    /// Parse a storage configuration from a JSON mapping.
    ///
    /// The `type` key selects the backend variant. Retention-policy keys are
    /// stripped before the backend config is deserialized, so their presence
    /// never fails construction. Unknown discriminators and missing required
    /// fields are configuration errors raised before any network activity.
    pub fn from_value(value: &Value) -> Result<Self> {
        let map = value.as_object().ok_or_else(|| Error::InvalidConfig {
            message: "storage configuration must be a mapping".to_string(),
        })?;

        let kind = map
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::InvalidConfig {
                message: "storage configuration is missing the 'type' key".to_string(),
            })?
            .to_string();

        let mut map = map.clone();
        map.remove("type");
        for key in MANAGER_ONLY_KEYS {
            map.remove(*key);
        }

        match kind.as_str() {
            "blob-container" => {
                let config: BlobContainerConfig = deserialize_backend(&kind, map)?;
                if config.connection_string.is_none() && config.account_url.is_none() {
                    return Err(Error::InvalidConfig {
                        message: "blob-container requires one of 'connection_string' or \
                                  'account_url'"
                            .to_string(),
                    });
                }
                Ok(StorageConfig::BlobContainer(config))
            }
            "bucket-store" => Ok(StorageConfig::BucketStore(deserialize_backend(&kind, map)?)),
            "shared-fs" => {
                // Fold legacy path aliases into storage_path.
                if !map.contains_key("storage_path") {
                    for alias in SHARED_FS_PATH_ALIASES {
                        if let Some(path) = map.remove(*alias) {
                            map.insert("storage_path".to_string(), path);
                            break;
                        }
                    }
                }
                for alias in SHARED_FS_PATH_ALIASES {
                    map.remove(*alias);
                }
                Ok(StorageConfig::SharedFs(deserialize_backend(&kind, map)?))
            }
            "distributed-fs" => Ok(StorageConfig::DistributedFs(deserialize_backend(
                &kind, map,
            )?)),
            other => Err(Error::InvalidConfig {
                message: format!("unknown storage type '{}'", other),
            }),
        }
    }

    /// The discriminator this configuration was parsed from
    pub fn kind(&self) -> &'static str {
        match self {
            StorageConfig::BlobContainer(_) => "blob-container",
            StorageConfig::BucketStore(_) => "bucket-store",
            StorageConfig::SharedFs(_) => "shared-fs",
            StorageConfig::DistributedFs(_) => "distributed-fs",
        }
    }
}

fn deserialize_backend<T: serde::de::DeserializeOwned>(
    kind: &str,
    map: serde_json::Map<String, Value>,
) -> Result<T> {
    serde_json::from_value(Value::Object(map)).map_err(|e| Error::InvalidConfig {
        message: format!("{}: {}", kind, e),
    })
}

/// Sync supervisor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// Interval between poll cycles
    #[serde(with = "duration_ms")]
    pub poll_interval: Duration,

    /// Maximum time to wait for the viewer to become ready
    #[serde(with = "duration_ms")]
    pub max_wait: Duration,

    /// Bound on any single readiness request
    #[serde(with = "duration_ms")]
    pub request_timeout: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            max_wait: Duration::from_secs(600),
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Duration serialization helper (integer milliseconds)
mod duration_ms {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
