//! Distributed-filesystem backend
//!
//! Speaks the WebHDFS REST protocol: `LISTSTATUS` for listing (with a
//! recursive directory walk), `OPEN` for reads, `CREATE` for writes, and
//! `DELETE` with `recursive=true` for removal. All responses are JSON.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use sync_core::{DistributedFsConfig, Error, Result};
use tracing::{debug, instrument};

use crate::backend::{ensure_parent_dir, local_files, relative_name, strip_prefix_uri};
use crate::{RemoteObject, StorageBackend, REST_REQUEST_TIMEOUT};

#[derive(Debug, Deserialize)]
struct ListStatusResponse {
    #[serde(rename = "FileStatuses")]
    file_statuses: FileStatuses,
}

#[derive(Debug, Deserialize)]
struct FileStatuses {
    #[serde(rename = "FileStatus")]
    file_status: Vec<FileStatus>,
}

#[derive(Debug, Deserialize)]
struct FileStatus {
    #[serde(rename = "pathSuffix")]
    path_suffix: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(rename = "modificationTime")]
    modification_time: i64,
}

/// Distributed-filesystem backend over WebHDFS
#[derive(Debug, Clone)]
pub struct DistributedFs {
    client: reqwest::Client,
    namenode_url: String,
    user: Option<String>,
    base_path: String,
    identity: String,
}

impl DistributedFs {
    /// Build from a parsed distributed-filesystem configuration
    pub fn from_config(config: &DistributedFsConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REST_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::Storage {
                message: format!("failed to build HTTP client: {}", e),
            })?;

        let base_path = config
            .base_path
            .clone()
            .unwrap_or_else(|| "/".to_string());
        let identity = base_path
            .trim_matches('/')
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
            .unwrap_or("dfs")
            .to_string();

        Ok(Self {
            client,
            namenode_url: config.namenode_url.trim_end_matches('/').to_string(),
            user: config.user.clone(),
            base_path,
            identity,
        })
    }

    /// Absolute remote path for an object name
    fn absolute(&self, name: &str) -> String {
        let name = name.trim_start_matches('/');
        if name.is_empty() {
            if self.base_path.is_empty() {
                "/".to_string()
            } else {
                self.base_path.clone()
            }
        } else {
            format!("{}/{}", self.base_path.trim_end_matches('/'), name)
        }
    }

    fn op_url(&self, path: &str, op: &str) -> String {
        let mut url = format!("{}/webhdfs/v1{}?op={}", self.namenode_url, path, op);
        if let Some(user) = &self.user {
            url.push_str("&user.name=");
            url.push_str(user);
        }
        url
    }
}

#[async_trait]
impl StorageBackend for DistributedFs {
    fn identity(&self) -> &str {
        &self.identity
    }

    #[instrument(skip(self), fields(backend = "distributed-fs"))]
    async fn list(&self, prefix: &str) -> Result<Vec<RemoteObject>> {
        let stripped = strip_prefix_uri(prefix).trim_matches('/').to_string();
        debug!(prefix = %stripped, "Listing distributed filesystem");

        let mut results = Vec::new();
        let mut stack = vec![stripped];

        while let Some(dir) = stack.pop() {
            let url = self.op_url(&self.absolute(&dir), "LISTSTATUS");
            let response = self
                .client
                .get(&url)
                .send()
                .await
                .map_err(|e| Error::Storage {
                    message: format!("liststatus request failed: {}", e),
                })?;

            // A watch prefix that does not exist yet lists as empty.
            if response.status() == reqwest::StatusCode::NOT_FOUND {
                continue;
            }

            let listing: ListStatusResponse = response
                .error_for_status()
                .map_err(|e| Error::Storage {
                    message: format!("liststatus request failed: {}", e),
                })?
                .json()
                .await
                .map_err(|e| Error::Storage {
                    message: format!("malformed liststatus response: {}", e),
                })?;

            for status in listing.file_statuses.file_status {
                let name = if dir.is_empty() {
                    status.path_suffix
                } else {
                    format!("{}/{}", dir, status.path_suffix)
                };

                if status.kind == "DIRECTORY" {
                    stack.push(name);
                } else {
                    let last_modified: DateTime<Utc> =
                        DateTime::from_timestamp_millis(status.modification_time)
                            .unwrap_or_default();
                    results.push(RemoteObject {
                        name,
                        last_modified,
                    });
                }
            }
        }

        debug!(count = results.len(), "Found files");
        Ok(results)
    }

    #[instrument(skip(self, dest), fields(backend = "distributed-fs"))]
    async fn download(&self, name: &str, dest: &Path) -> Result<()> {
        ensure_parent_dir(dest).await?;

        let url = self.op_url(&self.absolute(name), "OPEN");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Storage {
                message: format!("open '{}' failed: {}", name, e),
            })?
            .error_for_status()
            .map_err(|e| Error::Storage {
                message: format!("open '{}' failed: {}", name, e),
            })?;

        let bytes = response.bytes().await.map_err(|e| Error::Storage {
            message: format!("failed to read '{}': {}", name, e),
        })?;

        tokio::fs::write(dest, &bytes).await?;
        debug!(?dest, "Downloaded file");
        Ok(())
    }

    #[instrument(skip(self, src), fields(backend = "distributed-fs"))]
    async fn store(&self, storage_id: &str, src: &Path) -> Result<()> {
        for file in local_files(src).await? {
            let relative = relative_name(src, &file)?;
            let remote = format!("{}/{}", storage_id, relative);
            let url = format!(
                "{}&overwrite=true",
                self.op_url(&self.absolute(&remote), "CREATE")
            );
            let data = tokio::fs::read(&file).await?;

            self.client
                .put(&url)
                .body(data)
                .send()
                .await
                .map_err(|e| Error::Storage {
                    message: format!("create '{}' failed: {}", remote, e),
                })?
                .error_for_status()
                .map_err(|e| Error::Storage {
                    message: format!("create '{}' failed: {}", remote, e),
                })?;

            debug!(%remote, "Uploaded file");
        }
        Ok(())
    }

    #[instrument(skip(self, dest), fields(backend = "distributed-fs"))]
    async fn restore(&self, storage_id: &str, dest: &Path) -> Result<()> {
        let objects = self.list(storage_id).await?;
        if objects.is_empty() {
            return Err(Error::StorageNotFound {
                storage_id: storage_id.to_string(),
            });
        }

        let root = format!("{}/", storage_id);
        for object in objects {
            let relative = object.name.strip_prefix(&root).unwrap_or(&object.name);
            self.download(&object.name, &dest.join(relative)).await?;
        }
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "distributed-fs"))]
    async fn delete(&self, storage_id: &str) -> Result<()> {
        let url = format!(
            "{}&recursive=true",
            self.op_url(&self.absolute(storage_id), "DELETE")
        );

        // The response boolean is false when the path was already gone,
        // which still counts as deleted.
        self.client
            .delete(&url)
            .send()
            .await
            .map_err(|e| Error::Storage {
                message: format!("delete '{}' failed: {}", storage_id, e),
            })?
            .error_for_status()
            .map_err(|e| Error::Storage {
                message: format!("delete '{}' failed: {}", storage_id, e),
            })?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(base_path: Option<&str>) -> DistributedFs {
        DistributedFs::from_config(&DistributedFsConfig {
            namenode_url: "http://namenode:9870".to_string(),
            user: Some("mirror".to_string()),
            base_path: base_path.map(String::from),
        })
        .unwrap()
    }

    #[test]
    fn test_absolute_joins_base_path() {
        let dfs = backend(Some("/experiments"));
        assert_eq!(dfs.absolute("run-1/events.1"), "/experiments/run-1/events.1");
        assert_eq!(dfs.absolute(""), "/experiments");
    }

    #[test]
    fn test_absolute_with_root_base() {
        let dfs = backend(None);
        assert_eq!(dfs.absolute("run-1/events.1"), "/run-1/events.1");
    }

    #[test]
    fn test_op_url_carries_user() {
        let dfs = backend(Some("/experiments"));
        assert_eq!(
            dfs.op_url("/experiments/run-1", "LISTSTATUS"),
            "http://namenode:9870/webhdfs/v1/experiments/run-1?op=LISTSTATUS&user.name=mirror"
        );
    }

    #[test]
    fn test_identity_from_base_path() {
        assert_eq!(backend(Some("/data/experiments")).identity(), "experiments");
        assert_eq!(backend(None).identity(), "dfs");
    }

    #[test]
    fn test_liststatus_response_parses() {
        let body = r#"{"FileStatuses":{"FileStatus":[
            {"pathSuffix":"events.1","type":"FILE","modificationTime":1722772800000,"length":512},
            {"pathSuffix":"nested","type":"DIRECTORY","modificationTime":1722772800000}
        ]}}"#;
        let parsed: ListStatusResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.file_statuses.file_status.len(), 2);
        assert_eq!(parsed.file_statuses.file_status[0].kind, "FILE");
    }
}
