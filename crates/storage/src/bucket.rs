//! Bucket-store backend
//!
//! S3 and S3-compatible bucket storage with internal list pagination and
//! custom endpoint support for interop gateways.

use std::path::Path;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::{
    config::{timeout::TimeoutConfig, Builder as S3ConfigBuilder, Credentials},
    primitives::ByteStream,
    Client,
};
use chrono::{DateTime, Utc};
use sync_core::{BucketStoreConfig, Error, Result};
use tracing::{debug, instrument};

use crate::backend::{ensure_parent_dir, local_files, relative_name, strip_prefix_uri};
use crate::{CredentialSource, RemoteObject, StorageBackend};

/// Bucket-store backend over an S3-compatible API
#[derive(Debug, Clone)]
pub struct BucketStore {
    client: Client,
    bucket: String,
    prefix: String,
}

impl BucketStore {
    /// Build from a parsed bucket-store configuration
    ///
    /// Credentials fall back to the ambient environment chain when the
    /// configuration carries no static keys.
    pub async fn from_config(config: &BucketStoreConfig) -> Result<Self> {
        let source =
            CredentialSource::from_config(config.access_key.as_deref(), config.secret_key.as_deref())?;

        let aws_config = aws_config::defaults(BehaviorVersion::latest()).load().await;
        let mut builder = S3ConfigBuilder::from(&aws_config).timeout_config(
            TimeoutConfig::builder()
                .operation_timeout(crate::REST_REQUEST_TIMEOUT)
                .build(),
        );

        if let Some(endpoint) = &config.endpoint_url {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        if let CredentialSource::Static {
            access_key,
            secret_key,
        } = source
        {
            builder = builder.credentials_provider(Credentials::new(
                access_key,
                secret_key,
                None,
                None,
                "storage-config",
            ));
        }

        Ok(Self {
            client: Client::from_conf(builder.build()),
            bucket: config.bucket.clone(),
            prefix: config.prefix.clone().unwrap_or_default(),
        })
    }

    /// Get the full object key for a path
    fn object_key(&self, path: &str) -> String {
        if self.prefix.is_empty() {
            path.to_string()
        } else {
            format!("{}/{}", self.prefix.trim_end_matches('/'), path)
        }
    }
}

#[async_trait]
impl StorageBackend for BucketStore {
    fn identity(&self) -> &str {
        &self.bucket
    }

    #[instrument(skip(self), fields(backend = "bucket-store", bucket = %self.bucket))]
    async fn list(&self, prefix: &str) -> Result<Vec<RemoteObject>> {
        let key_prefix = self.object_key(strip_prefix_uri(prefix));
        debug!(%key_prefix, "Listing bucket objects");

        let mut results = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(&key_prefix);

            if let Some(token) = continuation_token.take() {
                request = request.continuation_token(token);
            }

            let response = request.send().await.map_err(|e| Error::Storage {
                message: format!("bucket list_objects failed: {}", e),
            })?;

            for object in response.contents() {
                let (Some(key), Some(modified)) = (object.key(), object.last_modified()) else {
                    continue;
                };
                let last_modified: DateTime<Utc> =
                    DateTime::from_timestamp(modified.secs(), modified.subsec_nanos())
                        .unwrap_or_default();
                results.push(RemoteObject {
                    name: key.to_string(),
                    last_modified,
                });
            }

            if response.is_truncated() == Some(true) {
                continuation_token = response.next_continuation_token().map(String::from);
            } else {
                break;
            }
        }

        debug!(count = results.len(), "Found bucket objects");
        Ok(results)
    }

    #[instrument(skip(self, dest), fields(backend = "bucket-store", bucket = %self.bucket))]
    async fn download(&self, name: &str, dest: &Path) -> Result<()> {
        ensure_parent_dir(dest).await?;

        let result = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(name)
            .send()
            .await
            .map_err(|e| Error::Storage {
                message: format!("bucket get_object '{}' failed: {}", name, e),
            })?;

        let body = result.body.collect().await.map_err(|e| Error::Storage {
            message: format!("failed to read bucket response body: {}", e),
        })?;

        tokio::fs::write(dest, body.into_bytes()).await?;
        debug!(?dest, "Downloaded object");
        Ok(())
    }

    #[instrument(skip(self, src), fields(backend = "bucket-store", bucket = %self.bucket))]
    async fn store(&self, storage_id: &str, src: &Path) -> Result<()> {
        for file in local_files(src).await? {
            let relative = relative_name(src, &file)?;
            let key = self.object_key(&format!("{}/{}", storage_id, relative));
            let data = tokio::fs::read(&file).await?;

            self.client
                .put_object()
                .bucket(&self.bucket)
                .key(&key)
                .body(ByteStream::from(data))
                .send()
                .await
                .map_err(|e| Error::Storage {
                    message: format!("bucket put_object '{}' failed: {}", key, e),
                })?;

            debug!(%key, "Uploaded object");
        }
        Ok(())
    }

    #[instrument(skip(self, dest), fields(backend = "bucket-store", bucket = %self.bucket))]
    async fn restore(&self, storage_id: &str, dest: &Path) -> Result<()> {
        let root = self.object_key(storage_id);
        let objects = self.list(&format!("{}/", storage_id)).await?;

        if objects.is_empty() {
            return Err(Error::StorageNotFound {
                storage_id: storage_id.to_string(),
            });
        }

        for object in objects {
            let relative = object
                .name
                .strip_prefix(&root)
                .unwrap_or(&object.name)
                .trim_start_matches('/');
            self.download(&object.name, &dest.join(relative)).await?;
        }
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "bucket-store", bucket = %self.bucket))]
    async fn delete(&self, storage_id: &str) -> Result<()> {
        for object in self.list(&format!("{}/", storage_id)).await? {
            self.client
                .delete_object()
                .bucket(&self.bucket)
                .key(&object.name)
                .send()
                .await
                .map_err(|e| Error::Storage {
                    message: format!("bucket delete_object '{}' failed: {}", object.name, e),
                })?;
        }
        Ok(())
    }
}
