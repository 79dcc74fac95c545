//! Blob-container backend
//!
//! Talks the blob REST protocol directly over HTTP with SAS-token
//! authorization. Listing pages through `marker`/`NextMarker` and parses
//! the XML enumeration body; timestamps arrive in RFC 1123 form.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sync_core::{BlobContainerConfig, Error, Result};
use tracing::{debug, instrument};
use xmlparser::{ElementEnd, Token, Tokenizer};

use crate::backend::{ensure_parent_dir, local_files, relative_name, strip_prefix_uri};
use crate::{RemoteObject, StorageBackend, REST_REQUEST_TIMEOUT};

/// Blob-container backend over the blob REST API
#[derive(Debug, Clone)]
pub struct BlobContainer {
    client: reqwest::Client,
    endpoint: String,
    container: String,
    sas: String,
    prefix: String,
}

impl BlobContainer {
    /// Build from a parsed blob-container configuration
    ///
    /// Accepts either a connection string carrying `BlobEndpoint` and
    /// `SharedAccessSignature`, or `account_url` plus a SAS `credential`.
    /// Neither being well-formed is a configuration error.
    pub fn from_config(config: &BlobContainerConfig) -> Result<Self> {
        let (endpoint, sas) = if let Some(connection_string) = &config.connection_string {
            parse_connection_string(connection_string)?
        } else if let Some(account_url) = &config.account_url {
            (
                account_url.trim_end_matches('/').to_string(),
                config.credential.clone().unwrap_or_default(),
            )
        } else {
            return Err(Error::InvalidConfig {
                message: "blob-container requires one of 'connection_string' or 'account_url'"
                    .to_string(),
            });
        };

        let client = reqwest::Client::builder()
            .timeout(REST_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::Storage {
                message: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            endpoint,
            container: config.container.trim_end_matches('/').to_string(),
            sas: sas.trim_start_matches('?').to_string(),
            prefix: config.prefix.clone().unwrap_or_default(),
        })
    }

    /// Get the full blob name for a path
    fn blob_name(&self, path: &str) -> String {
        if self.prefix.is_empty() {
            path.to_string()
        } else {
            format!("{}/{}", self.prefix.trim_end_matches('/'), path)
        }
    }

    fn object_url(&self, name: &str) -> String {
        let mut url = format!("{}/{}/{}", self.endpoint, self.container, name);
        if !self.sas.is_empty() {
            url.push('?');
            url.push_str(&self.sas);
        }
        url
    }

    fn list_url(&self, prefix: &str, marker: Option<&str>) -> String {
        let mut url = format!(
            "{}/{}?restype=container&comp=list&prefix={}",
            self.endpoint, self.container, prefix
        );
        if let Some(marker) = marker {
            url.push_str("&marker=");
            url.push_str(marker);
        }
        if !self.sas.is_empty() {
            url.push('&');
            url.push_str(&self.sas);
        }
        url
    }
}

/// Parse `Key=Value;...` connection-string pairs into (endpoint, SAS)
fn parse_connection_string(connection_string: &str) -> Result<(String, String)> {
    let mut endpoint = None;
    let mut sas = None;

    for pair in connection_string.split(';').filter(|p| !p.is_empty()) {
        let Some((key, value)) = pair.split_once('=') else {
            continue;
        };
        match key {
            "BlobEndpoint" => endpoint = Some(value.trim_end_matches('/').to_string()),
            "SharedAccessSignature" => sas = Some(value.to_string()),
            _ => {}
        }
    }

    match (endpoint, sas) {
        (Some(endpoint), Some(sas)) => Ok((endpoint, sas)),
        _ => Err(Error::InvalidConfig {
            message: "blob-container connection_string must carry BlobEndpoint and \
                      SharedAccessSignature"
                .to_string(),
        }),
    }
}

/// Parse one page of the XML blob enumeration
fn parse_list_body(body: &str) -> Result<(Vec<RemoteObject>, Option<String>)> {
    let mut objects = Vec::new();
    let mut next_marker = None;
    let mut element: Option<String> = None;
    let mut pending_name: Option<String> = None;

    for token in Tokenizer::from(body) {
        let token = token.map_err(|e| Error::Storage {
            message: format!("blob listing is not valid XML: {}", e),
        })?;

        match token {
            Token::ElementStart { local, .. } => element = Some(local.as_str().to_string()),
            Token::Text { text } => match element.as_deref() {
                Some("Name") => pending_name = Some(text.as_str().to_string()),
                Some("Last-Modified") => {
                    if let Some(name) = pending_name.take() {
                        let last_modified = DateTime::parse_from_rfc2822(text.as_str())
                            .map_err(|e| Error::Storage {
                                message: format!(
                                    "blob listing has unparseable Last-Modified '{}': {}",
                                    text.as_str(),
                                    e
                                ),
                            })?
                            .with_timezone(&Utc);
                        objects.push(RemoteObject {
                            name,
                            last_modified,
                        });
                    }
                }
                Some("NextMarker") => next_marker = Some(text.as_str().to_string()),
                _ => {}
            },
            // The `>` closing a start tag is ElementEnd::Open; the element
            // stays current until its close tag.
            Token::ElementEnd {
                end: ElementEnd::Open,
                ..
            } => {}
            Token::ElementEnd { .. } => element = None,
            _ => {}
        }
    }

    Ok((objects, next_marker))
}

#[async_trait]
impl StorageBackend for BlobContainer {
    fn identity(&self) -> &str {
        &self.container
    }

    #[instrument(skip(self), fields(backend = "blob-container", container = %self.container))]
    async fn list(&self, prefix: &str) -> Result<Vec<RemoteObject>> {
        let blob_prefix = self.blob_name(strip_prefix_uri(prefix));
        debug!(%blob_prefix, "Listing blobs");

        let mut results = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let url = self.list_url(&blob_prefix, marker.as_deref());
            let response = self
                .client
                .get(&url)
                .send()
                .await
                .map_err(|e| Error::Storage {
                    message: format!("blob list request failed: {}", e),
                })?
                .error_for_status()
                .map_err(|e| Error::Storage {
                    message: format!("blob list request failed: {}", e),
                })?;

            let body = response.text().await.map_err(|e| Error::Storage {
                message: format!("failed to read blob listing: {}", e),
            })?;

            let (page, next) = parse_list_body(&body)?;
            results.extend(page);

            match next {
                Some(m) => marker = Some(m),
                None => break,
            }
        }

        debug!(count = results.len(), "Found blobs");
        Ok(results)
    }

    #[instrument(skip(self, dest), fields(backend = "blob-container", container = %self.container))]
    async fn download(&self, name: &str, dest: &Path) -> Result<()> {
        ensure_parent_dir(dest).await?;

        let response = self
            .client
            .get(self.object_url(name))
            .send()
            .await
            .map_err(|e| Error::Storage {
                message: format!("blob download '{}' failed: {}", name, e),
            })?
            .error_for_status()
            .map_err(|e| Error::Storage {
                message: format!("blob download '{}' failed: {}", name, e),
            })?;

        let bytes = response.bytes().await.map_err(|e| Error::Storage {
            message: format!("failed to read blob body '{}': {}", name, e),
        })?;

        tokio::fs::write(dest, &bytes).await?;
        debug!(?dest, "Downloaded blob");
        Ok(())
    }

    #[instrument(skip(self, src), fields(backend = "blob-container", container = %self.container))]
    async fn store(&self, storage_id: &str, src: &Path) -> Result<()> {
        for file in local_files(src).await? {
            let relative = relative_name(src, &file)?;
            let name = self.blob_name(&format!("{}/{}", storage_id, relative));
            let data = tokio::fs::read(&file).await?;

            self.client
                .put(self.object_url(&name))
                .header("x-ms-blob-type", "BlockBlob")
                .body(data)
                .send()
                .await
                .map_err(|e| Error::Storage {
                    message: format!("blob upload '{}' failed: {}", name, e),
                })?
                .error_for_status()
                .map_err(|e| Error::Storage {
                    message: format!("blob upload '{}' failed: {}", name, e),
                })?;

            debug!(%name, "Uploaded blob");
        }
        Ok(())
    }

    #[instrument(skip(self, dest), fields(backend = "blob-container", container = %self.container))]
    async fn restore(&self, storage_id: &str, dest: &Path) -> Result<()> {
        let root = self.blob_name(storage_id);
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

    #[instrument(skip(self), fields(backend = "blob-container", container = %self.container))]
    async fn delete(&self, storage_id: &str) -> Result<()> {
        for object in self.list(&format!("{}/", storage_id)).await? {
            let response = self
                .client
                .delete(self.object_url(&object.name))
                .send()
                .await
                .map_err(|e| Error::Storage {
                    message: format!("blob delete '{}' failed: {}", object.name, e),
                })?;

            // A blob that disappeared between list and delete is already gone.
            if !response.status().is_success()
                && response.status() != reqwest::StatusCode::NOT_FOUND
            {
                return Err(Error::Storage {
                    message: format!(
                        "blob delete '{}' failed with status {}",
                        object.name,
                        response.status()
                    ),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sync_core::BlobContainerConfig;

    const LISTING: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<EnumerationResults ContainerName="logs">
  <Blobs>
    <Blob>
      <Name>run-1/events.out.1</Name>
      <Properties>
        <Last-Modified>Tue, 04 Aug 2026 12:00:00 GMT</Last-Modified>
        <Content-Length>512</Content-Length>
      </Properties>
    </Blob>
    <Blob>
      <Name>run-1/events.out.2</Name>
      <Properties>
        <Last-Modified>Tue, 04 Aug 2026 12:05:00 GMT</Last-Modified>
        <Content-Length>1024</Content-Length>
      </Properties>
    </Blob>
  </Blobs>
  <NextMarker>marker-2</NextMarker>
</EnumerationResults>"#;

    #[test]
    fn test_parse_list_body() {
        let (objects, next) = parse_list_body(LISTING).unwrap();
        assert_eq!(objects.len(), 2);
        assert_eq!(objects[0].name, "run-1/events.out.1");
        assert!(objects[1].last_modified > objects[0].last_modified);
        assert_eq!(next.as_deref(), Some("marker-2"));
    }

    #[test]
    fn test_parse_list_body_empty() {
        let body = r#"<?xml version="1.0"?><EnumerationResults><Blobs/></EnumerationResults>"#;
        let (objects, next) = parse_list_body(body).unwrap();
        assert!(objects.is_empty());
        assert!(next.is_none());
    }

    #[test]
    fn test_parse_connection_string() {
        let (endpoint, sas) = parse_connection_string(
            "BlobEndpoint=https://acct.blob.example.net/;SharedAccessSignature=sv=2024&sig=abc",
        )
        .unwrap();
        assert_eq!(endpoint, "https://acct.blob.example.net");
        assert_eq!(sas, "sv=2024&sig=abc");
    }

    #[test]
    fn test_parse_connection_string_missing_parts() {
        let err = parse_connection_string("AccountName=acct;AccountKey=key").unwrap_err();
        assert!(matches!(err, Error::InvalidConfig { .. }));
    }

    #[test]
    fn test_from_config_requires_auth() {
        let config = BlobContainerConfig {
            container: "logs".to_string(),
            connection_string: None,
            account_url: None,
            credential: None,
            prefix: None,
        };
        let err = BlobContainer::from_config(&config).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig { .. }));
    }

    #[test]
    fn test_object_url_carries_sas() {
        let config = BlobContainerConfig {
            container: "logs".to_string(),
            connection_string: None,
            account_url: Some("https://acct.blob.example.net".to_string()),
            credential: Some("sv=2024&sig=abc".to_string()),
            prefix: None,
        };
        let backend = BlobContainer::from_config(&config).unwrap();
        assert_eq!(
            backend.object_url("run-1/events.out.1"),
            "https://acct.blob.example.net/logs/run-1/events.out.1?sv=2024&sig=abc"
        );
    }
}
