//! Readiness probe for the viewer's scalar-series endpoint

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use sync_core::{Error, Result};
use tracing::debug;

/// Series name mapped to its sample list, as the viewer reports it
pub type ScalarSeries = HashMap<String, Vec<Value>>;

/// Source of the viewer's readiness signal
///
/// Errors returned by `sample` are transient: the supervisor logs them and
/// keeps polling.
#[async_trait]
pub trait MetricsProbe: Send + Sync {
    /// Fetch the current series map
    async fn sample(&self) -> Result<ScalarSeries>;
}

/// HTTP probe against the viewer's scalar-tags endpoint
pub struct HttpMetricsProbe {
    client: reqwest::Client,
    url: String,
}

impl HttpMetricsProbe {
    /// Create a probe with a bounded per-request timeout
    pub fn new(url: impl Into<String>, request_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| Error::Http {
                message: format!("failed to build HTTP client: {}", e),
            })?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl MetricsProbe for HttpMetricsProbe {
    async fn sample(&self) -> Result<ScalarSeries> {
        debug!(url = %self.url, "Querying metrics endpoint");

        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| Error::Http {
                message: format!("metrics request failed: {}", e),
            })?
            .error_for_status()
            .map_err(|e| Error::Http {
                message: format!("metrics request failed: {}", e),
            })?;

        response.json().await.map_err(|e| Error::Http {
            message: format!("malformed metrics response: {}", e),
        })
    }
}

/// True when at least one series carries at least one sample
pub fn has_samples(series: &ScalarSeries) -> bool {
    series.values().any(|samples| !samples.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn series(value: Value) -> ScalarSeries {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_empty_map_has_no_samples() {
        assert!(!has_samples(&ScalarSeries::new()));
    }

    #[test]
    fn test_empty_series_has_no_samples() {
        assert!(!has_samples(&series(json!({"loss": []}))));
    }

    #[test]
    fn test_any_sample_counts() {
        assert!(has_samples(&series(json!({
            "loss": [],
            "accuracy": [{"step": 1, "value": 0.5}],
        }))));
    }
}
