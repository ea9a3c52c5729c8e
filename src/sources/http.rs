//! HTTP-backed readers.
//!
//! Both readers share one `reqwest::Client` per instance, built with the
//! configured request timeout. Responses are decoded leniently: missing
//! optional fields take defaults, but a body without the primary value is
//! reported as [`SourceError::Missing`].
//!
//! Addresses are percent-encoded as a single path segment, so a `?`, `#`
//! or `/` inside one can never redirect the request to another resource.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use super::{OracleReader, OracleReading, YieldSource};
use crate::config::DataSourceConfig;
use crate::error::SourceError;

/// Confidence assumed when an oracle response omits it.
const DEFAULT_CONFIDENCE: f64 = 0.95;

fn build_client(timeout: Duration) -> Result<reqwest::Client, SourceError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| SourceError::Request {
            target: "http client".to_string(),
            message: e.to_string(),
        })
}

async fn get_json<T: serde::de::DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
) -> Result<T, SourceError> {
    tracing::debug!(url = %url, "reading data source");
    let response = client.get(url).send().await.map_err(|e| SourceError::Request {
        target: url.to_string(),
        message: e.to_string(),
    })?;

    if !response.status().is_success() {
        return Err(SourceError::Status {
            target: url.to_string(),
            status: response.status().as_u16(),
        });
    }

    response.json().await.map_err(|e| SourceError::Decode {
        target: url.to_string(),
        message: e.to_string(),
    })
}

#[derive(Debug, Deserialize)]
struct ApyResponse {
    #[serde(default)]
    apy: Option<f64>,
}

/// [`YieldSource`] reading `{base}/protocol/{strategy}`.
///
/// The protocol endpoint is chain-agnostic, so every chain of a strategy
/// receives the same rate.
#[derive(Debug, Clone)]
pub struct HttpYieldSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpYieldSource {
    /// Reader configured from `[orchestrator.data_sources]`.
    pub fn new(config: &DataSourceConfig) -> Result<Self, SourceError> {
        Ok(Self {
            client: build_client(config.request_timeout())?,
            base_url: config.apy_base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Reader sharing an existing client.
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl YieldSource for HttpYieldSource {
    async fn fetch_apy(&self, strategy: &str, _chain: &str) -> Result<f64, SourceError> {
        let url = format!("{}/protocol/{}", self.base_url, urlencoding::encode(strategy));
        let body: ApyResponse = get_json(&self.client, &url).await?;
        match body.apy {
            Some(apy) if apy.is_finite() => Ok(apy),
            _ => Err(SourceError::Missing { target: url }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct OracleResponse {
    #[serde(default)]
    deviation: Option<f64>,
    #[serde(default)]
    timestamp: Option<i64>,
    #[serde(default)]
    confidence: Option<f64>,
}

/// [`OracleReader`] reading `{base}/oracle/{address}/latest`.
#[derive(Debug, Clone)]
pub struct HttpOracleReader {
    client: reqwest::Client,
    base_url: String,
}

impl HttpOracleReader {
    /// Reader configured from `[orchestrator.data_sources]`.
    pub fn new(config: &DataSourceConfig) -> Result<Self, SourceError> {
        Ok(Self {
            client: build_client(config.request_timeout())?,
            base_url: config.oracle_base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Reader sharing an existing client.
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl OracleReader for HttpOracleReader {
    async fn read(&self, address: &str) -> Result<OracleReading, SourceError> {
        let url = format!(
            "{}/oracle/{}/latest",
            self.base_url,
            urlencoding::encode(address)
        );
        let body: OracleResponse = get_json(&self.client, &url).await?;
        let timestamp = body.timestamp.ok_or_else(|| SourceError::Missing {
            target: url.clone(),
        })?;
        Ok(OracleReading {
            deviation: body.deviation.unwrap_or(0.0).clamp(0.0, 1.0),
            last_update: timestamp,
            confidence: body.confidence.unwrap_or(DEFAULT_CONFIDENCE).clamp(0.0, 1.0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_urls_are_normalized() {
        let config = DataSourceConfig {
            apy_base_url: "https://yields.example/".to_string(),
            oracle_base_url: "https://oracles.example//".to_string(),
            request_timeout_ms: 100,
        };
        let yields = HttpYieldSource::new(&config).unwrap();
        let oracles = HttpOracleReader::new(&config).unwrap();
        assert_eq!(yields.base_url, "https://yields.example");
        assert_eq!(oracles.base_url, "https://oracles.example");
    }

    #[test]
    fn oracle_response_defaults() {
        let body: OracleResponse = serde_json::from_str(r#"{"timestamp": 5}"#).unwrap();
        assert_eq!(body.deviation, None);
        assert_eq!(body.confidence, None);
        assert_eq!(body.timestamp, Some(5));
    }

    #[tokio::test]
    async fn unreachable_host_is_a_request_error() {
        let client = build_client(Duration::from_millis(200)).unwrap();
        let source = HttpYieldSource::with_client(client, "http://127.0.0.1:9");
        let err = source.fetch_apy("vault", "ethereum").await.unwrap_err();
        assert!(matches!(err, SourceError::Request { .. }));
    }
}
