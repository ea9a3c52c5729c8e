//! External data readers used by the data-reading kinds.
//!
//! [`YieldSource`] backs `cross_chain_apy` and [`OracleReader`] backs
//! `oracle_health`. Both return [`SourceError`] on failure; the handlers
//! absorb those errors with their documented fallbacks, so a reader never
//! fails a task on its own.
//!
//! The `Static*` implementations serve fixed values from memory and are
//! what tests and offline deployments use. HTTP implementations live in
//! [`http`] behind the `http-client` feature.

#[cfg(feature = "http-client")]
pub mod http;

#[cfg(feature = "http-client")]
pub use http::{HttpOracleReader, HttpYieldSource};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::error::SourceError;

/// Reads the current yield of a strategy on a chain.
#[async_trait]
pub trait YieldSource: Send + Sync {
    /// Yield as a fraction (0.08 = 8%).
    async fn fetch_apy(&self, strategy: &str, chain: &str) -> Result<f64, SourceError>;
}

/// One observation of an oracle feed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OracleReading {
    /// Deviation from the reference price as a fraction in `[0, 1]`.
    pub deviation: f64,
    /// Unix seconds of the feed's last update.
    pub last_update: i64,
    /// Reader confidence in `[0, 1]`.
    pub confidence: f64,
}

/// Reads the latest state of an oracle feed.
#[async_trait]
pub trait OracleReader: Send + Sync {
    /// Latest reading for `address`.
    async fn read(&self, address: &str) -> Result<OracleReading, SourceError>;
}

/// In-memory [`YieldSource`] keyed by `(strategy, chain)`.
///
/// Unknown pairs fail with [`SourceError::Missing`], which exercises the
/// handler's fallback path.
///
/// # Examples
///
/// ```
/// use vcompute::sources::{StaticYieldSource, YieldSource};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let source = StaticYieldSource::new().with_rate("0xvault", "ethereum", 0.05);
/// assert_eq!(source.fetch_apy("0xvault", "ethereum").await.unwrap(), 0.05);
/// assert!(source.fetch_apy("0xvault", "base").await.is_err());
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct StaticYieldSource {
    rates: HashMap<(String, String), f64>,
    delay: Option<Duration>,
}

impl StaticYieldSource {
    /// Source with no rates.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a rate for `(strategy, chain)`.
    pub fn with_rate(mut self, strategy: impl Into<String>, chain: impl Into<String>, apy: f64) -> Self {
        self.rates.insert((strategy.into(), chain.into()), apy);
        self
    }

    /// Delays every read, simulating network latency.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl YieldSource for StaticYieldSource {
    async fn fetch_apy(&self, strategy: &str, chain: &str) -> Result<f64, SourceError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.rates
            .get(&(strategy.to_string(), chain.to_string()))
            .copied()
            .ok_or_else(|| SourceError::Missing {
                target: format!("{strategy}@{chain}"),
            })
    }
}

/// In-memory [`OracleReader`] keyed by oracle address.
#[derive(Debug, Clone, Default)]
pub struct StaticOracleReader {
    readings: HashMap<String, OracleReading>,
}

impl StaticOracleReader {
    /// Reader with no feeds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a reading for `address`.
    pub fn with_reading(mut self, address: impl Into<String>, reading: OracleReading) -> Self {
        self.readings.insert(address.into(), reading);
        self
    }
}

#[async_trait]
impl OracleReader for StaticOracleReader {
    async fn read(&self, address: &str) -> Result<OracleReading, SourceError> {
        self.readings
            .get(address)
            .copied()
            .ok_or_else(|| SourceError::Missing {
                target: address.to_string(),
            })
    }
}
