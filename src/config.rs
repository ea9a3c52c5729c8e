//! Orchestrator configuration.
//!
//! Configuration can be loaded from:
//! 1. TOML file (`vcompute.toml`)
//! 2. Environment variables (with `VCOMPUTE_` prefix)
//!
//! Environment variables override TOML configuration.
//!
//! # Example TOML Configuration
//!
//! ```toml
//! [orchestrator]
//! max_concurrent_tasks = 8
//! max_attempts = 4
//! backoff_base_ms = 250
//! backoff_multiplier = 2.0
//! oracle_deviation_threshold = 0.02
//! fallback_apy = 0.08
//!
//! [orchestrator.per_kind_timeout_ms]
//! cross_chain_apy = 10000
//!
//! [orchestrator.risk_weights]
//! base = 0.6
//! allocation = 0.3
//! diversity = 0.1
//!
//! [orchestrator.data_sources]
//! apy_base_url = "https://api.llama.fi"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

use crate::scheduler::backoff::BackoffPolicy;
use crate::types::kind::ComputationKind;

/// Default file read by [`OrchestratorConfig::load`].
pub const CONFIG_FILE: &str = "vcompute.toml";

/// Prefix of every recognized environment variable.
pub const ENV_PREFIX: &str = "VCOMPUTE_";

/// Scheduler, retry, and handler policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Executor slots; tasks beyond this wait in the queue.
    pub max_concurrent_tasks: usize,

    /// Attempts allowed per task, including the first.
    pub max_attempts: u32,

    /// Delay before the second attempt.
    pub backoff_base_ms: u64,

    /// Growth factor between consecutive delays.
    pub backoff_multiplier: f64,

    /// Cap on any single delay.
    pub max_backoff_ms: u64,

    /// Attempt timeout for kinds without an entry in `per_kind_timeout_ms`.
    pub default_timeout_ms: u64,

    /// Attempt timeout per kind name.
    pub per_kind_timeout_ms: BTreeMap<String, u64>,

    /// Default health threshold for `oracle_health`.
    pub oracle_deviation_threshold: f64,

    /// Yield used when a read fails, and for allocation constraints that
    /// omit `expected_apy`.
    pub fallback_apy: f64,

    /// Risk model weights.
    pub risk_weights: RiskWeights,

    /// HTTP source endpoints.
    pub data_sources: DataSourceConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: 5,
            max_attempts: 3,
            backoff_base_ms: 500,
            backoff_multiplier: 2.0,
            max_backoff_ms: 30_000,
            default_timeout_ms: 30_000,
            per_kind_timeout_ms: BTreeMap::new(),
            oracle_deviation_threshold: 0.02,
            fallback_apy: 0.08,
            risk_weights: RiskWeights::default(),
            data_sources: DataSourceConfig::default(),
        }
    }
}

impl OrchestratorConfig {
    /// Load configuration from file and environment.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables
    /// 2. `vcompute.toml` in the working directory
    /// 3. Default values
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = if let Ok(contents) = std::fs::read_to_string(CONFIG_FILE) {
            Self::from_toml(&contents)?
        } else {
            Self::default()
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path, then apply environment
    /// overrides.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io {
            path: path.as_ref().display().to_string(),
            error: e.to_string(),
        })?;
        let mut config = Self::from_toml(&contents)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse the `[orchestrator]` table from TOML content.
    ///
    /// A document without the table yields defaults.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        #[derive(Deserialize)]
        struct FullConfig {
            #[serde(default)]
            orchestrator: OrchestratorConfig,
        }

        let full: FullConfig =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Ok(full.orchestrator)
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|name| std::env::var(name).ok());
    }

    /// Applies `VCOMPUTE_*` overrides read through `lookup`.
    ///
    /// Values that fail to parse are ignored with a warning.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parsed<T: std::str::FromStr>(
            lookup: &dyn Fn(&str) -> Option<String>,
            suffix: &str,
        ) -> Option<T> {
            let name = format!("{ENV_PREFIX}{suffix}");
            let raw = lookup(&name)?;
            match raw.trim().parse() {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!(variable = %name, value = %raw, "ignoring unparseable override");
                    None
                },
            }
        }

        let lookup: &dyn Fn(&str) -> Option<String> = &lookup;

        if let Some(v) = parsed(lookup, "MAX_CONCURRENT_TASKS") {
            self.max_concurrent_tasks = v;
        }
        if let Some(v) = parsed(lookup, "MAX_ATTEMPTS") {
            self.max_attempts = v;
        }
        if let Some(v) = parsed(lookup, "BACKOFF_BASE_MS") {
            self.backoff_base_ms = v;
        }
        if let Some(v) = parsed(lookup, "BACKOFF_MULTIPLIER") {
            self.backoff_multiplier = v;
        }
        if let Some(v) = parsed(lookup, "MAX_BACKOFF_MS") {
            self.max_backoff_ms = v;
        }
        if let Some(v) = parsed(lookup, "DEFAULT_TIMEOUT_MS") {
            self.default_timeout_ms = v;
        }
        if let Some(v) = parsed(lookup, "ORACLE_DEVIATION_THRESHOLD") {
            self.oracle_deviation_threshold = v;
        }
        if let Some(v) = parsed(lookup, "FALLBACK_APY") {
            self.fallback_apy = v;
        }
        if let Some(url) = lookup(&format!("{ENV_PREFIX}APY_BASE_URL")) {
            self.data_sources.apy_base_url = url;
        }
        if let Some(url) = lookup(&format!("{ENV_PREFIX}ORACLE_BASE_URL")) {
            self.data_sources.oracle_base_url = url;
        }
    }

    /// Rejects values the scheduler or handlers cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
            ConfigError::Validation {
                field: field.to_string(),
                reason: reason.into(),
            }
        }

        if self.max_concurrent_tasks == 0 {
            return Err(invalid("max_concurrent_tasks", "must be at least 1"));
        }
        if self.max_attempts == 0 {
            return Err(invalid("max_attempts", "must be at least 1"));
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(invalid("backoff_multiplier", "must be a finite number >= 1.0"));
        }
        if self.max_backoff_ms < self.backoff_base_ms {
            return Err(invalid("max_backoff_ms", "must be >= backoff_base_ms"));
        }
        if self.default_timeout_ms == 0 {
            return Err(invalid("default_timeout_ms", "must be positive"));
        }
        for (kind, timeout) in &self.per_kind_timeout_ms {
            if kind.parse::<ComputationKind>().is_err() {
                return Err(invalid("per_kind_timeout_ms", format!("unknown kind {kind:?}")));
            }
            if *timeout == 0 {
                return Err(invalid("per_kind_timeout_ms", format!("{kind} must be positive")));
            }
        }
        if !(self.oracle_deviation_threshold > 0.0 && self.oracle_deviation_threshold <= 1.0) {
            return Err(invalid("oracle_deviation_threshold", "must be in (0, 1]"));
        }
        if !self.fallback_apy.is_finite() || self.fallback_apy < 0.0 {
            return Err(invalid("fallback_apy", "must be a finite number >= 0"));
        }
        self.risk_weights.validate()?;
        if self.data_sources.request_timeout_ms == 0 {
            return Err(invalid("data_sources.request_timeout_ms", "must be positive"));
        }
        Ok(())
    }

    /// Attempt timeout for `kind`.
    ///
    /// Keys in `per_kind_timeout_ms` may use aliases.
    pub fn timeout_for(&self, kind: ComputationKind) -> Duration {
        let ms = self
            .per_kind_timeout_ms
            .iter()
            .find(|(name, _)| name.parse::<ComputationKind>().ok() == Some(kind))
            .map(|(_, ms)| *ms)
            .unwrap_or(self.default_timeout_ms);
        Duration::from_millis(ms)
    }

    /// Retry delay schedule.
    pub fn backoff_policy(&self) -> BackoffPolicy {
        BackoffPolicy {
            base: Duration::from_millis(self.backoff_base_ms),
            multiplier: self.backoff_multiplier,
            max: Duration::from_millis(self.max_backoff_ms),
        }
    }
}

/// Weights of the risk-scoring linear combination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskWeights {
    /// Weight of the caller-supplied base score.
    pub base: f64,
    /// Weight of the allocation ratio.
    pub allocation: f64,
    /// Weight of the diversity penalty.
    pub diversity: f64,
    /// Token count at which the diversity penalty reaches zero.
    pub token_span: u32,
}

impl Default for RiskWeights {
    fn default() -> Self {
        Self {
            base: 0.6,
            allocation: 0.3,
            diversity: 0.1,
            token_span: 10,
        }
    }
}

impl RiskWeights {
    fn validate(&self) -> Result<(), ConfigError> {
        let weights = [self.base, self.allocation, self.diversity];
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(ConfigError::Validation {
                field: "risk_weights".to_string(),
                reason: "weights must be finite and non-negative".to_string(),
            });
        }
        if self.token_span == 0 {
            return Err(ConfigError::Validation {
                field: "risk_weights.token_span".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Endpoints for the HTTP data sources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSourceConfig {
    /// Base URL of the yield API.
    pub apy_base_url: String,
    /// Base URL of the oracle API.
    pub oracle_base_url: String,
    /// Per-request timeout.
    pub request_timeout_ms: u64,
}

impl Default for DataSourceConfig {
    fn default() -> Self {
        Self {
            apy_base_url: "https://api.llama.fi".to_string(),
            oracle_base_url: "https://api.chainlink.com".to_string(),
            request_timeout_ms: 5_000,
        }
    }
}

impl DataSourceConfig {
    /// Per-request timeout as a [`Duration`].
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// IO error reading configuration file.
    #[error("failed to read config file '{path}': {error}")]
    Io {
        /// Path to the configuration file.
        path: String,
        /// Error message.
        error: String,
    },

    /// Parse error in configuration.
    #[error("failed to parse config: {0}")]
    Parse(String),

    /// A value is out of range.
    #[error("invalid {field}: {reason}")]
    Validation {
        /// Offending field.
        field: String,
        /// What is wrong with it.
        reason: String,
    },
}
