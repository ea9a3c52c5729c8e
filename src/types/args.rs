//! Kind-indexed handler arguments.
//!
//! Submissions arrive as ordered string sequences. They are decoded exactly
//! once, at the registry boundary, into a [`TaskArgs`] variant so handlers
//! only ever see typed fields.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::OrchestratorError;
use crate::types::kind::ComputationKind;

/// Arguments for [`ComputationKind::RiskScoring`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskScoringArgs {
    /// Strategy contract being scored.
    pub strategy_address: String,
    /// Tokens the strategy holds.
    pub tokens: Vec<String>,
    /// Current share of the vault allocated to the strategy.
    pub current_allocation: f64,
    /// Ceiling on that share.
    pub max_allocation: f64,
    /// Caller-supplied base score.
    pub base_risk_score: f64,
}

/// Arguments for [`ComputationKind::CrossChainApy`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApyArgs {
    /// Strategies to price.
    pub strategy_addresses: Vec<String>,
    /// Chains to read each strategy on.
    pub chains: Vec<String>,
    /// Request timestamp (unix seconds).
    pub timestamp: i64,
}

/// Per-strategy constraint for [`ComputationKind::AllocationOptimization`].
///
/// Missing fields take the handler's defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StrategyConstraint {
    /// Largest weight the strategy may receive.
    #[serde(default)]
    pub max_allocation: Option<f64>,
    /// Strategy risk in `[0, 1]`.
    #[serde(default)]
    pub risk_score: Option<f64>,
    /// Expected yield used for the portfolio return.
    #[serde(default)]
    pub expected_apy: Option<f64>,
}

/// Arguments for [`ComputationKind::AllocationOptimization`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationArgs {
    /// Current weight per strategy.
    pub current_allocations: BTreeMap<String, f64>,
    /// Constraint per strategy; its keys define the strategy set.
    pub constraints: BTreeMap<String, StrategyConstraint>,
    /// Total value locked in the vault.
    pub tvl: f64,
    /// Risk tolerance in `[0, 1]`.
    pub risk_tolerance: f64,
}

/// Arguments for [`ComputationKind::OracleHealth`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OracleHealthArgs {
    /// Oracles to check.
    pub oracle_addresses: Vec<String>,
    /// Request timestamp (unix seconds).
    pub timestamp: i64,
    /// Deviation at or above which an oracle is unhealthy. Falls back to the
    /// configured policy threshold when absent.
    pub deviation_threshold: Option<f64>,
}

/// Decoded arguments, tagged by kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskArgs {
    /// See [`RiskScoringArgs`].
    RiskScoring(RiskScoringArgs),
    /// See [`ApyArgs`].
    CrossChainApy(ApyArgs),
    /// See [`AllocationArgs`].
    AllocationOptimization(AllocationArgs),
    /// See [`OracleHealthArgs`].
    OracleHealth(OracleHealthArgs),
}

impl TaskArgs {
    /// Kind these arguments were decoded for.
    pub fn kind(&self) -> ComputationKind {
        match self {
            Self::RiskScoring(_) => ComputationKind::RiskScoring,
            Self::CrossChainApy(_) => ComputationKind::CrossChainApy,
            Self::AllocationOptimization(_) => ComputationKind::AllocationOptimization,
            Self::OracleHealth(_) => ComputationKind::OracleHealth,
        }
    }

    /// Decodes raw string arguments into the typed variant for `kind`.
    ///
    /// Positional layout per kind:
    ///
    /// | Kind | Arguments |
    /// |------|-----------|
    /// | `risk_scoring` | address, tokens (JSON array), current, max, base score |
    /// | `cross_chain_apy` | addresses (JSON array), chains (JSON array), timestamp |
    /// | `allocation_optimization` | current (JSON object), constraints (JSON object), tvl, tolerance |
    /// | `oracle_health` | addresses (JSON array), timestamp, [threshold] |
    ///
    /// # Examples
    ///
    /// ```
    /// use vcompute::{ComputationKind, TaskArgs};
    ///
    /// let args: Vec<String> = vec![
    ///     "0xstrategy".into(),
    ///     r#"["USDC","WETH"]"#.into(),
    ///     "0.3".into(),
    ///     "0.4".into(),
    ///     "0.25".into(),
    /// ];
    /// let decoded = TaskArgs::decode(ComputationKind::RiskScoring, &args).unwrap();
    /// assert_eq!(decoded.kind(), ComputationKind::RiskScoring);
    /// ```
    pub fn decode(kind: ComputationKind, args: &[String]) -> Result<Self, OrchestratorError> {
        let arg = |index: usize| positional(kind, args, index);

        let decoded = match kind {
            ComputationKind::RiskScoring => Self::RiskScoring(RiskScoringArgs {
                strategy_address: arg(0)?.to_string(),
                tokens: parse_json(kind, "tokens", arg(1)?)?,
                current_allocation: parse_number(kind, "current_allocation", arg(2)?)?,
                max_allocation: parse_number(kind, "max_allocation", arg(3)?)?,
                base_risk_score: parse_number(kind, "base_risk_score", arg(4)?)?,
            }),
            ComputationKind::CrossChainApy => Self::CrossChainApy(ApyArgs {
                strategy_addresses: parse_json(kind, "strategy_addresses", arg(0)?)?,
                chains: parse_json(kind, "chains", arg(1)?)?,
                timestamp: parse_integer(kind, "timestamp", arg(2)?)?,
            }),
            ComputationKind::AllocationOptimization => {
                Self::AllocationOptimization(AllocationArgs {
                    current_allocations: parse_json(kind, "current_allocations", arg(0)?)?,
                    constraints: parse_json(kind, "constraints", arg(1)?)?,
                    tvl: parse_number(kind, "tvl", arg(2)?)?,
                    risk_tolerance: parse_number(kind, "risk_tolerance", arg(3)?)?,
                })
            },
            ComputationKind::OracleHealth => Self::OracleHealth(OracleHealthArgs {
                oracle_addresses: parse_json(kind, "oracle_addresses", arg(0)?)?,
                timestamp: parse_integer(kind, "timestamp", arg(1)?)?,
                deviation_threshold: args
                    .get(2)
                    .map(|raw| parse_number(kind, "deviation_threshold", raw))
                    .transpose()?,
            }),
        };
        Ok(decoded)
    }
}

fn positional(
    kind: ComputationKind,
    args: &[String],
    index: usize,
) -> Result<&str, OrchestratorError> {
    args.get(index).map(String::as_str).ok_or_else(|| {
        OrchestratorError::invalid_arguments(kind.as_str(), format!("missing argument {index}"))
    })
}

fn parse_number(kind: ComputationKind, name: &str, raw: &str) -> Result<f64, OrchestratorError> {
    match raw.trim().parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(OrchestratorError::invalid_arguments(
            kind.as_str(),
            format!("{name} must be a finite number, got {raw:?}"),
        )),
    }
}

fn parse_integer(kind: ComputationKind, name: &str, raw: &str) -> Result<i64, OrchestratorError> {
    raw.trim().parse::<i64>().map_err(|_| {
        OrchestratorError::invalid_arguments(
            kind.as_str(),
            format!("{name} must be an integer, got {raw:?}"),
        )
    })
}

fn parse_json<T: DeserializeOwned>(
    kind: ComputationKind,
    name: &str,
    raw: &str,
) -> Result<T, OrchestratorError> {
    serde_json::from_str(raw).map_err(|e| {
        OrchestratorError::invalid_arguments(kind.as_str(), format!("{name} is malformed: {e}"))
    })
}
