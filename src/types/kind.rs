//! The computation discriminator.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::OrchestratorError;

/// Identifies which computation a task requests.
///
/// Parsing accepts the canonical snake_case names plus the legacy task-type
/// aliases `strategy_risk_scoring` and `oracle_health_check`. Digests always
/// use the canonical name from [`as_str`](ComputationKind::as_str).
///
/// # Examples
///
/// ```
/// use vcompute::ComputationKind;
///
/// let kind: ComputationKind = "oracle_health_check".parse().unwrap();
/// assert_eq!(kind, ComputationKind::OracleHealth);
/// assert_eq!(kind.as_str(), "oracle_health");
/// assert!("weather".parse::<ComputationKind>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComputationKind {
    /// Weighted strategy risk score.
    RiskScoring,
    /// Yield rates per strategy and chain, with per-chain means.
    CrossChainApy,
    /// Risk-adjusted portfolio weights.
    AllocationOptimization,
    /// Per-oracle deviation checks with an aggregate verdict.
    OracleHealth,
}

impl ComputationKind {
    /// Every kind, in declaration order.
    pub const ALL: [ComputationKind; 4] = [
        Self::RiskScoring,
        Self::CrossChainApy,
        Self::AllocationOptimization,
        Self::OracleHealth,
    ];

    /// Canonical wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RiskScoring => "risk_scoring",
            Self::CrossChainApy => "cross_chain_apy",
            Self::AllocationOptimization => "allocation_optimization",
            Self::OracleHealth => "oracle_health",
        }
    }
}

impl fmt::Display for ComputationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ComputationKind {
    type Err = OrchestratorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "risk_scoring" | "strategy_risk_scoring" => Ok(Self::RiskScoring),
            "cross_chain_apy" => Ok(Self::CrossChainApy),
            "allocation_optimization" => Ok(Self::AllocationOptimization),
            "oracle_health" | "oracle_health_check" => Ok(Self::OracleHealth),
            other => Err(OrchestratorError::UnknownKind {
                kind: other.to_string(),
            }),
        }
    }
}
