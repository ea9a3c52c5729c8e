//! Kind-specific outputs and the result envelope.
//!
//! A [`ComputationResult`] serializes as one flat JSON object: the output's
//! own fields plus `timestamp`. That object is what gets digested, polled,
//! and carried to the bridge (with `verification_hash` added on the way out).

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::types::kind::ComputationKind;
use crate::verification::Digest;

/// Breakdown of a risk score into its three signals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskFactors {
    /// Caller-supplied base score.
    pub base_risk: f64,
    /// Allocation ratio, capped at 1.0.
    pub allocation_risk: f64,
    /// Penalty that shrinks as token count grows.
    pub diversity_risk: f64,
}

/// Output of [`ComputationKind::RiskScoring`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskScoringOutput {
    /// Strategy that was scored.
    pub strategy_address: String,
    /// Final score in `[0, 1]`.
    pub risk_score: f64,
    /// Signal breakdown.
    pub risk_factors: RiskFactors,
}

/// Output of [`ComputationKind::CrossChainApy`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApyOutput {
    /// Yield per strategy, per chain.
    pub apy_data: BTreeMap<String, BTreeMap<String, f64>>,
    /// Mean yield per chain across strategies.
    pub aggregated_apy: BTreeMap<String, f64>,
    /// Number of reads that fell back to the configured default.
    pub fallback_reads: u32,
}

/// Output of [`ComputationKind::AllocationOptimization`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationOutput {
    /// Target weight per strategy; sums to 1.0.
    pub optimal_allocations: BTreeMap<String, f64>,
    /// Σ weight × expected yield.
    pub expected_return: f64,
    /// Σ weight × strategy risk.
    pub risk_score: f64,
    /// Weight × TVL per strategy.
    pub target_amounts: BTreeMap<String, f64>,
    /// Target weight minus current weight per strategy.
    pub rebalance_deltas: BTreeMap<String, f64>,
}

/// Health record for one oracle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OracleStatus {
    /// `deviation < threshold`.
    pub healthy: bool,
    /// Observed deviation as a fraction in `[0, 1]`.
    pub deviation: f64,
    /// When the oracle last updated (unix seconds); `None` if the read failed.
    pub last_update: Option<i64>,
    /// Reader confidence in `[0, 1]`.
    pub confidence: f64,
}

impl OracleStatus {
    /// Entry recorded when an oracle could not be read.
    pub fn unreachable() -> Self {
        Self {
            healthy: false,
            deviation: 1.0,
            last_update: None,
            confidence: 0.0,
        }
    }
}

/// Output of [`ComputationKind::OracleHealth`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OracleHealthOutput {
    /// Status per oracle.
    pub oracle_status: BTreeMap<String, OracleStatus>,
    /// `true` iff every oracle is healthy.
    pub overall_health: bool,
    /// Mean deviation across oracles.
    pub average_deviation: f64,
    /// Threshold the verdicts were made against.
    pub deviation_threshold: f64,
    /// Timestamp the check was requested for.
    pub checked_at: i64,
}

/// Kind-specific payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ComputationOutput {
    /// See [`RiskScoringOutput`].
    RiskScoring(RiskScoringOutput),
    /// See [`ApyOutput`].
    CrossChainApy(ApyOutput),
    /// See [`AllocationOutput`].
    AllocationOptimization(AllocationOutput),
    /// See [`OracleHealthOutput`].
    OracleHealth(OracleHealthOutput),
}

impl ComputationOutput {
    /// Kind that produced this output.
    pub fn kind(&self) -> ComputationKind {
        match self {
            Self::RiskScoring(_) => ComputationKind::RiskScoring,
            Self::CrossChainApy(_) => ComputationKind::CrossChainApy,
            Self::AllocationOptimization(_) => ComputationKind::AllocationOptimization,
            Self::OracleHealth(_) => ComputationKind::OracleHealth,
        }
    }
}

/// A handler's output stamped with its production time.
///
/// Produced once per successful attempt. A retry produces a fresh result
/// that replaces, never merges with, an earlier one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputationResult {
    /// Kind-specific fields.
    #[serde(flatten)]
    pub output: ComputationOutput,
    /// Unix seconds at production.
    pub timestamp: i64,
}

impl ComputationResult {
    /// Stamps `output` with the current time.
    pub fn new(output: ComputationOutput) -> Self {
        Self::with_timestamp(output, Utc::now().timestamp())
    }

    /// Stamps `output` with an explicit time.
    pub fn with_timestamp(output: ComputationOutput, timestamp: i64) -> Self {
        Self { output, timestamp }
    }

    /// Kind that produced the result.
    pub fn kind(&self) -> ComputationKind {
        self.output.kind()
    }

    /// Flat JSON object of the result fields.
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Flat JSON object with `verification_hash` appended.
    pub fn to_json_with_hash(&self, digest: &Digest) -> Value {
        let mut value = self.to_json();
        if let Value::Object(map) = &mut value {
            map.insert(
                "verification_hash".to_string(),
                Value::String(digest.to_hex()),
            );
        }
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn risk_result() -> ComputationResult {
        ComputationResult::with_timestamp(
            ComputationOutput::RiskScoring(RiskScoringOutput {
                strategy_address: "0xabc".to_string(),
                risk_score: 0.5,
                risk_factors: RiskFactors {
                    base_risk: 0.2,
                    allocation_risk: 0.5,
                    diversity_risk: 0.9,
                },
            }),
            1_700_000_000,
        )
    }

    #[test]
    fn result_serializes_flat() {
        let value = risk_result().to_json();
        assert_eq!(value["strategy_address"], json!("0xabc"));
        assert_eq!(value["timestamp"], json!(1_700_000_000));
        assert_eq!(value["risk_factors"]["allocation_risk"], json!(0.5));
    }

    #[test]
    fn result_deserializes_back_to_same_variant() {
        let value = risk_result().to_json();
        let parsed: ComputationResult = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, risk_result());
        assert_eq!(parsed.kind(), ComputationKind::RiskScoring);
    }

    #[test]
    fn unreachable_oracle_is_maximally_deviant() {
        let status = OracleStatus::unreachable();
        assert!(!status.healthy);
        assert_eq!(status.deviation, 1.0);
        assert_eq!(status.last_update, None);
    }
}
