//! On-chain bridge contract.
//!
//! The orchestrator does not talk to a chain itself. It hands verified
//! results to a [`BridgeAdapter`] and surfaces whatever the adapter reports:
//! [`BridgeError::Unavailable`] is transient and left to the caller to
//! retry, [`BridgeError::Rejected`] is final.
//!
//! The receiving side is expected to recompute the digest from the request
//! rather than trust `verification_hash`. [`InMemoryBridge`] models that.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::error::BridgeError;
use crate::types::kind::ComputationKind;
use crate::types::result::ComputationResult;
use crate::verification::{Digest, VerificationEngine, VerificationProof, VERIFICATION_HASH_FIELD};

/// Scale between a unit fraction and basis points.
pub const BASIS_POINTS: f64 = 10_000.0;

/// Reference to the transaction that carried a result.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionRef(pub String);

impl fmt::Display for TransactionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Everything a bridge call carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeRequest {
    /// Kind that produced the result.
    pub kind: ComputationKind,
    /// Arguments as submitted, needed to recompute the digest.
    pub args: Vec<String>,
    /// Kind-specific result fields, without the hash.
    pub fields: Value,
    /// Lowercase hex digest over `(kind, args, fields)`.
    pub verification_hash: String,
}

impl BridgeRequest {
    /// Builds a request from a sealed result.
    pub fn new(
        kind: ComputationKind,
        args: Vec<String>,
        result: &ComputationResult,
        proof: &VerificationProof,
    ) -> Self {
        Self {
            kind,
            args,
            fields: result.to_json(),
            verification_hash: proof.digest.to_hex(),
        }
    }

    /// The call payload: result fields plus `verification_hash`.
    pub fn payload(&self) -> Value {
        let mut payload = self.fields.clone();
        if let Value::Object(map) = &mut payload {
            map.insert(
                VERIFICATION_HASH_FIELD.to_string(),
                Value::String(self.verification_hash.clone()),
            );
        }
        payload
    }

    /// A top-level numeric field scaled to basis points, rounded.
    ///
    /// Contracts take integer scores; `0.455` becomes `4550`.
    ///
    /// # Examples
    ///
    /// ```
    /// use serde_json::json;
    /// use vcompute::bridge::BridgeRequest;
    /// use vcompute::ComputationKind;
    ///
    /// let request = BridgeRequest {
    ///     kind: ComputationKind::RiskScoring,
    ///     args: vec![],
    ///     fields: json!({"risk_score": 0.455}),
    ///     verification_hash: String::new(),
    /// };
    /// assert_eq!(request.basis_points("risk_score"), Some(4550));
    /// assert_eq!(request.basis_points("missing"), None);
    /// ```
    pub fn basis_points(&self, field: &str) -> Option<u64> {
        let value = self.fields.get(field)?.as_f64()?;
        if !value.is_finite() || value < 0.0 {
            return None;
        }
        Some((value * BASIS_POINTS).round() as u64)
    }
}

/// Submits verified results to an on-chain contract.
#[async_trait]
pub trait BridgeAdapter: Send + Sync {
    /// Publishes one result.
    async fn publish(&self, request: &BridgeRequest) -> Result<TransactionRef, BridgeError>;
}

/// In-process bridge that validates like a receiving contract.
///
/// Accepted requests are kept for inspection. Toggle
/// [`set_available`](Self::set_available) to simulate an outage.
#[derive(Debug)]
pub struct InMemoryBridge {
    engine: VerificationEngine,
    available: AtomicBool,
    next_tx: AtomicU64,
    accepted: Mutex<Vec<(TransactionRef, BridgeRequest)>>,
}

impl Default for InMemoryBridge {
    fn default() -> Self {
        Self {
            engine: VerificationEngine::new(),
            available: AtomicBool::new(true),
            next_tx: AtomicU64::new(1),
            accepted: Mutex::new(Vec::new()),
        }
    }
}

impl InMemoryBridge {
    /// Available bridge with no accepted requests.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent calls succeed or fail with `Unavailable`.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Requests accepted so far, oldest first.
    pub fn accepted(&self) -> Vec<(TransactionRef, BridgeRequest)> {
        self.accepted.lock().clone()
    }
}

#[async_trait]
impl BridgeAdapter for InMemoryBridge {
    async fn publish(&self, request: &BridgeRequest) -> Result<TransactionRef, BridgeError> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(BridgeError::Unavailable {
                message: "bridge offline".to_string(),
            });
        }

        let claimed = Digest::from_hex(&request.verification_hash).ok_or_else(|| {
            BridgeError::Rejected {
                reason: "malformed verification hash".to_string(),
            }
        })?;
        if !self
            .engine
            .verify_value(request.kind, &request.args, &request.fields, &claimed)
        {
            return Err(BridgeError::Rejected {
                reason: "verification hash does not match recomputed digest".to_string(),
            });
        }

        let n = self.next_tx.fetch_add(1, Ordering::SeqCst);
        let tx = TransactionRef(format!("0x{n:064x}"));
        self.accepted.lock().push((tx.clone(), request.clone()));
        Ok(tx)
    }
}
