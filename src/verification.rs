//! Deterministic integrity digests over task inputs and outputs.
//!
//! [`VerificationEngine`] is a stateless transformer: [`seal`] turns a
//! `(kind, args, result)` triple into a [`VerificationProof`], and
//! [`verify`] recomputes the digest and compares. Nothing is retained
//! between calls.
//!
//! # Canonical form
//!
//! The digested bytes are the compact JSON serialization of
//!
//! ```text
//! {"args": [...], "kind": "<canonical kind>", "result": {...}}
//! ```
//!
//! with object keys sorted lexicographically at every depth. An argument
//! holding a JSON array or object enters the envelope decoded, so two
//! submissions that differ only in key order or whitespace seal to the same
//! digest; any other argument stays a string. A top-level
//! `verification_hash` field in the result is ignored, so a polled result
//! object can be re-verified as-is. The bytes are prefixed with the domain
//! tag [`SEAL_DOMAIN`] and a zero separator before hashing with SHA-256.
//!
//! A digest is an integrity check, not a signature. Attach a
//! [`ProofSigner`] to fill [`VerificationProof::signature_stub`] when
//! non-repudiation is needed.
//!
//! [`seal`]: VerificationEngine::seal
//! [`verify`]: VerificationEngine::verify

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use sha2::{Digest as _, Sha256};
use std::fmt;
use std::sync::Arc;

use crate::error::HandlerError;
use crate::types::kind::ComputationKind;
use crate::types::result::ComputationResult;

/// Domain separation tag mixed into every digest.
pub const SEAL_DOMAIN: &str = "vcompute/seal/v1";

/// Result field that carries the hex digest on the wire.
pub const VERIFICATION_HASH_FIELD: &str = "verification_hash";

/// Fixed-size SHA-256 digest. Serializes as lowercase hex.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Digest([u8; 32]);

impl Digest {
    /// Wraps raw digest bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex rendering.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parses a 64-character hex string, with or without a `0x` prefix.
    pub fn from_hex(s: &str) -> Option<Self> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes).ok()?;
        Some(Self(bytes))
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.to_hex())
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s)
            .ok_or_else(|| serde::de::Error::custom("expected 64 hex characters"))
    }
}

/// Seal produced for one successful attempt.
///
/// Owned by the task that produced it; never shared across tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationProof {
    /// Digest of the canonical input and output.
    pub digest: Digest,
    /// When the seal was computed.
    pub sealed_at: DateTime<Utc>,
    /// Signature over the digest, if a [`ProofSigner`] is configured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature_stub: Option<String>,
}

/// External signing step layered over the digest.
pub trait ProofSigner: Send + Sync {
    /// Signs the digest, returning an encoded signature.
    fn sign(&self, digest: &Digest) -> Result<String, String>;
}

/// Stateless sealer and verifier.
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use vcompute::verification::VerificationEngine;
/// use vcompute::ComputationKind;
///
/// let engine = VerificationEngine::new();
/// let args = vec!["[\"0xoracle\"]".to_string(), "1700000000".to_string()];
/// let result = json!({"overall_health": true, "average_deviation": 0.0});
///
/// let digest = engine.digest_value(ComputationKind::OracleHealth, &args, &result).unwrap();
/// assert!(engine.verify_value(ComputationKind::OracleHealth, &args, &result, &digest));
///
/// let tampered = json!({"overall_health": false, "average_deviation": 0.0});
/// assert!(!engine.verify_value(ComputationKind::OracleHealth, &args, &tampered, &digest));
/// ```
#[derive(Clone, Default)]
pub struct VerificationEngine {
    signer: Option<Arc<dyn ProofSigner>>,
}

impl fmt::Debug for VerificationEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerificationEngine")
            .field("signer", &self.signer.is_some())
            .finish()
    }
}

impl VerificationEngine {
    /// Engine with no signer; proofs carry no signature.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches a signer whose output fills `signature_stub`.
    pub fn with_signer(mut self, signer: Arc<dyn ProofSigner>) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Seals a typed result.
    pub fn seal(
        &self,
        kind: ComputationKind,
        args: &[String],
        result: &ComputationResult,
    ) -> Result<VerificationProof, HandlerError> {
        let value = serde_json::to_value(result).map_err(|e| HandlerError::Sealing {
            message: e.to_string(),
        })?;
        self.seal_value(kind, args, &value)
    }

    /// Seals a result already rendered as JSON.
    pub fn seal_value(
        &self,
        kind: ComputationKind,
        args: &[String],
        result: &Value,
    ) -> Result<VerificationProof, HandlerError> {
        let digest = self.digest_value(kind, args, result)?;
        let signature_stub = match &self.signer {
            Some(signer) => Some(
                signer
                    .sign(&digest)
                    .map_err(|message| HandlerError::Sealing { message })?,
            ),
            None => None,
        };
        Ok(VerificationProof {
            digest,
            sealed_at: Utc::now(),
            signature_stub,
        })
    }

    /// Computes the digest without building a proof.
    pub fn digest_value(
        &self,
        kind: ComputationKind,
        args: &[String],
        result: &Value,
    ) -> Result<Digest, HandlerError> {
        let bytes = canonical_bytes(kind, args, result).map_err(|e| HandlerError::Sealing {
            message: e.to_string(),
        })?;
        let mut hasher = Sha256::new();
        hasher.update(SEAL_DOMAIN.as_bytes());
        hasher.update([0u8]);
        hasher.update(&bytes);
        let hash = hasher.finalize();
        let mut out = [0u8; 32];
        out.copy_from_slice(&hash);
        Ok(Digest(out))
    }

    /// Recomputes the digest of a typed result and compares it to the proof.
    ///
    /// Never fails: any error while recomputing counts as a mismatch.
    pub fn verify(
        &self,
        kind: ComputationKind,
        args: &[String],
        result: &ComputationResult,
        proof: &VerificationProof,
    ) -> bool {
        self.verify_digest(kind, args, result, &proof.digest)
    }

    /// Like [`verify`](Self::verify) against a bare digest.
    pub fn verify_digest(
        &self,
        kind: ComputationKind,
        args: &[String],
        result: &ComputationResult,
        digest: &Digest,
    ) -> bool {
        match serde_json::to_value(result) {
            Ok(value) => self.verify_value(kind, args, &value, digest),
            Err(_) => false,
        }
    }

    /// Like [`verify`](Self::verify) against a JSON result.
    pub fn verify_value(
        &self,
        kind: ComputationKind,
        args: &[String],
        result: &Value,
        digest: &Digest,
    ) -> bool {
        match self.digest_value(kind, args, result) {
            Ok(actual) => actual == *digest,
            Err(_) => false,
        }
    }
}

/// Canonical byte encoding of a `(kind, args, result)` triple.
pub fn canonical_bytes(
    kind: ComputationKind,
    args: &[String],
    result: &Value,
) -> Result<Vec<u8>, serde_json::Error> {
    let mut result = result.clone();
    if let Value::Object(map) = &mut result {
        map.remove(VERIFICATION_HASH_FIELD);
    }

    let mut envelope = Map::new();
    envelope.insert(
        "args".to_string(),
        Value::Array(args.iter().map(|arg| canonical_arg(arg)).collect()),
    );
    envelope.insert("kind".to_string(), Value::String(kind.as_str().to_string()));
    envelope.insert("result".to_string(), result);

    serde_json::to_vec(&canonicalize(Value::Object(envelope)))
}

/// Decodes a structured argument; scalars keep their submitted text.
fn canonical_arg(raw: &str) -> Value {
    match serde_json::from_str::<Value>(raw) {
        Ok(value @ (Value::Array(_) | Value::Object(_))) => value,
        _ => Value::String(raw.to_string()),
    }
}

/// Rebuilds `value` with object keys sorted at every depth.
///
/// Array order is meaningful and preserved.
pub fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut sorted = Map::new();
            for (key, inner) in entries {
                sorted.insert(key, canonicalize(inner));
            }
            Value::Object(sorted)
        },
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args() -> Vec<String> {
        vec!["0xabc".to_string(), "[\"USDC\"]".to_string()]
    }

    #[test]
    fn canonical_form_sorts_keys_at_every_depth() {
        let value = json!({"b": {"z": 1, "a": 2}, "a": [ {"y": 1, "x": 2} ]});
        let encoded = serde_json::to_string(&canonicalize(value)).unwrap();
        assert_eq!(encoded, r#"{"a":[{"x":2,"y":1}],"b":{"a":2,"z":1}}"#);
    }

    #[test]
    fn digest_ignores_key_order() {
        let engine = VerificationEngine::new();
        let first = json!({"risk_score": 0.4, "strategy_address": "0xabc"});
        let second = json!({"strategy_address": "0xabc", "risk_score": 0.4});
        assert_eq!(
            engine.digest_value(ComputationKind::RiskScoring, &args(), &first).unwrap(),
            engine.digest_value(ComputationKind::RiskScoring, &args(), &second).unwrap()
        );
    }

    #[test]
    fn digest_ignores_verification_hash_field() {
        let engine = VerificationEngine::new();
        let plain = json!({"risk_score": 0.4});
        let digest = engine.digest_value(ComputationKind::RiskScoring, &args(), &plain).unwrap();
        let mut polled = plain.clone();
        polled[VERIFICATION_HASH_FIELD] = json!(digest.to_hex());
        assert!(engine.verify_value(ComputationKind::RiskScoring, &args(), &polled, &digest));
    }

    #[test]
    fn digest_binds_kind_and_args() {
        let engine = VerificationEngine::new();
        let result = json!({"risk_score": 0.4});
        let digest = engine.digest_value(ComputationKind::RiskScoring, &args(), &result).unwrap();
        assert!(!engine.verify_value(ComputationKind::OracleHealth, &args(), &result, &digest));
        let other_args = vec!["0xabd".to_string(), "[\"USDC\"]".to_string()];
        assert!(!engine.verify_value(ComputationKind::RiskScoring, &other_args, &result, &digest));
    }

    #[test]
    fn structured_args_ignore_key_order_and_whitespace() {
        let engine = VerificationEngine::new();
        let result = json!({"optimal_allocations": {"a": 0.5, "b": 0.5}});
        let forward = vec![
            r#"{"a":0.5,"b":0.5}"#.to_string(),
            r#"{"a":{"max_allocation":0.6},"b":{"max_allocation":0.7}}"#.to_string(),
            "1000000".to_string(),
        ];
        let reordered = vec![
            r#"{ "b": 0.5, "a": 0.5 }"#.to_string(),
            r#"{"b":{"max_allocation":0.7},"a":{"max_allocation":0.6}}"#.to_string(),
            "1000000".to_string(),
        ];
        let kind = ComputationKind::AllocationOptimization;
        let digest = engine.digest_value(kind, &forward, &result).unwrap();
        assert_eq!(digest, engine.digest_value(kind, &reordered, &result).unwrap());
        assert!(engine.verify_value(kind, &reordered, &result, &digest));
    }

    #[test]
    fn structured_args_still_bind_their_values() {
        let engine = VerificationEngine::new();
        let result = json!({"aggregated_apy": {}});
        let kind = ComputationKind::CrossChainApy;
        let first = vec![r#"["0xa","0xb"]"#.to_string()];
        let swapped = vec![r#"["0xb","0xa"]"#.to_string()];
        let as_text = vec![r#""[\"0xa\",\"0xb\"]""#.to_string()];
        let digest = engine.digest_value(kind, &first, &result).unwrap();
        assert!(!engine.verify_value(kind, &swapped, &result, &digest));
        assert!(!engine.verify_value(kind, &as_text, &result, &digest));
    }

    #[test]
    fn digest_hex_round_trip() {
        let engine = VerificationEngine::new();
        let digest = engine
            .digest_value(ComputationKind::CrossChainApy, &[], &json!({}))
            .unwrap();
        let hex = digest.to_hex();
        assert_eq!(hex.len(), 64);
        assert_eq!(Digest::from_hex(&hex), Some(digest));
        assert_eq!(Digest::from_hex(&format!("0x{hex}")), Some(digest));
        assert_eq!(Digest::from_hex("zz"), None);
    }

    struct FixedSigner;

    impl ProofSigner for FixedSigner {
        fn sign(&self, digest: &Digest) -> Result<String, String> {
            Ok(format!("sig:{}", &digest.to_hex()[..8]))
        }
    }

    struct BrokenSigner;

    impl ProofSigner for BrokenSigner {
        fn sign(&self, _digest: &Digest) -> Result<String, String> {
            Err("hsm offline".to_string())
        }
    }

    #[test]
    fn signer_fills_signature_stub() {
        let engine = VerificationEngine::new().with_signer(Arc::new(FixedSigner));
        let proof = engine
            .seal_value(ComputationKind::OracleHealth, &[], &json!({"overall_health": true}))
            .unwrap();
        let stub = proof.signature_stub.unwrap();
        assert!(stub.starts_with("sig:"));
    }

    #[test]
    fn signer_failure_is_a_sealing_error() {
        let engine = VerificationEngine::new().with_signer(Arc::new(BrokenSigner));
        let err = engine
            .seal_value(ComputationKind::OracleHealth, &[], &json!({}))
            .unwrap_err();
        assert_eq!(
            err,
            HandlerError::Sealing {
                message: "hsm offline".to_string()
            }
        );
    }

    #[test]
    fn proof_serializes_camel_case() {
        let engine = VerificationEngine::new();
        let proof = engine
            .seal_value(ComputationKind::OracleHealth, &[], &json!({}))
            .unwrap();
        let value = serde_json::to_value(&proof).unwrap();
        assert!(value.get("sealedAt").is_some());
        assert!(value.get("signatureStub").is_none());
        assert_eq!(value["digest"], json!(proof.digest.to_hex()));
    }
}
