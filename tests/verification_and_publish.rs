//! Sealing, re-verification, and the bridge hand-off.

mod common;

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::json;
use vcompute::verification::{Digest, ProofSigner, VerificationEngine};
use vcompute::{
    BridgeError, ComputationKind, InMemoryBridge, InMemoryStats, OrchestratorConfig,
    OrchestratorError, Scheduler, TaskStatus,
};

use common::{builtin_registry, fast_config, registry_with, risk_args, Behaviour, Recorder};

fn builtin_scheduler(stats: Arc<InMemoryStats>) -> Scheduler {
    let config = OrchestratorConfig::default();
    Scheduler::builder(builtin_registry(&config))
        .config(config)
        .stats(stats)
        .build()
        .unwrap()
}

#[tokio::test]
async fn succeeded_task_publishes_through_the_bridge() {
    let stats = Arc::new(InMemoryStats::new());
    let scheduler = builtin_scheduler(stats.clone());
    let bridge = InMemoryBridge::new();

    let id = scheduler.submit("risk_scoring", risk_args("0xvault-a"), 0).unwrap();
    scheduler.wait(id.as_str()).await.unwrap();

    let tx = scheduler.publish(id.as_str(), &bridge).await.unwrap();
    assert_eq!(tx.0, format!("0x{:064x}", 1));

    let accepted = bridge.accepted();
    assert_eq!(accepted.len(), 1);
    let (accepted_tx, request) = &accepted[0];
    assert_eq!(accepted_tx, &tx);
    assert_eq!(request.basis_points("risk_score"), Some(4550));

    let poll = scheduler.poll(id.as_str()).unwrap().result.unwrap();
    assert_eq!(request.payload(), poll);

    let counters = scheduler.stats().counters;
    assert_eq!(counters.sealed, 1);
    assert_eq!(counters.published, 1);
    assert_eq!(counters.verifications_passed, 1);
    assert_eq!(counters.per_kind[&ComputationKind::RiskScoring].succeeded, 1);

    let history = scheduler.verification_history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].kind, ComputationKind::RiskScoring);
    assert_eq!(history[0].digest.to_hex(), request.verification_hash);
    assert!(history[0].valid);
    assert_eq!(stats.last_verification(), Some(history[0].clone()));
}

#[tokio::test(start_paused = true)]
async fn unfinished_task_cannot_be_published_or_verified() {
    let recorder = Recorder::new(Behaviour::Succeed, Duration::from_secs(1));
    let scheduler = Scheduler::builder(registry_with(recorder))
        .start_paused()
        .build()
        .unwrap();
    let bridge = InMemoryBridge::new();

    let id = scheduler.submit("risk_scoring", risk_args("pending"), 0).unwrap();

    let err = scheduler.publish(id.as_str(), &bridge).await.unwrap_err();
    assert!(matches!(
        err,
        OrchestratorError::InvalidState {
            status: TaskStatus::Queued,
            operation: "publish",
            ..
        }
    ));
    let err = scheduler.verify(id.as_str()).unwrap_err();
    assert_eq!(err.category(), "invalid_state");
    assert!(bridge.accepted().is_empty());
}

#[tokio::test(start_paused = true)]
async fn exhausted_task_cannot_be_published() {
    let recorder = Recorder::new(Behaviour::Reject, Duration::from_millis(1));
    let scheduler = Scheduler::builder(registry_with(recorder))
        .config(fast_config())
        .build()
        .unwrap();
    let bridge = InMemoryBridge::new();

    let id = scheduler.submit("risk_scoring", risk_args("doomed"), 0).unwrap();
    scheduler.wait(id.as_str()).await.unwrap();

    let err = scheduler.publish(id.as_str(), &bridge).await.unwrap_err();
    assert_eq!(err.category(), "invalid_state");
}

#[tokio::test]
async fn bridge_outage_is_reported_not_retried() {
    let stats = Arc::new(InMemoryStats::new());
    let scheduler = builtin_scheduler(stats);
    let bridge = InMemoryBridge::new();
    bridge.set_available(false);

    let id = scheduler.submit("risk_scoring", risk_args("0xvault-a"), 0).unwrap();
    scheduler.wait(id.as_str()).await.unwrap();

    let err = scheduler.publish(id.as_str(), &bridge).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::Bridge(BridgeError::Unavailable { .. })));
    assert!(err.is_retryable());
    assert_eq!(err.category(), "bridge_unavailable");
    assert!(bridge.accepted().is_empty());

    // The task is untouched; the caller may try again.
    assert_eq!(scheduler.status(id.as_str()).unwrap().status, TaskStatus::Succeeded);
    bridge.set_available(true);
    scheduler.publish(id.as_str(), &bridge).await.unwrap();

    let counters = scheduler.stats().counters;
    assert_eq!(counters.publish_failures, 1);
    assert_eq!(counters.published, 1);
}

#[tokio::test]
async fn polled_hash_recomputes_from_task_inputs() {
    let scheduler = builtin_scheduler(Arc::new(InMemoryStats::new()));
    let id = scheduler
        .submit(
            "oracle_health",
            vec![r#"["0xfeed-ok","0xfeed-drifting"]"#.to_string(), "1700000000".to_string()],
            0,
        )
        .unwrap();
    let task = scheduler.wait(id.as_str()).await.unwrap();
    assert!(scheduler.verify(id.as_str()).unwrap());

    let mut polled = scheduler.poll(id.as_str()).unwrap().result.unwrap();
    let digest = Digest::from_hex(polled["verification_hash"].as_str().unwrap()).unwrap();
    let engine = VerificationEngine::new();
    assert!(engine.verify_value(task.kind, &task.args, &polled, &digest));

    polled["overall_health"] = json!(true);
    assert!(!engine.verify_value(task.kind, &task.args, &polled, &digest));

    let mut other_args = task.args.clone();
    other_args[1] = "1700000001".to_string();
    let untouched = scheduler.poll(id.as_str()).unwrap().result.unwrap();
    assert!(!engine.verify_value(task.kind, &other_args, &untouched, &digest));
}

struct PrefixSigner;

impl ProofSigner for PrefixSigner {
    fn sign(&self, digest: &Digest) -> Result<String, String> {
        Ok(format!("sig:{}", &digest.to_hex()[..8]))
    }
}

struct BrokenSigner;

impl ProofSigner for BrokenSigner {
    fn sign(&self, _digest: &Digest) -> Result<String, String> {
        Err("key unavailable".to_string())
    }
}

#[tokio::test]
async fn configured_signer_stamps_each_proof() {
    let config = OrchestratorConfig::default();
    let scheduler = Scheduler::builder(builtin_registry(&config))
        .verification_engine(VerificationEngine::new().with_signer(Arc::new(PrefixSigner)))
        .build()
        .unwrap();

    let id = scheduler.submit("risk_scoring", risk_args("0xvault-a"), 0).unwrap();
    let task = scheduler.wait(id.as_str()).await.unwrap();

    let proof = task.proof.unwrap();
    let expected = format!("sig:{}", &proof.digest.to_hex()[..8]);
    assert_eq!(proof.signature_stub.as_deref(), Some(expected.as_str()));
    assert!(scheduler.verify(id.as_str()).unwrap());
}

#[tokio::test(start_paused = true)]
async fn signing_failure_fails_the_attempt() {
    let recorder = Recorder::new(Behaviour::Succeed, Duration::from_millis(1));
    let config = OrchestratorConfig {
        max_attempts: 2,
        ..fast_config()
    };
    let scheduler = Scheduler::builder(registry_with(recorder.clone()))
        .config(config)
        .verification_engine(VerificationEngine::new().with_signer(Arc::new(BrokenSigner)))
        .build()
        .unwrap();

    let id = scheduler.submit("risk_scoring", risk_args("unsigned"), 0).unwrap();
    let task = scheduler.wait(id.as_str()).await.unwrap();

    assert_eq!(task.status, TaskStatus::Exhausted);
    assert_eq!(task.attempts, 2);
    assert_eq!(task.error.as_deref(), Some("sealing failed: key unavailable"));
    assert!(task.proof.is_none());
    assert_eq!(recorder.order().len(), 2);
}

#[tokio::test]
async fn reordered_allocation_inputs_verify_against_the_same_hash() {
    let scheduler = builtin_scheduler(Arc::new(InMemoryStats::new()));
    let args = |current: &str, constraints: &str| {
        vec![
            current.to_string(),
            constraints.to_string(),
            "1000000".to_string(),
            "0.5".to_string(),
        ]
    };
    let submitted = args(
        r#"{"0xvault-a": 0.6, "0xvault-b": 0.4}"#,
        r#"{"0xvault-a": {"max_allocation": 0.6, "risk_score": 0.2},
            "0xvault-b": {"max_allocation": 0.6, "risk_score": 0.5}}"#,
    );
    let reordered = args(
        r#"{"0xvault-b":0.4,"0xvault-a":0.6}"#,
        r#"{"0xvault-b":{"risk_score":0.5,"max_allocation":0.6},"0xvault-a":{"risk_score":0.2,"max_allocation":0.6}}"#,
    );

    let id = scheduler
        .submit("allocation_optimization", submitted, 0)
        .unwrap();
    scheduler.wait(id.as_str()).await.unwrap();
    let result = scheduler.poll(id.as_str()).unwrap().result.unwrap();
    let hash = Digest::from_hex(result["verification_hash"].as_str().unwrap()).unwrap();

    let engine = VerificationEngine::new();
    let kind = ComputationKind::AllocationOptimization;
    assert!(engine.verify_value(kind, &reordered, &result, &hash));
}
