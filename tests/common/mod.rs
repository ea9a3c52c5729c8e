//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use vcompute::handlers::{register_builtin_handlers, RiskScoringHandler};
use vcompute::registry::ComputationHandler;
use vcompute::sources::{OracleReading, StaticOracleReader, StaticYieldSource};
use vcompute::{
    ComputationKind, ComputationOutput, ComputationRegistry, HandlerError, OrchestratorConfig,
    RiskFactors, RiskScoringOutput, Scheduler, TaskArgs, TaskId, TaskStatus,
};

/// What a [`Recorder`] does once its delay has elapsed.
#[derive(Debug, Clone, Copy)]
pub enum Behaviour {
    Succeed,
    /// Fails with a retryable error.
    Fail,
    /// Fails the first `n` calls, then succeeds.
    FailTimes(usize),
    /// Fails with a permanent error.
    Reject,
}

/// Risk-scoring handler that records every call.
pub struct Recorder {
    behaviour: Behaviour,
    delay: Duration,
    calls: Mutex<Vec<(String, Instant)>>,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl Recorder {
    pub fn new(behaviour: Behaviour, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            behaviour,
            delay,
            calls: Mutex::new(Vec::new()),
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        })
    }

    /// Strategy addresses in call order.
    pub fn order(&self) -> Vec<String> {
        self.calls.lock().iter().map(|(name, _)| name.clone()).collect()
    }

    /// Call start times.
    pub fn starts(&self) -> Vec<Instant> {
        self.calls.lock().iter().map(|(_, at)| *at).collect()
    }

    /// Highest number of overlapping calls observed.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ComputationHandler for Recorder {
    async fn compute(&self, args: &TaskArgs) -> Result<ComputationOutput, HandlerError> {
        let TaskArgs::RiskScoring(args) = args else {
            return Err(HandlerError::rejected("unexpected kind"));
        };
        let call = {
            let mut calls = self.calls.lock();
            calls.push((args.strategy_address.clone(), Instant::now()));
            calls.len()
        };
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now_active, Ordering::SeqCst);

        tokio::time::sleep(self.delay).await;
        self.active.fetch_sub(1, Ordering::SeqCst);

        match self.behaviour {
            Behaviour::Fail => Err(HandlerError::failed(format!("attempt {call} failed"))),
            Behaviour::FailTimes(n) if call <= n => {
                Err(HandlerError::failed(format!("attempt {call} failed")))
            },
            Behaviour::Reject => Err(HandlerError::rejected("inputs can never work")),
            _ => Ok(ComputationOutput::RiskScoring(RiskScoringOutput {
                strategy_address: args.strategy_address.clone(),
                risk_score: 0.5,
                risk_factors: RiskFactors {
                    base_risk: 0.5,
                    allocation_risk: 0.5,
                    diversity_risk: 0.5,
                },
            })),
        }
    }
}

/// Registry whose only kind is `risk_scoring`, served by `handler`.
pub fn registry_with(handler: Arc<dyn ComputationHandler>) -> Arc<ComputationRegistry> {
    let registry = Arc::new(ComputationRegistry::new());
    registry
        .register(
            ComputationKind::RiskScoring,
            handler,
            RiskScoringHandler::input_schema(),
            RiskScoringHandler::output_schema(),
        )
        .expect("fresh registry");
    registry
}

/// Registry with the four built-in handlers over fixed data.
pub fn builtin_registry(config: &OrchestratorConfig) -> Arc<ComputationRegistry> {
    let yields = StaticYieldSource::new()
        .with_rate("0xvault-a", "ethereum", 0.05)
        .with_rate("0xvault-a", "arbitrum", 0.07)
        .with_rate("0xvault-b", "ethereum", 0.03);
    let oracles = StaticOracleReader::new()
        .with_reading(
            "0xfeed-ok",
            OracleReading {
                deviation: 0.004,
                last_update: 1_700_000_000,
                confidence: 0.97,
            },
        )
        .with_reading(
            "0xfeed-drifting",
            OracleReading {
                deviation: 0.08,
                last_update: 1_699_999_000,
                confidence: 0.6,
            },
        );
    let registry = Arc::new(ComputationRegistry::new());
    register_builtin_handlers(&registry, config, Arc::new(yields), Arc::new(oracles))
        .expect("fresh registry");
    registry
}

/// Config with short backoff for fast retries.
pub fn fast_config() -> OrchestratorConfig {
    OrchestratorConfig {
        backoff_base_ms: 10,
        max_backoff_ms: 1_000,
        ..OrchestratorConfig::default()
    }
}

/// Arguments for `risk_scoring` on `strategy`.
pub fn risk_args(strategy: &str) -> Vec<String> {
    vec![
        strategy.to_string(),
        r#"["USDC","WETH"]"#.to_string(),
        "0.3".to_string(),
        "0.4".to_string(),
        "0.25".to_string(),
    ]
}

/// Blocks until `task_id` reports `status`.
pub async fn wait_for_status(scheduler: &Scheduler, task_id: &TaskId, status: TaskStatus) {
    let mut rx = scheduler.subscribe(task_id.as_str()).expect("known task");
    rx.wait_for(|current| *current == status)
        .await
        .expect("status sender alive");
}
