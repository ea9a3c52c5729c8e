//! Verifiable compute orchestrator.
//!
//! Accepts computation requests an on-chain application cannot afford to
//! run itself, executes them off-chain under bounded concurrency with
//! retries, seals every result with a deterministic SHA-256 digest over its
//! inputs and outputs, and hands verified results to an on-chain bridge.
//!
//! # Overview
//!
//! ```text
//! submit ─▶ Scheduler queue ─▶ executor slot ─▶ Registry handler
//!                                                   │
//!              poll / wait ◀── Succeeded ◀── VerificationEngine::seal
//!                                                   │
//!                              publish ─▶ BridgeAdapter (re-verified first)
//! ```
//!
//! # Module Organization
//!
//! - [`types`] - Kinds, tasks, typed arguments, results, wire shapes
//! - [`error`] - Error taxonomy with retry classification
//! - [`config`] - TOML + environment configuration
//! - [`registry`] - Kind → handler mapping with input/output schemas
//! - [`handlers`] - The four built-in computations
//! - [`sources`] - Yield and oracle readers used by handlers
//! - [`verification`] - Canonicalization, digests, proofs
//! - [`scheduler`] - Priority queue, dispatch, retry, cancellation
//! - [`bridge`] - On-chain publishing contract
//! - [`stats`] - Counters for operational tooling
//! - `logging` - Subscriber setup (feature `logging`)

pub mod bridge;
pub mod config;
pub mod error;
pub mod handlers;
#[cfg(feature = "logging")]
pub mod logging;
pub mod registry;
pub mod scheduler;
pub mod sources;
pub mod stats;
pub mod types;
pub mod verification;

// Re-exports for ergonomic access
pub use bridge::{BridgeAdapter, BridgeRequest, InMemoryBridge, TransactionRef};
pub use config::{ConfigError, OrchestratorConfig};
pub use error::{BridgeError, HandlerError, OrchestratorError, Result, SourceError};
pub use registry::{ComputationHandler, ComputationRegistry};
pub use scheduler::{Scheduler, SchedulerBuilder};
pub use stats::{
    InMemoryStats, KindCounters, NullStats, SchedulerStats, StatsSink, StatsSnapshot,
    VerificationRecord,
};
pub use types::*;
pub use verification::{Digest, VerificationEngine, VerificationProof};
