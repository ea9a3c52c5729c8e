//! Built-in computation handlers.
//!
//! | Kind | Handler | External reads |
//! |------|---------|----------------|
//! | `risk_scoring` | [`RiskScoringHandler`] | none |
//! | `cross_chain_apy` | [`CrossChainApyHandler`] | [`YieldSource`] |
//! | `allocation_optimization` | [`AllocationHandler`] | none |
//! | `oracle_health` | [`OracleHealthHandler`] | [`OracleReader`] |
//!
//! Policy values (risk weights, fallback yield, default oracle threshold)
//! come from [`OrchestratorConfig`] at registration time.

pub mod allocation;
pub mod apy;
pub mod oracle;
pub mod risk;

pub use allocation::AllocationHandler;
pub use apy::CrossChainApyHandler;
pub use oracle::OracleHealthHandler;
pub use risk::RiskScoringHandler;

use std::sync::Arc;

use crate::config::OrchestratorConfig;
use crate::error::Result;
use crate::registry::ComputationRegistry;
use crate::sources::{OracleReader, YieldSource};
use crate::types::kind::ComputationKind;

/// Registers all four built-in kinds on `registry`.
///
/// Fails with [`OrchestratorError::DuplicateKind`](crate::OrchestratorError::DuplicateKind)
/// if any of them is already registered.
pub fn register_builtin_handlers(
    registry: &ComputationRegistry,
    config: &OrchestratorConfig,
    yields: Arc<dyn YieldSource>,
    oracles: Arc<dyn OracleReader>,
) -> Result<()> {
    registry.register(
        ComputationKind::RiskScoring,
        Arc::new(RiskScoringHandler::new(config.risk_weights.clone())),
        RiskScoringHandler::input_schema(),
        RiskScoringHandler::output_schema(),
    )?;
    registry.register(
        ComputationKind::CrossChainApy,
        Arc::new(CrossChainApyHandler::new(yields, config.fallback_apy)),
        CrossChainApyHandler::input_schema(),
        CrossChainApyHandler::output_schema(),
    )?;
    registry.register(
        ComputationKind::AllocationOptimization,
        Arc::new(AllocationHandler::new(config.fallback_apy)),
        AllocationHandler::input_schema(),
        AllocationHandler::output_schema(),
    )?;
    registry.register(
        ComputationKind::OracleHealth,
        Arc::new(OracleHealthHandler::new(
            oracles,
            config.oracle_deviation_threshold,
        )),
        OracleHealthHandler::input_schema(),
        OracleHealthHandler::output_schema(),
    )?;
    Ok(())
}
