//! Cross-chain yield aggregation.

use async_trait::async_trait;
use futures::future::join_all;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

use crate::error::HandlerError;
use crate::registry::{ComputationHandler, InputSchema, OutputSchema, ParamSpec, ParamType};
use crate::sources::YieldSource;
use crate::types::args::TaskArgs;
use crate::types::result::{ApyOutput, ComputationOutput};

/// Reads a yield for every strategy × chain pair and averages per chain.
///
/// Reads run concurrently. A failed read is logged and replaced with the
/// fallback yield; it never fails the attempt.
pub struct CrossChainApyHandler {
    source: Arc<dyn YieldSource>,
    fallback_apy: f64,
}

impl std::fmt::Debug for CrossChainApyHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrossChainApyHandler")
            .field("fallback_apy", &self.fallback_apy)
            .finish_non_exhaustive()
    }
}

impl CrossChainApyHandler {
    /// Handler reading from `source`, substituting `fallback_apy` on failure.
    pub fn new(source: Arc<dyn YieldSource>, fallback_apy: f64) -> Self {
        Self {
            source,
            fallback_apy,
        }
    }

    /// `strategy_addresses, chains, timestamp`.
    pub fn input_schema() -> InputSchema {
        InputSchema::new(vec![
            ParamSpec::required("strategy_addresses", ParamType::StringList),
            ParamSpec::required("chains", ParamType::StringList),
            ParamSpec::required("timestamp", ParamType::Integer),
        ])
    }

    /// Fields every yield output carries.
    pub fn output_schema() -> OutputSchema {
        OutputSchema::new(["apy_data", "aggregated_apy", "timestamp"])
    }
}

#[async_trait]
impl ComputationHandler for CrossChainApyHandler {
    async fn compute(&self, args: &TaskArgs) -> Result<ComputationOutput, HandlerError> {
        let TaskArgs::CrossChainApy(args) = args else {
            return Err(HandlerError::ArgumentMismatch {
                expected: "cross_chain_apy",
                got: args.kind().as_str(),
            });
        };

        let pairs: Vec<(&String, &String)> = args
            .strategy_addresses
            .iter()
            .flat_map(|strategy| args.chains.iter().map(move |chain| (strategy, chain)))
            .collect();

        let reads = join_all(
            pairs
                .iter()
                .map(|(strategy, chain)| self.source.fetch_apy(strategy, chain)),
        )
        .await;

        let mut apy_data: BTreeMap<String, BTreeMap<String, f64>> = BTreeMap::new();
        let mut fallback_reads = 0u32;
        for ((strategy, chain), read) in pairs.into_iter().zip(reads) {
            let apy = match read {
                Ok(apy) if apy.is_finite() => apy,
                Ok(apy) => {
                    warn!(strategy = %strategy, chain = %chain, apy, "non-finite yield, using fallback");
                    fallback_reads += 1;
                    self.fallback_apy
                },
                Err(e) => {
                    warn!(strategy = %strategy, chain = %chain, error = %e, "yield read failed, using fallback");
                    fallback_reads += 1;
                    self.fallback_apy
                },
            };
            apy_data
                .entry(strategy.clone())
                .or_default()
                .insert(chain.clone(), apy);
        }

        Ok(ComputationOutput::CrossChainApy(ApyOutput {
            aggregated_apy: per_chain_mean(&apy_data),
            apy_data,
            fallback_reads,
        }))
    }
}

/// Mean yield per chain across the strategies that report it.
pub fn per_chain_mean(
    apy_data: &BTreeMap<String, BTreeMap<String, f64>>,
) -> BTreeMap<String, f64> {
    let mut sums: BTreeMap<String, (f64, u32)> = BTreeMap::new();
    for chains in apy_data.values() {
        for (chain, apy) in chains {
            let entry = sums.entry(chain.clone()).or_insert((0.0, 0));
            entry.0 += apy;
            entry.1 += 1;
        }
    }
    sums.into_iter()
        .map(|(chain, (sum, count))| (chain, sum / f64::from(count)))
        .collect()
}
