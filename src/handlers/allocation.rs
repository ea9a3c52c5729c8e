//! Risk-adjusted allocation across strategies.

use async_trait::async_trait;
use std::collections::BTreeMap;

use crate::error::HandlerError;
use crate::registry::{ComputationHandler, InputSchema, OutputSchema, ParamSpec, ParamType};
use crate::types::args::{AllocationArgs, TaskArgs};
use crate::types::result::{AllocationOutput, ComputationOutput};

/// Cap applied when a constraint omits `max_allocation`.
pub const DEFAULT_MAX_ALLOCATION: f64 = 0.4;

/// Risk applied when a constraint omits `risk_score`.
pub const DEFAULT_RISK_SCORE: f64 = 0.3;

const EPSILON: f64 = 1e-9;

/// Computes target weights from per-strategy caps and risk.
#[derive(Debug, Clone)]
pub struct AllocationHandler {
    fallback_apy: f64,
}

impl AllocationHandler {
    /// Handler using `fallback_apy` for constraints without an expected yield.
    pub fn new(fallback_apy: f64) -> Self {
        Self { fallback_apy }
    }

    /// `current_allocations, constraints, tvl, risk_tolerance`.
    pub fn input_schema() -> InputSchema {
        InputSchema::new(vec![
            ParamSpec::required("current_allocations", ParamType::JsonObject),
            ParamSpec::required("constraints", ParamType::JsonObject),
            ParamSpec::required("tvl", ParamType::Number),
            ParamSpec::required("risk_tolerance", ParamType::Number),
        ])
    }

    /// Fields every allocation output carries.
    pub fn output_schema() -> OutputSchema {
        OutputSchema::new([
            "optimal_allocations",
            "expected_return",
            "risk_score",
            "timestamp",
        ])
    }
}

/// Optimizes the allocation.
///
/// Each strategy gets a raw weight of `min(cap × (1 − risk × tolerance), cap)`
/// floored at zero. Raw weights are then scaled to sum to 1.0, with any
/// strategy that would exceed its cap pinned at the cap and the remainder
/// spread over the rest. When every raw weight is zero the caps themselves
/// are the scaling basis.
///
/// Fails with [`HandlerError::Rejected`] when there are no strategies or the
/// caps sum to less than 1.0, since no weighting can then satisfy both the
/// sum and the caps.
pub fn optimize(args: &AllocationArgs, fallback_apy: f64) -> Result<AllocationOutput, HandlerError> {
    if args.constraints.is_empty() {
        return Err(HandlerError::rejected("no strategies to allocate across"));
    }

    let names: Vec<&String> = args.constraints.keys().collect();
    let mut caps = Vec::with_capacity(names.len());
    let mut risks = Vec::with_capacity(names.len());
    let mut yields = Vec::with_capacity(names.len());
    for constraint in args.constraints.values() {
        caps.push(
            constraint
                .max_allocation
                .unwrap_or(DEFAULT_MAX_ALLOCATION)
                .clamp(0.0, 1.0),
        );
        risks.push(constraint.risk_score.unwrap_or(DEFAULT_RISK_SCORE));
        yields.push(constraint.expected_apy.unwrap_or(fallback_apy));
    }

    let cap_total: f64 = caps.iter().sum();
    if cap_total < 1.0 - EPSILON {
        return Err(HandlerError::rejected(format!(
            "max allocations sum to {cap_total:.4}, below 1.0"
        )));
    }

    let raw: Vec<f64> = caps
        .iter()
        .zip(&risks)
        .map(|(cap, risk)| (cap * (1.0 - risk * args.risk_tolerance)).min(*cap).max(0.0))
        .collect();

    let mut weights = vec![0.0; caps.len()];
    let mut pinned = vec![false; caps.len()];
    let basis = if raw.iter().sum::<f64>() > 0.0 { &raw } else { &caps };
    let remaining = water_fill(&caps, basis, &mut weights, &mut pinned, 1.0);
    if remaining > EPSILON {
        // Every positive-basis strategy hit its cap; spread the rest by cap.
        water_fill(&caps, &caps, &mut weights, &mut pinned, remaining);
    }

    let mut optimal_allocations = BTreeMap::new();
    let mut target_amounts = BTreeMap::new();
    let mut rebalance_deltas = BTreeMap::new();
    let mut expected_return = 0.0;
    let mut risk_score = 0.0;
    for (i, name) in names.iter().enumerate() {
        let weight = weights[i];
        expected_return += weight * yields[i];
        risk_score += weight * risks[i];
        optimal_allocations.insert((*name).clone(), weight);
        target_amounts.insert((*name).clone(), weight * args.tvl);
        let current = args.current_allocations.get(*name).copied().unwrap_or(0.0);
        rebalance_deltas.insert((*name).clone(), weight - current);
    }
    for (name, current) in &args.current_allocations {
        rebalance_deltas.entry(name.clone()).or_insert(-current);
    }

    Ok(AllocationOutput {
        optimal_allocations,
        expected_return,
        risk_score,
        target_amounts,
        rebalance_deltas,
    })
}

/// Distributes `remaining` over unpinned entries in proportion to `basis`,
/// pinning any entry whose share would exceed its cap. Returns what could
/// not be placed.
fn water_fill(
    caps: &[f64],
    basis: &[f64],
    weights: &mut [f64],
    pinned: &mut [bool],
    mut remaining: f64,
) -> f64 {
    loop {
        let free: Vec<usize> = (0..caps.len())
            .filter(|&i| !pinned[i] && basis[i] > 0.0)
            .collect();
        let total: f64 = free.iter().map(|&i| basis[i]).sum();
        if free.is_empty() || total <= 0.0 || remaining <= 0.0 {
            return remaining;
        }

        let mut any_pinned = false;
        for &i in &free {
            if remaining * basis[i] / total > caps[i] {
                weights[i] = caps[i];
                pinned[i] = true;
                any_pinned = true;
            }
        }

        if any_pinned {
            remaining = 1.0 - weights.iter().sum::<f64>();
            continue;
        }

        for &i in &free {
            weights[i] = remaining * basis[i] / total;
        }
        return 0.0;
    }
}

#[async_trait]
impl ComputationHandler for AllocationHandler {
    async fn compute(&self, args: &TaskArgs) -> Result<ComputationOutput, HandlerError> {
        match args {
            TaskArgs::AllocationOptimization(args) => Ok(ComputationOutput::AllocationOptimization(
                optimize(args, self.fallback_apy)?,
            )),
            other => Err(HandlerError::ArgumentMismatch {
                expected: "allocation_optimization",
                got: other.kind().as_str(),
            }),
        }
    }
}
