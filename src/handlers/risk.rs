//! Weighted strategy risk score.

use async_trait::async_trait;

use crate::config::RiskWeights;
use crate::error::HandlerError;
use crate::registry::{ComputationHandler, InputSchema, OutputSchema, ParamSpec, ParamType};
use crate::types::args::{RiskScoringArgs, TaskArgs};
use crate::types::result::{ComputationOutput, RiskFactors, RiskScoringOutput};

/// Scores a strategy from its allocation, token spread, and a base score.
#[derive(Debug, Clone, Default)]
pub struct RiskScoringHandler {
    weights: RiskWeights,
}

impl RiskScoringHandler {
    /// Handler using `weights`.
    pub fn new(weights: RiskWeights) -> Self {
        Self { weights }
    }

    /// `address, tokens, current_allocation, max_allocation, base_risk_score`.
    pub fn input_schema() -> InputSchema {
        InputSchema::new(vec![
            ParamSpec::required("strategy_address", ParamType::Text),
            ParamSpec::required("tokens", ParamType::StringList),
            ParamSpec::required("current_allocation", ParamType::Number),
            ParamSpec::required("max_allocation", ParamType::Number),
            ParamSpec::required("base_risk_score", ParamType::Number),
        ])
    }

    /// Fields every risk output carries.
    pub fn output_schema() -> OutputSchema {
        OutputSchema::new(["strategy_address", "risk_score", "risk_factors", "timestamp"])
    }
}

/// Computes the score.
///
/// ```text
/// allocation_risk = clamp(current / max, 0, 1)      (0 when max <= 0)
/// diversity_risk  = clamp(1 - tokens / token_span, 0, 1)
/// risk_score      = clamp(base·w_b + allocation·w_a + diversity·w_d, 0, 1)
/// ```
///
/// # Examples
///
/// ```
/// use vcompute::config::RiskWeights;
/// use vcompute::handlers::risk::score;
/// use vcompute::RiskScoringArgs;
///
/// let args = RiskScoringArgs {
///     strategy_address: "0xvault".into(),
///     tokens: vec!["USDC".into(), "WETH".into()],
///     current_allocation: 0.3,
///     max_allocation: 0.4,
///     base_risk_score: 0.25,
/// };
/// let out = score(&args, &RiskWeights::default());
/// assert!((out.risk_score - 0.455).abs() < 1e-9);
/// ```
pub fn score(args: &RiskScoringArgs, weights: &RiskWeights) -> RiskScoringOutput {
    let allocation_risk = if args.max_allocation > 0.0 {
        (args.current_allocation / args.max_allocation).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let span = f64::from(weights.token_span.max(1));
    let diversity_risk = (1.0 - args.tokens.len() as f64 / span).clamp(0.0, 1.0);
    let base_risk = args.base_risk_score;

    let risk_score = (base_risk * weights.base
        + allocation_risk * weights.allocation
        + diversity_risk * weights.diversity)
        .clamp(0.0, 1.0);

    RiskScoringOutput {
        strategy_address: args.strategy_address.clone(),
        risk_score,
        risk_factors: RiskFactors {
            base_risk,
            allocation_risk,
            diversity_risk,
        },
    }
}

#[async_trait]
impl ComputationHandler for RiskScoringHandler {
    async fn compute(&self, args: &TaskArgs) -> Result<ComputationOutput, HandlerError> {
        match args {
            TaskArgs::RiskScoring(args) => {
                Ok(ComputationOutput::RiskScoring(score(args, &self.weights)))
            },
            other => Err(HandlerError::ArgumentMismatch {
                expected: "risk_scoring",
                got: other.kind().as_str(),
            }),
        }
    }
}
