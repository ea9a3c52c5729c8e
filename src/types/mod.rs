//! Domain and wire types shared by the registry, scheduler, and bridge.
//!
//! - [`kind`] - The computation discriminator.
//! - [`task`] - Task lifecycle, snapshots, and the submission wire shapes.
//! - [`args`] - Kind-indexed, strongly typed handler arguments.
//! - [`result`] - Kind-specific outputs and the sealed result envelope.

pub mod args;
pub mod kind;
pub mod result;
pub mod task;

pub use args::{
    AllocationArgs, ApyArgs, OracleHealthArgs, RiskScoringArgs, StrategyConstraint, TaskArgs,
};
pub use kind::ComputationKind;
pub use result::{
    AllocationOutput, ApyOutput, ComputationOutput, ComputationResult, OracleHealthOutput,
    OracleStatus, RiskFactors, RiskScoringOutput,
};
pub use task::{Task, TaskId, TaskPoll, TaskRequest, TaskStatus, TaskSubmission};
