//! Error types for orchestrator operations.
//!
//! [`OrchestratorError`] is the crate-wide error returned by every public
//! fallible operation. Handler, bridge, and data-source failures have their
//! own enums ([`HandlerError`], [`BridgeError`], [`SourceError`]) so callers
//! can tell a transient failure from a permanent one without string matching.

use thiserror::Error;

use crate::types::task::TaskStatus;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// Errors surfaced by the registry, scheduler, and publishing path.
///
/// # Examples
///
/// ```
/// use vcompute::OrchestratorError;
///
/// let err = OrchestratorError::UnknownTask {
///     task_id: "missing".to_string(),
/// };
/// assert!(err.is_client_error());
/// assert!(!err.is_retryable());
/// assert_eq!(err.category(), "unknown_task");
/// assert!(err.to_string().contains("missing"));
/// ```
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Arguments do not satisfy the kind's input schema. No task is created.
    #[error("invalid arguments for {kind}: {reason}")]
    InvalidArguments {
        /// Kind the arguments were submitted for.
        kind: String,
        /// What failed validation.
        reason: String,
    },

    /// No handler is registered for this kind.
    #[error("unknown computation kind: {kind}")]
    UnknownKind {
        /// The kind as supplied by the caller.
        kind: String,
    },

    /// A handler is already registered for this kind.
    #[error("computation kind already registered: {kind}")]
    DuplicateKind {
        /// The duplicated kind.
        kind: String,
    },

    /// The task id was never issued by this scheduler.
    #[error("task not found: {task_id}")]
    UnknownTask {
        /// The unknown id.
        task_id: String,
    },

    /// The operation is not legal in the task's current status.
    #[error("cannot {operation} task {task_id} in status {status}")]
    InvalidState {
        /// The task the operation targeted.
        task_id: String,
        /// The task's status at the time of the call.
        status: TaskStatus,
        /// The rejected operation (`cancel`, `publish`, ...).
        operation: &'static str,
    },

    /// The handler failed to produce a well-formed result.
    #[error(transparent)]
    Handler(#[from] HandlerError),

    /// A handler invocation exceeded its per-kind timeout.
    #[error("{kind} attempt timed out after {timeout_ms}ms")]
    Timeout {
        /// Kind of the timed-out invocation.
        kind: String,
        /// The timeout that elapsed.
        timeout_ms: u64,
    },

    /// A stored proof no longer matches its task's inputs and result.
    #[error("verification failed for task {task_id}")]
    Verification {
        /// The task whose proof failed re-verification.
        task_id: String,
    },

    /// The bridge collaborator refused or could not take the result.
    #[error(transparent)]
    Bridge(#[from] BridgeError),

    /// The scheduler is shutting down and accepts no new work.
    #[error("scheduler is shutting down")]
    ShuttingDown,
}

impl OrchestratorError {
    /// Returns `true` for errors caused by the caller's request.
    ///
    /// Client errors are never retried by the scheduler.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidArguments { .. }
                | Self::UnknownKind { .. }
                | Self::DuplicateKind { .. }
                | Self::UnknownTask { .. }
                | Self::InvalidState { .. }
        )
    }

    /// Returns `true` if another attempt may succeed.
    ///
    /// Timeouts count as handler failures for retry accounting.
    /// [`BridgeError::Unavailable`] is retryable by the caller of
    /// `publish`; the scheduler itself never retries a publish.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Handler(err) => err.is_retryable(),
            Self::Timeout { .. } => true,
            Self::Bridge(err) => err.is_retryable(),
            _ => false,
        }
    }

    /// Returns the error category as a stable string for logs and stats.
    pub fn category(&self) -> &'static str {
        match self {
            Self::InvalidArguments { .. } => "invalid_arguments",
            Self::UnknownKind { .. } => "unknown_kind",
            Self::DuplicateKind { .. } => "duplicate_kind",
            Self::UnknownTask { .. } => "unknown_task",
            Self::InvalidState { .. } => "invalid_state",
            Self::Handler(_) => "handler",
            Self::Timeout { .. } => "timeout",
            Self::Verification { .. } => "verification",
            Self::Bridge(BridgeError::Unavailable { .. }) => "bridge_unavailable",
            Self::Bridge(BridgeError::Rejected { .. }) => "bridge_rejected",
            Self::ShuttingDown => "shutting_down",
        }
    }

    pub(crate) fn invalid_arguments(kind: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArguments {
            kind: kind.into(),
            reason: reason.into(),
        }
    }
}

/// Failure of a single handler attempt.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum HandlerError {
    /// The attempt failed; a later attempt may succeed.
    #[error("handler failed: {message}")]
    Failed {
        /// Original failure message.
        message: String,
    },

    /// The inputs can never produce a well-formed result.
    ///
    /// The scheduler skips the remaining retry budget for these.
    #[error("handler rejected inputs: {message}")]
    Rejected {
        /// Why the inputs were rejected.
        message: String,
    },

    /// The handler was handed arguments decoded for a different kind.
    #[error("handler expected {expected} arguments, got {got}")]
    ArgumentMismatch {
        /// Kind the handler serves.
        expected: &'static str,
        /// Kind of the arguments it received.
        got: &'static str,
    },

    /// The handler's output lacks fields its output schema requires.
    #[error("output is missing required fields: {}", missing.join(", "))]
    OutputSchema {
        /// Names of the missing fields.
        missing: Vec<String>,
    },

    /// The result could not be sealed.
    #[error("sealing failed: {message}")]
    Sealing {
        /// Why sealing failed.
        message: String,
    },
}

impl HandlerError {
    /// Shorthand for a retryable failure.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }

    /// Shorthand for a permanent rejection.
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected {
            message: message.into(),
        }
    }

    /// Returns `false` for failures no retry can fix.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Rejected { .. } | Self::ArgumentMismatch { .. })
    }
}

/// Errors returned by a [`BridgeAdapter`](crate::bridge::BridgeAdapter).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BridgeError {
    /// The chain or relayer could not be reached. Transient.
    #[error("bridge unavailable: {message}")]
    Unavailable {
        /// Transport-level detail.
        message: String,
    },

    /// The receiving contract rejected the proof. Fatal.
    #[error("bridge rejected result: {reason}")]
    Rejected {
        /// Rejection reason reported by the receiver.
        reason: String,
    },
}

impl BridgeError {
    /// Returns `true` only for [`BridgeError::Unavailable`].
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

/// Failure of a single external read inside a handler.
///
/// Handlers absorb these with documented fallbacks; they never reach the
/// scheduler.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SourceError {
    /// The request could not be sent or completed.
    #[error("request to {target} failed: {message}")]
    Request {
        /// What was being read.
        target: String,
        /// Transport detail.
        message: String,
    },

    /// The source answered with a non-success status.
    #[error("{target} returned status {status}")]
    Status {
        /// What was being read.
        target: String,
        /// HTTP status code.
        status: u16,
    },

    /// The response body could not be decoded.
    #[error("could not decode response from {target}: {message}")]
    Decode {
        /// What was being read.
        target: String,
        /// Decoder detail.
        message: String,
    },

    /// The source has no value for this key.
    #[error("no data for {target}")]
    Missing {
        /// What was being read.
        target: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let err = OrchestratorError::invalid_arguments("risk_scoring", "expected 5 arguments");
        assert_eq!(
            err.to_string(),
            "invalid arguments for risk_scoring: expected 5 arguments"
        );

        let err = OrchestratorError::InvalidState {
            task_id: "t1".to_string(),
            status: TaskStatus::Running,
            operation: "cancel",
        };
        assert_eq!(err.to_string(), "cannot cancel task t1 in status running");

        let err = OrchestratorError::from(HandlerError::OutputSchema {
            missing: vec!["risk_score".to_string(), "risk_factors".to_string()],
        });
        assert_eq!(
            err.to_string(),
            "output is missing required fields: risk_score, risk_factors"
        );
    }

    #[test]
    fn retry_classification() {
        assert!(OrchestratorError::from(HandlerError::failed("boom")).is_retryable());
        assert!(!OrchestratorError::from(HandlerError::rejected("infeasible")).is_retryable());
        assert!(OrchestratorError::Timeout {
            kind: "cross_chain_apy".to_string(),
            timeout_ms: 10,
        }
        .is_retryable());
        assert!(OrchestratorError::from(BridgeError::Unavailable {
            message: "rpc down".to_string()
        })
        .is_retryable());
        assert!(!OrchestratorError::from(BridgeError::Rejected {
            reason: "hash mismatch".to_string()
        })
        .is_retryable());
        assert!(!OrchestratorError::ShuttingDown.is_retryable());
    }

    #[test]
    fn client_errors() {
        assert!(OrchestratorError::UnknownKind {
            kind: "nope".to_string()
        }
        .is_client_error());
        assert!(!OrchestratorError::ShuttingDown.is_client_error());
        assert!(!OrchestratorError::from(HandlerError::failed("x")).is_client_error());
    }

    #[test]
    fn bridge_categories() {
        let unavailable = OrchestratorError::from(BridgeError::Unavailable {
            message: "timeout".to_string(),
        });
        let rejected = OrchestratorError::from(BridgeError::Rejected {
            reason: "bad proof".to_string(),
        });
        assert_eq!(unavailable.category(), "bridge_unavailable");
        assert_eq!(rejected.category(), "bridge_rejected");
    }
}
