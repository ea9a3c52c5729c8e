//! Task lifecycle types and the submission/poll wire shapes.
//!
//! # Serialization
//!
//! Wire types use `#[serde(rename_all = "camelCase")]` (`taskId`,
//! `maxAttempts`, ...). Result payloads keep their snake_case field names
//! because they are the same objects the bridge carries on-chain.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Borrow;
use std::fmt;

use crate::error::OrchestratorError;
use crate::types::kind::ComputationKind;
use crate::types::result::ComputationResult;
use crate::verification::VerificationProof;

/// Task lifecycle status.
///
/// # State Machine
///
/// ```text
/// Queued    -> Running, Cancelled
/// Running   -> Succeeded, Failed, Exhausted
/// Failed    -> Queued (retry), Cancelled
/// Succeeded -> (terminal)
/// Exhausted -> (terminal)
/// Cancelled -> (terminal)
/// ```
///
/// `Failed` is the waiting state between a failed attempt and its retry.
/// Once the retry budget is spent the task moves to `Exhausted` instead.
///
/// # Examples
///
/// ```
/// use vcompute::TaskStatus;
///
/// assert!(TaskStatus::Queued.can_transition_to(&TaskStatus::Running));
/// assert!(!TaskStatus::Running.can_transition_to(&TaskStatus::Cancelled));
/// assert!(TaskStatus::Exhausted.is_terminal());
/// assert!(!TaskStatus::Failed.is_terminal());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting in the priority queue for a free executor slot.
    Queued,
    /// An attempt is executing.
    Running,
    /// Result produced and sealed (terminal).
    Succeeded,
    /// Last attempt failed; a retry is scheduled after backoff.
    Failed,
    /// Retry budget spent without success (terminal).
    Exhausted,
    /// Cancelled before it could run again (terminal).
    Cancelled,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Exhausted => "exhausted",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

impl TaskStatus {
    /// Returns `true` for states no transition leaves.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Exhausted | Self::Cancelled)
    }

    /// Returns `true` if `next` is a legal successor of `self`.
    pub fn can_transition_to(&self, next: &TaskStatus) -> bool {
        matches!(
            (self, next),
            (Self::Queued, Self::Running)
                | (Self::Queued, Self::Cancelled)
                | (Self::Running, Self::Succeeded)
                | (Self::Running, Self::Failed)
                | (Self::Running, Self::Exhausted)
                | (Self::Failed, Self::Queued)
                | (Self::Failed, Self::Cancelled)
        )
    }

    /// Like [`can_transition_to`](Self::can_transition_to) but returns an
    /// [`OrchestratorError::InvalidState`] naming the operation.
    pub fn validate_transition(
        &self,
        task_id: &str,
        next: &TaskStatus,
        operation: &'static str,
    ) -> Result<(), OrchestratorError> {
        if self.can_transition_to(next) {
            Ok(())
        } else {
            Err(OrchestratorError::InvalidState {
                task_id: task_id.to_string(),
                status: *self,
                operation,
            })
        }
    }
}

/// Opaque task identifier issued at submission.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Issues a fresh random id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Borrows the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for TaskId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl Borrow<str> for TaskId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Point-in-time snapshot of a task.
///
/// The scheduler owns the live record; callers only ever see clones.
/// `result` and `proof` are present only when `status` is `Succeeded`;
/// `error` only when `Failed` or `Exhausted`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Issued at submission.
    pub id: TaskId,
    /// Requested computation.
    pub kind: ComputationKind,
    /// Raw string-encoded arguments as submitted.
    pub args: Vec<String>,
    /// Higher dispatches first.
    pub priority: i32,
    /// Current lifecycle state.
    pub status: TaskStatus,
    /// Attempts started so far.
    pub attempts: u32,
    /// Retry ceiling for this task.
    pub max_attempts: u32,
    /// When the task was accepted.
    pub submitted_at: DateTime<Utc>,
    /// When the most recent attempt started.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// When the task reached a terminal state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Output of the successful attempt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ComputationResult>,
    /// Seal over `(kind, args, result)`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proof: Option<VerificationProof>,
    /// Message of the most recent failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Task {
    pub(crate) fn new(
        kind: ComputationKind,
        args: Vec<String>,
        priority: i32,
        max_attempts: u32,
    ) -> Self {
        Self {
            id: TaskId::generate(),
            kind,
            args,
            priority,
            status: TaskStatus::Queued,
            attempts: 0,
            max_attempts,
            submitted_at: Utc::now(),
            started_at: None,
            completed_at: None,
            result: None,
            proof: None,
            error: None,
        }
    }

    /// Returns `true` once the task can no longer change.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Renders the poll response for this snapshot.
    ///
    /// The result object carries a `verification_hash` field alongside the
    /// kind-specific fields.
    pub fn to_poll(&self) -> TaskPoll {
        let result = match (&self.result, &self.proof) {
            (Some(result), Some(proof)) => Some(result.to_json_with_hash(&proof.digest)),
            _ => None,
        };
        TaskPoll {
            status: self.status,
            result,
            error: self.error.clone(),
        }
    }
}

/// Submission request as it arrives over a transport.
///
/// # Examples
///
/// ```
/// use vcompute::TaskRequest;
///
/// let request: TaskRequest = serde_json::from_str(
///     r#"{"kind": "oracle_health", "args": ["[\"0xabc\"]", "1700000000"]}"#,
/// ).unwrap();
/// assert_eq!(request.priority, 0);
/// assert_eq!(request.args.len(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRequest {
    /// Kind name (canonical or alias).
    pub kind: String,
    /// Ordered string-encoded arguments.
    #[serde(default)]
    pub args: Vec<String>,
    /// Dispatch priority, higher first.
    #[serde(default)]
    pub priority: i32,
}

/// Response to an accepted submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSubmission {
    /// Id to poll with.
    pub task_id: TaskId,
}

/// Response to a status poll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPoll {
    /// Current status.
    pub status: TaskStatus,
    /// Kind-specific result object including `verification_hash`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Short failure message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
