//! Passive counters for operational tooling.
//!
//! The scheduler reports lifecycle events to a [`StatsSink`]. Sinks must be
//! cheap and non-blocking: they are called on the dispatch path, though
//! never while the queue lock is held.
//!
//! - [`InMemoryStats`] keeps atomic counters, per-kind tallies, and a
//!   bounded history of re-verifications
//! - [`NullStats`] discards everything

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::types::kind::ComputationKind;
use crate::verification::Digest;

/// Re-verifications kept by [`InMemoryStats`] unless configured otherwise.
pub const DEFAULT_HISTORY_LIMIT: usize = 100;

/// Lifecycle event reported by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatsEvent {
    /// A task was accepted.
    Submitted {
        /// Requested kind.
        kind: ComputationKind,
    },
    /// An attempt was dispatched.
    AttemptStarted {
        /// Task kind.
        kind: ComputationKind,
    },
    /// An attempt failed.
    AttemptFailed {
        /// Task kind.
        kind: ComputationKind,
        /// Whether the attempt ran out of time.
        timed_out: bool,
    },
    /// A retry was scheduled.
    RetryScheduled {
        /// Task kind.
        kind: ComputationKind,
    },
    /// A task succeeded.
    Succeeded {
        /// Task kind.
        kind: ComputationKind,
        /// Wall-clock time of the successful attempt.
        compute_time: Duration,
    },
    /// A task spent its retry budget.
    Exhausted {
        /// Task kind.
        kind: ComputationKind,
    },
    /// A task was cancelled.
    Cancelled {
        /// Task kind.
        kind: ComputationKind,
    },
    /// A result was sealed.
    Sealed,
    /// A stored proof was re-verified.
    Verified {
        /// Task kind.
        kind: ComputationKind,
        /// Digest the proof claimed.
        digest: Digest,
        /// Whether the digest matched.
        valid: bool,
    },
    /// A result was handed to the bridge.
    Published {
        /// Whether the bridge accepted it.
        accepted: bool,
    },
}

/// Receiver of [`StatsEvent`]s.
pub trait StatsSink: Send + Sync {
    /// Records one event.
    fn record(&self, event: StatsEvent);

    /// Current counter values. Sinks that keep nothing return zeros.
    fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot::default()
    }

    /// Most recent re-verifications, oldest first. Sinks that keep nothing
    /// return an empty list.
    fn verification_history(&self) -> Vec<VerificationRecord> {
        Vec::new()
    }

    /// Sink name for logs.
    fn name(&self) -> &'static str;
}

/// One re-verification outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationRecord {
    /// Task kind.
    pub kind: ComputationKind,
    /// Digest the stored proof claimed.
    pub digest: Digest,
    /// Whether recomputation matched.
    pub valid: bool,
    /// When the check ran.
    pub checked_at: DateTime<Utc>,
}

/// Per-kind task tallies.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KindCounters {
    /// Tasks accepted.
    pub submitted: u64,
    /// Attempts that failed, timeouts included.
    pub failed_attempts: u64,
    /// Tasks that succeeded.
    pub succeeded: u64,
    /// Tasks that exhausted their budget.
    pub exhausted: u64,
    /// Tasks cancelled.
    pub cancelled: u64,
}

/// Counter values at a point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    /// Tasks accepted.
    pub submitted: u64,
    /// Attempts dispatched, retries included.
    pub attempts: u64,
    /// Attempts that failed, timeouts included.
    pub failed_attempts: u64,
    /// Attempts that timed out.
    pub timeouts: u64,
    /// Retries scheduled.
    pub retries: u64,
    /// Tasks that succeeded.
    pub succeeded: u64,
    /// Tasks that exhausted their budget.
    pub exhausted: u64,
    /// Tasks cancelled.
    pub cancelled: u64,
    /// Results sealed.
    pub sealed: u64,
    /// Re-verifications that matched.
    pub verifications_passed: u64,
    /// Re-verifications that did not match.
    pub verifications_failed: u64,
    /// Results the bridge accepted.
    pub published: u64,
    /// Results the bridge refused or could not take.
    pub publish_failures: u64,
    /// Sum of successful attempt durations.
    pub total_compute_ms: u64,
    /// Task tallies split by kind. Kinds never seen are absent.
    #[serde(default)]
    pub per_kind: BTreeMap<ComputationKind, KindCounters>,
}

impl StatsSnapshot {
    /// Mean duration of successful attempts, in milliseconds.
    pub fn avg_compute_ms(&self) -> f64 {
        if self.succeeded == 0 {
            0.0
        } else {
            self.total_compute_ms as f64 / self.succeeded as f64
        }
    }

    /// Share of re-verifications that matched, or `None` before the first.
    pub fn verification_success_rate(&self) -> Option<f64> {
        let total = self.verifications_passed + self.verifications_failed;
        (total > 0).then(|| self.verifications_passed as f64 / total as f64)
    }
}

/// Scheduler-level view returned by `Scheduler::stats`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerStats {
    /// Sink counters.
    pub counters: StatsSnapshot,
    /// Tasks waiting for a slot.
    pub queue_length: usize,
    /// Attempts currently executing.
    pub active_tasks: usize,
    /// Tasks the scheduler holds, terminal ones included.
    pub tracked_tasks: usize,
    /// Mean duration of successful attempts.
    pub avg_compute_ms: f64,
}

/// Atomic in-memory counters.
#[derive(Debug)]
pub struct InMemoryStats {
    submitted: AtomicU64,
    attempts: AtomicU64,
    failed_attempts: AtomicU64,
    timeouts: AtomicU64,
    retries: AtomicU64,
    succeeded: AtomicU64,
    exhausted: AtomicU64,
    cancelled: AtomicU64,
    sealed: AtomicU64,
    verifications_passed: AtomicU64,
    verifications_failed: AtomicU64,
    published: AtomicU64,
    publish_failures: AtomicU64,
    total_compute_ms: AtomicU64,
    per_kind: Mutex<BTreeMap<ComputationKind, KindCounters>>,
    history: Mutex<VecDeque<VerificationRecord>>,
    history_limit: usize,
}

impl Default for InMemoryStats {
    fn default() -> Self {
        Self::with_history_limit(DEFAULT_HISTORY_LIMIT)
    }
}

impl InMemoryStats {
    /// Zeroed counters keeping the last [`DEFAULT_HISTORY_LIMIT`]
    /// re-verifications.
    pub fn new() -> Self {
        Self::default()
    }

    /// Zeroed counters keeping the last `limit` re-verifications.
    pub fn with_history_limit(limit: usize) -> Self {
        Self {
            submitted: AtomicU64::new(0),
            attempts: AtomicU64::new(0),
            failed_attempts: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
            retries: AtomicU64::new(0),
            succeeded: AtomicU64::new(0),
            exhausted: AtomicU64::new(0),
            cancelled: AtomicU64::new(0),
            sealed: AtomicU64::new(0),
            verifications_passed: AtomicU64::new(0),
            verifications_failed: AtomicU64::new(0),
            published: AtomicU64::new(0),
            publish_failures: AtomicU64::new(0),
            total_compute_ms: AtomicU64::new(0),
            per_kind: Mutex::new(BTreeMap::new()),
            history: Mutex::new(VecDeque::new()),
            history_limit: limit,
        }
    }

    /// Latest re-verification, if any.
    pub fn last_verification(&self) -> Option<VerificationRecord> {
        self.history.lock().back().cloned()
    }

    fn tally(&self, kind: ComputationKind, update: impl FnOnce(&mut KindCounters)) {
        update(self.per_kind.lock().entry(kind).or_default());
    }

    fn remember(&self, record: VerificationRecord) {
        if self.history_limit == 0 {
            return;
        }
        let mut history = self.history.lock();
        while history.len() >= self.history_limit {
            history.pop_front();
        }
        history.push_back(record);
    }
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl StatsSink for InMemoryStats {
    fn record(&self, event: StatsEvent) {
        match event {
            StatsEvent::Submitted { kind } => {
                bump(&self.submitted);
                self.tally(kind, |c| c.submitted += 1);
            },
            StatsEvent::AttemptStarted { .. } => bump(&self.attempts),
            StatsEvent::AttemptFailed { kind, timed_out } => {
                bump(&self.failed_attempts);
                if timed_out {
                    bump(&self.timeouts);
                }
                self.tally(kind, |c| c.failed_attempts += 1);
            },
            StatsEvent::RetryScheduled { .. } => bump(&self.retries),
            StatsEvent::Succeeded { kind, compute_time } => {
                bump(&self.succeeded);
                let ms = u64::try_from(compute_time.as_millis()).unwrap_or(u64::MAX);
                self.total_compute_ms.fetch_add(ms, Ordering::Relaxed);
                self.tally(kind, |c| c.succeeded += 1);
            },
            StatsEvent::Exhausted { kind } => {
                bump(&self.exhausted);
                self.tally(kind, |c| c.exhausted += 1);
            },
            StatsEvent::Cancelled { kind } => {
                bump(&self.cancelled);
                self.tally(kind, |c| c.cancelled += 1);
            },
            StatsEvent::Sealed => bump(&self.sealed),
            StatsEvent::Verified {
                kind,
                digest,
                valid,
            } => {
                bump(if valid {
                    &self.verifications_passed
                } else {
                    &self.verifications_failed
                });
                self.remember(VerificationRecord {
                    kind,
                    digest,
                    valid,
                    checked_at: Utc::now(),
                });
            },
            StatsEvent::Published { accepted: true } => bump(&self.published),
            StatsEvent::Published { accepted: false } => bump(&self.publish_failures),
        }
    }

    fn snapshot(&self) -> StatsSnapshot {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        StatsSnapshot {
            submitted: load(&self.submitted),
            attempts: load(&self.attempts),
            failed_attempts: load(&self.failed_attempts),
            timeouts: load(&self.timeouts),
            retries: load(&self.retries),
            succeeded: load(&self.succeeded),
            exhausted: load(&self.exhausted),
            cancelled: load(&self.cancelled),
            sealed: load(&self.sealed),
            verifications_passed: load(&self.verifications_passed),
            verifications_failed: load(&self.verifications_failed),
            published: load(&self.published),
            publish_failures: load(&self.publish_failures),
            total_compute_ms: load(&self.total_compute_ms),
            per_kind: self.per_kind.lock().clone(),
        }
    }

    fn verification_history(&self) -> Vec<VerificationRecord> {
        self.history.lock().iter().cloned().collect()
    }

    fn name(&self) -> &'static str {
        "in-memory"
    }
}

/// Sink that records nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullStats;

impl StatsSink for NullStats {
    fn record(&self, _event: StatsEvent) {}

    fn name(&self) -> &'static str {
        "null"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_counts_events() {
        let stats = InMemoryStats::new();
        let kind = ComputationKind::RiskScoring;
        stats.record(StatsEvent::Submitted { kind });
        stats.record(StatsEvent::AttemptStarted { kind });
        stats.record(StatsEvent::AttemptFailed {
            kind,
            timed_out: true,
        });
        stats.record(StatsEvent::AttemptStarted { kind });
        stats.record(StatsEvent::Succeeded {
            kind,
            compute_time: Duration::from_millis(40),
        });
        stats.record(StatsEvent::Verified {
            kind,
            digest: Digest::from_bytes([7; 32]),
            valid: false,
        });

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.submitted, 1);
        assert_eq!(snapshot.attempts, 2);
        assert_eq!(snapshot.failed_attempts, 1);
        assert_eq!(snapshot.timeouts, 1);
        assert_eq!(snapshot.succeeded, 1);
        assert_eq!(snapshot.verifications_failed, 1);
        assert_eq!(snapshot.avg_compute_ms(), 40.0);
        assert_eq!(snapshot.verification_success_rate(), Some(0.0));

        let risk = &snapshot.per_kind[&kind];
        assert_eq!(risk.submitted, 1);
        assert_eq!(risk.failed_attempts, 1);
        assert_eq!(risk.succeeded, 1);
        assert!(!snapshot.per_kind.contains_key(&ComputationKind::OracleHealth));
    }

    #[test]
    fn per_kind_tallies_stay_separate() {
        let stats = InMemoryStats::new();
        stats.record(StatsEvent::Submitted {
            kind: ComputationKind::RiskScoring,
        });
        stats.record(StatsEvent::Submitted {
            kind: ComputationKind::OracleHealth,
        });
        stats.record(StatsEvent::Cancelled {
            kind: ComputationKind::OracleHealth,
        });
        stats.record(StatsEvent::Exhausted {
            kind: ComputationKind::RiskScoring,
        });

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.submitted, 2);
        assert_eq!(snapshot.per_kind[&ComputationKind::RiskScoring].exhausted, 1);
        assert_eq!(snapshot.per_kind[&ComputationKind::RiskScoring].cancelled, 0);
        assert_eq!(snapshot.per_kind[&ComputationKind::OracleHealth].cancelled, 1);
    }

    #[test]
    fn history_keeps_the_latest_verifications() {
        let stats = InMemoryStats::with_history_limit(2);
        for (i, valid) in [true, false, true].into_iter().enumerate() {
            stats.record(StatsEvent::Verified {
                kind: ComputationKind::CrossChainApy,
                digest: Digest::from_bytes([i as u8; 32]),
                valid,
            });
        }

        let history = stats.verification_history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].digest, Digest::from_bytes([1; 32]));
        assert!(!history[0].valid);
        let last = stats.last_verification().unwrap();
        assert_eq!(last.digest, Digest::from_bytes([2; 32]));
        assert!(last.valid);

        let rate = stats.snapshot().verification_success_rate().unwrap();
        assert!((rate - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn null_sink_reports_zeros() {
        let stats = NullStats;
        stats.record(StatsEvent::Sealed);
        assert_eq!(stats.snapshot(), StatsSnapshot::default());
        assert!(stats.verification_history().is_empty());
        assert_eq!(stats.snapshot().verification_success_rate(), None);
        assert_eq!(stats.name(), "null");
    }
}
