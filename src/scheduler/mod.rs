//! Task scheduler.
//!
//! [`Scheduler`] owns every task from submission to terminal state. It keeps
//! a priority queue of waiting tasks and dispatches them to at most
//! `max_concurrent_tasks` concurrent attempts. Each attempt runs the
//! registered handler under the kind's timeout, seals the result, and
//! records the outcome. Failed attempts are retried after an exponential
//! backoff until the task's attempt budget is spent.
//!
//! # Concurrency
//!
//! All bookkeeping (task records, queue, slot count) sits behind one
//! `parking_lot::Mutex` that is only held for short, synchronous critical
//! sections. Handlers run on spawned tokio tasks with no lock held. A single
//! dispatcher task wakes on [`tokio::sync::Notify`] whenever a task is
//! queued, a slot frees, or dispatch is resumed.
//!
//! Attempts and backoff timers are spawned on a
//! [`TaskTracker`](tokio_util::task::TaskTracker) so [`Scheduler::shutdown`]
//! can wait for in-flight work; a [`CancellationToken`] stops the dispatcher
//! and pending timers.
//!
//! # Examples
//!
//! ```no_run
//! use std::sync::Arc;
//! use vcompute::config::OrchestratorConfig;
//! use vcompute::handlers::register_builtin_handlers;
//! use vcompute::registry::ComputationRegistry;
//! use vcompute::scheduler::Scheduler;
//! use vcompute::sources::{StaticOracleReader, StaticYieldSource};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = OrchestratorConfig::default();
//! let registry = Arc::new(ComputationRegistry::new());
//! register_builtin_handlers(
//!     &registry,
//!     &config,
//!     Arc::new(StaticYieldSource::new()),
//!     Arc::new(StaticOracleReader::new()),
//! )?;
//!
//! let scheduler = Scheduler::builder(registry).config(config).build()?;
//! let task_id = scheduler.submit(
//!     "risk_scoring",
//!     vec![
//!         "0xstrategy".into(),
//!         r#"["USDC","WETH"]"#.into(),
//!         "0.3".into(),
//!         "0.4".into(),
//!         "0.25".into(),
//!     ],
//!     0,
//! )?;
//!
//! let task = scheduler.wait(task_id.as_str()).await?;
//! println!("{:?}", scheduler.poll(task_id.as_str())?);
//! # let _ = task;
//! # Ok(())
//! # }
//! ```

pub mod backoff;
mod queue;

pub use backoff::BackoffPolicy;

use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::bridge::{BridgeAdapter, BridgeRequest, TransactionRef};
use crate::config::{ConfigError, OrchestratorConfig};
use crate::error::{OrchestratorError, Result};
use crate::registry::ComputationRegistry;
use crate::stats::{NullStats, SchedulerStats, StatsEvent, StatsSink, VerificationRecord};
use crate::types::args::TaskArgs;
use crate::types::kind::ComputationKind;
use crate::types::result::ComputationResult;
use crate::types::task::{Task, TaskId, TaskPoll, TaskRequest, TaskStatus, TaskSubmission};
use crate::verification::{VerificationEngine, VerificationProof};

use queue::{PriorityQueue, QueueEntry};

/// Builder for [`Scheduler`].
pub struct SchedulerBuilder {
    registry: Arc<ComputationRegistry>,
    config: OrchestratorConfig,
    engine: VerificationEngine,
    stats: Arc<dyn StatsSink>,
    paused: bool,
}

impl std::fmt::Debug for SchedulerBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulerBuilder")
            .field("config", &self.config)
            .field("stats", &self.stats.name())
            .field("paused", &self.paused)
            .finish_non_exhaustive()
    }
}

impl SchedulerBuilder {
    /// Builder over `registry` with default configuration.
    pub fn new(registry: Arc<ComputationRegistry>) -> Self {
        Self {
            registry,
            config: OrchestratorConfig::default(),
            engine: VerificationEngine::new(),
            stats: Arc::new(NullStats),
            paused: false,
        }
    }

    /// Sets the configuration.
    pub fn config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the verification engine, e.g. one with a signer attached.
    pub fn verification_engine(mut self, engine: VerificationEngine) -> Self {
        self.engine = engine;
        self
    }

    /// Sets the stats sink.
    pub fn stats(mut self, stats: Arc<dyn StatsSink>) -> Self {
        self.stats = stats;
        self
    }

    /// Starts with dispatch paused; nothing runs until
    /// [`Scheduler::resume`].
    pub fn start_paused(mut self) -> Self {
        self.paused = true;
        self
    }

    /// Validates the configuration and starts the dispatcher.
    ///
    /// Must be called from within a tokio runtime.
    pub fn build(self) -> std::result::Result<Scheduler, ConfigError> {
        self.config.validate()?;

        let wakeup = Arc::new(Notify::new());
        let shutdown = CancellationToken::new();
        let inner = Arc::new(Inner {
            registry: self.registry,
            engine: self.engine,
            backoff: self.config.backoff_policy(),
            config: self.config,
            stats: self.stats,
            state: Mutex::new(SchedulerState {
                paused: self.paused,
                ..SchedulerState::default()
            }),
            wakeup: Arc::clone(&wakeup),
            shutdown: shutdown.clone(),
            tracker: TaskTracker::new(),
        });

        tokio::spawn(dispatch_loop(Arc::downgrade(&inner), wakeup, shutdown));
        info!(
            max_concurrent_tasks = inner.config.max_concurrent_tasks,
            max_attempts = inner.config.max_attempts,
            paused = self.paused,
            "scheduler started"
        );
        Ok(Scheduler { inner })
    }
}

/// Priority scheduler with bounded concurrency and retries.
///
/// Cheap to clone; clones share the same queue and tasks.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Scheduler")
            .field("tracked_tasks", &state.tasks.len())
            .field("running", &state.running)
            .field("paused", &state.paused)
            .field("closed", &state.closed)
            .finish()
    }
}

struct Inner {
    registry: Arc<ComputationRegistry>,
    engine: VerificationEngine,
    config: OrchestratorConfig,
    backoff: BackoffPolicy,
    stats: Arc<dyn StatsSink>,
    state: Mutex<SchedulerState>,
    wakeup: Arc<Notify>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[derive(Default)]
struct SchedulerState {
    tasks: HashMap<TaskId, TaskEntry>,
    order: Vec<TaskId>,
    queue: PriorityQueue,
    running: usize,
    next_seq: u64,
    paused: bool,
    closed: bool,
}

struct TaskEntry {
    task: Task,
    args: TaskArgs,
    seq: u64,
    status_tx: watch::Sender<TaskStatus>,
}

impl TaskEntry {
    fn transition(&mut self, next: TaskStatus, operation: &'static str) -> Result<()> {
        self.task
            .status
            .validate_transition(self.task.id.as_str(), &next, operation)?;
        self.task.status = next;
        if next.is_terminal() {
            self.task.completed_at = Some(Utc::now());
        }
        self.status_tx.send_replace(next);
        Ok(())
    }
}

struct Attempt {
    task_id: TaskId,
    kind: ComputationKind,
    args: TaskArgs,
    raw_args: Vec<String>,
    attempt: u32,
}

type AttemptOutcome = Result<(ComputationResult, VerificationProof)>;

async fn dispatch_loop(inner: Weak<Inner>, wakeup: Arc<Notify>, shutdown: CancellationToken) {
    loop {
        match inner.upgrade() {
            Some(inner) => inner.dispatch_ready(),
            None => break,
        }
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = wakeup.notified() => {},
        }
    }
    debug!("dispatcher stopped");
}

impl Inner {
    /// Moves queued tasks into free slots and spawns their attempts.
    fn dispatch_ready(self: &Arc<Self>) {
        let mut ready = Vec::new();
        {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            if state.paused || state.closed {
                return;
            }
            while state.running < self.config.max_concurrent_tasks {
                let Some(next) = state.queue.pop() else {
                    break;
                };
                let Some(entry) = state.tasks.get_mut(&next.task_id) else {
                    continue;
                };
                if entry.task.status != TaskStatus::Queued {
                    continue;
                }
                if let Err(e) = entry.transition(TaskStatus::Running, "dispatch") {
                    error!(task_id = %next.task_id, error = %e, "dispatch transition rejected");
                    continue;
                }
                entry.task.attempts += 1;
                entry.task.started_at = Some(Utc::now());
                state.running += 1;
                ready.push(Attempt {
                    task_id: next.task_id,
                    kind: entry.task.kind,
                    args: entry.args.clone(),
                    raw_args: entry.task.args.clone(),
                    attempt: entry.task.attempts,
                });
            }
        }

        for attempt in ready {
            debug!(
                task_id = %attempt.task_id,
                kind = %attempt.kind,
                attempt = attempt.attempt,
                "dispatching attempt"
            );
            self.stats.record(StatsEvent::AttemptStarted { kind: attempt.kind });
            let inner = Arc::clone(self);
            self.tracker.spawn(async move { inner.run_attempt(attempt).await });
        }
    }

    async fn run_attempt(self: Arc<Self>, attempt: Attempt) {
        let timeout = self.config.timeout_for(attempt.kind);
        let started = Instant::now();

        let outcome: AttemptOutcome =
            match tokio::time::timeout(timeout, self.registry.invoke_typed(&attempt.args)).await {
                Ok(Ok(result)) => self
                    .engine
                    .seal(attempt.kind, &attempt.raw_args, &result)
                    .map(|proof| (result, proof))
                    .map_err(OrchestratorError::from),
                Ok(Err(e)) => Err(e),
                Err(_) => Err(OrchestratorError::Timeout {
                    kind: attempt.kind.as_str().to_string(),
                    timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                }),
            };

        self.finish_attempt(attempt, outcome, started.elapsed());
        self.wakeup.notify_one();
    }

    fn finish_attempt(self: &Arc<Self>, attempt: Attempt, outcome: AttemptOutcome, elapsed: Duration) {
        let mut events = Vec::new();
        let mut retry_after = None;
        {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            state.running = state.running.saturating_sub(1);
            let closed = state.closed;
            let Some(entry) = state.tasks.get_mut(&attempt.task_id) else {
                return;
            };

            match outcome {
                Ok((result, proof)) => {
                    events.push(StatsEvent::Sealed);
                    entry.task.result = Some(result);
                    entry.task.proof = Some(proof);
                    entry.task.error = None;
                    if let Err(e) = entry.transition(TaskStatus::Succeeded, "complete") {
                        error!(task_id = %attempt.task_id, error = %e, "completion transition rejected");
                        return;
                    }
                    events.push(StatsEvent::Succeeded {
                        kind: attempt.kind,
                        compute_time: elapsed,
                    });
                    info!(
                        task_id = %attempt.task_id,
                        kind = %attempt.kind,
                        attempt = attempt.attempt,
                        elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                        "task succeeded"
                    );
                },
                Err(err) => {
                    events.push(StatsEvent::AttemptFailed {
                        kind: attempt.kind,
                        timed_out: matches!(err, OrchestratorError::Timeout { .. }),
                    });
                    entry.task.error = Some(err.to_string());

                    let budget_spent = entry.task.attempts >= entry.task.max_attempts;
                    if budget_spent || !err.is_retryable() {
                        if let Err(e) = entry.transition(TaskStatus::Exhausted, "exhaust") {
                            error!(task_id = %attempt.task_id, error = %e, "exhaust transition rejected");
                            return;
                        }
                        events.push(StatsEvent::Exhausted { kind: attempt.kind });
                        warn!(
                            task_id = %attempt.task_id,
                            kind = %attempt.kind,
                            attempt = attempt.attempt,
                            category = err.category(),
                            error = %err,
                            "task exhausted"
                        );
                    } else if let Err(e) = entry.transition(TaskStatus::Failed, "fail") {
                        error!(task_id = %attempt.task_id, error = %e, "failure transition rejected");
                        return;
                    } else if closed {
                        entry.task.error = None;
                        if entry.transition(TaskStatus::Cancelled, "cancel").is_ok() {
                            events.push(StatsEvent::Cancelled { kind: attempt.kind });
                        }
                        info!(task_id = %attempt.task_id, "retry dropped during shutdown");
                    } else {
                        let delay = self.backoff.delay_after(attempt.attempt);
                        events.push(StatsEvent::RetryScheduled { kind: attempt.kind });
                        warn!(
                            task_id = %attempt.task_id,
                            kind = %attempt.kind,
                            attempt = attempt.attempt,
                            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                            error = %err,
                            "attempt failed, retry scheduled"
                        );
                        retry_after = Some(delay);
                    }
                },
            }
        }

        for event in events {
            self.stats.record(event);
        }

        if let Some(delay) = retry_after {
            let inner = Arc::clone(self);
            let task_id = attempt.task_id;
            self.tracker.spawn(async move {
                tokio::select! {
                    _ = inner.shutdown.cancelled() => {},
                    _ = tokio::time::sleep(delay) => inner.requeue(&task_id),
                }
            });
        }
    }

    /// Returns a `Failed` task to the queue with its original sequence.
    fn requeue(&self, task_id: &TaskId) {
        {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            let Some(entry) = state.tasks.get_mut(task_id) else {
                return;
            };
            if entry.task.status != TaskStatus::Failed {
                return;
            }
            if entry.transition(TaskStatus::Queued, "retry").is_err() {
                return;
            }
            entry.task.error = None;
            state.queue.push(QueueEntry {
                priority: entry.task.priority,
                seq: entry.seq,
                task_id: task_id.clone(),
            });
            debug!(task_id = %task_id, attempts = entry.task.attempts, "task re-queued");
        }
        self.wakeup.notify_one();
    }
}

impl Scheduler {
    /// Starts a [`SchedulerBuilder`].
    pub fn builder(registry: Arc<ComputationRegistry>) -> SchedulerBuilder {
        SchedulerBuilder::new(registry)
    }

    /// The registry tasks are run against.
    pub fn registry(&self) -> &Arc<ComputationRegistry> {
        &self.inner.registry
    }

    /// The active configuration.
    pub fn config(&self) -> &OrchestratorConfig {
        &self.inner.config
    }

    /// Accepts a task.
    ///
    /// Arguments are validated and decoded before anything is recorded, so
    /// a rejected submission leaves no task behind.
    pub fn submit(&self, kind: &str, args: Vec<String>, priority: i32) -> Result<TaskId> {
        let (kind, decoded) = self.inner.registry.prepare(kind, &args)?;
        let task = Task::new(kind, args, priority, self.inner.config.max_attempts);
        let task_id = task.id.clone();

        {
            let mut guard = self.inner.state.lock();
            let state = &mut *guard;
            if state.closed {
                return Err(OrchestratorError::ShuttingDown);
            }
            let seq = state.next_seq;
            state.next_seq += 1;
            let (status_tx, _) = watch::channel(TaskStatus::Queued);
            state.queue.push(QueueEntry {
                priority,
                seq,
                task_id: task_id.clone(),
            });
            state.order.push(task_id.clone());
            state.tasks.insert(
                task_id.clone(),
                TaskEntry {
                    task,
                    args: decoded,
                    seq,
                    status_tx,
                },
            );
        }

        self.inner.stats.record(StatsEvent::Submitted { kind });
        info!(task_id = %task_id, kind = %kind, priority, "task submitted");
        self.inner.wakeup.notify_one();
        Ok(task_id)
    }

    /// [`submit`](Self::submit) for a wire request.
    pub fn submit_request(&self, request: TaskRequest) -> Result<TaskSubmission> {
        let task_id = self.submit(&request.kind, request.args, request.priority)?;
        Ok(TaskSubmission { task_id })
    }

    /// Snapshot of a task.
    pub fn status(&self, task_id: &str) -> Result<Task> {
        let state = self.inner.state.lock();
        state
            .tasks
            .get(task_id)
            .map(|entry| entry.task.clone())
            .ok_or_else(|| unknown_task(task_id))
    }

    /// Poll response for a task.
    pub fn poll(&self, task_id: &str) -> Result<TaskPoll> {
        Ok(self.status(task_id)?.to_poll())
    }

    /// Cancels a task that is waiting to run.
    ///
    /// Legal while `Queued`, and while `Failed` awaiting its retry. A
    /// running attempt cannot be interrupted.
    pub fn cancel(&self, task_id: &str) -> Result<()> {
        let kind = {
            let mut guard = self.inner.state.lock();
            let state = &mut *guard;
            let entry = state.tasks.get_mut(task_id).ok_or_else(|| unknown_task(task_id))?;
            entry.transition(TaskStatus::Cancelled, "cancel")?;
            entry.task.error = None;
            let kind = entry.task.kind;
            state.queue.retain(|queued| queued.task_id.as_str() != task_id);
            kind
        };
        self.inner.stats.record(StatsEvent::Cancelled { kind });
        info!(task_id = %task_id, kind = %kind, "task cancelled");
        Ok(())
    }

    /// Receiver that observes every status change of a task.
    pub fn subscribe(&self, task_id: &str) -> Result<watch::Receiver<TaskStatus>> {
        let state = self.inner.state.lock();
        state
            .tasks
            .get(task_id)
            .map(|entry| entry.status_tx.subscribe())
            .ok_or_else(|| unknown_task(task_id))
    }

    /// Resolves once the task reaches a terminal status.
    pub async fn wait(&self, task_id: &str) -> Result<Task> {
        let mut rx = self.subscribe(task_id)?;
        // The sender lives as long as the task record, so this only errors
        // if the scheduler itself is gone.
        let _ = rx.wait_for(TaskStatus::is_terminal).await;
        self.status(task_id)
    }

    /// Number of queued tasks that dispatch before this one, or `None` if
    /// the task is not queued.
    pub fn queue_position(&self, task_id: &str) -> Result<Option<usize>> {
        let state = self.inner.state.lock();
        let entry = state.tasks.get(task_id).ok_or_else(|| unknown_task(task_id))?;
        if entry.task.status != TaskStatus::Queued {
            return Ok(None);
        }
        Ok(state
            .queue
            .ordered()
            .iter()
            .position(|queued| queued.task_id.as_str() == task_id))
    }

    /// Snapshots of every task, in submission order.
    pub fn list(&self) -> Vec<Task> {
        let state = self.inner.state.lock();
        state
            .order
            .iter()
            .filter_map(|id| state.tasks.get(id).map(|entry| entry.task.clone()))
            .collect()
    }

    /// Queue depth, active attempts, and sink counters.
    pub fn stats(&self) -> SchedulerStats {
        let counters = self.inner.stats.snapshot();
        let state = self.inner.state.lock();
        let queue_length = state
            .tasks
            .values()
            .filter(|entry| entry.task.status == TaskStatus::Queued)
            .count();
        SchedulerStats {
            avg_compute_ms: counters.avg_compute_ms(),
            counters,
            queue_length,
            active_tasks: state.running,
            tracked_tasks: state.tasks.len(),
        }
    }

    /// Recent re-verification outcomes from the stats sink, oldest first.
    pub fn verification_history(&self) -> Vec<VerificationRecord> {
        self.inner.stats.verification_history()
    }

    /// Stops dispatching new attempts. Running attempts continue.
    pub fn pause(&self) {
        self.inner.state.lock().paused = true;
        info!("dispatch paused");
    }

    /// Resumes dispatching.
    pub fn resume(&self) {
        self.inner.state.lock().paused = false;
        info!("dispatch resumed");
        self.inner.wakeup.notify_one();
    }

    /// Returns `true` while dispatch is paused.
    pub fn is_paused(&self) -> bool {
        self.inner.state.lock().paused
    }

    /// Re-derives the digest of a succeeded task and compares it with the
    /// stored proof.
    pub fn verify(&self, task_id: &str) -> Result<bool> {
        let task = self.status(task_id)?;
        let (Some(result), Some(proof)) = (&task.result, &task.proof) else {
            return Err(OrchestratorError::InvalidState {
                task_id: task_id.to_string(),
                status: task.status,
                operation: "verify",
            });
        };
        let valid = self.inner.engine.verify(task.kind, &task.args, result, proof);
        self.inner.stats.record(StatsEvent::Verified {
            kind: task.kind,
            digest: proof.digest,
            valid,
        });
        Ok(valid)
    }

    /// Hands a succeeded task's result to `bridge`.
    ///
    /// The stored proof is re-verified first; a mismatch fails with
    /// [`OrchestratorError::Verification`] without calling the bridge.
    /// Bridge errors are returned as-is and never retried here.
    pub async fn publish(&self, task_id: &str, bridge: &dyn BridgeAdapter) -> Result<TransactionRef> {
        let task = self.status(task_id)?;
        let (TaskStatus::Succeeded, Some(result), Some(proof)) =
            (task.status, &task.result, &task.proof)
        else {
            return Err(OrchestratorError::InvalidState {
                task_id: task_id.to_string(),
                status: task.status,
                operation: "publish",
            });
        };

        let valid = self.inner.engine.verify(task.kind, &task.args, result, proof);
        self.inner.stats.record(StatsEvent::Verified {
            kind: task.kind,
            digest: proof.digest,
            valid,
        });
        if !valid {
            error!(task_id = %task_id, "stored proof does not match result");
            return Err(OrchestratorError::Verification {
                task_id: task_id.to_string(),
            });
        }

        let request = BridgeRequest::new(task.kind, task.args.clone(), result, proof);
        match bridge.publish(&request).await {
            Ok(tx) => {
                self.inner.stats.record(StatsEvent::Published { accepted: true });
                info!(task_id = %task_id, kind = %task.kind, tx = %tx, "result published");
                Ok(tx)
            },
            Err(e) => {
                self.inner.stats.record(StatsEvent::Published { accepted: false });
                warn!(task_id = %task_id, kind = %task.kind, error = %e, "publish failed");
                Err(e.into())
            },
        }
    }

    /// Stops accepting work and waits for running attempts.
    ///
    /// Queued tasks and tasks waiting on a retry are cancelled. Attempts
    /// already running finish and record their outcome; a failure at that
    /// point is not retried. Later calls to [`submit`](Self::submit) fail
    /// with [`OrchestratorError::ShuttingDown`].
    pub async fn shutdown(&self) {
        let cancelled = {
            let mut guard = self.inner.state.lock();
            let state = &mut *guard;
            state.closed = true;
            let mut cancelled = Vec::new();
            for entry in state.tasks.values_mut() {
                if matches!(entry.task.status, TaskStatus::Queued | TaskStatus::Failed)
                    && entry.transition(TaskStatus::Cancelled, "cancel").is_ok()
                {
                    entry.task.error = None;
                    cancelled.push(entry.task.kind);
                }
            }
            state.queue.retain(|_| false);
            cancelled
        };
        for kind in &cancelled {
            self.inner.stats.record(StatsEvent::Cancelled { kind: *kind });
        }
        info!(cancelled = cancelled.len(), "scheduler shutting down");

        self.inner.shutdown.cancel();
        self.inner.tracker.close();
        self.inner.tracker.wait().await;
        info!("scheduler stopped");
    }
}

fn unknown_task(task_id: &str) -> OrchestratorError {
    OrchestratorError::UnknownTask {
        task_id: task_id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HandlerError;
    use crate::registry::{ComputationHandler, InputSchema, OutputSchema, ParamSpec, ParamType};
    use crate::types::result::{ComputationOutput, RiskFactors, RiskScoringOutput};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails the first `failures` calls, then succeeds.
    struct Flaky {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl ComputationHandler for Flaky {
        async fn compute(
            &self,
            _args: &TaskArgs,
        ) -> std::result::Result<ComputationOutput, HandlerError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(HandlerError::failed(format!("call {call} failed")));
            }
            Ok(ComputationOutput::RiskScoring(RiskScoringOutput {
                strategy_address: "0xabc".to_string(),
                risk_score: 0.1,
                risk_factors: RiskFactors {
                    base_risk: 0.1,
                    allocation_risk: 0.1,
                    diversity_risk: 0.1,
                },
            }))
        }
    }

    fn scheduler(failures: u32) -> Scheduler {
        let registry = Arc::new(ComputationRegistry::new());
        registry
            .register(
                ComputationKind::RiskScoring,
                Arc::new(Flaky {
                    failures,
                    calls: AtomicU32::new(0),
                }),
                InputSchema::new(vec![
                    ParamSpec::required("strategy_address", ParamType::Text),
                    ParamSpec::required("tokens", ParamType::StringList),
                    ParamSpec::required("current_allocation", ParamType::Number),
                    ParamSpec::required("max_allocation", ParamType::Number),
                    ParamSpec::required("base_risk_score", ParamType::Number),
                ]),
                OutputSchema::new(["risk_score"]),
            )
            .unwrap();
        let config = OrchestratorConfig {
            backoff_base_ms: 10,
            ..OrchestratorConfig::default()
        };
        Scheduler::builder(registry).config(config).build().unwrap()
    }

    fn args() -> Vec<String> {
        ["0xabc", "[]", "0.1", "0.4", "0.2"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn retries_until_success() {
        let scheduler = scheduler(2);
        let id = scheduler.submit("risk_scoring", args(), 0).unwrap();
        let task = scheduler.wait(id.as_str()).await.unwrap();
        assert_eq!(task.status, TaskStatus::Succeeded);
        assert_eq!(task.attempts, 3);
        assert!(task.error.is_none());
        assert!(task.proof.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_after_budget() {
        let scheduler = scheduler(10);
        let id = scheduler.submit("risk_scoring", args(), 0).unwrap();
        let task = scheduler.wait(id.as_str()).await.unwrap();
        assert_eq!(task.status, TaskStatus::Exhausted);
        assert_eq!(task.attempts, task.max_attempts);
        assert_eq!(task.error.as_deref(), Some("handler failed: call 2 failed"));
        assert!(task.result.is_none());
    }

    #[tokio::test]
    async fn rejected_submission_creates_no_task() {
        let scheduler = scheduler(0);
        let err = scheduler.submit("risk_scoring", vec!["0xabc".to_string()], 0).unwrap_err();
        assert_eq!(err.category(), "invalid_arguments");
        assert!(scheduler.list().is_empty());
    }

    #[tokio::test]
    async fn unknown_task_lookups_fail() {
        let scheduler = scheduler(0);
        assert_eq!(scheduler.status("nope").unwrap_err().category(), "unknown_task");
        assert_eq!(scheduler.cancel("nope").unwrap_err().category(), "unknown_task");
        assert!(scheduler.subscribe("nope").is_err());
    }
}
