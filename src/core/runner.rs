//! Concurrency-limited task runner with retries, timeouts, and lifecycle
//! events.
//!
//! The runner drains a strictly-FIFO queue while keeping the number of
//! in-flight operations at or below the configured concurrency — a soft cap on
//! simultaneously running futures, not OS threads. Each attempt races the
//! opaque operation against a per-task timeout; timeouts are transient
//! failures. Retries are fixed-delay and iterative (an explicit attempt
//! counter, never recursion). A cumulative terminal-error counter acts as a
//! circuit breaker: reaching `max_errors` aborts the run early with partial
//! counts.
//!
//! # Cancellation semantics
//!
//! `stop()` discards the queue and resets the active count immediately, but
//! operations already in flight keep running detached; their eventual outcome
//! is discarded via a run-generation check. Likewise, an attempt that loses
//! the timeout race keeps running in the background. Both are accepted,
//! documented resource-leak risks on a runtime without cooperative
//! cancellation of foreign futures.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::config::RunnerConfig;
use crate::core::error::EngineError;
use crate::core::notify::{build_notice, SharedNotifier};
use crate::core::task::{QueuedTask, TaskContext, TaskOp};
use crate::util::ids::TaskId;

/// Abstraction for spawning engine work on an async runtime.
pub trait Spawn {
    /// Spawn an async task that returns a future.
    fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static;
}

/// Scheduler status of a runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerStatus {
    /// Constructed, not yet started.
    Idle,
    /// Dispatching and draining the queue.
    Running,
    /// Dispatch withheld; in-flight tasks unaffected.
    Paused,
    /// Stopped by the caller; remaining queue discarded.
    Stopped,
    /// Circuit breaker tripped; run ended early with partial counts.
    Aborted,
    /// Queue drained and all tasks settled.
    Finished,
}

/// Lifecycle events emitted by the runner.
#[derive(Debug, Clone)]
pub enum RunnerEvent {
    /// The run began.
    Started,
    /// A task was dispatched for its first attempt.
    TaskStarted {
        /// Task identity.
        id: TaskId,
        /// 1-based attempt number.
        attempt: u32,
    },
    /// A failed attempt was scheduled for a fixed-delay re-attempt.
    TaskRetried {
        /// Task identity.
        id: TaskId,
        /// The attempt that just failed.
        attempt: u32,
        /// Failure description.
        reason: String,
    },
    /// A task settled successfully.
    TaskCompleted {
        /// Task identity.
        id: TaskId,
    },
    /// A task exhausted its retry budget and settled as failed.
    TaskFailed {
        /// Task identity.
        id: TaskId,
        /// Final failure description.
        reason: String,
    },
    /// Dispatch paused.
    Paused,
    /// Dispatch resumed.
    Resumed,
    /// The run was stopped and the remaining queue discarded.
    Stopped,
    /// The cumulative error limit was reached; the run aborts early.
    Fatal {
        /// Breaker description.
        reason: String,
    },
    /// The run ended. Fires exactly once per run, after every counted task
    /// settled (or immediately after a fatal abort, with partial counts).
    Ended {
        /// Tasks that completed successfully.
        completed: u64,
        /// Tasks that failed terminally.
        failed: u64,
    },
}

impl RunnerEvent {
    /// Wire name of the event as delivered to the notification sink.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Started => "start",
            Self::TaskStarted { .. } => "task:start",
            Self::TaskRetried { .. } => "task:retry",
            Self::TaskCompleted { .. } => "task:complete",
            Self::TaskFailed { .. } => "task:error",
            Self::Paused => "pause",
            Self::Resumed => "resume",
            Self::Stopped => "stop",
            Self::Fatal { .. } => "error",
            Self::Ended { .. } => "end",
        }
    }

    fn payload(&self) -> serde_json::Value {
        match self {
            Self::Started | Self::Paused | Self::Resumed | Self::Stopped => {
                serde_json::Value::Null
            }
            Self::TaskStarted { id, attempt } | Self::TaskRetried { id, attempt, .. } => {
                serde_json::json!({ "task": id, "attempt": attempt })
            }
            Self::TaskCompleted { id } => serde_json::json!({ "task": id }),
            Self::TaskFailed { id, reason } => {
                serde_json::json!({ "task": id, "reason": reason })
            }
            Self::Fatal { reason } => serde_json::json!({ "reason": reason }),
            Self::Ended { completed, failed } => {
                serde_json::json!({ "completed": completed, "failed": failed })
            }
        }
    }
}

/// Point-in-time queue and settlement counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunnerCounts {
    /// Tasks completed successfully this run.
    pub completed: u64,
    /// Tasks failed terminally this run.
    pub failed: u64,
    /// Tasks waiting in the queue.
    pub queued: usize,
    /// Tasks currently in flight.
    pub active: usize,
}

struct RunnerState {
    status: RunnerStatus,
    queue: VecDeque<QueuedTask>,
    active: usize,
    completed: u64,
    failed: u64,
    errors: u32,
    /// Bumped on `stop()` and on a fatal abort so detached in-flight outcomes
    /// from an ended run are discarded silently.
    generation: u64,
}

struct Inner<S> {
    cfg: RunnerConfig,
    state: Mutex<RunnerState>,
    events: broadcast::Sender<RunnerEvent>,
    notifier: Option<SharedNotifier>,
    spawner: S,
    next_id: AtomicU64,
}

impl<S> Inner<S> {
    fn emit(&self, event: RunnerEvent) {
        debug!(event = event.name(), "runner event");
        if let Some(notifier) = &self.notifier {
            notifier.lock().notify(build_notice(event.name(), event.payload()));
        }
        // No receivers is fine; the broadcast stream is best-effort.
        let _ = self.events.send(event);
    }
}

enum Settled {
    Completed { id: TaskId },
    Failed { id: TaskId, reason: String },
}

/// Concurrency-limited, retrying, timeout-enforcing task executor.
pub struct TaskRunner<S> {
    inner: Arc<Inner<S>>,
}

impl<S> Clone for TaskRunner<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S> TaskRunner<S>
where
    S: Spawn + Send + Sync + 'static,
{
    /// Create a runner from configuration and a spawner.
    pub fn new(cfg: RunnerConfig, spawner: S) -> Self {
        let (events, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(Inner {
                cfg,
                state: Mutex::new(RunnerState {
                    status: RunnerStatus::Idle,
                    queue: VecDeque::new(),
                    active: 0,
                    completed: 0,
                    failed: 0,
                    errors: 0,
                    generation: 0,
                }),
                events,
                notifier: None,
                spawner,
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Attach a fire-and-forget notification sink. Must be called before the
    /// runner handle is cloned or shared.
    #[must_use]
    pub fn with_notifier(mut self, notifier: SharedNotifier) -> Self {
        match Arc::get_mut(&mut self.inner) {
            Some(inner) => inner.notifier = Some(notifier),
            None => warn!("with_notifier called on a shared runner; sink ignored"),
        }
        self
    }

    /// Subscribe to the lifecycle event stream.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<RunnerEvent> {
        self.inner.events.subscribe()
    }

    /// Current scheduler status.
    #[must_use]
    pub fn status(&self) -> RunnerStatus {
        self.inner.state.lock().status
    }

    /// Current queue and settlement counters.
    #[must_use]
    pub fn counts(&self) -> RunnerCounts {
        let st = self.inner.state.lock();
        RunnerCounts {
            completed: st.completed,
            failed: st.failed,
            queued: st.queue.len(),
            active: st.active,
        }
    }

    /// Append operations to the queue (FIFO), returning their assigned ids.
    /// Dispatch begins immediately when the runner is already running.
    pub fn add_tasks<I>(&self, ops: I) -> Vec<TaskId>
    where
        I: IntoIterator<Item = Arc<dyn TaskOp>>,
    {
        let mut ids = Vec::new();
        {
            let mut st = self.inner.state.lock();
            for op in ops {
                let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
                st.queue.push_back(QueuedTask::new(id, op));
                ids.push(id);
            }
        }
        if self.status() == RunnerStatus::Running {
            Self::pump(&self.inner);
        }
        ids
    }

    /// Begin (or restart) a run. No-op while running or paused.
    pub fn start(&self) {
        {
            let mut st = self.inner.state.lock();
            if matches!(st.status, RunnerStatus::Running | RunnerStatus::Paused) {
                return;
            }
            st.status = RunnerStatus::Running;
            st.completed = 0;
            st.failed = 0;
            st.errors = 0;
        }
        self.inner.emit(RunnerEvent::Started);
        Self::pump(&self.inner);
    }

    /// Withhold new dispatch. In-flight tasks are unaffected.
    pub fn pause(&self) {
        {
            let mut st = self.inner.state.lock();
            if st.status != RunnerStatus::Running {
                return;
            }
            st.status = RunnerStatus::Paused;
        }
        self.inner.emit(RunnerEvent::Paused);
    }

    /// Continue draining the queue in its original FIFO order.
    pub fn resume(&self) {
        {
            let mut st = self.inner.state.lock();
            if st.status != RunnerStatus::Paused {
                return;
            }
            st.status = RunnerStatus::Running;
        }
        self.inner.emit(RunnerEvent::Resumed);
        Self::pump(&self.inner);
    }

    /// Discard the remaining queue and end the run immediately (best effort —
    /// operations already in flight keep running detached and their outcomes
    /// are discarded). No end event follows a stop.
    pub fn stop(&self) {
        {
            let mut st = self.inner.state.lock();
            if !matches!(st.status, RunnerStatus::Running | RunnerStatus::Paused) {
                return;
            }
            st.status = RunnerStatus::Stopped;
            st.queue.clear();
            st.active = 0;
            st.generation += 1;
        }
        self.inner.emit(RunnerEvent::Stopped);
    }

    /// Dispatch queued tasks while capacity allows and the runner is running.
    fn pump(inner: &Arc<Inner<S>>) {
        loop {
            let (task, generation) = {
                let mut st = inner.state.lock();
                if st.status != RunnerStatus::Running || st.active >= inner.cfg.concurrency {
                    return;
                }
                let Some(task) = st.queue.pop_front() else {
                    let ended = Self::finish_locked(&mut st);
                    drop(st);
                    if let Some(event) = ended {
                        inner.emit(event);
                    }
                    return;
                };
                st.active += 1;
                (task, st.generation)
            };

            let worker = Arc::clone(inner);
            inner
                .spawner
                .spawn(async move { Self::run_task(worker, task, generation).await });

            // Space out dispatches when an inter-task delay is configured.
            if !inner.cfg.task_delay.is_zero() {
                let delayed = Arc::clone(inner);
                inner.spawner.spawn(async move {
                    tokio::time::sleep(delayed.cfg.task_delay).await;
                    Self::pump(&delayed);
                });
                return;
            }
        }
    }

    /// Transition to finished when the queue is drained and nothing is in
    /// flight. Caller emits the returned event after releasing the lock.
    fn finish_locked(st: &mut RunnerState) -> Option<RunnerEvent> {
        if st.status == RunnerStatus::Running && st.active == 0 && st.queue.is_empty() {
            st.status = RunnerStatus::Finished;
            Some(RunnerEvent::Ended {
                completed: st.completed,
                failed: st.failed,
            })
        } else {
            None
        }
    }

    fn still_current(inner: &Arc<Inner<S>>, generation: u64) -> bool {
        inner.state.lock().generation == generation
    }

    /// Drive one task through its attempts. Iterative by construction: the
    /// attempt counter bounds the loop, so heavy retry budgets cannot grow the
    /// call stack.
    async fn run_task(inner: Arc<Inner<S>>, mut task: QueuedTask, generation: u64) {
        loop {
            task.attempts += 1;
            let attempt = task.attempts;
            if !Self::still_current(&inner, generation) {
                return;
            }
            if attempt == 1 {
                inner.emit(RunnerEvent::TaskStarted { id: task.id, attempt });
            }

            let ctx = TaskContext {
                task_id: task.id,
                attempt,
            };
            let outcome =
                match tokio::time::timeout(inner.cfg.task_timeout, task.op.execute(&ctx)).await {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(err)) => Err(err),
                    // The losing operation keeps running detached; see the
                    // module docs on cancellation semantics.
                    Err(_) => Err(EngineError::Timeout(inner.cfg.task_timeout)),
                };

            if !Self::still_current(&inner, generation) {
                return;
            }

            match outcome {
                Ok(()) => {
                    Self::settle(&inner, generation, Settled::Completed { id: task.id });
                    return;
                }
                Err(err) if attempt < inner.cfg.retries => {
                    debug!(task = task.id, attempt, error = %err, "retrying task");
                    inner.emit(RunnerEvent::TaskRetried {
                        id: task.id,
                        attempt,
                        reason: err.to_string(),
                    });
                    tokio::time::sleep(inner.cfg.task_delay).await;
                }
                Err(err) => {
                    warn!(task = task.id, attempt, error = %err, "task failed terminally");
                    Self::settle(
                        &inner,
                        generation,
                        Settled::Failed {
                            id: task.id,
                            reason: err.to_string(),
                        },
                    );
                    return;
                }
            }
        }
    }

    /// Account for a settled task, trip the breaker when due, and keep the
    /// queue draining.
    fn settle(inner: &Arc<Inner<S>>, generation: u64, outcome: Settled) {
        let mut events = Vec::new();
        {
            let mut st = inner.state.lock();
            if st.generation != generation {
                return;
            }
            st.active = st.active.saturating_sub(1);
            match outcome {
                Settled::Completed { id } => {
                    st.completed += 1;
                    events.push(RunnerEvent::TaskCompleted { id });
                }
                Settled::Failed { id, reason } => {
                    st.failed += 1;
                    st.errors += 1;
                    events.push(RunnerEvent::TaskFailed { id, reason });
                    if st.errors >= inner.cfg.max_errors
                        && matches!(st.status, RunnerStatus::Running | RunnerStatus::Paused)
                    {
                        let fatal = EngineError::FatalRunner { failed: st.errors };
                        st.status = RunnerStatus::Aborted;
                        st.queue.clear();
                        st.generation += 1;
                        events.push(RunnerEvent::Fatal {
                            reason: fatal.to_string(),
                        });
                        events.push(RunnerEvent::Ended {
                            completed: st.completed,
                            failed: st.failed,
                        });
                    }
                }
            }
            if let Some(event) = Self::finish_locked(&mut st) {
                events.push(event);
            }
        }
        for event in events {
            inner.emit(event);
        }
        Self::pump(inner);
    }
}
