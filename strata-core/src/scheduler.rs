//! Incremental, parallel execution of a [`TaskGraph`].
//!
//! A fixed pool of worker threads drains one shared ready queue. All
//! bookkeeping (statuses, remaining predecessor counts, the queue, the
//! in-flight count and the halt flag) sits behind a single mutex; workers
//! only hold it to pick up work and to apply a completion, never while
//! hashing inputs or running a command.
//!
//! Before running a task the worker fingerprints it from its current inputs
//! and the fingerprints its predecessors produced in this run. If the
//! fingerprint store already holds that fingerprint the task is skipped, and
//! its fingerprint flows to dependents exactly as if it had run.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam::channel::Sender;
use petgraph::graph::NodeIndex;
use petgraph::Direction;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::executor::ExecutorRegistry;
use crate::fingerprint::{Fingerprint, FingerprintStore};
use crate::package::TaskId;
use crate::task_graph::{TaskGraph, TaskNode};

/// Lifecycle of a task within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    /// Up to date; the command was not run.
    Skipped,
    Succeeded,
    Failed,
    /// A transitive predecessor failed.
    Blocked,
    /// Never started because the run was halted.
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Skipped => "skipped",
            TaskStatus::Succeeded => "succeeded",
            TaskStatus::Failed => "failed",
            TaskStatus::Blocked => "blocked",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskStatus::Pending | TaskStatus::Running)
    }

    /// Succeeded or skipped: dependents may proceed.
    pub fn is_ok(&self) -> bool {
        matches!(self, TaskStatus::Succeeded | TaskStatus::Skipped)
    }
}

/// Progress notifications published while a run is in progress.
#[derive(Debug, Clone)]
pub enum TaskEvent {
    Started {
        id: TaskId,
    },
    Finished {
        id: TaskId,
        status: TaskStatus,
        duration: Duration,
    },
}

/// Final state of one task.
#[derive(Debug, Clone, Serialize)]
pub struct TaskReport {
    pub id: TaskId,
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<Fingerprint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// The failed task that blocked this one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocked_by: Option<TaskId>,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub stdout: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub stderr: String,
}

/// Counts of final statuses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub total: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub blocked: usize,
    pub cancelled: usize,
}

/// Outcome of [`Scheduler::run`].
#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    /// Every task, in topological order.
    pub tasks: Vec<TaskReport>,
    pub duration_ms: u64,
}

impl RunResult {
    pub fn summary(&self) -> RunSummary {
        let mut summary = RunSummary {
            total: self.tasks.len(),
            ..RunSummary::default()
        };
        for task in &self.tasks {
            match task.status {
                TaskStatus::Succeeded => summary.succeeded += 1,
                TaskStatus::Skipped => summary.skipped += 1,
                TaskStatus::Failed => summary.failed += 1,
                TaskStatus::Blocked => summary.blocked += 1,
                TaskStatus::Pending | TaskStatus::Running | TaskStatus::Cancelled => {
                    summary.cancelled += 1
                }
            }
        }
        summary
    }

    /// True iff every task succeeded or was skipped.
    pub fn is_success(&self) -> bool {
        self.tasks.iter().all(|t| t.status.is_ok())
    }

    /// Failed, blocked and cancelled tasks.
    pub fn failures(&self) -> impl Iterator<Item = &TaskReport> + '_ {
        self.tasks.iter().filter(|t| !t.status.is_ok())
    }

    pub fn get(&self, id: &TaskId) -> Option<&TaskReport> {
        self.tasks.iter().find(|t| &t.id == id)
    }

    pub fn status_of(&self, id: &TaskId) -> Option<TaskStatus> {
        self.get(id).map(|t| t.status)
    }
}

#[derive(Debug, Default, Clone)]
struct NodeDetail {
    error: Option<String>,
    blocked_by: Option<TaskId>,
    duration: Duration,
    stdout: String,
    stderr: String,
}

struct RunState {
    status: Vec<TaskStatus>,
    remaining: Vec<usize>,
    fingerprints: Vec<Option<Fingerprint>>,
    details: Vec<NodeDetail>,
    ready: VecDeque<NodeIndex>,
    in_flight: usize,
    halted: bool,
}

enum Outcome {
    Skipped(Fingerprint),
    Succeeded {
        fingerprint: Fingerprint,
        stdout: String,
        stderr: String,
    },
    Failed {
        error: String,
        stdout: String,
        stderr: String,
    },
    Cancelled,
}

/// Runs task graphs against a fingerprint store and an executor registry.
pub struct Scheduler<'a> {
    store: &'a FingerprintStore,
    registry: &'a ExecutorRegistry,
    concurrency: usize,
    stop_on_failure: bool,
    events: Option<Sender<TaskEvent>>,
    cancel: Option<Arc<AtomicBool>>,
}

impl<'a> Scheduler<'a> {
    pub fn new(
        store: &'a FingerprintStore,
        registry: &'a ExecutorRegistry,
        concurrency: usize,
        stop_on_failure: bool,
    ) -> Self {
        Self {
            store,
            registry,
            concurrency: concurrency.max(1),
            stop_on_failure,
            events: None,
            cancel: None,
        }
    }

    /// Publishes [`TaskEvent`]s on `sender` during the run.
    pub fn with_events(mut self, sender: Sender<TaskEvent>) -> Self {
        self.events = Some(sender);
        self
    }

    /// Halts the run, as on a failure with stop-on-failure, once `flag` is set.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Runs every task of `graph` to a terminal status.
    ///
    /// Task failures are recorded in the result; `Err` is only returned when
    /// the scheduler itself cannot proceed.
    pub fn run(&self, graph: &TaskGraph) -> Result<RunResult> {
        let started = Instant::now();
        let inner = graph.inner();
        let count = inner.node_count();

        let remaining: Vec<usize> = inner
            .node_indices()
            .map(|i| inner.neighbors_directed(i, Direction::Outgoing).count())
            .collect();
        let ready: VecDeque<NodeIndex> = graph
            .order_indices()
            .iter()
            .copied()
            .filter(|i| remaining[i.index()] == 0)
            .collect();

        let shared = (
            Mutex::new(RunState {
                status: vec![TaskStatus::Pending; count],
                remaining,
                fingerprints: vec![None; count],
                details: vec![NodeDetail::default(); count],
                ready,
                in_flight: 0,
                halted: false,
            }),
            Condvar::new(),
        );

        let workers = self.concurrency.min(count).max(1);
        info!(tasks = count, workers, "starting run");

        thread::scope(|scope| -> Result<()> {
            let mut handles = Vec::with_capacity(workers);
            for i in 0..workers {
                let shared = &shared;
                let handle = thread::Builder::new()
                    .name(format!("strata-worker-{}", i))
                    .spawn_scoped(scope, move || self.worker(graph, shared))?;
                handles.push(handle);
            }
            for handle in handles {
                match handle.join() {
                    Ok(result) => result?,
                    Err(panic) => std::panic::resume_unwind(panic),
                }
            }
            Ok(())
        })?;

        let mut state = shared
            .0
            .into_inner()
            .map_err(|e| Error::MutexLock(e.to_string()))?;

        let tasks = graph
            .order_indices()
            .iter()
            .map(|&i| {
                let idx = i.index();
                let mut status = state.status[idx];
                if !status.is_terminal() {
                    status = TaskStatus::Cancelled;
                }
                let detail = std::mem::take(&mut state.details[idx]);
                TaskReport {
                    id: inner[i].id.clone(),
                    status,
                    fingerprint: if status.is_ok() {
                        state.fingerprints[idx].take()
                    } else {
                        None
                    },
                    error: detail.error,
                    blocked_by: detail.blocked_by,
                    duration_ms: detail.duration.as_millis() as u64,
                    stdout: detail.stdout,
                    stderr: detail.stderr,
                }
            })
            .collect();

        let result = RunResult {
            tasks,
            duration_ms: started.elapsed().as_millis() as u64,
        };
        let summary = result.summary();
        info!(
            succeeded = summary.succeeded,
            skipped = summary.skipped,
            failed = summary.failed,
            blocked = summary.blocked,
            cancelled = summary.cancelled,
            "run finished"
        );
        Ok(result)
    }

    fn lock<'s>(&self, mutex: &'s Mutex<RunState>) -> Result<MutexGuard<'s, RunState>> {
        mutex.lock().map_err(|e| Error::MutexLock(e.to_string()))
    }

    fn cancel_requested(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }

    fn emit(&self, event: TaskEvent) {
        if let Some(sender) = &self.events {
            let _ = sender.send(event);
        }
    }

    fn worker(&self, graph: &TaskGraph, shared: &(Mutex<RunState>, Condvar)) -> Result<()> {
        let (mutex, condvar) = shared;
        let inner = graph.inner();

        loop {
            let mut state = self.lock(mutex)?;
            let next = loop {
                if !state.halted && self.cancel_requested() {
                    info!("run cancelled");
                    state.halted = true;
                }
                if state.halted {
                    while let Some(node) = state.ready.pop_front() {
                        state.status[node.index()] = TaskStatus::Cancelled;
                        self.emit(TaskEvent::Finished {
                            id: inner[node].id.clone(),
                            status: TaskStatus::Cancelled,
                            duration: Duration::ZERO,
                        });
                    }
                }
                if let Some(node) = state.ready.pop_front() {
                    break Some(node);
                }
                if state.in_flight == 0 {
                    break None;
                }
                state = condvar
                    .wait(state)
                    .map_err(|e| Error::MutexLock(e.to_string()))?;
            };

            let Some(node) = next else {
                condvar.notify_all();
                return Ok(());
            };

            state.status[node.index()] = TaskStatus::Running;
            state.in_flight += 1;
            let upstream: BTreeMap<TaskId, Fingerprint> = inner
                .neighbors_directed(node, Direction::Outgoing)
                .filter_map(|pred| {
                    state.fingerprints[pred.index()]
                        .clone()
                        .map(|fp| (inner[pred].id.clone(), fp))
                })
                .collect();
            drop(state);

            let task = &inner[node];
            self.emit(TaskEvent::Started {
                id: task.id.clone(),
            });
            let started = Instant::now();
            let outcome = self.process(task, &upstream, mutex)?;
            let duration = started.elapsed();

            let mut state = self.lock(mutex)?;
            state.in_flight -= 1;
            self.complete(graph, &mut state, node, outcome, duration);
            drop(state);
            condvar.notify_all();
        }
    }

    fn process(
        &self,
        node: &TaskNode,
        upstream: &BTreeMap<TaskId, Fingerprint>,
        mutex: &Mutex<RunState>,
    ) -> Result<Outcome> {
        let fingerprint = match self.store.fingerprint_of(node, upstream) {
            Ok(fingerprint) => fingerprint,
            Err(e) => {
                return Ok(Outcome::Failed {
                    error: e.to_string(),
                    stdout: String::new(),
                    stderr: String::new(),
                })
            }
        };

        match self.store.is_up_to_date(node, &fingerprint) {
            Ok(true) => {
                debug!(task = %node.id, "up to date, skipping");
                return Ok(Outcome::Skipped(fingerprint));
            }
            Ok(false) => {}
            Err(e) => warn!(
                task = %node.id,
                error = %e,
                "could not read fingerprint record, treating as changed"
            ),
        }

        if self.lock(mutex)?.halted || self.cancel_requested() {
            return Ok(Outcome::Cancelled);
        }

        let Some(executor) = self.registry.get(&node.runner) else {
            return Ok(Outcome::Failed {
                error: format!("No executor registered for runner '{}'", node.runner),
                stdout: String::new(),
                stderr: String::new(),
            });
        };

        debug!(task = %node.id, runner = %node.runner, "dispatching");
        let output = match executor.execute(node) {
            Ok(output) => output,
            Err(e) => {
                return Ok(Outcome::Failed {
                    error: e.to_string(),
                    stdout: String::new(),
                    stderr: String::new(),
                })
            }
        };

        if !output.success {
            let error = Error::TaskExecution {
                package: node.id.package.clone(),
                task: node.id.task.clone(),
                message: "command exited with a failure status".to_string(),
            };
            return Ok(Outcome::Failed {
                error: error.to_string(),
                stdout: output.stdout,
                stderr: output.stderr,
            });
        }

        if let Err(e) = self.store.record(node, &fingerprint) {
            return Ok(Outcome::Failed {
                error: e.to_string(),
                stdout: output.stdout,
                stderr: output.stderr,
            });
        }

        Ok(Outcome::Succeeded {
            fingerprint,
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }

    fn complete(
        &self,
        graph: &TaskGraph,
        state: &mut RunState,
        node: NodeIndex,
        outcome: Outcome,
        duration: Duration,
    ) {
        let inner = graph.inner();
        let idx = node.index();
        state.details[idx].duration = duration;

        let status = match outcome {
            Outcome::Skipped(fingerprint) => {
                state.fingerprints[idx] = Some(fingerprint);
                TaskStatus::Skipped
            }
            Outcome::Succeeded {
                fingerprint,
                stdout,
                stderr,
            } => {
                state.fingerprints[idx] = Some(fingerprint);
                state.details[idx].stdout = stdout;
                state.details[idx].stderr = stderr;
                TaskStatus::Succeeded
            }
            Outcome::Failed {
                error,
                stdout,
                stderr,
            } => {
                warn!(task = %inner[node].id, error = %error, "task failed");
                state.details[idx].error = Some(error);
                state.details[idx].stdout = stdout;
                state.details[idx].stderr = stderr;
                TaskStatus::Failed
            }
            Outcome::Cancelled => TaskStatus::Cancelled,
        };
        state.status[idx] = status;
        self.emit(TaskEvent::Finished {
            id: inner[node].id.clone(),
            status,
            duration,
        });

        match status {
            TaskStatus::Succeeded | TaskStatus::Skipped => {
                for dependent in inner.neighbors_directed(node, Direction::Incoming) {
                    let d = dependent.index();
                    state.remaining[d] = state.remaining[d].saturating_sub(1);
                    if state.remaining[d] == 0 && state.status[d] == TaskStatus::Pending {
                        state.ready.push_back(dependent);
                    }
                }
            }
            TaskStatus::Failed => {
                self.block_dependents(graph, state, node);
                if self.stop_on_failure && !state.halted {
                    info!(task = %inner[node].id, "stopping after failure");
                    state.halted = true;
                }
            }
            _ => {}
        }
    }

    fn block_dependents(&self, graph: &TaskGraph, state: &mut RunState, failed: NodeIndex) {
        let inner = graph.inner();
        let failed_id = &inner[failed].id;
        let mut stack = vec![failed];

        while let Some(current) = stack.pop() {
            for dependent in inner.neighbors_directed(current, Direction::Incoming) {
                let d = dependent.index();
                if state.status[d] != TaskStatus::Pending {
                    continue;
                }
                state.status[d] = TaskStatus::Blocked;
                state.details[d].blocked_by = Some(failed_id.clone());
                debug!(task = %inner[dependent].id, blocked_by = %failed_id, "blocked");
                self.emit(TaskEvent::Finished {
                    id: inner[dependent].id.clone(),
                    status: TaskStatus::Blocked,
                    duration: Duration::ZERO,
                });
                stack.push(dependent);
            }
        }
    }
}
