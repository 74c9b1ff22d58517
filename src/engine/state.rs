use crate::config::EngineConfig;
use crate::engine::executor::Dispatch;
use crate::engine::report::{
    CategoryUtilization, FailedTask, ProgressSnapshot, RunReport, RunningTask, TaskDisposition,
    TaskReport,
};
use crate::task::{FailureReason, Task, TaskId, TaskQueue, TaskState, is_ready};
use crate::worker::CategoryRegistry;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::time::Instant;
use tracing::warn;
use uuid::Uuid;

/// Per-category slot accounting. `0 <= active <= max_concurrent` always.
#[derive(Debug, Clone)]
pub(crate) struct CategorySlots {
    pub max_concurrent: usize,
    pub active: usize,
}

impl CategorySlots {
    fn has_capacity(&self) -> bool {
        self.active < self.max_concurrent
    }
}

/// The single owner of all mutable state for one run.
///
/// Every mutation goes through methods on this struct, under one lock held
/// by the scheduler loop; the progress reporter only ever takes a
/// [`ProgressSnapshot`] under the same lock, so it observes a consistent
/// view rather than a field-by-field race.
pub(crate) struct RunState {
    pub run_id: Uuid,
    tasks: HashMap<TaskId, Task>,
    /// Batch order, for deterministic report enumeration.
    order: Vec<TaskId>,
    queue: TaskQueue,
    /// Enqueue sequence per task, preserved across retries.
    seqs: HashMap<TaskId, u64>,
    /// Earliest redispatch time for tasks waiting out a retry backoff.
    not_before: HashMap<TaskId, Instant>,
    running: HashSet<TaskId>,
    completed: HashSet<TaskId>,
    failed: HashSet<TaskId>,
    slots: HashMap<String, CategorySlots>,
    started_at: DateTime<Utc>,
    pub shutdown_requested: bool,
}

impl RunState {
    pub fn new(batch: Vec<Task>, registry: &CategoryRegistry) -> Self {
        let mut tasks = HashMap::new();
        let mut order = Vec::with_capacity(batch.len());
        let mut queue = TaskQueue::new();
        let mut seqs = HashMap::new();

        for task in batch {
            let id = task.id().clone();
            let seq = queue.enqueue(id.clone(), task.spec.priority);
            seqs.insert(id.clone(), seq);
            order.push(id.clone());
            tasks.insert(id, task);
        }

        let slots = registry
            .iter()
            .map(|category| {
                (
                    category.name.clone(),
                    CategorySlots {
                        max_concurrent: category.max_concurrent,
                        active: 0,
                    },
                )
            })
            .collect();

        Self {
            run_id: Uuid::new_v4(),
            tasks,
            order,
            queue,
            seqs,
            not_before: HashMap::new(),
            running: HashSet::new(),
            completed: HashSet::new(),
            failed: HashSet::new(),
            slots,
            started_at: Utc::now(),
            shutdown_requested: false,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.queue.is_empty() && self.running.is_empty()
    }

    pub fn has_running(&self) -> bool {
        !self.running.is_empty()
    }

    pub fn queue_is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Highest-priority queued task that is dependency-satisfied, past its
    /// backoff gate, and whose category has spare capacity. Does not remove.
    pub fn next_ready(&self, now: Instant) -> Option<TaskId> {
        for entry in self.queue.iter() {
            if let Some(gate) = self.not_before.get(&entry.id) {
                if *gate > now {
                    continue;
                }
            }
            let task = match self.tasks.get(&entry.id) {
                Some(task) => task,
                None => continue,
            };
            if !is_ready(task, &self.completed) {
                continue;
            }
            match self.slots.get(&task.spec.category) {
                Some(slots) if slots.has_capacity() => return Some(entry.id.clone()),
                _ => continue,
            }
        }
        None
    }

    /// Remove a task from the queue and hand it to the executor.
    ///
    /// The slot is taken at the moment of dispatch, not at actual start,
    /// so two scheduling passes cannot over-subscribe a category.
    pub fn dispatch(&mut self, id: &TaskId, config: &EngineConfig) -> Option<Dispatch> {
        self.queue.remove(id)?;
        self.not_before.remove(id);

        let task = self.tasks.get_mut(id)?;
        task.state = TaskState::Running;
        task.attempts += 1;
        task.started_at = Some(Utc::now());

        let timeout = task
            .spec
            .timeout_secs
            .map(std::time::Duration::from_secs)
            .or_else(|| config.default_timeout());

        let dispatch = Dispatch {
            id: id.clone(),
            name: task.spec.name.clone(),
            category: task.spec.category.clone(),
            attempt: task.attempts,
            action: task.action.clone(),
            timeout,
        };

        if let Some(slots) = self.slots.get_mut(&task.spec.category) {
            slots.active += 1;
            debug_assert!(slots.active <= slots.max_concurrent);
        }
        self.running.insert(id.clone());

        Some(dispatch)
    }

    /// Free the category slot taken at dispatch. Called exactly once per
    /// dispatched task, when its outcome message arrives.
    pub fn release_slot(&mut self, id: &TaskId) {
        self.running.remove(id);
        if let Some(task) = self.tasks.get(id) {
            if let Some(slots) = self.slots.get_mut(&task.spec.category) {
                if slots.active == 0 {
                    warn!(task = %id, "slot release with no active count");
                } else {
                    slots.active -= 1;
                }
            }
        }
    }

    pub fn attempts(&self, id: &TaskId) -> u32 {
        self.tasks.get(id).map(|task| task.attempts).unwrap_or(0)
    }

    /// Whether the task still has attempt budget left after its last try.
    pub fn retry_allowed(&self, id: &TaskId, default_max_attempts: u32) -> bool {
        self.tasks
            .get(id)
            .map(|task| task.attempts < task.max_attempts_or(default_max_attempts))
            .unwrap_or(false)
    }

    pub fn complete(&mut self, id: &TaskId, finished_at: DateTime<Utc>, log: Vec<String>) {
        if let Some(task) = self.tasks.get_mut(id) {
            task.state = TaskState::Completed;
            task.finished_at = Some(finished_at);
            task.log.extend(log);
        }
        self.completed.insert(id.clone());
    }

    /// Put a failed task back in the queue with a backoff gate, keeping
    /// its original priority and tie-break position.
    pub fn schedule_retry(&mut self, id: &TaskId, resume_at: Instant) {
        let (priority, seq) = match (self.tasks.get_mut(id), self.seqs.get(id)) {
            (Some(task), Some(seq)) => {
                task.state = TaskState::Queued;
                (task.spec.priority, *seq)
            }
            _ => return,
        };
        self.queue.requeue(id.clone(), priority, seq);
        self.not_before.insert(id.clone(), resume_at);
    }

    pub fn fail_terminal(
        &mut self,
        id: &TaskId,
        reason: FailureReason,
        finished_at: Option<DateTime<Utc>>,
    ) {
        self.queue.remove(id);
        self.not_before.remove(id);
        if let Some(task) = self.tasks.get_mut(id) {
            task.state = TaskState::Failed { reason };
            if task.finished_at.is_none() {
                task.finished_at = finished_at;
            }
        }
        self.failed.insert(id.clone());
    }

    /// Fail every queued task rendered permanently unready by a terminal
    /// failure, transitively. Returns the (task, failed dependency) pairs.
    pub fn cascade_failures(&mut self) -> Vec<(TaskId, TaskId)> {
        let mut cascaded = Vec::new();
        loop {
            let blocked: Vec<(TaskId, TaskId)> = self
                .queue
                .iter()
                .filter_map(|entry| {
                    let task = self.tasks.get(&entry.id)?;
                    let dep = task
                        .spec
                        .dependencies
                        .iter()
                        .find(|dep| self.failed.contains(dep))?;
                    Some((entry.id.clone(), dep.clone()))
                })
                .collect();

            if blocked.is_empty() {
                break;
            }
            for (id, dep) in blocked {
                self.fail_terminal(&id, FailureReason::BlockedByDependency(dep.clone()), None);
                cascaded.push((id, dep));
            }
        }
        cascaded
    }

    /// Queued tasks still waiting out a retry backoff gate.
    pub fn has_backoff_waiters(&self, now: Instant) -> bool {
        self.queue
            .iter()
            .any(|entry| matches!(self.not_before.get(&entry.id), Some(gate) if *gate > now))
    }

    /// Remaining queued task ids, in dispatch order.
    pub fn queued_ids(&self) -> Vec<TaskId> {
        self.queue.iter().map(|entry| entry.id.clone()).collect()
    }

    /// Mark every still-queued task as cancelled (graceful shutdown).
    pub fn cancel_pending(&mut self) {
        for id in self.queued_ids() {
            self.fail_terminal(&id, FailureReason::Cancelled, None);
        }
    }

    /// A consistent read-only view for the progress reporter.
    pub fn snapshot(&self) -> ProgressSnapshot {
        let now = Utc::now();

        let mut running: Vec<RunningTask> = self
            .running
            .iter()
            .filter_map(|id| {
                let task = self.tasks.get(id)?;
                let runtime_secs = task
                    .started_at
                    .map(|started| now.signed_duration_since(started).num_seconds())
                    .unwrap_or(0);
                Some(RunningTask {
                    id: id.clone(),
                    name: task.spec.name.clone(),
                    category: task.spec.category.clone(),
                    runtime_secs,
                })
            })
            .collect();
        running.sort_by(|a, b| a.id.cmp(&b.id));

        let mut categories: Vec<CategoryUtilization> = self
            .slots
            .iter()
            .map(|(name, slots)| CategoryUtilization {
                name: name.clone(),
                active: slots.active,
                max_concurrent: slots.max_concurrent,
            })
            .collect();
        categories.sort_by(|a, b| a.name.cmp(&b.name));

        let estimates: Vec<u64> = self
            .queue
            .iter()
            .filter_map(|entry| self.tasks.get(&entry.id))
            .filter_map(|task| task.spec.estimated_duration_secs)
            .collect();

        ProgressSnapshot {
            run_id: self.run_id,
            elapsed_secs: now.signed_duration_since(self.started_at).num_seconds(),
            queued: self.queue.len(),
            running,
            categories,
            completed: self.completed.len(),
            failed: self.failed.len(),
            next_queued: self
                .queue
                .iter()
                .take(3)
                .map(|entry| entry.id.clone())
                .collect(),
            estimated_remaining_secs: if estimates.is_empty() {
                None
            } else {
                Some(estimates.iter().sum())
            },
        }
    }

    /// Final summary enumerating every task's terminal state.
    pub fn build_report(&self) -> RunReport {
        let finished_at = Utc::now();
        let mut tasks = Vec::with_capacity(self.order.len());
        let mut completed = Vec::new();
        let mut failed = Vec::new();
        let mut cancelled = Vec::new();

        for id in &self.order {
            let task = match self.tasks.get(id) {
                Some(task) => task,
                None => continue,
            };
            let disposition = match &task.state {
                TaskState::Completed => {
                    completed.push(id.clone());
                    TaskDisposition::Completed
                }
                TaskState::Failed {
                    reason: FailureReason::Cancelled,
                } => {
                    cancelled.push(id.clone());
                    TaskDisposition::Cancelled
                }
                TaskState::Failed { reason } => {
                    failed.push(FailedTask {
                        id: id.clone(),
                        reason: reason.to_string(),
                    });
                    TaskDisposition::Failed {
                        reason: reason.to_string(),
                    }
                }
                // Queued/Running at report time only happens on an aborted
                // run; report them as cancelled rather than dropping them.
                TaskState::Queued | TaskState::Running => {
                    cancelled.push(id.clone());
                    TaskDisposition::Cancelled
                }
            };

            tasks.push(TaskReport {
                id: id.clone(),
                name: task.spec.name.clone(),
                category: task.spec.category.clone(),
                disposition,
                attempts: task.attempts,
                started_at: task.started_at,
                finished_at: task.finished_at,
                duration_secs: task.duration_secs(),
                log: task.log.clone(),
            });
        }

        let finished = completed.len() + failed.len();
        let success_rate = if finished > 0 {
            completed.len() as f64 / finished as f64
        } else {
            0.0
        };

        RunReport {
            run_id: self.run_id,
            started_at: self.started_at,
            finished_at,
            total_duration_secs: finished_at
                .signed_duration_since(self.started_at)
                .num_milliseconds() as f64
                / 1000.0,
            tasks,
            completed,
            failed,
            cancelled,
            success_rate,
        }
    }
}
