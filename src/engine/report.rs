use crate::engine::state::RunState;
use crate::task::TaskId;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tracing::info;
use uuid::Uuid;

/// Utilization of one worker category at snapshot time.
#[derive(Debug, Clone, Serialize)]
pub struct CategoryUtilization {
    pub name: String,
    pub active: usize,
    pub max_concurrent: usize,
}

/// One currently running task, with its runtime so far.
#[derive(Debug, Clone, Serialize)]
pub struct RunningTask {
    pub id: TaskId,
    pub name: String,
    pub category: String,
    pub runtime_secs: i64,
}

/// A consistent point-in-time view of a run, taken under the state lock.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressSnapshot {
    pub run_id: Uuid,
    pub elapsed_secs: i64,
    pub queued: usize,
    pub running: Vec<RunningTask>,
    pub categories: Vec<CategoryUtilization>,
    pub completed: usize,
    pub failed: usize,
    /// Up to three queued tasks next in dispatch order.
    pub next_queued: Vec<TaskId>,
    /// Sum of the advisory duration estimates of queued tasks, if any
    /// declared one. Advisory only, never enforced.
    pub estimated_remaining_secs: Option<u64>,
}

impl ProgressSnapshot {
    /// Emit the snapshot through tracing.
    pub fn log(&self) {
        info!(
            run_id = %self.run_id,
            "progress: runtime {}m{}s | active {} | completed {} | failed {} | queued {}",
            self.elapsed_secs / 60,
            self.elapsed_secs % 60,
            self.running.len(),
            self.completed,
            self.failed,
            self.queued,
        );
        for task in &self.running {
            info!(
                "  running: {} [{}] ({}s)",
                task.name, task.category, task.runtime_secs
            );
        }
        if !self.next_queued.is_empty() {
            let next: Vec<&str> = self.next_queued.iter().map(|id| id.as_str()).collect();
            info!("  next in queue: {}", next.join(", "));
        }
        if let Some(remaining) = self.estimated_remaining_secs {
            info!("  estimated work remaining: ~{}m", remaining.div_ceil(60));
        }
    }
}

/// Periodic progress observer callback.
pub type ProgressCallback = Arc<dyn Fn(&ProgressSnapshot) + Send + Sync>;

/// A terminally failed task with its reason string.
#[derive(Debug, Clone, Serialize)]
pub struct FailedTask {
    pub id: TaskId,
    pub reason: String,
}

/// Terminal disposition of one task in the final report.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskDisposition {
    Completed,
    Failed { reason: String },
    Cancelled,
}

/// Per-task entry in the final report.
#[derive(Debug, Clone, Serialize)]
pub struct TaskReport {
    pub id: TaskId,
    pub name: String,
    pub category: String,
    pub disposition: TaskDisposition,
    pub attempts: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_secs: Option<f64>,
    pub log: Vec<String>,
}

/// Final summary of a run. Every submitted task appears exactly once.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub total_duration_secs: f64,
    /// Per-task detail, in batch order.
    pub tasks: Vec<TaskReport>,
    pub completed: Vec<TaskId>,
    pub failed: Vec<FailedTask>,
    pub cancelled: Vec<TaskId>,
    /// Completed over completed-plus-failed; cancelled tasks don't count.
    pub success_rate: f64,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.cancelled.is_empty()
    }

    /// Emit the final report through tracing.
    pub fn log_summary(&self) {
        let total = self.total_duration_secs as i64;
        info!(
            run_id = %self.run_id,
            "run finished in {}m{}s: {} completed, {} failed, {} cancelled ({:.0}% success)",
            total / 60,
            total % 60,
            self.completed.len(),
            self.failed.len(),
            self.cancelled.len(),
            self.success_rate * 100.0,
        );
        for failure in &self.failed {
            info!("  failed: {} - {}", failure.id, failure.reason);
        }
        for id in &self.cancelled {
            info!("  cancelled: {}", id);
        }
    }
}

/// Periodic reporter loop: read-only over the run state.
///
/// Runs on its own interval, independent of the scheduler tick, and emits
/// a final snapshot when the run completes.
pub(crate) async fn reporter_loop(
    state: Arc<Mutex<RunState>>,
    interval: Duration,
    callbacks: Vec<ProgressCallback>,
    mut done: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick of a tokio interval completes immediately; consume it
    // so the first report lands one full interval into the run.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                emit(&state, &callbacks).await;
            }
            changed = done.changed() => {
                emit(&state, &callbacks).await;
                if changed.is_err() || *done.borrow() {
                    return;
                }
            }
        }
    }
}

async fn emit(state: &Arc<Mutex<RunState>>, callbacks: &[ProgressCallback]) {
    let snapshot = state.lock().await.snapshot();
    snapshot.log();
    for callback in callbacks {
        callback(&snapshot);
    }
}
