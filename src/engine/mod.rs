//! Engine lifecycle.
//!
//! An [`Engine`] is configured once with its worker categories and submit
//! defaults; each [`Engine::submit`] call validates a batch and starts one
//! run. The returned [`RunHandle`] is the caller's view of that run:
//! graceful shutdown, live snapshots, and the final report.
//!
//! ## Run anatomy
//!
//! ```text
//! submit(batch)
//!      ↓ validate (dangling deps, cycles, categories)
//! scheduler loop ──dispatch──▶ executor (timeout, panic isolation)
//!      ▲                           │
//!      └────── outcome channel ◀───┘
//!      │
//! progress reporter (read-only snapshots, own interval)
//!      ↓
//! RunReport (every task's terminal state)
//! ```

use crate::config::EngineConfig;
use crate::engine::report::ProgressCallback;
use crate::engine::state::RunState;
use crate::task::{SubmitError, Task, TaskId, validate_batch};
use crate::worker::{CategoryRegistry, RegistryError};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, Notify, watch};
use tokio::task::JoinHandle;
use tracing::info;

pub(crate) mod executor;
pub mod report;
pub(crate) mod scheduler;
pub(crate) mod state;

pub use report::{
    CategoryUtilization, FailedTask, ProgressSnapshot, RunReport, RunningTask, TaskDisposition,
    TaskReport,
};

/// Run aborted by the engine itself, as opposed to individual task failures.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Queue non-empty but nothing dispatchable and no terminal failure
    /// explaining it. Submit-time cycle validation makes this a backstop.
    #[error("deadlock: {} queued task(s) can never become ready: {}", .stuck.len(), format_ids(.stuck))]
    Deadlock { stuck: Vec<TaskId> },

    #[error("scheduler task failed: {0}")]
    Internal(String),
}

fn format_ids(ids: &[TaskId]) -> String {
    ids.iter()
        .map(|id| id.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Requests graceful cancellation of a run: no new tasks dispatched,
/// currently running tasks allowed to finish.
///
/// Cheap to clone; hand a clone to a signal handler.
#[derive(Clone, Debug, Default)]
pub struct ShutdownTrigger {
    inner: Arc<TriggerInner>,
}

#[derive(Debug, Default)]
struct TriggerInner {
    requested: AtomicBool,
    notify: Notify,
}

impl ShutdownTrigger {
    pub fn request(&self) {
        self.inner.requested.store(true, Ordering::SeqCst);
        self.inner.notify.notify_one();
    }

    pub(crate) fn is_requested(&self) -> bool {
        self.inner.requested.load(Ordering::SeqCst)
    }

    pub(crate) async fn notified(&self) {
        self.inner.notify.notified().await;
    }
}

/// The batch execution engine.
///
/// Holds the worker category registry and scheduling defaults; each call
/// to [`Engine::submit`] starts an independent run.
pub struct Engine {
    config: EngineConfig,
    registry: CategoryRegistry,
    callbacks: Vec<ProgressCallback>,
}

impl Engine {
    /// Build an engine from configuration; fails on an invalid category set.
    pub fn new(config: EngineConfig) -> Result<Self, RegistryError> {
        let registry = CategoryRegistry::from_configs(config.categories.clone())?;
        Ok(Self {
            config,
            registry,
            callbacks: Vec::new(),
        })
    }

    pub fn registry(&self) -> &CategoryRegistry {
        &self.registry
    }

    /// Register a periodic progress observer for subsequent runs.
    pub fn on_progress<F>(&mut self, callback: F)
    where
        F: Fn(&ProgressSnapshot) + Send + Sync + 'static,
    {
        self.callbacks.push(Arc::new(callback));
    }

    /// Validate a batch and start the run.
    ///
    /// Validation errors reject the whole batch synchronously, before any
    /// task runs. Must be called from within a tokio runtime.
    pub fn submit(&self, batch: Vec<Task>) -> Result<RunHandle, SubmitError> {
        validate_batch(&batch, &self.registry)?;

        let total = batch.len();
        let run_state = RunState::new(batch, &self.registry);
        let run_id = run_state.run_id;
        info!(%run_id, tasks = total, "starting run");

        let state = Arc::new(Mutex::new(run_state));
        let trigger = ShutdownTrigger::default();
        let (done_tx, done_rx) = watch::channel(false);

        tokio::spawn(report::reporter_loop(
            state.clone(),
            self.config.progress_interval(),
            self.callbacks.clone(),
            done_rx,
        ));

        let join = {
            let state = state.clone();
            let config = self.config.clone();
            let shutdown = trigger.clone();
            tokio::spawn(async move {
                let result = scheduler::run_loop(state, config, shutdown).await;
                let _ = done_tx.send(true);
                result
            })
        };

        Ok(RunHandle {
            state,
            trigger,
            join,
        })
    }
}

/// The caller's view of one in-flight run.
pub struct RunHandle {
    state: Arc<Mutex<RunState>>,
    trigger: ShutdownTrigger,
    join: JoinHandle<Result<RunReport, EngineError>>,
}

impl RunHandle {
    /// Graceful cancellation: no new dispatches, running tasks drain.
    pub fn request_shutdown(&self) {
        self.trigger.request();
    }

    /// A clonable trigger, e.g. for a ctrl-c handler.
    pub fn shutdown_trigger(&self) -> ShutdownTrigger {
        self.trigger.clone()
    }

    /// Consistent point-in-time view of the run.
    pub async fn snapshot(&self) -> ProgressSnapshot {
        self.state.lock().await.snapshot()
    }

    /// Resolve when the run finishes, with the final report.
    pub async fn await_completion(self) -> Result<RunReport, EngineError> {
        match self.join.await {
            Ok(result) => result,
            Err(join_error) => Err(EngineError::Internal(join_error.to_string())),
        }
    }
}
