//! # Foreman
//!
//! A priority-and-dependency batch execution engine. A caller submits a batch
//! of tasks — each with a priority, a worker category, declared dependencies,
//! and an opaque async action — and the engine drives the batch to completion
//! under per-category concurrency ceilings, with retries, failure isolation,
//! and periodic progress reporting.
//!
//! ## Architecture Overview
//!
//! The system consists of several key components organized into modules:
//!
//! - **[`task`]**: Task data model, pending queue, and dependency validation
//! - **[`worker`]**: Worker categories with fixed concurrency ceilings
//! - **[`action`]**: The opaque action contract and shell-command actions
//! - **[`engine`]**: The run lifecycle — scheduler loop, executor, reporter
//!
//! ## Scheduling Contract
//!
//! - Among ready tasks, higher priority dispatches first; ties break on
//!   enqueue order, so scheduling is deterministic.
//! - A task never starts before every declared dependency has completed.
//! - A category never runs more tasks than its concurrency ceiling.
//! - A failing task is retried up to its attempt budget, then fails
//!   terminally; tasks depending on it are failed as blocked rather than
//!   left queued forever.
//! - A batch with a dangling dependency reference or a dependency cycle is
//!   rejected at submit time, before anything runs.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use foreman::{Engine, EngineConfig, Task, TaskSpec, action_fn, ActionOutcome};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut engine = Engine::new(EngineConfig::default())?;
//!     engine.on_progress(|snap| println!("{} running", snap.running.len()));
//!
//!     let batch = vec![Task::new(
//!         TaskSpec::new("greet", "Say hello").with_priority(10),
//!         action_fn(|_ctx| async { Ok(ActionOutcome::ok()) }),
//!     )];
//!
//!     let handle = engine.submit(batch)?;
//!     let report = handle.await_completion().await?;
//!     println!("completed: {}", report.completed.len());
//!     Ok(())
//! }
//! ```

/// Task data model, pending queue, and dependency validation.
///
/// Provides the [`Task`]/[`TaskSpec`] types, the priority-ordered pending
/// queue, and submit-time batch validation including cycle detection.
pub mod task;

/// Worker categories.
///
/// Named worker pools with fixed concurrency ceilings and descriptive
/// capability labels, created once from configuration at engine start.
pub mod worker;

/// The action contract.
///
/// Tasks carry an opaque [`TaskAction`]; the engine observes only its
/// success/failure outcome. Includes shell-command sequence actions.
pub mod action;

/// Engine lifecycle.
///
/// The [`Engine`] submit surface, the scheduler loop, per-task execution
/// with timeout and panic isolation, and progress/final reporting.
pub mod engine;

/// Engine configuration.
pub mod config;

/// Command-line interface: argument parsing, batch files, config discovery.
pub mod cli;

pub use action::{ActionContext, ActionError, ActionOutcome, ShellSequence, TaskAction, action_fn};
pub use config::EngineConfig;
pub use engine::{
    Engine, EngineError, ProgressSnapshot, RunHandle, RunReport, ShutdownTrigger, TaskReport,
};
pub use task::{FailureReason, SubmitError, Task, TaskId, TaskSpec, TaskState};
pub use worker::{CategoryRegistry, RegistryError, WorkerCategory};
