//! The action contract.
//!
//! A task's action receives no scheduler internals and reports back only a
//! success/failure outcome plus optional free-form log output. The engine
//! decides *when* an action runs; the action decides *what* it does.

use crate::task::TaskId;
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::sync::Arc;

/// Shell-command sequence actions.
///
/// Runs an ordered list of shell commands via `tokio::process`, stopping
/// at the first failing command.
pub mod shell;

pub use shell::ShellSequence;

/// What an action is told about the task it runs for.
#[derive(Debug, Clone)]
pub struct ActionContext {
    pub task_id: TaskId,
    pub task_name: String,
    pub category: String,
    /// 1-based attempt number, so actions can log retries distinctly.
    pub attempt: u32,
}

/// Successful action result: optional free-form log lines for the report.
#[derive(Debug, Clone, Default)]
pub struct ActionOutcome {
    pub log: Vec<String>,
}

impl ActionOutcome {
    /// Success with no log output.
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn with_log(log: Vec<String>) -> Self {
        Self { log }
    }
}

/// Failure signaled by an action.
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    /// A shell step exited non-zero.
    #[error("step `{step}` exited with status {status}")]
    StepFailed {
        step: String,
        status: i32,
        stderr: String,
    },

    /// A shell step exceeded its per-step timeout.
    #[error("step `{step}` timed out after {seconds}s")]
    StepTimedOut { step: String, seconds: u64 },

    /// Free-form failure from a caller-supplied action.
    #[error("{0}")]
    Failed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// One opaque unit of work.
///
/// Implementations must be safe to call again on retry: the engine invokes
/// `run` once per attempt, up to the task's attempt budget.
#[async_trait]
pub trait TaskAction: Send + Sync {
    async fn run(&self, ctx: ActionContext) -> Result<ActionOutcome, ActionError>;

    /// Short human-readable description for logs and debugging.
    fn describe(&self) -> String {
        "opaque action".to_string()
    }
}

type ActionFuture = BoxFuture<'static, Result<ActionOutcome, ActionError>>;

/// Adapter turning an async closure into a [`TaskAction`].
struct FnAction {
    f: Box<dyn Fn(ActionContext) -> ActionFuture + Send + Sync>,
}

#[async_trait]
impl TaskAction for FnAction {
    async fn run(&self, ctx: ActionContext) -> Result<ActionOutcome, ActionError> {
        (self.f)(ctx).await
    }

    fn describe(&self) -> String {
        "fn action".to_string()
    }
}

/// Wrap an async closure as a shareable [`TaskAction`].
///
/// ```rust
/// use foreman::{action_fn, ActionOutcome};
///
/// let action = action_fn(|_ctx| async { Ok(ActionOutcome::ok()) });
/// assert_eq!(action.describe(), "fn action");
/// ```
pub fn action_fn<F, Fut>(f: F) -> Arc<dyn TaskAction>
where
    F: Fn(ActionContext) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<ActionOutcome, ActionError>> + Send + 'static,
{
    Arc::new(FnAction {
        f: Box::new(move |ctx| Box::pin(f(ctx))),
    })
}
