use crate::action::TaskAction;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Unique identifier for tasks, stable for the lifetime of a run.
///
/// Ids are caller-supplied slugs (e.g. `fix-h1-cache`), not generated.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for TaskId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Immutable description of one unit of work.
///
/// Everything the scheduler needs to place a task: identity, priority,
/// worker category, declared dependencies, and advisory estimates. The
/// executable action itself lives on [`Task`].
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct TaskSpec {
    pub id: TaskId,
    /// Human-readable label, used for reporting only.
    pub name: String,
    /// Higher runs first among otherwise-ready tasks.
    #[serde(default)]
    pub priority: i32,
    /// Worker category the task must run under.
    #[serde(default = "default_category")]
    pub category: String,
    /// Task ids that must be completed before this task is eligible.
    #[serde(default)]
    pub dependencies: Vec<TaskId>,
    /// Advisory only, used for reporting; never enforced.
    #[serde(default)]
    pub estimated_duration_secs: Option<u64>,
    /// Execution attempt budget; `None` uses the engine default.
    #[serde(default)]
    pub max_attempts: Option<u32>,
    /// Per-attempt timeout; `None` uses the engine default.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

fn default_category() -> String {
    "general".to_string()
}

impl TaskSpec {
    /// Create a spec with default priority and the `general` category.
    pub fn new(id: impl Into<TaskId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            priority: 0,
            category: default_category(),
            dependencies: Vec::new(),
            estimated_duration_secs: None,
            max_attempts: None,
            timeout_secs: None,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_dependencies(mut self, dependencies: Vec<TaskId>) -> Self {
        self.dependencies = dependencies;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = Some(timeout_secs);
        self
    }

    pub fn with_estimated_duration_secs(mut self, secs: u64) -> Self {
        self.estimated_duration_secs = Some(secs);
        self
    }
}

/// Task lifecycle state.
///
/// `Queued → Running → Completed | Failed`. A task re-enters `Queued` only
/// through the retry rule, while its attempt budget is not exhausted.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum TaskState {
    Queued,
    Running,
    Completed,
    Failed { reason: FailureReason },
}

/// Why a task ended up terminally failed.
///
/// Execution failures, timeouts, and panics are distinct from cascading
/// blocks and shutdown cancellation so the final report never conflates
/// them.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum FailureReason {
    /// The action signaled failure.
    ActionFailed(String),
    /// The attempt exceeded the task's timeout.
    TimedOut { seconds: u64 },
    /// The action panicked; isolated, never propagated to the scheduler.
    Panicked(String),
    /// A dependency failed terminally, so this task can never become ready.
    BlockedByDependency(TaskId),
    /// A graceful shutdown was requested before the task started.
    Cancelled,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ActionFailed(message) => f.write_str(message),
            Self::TimedOut { seconds } => write!(f, "timed out after {seconds}s"),
            Self::Panicked(message) => write!(f, "action panicked: {message}"),
            Self::BlockedByDependency(id) => write!(f, "blocked by failed dependency {id}"),
            Self::Cancelled => f.write_str("cancelled before start"),
        }
    }
}

/// One schedulable unit of work: a [`TaskSpec`] plus its opaque action and
/// the mutable bookkeeping owned by the run.
#[derive(Clone)]
pub struct Task {
    pub spec: TaskSpec,
    pub action: Arc<dyn TaskAction>,
    pub state: TaskState,
    /// Count of execution attempts so far.
    pub attempts: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Free-form log lines collected from action attempts.
    pub log: Vec<String>,
}

impl Task {
    /// Create a queued task from a spec and an action.
    pub fn new(spec: TaskSpec, action: Arc<dyn TaskAction>) -> Self {
        Self {
            spec,
            action,
            state: TaskState::Queued,
            attempts: 0,
            started_at: None,
            finished_at: None,
            log: Vec::new(),
        }
    }

    pub fn id(&self) -> &TaskId {
        &self.spec.id
    }

    pub fn is_queued(&self) -> bool {
        matches!(self.state, TaskState::Queued)
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, TaskState::Running)
    }

    /// Check if the task is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self.state, TaskState::Completed | TaskState::Failed { .. })
    }

    /// Wall-clock duration of the task, if it ran to a terminal state.
    pub fn duration_secs(&self) -> Option<f64> {
        match (self.started_at, self.finished_at) {
            (Some(started), Some(finished)) => {
                Some(finished.signed_duration_since(started).num_milliseconds() as f64 / 1000.0)
            }
            _ => None,
        }
    }

    /// Attempt budget with the engine default applied.
    pub fn max_attempts_or(&self, default: u32) -> u32 {
        self.spec.max_attempts.unwrap_or(default).max(1)
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("spec", &self.spec)
            .field("action", &self.action.describe())
            .field("state", &self.state)
            .field("attempts", &self.attempts)
            .finish()
    }
}
