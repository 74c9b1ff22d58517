use super::{ActionContext, ActionError, ActionOutcome, TaskAction};
use async_trait::async_trait;
use std::borrow::Cow;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// An ordered list of shell commands run as one task action.
///
/// Commands run sequentially through `sh -c`; the first failing command
/// aborts the sequence and fails the task. Stdout and stderr of every step
/// are captured into the action log.
#[derive(Debug, Clone)]
pub struct ShellSequence {
    commands: Vec<String>,
    working_dir: Option<PathBuf>,
    env: HashMap<String, String>,
    step_timeout: Option<Duration>,
}

impl ShellSequence {
    pub fn new(commands: Vec<String>) -> Self {
        Self {
            commands,
            working_dir: None,
            env: HashMap::new(),
            step_timeout: None,
        }
    }

    /// Set the working directory for every step.
    pub fn with_working_dir(mut self, dir: PathBuf) -> Self {
        self.working_dir = Some(dir);
        self
    }

    /// Add an environment variable visible to every step.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set a per-step timeout, independent of the task-level timeout.
    pub fn with_step_timeout(mut self, timeout: Duration) -> Self {
        self.step_timeout = Some(timeout);
        self
    }

    async fn run_step(&self, step: &str) -> Result<std::process::Output, ActionError> {
        let mut command = Command::new("sh");
        command.arg("-c").arg(step);
        // Kills the child if the attempt is dropped by a task-level timeout,
        // so a hung command cannot outlive its concurrency slot.
        command.kill_on_drop(true);

        if let Some(ref dir) = self.working_dir {
            command.current_dir(dir);
        }
        for (key, value) in &self.env {
            command.env(key, value);
        }

        match self.step_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, command.output()).await {
                Ok(output) => Ok(output?),
                Err(_) => Err(ActionError::StepTimedOut {
                    step: step.to_string(),
                    seconds: timeout.as_secs(),
                }),
            },
            None => Ok(command.output().await?),
        }
    }
}

#[async_trait]
impl TaskAction for ShellSequence {
    async fn run(&self, ctx: ActionContext) -> Result<ActionOutcome, ActionError> {
        let mut log = Vec::new();

        for step in &self.commands {
            debug!(
                task = %ctx.task_id,
                attempt = ctx.attempt,
                "running step: sh -c {}",
                shell_escape::escape(Cow::from(step.as_str()))
            );

            let output = self.run_step(step).await?;

            let stdout = String::from_utf8_lossy(&output.stdout);
            if !stdout.trim().is_empty() {
                log.push(format!("{step}: {}", stdout.trim()));
            }
            let stderr = String::from_utf8_lossy(&output.stderr);
            if !stderr.trim().is_empty() {
                log.push(format!("{step} [stderr]: {}", stderr.trim()));
            }

            if !output.status.success() {
                return Err(ActionError::StepFailed {
                    step: step.clone(),
                    status: output.status.code().unwrap_or(-1),
                    stderr: stderr.trim().to_string(),
                });
            }
        }

        Ok(ActionOutcome::with_log(log))
    }

    fn describe(&self) -> String {
        format!("shell sequence ({} steps)", self.commands.len())
    }
}
