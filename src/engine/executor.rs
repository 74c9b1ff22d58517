use crate::action::{ActionContext, ActionError, ActionOutcome, TaskAction};
use crate::task::TaskId;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::warn;

/// Everything the executor needs to run one dispatched attempt.
pub(crate) struct Dispatch {
    pub id: TaskId,
    pub name: String,
    pub category: String,
    pub attempt: u32,
    pub action: Arc<dyn TaskAction>,
    pub timeout: Option<Duration>,
}

/// How an attempt failed, before retry policy is applied.
#[derive(Debug)]
pub(crate) enum TaskFailure {
    Action(ActionError),
    TimedOut(Duration),
    Panicked(String),
}

/// Outcome message delivered to the scheduler, exactly once per dispatch.
pub(crate) struct TaskOutcome {
    pub id: TaskId,
    pub result: Result<ActionOutcome, TaskFailure>,
    pub finished_at: DateTime<Utc>,
}

/// Run one attempt on its own tokio task.
///
/// The attempt is bounded by the task timeout and insulated from panics;
/// whatever happens, exactly one [`TaskOutcome`] is sent back. That send is
/// the single release point for the category slot taken at dispatch, so a
/// misbehaving action can never permanently exhaust a category's
/// concurrency budget.
pub(crate) fn spawn(dispatch: Dispatch, outcomes: mpsc::Sender<TaskOutcome>) {
    tokio::spawn(async move {
        let ctx = ActionContext {
            task_id: dispatch.id.clone(),
            task_name: dispatch.name.clone(),
            category: dispatch.category.clone(),
            attempt: dispatch.attempt,
        };

        let attempt = async {
            match dispatch.timeout {
                Some(timeout) => {
                    match tokio::time::timeout(timeout, dispatch.action.run(ctx)).await {
                        Ok(result) => result.map_err(TaskFailure::Action),
                        Err(_) => Err(TaskFailure::TimedOut(timeout)),
                    }
                }
                None => dispatch.action.run(ctx).await.map_err(TaskFailure::Action),
            }
        };

        let result = match AssertUnwindSafe(attempt).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => Err(TaskFailure::Panicked(panic_message(panic))),
        };

        let outcome = TaskOutcome {
            id: dispatch.id.clone(),
            result,
            finished_at: Utc::now(),
        };
        if outcomes.send(outcome).await.is_err() {
            warn!(task = %dispatch.id, "scheduler gone before outcome delivery");
        }
    });
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::action_fn;

    fn dispatch(action: Arc<dyn TaskAction>, timeout: Option<Duration>) -> Dispatch {
        Dispatch {
            id: TaskId::from("t"),
            name: "t".to_string(),
            category: "general".to_string(),
            attempt: 1,
            action,
            timeout,
        }
    }

    #[tokio::test]
    async fn delivers_success_outcome() {
        let (tx, mut rx) = mpsc::channel(1);
        spawn(
            dispatch(
                action_fn(|_ctx| async {
                    Ok(ActionOutcome::with_log(vec!["done".to_string()]))
                }),
                None,
            ),
            tx,
        );

        let outcome = rx.recv().await.unwrap();
        assert_eq!(outcome.result.unwrap().log, vec!["done".to_string()]);
    }

    #[tokio::test]
    async fn timeout_becomes_failure() {
        let (tx, mut rx) = mpsc::channel(1);
        spawn(
            dispatch(
                action_fn(|_ctx| async {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok(ActionOutcome::ok())
                }),
                Some(Duration::from_millis(50)),
            ),
            tx,
        );

        let outcome = rx.recv().await.unwrap();
        assert!(matches!(outcome.result, Err(TaskFailure::TimedOut(_))));
    }

    #[tokio::test]
    async fn panic_is_isolated_and_reported() {
        let (tx, mut rx) = mpsc::channel(1);
        spawn(
            dispatch(
                action_fn(|_ctx| async {
                    if true {
                        panic!("action blew up");
                    }
                    Ok(ActionOutcome::ok())
                }),
                None,
            ),
            tx,
        );

        let outcome = rx.recv().await.unwrap();
        match outcome.result {
            Err(TaskFailure::Panicked(message)) => assert!(message.contains("action blew up")),
            other => panic!("expected panic failure, got {other:?}"),
        }
    }
}
