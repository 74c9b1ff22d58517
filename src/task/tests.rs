#[cfg(test)]
mod tests {
    use crate::action::{ActionError, ActionOutcome, action_fn};
    use crate::task::types::*;
    use chrono::Utc;

    fn create_test_spec() -> TaskSpec {
        TaskSpec::new("test-task", "Test Task")
            .with_priority(5)
            .with_estimated_duration_secs(900)
    }

    fn create_test_task() -> Task {
        Task::new(
            create_test_spec(),
            action_fn(|_ctx| async { Ok(ActionOutcome::ok()) }),
        )
    }

    #[test]
    fn test_task_creation() {
        let task = create_test_task();

        assert_eq!(task.id().as_str(), "test-task");
        assert_eq!(task.spec.name, "Test Task");
        assert_eq!(task.spec.priority, 5);
        assert_eq!(task.spec.category, "general");
        assert!(task.is_queued());
        assert!(!task.is_terminal());
        assert_eq!(task.attempts, 0);
        assert!(task.spec.dependencies.is_empty());
    }

    #[test]
    fn test_task_state_transitions() {
        let mut task = create_test_task();

        assert!(matches!(task.state, TaskState::Queued));

        task.state = TaskState::Running;
        assert!(task.is_running());
        assert!(!task.is_queued());
        assert!(!task.is_terminal());

        task.state = TaskState::Completed;
        assert!(task.is_terminal());
        assert!(!task.is_running());
    }

    #[test]
    fn test_failed_state_is_terminal() {
        let mut task = create_test_task();
        task.state = TaskState::Failed {
            reason: FailureReason::ActionFailed("boom".to_string()),
        };
        assert!(task.is_terminal());
    }

    #[test]
    fn test_duration_requires_both_timestamps() {
        let mut task = create_test_task();
        assert_eq!(task.duration_secs(), None);

        let now = Utc::now();
        task.started_at = Some(now);
        assert_eq!(task.duration_secs(), None);

        task.finished_at = Some(now + chrono::Duration::milliseconds(1500));
        let duration = task.duration_secs().unwrap();
        assert!((duration - 1.5).abs() < 0.001);
    }

    #[test]
    fn test_max_attempts_default_resolution() {
        let task = create_test_task();
        assert_eq!(task.max_attempts_or(3), 3);

        let explicit = Task::new(
            create_test_spec().with_max_attempts(5),
            action_fn(|_ctx| async { Ok(ActionOutcome::ok()) }),
        );
        assert_eq!(explicit.max_attempts_or(3), 5);
    }

    #[test]
    fn test_failure_reason_display() {
        let blocked = FailureReason::BlockedByDependency(TaskId::from("A"));
        assert_eq!(blocked.to_string(), "blocked by failed dependency A");

        let timed_out = FailureReason::TimedOut { seconds: 30 };
        assert_eq!(timed_out.to_string(), "timed out after 30s");

        let cancelled = FailureReason::Cancelled;
        assert_eq!(cancelled.to_string(), "cancelled before start");
    }

    #[test]
    fn test_spec_roundtrips_through_toml() {
        let spec = create_test_spec()
            .with_dependencies(vec![TaskId::from("other")])
            .with_max_attempts(2)
            .with_timeout_secs(120);

        let encoded = toml::to_string(&spec).unwrap();
        let decoded: TaskSpec = toml::from_str(&encoded).unwrap();

        assert_eq!(decoded.id, spec.id);
        assert_eq!(decoded.priority, spec.priority);
        assert_eq!(decoded.dependencies, spec.dependencies);
        assert_eq!(decoded.max_attempts, Some(2));
        assert_eq!(decoded.timeout_secs, Some(120));
    }

    #[tokio::test]
    async fn test_action_fn_runs_closure() {
        let action = action_fn(|ctx| async move {
            if ctx.attempt == 1 {
                Ok(ActionOutcome::with_log(vec!["first attempt".to_string()]))
            } else {
                Err(ActionError::Failed("unexpected attempt".to_string()))
            }
        });

        let ctx = crate::action::ActionContext {
            task_id: TaskId::from("t"),
            task_name: "t".to_string(),
            category: "general".to_string(),
            attempt: 1,
        };
        let outcome = action.run(ctx).await.unwrap();
        assert_eq!(outcome.log, vec!["first attempt".to_string()]);
    }
}
