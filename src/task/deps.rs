use crate::task::types::{Task, TaskId};
use crate::worker::CategoryRegistry;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Batch rejected at submit time, before any task runs.
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("batch contains no tasks")]
    EmptyBatch,

    #[error("duplicate task id `{0}`")]
    DuplicateId(TaskId),

    #[error("task `{task}` is assigned to unknown worker category `{category}`")]
    UnknownCategory { task: TaskId, category: String },

    /// A dependency id that never appears in the batch is an error, not
    /// "automatically satisfied" — otherwise the task could stall forever.
    #[error("task `{task}` depends on `{dependency}`, which is not part of the batch")]
    UnknownDependency { task: TaskId, dependency: TaskId },

    #[error("task `{0}` depends on itself")]
    SelfDependency(TaskId),

    #[error("dependency cycle: {}", format_cycle(.0))]
    DependencyCycle(Vec<TaskId>),

    #[error("task `{0}` has a max_attempts of zero")]
    ZeroAttempts(TaskId),
}

fn format_cycle(cycle: &[TaskId]) -> String {
    cycle
        .iter()
        .map(|id| id.as_str())
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Check readiness: true iff every declared dependency is completed.
///
/// An empty dependency set is immediately ready.
pub fn is_ready(task: &Task, completed: &HashSet<TaskId>) -> bool {
    task.spec.dependencies.iter().all(|dep| completed.contains(dep))
}

/// Fail-fast validation of a whole batch against the category registry.
///
/// Rejects duplicate ids, unknown categories, dependency references outside
/// the batch, self-dependencies, zero attempt budgets, and dependency
/// cycles of any length.
pub fn validate_batch(batch: &[Task], registry: &CategoryRegistry) -> Result<(), SubmitError> {
    if batch.is_empty() {
        return Err(SubmitError::EmptyBatch);
    }

    let mut ids = HashSet::new();
    for task in batch {
        if !ids.insert(task.id().clone()) {
            return Err(SubmitError::DuplicateId(task.id().clone()));
        }
    }

    for task in batch {
        if !registry.contains(&task.spec.category) {
            return Err(SubmitError::UnknownCategory {
                task: task.id().clone(),
                category: task.spec.category.clone(),
            });
        }
        if task.spec.max_attempts == Some(0) {
            return Err(SubmitError::ZeroAttempts(task.id().clone()));
        }
        for dep in &task.spec.dependencies {
            if dep == task.id() {
                return Err(SubmitError::SelfDependency(task.id().clone()));
            }
            if !ids.contains(dep) {
                return Err(SubmitError::UnknownDependency {
                    task: task.id().clone(),
                    dependency: dep.clone(),
                });
            }
        }
    }

    if let Some(cycle) = find_cycle(batch) {
        return Err(SubmitError::DependencyCycle(cycle));
    }

    debug!("validated batch of {} tasks", batch.len());
    Ok(())
}

/// Depth-first cycle search over the dependency edges of the batch.
///
/// Returns the members of the first cycle found, in traversal order.
fn find_cycle(batch: &[Task]) -> Option<Vec<TaskId>> {
    let deps: HashMap<&TaskId, &Vec<TaskId>> = batch
        .iter()
        .map(|task| (task.id(), &task.spec.dependencies))
        .collect();

    let mut visited = HashSet::new();
    let mut path = Vec::new();

    for task in batch {
        if let Some(cycle) = visit(task.id(), &deps, &mut visited, &mut path) {
            return Some(cycle);
        }
    }
    None
}

fn visit(
    id: &TaskId,
    deps: &HashMap<&TaskId, &Vec<TaskId>>,
    visited: &mut HashSet<TaskId>,
    path: &mut Vec<TaskId>,
) -> Option<Vec<TaskId>> {
    if let Some(pos) = path.iter().position(|p| p == id) {
        let mut cycle = path[pos..].to_vec();
        cycle.push(id.clone());
        return Some(cycle);
    }
    if visited.contains(id) {
        return None;
    }

    visited.insert(id.clone());
    path.push(id.clone());

    if let Some(dependencies) = deps.get(id) {
        for dep in dependencies.iter() {
            if let Some(cycle) = visit(dep, deps, visited, path) {
                return Some(cycle);
            }
        }
    }

    path.pop();
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{ActionOutcome, action_fn};
    use crate::task::types::{Task, TaskSpec};
    use crate::worker::{CategoryRegistry, WorkerCategory};

    fn registry() -> CategoryRegistry {
        CategoryRegistry::from_configs(vec![WorkerCategory::new("general", 3)]).unwrap()
    }

    fn task(id: &str, deps: &[&str]) -> Task {
        let spec = TaskSpec::new(id, id)
            .with_dependencies(deps.iter().map(|d| TaskId::from(*d)).collect());
        Task::new(spec, action_fn(|_ctx| async { Ok(ActionOutcome::ok()) }))
    }

    #[test]
    fn empty_dependency_set_is_ready() {
        let completed = HashSet::new();
        assert!(is_ready(&task("a", &[]), &completed));
    }

    #[test]
    fn ready_requires_all_dependencies_completed() {
        let t = task("c", &["a", "b"]);
        let mut completed = HashSet::from([TaskId::from("a")]);
        assert!(!is_ready(&t, &completed));

        completed.insert(TaskId::from("b"));
        assert!(is_ready(&t, &completed));
    }

    #[test]
    fn rejects_dangling_dependency() {
        let batch = vec![task("a", &["ghost"])];
        let err = validate_batch(&batch, &registry()).unwrap_err();
        assert!(matches!(err, SubmitError::UnknownDependency { .. }));
    }

    #[test]
    fn rejects_self_dependency() {
        let batch = vec![task("a", &["a"])];
        let err = validate_batch(&batch, &registry()).unwrap_err();
        assert!(matches!(err, SubmitError::SelfDependency(_)));
    }

    #[test]
    fn rejects_two_task_cycle() {
        let batch = vec![task("a", &["b"]), task("b", &["a"])];
        let err = validate_batch(&batch, &registry()).unwrap_err();
        assert!(matches!(err, SubmitError::DependencyCycle(_)));
    }

    #[test]
    fn rejects_longer_cycle() {
        let batch = vec![task("a", &["c"]), task("b", &["a"]), task("c", &["b"])];
        let err = validate_batch(&batch, &registry()).unwrap_err();
        match err {
            SubmitError::DependencyCycle(cycle) => assert!(cycle.len() >= 4),
            other => panic!("expected cycle error, got {other}"),
        }
    }

    #[test]
    fn accepts_diamond_dependencies() {
        let batch = vec![
            task("root", &[]),
            task("left", &["root"]),
            task("right", &["root"]),
            task("join", &["left", "right"]),
        ];
        assert!(validate_batch(&batch, &registry()).is_ok());
    }

    #[test]
    fn rejects_unknown_category() {
        let spec = TaskSpec::new("a", "a").with_category("nonexistent");
        let batch = vec![Task::new(
            spec,
            action_fn(|_ctx| async { Ok(ActionOutcome::ok()) }),
        )];
        let err = validate_batch(&batch, &registry()).unwrap_err();
        assert!(matches!(err, SubmitError::UnknownCategory { .. }));
    }
}
