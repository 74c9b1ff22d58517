//! Batch file loading.
//!
//! A batch file declares worker categories (optional, merged over the
//! engine config) and tasks whose actions are ordered shell-command lists.

use crate::action::ShellSequence;
use crate::config::EngineConfig;
use crate::task::{Task, TaskId, TaskSpec};
use crate::worker::WorkerCategory;
use anyhow::Context;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Clone, Deserialize)]
pub struct BatchFile {
    /// Extra categories for this batch; same-named entries override the
    /// engine config.
    #[serde(default)]
    pub categories: Vec<WorkerCategory>,
    pub tasks: Vec<BatchTask>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchTask {
    pub id: TaskId,
    /// Defaults to the id when omitted.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub priority: i32,
    /// Defaults to the first configured category when omitted.
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub dependencies: Vec<TaskId>,
    #[serde(default)]
    pub estimated_minutes: Option<u64>,
    #[serde(default)]
    pub max_attempts: Option<u32>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Shell commands run in order; the first failure fails the task.
    pub commands: Vec<String>,
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
}

impl BatchFile {
    /// Load from a TOML (default) or JSON (`.json`) file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read batch file {}", path.display()))?;

        let batch = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => serde_json::from_str(&content)
                .with_context(|| format!("invalid JSON batch file {}", path.display()))?,
            _ => toml::from_str(&content)
                .with_context(|| format!("invalid TOML batch file {}", path.display()))?,
        };
        Ok(batch)
    }

    /// Merge batch categories into the config and build engine tasks.
    pub fn into_submission(self, mut config: EngineConfig) -> (EngineConfig, Vec<Task>) {
        for category in self.categories {
            match config
                .categories
                .iter_mut()
                .find(|existing| existing.name == category.name)
            {
                Some(existing) => *existing = category,
                None => config.categories.push(category),
            }
        }

        let default_category = config
            .categories
            .first()
            .map(|category| category.name.clone())
            .unwrap_or_else(|| "general".to_string());

        let tasks = self
            .tasks
            .into_iter()
            .map(|entry| {
                let name = entry.name.unwrap_or_else(|| entry.id.to_string());
                let mut spec = TaskSpec::new(entry.id, name)
                    .with_priority(entry.priority)
                    .with_category(
                        entry.category.unwrap_or_else(|| default_category.clone()),
                    )
                    .with_dependencies(entry.dependencies);
                if let Some(minutes) = entry.estimated_minutes {
                    spec = spec.with_estimated_duration_secs(minutes * 60);
                }
                if let Some(max_attempts) = entry.max_attempts {
                    spec = spec.with_max_attempts(max_attempts);
                }
                if let Some(timeout_secs) = entry.timeout_secs {
                    spec = spec.with_timeout_secs(timeout_secs);
                }

                let mut action = ShellSequence::new(entry.commands);
                if let Some(working_dir) = entry.working_dir {
                    action = action.with_working_dir(working_dir);
                }
                Task::new(spec, Arc::new(action))
            })
            .collect();

        (config, tasks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOML_BATCH: &str = r#"
        [[categories]]
        name = "branch-optimizer"
        max_concurrent = 2
        capabilities = ["git operations", "content optimization"]

        [[tasks]]
        id = "fix-h1-cache"
        name = "Fix H1 Title Cache Issues"
        priority = 10
        category = "branch-optimizer"
        estimated_minutes = 15
        commands = ["echo cache-bust"]

        [[tasks]]
        id = "optimize-studi-legali"
        priority = 8
        category = "branch-optimizer"
        dependencies = ["fix-h1-cache"]
        commands = ["echo optimizing"]
    "#;

    #[test]
    fn parses_toml_batch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("batch.toml");
        std::fs::write(&path, TOML_BATCH).unwrap();

        let batch = BatchFile::load(&path).unwrap();
        assert_eq!(batch.categories.len(), 1);
        assert_eq!(batch.tasks.len(), 2);
        assert_eq!(batch.tasks[0].priority, 10);
        assert_eq!(
            batch.tasks[1].dependencies,
            vec![TaskId::from("fix-h1-cache")]
        );
    }

    #[test]
    fn parses_json_batch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("batch.json");
        std::fs::write(
            &path,
            r#"{"tasks": [{"id": "t1", "commands": ["echo hi"]}]}"#,
        )
        .unwrap();

        let batch = BatchFile::load(&path).unwrap();
        assert_eq!(batch.tasks.len(), 1);
        assert_eq!(batch.tasks[0].id.as_str(), "t1");
    }

    #[test]
    fn submission_merges_categories_and_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("batch.toml");
        std::fs::write(&path, TOML_BATCH).unwrap();

        let batch = BatchFile::load(&path).unwrap();
        let (config, tasks) = batch.into_submission(EngineConfig::default());

        // "general" from defaults plus "branch-optimizer" from the batch.
        assert_eq!(config.categories.len(), 2);
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].spec.name, "Fix H1 Title Cache Issues");
        // Name defaults to id when omitted.
        assert_eq!(tasks[1].spec.name, "optimize-studi-legali");
        assert_eq!(tasks[0].spec.estimated_duration_secs, Some(900));
    }
}
