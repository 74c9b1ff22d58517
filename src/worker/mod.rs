//! Worker categories.
//!
//! Tasks are assigned to named categories, each a pool with a concurrency
//! ceiling. Categories are created once from configuration at engine start
//! and persist for the run's duration; they are never removed mid-run.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// A named worker pool with a concurrency ceiling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerCategory {
    pub name: String,
    /// Ceiling on simultaneously running tasks assigned to this category.
    pub max_concurrent: usize,
    /// Descriptive labels only; documents what the pool is for, not
    /// enforced mechanically.
    #[serde(default)]
    pub capabilities: Vec<String>,
}

impl WorkerCategory {
    pub fn new(name: impl Into<String>, max_concurrent: usize) -> Self {
        Self {
            name: name.into(),
            max_concurrent,
            capabilities: Vec::new(),
        }
    }

    pub fn with_capabilities(mut self, capabilities: Vec<String>) -> Self {
        self.capabilities = capabilities;
        self
    }
}

/// Invalid category configuration, rejected at engine construction.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("duplicate worker category `{0}`")]
    DuplicateCategory(String),

    #[error("worker category `{0}` has a max_concurrent of zero")]
    ZeroConcurrency(String),
}

/// Fixed set of worker categories, looked up by name when assigning tasks.
#[derive(Debug, Clone)]
pub struct CategoryRegistry {
    categories: HashMap<String, WorkerCategory>,
}

impl CategoryRegistry {
    /// Build the registry from static configuration.
    pub fn from_configs(configs: Vec<WorkerCategory>) -> Result<Self, RegistryError> {
        let mut categories = HashMap::new();
        for category in configs {
            if category.max_concurrent == 0 {
                return Err(RegistryError::ZeroConcurrency(category.name));
            }
            debug!(
                category = %category.name,
                max_concurrent = category.max_concurrent,
                "registered worker category"
            );
            if categories.contains_key(&category.name) {
                return Err(RegistryError::DuplicateCategory(category.name));
            }
            categories.insert(category.name.clone(), category);
        }
        Ok(Self { categories })
    }

    pub fn get(&self, name: &str) -> Option<&WorkerCategory> {
        self.categories.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.categories.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &WorkerCategory> {
        self.categories.values()
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_lookup_by_name() {
        let registry = CategoryRegistry::from_configs(vec![
            WorkerCategory::new("branch-optimizer", 2),
            WorkerCategory::new("qa-tester", 3),
        ])
        .unwrap();

        assert_eq!(registry.len(), 2);
        assert!(registry.contains("qa-tester"));
        assert_eq!(registry.get("branch-optimizer").unwrap().max_concurrent, 2);
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn rejects_duplicate_category() {
        let err = CategoryRegistry::from_configs(vec![
            WorkerCategory::new("general", 2),
            WorkerCategory::new("general", 4),
        ])
        .unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateCategory(_)));
    }

    #[test]
    fn rejects_zero_concurrency() {
        let err = CategoryRegistry::from_configs(vec![WorkerCategory::new("general", 0)])
            .unwrap_err();
        assert!(matches!(err, RegistryError::ZeroConcurrency(_)));
    }
}
