//! Collaborators the resolver consumes: where the model file is, and
//! what the user's goals and tasks currently look like.

use std::path::PathBuf;

use anyhow::Result;
use async_trait::async_trait;

use crate::action::{GoalContext, TaskContext};

/// Supplies the path of the model file the user selected.
pub trait ModelPathProvider: Send + Sync {
    /// `None` when no model has been chosen (or downloaded) yet.
    fn selected_model_path(&self) -> Option<PathBuf>;
}

/// A model path fixed at construction.
#[derive(Debug, Clone, Default)]
pub struct FixedModelPath(pub Option<PathBuf>);

impl FixedModelPath {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(Some(path.into()))
    }

    pub fn none() -> Self {
        Self(None)
    }
}

impl ModelPathProvider for FixedModelPath {
    fn selected_model_path(&self) -> Option<PathBuf> {
        self.0.clone()
    }
}

/// Supplies goal/task snapshots immediately before a resolution.
#[async_trait]
pub trait ContextProvider: Send + Sync {
    async fn goals(&self) -> Result<Vec<GoalContext>>;

    async fn tasks(&self) -> Result<Vec<TaskContext>>;
}

// Compile-time assertion: both collaborator traits must be object-safe.
const _: () = {
    fn _assert_object_safe(_: &dyn ModelPathProvider, _: &dyn ContextProvider) {}
};

/// Context held in memory.
#[derive(Debug, Clone, Default)]
pub struct StaticContext {
    pub goals: Vec<GoalContext>,
    pub tasks: Vec<TaskContext>,
}

impl StaticContext {
    pub fn new(goals: Vec<GoalContext>, tasks: Vec<TaskContext>) -> Self {
        Self { goals, tasks }
    }
}

#[async_trait]
impl ContextProvider for StaticContext {
    async fn goals(&self) -> Result<Vec<GoalContext>> {
        Ok(self.goals.clone())
    }

    async fn tasks(&self) -> Result<Vec<TaskContext>> {
        Ok(self.tasks.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_model_path() {
        assert_eq!(
            FixedModelPath::new("/m/a.gguf").selected_model_path(),
            Some(PathBuf::from("/m/a.gguf"))
        );
        assert_eq!(FixedModelPath::none().selected_model_path(), None);
    }

    #[tokio::test]
    async fn static_context_returns_copies() {
        let provider = StaticContext::new(vec![], vec![TaskContext::new("Read", false, None)]);
        assert!(provider.goals().await.unwrap().is_empty());
        assert_eq!(provider.tasks().await.unwrap().len(), 1);
    }
}
