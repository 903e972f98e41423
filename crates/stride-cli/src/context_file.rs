//! Goal/task context read from a TOML file.
//!
//! ```toml
//! [[goals]]
//! title = "Learn Guitar"
//! daily_minutes = 20
//! end_date = "2026-12-31"
//!
//! [[tasks]]
//! title = "Practice scales"
//! minutes = 15
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use stride_core::action::{GoalContext, TaskContext};
use stride_core::resolver::ContextProvider;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ContextFile {
    goals: Vec<GoalContext>,
    tasks: Vec<TaskContext>,
}

/// [`ContextProvider`] that re-reads its file on every call, so edits
/// between resolutions are picked up.
#[derive(Debug, Clone)]
pub struct FileContextProvider {
    path: PathBuf,
}

impl FileContextProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn read(&self) -> Result<ContextFile> {
        let contents = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("failed to read context file {}", self.path.display()))?;
        toml::from_str(&contents)
            .with_context(|| format!("failed to parse context file {}", self.path.display()))
    }
}

#[async_trait]
impl ContextProvider for FileContextProvider {
    async fn goals(&self) -> Result<Vec<GoalContext>> {
        Ok(self.read().await?.goals)
    }

    async fn tasks(&self) -> Result<Vec<TaskContext>> {
        Ok(self.read().await?.tasks)
    }
}
