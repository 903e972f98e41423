//! Action resolution: the single entry point that always tries to yield
//! an [`Action`].
//!
//! Order of preference for one call:
//!
//! 1. Blank input: the fixed "please rephrase" reply, no model work.
//! 2. Lazily load the selected model if none is loaded.
//! 3. Build the prompt, generate, and strictly parse the model output.
//! 4. Run the deterministic command parser on the user's text.
//! 5. Wrap whatever the model said as a plain reply.
//! 6. Give up with [`ResolveError::NoResolution`].
//!
//! Failures in steps 2-3 are logged and fall through; only step 6 is an
//! error.

pub mod providers;

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::action::{Action, GoalContext, TaskContext};
use crate::fallback;
use crate::model::{ModelError, ModelLifecycleManager};
use crate::prompt::{Dialect, build_prompt};
use crate::response;

pub use providers::{ContextProvider, FixedModelPath, ModelPathProvider, StaticContext};

/// Token budget used when the caller does not pick one.
pub const DEFAULT_MAX_TOKENS: i32 = 256;

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("could not resolve the request: {reason}")]
    NoResolution { reason: String },
}

/// Resolver configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverConfig {
    pub dialect: Dialect,
    pub max_tokens: i32,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            dialect: Dialect::default(),
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

/// Which stage produced the action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    /// Structured model output.
    Model,
    /// The deterministic command parser.
    Fallback,
    /// Unstructured model output wrapped as a reply.
    RawModelText,
    /// Blank input.
    Rephrase,
}

impl Source {
    pub fn as_str(self) -> &'static str {
        match self {
            Source::Model => "model",
            Source::Fallback => "fallback",
            Source::RawModelText => "raw_model_text",
            Source::Rephrase => "rephrase",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveOutcome {
    pub action: Action,
    pub source: Source,
}

impl ResolveOutcome {
    fn new(action: Action, source: Source) -> Self {
        Self { action, source }
    }
}

/// Orchestrates prompt building, generation, parsing and the command
/// parser fallback.
pub struct ActionResolver {
    manager: Arc<ModelLifecycleManager>,
    model_path: Arc<dyn ModelPathProvider>,
    config: ResolverConfig,
}

impl ActionResolver {
    pub fn new(
        manager: Arc<ModelLifecycleManager>,
        model_path: Arc<dyn ModelPathProvider>,
        config: ResolverConfig,
    ) -> Self {
        Self {
            manager,
            model_path,
            config,
        }
    }

    pub fn manager(&self) -> &Arc<ModelLifecycleManager> {
        &self.manager
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Resolve `user_message` into an action.
    pub async fn resolve(
        &self,
        user_message: &str,
        goals: &[GoalContext],
        tasks: &[TaskContext],
        max_tokens: i32,
    ) -> Result<Action, ResolveError> {
        self.resolve_with_cancel(user_message, goals, tasks, max_tokens, &CancellationToken::new())
            .await
    }

    /// Like [`Self::resolve`], with a caller-controlled cancellation token
    /// for the generation step. A cancelled generation falls through to
    /// the command parser like any other generation failure.
    pub async fn resolve_with_cancel(
        &self,
        user_message: &str,
        goals: &[GoalContext],
        tasks: &[TaskContext],
        max_tokens: i32,
        cancel: &CancellationToken,
    ) -> Result<Action, ResolveError> {
        self.resolve_detailed(user_message, goals, tasks, max_tokens, cancel)
            .await
            .map(|outcome| outcome.action)
    }

    /// Resolve using context fetched from `provider` and the configured
    /// token budget. A provider error degrades to an empty context.
    pub async fn resolve_from(
        &self,
        user_message: &str,
        provider: &dyn ContextProvider,
        cancel: &CancellationToken,
    ) -> Result<ResolveOutcome, ResolveError> {
        let goals = provider.goals().await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "failed to read goals, continuing without them");
            Vec::new()
        });
        let tasks = provider.tasks().await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "failed to read tasks, continuing without them");
            Vec::new()
        });
        self.resolve_detailed(user_message, &goals, &tasks, self.config.max_tokens, cancel)
            .await
    }

    /// Resolve and report which stage produced the action.
    pub async fn resolve_detailed(
        &self,
        user_message: &str,
        goals: &[GoalContext],
        tasks: &[TaskContext],
        max_tokens: i32,
        cancel: &CancellationToken,
    ) -> Result<ResolveOutcome, ResolveError> {
        let span = tracing::info_span!("resolve", request_id = %Uuid::new_v4());
        async move {
            if user_message.trim().is_empty() {
                tracing::debug!("blank request");
                return Ok(ResolveOutcome::new(Action::rephrase(), Source::Rephrase));
            }

            let generated = self
                .generate(user_message, goals, tasks, max_tokens, cancel)
                .await;
            let (model_text, model_failure) = match generated {
                Ok(text) => (Some(text), None),
                Err(e) => {
                    tracing::warn!(error = %e, "model stage failed, trying command parser");
                    (None, Some(e))
                }
            };

            if let Some(text) = &model_text {
                if let Some(action) = response::parse_response(text) {
                    tracing::info!(action = %action.kind(), source = "model", "resolved");
                    return Ok(ResolveOutcome::new(action, Source::Model));
                }
                tracing::debug!(len = text.len(), "model output was not a structured action");
            }

            if let Some(action) = fallback::parse_command(user_message) {
                tracing::info!(action = %action.kind(), source = "fallback", "resolved");
                return Ok(ResolveOutcome::new(action, Source::Fallback));
            }

            if let Some(text) = model_text {
                let action = response::parse_with_fallback(&text);
                tracing::info!(action = %action.kind(), source = "raw_model_text", "resolved");
                return Ok(ResolveOutcome::new(action, Source::RawModelText));
            }

            let reason = model_failure
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no model output".to_string());
            tracing::warn!(%reason, "no resolution");
            Err(ResolveError::NoResolution { reason })
        }
        .instrument(span)
        .await
    }

    /// Steps 2-3 up to raw model text.
    async fn generate(
        &self,
        user_message: &str,
        goals: &[GoalContext],
        tasks: &[TaskContext],
        max_tokens: i32,
        cancel: &CancellationToken,
    ) -> Result<String, ModelError> {
        if !self.manager.capability().is_available() {
            return Err(ModelError::NativeBackendUnavailable);
        }
        if cancel.is_cancelled() {
            return Err(ModelError::GenerationCancelled);
        }
        if !self.manager.is_loaded() {
            let path = self
                .model_path
                .selected_model_path()
                .ok_or(ModelError::ModelNotSelected)?;
            // A load already handed to the blocking pool finishes on its own.
            tokio::select! {
                loaded = self.manager.load(&path) => loaded?,
                _ = cancel.cancelled() => return Err(ModelError::GenerationCancelled),
            }
        }

        let prompt = build_prompt(user_message, goals, tasks, self.config.dialect);
        tracing::debug!(
            dialect = %self.config.dialect,
            prompt_len = prompt.len(),
            max_tokens,
            "generating"
        );
        self.manager.run(&prompt, max_tokens, cancel).await
    }
}

impl fmt::Debug for ActionResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionResolver")
            .field("manager", &self.manager)
            .field("model_path", &self.model_path.selected_model_path())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{InferenceCapability, KeywordBackend};
    use crate::model::ManagerConfig;

    fn resolver(capability: InferenceCapability, path: FixedModelPath) -> ActionResolver {
        let manager = Arc::new(ModelLifecycleManager::new(
            capability,
            ManagerConfig::default(),
        ));
        ActionResolver::new(manager, Arc::new(path), ResolverConfig::default())
    }

    #[tokio::test]
    async fn blank_input_is_rephrase_without_model() {
        let resolver = resolver(InferenceCapability::unavailable(), FixedModelPath::none());
        let outcome = resolver
            .resolve_detailed("   ", &[], &[], 64, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome.action, Action::rephrase());
        assert_eq!(outcome.source, Source::Rephrase);
    }

    #[tokio::test]
    async fn no_backend_uses_command_parser() {
        let resolver = resolver(InferenceCapability::unavailable(), FixedModelPath::none());
        let action = resolver
            .resolve("complete task Review notes", &[], &[], 64)
            .await
            .unwrap();
        assert_eq!(action, Action::complete_task("Review notes"));
    }

    #[tokio::test]
    async fn no_backend_and_no_match_fails() {
        let resolver = resolver(InferenceCapability::unavailable(), FixedModelPath::none());
        let err = resolver
            .resolve("tell me a joke", &[], &[], 64)
            .await
            .unwrap_err();
        let ResolveError::NoResolution { reason } = err;
        assert!(reason.contains("not available"), "reason {reason}");
    }

    #[tokio::test]
    async fn unselected_model_is_the_reason() {
        let resolver = resolver(
            InferenceCapability::available(KeywordBackend::new()),
            FixedModelPath::none(),
        );
        let ResolveError::NoResolution { reason } = resolver
            .resolve("tell me a joke", &[], &[], 64)
            .await
            .unwrap_err();
        assert!(reason.contains("no model file selected"), "reason {reason}");
    }

    #[tokio::test]
    async fn keyword_backend_end_to_end() {
        let resolver = resolver(
            InferenceCapability::available(KeywordBackend::new()),
            FixedModelPath::new("/models/tiny.gguf"),
        );
        let outcome = resolver
            .resolve_detailed(
                "create goal \"Learn Rust\"",
                &[],
                &[],
                64,
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(outcome.source, Source::Model);
        match outcome.action {
            Action::CreateGoal { goal_title, .. } => assert_eq!(goal_title, "Learn Rust"),
            other => panic!("expected CreateGoal, got {other:?}"),
        }
        assert!(resolver.manager().is_loaded());
    }

    #[tokio::test]
    async fn resolve_from_uses_provider_context() {
        let resolver = resolver(InferenceCapability::unavailable(), FixedModelPath::none());
        let provider = StaticContext::default();
        let outcome = resolver
            .resolve_from("show progress", &provider, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome.action, Action::show_progress());
        assert_eq!(outcome.source, Source::Fallback);
    }

    #[test]
    fn default_config() {
        let config = ResolverConfig::default();
        assert_eq!(config.max_tokens, DEFAULT_MAX_TOKENS);
        assert_eq!(config.dialect, Dialect::Plain);
    }
}
