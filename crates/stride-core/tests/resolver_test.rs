//! Integration tests for the action resolver: stage ordering, graceful
//! degradation when the model is missing or misbehaves, and serialization
//! of concurrent resolutions onto one native call at a time.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use futures::future::join_all;
use tokio_util::sync::CancellationToken;

use stride_core::action::{Action, DueDate, GoalContext, TaskContext};
use stride_core::backend::{BackendError, InferenceCapability, KeywordBackend};
use stride_core::model::{ManagerConfig, ModelLifecycleManager};
use stride_core::prompt::{Dialect, NO_CONTEXT, USER_MARKER};
use stride_core::resolver::{
    ActionResolver, ContextProvider, FixedModelPath, ResolveError, ResolverConfig, Source,
};
use stride_test_utils::{InstrumentedBackend, sample_goals, sample_tasks};

const MODEL: &str = "/models/tiny.gguf";

fn resolver_with(backend: &Arc<InstrumentedBackend>, config: ResolverConfig) -> ActionResolver {
    let manager = Arc::new(ModelLifecycleManager::new(
        InferenceCapability::from_arc(backend.clone()),
        ManagerConfig::default(),
    ));
    ActionResolver::new(manager, Arc::new(FixedModelPath::new(MODEL)), config)
}

fn resolver(backend: &Arc<InstrumentedBackend>) -> ActionResolver {
    resolver_with(backend, ResolverConfig::default())
}

fn offline_resolver() -> ActionResolver {
    let manager = Arc::new(ModelLifecycleManager::new(
        InferenceCapability::unavailable(),
        ManagerConfig::default(),
    ));
    ActionResolver::new(
        manager,
        Arc::new(FixedModelPath::none()),
        ResolverConfig::default(),
    )
}

async fn resolve(resolver: &ActionResolver, text: &str) -> Result<(Action, Source), ResolveError> {
    resolver
        .resolve_detailed(text, &[], &[], 128, &CancellationToken::new())
        .await
        .map(|outcome| (outcome.action, outcome.source))
}

// ---------------------------------------------------------------------------
// Model stage
// ---------------------------------------------------------------------------

#[tokio::test]
async fn fenced_model_reply_is_parsed() {
    let backend = Arc::new(InstrumentedBackend::new().with_response(
        "```json\n{\"action\":\"reply\",\"message\":\"Found it!\",\"data\":{}}\n```",
    ));
    let (action, source) = resolve(&resolver(&backend), "where is my list?")
        .await
        .unwrap();
    assert_eq!(action, Action::reply("Found it!"));
    assert_eq!(source, Source::Model);
}

#[tokio::test]
async fn structured_create_goal_from_model() {
    let backend = Arc::new(InstrumentedBackend::new().with_response(
        r#"{"action":"create_goal","message":"ok","data":{"goalTitle":"Learn Guitar","durationMonths":2,"dailyMinutes":20}}"#,
    ));
    let (action, source) = resolve(&resolver(&backend), "I want to learn guitar")
        .await
        .unwrap();
    assert_eq!(
        action,
        Action::CreateGoal {
            message: "ok".to_string(),
            goal_title: "Learn Guitar".to_string(),
            duration_months: 2,
            daily_minutes: 20,
        }
    );
    assert_eq!(source, Source::Model);
}

#[tokio::test]
async fn model_output_wins_over_command_parser() {
    let backend = Arc::new(InstrumentedBackend::new().with_response(
        r#"{"action":"delete_task","message":"Removing it.","data":{"taskTitle":"Review notes"}}"#,
    ));
    let (action, source) = resolve(&resolver(&backend), "complete task Review notes")
        .await
        .unwrap();
    assert!(matches!(action, Action::DeleteTask { .. }));
    assert_eq!(source, Source::Model);
}

#[tokio::test]
async fn prompt_carries_context_dialect_and_budget() {
    let backend = Arc::new(InstrumentedBackend::new());
    let config = ResolverConfig {
        dialect: Dialect::ChatMl,
        max_tokens: 99,
    };
    let resolver = resolver_with(&backend, config);

    resolver
        .resolve("hello", &sample_goals(), &sample_tasks(), 99)
        .await
        .unwrap();

    let (prompt, max_tokens) = backend.last_prompt().unwrap();
    assert_eq!(max_tokens, 99);
    assert!(prompt.starts_with("<|im_start|>system"));
    assert!(prompt.contains("- Learn Guitar|20 min|ends:2026-12-31"));
    assert!(prompt.contains("- [x] Buy running shoes"));
    assert!(prompt.contains(&format!("{USER_MARKER}\nhello")));
}

// ---------------------------------------------------------------------------
// Fallback ordering
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unparseable_output_falls_back_to_command_parser() {
    let backend = Arc::new(InstrumentedBackend::new().with_response("I think you mean {that"));
    let (action, source) = resolve(&resolver(&backend), "complete task Review notes")
        .await
        .unwrap();
    assert_eq!(action, Action::complete_task("Review notes"));
    assert_eq!(source, Source::Fallback);
}

#[tokio::test]
async fn unparseable_output_without_command_is_echoed() {
    let backend = Arc::new(
        InstrumentedBackend::new().with_response("```\nSure, happy to chat about guitars.\n```"),
    );
    let (action, source) = resolve(&resolver(&backend), "do you like guitars?")
        .await
        .unwrap();
    assert_eq!(action, Action::reply("Sure, happy to chat about guitars."));
    assert_eq!(source, Source::RawModelText);
}

#[tokio::test]
async fn blank_model_output_without_command_is_rephrase() {
    let backend = Arc::new(InstrumentedBackend::new().with_response("   "));
    let (action, source) = resolve(&resolver(&backend), "do you like guitars?")
        .await
        .unwrap();
    assert_eq!(action, Action::rephrase());
    assert_eq!(source, Source::RawModelText);
}

#[tokio::test]
async fn generation_failure_falls_back() {
    let backend = Arc::new(
        InstrumentedBackend::new().with_run_error(BackendError::Generation("oom".into())),
    );
    let resolver = resolver(&backend);

    let (action, source) = resolve(&resolver, "add task \"Practice scales\" tomorrow for 25 minutes")
        .await
        .unwrap();
    assert_eq!(
        action,
        Action::create_task("Practice scales", DueDate::Tomorrow, 25, None)
    );
    assert_eq!(source, Source::Fallback);

    let err = resolve(&resolver, "do you like guitars?").await.unwrap_err();
    let ResolveError::NoResolution { reason } = err;
    assert!(reason.contains("oom"), "reason {reason}");
}

#[tokio::test]
async fn load_failure_falls_back_without_running() {
    let backend = Arc::new(
        InstrumentedBackend::new().with_load_error(BackendError::LoadFailed("corrupt".into())),
    );
    let resolver = resolver(&backend);

    let (action, source) = resolve(&resolver, "show progress").await.unwrap();
    assert_eq!(action, Action::show_progress());
    assert_eq!(source, Source::Fallback);
    assert_eq!(backend.runs(), 0);
}

#[tokio::test]
async fn missing_model_selection_falls_back() {
    let backend = Arc::new(InstrumentedBackend::new());
    let manager = Arc::new(ModelLifecycleManager::new(
        InferenceCapability::from_arc(backend.clone()),
        ManagerConfig::default(),
    ));
    let resolver = ActionResolver::new(
        manager,
        Arc::new(FixedModelPath::none()),
        ResolverConfig::default(),
    );

    let (action, _) = resolve(&resolver, "delete goal Learn Guitar").await.unwrap();
    assert_eq!(action, Action::delete_goal("Learn Guitar"));
    assert_eq!(backend.loads(), 0);

    let ResolveError::NoResolution { reason } =
        resolve(&resolver, "do you like guitars?").await.unwrap_err();
    assert!(reason.contains("no model file selected"), "reason {reason}");
}

#[tokio::test]
async fn no_backend_and_no_match_is_the_only_hard_failure() {
    let resolver = offline_resolver();

    assert!(resolve(&resolver, "show progress").await.is_ok());
    assert!(resolve(&resolver, "complete task Review notes").await.is_ok());

    let err = resolve(&resolver, "what's the weather like?")
        .await
        .unwrap_err();
    assert!(matches!(err, ResolveError::NoResolution { .. }));
}

#[tokio::test]
async fn empty_text_is_rephrase_not_error() {
    let backend = Arc::new(InstrumentedBackend::new());
    let (action, source) = resolve(&resolver(&backend), "").await.unwrap();
    assert_eq!(action, Action::rephrase());
    assert_eq!(source, Source::Rephrase);
    assert_eq!(backend.loads(), 0);
    assert_eq!(backend.runs(), 0);

    let (action, _) = resolve(&offline_resolver(), "  \n ").await.unwrap();
    assert_eq!(action, Action::rephrase());
}

#[tokio::test]
async fn cancelled_resolution_still_uses_command_parser() {
    let backend = Arc::new(InstrumentedBackend::new());
    let resolver = resolver(&backend);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let action = resolver
        .resolve_with_cancel("show progress", &[], &[], 64, &cancel)
        .await
        .unwrap();
    assert_eq!(action, Action::show_progress());
    assert_eq!(backend.loads(), 0);
    assert_eq!(backend.runs(), 0);
    assert!(!resolver.manager().is_loaded());
}

// ---------------------------------------------------------------------------
// Lifecycle and concurrency
// ---------------------------------------------------------------------------

#[tokio::test]
async fn model_is_loaded_lazily_once() {
    let backend = Arc::new(InstrumentedBackend::new());
    let resolver = resolver(&backend);
    assert!(!resolver.manager().is_loaded());

    for text in ["hello", "hi again", "one more"] {
        resolve(&resolver, text).await.unwrap();
    }
    assert_eq!(backend.loads(), 1);
    assert_eq!(backend.runs(), 3);
    assert!(resolver.manager().is_loaded());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_resolutions_never_overlap_native_calls() {
    let backend = Arc::new(InstrumentedBackend::new().with_run_delay(Duration::from_millis(20)));
    let resolver = Arc::new(resolver(&backend));

    let calls = (0..6).map(|i| {
        let resolver = Arc::clone(&resolver);
        tokio::spawn(async move {
            resolver
                .resolve(&format!("request {i}"), &[], &[], 32)
                .await
        })
    });
    for joined in join_all(calls).await {
        assert_eq!(joined.unwrap().unwrap(), Action::reply("ok"));
    }

    assert_eq!(backend.loads(), 1);
    assert_eq!(backend.runs(), 6);
    assert_eq!(backend.max_concurrency(), 1);
}

// ---------------------------------------------------------------------------
// Context providers
// ---------------------------------------------------------------------------

struct FailingContext;

#[async_trait]
impl ContextProvider for FailingContext {
    async fn goals(&self) -> Result<Vec<GoalContext>> {
        Err(anyhow!("database locked"))
    }

    async fn tasks(&self) -> Result<Vec<TaskContext>> {
        Err(anyhow!("database locked"))
    }
}

#[tokio::test]
async fn failing_context_degrades_to_empty() {
    let backend = Arc::new(InstrumentedBackend::new());
    let resolver = resolver(&backend);

    let outcome = resolver
        .resolve_from("hello", &FailingContext, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(outcome.source, Source::Model);

    let (prompt, max_tokens) = backend.last_prompt().unwrap();
    assert!(prompt.contains(NO_CONTEXT));
    assert_eq!(max_tokens, resolver.config().max_tokens);
}

#[tokio::test]
async fn keyword_backend_runs_the_whole_pipeline() {
    let manager = Arc::new(ModelLifecycleManager::new(
        InferenceCapability::available(KeywordBackend::new()),
        ManagerConfig::default(),
    ));
    let resolver = ActionResolver::new(
        manager,
        Arc::new(FixedModelPath::new(MODEL)),
        ResolverConfig::default(),
    );

    let (goals, tasks) = (sample_goals(), sample_tasks());
    for text in ["add a task \"Stretch\"", "how am i doing?"] {
        let outcome = resolver
            .resolve_detailed(text, &goals, &tasks, 64, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome.source, Source::Model, "text {text:?}");
    }

    let action = resolver
        .resolve("add a task \"Stretch\"", &[], &[], 64)
        .await
        .unwrap();
    assert_eq!(
        action,
        Action::create_task("Stretch", DueDate::Today, 30, None)
            .with_message("I'll add the task: Stretch")
    );
}
