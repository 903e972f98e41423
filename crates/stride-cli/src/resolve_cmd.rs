//! `stride resolve` and `stride prompt` commands.

use std::path::Path;

use anyhow::{Context, Result};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use stride_core::prompt::build_prompt;
use stride_core::resolver::{ContextProvider, ResolveOutcome, StaticContext};

use crate::config::StrideConfig;
use crate::context_file::FileContextProvider;

/// Context from `path`, or an empty context when no file was given.
pub fn context_provider(path: Option<&Path>) -> Box<dyn ContextProvider> {
    match path {
        Some(path) => Box::new(FileContextProvider::new(path)),
        None => Box::new(StaticContext::default()),
    }
}

/// The printed form of an outcome: the contract JSON plus the stage that
/// produced it.
pub fn outcome_json(outcome: &ResolveOutcome) -> Value {
    json!({
        "source": outcome.source,
        "action": outcome.action.to_contract_json(),
    })
}

/// Run the resolve command. Ctrl-C cancels an in-flight generation, which
/// drops the request through to the command parser.
pub async fn run_resolve(config: &StrideConfig, text: &str, context: Option<&Path>) -> Result<()> {
    let resolver = config.build_resolver();
    let provider = context_provider(context);

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupted, cancelling generation");
            interrupt.cancel();
        }
    });

    let result = resolver.resolve_from(text, provider.as_ref(), &cancel).await;
    watcher.abort();

    if let Err(e) = resolver.manager().unload().await {
        tracing::warn!(error = %e, "failed to unload model");
    }

    let outcome = result?;
    let rendered =
        serde_json::to_string_pretty(&outcome_json(&outcome)).context("failed to serialize action")?;
    println!("{rendered}");
    Ok(())
}

/// Run the prompt command: print exactly what the model would be given.
pub async fn run_prompt(config: &StrideConfig, text: &str, context: Option<&Path>) -> Result<()> {
    let provider = context_provider(context);
    let goals = provider.goals().await?;
    let tasks = provider.tasks().await?;
    print!("{}", build_prompt(text, &goals, &tasks, config.resolver.dialect));
    Ok(())
}
