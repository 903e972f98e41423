//! `stride info` command: show the engine and the resolved configuration.

use anyhow::{Context, Result};

use crate::config::{self, StrideConfig};

/// Run the info command. With `load`, also load the selected model and
/// print its details as JSON.
pub async fn run_info(config: &StrideConfig, load: bool) -> Result<()> {
    let resolver = config.build_resolver();
    let manager = resolver.manager();

    let model = config
        .model_path
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "(none selected)".to_string());
    let timeout = config
        .manager
        .generation_timeout
        .map(|t| format!("{}s", t.as_secs()))
        .unwrap_or_else(|| "none".to_string());

    println!("Engine:        {}", manager.capability().describe());
    println!("Config file:   {}", config::config_path().display());
    println!("Model:         {model}");
    println!("Dialect:       {}", resolver.config().dialect);
    println!("Max tokens:    {}", resolver.config().max_tokens);
    println!("Context size:  {}", config.manager.load.context_size);
    println!("Threads:       {}", config.manager.load.threads);
    println!("Timeout:       {timeout}");

    if !load {
        return Ok(());
    }

    let Some(path) = &config.model_path else {
        anyhow::bail!("no model selected; pass --model or set {}", config::ENV_MODEL_PATH);
    };
    manager.load(path).await?;
    let info = manager
        .info()
        .await
        .context("model reported loaded but has no details")?;
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(&info).context("failed to serialize model info")?
    );
    manager.unload().await?;
    Ok(())
}
