mod config;
mod context_file;
mod info_cmd;
mod parse_cmd;
mod resolve_cmd;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use stride_core::prompt::Dialect;

use config::{BackendKind, CliOverrides, StrideConfig};

#[derive(Parser)]
#[command(name = "stride", about = "Turn free-form requests into goal and task actions")]
struct Cli {
    /// Model file to load (overrides STRIDE_MODEL_PATH env var)
    #[arg(long, global = true)]
    model: Option<PathBuf>,

    /// Prompt dialect: plain, chat_ml, or llama (overrides STRIDE_DIALECT)
    #[arg(long, global = true)]
    dialect: Option<Dialect>,

    /// Inference engine: keyword or none (overrides STRIDE_BACKEND)
    #[arg(long, global = true)]
    backend: Option<BackendKind>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a default stride config file
    Init {
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// Resolve a request into an action and print it as JSON
    Resolve {
        /// The user's request
        text: String,
        /// Maximum tokens to generate
        #[arg(long)]
        max_tokens: Option<i32>,
        /// TOML file with [[goals]] and [[tasks]] to use as context
        #[arg(long)]
        context: Option<PathBuf>,
    },
    /// Print the prompt the model would receive for a request
    Prompt {
        /// The user's request
        text: String,
        /// TOML file with [[goals]] and [[tasks]] to use as context
        #[arg(long)]
        context: Option<PathBuf>,
    },
    /// Interpret raw model output read from stdin
    Parse,
    /// Show the inference engine and resolved configuration
    Info {
        /// Load the selected model and print its details
        #[arg(long)]
        load: bool,
    },
}

/// Execute the `stride init` command: write config file.
fn cmd_init(model: Option<PathBuf>, force: bool) -> anyhow::Result<()> {
    let path = config::config_path();

    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }

    let mut cfg = config::ConfigFile::default();
    cfg.model.path = model;
    config::save_config_to(&path, &cfg)?;

    println!("Config written to {}", path.display());
    match &cfg.model.path {
        Some(model) => println!("  model.path = {}", model.display()),
        None => println!("  model.path = (unset)"),
    }
    println!("  backend.kind = {}", cfg.backend.kind);
    println!();
    println!("Next: run `stride resolve \"add task Buy milk\"`.");

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut overrides = CliOverrides {
        model: cli.model,
        dialect: cli.dialect,
        backend: cli.backend,
        max_tokens: None,
    };

    match cli.command {
        Commands::Init { force } => {
            cmd_init(overrides.model, force)?;
        }
        Commands::Resolve {
            text,
            max_tokens,
            context,
        } => {
            overrides.max_tokens = max_tokens;
            let resolved = StrideConfig::resolve(&overrides)?;
            resolve_cmd::run_resolve(&resolved, &text, context.as_deref()).await?;
        }
        Commands::Prompt { text, context } => {
            let resolved = StrideConfig::resolve(&overrides)?;
            resolve_cmd::run_prompt(&resolved, &text, context.as_deref()).await?;
        }
        Commands::Parse => {
            parse_cmd::run_parse()?;
        }
        Commands::Info { load } => {
            let resolved = StrideConfig::resolve(&overrides)?;
            info_cmd::run_info(&resolved, load).await?;
        }
    }

    Ok(())
}
