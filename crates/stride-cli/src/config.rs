//! Configuration file management for stride.
//!
//! Provides a TOML-based config file at `~/.config/stride/config.toml` and a
//! resolution chain: CLI flag > env var > config file > default.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use stride_core::backend::{InferenceCapability, KeywordBackend, LoadParams};
use stride_core::model::{ManagerConfig, ModelLifecycleManager};
use stride_core::prompt::Dialect;
use stride_core::resolver::{ActionResolver, DEFAULT_MAX_TOKENS, FixedModelPath, ResolverConfig};

pub const ENV_MODEL_PATH: &str = "STRIDE_MODEL_PATH";
pub const ENV_DIALECT: &str = "STRIDE_DIALECT";
pub const ENV_BACKEND: &str = "STRIDE_BACKEND";

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub model: ModelSection,
    pub backend: BackendSection,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSection {
    /// Model file handed to the backend on the first resolution.
    pub path: Option<PathBuf>,
    pub dialect: Dialect,
    pub max_tokens: i32,
    pub context_size: u32,
    pub threads: u32,
    /// Upper bound on one generation; absent means no limit.
    pub generation_timeout_secs: Option<u64>,
}

impl Default for ModelSection {
    fn default() -> Self {
        Self {
            path: None,
            dialect: Dialect::default(),
            max_tokens: DEFAULT_MAX_TOKENS,
            context_size: LoadParams::DEFAULT_CONTEXT_SIZE,
            threads: LoadParams::DEFAULT_THREADS,
            generation_timeout_secs: None,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendSection {
    pub kind: BackendKind,
}

/// Which inference engine the CLI wires into the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// The built-in keyword heuristic engine.
    #[default]
    Keyword,
    /// No engine: every request goes through the command parser.
    None,
}

impl BackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BackendKind::Keyword => "keyword",
            BackendKind::None => "none",
        }
    }

    pub fn capability(self) -> InferenceCapability {
        match self {
            BackendKind::Keyword => InferenceCapability::available(KeywordBackend::new()),
            BackendKind::None => InferenceCapability::unavailable(),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "keyword" => Ok(BackendKind::Keyword),
            "none" | "off" => Ok(BackendKind::None),
            other => anyhow::bail!("unknown backend {other:?} (expected keyword or none)"),
        }
    }
}

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// Return the stride config directory.
///
/// Always uses XDG layout: `$XDG_CONFIG_HOME/stride` or `~/.config/stride`.
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("stride");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("stride")
}

/// Return the path to the stride config file.
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

// -----------------------------------------------------------------------
// Read / write
// -----------------------------------------------------------------------

/// Load and parse the config file at `path`.
pub fn load_config_from(path: &Path) -> Result<ConfigFile> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    let config: ConfigFile = toml::from_str(&contents)
        .with_context(|| format!("failed to parse config file at {}", path.display()))?;
    Ok(config)
}

/// Serialize and write the config file to `path`, creating parent dirs as
/// needed. Sets file permissions to 0600 on Unix.
pub fn save_config_to(path: &Path, config: &ConfigFile) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create config directory {}", dir.display()))?;
    }

    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(path, &contents)
        .with_context(|| format!("failed to write config file at {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(path, perms)
            .with_context(|| format!("failed to set permissions on {}", path.display()))?;
    }

    Ok(())
}

// -----------------------------------------------------------------------
// Resolved config
// -----------------------------------------------------------------------

/// Values given on the command line. `None` defers to the rest of the chain.
#[derive(Debug, Default)]
pub struct CliOverrides {
    pub model: Option<PathBuf>,
    pub dialect: Option<Dialect>,
    pub backend: Option<BackendKind>,
    pub max_tokens: Option<i32>,
}

/// Fully resolved configuration, ready for use.
#[derive(Debug)]
pub struct StrideConfig {
    pub model_path: Option<PathBuf>,
    pub backend: BackendKind,
    pub manager: ManagerConfig,
    pub resolver: ResolverConfig,
}

impl StrideConfig {
    /// Resolve configuration using the chain: CLI flag > env var > config file > default.
    ///
    /// - Model path: `--model` > `STRIDE_MODEL_PATH` > `model.path` > none
    /// - Dialect: `--dialect` > `STRIDE_DIALECT` > `model.dialect` > plain
    /// - Backend: `--backend` > `STRIDE_BACKEND` > `backend.kind` > keyword
    /// - Token budget: `--max-tokens` > `model.max_tokens` > 256
    ///
    /// A missing config file is not an error; a malformed one is.
    pub fn resolve(cli: &CliOverrides) -> Result<Self> {
        let path = config_path();
        let file_config = if path.exists() {
            load_config_from(&path)?
        } else {
            ConfigFile::default()
        };
        Self::from_sources(cli, file_config)
    }

    fn from_sources(cli: &CliOverrides, file: ConfigFile) -> Result<Self> {
        let model_path = if let Some(path) = &cli.model {
            Some(path.clone())
        } else if let Ok(path) = std::env::var(ENV_MODEL_PATH) {
            Some(PathBuf::from(path))
        } else {
            file.model.path
        };

        let dialect = if let Some(dialect) = cli.dialect {
            dialect
        } else if let Ok(name) = std::env::var(ENV_DIALECT) {
            name.parse::<Dialect>()
                .with_context(|| format!("{ENV_DIALECT} env var is not a known dialect"))?
        } else {
            file.model.dialect
        };

        let backend = if let Some(kind) = cli.backend {
            kind
        } else if let Ok(name) = std::env::var(ENV_BACKEND) {
            name.parse::<BackendKind>()
                .with_context(|| format!("{ENV_BACKEND} env var is not a known backend"))?
        } else {
            file.backend.kind
        };

        let max_tokens = cli.max_tokens.unwrap_or(file.model.max_tokens);
        if max_tokens < 1 {
            anyhow::bail!("max tokens must be positive, got {max_tokens}");
        }

        let manager = ManagerConfig {
            load: LoadParams {
                context_size: file.model.context_size,
                threads: file.model.threads,
            },
            generation_timeout: file.model.generation_timeout_secs.map(Duration::from_secs),
        };

        Ok(Self {
            model_path,
            backend,
            manager,
            resolver: ResolverConfig {
                dialect,
                max_tokens,
            },
        })
    }

    /// Wire a resolver (and its lifecycle manager) from this configuration.
    pub fn build_resolver(&self) -> ActionResolver {
        let manager = Arc::new(ModelLifecycleManager::new(
            self.backend.capability(),
            self.manager.clone(),
        ));
        ActionResolver::new(
            manager,
            Arc::new(FixedModelPath(self.model_path.clone())),
            self.resolver.clone(),
        )
    }
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------
