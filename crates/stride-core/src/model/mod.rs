//! Model lifecycle: at most one loaded model, one native call at a time.
//!
//! ```text
//! Unloaded -> Loading   (load requested)
//! Loading  -> Loaded    (backend success)
//! Loading  -> Error     (backend failure)
//! Loaded   -> Unloaded  (unload, or reload with a different path)
//! Error    -> Loading   (retry)
//! Error    -> Unloaded  (unload after a failed load)
//! ```

pub mod handle;
pub mod manager;

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

use crate::backend::{BackendError, LoadParams, RawHandle};

pub use handle::ModelHandle;
pub use manager::ModelLifecycleManager;

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("native inference library is not available")]
    NativeBackendUnavailable,

    #[error("no model file selected")]
    ModelNotSelected,

    #[error("no model is loaded")]
    ModelNotLoaded,

    #[error("failed to load model {}: {source}", path.display())]
    ModelLoadFailure {
        path: PathBuf,
        #[source]
        source: BackendError,
    },

    #[error("invalid model handle {0}")]
    InvalidHandle(RawHandle),

    #[error("generation failed: {0}")]
    GenerationFailure(#[source] BackendError),

    #[error("generation cancelled")]
    GenerationCancelled,

    #[error("generation timed out after {0:?}")]
    GenerationTimedOut(Duration),
}

impl ModelError {
    /// Map an error from a run/unload call on a live handle.
    pub(crate) fn from_backend(e: BackendError) -> Self {
        match e {
            BackendError::Unavailable => ModelError::NativeBackendUnavailable,
            BackendError::InvalidHandle(raw) => ModelError::InvalidHandle(raw),
            BackendError::Cancelled => ModelError::GenerationCancelled,
            other => ModelError::GenerationFailure(other),
        }
    }
}

/// Observable state of the manager's model slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelState {
    #[default]
    Unloaded,
    Loading,
    Loaded,
    Error,
}

impl ModelState {
    /// Whether `from -> to` is an edge of the state graph above.
    pub fn is_valid_transition(from: ModelState, to: ModelState) -> bool {
        matches!(
            (from, to),
            (ModelState::Unloaded, ModelState::Loading)
                | (ModelState::Loading, ModelState::Loaded)
                | (ModelState::Loading, ModelState::Error)
                | (ModelState::Loaded, ModelState::Unloaded)
                | (ModelState::Error, ModelState::Loading)
                | (ModelState::Error, ModelState::Unloaded)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ModelState::Unloaded => "unloaded",
            ModelState::Loading => "loading",
            ModelState::Loaded => "loaded",
            ModelState::Error => "error",
        }
    }
}

impl fmt::Display for ModelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Manager configuration.
#[derive(Debug, Clone, Default)]
pub struct ManagerConfig {
    /// Parameters passed to every backend load.
    pub load: LoadParams,
    /// Upper bound on a single generation. `None` waits indefinitely.
    pub generation_timeout: Option<Duration>,
}

/// Snapshot of the loaded model, serialized as
/// `{"status":"loaded","path":..,"contextSize":..,"threads":..}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    pub status: ModelState,
    pub path: PathBuf,
    pub context_size: u32,
    pub threads: u32,
}

impl ModelInfo {
    pub(crate) fn from_handle(handle: &ModelHandle) -> Self {
        Self {
            status: ModelState::Loaded,
            path: handle.path().to_path_buf(),
            context_size: handle.params().context_size,
            threads: handle.params().threads,
        }
    }
}
