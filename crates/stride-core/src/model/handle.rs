//! Owned native model handle.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::ModelError;
use crate::backend::{BackendError, InferenceBackend, LoadParams, NULL_HANDLE, RawHandle};

/// A loaded model.
///
/// Created only by a successful backend load and freed exactly once: by
/// [`ModelHandle::release`], or on drop if it was never released. The
/// raw handle never leaves this type.
pub struct ModelHandle {
    raw: RawHandle,
    path: PathBuf,
    params: LoadParams,
    backend: Arc<dyn InferenceBackend>,
    released: bool,
}

impl ModelHandle {
    /// Load `path` through `backend`. A null handle counts as a failed load.
    pub(crate) fn acquire(
        backend: Arc<dyn InferenceBackend>,
        path: &Path,
        params: &LoadParams,
    ) -> Result<Self, ModelError> {
        let raw = backend
            .load(path, params)
            .map_err(|source| ModelError::ModelLoadFailure {
                path: path.to_path_buf(),
                source,
            })?;

        if raw == NULL_HANDLE {
            return Err(ModelError::ModelLoadFailure {
                path: path.to_path_buf(),
                source: BackendError::LoadFailed("backend returned a null handle".to_string()),
            });
        }

        Ok(Self {
            raw,
            path: path.to_path_buf(),
            params: params.clone(),
            backend,
            released: false,
        })
    }

    /// Path the model was loaded from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn params(&self) -> &LoadParams {
        &self.params
    }

    /// Blocking generation on this handle.
    pub(crate) fn run(
        &self,
        prompt: &str,
        max_tokens: i32,
        cancel: &CancellationToken,
    ) -> Result<String, ModelError> {
        self.backend
            .run(self.raw, prompt, max_tokens, cancel)
            .map_err(ModelError::from_backend)
    }

    /// Free the native handle. The handle is consumed even when the
    /// backend reports an error.
    pub(crate) fn release(mut self) -> Result<(), ModelError> {
        self.released = true;
        self.backend
            .unload(self.raw)
            .map_err(ModelError::from_backend)
    }
}

impl Drop for ModelHandle {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = self.backend.unload(self.raw) {
            tracing::warn!(
                path = %self.path.display(),
                error = %e,
                "failed to unload model on drop"
            );
        }
    }
}

impl fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelHandle")
            .field("path", &self.path)
            .field("params", &self.params)
            .field("backend", &self.backend.name())
            .finish()
    }
}
