//! The `InferenceBackend` trait -- the adapter interface for local engines.
//!
//! Each concrete engine binding implements this trait. Calls are blocking
//! (model loading maps files, generation is CPU bound); the lifecycle
//! manager moves them onto the blocking thread pool. The trait is
//! object-safe so it can be shared as `Arc<dyn InferenceBackend>`.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// Opaque engine handle. [`NULL_HANDLE`] means "nothing loaded".
pub type RawHandle = u64;

/// The sentinel handle value an engine returns when loading fails.
pub const NULL_HANDLE: RawHandle = 0;

/// Errors crossing the native boundary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    #[error("inference library is not available")]
    Unavailable,

    #[error("model load failed: {0}")]
    LoadFailed(String),

    #[error("invalid model handle: {0}")]
    InvalidHandle(RawHandle),

    #[error("generation failed: {0}")]
    Generation(String),

    #[error("generation cancelled")]
    Cancelled,
}

/// Engine parameters applied when a model is loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadParams {
    /// Context window in tokens.
    pub context_size: u32,
    /// Worker threads used for generation.
    pub threads: u32,
}

impl LoadParams {
    pub const DEFAULT_CONTEXT_SIZE: u32 = 2048;
    pub const DEFAULT_THREADS: u32 = 4;
}

impl Default for LoadParams {
    fn default() -> Self {
        Self {
            context_size: Self::DEFAULT_CONTEXT_SIZE,
            threads: Self::DEFAULT_THREADS,
        }
    }
}

/// Adapter interface for a locally hosted language-model engine.
///
/// Implementors own whatever native state backs a [`RawHandle`]. They do
/// not need their own locking around a single handle: the lifecycle
/// manager never calls `run` reentrantly.
pub trait InferenceBackend: Send + Sync {
    /// Human-readable engine name (e.g. "keyword").
    fn name(&self) -> &str;

    /// Engine/library version string.
    fn version(&self) -> String;

    /// Load a model file and return its handle.
    ///
    /// Returning `Ok(NULL_HANDLE)` is treated as a failed load.
    fn load(&self, path: &Path, params: &LoadParams) -> Result<RawHandle, BackendError>;

    /// Generate up to `max_tokens` tokens of text for `prompt`.
    ///
    /// Implementations should poll `cancel` between tokens and return
    /// [`BackendError::Cancelled`] once it fires.
    fn run(
        &self,
        handle: RawHandle,
        prompt: &str,
        max_tokens: i32,
        cancel: &CancellationToken,
    ) -> Result<String, BackendError>;

    /// Free a handle. Freeing [`NULL_HANDLE`] must be a no-op.
    fn unload(&self, handle: RawHandle) -> Result<(), BackendError>;
}

// Compile-time assertion: InferenceBackend must be object-safe.
const _: () = {
    fn _assert_object_safe(_: &dyn InferenceBackend) {}
};

#[cfg(test)]
mod tests {
    use super::*;

    /// Engine that refuses every model, used only to prove the trait can be
    /// implemented and used as `dyn InferenceBackend`.
    struct RefusingBackend;

    impl InferenceBackend for RefusingBackend {
        fn name(&self) -> &str {
            "refusing"
        }

        fn version(&self) -> String {
            "0".to_string()
        }

        fn load(&self, _path: &Path, _params: &LoadParams) -> Result<RawHandle, BackendError> {
            Ok(NULL_HANDLE)
        }

        fn run(
            &self,
            handle: RawHandle,
            _prompt: &str,
            _max_tokens: i32,
            _cancel: &CancellationToken,
        ) -> Result<String, BackendError> {
            Err(BackendError::InvalidHandle(handle))
        }

        fn unload(&self, _handle: RawHandle) -> Result<(), BackendError> {
            Ok(())
        }
    }

    #[test]
    fn backend_is_object_safe() {
        let backend: Box<dyn InferenceBackend> = Box::new(RefusingBackend);
        assert_eq!(backend.name(), "refusing");
        assert_eq!(
            backend.load(Path::new("/models/x.gguf"), &LoadParams::default()),
            Ok(NULL_HANDLE)
        );
        assert_eq!(
            backend.run(7, "hi", 16, &CancellationToken::new()),
            Err(BackendError::InvalidHandle(7))
        );
        assert!(backend.unload(NULL_HANDLE).is_ok());
    }

    #[test]
    fn load_params_defaults() {
        let params = LoadParams::default();
        assert_eq!(params.context_size, 2048);
        assert_eq!(params.threads, 4);
    }
}
