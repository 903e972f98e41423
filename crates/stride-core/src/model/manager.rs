//! The lifecycle manager.
//!
//! Every load, run and unload takes the same owned lock and carries the
//! guard onto the blocking pool, so the lock is held for exactly as long
//! as the native call runs. A caller that stops waiting (cancellation,
//! timeout, dropped future) gets its answer immediately, but the next
//! native call still waits for the abandoned one to return.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, watch};
use tokio_util::sync::CancellationToken;

use super::{ManagerConfig, ModelError, ModelHandle, ModelInfo, ModelState};
use crate::backend::{BackendError, InferenceBackend, InferenceCapability, LoadParams};

/// The single model slot guarded by the manager lock.
#[derive(Debug, Default)]
struct Slot {
    handle: Option<ModelHandle>,
    last_error: Option<String>,
}

/// Owns at most one loaded model and serializes all native calls on it.
#[derive(Debug)]
pub struct ModelLifecycleManager {
    capability: InferenceCapability,
    config: ManagerConfig,
    slot: Arc<Mutex<Slot>>,
    state: Arc<watch::Sender<ModelState>>,
}

impl ModelLifecycleManager {
    pub fn new(capability: InferenceCapability, config: ManagerConfig) -> Self {
        let (state, _) = watch::channel(ModelState::Unloaded);
        Self {
            capability,
            config,
            slot: Arc::new(Mutex::new(Slot::default())),
            state: Arc::new(state),
        }
    }

    pub fn capability(&self) -> &InferenceCapability {
        &self.capability
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Current state without taking the lock.
    pub fn state(&self) -> ModelState {
        *self.state.borrow()
    }

    /// Watch state changes, e.g. to show a "loading model" indicator.
    pub fn subscribe(&self) -> watch::Receiver<ModelState> {
        self.state.subscribe()
    }

    pub fn is_loaded(&self) -> bool {
        self.state() == ModelState::Loaded
    }

    /// Message of the most recent failed load, cleared by a successful one.
    pub async fn last_error(&self) -> Option<String> {
        self.slot.lock().await.last_error.clone()
    }

    /// Details of the loaded model, if any.
    pub async fn info(&self) -> Option<ModelInfo> {
        self.slot.lock().await.handle.as_ref().map(ModelInfo::from_handle)
    }

    /// Path of the loaded model, if any.
    pub async fn loaded_path(&self) -> Option<PathBuf> {
        self.slot
            .lock()
            .await
            .handle
            .as_ref()
            .map(|h| h.path().to_path_buf())
    }

    /// Load the model at `path`.
    ///
    /// A no-op when that model is already loaded. Any other loaded model is
    /// unloaded first; a failure to unload it is logged, kept as
    /// [`last_error`](Self::last_error) and does not stop the new load. On failure the state becomes [`ModelState::Error`] and
    /// no handle is kept.
    pub async fn load(&self, path: impl AsRef<Path>) -> Result<(), ModelError> {
        let path = path.as_ref().to_path_buf();
        let backend = Arc::clone(self.backend()?);
        let params = self.config.load.clone();
        let state = Arc::clone(&self.state);

        let mut slot = Arc::clone(&self.slot).lock_owned().await;
        if slot.handle.as_ref().is_some_and(|h| h.path() == path) {
            tracing::debug!(path = %path.display(), "model already loaded");
            return Ok(());
        }

        let load_path = path.clone();
        let joined = tokio::task::spawn_blocking(move || {
            load_into(&mut slot, backend, &load_path, &params, &state)
        })
        .await;

        match joined {
            Ok(result) => result,
            Err(e) => {
                set_state(&self.state, ModelState::Error);
                Err(ModelError::ModelLoadFailure {
                    path,
                    source: BackendError::LoadFailed(format!("load task failed: {e}")),
                })
            }
        }
    }

    /// Generate text for `prompt` with the loaded model.
    ///
    /// Returns the backend's output unmodified. Fails with
    /// [`ModelError::ModelNotLoaded`] when nothing is loaded, with
    /// [`ModelError::GenerationCancelled`] once `cancel` fires, and with
    /// [`ModelError::GenerationTimedOut`] when the configured timeout
    /// elapses first.
    pub async fn run(
        &self,
        prompt: &str,
        max_tokens: i32,
        cancel: &CancellationToken,
    ) -> Result<String, ModelError> {
        if cancel.is_cancelled() {
            return Err(ModelError::GenerationCancelled);
        }

        let slot = tokio::select! {
            guard = Arc::clone(&self.slot).lock_owned() => guard,
            _ = cancel.cancelled() => return Err(ModelError::GenerationCancelled),
        };
        if slot.handle.is_none() {
            return Err(ModelError::ModelNotLoaded);
        }

        let generation = cancel.child_token();
        let token = generation.clone();
        let prompt = prompt.to_string();
        let task = tokio::task::spawn_blocking(move || match slot.handle.as_ref() {
            Some(handle) => handle.run(&prompt, max_tokens, &token),
            None => Err(ModelError::ModelNotLoaded),
        });

        let timeout = self.config.generation_timeout;
        tokio::select! {
            joined = task => joined.unwrap_or_else(|e| {
                Err(ModelError::GenerationFailure(BackendError::Generation(format!(
                    "generation task failed: {e}"
                ))))
            }),
            _ = cancel.cancelled() => {
                generation.cancel();
                tracing::debug!("generation cancelled by caller");
                Err(ModelError::GenerationCancelled)
            }
            _ = sleep_or_forever(timeout) => {
                generation.cancel();
                let limit = timeout.unwrap_or_default();
                tracing::warn!(timeout = ?limit, "generation timed out");
                Err(ModelError::GenerationTimedOut(limit))
            }
        }
    }

    /// Unload the current model. Calling this with nothing loaded is a
    /// no-op.
    ///
    /// The handle is freed exactly once and the state is `Unloaded`
    /// afterwards, even when the backend reports an unload error.
    pub async fn unload(&self) -> Result<(), ModelError> {
        let mut slot = Arc::clone(&self.slot).lock_owned().await;
        let Some(handle) = slot.handle.take() else {
            set_state(&self.state, ModelState::Unloaded);
            return Ok(());
        };

        let path = handle.path().to_path_buf();
        let state = Arc::clone(&self.state);
        let joined = tokio::task::spawn_blocking(move || {
            let result = handle.release();
            set_state(&state, ModelState::Unloaded);
            drop(slot);
            result
        })
        .await;

        let result = joined.unwrap_or_else(|e| {
            set_state(&self.state, ModelState::Unloaded);
            Err(ModelError::GenerationFailure(BackendError::Generation(format!(
                "unload task failed: {e}"
            ))))
        });
        match &result {
            Ok(()) => tracing::info!(path = %path.display(), "model unloaded"),
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "model unload reported an error"),
        }
        result
    }

    fn backend(&self) -> Result<&Arc<dyn InferenceBackend>, ModelError> {
        self.capability
            .backend()
            .ok_or(ModelError::NativeBackendUnavailable)
    }
}

/// Blocking half of [`ModelLifecycleManager::load`], run with the lock held.
fn load_into(
    slot: &mut Slot,
    backend: Arc<dyn InferenceBackend>,
    path: &Path,
    params: &LoadParams,
    state: &watch::Sender<ModelState>,
) -> Result<(), ModelError> {
    let mut unload_error = None;
    if let Some(previous) = slot.handle.take() {
        let previous_path = previous.path().to_path_buf();
        if let Err(e) = previous.release() {
            tracing::warn!(
                path = %previous_path.display(),
                error = %e,
                "failed to unload previous model, loading the new one anyway"
            );
            unload_error = Some(format!(
                "failed to unload {}: {e}",
                previous_path.display()
            ));
        }
        set_state(state, ModelState::Unloaded);
    }

    set_state(state, ModelState::Loading);
    tracing::info!(
        path = %path.display(),
        context_size = params.context_size,
        threads = params.threads,
        "loading model"
    );

    match ModelHandle::acquire(backend, path, params) {
        Ok(handle) => {
            slot.handle = Some(handle);
            slot.last_error = unload_error;
            set_state(state, ModelState::Loaded);
            tracing::info!(path = %path.display(), "model loaded");
            Ok(())
        }
        Err(e) => {
            slot.last_error = Some(e.to_string());
            set_state(state, ModelState::Error);
            tracing::warn!(path = %path.display(), error = %e, "model load failed");
            Err(e)
        }
    }
}

/// Publish `next`, skipping the notification when nothing changes.
fn set_state(state: &watch::Sender<ModelState>, next: ModelState) {
    state.send_if_modified(|current| {
        if *current == next {
            return false;
        }
        if !ModelState::is_valid_transition(*current, next) {
            tracing::warn!(from = %current, to = %next, "unexpected model state transition");
        }
        *current = next;
        true
    });
}

async fn sleep_or_forever(limit: Option<Duration>) {
    match limit {
        Some(limit) => tokio::time::sleep(limit).await,
        None => std::future::pending().await,
    }
}
