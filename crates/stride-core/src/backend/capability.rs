//! Explicit "is a native engine present" capability.
//!
//! Built once at startup and handed to every component that needs the
//! engine. Absence is a value ([`InferenceCapability::unavailable`]) rather
//! than a process-wide flag, so tests can exercise both paths.

use std::sync::Arc;

use super::trait_def::InferenceBackend;

#[derive(Clone, Default)]
pub struct InferenceCapability {
    backend: Option<Arc<dyn InferenceBackend>>,
}

impl InferenceCapability {
    /// Capability backed by `backend`.
    pub fn available(backend: impl InferenceBackend + 'static) -> Self {
        Self {
            backend: Some(Arc::new(backend)),
        }
    }

    /// Capability backed by an already shared backend.
    pub fn from_arc(backend: Arc<dyn InferenceBackend>) -> Self {
        Self {
            backend: Some(backend),
        }
    }

    /// No engine linked into this process.
    pub fn unavailable() -> Self {
        Self { backend: None }
    }

    pub fn is_available(&self) -> bool {
        self.backend.is_some()
    }

    pub fn backend(&self) -> Option<&Arc<dyn InferenceBackend>> {
        self.backend.as_ref()
    }

    /// Engine name and version, e.g. `keyword 1.0.0`.
    pub fn describe(&self) -> String {
        match &self.backend {
            Some(backend) => format!("{} {}", backend.name(), backend.version()),
            None => "unavailable".to_string(),
        }
    }
}

impl std::fmt::Debug for InferenceCapability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceCapability")
            .field("backend", &self.backend.as_ref().map(|b| b.name().to_string()))
            .finish()
    }
}
