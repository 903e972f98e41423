//! Shared test utilities for stride integration tests.
//!
//! Provides [`InstrumentedBackend`], an [`InferenceBackend`] that records
//! every native call (and how many were in flight at once), plus goal and
//! task fixtures.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use tokio_util::sync::CancellationToken;

use stride_core::action::{GoalContext, TaskContext};
use stride_core::backend::{BackendError, InferenceBackend, LoadParams, NULL_HANDLE, RawHandle};

/// Default model output: a well-formed reply.
pub const DEFAULT_RESPONSE: &str = r#"{"action":"reply","message":"ok","data":{}}"#;

/// How often a delayed run checks its cancellation token.
const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Backend double that counts loads, runs and unloads and tracks the
/// maximum number of native calls executing at the same time.
#[derive(Debug)]
pub struct InstrumentedBackend {
    response: Mutex<Result<String, BackendError>>,
    load_error: Mutex<Option<BackendError>>,
    unload_error: Mutex<Option<BackendError>>,
    null_handles: AtomicBool,
    run_delay: Mutex<Duration>,

    next_handle: AtomicU64,
    live: Mutex<HashSet<RawHandle>>,
    loaded_paths: Mutex<Vec<PathBuf>>,
    prompts: Mutex<Vec<(String, i32)>>,

    loads: AtomicUsize,
    runs: AtomicUsize,
    unloads: AtomicUsize,
    cancelled_runs: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl Default for InstrumentedBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InstrumentedBackend {
    pub fn new() -> Self {
        Self {
            response: Mutex::new(Ok(DEFAULT_RESPONSE.to_string())),
            load_error: Mutex::new(None),
            unload_error: Mutex::new(None),
            null_handles: AtomicBool::new(false),
            run_delay: Mutex::new(Duration::ZERO),
            next_handle: AtomicU64::new(1),
            live: Mutex::new(HashSet::new()),
            loaded_paths: Mutex::new(Vec::new()),
            prompts: Mutex::new(Vec::new()),
            loads: AtomicUsize::new(0),
            runs: AtomicUsize::new(0),
            unloads: AtomicUsize::new(0),
            cancelled_runs: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        }
    }

    // -- configuration ----------------------------------------------------

    pub fn with_response(self, response: impl Into<String>) -> Self {
        self.set_response(response);
        self
    }

    pub fn with_run_error(self, error: BackendError) -> Self {
        *lock(&self.response) = Err(error);
        self
    }

    pub fn with_load_error(self, error: BackendError) -> Self {
        self.set_load_error(Some(error));
        self
    }

    pub fn with_unload_error(self, error: BackendError) -> Self {
        *lock(&self.unload_error) = Some(error);
        self
    }

    /// Loads "succeed" but return [`NULL_HANDLE`].
    pub fn with_null_handles(self) -> Self {
        self.null_handles.store(true, Ordering::SeqCst);
        self
    }

    /// Each run sleeps this long (in small slices, honouring cancellation).
    pub fn with_run_delay(self, delay: Duration) -> Self {
        *lock(&self.run_delay) = delay;
        self
    }

    pub fn set_response(&self, response: impl Into<String>) {
        *lock(&self.response) = Ok(response.into());
    }

    pub fn set_load_error(&self, error: Option<BackendError>) {
        *lock(&self.load_error) = error;
    }

    // -- observations -----------------------------------------------------

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    pub fn unloads(&self) -> usize {
        self.unloads.load(Ordering::SeqCst)
    }

    pub fn cancelled_runs(&self) -> usize {
        self.cancelled_runs.load(Ordering::SeqCst)
    }

    /// Highest number of native calls observed executing at once.
    pub fn max_concurrency(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    /// Number of handles loaded and not yet unloaded.
    pub fn live_handles(&self) -> usize {
        lock(&self.live).len()
    }

    pub fn loaded_paths(&self) -> Vec<PathBuf> {
        lock(&self.loaded_paths).clone()
    }

    /// Most recent prompt and its token budget.
    pub fn last_prompt(&self) -> Option<(String, i32)> {
        lock(&self.prompts).last().cloned()
    }

    fn enter(&self) -> ActiveCall<'_> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        ActiveCall(&self.active)
    }
}

impl InferenceBackend for InstrumentedBackend {
    fn name(&self) -> &str {
        "instrumented"
    }

    fn version(&self) -> String {
        "test".to_string()
    }

    fn load(&self, path: &Path, _params: &LoadParams) -> Result<RawHandle, BackendError> {
        let _active = self.enter();
        self.loads.fetch_add(1, Ordering::SeqCst);
        lock(&self.loaded_paths).push(path.to_path_buf());

        if let Some(error) = lock(&self.load_error).clone() {
            return Err(error);
        }
        if self.null_handles.load(Ordering::SeqCst) {
            return Ok(NULL_HANDLE);
        }
        let handle = self.next_handle.fetch_add(1, Ordering::SeqCst);
        lock(&self.live).insert(handle);
        Ok(handle)
    }

    fn run(
        &self,
        handle: RawHandle,
        prompt: &str,
        max_tokens: i32,
        cancel: &CancellationToken,
    ) -> Result<String, BackendError> {
        let _active = self.enter();
        self.runs.fetch_add(1, Ordering::SeqCst);
        lock(&self.prompts).push((prompt.to_string(), max_tokens));

        if !lock(&self.live).contains(&handle) {
            return Err(BackendError::InvalidHandle(handle));
        }

        let delay = *lock(&self.run_delay);
        let started = Instant::now();
        while started.elapsed() < delay {
            if cancel.is_cancelled() {
                self.cancelled_runs.fetch_add(1, Ordering::SeqCst);
                return Err(BackendError::Cancelled);
            }
            std::thread::sleep(POLL_INTERVAL.min(delay));
        }

        lock(&self.response).clone()
    }

    fn unload(&self, handle: RawHandle) -> Result<(), BackendError> {
        let _active = self.enter();
        self.unloads.fetch_add(1, Ordering::SeqCst);
        if handle == NULL_HANDLE {
            return Ok(());
        }
        let removed = lock(&self.live).remove(&handle);
        if let Some(error) = lock(&self.unload_error).clone() {
            return Err(error);
        }
        if removed {
            Ok(())
        } else {
            Err(BackendError::InvalidHandle(handle))
        }
    }
}

/// Decrements the in-flight counter when a native call returns.
struct ActiveCall<'a>(&'a AtomicUsize);

impl Drop for ActiveCall<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

// -- fixtures ---------------------------------------------------------------

pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid fixture date")
}

/// Two goals with distinct end dates.
pub fn sample_goals() -> Vec<GoalContext> {
    vec![
        GoalContext::new("Learn Guitar", 20, date(2026, 12, 31)),
        GoalContext::new("Run a 5k", 30, date(2027, 3, 1)),
    ]
}

/// Three tasks, one completed, one without an estimate.
pub fn sample_tasks() -> Vec<TaskContext> {
    vec![
        TaskContext::new("Practice scales", false, Some(15)),
        TaskContext::new("Buy running shoes", true, None),
        TaskContext::new("Review notes", false, Some(30)),
    ]
}

/// `n` goals named `Goal 0`, `Goal 1`, ...
pub fn goals(n: usize) -> Vec<GoalContext> {
    (0..n)
        .map(|i| GoalContext::new(format!("Goal {i}"), 10, date(2026, 12, 31)))
        .collect()
}

/// `n` open tasks named `Task 0`, `Task 1`, ...
pub fn tasks(n: usize) -> Vec<TaskContext> {
    (0..n)
        .map(|i| TaskContext::new(format!("Task {i}"), false, Some(10)))
        .collect()
}
