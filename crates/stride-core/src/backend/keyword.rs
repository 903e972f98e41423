//! Keyword heuristic engine.
//!
//! Stands in for a real on-device model: "loading" just records the path,
//! and generation inspects the user request section of the prompt for a
//! handful of keywords and answers with a well-formed JSON contract
//! object. Useful for demos and for exercising the full pipeline without
//! a model file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::trait_def::{BackendError, InferenceBackend, LoadParams, NULL_HANDLE, RawHandle};
use crate::prompt::USER_MARKER;

const VERSION: &str = "1.0.0 (keyword heuristics)";

/// Per-handle bookkeeping.
#[derive(Debug, Clone)]
struct LoadedModel {
    path: PathBuf,
    params: LoadParams,
}

#[derive(Debug)]
pub struct KeywordBackend {
    models: Mutex<HashMap<RawHandle, LoadedModel>>,
    next_handle: AtomicU64,
}

impl KeywordBackend {
    pub fn new() -> Self {
        Self {
            models: Mutex::new(HashMap::new()),
            next_handle: AtomicU64::new(1),
        }
    }

    /// Number of handles currently live.
    pub fn live_handles(&self) -> usize {
        self.models.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl Default for KeywordBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InferenceBackend for KeywordBackend {
    fn name(&self) -> &str {
        "keyword"
    }

    fn version(&self) -> String {
        VERSION.to_string()
    }

    fn load(&self, path: &Path, params: &LoadParams) -> Result<RawHandle, BackendError> {
        if path.as_os_str().is_empty() {
            return Err(BackendError::LoadFailed("empty model path".to_string()));
        }

        let handle = self.next_handle.fetch_add(1, Ordering::SeqCst);
        self.models
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(
                handle,
                LoadedModel {
                    path: path.to_path_buf(),
                    params: params.clone(),
                },
            );
        debug!(handle, path = %path.display(), "keyword model loaded");
        Ok(handle)
    }

    fn run(
        &self,
        handle: RawHandle,
        prompt: &str,
        max_tokens: i32,
        cancel: &CancellationToken,
    ) -> Result<String, BackendError> {
        if cancel.is_cancelled() {
            return Err(BackendError::Cancelled);
        }

        let (path, context_size) = self
            .models
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&handle)
            .map(|m| (m.path.clone(), m.params.context_size))
            .ok_or(BackendError::InvalidHandle(handle))?;

        debug!(
            handle,
            max_tokens,
            context_size,
            model = %path.display(),
            "keyword generation"
        );
        Ok(respond(user_request(prompt)))
    }

    fn unload(&self, handle: RawHandle) -> Result<(), BackendError> {
        if handle == NULL_HANDLE {
            return Ok(());
        }
        let removed = self
            .models
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&handle);
        match removed {
            Some(_) => Ok(()),
            None => Err(BackendError::InvalidHandle(handle)),
        }
    }
}

/// The part of the prompt after the last user marker, or the whole prompt.
fn user_request(prompt: &str) -> &str {
    match prompt.rfind(USER_MARKER) {
        Some(pos) => &prompt[pos + USER_MARKER.len()..],
        None => prompt,
    }
}

/// First double-quoted span in `text`.
fn quoted(text: &str) -> Option<&str> {
    let start = text.find('"')?;
    let rest = &text[start + 1..];
    let end = rest.find('"')?;
    Some(&rest[..end]).filter(|s| !s.trim().is_empty())
}

fn respond(request: &str) -> String {
    let lower = request.to_lowercase();
    let has = |word: &str| lower.contains(word);

    let value = if has("create") && has("goal") {
        let goal = quoted(request).unwrap_or("New Goal");
        json!({
            "action": "create_goal",
            "message": format!("I'll create a goal for {goal}"),
            "data": {"goalTitle": goal, "durationMonths": 3, "dailyMinutes": 30},
        })
    } else if has("add") && has("task") {
        let task = quoted(request).unwrap_or("New Task");
        json!({
            "action": "create_task",
            "message": format!("I'll add the task: {task}"),
            "data": {"taskTitle": task, "dueDate": "today", "minutes": 30},
        })
    } else if has("list") || has("show") {
        json!({
            "action": "reply",
            "message": "Here are your current items. You can ask me to create goals or add tasks!",
            "data": {},
        })
    } else if has("help") {
        json!({
            "action": "reply",
            "message": "I can help you manage goals and tasks! Try saying: 'Create a goal to learn Python' or 'Add task review notes tomorrow'",
            "data": {},
        })
    } else if has("complete") || has("done") || has("finish") {
        let task = quoted(request).unwrap_or("task");
        json!({
            "action": "complete_task",
            "message": "Great job! I'll mark that as complete.",
            "data": {"taskTitle": task},
        })
    } else if has("delete") || has("remove") {
        json!({
            "action": "reply",
            "message": "To delete an item, please specify exactly which goal or task you want to remove.",
            "data": {},
        })
    } else if has("progress") || has("how am i") || has("status") {
        json!({
            "action": "show_progress",
            "message": "Let me show you your progress summary!",
            "data": {},
        })
    } else {
        json!({
            "action": "reply",
            "message": "I'm your local assistant running on-device! I can help you create goals, add tasks, and track your progress. What would you like to do?",
            "data": {},
        })
    };

    value.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generate(backend: &KeywordBackend, request: &str) -> serde_json::Value {
        let handle = backend
            .load(Path::new("/models/tiny.gguf"), &LoadParams::default())
            .unwrap();
        let prompt = format!("system text mentioning create_goal\n{USER_MARKER}\n{request}");
        let raw = backend
            .run(handle, &prompt, 64, &CancellationToken::new())
            .unwrap();
        backend.unload(handle).unwrap();
        serde_json::from_str(&raw).unwrap()
    }

    #[test]
    fn handles_start_at_one_and_increase() {
        let backend = KeywordBackend::new();
        let params = LoadParams::default();
        let a = backend.load(Path::new("/m/a.gguf"), &params).unwrap();
        let b = backend.load(Path::new("/m/b.gguf"), &params).unwrap();
        assert_eq!(a, 1);
        assert_eq!(b, 2);
        assert_eq!(backend.live_handles(), 2);
    }

    #[test]
    fn empty_path_fails_to_load() {
        let backend = KeywordBackend::new();
        let result = backend.load(Path::new(""), &LoadParams::default());
        assert!(matches!(result, Err(BackendError::LoadFailed(_))));
    }

    #[test]
    fn run_with_unknown_handle_is_invalid() {
        let backend = KeywordBackend::new();
        let result = backend.run(42, "hi", 16, &CancellationToken::new());
        assert_eq!(result, Err(BackendError::InvalidHandle(42)));
    }

    #[test]
    fn run_honours_cancellation() {
        let backend = KeywordBackend::new();
        let handle = backend
            .load(Path::new("/m/a.gguf"), &LoadParams::default())
            .unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert_eq!(
            backend.run(handle, "hi", 16, &cancel),
            Err(BackendError::Cancelled)
        );
    }

    #[test]
    fn unload_is_exact_and_null_is_noop() {
        let backend = KeywordBackend::new();
        let handle = backend
            .load(Path::new("/m/a.gguf"), &LoadParams::default())
            .unwrap();
        assert!(backend.unload(handle).is_ok());
        assert_eq!(
            backend.unload(handle),
            Err(BackendError::InvalidHandle(handle))
        );
        assert!(backend.unload(NULL_HANDLE).is_ok());
        assert_eq!(backend.live_handles(), 0);
    }

    #[test]
    fn only_the_user_section_is_inspected() {
        // The system text mentions create_goal; a greeting must still be a reply.
        let backend = KeywordBackend::new();
        let value = generate(&backend, "hello there");
        assert_eq!(value["action"], "reply");
    }

    #[test]
    fn create_goal_uses_quoted_name() {
        let backend = KeywordBackend::new();
        let value = generate(&backend, "create a goal \"Learn Rust\"");
        assert_eq!(value["action"], "create_goal");
        assert_eq!(value["data"]["goalTitle"], "Learn Rust");
        assert_eq!(value["data"]["durationMonths"], 3);
    }

    #[test]
    fn add_task_defaults_name() {
        let backend = KeywordBackend::new();
        let value = generate(&backend, "add a task please");
        assert_eq!(value["action"], "create_task");
        assert_eq!(value["data"]["taskTitle"], "New Task");
        assert_eq!(value["data"]["dueDate"], "today");
    }

    #[test]
    fn progress_and_complete_intents() {
        let backend = KeywordBackend::new();
        assert_eq!(generate(&backend, "how am i doing?")["action"], "show_progress");
        let value = generate(&backend, "I'm done with \"Review notes\"");
        assert_eq!(value["action"], "complete_task");
        assert_eq!(value["data"]["taskTitle"], "Review notes");
    }

    #[test]
    fn quoted_names_are_escaped_in_json() {
        let backend = KeywordBackend::new();
        let value = generate(&backend, "create goal \"Read \\ books\"");
        assert_eq!(value["data"]["goalTitle"], "Read \\ books");
    }
}
