//! Model output parsing.
//!
//! Small local models wrap their JSON in prose or markdown fences, emit
//! trailing chatter, and spell field names inconsistently. This module
//! finds the JSON object, decodes it, and maps it onto an [`Action`] while
//! tolerating all of that. It never panics on arbitrary input.

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

use crate::action::{
    Action, ActionKind, DEFAULT_DAILY_MINUTES, DEFAULT_DURATION_MONTHS, DEFAULT_TASK_MINUTES,
    DueDate,
};

/// Accepted spellings per field, most specific first.
const GOAL_TITLE_KEYS: &[&str] = &["goalTitle", "goal_title", "title", "goal", "name"];
const TASK_TITLE_KEYS: &[&str] = &["taskTitle", "task_title", "title", "task", "name"];
const TASK_GOAL_KEYS: &[&str] = &["goalTitle", "goal_title", "goal"];
const DURATION_MONTHS_KEYS: &[&str] = &["durationMonths", "duration_months", "months", "duration"];
const DAILY_MINUTES_KEYS: &[&str] = &[
    "dailyMinutes",
    "daily_minutes",
    "minutesPerDay",
    "minutes_per_day",
    "minutes",
];
const TASK_MINUTES_KEYS: &[&str] = &[
    "minutes",
    "durationMinutes",
    "duration_minutes",
    "estimatedMinutes",
    "estimated_minutes",
];
const DUE_DATE_KEYS: &[&str] = &["dueDate", "due_date", "due", "date"];

/// Why a strict parse failed. Always recovered by the caller.
#[derive(Debug, Error)]
pub enum ResponseError {
    #[error("no JSON object found in model output")]
    NoJsonObject,

    #[error("malformed JSON in model output: {0}")]
    JsonParseFailure(#[from] serde_json::Error),

    #[error("model output is JSON but not an object")]
    NotAnObject,

    #[error("{action} is missing required field {field}")]
    MissingField {
        action: ActionKind,
        field: &'static str,
    },
}

/// Locate the candidate JSON object in raw model output.
///
/// When the trimmed text starts with `{`, the object ends where brace depth
/// first returns to zero (braces inside string literals do not count).
/// Otherwise, or when the braces never balance, the candidate spans the
/// first `{` to the last `}`.
pub fn extract_json_object(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    if trimmed.starts_with('{') {
        if let Some(end) = balanced_object_end(trimmed) {
            return Some(&trimmed[..=end]);
        }
    }

    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    (end > start).then(|| &trimmed[start..=end])
}

/// Byte index of the `}` closing the object that starts at index 0.
fn balanced_object_end(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Strictly parse model output into an action.
///
/// Returns `None` when the output holds no decodable JSON object or a
/// known action lacks its required title.
pub fn parse_response(raw: &str) -> Option<Action> {
    match try_parse_response(raw) {
        Ok(action) => Some(action),
        Err(e) => {
            debug!(error = %e, "model output did not parse as an action");
            None
        }
    }
}

/// Like [`parse_response`] but reports why parsing failed.
pub fn try_parse_response(raw: &str) -> Result<Action, ResponseError> {
    let candidate = extract_json_object(raw).ok_or(ResponseError::NoJsonObject)?;
    let value: Value = serde_json::from_str(candidate)?;
    let object = value.as_object().ok_or(ResponseError::NotAnObject)?;

    let action_name = object
        .get("action")
        .and_then(Value::as_str)
        .unwrap_or("reply");
    let message = object
        .get("message")
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or("");
    let empty = Map::new();
    let data = object
        .get("data")
        .and_then(Value::as_object)
        .unwrap_or(&empty);

    let Some(kind) = ActionKind::from_contract(action_name) else {
        debug!(action = action_name, "unknown action, treating as reply");
        return Ok(reply_or_original(message, raw));
    };

    let required = |keys: &[&str], field: &'static str| {
        read_string(data, keys).ok_or(ResponseError::MissingField {
            action: kind,
            field,
        })
    };

    let action = match kind {
        ActionKind::Reply => return Ok(reply_or_original(message, raw)),
        ActionKind::CreateGoal => Action::create_goal(
            required(GOAL_TITLE_KEYS, "goalTitle")?,
            read_positive(data, DURATION_MONTHS_KEYS).unwrap_or(DEFAULT_DURATION_MONTHS),
            read_positive(data, DAILY_MINUTES_KEYS).unwrap_or(DEFAULT_DAILY_MINUTES),
        ),
        ActionKind::CreateTask => Action::create_task(
            required(TASK_TITLE_KEYS, "taskTitle")?,
            read_string(data, DUE_DATE_KEYS)
                .map(|token| DueDate::from_token(&token))
                .unwrap_or_default(),
            read_positive(data, TASK_MINUTES_KEYS).unwrap_or(DEFAULT_TASK_MINUTES),
            read_string(data, TASK_GOAL_KEYS),
        ),
        ActionKind::CompleteTask => Action::complete_task(required(TASK_TITLE_KEYS, "taskTitle")?),
        ActionKind::DeleteGoal => Action::delete_goal(required(GOAL_TITLE_KEYS, "goalTitle")?),
        ActionKind::DeleteTask => Action::delete_task(required(TASK_TITLE_KEYS, "taskTitle")?),
        ActionKind::ShowProgress => Action::show_progress(),
    };

    Ok(action.with_message(message))
}

/// Interpret model output, never failing.
///
/// Falls back to the fixed rephrase reply for blank output, and otherwise
/// to the output itself (minus any markdown code fence) as a reply.
pub fn parse_with_fallback(raw: &str) -> Action {
    if let Some(action) = parse_response(raw) {
        return action;
    }
    let text = strip_code_fence(raw);
    if text.is_empty() {
        Action::rephrase()
    } else {
        Action::reply(text)
    }
}

/// Remove a leading ```` ``` ```` / ```` ```json ```` line and a trailing
/// ```` ``` ````, then trim.
pub fn strip_code_fence(raw: &str) -> &str {
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix("```") {
        text = match rest.find('\n') {
            Some(newline) => &rest[newline + 1..],
            None => rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric()),
        };
    }
    if let Some(rest) = text.trim_end().strip_suffix("```") {
        text = rest;
    }
    text.trim()
}

fn reply_or_original(message: &str, raw: &str) -> Action {
    if message.is_empty() {
        Action::reply(strip_code_fence(raw))
    } else {
        Action::reply(message)
    }
}

/// First present, non-null key wins. Numbers are accepted as text.
fn read_string(data: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    let value = first_present(data, keys)?;
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

/// First present, non-null key wins. Accepts integers, floats and numeric
/// strings; zero, negative or unreadable values yield `None`.
fn read_positive(data: &Map<String, Value>, keys: &[&str]) -> Option<u32> {
    let value = first_present(data, keys)?;
    let number = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if number.is_finite() && number >= 1.0 && number <= f64::from(u32::MAX) {
        Some(number.round() as u32)
    } else {
        None
    }
}

fn first_present<'a>(data: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| data.get(*key))
        .find(|value| !value.is_null())
}
