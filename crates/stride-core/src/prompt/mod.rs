//! Prompt construction.
//!
//! Renders the system instruction, a compact goal/task context block and
//! the user's message into one prompt string. Pure logic: identical inputs
//! always give the identical string, whatever the dialect.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::action::{GoalContext, TaskContext};

/// At most this many goals and this many tasks are embedded.
pub const MAX_CONTEXT_ITEMS: usize = 5;

/// Line that introduces the user's verbatim message in every dialect.
pub const USER_MARKER: &str = "User request:";

/// Inserted instead of an empty context block.
pub const NO_CONTEXT: &str = "The user has no goals or tasks yet.";

/// Output contract shown to the model.
const SYSTEM_INSTRUCTION: &str = r#"You are an on-device planning assistant that manages the user's goals and tasks.
Respond with exactly one JSON object and nothing else. The object has the keys "action", "message" and "data".
"action" must be one of:
- "reply": data {}
- "create_goal": data {"goalTitle": string, "durationMonths": integer, "dailyMinutes": integer}
- "create_task": data {"taskTitle": string, "dueDate": "today" | "tomorrow" | "next_week" | "YYYY-MM-DD", "minutes": integer, "goalTitle": string (optional)}
- "complete_task": data {"taskTitle": string}
- "delete_goal": data {"goalTitle": string}
- "delete_task": data {"taskTitle": string}
- "show_progress": data {}
"message" is one short, friendly sentence for the user."#;

/// Textual wrapper around the prompt content.
///
/// All dialects carry the same information; they differ only in the turn
/// markers a given model family was trained on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dialect {
    /// `### Instruction:` / `### Response:` markers.
    #[default]
    Plain,
    /// `<|im_start|>` / `<|im_end|>` chat markup.
    ChatMl,
    /// `[INST] ... [/INST]` with a `<<SYS>>` block.
    Llama,
}

impl Dialect {
    pub const ALL: [Dialect; 3] = [Dialect::Plain, Dialect::ChatMl, Dialect::Llama];

    pub fn as_str(self) -> &'static str {
        match self {
            Dialect::Plain => "plain",
            Dialect::ChatMl => "chat_ml",
            Dialect::Llama => "llama",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown dialect name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown prompt dialect {0:?} (expected plain, chat_ml, or llama)")]
pub struct UnknownDialect(pub String);

impl FromStr for Dialect {
    type Err = UnknownDialect;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "plain" | "alpaca" => Ok(Dialect::Plain),
            "chat_ml" | "chatml" => Ok(Dialect::ChatMl),
            "llama" | "inst" => Ok(Dialect::Llama),
            _ => Err(UnknownDialect(s.to_string())),
        }
    }
}

/// Build the full prompt for one resolution.
pub fn build_prompt(
    user_message: &str,
    goals: &[GoalContext],
    tasks: &[TaskContext],
    dialect: Dialect,
) -> String {
    let context = render_context(goals, tasks);
    let system = format!("{SYSTEM_INSTRUCTION}\n\n{context}");
    let user = format!("{USER_MARKER}\n{user_message}");

    match dialect {
        Dialect::Plain => format!("### Instruction:\n{system}\n\n{user}\n\n### Response:\n"),
        Dialect::ChatMl => format!(
            "<|im_start|>system\n{system}<|im_end|>\n<|im_start|>user\n{user}<|im_end|>\n<|im_start|>assistant\n"
        ),
        Dialect::Llama => format!("[INST] <<SYS>>\n{system}\n<</SYS>>\n\n{user} [/INST]"),
    }
}

/// Compact context block: at most [`MAX_CONTEXT_ITEMS`] of each list, in
/// caller order.
fn render_context(goals: &[GoalContext], tasks: &[TaskContext]) -> String {
    if goals.is_empty() && tasks.is_empty() {
        return NO_CONTEXT.to_string();
    }

    let mut out = String::new();
    if !goals.is_empty() {
        out.push_str("Goals:\n");
        for goal in goals.iter().take(MAX_CONTEXT_ITEMS) {
            out.push_str(&format!(
                "- {}|{} min|ends:{}\n",
                goal.title,
                goal.daily_minutes,
                goal.end_date.format("%Y-%m-%d")
            ));
        }
    }
    if !tasks.is_empty() {
        out.push_str("Tasks:\n");
        for task in tasks.iter().take(MAX_CONTEXT_ITEMS) {
            let glyph = if task.is_completed { "[x]" } else { "[ ]" };
            match task.minutes {
                Some(minutes) => {
                    out.push_str(&format!("- {glyph} {} ({minutes} min)\n", task.title))
                }
                None => out.push_str(&format!("- {glyph} {}\n", task.title)),
            }
        }
    }
    out.trim_end().to_string()
}
