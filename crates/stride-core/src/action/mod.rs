//! The closed set of things the assistant can ask the app to do.
//!
//! [`Action`] is produced fresh by every resolution and never persisted
//! here. [`Action::to_contract_json`] renders the same JSON object the
//! prompt asks the model to emit, so a serialized action always parses
//! back to itself.

pub mod context;

use std::fmt;

use chrono::{Days, NaiveDate};
use serde_json::{Map, Value, json};

pub use context::{GoalContext, TaskContext};

/// Default goal duration when none is given.
pub const DEFAULT_DURATION_MONTHS: u32 = 3;
/// Default daily time budget for a goal.
pub const DEFAULT_DAILY_MINUTES: u32 = 30;
/// Default time estimate for a task.
pub const DEFAULT_TASK_MINUTES: u32 = 30;

/// Reply used whenever there is nothing to interpret.
pub const REPHRASE_MESSAGE: &str =
    "Sorry, I didn't catch that. Could you rephrase your request?";

/// A structured command for the rest of the app.
///
/// Every variant carries a non-empty, human-readable `message`. Numeric
/// fields are always positive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Reply {
        message: String,
    },
    CreateGoal {
        message: String,
        goal_title: String,
        duration_months: u32,
        daily_minutes: u32,
    },
    CreateTask {
        message: String,
        task_title: String,
        due_date: DueDate,
        minutes: u32,
        goal_title: Option<String>,
    },
    CompleteTask {
        message: String,
        task_title: String,
    },
    DeleteGoal {
        message: String,
        goal_title: String,
    },
    DeleteTask {
        message: String,
        task_title: String,
    },
    ShowProgress {
        message: String,
    },
}

/// Discriminant of [`Action`], spelled the way the JSON contract spells it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Reply,
    CreateGoal,
    CreateTask,
    CompleteTask,
    DeleteGoal,
    DeleteTask,
    ShowProgress,
}

impl ActionKind {
    /// All kinds in the order the prompt lists them.
    pub const ALL: [ActionKind; 7] = [
        ActionKind::Reply,
        ActionKind::CreateGoal,
        ActionKind::CreateTask,
        ActionKind::CompleteTask,
        ActionKind::DeleteGoal,
        ActionKind::DeleteTask,
        ActionKind::ShowProgress,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::Reply => "reply",
            ActionKind::CreateGoal => "create_goal",
            ActionKind::CreateTask => "create_task",
            ActionKind::CompleteTask => "complete_task",
            ActionKind::DeleteGoal => "delete_goal",
            ActionKind::DeleteTask => "delete_task",
            ActionKind::ShowProgress => "show_progress",
        }
    }

    /// Look up a kind from its contract spelling, ignoring case and
    /// surrounding whitespace.
    pub fn from_contract(value: &str) -> Option<Self> {
        let wanted = value.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|kind| kind.as_str() == wanted)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Action {
    /// A plain conversational reply. A blank message becomes the
    /// rephrase prompt.
    pub fn reply(message: impl Into<String>) -> Self {
        let message = trimmed(message.into());
        if message.is_empty() {
            return Action::Reply {
                message: REPHRASE_MESSAGE.to_string(),
            };
        }
        Action::Reply { message }
    }

    /// The fixed "please rephrase" reply.
    pub fn rephrase() -> Self {
        Action::reply(REPHRASE_MESSAGE)
    }

    /// Build a `CreateGoal` with a generated confirmation message.
    pub fn create_goal(goal_title: impl Into<String>, duration_months: u32, daily_minutes: u32) -> Self {
        let goal_title = trimmed(goal_title.into());
        let duration_months = positive_or(duration_months, DEFAULT_DURATION_MONTHS);
        let daily_minutes = positive_or(daily_minutes, DEFAULT_DAILY_MINUTES);
        Action::CreateGoal {
            message: format!(
                "Creating goal \"{goal_title}\" for {duration_months} {} at {daily_minutes} minutes a day.",
                plural(duration_months, "month", "months")
            ),
            goal_title,
            duration_months,
            daily_minutes,
        }
    }

    /// Build a `CreateTask` with a generated confirmation message.
    pub fn create_task(
        task_title: impl Into<String>,
        due_date: DueDate,
        minutes: u32,
        goal_title: Option<String>,
    ) -> Self {
        let task_title = trimmed(task_title.into());
        let due_date = DueDate::from_token(due_date.as_str());
        let goal_title = goal_title
            .map(trimmed)
            .filter(|goal| !goal.is_empty());
        let minutes = positive_or(minutes, DEFAULT_TASK_MINUTES);
        let mut message = format!(
            "Adding task \"{task_title}\" due {} ({minutes} min)",
            due_date.describe()
        );
        if let Some(goal) = &goal_title {
            message.push_str(&format!(" under goal \"{goal}\""));
        }
        message.push('.');
        Action::CreateTask {
            message,
            task_title,
            due_date,
            minutes,
            goal_title,
        }
    }

    pub fn complete_task(task_title: impl Into<String>) -> Self {
        let task_title = trimmed(task_title.into());
        Action::CompleteTask {
            message: format!("Great job! Marking \"{task_title}\" as complete."),
            task_title,
        }
    }

    pub fn delete_goal(goal_title: impl Into<String>) -> Self {
        let goal_title = trimmed(goal_title.into());
        Action::DeleteGoal {
            message: format!("Deleting goal \"{goal_title}\"."),
            goal_title,
        }
    }

    pub fn delete_task(task_title: impl Into<String>) -> Self {
        let task_title = trimmed(task_title.into());
        Action::DeleteTask {
            message: format!("Deleting task \"{task_title}\"."),
            task_title,
        }
    }

    pub fn show_progress() -> Self {
        Action::ShowProgress {
            message: "Here's your progress summary.".to_string(),
        }
    }

    pub fn kind(&self) -> ActionKind {
        match self {
            Action::Reply { .. } => ActionKind::Reply,
            Action::CreateGoal { .. } => ActionKind::CreateGoal,
            Action::CreateTask { .. } => ActionKind::CreateTask,
            Action::CompleteTask { .. } => ActionKind::CompleteTask,
            Action::DeleteGoal { .. } => ActionKind::DeleteGoal,
            Action::DeleteTask { .. } => ActionKind::DeleteTask,
            Action::ShowProgress { .. } => ActionKind::ShowProgress,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Action::Reply { message }
            | Action::CreateGoal { message, .. }
            | Action::CreateTask { message, .. }
            | Action::CompleteTask { message, .. }
            | Action::DeleteGoal { message, .. }
            | Action::DeleteTask { message, .. }
            | Action::ShowProgress { message } => message,
        }
    }

    /// Replace the message, keeping the generated one when `message` is blank.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        let message = trimmed(message.into());
        if message.is_empty() {
            return self;
        }
        match &mut self {
            Action::Reply { message: m }
            | Action::CreateGoal { message: m, .. }
            | Action::CreateTask { message: m, .. }
            | Action::CompleteTask { message: m, .. }
            | Action::DeleteGoal { message: m, .. }
            | Action::DeleteTask { message: m, .. }
            | Action::ShowProgress { message: m } => *m = message,
        }
        self
    }

    /// Render the action as the `{action, message, data}` object the
    /// model is instructed to produce.
    pub fn to_contract_json(&self) -> Value {
        let mut data = Map::new();
        match self {
            Action::Reply { .. } | Action::ShowProgress { .. } => {}
            Action::CreateGoal {
                goal_title,
                duration_months,
                daily_minutes,
                ..
            } => {
                data.insert("goalTitle".into(), json!(goal_title));
                data.insert("durationMonths".into(), json!(duration_months));
                data.insert("dailyMinutes".into(), json!(daily_minutes));
            }
            Action::CreateTask {
                task_title,
                due_date,
                minutes,
                goal_title,
                ..
            } => {
                data.insert("taskTitle".into(), json!(task_title));
                data.insert("dueDate".into(), json!(due_date.as_str()));
                data.insert("minutes".into(), json!(minutes));
                if let Some(goal) = goal_title {
                    data.insert("goalTitle".into(), json!(goal));
                }
            }
            Action::CompleteTask { task_title, .. } | Action::DeleteTask { task_title, .. } => {
                data.insert("taskTitle".into(), json!(task_title));
            }
            Action::DeleteGoal { goal_title, .. } => {
                data.insert("goalTitle".into(), json!(goal_title));
            }
        }

        json!({
            "action": self.kind().as_str(),
            "message": self.message(),
            "data": Value::Object(data),
        })
    }
}

/// When a task is due.
///
/// Relative tokens stay relative; anything else is kept verbatim so the
/// app can interpret it ("friday", "2026-11-02").
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DueDate {
    #[default]
    Today,
    Tomorrow,
    NextWeek,
    On(String),
}

impl DueDate {
    /// Normalize a free-form due-date token.
    ///
    /// Blank input means today.
    pub fn from_token(token: &str) -> Self {
        let collapsed = token.split_whitespace().collect::<Vec<_>>().join(" ");
        let lowered = collapsed.to_ascii_lowercase();
        match lowered.as_str() {
            "" | "today" | "tonight" | "now" => DueDate::Today,
            "tomorrow" | "tmrw" | "tmr" => DueDate::Tomorrow,
            "next week" | "next_week" | "nextweek" => DueDate::NextWeek,
            _ => {
                let literal = collapsed
                    .strip_prefix("on ")
                    .or_else(|| collapsed.strip_prefix("On "))
                    .unwrap_or(&collapsed);
                DueDate::On(literal.to_string())
            }
        }
    }

    /// Contract spelling: `today`, `tomorrow`, `next_week` or the literal.
    pub fn as_str(&self) -> &str {
        match self {
            DueDate::Today => "today",
            DueDate::Tomorrow => "tomorrow",
            DueDate::NextWeek => "next_week",
            DueDate::On(literal) => literal,
        }
    }

    fn describe(&self) -> String {
        match self {
            DueDate::Today => "today".to_string(),
            DueDate::Tomorrow => "tomorrow".to_string(),
            DueDate::NextWeek => "next week".to_string(),
            DueDate::On(literal) if offset_days(literal).is_some() => literal.clone(),
            DueDate::On(literal) => format!("on {literal}"),
        }
    }

    /// Resolve to a calendar date relative to `today`.
    ///
    /// Literals resolve when they are ISO `YYYY-MM-DD` dates or offsets
    /// such as `in 3 days` and `in 2 weeks`.
    pub fn resolve(&self, today: NaiveDate) -> Option<NaiveDate> {
        match self {
            DueDate::Today => Some(today),
            DueDate::Tomorrow => today.checked_add_days(Days::new(1)),
            DueDate::NextWeek => today.checked_add_days(Days::new(7)),
            DueDate::On(literal) => match offset_days(literal) {
                Some(days) => today.checked_add_days(Days::new(days)),
                None => NaiveDate::parse_from_str(literal, "%Y-%m-%d").ok(),
            },
        }
    }
}

/// Day count of an `in N day(s)` / `in N week(s)` literal.
fn offset_days(literal: &str) -> Option<u64> {
    let mut words = literal.split_whitespace();
    if !words.next()?.eq_ignore_ascii_case("in") {
        return None;
    }
    let count: u64 = words.next()?.parse().ok()?;
    let unit = words.next()?.to_ascii_lowercase();
    if words.next().is_some() {
        return None;
    }
    match unit.as_str() {
        "day" | "days" => Some(count),
        "week" | "weeks" => count.checked_mul(7),
        _ => None,
    }
}

impl fmt::Display for DueDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `text` without surrounding whitespace, reusing the allocation when
/// nothing needs trimming.
fn trimmed(text: String) -> String {
    if text.trim().len() == text.len() {
        text
    } else {
        text.trim().to_string()
    }
}

pub(crate) fn positive_or(value: u32, default: u32) -> u32 {
    if value == 0 { default } else { value }
}

fn plural<'a>(n: u32, one: &'a str, many: &'a str) -> &'a str {
    if n == 1 { one } else { many }
}
