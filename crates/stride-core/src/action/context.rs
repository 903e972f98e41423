//! Read-only goal/task snapshots embedded in prompts.
//!
//! The persistence layer builds these right before a resolution and drops
//! them afterwards; nothing here writes back.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Summary of one goal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoalContext {
    pub title: String,
    #[serde(alias = "dailyMinutes")]
    pub daily_minutes: u32,
    #[serde(alias = "endDate")]
    pub end_date: NaiveDate,
}

impl GoalContext {
    pub fn new(title: impl Into<String>, daily_minutes: u32, end_date: NaiveDate) -> Self {
        Self {
            title: title.into(),
            daily_minutes,
            end_date,
        }
    }
}

/// Summary of one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskContext {
    pub title: String,
    #[serde(default, alias = "isCompleted")]
    pub is_completed: bool,
    #[serde(default)]
    pub minutes: Option<u32>,
}

impl TaskContext {
    pub fn new(title: impl Into<String>, is_completed: bool, minutes: Option<u32>) -> Self {
        Self {
            title: title.into(),
            is_completed,
            minutes,
        }
    }
}
