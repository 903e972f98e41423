//! Deterministic command parser.
//!
//! An ordered cascade of regular expressions that turns plain command
//! phrasing ("create goal \"X\" in 3 months 20 minutes per day") into an
//! [`Action`] without any model. Rules are tried family by family in
//! [`CommandFamily`] order and, within a family, in table order; the first
//! rule whose pattern matches and whose extractor accepts the captures
//! wins. There is no scoring.

use std::fmt;
use std::num::IntErrorKind;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use tracing::debug;

use crate::action::{
    Action, DEFAULT_DAILY_MINUTES, DEFAULT_DURATION_MONTHS, DEFAULT_TASK_MINUTES, DueDate,
};

const HELP_MESSAGE: &str = r#"I can help you manage goals and tasks. Try 'create goal "Learn Python" in 3 months 30 minutes per day' or 'add task "Review notes" tomorrow for 20 minutes'."#;
const DELETE_WHICH_MESSAGE: &str =
    "To delete an item, please say exactly which goal or task you want to remove.";

// -----------------------------------------------------------------------
// Shared pattern fragments
// -----------------------------------------------------------------------

const POLITE: &str = r"(?i)^\s*(?:(?:please|can\s+you|could\s+you|i\s+want\s+to|i'd\s+like\s+to|let's)\s+)?";
const CREATE_VERB: &str = r"(?:create|add|make|set\s+up|start|begin|schedule)";
const DELETE_VERB: &str = r"(?:delete|remove|drop|cancel|get\s+rid\s+of)";
const ARTICLES: &str = r"(?:(?:a|an|the|my|new)\s+)*";
const GOAL_INTRO: &str = r"goal\b\s*(?:(?:to|called|named|for)\b|:)?\s*";
const TASK_INTRO: &str = r"(?:task|todo|to-do)\b\s*(?:(?:to|called|named)\b|:)?\s*";
const DUE_TOKEN: &str = r"today|tonight|tomorrow|tmrw|next\s+week|\d{4}-\d{2}-\d{2}";

static MONTHS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(\d+)\s*(?:months?|mos?)\b").expect("months pattern"));

static YEARS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(\d+)\s*(?:years?|yrs?)\b").expect("years pattern"));

static MINUTES_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(\d+)\s*(?:minutes?|mins?)\b").expect("minutes pattern"));

static HOURS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d+(?:\.\d+)?)\s*(?:hours?|hrs?)\b").expect("hours pattern")
});

static DUE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:today|tonight|tomorrow|tmrw|next\s+week|\d{4}-\d{2}-\d{2}|\d{1,2}/\d{1,2}(?:/\d{2,4})?|in\s+\d+\s+(?:days?|weeks?)|(?:on|by|due|next|this)\s+(?:mon|tues|wednes|thurs|fri|satur|sun)day)\b",
    )
    .expect("due date pattern")
});

static GOAL_LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:for|under|in|to)\s+(?:the\s+|my\s+)?goal\b\s*:?\s*(?P<goal>.+)$")
        .expect("goal link pattern")
});

static QUOTED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("\"[^\"]*\"|\u{201c}[^\u{201d}]*\u{201d}").expect("quoted pattern"));

/// Start of the first trailing qualifier clause in a free-text name.
static QUALIFIER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\s+(?:(?:in|for|over|within|at|by|due|taking|every|each|per|on)\s+)?(?:\d+(?:\.\d+)?\s*(?:months?|mos?|years?|yrs?|weeks?|days?|minutes?|mins?|hours?|hrs?)\b|(?:today|tonight|tomorrow|tmrw)\b|next\s+week\b|daily\W*$|(?:per|each|every)\s+day\b|\d{4}-\d{2}-\d{2}|\d{1,2}/\d{1,2}(?:/\d{2,4})?|(?:on|by|due|next|this)\s+(?:mon|tues|wednes|thurs|fri|satur|sun)day\b|(?:for|under|in|to)\s+(?:the\s+|my\s+)?goal\b)",
    )
    .expect("qualifier pattern")
});

static COMMAND_KEYWORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:create|add|delete|remove|complete|finish|done|list|show|progress)\b")
        .expect("command keyword pattern")
});

// -----------------------------------------------------------------------
// Rule table
// -----------------------------------------------------------------------

/// Command families in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CommandFamily {
    CreateGoal,
    CreateTask,
    CompleteTask,
    DeleteGoal,
    DeleteTask,
    Query,
}

impl CommandFamily {
    pub fn as_str(self) -> &'static str {
        match self {
            CommandFamily::CreateGoal => "create_goal",
            CommandFamily::CreateTask => "create_task",
            CommandFamily::CompleteTask => "complete_task",
            CommandFamily::DeleteGoal => "delete_goal",
            CommandFamily::DeleteTask => "delete_task",
            CommandFamily::Query => "query",
        }
    }
}

impl fmt::Display for CommandFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

type Extractor = fn(&Captures<'_>, &str) -> Option<Action>;

struct CommandRule {
    family: CommandFamily,
    name: &'static str,
    pattern: Regex,
    extract: Extractor,
}

fn rule(
    family: CommandFamily,
    name: &'static str,
    pattern: &str,
    extract: Extractor,
) -> CommandRule {
    CommandRule {
        family,
        name,
        pattern: Regex::new(pattern).expect("fallback rule pattern"),
        extract,
    }
}

static RULES: LazyLock<Vec<CommandRule>> = LazyLock::new(|| {
    use CommandFamily::*;
    vec![
        rule(
            CreateGoal,
            "goal_full",
            &format!(
                r"{POLITE}{CREATE_VERB}\s+{ARTICLES}{GOAL_INTRO}(?P<name>.+?)\s+(?:in|for|over|within)\s+(?P<dur>\d+)\s*(?P<unit>months?|mos?|years?|yrs?)\b[\s,]*(?:(?:and|with|at|doing|spending)\s+)?(?P<daily>\d+)\s*(?:minutes?|mins?)\b"
            ),
            goal_full,
        ),
        rule(
            CreateGoal,
            "goal_simple",
            &format!(r"{POLITE}{CREATE_VERB}\s+{ARTICLES}{GOAL_INTRO}(?P<name>.+)$"),
            goal_loose,
        ),
        rule(
            CreateGoal,
            "goal_label",
            r"(?i)^\s*(?:new\s+)?goal\s*:\s*(?P<name>.+)$",
            goal_loose,
        ),
        rule(
            CreateTask,
            "task_full",
            &format!(
                r"{POLITE}{CREATE_VERB}\s+{ARTICLES}{TASK_INTRO}(?P<name>.+?)\s+(?:(?:due|by|on)\s+)?(?P<due>{DUE_TOKEN})\s+(?:(?:for|taking)\s+)?(?P<minutes>\d+)\s*(?:minutes?|mins?)\b"
            ),
            task_full,
        ),
        rule(
            CreateTask,
            "task_simple",
            &format!(r"{POLITE}{CREATE_VERB}\s+{ARTICLES}{TASK_INTRO}(?P<name>.+)$"),
            task_loose,
        ),
        rule(
            CreateTask,
            "task_reminder",
            r"(?i)^\s*(?:remind\s+me\s+to|i\s+(?:need|have|must)\s+to|todo\s*:|to-do\s*:)\s*(?P<name>.+)$",
            task_loose,
        ),
        rule(
            CompleteTask,
            "complete_verb",
            &format!(
                r"{POLITE}(?:complete|completed|finish|finished|check\s+off|tick\s+off|cross\s+off|done\s+with)\s+(?:(?:the|my)\s+)?(?:task\b\s*:?\s*)?(?P<name>.+)$"
            ),
            complete_task,
        ),
        rule(
            CompleteTask,
            "complete_mark",
            r"(?i)^\s*mark\s+(?:(?:the|my)\s+)?(?:task\b\s*:?\s*)?(?P<name>.+?)\s+as\s+(?:done|complete|completed|finished)\W*$",
            complete_task,
        ),
        rule(
            CompleteTask,
            "complete_is_done",
            r"(?i)^\s*(?:(?:the|my)\s+)?(?:task\b\s*:?\s*)?(?P<name>.+?)\s+is\s+(?:done|complete|completed|finished)\W*$",
            complete_task,
        ),
        rule(
            CompleteTask,
            "complete_past",
            r"(?i)^\s*i(?:'ve|\s+have)?\s+(?:just\s+|already\s+)?(?:finished|completed|did|done)\s+(?:(?:the|my)\s+)?(?:task\b\s*:?\s*)?(?P<name>.+)$",
            complete_task,
        ),
        rule(
            DeleteGoal,
            "delete_goal_prefix",
            &format!(r"{POLITE}{DELETE_VERB}\s+{ARTICLES}goal\b\s*:?\s*(?P<name>.+)$"),
            delete_goal,
        ),
        rule(
            DeleteGoal,
            "delete_goal_suffix",
            &format!(r"{POLITE}{DELETE_VERB}\s+{ARTICLES}(?P<name>.+?)\s+goal\W*$"),
            delete_goal,
        ),
        rule(
            DeleteTask,
            "delete_task_prefix",
            &format!(r"{POLITE}{DELETE_VERB}\s+{ARTICLES}task\b\s*:?\s*(?P<name>.+)$"),
            delete_task,
        ),
        rule(
            DeleteTask,
            "delete_task_suffix",
            &format!(r"{POLITE}{DELETE_VERB}\s+{ARTICLES}(?P<name>.+?)\s+task\W*$"),
            delete_task,
        ),
        rule(
            Query,
            "progress",
            r"(?i)\bprogress\b|\bhow\s+am\s+i\s+doing\b|^\s*(?:my\s+)?(?:stats|status|summary)\W*$",
            |_, _| Some(Action::show_progress()),
        ),
        rule(
            Query,
            "list_goals",
            r"(?i)^\s*(?:please\s+)?(?:list|show|view|display|what\s+are)\s+(?:me\s+)?(?:all\s+)?(?:of\s+)?(?:my\s+)?(?:current\s+)?goals\b",
            |_, _| Some(Action::reply("Here are your current goals.")),
        ),
        rule(
            Query,
            "list_tasks",
            r"(?i)^\s*(?:please\s+)?(?:list|show|view|display|what\s+are)\s+(?:me\s+)?(?:all\s+)?(?:of\s+)?(?:my\s+)?(?:current\s+)?(?:tasks|to-?dos)\b",
            |_, _| Some(Action::reply("Here are your current tasks.")),
        ),
        rule(
            Query,
            "help",
            r"(?i)^\s*(?:help|what\s+can\s+you\s+do)\W*$",
            |_, _| Some(Action::reply(HELP_MESSAGE)),
        ),
        rule(
            Query,
            "delete_ambiguous",
            &format!(r"{POLITE}{DELETE_VERB}\b"),
            |_, _| Some(Action::reply(DELETE_WHICH_MESSAGE)),
        ),
    ]
});

/// Family and name of every rule, in evaluation order.
pub fn rule_table() -> Vec<(CommandFamily, &'static str)> {
    RULES.iter().map(|r| (r.family, r.name)).collect()
}

// -----------------------------------------------------------------------
// Public entry points
// -----------------------------------------------------------------------

/// Parse a user utterance directly into an action.
pub fn parse_command(text: &str) -> Option<Action> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    for rule in RULES.iter() {
        let Some(caps) = rule.pattern.captures(text) else {
            continue;
        };
        if let Some(action) = (rule.extract)(&caps, text) {
            debug!(family = %rule.family, rule = rule.name, "fallback rule matched");
            return Some(action);
        }
    }
    None
}

/// Whether `text` mentions any command keyword. Advisory only.
pub fn looks_like_command(text: &str) -> bool {
    COMMAND_KEYWORD_RE.is_match(text)
}

/// Normalize a due-date phrase ("by Friday", "Tomorrow", "next  week").
pub fn normalize_due_date(token: &str) -> DueDate {
    let trimmed = token.trim();
    let lowered = trimmed.to_ascii_lowercase();
    let stripped = ["by ", "due ", "this "]
        .iter()
        .find(|prefix| lowered.starts_with(*prefix))
        .map(|prefix| trimmed[prefix.len()..].trim_start())
        .unwrap_or(trimmed);
    DueDate::from_token(stripped)
}

// -----------------------------------------------------------------------
// Extractors
// -----------------------------------------------------------------------

fn goal_full(caps: &Captures<'_>, _text: &str) -> Option<Action> {
    let name = clean_name(caps.name("name")?.as_str())?;
    let mut months = count(caps.name("dur")?.as_str())?;
    if caps
        .name("unit")
        .is_some_and(|u| u.as_str().to_ascii_lowercase().starts_with('y'))
    {
        months = months.saturating_mul(12);
    }
    let daily = count(caps.name("daily")?.as_str())?;
    Some(Action::create_goal(name, months, daily))
}

fn goal_loose(caps: &Captures<'_>, text: &str) -> Option<Action> {
    let name = clean_name(caps.name("name")?.as_str())?;
    let qualifiers = outside_quotes(text);
    Some(Action::create_goal(
        name,
        months_in(&qualifiers).unwrap_or(DEFAULT_DURATION_MONTHS),
        minutes_in(&qualifiers).unwrap_or(DEFAULT_DAILY_MINUTES),
    ))
}

fn task_full(caps: &Captures<'_>, text: &str) -> Option<Action> {
    let name = clean_name(caps.name("name")?.as_str())?;
    let due = normalize_due_date(caps.name("due")?.as_str());
    let minutes = count(caps.name("minutes")?.as_str())?;
    Some(Action::create_task(name, due, minutes, goal_link(text)))
}

fn task_loose(caps: &Captures<'_>, text: &str) -> Option<Action> {
    let name = clean_name(caps.name("name")?.as_str())?;
    let qualifiers = outside_quotes(text);
    let due = DUE_RE
        .find(&qualifiers)
        .map(|m| normalize_due_date(m.as_str()))
        .unwrap_or_default();
    Some(Action::create_task(
        name,
        due,
        minutes_in(&qualifiers).unwrap_or(DEFAULT_TASK_MINUTES),
        goal_link(text),
    ))
}

fn complete_task(caps: &Captures<'_>, _text: &str) -> Option<Action> {
    let name = clean_name(caps.name("name")?.as_str())?;
    // "complete task", "finish goal X", "I did not finish X"
    if name.eq_ignore_ascii_case("task") || first_word_is(&name, "goal") || is_negated(&name) {
        return None;
    }
    Some(Action::complete_task(name))
}

fn delete_goal(caps: &Captures<'_>, _text: &str) -> Option<Action> {
    let name = clean_name(caps.name("name")?.as_str())?;
    if first_word_is(&name, "task") {
        return None;
    }
    Some(Action::delete_goal(name))
}

fn delete_task(caps: &Captures<'_>, _text: &str) -> Option<Action> {
    let name = clean_name(caps.name("name")?.as_str())?;
    if first_word_is(&name, "goal") {
        return None;
    }
    Some(Action::delete_task(name))
}

// -----------------------------------------------------------------------
// Helpers
// -----------------------------------------------------------------------

/// Trim a captured name. Quoted names are taken verbatim; unquoted names
/// lose their first trailing qualifier clause and anything after it.
fn clean_name(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if let Some(inner) = leading_quoted(trimmed) {
        let inner = inner.trim();
        return (!inner.is_empty()).then(|| inner.to_string());
    }

    let cut = match QUALIFIER_RE.find(trimmed) {
        Some(m) => &trimmed[..m.start()],
        None => trimmed,
    };
    let cleaned = cut
        .trim()
        .trim_matches(|c: char| {
            matches!(
                c,
                '"' | '\'' | '\u{201c}' | '\u{201d}' | '.' | ',' | '!' | '?' | ';' | ':'
            )
        })
        .trim();
    (!cleaned.is_empty()).then(|| cleaned.to_string())
}

/// Contents of a quoted span at the very start of `text`.
fn leading_quoted(text: &str) -> Option<&str> {
    let open = text.chars().next()?;
    let close = match open {
        '"' => '"',
        '\'' => '\'',
        '\u{201c}' => '\u{201d}',
        _ => return None,
    };
    let rest = &text[open.len_utf8()..];
    let end = rest.find(close)?;
    Some(&rest[..end])
}

/// `text` with double-quoted spans blanked, so numbers and dates inside a
/// quoted name are not mistaken for qualifiers.
fn outside_quotes(text: &str) -> String {
    QUOTED_RE.replace_all(text, " ").into_owned()
}

fn months_in(text: &str) -> Option<u32> {
    if let Some(months) = first_number(&MONTHS_RE, text) {
        return Some(months);
    }
    first_number(&YEARS_RE, text).map(|years| years.saturating_mul(12))
}

fn minutes_in(text: &str) -> Option<u32> {
    if let Some(minutes) = first_number(&MINUTES_RE, text) {
        return Some(minutes);
    }
    let hours: f64 = HOURS_RE.captures(text)?.get(1)?.as_str().parse().ok()?;
    let minutes = (hours * 60.0).round();
    (minutes >= 1.0 && minutes <= f64::from(u32::MAX)).then_some(minutes as u32)
}

fn first_number(re: &Regex, text: &str) -> Option<u32> {
    count(re.captures(text)?.get(1)?.as_str())
}

/// Parse a run of digits, clamping values past `u32::MAX`.
fn count(digits: &str) -> Option<u32> {
    match digits.parse::<u32>() {
        Ok(n) => Some(n),
        Err(e) if *e.kind() == IntErrorKind::PosOverflow => Some(u32::MAX),
        Err(_) => None,
    }
}

fn goal_link(text: &str) -> Option<String> {
    let caps = GOAL_LINK_RE.captures(text)?;
    clean_name(caps.name("goal")?.as_str())
}

fn first_word_is(name: &str, word: &str) -> bool {
    name.split_whitespace()
        .next()
        .is_some_and(|first| first.eq_ignore_ascii_case(word))
}

fn is_negated(name: &str) -> bool {
    let Some(first) = name.split_whitespace().next() else {
        return false;
    };
    let first = first.to_ascii_lowercase().replace('\u{2019}', "'");
    matches!(first.as_str(), "not" | "never") || first.ends_with("n't")
}
