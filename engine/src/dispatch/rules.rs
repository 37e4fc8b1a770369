//! The ordered command rule table
//!
//! Matching here is pure string inspection; the dispatcher owns every side
//! effect. `classify` walks the table top to bottom and the first rule that
//! matches wins.

use serde::Serialize;
use std::fmt;

/// Inputs at least this many characters long skip intent classification
pub const INTENT_MAX_CHARS: usize = 200;

/// Inputs whose words total at least this many characters skip intent
/// classification
pub const INTENT_MAX_WORD_CHARS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    Empty,
    Exit,
    ScriptNormalize,
    Spreadsheet,
    OpenApp,
    Clock,
    News,
    WebSearch,
    AskModel,
    IntentFallback,
    Completion,
}

impl RuleKind {
    /// Evaluation order
    pub const ORDER: [RuleKind; 11] = [
        RuleKind::Empty,
        RuleKind::Exit,
        RuleKind::ScriptNormalize,
        RuleKind::Spreadsheet,
        RuleKind::OpenApp,
        RuleKind::Clock,
        RuleKind::News,
        RuleKind::WebSearch,
        RuleKind::AskModel,
        RuleKind::IntentFallback,
        RuleKind::Completion,
    ];

    /// The terminal rule `text` resolves to
    ///
    /// `ScriptNormalize` only rewrites the input and is never returned;
    /// callers translate first and classify the result.
    pub fn classify(text: &str, exit_phrases: &[String]) -> RuleKind {
        let text = text.trim();
        if text.is_empty() {
            return RuleKind::Empty;
        }

        let lowered = text.to_lowercase();
        if exit_phrases.iter().any(|p| *p == lowered) {
            return RuleKind::Exit;
        }

        Self::classify_command(text, &lowered)
    }

    /// Rules 4 onwards, for text that is already known to be non-empty and
    /// not an exit phrase
    pub(crate) fn classify_command(text: &str, lowered: &str) -> RuleKind {
        if lowered.starts_with("excel") && lowered.contains(':') {
            RuleKind::Spreadsheet
        } else if ["open notepad", "open calculator", "open chrome"]
            .iter()
            .any(|kw| lowered.contains(kw))
        {
            RuleKind::OpenApp
        } else if lowered.contains("time") || lowered.contains("date") {
            RuleKind::Clock
        } else if lowered.contains("news") {
            RuleKind::News
        } else if lowered.starts_with("search ") || lowered.starts_with("google ") {
            RuleKind::WebSearch
        } else if lowered.starts_with("gpt:") || lowered.starts_with("ask:") {
            RuleKind::AskModel
        } else if is_short_input(text) {
            RuleKind::IntentFallback
        } else {
            RuleKind::Completion
        }
    }

    /// Whether the rule may append to memory
    pub fn writes_memory(self) -> bool {
        matches!(
            self,
            RuleKind::AskModel | RuleKind::IntentFallback | RuleKind::Completion
        )
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RuleKind::Empty => "empty",
            RuleKind::Exit => "exit",
            RuleKind::ScriptNormalize => "script_normalize",
            RuleKind::Spreadsheet => "spreadsheet",
            RuleKind::OpenApp => "open_app",
            RuleKind::Clock => "clock",
            RuleKind::News => "news",
            RuleKind::WebSearch => "web_search",
            RuleKind::AskModel => "ask_model",
            RuleKind::IntentFallback => "intent_fallback",
            RuleKind::Completion => "completion",
        };
        f.write_str(name)
    }
}

/// Short enough to spend a cheap classification call on
pub fn is_short_input(text: &str) -> bool {
    let word_chars: usize = text.split_whitespace().map(|w| w.chars().count()).sum();
    text.chars().count() < INTENT_MAX_CHARS && word_chars < INTENT_MAX_WORD_CHARS
}

/// Everything after the first `:`, trimmed
pub fn after_colon(text: &str) -> &str {
    text.split_once(':').map_or("", |(_, rest)| rest.trim())
}

/// The news query with the keyword removed, or "latest news"
pub fn news_query(text: &str) -> String {
    let mut remainder = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = find_ascii_ci(rest, "news") {
        remainder.push_str(&rest[..pos]);
        rest = &rest[pos + 4..];
    }
    remainder.push_str(rest);

    let query = remainder.split_whitespace().collect::<Vec<_>>().join(" ");
    if query.is_empty() {
        "latest news".to_string()
    } else {
        query
    }
}

/// The query after `search ` / `google `
pub fn search_query(text: &str) -> &str {
    text.split_once(' ').map_or("", |(_, rest)| rest.trim())
}

fn find_ascii_ci(haystack: &str, needle: &str) -> Option<usize> {
    haystack
        .as_bytes()
        .windows(needle.len())
        .position(|w| w.eq_ignore_ascii_case(needle.as_bytes()))
}
