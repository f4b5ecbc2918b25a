/// Extraction of structured payloads from free-form AI output.
///
/// Nothing here fails: a missing table becomes a placeholder table, an unusable JSON
/// payload becomes an empty list and malformed items are dropped with a log line.
use std::sync::LazyLock;

use predial_common::mcp_api::SuggestionInfo;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

static TABLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<table.*?</table>").expect("valid regex"));

static FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)```(?:html)?").expect("valid regex"));

/// An HTML table taken from AI output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableFragment {
    pub html: String,
    /// True when no table was found and the placeholder was used.
    pub fallback: bool,
}

/// One-row table carrying `message` in its only cell.
pub fn fallback_table(message: &str) -> String {
    format!("<table><tr><td>{message}</td></tr></table>")
}

/// First `<table>...</table>` span of `text`, or the fallback table.
pub fn extract_table(text: &str, failure_message: &str) -> TableFragment {
    match TABLE_RE.find(text) {
        Some(m) => TableFragment {
            html: m.as_str().to_string(),
            fallback: false,
        },
        None => {
            warn!(chars = text.len(), "no table in AI response, using placeholder");
            TableFragment {
                html: fallback_table(failure_message),
                fallback: true,
            }
        }
    }
}

/// Remove Markdown code fences (```` ``` ```` and ```` ```html ````) and trim.
pub fn strip_code_fences(text: &str) -> String {
    FENCE_RE.replace_all(text, "").trim().to_string()
}

/// Periodicity proposed by the AI for one selected typology.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestion {
    pub typology: String,
    pub periodicity: String,
    pub justification: String,
}

impl From<&Suggestion> for SuggestionInfo {
    fn from(s: &Suggestion) -> Self {
        Self {
            typology: s.typology.clone(),
            periodicity: s.periodicity.clone(),
            justification: s.justification.clone(),
        }
    }
}

/// Parse the JSON array between the first `[` and the last `]` of `text`.
///
/// Elements without all three string fields are dropped.
pub fn parse_suggestions(text: &str) -> Vec<Suggestion> {
    let (Some(start), Some(end)) = (text.find('['), text.rfind(']')) else {
        warn!("no JSON array in AI response");
        return Vec::new();
    };
    if end < start {
        warn!("unbalanced JSON array in AI response");
        return Vec::new();
    }

    let items: Vec<serde_json::Value> = match serde_json::from_str(&text[start..=end]) {
        Ok(items) => items,
        Err(e) => {
            warn!(error = %e, "AI response is not a JSON array");
            return Vec::new();
        }
    };

    let total = items.len();
    let suggestions: Vec<Suggestion> = items
        .into_iter()
        .filter_map(|v| serde_json::from_value(v).ok())
        .collect();

    if suggestions.len() != total {
        warn!(
            kept = suggestions.len(),
            dropped = total - suggestions.len(),
            "dropped malformed suggestions"
        );
    } else {
        debug!(count = total, "parsed suggestions");
    }
    suggestions
}
