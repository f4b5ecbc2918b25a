/// Finds catalog pathologies mentioned in generated text.
///
/// Markup is stripped to a plain text surface, then each pathology title is matched
/// literally, case-insensitively and as a whole word. Results are ordered by where a
/// title first appears in the text, each title at most once.
use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;

use crate::model::Pathology;

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid regex"));

/// Replace every markup tag with a space.
pub fn strip_tags(html: &str) -> String {
    TAG_RE.replace_all(html, " ").into_owned()
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Whole-word pattern for `title`. Word boundaries are only asserted next to word
/// characters so titles with leading or trailing punctuation still match.
fn title_pattern(title: &str) -> Result<Regex, regex::Error> {
    let lead = if title.starts_with(is_word_char) { r"\b" } else { "" };
    let trail = if title.ends_with(is_word_char) { r"\b" } else { "" };
    Regex::new(&format!("(?i){lead}{}{trail}", regex::escape(title)))
}

/// Pathology matchers compiled once from the catalog.
#[derive(Debug)]
pub struct Correlator {
    patterns: Vec<(Pathology, Regex)>,
}

impl Correlator {
    pub fn new(pathologies: &[Pathology]) -> Self {
        let patterns = pathologies
            .iter()
            .filter(|p| !p.title.trim().is_empty())
            .filter_map(|p| match title_pattern(p.title.trim()) {
                Ok(re) => Some((p.clone(), re)),
                Err(e) => {
                    warn!(pathology = %p.title, error = %e, "skipping unmatchable pathology title");
                    None
                }
            })
            .collect();
        Self { patterns }
    }

    pub fn correlate(&self, text: &str) -> Vec<Pathology> {
        if text.trim().is_empty() {
            return Vec::new();
        }
        let surface = strip_tags(text);

        // (first position, catalog index) keeps ties in catalog order.
        let mut hits: Vec<(usize, usize, &Pathology)> = self
            .patterns
            .iter()
            .enumerate()
            .filter_map(|(i, (p, re))| re.find(&surface).map(|m| (m.start(), i, p)))
            .collect();
        hits.sort_by_key(|&(pos, i, _)| (pos, i));

        let mut seen = HashSet::new();
        hits.into_iter()
            .filter(|(_, _, p)| seen.insert(p.title.to_lowercase()))
            .map(|(_, _, p)| p.clone())
            .collect()
    }
}
