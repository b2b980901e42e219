//! Text search over records: query normalization, substring search,
//! suggestion ranking, and match highlighting.

use crate::transaction::Transaction;
use regex::RegexBuilder;
use serde::Serialize;
use std::collections::HashSet;
use unicode_normalization::{char::is_combining_mark, UnicodeNormalization};

/// Terms shorter than this (after trimming) do not narrow a search.
pub const MIN_SEARCH_LEN: usize = 2;
pub const MAX_SUGGESTIONS: usize = 5;

/// Well-known merchant-like terms offered as suggestions, in tie-break order.
pub const SUGGESTION_TERMS: &[&str] = &[
    "amazon", "starbucks", "walmart", "target", "mcdonalds", "shell", "netflix", "spotify",
    "uber", "lyft", "apple", "google", "paypal", "venmo", "square", "stripe",
];

/// Lowercase, strip diacritics, drop everything outside `[a-z0-9\s]`,
/// and collapse whitespace runs to a single space. Idempotent.
pub fn normalize(text: &str) -> String {
    let stripped: String = text
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .map(|c| if c.is_whitespace() { ' ' } else { c })
        .filter(|c| c.is_ascii_alphanumeric() || *c == ' ')
        .collect();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Records whose description, merchant, category, id, or amount contains
/// `term` (case-insensitive). Short terms return every record unchanged.
/// Input order is preserved.
pub fn search(records: &[Transaction], term: &str) -> Vec<Transaction> {
    let term = term.trim();
    if term.chars().count() < MIN_SEARCH_LEN {
        return records.to_vec();
    }
    let needle = term.to_lowercase();
    records
        .iter()
        .filter(|t| matches_term(t, &needle))
        .cloned()
        .collect()
}

fn matches_term(t: &Transaction, needle: &str) -> bool {
    t.description.to_lowercase().contains(needle)
        || t.merchant_name.to_lowercase().contains(needle)
        || t.category.to_lowercase().contains(needle)
        || t.id.to_lowercase().contains(needle)
        || t.amount.to_string().contains(needle)
}

/// Up to five suggestion terms related to `term`, best first.
/// Equal scores keep vocabulary order.
pub fn suggest(term: &str) -> Vec<&'static str> {
    let lowered = term.to_lowercase();
    let mut ranked: Vec<(&'static str, u32)> = SUGGESTION_TERMS
        .iter()
        .filter(|candidate| {
            candidate.contains(lowered.as_str())
                || candidate.starts_with(lowered.as_str())
                || lowered.contains(*candidate)
        })
        .map(|candidate| (*candidate, relevance_score(candidate, &lowered)))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    ranked.into_iter().take(MAX_SUGGESTIONS).map(|(c, _)| c).collect()
}

/// Additive relevance: exact +100, prefix +50, substring +25,
/// and +10 for each aligned position holding the same character.
pub fn relevance_score(candidate: &str, term: &str) -> u32 {
    let candidate = candidate.to_lowercase();
    let term = term.to_lowercase();
    let mut score = 0;
    if candidate == term {
        score += 100;
    }
    if candidate.starts_with(&term) {
        score += 50;
    }
    if candidate.contains(&term) {
        score += 25;
    }
    let aligned = candidate
        .chars()
        .zip(term.chars())
        .filter(|(a, b)| a == b)
        .count() as u32;
    score + aligned * 10
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HighlightSpan<'a> {
    pub text: &'a str,
    pub is_match: bool,
}

/// Split `text` around case-insensitive occurrences of `term`, tagging
/// the matched spans. Empty spans are omitted.
pub fn highlight<'a>(text: &'a str, term: &str) -> Vec<HighlightSpan<'a>> {
    let whole = vec![HighlightSpan { text, is_match: false }];
    if term.is_empty() || text.is_empty() {
        return whole;
    }
    let re = match RegexBuilder::new(&regex::escape(term))
        .case_insensitive(true)
        .build()
    {
        Ok(re) => re,
        Err(err) => {
            log::warn!("highlight pattern rejected: {err}");
            return whole;
        }
    };

    let mut spans = Vec::new();
    let mut cursor = 0;
    for m in re.find_iter(text) {
        if m.start() > cursor {
            spans.push(HighlightSpan { text: &text[cursor..m.start()], is_match: false });
        }
        spans.push(HighlightSpan { text: m.as_str(), is_match: true });
        cursor = m.end();
    }
    if cursor < text.len() {
        spans.push(HighlightSpan { text: &text[cursor..], is_match: false });
    }
    if spans.is_empty() {
        return whole;
    }
    spans
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SearchPatternStats {
    /// Number of non-empty substrings (with repeats).
    pub segments: usize,
    /// Number of distinct non-empty substrings.
    pub unique: usize,
    /// `unique * term length`.
    pub score: usize,
}

/// Substring statistics for a query, used to gauge how selective it is.
pub fn analyze_search_patterns(term: &str) -> SearchPatternStats {
    let chars: Vec<char> = term.chars().collect();
    let mut unique = HashSet::new();
    let mut segments = 0;
    for i in 0..chars.len() {
        for j in (i + 1)..=chars.len() {
            segments += 1;
            unique.insert(chars[i..j].iter().collect::<String>());
        }
    }
    SearchPatternStats {
        segments,
        unique: unique.len(),
        score: unique.len() * chars.len(),
    }
}
