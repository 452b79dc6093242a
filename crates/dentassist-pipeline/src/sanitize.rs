// SPDX-FileCopyrightText: 2026 Dentassist Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared input sanitisation for text reaching the generative model.
//!
//! Order matters: truncate first (memory bound), strip control characters,
//! filter prompt-injection phrasings, then normalise whitespace.

use std::sync::LazyLock;

use regex::Regex;

static INJECTION_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)ignore\s+(all\s+)?(previous|above)\s+instructions?",
        r"(?i)disregard\s+(all\s+)?(previous|above)",
        r"(?i)forget\s+(everything|all)",
        r"(?i)you\s+are\s+now\s+a",
        r"(?i)new\s+instructions?:",
        r"(?i)system\s*:\s*",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static pattern"))
    .collect()
});

static SPACE_RUNS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t]+").expect("static"));
static NEWLINE_RUNS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{4,}").expect("static"));

/// Sanitise user text before prompt composition.
///
/// - truncates to `max_chars` characters
/// - removes control characters except newline and tab
/// - replaces prompt-injection phrasings with `[FILTERED]`
/// - collapses space/tab runs and caps consecutive newlines at three
/// - trims surrounding whitespace
pub fn sanitize_input(text: &str, max_chars: usize) -> String {
    if text.is_empty() {
        return String::new();
    }

    let truncated: String = text.chars().take(max_chars).collect();
    let cleaned: String = truncated
        .chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect();

    let mut filtered = cleaned;
    for pattern in INJECTION_PATTERNS.iter() {
        filtered = pattern.replace_all(&filtered, "[FILTERED]").into_owned();
    }

    let collapsed = SPACE_RUNS.replace_all(&filtered, " ");
    let capped = NEWLINE_RUNS.replace_all(&collapsed, "\n\n\n");
    capped.trim().to_string()
}
