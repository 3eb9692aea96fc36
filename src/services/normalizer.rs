use std::sync::OnceLock;

use regex::Regex;
use unicode_normalization::UnicodeNormalization;

struct WordRules {
    saint_or_state: Regex,
    university: Regex,
    whitespace: Regex,
}

fn rules() -> &'static WordRules {
    static RULES: OnceLock<WordRules> = OnceLock::new();
    RULES.get_or_init(|| WordRules {
        saint_or_state: Regex::new(r"(?i)\b(?:saint|state)\b").unwrap(),
        university: Regex::new(r"(?i)\buniversity\b").unwrap(),
        whitespace: Regex::new(r"\s+").unwrap(),
    })
}

/// Canonical form of a team name, used for every cross-source comparison.
///
/// "Saint Mary's" and "St. Mary's" both become `st marys`; "Texas A&M"
/// becomes `texas aandm`. The result is stable under re-normalization.
pub fn normalize(raw: &str) -> String {
    if raw.is_empty() {
        return String::new();
    }
    let rules = rules();

    let decomposed: String = raw
        .nfkd()
        .filter(|c| !matches!(c, '\'' | '\u{2018}' | '\u{2019}' | '.'))
        .map(|c| if c == '&' { "and".to_string() } else { c.to_string() })
        .collect();

    let replaced = rules.saint_or_state.replace_all(&decomposed, "st");
    let replaced = rules.university.replace_all(&replaced, "univ");
    let collapsed = rules.whitespace.replace_all(&replaced, " ");

    collapsed.trim().to_lowercase()
}

/// Whether `name` (normalized) occurs inside `haystack` (already normalized).
/// Names that normalize to nothing never match.
pub fn mentions(normalized_haystack: &str, name: &str) -> bool {
    let needle = normalize(name);
    !needle.is_empty() && normalized_haystack.contains(&needle)
}
