use std::sync::OnceLock;

use regex::Regex;

use crate::models::IntentTag;

/// Ordered intent rules; the first pattern that matches wins.
const RULES: &[(IntentTag, &str)] = &[
    (
        IntentTag::Value,
        r"\b(value|ev|expected value|edge|leverage|contrarian|pick rates?|under-?picked|over-?picked|pool strategy)\b",
    ),
    (
        IntentTag::Compare,
        r"\b(vs\.?|versus|compare|comparison|head to head|who would win|matchup)\b",
    ),
    (IntentTag::Region, r"\b(region|regional|east|west|south|midwest)\b"),
    (
        IntentTag::Champion,
        r"\b(champion|championship|title|final four|win it all|natty|cut down the nets)\b",
    ),
    (
        IntentTag::Upset,
        r"\b(upsets?|cinderella|underdogs?|dark horse|sleepers?|bust)\b",
    ),
    (
        IntentTag::Stats,
        r"\b(stats?|statistics|efficiency|tempo|offen[cs]e|defen[cs]e|ratings?|kenpom|archetype|metrics?)\b",
    ),
    (
        IntentTag::Bracket,
        r"\b(bracket|round|sweet (16|sixteen)|elite (8|eight)|first weekend|seed(s|ing)?)\b",
    ),
];

fn compiled() -> &'static [(IntentTag, Regex)] {
    static COMPILED: OnceLock<Vec<(IntentTag, Regex)>> = OnceLock::new();
    COMPILED.get_or_init(|| {
        RULES
            .iter()
            .map(|(tag, pattern)| (*tag, Regex::new(pattern).unwrap()))
            .collect()
    })
}

/// Coarse intent of a question. Advisory only: it biases retrieval and
/// annotates the prompt, it never filters facts out.
pub fn classify(query: &str) -> IntentTag {
    let lowered = query.to_lowercase();
    compiled()
        .iter()
        .find(|(_, re)| re.is_match(&lowered))
        .map(|(tag, _)| *tag)
        .unwrap_or(IntentTag::Quick)
}

/// Short hint appended to the system prompt so the backend knows what shape
/// of answer is expected.
pub fn prompt_hint(intent: IntentTag) -> &'static str {
    match intent {
        IntentTag::Value => "The user wants pool value: compare modeled advancement odds with public pick rates and EV.",
        IntentTag::Compare => "The user wants a head-to-head comparison of specific teams.",
        IntentTag::Region => "The user is asking about one region of the bracket.",
        IntentTag::Champion => "The user is asking about title contenders and Final Four paths.",
        IntentTag::Upset => "The user is hunting upsets; weigh upset flags and volatility.",
        IntentTag::Stats => "The user wants statistical detail from team profiles.",
        IntentTag::Bracket => "The user is asking about bracket structure, rounds or seeding.",
        IntentTag::Quick => "Give a short, direct answer.",
    }
}
