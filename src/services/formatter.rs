use serde_json::Value;

use crate::models::{BracketEntry, ContextItem, EvRow, InjuryReport, Prediction, PredictionSet, TeamProfile};
use crate::utils::{confidence_percentage, confidence_tier, format_percentage};

/// Render retrieved items into the plain-text grounding block sent to the
/// backend. One line per item, input order preserved, empty renders skipped.
pub fn format(items: &[ContextItem]) -> String {
    items
        .iter()
        .map(render)
        .filter(|line| !line.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn render(item: &ContextItem) -> String {
    match item {
        ContextItem::Team { profile } => render_team(profile),
        ContextItem::Prediction {
            source,
            hypothetical,
            prediction,
        } => render_prediction(*source, hypothetical.unwrap_or(false), prediction),
        ContextItem::Optimizer { result } => render_optimizer(result),
        ContextItem::Bracket { entry } => render_bracket(entry),
        ContextItem::Note { text } => {
            if text.trim().is_empty() {
                String::new()
            } else {
                format!("NOTE: {}", text.trim())
            }
        }
        ContextItem::Value { row } => render_value(row),
    }
}

fn scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn render_team(profile: &TeamProfile) -> String {
    if profile.name.trim().is_empty() {
        return String::new();
    }
    let mut parts = vec![format!("TEAM: {}", profile.name)];
    if let Some(archetype) = &profile.archetype {
        match &profile.archetype_description {
            Some(desc) => parts.push(format!("archetype: {} ({})", archetype, desc)),
            None => parts.push(format!("archetype: {}", archetype)),
        }
    }
    let players = profile.key_player_names();
    if !players.is_empty() {
        parts.push(format!("key players: {}", players.join(", ")));
    }
    let stats: Vec<String> = profile
        .stats
        .iter()
        .map(|(k, v)| (k, scalar(v)))
        .filter(|(_, v)| !v.is_empty())
        .map(|(k, v)| format!("{}={}", k, v))
        .collect();
    if !stats.is_empty() {
        parts.push(format!("stats: {}", stats.join(", ")));
    }
    let kenpom: Vec<String> = profile
        .kenpom
        .iter()
        .map(|(k, v)| (k, scalar(v)))
        .filter(|(_, v)| !v.is_empty())
        .map(|(k, v)| format!("{}={}", k, v))
        .collect();
    if !kenpom.is_empty() {
        parts.push(format!("kenpom: {}", kenpom.join(", ")));
    }
    if let Some(depth) = profile.onoff.as_ref().and_then(|o| o.depth_label.as_deref()) {
        if !depth.trim().is_empty() && depth != "Unknown" {
            parts.push(format!("depth: {}", depth));
        }
    }
    if let Some(status) = profile.injuries.as_ref().and_then(InjuryReport::summary) {
        parts.push(format!("injuries: {}", status));
    }
    parts.join(" | ")
}

fn seeded(name: &str, seed: Option<u8>) -> String {
    match seed {
        Some(s) => format!("({}) {}", s, name),
        None => name.to_string(),
    }
}

fn render_prediction(source: PredictionSet, hypothetical: bool, pred: &Prediction) -> String {
    let p = pred.probability();
    let tier = pred
        .confidence
        .as_deref()
        .filter(|c| !c.trim().is_empty())
        .unwrap_or_else(|| confidence_tier(p));

    let mut parts = vec![
        format!(
            "PREDICTION [{}]{}: {} vs {}",
            source,
            if hypothetical { " HYPOTHETICAL" } else { "" },
            seeded(&pred.team1, pred.seed1),
            seeded(&pred.team2, pred.seed2),
        ),
        format!(
            "pick: {} | {} win prob: {} | confidence: {} ({})",
            pred.predicted_winner(),
            pred.team1,
            format_percentage(p),
            format_percentage(confidence_percentage(p)),
            tier
        ),
    ];
    if pred.is_upset() {
        parts.push("UPSET FLAG".to_string());
    }
    if let Some(momentum) = &pred.momentum {
        parts.push(format!("momentum: {}", momentum));
    }
    if let Some(volatility) = pred.volatility {
        parts.push(format!("volatility: {:.2}", volatility));
    }
    if let Some(edge) = pred.value_score {
        parts.push(format!("value edge: {:+.1}%", edge * 100.0));
    }
    if pred.injury_flag == Some(true) {
        parts.push("injury: flagged".to_string());
    }
    for (team, report) in [(&pred.team1, &pred.t1_injury), (&pred.team2, &pred.t2_injury)] {
        if let Some(status) = report.as_ref().and_then(InjuryReport::summary) {
            parts.push(format!("{} injury: {}", team, status));
        }
    }
    if let Some(conf) = &pred.conf_tourney {
        parts.push(format!("conf tourney: {}", conf));
    }
    if let Some(risk) = &pred.risk_note {
        parts.push(format!("risk: {}", risk));
    }
    parts.join(" | ")
}

fn render_optimizer(result: &Value) -> String {
    match result {
        Value::Null => String::new(),
        Value::Object(map) if map.is_empty() => String::new(),
        Value::String(s) if s.trim().is_empty() => String::new(),
        Value::String(s) => format!("OPTIMIZER: {}", s),
        other => format!("OPTIMIZER: {}", other),
    }
}

fn render_bracket(entry: &BracketEntry) -> String {
    format!("BRACKET: ({}) {}, {} region", entry.seed, entry.team, entry.region)
}

fn render_value(row: &EvRow) -> String {
    if row.team.trim().is_empty() {
        return String::new();
    }
    let mut head = row.team.clone();
    match (row.seed, &row.region) {
        (Some(seed), Some(region)) => head.push_str(&format!(" ({}, {})", seed, region)),
        (Some(seed), None) => head.push_str(&format!(" ({})", seed)),
        (None, Some(region)) => head.push_str(&format!(" ({})", region)),
        (None, None) => {}
    }
    let mut parts = vec![format!("VALUE: {}", head), format!("total EV {:.2}", row.total_ev)];
    let rounds: Vec<String> = row
        .rounds
        .iter()
        .map(|(k, v)| (k, scalar(v)))
        .filter(|(_, v)| !v.is_empty())
        .map(|(k, v)| format!("{}={}", k, v))
        .collect();
    if !rounds.is_empty() {
        parts.push(rounds.join(", "));
    }
    parts.join(" | ")
}
