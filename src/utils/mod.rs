use serde_json::Value;

/// Normalize a win probability into [0,1].
///
/// Values of 2 or more are read as percentages. Anything still outside the
/// unit interval (a fraction that overshot, a percentage above 100) is clamped.
pub fn normalize_probability(raw: f64) -> f64 {
    if raw.is_nan() {
        return 0.5;
    }
    let p = if raw >= 2.0 { raw / 100.0 } else { raw };
    p.clamp(0.0, 1.0)
}

/// Confidence shown to a consumer: the favourite's side of the probability.
pub fn confidence_percentage(probability: f64) -> f64 {
    let p = normalize_probability(probability);
    p.max(1.0 - p)
}

/// Tier label for a win probability, using the pipeline's thresholds.
pub fn confidence_tier(probability: f64) -> &'static str {
    let p = confidence_percentage(probability);
    if p >= 0.85 {
        "LOCK"
    } else if p >= 0.72 {
        "STRONG"
    } else if p >= 0.60 {
        "LEAN"
    } else if p >= 0.52 {
        "TOSS-UP"
    } else {
        "COIN FLIP"
    }
}

/// Format a [0,1] fraction as a percentage string (e.g., "73.0%")
pub fn format_percentage(fraction: f64) -> String {
    format!("{:.1}%", fraction * 100.0)
}

/// Read a seed from loosely-typed JSON: integers, integral floats, or strings
/// holding an integer. Anything else is not a seed.
pub fn parse_seed(value: &Value) -> Option<u8> {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_u64() {
                u8::try_from(i).ok()
            } else {
                let f = n.as_f64()?;
                (f.fract() == 0.0 && (0.0..=255.0).contains(&f)).then(|| f as u8)
            }
        }
        Value::String(s) => s.trim().parse::<u8>().ok(),
        _ => None,
    }
}

/// Lowercased alphanumeric tokens longer than `min_len` characters.
pub fn tokens(text: &str, min_len: usize) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() > min_len)
        .map(str::to_lowercase)
        .collect()
}

/// Validate team name format
pub fn validate_team_name(name: &str) -> bool {
    !name.trim().is_empty() && name.len() <= 100
}
