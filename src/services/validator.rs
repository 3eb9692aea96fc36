use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

use crate::models::{SeedBuckets, ValidationReport, SEED_COUNT};
use crate::services::normalizer::normalize;

fn header_pattern() -> &'static Regex {
    static HEADER: OnceLock<Regex> = OnceLock::new();
    HEADER.get_or_init(|| Regex::new(r"(?mi)^[ \t]*###[ \t]+SEED_(\d{1,2})\b").unwrap())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    /// A team named inside another seed's section.
    WrongSection { team: String, home: u8, found_in: u8 },
    /// A populated bucket whose section is absent or blank.
    MissingSection { seed: u8 },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::WrongSection { team, home, found_in } => write!(
                f,
                "'{}' belongs to {} but is mentioned in the {} section",
                team,
                SeedBuckets::key(*home),
                SeedBuckets::key(*found_in)
            ),
            Violation::MissingSection { seed } => write!(
                f,
                "{} section is missing or empty",
                SeedBuckets::key(*seed)
            ),
        }
    }
}

/// Split markdown into one text block per seed.
///
/// Only well-formed `### SEED_N` headers with N in 1..=16 anchor a block; a
/// block runs to the next such header or the end of the text. Text before
/// the first header belongs to no seed, and a repeated header appends to its
/// seed's block.
pub fn sections(markdown: &str) -> Vec<String> {
    let mut blocks = vec![String::new(); SEED_COUNT as usize];
    let headers: Vec<(u8, usize, usize)> = header_pattern()
        .captures_iter(markdown)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let seed: u8 = caps[1].parse().ok()?;
            (1..=SEED_COUNT)
                .contains(&seed)
                .then(|| (seed, whole.start(), whole.end()))
        })
        .collect();

    for (i, (seed, _, body_start)) in headers.iter().enumerate() {
        let body_end = headers
            .get(i + 1)
            .map(|(_, next_start, _)| *next_start)
            .unwrap_or(markdown.len());
        let block = &mut blocks[*seed as usize - 1];
        if !block.is_empty() {
            block.push('\n');
        }
        block.push_str(&markdown[*body_start..body_end]);
    }
    blocks
}

/// Every grounding violation in `markdown`, in bucket order.
///
/// Team matching is a normalized substring test, so a short name contained in
/// a longer one can produce a false positive.
pub fn check(markdown: &str, buckets: &SeedBuckets) -> Vec<Violation> {
    let normalized: Vec<String> = sections(markdown).iter().map(|b| normalize(b)).collect();
    let mut violations = Vec::new();

    for (home, entries) in buckets.iter() {
        for entry in entries {
            let team = normalize(&entry.team);
            if team.is_empty() {
                continue;
            }
            for (i, block) in normalized.iter().enumerate() {
                let found_in = i as u8 + 1;
                if found_in == home || !block.contains(&team) {
                    continue;
                }
                // same name legitimately listed under that seed too
                if buckets.get(found_in).iter().any(|e| normalize(&e.team) == team) {
                    continue;
                }
                violations.push(Violation::WrongSection {
                    team: entry.team.clone(),
                    home,
                    found_in,
                });
            }
        }
    }

    for (seed, entries) in buckets.iter() {
        if !entries.is_empty() && normalized[seed as usize - 1].trim().is_empty() {
            violations.push(Violation::MissingSection { seed });
        }
    }
    violations
}

pub fn validate(markdown: &str, buckets: &SeedBuckets) -> ValidationReport {
    let violations = check(markdown, buckets);
    tracing::debug!(violations = violations.len(), "Validated seed narrative");
    ValidationReport {
        ok: violations.is_empty(),
        errors: violations.iter().map(ToString::to_string).collect(),
    }
}
