use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::llm::{BackendError, GenerativeBackend, Turn};
use crate::models::{SeedBuckets, TeamProfile};
use crate::services::prompts;
use crate::store::FactStore;

/// Sampling temperature for every narrative and repair call.
pub const NARRATIVE_TEMPERATURE: f32 = 0.0;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SeedRecord {
    pub games: u32,
    /// Wins by the better (lower-numbered) seed.
    pub wins: u32,
    pub win_rate: f64,
}

/// Head-to-head record of one seed line against another, aggregated over the
/// base prediction set. Keys read `"{better}v{worse}"`, e.g. `"5v12"`.
pub fn seed_history(store: &FactStore) -> BTreeMap<String, SeedRecord> {
    let mut tally: BTreeMap<(u8, u8), (u32, u32)> = BTreeMap::new();
    for pred in &store.predictions.base {
        let (Some(s1), Some(s2)) = (pred.seed1, pred.seed2) else {
            continue;
        };
        let better_won = if s1 <= s2 { pred.team1_won() } else { !pred.team1_won() };
        let (games, wins) = tally.entry((s1.min(s2), s1.max(s2))).or_default();
        *games += 1;
        if better_won {
            *wins += 1;
        }
    }

    tally
        .into_iter()
        .map(|((a, b), (games, wins))| {
            let win_rate = (wins as f64 / games as f64 * 1000.0).round() / 1000.0;
            (format!("{}v{}", a, b), SeedRecord { games, wins, win_rate })
        })
        .collect()
}

fn matched_profiles(buckets: &SeedBuckets, store: &FactStore) -> Value {
    let mut out = Map::new();
    for (seed, entries) in buckets.iter() {
        let rows: Vec<Value> = entries
            .iter()
            .map(|entry| {
                let profile: Option<&TeamProfile> = store.profile_by_name(&entry.team);
                json!({
                    "team": entry.team,
                    "region": entry.region,
                    "profile": profile,
                })
            })
            .collect();
        out.insert(SeedBuckets::key(seed), Value::Array(rows));
    }
    Value::Object(out)
}

/// Everything the backend sees: the canonical buckets, their profiles and the
/// seed-vs-seed history.
pub fn build_payload(buckets: &SeedBuckets, store: &FactStore) -> Value {
    json!({
        "canonical_buckets": buckets,
        "team_profiles": matched_profiles(buckets, store),
        "seed_history": seed_history(store),
    })
}

/// A stage-2 conversation: the fixed instructions plus the turns so far.
#[derive(Debug, Clone)]
pub struct NarrativePrompt {
    pub system: &'static str,
    pub turns: Vec<Turn>,
}

impl NarrativePrompt {
    pub fn new(user_request: &str, buckets: &SeedBuckets, store: &FactStore) -> Self {
        let payload = build_payload(buckets, store);
        let payload = serde_json::to_string_pretty(&payload).unwrap_or_else(|_| payload.to_string());
        Self {
            system: prompts::NARRATIVE_SYSTEM,
            turns: vec![Turn::user(prompts::narrative_request(user_request, &payload))],
        }
    }

    /// Extend the conversation with a rejected draft and its correction.
    pub fn push_correction(&mut self, draft: String, correction: String) {
        self.turns.push(Turn::assistant(draft));
        self.turns.push(Turn::user(correction));
    }
}

pub async fn generate(backend: &dyn GenerativeBackend, prompt: &NarrativePrompt) -> Result<String, BackendError> {
    backend
        .complete(prompt.system, &prompt.turns, NARRATIVE_TEMPERATURE)
        .await
}
