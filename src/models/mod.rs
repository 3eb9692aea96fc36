use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::utils::{normalize_probability, parse_seed};

/// Number of seed lines in a regional bracket.
pub const SEED_COUNT: u8 = 16;

fn lenient_seed<'de, D>(deserializer: D) -> Result<Option<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw.as_ref().and_then(parse_seed))
}

fn lenient_id<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(match raw {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

/// Nested enrichment block that is dropped, not fatal, when malformed.
fn lenient_block<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw
        .filter(Value::is_object)
        .and_then(|v| serde_json::from_value(v).ok()))
}

/// Keeps the string-valued entries of a map; anything else is skipped.
fn lenient_strings<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(match raw {
        Some(Value::Object(map)) => map
            .into_iter()
            .filter_map(|(k, v)| match v {
                Value::String(s) if !s.trim().is_empty() => Some((k, s)),
                _ => None,
            })
            .collect(),
        _ => BTreeMap::new(),
    })
}

fn is_false(flag: &bool) -> bool {
    !*flag
}

/// Player on/off summary: who carries the team and how much.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OnOffSummary {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub star_player: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub star_player_ppg: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub star_dependency_pct: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depth_label: Option<String>,
    /// bpm, usage and the other on/off columns, carried as exported.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl OnOffSummary {
    pub fn star(&self) -> Option<&str> {
        self.star_player
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// Injury status for one team, on a profile or on one side of a prediction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InjuryReport {
    #[serde(default, skip_serializing_if = "is_false")]
    pub has_injuries: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub star_is_injured: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub star_player: Option<String>,
    #[serde(default)]
    pub n_injured: u32,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl InjuryReport {
    /// Short status text; `None` when the team is healthy.
    pub fn summary(&self) -> Option<String> {
        let star = self
            .star_player
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());
        if self.star_is_injured {
            return Some(match star {
                Some(name) => format!("star {} injured", name),
                None => "star injured".to_string(),
            });
        }
        if self.has_injuries || self.n_injured > 0 {
            return Some(format!("{} injured", self.n_injured.max(1)));
        }
        None
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamProfile {
    #[serde(alias = "team", alias = "team_name")]
    pub name: String,
    #[serde(default, alias = "team_id", deserialize_with = "lenient_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archetype: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archetype_description: Option<String>,
    /// Player names, or player objects carrying a `name`/`player` field.
    #[serde(default, alias = "players", skip_serializing_if = "Vec::is_empty")]
    pub key_players: Vec<Value>,
    /// Season-form metrics (win_pct, pyth, net_eff, ...).
    #[serde(default, alias = "season_stats", skip_serializing_if = "BTreeMap::is_empty")]
    pub stats: BTreeMap<String, Value>,
    /// Adjusted efficiency columns (AdjO, AdjD, AdjEM, ...).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub kenpom: BTreeMap<String, Value>,
    #[serde(default, alias = "on_off", deserialize_with = "lenient_block", skip_serializing_if = "Option::is_none")]
    pub onoff: Option<OnOffSummary>,
    #[serde(default, alias = "injury", deserialize_with = "lenient_block", skip_serializing_if = "Option::is_none")]
    pub injuries: Option<InjuryReport>,
}

impl TeamProfile {
    /// Listed key players, followed by the on/off star when not already listed.
    pub fn key_player_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .key_players
            .iter()
            .filter_map(|p| match p {
                Value::String(s) => Some(s.clone()),
                Value::Object(map) => map
                    .get("name")
                    .or_else(|| map.get("player"))
                    .and_then(Value::as_str)
                    .map(str::to_string),
                _ => None,
            })
            .collect();
        if let Some(star) = self.onoff.as_ref().and_then(OnOffSummary::star) {
            if !names.iter().any(|n| n.trim().eq_ignore_ascii_case(star)) {
                names.push(star.to_string());
            }
        }
        names
    }
}

/// Upset marker as exported by the prediction pipeline: either a plain flag
/// or a label where `"chalk"` means no upset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UpsetFlag {
    Flag(bool),
    Label(String),
}

impl UpsetFlag {
    pub fn is_upset(&self) -> bool {
        match self {
            UpsetFlag::Flag(flag) => *flag,
            UpsetFlag::Label(label) => {
                let label = label.trim().to_lowercase();
                !matches!(label.as_str(), "" | "chalk" | "false" | "no" | "none")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    #[serde(alias = "t1_name", alias = "team_1")]
    pub team1: String,
    #[serde(alias = "t2_name", alias = "team_2")]
    pub team2: String,
    #[serde(default, alias = "t1_seed", deserialize_with = "lenient_seed", skip_serializing_if = "Option::is_none")]
    pub seed1: Option<u8>,
    #[serde(default, alias = "t2_seed", deserialize_with = "lenient_seed", skip_serializing_if = "Option::is_none")]
    pub seed2: Option<u8>,
    #[serde(default, alias = "predicted_winner_name", alias = "predicted_winner", skip_serializing_if = "Option::is_none")]
    pub winner: Option<String>,
    /// Team 1 win probability, as a fraction or a percentage.
    #[serde(default, alias = "model_win_prob", alias = "win_probability", alias = "probability", skip_serializing_if = "Option::is_none")]
    pub win_prob: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<String>,
    #[serde(default, alias = "upset", skip_serializing_if = "Option::is_none")]
    pub upset_flag: Option<UpsetFlag>,
    /// `"t1"` / `"t2"` once the game has been played.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_winner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub momentum: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volatility: Option<f64>,
    #[serde(default, alias = "injury_adjusted", skip_serializing_if = "Option::is_none")]
    pub injury_flag: Option<bool>,
    #[serde(default, alias = "conference_tournament", skip_serializing_if = "Option::is_none")]
    pub conf_tourney: Option<String>,
    #[serde(default, alias = "risk", skip_serializing_if = "Option::is_none")]
    pub risk_note: Option<String>,
    /// Model probability minus the seed-implied probability.
    #[serde(default, alias = "value_edge", skip_serializing_if = "Option::is_none")]
    pub value_score: Option<f64>,
    #[serde(default, deserialize_with = "lenient_block", skip_serializing_if = "Option::is_none")]
    pub t1_injury: Option<InjuryReport>,
    #[serde(default, deserialize_with = "lenient_block", skip_serializing_if = "Option::is_none")]
    pub t2_injury: Option<InjuryReport>,
    /// Precomputed one-line answers keyed by intent (quick, value, upset, ...).
    #[serde(default, deserialize_with = "lenient_strings", skip_serializing_if = "BTreeMap::is_empty")]
    pub responses: BTreeMap<String, String>,
}

impl Prediction {
    /// Team 1 win probability in [0,1]; 0.5 when the source omitted it.
    pub fn probability(&self) -> f64 {
        self.win_prob.map(normalize_probability).unwrap_or(0.5)
    }

    pub fn is_upset(&self) -> bool {
        self.upset_flag.as_ref().is_some_and(UpsetFlag::is_upset)
    }

    pub fn predicted_winner(&self) -> &str {
        match &self.winner {
            Some(name) if !name.trim().is_empty() => name,
            _ if self.probability() >= 0.5 => &self.team1,
            _ => &self.team2,
        }
    }

    /// Precomputed answer for `intent`, falling back to the quick take.
    pub fn response_for(&self, intent: IntentTag) -> Option<&str> {
        self.responses
            .get(intent.as_str())
            .or_else(|| self.responses.get(IntentTag::Quick.as_str()))
            .map(String::as_str)
    }

    /// Whether team 1 won, preferring the recorded result over the model pick.
    pub fn team1_won(&self) -> bool {
        match self.actual_winner.as_deref().map(str::trim) {
            Some("t1") => true,
            Some("t2") => false,
            _ => self.predicted_winner() == self.team1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictionSet {
    Base,
    Upset,
    Floor,
}

impl PredictionSet {
    pub const ALL: [PredictionSet; 3] = [PredictionSet::Base, PredictionSet::Upset, PredictionSet::Floor];

    pub fn as_str(&self) -> &'static str {
        match self {
            PredictionSet::Base => "base",
            PredictionSet::Upset => "upset",
            PredictionSet::Floor => "floor",
        }
    }
}

impl fmt::Display for PredictionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Expected-value row: a team's summed EV across rounds plus whatever
/// per-round columns the optimizer exported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvRow {
    #[serde(alias = "name", alias = "team_name")]
    pub team: String,
    #[serde(default, deserialize_with = "lenient_seed", skip_serializing_if = "Option::is_none")]
    pub seed: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, alias = "ev", alias = "expected_value", alias = "total_expected_value")]
    pub total_ev: f64,
    #[serde(flatten)]
    pub rounds: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BracketEntry {
    pub team: String,
    pub seed: u8,
    pub region: String,
}

/// Entrants grouped by seed line. Always holds all sixteen buckets.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SeedBuckets {
    buckets: [Vec<BracketEntry>; SEED_COUNT as usize],
}

impl SeedBuckets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key(seed: u8) -> String {
        format!("seed_{}", seed)
    }

    /// Entries for `seed`; empty for seeds outside 1..=16.
    pub fn get(&self, seed: u8) -> &[BracketEntry] {
        match Self::index(seed) {
            Some(i) => &self.buckets[i],
            None => &[],
        }
    }

    /// Returns false (and drops the entry) when its seed is outside 1..=16.
    pub fn push(&mut self, entry: BracketEntry) -> bool {
        match Self::index(entry.seed) {
            Some(i) => {
                self.buckets[i].push(entry);
                true
            }
            None => false,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (u8, &[BracketEntry])> {
        self.buckets
            .iter()
            .enumerate()
            .map(|(i, entries)| (i as u8 + 1, entries.as_slice()))
    }

    pub fn entries(&self) -> impl Iterator<Item = &BracketEntry> {
        self.buckets.iter().flatten()
    }

    pub fn total(&self) -> usize {
        self.buckets.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    pub(crate) fn sort_with<F>(&mut self, mut compare: F)
    where
        F: FnMut(&BracketEntry, &BracketEntry) -> std::cmp::Ordering,
    {
        for bucket in &mut self.buckets {
            bucket.sort_by(&mut compare);
        }
    }

    fn index(seed: u8) -> Option<usize> {
        (1..=SEED_COUNT).contains(&seed).then(|| seed as usize - 1)
    }
}

impl Serialize for SeedBuckets {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(SEED_COUNT as usize))?;
        for (seed, entries) in self.iter() {
            map.serialize_entry(&Self::key(seed), entries)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntentTag {
    Value,
    Compare,
    Region,
    Champion,
    Upset,
    Stats,
    Bracket,
    Quick,
}

impl IntentTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntentTag::Value => "value",
            IntentTag::Compare => "compare",
            IntentTag::Region => "region",
            IntentTag::Champion => "champion",
            IntentTag::Upset => "upset",
            IntentTag::Stats => "stats",
            IntentTag::Bracket => "bracket",
            IntentTag::Quick => "quick",
        }
    }
}

impl fmt::Display for IntentTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One retrieved fact handed to the generative backend as grounding.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContextItem {
    Team {
        profile: TeamProfile,
    },
    Prediction {
        source: PredictionSet,
        #[serde(skip_serializing_if = "Option::is_none")]
        hypothetical: Option<bool>,
        prediction: Prediction,
    },
    Optimizer {
        result: Value,
    },
    Bracket {
        entry: BracketEntry,
    },
    Note {
        text: String,
    },
    Value {
        row: EvRow,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub ok: bool,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnswerResult {
    pub reply: String,
    pub intent: IntentTag,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContextPreview {
    pub intent: IntentTag,
    pub items: Vec<ContextItem>,
    pub formatted_text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SeedBucketAnalysis {
    pub buckets: SeedBuckets,
    pub narrative: String,
    pub validation: ValidationReport,
    pub attempts: u32,
}

// API Response types
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: Utc::now(),
        }
    }
}
