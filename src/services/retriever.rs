use std::collections::{BTreeSet, HashSet};
use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use crate::config::RetrievalConfig;
use crate::models::{ContextItem, IntentTag, Prediction, PredictionSet};
use crate::services::buckets::{build_buckets, teams_paired};
use crate::services::intent::classify;
use crate::services::normalizer::{mentions, normalize};
use crate::store::FactStore;
use crate::utils::tokens;

struct Patterns {
    who_would_win: Regex,
    versus: Regex,
    seed_mention: Regex,
    upset: Regex,
    strategy: Regex,
    round: Regex,
    championship: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        who_would_win: Regex::new(r"(?i)who\s+(?:would|will)\s+win\s+if\s+(.+?)\s+(?:played|plays|faced|faces|met)\s+(.+)").unwrap(),
        versus: Regex::new(r"(?i)(.+?)\s+(?:vs\.?|versus)\s+(.+)").unwrap(),
        seed_mention: Regex::new(r"(?i)\b(\d{1,2})\s*-?\s*(?:seeds?|vs\.?|versus)\b").unwrap(),
        upset: Regex::new(r"(?i)\b(upsets?|cinderellas?|underdogs?|dark ?horses?|sleepers?)\b").unwrap(),
        strategy: Regex::new(r"(?i)\b(brackets?|optimi[sz]e[rd]?|optimi[sz]ation|pools?|strateg(y|ies))\b").unwrap(),
        round: Regex::new(r"(?i)\b(brackets?|rounds?|round of \d+|sweet (16|sixteen)|elite (8|eight)|first four|path|draw)\b").unwrap(),
        championship: Regex::new(r"(?i)\b(final four|champions?|championship|win it all|natty)\b").unwrap(),
    })
}

/// Ordered, deduplicating accumulator. Identity is the item's serialized
/// form; the first occurrence wins.
#[derive(Default)]
struct ContextList {
    items: Vec<ContextItem>,
    seen: HashSet<String>,
}

impl ContextList {
    fn push(&mut self, item: ContextItem) {
        let key = serde_json::to_string(&item).unwrap_or_else(|_| format!("{:?}", item));
        if self.seen.insert(key) {
            self.items.push(item);
        }
    }

    fn finish(mut self, max_items: usize) -> Vec<ContextItem> {
        self.items.truncate(max_items);
        self.items
    }
}

/// Select the facts relevant to `query`, in retrieval-priority order,
/// deduplicated and capped at `config.max_items`.
///
/// Missing datasets simply contribute nothing; this never fails.
pub fn retrieve(query: &str, store: &FactStore, config: &RetrievalConfig) -> Vec<ContextItem> {
    let p = patterns();
    let normalized = normalize(query);
    let intent = classify(query);
    let mut ctx = ContextList::default();

    // 1. direct matchup
    let direct = matchup_sides(query)
        .and_then(|(left, right)| direct_matchup(&left, &right, store, intent, &mut ctx));
    // later steps must not repeat it without its hypothetical flag
    let is_direct = |pred: &Prediction| direct.is_some_and(|d| std::ptr::eq(d, pred));

    // 2. team profiles named in the question
    if config.include_team_profiles {
        for profile in &store.profiles {
            if mentions(&normalized, &profile.name) {
                ctx.push(ContextItem::Team {
                    profile: profile.clone(),
                });
            }
        }
    }

    // 3. predictions naming a team or a mentioned seed line
    let seeds = mentioned_seeds(query);
    for set in PredictionSet::ALL {
        for pred in store.predictions.get(set) {
            let named = mentions(&normalized, &pred.team1) || mentions(&normalized, &pred.team2);
            let seeded = [pred.seed1, pred.seed2]
                .iter()
                .flatten()
                .any(|s| seeds.contains(s));
            if (named || seeded) && !(set == PredictionSet::Base && is_direct(pred)) {
                ctx.push(prediction_item(set, pred, None));
            }
        }
    }

    // 4. upset-flagged base predictions
    if p.upset.is_match(query) {
        store
            .predictions
            .base
            .iter()
            .filter(|pred| pred.is_upset() && !is_direct(pred))
            .take(config.upset_items)
            .for_each(|pred| ctx.push(prediction_item(PredictionSet::Base, pred, None)));
    }

    // 5. EV leaders, capped on their own
    if intent == IntentTag::Value {
        let mut rows: Vec<_> = store.ev_table.iter().collect();
        rows.sort_by(|a, b| b.total_ev.total_cmp(&a.total_ev));
        for row in rows.into_iter().take(config.value_items) {
            ctx.push(ContextItem::Value { row: row.clone() });
        }
    }

    // 6. optimizer recommendations
    if config.include_optimizer && p.strategy.is_match(query) {
        for result in store.optimizer.iter().take(config.optimizer_items) {
            ctx.push(ContextItem::Optimizer {
                result: result.clone(),
            });
        }
    }

    // 7. bracket structure
    if p.round.is_match(query) {
        if let Some(bracket) = &store.bracket {
            let buckets = build_buckets(bracket);
            for entry in buckets.entries().take(config.max_items) {
                ctx.push(ContextItem::Bracket {
                    entry: entry.clone(),
                });
            }
        }
    }

    // 8. supplementary context rows sharing a word with the question
    let query_tokens: HashSet<String> = tokens(query, 3).into_iter().collect();
    for row in &store.context_rows {
        if query.trim().is_empty() || shares_token(row, &query_tokens) {
            let text = note_text(row);
            if !text.trim().is_empty() {
                ctx.push(ContextItem::Note { text });
            }
        }
    }

    // 9. title-contender matchups
    if config.include_title_angles && p.championship.is_match(query) {
        let cutoff = config.title_seed_cutoff;
        for pred in &store.predictions.base {
            if let (Some(s1), Some(s2)) = (pred.seed1, pred.seed2) {
                if s1 <= cutoff && s2 <= cutoff && !is_direct(pred) {
                    ctx.push(prediction_item(PredictionSet::Base, pred, None));
                }
            }
        }
    }

    let collected = ctx.items.len();
    let items = ctx.finish(config.max_items);
    tracing::debug!(
        %intent,
        collected,
        returned = items.len(),
        "Retrieved grounding context"
    );
    items
}

fn prediction_item(source: PredictionSet, pred: &Prediction, hypothetical: Option<bool>) -> ContextItem {
    ContextItem::Prediction {
        source,
        hypothetical,
        prediction: pred.clone(),
    }
}

/// Raw text on each side of a two-team question, if it has that shape.
fn matchup_sides(query: &str) -> Option<(String, String)> {
    let p = patterns();
    let caps = p
        .who_would_win
        .captures(query)
        .or_else(|| p.versus.captures(query))?;
    Some((caps[1].to_string(), caps[2].to_string()))
}

/// The known team whose normalized name is the longest one contained in
/// `side`; longest wins so "iowa st" beats "iowa".
fn resolve_team<'a>(side: &str, candidates: &[&'a str]) -> Option<&'a str> {
    let side = normalize(side);
    candidates
        .iter()
        .map(|name| (*name, normalize(name)))
        .filter(|(_, norm)| !norm.is_empty() && side.contains(norm.as_str()))
        .max_by_key(|(_, norm)| norm.len())
        .map(|(name, _)| name)
}

/// Resolve "A vs B", push the base prediction with its hypothetical flag and
/// return it.
fn direct_matchup<'s>(
    left: &str,
    right: &str,
    store: &'s FactStore,
    intent: IntentTag,
    ctx: &mut ContextList,
) -> Option<&'s Prediction> {
    let bracket_names: Vec<String> = store
        .bracket
        .as_ref()
        .map(|b| build_buckets(b).entries().map(|e| e.team.clone()).collect())
        .unwrap_or_default();
    let mut candidates = store.known_team_names();
    candidates.extend(bracket_names.iter().map(String::as_str));

    let (Some(team_a), Some(team_b)) = (resolve_team(left, &candidates), resolve_team(right, &candidates)) else {
        return None;
    };
    let (a, b) = (normalize(team_a), normalize(team_b));
    if a == b {
        return None;
    }

    let found = store.predictions.base.iter().find(|pred| {
        let (t1, t2) = (normalize(&pred.team1), normalize(&pred.team2));
        (t1 == a && t2 == b) || (t1 == b && t2 == a)
    });

    match found {
        Some(pred) => {
            let paired = store
                .bracket
                .as_ref()
                .is_some_and(|bracket| teams_paired(bracket, team_a, team_b));
            ctx.push(prediction_item(PredictionSet::Base, pred, Some(!paired)));
            let text = if paired {
                format!("{} vs {} is a real matchup in the current bracket.", pred.team1, pred.team2)
            } else {
                format!(
                    "HYPOTHETICAL: {} and {} are not scheduled to meet in the current bracket; treat this as a what-if projection.",
                    pred.team1, pred.team2
                )
            };
            ctx.push(ContextItem::Note { text });
            if let Some(take) = pred.response_for(intent) {
                ctx.push(ContextItem::Note {
                    text: format!("Model take: {}", take),
                });
            }
        }
        None => ctx.push(ContextItem::Note {
            text: format!("No model matchup is available for {} vs {}.", team_a, team_b),
        }),
    }

    for team in [team_a, team_b] {
        if let Some(row) = store.ev_row(team) {
            ctx.push(ContextItem::Value { row: row.clone() });
        }
    }
    found
}

fn mentioned_seeds(query: &str) -> BTreeSet<u8> {
    patterns()
        .seed_mention
        .captures_iter(query)
        .filter_map(|caps| caps[1].parse::<u8>().ok())
        .filter(|s| (1..=16).contains(s))
        .collect()
}

fn shares_token(row: &Value, query_tokens: &HashSet<String>) -> bool {
    if query_tokens.is_empty() {
        return false;
    }
    let serialized = row.to_string();
    tokens(&serialized, 3)
        .iter()
        .any(|t| query_tokens.contains(t))
}

/// Free text carried by a supplementary row.
fn note_text(row: &Value) -> String {
    match row {
        Value::String(s) => s.clone(),
        Value::Object(map) => ["text", "note", "content", "summary"]
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_str))
            .map(str::to_string)
            .unwrap_or_else(|| row.to_string()),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EvRow, TeamProfile};
    use crate::store::PredictionSets;
    use serde_json::json;

    fn pred(t1: &str, s1: u8, t2: &str, s2: u8, prob: f64, upset: bool) -> Prediction {
        serde_json::from_value(json!({
            "t1_name": t1, "t1_seed": s1, "t2_name": t2, "t2_seed": s2,
            "model_win_prob": prob, "upset_flag": upset
        }))
        .unwrap()
    }

    fn profile(name: &str) -> TeamProfile {
        serde_json::from_value(json!({"name": name, "archetype": "Two-Way Juggernaut"})).unwrap()
    }

    fn ev(team: &str, total: f64) -> EvRow {
        serde_json::from_value(json!({"team": team, "total_ev": total})).unwrap()
    }

    fn sample_store() -> FactStore {
        let base = vec![
            pred("Duke", 1, "Mount St. Mary's", 16, 0.97, false),
            pred("Houston", 1, "SIU Edwardsville", 16, 0.95, false),
            pred("Duke", 1, "Houston", 1, 0.55, false),
            pred("Memphis", 5, "Colorado St", 12, 0.42, true),
            pred("Clemson", 5, "McNeese", 12, 0.61, true),
            pred("Florida", 1, "Alabama", 2, 0.58, false),
        ];
        let upset = vec![pred("Duke", 1, "Mount St. Mary's", 16, 0.91, false)];
        FactStore::new(
            vec![profile("Duke"), profile("Houston"), profile("Florida")],
            PredictionSets {
                base,
                upset,
                floor: vec![],
            },
            vec![json!({"strategy": "contrarian", "champion": "Florida"}), json!({"strategy": "chalk"})],
            Some(json!({"games": [
                {"region": "East", "home_team": {"name": "Duke", "seed": 1}, "away_team": {"name": "Mount St. Mary's", "seed": 16}},
                {"region": "Midwest", "home_team": {"name": "Houston", "seed": 1}, "away_team": {"name": "SIU Edwardsville", "seed": 16}}
            ]})),
            vec![json!({"text": "Duke freshman Cooper Flagg is healthy"}), json!("Houston guards defend the arc")],
            vec![ev("Duke", 40.0), ev("Houston", 35.0), ev("Florida", 38.5)],
        )
    }

    fn assert_invariants(items: &[ContextItem], max: usize) {
        assert!(items.len() <= max);
        let keys: HashSet<String> = items.iter().map(|i| serde_json::to_string(i).unwrap()).collect();
        assert_eq!(keys.len(), items.len(), "duplicate context items");
    }

    #[test]
    fn test_direct_matchup_comes_first() {
        let store = sample_store();
        let items = retrieve("Duke vs Houston", &store, &RetrievalConfig::default());
        match &items[0] {
            ContextItem::Prediction { source, hypothetical, prediction } => {
                assert_eq!(*source, PredictionSet::Base);
                assert_eq!(*hypothetical, Some(true));
                assert_eq!(prediction.team1, "Duke");
                assert_eq!(prediction.team2, "Houston");
            }
            other => panic!("expected direct matchup first, got {:?}", other),
        }
        assert!(matches!(&items[1], ContextItem::Note { text } if text.starts_with("HYPOTHETICAL")));
        assert!(items.iter().any(|i| matches!(i, ContextItem::Value { row } if row.team == "Houston")));
        assert_invariants(&items, 24);
    }

    #[test]
    fn test_direct_matchup_is_not_repeated_by_later_steps() {
        let store = sample_store();
        for query in ["Duke vs Houston", "Duke vs Houston for the championship"] {
            let items = retrieve(query, &store, &RetrievalConfig::default());
            let copies: Vec<Option<bool>> = items
                .iter()
                .filter_map(|i| match i {
                    ContextItem::Prediction { source: PredictionSet::Base, hypothetical, prediction }
                        if prediction.team1 == "Duke" && prediction.team2 == "Houston" =>
                    {
                        Some(*hypothetical)
                    }
                    _ => None,
                })
                .collect();
            assert_eq!(copies, vec![Some(true)], "{}", query);
        }
    }

    #[test]
    fn test_direct_matchup_adds_intent_response() {
        let mut store = sample_store();
        let with_responses: Prediction = serde_json::from_value(json!({
            "t1_name": "Florida", "t1_seed": 1, "t2_name": "Alabama", "t2_seed": 2,
            "model_win_prob": 0.58,
            "responses": {"quick": "Lean Florida (1-seed) at 58%. Competitive.", "value": "Consensus pick, model agrees with seed."}
        }))
        .unwrap();
        store.predictions.base = vec![with_responses];

        let items = retrieve("Florida vs Alabama, where is the value?", &store, &RetrievalConfig::default());
        assert!(items.iter().any(
            |i| matches!(i, ContextItem::Note { text } if text == "Model take: Consensus pick, model agrees with seed.")
        ));

        let items = retrieve("Florida vs Alabama", &store, &RetrievalConfig::default());
        assert!(items.iter().any(
            |i| matches!(i, ContextItem::Note { text } if text == "Model take: Lean Florida (1-seed) at 58%. Competitive.")
        ));
    }

    #[test]
    fn test_real_bracket_matchup_is_not_hypothetical() {
        let store = sample_store();
        let items = retrieve("who would win if Mount St Mary's played Duke", &store, &RetrievalConfig::default());
        assert!(matches!(
            &items[0],
            ContextItem::Prediction { hypothetical: Some(false), prediction, .. } if prediction.team2 == "Mount St. Mary's"
        ));
    }

    #[test]
    fn test_profiles_and_all_prediction_sets_match_by_name() {
        let store = sample_store();
        let items = retrieve("Tell me about Florida", &store, &RetrievalConfig::default());
        assert!(items.iter().any(|i| matches!(i, ContextItem::Team { profile } if profile.name == "Florida")));
        assert!(items.iter().any(|i| matches!(i, ContextItem::Prediction { prediction, .. } if prediction.team2 == "Alabama")));

        let items = retrieve("duke", &store, &RetrievalConfig::default());
        let sources: HashSet<PredictionSet> = items
            .iter()
            .filter_map(|i| match i {
                ContextItem::Prediction { source, .. } => Some(*source),
                _ => None,
            })
            .collect();
        assert!(sources.contains(&PredictionSet::Upset));
    }

    #[test]
    fn test_profiles_can_be_disabled() {
        let store = sample_store();
        let config = RetrievalConfig {
            include_team_profiles: false,
            ..RetrievalConfig::default()
        };
        let items = retrieve("Tell me about Florida", &store, &config);
        assert!(!items.iter().any(|i| matches!(i, ContextItem::Team { .. })));
    }

    #[test]
    fn test_seed_pattern_matches_predictions() {
        let store = sample_store();
        let items = retrieve("how often does a 12 seed win?", &store, &RetrievalConfig::default());
        let teams: Vec<&str> = items
            .iter()
            .filter_map(|i| match i {
                ContextItem::Prediction { prediction, .. } => Some(prediction.team2.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(teams, vec!["Colorado St", "McNeese"]);
    }

    #[test]
    fn test_upset_items_capped() {
        let store = sample_store();
        let config = RetrievalConfig {
            upset_items: 1,
            ..RetrievalConfig::default()
        };
        let items = retrieve("any cinderella candidates", &store, &config);
        let upsets: Vec<_> = items
            .iter()
            .filter(|i| matches!(i, ContextItem::Prediction { prediction, .. } if prediction.is_upset()))
            .collect();
        assert_eq!(upsets.len(), 1);
    }

    #[test]
    fn test_value_intent_sorts_ev_descending() {
        let store = sample_store();
        let config = RetrievalConfig {
            value_items: 2,
            ..RetrievalConfig::default()
        };
        let items = retrieve("best expected value plays", &store, &config);
        let teams: Vec<&str> = items
            .iter()
            .filter_map(|i| match i {
                ContextItem::Value { row } => Some(row.team.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(teams, vec!["Duke", "Florida"]);
    }

    #[test]
    fn test_optimizer_needs_strategy_words_and_toggle() {
        let store = sample_store();
        let items = retrieve("what pool strategy should I use", &store, &RetrievalConfig::default());
        assert_eq!(items.iter().filter(|i| matches!(i, ContextItem::Optimizer { .. })).count(), 2);

        let off = RetrievalConfig {
            include_optimizer: false,
            ..RetrievalConfig::default()
        };
        let items = retrieve("what pool strategy should I use", &store, &off);
        assert!(!items.iter().any(|i| matches!(i, ContextItem::Optimizer { .. })));
    }

    #[test]
    fn test_bracket_rows_for_round_questions() {
        let store = sample_store();
        let items = retrieve("who advances in round one", &store, &RetrievalConfig::default());
        assert_eq!(items.iter().filter(|i| matches!(i, ContextItem::Bracket { .. })).count(), 4);
    }

    #[test]
    fn test_context_rows_share_a_long_token() {
        let store = sample_store();
        let items = retrieve("is flagg healthy", &store, &RetrievalConfig::default());
        assert!(items.iter().any(|i| matches!(i, ContextItem::Note { text } if text.contains("Flagg"))));
        assert!(!items.iter().any(|i| matches!(i, ContextItem::Note { text } if text.contains("arc"))));

        let items = retrieve("", &store, &RetrievalConfig::default());
        assert_eq!(items.iter().filter(|i| matches!(i, ContextItem::Note { .. })).count(), 2);
    }

    #[test]
    fn test_title_angles_use_seed_cutoff() {
        let store = sample_store();
        let config = RetrievalConfig {
            title_seed_cutoff: 2,
            ..RetrievalConfig::default()
        };
        let items = retrieve("who can win it all", &store, &config);
        let pairs: Vec<(&str, &str)> = items
            .iter()
            .filter_map(|i| match i {
                ContextItem::Prediction { prediction, .. } => {
                    Some((prediction.team1.as_str(), prediction.team2.as_str()))
                }
                _ => None,
            })
            .collect();
        assert_eq!(pairs, vec![("Duke", "Houston"), ("Florida", "Alabama")]);
    }

    #[test]
    fn test_cap_and_dedup_hold_for_any_query() {
        let store = sample_store();
        let queries = [
            "",
            "Duke vs Houston",
            "Duke Duke Duke bracket strategy cinderella champion 1 seed 16 seed",
            "best value upset in my pool for the final four round",
            "who would win if Florida played Alabama",
        ];
        for max in [1, 3, 7, 50] {
            let config = RetrievalConfig {
                max_items: max,
                upset_items: 10,
                ..RetrievalConfig::default()
            };
            for q in queries {
                assert_invariants(&retrieve(q, &store, &config), max);
            }
        }
    }

    #[test]
    fn test_empty_store_returns_nothing() {
        let items = retrieve("who wins Duke vs Houston", &FactStore::empty(), &RetrievalConfig::default());
        assert!(items.is_empty());
    }
}
