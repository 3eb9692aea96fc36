use std::collections::HashSet;

use serde_json::{Map, Value};

use crate::models::{BracketEntry, SeedBuckets};
use crate::services::normalizer::normalize;
use crate::utils::parse_seed;

const UNKNOWN_REGION: &str = "Unknown";

/// Keys naming a single team directly on a node.
const TEAM_KEYS: &[&str] = &["team", "team_name", "name", "school"];
/// Keys holding the two (or more) sides of a game.
const SIDE_KEYS: &[&str] = &["home_team", "away_team", "teams", "team1", "team2", "t1_name", "t2_name"];
const PLACEMENT_KEYS: &[&str] = &["seed", "region", "conference"];

/// A game-like object found somewhere in raw bracket data, with the region it
/// inherits from its enclosing objects.
#[derive(Debug, Clone)]
pub struct GameNode<'a> {
    pub fields: &'a Map<String, Value>,
    pub region: Option<String>,
}

/// A team row pulled out of a node before validation.
#[derive(Debug, Clone, PartialEq)]
struct RawRow {
    name: Option<String>,
    seed: Option<u8>,
    region: Option<String>,
}

type ShapeMatcher = fn(&GameNode<'_>) -> Vec<RawRow>;

/// Extraction rules, tried in order on every node. New bracket shapes get a
/// new entry here; the traversal stays untouched.
const SHAPE_MATCHERS: &[(&str, ShapeMatcher)] = &[
    ("direct_team", direct_team),
    ("home_away", home_away),
    ("teams_array", teams_array),
    ("numbered_pair", numbered_pair),
];

/// Flatten arbitrarily nested bracket JSON into the game-like nodes it holds.
///
/// Every object carrying a team-identifying field or a seed/region field is
/// captured, and traversal continues into its children either way. Object
/// keys are visited in map order, so the result is deterministic.
pub fn flatten(raw: &Value) -> Vec<GameNode<'_>> {
    let mut nodes = Vec::new();
    walk(raw, None, &mut nodes);
    nodes
}

fn walk<'a>(value: &'a Value, inherited: Option<&str>, out: &mut Vec<GameNode<'a>>) {
    match value {
        Value::Array(items) => {
            for item in items {
                walk(item, inherited, out);
            }
        }
        Value::Object(map) => {
            let region = own_region(map).or_else(|| inherited.map(str::to_string));
            if is_game_like(map) {
                out.push(GameNode {
                    fields: map,
                    region: region.clone(),
                });
            }
            for child in map.values() {
                walk(child, region.as_deref(), out);
            }
        }
        _ => {}
    }
}

fn is_game_like(map: &Map<String, Value>) -> bool {
    TEAM_KEYS
        .iter()
        .chain(SIDE_KEYS)
        .chain(PLACEMENT_KEYS)
        .any(|key| map.contains_key(*key))
}

/// Region declared on the object itself. An object naming a team directly
/// carries its athletic conference, so only game-level objects fall back to
/// `conference`.
fn own_region(map: &Map<String, Value>) -> Option<String> {
    let region = string_field(map, "region");
    if team_name(map).is_some() {
        return region;
    }
    region.or_else(|| string_field(map, "conference"))
}

fn string_field(map: &Map<String, Value>, key: &str) -> Option<String> {
    map.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn team_name(map: &Map<String, Value>) -> Option<String> {
    TEAM_KEYS
        .iter()
        .filter_map(|key| map.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

/// A side given either as a bare name (seed looked up on the game under
/// `seed_key`) or as an object with its own name/seed/region.
fn side_row(side: &Value, node: &GameNode<'_>, seed_keys: &[&str]) -> Option<RawRow> {
    match side {
        Value::String(name) => Some(RawRow {
            name: Some(name.trim().to_string()),
            seed: seed_keys
                .iter()
                .find_map(|key| node.fields.get(*key).and_then(parse_seed)),
            region: node.region.clone(),
        }),
        Value::Object(obj) => Some(RawRow {
            name: team_name(obj),
            seed: obj.get("seed").and_then(parse_seed).or_else(|| {
                seed_keys
                    .iter()
                    .find_map(|key| node.fields.get(*key).and_then(parse_seed))
            }),
            region: string_field(obj, "region").or_else(|| node.region.clone()),
        }),
        _ => None,
    }
}

fn direct_team(node: &GameNode<'_>) -> Vec<RawRow> {
    if let Some(team) = node.fields.get("team").filter(|v| v.is_object()) {
        return side_row(team, node, &["seed"]).into_iter().collect();
    }
    match team_name(node.fields) {
        Some(name) => vec![RawRow {
            name: Some(name),
            seed: node.fields.get("seed").and_then(parse_seed),
            region: node.region.clone(),
        }],
        None => Vec::new(),
    }
}

fn home_away(node: &GameNode<'_>) -> Vec<RawRow> {
    [("home_team", "home_seed"), ("away_team", "away_seed")]
        .iter()
        .filter_map(|(team_key, seed_key)| {
            node.fields
                .get(*team_key)
                .and_then(|side| side_row(side, node, &[*seed_key]))
        })
        .collect()
}

fn teams_array(node: &GameNode<'_>) -> Vec<RawRow> {
    match node.fields.get("teams") {
        Some(Value::Array(sides)) => sides
            .iter()
            .filter_map(|side| side_row(side, node, &[]))
            .collect(),
        _ => Vec::new(),
    }
}

fn numbered_pair(node: &GameNode<'_>) -> Vec<RawRow> {
    [
        (["team1", "t1_name"], ["seed1", "t1_seed"]),
        (["team2", "t2_name"], ["seed2", "t2_seed"]),
    ]
    .iter()
    .filter_map(|(team_keys, seed_keys)| {
        team_keys
            .iter()
            .find_map(|key| node.fields.get(*key))
            .and_then(|side| side_row(side, node, seed_keys))
    })
    .collect()
}

fn rows_for(node: &GameNode<'_>) -> Vec<RawRow> {
    SHAPE_MATCHERS
        .iter()
        .flat_map(|(_, matcher)| matcher(node))
        .collect()
}

/// Every valid (team, seed, region) row in the raw bracket, deduplicated by
/// normalized team, seed and normalized region. First occurrence wins.
/// Rows without a name or a numeric seed are dropped silently.
pub fn extract_entries(raw: &Value) -> Vec<BracketEntry> {
    let mut seen = HashSet::new();
    let mut entries = Vec::new();

    for node in flatten(raw) {
        for row in rows_for(&node) {
            let (Some(name), Some(seed)) = (row.name, row.seed) else {
                continue;
            };
            if name.is_empty() {
                continue;
            }
            let region = row
                .region
                .filter(|r| !r.trim().is_empty())
                .unwrap_or_else(|| UNKNOWN_REGION.to_string());

            if seen.insert((normalize(&name), seed, normalize(&region))) {
                entries.push(BracketEntry {
                    team: name,
                    seed,
                    region,
                });
            }
        }
    }
    entries
}

/// Partition the bracket into the sixteen canonical seed buckets.
///
/// Deterministic: identical input always yields identical buckets, entry
/// order included. Each bucket is sorted by (region, team).
pub fn build_buckets(raw: &Value) -> SeedBuckets {
    let mut buckets = SeedBuckets::new();
    let mut ignored = 0usize;
    for entry in extract_entries(raw) {
        if !buckets.push(entry) {
            ignored += 1;
        }
    }
    buckets.sort_with(|a, b| {
        (a.region.as_str(), a.team.as_str()).cmp(&(b.region.as_str(), b.team.as_str()))
    });

    tracing::debug!(
        entries = buckets.total(),
        out_of_range = ignored,
        "Built canonical seed buckets"
    );
    buckets
}

/// Whether two teams appear on the same game node, i.e. actually meet in the
/// loaded bracket.
pub fn teams_paired(raw: &Value, team_a: &str, team_b: &str) -> bool {
    let a = normalize(team_a);
    let b = normalize(team_b);
    if a.is_empty() || b.is_empty() || a == b {
        return false;
    }
    flatten(raw).iter().any(|node| {
        let names: HashSet<String> = rows_for(node)
            .into_iter()
            .filter_map(|row| row.name)
            .map(|name| normalize(&name))
            .collect();
        names.contains(&a) && names.contains(&b)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_bracket() -> Value {
        json!({
            "tournament": "NCAA",
            "regions": [
                {
                    "region": "South",
                    "games": [
                        {"round": 1, "home_team": {"name": "Auburn", "seed": 1}, "away_team": {"name": "Alabama St", "seed": 16}},
                        {"round": 1, "home_team": "Louisville", "home_seed": "8", "away_team": "Creighton", "away_seed": 9}
                    ]
                },
                {
                    "region": "East",
                    "games": [
                        {"teams": [{"name": "Duke", "seed": 1}, {"name": "Mount St. Mary's", "seed": 16}]},
                        {"team1": "Mississippi St", "seed1": 8, "team2": "Baylor", "seed2": 9}
                    ]
                }
            ],
            "first_four": [
                {"conference": "West", "teams": [{"name": "Play-in A", "seed": "TBD"}, {"name": "", "seed": 11}]}
            ]
        })
    }

    #[test]
    fn test_build_buckets_has_all_sixteen_keys() {
        let buckets = build_buckets(&json!(null));
        assert_eq!(buckets.iter().count(), 16);
        assert!(buckets.is_empty());

        let value = serde_json::to_value(build_buckets(&sample_bracket())).unwrap();
        for seed in 1..=16 {
            assert!(value[format!("seed_{}", seed)].is_array());
        }
    }

    #[test]
    fn test_build_buckets_partitions_and_sorts() {
        let buckets = build_buckets(&sample_bracket());
        let ones: Vec<(&str, &str)> = buckets
            .get(1)
            .iter()
            .map(|e| (e.region.as_str(), e.team.as_str()))
            .collect();
        assert_eq!(ones, vec![("East", "Duke"), ("South", "Auburn")]);

        let eights: Vec<&str> = buckets.get(8).iter().map(|e| e.team.as_str()).collect();
        assert_eq!(eights, vec!["Mississippi St", "Louisville"]);
        assert_eq!(buckets.get(16).len(), 2);
        assert_eq!(buckets.total(), 8);
    }

    #[test]
    fn test_nested_side_objects_do_not_duplicate() {
        // side objects are also captured as their own nodes; the inherited
        // region keeps their triple identical to the game-level row
        let buckets = build_buckets(&sample_bracket());
        let auburn: Vec<_> = buckets.entries().filter(|e| e.team == "Auburn").collect();
        assert_eq!(auburn.len(), 1);
        assert_eq!(auburn[0].region, "South");
    }

    #[test]
    fn test_missing_name_or_non_numeric_seed_is_dropped() {
        let entries = extract_entries(&sample_bracket());
        assert!(entries.iter().all(|e| e.team != "Play-in A"));
        assert!(entries.iter().all(|e| !e.team.is_empty()));
    }

    #[test]
    fn test_region_defaults_to_unknown() {
        let raw = json!([{"team": "Drake", "seed": 11}]);
        let buckets = build_buckets(&raw);
        assert_eq!(buckets.get(11)[0].region, "Unknown");
    }

    #[test]
    fn test_dedup_by_normalized_triple() {
        let raw = json!([
            {"team": "Saint Mary's", "seed": 7, "region": "West"},
            {"team": "St. Mary's", "seed": 7, "region": "west "},
            {"team": "St. Mary's", "seed": 7, "region": "East"}
        ]);
        let buckets = build_buckets(&raw);
        assert_eq!(buckets.get(7).len(), 2);
    }

    #[test]
    fn test_out_of_range_seeds_ignored() {
        let raw = json!([{"team": "Ghost", "seed": 0}, {"team": "Phantom", "seed": 17}]);
        assert!(build_buckets(&raw).is_empty());
    }

    #[test]
    fn test_build_buckets_is_deterministic() {
        let raw = sample_bracket();
        let first = serde_json::to_string(&build_buckets(&raw)).unwrap();
        let second = serde_json::to_string(&build_buckets(&raw)).unwrap();
        assert_eq!(first, second);
        assert_eq!(build_buckets(&raw), build_buckets(&raw));
    }

    #[test]
    fn test_team_conference_is_not_a_region() {
        let raw = json!({
            "region": "East",
            "teams": [
                {"name": "Duke", "seed": 1, "conference": "ACC"},
                {"name": "Mount St Mary's", "seed": 16, "conference": "MAAC"}
            ]
        });
        let buckets = build_buckets(&raw);
        assert_eq!(buckets.get(1).len(), 1);
        assert_eq!(buckets.get(1)[0].region, "East");
        assert_eq!(buckets.get(16)[0].region, "East");
    }

    #[test]
    fn test_same_team_with_and_without_conference_lands_once() {
        let raw = json!({
            "region": "West",
            "games": [
                {"teams": [{"name": "Florida", "seed": 1, "conference": "SEC"}, {"name": "Norfolk St", "seed": 16}]},
                {"home_team": {"name": "Florida", "seed": 1}, "away_team": {"name": "UConn", "seed": 8, "conference": "Big East"}}
            ]
        });
        let buckets = build_buckets(&raw);
        let ones: Vec<_> = buckets.get(1).iter().map(|e| (e.team.as_str(), e.region.as_str())).collect();
        assert_eq!(ones, vec![("Florida", "West")]);
        assert_eq!(buckets.get(8)[0].region, "West");
    }

    #[test]
    fn test_game_level_conference_still_names_region() {
        let raw = json!([
            {"conference": "Midwest", "team1": "Purdue", "seed1": 4, "team2": "High Point", "seed2": 13},
            {"conference": "SEC", "team": "Drake", "seed": 11, "region": "Midwest"},
            {"conference": "MWC", "team": "Utah St", "seed": 10}
        ]);
        let entries = extract_entries(&raw);
        let regions: Vec<(&str, &str)> = entries.iter().map(|e| (e.team.as_str(), e.region.as_str())).collect();
        assert_eq!(
            regions,
            vec![
                ("Purdue", "Midwest"),
                ("High Point", "Midwest"),
                ("Drake", "Midwest"),
                ("Utah St", "Unknown"),
            ]
        );
    }

    #[test]
    fn test_teams_paired() {
        let raw = sample_bracket();
        assert!(teams_paired(&raw, "Auburn", "Alabama State"));
        assert!(teams_paired(&raw, "duke", "Mount Saint Mary's"));
        assert!(!teams_paired(&raw, "Duke", "Auburn"));
        assert!(!teams_paired(&json!(null), "Duke", "Houston"));
    }
}
