//! Reads the uploaded datasets from the data directory into a [`FactStore`].
//!
//! Every file is optional. A file that is missing, unreadable or not JSON
//! becomes an empty collection, and individual records that fail to
//! deserialize are skipped, so one bad upload never takes the others down.

use std::path::Path;

use anyhow::Result;
use serde::de::DeserializeOwned;
use serde_json::{Map, Number, Value};

use super::{FactStore, PredictionSets};
use crate::models::{EvRow, Prediction, TeamProfile};

pub const PROFILES_FILE: &str = "team_profiles.json";
pub const BASE_PREDICTIONS_FILE: &str = "chatbot_predictions_base.json";
pub const UPSET_PREDICTIONS_FILE: &str = "chatbot_predictions_upset.json";
pub const FLOOR_PREDICTIONS_FILE: &str = "chatbot_predictions_floor.json";
pub const OPTIMIZER_FILE: &str = "optimizer_results.json";
pub const BRACKET_FILE: &str = "bracket.json";
pub const CONTEXT_FILE: &str = "context_rows.json";
pub const CONTEXT_CSV_FILE: &str = "context_rows.csv";
pub const EV_FILE: &str = "ev_table.json";
pub const EV_CSV_FILE: &str = "ev_table.csv";

/// Keys under which exporters wrap their record arrays.
const WRAPPER_KEYS: &[&str] = &["profiles", "predictions", "results", "rows", "teams", "data"];

pub async fn load_dir(dir: &Path) -> Result<FactStore> {
    if !dir.exists() {
        tracing::warn!("Data directory {} does not exist, starting with an empty store", dir.display());
        return Ok(FactStore::empty());
    }

    let profiles: Vec<TeamProfile> = records(read_json(dir, PROFILES_FILE).await, PROFILES_FILE);
    let predictions = PredictionSets {
        base: records::<Prediction>(read_json(dir, BASE_PREDICTIONS_FILE).await, BASE_PREDICTIONS_FILE),
        upset: records::<Prediction>(read_json(dir, UPSET_PREDICTIONS_FILE).await, UPSET_PREDICTIONS_FILE),
        floor: records::<Prediction>(read_json(dir, FLOOR_PREDICTIONS_FILE).await, FLOOR_PREDICTIONS_FILE),
    };
    let optimizer = records::<Value>(read_json(dir, OPTIMIZER_FILE).await, OPTIMIZER_FILE);
    let bracket = read_json(dir, BRACKET_FILE).await;

    let mut context_rows = records::<Value>(read_json(dir, CONTEXT_FILE).await, CONTEXT_FILE);
    context_rows.extend(read_csv(dir, CONTEXT_CSV_FILE).await);

    let mut ev_table = records::<EvRow>(read_json(dir, EV_FILE).await, EV_FILE);
    ev_table.extend(records::<EvRow>(
        Some(Value::Array(read_csv(dir, EV_CSV_FILE).await)),
        EV_CSV_FILE,
    ));

    let store = FactStore::new(profiles, predictions, optimizer, bracket, context_rows, ev_table);
    tracing::info!(summary = ?store.summary(), "Loaded fact store from {}", dir.display());
    Ok(store)
}

async fn read_json(dir: &Path, file: &str) -> Option<Value> {
    let path = dir.join(file);
    let text = match tokio::fs::read_to_string(&path).await {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("{} not present", file);
            return None;
        }
        Err(e) => {
            tracing::warn!("Failed to read {}: {}", path.display(), e);
            return None;
        }
    };
    match serde_json::from_str(&text) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!("{} is not valid JSON: {}", file, e);
            None
        }
    }
}

/// Unwrap a bare array or an object wrapping one under a known key.
fn collection(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        Value::Object(mut map) => {
            for key in WRAPPER_KEYS {
                if let Some(Value::Array(items)) = map.remove(*key) {
                    return items;
                }
            }
            Vec::new()
        }
        Value::Null => Vec::new(),
        other => vec![other],
    }
}

pub(crate) fn records<T: DeserializeOwned>(value: Option<Value>, source: &str) -> Vec<T> {
    let items = value.map(collection).unwrap_or_default();
    let total = items.len();
    let parsed: Vec<T> = items
        .into_iter()
        .filter_map(|item| match serde_json::from_value(item) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!("Skipping malformed record in {}: {}", source, e);
                None
            }
        })
        .collect();
    if parsed.len() < total {
        tracing::warn!("{}: kept {} of {} records", source, parsed.len(), total);
    }
    parsed
}

async fn read_csv(dir: &Path, file: &str) -> Vec<Value> {
    let path = dir.join(file);
    match tokio::fs::read(&path).await {
        Ok(bytes) => csv_rows(&bytes).unwrap_or_else(|e| {
            tracing::warn!("{} is not valid CSV: {}", file, e);
            Vec::new()
        }),
        Err(_) => Vec::new(),
    }
}

/// CSV rows as JSON objects keyed by header; numeric cells become numbers
/// and empty cells are left out.
pub(crate) fn csv_rows(bytes: &[u8]) -> Result<Vec<Value>> {
    let mut reader = csv::Reader::from_reader(bytes);
    let headers = reader.headers()?.clone();
    let mut rows = Vec::new();

    for record in reader.records() {
        let record = record?;
        let mut row = Map::new();
        for (header, cell) in headers.iter().zip(record.iter()) {
            let cell = cell.trim();
            if cell.is_empty() {
                continue;
            }
            let value = cell
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number)
                .unwrap_or_else(|| Value::String(cell.to_string()));
            row.insert(header.trim().to_string(), value);
        }
        if !row.is_empty() {
            rows.push(Value::Object(row));
        }
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_collection_unwraps_known_wrappers() {
        assert_eq!(collection(json!([1, 2])).len(), 2);
        assert_eq!(collection(json!({"predictions": [1, 2, 3], "model_version": "v5"})).len(), 3);
        assert!(collection(json!({"unrelated": true})).is_empty());
        assert!(collection(Value::Null).is_empty());
    }

    #[test]
    fn test_records_skip_malformed_items() {
        let raw = json!({"predictions": [
            {"t1_name": "Duke", "t2_name": "Houston", "model_win_prob": 0.6},
            {"t1_name": "Orphan"},
        ]});
        let preds: Vec<Prediction> = records(Some(raw), "test");
        assert_eq!(preds.len(), 1);
    }

    #[test]
    fn test_csv_rows_parse_numbers() {
        let rows = csv_rows(b"team,seed,total_ev,note\nDuke,1,42.5,\nHouston,2,30,hot\n").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["team"], "Duke");
        assert_eq!(rows[0]["total_ev"], 42.5);
        assert!(rows[0].get("note").is_none());

        let ev: Vec<EvRow> = records(Some(Value::Array(rows)), "ev");
        assert_eq!(ev[1].seed, Some(2));
        assert_eq!(ev[1].rounds["note"], "hot");
    }

    #[tokio::test]
    async fn test_load_dir_tolerates_missing_and_broken_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(PROFILES_FILE), "{ not json").unwrap();
        std::fs::write(
            dir.path().join(BASE_PREDICTIONS_FILE),
            r#"[{"t1_name": "Duke", "t2_name": "Houston", "t1_seed": 1, "t2_seed": 1}]"#,
        )
        .unwrap();
        std::fs::write(dir.path().join(BRACKET_FILE), r#"{"games": []}"#).unwrap();

        let store = load_dir(dir.path()).await.unwrap();
        assert!(store.profiles.is_empty());
        assert_eq!(store.predictions.base.len(), 1);
        assert!(store.predictions.floor.is_empty());
        assert!(store.bracket.is_some());
    }

    #[tokio::test]
    async fn test_load_missing_dir_is_empty() {
        let store = load_dir(Path::new("/definitely/not/here")).await.unwrap();
        assert_eq!(store.summary().profiles, 0);
    }
}
