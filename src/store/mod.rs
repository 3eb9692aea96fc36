pub mod loader;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::models::{EvRow, Prediction, PredictionSet, TeamProfile};
use crate::services::normalizer::normalize;

#[derive(Debug, Clone, Default)]
pub struct PredictionSets {
    pub base: Vec<Prediction>,
    pub upset: Vec<Prediction>,
    pub floor: Vec<Prediction>,
}

impl PredictionSets {
    pub fn get(&self, set: PredictionSet) -> &[Prediction] {
        match set {
            PredictionSet::Base => &self.base,
            PredictionSet::Upset => &self.upset,
            PredictionSet::Floor => &self.floor,
        }
    }

    pub fn total(&self) -> usize {
        self.base.len() + self.upset.len() + self.floor.len()
    }
}

/// Immutable snapshot of every loaded dataset. Absent datasets are empty
/// collections (or `None` for the raw bracket), never errors.
#[derive(Debug, Clone, Default)]
pub struct FactStore {
    pub profiles: Vec<TeamProfile>,
    pub predictions: PredictionSets,
    pub optimizer: Vec<Value>,
    pub bracket: Option<Value>,
    pub context_rows: Vec<Value>,
    pub ev_table: Vec<EvRow>,
    by_name: HashMap<String, usize>,
    by_id: HashMap<u64, usize>,
}

impl FactStore {
    pub fn new(
        profiles: Vec<TeamProfile>,
        predictions: PredictionSets,
        optimizer: Vec<Value>,
        bracket: Option<Value>,
        context_rows: Vec<Value>,
        ev_table: Vec<EvRow>,
    ) -> Self {
        let mut by_name = HashMap::new();
        let mut by_id = HashMap::new();
        for (i, profile) in profiles.iter().enumerate() {
            let key = normalize(&profile.name);
            if !key.is_empty() {
                by_name.entry(key).or_insert(i);
            }
            if let Some(id) = profile.id {
                by_id.entry(id).or_insert(i);
            }
        }

        Self {
            profiles,
            predictions,
            optimizer,
            bracket: bracket.filter(|b| !b.is_null()),
            context_rows,
            ev_table,
            by_name,
            by_id,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn profile_by_name(&self, name: &str) -> Option<&TeamProfile> {
        self.by_name
            .get(&normalize(name))
            .map(|&i| &self.profiles[i])
    }

    pub fn profile_by_id(&self, id: u64) -> Option<&TeamProfile> {
        self.by_id.get(&id).map(|&i| &self.profiles[i])
    }

    pub fn ev_row(&self, team: &str) -> Option<&EvRow> {
        let key = normalize(team);
        if key.is_empty() {
            return None;
        }
        self.ev_table.iter().find(|row| normalize(&row.team) == key)
    }

    /// Every distinct team name the store knows about, for resolving names
    /// typed in a question.
    pub fn known_team_names(&self) -> Vec<&str> {
        let mut seen = std::collections::HashSet::new();
        let predictions = PredictionSet::ALL
            .iter()
            .flat_map(|set| self.predictions.get(*set))
            .flat_map(|p| [p.team1.as_str(), p.team2.as_str()]);

        self.profiles
            .iter()
            .map(|p| p.name.as_str())
            .chain(predictions)
            .chain(self.ev_table.iter().map(|r| r.team.as_str()))
            .filter(|name| seen.insert(normalize(name)))
            .collect()
    }

    pub fn summary(&self) -> StoreSummary {
        StoreSummary {
            profiles: self.profiles.len(),
            predictions_base: self.predictions.base.len(),
            predictions_upset: self.predictions.upset.len(),
            predictions_floor: self.predictions.floor.len(),
            predictions_total: self.predictions.total(),
            optimizer: self.optimizer.len(),
            bracket_loaded: self.bracket.is_some(),
            context_rows: self.context_rows.len(),
            ev_rows: self.ev_table.len(),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct StoreSummary {
    pub profiles: usize,
    pub predictions_base: usize,
    pub predictions_upset: usize,
    pub predictions_floor: usize,
    pub predictions_total: usize,
    pub optimizer: usize,
    pub bracket_loaded: bool,
    pub context_rows: usize,
    pub ev_rows: usize,
}

/// Owner of the current snapshot. Requests read a cheap `Arc` clone; a reload
/// swaps in a new snapshot without touching ones already handed out.
#[derive(Clone)]
pub struct SharedStore {
    data_dir: PathBuf,
    current: Arc<RwLock<Arc<FactStore>>>,
}

impl SharedStore {
    pub fn new(data_dir: &Path, store: FactStore) -> Self {
        Self {
            data_dir: data_dir.to_path_buf(),
            current: Arc::new(RwLock::new(Arc::new(store))),
        }
    }

    pub async fn open(data_dir: &Path) -> Result<Self> {
        let store = loader::load_dir(data_dir).await?;
        Ok(Self::new(data_dir, store))
    }

    pub async fn snapshot(&self) -> Arc<FactStore> {
        self.current.read().await.clone()
    }

    pub async fn reload(&self) -> Result<StoreSummary> {
        let fresh = loader::load_dir(&self.data_dir).await?;
        let summary = fresh.summary();
        *self.current.write().await = Arc::new(fresh);
        tracing::info!(?summary, "Fact store reloaded from {}", self.data_dir.display());
        Ok(summary)
    }
}
