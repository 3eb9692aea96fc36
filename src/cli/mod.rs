use std::path::Path;

use anyhow::{Context, Result};

use crate::config::ConfigStore;
use crate::llm::backend_from_config;
use crate::models::PredictionSet;
use crate::services::buckets::build_buckets;
use crate::services::normalizer::normalize;
use crate::services::{validator, Assistant};
use crate::store::{loader, FactStore};
use crate::utils::{confidence_percentage, format_percentage, validate_team_name};

const SUGGESTION_THRESHOLD: f64 = 0.8;

async fn load_store(config: &ConfigStore) -> Result<FactStore> {
    let snapshot = config.current().await;
    loader::load_dir(&snapshot.data_dir).await
}

pub async fn ask(config: &ConfigStore, query: &str) -> Result<()> {
    let snapshot = config.current().await;
    let store = load_store(config).await?;
    let assistant = Assistant::new(backend_from_config(&snapshot.llm)?);

    println!("🤔 {}", query);
    let result = assistant.answer(&store, &snapshot, query).await;
    println!("🏷️  Intent: {}\n", result.intent);
    println!("{}", result.reply);
    Ok(())
}

pub async fn preview(config: &ConfigStore, query: &str) -> Result<()> {
    let snapshot = config.current().await;
    let store = load_store(config).await?;
    let preview = Assistant::context_preview(&store, &snapshot.retrieval, query);

    println!("🔎 Context for: {}", query);
    println!("🏷️  Intent: {} | {} items (max {})\n", preview.intent, preview.items.len(), snapshot.retrieval.max_items);
    if preview.formatted_text.is_empty() {
        println!("📭 Nothing matched. Check the data directory: {}", snapshot.data_dir.display());
    } else {
        println!("{}", preview.formatted_text);
    }
    Ok(())
}

pub async fn seed_buckets(config: &ConfigStore, request: &str) -> Result<()> {
    let snapshot = config.current().await;
    let store = load_store(config).await?;
    let assistant = Assistant::new(backend_from_config(&snapshot.llm)?);

    println!("🏀 Building seed bucket analysis...");
    let analysis = match assistant.seed_bucket_analysis(&store, &snapshot, request).await {
        Ok(analysis) => analysis,
        Err(e) => {
            println!("❌ {}", e);
            return Ok(());
        }
    };

    println!("\n📋 Canonical buckets ({} teams):", analysis.buckets.total());
    for (seed, entries) in analysis.buckets.iter() {
        let teams: Vec<String> = entries
            .iter()
            .map(|e| format!("{} ({})", e.team, e.region))
            .collect();
        println!("   {:>2}: {}", seed, teams.join(", "));
    }

    println!("\n📝 Narrative ({} attempt(s)):\n", analysis.attempts);
    println!("{}", analysis.narrative);
    print_report(analysis.validation.ok, &analysis.validation.errors);
    Ok(())
}

/// Check a narrative file against the current buckets without calling the backend.
pub async fn validate_file(config: &ConfigStore, file: &Path) -> Result<()> {
    let store = load_store(config).await?;
    let markdown = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;

    let Some(bracket) = &store.bracket else {
        println!("❌ No bracket data loaded, nothing to validate against");
        return Ok(());
    };
    let buckets = build_buckets(bracket);
    println!("🔍 Validating {} against {} bracket entries", file.display(), buckets.total());

    let report = validator::validate(&markdown, &buckets);
    print_report(report.ok, &report.errors);
    Ok(())
}

fn print_report(ok: bool, errors: &[String]) {
    if ok {
        println!("\n✅ Validation passed");
    } else {
        println!("\n⚠️  Validation failed with {} error(s):", errors.len());
        for (i, error) in errors.iter().enumerate() {
            println!("   {}. {}", i + 1, error);
        }
    }
}

/// Known names closest to `name` by Jaro-Winkler similarity, best first.
fn suggestions(store: &FactStore, name: &str, limit: usize) -> Vec<(String, f64)> {
    let wanted = normalize(name);
    let mut scored: Vec<(String, f64)> = store
        .known_team_names()
        .into_iter()
        .map(|candidate| {
            let score = strsim::jaro_winkler(&wanted, &normalize(candidate));
            (candidate.to_string(), score)
        })
        .filter(|(_, score)| *score >= SUGGESTION_THRESHOLD)
        .collect();
    scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    scored.truncate(limit);
    scored
}

pub async fn query_team(config: &ConfigStore, team_name: &str) -> Result<()> {
    let store = load_store(config).await?;

    if !validate_team_name(team_name) {
        println!("❌ Invalid team name: '{}'", team_name);
        return Ok(());
    }
    println!("🔍 Searching for team: {}", team_name);

    let found = match team_name.trim().parse::<u64>() {
        Ok(id) => store.profile_by_id(id),
        Err(_) => store.profile_by_name(team_name),
    };
    let Some(profile) = found else {
        println!("❌ No team profile found matching '{}'", team_name);
        let close = suggestions(&store, team_name, 5);
        if !close.is_empty() {
            println!("\n💡 Did you mean:");
            for (name, score) in close {
                println!("   • {} ({:.0}% match)", name, score * 100.0);
            }
        }
        return Ok(());
    };

    println!("\n🏆 {}", profile.name);
    if let Some(id) = profile.id {
        println!("   ID: {}", id);
    }
    if let Some(archetype) = &profile.archetype {
        println!("   Archetype: {}", archetype);
    }
    let players = profile.key_player_names();
    if !players.is_empty() {
        println!("   Key players: {}", players.join(", "));
    }
    for (stat, value) in &profile.stats {
        println!("   {}: {}", stat, value);
    }

    if let Some(row) = store.ev_row(&profile.name) {
        println!("\n💰 Total EV: {:.2}", row.total_ev);
    }

    let key = normalize(&profile.name);
    println!("\n🎯 Predictions:");
    let mut any = false;
    for set in PredictionSet::ALL {
        for pred in store.predictions.get(set) {
            if normalize(&pred.team1) != key && normalize(&pred.team2) != key {
                continue;
            }
            any = true;
            println!(
                "   [{}] {} vs {} -> {} ({})",
                set,
                pred.team1,
                pred.team2,
                pred.predicted_winner(),
                format_percentage(confidence_percentage(pred.probability()))
            );
        }
    }
    if !any {
        println!("   📭 No predictions reference this team");
    }
    Ok(())
}

pub async fn show_config(config: &ConfigStore) -> Result<()> {
    let snapshot = config.current().await.redacted();
    let text = serde_json::to_string_pretty(&snapshot)?;
    println!("⚙️  Effective configuration:\n{}", text);
    println!(
        "🔑 API key: {}",
        if snapshot.llm.api_key.is_some() { "configured" } else { "missing" }
    );
    Ok(())
}
