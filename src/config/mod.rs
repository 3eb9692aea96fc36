use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// Knobs of the context retriever.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub max_items: usize,
    pub upset_items: usize,
    pub optimizer_items: usize,
    pub value_items: usize,
    pub title_seed_cutoff: u8,
    pub include_team_profiles: bool,
    pub include_optimizer: bool,
    pub include_title_angles: bool,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            max_items: 24,
            upset_items: 6,
            optimizer_items: 5,
            value_items: 10,
            title_seed_cutoff: 4,
            include_team_profiles: true,
            include_optimizer: true,
            include_title_angles: true,
        }
    }
}

impl RetrievalConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_items == 0 {
            return Err(anyhow!("max_items must be at least 1"));
        }
        if !(1..=16).contains(&self.title_seed_cutoff) {
            return Err(anyhow!("title_seed_cutoff must be between 1 and 16"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[serde(alias = "openai-compatible")]
    OpenAi,
    Anthropic,
    Gemini,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::Anthropic => "anthropic",
            Provider::Gemini => "gemini",
        }
    }

    fn key_env(&self) -> &'static str {
        match self {
            Provider::OpenAi => "OPENAI_API_KEY",
            Provider::Anthropic => "ANTHROPIC_API_KEY",
            Provider::Gemini => "GEMINI_API_KEY",
        }
    }

    fn default_model(&self) -> &'static str {
        match self {
            Provider::OpenAi => "gpt-4o-mini",
            Provider::Anthropic => "claude-3-5-haiku-latest",
            Provider::Gemini => "gemini-1.5-flash",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "openai" | "openai-compatible" | "local" => Ok(Provider::OpenAi),
            "anthropic" | "claude" => Ok(Provider::Anthropic),
            "gemini" | "google" => Ok(Provider::Gemini),
            other => Err(anyhow!("Unknown LLM provider '{}'. Use openai, anthropic or gemini", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: Provider,
    pub model: String,
    pub base_url: Option<String>,
    /// Never written to the persisted config file.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: Provider::OpenAi,
            model: Provider::OpenAi.default_model().to_string(),
            base_url: None,
            api_key: None,
            temperature: 0.3,
            max_tokens: 2048,
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepairConfig {
    /// Correction passes after the first generation.
    pub max_retries: u32,
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self { max_retries: 2 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 3000 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub retrieval: RetrievalConfig,
    pub llm: LlmConfig,
    pub repair: RepairConfig,
    pub server: ServerConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            retrieval: RetrievalConfig::default(),
            llm: LlmConfig::default(),
            repair: RepairConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl AppConfig {
    /// Copy with the API key masked, for display.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        copy.llm.api_key = copy.llm.api_key.as_ref().map(|_| "***".to_string());
        copy
    }
}

fn env_var(name: &str) -> Option<String> {
    dotenv::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: FromStr>(name: &str) -> Result<Option<T>>
where
    T::Err: fmt::Display,
{
    match env_var(name) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| anyhow!("Invalid {}='{}': {}", name, raw, e)),
        None => Ok(None),
    }
}

/// Layer environment variables over `config`.
fn apply_env(mut config: AppConfig) -> Result<AppConfig> {
    if let Some(dir) = env_var("DATA_DIR") {
        config.data_dir = PathBuf::from(dir);
    }
    if let Some(provider) = env_parse::<Provider>("LLM_PROVIDER")? {
        if provider != config.llm.provider && env_var("LLM_MODEL").is_none() {
            config.llm.model = provider.default_model().to_string();
        }
        config.llm.provider = provider;
    }
    if let Some(model) = env_var("LLM_MODEL") {
        config.llm.model = model;
    }
    if let Some(base_url) = env_var("LLM_BASE_URL") {
        config.llm.base_url = Some(base_url);
    }
    config.llm.api_key = env_var("LLM_API_KEY")
        .or_else(|| env_var(config.llm.provider.key_env()))
        .or(config.llm.api_key);
    if let Some(t) = env_parse::<f32>("LLM_TEMPERATURE")? {
        config.llm.temperature = t;
    }
    if let Some(n) = env_parse::<usize>("RETRIEVAL_MAX_ITEMS")? {
        config.retrieval.max_items = n;
    }
    if let Some(n) = env_parse::<u32>("REPAIR_MAX_RETRIES")? {
        config.repair.max_retries = n;
    }
    if let Some(port) = env_parse::<u16>("PORT")? {
        config.server.port = port;
    }
    Ok(config)
}

fn read_file(path: &Path) -> Result<Option<AppConfig>> {
    match std::fs::read_to_string(path) {
        Ok(text) => {
            let config = serde_json::from_str(&text)
                .with_context(|| format!("Invalid config file {}", path.display()))?;
            Ok(Some(config))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
    }
}

/// Single owner of the process configuration. Readers get an immutable
/// snapshot; updates build a new value, persist it, then swap it in.
pub struct ConfigStore {
    path: PathBuf,
    current: RwLock<Arc<AppConfig>>,
}

impl ConfigStore {
    /// Defaults, then the persisted file, then the environment.
    pub fn load() -> Result<Self> {
        let data_dir = env_var("DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| AppConfig::default().data_dir);
        let path = env_var("BRACKET_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("config.json"));

        let from_file = read_file(&path)?;
        if from_file.is_some() {
            tracing::info!("Loaded persisted config from {}", path.display());
        }
        let config = apply_env(from_file.unwrap_or_default())?;
        config.retrieval.validate()?;
        Ok(Self::with_config(path, config))
    }

    pub fn with_config(path: PathBuf, config: AppConfig) -> Self {
        Self {
            path,
            current: RwLock::new(Arc::new(config)),
        }
    }

    pub async fn current(&self) -> Arc<AppConfig> {
        self.current.read().await.clone()
    }

    /// Replace the retrieval settings. The previous snapshot stays valid for
    /// requests already holding it.
    pub async fn update_retrieval(&self, retrieval: RetrievalConfig) -> Result<Arc<AppConfig>> {
        retrieval.validate()?;
        let mut guard = self.current.write().await;
        let next = Arc::new(AppConfig {
            retrieval,
            ..(**guard).clone()
        });
        self.persist(&next).await?;
        *guard = next.clone();
        tracing::info!(retrieval = ?next.retrieval, "Retrieval config updated");
        Ok(next)
    }

    async fn persist(&self, config: &AppConfig) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let text = serde_json::to_string_pretty(config)?;
        tokio::fs::write(&self.path, text)
            .await
            .with_context(|| format!("Failed to persist config to {}", self.path.display()))?;
        Ok(())
    }
}
