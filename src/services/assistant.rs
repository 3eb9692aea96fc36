use std::sync::Arc;

use crate::config::{AppConfig, RetrievalConfig};
use crate::error::AnalysisError;
use crate::llm::{GenerativeBackend, Turn};
use crate::models::{AnswerResult, ContextPreview, SeedBucketAnalysis};
use crate::services::buckets::build_buckets;
use crate::services::repair::generate_with_repair;
use crate::services::{formatter, intent, prompts, retriever};
use crate::store::FactStore;

/// The three operations exposed to callers, over one generative backend.
/// Every method works on a store snapshot and a config snapshot supplied by
/// the caller.
#[derive(Clone)]
pub struct Assistant {
    backend: Arc<dyn GenerativeBackend>,
}

impl Assistant {
    pub fn new(backend: Arc<dyn GenerativeBackend>) -> Self {
        Self { backend }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Retrieval and formatting only; the backend is not called.
    pub fn context_preview(store: &FactStore, config: &RetrievalConfig, query: &str) -> ContextPreview {
        let items = retriever::retrieve(query, store, config);
        let formatted_text = formatter::format(&items);
        ContextPreview {
            intent: intent::classify(query),
            items,
            formatted_text,
        }
    }

    /// Grounded answer to a free-text question. Backend failures come back as
    /// the reply text rather than as an error.
    pub async fn answer(&self, store: &FactStore, config: &AppConfig, query: &str) -> AnswerResult {
        let preview = Self::context_preview(store, &config.retrieval, query);
        let system = prompts::chat_system(intent::prompt_hint(preview.intent), &preview.formatted_text);
        tracing::info!(
            intent = %preview.intent,
            context_items = preview.items.len(),
            backend = self.backend.name(),
            "Answering question"
        );

        let reply = match self
            .backend
            .complete(&system, &[Turn::user(query)], config.llm.temperature)
            .await
        {
            Ok(text) => text,
            Err(e) if e.is_configuration() => {
                tracing::warn!("{}", e);
                e.to_string()
            }
            Err(e) => {
                tracing::error!("Backend call failed: {}", e);
                format!("The language model backend failed: {}", e)
            }
        };

        AnswerResult {
            reply,
            intent: preview.intent,
        }
    }

    /// Seed-by-seed narrative over the current bracket, validated against the
    /// canonical buckets and repaired up to the configured retry count.
    pub async fn seed_bucket_analysis(
        &self,
        store: &FactStore,
        config: &AppConfig,
        user_request: &str,
    ) -> Result<SeedBucketAnalysis, AnalysisError> {
        let bracket = store.bracket.as_ref().ok_or(AnalysisError::NoBracketData)?;
        let buckets = build_buckets(bracket);
        if buckets.is_empty() {
            return Err(AnalysisError::EmptyBracket);
        }

        let outcome = generate_with_repair(
            self.backend.as_ref(),
            user_request,
            &buckets,
            store,
            config.repair.max_retries,
        )
        .await?;

        tracing::info!(
            attempts = outcome.attempts,
            ok = outcome.validation.ok,
            teams = buckets.total(),
            "Seed bucket analysis finished"
        );
        Ok(SeedBucketAnalysis {
            buckets,
            narrative: outcome.narrative,
            validation: outcome.validation,
            attempts: outcome.attempts,
        })
    }
}
