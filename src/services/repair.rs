use crate::llm::{BackendError, GenerativeBackend};
use crate::models::{SeedBuckets, ValidationReport};
use crate::services::narrative::{self, NarrativePrompt};
use crate::services::prompts;
use crate::services::validator::validate;
use crate::store::FactStore;

#[derive(Debug, Clone)]
pub struct RepairOutcome {
    pub narrative: String,
    pub validation: ValidationReport,
    /// Backend calls made, the first generation included.
    pub attempts: u32,
}

enum RepairState {
    Generating,
    Validating(String),
    Repairing(String, ValidationReport),
    Done(String, ValidationReport),
}

/// Generate a seed narrative and re-prompt with the violation list until it
/// validates or `max_retries` corrections have been spent.
///
/// An unresolved draft is returned with its failing report; only backend
/// failures are errors. Attempts run strictly one after another.
pub async fn generate_with_repair(
    backend: &dyn GenerativeBackend,
    user_request: &str,
    buckets: &SeedBuckets,
    store: &FactStore,
    max_retries: u32,
) -> Result<RepairOutcome, BackendError> {
    let mut prompt = NarrativePrompt::new(user_request, buckets, store);
    let mut attempts = 0u32;
    let mut state = RepairState::Generating;

    loop {
        state = match state {
            RepairState::Generating => {
                attempts += 1;
                RepairState::Validating(narrative::generate(backend, &prompt).await?)
            }
            RepairState::Validating(draft) => {
                let report = validate(&draft, buckets);
                if report.ok {
                    RepairState::Done(draft, report)
                } else if attempts > max_retries {
                    tracing::warn!(
                        attempts,
                        errors = report.errors.len(),
                        "Seed narrative still invalid after repair budget"
                    );
                    RepairState::Done(draft, report)
                } else {
                    RepairState::Repairing(draft, report)
                }
            }
            RepairState::Repairing(draft, report) => {
                tracing::info!(
                    attempt = attempts,
                    errors = report.errors.len(),
                    "Seed narrative failed validation, requesting correction"
                );
                prompt.push_correction(draft, prompts::correction(&report));
                RepairState::Generating
            }
            RepairState::Done(narrative, validation) => {
                return Ok(RepairOutcome {
                    narrative,
                    validation,
                    attempts,
                });
            }
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::ScriptedBackend;
    use crate::llm::Role;
    use crate::models::BracketEntry;

    const VALID: &str = "### SEED_1\nDuke\n### SEED_16\nMount St Mary's";
    const INVALID: &str = "### SEED_1\nDuke\n### SEED_16\nMount St Mary's versus Duke";

    fn buckets() -> SeedBuckets {
        let mut buckets = SeedBuckets::new();
        buckets.push(BracketEntry { team: "Duke".into(), seed: 1, region: "East".into() });
        buckets.push(BracketEntry { team: "Mount St Mary's".into(), seed: 16, region: "East".into() });
        buckets
    }

    #[tokio::test]
    async fn test_always_invalid_stops_after_two_repairs() {
        let backend = ScriptedBackend::always(INVALID);
        let outcome = generate_with_repair(&backend, "analyze", &buckets(), &FactStore::empty(), 2)
            .await
            .unwrap();

        assert_eq!(backend.call_count(), 3);
        assert_eq!(outcome.attempts, 3);
        assert!(!outcome.validation.ok);
        assert_eq!(outcome.narrative, INVALID);
    }

    #[tokio::test]
    async fn test_valid_first_draft_needs_one_call() {
        let backend = ScriptedBackend::always(VALID);
        let outcome = generate_with_repair(&backend, "analyze", &buckets(), &FactStore::empty(), 2)
            .await
            .unwrap();
        assert_eq!(backend.call_count(), 1);
        assert!(outcome.validation.ok);
    }

    #[tokio::test]
    async fn test_correction_carries_conversation_and_numbered_errors() {
        let backend = ScriptedBackend::new([INVALID, VALID]);
        let outcome = generate_with_repair(&backend, "analyze", &buckets(), &FactStore::empty(), 2)
            .await
            .unwrap();

        assert_eq!(outcome.attempts, 2);
        assert!(outcome.validation.ok);
        assert_eq!(outcome.narrative, VALID);

        let calls = backend.calls();
        let second = &calls[1];
        assert_eq!(second.temperature, 0.0);
        assert_eq!(second.turns.len(), 3);
        assert_eq!(second.turns[1].role, Role::Assistant);
        assert_eq!(second.turns[1].content, INVALID);
        assert!(second.turns[2].content.contains("1. 'Duke' belongs to seed_1"));
    }

    #[tokio::test]
    async fn test_zero_retries_means_single_attempt() {
        let backend = ScriptedBackend::always(INVALID);
        let outcome = generate_with_repair(&backend, "analyze", &buckets(), &FactStore::empty(), 0)
            .await
            .unwrap();
        assert_eq!(backend.call_count(), 1);
        assert!(!outcome.validation.ok);
    }
}
