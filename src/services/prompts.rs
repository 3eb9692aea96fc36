//! Instruction templates sent to the generative backend.

use crate::models::ValidationReport;

/// Text placed in the grounding block when retrieval found nothing.
pub const NO_CONTEXT: &str = "No matching tournament data was found for this question.";

pub const CHAT_SYSTEM: &str = "\
You are BracketGPT, an assistant for NCAA tournament bracket questions.
Answer using only the facts in the CONTEXT block below. Predictions list the
team 1 win probability and the favourite's confidence; HYPOTHETICAL marks a
pair of teams that do not actually meet in the current bracket.
If the context does not cover the question, say the data is not available
instead of guessing. Never invent seeds, probabilities or results.";

pub const NARRATIVE_SYSTEM: &str = "\
You are a college basketball analyst writing a seed-by-seed breakdown of the
tournament field. The JSON payload holds CANONICAL SEED BUCKETS; they are the
only source of truth for which team holds which seed.

Rules:
1. Write exactly 16 sections in increasing seed order. Each section starts
   with a header line of the form `### SEED_N`, N from 1 to 16.
2. Inside the section for seed N mention only teams listed in bucket seed_N.
   Never name a team from another bucket, not even as a comparison.
3. Use only values present in the payload. Where a value is missing write
   \"data not available\" instead of estimating one.
4. Under the header of an empty bucket write \"data not available\".
5. Write nothing before the first header.";

pub fn chat_system(intent_hint: &str, formatted_context: &str) -> String {
    let context = if formatted_context.trim().is_empty() {
        NO_CONTEXT
    } else {
        formatted_context
    };
    format!(
        "{}\n\nQuestion type: {}\n\nCONTEXT:\n{}",
        CHAT_SYSTEM, intent_hint, context
    )
}

pub fn narrative_request(user_request: &str, payload: &str) -> String {
    format!(
        "Request: {}\n\nPayload:\n```json\n{}\n```",
        user_request.trim(),
        payload
    )
}

/// Follow-up turn listing every violation of the previous draft.
pub fn correction(report: &ValidationReport) -> String {
    let numbered: Vec<String> = report
        .errors
        .iter()
        .enumerate()
        .map(|(i, e)| format!("{}. {}", i + 1, e))
        .collect();
    format!(
        "Your previous answer broke the grounding rules:\n{}\n\n\
         Rewrite the complete analysis. Keep exactly 16 `### SEED_N` sections in \
         increasing order and mention each team only inside its own seed's section.",
        numbered.join("\n")
    )
}
