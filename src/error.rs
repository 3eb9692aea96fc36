use crate::llm::BackendError;

/// Why a seed-bucket analysis could not produce a narrative.
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("No bracket data is loaded. Add bracket.json to the data directory and reload before requesting a seed bucket analysis.")]
    NoBracketData,
    #[error("The loaded bracket data contains no teams with a seed between 1 and 16.")]
    EmptyBracket,
    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl AnalysisError {
    /// Missing or unusable data, as opposed to a backend failure.
    pub fn is_missing_data(&self) -> bool {
        matches!(self, AnalysisError::NoBracketData | AnalysisError::EmptyBracket)
    }
}
