/// Error types shared across the predial crates.
///
/// These errors describe failures of the generative-text collaborator, which every
/// AI-backed workflow depends on. Workflow-level errors are defined in the server crate
/// and convert from `CommonError`.
use crate::openai::OpenAiClientError;

#[derive(Debug, thiserror::Error)]
pub enum CommonError {
    #[error("generative text service is not configured: {0}")]
    NotConfigured(String),

    #[error("generative text request failed: {0}")]
    Service(#[from] OpenAiClientError),

    #[error("generative text service returned no content")]
    EmptyResponse,
}

impl CommonError {
    /// True when the failure comes from missing configuration rather than from the
    /// upstream service. Configuration failures are fatal to every AI workflow.
    pub fn is_configuration(&self) -> bool {
        matches!(self, CommonError::NotConfigured(_))
    }
}
