use thiserror::Error;

use crate::models::StageKind;

/// All failure conditions produced by the pipeline.
///
/// `Cancelled` is included here for propagation convenience even though it is
/// user-initiated rather than a fault; the coordinator treats it as a
/// short-circuit, not a retryable failure.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The model service could not be reached or returned an unusable
    /// response. Retried once inside the owning stage before escalating.
    #[error("model '{model}' unavailable: {reason}")]
    ModelUnavailable { model: String, reason: String },

    /// Synthesis output did not contain the required section headers.
    /// The raw model output is kept for diagnostics.
    #[error("summary output missing required sections: {reason}")]
    MalformedSummary { reason: String, raw_output: String },

    /// An upstream stage handed this stage empty text. Never retried:
    /// re-invoking a model cannot conjure missing input.
    #[error("{stage} received empty input")]
    EmptyInput { stage: StageKind },

    /// User-initiated cancellation observed between stages.
    #[error("session cancelled")]
    Cancelled,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PipelineError {
    /// Whether the owning stage may retry this failure once before
    /// escalating to the coordinator.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PipelineError::ModelUnavailable { .. } | PipelineError::MalformedSummary { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        let unavailable = PipelineError::ModelUnavailable {
            model: "medllama2".to_string(),
            reason: "connection refused".to_string(),
        };
        assert!(unavailable.is_retryable());

        let empty = PipelineError::EmptyInput {
            stage: StageKind::Polish,
        };
        assert!(!empty.is_retryable());

        assert!(!PipelineError::Cancelled.is_retryable());
    }
}
