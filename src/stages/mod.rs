pub mod stage0_correct;
pub mod stage1_polish;
pub mod stage2_extract;
pub mod stage3_synthesize;

pub use stage0_correct::*;
pub use stage1_polish::*;
pub use stage2_extract::*;
pub use stage3_synthesize::*;

use std::time::Instant;

use tracing::warn;

use crate::error::{PipelineError, Result};
use crate::llm::{GenerationRequest, TextModel};
use crate::models::{StageKind, StageMetadata, StageState};

/// Start a stage's metadata record.
pub(crate) fn begin_stage(stage: StageKind) -> StageMetadata {
    StageMetadata {
        stage,
        state: StageState::NotStarted,
        model_used: None,
        duration_ms: 0,
        attempts: 0,
    }
}

/// Invoke the model with the stage retry policy:
///
/// - one immediate retry on `ModelUnavailable` (transient-connection
///   assumption);
/// - after the primary's budget is exhausted with `ModelUnavailable`, a
///   configured fallback model is tried once;
/// - anything else escalates immediately.
///
/// The metadata record tracks every attempt and the model that finally
/// answered, so the single-retry contract is auditable from the session
/// record alone.
pub(crate) async fn generate_with_policy(
    model: &dyn TextModel,
    request: &GenerationRequest,
    fallback_model: Option<&str>,
    metadata: &mut StageMetadata,
) -> Result<String> {
    metadata.state = StageState::InFlight;
    metadata.model_used = Some(request.model.clone());

    let mut last_error: Option<PipelineError> = None;

    for attempt in 0..2 {
        if attempt > 0 {
            warn!(stage = %metadata.stage, model = %request.model, "Retrying after transient failure");
            metadata.state = StageState::InFlight;
        }
        metadata.attempts += 1;

        match model.generate(request).await {
            Ok(text) => return Ok(text),
            Err(e @ PipelineError::ModelUnavailable { .. }) => {
                metadata.state = StageState::RetryPending;
                last_error = Some(e);
            }
            Err(e) => return Err(e),
        }
    }

    if let Some(fallback) = fallback_model {
        warn!(
            stage = %metadata.stage,
            primary = %request.model,
            fallback,
            "Primary model unavailable, escalating to fallback"
        );
        let mut fallback_request = request.clone();
        fallback_request.model = fallback.to_string();
        metadata.attempts += 1;
        metadata.model_used = Some(fallback.to_string());
        match model.generate(&fallback_request).await {
            Ok(text) => return Ok(text),
            Err(e) => last_error = Some(e),
        }
    }

    Err(last_error.unwrap_or_else(|| PipelineError::ModelUnavailable {
        model: request.model.clone(),
        reason: "unknown".to_string(),
    }))
}

/// Close out a stage record as succeeded.
pub(crate) fn finish_stage(metadata: &mut StageMetadata, started: Instant) {
    metadata.state = StageState::Succeeded;
    metadata.duration_ms = started.elapsed().as_millis() as u64;
}

/// Close out a stage record as failed.
pub(crate) fn fail_stage(metadata: &mut StageMetadata, started: Instant) {
    metadata.state = StageState::Failed;
    metadata.duration_ms = started.elapsed().as_millis() as u64;
}


#[cfg(test)]
mod tests {
    use super::testing::ScriptedModel;
    use super::*;

    fn request() -> GenerationRequest {
        GenerationRequest::new("primary", "prompt")
    }

    #[tokio::test]
    async fn test_retries_once_then_succeeds() {
        let model = ScriptedModel::new(vec![
            Err(ScriptedModel::unavailable("primary")),
            Ok("recovered".to_string()),
        ]);
        let mut meta = begin_stage(StageKind::Polish);

        let out = generate_with_policy(&model, &request(), None, &mut meta)
            .await
            .unwrap();
        assert_eq!(out, "recovered");
        assert_eq!(meta.attempts, 2);
        assert_eq!(model.call_count(), 2);
    }

    #[tokio::test]
    async fn test_escalates_after_single_retry() {
        let model = ScriptedModel::new(vec![
            Err(ScriptedModel::unavailable("primary")),
            Err(ScriptedModel::unavailable("primary")),
        ]);
        let mut meta = begin_stage(StageKind::Polish);

        let err = generate_with_policy(&model, &request(), None, &mut meta)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::ModelUnavailable { .. }));
        assert_eq!(model.call_count(), 2);
    }

    #[tokio::test]
    async fn test_fallback_model_tried_once_after_budget() {
        let model = ScriptedModel::new(vec![
            Err(ScriptedModel::unavailable("primary")),
            Err(ScriptedModel::unavailable("primary")),
            Ok("from fallback".to_string()),
        ]);
        let mut meta = begin_stage(StageKind::Extract);

        let out = generate_with_policy(&model, &request(), Some("bigger"), &mut meta)
            .await
            .unwrap();
        assert_eq!(out, "from fallback");
        assert_eq!(meta.model_used.as_deref(), Some("bigger"));
        assert_eq!(meta.attempts, 3);
    }

    #[tokio::test]
    async fn test_non_retryable_error_escalates_immediately() {
        let model = ScriptedModel::new(vec![Err(PipelineError::EmptyInput {
            stage: StageKind::Extract,
        })]);
        let mut meta = begin_stage(StageKind::Extract);

        let err = generate_with_policy(&model, &request(), None, &mut meta)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::EmptyInput { .. }));
        assert_eq!(model.call_count(), 1);
    }
}
