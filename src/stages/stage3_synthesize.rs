use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::PipelineError;
use crate::llm::{GenerationRequest, TextModel, build_synthesis_prompt, default_stop_sequences};
use crate::models::{ClinicalNote, StageKind, StageMetadata, StageState};
use crate::stages::{begin_stage, fail_stage, finish_stage, generate_with_policy};

/// Configuration for the synthesis pass (Pass 2 of the summarizer).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesizeConfig {
    pub model: String,
    #[serde(default)]
    pub fallback_model: Option<String>,
    /// Lower than extraction: formatting should not be creative.
    pub temperature: f64,
    pub max_tokens: u32,
    /// Re-invocations permitted when output is missing section headers.
    /// One absorbs sampling variance; persistent malformation escalates.
    pub malformed_retries: u32,
}

impl Default for SynthesizeConfig {
    fn default() -> Self {
        Self {
            model: "medllama2".to_string(),
            fallback_model: None,
            temperature: 0.05,
            max_tokens: 700,
            malformed_retries: 1,
        }
    }
}

/// Result of the synthesis pass.
#[derive(Debug)]
pub struct SynthesizeResult {
    pub note: ClinicalNote,
    pub metadata: StageMetadata,
}

/// Drop conversational filler before the note body. Models occasionally
/// preface output with "Here is the note:"; everything before the first
/// section header is noise.
fn strip_preamble(text: &str) -> &str {
    match text.find("HPI") {
        Some(pos) => &text[pos..],
        None => text,
    }
}

/// Execute stage 3: synthesis of the structured note (Pass 2).
///
/// Supplies both the polished transcript and the Pass 1 inventory, then
/// parses the output strictly. Output missing any of the four required
/// headers is re-invoked once with the same prompt; if it is still
/// malformed, the stage fails with the raw output attached rather than
/// presenting a partially filled note as complete.
pub async fn execute_synthesize(
    model: &dyn TextModel,
    config: &SynthesizeConfig,
    polished_text: &str,
    extracted_entities: &str,
) -> std::result::Result<SynthesizeResult, (PipelineError, StageMetadata)> {
    let started = Instant::now();
    let mut metadata = begin_stage(StageKind::Synthesize);

    if polished_text.trim().is_empty() || extracted_entities.trim().is_empty() {
        fail_stage(&mut metadata, started);
        return Err((
            PipelineError::EmptyInput {
                stage: StageKind::Synthesize,
            },
            metadata,
        ));
    }

    let request = GenerationRequest {
        model: config.model.clone(),
        prompt: build_synthesis_prompt(polished_text, extracted_entities),
        temperature: config.temperature,
        max_tokens: Some(config.max_tokens),
        stop: default_stop_sequences(),
    };

    let mut last_failure: Option<PipelineError> = None;

    for invocation in 0..=config.malformed_retries {
        if invocation > 0 {
            metadata.state = StageState::RetryPending;
            warn!(invocation, "Synthesis output malformed, re-invoking with same prompt");
        }

        let raw = match generate_with_policy(
            model,
            &request,
            config.fallback_model.as_deref(),
            &mut metadata,
        )
        .await
        {
            Ok(text) => text,
            Err(e) => {
                fail_stage(&mut metadata, started);
                return Err((e, metadata));
            }
        };

        match ClinicalNote::parse(strip_preamble(&raw)) {
            Ok(note) => {
                finish_stage(&mut metadata, started);
                info!(
                    model = metadata.model_used.as_deref().unwrap_or("?"),
                    attempts = metadata.attempts,
                    duration_ms = metadata.duration_ms,
                    "Stage 3: synthesis complete"
                );
                return Ok(SynthesizeResult { note, metadata });
            }
            Err(parse_err) => {
                last_failure = Some(PipelineError::MalformedSummary {
                    reason: parse_err.to_string(),
                    raw_output: raw,
                });
            }
        }
    }

    fail_stage(&mut metadata, started);
    let error = last_failure.unwrap_or_else(|| PipelineError::MalformedSummary {
        reason: "no output produced".to_string(),
        raw_output: String::new(),
    });
    Err((error, metadata))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SENTINEL;
    use crate::stages::testing::ScriptedModel;

    const GOOD_NOTE: &str = "HPI:\nThree days of abdominal pain.\n\nFindings:\nNot documented\n\nAssessment:\n1. Abdominal pain\n\nPlan:\nNot documented";

    #[tokio::test]
    async fn test_synthesize_parses_well_formed_note() {
        let model = ScriptedModel::new(vec![Ok(GOOD_NOTE.to_string())]);
        let result = execute_synthesize(
            &model,
            &SynthesizeConfig::default(),
            "polished",
            "extracted",
        )
        .await
        .unwrap();

        assert_eq!(result.note.plan, SENTINEL);
        assert_eq!(result.metadata.state, StageState::Succeeded);
        assert_eq!(model.call_count(), 1);
    }

    #[tokio::test]
    async fn test_synthesize_strips_conversational_preamble() {
        let with_preamble = format!("Here is the note you asked for:\n\n{GOOD_NOTE}");
        let model = ScriptedModel::new(vec![Ok(with_preamble)]);
        let result = execute_synthesize(
            &model,
            &SynthesizeConfig::default(),
            "polished",
            "extracted",
        )
        .await
        .unwrap();
        assert!(result.note.hpi.starts_with("Three days"));
    }

    #[tokio::test]
    async fn test_malformed_output_reinvoked_once_then_ok() {
        let model = ScriptedModel::new(vec![
            Ok("I could not find any sections.".to_string()),
            Ok(GOOD_NOTE.to_string()),
        ]);
        let result = execute_synthesize(
            &model,
            &SynthesizeConfig::default(),
            "polished",
            "extracted",
        )
        .await
        .unwrap();

        assert_eq!(model.call_count(), 2);
        assert_eq!(result.metadata.attempts, 2);
        assert_eq!(result.note.assessment, "1. Abdominal pain");
    }

    #[tokio::test]
    async fn test_persistent_malformation_escalates_with_raw_output() {
        let bad = "HPI:\nx\n\nFindings:\nx\n\nAssessment:\nx"; // missing Plan
        let model = ScriptedModel::new(vec![Ok(bad.to_string()), Ok(bad.to_string())]);
        let (err, metadata) = execute_synthesize(
            &model,
            &SynthesizeConfig::default(),
            "polished",
            "extracted",
        )
        .await
        .unwrap_err();

        assert_eq!(model.call_count(), 2);
        assert_eq!(metadata.state, StageState::Failed);
        match err {
            PipelineError::MalformedSummary { raw_output, reason } => {
                assert_eq!(raw_output, bad);
                assert!(reason.contains("Plan:"));
            }
            other => panic!("expected MalformedSummary, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_extraction_fails_before_model_call() {
        let model = ScriptedModel::new(vec![]);
        let (err, _) = execute_synthesize(&model, &SynthesizeConfig::default(), "polished", " ")
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::EmptyInput { .. }));
        assert_eq!(model.call_count(), 0);
    }
}
