use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::PipelineError;
use crate::llm::{GenerationRequest, TextModel, build_polish_prompt, default_stop_sequences};
use crate::models::{PolishedTranscript, StageKind, StageMetadata};
use crate::stages::{begin_stage, fail_stage, finish_stage, generate_with_policy};

/// Configuration for the polish stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolishConfig {
    /// Model identity tuned for terminology correction.
    pub model: String,
    /// Optional larger model tried once when the primary stays unreachable.
    #[serde(default)]
    pub fallback_model: Option<String>,
    /// Near-deterministic sampling for verbatim fidelity.
    pub temperature: f64,
}

impl Default for PolishConfig {
    fn default() -> Self {
        Self {
            model: "llama3".to_string(),
            fallback_model: None,
            temperature: 0.1,
        }
    }
}

/// Result of the polish stage.
#[derive(Debug)]
pub struct PolishResult {
    pub transcript: PolishedTranscript,
    pub metadata: StageMetadata,
}

/// Output ceiling slightly above input length: polish output should never
/// be longer than its input barring minor corrections. Rough chars-per-token
/// estimate with headroom for expansion of abbreviations.
fn output_ceiling(input: &str) -> u32 {
    let estimated_tokens = (input.len() / 3).max(64);
    (estimated_tokens + estimated_tokens / 4) as u32
}

/// Execute stage 1: the LLM verbatim-correction pass.
///
/// The input has already been through the terminology pre-pass. A failure
/// here is surfaced as a failure — the raw transcript is never silently
/// substituted, because that would degrade accuracy without signaling it.
pub async fn execute_polish(
    model: &dyn TextModel,
    config: &PolishConfig,
    corrected_text: &str,
) -> std::result::Result<PolishResult, (PipelineError, StageMetadata)> {
    let started = Instant::now();
    let mut metadata = begin_stage(StageKind::Polish);

    if corrected_text.trim().is_empty() {
        fail_stage(&mut metadata, started);
        return Err((
            PipelineError::EmptyInput {
                stage: StageKind::Polish,
            },
            metadata,
        ));
    }

    let request = GenerationRequest {
        model: config.model.clone(),
        prompt: build_polish_prompt(corrected_text),
        temperature: config.temperature,
        max_tokens: Some(output_ceiling(corrected_text)),
        stop: default_stop_sequences(),
    };

    let polished = match generate_with_policy(
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

    finish_stage(&mut metadata, started);
    info!(
        model = metadata.model_used.as_deref().unwrap_or("?"),
        attempts = metadata.attempts,
        duration_ms = metadata.duration_ms,
        "Stage 1: polish complete"
    );

    let model_used = metadata
        .model_used
        .clone()
        .unwrap_or_else(|| config.model.clone());
    Ok(PolishResult {
        transcript: PolishedTranscript {
            corrected_text: corrected_text.to_string(),
            polished_text: polished,
            model_used,
        },
        metadata,
    })
}
