use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::PipelineError;
use crate::llm::{GenerationRequest, TextModel, build_extraction_prompt, default_stop_sequences};
use crate::models::{ExtractedEntities, StageKind, StageMetadata};
use crate::stages::{begin_stage, fail_stage, finish_stage, generate_with_policy};

/// Configuration for the extraction pass (Pass 1 of the summarizer).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
    /// Model identity tuned for summarization.
    pub model: String,
    #[serde(default)]
    pub fallback_model: Option<String>,
    pub temperature: f64,
    pub max_tokens: u32,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            model: "medllama2".to_string(),
            fallback_model: None,
            temperature: 0.1,
            max_tokens: 800,
        }
    }
}

/// Result of the extraction pass.
#[derive(Debug)]
pub struct ExtractResult {
    pub entities: ExtractedEntities,
    pub metadata: StageMetadata,
}

/// Execute stage 2: clinical entity extraction (Pass 1).
///
/// Output is an intermediate artifact with prompt-level structure only; no
/// schema is validated here. Splitting extraction from synthesis forces the
/// model to commit to a factual inventory before formatting it.
pub async fn execute_extract(
    model: &dyn TextModel,
    config: &ExtractConfig,
    polished_text: &str,
) -> std::result::Result<ExtractResult, (PipelineError, StageMetadata)> {
    let started = Instant::now();
    let mut metadata = begin_stage(StageKind::Extract);

    if polished_text.trim().is_empty() {
        fail_stage(&mut metadata, started);
        return Err((
            PipelineError::EmptyInput {
                stage: StageKind::Extract,
            },
            metadata,
        ));
    }

    let request = GenerationRequest {
        model: config.model.clone(),
        prompt: build_extraction_prompt(polished_text),
        temperature: config.temperature,
        max_tokens: Some(config.max_tokens),
        stop: default_stop_sequences(),
    };

    let extracted = match generate_with_policy(
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
        extracted_chars = extracted.len(),
        "Stage 2: extraction complete"
    );

    let model_used = metadata
        .model_used
        .clone()
        .unwrap_or_else(|| config.model.clone());
    Ok(ExtractResult {
        entities: ExtractedEntities {
            text: extracted,
            model_used,
        },
        metadata,
    })
}
