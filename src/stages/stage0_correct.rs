use std::time::Instant;

use tracing::info;

use crate::corrector::TermCorrector;
use crate::models::{StageKind, StageMetadata};
use crate::stages::{begin_stage, finish_stage};

/// Result of the terminology correction stage.
#[derive(Debug)]
pub struct CorrectResult {
    /// Corrected transcript text, handed to the polish stage.
    pub corrected: String,
    pub metadata: StageMetadata,
}

/// Execute stage 0: deterministic terminology correction.
///
/// Pure lexical pre-pass over the raw transcript. Never blocks, never
/// fails; the stage exists so that high-confidence fixes for known terms
/// do not depend on model sampling variance.
pub fn execute_correct(corrector: &TermCorrector, raw_text: &str) -> CorrectResult {
    let started = Instant::now();
    let mut metadata = begin_stage(StageKind::Correct);
    metadata.attempts = 1;

    let corrected = corrector.correct(raw_text);
    let changed = corrected != raw_text;
    finish_stage(&mut metadata, started);

    info!(
        rules = corrector.rule_count(),
        changed,
        duration_ms = metadata.duration_ms,
        "Stage 0: terminology correction complete"
    );

    CorrectResult {
        corrected,
        metadata,
    }
}
