use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The four pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    /// Deterministic terminology correction (no model call).
    Correct,
    /// LLM verbatim-correction pass.
    Polish,
    /// Pass 1: clinical entity extraction.
    Extract,
    /// Pass 2: synthesis into the four-section note.
    Synthesize,
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            StageKind::Correct => "correct",
            StageKind::Polish => "polish",
            StageKind::Extract => "extract",
            StageKind::Synthesize => "synthesize",
        };
        write!(f, "{name}")
    }
}

/// Explicit per-stage state machine. Makes the single-retry contract
/// auditable without reconstructing it from nested error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageState {
    NotStarted,
    InFlight,
    /// First attempt failed with a retryable condition; one more attempt
    /// is permitted.
    RetryPending,
    Succeeded,
    Failed,
    /// Never started because an earlier stage failed or the session was
    /// cancelled.
    Skipped,
}

/// Timing and model-identity record for one stage of one session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageMetadata {
    pub stage: StageKind,
    pub state: StageState,
    /// Model identifier, if the stage invoked one. The correction stage
    /// never does.
    pub model_used: Option<String>,
    pub duration_ms: u64,
    /// Number of model invocations made (1 normally, 2 after a retry).
    pub attempts: u32,
}

impl StageMetadata {
    pub fn skipped(stage: StageKind) -> Self {
        Self {
            stage,
            state: StageState::Skipped,
            model_used: None,
            duration_ms: 0,
            attempts: 0,
        }
    }
}

/// Terminal status of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Completed,
    Failed,
    Cancelled,
}

/// Metadata envelope persisted alongside a session's artifacts.
/// Artifacts are appended as stages complete; the record itself is deleted
/// only by the retention policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: String,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub stages: Vec<StageMetadata>,
    /// Relative artifact file names present in the session directory.
    pub artifacts: Vec<String>,
    /// Failure description when status is `failed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl SessionRecord {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            status: SessionStatus::Failed,
            created_at: Utc::now(),
            stages: Vec::new(),
            artifacts: Vec::new(),
            failure: None,
        }
    }

    /// Models used across all stages, deduplicated, in stage order.
    pub fn models_used(&self) -> Vec<String> {
        let mut models = Vec::new();
        for stage in &self.stages {
            if let Some(model) = &stage.model_used {
                if !models.contains(model) {
                    models.push(model.clone());
                }
            }
        }
        models
    }

    /// A session is complete only when every stage succeeded in sequence.
    pub fn all_stages_succeeded(&self) -> bool {
        self.stages.len() == 4 && self.stages.iter().all(|s| s.state == StageState::Succeeded)
    }
}
