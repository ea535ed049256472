pub mod config;
pub mod corrector;
pub mod error;
pub mod llm;
pub mod models;
pub mod pipeline;
pub mod stages;
pub mod storage;

pub use config::AppConfig;
pub use corrector::{CorrectionRule, RuleSpec, TermCorrector};
pub use error::{PipelineError, Result};
pub use llm::{GenerationRequest, OllamaClient, OllamaConfig, TextModel};
pub use models::{
    ClinicalNote, ExtractedEntities, PolishedTranscript, RawTranscript, SENTINEL, SessionRecord,
    SessionStatus, StageKind, StageMetadata, StageState,
};
pub use pipeline::{CancelToken, Pipeline, PipelineFailure, PipelineSuccess};
pub use stages::{
    ExtractConfig, PolishConfig, SynthesizeConfig, execute_correct, execute_extract,
    execute_polish, execute_synthesize,
};
pub use storage::{ArtifactKind, SessionStore, StorageConfig};
