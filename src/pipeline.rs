use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::corrector::TermCorrector;
use crate::error::PipelineError;
use crate::llm::TextModel;
use crate::models::{
    ClinicalNote, RawTranscript, SessionRecord, SessionStatus, StageKind, StageMetadata,
};
use crate::stages::{
    ExtractConfig, PolishConfig, SynthesizeConfig, execute_correct, execute_extract,
    execute_polish, execute_synthesize,
};
use crate::storage::{ArtifactKind, SessionStore};

/// Cooperative cancellation flag, checked between stages. Mid-call
/// cancellation of a model invocation is not guaranteed by the service,
/// so an in-flight stage always runs to completion.
#[derive(Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Successful pipeline run: the note plus the full session record.
#[derive(Debug)]
pub struct PipelineSuccess {
    pub session_id: String,
    pub note: ClinicalNote,
    pub record: SessionRecord,
}

/// Failed or cancelled run. Carries whatever stage metadata was collected;
/// artifacts produced before the failure are already persisted.
#[derive(Debug)]
pub struct PipelineFailure {
    pub session_id: String,
    pub error: PipelineError,
    pub record: SessionRecord,
}

/// Sequences correct → polish → extract → synthesize for one dictation.
///
/// The model service is a single local process with its own internal
/// queuing; an async mutex serializes this coordinator's in-flight calls so
/// two sessions never interleave prompts through one connection. The rule
/// table is read-only and shared without locking.
pub struct Pipeline {
    corrector: TermCorrector,
    model: Arc<dyn TextModel>,
    model_lock: Mutex<()>,
    polish_config: PolishConfig,
    extract_config: ExtractConfig,
    synthesize_config: SynthesizeConfig,
    store: SessionStore,
}

impl Pipeline {
    pub fn new(
        corrector: TermCorrector,
        model: Arc<dyn TextModel>,
        config: &AppConfig,
        store: SessionStore,
    ) -> Self {
        Self {
            corrector,
            model,
            model_lock: Mutex::new(()),
            polish_config: config.polish.clone(),
            extract_config: config.extract.clone(),
            synthesize_config: config.synthesize.clone(),
            store,
        }
    }

    /// Run the full pipeline for one raw transcript.
    ///
    /// Any stage failure aborts the remaining stages; artifacts already
    /// produced stay persisted so no work is silently discarded. A session
    /// record is written in every terminal state.
    pub async fn run(
        &self,
        raw: &RawTranscript,
        cancel: &CancelToken,
    ) -> Result<PipelineSuccess, PipelineFailure> {
        let session_id = Uuid::new_v4().to_string();
        let mut record = SessionRecord::new(session_id.clone());
        info!(%session_id, "Pipeline started");

        if let Err(e) = self.persist(&mut record, ArtifactKind::RawTranscript, &raw.text) {
            return Err(self.finalize_failure(record, e));
        }

        // Stage 0: terminology correction. Pure, never blocks.
        if cancel.is_cancelled() {
            return Err(self.cancelled(record, StageKind::Correct));
        }
        let corrected = execute_correct(&self.corrector, &raw.text);
        record.stages.push(corrected.metadata.clone());

        // Stage 1: polish.
        if cancel.is_cancelled() {
            return Err(self.cancelled(record, StageKind::Polish));
        }
        let polished = {
            let _guard = self.model_lock.lock().await;
            execute_polish(self.model.as_ref(), &self.polish_config, &corrected.corrected).await
        };
        let polished = match polished {
            Ok(result) => {
                record.stages.push(result.metadata.clone());
                result.transcript
            }
            Err((error, metadata)) => {
                record.stages.push(metadata);
                return Err(self.aborted(record, StageKind::Polish, error));
            }
        };
        if let Err(e) = self.persist(
            &mut record,
            ArtifactKind::PolishedTranscript,
            &polished.polished_text,
        ) {
            return Err(self.finalize_failure(record, e));
        }

        // Stage 2: extraction (Pass 1).
        if cancel.is_cancelled() {
            return Err(self.cancelled(record, StageKind::Extract));
        }
        let extracted = {
            let _guard = self.model_lock.lock().await;
            execute_extract(
                self.model.as_ref(),
                &self.extract_config,
                &polished.polished_text,
            )
            .await
        };
        let extracted = match extracted {
            Ok(result) => {
                record.stages.push(result.metadata.clone());
                result.entities
            }
            Err((error, metadata)) => {
                record.stages.push(metadata);
                return Err(self.aborted(record, StageKind::Extract, error));
            }
        };
        if let Err(e) = self.persist(&mut record, ArtifactKind::ExtractedEntities, &extracted.text)
        {
            return Err(self.finalize_failure(record, e));
        }

        // Stage 3: synthesis (Pass 2).
        if cancel.is_cancelled() {
            return Err(self.cancelled(record, StageKind::Synthesize));
        }
        let synthesized = {
            let _guard = self.model_lock.lock().await;
            execute_synthesize(
                self.model.as_ref(),
                &self.synthesize_config,
                &polished.polished_text,
                &extracted.text,
            )
            .await
        };
        let note = match synthesized {
            Ok(result) => {
                record.stages.push(result.metadata.clone());
                result.note
            }
            Err((error, metadata)) => {
                record.stages.push(metadata);
                return Err(self.aborted(record, StageKind::Synthesize, error));
            }
        };
        if let Err(e) = self.persist(&mut record, ArtifactKind::ClinicalNote, &note.render()) {
            return Err(self.finalize_failure(record, e));
        }

        record.status = SessionStatus::Completed;
        if let Err(e) = self.store.record_metadata(&record) {
            return Err(self.finalize_failure(record, PipelineError::Other(e)));
        }
        info!(%session_id, "Pipeline completed");
        Ok(PipelineSuccess {
            session_id,
            note,
            record,
        })
    }

    fn persist(
        &self,
        record: &mut SessionRecord,
        kind: ArtifactKind,
        content: &str,
    ) -> Result<(), PipelineError> {
        self.store
            .persist(&record.session_id, kind, content)
            .map_err(PipelineError::Other)?;
        record.artifacts.push(kind.file_name().to_string());
        Ok(())
    }

    /// Mark remaining stages skipped, record the cancellation, and write
    /// the session record. No ClinicalNote exists for a cancelled session.
    fn cancelled(&self, mut record: SessionRecord, next_stage: StageKind) -> PipelineFailure {
        warn!(
            session_id = %record.session_id,
            next_stage = %next_stage,
            "Session cancelled before next stage"
        );
        push_skipped_from(&mut record, next_stage);
        record.status = SessionStatus::Cancelled;
        self.finalize(record, PipelineError::Cancelled)
    }

    /// A stage escalated a failure: skip the rest and finalize.
    fn aborted(
        &self,
        mut record: SessionRecord,
        failed_stage: StageKind,
        error: PipelineError,
    ) -> PipelineFailure {
        warn!(
            session_id = %record.session_id,
            stage = %failed_stage,
            error = %error,
            "Stage failed, aborting remaining pipeline"
        );
        if let Some(next) = next_stage(failed_stage) {
            push_skipped_from(&mut record, next);
        }
        record.status = SessionStatus::Failed;
        self.finalize(record, error)
    }

    fn finalize_failure(&self, mut record: SessionRecord, error: PipelineError) -> PipelineFailure {
        record.status = SessionStatus::Failed;
        self.finalize(record, error)
    }

    fn finalize(&self, mut record: SessionRecord, error: PipelineError) -> PipelineFailure {
        if !matches!(error, PipelineError::Cancelled) {
            record.failure = Some(error.to_string());
        }
        if let Err(e) = self.store.record_metadata(&record) {
            warn!(
                session_id = %record.session_id,
                "Failed to write session record: {e:#}"
            );
        }
        PipelineFailure {
            session_id: record.session_id.clone(),
            error,
            record,
        }
    }
}

/// Stage following `stage` in execution order.
fn next_stage(stage: StageKind) -> Option<StageKind> {
    match stage {
        StageKind::Correct => Some(StageKind::Polish),
        StageKind::Polish => Some(StageKind::Extract),
        StageKind::Extract => Some(StageKind::Synthesize),
        StageKind::Synthesize => None,
    }
}

/// Append Skipped records for `from` and every stage after it.
fn push_skipped_from(record: &mut SessionRecord, from: StageKind) {
    let mut stage = Some(from);
    while let Some(current) = stage {
        record.stages.push(StageMetadata::skipped(current));
        stage = next_stage(current);
    }
}
