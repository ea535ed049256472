use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::models::SessionRecord;

/// Storage configuration: where sessions live and how long they are kept.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub root: PathBuf,
    pub retention_days: i64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("local_storage"),
            retention_days: 90,
        }
    }
}

/// The artifacts a session can own. Each is a single text file in the
/// session directory, owned exclusively by that session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    RawTranscript,
    PolishedTranscript,
    ExtractedEntities,
    ClinicalNote,
}

impl ArtifactKind {
    pub fn file_name(&self) -> &'static str {
        match self {
            ArtifactKind::RawTranscript => "raw_transcript.txt",
            ArtifactKind::PolishedTranscript => "polished_transcript.txt",
            ArtifactKind::ExtractedEntities => "extracted_entities.txt",
            ArtifactKind::ClinicalNote => "clinical_note.txt",
        }
    }
}

const METADATA_FILE: &str = "metadata.json";

/// Filesystem-backed session store. Owns artifact persistence and the
/// retention policy; the coordinator hands artifacts over as stages finish
/// so partial work survives a failed session.
pub struct SessionStore {
    config: StorageConfig,
    sessions_dir: PathBuf,
}

impl SessionStore {
    pub fn new(config: StorageConfig) -> Result<Self> {
        let sessions_dir = config.root.join("sessions");
        std::fs::create_dir_all(&sessions_dir)
            .with_context(|| format!("failed to create sessions directory: {sessions_dir:?}"))?;
        Ok(Self {
            config,
            sessions_dir,
        })
    }

    pub fn session_dir(&self, session_id: &str) -> PathBuf {
        self.sessions_dir.join(session_id)
    }

    /// Persist one artifact for a session, creating the session directory
    /// on first use.
    pub fn persist(&self, session_id: &str, kind: ArtifactKind, content: &str) -> Result<PathBuf> {
        let dir = self.session_dir(session_id);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create session directory: {dir:?}"))?;
        let path = dir.join(kind.file_name());
        std::fs::write(&path, content)
            .with_context(|| format!("failed to write artifact: {path:?}"))?;
        Ok(path)
    }

    /// Write the session's metadata envelope. Called once at the end of a
    /// session (whatever its terminal status) and overwrites any previous
    /// envelope.
    pub fn record_metadata(&self, record: &SessionRecord) -> Result<PathBuf> {
        let dir = self.session_dir(&record.session_id);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create session directory: {dir:?}"))?;
        let path = dir.join(METADATA_FILE);
        let file = std::fs::File::create(&path)
            .with_context(|| format!("failed to create metadata file: {path:?}"))?;
        serde_json::to_writer_pretty(file, record).context("failed to write session metadata")?;
        Ok(path)
    }

    pub fn load_metadata(&self, session_id: &str) -> Result<SessionRecord> {
        let path = self.session_dir(session_id).join(METADATA_FILE);
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read metadata: {path:?}"))?;
        serde_json::from_str(&content).context("failed to parse session metadata")
    }

    /// Delete sessions whose metadata is older than the retention window.
    /// Sessions without readable metadata are left alone rather than
    /// guessed at. Returns the number of sessions removed.
    pub fn purge_old_sessions(&self) -> Result<usize> {
        let cutoff = Utc::now() - Duration::days(self.config.retention_days);
        let mut removed = 0;

        for entry in std::fs::read_dir(&self.sessions_dir)
            .with_context(|| format!("failed to list sessions: {:?}", self.sessions_dir))?
        {
            let entry = entry?;
            if !entry.path().is_dir() {
                continue;
            }
            let session_id = entry.file_name().to_string_lossy().to_string();
            let record = match self.load_metadata(&session_id) {
                Ok(record) => record,
                Err(e) => {
                    warn!(%session_id, "Skipping session with unreadable metadata: {e:#}");
                    continue;
                }
            };
            if record.created_at < cutoff {
                std::fs::remove_dir_all(entry.path())
                    .with_context(|| format!("failed to remove session: {:?}", entry.path()))?;
                removed += 1;
            }
        }

        if removed > 0 {
            info!(removed, "Retention purge complete");
        }
        Ok(removed)
    }

    pub fn root(&self) -> &Path {
        &self.config.root
    }
}
