use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::llm::OllamaConfig;
use crate::stages::{ExtractConfig, PolishConfig, SynthesizeConfig};
use crate::storage::StorageConfig;

/// Correction rule table source. When no file is named, the built-in
/// table is used.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CorrectionsConfig {
    #[serde(default)]
    pub rules_file: Option<PathBuf>,
}

/// Whole-application configuration, loaded once at startup and read-only
/// afterwards. Every section has usable defaults so a missing file is not
/// an error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub llm: OllamaConfig,
    pub polish: PolishConfig,
    pub extract: ExtractConfig,
    pub synthesize: SynthesizeConfig,
    pub corrections: CorrectionsConfig,
    pub storage: StorageConfig,
}

impl AppConfig {
    /// Load from a JSON file; absent file yields defaults, unreadable or
    /// invalid content is an error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No config file at {:?}, using defaults", path);
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {path:?}"))?;
        serde_json::from_str(&content)
            .with_context(|| format!("failed to parse config file: {path:?}"))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self).context("failed to serialize config")?;
        std::fs::write(path, content)
            .with_context(|| format!("failed to write config file: {path:?}"))
    }
}
