use serde::{Deserialize, Serialize};

/// Raw ASR output for one recording. Immutable once created; the pipeline
/// derives everything else from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawTranscript {
    /// Plain transcript text, optionally with `[mm:ss] SPEAKER_NN:` lines
    /// interleaved by the upstream diarizer.
    pub text: String,
}

impl RawTranscript {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// Whether the upstream ASR already attached speaker labels.
    pub fn has_speaker_labels(&self) -> bool {
        self.text.contains("SPEAKER_")
            || self.text.contains("Doctor:")
            || self.text.contains("Patient:")
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Transcript after the terminology pre-pass and the LLM verbatim-correction
/// pass. Sentence count and speaker turns are preserved by prompt contract,
/// not mechanically verified.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolishedTranscript {
    /// Corrected text that was sent to the model (terminology pre-pass only).
    pub corrected_text: String,
    /// Model output after the verbatim-correction pass.
    pub polished_text: String,
    /// Identifier of the model that produced the polish.
    pub model_used: String,
}

/// Pass 1 output: a plain-text inventory of clinical entities. Intermediate
/// artifact only, never a contract surface; no schema is validated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedEntities {
    pub text: String,
    pub model_used: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_speaker_label_detection() {
        let diarized = RawTranscript::new("[00:01] SPEAKER_00: tell me about the pain");
        assert!(diarized.has_speaker_labels());

        let plain = RawTranscript::new("patient reports three days of abdominal pain");
        assert!(!plain.has_speaker_labels());
    }

    #[test]
    fn test_empty_detection() {
        assert!(RawTranscript::new("   \n ").is_empty());
        assert!(!RawTranscript::new("text").is_empty());
    }
}
