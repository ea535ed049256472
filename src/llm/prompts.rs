use crate::models::{SECTION_HEADERS, SENTINEL};

/// Clinical vocabulary supplied as a hint list to the extraction prompt.
/// Keeps the model anchored to real terminology instead of phonetic guesses.
pub const TERMINOLOGY_HINTS: &[&str] = &[
    "pancolitis",
    "Crohn's disease",
    "ulcerative colitis",
    "Barrett's esophagus",
    "GERD",
    "vedolizumab",
    "ustekinumab",
    "adalimumab",
    "infliximab",
    "mesalamine",
    "azathioprine",
    "budesonide",
    "calprotectin",
    "ferritin",
    "FibroScan",
    "ERCP",
    "MRCP",
    "EGD",
    "colonoscopy",
    "esophagogastroduodenoscopy",
    "polypectomy",
    "biopsy",
    "diverticulitis",
    "gastroparesis",
    "pancreatitis",
    "cirrhosis",
    "hepatitis",
    "dysphagia",
    "odynophagia",
    "hematochezia",
    "melena",
    "tenesmus",
    "steatorrhea",
    "abdominal pain",
    "epigastric",
    "right lower quadrant",
    "omeprazole",
    "pantoprazole",
    "famotidine",
    "rifaximin",
];

/// Comma-separated hint string for prompt interpolation.
pub fn terminology_hint(max_terms: usize) -> String {
    let terms: Vec<&str> = TERMINOLOGY_HINTS.iter().take(max_terms).copied().collect();
    if terms.is_empty() {
        "medical terminology".to_string()
    } else {
        terms.join(", ")
    }
}

/// Build the verbatim-correction prompt for the polish pass.
///
/// The rules are the fidelity contract: the model may fix misspelled
/// medical terms and severe grammatical breaks, and nothing else. Speaker
/// turns and disfluencies must survive unchanged.
pub fn build_polish_prompt(corrected_transcript: &str) -> String {
    let mut prompt = String::new();

    prompt.push_str(
        "You are a medical transcription editor. Clean up the dictation transcript below.\n\n\
         RULES:\n\
         1. Fix ONLY misspelled medical terminology and severe grammatical breaks.\n\
         2. Preserve disfluencies (\"um\", \"uh\") exactly as spoken.\n\
         3. Preserve every speaker label and turn boundary.\n\
         4. Do NOT add, remove, or reorder any clinical content.\n\
         5. Do NOT summarize. Output the full transcript, line for line.\n\n\
         Example:\n\
         Input:  [00:04] SPEAKER_01: It horts in my, uh, bellie button area.\n\
         Output: [00:04] SPEAKER_01: It hurts in my, uh, belly button area.\n\n",
    );
    prompt.push_str("Transcript:\n");
    prompt.push_str(corrected_transcript);
    prompt.push_str("\n\nPolished transcript:\n");

    prompt
}

/// Build the Pass 1 extraction prompt.
///
/// Asks for a plain-text inventory of the clinical entities actually
/// present. Inference beyond the stated material is explicitly forbidden;
/// missing categories are marked "Not mentioned" rather than filled in.
pub fn build_extraction_prompt(polished_transcript: &str) -> String {
    let mut prompt = String::new();

    prompt.push_str(
        "You are a medical information extractor. List the clinical entities present in the \
         transcript below as plain structured text.\n\n\
         Enumerate, each under its own heading:\n\
         - Chief complaint\n\
         - Symptom timeline\n\
         - Associated symptoms\n\
         - Medications\n\
         - Relevant history\n\
         - Exam or procedure findings, if mentioned\n\
         - Planned tests, procedures, or referrals mentioned by the clinician\n\n\
         RULES:\n\
         1. Extract only what is explicitly stated. Do NOT infer.\n\
         2. Translate patient phrasing to medical terms (e.g. \"bloody stools\" -> \"hematochezia\").\n\
         3. Write \"Not mentioned\" for any category with no material.\n\n",
    );
    prompt.push_str(&format!("Terminology hints: {}\n\n", terminology_hint(40)));
    prompt.push_str("Transcript:\n");
    prompt.push_str(polished_transcript);
    prompt.push_str("\n\nExtracted information:\n");

    prompt
}

/// Build the Pass 2 synthesis prompt.
///
/// Supplies both the polished transcript and the Pass 1 inventory, and pins
/// the output to the exact four-header vocabulary the parser accepts. The
/// sentinel instruction is the anti-hallucination contract.
pub fn build_synthesis_prompt(polished_transcript: &str, extracted_entities: &str) -> String {
    let mut prompt = String::new();

    prompt.push_str(
        "You are a clinical note formatter. Produce a structured note from the extracted facts \
         and transcript below.\n\n",
    );
    prompt.push_str("Output exactly four sections, in this order, each header on its own line:\n");
    for header in SECTION_HEADERS {
        prompt.push_str(&format!("{header}\n"));
    }
    prompt.push_str(&format!(
        "\nRULES:\n\
         1. Use ONLY information present in the extracted facts and transcript.\n\
         2. If a section has no supporting material, write exactly \"{SENTINEL}\" as its entire \
         content. Never invent content.\n\
         3. Number distinct problems in Assessment (1., 2., ...) and state severity or disease \
         activity when it can be derived from the material.\n\
         4. Use the exact headers shown above. No other sections, no markdown, no commentary \
         before or after the note.\n\n",
    ));
    prompt.push_str("Extracted facts:\n");
    prompt.push_str(extracted_entities);
    prompt.push_str("\n\nTranscript:\n");
    prompt.push_str(polished_transcript);
    prompt.push_str("\n\nClinical note:\n");

    prompt
}

/// Stop sequences that keep instruction-tuned models from continuing past
/// the answer into a fabricated next turn.
pub fn default_stop_sequences() -> Vec<String> {
    vec![
        "### Instruction:".to_string(),
        "### User:".to_string(),
        "User:".to_string(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_polish_prompt_contains_transcript_verbatim() {
        let transcript = "[00:01] SPEAKER_00: tell me about the pain";
        let prompt = build_polish_prompt(transcript);
        assert!(prompt.contains(transcript));
        assert!(prompt.contains("disfluencies"));
    }

    #[test]
    fn test_extraction_prompt_forbids_inference() {
        let prompt = build_extraction_prompt("some transcript");
        assert!(prompt.contains("Do NOT infer"));
        assert!(prompt.contains("Not mentioned"));
        assert!(prompt.contains("hematochezia"));
    }

    #[test]
    fn test_synthesis_prompt_names_all_headers_and_sentinel() {
        let prompt = build_synthesis_prompt("transcript", "facts");
        for header in SECTION_HEADERS {
            assert!(prompt.contains(header), "missing {header}");
        }
        assert!(prompt.contains(SENTINEL));
        assert!(prompt.contains("facts"));
    }

    #[test]
    fn test_terminology_hint_respects_limit() {
        let hint = terminology_hint(3);
        assert_eq!(hint.split(", ").count(), 3);
    }
}
