use std::path::Path;

use anyhow::{Context, Result};
use regex::{NoExpand, Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// One entry of the correction table as it appears in a rules file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleSpec {
    /// Regex pattern. Word boundaries are the author's responsibility;
    /// matching is always case-insensitive.
    pub pattern: String,
    /// Literal replacement text (no capture expansion).
    pub replacement: String,
}

/// A compiled correction rule.
#[derive(Debug, Clone)]
pub struct CorrectionRule {
    pattern: Regex,
    replacement: String,
}

impl CorrectionRule {
    pub fn new(pattern: &str, replacement: &str) -> Result<Self> {
        let compiled = RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .with_context(|| format!("invalid correction pattern: {pattern}"))?;
        Ok(Self {
            pattern: compiled,
            replacement: replacement.to_string(),
        })
    }
}

/// Deterministic terminology normalizer. Applies the ordered rule list
/// exactly once per document, each rule as a global case-insensitive
/// replacement. Read-only after construction and safe to share across
/// threads without locking.
#[derive(Debug, Clone)]
pub struct TermCorrector {
    rules: Vec<CorrectionRule>,
}

/// High-confidence lexical fixes for known misrecognitions. Ordered;
/// replacements are chosen so no rule re-triggers on the table's own output.
const DEFAULT_RULES: &[(&str, &str)] = &[
    // Common misrecognitions
    (r"\bwomiting\b", "vomiting"),
    (r"\bhematezia\b", "hematochezia"),
    (r"\bhematochesia\b", "hematochezia"),
    (r"\bcoloscopy\b", "colonoscopy"),
    (r"\bpankalitis\b", "pancolitis"),
    (r"\bpankal\s+it\s+is\b", "pancolitis"),
    (r"\bdiverticulitus\b", "diverticulitis"),
    (r"\bblind pain\b", "abdominal pain"),
    // Abbreviation casing
    (r"\bg[.\s-]?i\b", "GI"),
    (r"\bgerd\b", "GERD"),
    (r"\bppi\b", "PPI"),
    (r"\begd\b", "EGD"),
    (r"\bercp\b", "ERCP"),
    (r"\bmrcp\b", "MRCP"),
    // Diseases and eponyms
    (r"\bbarrett'?s\b", "Barrett's"),
    (r"\bcrohn'?s\b", "Crohn's"),
    (r"\bclostridioides difficile\b", "Clostridioides difficile"),
    // Infections
    (r"\bhep\s+c\b", "Hepatitis C"),
    (r"\bhep\s+b\b", "Hepatitis B"),
    (r"\bh\s+pylori\b", "H. pylori"),
    (r"\bc\s+diff\b", "C. diff"),
    // Brand-name casing
    (r"\bprotonix\b", "Protonix"),
    (r"\bmiralax\b", "MiraLAX"),
    (r"\bstelara\b", "Stelara"),
    (r"\bfibroscan\b", "FibroScan"),
    (r"\bgo\s+lyte?ly\b", "GoLYTELY"),
    (r"\bsuprep\b", "SuPrep"),
];

impl TermCorrector {
    pub fn new(rules: Vec<CorrectionRule>) -> Self {
        Self { rules }
    }

    /// Build the corrector from the built-in rule table.
    pub fn with_default_rules() -> Self {
        let rules = DEFAULT_RULES
            .iter()
            .map(|(pattern, replacement)| {
                CorrectionRule::new(pattern, replacement)
                    .unwrap_or_else(|e| panic!("built-in rule failed to compile: {e}"))
            })
            .collect();
        Self { rules }
    }

    /// Compile rules from `RuleSpec` entries (e.g. a parsed rules file).
    pub fn from_specs(specs: &[RuleSpec]) -> Result<Self> {
        let rules = specs
            .iter()
            .map(|spec| CorrectionRule::new(&spec.pattern, &spec.replacement))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    /// Load a JSON rules file: an array of `{pattern, replacement}` objects.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read rules file: {path:?}"))?;
        let specs: Vec<RuleSpec> =
            serde_json::from_str(&content).context("failed to parse rules file")?;
        debug!("Loaded {} correction rules from {:?}", specs.len(), path);
        Self::from_specs(&specs)
    }

    /// Apply every rule once, in list order, as a global replacement.
    /// Pure function: same input and rule table always yield the same
    /// output. Empty or unmatched input returns unchanged.
    pub fn correct(&self, text: &str) -> String {
        let mut result = text.to_string();
        for rule in &self.rules {
            if let std::borrow::Cow::Owned(replaced) =
                rule.pattern.replace_all(&result, NoExpand(&rule.replacement))
            {
                result = replaced;
            }
        }
        result
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scenario_womiting() {
        let corrector = TermCorrector::with_default_rules();
        assert_eq!(
            corrector.correct("Patient has womiting and pain"),
            "Patient has vomiting and pain"
        );
    }

    #[test]
    fn test_correction_is_deterministic() {
        let corrector = TermCorrector::with_default_rules();
        let input = "pt with gerd, womiting, hep c, needs egd and coloscopy";
        let first = corrector.correct(input);
        let second = corrector.correct(input);
        assert_eq!(first, second);
        assert_eq!(first, "pt with GERD, vomiting, Hepatitis C, needs EGD and colonoscopy");
    }

    #[test]
    fn test_correction_is_idempotent_over_default_table() {
        let corrector = TermCorrector::with_default_rules();
        let inputs = [
            "womiting with hematezia after go lytely prep",
            "barretts and crohns, on miralax and protonix",
            "hep b, h pylori, c diff, pankal it is",
            "g.i. follow-up for GERD",
        ];
        for input in inputs {
            let once = corrector.correct(input);
            let twice = corrector.correct(&once);
            assert_eq!(once, twice, "not idempotent for: {input}");
        }
    }

    #[test]
    fn test_empty_and_unmatched_input_unchanged() {
        let corrector = TermCorrector::with_default_rules();
        assert_eq!(corrector.correct(""), "");
        assert_eq!(
            corrector.correct("no medical terms here"),
            "no medical terms here"
        );
    }

    #[test]
    fn test_word_boundaries_respected() {
        let corrector = TermCorrector::with_default_rules();
        // "ppi" inside a longer word must not be rewritten.
        assert_eq!(corrector.correct("happiness"), "happiness");
        assert_eq!(corrector.correct("on a ppi daily"), "on a PPI daily");
    }

    #[test]
    fn test_rules_apply_in_list_order() {
        let specs = vec![
            RuleSpec {
                pattern: r"\bfoo\b".to_string(),
                replacement: "bar".to_string(),
            },
            RuleSpec {
                pattern: r"\bbar\b".to_string(),
                replacement: "baz".to_string(),
            },
        ];
        let corrector = TermCorrector::from_specs(&specs).unwrap();
        // First rule's output is visible to the second rule.
        assert_eq!(corrector.correct("foo"), "baz");
    }

    #[test]
    fn test_replacement_is_literal_not_expanded() {
        let specs = vec![RuleSpec {
            pattern: r"\bq10\b".to_string(),
            replacement: "$10 copay".to_string(),
        }];
        let corrector = TermCorrector::from_specs(&specs).unwrap();
        assert_eq!(corrector.correct("q10"), "$10 copay");
    }

    #[test]
    fn test_from_file_round_trip() {
        use std::io::Write;

        let specs = vec![RuleSpec {
            pattern: r"\bwomiting\b".to_string(),
            replacement: "vomiting".to_string(),
        }];
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", serde_json::to_string(&specs).unwrap()).unwrap();

        let corrector = TermCorrector::from_file(file.path()).unwrap();
        assert_eq!(corrector.rule_count(), 1);
        assert_eq!(corrector.correct("womiting"), "vomiting");
    }
}
