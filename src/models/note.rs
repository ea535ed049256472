use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Literal emitted for a section with no supporting source material.
/// The anti-hallucination contract: absence is signalled, never invented.
pub const SENTINEL: &str = "Not documented";

/// Fixed section header vocabulary, in required order. The synthesis prompt
/// instructs the model to emit exactly these; the parser accepts nothing
/// else. The long HPI form is normalized to the short one.
pub const SECTION_HEADERS: [&str; 4] = ["HPI:", "Findings:", "Assessment:", "Plan:"];

const HPI_LONG_HEADER: &str = "HPI (History of Present Illness):";

/// Final structured note. Every section is either populated text or the
/// literal sentinel; no section is ever silently absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClinicalNote {
    pub hpi: String,
    pub findings: String,
    pub assessment: String,
    pub plan: String,
}

/// Parse failure for synthesis output. Mapped to `MalformedSummary` by the
/// synthesis stage, with the raw output attached there.
#[derive(Debug, Error, PartialEq)]
pub enum NoteParseError {
    #[error("missing section header '{0}'")]
    MissingHeader(&'static str),

    #[error("section headers out of order: '{0}' appeared before '{1}'")]
    HeadersOutOfOrder(&'static str, &'static str),

    #[error("section '{0}' has no content")]
    EmptySection(&'static str),
}

impl ClinicalNote {
    /// Strict parser over synthesis output.
    ///
    /// Requires all four headers at the start of a line, in fixed order.
    /// Text between consecutive headers becomes the earlier section's
    /// content. A header with no content fails: the prompt requires the
    /// sentinel when material is absent, so an empty body means the model
    /// broke the contract.
    pub fn parse(text: &str) -> Result<ClinicalNote, NoteParseError> {
        let normalized = text.replace(HPI_LONG_HEADER, SECTION_HEADERS[0]);
        let lines: Vec<&str> = normalized.lines().collect();

        // Locate each header line, enforcing order as we go.
        let mut header_lines: Vec<usize> = Vec::with_capacity(SECTION_HEADERS.len());
        let mut search_from = 0usize;
        for (i, header) in SECTION_HEADERS.iter().enumerate() {
            let found = lines
                .iter()
                .enumerate()
                .skip(search_from)
                .find(|(_, line)| line.trim_start().starts_with(header));
            match found {
                Some((line_no, _)) => {
                    header_lines.push(line_no);
                    search_from = line_no + 1;
                }
                None => {
                    // Distinguish "absent" from "present but out of order".
                    let appears_earlier = lines
                        .iter()
                        .take(search_from)
                        .any(|line| line.trim_start().starts_with(header));
                    if appears_earlier && i > 0 {
                        return Err(NoteParseError::HeadersOutOfOrder(
                            header,
                            SECTION_HEADERS[i - 1],
                        ));
                    }
                    return Err(NoteParseError::MissingHeader(header));
                }
            }
        }

        let mut sections: Vec<String> = Vec::with_capacity(SECTION_HEADERS.len());
        for (i, &start) in header_lines.iter().enumerate() {
            let end = header_lines.get(i + 1).copied().unwrap_or(lines.len());

            // Inline content on the header line itself, then following lines.
            let header = SECTION_HEADERS[i];
            let first = lines[start].trim_start();
            let inline = first[header.len()..].trim();

            let mut body = String::new();
            if !inline.is_empty() {
                body.push_str(inline);
            }
            for line in &lines[start + 1..end] {
                if !body.is_empty() {
                    body.push('\n');
                }
                body.push_str(line);
            }
            let body = body.trim().to_string();
            if body.is_empty() {
                return Err(NoteParseError::EmptySection(header));
            }
            sections.push(body);
        }

        let mut iter = sections.into_iter();
        Ok(ClinicalNote {
            hpi: iter.next().unwrap_or_default(),
            findings: iter.next().unwrap_or_default(),
            assessment: iter.next().unwrap_or_default(),
            plan: iter.next().unwrap_or_default(),
        })
    }

    /// Render the note back to canonical text with the fixed headers.
    pub fn render(&self) -> String {
        format!(
            "HPI:\n{}\n\nFindings:\n{}\n\nAssessment:\n{}\n\nPlan:\n{}",
            self.hpi, self.findings, self.assessment, self.plan
        )
    }

    /// Split a populated Assessment into its numbered problems ("1.", "2.").
    /// A sentinel Assessment yields no problems.
    pub fn assessment_problems(&self) -> Vec<String> {
        if self.assessment == SENTINEL {
            return Vec::new();
        }

        let mut problems: Vec<String> = Vec::new();
        for line in self.assessment.lines() {
            let trimmed = line.trim();
            if is_numbered_entry(trimmed) {
                problems.push(trimmed.to_string());
            } else if let Some(last) = problems.last_mut() {
                // Continuation line of the previous problem.
                if !trimmed.is_empty() {
                    last.push(' ');
                    last.push_str(trimmed);
                }
            }
        }

        if problems.is_empty() && !self.assessment.trim().is_empty() {
            // Single unnumbered problem.
            problems.push(self.assessment.trim().to_string());
        }
        problems
    }

    /// Whether a section carries real content rather than the sentinel.
    pub fn is_documented(section: &str) -> bool {
        section.trim() != SENTINEL
    }
}

fn is_numbered_entry(line: &str) -> bool {
    let mut saw_digit = false;
    for c in line.chars() {
        if c.is_ascii_digit() {
            saw_digit = true;
        } else {
            return saw_digit && c == '.';
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    const WELL_FORMED: &str = "HPI:\n\
        Three days of crampy abdominal pain, postprandial.\n\
        \n\
        Findings:\n\
        - No hematochezia\n\
        \n\
        Assessment:\n\
        1. Ulcerative colitis, mild activity\n\
        2. Abdominal pain, likely inflammatory\n\
        \n\
        Plan:\n\
        - Continue mesalamine 800mg BID";

    #[test]
    fn test_parse_well_formed_note() {
        let note = ClinicalNote::parse(WELL_FORMED).unwrap();
        assert!(note.hpi.starts_with("Three days"));
        assert_eq!(note.findings, "- No hematochezia");
        assert!(note.assessment.starts_with("1."));
        assert_eq!(note.plan, "- Continue mesalamine 800mg BID");
    }

    #[test]
    fn test_parse_accepts_long_hpi_header() {
        let text = WELL_FORMED.replace("HPI:", "HPI (History of Present Illness):");
        let note = ClinicalNote::parse(&text).unwrap();
        assert!(note.hpi.starts_with("Three days"));
    }

    #[test]
    fn test_parse_rejects_missing_plan() {
        let text = "HPI:\nx\n\nFindings:\nx\n\nAssessment:\nx";
        let err = ClinicalNote::parse(text).unwrap_err();
        assert_eq!(err, NoteParseError::MissingHeader("Plan:"));
    }

    #[test]
    fn test_parse_rejects_header_variant() {
        let text = "HPI:\nx\n\nFindings:\nx\n\nAssessment/Diagnosis:\nx\n\nPlan:\nx";
        let err = ClinicalNote::parse(text).unwrap_err();
        assert_eq!(err, NoteParseError::MissingHeader("Assessment:"));
    }

    #[test]
    fn test_parse_rejects_out_of_order_headers() {
        let text = "HPI:\nx\n\nAssessment:\nx\n\nFindings:\nx\n\nPlan:\nx";
        let err = ClinicalNote::parse(text).unwrap_err();
        // Findings matches later in the text, leaving Assessment stranded
        // before the order cursor.
        assert_eq!(
            err,
            NoteParseError::HeadersOutOfOrder("Assessment:", "Findings:")
        );
    }

    #[test]
    fn test_parse_rejects_empty_section() {
        let text = "HPI:\nx\n\nFindings:\n\nAssessment:\nx\n\nPlan:\nx";
        let err = ClinicalNote::parse(text).unwrap_err();
        assert_eq!(err, NoteParseError::EmptySection("Findings:"));
    }

    #[test]
    fn test_sentinel_survives_round_trip_byte_for_byte() {
        let text = format!(
            "HPI:\nFollow-up for GERD.\n\nFindings:\nWell controlled.\n\nAssessment:\n1. GERD, controlled\n\nPlan:\n{SENTINEL}"
        );
        let note = ClinicalNote::parse(&text).unwrap();
        assert_eq!(note.plan, SENTINEL);

        let reparsed = ClinicalNote::parse(&note.render()).unwrap();
        assert_eq!(reparsed.plan, SENTINEL);
    }

    #[test]
    fn test_assessment_problems_numbered() {
        let note = ClinicalNote::parse(WELL_FORMED).unwrap();
        let problems = note.assessment_problems();
        assert_eq!(problems.len(), 2);
        assert!(problems[0].contains("Ulcerative colitis"));
        assert!(problems[1].contains("Abdominal pain"));
    }

    #[test]
    fn test_assessment_problems_sentinel_is_empty() {
        let note = ClinicalNote {
            hpi: "x".to_string(),
            findings: "x".to_string(),
            assessment: SENTINEL.to_string(),
            plan: "x".to_string(),
        };
        assert!(note.assessment_problems().is_empty());
    }

    #[test]
    fn test_inline_header_content() {
        let text = "HPI: brief history\nFindings: none noted\nAssessment: 1. GERD\nPlan: continue PPI";
        let note = ClinicalNote::parse(text).unwrap();
        assert_eq!(note.hpi, "brief history");
        assert_eq!(note.plan, "continue PPI");
    }
}
