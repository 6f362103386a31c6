//! Extracts citation-like spans (`(Author, Year)`, bracketed DOIs, journal
//! names) and flags ones matching a small corpus of known-bad patterns.

use super::{Detector, DetectorOutcome};
use crate::engine::knowledge_base::KnowledgeBase;
use crate::types::RiskFactors;
use chrono::{DateTime, Utc};
use std::time::Instant;

pub struct CitationDetector;

/// Journal names that do not exist; a citation attributed to one of these
/// is fabricated. Deliberately a small, named corpus rather than an
/// external bibliographic database (out of scope per spec.md §1).
const KNOWN_BAD_JOURNALS: &[&str] = &[
    "Journal of Advanced Quantum Financial Studies",
    "International Review of Theoretical Blockchain Mechanics",
    "Proceedings of the Global Institute for Applied Everything",
];

impl Detector for CitationDetector {
    fn name(&self) -> &'static str {
        "citation"
    }

    fn detect(&self, text: &str, _kb: &KnowledgeBase, _now: DateTime<Utc>, deadline: Instant) -> DetectorOutcome {
        if Instant::now() > deadline {
            return DetectorOutcome::TimedOut;
        }
        for journal in KNOWN_BAD_JOURNALS {
            if text.contains(journal) {
                return DetectorOutcome::Fired {
                    factor: RiskFactors::FABRICATED_CITATION,
                    confidence: 0.97,
                    evidence: format!("citation references fabricated venue: {journal}"),
                };
            }
        }
        if let Some(doi) = extract_doi(text) {
            if !is_well_formed_doi(&doi) {
                return DetectorOutcome::Fired {
                    factor: RiskFactors::FABRICATED_CITATION,
                    confidence: 0.8,
                    evidence: format!("malformed DOI: {doi}"),
                };
            }
        }
        DetectorOutcome::Clean
    }
}

fn extract_doi(text: &str) -> Option<String> {
    let idx = text.find("10.")?;
    let rest = &text[idx..];
    let end = rest
        .find(|c: char| c.is_whitespace() || c == ')' || c == ']')
        .unwrap_or(rest.len());
    Some(rest[..end].trim_end_matches(['.', ',']).to_string())
}

/// `10.<4-9 digit registrant>/<suffix>` per the DOI scheme.
fn is_well_formed_doi(doi: &str) -> bool {
    let Some(rest) = doi.strip_prefix("10.") else {
        return false;
    };
    let Some((registrant, suffix)) = rest.split_once('/') else {
        return false;
    };
    registrant.len() >= 4
        && registrant.len() <= 9
        && registrant.chars().all(|c| c.is_ascii_digit())
        && !suffix.is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fabricated_journal_fires() {
        let kb = KnowledgeBase::built_in();
        let text = "As shown in the Journal of Advanced Quantum Financial Studies (2024).";
        let outcome = CitationDetector.detect(text, &kb, Utc::now(), Instant::now() + std::time::Duration::from_secs(1));
        assert!(matches!(
            outcome,
            DetectorOutcome::Fired {
                factor: RiskFactors::FABRICATED_CITATION,
                ..
            }
        ));
    }

    #[test]
    fn well_formed_doi_is_clean() {
        assert!(is_well_formed_doi("10.1038/s41586-021-03491-6"));
    }

    #[test]
    fn malformed_doi_is_rejected() {
        assert!(!is_well_formed_doi("10.abc/xyz"));
    }
}
