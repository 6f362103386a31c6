//! Intra-response logical contradiction detection via a small rule set:
//! flags a direct assertion followed later by its explicit negation about
//! the same subject.

use super::{Detector, DetectorOutcome};
use crate::engine::knowledge_base::KnowledgeBase;
use crate::types::RiskFactors;
use chrono::{DateTime, Utc};
use std::time::Instant;

pub struct ContradictionDetector;

impl Detector for ContradictionDetector {
    fn name(&self) -> &'static str {
        "contradiction"
    }

    fn detect(&self, text: &str, _kb: &KnowledgeBase, _now: DateTime<Utc>, deadline: Instant) -> DetectorOutcome {
        let sentences: Vec<&str> = text
            .split(|c| c == '.' || c == '\n')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();

        for i in 0..sentences.len() {
            if Instant::now() > deadline {
                return DetectorOutcome::TimedOut;
            }
            for j in (i + 1)..sentences.len() {
                if let Some(subject) = contradicts(sentences[i], sentences[j]) {
                    return DetectorOutcome::Fired {
                        factor: RiskFactors::FACTUAL_CONTRADICTION,
                        confidence: 0.75,
                        evidence: format!(
                            "contradictory assertions about '{subject}': \"{}\" vs \"{}\"",
                            sentences[i], sentences[j]
                        ),
                    };
                }
            }
        }
        DetectorOutcome::Clean
    }
}

/// Rule: `"X is Y"` followed later by `"X is not Y"` (or vice versa) about
/// the same subject `X` contradicts. Returns the subject when it does.
fn contradicts<'a>(a: &'a str, b: &'a str) -> Option<&'a str> {
    let (subj_a, pred_a, negated_a) = split_is_clause(a)?;
    let (subj_b, pred_b, negated_b) = split_is_clause(b)?;
    if subj_a.eq_ignore_ascii_case(subj_b) && pred_a.eq_ignore_ascii_case(pred_b) && negated_a != negated_b {
        Some(subj_a)
    } else {
        None
    }
}

fn split_is_clause(sentence: &str) -> Option<(&str, &str, bool)> {
    let lower = sentence.to_ascii_lowercase();
    if let Some(idx) = lower.find(" is not ") {
        return Some((sentence[..idx].trim(), sentence[idx + 8..].trim(), true));
    }
    if let Some(idx) = lower.find(" isn't ") {
        return Some((sentence[..idx].trim(), sentence[idx + 7..].trim(), true));
    }
    if let Some(idx) = lower.find(" is ") {
        return Some((sentence[..idx].trim(), sentence[idx + 4..].trim(), false));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_negation_fires() {
        let kb = KnowledgeBase::built_in();
        let text = "The treasury is solvent. Later reports confirm the treasury is not solvent.";
        let outcome = ContradictionDetector.detect(text, &kb, Utc::now(), Instant::now() + std::time::Duration::from_secs(1));
        assert!(matches!(
            outcome,
            DetectorOutcome::Fired {
                factor: RiskFactors::FACTUAL_CONTRADICTION,
                ..
            }
        ));
    }

    #[test]
    fn consistent_statements_are_clean() {
        let kb = KnowledgeBase::built_in();
        let text = "The treasury is solvent. The treasury is well capitalized.";
        let outcome = ContradictionDetector.detect(text, &kb, Utc::now(), Instant::now() + std::time::Duration::from_secs(1));
        assert!(matches!(outcome, DetectorOutcome::Clean));
    }
}
