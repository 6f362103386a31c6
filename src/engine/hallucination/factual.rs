//! Matches `<entity> is the capital of <entity>`-style assertions against
//! the curated knowledge base; any mismatch sets `FACTUAL_CONTRADICTION`.

use super::{Detector, DetectorOutcome};
use crate::engine::knowledge_base::KnowledgeBase;
use crate::types::RiskFactors;
use chrono::{DateTime, Utc};
use std::time::Instant;

pub struct FactualDetector;

impl Detector for FactualDetector {
    fn name(&self) -> &'static str {
        "factual"
    }

    fn detect(&self, text: &str, kb: &KnowledgeBase, _now: DateTime<Utc>, deadline: Instant) -> DetectorOutcome {
        for sentence in text.split(|c| c == '.' || c == '\n') {
            if Instant::now() > deadline {
                return DetectorOutcome::TimedOut;
            }
            let sentence = sentence.trim();
            if sentence.is_empty() {
                continue;
            }
            if let Some((claimed_capital, country)) = parse_capital_claim(sentence) {
                if let Some(actual) = kb.lookup(&country, "capital") {
                    if !actual.eq_ignore_ascii_case(&claimed_capital) {
                        return DetectorOutcome::Fired {
                            factor: RiskFactors::FACTUAL_CONTRADICTION,
                            confidence: 0.95,
                            evidence: format!(
                                "claimed capital of {country} is {claimed_capital}, knowledge base says {actual}"
                            ),
                        };
                    }
                }
            }
        }
        DetectorOutcome::Clean
    }
}

/// Parses `"<City> is the capital of <Country>"`, case-insensitively,
/// tolerating a leading article. Deliberately narrow: the factual detector
/// targets one well-understood claim shape rather than general NLI, which
/// is out of scope per spec.md §1.
fn parse_capital_claim(sentence: &str) -> Option<(String, String)> {
    let lower = sentence.to_ascii_lowercase();
    let marker = " is the capital of ";
    let idx = lower.find(marker)?;
    let city = sentence[..idx].trim().to_string();
    let country = sentence[idx + marker.len()..].trim().trim_end_matches('.').to_string();
    if city.is_empty() || country.is_empty() {
        return None;
    }
    Some((city, country))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_capital_claim() {
        let parsed = parse_capital_claim("Paris is the capital of Germany");
        assert_eq!(parsed, Some(("Paris".to_string(), "Germany".to_string())));
    }

    #[test]
    fn correct_claim_is_clean() {
        let kb = KnowledgeBase::built_in();
        let outcome = FactualDetector.detect(
            "Berlin is the capital of Germany.",
            &kb,
            Utc::now(),
            Instant::now() + std::time::Duration::from_secs(1),
        );
        assert!(matches!(outcome, DetectorOutcome::Clean));
    }

    #[test]
    fn wrong_claim_fires() {
        let kb = KnowledgeBase::built_in();
        let outcome = FactualDetector.detect(
            "Paris is the capital of Germany.",
            &kb,
            Utc::now(),
            Instant::now() + std::time::Duration::from_secs(1),
        );
        assert!(matches!(
            outcome,
            DetectorOutcome::Fired {
                factor: RiskFactors::FACTUAL_CONTRADICTION,
                ..
            }
        ));
    }
}
