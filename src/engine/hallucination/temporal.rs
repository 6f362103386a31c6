//! Flags a future year asserted with past-tense language as `TEMPORAL_ERROR`
//! — e.g. "The 2035 Olympics ... concluded last month" when `now` is 2025.

use super::{Detector, DetectorOutcome};
use crate::engine::knowledge_base::KnowledgeBase;
use crate::types::RiskFactors;
use chrono::{DateTime, Datelike, Utc};
use std::time::Instant;

pub struct TemporalDetector;

const PAST_TENSE_MARKERS: &[&str] = &[
    "concluded", "happened", "occurred", "took place", "was held", "ended",
    "finished", "last month", "last year", "ago", "had already",
];

impl Detector for TemporalDetector {
    fn name(&self) -> &'static str {
        "temporal"
    }

    fn detect(&self, text: &str, _kb: &KnowledgeBase, now: DateTime<Utc>, deadline: Instant) -> DetectorOutcome {
        if Instant::now() > deadline {
            return DetectorOutcome::TimedOut;
        }
        let lower = text.to_ascii_lowercase();
        let current_year = now.year();
        for year in extract_years(text) {
            if year > current_year && PAST_TENSE_MARKERS.iter().any(|m| lower.contains(m)) {
                return DetectorOutcome::Fired {
                    factor: RiskFactors::TEMPORAL_ERROR,
                    confidence: 0.9,
                    evidence: format!(
                        "year {year} is in the future relative to {current_year} but asserted in past tense"
                    ),
                };
            }
        }
        DetectorOutcome::Clean
    }
}

fn extract_years(text: &str) -> Vec<i32> {
    let bytes = text.as_bytes();
    let mut years = Vec::new();
    let mut i = 0;
    while i + 4 <= bytes.len() {
        if bytes[i..i + 4].iter().all(u8::is_ascii_digit) {
            let boundary_before = i == 0 || !bytes[i - 1].is_ascii_digit();
            let boundary_after = i + 4 == bytes.len() || !bytes[i + 4].is_ascii_digit();
            if boundary_before && boundary_after {
                if let Ok(y) = text[i..i + 4].parse::<i32>() {
                    if (1000..=9999).contains(&y) {
                        years.push(y);
                    }
                }
            }
        }
        i += 1;
    }
    years
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn future_event_in_past_tense_fires() {
        let kb = KnowledgeBase::built_in();
        let now = Utc.with_ymd_and_hms(2025, 6, 22, 0, 0, 0).unwrap();
        let outcome = TemporalDetector.detect(
            "The 2035 Olympics in Brisbane concluded last month.",
            &kb,
            now,
            Instant::now() + std::time::Duration::from_secs(1),
        );
        assert!(matches!(
            outcome,
            DetectorOutcome::Fired {
                factor: RiskFactors::TEMPORAL_ERROR,
                ..
            }
        ));
    }

    #[test]
    fn future_event_in_future_tense_is_clean() {
        let kb = KnowledgeBase::built_in();
        let now = Utc.with_ymd_and_hms(2025, 6, 22, 0, 0, 0).unwrap();
        let outcome = TemporalDetector.detect(
            "The 2035 Olympics will be held in Brisbane.",
            &kb,
            now,
            Instant::now() + std::time::Duration::from_secs(1),
        );
        assert!(matches!(outcome, DetectorOutcome::Clean));
    }
}
