//! Hallucination detector pipeline for `Response` decisions (spec.md §4.2).
//!
//! Each detector is a small, deterministic, synchronous function of
//! `(text, knowledge base, now)`. They are fanned out on `rayon`'s global
//! pool — one job per detector — and joined with a soft per-detector
//! deadline. A panic or a deadline overrun both degrade to
//! `RiskFactors::DETECTOR_TIMEOUT`, never propagating into the engine
//! (spec.md's "exceptions as control flow" redesign, §9).

mod citation;
mod contradiction;
mod factual;
mod temporal;

#[cfg(feature = "llm-detector")]
mod llm;

use crate::engine::knowledge_base::KnowledgeBase;
use crate::types::RiskFactors;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Outcome of a single detector run.
#[derive(Debug, Clone)]
pub enum DetectorOutcome {
    /// Nothing suspicious found.
    Clean,
    /// The detector's signal fired.
    Fired {
        factor: RiskFactors,
        confidence: f64,
        evidence: String,
    },
    /// The detector declined to run (e.g. optional capability disabled).
    Skipped,
    /// Exceeded its soft deadline before completing.
    TimedOut,
}

/// A deterministic, synchronous hallucination signal. Implementations must
/// be pure functions of `(text, kb.version, now)` — no hidden state,
/// per spec.md's "all detectors must be deterministic" requirement.
pub trait Detector: Send + Sync {
    fn name(&self) -> &'static str;
    fn detect(&self, text: &str, kb: &KnowledgeBase, now: DateTime<Utc>, deadline: Instant) -> DetectorOutcome;
}

/// The fixed detector set shipped by the engine, held behind `Arc` so
/// `run_detectors` can hand an owned, `'static` clone of each trait object
/// into its own spawned closure.
pub fn default_detectors() -> Vec<Arc<dyn Detector>> {
    let mut detectors: Vec<Arc<dyn Detector>> = vec![
        Arc::new(temporal::TemporalDetector),
        Arc::new(citation::CitationDetector),
        Arc::new(factual::FactualDetector),
        Arc::new(contradiction::ContradictionDetector),
    ];
    #[cfg(feature = "llm-detector")]
    detectors.push(Arc::new(llm::LlmDetector::noop()));
    detectors
}

/// One detector's result plus bookkeeping the engine needs to build
/// `Explanation`s and aggregate the hallucination factor set.
pub struct DetectorResult {
    pub name: &'static str,
    pub outcome: DetectorOutcome,
}

/// Runs every detector on `rayon`'s global pool and joins them with
/// `per_detector_deadline`. All detectors are spawned in a first pass so
/// they genuinely run concurrently; a second pass joins each one, so
/// worst-case latency is the slowest single detector, not their sum. A
/// detector that panics is caught at the spawn boundary (`catch_unwind`)
/// and converted to `DetectorOutcome::TimedOut`, matching the same
/// fail-open contract as a real deadline overrun.
pub fn run_detectors(
    detectors: &[Arc<dyn Detector>],
    text: &str,
    kb: &KnowledgeBase,
    now: DateTime<Utc>,
    per_detector_deadline: Duration,
) -> Vec<DetectorResult> {
    let deadline = Instant::now() + per_detector_deadline;
    let pending: Vec<_> = detectors
        .iter()
        .map(|detector| {
            let (tx, rx) = crossbeam_channel::bounded(1);
            let name = detector.name();
            let detector = Arc::clone(detector);
            let text = text.to_string();
            let kb = kb.clone_for_detector();
            rayon::spawn(move || {
                // SAFETY-free: `Detector::detect` is a plain function call;
                // `catch_unwind` requires `UnwindSafe`, so box the closure's
                // captures behind `AssertUnwindSafe` — the detector itself
                // holds no shared mutable state to corrupt on panic.
                let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    detector.detect(&text, &kb, now, deadline)
                }))
                .unwrap_or(DetectorOutcome::TimedOut);
                let _ = tx.send(outcome);
            });
            (name, rx)
        })
        .collect();

    pending
        .into_iter()
        .map(|(name, rx)| {
            let outcome = rx
                .recv_timeout(deadline.saturating_duration_since(Instant::now()))
                .unwrap_or(DetectorOutcome::TimedOut);
            DetectorResult { name, outcome }
        })
        .collect()
}

impl KnowledgeBase {
    /// Cheap clone for handing an owned copy into a detector's spawned
    /// closure; the built-in table is small enough that this is never a
    /// hot-path concern (see SPEC_FULL.md §4.2).
    fn clone_for_detector(&self) -> KnowledgeBase {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factual_contradiction_is_detected_and_others_stay_clean() {
        let kb = KnowledgeBase::built_in();
        let detectors = default_detectors();
        let results = run_detectors(
            &detectors,
            "Paris is the capital of Germany.",
            &kb,
            Utc::now(),
            Duration::from_millis(150),
        );
        let factual = results.iter().find(|r| r.name == "factual").unwrap();
        assert!(matches!(
            factual.outcome,
            DetectorOutcome::Fired {
                factor: RiskFactors::FACTUAL_CONTRADICTION,
                ..
            }
        ));
    }
}
