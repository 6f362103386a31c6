//! Optional LLM-judged hallucination signal (spec.md §9 open question:
//! "treated as optional, same Result shape, absence never blocks
//! recommendation"). Callers may supply their own `LlmScorer`; the default
//! build ships a no-op that always skips.

use super::{Detector, DetectorOutcome};
use crate::engine::knowledge_base::KnowledgeBase;
use chrono::{DateTime, Utc};
use std::time::Instant;

/// Pluggable scoring backend so this capability never hard-codes a vendor
/// API. Implementations are expected to call out to an LLM judge and map
/// its verdict onto a `DetectorOutcome`.
pub trait LlmScorer: Send + Sync {
    fn score(&self, text: &str) -> DetectorOutcome;
}

struct NoopScorer;

impl LlmScorer for NoopScorer {
    fn score(&self, _text: &str) -> DetectorOutcome {
        DetectorOutcome::Skipped
    }
}

pub struct LlmDetector {
    scorer: Box<dyn LlmScorer>,
}

impl LlmDetector {
    pub fn noop() -> Self {
        Self {
            scorer: Box::new(NoopScorer),
        }
    }

    pub fn with_scorer(scorer: Box<dyn LlmScorer>) -> Self {
        Self { scorer }
    }
}

impl Detector for LlmDetector {
    fn name(&self) -> &'static str {
        "llm"
    }

    fn detect(&self, text: &str, _kb: &KnowledgeBase, _now: DateTime<Utc>, _deadline: Instant) -> DetectorOutcome {
        self.scorer.score(text)
    }
}
