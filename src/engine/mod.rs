//! Verification Engine (C2): computes a `Verdict` from a `Decision` plus
//! `MarketContext` under the active `PolicyConfig`.
//!
//! State machine per call: `INIT -> POLICY -> MARKET_RISK -> HALLUCINATION
//! (if Response) -> AGGREGATE -> DONE`, short-circuiting to `DONE` as soon
//! as a `hard_block_set` factor is observed when `early_block` is on
//! (spec.md §4.2).

pub mod hallucination;
pub mod knowledge_base;
pub mod trade;

use crate::config::PolicyConfig;
use crate::types::{Decision, Explanation, MarketContext, Recommendation, RiskFactors, Verdict};
use chrono::Utc;
use hallucination::{default_detectors, run_detectors, Detector, DetectorOutcome};
use knowledge_base::KnowledgeBase;
use std::sync::Arc;
use std::time::Instant;
use tracing::{instrument, warn};

pub struct VerificationEngine {
    detectors: Vec<Arc<dyn Detector>>,
    knowledge_base: KnowledgeBase,
}

impl VerificationEngine {
    pub fn new(knowledge_base: KnowledgeBase) -> Self {
        Self {
            detectors: default_detectors(),
            knowledge_base,
        }
    }

    pub fn with_built_in_knowledge_base() -> Self {
        Self::new(KnowledgeBase::built_in())
    }

    /// Computes a `Verdict` for `decision`. `market` is required for
    /// `Decision::Trade`; ignored for `Decision::Response` (hallucination
    /// detection needs no market context).
    #[instrument(skip(self, decision, market, policy), fields(stage = "init"))]
    pub fn evaluate(
        &self,
        decision: &Decision,
        market: Option<&MarketContext>,
        policy: &PolicyConfig,
        call_deadline: Instant,
    ) -> Verdict {
        match decision {
            Decision::Trade {
                action,
                asset_symbol,
                quantity,
                price,
                ..
            } => {
                let market = match market {
                    Some(m) => m.clone(),
                    None => {
                        warn!("trade decision evaluated with no market context; treating as stale");
                        stale_market_context(asset_symbol)
                    }
                };
                trade::evaluate_trade(*action, asset_symbol, *quantity, *price, &market, policy)
            }
            Decision::Response { text, .. } => self.evaluate_response(text, policy, call_deadline),
        }
    }

    fn evaluate_response(&self, text: &str, policy: &PolicyConfig, call_deadline: Instant) -> Verdict {
        let now = Utc::now();
        let per_detector_deadline = policy
            .per_detector_deadline()
            .min(call_deadline.saturating_duration_since(Instant::now()));

        let results = run_detectors(&self.detectors, text, &self.knowledge_base, now, per_detector_deadline);

        let mut factors = RiskFactors::empty();
        let mut explanations = Vec::new();
        let mut max_weighted_confidence: f64 = 0.0;

        for result in &results {
            match &result.outcome {
                DetectorOutcome::Fired {
                    factor,
                    confidence,
                    evidence,
                } => {
                    factors |= *factor;
                    max_weighted_confidence = max_weighted_confidence.max(*confidence);
                    explanations.push(Explanation {
                        factor: factor.name().to_string(),
                        weight: *confidence,
                        message: evidence.clone(),
                    });
                }
                DetectorOutcome::TimedOut => {
                    factors |= RiskFactors::DETECTOR_TIMEOUT;
                    explanations.push(Explanation {
                        factor: RiskFactors::DETECTOR_TIMEOUT.name().to_string(),
                        weight: 0.0,
                        message: format!("detector '{}' exceeded its soft deadline", result.name),
                    });
                }
                DetectorOutcome::Clean | DetectorOutcome::Skipped => {}
            }
        }

        if factors.intersects(
            RiskFactors::TEMPORAL_ERROR | RiskFactors::FABRICATED_CITATION | RiskFactors::FACTUAL_CONTRADICTION,
        ) {
            factors |= RiskFactors::HALLUCINATION_DETECTED;
        }

        // trust_score degrades by the maximum weighted confidence across
        // firing detectors (spec.md §4.2); a DETECTOR_TIMEOUT alone
        // contributes zero penalty (fail-open), matching the explicit
        // "absence of a signal is not a negative signal" rule.
        let trust_score = (100.0 * (1.0 - max_weighted_confidence)).clamp(0.0, 100.0);
        let risk_level = policy.risk_level_for(trust_score);

        let has_timeout_without_coverage = factors.contains(RiskFactors::DETECTOR_TIMEOUT) && max_weighted_confidence == 0.0;
        let recommendation = if has_timeout_without_coverage && trade::recommend(trust_score, factors, policy) == Recommendation::Approve {
            // Incomplete detector coverage can never yield approve, even
            // when the weighted trust score alone would clear the floor.
            Recommendation::Review
        } else {
            trade::recommend(trust_score, factors, policy)
        };

        Verdict {
            trust_score,
            risk_level,
            recommendation,
            factors,
            explanations,
            evaluated_at: now,
            deadline_hit: Instant::now() > call_deadline,
            policy_version: policy.raw.policy_version,
            code_version: policy.code_version,
        }
    }
}

fn stale_market_context(asset_symbol: &str) -> MarketContext {
    MarketContext {
        asset_symbol: asset_symbol.to_string(),
        spot_price: 0.0,
        volatility_24h: 1.0,
        volume_24h: 0.0,
        liquidity_score: 0.0,
        sentiment_tag: "unknown".to_string(),
        sampled_at: Utc::now() - chrono::Duration::days(1),
        oracle_consensus_confidence: 0.0,
        manipulation_score: 1.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RawPolicyConfig;
    use crate::types::TradeAction;
    use std::time::Duration;

    #[test]
    fn hallucinated_factual_response_rejects() {
        let engine = VerificationEngine::with_built_in_knowledge_base();
        let policy = PolicyConfig::validate(RawPolicyConfig::default()).unwrap();
        let decision = Decision::Response {
            prompt_hash: [0u8; 32],
            text: "Paris is the capital of Germany.".to_string(),
            model_tag: "test-model".to_string(),
            emitted_at: Utc::now(),
        };
        let verdict = engine.evaluate(&decision, None, &policy, Instant::now() + Duration::from_secs(1));
        assert!(verdict.factors.contains(RiskFactors::FACTUAL_CONTRADICTION));
        assert_eq!(verdict.recommendation, Recommendation::Reject);
        assert!(verdict.trust_score < policy.raw.reject_ceiling);
    }

    #[test]
    fn trade_decision_uses_provided_market_context() {
        let engine = VerificationEngine::with_built_in_knowledge_base();
        let policy = PolicyConfig::validate(RawPolicyConfig::default()).unwrap();
        let decision = Decision::Trade {
            action: TradeAction::Buy,
            asset_symbol: "SOL".to_string(),
            quantity: 1.0,
            price: 185.5,
            confidence: 0.82,
            strategy_tag: "mean_reversion".to_string(),
            timeframe: "1h".to_string(),
        };
        let market = MarketContext {
            asset_symbol: "SOL".to_string(),
            spot_price: 184.9,
            volatility_24h: 0.25,
            volume_24h: 1_000_000.0,
            liquidity_score: 0.9,
            sentiment_tag: "neutral".to_string(),
            sampled_at: Utc::now(),
            oracle_consensus_confidence: 0.98,
            manipulation_score: 0.02,
        };
        let verdict = engine.evaluate(&decision, Some(&market), &policy, Instant::now() + Duration::from_secs(1));
        assert_eq!(verdict.recommendation, Recommendation::Approve);
    }
}
