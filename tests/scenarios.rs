//! End-to-end scenarios from spec.md §8, driven through the public
//! `Wrapper` surface rather than individual component functions.

use chrono::{TimeZone, Utc};
use std::sync::Arc;
use std::time::{Duration, Instant};
use trustwrapper::attestation::hash_binding::HashBindingScheme;
use trustwrapper::attestation::scheme::{ProofScheme, Witness};
use trustwrapper::audit::{AuditLog, MemorySink};
use trustwrapper::cache::FingerprintCache;
use trustwrapper::config::{PolicyConfig, RawPolicyConfig};
use trustwrapper::engine::VerificationEngine;
use trustwrapper::oracle::source::{SimulatedSource, Source};
use trustwrapper::oracle::types::MarketStats;
use trustwrapper::oracle::OracleConsensus;
use trustwrapper::wrapper::{CallerMeta, VerifyOptions, Wrapper};
use trustwrapper::{AgentHandle, Decision, Recommendation, RiskFactors, TradeAction};

fn test_wrapper() -> Wrapper {
    let policy = PolicyConfig::validate(RawPolicyConfig::default()).unwrap();
    let oracle = Arc::new(OracleConsensus::new(&policy));
    let engine = Arc::new(VerificationEngine::with_built_in_knowledge_base());
    let scheme: Arc<dyn ProofScheme> = Arc::new(HashBindingScheme::derive_default());
    let cache = Arc::new(FingerprintCache::new(64));
    let audit = Arc::new(AuditLog::new(Arc::new(MemorySink::new()), 64, Duration::from_millis(100)));
    Wrapper::new(policy, oracle, engine, scheme, cache, audit)
}

fn caller() -> CallerMeta {
    CallerMeta::new(AgentHandle("scenario-test".to_string()))
}

fn trade(price: f64) -> Decision {
    Decision::Trade {
        action: TradeAction::Buy,
        asset_symbol: "SOL".into(),
        quantity: 1.0,
        price,
        confidence: 0.82,
        strategy_tag: "mean_reversion".into(),
        timeframe: "1h".into(),
    }
}

/// Drives the real oracle pipeline (register sources, poll, publish
/// consensus) the way `poll_once` would in production, then overlays
/// `MarketStats` for the non-price fields. `source_count` below the
/// policy's `min_sources` reproduces an unreliable/manipulated feed: the
/// consensus book marks the snapshot stale with `manipulation_score = 1.0`.
async fn seed_market(wrapper: &Wrapper, source_count: usize, liquidity: f64, volatility: f64, stale: bool) {
    wrapper.oracle().track_symbol("SOL").await;
    for i in 0..source_count {
        let source: Arc<dyn Source> = Arc::new(SimulatedSource::new(format!("sim-{i}"), 184.9, 1.0, 42 + i as u64));
        wrapper.oracle().register_source(source).await;
    }
    let policy = wrapper.policy();
    wrapper.oracle().poll_once(&policy).await;

    let updated_at = if stale {
        Utc::now() - chrono::Duration::minutes(10)
    } else {
        Utc::now() - chrono::Duration::seconds(2)
    };
    wrapper
        .oracle()
        .record_market_stats(
            "SOL",
            MarketStats {
                volatility_24h: volatility,
                volume_24h: 1_000_000.0,
                liquidity_score: liquidity,
                sentiment_tag: "neutral".into(),
                updated_at,
            },
        )
        .await;
}

#[tokio::test]
async fn scenario_1_clean_buy_approves() {
    let wrapper = test_wrapper();
    seed_market(&wrapper, 3, 0.9, 0.25, false).await;

    let options = VerifyOptions::new(Instant::now() + Duration::from_secs(1));
    let outcome = wrapper.verify(trade(185.5), caller(), options).await.unwrap();

    assert!(outcome.verdict.trust_score >= 80.0, "trust_score = {}", outcome.verdict.trust_score);
    assert_eq!(outcome.verdict.recommendation, Recommendation::Approve);
    assert!(outcome.verdict.factors.is_empty());
}

#[tokio::test]
async fn scenario_2_unreliable_oracle_consensus_rejects() {
    let wrapper = test_wrapper();
    // Fewer sources than `min_sources` (3): the consensus book can't form a
    // trustworthy price and marks the snapshot `manipulation_score = 1.0`,
    // the same downstream signal a detected manipulation attack produces.
    seed_market(&wrapper, 1, 0.9, 0.25, false).await;

    let options = VerifyOptions::new(Instant::now() + Duration::from_secs(1));
    let outcome = wrapper.verify(trade(185.5), caller(), options).await.unwrap();

    assert!(outcome.verdict.factors.contains(RiskFactors::CONSENSUS_BREAK));
    assert_eq!(outcome.verdict.recommendation, Recommendation::Reject);
    assert!(outcome.verdict.trust_score <= 40.0, "trust_score = {}", outcome.verdict.trust_score);
}

#[tokio::test]
async fn scenario_3_stale_oracle_degrades() {
    let wrapper = test_wrapper();
    seed_market(&wrapper, 3, 0.9, 0.25, true).await;

    let options = VerifyOptions::new(Instant::now() + Duration::from_secs(1));
    let outcome = wrapper.verify(trade(185.5), caller(), options).await.unwrap();

    assert!(outcome.verdict.factors.contains(RiskFactors::STALE_ORACLE));
    assert_ne!(outcome.verdict.recommendation, Recommendation::Approve);
    assert!(!outcome.verdict.deadline_hit);
}

#[tokio::test]
async fn scenario_4_hallucinated_factual_response_rejects() {
    let wrapper = test_wrapper();
    let decision = Decision::Response {
        prompt_hash: [0u8; 32],
        text: "Paris is the capital of Germany.".to_string(),
        model_tag: "test-model".to_string(),
        emitted_at: Utc::now(),
    };
    let options = VerifyOptions::new(Instant::now() + Duration::from_secs(1));
    let outcome = wrapper.verify(decision, caller(), options).await.unwrap();

    assert!(outcome.verdict.factors.contains(RiskFactors::FACTUAL_CONTRADICTION));
    assert!(outcome.verdict.factors.contains(RiskFactors::HALLUCINATION_DETECTED));
    assert_eq!(outcome.verdict.recommendation, Recommendation::Reject);
}

#[tokio::test]
async fn scenario_5_hallucinated_temporal_response_rejects() {
    let wrapper = test_wrapper();
    let now = Utc.with_ymd_and_hms(2025, 6, 22, 0, 0, 0).unwrap();
    let decision = Decision::Response {
        prompt_hash: [0u8; 32],
        text: "The 2035 Olympics in Brisbane concluded last month.".to_string(),
        model_tag: "test-model".to_string(),
        emitted_at: now,
    };
    let options = VerifyOptions::new(Instant::now() + Duration::from_secs(1));
    let outcome = wrapper.verify(decision, caller(), options).await.unwrap();

    assert!(outcome.verdict.factors.contains(RiskFactors::TEMPORAL_ERROR));
    assert_eq!(outcome.verdict.recommendation, Recommendation::Reject);
}

#[tokio::test]
async fn scenario_6_attestation_round_trip_and_mutation() {
    let scheme = HashBindingScheme::derive_default();
    let policy = PolicyConfig::validate(RawPolicyConfig::default()).unwrap();
    let engine = VerificationEngine::with_built_in_knowledge_base();
    let market = trustwrapper::MarketContext {
        asset_symbol: "SOL".into(),
        spot_price: 184.9,
        volatility_24h: 0.25,
        volume_24h: 1_000_000.0,
        liquidity_score: 0.9,
        sentiment_tag: "neutral".into(),
        sampled_at: Utc::now(),
        oracle_consensus_confidence: 0.98,
        manipulation_score: 0.02,
    };
    let verdict = engine.evaluate(&trade(185.5), Some(&market), &policy, Instant::now() + Duration::from_secs(1));
    let witness = Witness {
        sub_scores: verdict.explanations.iter().map(|e| e.weight).collect(),
    };
    let attestation = scheme.prove(&verdict, &witness).unwrap();

    let expected = trustwrapper::attestation::canonical::encode_public_inputs(&verdict, attestation.verdict_commitment);
    assert!(scheme.verify(&attestation, &expected));

    let mut mutated = verdict.clone();
    mutated.trust_score += 0.5;
    let mutated_commitment = trustwrapper::canonical::verdict_commitment(&mutated);
    let mutated_inputs = trustwrapper::attestation::canonical::encode_public_inputs(&mutated, mutated_commitment);
    assert!(!scheme.verify(&attestation, &mutated_inputs));

    // The original attestation still verifies against its own unmutated inputs.
    assert!(scheme.verify(&attestation, &expected));
}

#[tokio::test]
async fn deadline_too_tight_is_rejected_before_computing() {
    let wrapper = test_wrapper();
    let options = VerifyOptions::new(Instant::now());
    let result = wrapper.verify(trade(185.5), caller(), options).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn reload_policy_rejects_invalid_candidate_without_disturbing_current() {
    let wrapper = test_wrapper();
    let mut bad = RawPolicyConfig::default();
    bad.trust_weights.insert("volatility".into(), 5.0);
    assert!(wrapper.reload_policy(bad).is_err());
    assert_eq!(wrapper.policy().raw.policy_version, 1);
}
