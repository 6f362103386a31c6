//! Trade-decision scoring (spec.md §4.2, steps 1-5).

use crate::config::PolicyConfig;
use crate::types::{Explanation, MarketContext, Recommendation, RiskFactors, RiskLevel, TradeAction, Verdict};
use chrono::Utc;

/// Runs the full policy-check → market-risk → aggregate → recommend
/// pipeline for a single `Decision::Trade`. `deadline_hit` is set by the
/// caller if the overall call deadline was exceeded before this returned.
pub fn evaluate_trade(
    action: TradeAction,
    asset_symbol: &str,
    quantity: f64,
    price: f64,
    market: &MarketContext,
    policy: &PolicyConfig,
) -> Verdict {
    let mut factors = RiskFactors::empty();
    let mut explanations = Vec::new();

    // 1. Policy check.
    if policy.raw.blacklisted_assets.iter().any(|a| a.eq_ignore_ascii_case(asset_symbol)) {
        factors |= RiskFactors::POLICY_BREACH;
        explanations.push(Explanation {
            factor: RiskFactors::POLICY_BREACH.name().to_string(),
            weight: 1.0,
            message: format!("{asset_symbol} is on the blacklisted_assets list"),
        });
    }
    let notional = quantity * price;
    let max_notional = policy.raw.portfolio_value * policy.raw.max_position_frac;
    if notional > max_notional {
        factors |= RiskFactors::POLICY_BREACH;
        explanations.push(Explanation {
            factor: RiskFactors::POLICY_BREACH.name().to_string(),
            weight: 1.0,
            message: format!(
                "position notional {notional:.2} exceeds max_position_frac limit {max_notional:.2}"
            ),
        });
    }

    // 2. Market-risk sub-scores.
    let volatility_score = (market.volatility_24h / policy.raw.vol_reference).clamp(0.0, 1.0);
    let liquidity_score = (1.0 - market.liquidity_score).clamp(0.0, 1.0);
    let oversize_score = if max_notional > 0.0 {
        (notional / max_notional).clamp(0.0, 1.0)
    } else {
        1.0
    };
    let manipulation_score = market.manipulation_score.clamp(0.0, 1.0);

    if volatility_score > policy.raw.volatility_threshold {
        factors |= RiskFactors::HIGH_VOLATILITY;
        explanations.push(Explanation {
            factor: RiskFactors::HIGH_VOLATILITY.name().to_string(),
            weight: volatility_score,
            message: format!("volatility_score {volatility_score:.2} above threshold"),
        });
    }
    if liquidity_score > policy.raw.liquidity_threshold {
        factors |= RiskFactors::THIN_LIQUIDITY;
        explanations.push(Explanation {
            factor: RiskFactors::THIN_LIQUIDITY.name().to_string(),
            weight: liquidity_score,
            message: format!("liquidity_score {liquidity_score:.2} above threshold"),
        });
    }
    if oversize_score > policy.raw.oversize_threshold {
        factors |= RiskFactors::OVERSIZED_POSITION;
        explanations.push(Explanation {
            factor: RiskFactors::OVERSIZED_POSITION.name().to_string(),
            weight: oversize_score,
            message: format!("oversize_score {oversize_score:.2} above threshold"),
        });
    }
    if manipulation_score > policy.raw.manipulation_factor_threshold {
        factors |= RiskFactors::CONSENSUS_BREAK;
        explanations.push(Explanation {
            factor: RiskFactors::CONSENSUS_BREAK.name().to_string(),
            weight: manipulation_score,
            message: format!("oracle manipulation_score {manipulation_score:.2} above threshold"),
        });
    }
    if !market.is_fresh(Utc::now(), policy.max_market_staleness()) {
        factors |= RiskFactors::STALE_ORACLE;
        explanations.push(Explanation {
            factor: RiskFactors::STALE_ORACLE.name().to_string(),
            weight: 1.0,
            message: "market context older than max_market_staleness".to_string(),
        });
    }

    // 3. Weighted-mean trust aggregation.
    let sub_scores: [(&str, f64, RiskFactors); 4] = [
        ("volatility", volatility_score, RiskFactors::HIGH_VOLATILITY),
        ("liquidity", liquidity_score, RiskFactors::THIN_LIQUIDITY),
        ("oversize", oversize_score, RiskFactors::OVERSIZED_POSITION),
        ("manipulation", manipulation_score, RiskFactors::CONSENSUS_BREAK),
    ];
    let weighted_penalty: f64 = sub_scores
        .iter()
        .map(|(name, score, _)| policy.raw.trust_weights.get(*name).copied().unwrap_or(0.0) * score)
        .sum();
    let mut trust_score = (100.0 * (1.0 - weighted_penalty)).clamp(0.0, 100.0);

    // A hard-blocking factor is disqualifying on its own; the weighted mean
    // alone dilutes a single bad sub-score across the others, so fold in
    // the worst hard-blocked sub-score at full weight rather than its
    // policy-configured share.
    let worst_hard_block_score = sub_scores
        .iter()
        .filter(|(_, _, flag)| policy.hard_block_set.contains(*flag) && factors.contains(*flag))
        .map(|(_, score, _)| *score)
        .fold(0.0_f64, f64::max);
    let policy_breach_hard_blocked =
        factors.contains(RiskFactors::POLICY_BREACH) && policy.hard_block_set.contains(RiskFactors::POLICY_BREACH);
    let worst_hard_block_score = if policy_breach_hard_blocked {
        worst_hard_block_score.max(1.0)
    } else {
        worst_hard_block_score
    };
    if factors.intersects(policy.hard_block_set) {
        trust_score = trust_score.min(100.0 * (1.0 - worst_hard_block_score));
        trust_score = trust_score.min(policy.raw.reject_ceiling - 1.0).max(0.0);
    }

    // 4. Risk-level mapping.
    let risk_level = policy.risk_level_for(trust_score);

    // 5. Recommendation mapping.
    let recommendation = recommend(trust_score, factors, policy);

    let _ = action; // retained for future per-action policy branching; trade direction does not currently change scoring.

    Verdict {
        trust_score,
        risk_level,
        recommendation,
        factors,
        explanations,
        evaluated_at: Utc::now(),
        deadline_hit: false,
        policy_version: policy.raw.policy_version,
        code_version: policy.code_version,
    }
}

/// Recommendation mapping with conservative tie-break (spec.md §4.2 step 5
/// plus the tie-break rule): approve iff `trust >= approve_floor`, no
/// hard-block factor fired, and the oracle snapshot wasn't stale; reject iff
/// any hard-block factor or `trust < reject_ceiling`; else review. A stale
/// oracle alone never forces reject, but it can never clear approve either —
/// I1 requires every approved Verdict to rest on a fresh MarketContext.
pub fn recommend(trust_score: f64, factors: RiskFactors, policy: &PolicyConfig) -> Recommendation {
    let hard_blocked = factors.intersects(policy.hard_block_set);
    let stale = factors.contains(RiskFactors::STALE_ORACLE);
    let would_approve = trust_score >= policy.raw.approve_floor && !hard_blocked && !stale;
    let would_reject = hard_blocked || trust_score < policy.raw.reject_ceiling;

    match (would_approve, would_reject) {
        (true, true) => Recommendation::more_conservative(Recommendation::Approve, Recommendation::Reject),
        (true, false) => Recommendation::Approve,
        (false, true) => Recommendation::Reject,
        (false, false) => Recommendation::Review,
    }
}

/// Ensures `RiskLevel` orders the way the mapping assumes (Low is the
/// lowest-risk variant), so `risk_level_for`'s branch order stays correct
/// if the enum is ever reordered.
#[allow(dead_code)]
fn assert_risk_level_order() {
    debug_assert!(RiskLevel::Low < RiskLevel::Medium);
    debug_assert!(RiskLevel::Medium < RiskLevel::High);
    debug_assert!(RiskLevel::High < RiskLevel::Critical);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RawPolicyConfig;
    use chrono::Utc;

    fn market(manipulation_score: f64, consensus_confidence: f64) -> MarketContext {
        MarketContext {
            asset_symbol: "SOL".into(),
            spot_price: 184.9,
            volatility_24h: 0.25,
            volume_24h: 1_000_000.0,
            liquidity_score: 0.9,
            sentiment_tag: "neutral".into(),
            sampled_at: Utc::now(),
            oracle_consensus_confidence: consensus_confidence,
            manipulation_score,
        }
    }

    #[test]
    fn clean_buy_approves() {
        let policy = PolicyConfig::validate(RawPolicyConfig::default()).unwrap();
        let verdict = evaluate_trade(TradeAction::Buy, "SOL", 1.0, 185.5, &market(0.02, 0.98), &policy);
        assert!(verdict.trust_score >= 80.0, "trust_score = {}", verdict.trust_score);
        assert_eq!(verdict.risk_level, RiskLevel::Low);
        assert_eq!(verdict.recommendation, Recommendation::Approve);
        assert!(verdict.factors.is_empty());
    }

    #[test]
    fn manipulated_oracle_rejects() {
        let policy = PolicyConfig::validate(RawPolicyConfig::default()).unwrap();
        let verdict = evaluate_trade(TradeAction::Buy, "SOL", 1.0, 185.5, &market(0.9, 0.1), &policy);
        assert!(verdict.factors.contains(RiskFactors::CONSENSUS_BREAK));
        assert_eq!(verdict.recommendation, Recommendation::Reject);
        assert!(verdict.trust_score <= 40.0, "trust_score = {}", verdict.trust_score);
    }
}
