//! Canonical (deterministic, fixed-width) encodings used as hash
//! pre-images. Every implementation must agree on these bit-for-bit to
//! preserve I3 (attestation binding) and cross-run determinism.
//!
//! Encoding rules: little-endian fixed-width integers, length-prefixed
//! variable-length fields (`u32` length, then bytes), explicit tag bytes for
//! enum variants, explicit `0`/`1` presence markers for optionals. No
//! trailing padding.

use crate::types::{Decision, Explanation, Recommendation, RiskLevel, TradeAction, Verdict};
use sha2::{Digest, Sha256};

fn push_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    buf.extend_from_slice(bytes);
}

fn push_str(buf: &mut Vec<u8>, s: &str) {
    push_bytes(buf, s.as_bytes());
}

fn push_f64(buf: &mut Vec<u8>, v: f64) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn trade_action_tag(a: TradeAction) -> u8 {
    match a {
        TradeAction::Buy => 0,
        TradeAction::Sell => 1,
        TradeAction::Hold => 2,
        TradeAction::Bridge => 3,
        TradeAction::ProvideLiquidity => 4,
    }
}

/// Canonical byte encoding of a `Decision`.
pub fn encode_decision(decision: &Decision) -> Vec<u8> {
    let mut buf = Vec::with_capacity(128);
    match decision {
        Decision::Trade {
            action,
            asset_symbol,
            quantity,
            price,
            confidence,
            strategy_tag,
            timeframe,
        } => {
            buf.push(0u8); // variant tag: Trade
            buf.push(trade_action_tag(*action));
            push_str(&mut buf, asset_symbol);
            push_f64(&mut buf, *quantity);
            push_f64(&mut buf, *price);
            push_f64(&mut buf, *confidence);
            push_str(&mut buf, strategy_tag);
            push_str(&mut buf, timeframe);
        }
        Decision::Response {
            prompt_hash,
            text,
            model_tag,
            emitted_at,
        } => {
            buf.push(1u8); // variant tag: Response
            buf.extend_from_slice(prompt_hash);
            push_str(&mut buf, text);
            push_str(&mut buf, model_tag);
            buf.extend_from_slice(&emitted_at.timestamp_nanos_opt().unwrap_or(0).to_le_bytes());
        }
    }
    buf
}

/// 32-byte content hash over the canonical encoding of a Decision.
pub fn decision_fingerprint(decision: &Decision) -> [u8; 32] {
    Sha256::digest(encode_decision(decision)).into()
}

fn risk_level_tag(r: RiskLevel) -> u8 {
    match r {
        RiskLevel::Low => 0,
        RiskLevel::Medium => 1,
        RiskLevel::High => 2,
        RiskLevel::Critical => 3,
    }
}

fn recommendation_tag(r: Recommendation) -> u8 {
    match r {
        Recommendation::Approve => 0,
        Recommendation::Review => 1,
        Recommendation::Reject => 2,
    }
}

fn push_explanation(buf: &mut Vec<u8>, e: &Explanation) {
    push_str(buf, &e.factor);
    push_f64(buf, e.weight);
    push_str(buf, &e.message);
}

/// Canonical byte encoding of a `Verdict`, bound to `policy_version` and
/// `code_version` so the commitment changes across rule changes (prevents
/// attestation replay across policy revisions, per spec.md §4.4).
pub fn encode_verdict(verdict: &Verdict) -> Vec<u8> {
    let mut buf = Vec::with_capacity(256);
    push_f64(&mut buf, verdict.trust_score);
    buf.push(risk_level_tag(verdict.risk_level));
    buf.push(recommendation_tag(verdict.recommendation));
    buf.extend_from_slice(&verdict.factors.bits().to_le_bytes());
    buf.extend_from_slice(&(verdict.explanations.len() as u32).to_le_bytes());
    for e in &verdict.explanations {
        push_explanation(&mut buf, e);
    }
    buf.extend_from_slice(
        &verdict
            .evaluated_at
            .timestamp_nanos_opt()
            .unwrap_or(0)
            .to_le_bytes(),
    );
    buf.push(verdict.deadline_hit as u8);
    buf.extend_from_slice(&verdict.policy_version.to_le_bytes());
    buf.extend_from_slice(&verdict.code_version.to_le_bytes());
    buf
}

/// The 32-byte `verdict_commitment`: the hash pre-image for I3.
pub fn verdict_commitment(verdict: &Verdict) -> [u8; 32] {
    Sha256::digest(encode_verdict(verdict)).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RiskFactors;
    use chrono::Utc;
    use proptest::{prop_assert_eq, prop_assert_ne};

    fn sample_verdict() -> Verdict {
        Verdict {
            trust_score: 91.5,
            risk_level: RiskLevel::Low,
            recommendation: Recommendation::Approve,
            factors: RiskFactors::empty(),
            explanations: vec![Explanation {
                factor: "volatility".into(),
                weight: 0.3,
                message: "within bounds".into(),
            }],
            evaluated_at: Utc::now(),
            deadline_hit: false,
            policy_version: 1,
            code_version: 7,
        }
    }

    #[test]
    fn verdict_commitment_changes_with_any_bit() {
        let v1 = sample_verdict();
        let mut v2 = v1.clone();
        v2.trust_score += 0.0001;
        assert_ne!(verdict_commitment(&v1), verdict_commitment(&v2));
    }

    #[test]
    fn verdict_commitment_deterministic() {
        let v = sample_verdict();
        assert_eq!(verdict_commitment(&v), verdict_commitment(&v));
    }

    #[test]
    fn decision_fingerprint_stable_across_clones() {
        let d = Decision::Trade {
            action: TradeAction::Buy,
            asset_symbol: "SOL".into(),
            quantity: 1.0,
            price: 185.5,
            confidence: 0.82,
            strategy_tag: "mean_reversion".into(),
            timeframe: "1h".into(),
        };
        assert_eq!(decision_fingerprint(&d), decision_fingerprint(&d.clone()));
    }

    proptest::proptest! {
        #[test]
        fn fingerprint_is_deterministic_and_quantity_sensitive(
            quantity in 0.0001f64..1_000_000.0,
            price in 0.01f64..1_000_000.0,
            symbol in "[A-Z]{2,8}",
        ) {
            let decision = Decision::Trade {
                action: TradeAction::Buy,
                asset_symbol: symbol,
                quantity,
                price,
                confidence: 0.5,
                strategy_tag: "fuzz".into(),
                timeframe: "1h".into(),
            };
            let a = decision_fingerprint(&decision);
            let b = decision_fingerprint(&decision);
            prop_assert_eq!(a, b);

            let mut bumped = decision.clone();
            if let Decision::Trade { quantity, .. } = &mut bumped {
                *quantity += 1.0;
            }
            prop_assert_ne!(decision_fingerprint(&decision), decision_fingerprint(&bumped));
        }
    }
}
