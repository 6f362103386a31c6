//! Bit-exact public-inputs encoding for attestations (spec.md §6):
//! `[policy_version:u32 | code_version:u32 | timestamp:u64 |
//! verdict_commitment:32B | recommendation:u8 | risk_level:u8]`,
//! little-endian, no padding.

use crate::types::{Recommendation, RiskLevel, Verdict};

pub const PUBLIC_INPUTS_LEN: usize = 4 + 4 + 8 + 32 + 1 + 1;

fn recommendation_tag(r: Recommendation) -> u8 {
    match r {
        Recommendation::Approve => 0,
        Recommendation::Review => 1,
        Recommendation::Reject => 2,
    }
}

fn risk_level_tag(r: RiskLevel) -> u8 {
    match r {
        RiskLevel::Low => 0,
        RiskLevel::Medium => 1,
        RiskLevel::High => 2,
        RiskLevel::Critical => 3,
    }
}

/// Encodes the public inputs for `verdict`, given its 32-byte commitment
/// (computed separately by `crate::canonical::verdict_commitment`, never
/// recomputed here so the two never drift).
pub fn encode_public_inputs(verdict: &Verdict, verdict_commitment: [u8; 32]) -> [u8; PUBLIC_INPUTS_LEN] {
    let mut buf = [0u8; PUBLIC_INPUTS_LEN];
    let mut offset = 0;

    buf[offset..offset + 4].copy_from_slice(&verdict.policy_version.to_le_bytes());
    offset += 4;
    buf[offset..offset + 4].copy_from_slice(&verdict.code_version.to_le_bytes());
    offset += 4;
    let timestamp = verdict.evaluated_at.timestamp() as u64;
    buf[offset..offset + 8].copy_from_slice(&timestamp.to_le_bytes());
    offset += 8;
    buf[offset..offset + 32].copy_from_slice(&verdict_commitment);
    offset += 32;
    buf[offset] = recommendation_tag(verdict.recommendation);
    offset += 1;
    buf[offset] = risk_level_tag(verdict.risk_level);

    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canonical::verdict_commitment;
    use crate::types::{Explanation, RiskFactors};
    use chrono::Utc;

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
    fn layout_is_bit_exact_length() {
        let v = sample_verdict();
        let commitment = verdict_commitment(&v);
        let encoded = encode_public_inputs(&v, commitment);
        assert_eq!(encoded.len(), PUBLIC_INPUTS_LEN);
        assert_eq!(&encoded[0..4], &v.policy_version.to_le_bytes());
        assert_eq!(&encoded[4..8], &v.code_version.to_le_bytes());
        assert_eq!(&encoded[16..48], &commitment);
    }
}
