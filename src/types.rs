//! Core data model shared across every component.
//!
//! Semantic types only — storage and wire representation live in
//! `canonical` and the component modules that own persistence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque agent identifier. Owns nothing; stable for the lifetime of an
/// agent's integration with the wrapper.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentHandle(pub String);

impl fmt::Display for AgentHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeAction {
    Buy,
    Sell,
    Hold,
    Bridge,
    ProvideLiquidity,
}

/// An AI agent's proposed action or textual output submitted for
/// verification. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Decision {
    Trade {
        action: TradeAction,
        asset_symbol: String,
        quantity: f64,
        price: f64,
        confidence: f64,
        strategy_tag: String,
        timeframe: String,
    },
    Response {
        prompt_hash: [u8; 32],
        text: String,
        model_tag: String,
        emitted_at: DateTime<Utc>,
    },
}

impl Decision {
    pub fn is_trade(&self) -> bool {
        matches!(self, Decision::Trade { .. })
    }

    pub fn asset_symbol(&self) -> Option<&str> {
        match self {
            Decision::Trade { asset_symbol, .. } => Some(asset_symbol),
            Decision::Response { .. } => None,
        }
    }

    /// Structural validation independent of canonicalisation: catches the
    /// cases `Wrapper::verify` must reject as `INPUT_MALFORMED` before the
    /// fingerprint is even computed.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Decision::Trade {
                quantity,
                price,
                confidence,
                asset_symbol,
                ..
            } => {
                if *quantity < 0.0 {
                    return Err("quantity must be >= 0".into());
                }
                if *price < 0.0 {
                    return Err("price must be >= 0".into());
                }
                if !(0.0..=1.0).contains(confidence) {
                    return Err("confidence must be in [0,1]".into());
                }
                if asset_symbol.is_empty() {
                    return Err("asset_symbol must not be empty".into());
                }
                Ok(())
            }
            Decision::Response { text, .. } => {
                if text.is_empty() {
                    return Err("response text must not be empty".into());
                }
                Ok(())
            }
        }
    }
}

/// A per-symbol market snapshot produced by the oracle consensus
/// subsystem. Timestamped; stale beyond `max_market_staleness`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketContext {
    pub asset_symbol: String,
    pub spot_price: f64,
    pub volatility_24h: f64,
    pub volume_24h: f64,
    pub liquidity_score: f64,
    pub sentiment_tag: String,
    pub sampled_at: DateTime<Utc>,
    pub oracle_consensus_confidence: f64,
    pub manipulation_score: f64,
}

impl MarketContext {
    pub fn is_fresh(&self, now: DateTime<Utc>, max_staleness: chrono::Duration) -> bool {
        now.signed_duration_since(self.sampled_at) <= max_staleness
    }
}

bitflags::bitflags! {
    /// Named, boolean signals contributing to Verdict degradation.
    ///
    /// `Serialize`/`Deserialize` are derived with `#[serde(transparent)]` so
    /// bitflags' own `serde` feature machinery handles the wire format.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct RiskFactors: u32 {
        const HIGH_VOLATILITY      = 1 << 0;
        const THIN_LIQUIDITY       = 1 << 1;
        const OVERSIZED_POSITION   = 1 << 2;
        const STALE_ORACLE         = 1 << 3;
        const CONSENSUS_BREAK      = 1 << 4;
        const POLICY_BREACH        = 1 << 5;
        const HALLUCINATION_DETECTED = 1 << 6;
        const TEMPORAL_ERROR       = 1 << 7;
        const FABRICATED_CITATION  = 1 << 8;
        const FACTUAL_CONTRADICTION = 1 << 9;
        const DETECTOR_TIMEOUT     = 1 << 10;
    }
}

impl RiskFactors {
    /// Human-readable name for a single-bit factor, used in explanations.
    pub fn name(self) -> &'static str {
        match self {
            RiskFactors::HIGH_VOLATILITY => "high_volatility",
            RiskFactors::THIN_LIQUIDITY => "thin_liquidity",
            RiskFactors::OVERSIZED_POSITION => "oversized_position",
            RiskFactors::STALE_ORACLE => "stale_oracle",
            RiskFactors::CONSENSUS_BREAK => "consensus_break",
            RiskFactors::POLICY_BREACH => "policy_breach",
            RiskFactors::HALLUCINATION_DETECTED => "hallucination_detected",
            RiskFactors::TEMPORAL_ERROR => "temporal_error",
            RiskFactors::FABRICATED_CITATION => "fabricated_citation",
            RiskFactors::FACTUAL_CONTRADICTION => "factual_contradiction",
            RiskFactors::DETECTOR_TIMEOUT => "detector_timeout",
            _ => "unknown",
        }
    }

    /// Iterate over the individual set bits, for building explanations.
    pub fn iter_set(self) -> impl Iterator<Item = RiskFactors> {
        self.iter()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    Approve,
    Review,
    Reject,
}

impl Recommendation {
    /// Conservative tie-break ordering: reject > review > approve.
    pub fn more_conservative(a: Recommendation, b: Recommendation) -> Recommendation {
        use Recommendation::*;
        match (a, b) {
            (Reject, _) | (_, Reject) => Reject,
            (Review, _) | (_, Review) => Review,
            _ => Approve,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Explanation {
    pub factor: String,
    pub weight: f64,
    pub message: String,
}

/// The engine's bounded-latency judgement on a Decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verdict {
    pub trust_score: f64,
    pub risk_level: RiskLevel,
    pub recommendation: Recommendation,
    pub factors: RiskFactors,
    pub explanations: Vec<Explanation>,
    pub evaluated_at: DateTime<Utc>,
    pub deadline_hit: bool,
    pub policy_version: u32,
    pub code_version: u32,
}

impl Verdict {
    pub fn has_any(&self, hard_block_set: RiskFactors) -> bool {
        self.factors.intersects(hard_block_set)
    }
}

/// Succinct, privacy-preserving witness that a Verdict was produced under a
/// declared policy. `proof_blob` is opaque to consumers; `public_inputs` is
/// the bit-exact encoding from `attestation::canonical`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attestation {
    pub verdict_commitment: [u8; 32],
    pub proof_blob: Vec<u8>,
    pub public_inputs: Vec<u8>,
    pub scheme_tag: u16,
    pub created_at: DateTime<Utc>,
}

/// Append-only audit trail entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub record_id: uuid::Uuid,
    pub decision_fingerprint: [u8; 32],
    pub verdict: Verdict,
    pub attestation_id: Option<[u8; 32]>,
    pub latency_ns: u64,
    pub outcome_tag: String,
    pub wall_time: DateTime<Utc>,
    pub prev_hash: [u8; 32],
}
