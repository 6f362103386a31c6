use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single price observation from one source. Immutable; deduplicated per
/// (source_id, reported_at) by the ring buffer that ingests it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OracleSample {
    pub source_id: String,
    pub symbol: String,
    pub price: f64,
    pub reported_at: DateTime<Utc>,
    pub signature: Option<String>,
}

/// Derived per-symbol aggregate. Invariant: `contributing_sources_count >=
/// min_sources` unless `manipulation_score == 1.0` with a stale marker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusPrice {
    pub symbol: String,
    pub consensus_price: f64,
    pub deviation_max: f64,
    pub deviation_mean: f64,
    pub contributing_sources_count: u32,
    pub manipulation_score: f64,
    pub computed_at: DateTime<Utc>,
    pub stale: bool,
}

impl ConsensusPrice {
    pub fn is_fresh(&self, now: DateTime<Utc>, not_older_than: chrono::Duration) -> bool {
        now.signed_duration_since(self.computed_at) <= not_older_than
    }
}

/// Non-price market descriptors the engine needs but the oracle's
/// price-source rings don't carry: volatility, volume and liquidity come
/// from a separate market-data feed, sentiment from a tagging pipeline.
/// Caller-supplied via `OracleConsensus::record_market_stats`; combined
/// with the latest `ConsensusPrice` to build a `MarketContext`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketStats {
    pub volatility_24h: f64,
    pub volume_24h: f64,
    pub liquidity_score: f64,
    pub sentiment_tag: String,
    pub updated_at: DateTime<Utc>,
}

impl MarketStats {
    /// Used when a symbol has a price consensus but no market-stats feed
    /// has reported yet — conservative middling values rather than zeros,
    /// so a missing feed doesn't masquerade as perfect liquidity.
    pub fn neutral_default(now: DateTime<Utc>) -> Self {
        Self {
            volatility_24h: 0.3,
            volume_24h: 0.0,
            liquidity_score: 0.5,
            sentiment_tag: "neutral".to_string(),
            updated_at: now,
        }
    }
}
