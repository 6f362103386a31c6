//! Oracle subsystem (C3): ingests independent price samples and publishes a
//! manipulation-scored consensus per symbol, refreshed on a background
//! interval (grounded on the teacher's `edge` feed-aggregation loop).

pub mod consensus;
pub mod source;
pub mod types;

use crate::config::PolicyConfig;
use crate::error::OracleError;
use crate::types::MarketContext;
use consensus::ConsensusBook;
use source::Source;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use types::{ConsensusPrice, MarketStats};

/// Runtime-owned set of sources and symbols to track, plus the published
/// consensus book. Cloned cheaply (`Arc` internals) into the wrapper.
pub struct OracleConsensus {
    book: Arc<ConsensusBook>,
    sources: RwLock<Vec<Arc<dyn Source>>>,
    symbols: RwLock<Vec<String>>,
    volume_hint: AtomicU64,
    stats: RwLock<HashMap<String, MarketStats>>,
}

impl OracleConsensus {
    pub fn new(policy: &PolicyConfig) -> Self {
        Self {
            book: Arc::new(ConsensusBook::new(policy.raw.sample_window)),
            sources: RwLock::new(Vec::new()),
            symbols: RwLock::new(Vec::new()),
            volume_hint: AtomicU64::new(0),
            stats: RwLock::new(HashMap::new()),
        }
    }

    pub async fn register_source(&self, source: Arc<dyn Source>) {
        self.sources.write().await.push(source);
    }

    pub async fn track_symbol(&self, symbol: impl Into<String>) {
        let symbol = symbol.into();
        let mut symbols = self.symbols.write().await;
        if !symbols.contains(&symbol) {
            symbols.push(symbol);
        }
    }

    /// Record the most recent trade volume seen for the manipulation-score
    /// volume-anomaly term. Stored as bits-of-f64 since this is read far
    /// more often than written and an `AtomicU64` avoids a lock here.
    pub fn note_volume(&self, volume: f64) {
        self.volume_hint.store(volume.to_bits(), Ordering::Relaxed);
    }

    fn current_volume_hint(&self) -> f64 {
        f64::from_bits(self.volume_hint.load(Ordering::Relaxed))
    }

    /// Poll every registered source for every tracked symbol once, ingest
    /// the results, and recompute consensus for each symbol. A source
    /// failing does not block the others — spec.md requires degrading
    /// gracefully down to `min_sources`, not failing the whole poll.
    pub async fn poll_once(&self, policy: &PolicyConfig) {
        let sources = self.sources.read().await.clone();
        let symbols = self.symbols.read().await.clone();
        for symbol in &symbols {
            for src in &sources {
                match src.poll(symbol).await {
                    Ok(samples) => {
                        for sample in samples {
                            self.book.ingest(sample);
                        }
                    }
                    Err(e) => warn!(source = src.source_id(), symbol, error = %e, "oracle source poll failed"),
                }
            }
            self.book
                .refresh_symbol(symbol, policy, self.current_volume_hint());
        }
    }

    /// Non-blocking read of the latest consensus for `symbol`. Returns
    /// `None` if the symbol has never been polled.
    pub fn latest(&self, symbol: &str) -> Option<Arc<ConsensusPrice>> {
        self.book.latest_for(symbol)
    }

    /// "Latest consensus not older than `max_age`" contract used by the
    /// verification engine; returns `OracleError::NoSources` when the
    /// symbol is unknown, independent of staleness (that's surfaced via
    /// `ConsensusPrice::stale` instead, which the caller maps to
    /// `OracleUnavailable`/`ConsensusBreak`).
    pub fn latest_fresh(
        &self,
        symbol: &str,
        now: chrono::DateTime<chrono::Utc>,
        max_age: chrono::Duration,
    ) -> Result<Arc<ConsensusPrice>, OracleError> {
        let snap = self
            .book
            .latest_for(symbol)
            .ok_or_else(|| OracleError::NoSources(symbol.to_string()))?;
        if !snap.is_fresh(now, max_age) {
            warn!(symbol, "consensus snapshot older than allowed max age");
        }
        Ok(snap)
    }

    pub fn symbol_snapshots(&self) -> HashMap<String, Arc<ConsensusPrice>> {
        self.book
            // best-effort point-in-time view for the CLI's oracle-status
            .clone_latest_map()
    }

    /// Records the latest volatility/volume/liquidity/sentiment reading for
    /// `symbol`, fed by a market-data feed separate from the price oracle
    /// sources — the wrapper combines this with `ConsensusPrice` to build
    /// the `MarketContext` the verification engine borrows.
    pub async fn record_market_stats(&self, symbol: impl Into<String>, stats: MarketStats) {
        self.stats.write().await.insert(symbol.into(), stats);
    }

    /// Builds a `MarketContext` for `symbol` from the latest published
    /// `ConsensusPrice` plus the most recent market-stats reading, falling
    /// back to `MarketStats::neutral_default` when no stats feed has
    /// reported for this symbol yet. Returns `None` only when the symbol
    /// has never been polled at all — the caller (wrapper) treats that as
    /// "request a refresh, proceed without market context" per spec.md
    /// §4.1, letting the engine apply `STALE_ORACLE` itself.
    pub async fn market_context_for(&self, symbol: &str) -> Option<MarketContext> {
        let snapshot = self.latest(symbol)?;
        let stats = self.stats.read().await.get(symbol).cloned();
        let stats = stats.unwrap_or_else(|| MarketStats::neutral_default(snapshot.computed_at));
        // MarketContext carries a single `sampled_at`, but it is built from
        // two independently-refreshed feeds (price consensus, stats); take
        // the older of the two so a lagging stats feed can't hide behind a
        // freshly-polled price and slip past the engine's staleness check.
        let sampled_at = snapshot.computed_at.min(stats.updated_at);
        Some(MarketContext {
            asset_symbol: symbol.to_string(),
            spot_price: snapshot.consensus_price,
            volatility_24h: stats.volatility_24h,
            volume_24h: stats.volume_24h,
            liquidity_score: stats.liquidity_score,
            sentiment_tag: stats.sentiment_tag,
            sampled_at,
            oracle_consensus_confidence: (1.0 - snapshot.manipulation_score).clamp(0.0, 1.0),
            manipulation_score: snapshot.manipulation_score,
        })
    }
}

/// Spawns the background refresh loop on the given runtime handle. Returns
/// a guard that cancels the loop on drop via the supplied token, mirroring
/// the teacher's `edge` receiver shutdown idiom.
pub fn spawn_refresh_loop(
    consensus: Arc<OracleConsensus>,
    policy: Arc<arc_swap::ArcSwap<PolicyConfig>>,
    interval: std::time::Duration,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("oracle refresh loop shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    let snapshot = policy.load();
                    consensus.poll_once(&snapshot).await;
                }
            }
        }
    })
}
