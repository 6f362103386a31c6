//! Oracle consensus algorithm (C3): per-symbol aggregation of independent
//! samples into a `ConsensusPrice`, with manipulation scoring.
//!
//! Concurrency model: one bounded sample ring per (symbol, source), guarded
//! by a `parking_lot::Mutex` — sharded by key, never a single global lock
//! (per spec.md §9's redesign flag on shared mutable caches). The published
//! `ConsensusPrice` per symbol is swapped atomically via `ArcSwap`, so
//! readers never observe a torn snapshot.

use crate::config::PolicyConfig;
use crate::oracle::types::{ConsensusPrice, OracleSample};
use arc_swap::ArcSwap;
use chrono::Utc;
use parking_lot::Mutex;
use statrs::statistics::{Data, Median};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// Bounded per-(symbol, source) ring, evicting the oldest sample once full.
struct SampleRing {
    capacity: usize,
    samples: VecDeque<OracleSample>,
}

impl SampleRing {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            samples: VecDeque::with_capacity(capacity),
        }
    }

    fn push(&mut self, sample: OracleSample) {
        // Dedupe per (source_id, reported_at) as specified.
        if self
            .samples
            .iter()
            .any(|s| s.source_id == sample.source_id && s.reported_at == sample.reported_at)
        {
            return;
        }
        if self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    fn latest(&self) -> Option<&OracleSample> {
        self.samples.back()
    }
}

/// Owns the sample rings and the latest published `ConsensusPrice` per
/// symbol. Shared across the background refresh loop (writer) and the
/// verification engine (reader) via `Arc`.
pub struct ConsensusBook {
    rings: Mutex<HashMap<(String, String), SampleRing>>,
    volume_baseline: Mutex<HashMap<String, VecDeque<f64>>>,
    latest: Mutex<HashMap<String, Arc<ArcSwap<ConsensusPrice>>>>,
    sample_window: usize,
}

impl ConsensusBook {
    pub fn new(sample_window: usize) -> Self {
        Self {
            rings: Mutex::new(HashMap::new()),
            volume_baseline: Mutex::new(HashMap::new()),
            latest: Mutex::new(HashMap::new()),
            sample_window,
        }
    }

    pub fn ingest(&self, sample: OracleSample) {
        let key = (sample.symbol.clone(), sample.source_id.clone());
        let mut rings = self.rings.lock();
        rings
            .entry(key)
            .or_insert_with(|| SampleRing::new(self.sample_window))
            .push(sample);
    }

    pub fn record_volume(&self, symbol: &str, volume: f64) {
        let mut baselines = self.volume_baseline.lock();
        let window = baselines
            .entry(symbol.to_string())
            .or_insert_with(|| VecDeque::with_capacity(64));
        if window.len() >= 64 {
            window.pop_front();
        }
        window.push_back(volume);
    }

    fn volume_anomaly_score(&self, symbol: &str, current_volume: f64) -> f64 {
        let baselines = self.volume_baseline.lock();
        let Some(window) = baselines.get(symbol) else {
            return 0.0;
        };
        if window.is_empty() {
            return 0.0;
        }
        let median = median_of(&window.iter().copied().collect::<Vec<_>>());
        if median <= 0.0 {
            return 0.0;
        }
        ((current_volume - median) / median).clamp(0.0, 1.0)
    }

    /// Read the latest published snapshot for `symbol`, if any.
    pub fn latest_for(&self, symbol: &str) -> Option<Arc<ConsensusPrice>> {
        let latest = self.latest.lock();
        latest.get(symbol).map(|slot| slot.load_full())
    }

    /// Point-in-time snapshot of every tracked symbol's latest consensus,
    /// for the CLI's `oracle-status` command.
    pub fn clone_latest_map(&self) -> HashMap<String, Arc<ConsensusPrice>> {
        let latest = self.latest.lock();
        latest
            .iter()
            .map(|(symbol, slot)| (symbol.clone(), slot.load_full()))
            .collect()
    }

    /// Recompute and publish the `ConsensusPrice` for `symbol` from the
    /// currently-held samples. Returns the new snapshot.
    ///
    /// Implements spec.md §4.3 steps 1-8 verbatim.
    pub fn refresh_symbol(
        &self,
        symbol: &str,
        policy: &PolicyConfig,
        current_volume: f64,
    ) -> Arc<ConsensusPrice> {
        let now = Utc::now();
        let max_age = chrono::Duration::from_std(policy.max_sample_age()).unwrap_or_default();

        // 1. Gather the latest non-stale sample per contributing source.
        let rings = self.rings.lock();
        let mut latest_per_source: Vec<OracleSample> = rings
            .iter()
            .filter(|((sym, _), _)| sym == symbol)
            .filter_map(|(_, ring)| ring.latest())
            .filter(|s| now.signed_duration_since(s.reported_at) <= max_age)
            .cloned()
            .collect();
        drop(rings);
        latest_per_source.sort_by(|a, b| a.source_id.cmp(&b.source_id));

        let min_sources = policy.raw.min_sources as usize;

        let snapshot = if latest_per_source.len() < min_sources {
            // 2. Not enough distinct sources survive freshness filtering.
            ConsensusPrice {
                symbol: symbol.to_string(),
                consensus_price: 0.0,
                deviation_max: 0.0,
                deviation_mean: 0.0,
                contributing_sources_count: latest_per_source.len() as u32,
                manipulation_score: 1.0,
                computed_at: now,
                stale: true,
            }
        } else {
            // 3. Median across latest sample per source.
            let median = median_of(&latest_per_source.iter().map(|s| s.price).collect::<Vec<_>>());

            // 4. Per-source deviation from the median.
            let mut deviations: Vec<(OracleSample, f64)> = latest_per_source
                .iter()
                .cloned()
                .map(|s| {
                    let dev = if median > 0.0 {
                        (s.price - median).abs() / median
                    } else {
                        0.0
                    };
                    (s, dev)
                })
                .collect();

            // 5. Drop outliers; closed interval below threshold, open above
            //    (equal-to-threshold sources survive, per spec.md §8).
            let survivors: Vec<(OracleSample, f64)> = deviations
                .drain(..)
                .filter(|(_, dev)| *dev <= policy.raw.outlier_threshold)
                .collect();

            if survivors.len() < min_sources {
                ConsensusPrice {
                    symbol: symbol.to_string(),
                    consensus_price: median,
                    deviation_max: 0.0,
                    deviation_mean: 0.0,
                    contributing_sources_count: survivors.len() as u32,
                    manipulation_score: 1.0,
                    computed_at: now,
                    stale: true,
                }
            } else {
                // 6. Consensus price and deviation stats over survivors.
                let survivor_prices: Vec<f64> = survivors.iter().map(|(s, _)| s.price).collect();
                let consensus_price = median_of(&survivor_prices);
                let deviation_max = survivors
                    .iter()
                    .map(|(_, d)| *d)
                    .fold(0.0_f64, f64::max);
                let deviation_mean =
                    survivors.iter().map(|(_, d)| *d).sum::<f64>() / survivors.len() as f64;

                // 7. Manipulation score.
                let (alpha, beta, gamma) = policy.raw.manipulation_weights;
                let survivor_frac = survivors.len() as f64 / latest_per_source.len() as f64;
                let volume_anomaly = self.volume_anomaly_score(symbol, current_volume);
                let manipulation_score = (alpha * deviation_max
                    + beta * (1.0 - survivor_frac)
                    + gamma * volume_anomaly)
                    .clamp(0.0, 1.0);

                ConsensusPrice {
                    symbol: symbol.to_string(),
                    consensus_price,
                    deviation_max,
                    deviation_mean,
                    contributing_sources_count: survivors.len() as u32,
                    manipulation_score,
                    computed_at: now,
                    stale: false,
                }
            }
        };

        let snapshot = Arc::new(snapshot);
        let mut latest = self.latest.lock();
        let slot = latest
            .entry(symbol.to_string())
            .or_insert_with(|| Arc::new(ArcSwap::from_pointee(snapshot.as_ref().clone())));
        slot.store(snapshot.clone());
        snapshot
    }
}

fn median_of(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    Data::new(values.to_vec()).median()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RawPolicyConfig;

    fn sample(source: &str, price: f64) -> OracleSample {
        OracleSample {
            source_id: source.to_string(),
            symbol: "SOL".to_string(),
            price,
            reported_at: Utc::now(),
            signature: None,
        }
    }

    #[test]
    fn consensus_with_exactly_min_sources_is_valid() {
        let policy = PolicyConfig::validate(RawPolicyConfig::default()).unwrap();
        let book = ConsensusBook::new(policy.raw.sample_window);
        book.ingest(sample("a", 100.0));
        book.ingest(sample("b", 100.1));
        book.ingest(sample("c", 99.9));
        let snap = book.refresh_symbol("SOL", &policy, 0.0);
        assert!(!snap.stale);
        assert_eq!(snap.contributing_sources_count, 3);
    }

    #[test]
    fn too_few_sources_marks_stale_with_full_manipulation() {
        let policy = PolicyConfig::validate(RawPolicyConfig::default()).unwrap();
        let book = ConsensusBook::new(policy.raw.sample_window);
        book.ingest(sample("a", 100.0));
        let snap = book.refresh_symbol("SOL", &policy, 0.0);
        assert!(snap.stale);
        assert_eq!(snap.manipulation_score, 1.0);
    }

    #[test]
    fn outlier_beyond_threshold_is_dropped() {
        let mut raw = RawPolicyConfig::default();
        raw.outlier_threshold = 0.05;
        let policy = PolicyConfig::validate(raw).unwrap();
        let book = ConsensusBook::new(policy.raw.sample_window);
        book.ingest(sample("a", 100.0));
        book.ingest(sample("b", 100.5));
        book.ingest(sample("c", 99.5));
        book.ingest(sample("d", 200.0)); // wild outlier
        let snap = book.refresh_symbol("SOL", &policy, 0.0);
        assert_eq!(snap.contributing_sources_count, 3);
        assert!(snap.deviation_max <= 0.05 + 1e-9);
    }
}
