//! Wrapper Runtime (C1): the single public entry point. Drives C2-C4 with a
//! hard total deadline, appends one `AuditRecord` per call, and never
//! silently approves on partial failure (spec.md §4.1).

use crate::attestation::scheme::{ProofScheme, Witness};
use crate::audit::AuditLog;
use crate::cache::{CachedVerdict, Fingerprint, FingerprintCache};
use crate::canonical::decision_fingerprint;
use crate::config::{PolicyConfig, RawPolicyConfig};
use crate::engine::VerificationEngine;
use crate::error::VerifyError;
use crate::oracle::OracleConsensus;
use crate::types::{AgentHandle, Attestation, AuditRecord, Decision, Recommendation, Verdict};
use arc_swap::ArcSwap;
use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{instrument, warn};
use uuid::Uuid;

use super::agent::AgentCallable;

/// Caller-supplied context accompanying a `Decision`. `agent` is the only
/// field the core requires; identity management beyond this opaque handle
/// is out of scope (spec.md §1).
#[derive(Debug, Clone)]
pub struct CallerMeta {
    pub agent: AgentHandle,
    pub tags: Vec<String>,
}

impl CallerMeta {
    pub fn new(agent: AgentHandle) -> Self {
        Self { agent, tags: Vec::new() }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct VerifyOptions {
    pub deadline: Instant,
    pub want_attestation: bool,
}

impl VerifyOptions {
    pub fn new(deadline: Instant) -> Self {
        Self { deadline, want_attestation: true }
    }

    pub fn verify_only(deadline: Instant) -> Self {
        Self { deadline, want_attestation: false }
    }
}

#[derive(Debug, Clone)]
pub struct VerifyOutcome {
    pub verdict: Verdict,
    pub attestation: Option<Attestation>,
}

/// Owns every component handle the pipeline needs. Cheap to clone — every
/// field is `Arc`-backed — so `verify_batch` can hand a clone to each
/// parallel task without lifetime gymnastics.
#[derive(Clone)]
pub struct Wrapper {
    oracle: Arc<OracleConsensus>,
    engine: Arc<VerificationEngine>,
    scheme: Arc<dyn ProofScheme>,
    cache: Arc<FingerprintCache>,
    audit: Arc<AuditLog>,
    policy: Arc<ArcSwap<PolicyConfig>>,
}

impl Wrapper {
    pub fn new(
        policy: PolicyConfig,
        oracle: Arc<OracleConsensus>,
        engine: Arc<VerificationEngine>,
        scheme: Arc<dyn ProofScheme>,
        cache: Arc<FingerprintCache>,
        audit: Arc<AuditLog>,
    ) -> Self {
        Self {
            oracle,
            engine,
            scheme,
            cache,
            audit,
            policy: Arc::new(ArcSwap::from_pointee(policy)),
        }
    }

    pub fn policy(&self) -> Arc<PolicyConfig> {
        self.policy.load_full()
    }

    pub fn policy_handle(&self) -> Arc<ArcSwap<PolicyConfig>> {
        self.policy.clone()
    }

    pub fn oracle(&self) -> &Arc<OracleConsensus> {
        &self.oracle
    }

    pub fn audit(&self) -> &Arc<AuditLog> {
        &self.audit
    }

    /// Atomically swaps in a newly validated policy. Readers never observe
    /// a partially-updated config: the candidate is fully validated before
    /// the swap, and `ArcSwap::store` is itself atomic (spec.md §4.6).
    pub fn reload_policy(&self, raw: RawPolicyConfig) -> Result<(), VerifyError> {
        let validated = PolicyConfig::validate(raw)?;
        self.policy.store(Arc::new(validated));
        Ok(())
    }

    /// Verifies an agent-proposed decision in one call: `propose` then
    /// `verify`. Exists only to exercise `AgentCallable`; direct callers
    /// with a `Decision` in hand should call `verify` instead.
    pub async fn verify_agent(
        &self,
        agent: &dyn AgentCallable,
        options: VerifyOptions,
    ) -> Result<VerifyOutcome, VerifyError> {
        let decision = agent.propose().await?;
        self.verify(decision, CallerMeta::new(agent.handle().clone()), options).await
    }

    /// The single public entry point (spec.md §4.1). Returns before
    /// `deadline + grace`; if internal work cannot finish, returns a
    /// Verdict with `deadline_hit = true` rather than a partial success.
    #[instrument(skip(self, decision, caller_meta, options), fields(agent = %caller_meta.agent))]
    pub async fn verify(
        &self,
        decision: Decision,
        caller_meta: CallerMeta,
        options: VerifyOptions,
    ) -> Result<VerifyOutcome, VerifyError> {
        let start = Instant::now();
        decision.validate().map_err(VerifyError::InputMalformed)?;

        let policy = self.policy.load_full();
        let remaining = options.deadline.saturating_duration_since(Instant::now());
        if remaining < policy.min_latency_budget() {
            return Err(VerifyError::DeadlineTooTight {
                min_budget_ms: policy.min_latency_budget().as_millis() as u64,
                given_ms: remaining.as_millis() as u64,
            });
        }

        let fingerprint = decision_fingerprint(&decision);
        let cache_key = shard_key(fingerprint, policy.raw.policy_version);
        let ttl = chrono::Duration::from_std(policy.cache_ttl()).unwrap_or_default();

        if let Some(cached) = self.cache.get_fresh(&cache_key, Utc::now(), ttl) {
            self.record_audit(fingerprint, &cached.verdict, cached.attestation_id, start.elapsed(), "cache_hit");
            return Ok(VerifyOutcome { verdict: cached.verdict, attestation: None });
        }

        // Single-flight: only the first caller for this key computes;
        // followers await its completion and re-check the cache.
        if let Some(notify) = self.cache.begin_single_flight(cache_key).await {
            notify.notified().await;
            if let Some(cached) = self.cache.get_fresh(&cache_key, Utc::now(), ttl) {
                self.record_audit(fingerprint, &cached.verdict, cached.attestation_id, start.elapsed(), "cache_hit_after_wait");
                return Ok(VerifyOutcome { verdict: cached.verdict, attestation: None });
            }
            // The leader's compute failed outright (e.g. returned an Err);
            // fall through and compute this call's own result instead of
            // leaving the caller without an answer.
        }

        let outcome = self
            .compute(&decision, &policy, options.deadline, options.want_attestation)
            .await;

        // The cache is updated only on complete success (spec.md §5): a
        // degraded-but-successful Verdict still counts, a hard Err does not.
        if let Ok(out) = &outcome {
            self.cache.insert(
                cache_key,
                CachedVerdict {
                    verdict: out.verdict.clone(),
                    attestation_id: out.attestation.as_ref().map(|a| a.verdict_commitment),
                    cached_at: Utc::now(),
                },
            );
        }
        self.cache.finish_single_flight(cache_key).await;

        if let Ok(out) = &outcome {
            self.record_audit(fingerprint, &out.verdict, out.attestation.as_ref().map(|a| a.verdict_commitment), start.elapsed(), "computed");
        }

        outcome
    }

    /// Independent parallel verification; output order matches input order
    /// and one failure never aborts the others (spec.md §4.1).
    pub async fn verify_batch(
        &self,
        decisions: Vec<(Decision, CallerMeta)>,
        options: VerifyOptions,
    ) -> Vec<Result<VerifyOutcome, VerifyError>> {
        let mut set = tokio::task::JoinSet::new();
        let total = decisions.len();
        for (index, (decision, caller_meta)) in decisions.into_iter().enumerate() {
            let this = self.clone();
            set.spawn(async move {
                let result = this.verify(decision, caller_meta, options).await;
                (index, result)
            });
        }

        let mut results: Vec<Option<Result<VerifyOutcome, VerifyError>>> = (0..total).map(|_| None).collect();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((index, result)) => results[index] = Some(result),
                Err(join_err) => warn!(error = %join_err, "verify_batch subtask panicked"),
            }
        }

        results
            .into_iter()
            .map(|slot| {
                slot.unwrap_or_else(|| {
                    Err(VerifyError::DeadlineTooTight {
                        min_budget_ms: 0,
                        given_ms: 0,
                    })
                })
            })
            .collect()
    }

    async fn compute(
        &self,
        decision: &Decision,
        policy: &PolicyConfig,
        deadline: Instant,
        want_attestation: bool,
    ) -> Result<VerifyOutcome, VerifyError> {
        let market = match decision.asset_symbol() {
            Some(symbol) => match self.oracle.market_context_for(symbol).await {
                Some(ctx) => Some(ctx),
                None => {
                    self.trigger_background_refresh(symbol.to_string());
                    None
                }
            },
            None => None,
        };

        let mut verdict = self.engine.evaluate(decision, market.as_ref(), policy, deadline);

        if Instant::now() > deadline && !verdict.deadline_hit {
            verdict.deadline_hit = true;
            // A degraded path never upgrades a recommendation (spec.md §7).
            if verdict.recommendation == Recommendation::Approve {
                verdict.recommendation = Recommendation::Review;
            }
        }

        let attestation = if want_attestation && verdict.recommendation != Recommendation::Reject {
            let prove_budget = policy.prove_deadline().min(deadline.saturating_duration_since(Instant::now()));
            match tokio::time::timeout(prove_budget, self.prove_async(verdict.clone())).await {
                Ok(Ok(attestation)) => Some(attestation),
                Ok(Err(_)) | Err(_) => None, // PROVE_TIMEOUT: Verdict still emitted, no attestation.
            }
        } else {
            None
        };

        Ok(VerifyOutcome { verdict, attestation })
    }

    /// Proving is CPU-bound; run it off the async executor so it never
    /// blocks other in-flight `verify` calls sharing the runtime.
    async fn prove_async(&self, verdict: Verdict) -> Result<Attestation, crate::error::ProveError> {
        let scheme = self.scheme.clone();
        let sub_scores: Vec<f64> = verdict.explanations.iter().map(|e| e.weight).collect();
        tokio::task::spawn_blocking(move || {
            let witness = Witness { sub_scores };
            crate::attestation::prove(scheme.as_ref(), &verdict, &witness)
        })
        .await
        .map_err(|_| crate::error::ProveError::Timeout)?
    }

    fn trigger_background_refresh(&self, symbol: String) {
        let oracle = self.oracle.clone();
        let policy = self.policy.clone();
        tokio::spawn(async move {
            oracle.track_symbol(symbol).await;
            let snapshot = policy.load_full();
            oracle.poll_once(&snapshot).await;
        });
    }

    fn record_audit(&self, fingerprint: Fingerprint, verdict: &Verdict, attestation_id: Option<[u8; 32]>, elapsed: Duration, outcome_tag: &str) {
        let record = AuditRecord {
            record_id: Uuid::new_v4(),
            decision_fingerprint: fingerprint,
            verdict: verdict.clone(),
            attestation_id,
            latency_ns: elapsed.as_nanos() as u64,
            outcome_tag: outcome_tag.to_string(),
            wall_time: Utc::now(),
            prev_hash: [0u8; 32], // overwritten by the audit writer thread with the true chain value.
        };
        // The Wrapper never silently drops an AuditRecord (spec.md §4.5):
        // a blocked append degrades to PIPELINE_DEGRADED and is retried
        // asynchronously rather than dropped.
        if let Err(e) = self.audit.append(record.clone()) {
            warn!(error = %e, "audit append degraded; queuing async retry");
            let audit = self.audit.clone();
            tokio::spawn(async move {
                if audit.try_append(record).is_err() {
                    warn!("audit retry also failed; record lost");
                }
            });
        }
    }
}

/// Folds `policy_version` into the fingerprint cache key so a policy
/// change invalidates previously cached verdicts without a separate
/// epoch counter (spec.md §3's `decision_fingerprint + policy_version +
/// context_epoch`; the context_epoch half of that triple is covered by
/// `FingerprintCache::get_fresh`'s TTL/staleness check at read time).
fn shard_key(fingerprint: [u8; 32], policy_version: u32) -> Fingerprint {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&fingerprint);
    hasher.update(&policy_version.to_le_bytes());
    *hasher.finalize().as_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attestation::hash_binding::HashBindingScheme;
    use crate::audit::sink::MemorySink;
    use crate::engine::VerificationEngine;
    use crate::types::{Decision, TradeAction};
    use std::time::Duration;

    fn test_wrapper() -> Wrapper {
        let policy = PolicyConfig::validate(RawPolicyConfig::default()).unwrap();
        let oracle = Arc::new(OracleConsensus::new(&policy));
        let engine = Arc::new(VerificationEngine::with_built_in_knowledge_base());
        let scheme: Arc<dyn ProofScheme> = Arc::new(HashBindingScheme::derive_default());
        let cache = Arc::new(FingerprintCache::new(64));
        let audit = Arc::new(AuditLog::new(Arc::new(MemorySink::new()), 64, Duration::from_millis(100)));
        Wrapper::new(policy, oracle, engine, scheme, cache, audit)
    }

    fn buy_decision() -> Decision {
        Decision::Trade {
            action: TradeAction::Buy,
            asset_symbol: "SOL".into(),
            quantity: 1.0,
            price: 185.5,
            confidence: 0.82,
            strategy_tag: "mean_reversion".into(),
            timeframe: "1h".into(),
        }
    }

    #[tokio::test]
    async fn deadline_too_tight_is_refused_pre_flight() {
        let wrapper = test_wrapper();
        let options = VerifyOptions::new(Instant::now());
        let result = wrapper.verify(buy_decision(), CallerMeta::new(AgentHandle("agent-1".into())), options).await;
        assert!(matches!(result, Err(VerifyError::DeadlineTooTight { .. })));
    }

    #[tokio::test]
    async fn no_market_context_degrades_to_review_or_reject_never_approve() {
        let wrapper = test_wrapper();
        let options = VerifyOptions::new(Instant::now() + Duration::from_secs(1));
        let outcome = wrapper
            .verify(buy_decision(), CallerMeta::new(AgentHandle("agent-1".into())), options)
            .await
            .unwrap();
        assert_ne!(outcome.verdict.recommendation, Recommendation::Approve);
        assert!(outcome.verdict.factors.contains(crate::types::RiskFactors::STALE_ORACLE));
    }

    #[tokio::test]
    async fn repeated_call_within_ttl_hits_cache() {
        let wrapper = test_wrapper();
        let options = VerifyOptions::new(Instant::now() + Duration::from_secs(1));
        let caller = CallerMeta::new(AgentHandle("agent-1".into()));
        let first = wrapper.verify(buy_decision(), caller.clone(), options).await.unwrap();
        let second = wrapper.verify(buy_decision(), caller, options).await.unwrap();
        assert_eq!(first.verdict.trust_score, second.verdict.trust_score);
    }

    #[tokio::test]
    async fn verify_batch_preserves_order_and_tolerates_one_bad_decision() {
        let wrapper = test_wrapper();
        let options = VerifyOptions::new(Instant::now() + Duration::from_secs(1));
        let bad = Decision::Trade {
            action: TradeAction::Buy,
            asset_symbol: "".into(), // fails validate() -> INPUT_MALFORMED
            quantity: 1.0,
            price: 1.0,
            confidence: 0.5,
            strategy_tag: "x".into(),
            timeframe: "1h".into(),
        };
        let decisions = vec![
            (buy_decision(), CallerMeta::new(AgentHandle("a".into()))),
            (bad, CallerMeta::new(AgentHandle("b".into()))),
            (buy_decision(), CallerMeta::new(AgentHandle("c".into()))),
        ];
        let results = wrapper.verify_batch(decisions, options).await;
        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(VerifyError::InputMalformed(_))));
        assert!(results[2].is_ok());
    }
}
