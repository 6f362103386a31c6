//! Append-only audit trail (C5b): single-writer thread fed by a bounded
//! `crossbeam_channel`, mirroring the teacher's dedicated-writer-thread
//! idiom rather than putting blocking sqlite calls on the async runtime.
//! Rolling hash chain: `record[i].prev_hash = blake3(serialize(record[i-1]))`.

use crate::audit::sink::AuditSink;
use crate::error::AuditError;
use crate::types::AuditRecord;
use crossbeam_channel::{bounded, Sender, TrySendError};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{error, warn};

fn hash_record(record: &AuditRecord) -> [u8; 32] {
    let bytes = serde_json::to_vec(record).expect("AuditRecord always serializes");
    *blake3::hash(&bytes).as_bytes()
}

struct WriterState {
    sink: Arc<dyn AuditSink>,
    prev_hash: [u8; 32],
}

/// Owns the writer thread and the channel feeding it. Dropping the
/// `AuditLog` closes the channel, which lets the writer thread drain and
/// exit; callers that want a hard stop should call `shutdown`.
pub struct AuditLog {
    tx: Sender<AuditRecord>,
    backpressure_timeout: Duration,
    handle: Mutex<Option<JoinHandle<()>>>,
    degraded: std::sync::atomic::AtomicBool,
    sink: Arc<dyn AuditSink>,
}

impl AuditLog {
    pub fn new(sink: Arc<dyn AuditSink>, queue_capacity: usize, backpressure_timeout: Duration) -> Self {
        let (tx, rx) = bounded::<AuditRecord>(queue_capacity);
        let initial_hash = sink.latest_hash().unwrap_or([0u8; 32]);
        let reader_sink = sink.clone();
        let mut state = WriterState {
            sink,
            prev_hash: initial_hash,
        };
        let handle = std::thread::Builder::new()
            .name("trustwrapper-audit-writer".to_string())
            .spawn(move || {
                while let Ok(mut record) = rx.recv() {
                    record.prev_hash = state.prev_hash;
                    match state.sink.append(&record) {
                        Ok(()) => state.prev_hash = hash_record(&record),
                        Err(e) => error!(error = %e, "audit sink append failed; record dropped"),
                    }
                }
            })
            .expect("spawning the audit writer thread");

        Self {
            tx,
            backpressure_timeout,
            handle: Mutex::new(Some(handle)),
            degraded: std::sync::atomic::AtomicBool::new(false),
            sink: reader_sink,
        }
    }

    /// Read-only range query against the backing sink, bypassing the
    /// writer queue — used by `audit-range` and other reporting paths that
    /// don't need the hash-chain ordering guarantees of `append`.
    pub fn range(&self, from_unix: i64, to_unix: i64) -> Result<Vec<AuditRecord>, AuditError> {
        self.sink.range(from_unix, to_unix)
    }

    /// Appends `record` (its `prev_hash` field is overwritten by the
    /// writer thread with the true chain value). Blocks up to
    /// `audit_backpressure_timeout`; on timeout returns
    /// `AuditError::Backpressure` without ever blocking the caller's
    /// verification hot path indefinitely.
    pub fn append(&self, record: AuditRecord) -> Result<(), AuditError> {
        match self.tx.send_timeout(record, self.backpressure_timeout) {
            Ok(()) => {
                self.degraded.store(false, std::sync::atomic::Ordering::Relaxed);
                Ok(())
            }
            Err(crossbeam_channel::SendTimeoutError::Timeout(_)) => {
                warn!("audit queue backpressure exceeded timeout; pipeline degraded");
                self.degraded.store(true, std::sync::atomic::Ordering::Relaxed);
                Err(AuditError::Backpressure(self.backpressure_timeout))
            }
            Err(crossbeam_channel::SendTimeoutError::Disconnected(_)) => {
                Err(AuditError::SinkFailure("audit writer thread has exited".to_string()))
            }
        }
    }

    /// Non-blocking best-effort append, used by the async retry task queued
    /// after a `Backpressure` error (spec.md §4.5).
    pub fn try_append(&self, record: AuditRecord) -> Result<(), AuditError> {
        match self.tx.try_send(record) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(AuditError::Backpressure(Duration::ZERO)),
            Err(TrySendError::Disconnected(_)) => {
                Err(AuditError::SinkFailure("audit writer thread has exited".to_string()))
            }
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.load(std::sync::atomic::Ordering::Relaxed)
    }

    pub fn shutdown(&self) {
        drop(self.tx.clone());
        if let Some(handle) = self.handle.lock().take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::sink::MemorySink;
    use crate::types::{Explanation, Recommendation, RiskFactors, RiskLevel, Verdict};
    use chrono::Utc;

    fn sample_record(tag: &str) -> AuditRecord {
        AuditRecord {
            record_id: uuid::Uuid::new_v4(),
            decision_fingerprint: [1u8; 32],
            verdict: Verdict {
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
            },
            attestation_id: None,
            latency_ns: 1_200_000,
            outcome_tag: tag.to_string(),
            wall_time: Utc::now(),
            prev_hash: [0u8; 32],
        }
    }

    #[test]
    fn appended_records_chain_prev_hash() {
        let sink: Arc<dyn AuditSink> = Arc::new(MemorySink::new());
        let log = AuditLog::new(sink.clone(), 16, Duration::from_millis(100));
        log.append(sample_record("a")).unwrap();
        log.append(sample_record("b")).unwrap();
        log.shutdown();

        let all = sink.range(0, i64::MAX).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].prev_hash, [0u8; 32]);
        assert_eq!(all[1].prev_hash, hash_record(&all[0]));
    }
}
