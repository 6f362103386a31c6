//! Error taxonomy for the verification pipeline.
//!
//! Only a handful of these ever escape `Wrapper::verify` as an `Err` — most
//! degrade a `Verdict` in place (see `docs` on `VerifyError::is_fatal`).

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum VerifyError {
    #[error("policy configuration invalid: {0}")]
    ConfigInvalid(String),

    #[error("deadline too tight: need at least {min_budget_ms}ms, got {given_ms}ms")]
    DeadlineTooTight { min_budget_ms: u64, given_ms: u64 },

    #[error("oracle subsystem unavailable for symbol {0}")]
    OracleUnavailable(String),

    #[error("consensus break detected for symbol {0}: manipulation_score={1:.3}")]
    ConsensusBreak(String, f64),

    #[error("detector {0} exceeded its deadline")]
    DetectorTimeout(String),

    #[error("proof generation exceeded prove_deadline")]
    ProveTimeout,

    #[error("audit log degraded: {0}")]
    AuditDegraded(String),

    #[error("input malformed: {0}")]
    InputMalformed(String),

    #[error("policy version mismatch: attestation bound to {expected}, verifier has {actual}")]
    PolicyVersionMismatch { expected: u32, actual: u32 },
}

impl VerifyError {
    /// Whether this error kind can ever surface as an `Err` from `verify`.
    ///
    /// Every other kind is folded into a degraded `Verdict` (a factor plus,
    /// where relevant, `deadline_hit`) rather than propagated.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            VerifyError::ConfigInvalid(_)
                | VerifyError::DeadlineTooTight { .. }
                | VerifyError::InputMalformed(_)
        )
    }
}

pub type VerifyResult<T> = Result<T, VerifyError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OracleError {
    #[error("source {0} failed: {1}")]
    SourceFailed(String, String),
    #[error("no sources configured for symbol {0}")]
    NoSources(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProveError {
    #[error("proving exceeded deadline")]
    Timeout,
    #[error("witness does not bind to the supplied verdict commitment")]
    InvalidWitness,
    #[error("scheme {0} unavailable in this build (missing cargo feature)")]
    SchemeUnavailable(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuditError {
    #[error("audit queue full, dropped after waiting {0:?}")]
    Backpressure(std::time::Duration),
    #[error("audit sink I/O failure: {0}")]
    SinkFailure(String),
}
