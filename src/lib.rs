//! TrustWrapper: a local-first verification layer that sits between an AI
//! agent (trading strategy or LLM assistant) and the actions it wants to
//! take, producing a bounded-latency Verdict, an optional zero-knowledge
//! Attestation, and an append-only audit trail.
//!
//! Exposes every module for use by the `trustwrapper` binary and by tests.

pub mod attestation;
pub mod audit;
pub mod cache;
pub mod canonical;
pub mod config;
pub mod engine;
pub mod error;
pub mod oracle;
pub mod types;
pub mod wrapper;

pub use attestation::scheme::ProofScheme;
pub use audit::AuditSink;
pub use config::{PolicyConfig, RawPolicyConfig, Tier};
pub use error::{AuditError, OracleError, ProveError, VerifyError};
pub use oracle::source::Source as OracleSource;
pub use oracle::OracleConsensus;
pub use types::{
    AgentHandle, Attestation, AuditRecord, Decision, Explanation, MarketContext, Recommendation,
    RiskFactors, RiskLevel, TradeAction, Verdict,
};
pub use wrapper::{AgentCallable, CallerMeta, VerifyOptions, VerifyOutcome, Wrapper};
