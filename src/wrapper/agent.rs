//! `AgentCallable`: the wrapper's only dependency on agent code, breaking
//! the wrapper↔agent cyclic graph flagged in spec.md §9 ("the wrapper
//! depends on an AgentCallable; the agent never depends on the wrapper"),
//! grounded on the `veritas-core::Agent` trait split in `other_examples`.

use crate::error::VerifyError;
use crate::types::{AgentHandle, Decision};
use async_trait::async_trait;

/// Untrusted agent logic that proposes a `Decision` for the wrapper to
/// verify. Implementations may be backed by an LLM, a trading strategy, or
/// arbitrary external code — the wrapper never inspects how `propose`
/// arrives at its answer, only the `Decision` it returns.
#[async_trait]
pub trait AgentCallable: Send + Sync {
    /// Stable identifier for audit and cache-key purposes.
    fn handle(&self) -> &AgentHandle;

    /// Produce the next `Decision` to verify. Callers that already have a
    /// `Decision` in hand (most programmatic integrations) can skip this
    /// trait entirely and call `Wrapper::verify` directly.
    async fn propose(&self) -> Result<Decision, VerifyError>;
}
