//! Wrapper Runtime (C1): the only public entry point into the pipeline.
//! `agent` breaks the wrapper↔agent dependency cycle; `runtime` owns the
//! `Wrapper` struct that drives C2-C6 under a hard deadline.

pub mod agent;
pub mod runtime;

pub use agent::AgentCallable;
pub use runtime::{CallerMeta, VerifyOptions, VerifyOutcome, Wrapper};
