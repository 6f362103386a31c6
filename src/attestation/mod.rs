//! ZK Attestation (C4): given a Verdict, produce a succinct Attestation
//! whose public inputs reveal only `{verdict_commitment, recommendation,
//! risk_level, policy_version, timestamp}`, hiding trust-score composition.

pub mod canonical;
pub mod hash_binding;
pub mod scheme;

#[cfg(feature = "zk-groth16")]
pub mod groth16;
#[cfg(feature = "zk-stark")]
pub mod stark;

use crate::error::ProveError;
use crate::types::{Attestation, Verdict};
use hash_binding::HashBindingScheme;
use scheme::{ProofScheme, Witness};
use std::sync::Arc;

/// Which `ProofScheme` backend is active for this process, selected once at
/// startup (env var `TRUSTWRAPPER_ZK_SCHEME`, spec.md §6).
pub fn scheme_from_name(name: &str) -> Result<Arc<dyn ProofScheme>, ProveError> {
    match name {
        "hash_binding" | "" => Ok(Arc::new(HashBindingScheme::derive_default())),
        #[cfg(feature = "zk-groth16")]
        "groth16" => Ok(Arc::new(groth16::Groth16Scheme::new())),
        #[cfg(not(feature = "zk-groth16"))]
        "groth16" => Err(ProveError::SchemeUnavailable("groth16".to_string())),
        #[cfg(feature = "zk-stark")]
        "stark" => Ok(Arc::new(stark::StarkScheme::new())),
        #[cfg(not(feature = "zk-stark"))]
        "stark" => Err(ProveError::SchemeUnavailable("stark".to_string())),
        other => Err(ProveError::SchemeUnavailable(other.to_string())),
    }
}

/// Proves `verdict` under `scheme` with a bounded deadline. The caller
/// (`Wrapper::verify`) is responsible for racing this against
/// `prove_deadline` via `tokio::time::timeout` since proving itself is
/// CPU-bound and run on a blocking/rayon thread.
pub fn prove(scheme: &dyn ProofScheme, verdict: &Verdict, witness: &Witness) -> Result<Attestation, ProveError> {
    scheme.prove(verdict, witness)
}

/// Builds one Attestation over N Verdicts via a Merkle root of their
/// individual commitments (spec.md §4.4), reusing the audit log's BLAKE3
/// primitive rather than a second hash function.
pub fn prove_batch(scheme: &dyn ProofScheme, verdicts: &[Verdict]) -> Result<Attestation, ProveError> {
    if verdicts.is_empty() {
        return Err(ProveError::InvalidWitness);
    }
    let leaves: Vec<[u8; 32]> = verdicts.iter().map(crate::canonical::verdict_commitment).collect();
    let root = merkle_root(&leaves);

    // The batch "verdict" carries the root as its own commitment surface;
    // scheme.prove still binds policy_version/code_version/timestamp from
    // the representative (first) verdict, since those are shared across a
    // single proving call's batch by construction in `Wrapper::verify_batch`.
    let mut representative = verdicts[0].clone();
    representative.explanations.clear();

    let witness = Witness {
        sub_scores: leaves.iter().map(|leaf| leaf[0] as f64 / 255.0).collect(),
    };
    let mut attestation = scheme.prove(&representative, &witness)?;
    attestation.verdict_commitment = root;
    Ok(attestation)
}

fn merkle_root(leaves: &[[u8; 32]]) -> [u8; 32] {
    if leaves.len() == 1 {
        return leaves[0];
    }
    let mut level: Vec<[u8; 32]> = leaves.to_vec();
    while level.len() > 1 {
        let mut next = Vec::with_capacity(level.len().div_ceil(2));
        for pair in level.chunks(2) {
            let mut hasher = blake3::Hasher::new();
            hasher.update(&pair[0]);
            hasher.update(pair.get(1).unwrap_or(&pair[0]));
            next.push(*hasher.finalize().as_bytes());
        }
        level = next;
    }
    level[0]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merkle_root_is_order_sensitive() {
        let a = [1u8; 32];
        let b = [2u8; 32];
        assert_ne!(merkle_root(&[a, b]), merkle_root(&[b, a]));
    }

    #[test]
    fn single_leaf_root_is_itself() {
        let a = [7u8; 32];
        assert_eq!(merkle_root(&[a]), a);
    }
}
