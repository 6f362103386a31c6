//! `HASH_BINDING_ONLY` scheme: always available, no optional crate
//! required. Not a SNARK — a keyed BLAKE3 binding of the verdict
//! commitment to a witness commitment, verified in constant time.

use crate::attestation::canonical::encode_public_inputs;
use crate::attestation::scheme::{constant_time_eq, ProofScheme, SchemeTag, Witness};
use crate::canonical::verdict_commitment;
use crate::error::ProveError;
use crate::types::{Attestation, Verdict};
use chrono::Utc;

pub struct HashBindingScheme {
    key: [u8; 32],
}

impl HashBindingScheme {
    pub fn new(key: [u8; 32]) -> Self {
        Self { key }
    }

    /// Derives a fixed key from the crate's code version so the scheme
    /// needs no external key-management; keyed only to bind proofs to this
    /// build, not for confidentiality (the scheme is explicitly not a
    /// SNARK).
    pub fn derive_default() -> Self {
        let code_version = crate::config::code_version();
        let mut seed = [0u8; 32];
        seed[0..4].copy_from_slice(&code_version.to_le_bytes());
        Self::new(*blake3::hash(&seed).as_bytes())
    }

    fn witness_commitment(&self, witness: &Witness) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new_keyed(&self.key);
        for score in &witness.sub_scores {
            hasher.update(&score.to_le_bytes());
        }
        *hasher.finalize().as_bytes()
    }

    fn seal(&self, verdict_commitment: [u8; 32], witness_commitment: [u8; 32]) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new_keyed(&self.key);
        hasher.update(&verdict_commitment);
        hasher.update(&witness_commitment);
        *hasher.finalize().as_bytes()
    }
}

impl ProofScheme for HashBindingScheme {
    fn scheme_tag(&self) -> SchemeTag {
        SchemeTag::HashBindingOnly
    }

    fn setup(&self) -> Result<(), ProveError> {
        Ok(())
    }

    fn prove(&self, verdict: &Verdict, witness: &Witness) -> Result<Attestation, ProveError> {
        let commitment = verdict_commitment(verdict);
        let witness_commitment = self.witness_commitment(witness);
        let seal = self.seal(commitment, witness_commitment);
        let public_inputs = encode_public_inputs(verdict, commitment).to_vec();

        let mut proof_blob = Vec::with_capacity(64);
        proof_blob.extend_from_slice(&witness_commitment);
        proof_blob.extend_from_slice(&seal);

        Ok(Attestation {
            verdict_commitment: commitment,
            proof_blob,
            public_inputs,
            scheme_tag: SchemeTag::HashBindingOnly as u16,
            created_at: Utc::now(),
        })
    }

    fn verify(&self, attestation: &Attestation, expected_public_inputs: &[u8]) -> bool {
        if attestation.scheme_tag != SchemeTag::HashBindingOnly as u16 {
            return false;
        }
        if attestation.proof_blob.len() != 64 {
            return false;
        }
        if !constant_time_eq(&attestation.public_inputs, expected_public_inputs) {
            return false;
        }
        let witness_commitment: [u8; 32] = attestation.proof_blob[0..32].try_into().unwrap();
        let claimed_seal: [u8; 32] = attestation.proof_blob[32..64].try_into().unwrap();
        let recomputed_seal = self.seal(attestation.verdict_commitment, witness_commitment);
        constant_time_eq(&recomputed_seal, &claimed_seal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Explanation, Recommendation, RiskFactors, RiskLevel};

    fn sample_verdict() -> Verdict {
        Verdict {
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
        }
    }

    #[test]
    fn round_trip_verifies() {
        let scheme = HashBindingScheme::derive_default();
        let verdict = sample_verdict();
        let witness = Witness {
            sub_scores: vec![0.1, 0.2, 0.3],
        };
        let attestation = scheme.prove(&verdict, &witness).unwrap();
        let expected = encode_public_inputs(&verdict, attestation.verdict_commitment).to_vec();
        assert!(scheme.verify(&attestation, &expected));
    }

    #[test]
    fn mutated_verdict_breaks_verification() {
        let scheme = HashBindingScheme::derive_default();
        let verdict = sample_verdict();
        let witness = Witness {
            sub_scores: vec![0.1, 0.2, 0.3],
        };
        let attestation = scheme.prove(&verdict, &witness).unwrap();

        let mut mutated = verdict.clone();
        mutated.trust_score += 0.0001;
        let mutated_commitment = verdict_commitment(&mutated);
        let mutated_public_inputs = encode_public_inputs(&mutated, mutated_commitment).to_vec();

        assert!(!scheme.verify(&attestation, &mutated_public_inputs));

        let original_public_inputs = encode_public_inputs(&verdict, attestation.verdict_commitment).to_vec();
        assert!(scheme.verify(&attestation, &original_public_inputs));
    }
}
