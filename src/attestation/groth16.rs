//! `SNARK_GROTH16_STYLE` scheme (`zk-groth16` feature), grounded on the
//! `ark-groth16`/`ark-bn254` stack used by the corpus's tokenized-fund
//! `utils/zk-proofs` crate.
//!
//! The circuit is deliberately minimal: it proves knowledge of the private
//! sub-scores that sum to a public scalar derived from the verdict
//! commitment, without modelling the rest of the verification engine as a
//! circuit — full engine circuitisation is out of scope (spec.md §1).

use crate::attestation::canonical::encode_public_inputs;
use crate::attestation::scheme::{ProofScheme, SchemeTag, Witness};
use crate::canonical::verdict_commitment;
use crate::error::ProveError;
use crate::types::{Attestation, Verdict};
use ark_bn254::{Bn254, Fr};
use ark_ff::PrimeField;
use ark_groth16::{
    create_random_proof, generate_random_parameters, prepare_verifying_key, verify_proof, Proof,
    ProvingKey, VerifyingKey,
};
use ark_relations::r1cs::{ConstraintSynthesizer, ConstraintSystemRef, LinearCombination, SynthesisError, Variable};
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use chrono::Utc;
use parking_lot::Mutex;
use std::sync::OnceLock;

const SUB_SCORE_SLOTS: usize = 4;

/// `sum(sub_scores) == trust_penalty_scalar`, the former private, the
/// latter the circuit's single public input.
struct TrustCompositionCircuit {
    trust_penalty_scalar: Option<Fr>,
    sub_scores: Vec<Option<Fr>>,
}

impl ConstraintSynthesizer<Fr> for TrustCompositionCircuit {
    fn generate_constraints(self, cs: ConstraintSystemRef<Fr>) -> Result<(), SynthesisError> {
        let public_var =
            cs.new_input_variable(|| self.trust_penalty_scalar.ok_or(SynthesisError::AssignmentMissing))?;

        let mut sum_lc = LinearCombination::<Fr>::zero();
        for score in &self.sub_scores {
            let var = cs.new_witness_variable(|| score.ok_or(SynthesisError::AssignmentMissing))?;
            sum_lc = sum_lc + var;
        }

        cs.enforce_constraint(LinearCombination::from(Variable::One), sum_lc, LinearCombination::from(public_var))?;
        Ok(())
    }
}

fn trust_penalty_scalar(commitment: [u8; 32]) -> Fr {
    Fr::from_le_bytes_mod_order(&commitment[0..8])
}

fn empty_circuit() -> TrustCompositionCircuit {
    TrustCompositionCircuit {
        trust_penalty_scalar: None,
        sub_scores: vec![None; SUB_SCORE_SLOTS],
    }
}

static PARAMS: OnceLock<Mutex<(ProvingKey<Bn254>, VerifyingKey<Bn254>)>> = OnceLock::new();

pub struct Groth16Scheme;

impl Groth16Scheme {
    pub fn new() -> Self {
        Self
    }

    fn params(&self) -> &'static Mutex<(ProvingKey<Bn254>, VerifyingKey<Bn254>)> {
        PARAMS.get_or_init(|| {
            let mut rng = ark_std::test_rng();
            let pk = generate_random_parameters::<Bn254, _, _>(empty_circuit(), &mut rng)
                .expect("groth16 trusted setup over a fixed-shape circuit cannot fail");
            let vk = pk.vk.clone();
            Mutex::new((pk, vk))
        })
    }
}

impl Default for Groth16Scheme {
    fn default() -> Self {
        Self::new()
    }
}

impl ProofScheme for Groth16Scheme {
    fn scheme_tag(&self) -> SchemeTag {
        SchemeTag::SnarkGroth16Style
    }

    fn setup(&self) -> Result<(), ProveError> {
        self.params();
        Ok(())
    }

    fn prove(&self, verdict: &Verdict, witness: &Witness) -> Result<Attestation, ProveError> {
        let commitment = verdict_commitment(verdict);
        let public_scalar = trust_penalty_scalar(commitment);

        let mut scores: Vec<Fr> = witness
            .sub_scores
            .iter()
            .map(|s| Fr::from((s * 1_000_000.0).round() as u64))
            .collect();
        scores.resize(SUB_SCORE_SLOTS, Fr::from(0u64));

        let circuit = TrustCompositionCircuit {
            trust_penalty_scalar: Some(public_scalar),
            sub_scores: scores.into_iter().map(Some).collect(),
        };

        let (pk, _vk) = &*self.params().lock();
        let mut rng = ark_std::test_rng();
        let proof = create_random_proof(circuit, pk, &mut rng).map_err(|_| ProveError::InvalidWitness)?;

        let mut proof_blob = Vec::new();
        proof
            .serialize_compressed(&mut proof_blob)
            .map_err(|_| ProveError::InvalidWitness)?;

        let public_inputs = encode_public_inputs(verdict, commitment).to_vec();

        Ok(Attestation {
            verdict_commitment: commitment,
            proof_blob,
            public_inputs,
            scheme_tag: SchemeTag::SnarkGroth16Style as u16,
            created_at: Utc::now(),
        })
    }

    fn verify(&self, attestation: &Attestation, expected_public_inputs: &[u8]) -> bool {
        if attestation.scheme_tag != SchemeTag::SnarkGroth16Style as u16 {
            return false;
        }
        if attestation.public_inputs != expected_public_inputs {
            return false;
        }
        let Ok(proof) = Proof::<Bn254>::deserialize_compressed(&attestation.proof_blob[..]) else {
            return false;
        };
        let (_pk, vk) = &*self.params().lock();
        let pvk = prepare_verifying_key(vk);
        let public_scalar = trust_penalty_scalar(attestation.verdict_commitment);
        verify_proof(&pvk, &proof, &[public_scalar]).unwrap_or(false)
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
        let scheme = Groth16Scheme::new();
        let verdict = sample_verdict();
        let witness = Witness {
            sub_scores: vec![0.1, 0.2, 0.3],
        };
        let attestation = scheme.prove(&verdict, &witness).unwrap();
        let expected = encode_public_inputs(&verdict, attestation.verdict_commitment).to_vec();
        assert!(scheme.verify(&attestation, &expected));
    }
}
