//! `STARK_STYLE` scheme (`zk-stark` feature), grounded on the
//! `halo2_proofs`/`pasta_curves` IPA-commitment style used by the corpus's
//! Halo 2 privacy circuit (no trusted setup, unlike the Groth16 scheme).
//!
//! Circuit: binds a public scalar (derived from the verdict commitment) to
//! the sum of the private trust sub-scores, mirroring the Groth16 scheme's
//! constraint but in PLONKish arithmetization.

use crate::attestation::canonical::encode_public_inputs;
use crate::attestation::scheme::{ProofScheme, SchemeTag, Witness};
use crate::canonical::verdict_commitment;
use crate::error::ProveError;
use crate::types::{Attestation, Verdict};
use chrono::Utc;
use halo2_proofs::circuit::{Layouter, SimpleFloorPlanner, Value};
use halo2_proofs::plonk::{
    create_proof, keygen_pk, keygen_vk, verify_proof, Advice, Circuit, Column, ConstraintSystem, Error as Halo2Error,
    Instance, ProvingKey, Selector, SingleVerifier, VerifyingKey,
};
use halo2_proofs::poly::commitment::Params;
use halo2_proofs::poly::Rotation;
use halo2_proofs::transcript::{Blake2bRead, Blake2bWrite, Challenge255};
use pasta_curves::group::ff::PrimeField;
use pasta_curves::vesta;
use parking_lot::Mutex;
use rand::rngs::OsRng;
use std::sync::OnceLock;

const SUB_SCORE_SLOTS: usize = 4;
const K: u32 = 6; // small fixed circuit; 2^6 rows is ample for four summands.

#[derive(Clone, Debug)]
struct SumConfig {
    advice: Column<Advice>,
    instance: Column<Instance>,
    selector: Selector,
}

#[derive(Clone, Default)]
struct SumCircuit {
    sub_scores: [Value<vesta::Scalar>; SUB_SCORE_SLOTS],
}

impl Circuit<vesta::Scalar> for SumCircuit {
    type Config = SumConfig;
    type FloorPlanner = SimpleFloorPlanner;

    fn without_witnesses(&self) -> Self {
        Self::default()
    }

    fn configure(meta: &mut ConstraintSystem<vesta::Scalar>) -> Self::Config {
        let advice = meta.advice_column();
        let instance = meta.instance_column();
        let selector = meta.selector();
        meta.enable_equality(advice);
        meta.enable_equality(instance);

        meta.create_gate("running sum", |meta| {
            let s = meta.query_selector(selector);
            let prev = meta.query_advice(advice, Rotation::cur());
            let addend = meta.query_advice(advice, Rotation::next());
            let next = meta.query_advice(advice, Rotation(2));
            vec![s * (next - prev - addend)]
        });

        SumConfig {
            advice,
            instance,
            selector,
        }
    }

    fn synthesize(&self, config: Self::Config, mut layouter: impl Layouter<vesta::Scalar>) -> Result<(), Halo2Error> {
        let total_cell = layouter.assign_region(
            || "sum sub-scores",
            |mut region| {
                let mut running = region.assign_advice(|| "acc0", config.advice, 0, || Value::known(vesta::Scalar::zero()))?;
                let mut running_val = Value::known(vesta::Scalar::zero());
                for (i, score) in self.sub_scores.iter().enumerate() {
                    config.selector.enable(&mut region, 2 * i)?;
                    region.assign_advice(|| format!("addend{i}"), config.advice, 2 * i + 1, || *score)?;
                    running_val = running_val + *score;
                    running = region.assign_advice(
                        || format!("acc{}", i + 1),
                        config.advice,
                        2 * (i + 1),
                        || running_val,
                    )?;
                }
                Ok(running)
            },
        )?;
        layouter.constrain_instance(total_cell.cell(), config.instance, 0)?;
        Ok(())
    }
}

fn public_scalar(commitment: [u8; 32]) -> vesta::Scalar {
    let mut repr = [0u8; 32];
    repr[0..8].copy_from_slice(&commitment[0..8]);
    vesta::Scalar::from_repr(repr).unwrap_or(vesta::Scalar::zero())
}

struct StarkParams {
    params: Params<vesta::Affine>,
    pk: ProvingKey<vesta::Affine>,
    vk: VerifyingKey<vesta::Affine>,
}

static PARAMS: OnceLock<Mutex<StarkParams>> = OnceLock::new();

pub struct StarkScheme;

impl StarkScheme {
    pub fn new() -> Self {
        Self
    }

    fn params(&self) -> &'static Mutex<StarkParams> {
        PARAMS.get_or_init(|| {
            let params = Params::<vesta::Affine>::new(K);
            let empty = SumCircuit::default();
            let vk = keygen_vk(&params, &empty).expect("keygen_vk over a fixed-shape circuit cannot fail");
            let pk = keygen_pk(&params, vk.clone(), &empty).expect("keygen_pk over a fixed-shape circuit cannot fail");
            Mutex::new(StarkParams { params, pk, vk })
        })
    }
}

impl Default for StarkScheme {
    fn default() -> Self {
        Self::new()
    }
}

impl ProofScheme for StarkScheme {
    fn scheme_tag(&self) -> SchemeTag {
        SchemeTag::StarkStyle
    }

    fn setup(&self) -> Result<(), ProveError> {
        self.params();
        Ok(())
    }

    fn prove(&self, verdict: &Verdict, witness: &Witness) -> Result<Attestation, ProveError> {
        let commitment = verdict_commitment(verdict);
        let target = public_scalar(commitment);

        let mut sub_scores = [Value::known(vesta::Scalar::zero()); SUB_SCORE_SLOTS];
        for (slot, score) in sub_scores.iter_mut().zip(witness.sub_scores.iter()) {
            *slot = Value::known(vesta::Scalar::from((score * 1_000_000.0).round() as u64));
        }
        let circuit = SumCircuit { sub_scores };

        let StarkParams { params, pk, .. } = &*self.params().lock();
        let mut transcript = Blake2bWrite::<_, vesta::Affine, Challenge255<_>>::init(Vec::new());
        create_proof(params, pk, &[circuit], &[&[&[target]]], OsRng, &mut transcript)
            .map_err(|_| ProveError::InvalidWitness)?;
        let proof_blob = transcript.finalize();

        let public_inputs = encode_public_inputs(verdict, commitment).to_vec();

        Ok(Attestation {
            verdict_commitment: commitment,
            proof_blob,
            public_inputs,
            scheme_tag: SchemeTag::StarkStyle as u16,
            created_at: Utc::now(),
        })
    }

    fn verify(&self, attestation: &Attestation, expected_public_inputs: &[u8]) -> bool {
        if attestation.scheme_tag != SchemeTag::StarkStyle as u16 {
            return false;
        }
        if attestation.public_inputs != expected_public_inputs {
            return false;
        }
        let target = public_scalar(attestation.verdict_commitment);
        let StarkParams { params, vk, .. } = &*self.params().lock();
        let strategy = SingleVerifier::new(params);
        let mut transcript = Blake2bRead::<_, vesta::Affine, Challenge255<_>>::init(&attestation.proof_blob[..]);
        verify_proof(params, vk, strategy, &[&[&[target]]], &mut transcript).is_ok()
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
        let scheme = StarkScheme::new();
        let verdict = sample_verdict();
        let witness = Witness {
            sub_scores: vec![0.1, 0.2, 0.3],
        };
        let attestation = scheme.prove(&verdict, &witness).unwrap();
        let expected = encode_public_inputs(&verdict, attestation.verdict_commitment).to_vec();
        assert!(scheme.verify(&attestation, &expected));
    }
}
