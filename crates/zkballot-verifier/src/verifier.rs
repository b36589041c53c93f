//! Halo2 proof verification for vote proofs

use halo2_proofs::{
    plonk::{verify_proof as halo2_verify, SingleVerifier, VerifyingKey},
    poly::commitment::Params,
    transcript::{Blake2bRead, Challenge255},
};
use halo2curves::pasta::{EqAffine, Fp};
use serde::{Deserialize, Serialize};
use tracing::debug;
use zkballot_runtime::{PublicSignals, VoteProof};

use crate::key::VerificationKey;

/// Outcome of checking one proof. A negative result is not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verification {
    pub valid: bool,
}

impl Verification {
    pub fn valid() -> Self {
        Self { valid: true }
    }

    pub fn invalid() -> Self {
        Self { valid: false }
    }
}

/// Checks `proof` against `public_signals` under `key`.
///
/// Pure and deterministic. Malformed proofs, tampered signals and signal sets
/// of the wrong arity all come back as `valid: false`.
pub fn verify_proof(
    proof: &VoteProof,
    public_signals: &PublicSignals,
    key: &VerificationKey,
) -> Verification {
    if !public_signals.is_well_formed() {
        debug!(count = public_signals.len(), "rejecting public signals with wrong arity");
        return Verification::invalid();
    }
    if proof.size() == 0 {
        debug!("rejecting empty proof");
        return Verification::invalid();
    }

    let valid = verify_with_vk_and_params(
        proof.as_bytes(),
        public_signals.as_slice(),
        key.verifying_key(),
        key.params(),
    );
    debug!(valid, proof_size = proof.size(), "vote proof checked");

    Verification { valid }
}

/// Core check over raw key material, shared with the prover's self-check.
pub fn verify_with_vk_and_params(
    proof_bytes: &[u8],
    public_signals: &[Fp],
    vk: &VerifyingKey<EqAffine>,
    params: &Params<EqAffine>,
) -> bool {
    let mut transcript = Blake2bRead::<_, EqAffine, Challenge255<_>>::init(proof_bytes);
    let strategy = SingleVerifier::new(params);

    halo2_verify(params, vk, strategy, &[&[public_signals]], &mut transcript).is_ok()
}
