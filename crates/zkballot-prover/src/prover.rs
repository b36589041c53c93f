//! Vote proof generation
//!
//! Proofs are generated natively on a blocking worker thread. Every proof is
//! checked against the artifact's own verifying key before it is handed out.

use std::sync::Arc;

use halo2_proofs::{
    plonk::create_proof,
    transcript::{Blake2bWrite, Challenge255},
};
use halo2curves::pasta::EqAffine;
use rand::rngs::OsRng;
use serde::Serialize;
use tracing::{debug, info, warn};
use vote_circuit::{commitment, VoteCircuitInput, CIRCUIT_NAME};
use zkballot_runtime::{
    BallotError, CandidateId, CommitmentHash, ElectionContext, NullifierHash, PublicSignals,
    Result, VoteProof, VoterId,
};
use zkballot_verifier::verify_with_vk_and_params;

use crate::artifacts::{ArtifactCache, ArtifactSource, CircuitArtifact};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedVoteProof {
    pub proof: VoteProof,
    pub public_signals: PublicSignals,
    pub nullifier_hash: NullifierHash,
    pub commitment_hash: CommitmentHash,
}

pub struct ProofGenerator<S> {
    cache: Arc<ArtifactCache<S>>,
}

impl<S> Clone for ProofGenerator<S> {
    fn clone(&self) -> Self {
        Self { cache: Arc::clone(&self.cache) }
    }
}

impl<S: ArtifactSource> ProofGenerator<S> {
    pub fn new(cache: Arc<ArtifactCache<S>>) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &Arc<ArtifactCache<S>> {
        &self.cache
    }

    /// Produces a proof that `voter` cast a vote for `candidate` in the given
    /// election, with a fresh salt.
    ///
    /// The circuit artifact is loaded before anything else, so an unavailable
    /// artifact fails without any cryptographic work.
    pub async fn generate_vote_proof(
        &self,
        voter: &VoterId,
        candidate: &CandidateId,
        context: &ElectionContext,
    ) -> Result<GeneratedVoteProof> {
        let artifact = self.cache.load_circuit(CIRCUIT_NAME).await?;

        let salt = commitment::generate_salt();
        let nullifier_hash = commitment::nullifier_hash(voter, context.election());
        let commitment_hash =
            commitment::commitment_hash(voter, candidate, context.election(), &salt);

        let input = VoteCircuitInput::assemble(
            voter.clone(),
            candidate.clone(),
            context.clone(),
            salt,
            nullifier_hash,
            commitment_hash,
        );

        info!(election = %context.election(), "generating vote proof");
        self.prove_with(artifact, input).await
    }

    /// Proves an already assembled input.
    pub async fn prove_input(&self, input: VoteCircuitInput) -> Result<GeneratedVoteProof> {
        let artifact = self.cache.load_circuit(CIRCUIT_NAME).await?;
        self.prove_with(artifact, input).await
    }

    async fn prove_with(
        &self,
        artifact: Arc<CircuitArtifact>,
        input: VoteCircuitInput,
    ) -> Result<GeneratedVoteProof> {
        input.validate().map_err(|e| {
            BallotError::proof_generation(format!("unsatisfiable circuit input: {}", e))
        })?;

        let generated = tokio::task::spawn_blocking(move || prove_blocking(&artifact, &input))
            .await
            .map_err(|e| BallotError::proof_generation(format!("prover task failed: {}", e)))??;

        info!(proof_size = generated.proof.size(), "vote proof generated");
        Ok(generated)
    }
}

fn prove_blocking(
    artifact: &CircuitArtifact,
    input: &VoteCircuitInput,
) -> Result<GeneratedVoteProof> {
    let public_signals = input.public_signals();
    let instances = public_signals.as_slice();

    let mut transcript = Blake2bWrite::<_, EqAffine, Challenge255<_>>::init(vec![]);
    create_proof(
        artifact.params(),
        artifact.proving_key(),
        &[input.circuit()],
        &[&[instances]],
        OsRng,
        &mut transcript,
    )
    .map_err(|e| BallotError::proof_generation(format!("{:?}", e)))?;
    let proof = transcript.finalize();
    debug!(size = proof.len(), "proof transcript finalized");

    // create_proof does not check constraint satisfaction
    if !verify_with_vk_and_params(&proof, instances, artifact.verifying_key(), artifact.params()) {
        warn!("generated proof failed self-verification");
        return Err(BallotError::proof_generation("generated proof failed self-verification"));
    }

    Ok(GeneratedVoteProof {
        proof: VoteProof::new(proof),
        public_signals,
        nullifier_hash: input.nullifier_hash(),
        commitment_hash: input.commitment_hash(),
    })
}
