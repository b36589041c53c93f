//! Commitment engine
//!
//! Native counterparts of the hashes the vote circuit recomputes. Both sides
//! use Poseidon with the `P128Pow5T3` parameters (width 3, rate 2) over the
//! Pallas base field and a constant-length domain, so a value computed here
//! is exactly the value the circuit constrains.

use ff::Field;
use halo2_gadgets::poseidon::primitives::{self as poseidon, ConstantLength, P128Pow5T3};
use halo2curves::pasta::Fp;
use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};
use zkballot_runtime::{CandidateId, CommitmentHash, ElectionId, NullifierHash, Salt, VoterId};

pub const POSEIDON_WIDTH: usize = 3;
pub const POSEIDON_RATE: usize = 2;

/// Poseidon over a fixed number of field elements.
pub fn poseidon_hash<const L: usize>(message: [Fp; L]) -> Fp {
    poseidon::Hash::<Fp, P128Pow5T3, ConstantLength<L>, POSEIDON_WIDTH, POSEIDON_RATE>::init()
        .hash(message)
}

/// `H(voterId, electionId)`. Independent of the candidate and the salt.
pub fn nullifier_hash(voter: &VoterId, election: &ElectionId) -> NullifierHash {
    NullifierHash::from_field(poseidon_hash([voter.element(), election.element()]))
}

/// `H(voterId, candidateId, electionId, salt)`.
pub fn commitment_hash(
    voter: &VoterId,
    candidate: &CandidateId,
    election: &ElectionId,
    salt: &Salt,
) -> CommitmentHash {
    CommitmentHash::from_field(poseidon_hash([
        voter.element(),
        candidate.element(),
        election.element(),
        salt.element(),
    ]))
}

/// Draws a fresh salt from the operating system's CSPRNG.
pub fn generate_salt() -> Salt {
    generate_salt_with(&mut OsRng)
}

/// Draws a uniformly random non-zero field element as salt.
pub fn generate_salt_with<R: RngCore + CryptoRng>(rng: &mut R) -> Salt {
    loop {
        let candidate = Fp::random(&mut *rng);
        if !bool::from(candidate.is_zero()) {
            return Salt::from_field(candidate);
        }
    }
}
