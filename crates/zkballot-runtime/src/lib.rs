//! zkballot Runtime
//!
//! Shared value types, field encoding and error handling used across the
//! zkballot crates: the commitment engine and circuit, the prover, the
//! verifier and the vote session coordinator.

pub mod error;
pub mod field;
pub mod types;

// Re-export core types for convenience
pub use error::{BallotError, Result};
pub use types::{
    CandidateId, CommitmentHash, ElectionContext, ElectionId, ElectionRoot, NullifierHash,
    PublicSignals, Salt, VoteProof, VoterId, COMMITMENT_INDEX, ELECTION_ROOT_INDEX,
    NULLIFIER_INDEX, PUBLIC_SIGNAL_COUNT,
};

/// Re-exported so downstream crates name the same field type
pub use halo2curves::pasta::Fp;
