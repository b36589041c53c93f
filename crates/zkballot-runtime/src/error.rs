//! Error types for the zkballot proof pipeline

use thiserror::Error;

/// Result type alias for zkballot operations
pub type Result<T> = std::result::Result<T, BallotError>;

/// Failures of the vote-proof pipeline.
///
/// A proof that fails verification is not an error: verifiers report it as a
/// negative result. The variants here separate infrastructure trouble
/// (retryable after backoff) from input and proving bugs (never retried).
#[derive(Debug, Error)]
pub enum BallotError {
    /// Circuit artifact or verification key could not be fetched, decoded, or
    /// does not match the compiled circuit
    #[error("Artifact unavailable for circuit '{circuit}': {reason}")]
    ArtifactUnavailable { circuit: String, reason: String },

    /// Identifier, election root or public signal outside the supported range
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The prover could not produce a valid proof from the given inputs
    #[error("Proof generation failed: {0}")]
    ProofGenerationFailure(String),

    /// The election root could not be obtained from the roster service
    #[error("Roster unavailable: {0}")]
    RosterUnavailable(String),
}

impl BallotError {
    pub fn artifact_unavailable(circuit: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ArtifactUnavailable { circuit: circuit.into(), reason: reason.into() }
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn proof_generation(msg: impl Into<String>) -> Self {
        Self::ProofGenerationFailure(msg.into())
    }

    pub fn roster_unavailable(msg: impl Into<String>) -> Self {
        Self::RosterUnavailable(msg.into())
    }

    /// Whether the same operation may succeed later without changing its inputs.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ArtifactUnavailable { .. } | Self::RosterUnavailable(_) => true,
            Self::InvalidInput(_) | Self::ProofGenerationFailure(_) => false,
        }
    }
}
