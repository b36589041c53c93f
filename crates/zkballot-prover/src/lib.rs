//! Off-chain vote proof generation
//!
//! - [`artifacts`]: fetching and caching circuit artifacts and verification keys
//! - [`prover`]: turning a voter's choice into a proof and its public signals
//! - [`setup`]: producing the artifacts a distribution service hosts

pub mod artifacts;
pub mod prover;
pub mod setup;

pub use artifacts::{
    ArtifactCache, ArtifactConfig, ArtifactKind, ArtifactSource, CircuitArtifact,
    DirectoryArtifactSource, HttpArtifactSource,
};
pub use prover::{GeneratedVoteProof, ProofGenerator};
pub use setup::write_artifacts;
