//! Vote circuit and commitment engine
//!
//! [`commitment`] computes nullifier and commitment hashes natively, and
//! [`circuit`] proves in zero knowledge that the same hashes were derived from
//! a private voter, candidate and salt for a given election root.

pub mod circuit;
pub mod commitment;

pub use circuit::{VoteChip, VoteCircuit, VoteCircuitInput, VoteConfig, CIRCUIT_NAME, MIN_K};
pub use commitment::{commitment_hash, generate_salt, generate_salt_with, nullifier_hash};
