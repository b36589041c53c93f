//! Verification keys and proof verification for zkballot vote proofs
//!
//! Verification needs only public material: the proof, its public signals and
//! a [`VerificationKey`] rebuilt from a published [`VerificationKeyDocument`].

pub mod key;
pub mod verifier;

pub use key::{params_digest, VerificationKey, VerificationKeyDocument};
pub use verifier::{verify_proof, verify_with_vk_and_params, Verification};
