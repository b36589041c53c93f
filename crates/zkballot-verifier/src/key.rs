//! Verification key documents
//!
//! halo2_proofs 0.3 has no stable verifying-key serialization, so what gets
//! published is a small JSON document describing the key. IPA parameters are
//! transparent, which lets the verifier rebuild them from `k`, check them
//! against the published digest and derive the verifying key from the
//! compiled circuit.

use std::fmt;

use blake2::{Blake2b512, Digest};
use halo2_proofs::{
    plonk::{keygen_vk, VerifyingKey},
    poly::commitment::Params,
};
use halo2curves::pasta::EqAffine;
use serde::{Deserialize, Serialize};
use tracing::debug;
use vote_circuit::{VoteCircuit, CIRCUIT_NAME, MIN_K};
use zkballot_runtime::{BallotError, Result, PUBLIC_SIGNAL_COUNT};

pub const PROTOCOL: &str = "halo2-ipa";
pub const CURVE: &str = "pasta";

/// Largest `k` a document may ask the verifier to regenerate parameters for
pub const MAX_K: u32 = 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationKeyDocument {
    pub protocol: String,
    pub curve: String,
    pub circuit: String,
    pub k: u32,
    pub n_public: usize,
    pub params_digest: String,
}

impl VerificationKeyDocument {
    pub fn for_params(circuit: &str, params: &Params<EqAffine>) -> Result<Self> {
        Ok(Self {
            protocol: PROTOCOL.to_string(),
            curve: CURVE.to_string(),
            circuit: circuit.to_string(),
            k: params.k(),
            n_public: PUBLIC_SIGNAL_COUNT,
            params_digest: params_digest(params)
                .map_err(|e| BallotError::artifact_unavailable(circuit, e))?,
        })
    }

    pub fn from_json(circuit: &str, bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| {
            BallotError::artifact_unavailable(circuit, format!("malformed verification key: {}", e))
        })
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| BallotError::artifact_unavailable(&self.circuit, e.to_string()))
    }

    /// Checks everything that can be checked without regenerating parameters.
    pub fn validate(&self, expected_circuit: &str) -> Result<()> {
        let fail =
            |reason: String| Err(BallotError::artifact_unavailable(expected_circuit, reason));

        if self.protocol != PROTOCOL {
            return fail(format!("unsupported protocol '{}'", self.protocol));
        }
        if self.curve != CURVE {
            return fail(format!("unsupported curve '{}'", self.curve));
        }
        if self.circuit != expected_circuit {
            return fail(format!("key is for circuit '{}'", self.circuit));
        }
        if self.circuit != CIRCUIT_NAME {
            return fail(format!("no compiled circuit named '{}'", self.circuit));
        }
        if self.n_public != PUBLIC_SIGNAL_COUNT {
            return fail(format!(
                "key declares {} public signals, circuit exposes {}",
                self.n_public, PUBLIC_SIGNAL_COUNT
            ));
        }
        if self.k < MIN_K || self.k > MAX_K {
            return fail(format!("k = {} outside supported range {}..={}", self.k, MIN_K, MAX_K));
        }
        Ok(())
    }
}

/// BLAKE2b-512 over the serialized parameters, hex encoded.
pub fn params_digest(params: &Params<EqAffine>) -> std::result::Result<String, String> {
    let mut bytes = Vec::new();
    params.write(&mut bytes).map_err(|e| format!("failed to serialize params: {}", e))?;
    Ok(hex::encode(Blake2b512::digest(&bytes)))
}

/// Public material needed to check vote proofs.
#[derive(Clone)]
pub struct VerificationKey {
    document: VerificationKeyDocument,
    params: Params<EqAffine>,
    vk: VerifyingKey<EqAffine>,
}

impl VerificationKey {
    /// Rebuilds the key a document describes. CPU-bound: regenerates the
    /// parameters and runs keygen.
    pub fn from_document(circuit: &str, document: VerificationKeyDocument) -> Result<Self> {
        document.validate(circuit)?;

        debug!(circuit, k = document.k, "regenerating verification parameters");
        let params = Params::<EqAffine>::new(document.k);

        let digest =
            params_digest(&params).map_err(|e| BallotError::artifact_unavailable(circuit, e))?;
        if digest != document.params_digest {
            return Err(BallotError::artifact_unavailable(
                circuit,
                "parameter digest does not match the verification key",
            ));
        }

        Self::from_params(circuit, document, params)
    }

    /// Builds a key from parameters already at hand, e.g. those of a loaded
    /// proving artifact.
    pub fn from_params(
        circuit: &str,
        document: VerificationKeyDocument,
        params: Params<EqAffine>,
    ) -> Result<Self> {
        let vk = keygen_vk(&params, &VoteCircuit::default()).map_err(|e| {
            BallotError::artifact_unavailable(circuit, format!("keygen failed: {:?}", e))
        })?;

        Ok(Self { document, params, vk })
    }

    pub fn document(&self) -> &VerificationKeyDocument {
        &self.document
    }

    pub fn params(&self) -> &Params<EqAffine> {
        &self.params
    }

    pub fn verifying_key(&self) -> &VerifyingKey<EqAffine> {
        &self.vk
    }
}

impl fmt::Debug for VerificationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerificationKey").field("document", &self.document).finish_non_exhaustive()
    }
}
