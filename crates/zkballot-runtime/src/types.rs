//! Core types for the zkballot proof pipeline
//!
//! Identifiers, hashes, proofs and public signals exchanged between the
//! commitment engine, the prover, the verifier and the vote ledger. All of
//! them are immutable once constructed.

use std::fmt;

use halo2curves::pasta::Fp;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{BallotError, Result};
use crate::field;

/// Number of values the vote circuit exposes publicly
pub const PUBLIC_SIGNAL_COUNT: usize = 3;
/// Position of the nullifier hash in [`PublicSignals`]
pub const NULLIFIER_INDEX: usize = 0;
/// Position of the commitment hash in [`PublicSignals`]
pub const COMMITMENT_INDEX: usize = 1;
/// Position of the election root in [`PublicSignals`]
pub const ELECTION_ROOT_INDEX: usize = 2;

/// Identifier of a voter within one election.
///
/// Only its field encoding ever reaches the prover, and `Debug` never prints
/// the raw identifier.
#[derive(Clone, PartialEq, Eq)]
pub struct VoterId {
    label: String,
    element: Fp,
}

impl VoterId {
    pub fn parse(raw: &str) -> Result<Self> {
        let element = field::encode_identifier("voter id", raw)?;
        Ok(Self { label: raw.to_string(), element })
    }

    pub fn element(&self) -> Fp {
        self.element
    }
}

impl fmt::Debug for VoterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("VoterId(<redacted>)")
    }
}

macro_rules! public_identifier {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq)]
        pub struct $name {
            label: String,
            element: Fp,
        }

        impl $name {
            pub fn parse(raw: &str) -> Result<Self> {
                let element = field::encode_identifier($kind, raw)?;
                Ok(Self { label: raw.to_string(), element })
            }

            /// The identifier exactly as the application supplied it
            pub fn label(&self) -> &str {
                &self.label
            }

            pub fn element(&self) -> Fp {
                self.element
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.label)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(
                &self,
                serializer: S,
            ) -> std::result::Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.label)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(
                deserializer: D,
            ) -> std::result::Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                Self::parse(&raw).map_err(serde::de::Error::custom)
            }
        }
    };
}

public_identifier!(
    /// The candidate a voter selects
    CandidateId,
    "candidate id"
);

public_identifier!(
    /// Identifier of an election
    ElectionId,
    "election id"
);

macro_rules! field_value {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(#[serde(with = "field::serde_hex")] Fp);

        impl $name {
            pub fn from_field(element: Fp) -> Self {
                Self(element)
            }

            pub fn element(&self) -> Fp {
                self.0
            }

            pub fn to_hex(&self) -> String {
                field::to_hex(&self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.to_hex())
            }
        }
    };
}

field_value!(
    /// `H(voterId, electionId)`: identical for every vote a voter casts in one
    /// election, which is what lets a ledger reject the second one
    NullifierHash
);

field_value!(
    /// `H(voterId, candidateId, electionId, salt)`: binds one vote to fresh randomness
    CommitmentHash
);

field_value!(
    /// Summary of the eligible-voter set of an election at proof time
    ElectionRoot
);

impl ElectionRoot {
    /// Roots are always numeric; labels are not accepted here.
    pub fn parse(text: &str) -> Result<Self> {
        field::parse_element(text.trim()).map(Self)
    }
}

/// Per-vote randomness. Never serialized and never printed.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Salt(Fp);

impl Salt {
    pub fn from_field(element: Fp) -> Self {
        Self(element)
    }

    pub fn element(&self) -> Fp {
        self.0
    }
}

impl fmt::Debug for Salt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Salt(<redacted>)")
    }
}

/// An election together with the root the proof is generated against
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElectionContext {
    election: ElectionId,
    root: ElectionRoot,
}

impl ElectionContext {
    pub fn new(election: ElectionId, root: ElectionRoot) -> Self {
        Self { election, root }
    }

    pub fn election(&self) -> &ElectionId {
        &self.election
    }

    pub fn root(&self) -> ElectionRoot {
        self.root
    }
}

/// Represents a serialized vote proof
///
/// The bytes are an opaque halo2 transcript. They only mean something together
/// with the [`PublicSignals`] they were produced for and the matching
/// verification key.
///
/// # Examples
///
/// ```
/// use zkballot_runtime::VoteProof;
///
/// let proof = VoteProof::new(vec![0u8; 192]);
/// assert_eq!(proof.size(), 192);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct VoteProof {
    #[serde(with = "hex")]
    proof_data: Vec<u8>,
}

impl VoteProof {
    pub fn new(proof_data: Vec<u8>) -> Self {
        Self { proof_data }
    }

    pub fn size(&self) -> usize {
        self.proof_data.len()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.proof_data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.proof_data
    }
}

/// Ordered public outputs of the vote circuit:
/// `[nullifierHash, commitmentHash, electionRoot]`.
///
/// Deserialization accepts any length so that malformed signal sets reach the
/// verifier, which rejects them as invalid rather than failing to parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicSignals(Vec<Fp>);

impl PublicSignals {
    pub fn new(signals: Vec<Fp>) -> Self {
        Self(signals)
    }

    pub fn for_vote(
        nullifier: NullifierHash,
        commitment: CommitmentHash,
        root: ElectionRoot,
    ) -> Self {
        Self(vec![nullifier.element(), commitment.element(), root.element()])
    }

    /// Parses signals from their textual (hex or decimal) form
    pub fn parse<S: AsRef<str>>(values: &[S]) -> Result<Self> {
        values
            .iter()
            .map(|v| field::parse_element(v.as_ref()))
            .collect::<Result<Vec<_>>>()
            .map(Self)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True when the set has exactly the arity of the vote circuit
    pub fn is_well_formed(&self) -> bool {
        self.0.len() == PUBLIC_SIGNAL_COUNT
    }

    pub fn as_slice(&self) -> &[Fp] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<Fp> {
        self.0
    }

    pub fn nullifier(&self) -> Option<NullifierHash> {
        self.0.get(NULLIFIER_INDEX).copied().map(NullifierHash::from_field)
    }

    pub fn commitment(&self) -> Option<CommitmentHash> {
        self.0.get(COMMITMENT_INDEX).copied().map(CommitmentHash::from_field)
    }

    pub fn election_root(&self) -> Option<ElectionRoot> {
        self.0.get(ELECTION_ROOT_INDEX).copied().map(ElectionRoot::from_field)
    }

    pub fn to_strings(&self) -> Vec<String> {
        self.0.iter().map(field::to_hex).collect()
    }

    /// Returns the value at `index`, or an error naming the missing position
    pub fn get(&self, index: usize) -> Result<Fp> {
        self.0.get(index).copied().ok_or_else(|| {
            BallotError::invalid_input(format!(
                "public signal {} missing ({} present)",
                index,
                self.0.len()
            ))
        })
    }
}

impl Serialize for PublicSignals {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_strings().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for PublicSignals {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let values = Vec::<String>::deserialize(deserializer)?;
        Self::parse(&values).map_err(serde::de::Error::custom)
    }
}
