//! Encoding of identifiers and public values into the circuit field
//!
//! The vote circuit works over the Pallas base field. Everything that enters
//! it, whether a voter/candidate/election identifier, a salt or an election
//! root, is first turned into an [`Fp`] here. Numeric input must already be a
//! canonical field element: values at or above the modulus are rejected, never
//! reduced.

use blake2::{Blake2b512, Digest};
use ff::{FromUniformBytes, PrimeField};
use halo2curves::pasta::Fp;
use num_bigint::BigUint;

use crate::error::{BallotError, Result};

const LABEL_DOMAIN: &[u8] = b"zkballot:label-to-field:v1";

/// Canonical text form: `0x` followed by 64 big-endian hex digits.
pub fn to_hex(value: &Fp) -> String {
    let mut bytes = value.to_repr();
    bytes.reverse();
    format!("0x{}", hex::encode(bytes))
}

/// Parses a field element written as `0x`-prefixed big-endian hex or as a
/// decimal integer.
pub fn parse_element(text: &str) -> Result<Fp> {
    parse_numeric(text).map_err(BallotError::invalid_input)
}

fn parse_numeric(text: &str) -> std::result::Result<Fp, String> {
    let parsed = match strip_hex_prefix(text) {
        Some(digits) if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_hexdigit()) => {
            BigUint::parse_bytes(digits.as_bytes(), 16)
        }
        Some(_) => None,
        None if !text.is_empty() && text.bytes().all(|b| b.is_ascii_digit()) => {
            BigUint::parse_bytes(text.as_bytes(), 10)
        }
        None => None,
    };

    let value =
        parsed.ok_or_else(|| format!("'{}' is not a hex or decimal field element", text))?;
    from_biguint(&value).ok_or_else(|| format!("'{}' exceeds the field modulus", text))
}

/// Encodes an identifier supplied by the surrounding application.
///
/// Only canonical decimal integers (no sign, no leading zeros) are used as
/// field elements directly, and they must lie below the modulus. Any other
/// text, including hex and zero-padded numbers, is an opaque label and is
/// hashed into the field, so two distinct identifiers never share an element
/// through different spellings of one number.
pub fn encode_identifier(kind: &str, raw: &str) -> Result<Fp> {
    if raw.trim().is_empty() {
        return Err(BallotError::invalid_input(format!("{} must not be empty", kind)));
    }
    if raw.trim() != raw || raw.chars().any(char::is_control) {
        return Err(BallotError::invalid_input(format!(
            "{} contains surrounding whitespace or control characters",
            kind
        )));
    }

    if is_canonical_decimal(raw) {
        parse_numeric(raw)
            .map_err(|reason| BallotError::invalid_input(format!("{}: {}", kind, reason)))
    } else {
        Ok(label_to_field(raw))
    }
}

/// Maps an arbitrary label to a uniformly distributed field element.
pub fn label_to_field(label: &str) -> Fp {
    let mut hasher = Blake2b512::new();
    hasher.update(LABEL_DOMAIN);
    hasher.update((label.len() as u64).to_le_bytes());
    hasher.update(label.as_bytes());

    let mut wide = [0u8; 64];
    wide.copy_from_slice(&hasher.finalize());
    Fp::from_uniform_bytes(&wide)
}

fn is_canonical_decimal(raw: &str) -> bool {
    raw.bytes().all(|b| b.is_ascii_digit()) && (raw == "0" || !raw.starts_with('0'))
}

fn strip_hex_prefix(text: &str) -> Option<&str> {
    text.strip_prefix("0x").or_else(|| text.strip_prefix("0X"))
}

fn from_biguint(value: &BigUint) -> Option<Fp> {
    let bytes = value.to_bytes_le();
    if bytes.len() > 32 {
        return None;
    }
    let mut repr = [0u8; 32];
    repr[..bytes.len()].copy_from_slice(&bytes);
    Option::from(Fp::from_repr(repr))
}

/// `#[serde(with = "field::serde_hex")]` support for single field elements.
pub mod serde_hex {
    use super::{parse_element, to_hex};
    use halo2curves::pasta::Fp;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Fp, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&to_hex(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Fp, D::Error> {
        let text = String::deserialize(deserializer)?;
        parse_element(&text).map_err(serde::de::Error::custom)
    }
}
