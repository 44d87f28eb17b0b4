//! Callback signature computation and verification.
//!
//! The two platforms sign the same four values but disagree on how:
//! workchat sorts `{token, timestamp, nonce, ciphertext}` lexicographically
//! and hashes with SHA-1; docspace concatenates
//! `timestamp + nonce + token + ciphertext` in that fixed order and hashes
//! with SHA-256. Both transmit the digest hex-encoded.

use sha1::Sha1;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Compute the sorted-concatenation SHA-1 signature (workchat scheme).
///
/// Sorting happens on the string values themselves, not on field names —
/// the ciphertext usually ends up first because base64 starts with
/// uppercase letters more often than not, but that is an accident of the
/// inputs, never an assumption.
pub fn sign_sorted(token: &str, timestamp: &str, nonce: &str, ciphertext: &str) -> String {
    let mut parts = [token, timestamp, nonce, ciphertext];
    parts.sort_unstable();

    let mut hasher = Sha1::new();
    for part in parts {
        hasher.update(part.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Compute the ordered-concatenation SHA-256 signature (docspace scheme).
pub fn sign_ordered(token: &str, timestamp: &str, nonce: &str, ciphertext: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(timestamp.as_bytes());
    hasher.update(nonce.as_bytes());
    hasher.update(token.as_bytes());
    hasher.update(ciphertext.as_bytes());
    hex::encode(hasher.finalize())
}

/// Verify a workchat callback signature. Never panics; any malformed
/// input simply fails verification.
pub fn verify_sorted(
    token: &str,
    timestamp: &str,
    nonce: &str,
    ciphertext: &str,
    candidate: &str,
) -> bool {
    let expected = sign_sorted(token, timestamp, nonce, ciphertext);
    constant_time_str_eq(&expected, candidate)
}

/// Verify a docspace callback signature. Never panics; any malformed
/// input simply fails verification.
pub fn verify_ordered(
    token: &str,
    timestamp: &str,
    nonce: &str,
    ciphertext: &str,
    candidate: &str,
) -> bool {
    let expected = sign_ordered(token, timestamp, nonce, ciphertext);
    constant_time_str_eq(&expected, candidate)
}

/// Constant-time comparison of two hex strings. Case-sensitive: the
/// platforms transmit lowercase hex and we compute lowercase hex.
fn constant_time_str_eq(expected: &str, candidate: &str) -> bool {
    expected.as_bytes().ct_eq(candidate.as_bytes()).into()
}
