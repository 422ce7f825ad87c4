//! Code generation and salted hashing.

use std::fmt;

use rand::Rng;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::slot::CODE_LENGTH;

/// A plaintext one-time code, alive only between issuance and delivery.
///
/// Deliberately implements neither `Serialize` nor a revealing `Debug`,
/// so the plaintext cannot end up in storage or in logs by accident.
/// Call [`PlainCode::reveal`] at the delivery boundary.
#[derive(Clone, PartialEq, Eq)]
pub struct PlainCode(String);

impl PlainCode {
    /// The digits themselves, for handing to a notifier.
    pub fn reveal(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for PlainCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PlainCode(\"******\")")
    }
}

/// Generates a uniformly distributed numeric code of [`CODE_LENGTH`] digits.
///
/// Drawn from `0..10^len` and zero-padded, so `000042` is as likely as
/// any other value.
pub fn generate_code() -> PlainCode {
    let bound = 10u32.pow(CODE_LENGTH as u32);
    let n = rand::thread_rng().gen_range(0..bound);
    PlainCode(format!("{n:0width$}", width = CODE_LENGTH))
}

/// Generates a fresh 16-byte salt, hex encoded.
pub fn generate_salt() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill(&mut bytes);
    hex::encode(bytes)
}

/// Computes the stored digest for a code: SHA-256 over salt then digits.
pub fn hash_code(salt: &str, code: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(code.as_bytes());
    hex::encode(hasher.finalize())
}

/// Compares a submitted code against a stored digest in constant time.
///
/// Both sides are full SHA-256 hex digests of equal length, so the
/// comparison leaks nothing about how many leading characters matched.
pub fn codes_match(stored_hash: &str, salt: &str, submitted: &str) -> bool {
    let candidate = hash_code(salt, submitted);
    stored_hash.as_bytes().ct_eq(candidate.as_bytes()).into()
}
