//! One-time verification codes for dual-control requests.
//!
//! A [`CodeSlot`] holds everything the engine persists about a single
//! approver's code: a salted hash, issuance and expiry timestamps, and
//! an attempt counter. The plaintext code exists only as a [`PlainCode`]
//! returned to the caller at issuance and is never stored.

pub mod code;
pub mod slot;

pub use code::{codes_match, generate_code, generate_salt, hash_code, PlainCode};
pub use slot::{CodeSlot, VerifyOutcome, CODE_LENGTH, CODE_TTL_MINUTES, MAX_ATTEMPTS};
