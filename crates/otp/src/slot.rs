//! Per-approver code slots with bounded, expiring verification.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::code::{codes_match, generate_code, generate_salt, hash_code, PlainCode};

/// Number of digits in a one-time code.
pub const CODE_LENGTH: usize = 6;

/// Wrong submissions tolerated per issued code.
pub const MAX_ATTEMPTS: u32 = 3;

/// Minutes an issued code stays valid.
pub const CODE_TTL_MINUTES: i64 = 15;

/// Result of checking a submitted code against a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyOutcome {
    /// The code matched and the slot is now verified.
    Verified,
    /// The code did not match; one attempt was consumed.
    Mismatch { remaining: u32 },
    /// The code's validity window has passed. No attempt consumed.
    Expired,
    /// All attempts were already spent before this submission.
    AttemptsExhausted,
    /// No code has been issued into this slot.
    NotIssued,
    /// The slot was verified earlier; nothing left to check.
    AlreadyVerified,
}

/// The persisted state of one approver's code.
///
/// Only the salted digest is kept. The digest and salt are skipped when
/// serializing outward views, since the six-digit space can be searched
/// offline once both are known.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeSlot {
    #[serde(skip_serializing, default)]
    pub code_hash: Option<String>,
    #[serde(skip_serializing, default)]
    pub salt: Option<String>,
    pub issued_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub attempts: u32,
    pub verified: bool,
    pub verified_at: Option<DateTime<Utc>>,
}

impl CodeSlot {
    /// A dormant slot with no code issued.
    pub fn new() -> Self {
        Self {
            code_hash: None,
            salt: None,
            issued_at: None,
            expires_at: None,
            attempts: 0,
            verified: false,
            verified_at: None,
        }
    }

    /// True once a code has been issued into the slot.
    pub fn is_armed(&self) -> bool {
        self.code_hash.is_some()
    }

    /// True when the issued code's window has passed. Strictly after:
    /// a submission at the exact expiry instant is still accepted.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(false, |at| now > at)
    }

    /// True when the attempt budget is spent.
    pub fn attempts_exhausted(&self) -> bool {
        self.attempts >= MAX_ATTEMPTS
    }

    /// Attempts left before the slot locks.
    pub fn attempts_remaining(&self) -> u32 {
        MAX_ATTEMPTS.saturating_sub(self.attempts)
    }

    /// Issues a fresh code into the slot, replacing any previous one.
    ///
    /// Resets the attempt counter and restarts the validity window.
    /// Callers only issue into unverified slots; a verified slot is
    /// final and the workflow never re-arms it.
    pub fn issue(&mut self, now: DateTime<Utc>) -> PlainCode {
        let code = generate_code();
        let salt = generate_salt();
        self.code_hash = Some(hash_code(&salt, code.reveal()));
        self.salt = Some(salt);
        self.issued_at = Some(now);
        self.expires_at = Some(now + Duration::minutes(CODE_TTL_MINUTES));
        self.attempts = 0;
        code
    }

    /// Checks a submitted code, consuming an attempt on a live mismatch.
    ///
    /// Expiry is checked before the attempt budget and consumes nothing:
    /// a stale code reports [`VerifyOutcome::Expired`] no matter how many
    /// attempts remain. A live submission spends one attempt whether or
    /// not it matches.
    pub fn verify(&mut self, submitted: &str, now: DateTime<Utc>) -> VerifyOutcome {
        if self.verified {
            return VerifyOutcome::AlreadyVerified;
        }
        let (hash, salt) = match (self.code_hash.as_deref(), self.salt.as_deref()) {
            (Some(h), Some(s)) => (h.to_owned(), s.to_owned()),
            _ => return VerifyOutcome::NotIssued,
        };
        if self.is_expired(now) {
            return VerifyOutcome::Expired;
        }
        if self.attempts_exhausted() {
            return VerifyOutcome::AttemptsExhausted;
        }
        self.attempts += 1;
        if codes_match(&hash, &salt, submitted) {
            self.verified = true;
            self.verified_at = Some(now);
            VerifyOutcome::Verified
        } else {
            VerifyOutcome::Mismatch {
                remaining: MAX_ATTEMPTS - self.attempts,
            }
        }
    }
}

impl Default for CodeSlot {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 2, hour, minute, 0).unwrap()
    }

    #[test]
    fn dormant_slot_rejects_verification() {
        let mut slot = CodeSlot::new();
        assert!(!slot.is_armed());
        assert_eq!(slot.verify("123456", at(8, 0)), VerifyOutcome::NotIssued);
        assert_eq!(slot.attempts, 0);
    }

    #[test]
    fn issue_arms_the_slot_with_a_fifteen_minute_window() {
        let mut slot = CodeSlot::new();
        let now = at(8, 0);
        let code = slot.issue(now);
        assert_eq!(code.reveal().len(), CODE_LENGTH);
        assert!(slot.is_armed());
        assert_eq!(slot.issued_at, Some(now));
        assert_eq!(slot.expires_at, Some(now + Duration::minutes(15)));
        assert_eq!(slot.attempts, 0);
        assert!(!slot.verified);
    }

    #[test]
    fn correct_code_verifies_and_spends_one_attempt() {
        let mut slot = CodeSlot::new();
        let code = slot.issue(at(8, 0));
        let outcome = slot.verify(code.reveal(), at(8, 5));
        assert_eq!(outcome, VerifyOutcome::Verified);
        assert!(slot.verified);
        assert_eq!(slot.verified_at, Some(at(8, 5)));
        assert_eq!(slot.attempts, 1);
    }

    #[test]
    fn mismatches_count_down_then_lock_the_slot() {
        let mut slot = CodeSlot::new();
        let code = slot.issue(at(8, 0));
        assert_eq!(
            slot.verify("000000", at(8, 1)),
            VerifyOutcome::Mismatch { remaining: 2 }
        );
        assert_eq!(
            slot.verify("000001", at(8, 2)),
            VerifyOutcome::Mismatch { remaining: 1 }
        );
        assert_eq!(
            slot.verify("000002", at(8, 3)),
            VerifyOutcome::Mismatch { remaining: 0 }
        );
        // Even the right code is refused once the budget is spent.
        assert_eq!(
            slot.verify(code.reveal(), at(8, 4)),
            VerifyOutcome::AttemptsExhausted
        );
        assert!(!slot.verified);
        assert_eq!(slot.attempts, MAX_ATTEMPTS);
    }

    #[test]
    fn expired_code_is_refused_without_spending_attempts() {
        let mut slot = CodeSlot::new();
        let code = slot.issue(at(8, 0));
        assert_eq!(
            slot.verify(code.reveal(), at(8, 16)),
            VerifyOutcome::Expired
        );
        assert_eq!(slot.attempts, 0);
        assert!(!slot.verified);
    }

    #[test]
    fn submission_at_the_exact_expiry_instant_still_counts() {
        let mut slot = CodeSlot::new();
        let code = slot.issue(at(8, 0));
        assert_eq!(
            slot.verify(code.reveal(), at(8, 15)),
            VerifyOutcome::Verified
        );
    }

    #[test]
    fn reissue_replaces_the_code_and_resets_attempts() {
        let mut slot = CodeSlot::new();
        let first = slot.issue(at(8, 0));
        slot.verify("000000", at(8, 1));
        slot.verify("000001", at(8, 2));
        assert_eq!(slot.attempts, 2);

        let second = slot.issue(at(8, 3));
        assert_eq!(slot.attempts, 0);
        assert_eq!(slot.expires_at, Some(at(8, 3) + Duration::minutes(15)));
        if first.reveal() != second.reveal() {
            assert_eq!(
                slot.verify(first.reveal(), at(8, 4)),
                VerifyOutcome::Mismatch { remaining: 2 }
            );
        }
        assert_eq!(
            slot.verify(second.reveal(), at(8, 5)),
            VerifyOutcome::Verified
        );
    }

    #[test]
    fn verified_slot_is_final() {
        let mut slot = CodeSlot::new();
        let code = slot.issue(at(8, 0));
        slot.verify(code.reveal(), at(8, 1));
        assert_eq!(
            slot.verify(code.reveal(), at(8, 2)),
            VerifyOutcome::AlreadyVerified
        );
        assert_eq!(slot.attempts, 1);
    }

    #[test]
    fn serialized_slot_exposes_neither_digest_nor_salt() {
        let mut slot = CodeSlot::new();
        slot.issue(at(8, 0));
        let json = serde_json::to_value(&slot).unwrap();
        assert!(json.get("code_hash").is_none());
        assert!(json.get("salt").is_none());
        assert!(json.get("expires_at").is_some());
    }
}
