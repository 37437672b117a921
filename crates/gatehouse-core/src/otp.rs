//! One-time password-reset codes.
//!
//! A challenge stores a random salt and `SHA-256(salt ‖ code)`; the code
//! itself only ever exists in the email. Only a person's most recent
//! challenge is considered, and once used it stays used.

use chrono::{DateTime, Duration, Utc};
use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::{Rejection, Result};

/// How long a code stays valid after it is issued.
pub const CODE_TTL_MINUTES: i64 = 10;
/// Failed attempts after which the challenge is locked.
pub const MAX_ATTEMPTS: u32 = 5;
pub const CODE_LEN: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordResetChallenge {
  pub challenge_id: Uuid,
  pub person_id:    Uuid,
  /// Hex-encoded random salt.
  pub salt:         String,
  /// Hex-encoded `SHA-256(salt ‖ code)`.
  pub code_hash:    String,
  pub created_at:   DateTime<Utc>,
  pub expires_at:   DateTime<Utc>,
  /// Only ever increases.
  pub attempts:     u32,
  /// Terminal once set.
  pub used_at:      Option<DateTime<Utc>>,
}

impl PasswordResetChallenge {
  /// Issue a challenge for `person_id`. Returns the challenge and the
  /// plaintext code to send.
  pub fn issue(person_id: Uuid, now: DateTime<Utc>) -> (Self, String) {
    let code = generate_code();
    let salt = generate_salt();
    let challenge = Self {
      challenge_id: Uuid::new_v4(),
      person_id,
      code_hash: hash_code(&salt, &code),
      salt,
      created_at: now,
      expires_at: now + Duration::minutes(CODE_TTL_MINUTES),
      attempts: 0,
      used_at: None,
    };
    (challenge, code)
  }

  pub fn is_used(&self) -> bool { self.used_at.is_some() }

  pub fn matches(&self, code: &str) -> bool {
    let supplied = hash_code(&self.salt, code);
    supplied.as_bytes().ct_eq(self.code_hash.as_bytes()).into()
  }
}

/// Outcome of checking a code against the latest challenge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeCheck {
  Accepted,
  /// Wrong code; the caller must persist the incremented attempt counter
  /// before reporting [`Rejection::InvalidCode`].
  Mismatch,
}

/// Check `code` against `latest`, the person's most recent challenge.
///
/// Rejections are returned in precedence order: missing or used, expired,
/// locked. A mismatch is not a rejection here because it has a side effect.
pub fn check(
  latest: Option<&PasswordResetChallenge>,
  code: &str,
  now: DateTime<Utc>,
) -> Result<CodeCheck> {
  let challenge = latest
    .filter(|c| !c.is_used())
    .ok_or(Rejection::NoActiveChallenge)?;
  if now >= challenge.expires_at {
    return Err(Rejection::Expired);
  }
  if challenge.attempts >= MAX_ATTEMPTS {
    return Err(Rejection::TooManyAttempts);
  }
  if challenge.matches(code) {
    Ok(CodeCheck::Accepted)
  } else {
    Ok(CodeCheck::Mismatch)
  }
}

/// A code must be exactly six ASCII digits.
pub fn validate_code(code: &str) -> Result<()> {
  if code.len() == CODE_LEN && code.bytes().all(|b| b.is_ascii_digit()) {
    Ok(())
  } else {
    Err(Rejection::invalid_field("code", "must be 6 digits"))
  }
}

pub fn hash_code(salt: &str, code: &str) -> String {
  let mut hasher = Sha256::new();
  hasher.update(salt.as_bytes());
  hasher.update(code.as_bytes());
  hex::encode(hasher.finalize())
}

fn generate_code() -> String {
  let n = OsRng.next_u32() % 1_000_000;
  format!("{n:06}")
}

fn generate_salt() -> String {
  let mut bytes = [0u8; 16];
  OsRng.fill_bytes(&mut bytes);
  hex::encode(bytes)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn issued() -> (PasswordResetChallenge, String, DateTime<Utc>) {
    let now = Utc::now();
    let (challenge, code) = PasswordResetChallenge::issue(Uuid::new_v4(), now);
    (challenge, code, now)
  }

  #[test]
  fn issued_code_is_six_digits_and_matches() {
    let (challenge, code, now) = issued();
    assert!(validate_code(&code).is_ok());
    assert_eq!(challenge.expires_at - challenge.created_at, Duration::minutes(10));
    assert_eq!(check(Some(&challenge), &code, now), Ok(CodeCheck::Accepted));
  }

  #[test]
  fn salts_differ_between_challenges() {
    let (a, _, _) = issued();
    let (b, _, _) = issued();
    assert_ne!(a.salt, b.salt);
  }

  #[test]
  fn wrong_code_is_a_mismatch() {
    let (challenge, code, now) = issued();
    let wrong = if code == "000000" { "000001" } else { "000000" };
    assert_eq!(check(Some(&challenge), wrong, now), Ok(CodeCheck::Mismatch));
  }

  #[test]
  fn expired_after_ttl() {
    let (challenge, code, now) = issued();
    let later = now + Duration::minutes(11);
    assert_eq!(check(Some(&challenge), &code, later), Err(Rejection::Expired));
  }

  #[test]
  fn locked_after_five_attempts() {
    let (mut challenge, code, now) = issued();
    challenge.attempts = MAX_ATTEMPTS;
    assert_eq!(check(Some(&challenge), &code, now), Err(Rejection::TooManyAttempts));
  }

  #[test]
  fn used_challenge_is_never_active_again() {
    let (mut challenge, code, now) = issued();
    challenge.used_at = Some(now);
    assert_eq!(check(Some(&challenge), &code, now), Err(Rejection::NoActiveChallenge));
    assert_eq!(check(None, &code, now), Err(Rejection::NoActiveChallenge));
  }

  #[test]
  fn code_format() {
    assert!(validate_code("012345").is_ok());
    assert!(validate_code("12345").is_err());
    assert!(validate_code("12345a").is_err());
    assert!(validate_code("１２３４５６").is_err());
  }
}
