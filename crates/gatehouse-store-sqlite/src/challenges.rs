//! `password_reset_challenges` table access.

use chrono::{DateTime, Utc};
use gatehouse_core::otp::PasswordResetChallenge;
use rusqlite::{Connection, OptionalExtension as _, params};
use uuid::Uuid;

use crate::{
  Result,
  encode::{RawChallenge, encode_dt, encode_uuid},
};

pub fn insert(conn: &Connection, challenge: &PasswordResetChallenge) -> Result<()> {
  conn.execute(
    "INSERT INTO password_reset_challenges (
       challenge_id, person_id, salt, code_hash, created_at, expires_at, attempts, used_at
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
    params![
      encode_uuid(challenge.challenge_id),
      encode_uuid(challenge.person_id),
      challenge.salt,
      challenge.code_hash,
      encode_dt(challenge.created_at),
      encode_dt(challenge.expires_at),
      challenge.attempts,
      challenge.used_at.map(encode_dt),
    ],
  )?;
  Ok(())
}

/// The person's most recent challenge; older ones are never candidates.
pub fn latest_for(conn: &Connection, person_id: Uuid) -> Result<Option<PasswordResetChallenge>> {
  let sql = format!(
    "SELECT {} FROM password_reset_challenges c
     WHERE c.person_id = ?1
     ORDER BY c.created_at DESC, c.rowid DESC
     LIMIT 1",
    RawChallenge::COLUMNS
  );
  conn
    .query_row(&sql, params![encode_uuid(person_id)], RawChallenge::from_row)
    .optional()?
    .map(RawChallenge::into_challenge)
    .transpose()
}

pub fn record_failed_attempt(conn: &Connection, challenge_id: Uuid) -> Result<()> {
  conn.execute(
    "UPDATE password_reset_challenges SET attempts = attempts + 1 WHERE challenge_id = ?1",
    params![encode_uuid(challenge_id)],
  )?;
  Ok(())
}

pub fn mark_used(conn: &Connection, challenge_id: Uuid, at: DateTime<Utc>) -> Result<()> {
  conn.execute(
    "UPDATE password_reset_challenges SET used_at = ?2
     WHERE challenge_id = ?1 AND used_at IS NULL",
    params![encode_uuid(challenge_id), encode_dt(at)],
  )?;
  Ok(())
}
