//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 UTC strings with
//! microseconds, so lexical order is chronological order. Enums are stored as
//! their `strum` text form. UUIDs are stored as hyphenated lowercase strings.

use std::{collections::BTreeSet, str::FromStr};

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use gatehouse_core::{
  access::AccessEvent,
  equipment::Equipment,
  notify::Notification,
  otp::PasswordResetChallenge,
  person::Person,
  shift::Shift,
  store::DEFAULT_LIMIT,
};
use rusqlite::Row;
use uuid::Uuid;

use crate::{Error, Result};

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

fn decode_opt_uuid(s: Option<String>) -> Result<Option<Uuid>> {
  s.as_deref().map(decode_uuid).transpose()
}

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::Decode(format!("timestamp {s:?}: {e}")))
}

fn decode_opt_dt(s: Option<String>) -> Result<Option<DateTime<Utc>>> {
  s.as_deref().map(decode_dt).transpose()
}

/// `YYYY-MM-DD`, comparable against the date prefix of an encoded timestamp.
pub fn encode_date(d: NaiveDate) -> String { d.format("%Y-%m-%d").to_string() }

pub fn decode_enum<T: FromStr>(what: &str, s: &str) -> Result<T> {
  s.parse()
    .map_err(|_| Error::Decode(format!("unknown {what}: {s:?}")))
}

fn decode_opt_enum<T: FromStr>(what: &str, s: Option<String>) -> Result<Option<T>> {
  s.as_deref().map(|s| decode_enum(what, s)).transpose()
}

// ─── Query helpers ───────────────────────────────────────────────────────────

/// A `LIKE` pattern for free-text search; `None` for blank input.
pub fn like_pattern(text: Option<&str>) -> Option<String> {
  text
    .map(str::trim)
    .filter(|t| !t.is_empty())
    .map(|t| format!("%{t}%"))
}

/// `(limit, offset)` as SQLite integers.
pub fn page(limit: Option<usize>, offset: Option<usize>) -> (i64, i64) {
  let limit = limit.unwrap_or(DEFAULT_LIMIT).min(i64::MAX as usize) as i64;
  let offset = offset.unwrap_or(0).min(i64::MAX as usize) as i64;
  (limit, offset)
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw strings read directly from a `persons` row.
pub struct RawPerson {
  pub person_id:        String,
  pub username:         String,
  pub email:            Option<String>,
  pub first_name:       String,
  pub last_name:        String,
  pub role:             String,
  pub status:           String,
  pub home_site:        Option<String>,
  pub training_program: Option<String>,
  pub document:         Option<String>,
  pub created_at:       String,
}

impl RawPerson {
  /// Column list for `persons p`, in [`RawPerson::from_row`] order.
  pub const COLUMNS: &'static str = "p.person_id, p.username, p.email, p.first_name, p.last_name, \
                             p.role, p.status, p.home_site, p.training_program, p.document, \
                             p.created_at";

  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      person_id:        row.get(0)?,
      username:         row.get(1)?,
      email:            row.get(2)?,
      first_name:       row.get(3)?,
      last_name:        row.get(4)?,
      role:             row.get(5)?,
      status:           row.get(6)?,
      home_site:        row.get(7)?,
      training_program: row.get(8)?,
      document:         row.get(9)?,
      created_at:       row.get(10)?,
    })
  }

  pub fn into_person(self) -> Result<Person> {
    Ok(Person {
      person_id:        decode_uuid(&self.person_id)?,
      username:         self.username,
      email:            self.email,
      first_name:       self.first_name,
      last_name:        self.last_name,
      role:             decode_enum("role", &self.role)?,
      status:           decode_enum("status", &self.status)?,
      home_site:        decode_opt_enum("site", self.home_site)?,
      training_program: self.training_program,
      document:         self.document,
      created_at:       decode_dt(&self.created_at)?,
    })
  }
}

/// Raw strings read directly from an `equipment` row.
pub struct RawEquipment {
  pub equipment_id:     String,
  pub owner_id:         String,
  pub serial:           String,
  pub brand:            String,
  pub model:            String,
  pub state:            String,
  pub rejection_reason: Option<String>,
  pub reviewed_by:      Option<String>,
  pub reviewed_at:      Option<String>,
  pub created_at:       String,
}

impl RawEquipment {
  /// Column list for `equipment e`.
  pub const COLUMNS: &'static str = "e.equipment_id, e.owner_id, e.serial, e.brand, e.model, e.state, \
                             e.rejection_reason, e.reviewed_by, e.reviewed_at, e.created_at";

  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      equipment_id:     row.get(0)?,
      owner_id:         row.get(1)?,
      serial:           row.get(2)?,
      brand:            row.get(3)?,
      model:            row.get(4)?,
      state:            row.get(5)?,
      rejection_reason: row.get(6)?,
      reviewed_by:      row.get(7)?,
      reviewed_at:      row.get(8)?,
      created_at:       row.get(9)?,
    })
  }

  pub fn into_equipment(self) -> Result<Equipment> {
    Ok(Equipment {
      equipment_id:     decode_uuid(&self.equipment_id)?,
      owner_id:         decode_uuid(&self.owner_id)?,
      serial:           self.serial,
      brand:            self.brand,
      model:            self.model,
      state:            decode_enum("review state", &self.state)?,
      rejection_reason: self.rejection_reason,
      reviewed_by:      decode_opt_uuid(self.reviewed_by)?,
      reviewed_at:      decode_opt_dt(self.reviewed_at)?,
      created_at:       decode_dt(&self.created_at)?,
    })
  }
}

/// Raw strings read directly from a `shifts` row.
pub struct RawShift {
  pub shift_id:   String,
  pub guard_id:   String,
  pub site:       String,
  pub period:     String,
  pub started_at: String,
  pub ended_at:   Option<String>,
  pub active:     bool,
}

impl RawShift {
  pub const COLUMNS: &'static str = "s.shift_id, s.guard_id, s.site, s.period, s.started_at, \
                             s.ended_at, s.active";

  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      shift_id:   row.get(0)?,
      guard_id:   row.get(1)?,
      site:       row.get(2)?,
      period:     row.get(3)?,
      started_at: row.get(4)?,
      ended_at:   row.get(5)?,
      active:     row.get(6)?,
    })
  }

  pub fn into_shift(self) -> Result<Shift> {
    Ok(Shift {
      shift_id:   decode_uuid(&self.shift_id)?,
      guard_id:   decode_uuid(&self.guard_id)?,
      site:       decode_enum("site", &self.site)?,
      period:     decode_enum("period", &self.period)?,
      started_at: decode_dt(&self.started_at)?,
      ended_at:   decode_opt_dt(self.ended_at)?,
      active:     self.active,
    })
  }
}

/// Raw strings read from an `access_events` row, with its equipment links
/// folded into a comma-separated list.
pub struct RawEvent {
  pub event_id:      String,
  pub subject_id:    String,
  pub direction:     String,
  pub recorded_at:   String,
  pub registered_by: Option<String>,
  pub shift_id:      Option<String>,
  pub site:          Option<String>,
  pub equipment:     Option<String>,
}

impl RawEvent {
  pub const COLUMNS: &'static str = "a.event_id, a.subject_id, a.direction, a.recorded_at, \
                             a.registered_by, a.shift_id, a.site, \
                             (SELECT group_concat(l.equipment_id, ',') \
                                FROM access_event_equipment l WHERE l.event_seq = a.seq)";

  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      event_id:      row.get(0)?,
      subject_id:    row.get(1)?,
      direction:     row.get(2)?,
      recorded_at:   row.get(3)?,
      registered_by: row.get(4)?,
      shift_id:      row.get(5)?,
      site:          row.get(6)?,
      equipment:     row.get(7)?,
    })
  }

  pub fn into_event(self) -> Result<AccessEvent> {
    let equipment_ids = self
      .equipment
      .as_deref()
      .unwrap_or_default()
      .split(',')
      .filter(|s| !s.is_empty())
      .map(decode_uuid)
      .collect::<Result<BTreeSet<_>>>()?;

    Ok(AccessEvent {
      event_id: decode_uuid(&self.event_id)?,
      subject_id: decode_uuid(&self.subject_id)?,
      direction: decode_enum("direction", &self.direction)?,
      recorded_at: decode_dt(&self.recorded_at)?,
      registered_by: decode_opt_uuid(self.registered_by)?,
      shift_id: decode_opt_uuid(self.shift_id)?,
      site: decode_opt_enum("site", self.site)?,
      equipment_ids,
    })
  }
}

/// Raw strings read directly from a `password_reset_challenges` row.
pub struct RawChallenge {
  pub challenge_id: String,
  pub person_id:    String,
  pub salt:         String,
  pub code_hash:    String,
  pub created_at:   String,
  pub expires_at:   String,
  pub attempts:     u32,
  pub used_at:      Option<String>,
}

impl RawChallenge {
  pub const COLUMNS: &'static str = "c.challenge_id, c.person_id, c.salt, c.code_hash, c.created_at, \
                             c.expires_at, c.attempts, c.used_at";

  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      challenge_id: row.get(0)?,
      person_id:    row.get(1)?,
      salt:         row.get(2)?,
      code_hash:    row.get(3)?,
      created_at:   row.get(4)?,
      expires_at:   row.get(5)?,
      attempts:     row.get(6)?,
      used_at:      row.get(7)?,
    })
  }

  pub fn into_challenge(self) -> Result<PasswordResetChallenge> {
    Ok(PasswordResetChallenge {
      challenge_id: decode_uuid(&self.challenge_id)?,
      person_id:    decode_uuid(&self.person_id)?,
      salt:         self.salt,
      code_hash:    self.code_hash,
      created_at:   decode_dt(&self.created_at)?,
      expires_at:   decode_dt(&self.expires_at)?,
      attempts:     self.attempts,
      used_at:      decode_opt_dt(self.used_at)?,
    })
  }
}

/// Raw strings read directly from a `notifications` row.
pub struct RawNotification {
  pub notification_id: String,
  pub recipient_id:    String,
  pub severity:        String,
  pub title:           String,
  pub message:         String,
  pub data:            String,
  pub created_at:      String,
  pub read_at:         Option<String>,
}

impl RawNotification {
  pub const COLUMNS: &'static str = "n.notification_id, n.recipient_id, n.severity, n.title, n.message, \
                             n.data, n.created_at, n.read_at";

  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      notification_id: row.get(0)?,
      recipient_id:    row.get(1)?,
      severity:        row.get(2)?,
      title:           row.get(3)?,
      message:         row.get(4)?,
      data:            row.get(5)?,
      created_at:      row.get(6)?,
      read_at:         row.get(7)?,
    })
  }

  pub fn into_notification(self) -> Result<Notification> {
    Ok(Notification {
      notification_id: decode_uuid(&self.notification_id)?,
      recipient_id:    decode_uuid(&self.recipient_id)?,
      severity:        decode_enum("severity", &self.severity)?,
      title:           self.title,
      message:         self.message,
      data:            serde_json::from_str(&self.data)?,
      created_at:      decode_dt(&self.created_at)?,
      read_at:         decode_opt_dt(self.read_at)?,
    })
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  #[test]
  fn timestamps_sort_lexically() {
    let a = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
    let b = a + chrono::Duration::microseconds(1);
    assert!(encode_dt(a) < encode_dt(b));
    assert_eq!(encode_dt(a), "2024-03-01T09:00:00.000000Z");
    assert_eq!(decode_dt(&encode_dt(b)).unwrap(), b);
    assert!(encode_dt(a).starts_with(&encode_date(a.date_naive())));
  }

  #[test]
  fn blank_search_text_is_ignored() {
    assert_eq!(like_pattern(Some("  ")), None);
    assert_eq!(like_pattern(Some(" ana ")).as_deref(), Some("%ana%"));
  }
}
