//! `notifications` table access. One row per recipient.

use chrono::{DateTime, Utc};
use gatehouse_core::notify::{NewNotification, Notification};
use rusqlite::{Connection, OptionalExtension as _, params};
use uuid::Uuid;

use crate::{
  Result,
  encode::{RawNotification, encode_dt, encode_uuid},
};

/// Insert one copy of `note` per recipient; returns how many were written.
pub fn fan_out(
  conn: &Connection,
  recipients: &[Uuid],
  note: &NewNotification,
  now: DateTime<Utc>,
) -> Result<usize> {
  let data = serde_json::to_string(&note.data)?;
  let created_at = encode_dt(now);
  let mut stmt = conn.prepare_cached(
    "INSERT INTO notifications (
       notification_id, recipient_id, severity, title, message, data, created_at
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
  )?;
  for &recipient in recipients {
    stmt.execute(params![
      encode_uuid(Uuid::new_v4()),
      encode_uuid(recipient),
      note.severity.as_ref(),
      note.title,
      note.message,
      data,
      created_at,
    ])?;
  }
  Ok(recipients.len())
}

/// The recipient's notifications, newest first.
pub fn list_for(conn: &Connection, recipient_id: Uuid) -> Result<Vec<Notification>> {
  let sql = format!(
    "SELECT {} FROM notifications n
     WHERE n.recipient_id = ?1
     ORDER BY n.created_at DESC, n.rowid DESC",
    RawNotification::COLUMNS
  );
  let mut stmt = conn.prepare(&sql)?;
  let raws = stmt
    .query_map(params![encode_uuid(recipient_id)], RawNotification::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws.into_iter().map(RawNotification::into_notification).collect()
}

/// A notification, but only if it was addressed to `recipient_id`.
pub fn owned_by(
  conn: &Connection,
  recipient_id: Uuid,
  notification_id: Uuid,
) -> Result<Option<Notification>> {
  let sql = format!(
    "SELECT {} FROM notifications n WHERE n.notification_id = ?1 AND n.recipient_id = ?2",
    RawNotification::COLUMNS
  );
  conn
    .query_row(
      &sql,
      params![encode_uuid(notification_id), encode_uuid(recipient_id)],
      RawNotification::from_row,
    )
    .optional()?
    .map(RawNotification::into_notification)
    .transpose()
}

pub fn mark_read(conn: &Connection, notification_id: Uuid, at: DateTime<Utc>) -> Result<()> {
  conn.execute(
    "UPDATE notifications SET read_at = ?2 WHERE notification_id = ?1 AND read_at IS NULL",
    params![encode_uuid(notification_id), encode_dt(at)],
  )?;
  Ok(())
}
