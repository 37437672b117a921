//! The append-only access ledger: `access_events` and its equipment links.
//!
//! "Latest" always means highest `seq`. Registrations are serialised by the
//! write transaction, so `seq` follows commit order whatever the clock did.

use gatehouse_core::{
  access::{AccessEvent, Direction},
  store::AccessFilter,
};
use rusqlite::{Connection, OptionalExtension as _, params};
use uuid::Uuid;

use crate::{
  Result,
  encode::{RawEvent, decode_enum, encode_date, encode_dt, encode_uuid, like_pattern, page},
};

pub fn latest_for_subject(conn: &Connection, subject_id: Uuid) -> Result<Option<AccessEvent>> {
  let sql = format!(
    "SELECT {} FROM access_events a
     WHERE a.subject_id = ?1
     ORDER BY a.seq DESC
     LIMIT 1",
    RawEvent::COLUMNS
  );
  conn
    .query_row(&sql, params![encode_uuid(subject_id)], RawEvent::from_row)
    .optional()?
    .map(RawEvent::into_event)
    .transpose()
}

/// Direction of the latest event, of any subject, that carried the item.
pub fn equipment_last_direction(conn: &Connection, equipment_id: Uuid) -> Result<Option<Direction>> {
  let direction: Option<String> = conn
    .query_row(
      "SELECT a.direction
       FROM access_event_equipment l
       JOIN access_events a ON a.seq = l.event_seq
       WHERE l.equipment_id = ?1
       ORDER BY l.event_seq DESC
       LIMIT 1",
      params![encode_uuid(equipment_id)],
      |row| row.get(0),
    )
    .optional()?;
  direction
    .as_deref()
    .map(|d| decode_enum("direction", d))
    .transpose()
}

/// Append an event and its equipment links. `registered_in` is the
/// registering actor's active shift.
pub fn insert(conn: &Connection, event: &AccessEvent, registered_in: Option<Uuid>) -> Result<()> {
  let recorded_at = encode_dt(event.recorded_at);
  conn.execute(
    "INSERT INTO access_events (
       event_id, subject_id, direction, recorded_at, registered_by, shift_id, registered_in, site
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
    params![
      encode_uuid(event.event_id),
      encode_uuid(event.subject_id),
      event.direction.as_ref(),
      recorded_at,
      event.registered_by.map(encode_uuid),
      event.shift_id.map(encode_uuid),
      registered_in.map(encode_uuid),
      event.site.map(|s| s.as_ref().to_owned()),
    ],
  )?;
  let seq = conn.last_insert_rowid();

  let mut link = conn.prepare_cached(
    "INSERT INTO access_event_equipment (event_seq, equipment_id, recorded_at)
     VALUES (?1, ?2, ?3)",
  )?;
  for &equipment_id in &event.equipment_ids {
    link.execute(params![seq, encode_uuid(equipment_id), recorded_at])?;
  }
  Ok(())
}

/// Filtered events, newest first.
pub fn list(conn: &Connection, filter: &AccessFilter) -> Result<Vec<AccessEvent>> {
  let text = like_pattern(filter.text.as_deref());
  let (limit, offset) = page(filter.limit, filter.offset);
  let sql = format!(
    "SELECT {} FROM access_events a
     JOIN persons p ON p.person_id = a.subject_id
     WHERE (?1 IS NULL OR a.subject_id = ?1)
       AND (?2 IS NULL OR a.registered_by = ?2)
       AND (?3 IS NULL OR a.shift_id = ?3)
       AND (?4 IS NULL OR a.direction = ?4)
       AND (?5 IS NULL OR a.site = ?5)
       AND (?6 IS NULL OR substr(a.recorded_at, 1, 10) >= ?6)
       AND (?7 IS NULL OR substr(a.recorded_at, 1, 10) <= ?7)
       AND (?8 IS NULL OR p.username LIKE ?8 OR p.document LIKE ?8)
     ORDER BY a.seq DESC
     LIMIT ?9 OFFSET ?10",
    RawEvent::COLUMNS
  );

  let mut stmt = conn.prepare(&sql)?;
  let raws = stmt
    .query_map(
      params![
        filter.subject_id.map(encode_uuid),
        filter.registered_by.map(encode_uuid),
        filter.shift_id.map(encode_uuid),
        filter.direction.map(|d| d.as_ref().to_owned()),
        filter.site.map(|s| s.as_ref().to_owned()),
        filter.from.map(encode_date),
        filter.to.map(encode_date),
        text,
        limit,
        offset,
      ],
      RawEvent::from_row,
    )?
    .collect::<rusqlite::Result<Vec<_>>>()?;

  raws.into_iter().map(RawEvent::into_event).collect()
}
