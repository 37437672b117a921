//! `shifts` table access.

use gatehouse_core::{
  shift::{Shift, ShiftSummary},
  store::ShiftFilter,
};
use rusqlite::{Connection, OptionalExtension as _, params};
use uuid::Uuid;

use crate::{
  Result,
  encode::{RawShift, encode_dt, encode_uuid, page},
};

fn select(clause: &str) -> String {
  format!("SELECT {} FROM shifts s {clause}", RawShift::COLUMNS)
}

pub fn by_id(conn: &Connection, id: Uuid) -> Result<Option<Shift>> {
  conn
    .query_row(&select("WHERE s.shift_id = ?1"), params![encode_uuid(id)], RawShift::from_row)
    .optional()?
    .map(RawShift::into_shift)
    .transpose()
}

/// The guard's open shift. Served by `shifts_guard_active_idx`.
pub fn active_for(conn: &Connection, guard_id: Uuid) -> Result<Option<Shift>> {
  conn
    .query_row(
      &select(
        "WHERE s.guard_id = ?1 AND s.active = 1 AND s.ended_at IS NULL
         ORDER BY s.started_at DESC LIMIT 1",
      ),
      params![encode_uuid(guard_id)],
      RawShift::from_row,
    )
    .optional()?
    .map(RawShift::into_shift)
    .transpose()
}

pub fn list(conn: &Connection, filter: &ShiftFilter) -> Result<Vec<Shift>> {
  let (limit, offset) = page(filter.limit, filter.offset);
  let sql = select(
    "WHERE (?1 IS NULL OR s.guard_id = ?1)
       AND (?2 IS NULL OR s.site = ?2)
       AND (?3 IS NULL OR s.period = ?3)
       AND (?4 IS NULL OR s.active = ?4)
     ORDER BY s.started_at DESC
     LIMIT ?5 OFFSET ?6",
  );
  let mut stmt = conn.prepare(&sql)?;
  let raws = stmt
    .query_map(
      params![
        filter.guard_id.map(encode_uuid),
        filter.site.map(|s| s.as_ref().to_owned()),
        filter.period.map(|p| p.as_ref().to_owned()),
        filter.active,
        limit,
        offset,
      ],
      RawShift::from_row,
    )?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws.into_iter().map(RawShift::into_shift).collect()
}

/// Every shift, for the audit pass.
pub fn all(conn: &Connection) -> Result<Vec<Shift>> {
  let mut stmt = conn.prepare(&select("ORDER BY s.started_at"))?;
  let raws = stmt
    .query_map([], RawShift::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws.into_iter().map(RawShift::into_shift).collect()
}

pub fn insert(conn: &Connection, shift: &Shift) -> Result<()> {
  conn.execute(
    "INSERT INTO shifts (shift_id, guard_id, site, period, started_at, ended_at, active)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    params![
      encode_uuid(shift.shift_id),
      encode_uuid(shift.guard_id),
      shift.site.as_ref(),
      shift.period.as_ref(),
      encode_dt(shift.started_at),
      shift.ended_at.map(encode_dt),
      shift.active,
    ],
  )?;
  Ok(())
}

/// Persist `ended_at` and `active`; `started_at` never changes.
pub fn save_state(conn: &Connection, shift: &Shift) -> Result<()> {
  conn.execute(
    "UPDATE shifts SET ended_at = ?2, active = ?3 WHERE shift_id = ?1",
    params![encode_uuid(shift.shift_id), shift.ended_at.map(encode_dt), shift.active],
  )?;
  Ok(())
}

/// Counts the events registered while the shift was worked, including exits
/// whose entry belongs to an earlier shift.
pub fn summary(conn: &Connection, shift_id: Uuid) -> Result<ShiftSummary> {
  let (entries, exits): (i64, i64) = conn.query_row(
    "SELECT
       COALESCE(SUM(direction = 'entry'), 0),
       COALESCE(SUM(direction = 'exit'), 0)
     FROM access_events WHERE registered_in = ?1",
    params![encode_uuid(shift_id)],
    |row| Ok((row.get(0)?, row.get(1)?)),
  )?;
  Ok(ShiftSummary::new(entries.max(0) as u64, exits.max(0) as u64))
}
