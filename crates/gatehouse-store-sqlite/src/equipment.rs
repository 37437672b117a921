//! `equipment` table access.

use gatehouse_core::{
  equipment::{Equipment, ReviewState},
  store::EquipmentFilter,
};
use rusqlite::{Connection, OptionalExtension as _, params};
use uuid::Uuid;

use crate::{
  Result,
  encode::{RawEquipment, encode_dt, encode_uuid, like_pattern, page},
};

pub fn by_id(conn: &Connection, id: Uuid) -> Result<Option<Equipment>> {
  let sql = format!(
    "SELECT {} FROM equipment e WHERE e.equipment_id = ?1",
    RawEquipment::COLUMNS
  );
  conn
    .query_row(&sql, params![encode_uuid(id)], RawEquipment::from_row)
    .optional()?
    .map(RawEquipment::into_equipment)
    .transpose()
}

pub fn serial_taken(conn: &Connection, serial: &str) -> Result<bool> {
  Ok(
    conn
      .query_row("SELECT 1 FROM equipment WHERE serial = ?1", params![serial], |_| Ok(()))
      .optional()?
      .is_some(),
  )
}

pub fn list(conn: &Connection, filter: &EquipmentFilter) -> Result<Vec<Equipment>> {
  let text = like_pattern(filter.text.as_deref());
  let (limit, offset) = page(filter.limit, filter.offset);
  let sql = format!(
    "SELECT {} FROM equipment e
     JOIN persons o ON o.person_id = e.owner_id
     WHERE (?1 IS NULL OR e.owner_id = ?1)
       AND (?2 IS NULL OR e.state = ?2)
       AND (?3 IS NULL
            OR e.serial LIKE ?3 OR e.brand LIKE ?3 OR e.model LIKE ?3
            OR o.username LIKE ?3 OR o.document LIKE ?3)
     ORDER BY e.created_at DESC, e.serial
     LIMIT ?4 OFFSET ?5",
    RawEquipment::COLUMNS
  );

  let mut stmt = conn.prepare(&sql)?;
  let raws = stmt
    .query_map(
      params![
        filter.owner_id.map(encode_uuid),
        filter.state.map(|s| s.as_ref().to_owned()),
        text,
        limit,
        offset,
      ],
      RawEquipment::from_row,
    )?
    .collect::<rusqlite::Result<Vec<_>>>()?;

  raws.into_iter().map(RawEquipment::into_equipment).collect()
}

/// Every approved item owned by `owner_id`, oldest first.
pub fn approved_for(conn: &Connection, owner_id: Uuid) -> Result<Vec<Equipment>> {
  let sql = format!(
    "SELECT {} FROM equipment e
     WHERE e.owner_id = ?1 AND e.state = ?2
     ORDER BY e.created_at",
    RawEquipment::COLUMNS
  );
  let mut stmt = conn.prepare(&sql)?;
  let raws = stmt
    .query_map(
      params![encode_uuid(owner_id), ReviewState::Approved.as_ref()],
      RawEquipment::from_row,
    )?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws.into_iter().map(RawEquipment::into_equipment).collect()
}

pub fn insert(conn: &Connection, eq: &Equipment) -> Result<()> {
  conn.execute(
    "INSERT INTO equipment (
       equipment_id, owner_id, serial, brand, model, state,
       rejection_reason, reviewed_by, reviewed_at, created_at
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
    params![
      encode_uuid(eq.equipment_id),
      encode_uuid(eq.owner_id),
      eq.serial,
      eq.brand,
      eq.model,
      eq.state.as_ref(),
      eq.rejection_reason,
      eq.reviewed_by.map(encode_uuid),
      eq.reviewed_at.map(encode_dt),
      encode_dt(eq.created_at),
    ],
  )?;
  Ok(())
}

/// Persist the review columns together.
pub fn save_review(conn: &Connection, eq: &Equipment) -> Result<()> {
  conn.execute(
    "UPDATE equipment
     SET state = ?2, rejection_reason = ?3, reviewed_by = ?4, reviewed_at = ?5
     WHERE equipment_id = ?1",
    params![
      encode_uuid(eq.equipment_id),
      eq.state.as_ref(),
      eq.rejection_reason,
      eq.reviewed_by.map(encode_uuid),
      eq.reviewed_at.map(encode_dt),
    ],
  )?;
  Ok(())
}
