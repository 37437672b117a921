//! `persons` table access. Every function takes a plain connection so it can
//! run inside or outside a transaction.

use std::collections::BTreeMap;

use gatehouse_core::{
  Rejection,
  person::{Person, Role},
  store::PersonFilter,
};
use rusqlite::{Connection, OptionalExtension as _, params};
use uuid::Uuid;

use crate::{
  Result,
  encode::{RawPerson, decode_uuid, encode_dt, encode_uuid, like_pattern, page},
};

fn select(clause: &str) -> String {
  format!("SELECT {} FROM persons p {clause}", RawPerson::COLUMNS)
}

fn one(conn: &Connection, clause: &str, key: &str) -> Result<Option<Person>> {
  conn
    .query_row(&select(clause), params![key], RawPerson::from_row)
    .optional()?
    .map(RawPerson::into_person)
    .transpose()
}

pub fn by_id(conn: &Connection, id: Uuid) -> Result<Option<Person>> {
  one(conn, "WHERE p.person_id = ?1", &encode_uuid(id))
}

/// Like [`by_id`], but a missing person is a `NotFound` rejection.
pub fn require(conn: &Connection, id: Uuid) -> Result<Person> {
  Ok(by_id(conn, id)?.ok_or_else(|| Rejection::not_found("person"))?)
}

pub fn by_document(conn: &Connection, document: &str) -> Result<Option<Person>> {
  one(conn, "WHERE p.document = ?1", document.trim())
}

pub fn by_email(conn: &Connection, email: &str) -> Result<Option<Person>> {
  one(conn, "WHERE p.email = ?1 COLLATE NOCASE", email.trim())
}

/// The person with `username` together with their password hash.
pub fn login(conn: &Connection, username: &str) -> Result<Option<(Person, String)>> {
  let sql = format!(
    "SELECT {}, p.password_hash FROM persons p WHERE p.username = ?1",
    RawPerson::COLUMNS
  );
  let row = conn
    .query_row(&sql, params![username], |row| {
      Ok((RawPerson::from_row(row)?, row.get::<_, String>(11)?))
    })
    .optional()?;

  match row {
    Some((raw, hash)) => Ok(Some((raw.into_person()?, hash))),
    None => Ok(None),
  }
}

pub fn list(conn: &Connection, filter: &PersonFilter) -> Result<Vec<Person>> {
  let text = like_pattern(filter.text.as_deref());
  let (limit, offset) = page(filter.limit, filter.offset);
  let sql = select(
    "WHERE (?1 IS NULL OR p.role = ?1)
       AND (?2 IS NULL OR p.status = ?2)
       AND (?3 IS NULL OR p.home_site = ?3)
       AND (?4 IS NULL
            OR p.username LIKE ?4 OR p.email LIKE ?4 OR p.document LIKE ?4
            OR p.first_name LIKE ?4 OR p.last_name LIKE ?4)
     ORDER BY p.username
     LIMIT ?5 OFFSET ?6",
  );

  let mut stmt = conn.prepare(&sql)?;
  let raws = stmt
    .query_map(
      params![
        filter.role.map(|r| r.as_ref().to_owned()),
        filter.status.map(|s| s.as_ref().to_owned()),
        filter.site.map(|s| s.as_ref().to_owned()),
        text,
        limit,
        offset,
      ],
      RawPerson::from_row,
    )?
    .collect::<rusqlite::Result<Vec<_>>>()?;

  raws.into_iter().map(RawPerson::into_person).collect()
}

pub fn ids_with_role(conn: &Connection, role: Role) -> Result<Vec<Uuid>> {
  let mut stmt = conn.prepare("SELECT person_id FROM persons WHERE role = ?1")?;
  let ids = stmt
    .query_map(params![role.as_ref()], |row| row.get::<_, String>(0))?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  ids.iter().map(|s| decode_uuid(s)).collect()
}

pub fn all_ids(conn: &Connection) -> Result<Vec<Uuid>> {
  let mut stmt = conn.prepare("SELECT person_id FROM persons")?;
  let ids = stmt
    .query_map([], |row| row.get::<_, String>(0))?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  ids.iter().map(|s| decode_uuid(s)).collect()
}

/// Reject values that would collide with another person's username, email or
/// document. `except` is the person being updated, if any.
pub fn check_unique(
  conn: &Connection,
  username: Option<&str>,
  email: Option<&str>,
  document: Option<&str>,
  except: Option<Uuid>,
) -> Result<()> {
  let except = except.map(encode_uuid);
  let taken = |column: &str, value: &str| -> Result<bool> {
    let sql = format!(
      "SELECT 1 FROM persons WHERE {column} = ?1 AND (?2 IS NULL OR person_id <> ?2)"
    );
    Ok(
      conn
        .query_row(&sql, params![value, except], |_| Ok(()))
        .optional()?
        .is_some(),
    )
  };

  let mut fields = BTreeMap::new();
  if let Some(username) = username
    && taken("username", username)?
  {
    fields.insert("username".to_owned(), "is already in use".to_owned());
  }
  if let Some(email) = email
    && taken("email", email)?
  {
    fields.insert("email".to_owned(), "is already in use".to_owned());
  }
  if let Some(document) = document
    && taken("document", document)?
  {
    fields.insert("document".to_owned(), "is already registered".to_owned());
  }

  if fields.is_empty() {
    Ok(())
  } else {
    let names: Vec<&str> = fields.keys().map(String::as_str).collect();
    Err(
      Rejection::Validation {
        message: format!("invalid data: duplicate {}", names.join(", ")),
        fields,
      }
      .into(),
    )
  }
}

pub fn insert(conn: &Connection, person: &Person, password_hash: &str) -> Result<()> {
  conn.execute(
    "INSERT INTO persons (
       person_id, username, email, password_hash, first_name, last_name,
       role, status, home_site, training_program, document, created_at
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
    params![
      encode_uuid(person.person_id),
      person.username,
      person.email,
      password_hash,
      person.first_name,
      person.last_name,
      person.role.as_ref(),
      person.status.as_ref(),
      person.home_site.map(|s| s.as_ref().to_owned()),
      person.training_program,
      person.document,
      encode_dt(person.created_at),
    ],
  )?;
  Ok(())
}

/// Write back every mutable column of `person`.
pub fn update(conn: &Connection, person: &Person) -> Result<()> {
  conn.execute(
    "UPDATE persons SET
       email = ?2, first_name = ?3, last_name = ?4, role = ?5, status = ?6,
       home_site = ?7, training_program = ?8, document = ?9
     WHERE person_id = ?1",
    params![
      encode_uuid(person.person_id),
      person.email,
      person.first_name,
      person.last_name,
      person.role.as_ref(),
      person.status.as_ref(),
      person.home_site.map(|s| s.as_ref().to_owned()),
      person.training_program,
      person.document,
    ],
  )?;
  Ok(())
}

pub fn set_password(conn: &Connection, id: Uuid, password_hash: &str) -> Result<()> {
  conn.execute(
    "UPDATE persons SET password_hash = ?2 WHERE person_id = ?1",
    params![encode_uuid(id), password_hash],
  )?;
  Ok(())
}
