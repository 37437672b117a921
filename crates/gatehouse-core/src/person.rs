//! People, their roles, and the role → capability table.
//!
//! Every operation consults [`Role::capabilities`] once instead of comparing
//! role strings ad hoc.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use crate::{Rejection, Result};

// ─── Enumerations ────────────────────────────────────────────────────────────

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsRefStr, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
  Admin,
  Guard,
  Trainee,
}

#[derive(
  Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, AsRefStr, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PersonStatus {
  #[default]
  Active,
  Blocked,
}

/// A campus site. Shifts are worked at a site and events inherit it.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsRefStr, Display, EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Site {
  Cegafe,
  SantaClara,
  Itedris,
  Gastronomia,
}

// ─── Capabilities ────────────────────────────────────────────────────────────

/// Something an authenticated person may do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
  ManagePersons,
  RegisterAccess,
  ViewAllAccess,
  ViewOwnAccess,
  SubmitOwnEquipment,
  SubmitEquipmentForOthers,
  ReviewEquipment,
  ViewAllEquipment,
  WorkShifts,
  ViewAllShifts,
  ForceEndShift,
}

impl Role {
  pub fn capabilities(self) -> &'static [Capability] {
    use Capability::*;
    match self {
      Self::Admin => &[
        ManagePersons,
        RegisterAccess,
        ViewAllAccess,
        SubmitEquipmentForOthers,
        ReviewEquipment,
        ViewAllEquipment,
        ViewAllShifts,
        ForceEndShift,
      ],
      Self::Guard => &[RegisterAccess, ViewAllAccess, WorkShifts],
      Self::Trainee => &[ViewOwnAccess, SubmitOwnEquipment],
    }
  }

  pub fn can(self, capability: Capability) -> bool {
    self.capabilities().contains(&capability)
  }
}

// ─── Person ──────────────────────────────────────────────────────────────────

/// A person known to the facility. Never hard-deleted; `status` is the only
/// way to take someone out of circulation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
  pub person_id:        Uuid,
  pub username:         String,
  pub email:            Option<String>,
  pub first_name:       String,
  pub last_name:        String,
  pub role:             Role,
  pub status:           PersonStatus,
  pub home_site:        Option<Site>,
  pub training_program: Option<String>,
  /// Badge / QR value. Globally unique when present.
  pub document:         Option<String>,
  pub created_at:       DateTime<Utc>,
}

impl Person {
  pub fn can(&self, capability: Capability) -> bool { self.role.can(capability) }

  /// `Forbidden` unless the person's role grants `capability`.
  pub fn require(&self, capability: Capability) -> Result<()> {
    if self.can(capability) {
      Ok(())
    } else {
      Err(Rejection::Forbidden)
    }
  }

  pub fn is_blocked(&self) -> bool { self.status == PersonStatus::Blocked }
}

// ─── Inputs ──────────────────────────────────────────────────────────────────

/// Input to [`crate::store::AccessStore::create_person`].
///
/// `password_hash` is an argon2 PHC string; hashing happens before the store
/// is called.
#[derive(Debug, Clone)]
pub struct NewPerson {
  pub username:         String,
  pub email:            Option<String>,
  pub first_name:       String,
  pub last_name:        String,
  pub role:             Role,
  pub status:           PersonStatus,
  pub home_site:        Option<Site>,
  pub training_program: Option<String>,
  pub document:         Option<String>,
  pub password_hash:    String,
}

impl NewPerson {
  pub fn new(username: impl Into<String>, role: Role, password_hash: impl Into<String>) -> Self {
    Self {
      username: username.into(),
      email: None,
      first_name: String::new(),
      last_name: String::new(),
      role,
      status: PersonStatus::default(),
      home_site: None,
      training_program: None,
      document: None,
      password_hash: password_hash.into(),
    }
  }

  /// Trim free-text identifiers and reject blank usernames.
  pub fn normalize(mut self) -> Result<Self> {
    self.username = self.username.trim().to_owned();
    if self.username.is_empty() {
      return Err(Rejection::invalid_field("username", "must not be blank"));
    }
    self.email = normalize_optional(self.email);
    self.document = normalize_optional(self.document);
    if let Some(email) = &self.email
      && !email.contains('@')
    {
      return Err(Rejection::invalid_field("email", "is not a valid address"));
    }
    Ok(self)
  }
}

/// Admin patch. `None` leaves a field untouched; the inner `Option` of a
/// nullable field distinguishes "clear" from "set".
#[derive(Debug, Clone, Default)]
pub struct PersonPatch {
  pub email:            Option<Option<String>>,
  pub first_name:       Option<String>,
  pub last_name:        Option<String>,
  pub role:             Option<Role>,
  pub status:           Option<PersonStatus>,
  pub home_site:        Option<Option<Site>>,
  pub training_program: Option<Option<String>>,
  pub document:         Option<Option<String>>,
  pub password_hash:    Option<String>,
}

impl PersonPatch {
  pub fn apply(self, person: &mut Person) -> Result<()> {
    if let Some(email) = self.email {
      let email = normalize_optional(email);
      if let Some(address) = &email
        && !address.contains('@')
      {
        return Err(Rejection::invalid_field("email", "is not a valid address"));
      }
      person.email = email;
    }
    if let Some(first_name) = self.first_name {
      person.first_name = first_name;
    }
    if let Some(last_name) = self.last_name {
      person.last_name = last_name;
    }
    if let Some(role) = self.role {
      person.role = role;
    }
    if let Some(status) = self.status {
      person.status = status;
    }
    if let Some(site) = self.home_site {
      person.home_site = site;
    }
    if let Some(program) = self.training_program {
      person.training_program = program;
    }
    if let Some(document) = self.document {
      person.document = normalize_optional(document);
    }
    Ok(())
  }
}

/// Password used when an admin provisions an account without one: the last
/// four characters of the document, or `1234` when there is no usable
/// document.
pub fn default_password(document: Option<&str>) -> String {
  let doc = document.map(str::trim).unwrap_or_default();
  let chars: Vec<char> = doc.chars().collect();
  if chars.len() >= 4 {
    chars[chars.len() - 4..].iter().collect()
  } else {
    "1234".to_owned()
  }
}

pub const MIN_PASSWORD_LEN: usize = 4;

pub fn check_password(password: &str) -> Result<()> {
  if password.chars().count() < MIN_PASSWORD_LEN {
    return Err(Rejection::invalid_field(
      "password",
      format!("must be at least {MIN_PASSWORD_LEN} characters"),
    ));
  }
  Ok(())
}

fn normalize_optional(value: Option<String>) -> Option<String> {
  value
    .map(|v| v.trim().to_owned())
    .filter(|v| !v.is_empty())
}
