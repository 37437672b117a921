//! Access events and the registration state machine.
//!
//! Registration runs in stages, each a pure function over data the store has
//! already read inside the registration transaction:
//!
//! 1. [`authorize`]: actor capability and shift binding
//! 2. [`check_subject`]: subject role and status
//! 3. [`check_alternation`]: entry/exit must alternate per subject
//! 4. [`plan_entry`] or [`plan_exit`]: equipment rules and final binding
//!
//! [`decide`] runs all stages in order over a complete [`Snapshot`].

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use crate::{
  Rejection, Result,
  equipment::{Equipment, EquipmentProblem},
  person::{Capability, Person, PersonStatus, Role, Site},
  shift::Shift,
};

// ─── Event ───────────────────────────────────────────────────────────────────

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsRefStr, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Direction {
  Entry,
  Exit,
}

impl Direction {
  pub fn opposite(self) -> Self {
    match self {
      Self::Entry => Self::Exit,
      Self::Exit => Self::Entry,
    }
  }
}

/// An immutable entry or exit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessEvent {
  pub event_id:      Uuid,
  pub subject_id:    Uuid,
  pub direction:     Direction,
  /// Server-assigned; never changes after creation.
  pub recorded_at:   DateTime<Utc>,
  pub registered_by: Option<Uuid>,
  pub shift_id:      Option<Uuid>,
  pub site:          Option<Site>,
  /// Equipment accompanying the subject; fixed at creation.
  pub equipment_ids: BTreeSet<Uuid>,
}

// ─── Requests ────────────────────────────────────────────────────────────────

/// How the subject of a registration is identified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubjectRef {
  Id(Uuid),
  /// The badge / QR value.
  Document(String),
}

/// Input to [`crate::store::AccessStore::register_access`].
#[derive(Debug, Clone)]
pub struct RegisterAccess {
  pub actor_id:      Uuid,
  pub subject:       SubjectRef,
  pub direction:     Direction,
  /// Duplicates collapse; order is irrelevant.
  pub equipment_ids: Vec<Uuid>,
}

// ─── Decision inputs and output ──────────────────────────────────────────────

/// The shift and site an event is stamped with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Binding {
  pub shift_id: Option<Uuid>,
  pub site:     Option<Site>,
}

impl From<&Shift> for Binding {
  fn from(shift: &Shift) -> Self {
    Self { shift_id: Some(shift.shift_id), site: Some(shift.site) }
  }
}

/// What the ledger knows about one equipment item named on an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EquipmentCheck {
  pub equipment_id:   Uuid,
  /// `None` when no equipment has this id.
  pub equipment:      Option<Equipment>,
  /// Direction of the latest event (of any subject) carrying this item.
  pub last_direction: Option<Direction>,
}

/// Everything [`decide`] needs, read consistently with the write that follows.
#[derive(Debug, Clone, Copy)]
pub struct Snapshot<'a> {
  pub actor:       &'a Person,
  /// The actor's active shift, if any.
  pub actor_shift: Option<&'a Shift>,
  pub subject:     &'a Person,
  pub last_event:  Option<&'a AccessEvent>,
  pub direction:   Direction,
  pub requested:   &'a BTreeSet<Uuid>,
  pub equipment:   &'a [EquipmentCheck],
}

/// An accepted registration, ready to be committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessPlan {
  pub direction:     Direction,
  pub binding:       Binding,
  pub equipment_ids: BTreeSet<Uuid>,
}

impl AccessPlan {
  pub fn into_event(
    self,
    subject_id: Uuid,
    registered_by: Uuid,
    recorded_at: DateTime<Utc>,
  ) -> AccessEvent {
    AccessEvent {
      event_id: Uuid::new_v4(),
      subject_id,
      direction: self.direction,
      recorded_at,
      registered_by: Some(registered_by),
      shift_id: self.binding.shift_id,
      site: self.binding.site,
      equipment_ids: self.equipment_ids,
    }
  }
}

// ─── Stages ──────────────────────────────────────────────────────────────────

/// Stage 1: the actor must be allowed to register access. Guards must be on
/// an active shift, which then binds the event; admins register unbound.
pub fn authorize(actor: &Person, active_shift: Option<&Shift>) -> Result<Binding> {
  actor.require(Capability::RegisterAccess)?;
  match actor.role {
    Role::Guard => active_shift
      .filter(|s| s.is_open())
      .map(Binding::from)
      .ok_or(Rejection::NoActiveShift),
    _ => Ok(Binding::default()),
  }
}

/// Stage 2: only active trainees can be registered.
pub fn check_subject(subject: &Person) -> Result<()> {
  if subject.role != Role::Trainee {
    return Err(Rejection::InvalidSubjectRole);
  }
  if subject.status == PersonStatus::Blocked {
    return Err(Rejection::SubjectBlocked);
  }
  Ok(())
}

/// Stage 3: the requested direction must differ from the last one, and the
/// very first event must be an entry.
pub fn check_alternation(direction: Direction, last: Option<&AccessEvent>) -> Result<()> {
  match last {
    None if direction == Direction::Exit => Err(Rejection::ExitWithoutEntry),
    Some(prev) if prev.direction == direction => Err(Rejection::DuplicateDirection(direction)),
    _ => Ok(()),
  }
}

/// Stage 4, entry: every item must exist, belong to the subject, be approved,
/// and not already be checked in.
pub fn plan_entry(
  subject: &Person,
  requested: &BTreeSet<Uuid>,
  checks: &[EquipmentCheck],
  binding: Binding,
) -> Result<AccessPlan> {
  for &equipment_id in requested {
    let check = checks.iter().find(|c| c.equipment_id == equipment_id);
    let problem = match check.and_then(|c| c.equipment.as_ref()) {
      None => Some(EquipmentProblem::Unknown),
      Some(eq) if eq.owner_id != subject.person_id => Some(EquipmentProblem::NotOwned),
      Some(eq) if !eq.is_approved() => Some(EquipmentProblem::NotApproved),
      Some(_) => None,
    };
    if let Some(problem) = problem {
      return Err(Rejection::EquipmentInvalid { equipment_id, problem });
    }
  }

  for &equipment_id in requested {
    let open = checks
      .iter()
      .any(|c| c.equipment_id == equipment_id && c.last_direction == Some(Direction::Entry));
    if open {
      return Err(Rejection::EquipmentAlreadyCheckedIn(equipment_id));
    }
  }

  Ok(AccessPlan {
    direction: Direction::Entry,
    binding,
    equipment_ids: requested.clone(),
  })
}

/// Stage 4, exit: the last event must be an entry; the exit inherits its
/// shift and site, and carries exactly its equipment. An empty request is
/// filled in from the entry.
pub fn plan_exit(last: Option<&AccessEvent>, requested: &BTreeSet<Uuid>) -> Result<AccessPlan> {
  let entry = last
    .filter(|e| e.direction == Direction::Entry)
    .ok_or(Rejection::InvalidLastEvent)?;

  let equipment_ids = if requested.is_empty() {
    entry.equipment_ids.clone()
  } else if *requested == entry.equipment_ids {
    requested.clone()
  } else {
    return Err(Rejection::EquipmentMismatch);
  };

  Ok(AccessPlan {
    direction: Direction::Exit,
    binding: Binding { shift_id: entry.shift_id, site: entry.site },
    equipment_ids,
  })
}

/// Run every stage in order.
pub fn decide(snapshot: &Snapshot<'_>) -> Result<AccessPlan> {
  let binding = authorize(snapshot.actor, snapshot.actor_shift)?;
  check_subject(snapshot.subject)?;
  check_alternation(snapshot.direction, snapshot.last_event)?;
  match snapshot.direction {
    Direction::Entry => plan_entry(snapshot.subject, snapshot.requested, snapshot.equipment, binding),
    Direction::Exit => plan_exit(snapshot.last_event, snapshot.requested),
  }
}

// ─── Read models ─────────────────────────────────────────────────────────────

/// The direction the next event for a subject must have.
pub fn next_direction(last: Option<&AccessEvent>) -> Direction {
  match last {
    Some(e) => e.direction.opposite(),
    None => Direction::Entry,
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Presence {
  Inside,
  Outside,
  NoRecords,
}

/// Where a trainee currently is, according to their last event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessStatus {
  pub status:         Presence,
  pub last_direction: Option<Direction>,
  pub last_at:        Option<DateTime<Utc>>,
}

impl AccessStatus {
  pub fn from_last(last: Option<&AccessEvent>) -> Self {
    match last {
      None => Self { status: Presence::NoRecords, last_direction: None, last_at: None },
      Some(e) => Self {
        status:         match e.direction {
          Direction::Entry => Presence::Inside,
          Direction::Exit => Presence::Outside,
        },
        last_direction: Some(e.direction),
        last_at:        Some(e.recorded_at),
      },
    }
  }
}

/// Result of the validate-by-document preflight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentCheck {
  pub subject:              Person,
  pub approved_equipment:   Vec<Equipment>,
  pub shift:                Option<Shift>,
  pub status:               AccessStatus,
  pub next_direction:       Direction,
  /// Equipment carried in on the subject's open entry, if inside.
  pub checked_in_equipment: BTreeSet<Uuid>,
}
