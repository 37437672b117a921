//! The rejection taxonomy shared by every Gatehouse operation.
//!
//! A [`Rejection`] is a business-rule outcome, not a fault: it is returned as
//! a value, carried to the caller inside the response envelope, and never
//! leaves a partial write behind.

use std::collections::BTreeMap;

use thiserror::Error;
use uuid::Uuid;

use crate::{access::Direction, equipment::EquipmentProblem};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
  #[error("you do not have permission to perform this action")]
  Forbidden,

  #[error("you must start a shift before registering access")]
  NoActiveShift,

  #[error("access can only be registered for trainees")]
  InvalidSubjectRole,

  #[error("the trainee is blocked")]
  SubjectBlocked,

  #[error("exit without a prior entry")]
  ExitWithoutEntry,

  #[error("duplicate {0}: the last registered event has the same direction")]
  DuplicateDirection(Direction),

  #[error("invalid exit: the last registered event is not an entry")]
  InvalidLastEvent,

  #[error("equipment {equipment_id} {problem}")]
  EquipmentInvalid {
    equipment_id: Uuid,
    problem:      EquipmentProblem,
  },

  #[error("equipment {0} is already checked in")]
  EquipmentAlreadyCheckedIn(Uuid),

  #[error("the equipment on an exit must match the equipment of the last entry exactly")]
  EquipmentMismatch,

  #[error("you already have an active shift ({0})")]
  AlreadyActive(Uuid),

  #[error("shift {0} was already closed")]
  AlreadyClosed(Uuid),

  #[error("there is no active password-reset code")]
  NoActiveChallenge,

  #[error("the password-reset code has expired")]
  Expired,

  #[error("too many attempts; request a new code")]
  TooManyAttempts,

  #[error("the code is not valid")]
  InvalidCode,

  #[error("{0} not found")]
  NotFound(String),

  #[error("{message}")]
  Validation {
    message: String,
    fields:  BTreeMap<String, String>,
  },
}

impl Rejection {
  /// Stable snake_case identifier sent to clients alongside the reason.
  pub fn code(&self) -> &'static str {
    match self {
      Self::Forbidden => "forbidden",
      Self::NoActiveShift => "no_active_shift",
      Self::InvalidSubjectRole => "invalid_subject_role",
      Self::SubjectBlocked => "subject_blocked",
      Self::ExitWithoutEntry => "exit_without_entry",
      Self::DuplicateDirection(_) => "duplicate_direction",
      Self::InvalidLastEvent => "invalid_last_event",
      Self::EquipmentInvalid { .. } => "equipment_invalid",
      Self::EquipmentAlreadyCheckedIn(_) => "equipment_already_checked_in",
      Self::EquipmentMismatch => "equipment_mismatch",
      Self::AlreadyActive(_) => "already_active",
      Self::AlreadyClosed(_) => "already_closed",
      Self::NoActiveChallenge => "no_active_challenge",
      Self::Expired => "expired",
      Self::TooManyAttempts => "too_many_attempts",
      Self::InvalidCode => "invalid_code",
      Self::NotFound(_) => "not_found",
      Self::Validation { .. } => "validation_error",
    }
  }

  /// A validation rejection pointing at a single input field.
  pub fn invalid_field(field: &str, message: impl Into<String>) -> Self {
    let message = message.into();
    Self::Validation {
      fields:  BTreeMap::from([(field.to_owned(), message.clone())]),
      message: format!("invalid data: {message}"),
    }
  }

  pub fn not_found(what: impl std::fmt::Display) -> Self {
    Self::NotFound(what.to_string())
  }
}

pub type Result<T, E = Rejection> = std::result::Result<T, E>;
