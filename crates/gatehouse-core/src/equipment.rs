//! Equipment registered by trainees and its review workflow.
//!
//! `pending → {approved, rejected}`, with re-review allowed in any direction.
//! Reviewer and review timestamp are always written together with the state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use crate::{
  Rejection, Result,
  person::{Person, Role},
};

#[derive(
  Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, AsRefStr, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ReviewState {
  #[default]
  Pending,
  Approved,
  Rejected,
}

/// The outcome an admin may choose when reviewing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewOutcome {
  Approved,
  Rejected,
}

impl From<ReviewOutcome> for ReviewState {
  fn from(o: ReviewOutcome) -> Self {
    match o {
      ReviewOutcome::Approved => Self::Approved,
      ReviewOutcome::Rejected => Self::Rejected,
    }
  }
}

/// Why an equipment item cannot accompany an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum EquipmentProblem {
  #[strum(to_string = "does not exist")]
  Unknown,
  #[strum(to_string = "does not belong to the trainee")]
  NotOwned,
  #[strum(to_string = "is not approved")]
  NotApproved,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Equipment {
  pub equipment_id:     Uuid,
  pub owner_id:         Uuid,
  pub serial:           String,
  pub brand:            String,
  pub model:            String,
  pub state:            ReviewState,
  pub rejection_reason: Option<String>,
  pub reviewed_by:      Option<Uuid>,
  pub reviewed_at:      Option<DateTime<Utc>>,
  pub created_at:       DateTime<Utc>,
}

impl Equipment {
  pub fn is_approved(&self) -> bool { self.state == ReviewState::Approved }

  /// Apply a review decision in place.
  pub fn review(&mut self, review: &Review, reviewer: Uuid, at: DateTime<Utc>) {
    self.state = review.outcome.into();
    self.rejection_reason = match review.outcome {
      ReviewOutcome::Approved => None,
      ReviewOutcome::Rejected => review.reason.clone(),
    };
    self.reviewed_by = Some(reviewer);
    self.reviewed_at = Some(at);
  }
}

// ─── Inputs ──────────────────────────────────────────────────────────────────

/// Input to [`crate::store::AccessStore::submit_equipment`].
#[derive(Debug, Clone)]
pub struct NewEquipment {
  /// Required when an admin submits on behalf of a trainee; ignored for
  /// trainees, who always own what they submit.
  pub owner_id: Option<Uuid>,
  pub serial:   String,
  pub brand:    String,
  pub model:    String,
}

impl NewEquipment {
  /// Resolve the owner for a submission made by `submitter`, trimming the
  /// free-text fields.
  pub fn resolve_owner(mut self, submitter: &Person) -> Result<(Uuid, Self)> {
    self.serial = self.serial.trim().to_owned();
    if self.serial.is_empty() {
      return Err(Rejection::invalid_field("serial", "must not be blank"));
    }
    self.brand = self.brand.trim().to_owned();
    self.model = self.model.trim().to_owned();

    let owner = match submitter.role {
      Role::Trainee => submitter.person_id,
      Role::Admin => self.owner_id.ok_or_else(|| {
        Rejection::invalid_field("owner_id", "admins must name the trainee who owns the equipment")
      })?,
      Role::Guard => return Err(Rejection::Forbidden),
    };
    Ok((owner, self))
  }
}

/// A review decision. Validated with [`Review::validate`] before use.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Review {
  pub outcome: ReviewOutcome,
  pub reason:  Option<String>,
}

impl Review {
  /// A rejection must carry a non-blank reason.
  pub fn validate(mut self) -> Result<Self> {
    self.reason = self
      .reason
      .map(|r| r.trim().to_owned())
      .filter(|r| !r.is_empty());
    if self.outcome == ReviewOutcome::Rejected && self.reason.is_none() {
      return Err(Rejection::invalid_field("reason", "a rejection requires a reason"));
    }
    Ok(self)
  }
}
