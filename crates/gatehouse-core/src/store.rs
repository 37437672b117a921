//! The `AccessStore` trait and supporting query types.
//!
//! The trait is implemented by storage backends (e.g.
//! `gatehouse-store-sqlite`). Higher layers depend on this abstraction, not on
//! any concrete backend.
//!
//! Every multi-step operation (registration, shift start, review, OTP checks)
//! must be atomic in the implementation: the reads that feed a decision and
//! the write that follows happen in one transaction, and a rejection leaves
//! nothing behind.

use std::future::Future;

use chrono::NaiveDate;
use uuid::Uuid;

use crate::{
  Rejection,
  access::{AccessEvent, Direction, DocumentCheck, RegisterAccess},
  equipment::{Equipment, NewEquipment, Review, ReviewState},
  notify::{Audience, NewNotification, Notification},
  otp::PasswordResetChallenge,
  person::{NewPerson, Person, PersonPatch, PersonStatus, Role, Site},
  shift::{Period, Shift, ShiftAudit, ShiftSummary},
};

/// Default page size for list queries.
pub const DEFAULT_LIMIT: usize = 100;

// ─── Query types ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct PersonFilter {
  /// Case-insensitive match over username, email, document and names.
  pub text:   Option<String>,
  pub role:   Option<Role>,
  pub status: Option<PersonStatus>,
  pub site:   Option<Site>,
  pub limit:  Option<usize>,
  pub offset: Option<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct EquipmentFilter {
  pub owner_id: Option<Uuid>,
  pub state:    Option<ReviewState>,
  /// Case-insensitive match over serial, brand, model and the owner's
  /// username and document.
  pub text:     Option<String>,
  pub limit:    Option<usize>,
  pub offset:   Option<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct ShiftFilter {
  pub guard_id: Option<Uuid>,
  pub site:     Option<Site>,
  pub period:   Option<Period>,
  pub active:   Option<bool>,
  pub limit:    Option<usize>,
  pub offset:   Option<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct AccessFilter {
  pub subject_id:    Option<Uuid>,
  pub registered_by: Option<Uuid>,
  pub shift_id:      Option<Uuid>,
  pub direction:     Option<Direction>,
  pub site:          Option<Site>,
  /// Inclusive, on the UTC date of `recorded_at`.
  pub from:          Option<NaiveDate>,
  /// Inclusive, on the UTC date of `recorded_at`.
  pub to:            Option<NaiveDate>,
  /// Case-insensitive match over the subject's username and document.
  pub text:          Option<String>,
  pub limit:         Option<usize>,
  pub offset:        Option<usize>,
}

// ─── Errors ──────────────────────────────────────────────────────────────────

/// Backend errors carry either a business [`Rejection`] or an
/// infrastructure fault. Callers split the two with
/// [`StoreError::into_rejection`].
pub trait StoreError: std::error::Error + Send + Sync + Sized + 'static {
  fn into_rejection(self) -> Result<Rejection, Self>;
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a Gatehouse store backend.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait AccessStore: Send + Sync {
  type Error: StoreError;

  // ── Identity ──────────────────────────────────────────────────────────

  /// Persist a new person. Duplicate username, email or document is a
  /// validation rejection.
  fn create_person(
    &self,
    input: NewPerson,
  ) -> impl Future<Output = Result<Person, Self::Error>> + Send + '_;

  fn get_person(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Person>, Self::Error>> + Send + '_;

  fn find_by_document(
    &self,
    document: String,
  ) -> impl Future<Output = Result<Option<Person>, Self::Error>> + Send + '_;

  fn find_by_email(
    &self,
    email: String,
  ) -> impl Future<Output = Result<Option<Person>, Self::Error>> + Send + '_;

  /// The person with `username` and their argon2 PHC password hash.
  fn find_login(
    &self,
    username: String,
  ) -> impl Future<Output = Result<Option<(Person, String)>, Self::Error>> + Send + '_;

  fn list_persons<'a>(
    &'a self,
    filter: &'a PersonFilter,
  ) -> impl Future<Output = Result<Vec<Person>, Self::Error>> + Send + 'a;

  fn update_person(
    &self,
    id: Uuid,
    patch: PersonPatch,
  ) -> impl Future<Output = Result<Person, Self::Error>> + Send + '_;

  // ── Equipment ─────────────────────────────────────────────────────────

  /// Submit equipment. Trainee submissions start `pending`; admin
  /// submissions on behalf of a trainee are approved immediately.
  fn submit_equipment(
    &self,
    submitter_id: Uuid,
    input: NewEquipment,
  ) -> impl Future<Output = Result<Equipment, Self::Error>> + Send + '_;

  fn get_equipment(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Equipment>, Self::Error>> + Send + '_;

  fn list_equipment<'a>(
    &'a self,
    filter: &'a EquipmentFilter,
  ) -> impl Future<Output = Result<Vec<Equipment>, Self::Error>> + Send + 'a;

  /// Approve or reject; sets reviewer and review time with the state.
  fn review_equipment(
    &self,
    reviewer_id: Uuid,
    equipment_id: Uuid,
    review: Review,
  ) -> impl Future<Output = Result<Equipment, Self::Error>> + Send + '_;

  // ── Shifts ────────────────────────────────────────────────────────────

  /// Open a shift; `AlreadyActive` if the guard has one open.
  fn start_shift(
    &self,
    guard_id: Uuid,
    site: Site,
    period: Period,
  ) -> impl Future<Output = Result<Shift, Self::Error>> + Send + '_;

  /// Close the guard's open shift; `NoActiveShift` if there is none.
  fn end_shift(
    &self,
    guard_id: Uuid,
  ) -> impl Future<Output = Result<Shift, Self::Error>> + Send + '_;

  /// Close any shift by id; `AlreadyClosed` if it was not open.
  fn force_end_shift(
    &self,
    shift_id: Uuid,
  ) -> impl Future<Output = Result<Shift, Self::Error>> + Send + '_;

  fn active_shift(
    &self,
    guard_id: Uuid,
  ) -> impl Future<Output = Result<Option<Shift>, Self::Error>> + Send + '_;

  fn get_shift(
    &self,
    shift_id: Uuid,
  ) -> impl Future<Output = Result<Option<Shift>, Self::Error>> + Send + '_;

  fn list_shifts<'a>(
    &'a self,
    filter: &'a ShiftFilter,
  ) -> impl Future<Output = Result<Vec<Shift>, Self::Error>> + Send + 'a;

  fn shift_summary(
    &self,
    shift_id: Uuid,
  ) -> impl Future<Output = Result<ShiftSummary, Self::Error>> + Send + '_;

  /// Find shifts violating the open/closed invariant; repair them if
  /// `apply`.
  fn audit_shifts(
    &self,
    apply: bool,
  ) -> impl Future<Output = Result<ShiftAudit, Self::Error>> + Send + '_;

  // ── Access ledger ─────────────────────────────────────────────────────

  /// Run the registration state machine and commit the event atomically.
  fn register_access(
    &self,
    request: RegisterAccess,
  ) -> impl Future<Output = Result<AccessEvent, Self::Error>> + Send + '_;

  /// Read-only preflight for a badge scan.
  fn check_document(
    &self,
    actor_id: Uuid,
    document: String,
  ) -> impl Future<Output = Result<DocumentCheck, Self::Error>> + Send + '_;

  /// The subject's latest event (timestamp, then insertion order).
  fn last_event(
    &self,
    subject_id: Uuid,
  ) -> impl Future<Output = Result<Option<AccessEvent>, Self::Error>> + Send + '_;

  /// Newest first.
  fn list_access_events<'a>(
    &'a self,
    filter: &'a AccessFilter,
  ) -> impl Future<Output = Result<Vec<AccessEvent>, Self::Error>> + Send + 'a;

  // ── Password reset ────────────────────────────────────────────────────

  /// Issue a new challenge; returns it with the plaintext code.
  fn create_reset_challenge(
    &self,
    person_id: Uuid,
  ) -> impl Future<Output = Result<(PasswordResetChallenge, String), Self::Error>> + Send + '_;

  /// Check a code without consuming the challenge. A wrong code is counted
  /// before `InvalidCode` is returned.
  fn verify_reset_code(
    &self,
    person_id: Uuid,
    code: String,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Check a code and, on success, replace the password hash and mark the
  /// challenge used in the same transaction.
  fn confirm_password_reset(
    &self,
    person_id: Uuid,
    code: String,
    new_password_hash: String,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Notifications ─────────────────────────────────────────────────────

  /// Fan a notification out to its audience; returns the recipient count.
  fn notify(
    &self,
    audience: Audience,
    note: NewNotification,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  /// Newest first.
  fn list_notifications(
    &self,
    recipient_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Notification>, Self::Error>> + Send + '_;

  fn mark_notification_read(
    &self,
    recipient_id: Uuid,
    notification_id: Uuid,
  ) -> impl Future<Output = Result<Notification, Self::Error>> + Send + '_;
}
