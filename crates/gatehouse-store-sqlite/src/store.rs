//! [`SqliteStore`]: the SQLite implementation of [`AccessStore`].

use std::{collections::BTreeSet, path::Path, sync::Arc, time::Duration};

use gatehouse_core::{
  Rejection,
  access::{
    self, AccessEvent, AccessStatus, Direction, DocumentCheck, EquipmentCheck, RegisterAccess,
    Snapshot, SubjectRef,
  },
  clock::{Clock, SystemClock},
  equipment::{Equipment, NewEquipment, Review, ReviewState},
  notify::{Audience, NewNotification, Notification},
  otp::{self, CodeCheck, PasswordResetChallenge},
  person::{Capability, NewPerson, Person, PersonPatch, Role, Site},
  shift::{self, Period, Shift, ShiftAudit, ShiftSummary},
  store::{AccessFilter, AccessStore, EquipmentFilter, PersonFilter, ShiftFilter},
};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use uuid::Uuid;

use crate::{
  Error, Result, challenges, equipment, ledger, notifications, persons, schema::SCHEMA, shifts,
};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Gatehouse store backed by a single SQLite file.
///
/// Cloning is cheap; the connection and clock are reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn:  tokio_rusqlite::Connection,
  clock: Arc<dyn Clock>,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    Self::init(conn).await
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    Self::init(conn).await
  }

  /// Replace the time source. Every timestamp the store assigns comes from
  /// it.
  pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
    self.clock = clock;
    self
  }

  async fn init(conn: tokio_rusqlite::Connection) -> Result<Self> {
    conn
      .call(|conn| {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(Self { conn, clock: Arc::new(SystemClock) })
  }

  /// Run `f` on the connection thread without a transaction.
  pub(crate) async fn read<T, F>(&self, f: F) -> Result<T>
  where
    F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    T: Send + 'static,
  {
    Ok(
      self
        .conn
        .call(move |conn| f(conn).map_err(|e| tokio_rusqlite::Error::Other(Box::new(e))))
        .await?,
    )
  }

  /// Run `f` inside a `BEGIN IMMEDIATE` transaction. `Ok` commits; `Err`
  /// drops the transaction, rolling back everything `f` wrote.
  pub(crate) async fn transact<T, F>(&self, f: F) -> Result<T>
  where
    F: FnOnce(&Transaction<'_>) -> Result<T> + Send + 'static,
    T: Send + 'static,
  {
    Ok(
      self
        .conn
        .call(move |conn| {
          let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
          match f(&tx) {
            Ok(value) => {
              tx.commit()?;
              Ok(value)
            }
            Err(e) => Err(tokio_rusqlite::Error::Other(Box::new(e))),
          }
        })
        .await?,
    )
  }
}

/// Check `code` against the latest challenge. A mismatch is returned as an
/// inner `Err` so the caller can commit the attempt counter before reporting
/// it.
fn check_code(
  tx: &Transaction<'_>,
  person_id: Uuid,
  code: &str,
  now: chrono::DateTime<chrono::Utc>,
) -> Result<std::result::Result<PasswordResetChallenge, Rejection>> {
  otp::validate_code(code)?;
  let latest = challenges::latest_for(tx, person_id)?;
  let challenge = match otp::check(latest.as_ref(), code, now)? {
    CodeCheck::Accepted => latest.ok_or(Rejection::NoActiveChallenge)?,
    CodeCheck::Mismatch => {
      if let Some(challenge) = &latest {
        challenges::record_failed_attempt(tx, challenge.challenge_id)?;
      }
      return Ok(Err(Rejection::InvalidCode));
    }
  };
  Ok(Ok(challenge))
}

// ─── AccessStore impl ────────────────────────────────────────────────────────

impl AccessStore for SqliteStore {
  type Error = Error;

  // ── Identity ──────────────────────────────────────────────────────────────

  async fn create_person(&self, input: NewPerson) -> Result<Person> {
    let now = self.clock.now();
    let person = self
      .transact(move |tx| {
        let input = input.normalize()?;
        persons::check_unique(
          tx,
          Some(&input.username),
          input.email.as_deref(),
          input.document.as_deref(),
          None,
        )?;
        let person = Person {
          person_id:        Uuid::new_v4(),
          username:         input.username,
          email:            input.email,
          first_name:       input.first_name.trim().to_owned(),
          last_name:        input.last_name.trim().to_owned(),
          role:             input.role,
          status:           input.status,
          home_site:        input.home_site,
          training_program: input.training_program,
          document:         input.document,
          created_at:       now,
        };
        persons::insert(tx, &person, &input.password_hash)?;
        Ok(person)
      })
      .await?;

    tracing::info!(person_id = %person.person_id, role = %person.role, "person created");
    Ok(person)
  }

  async fn get_person(&self, id: Uuid) -> Result<Option<Person>> {
    self.read(move |conn| persons::by_id(conn, id)).await
  }

  async fn find_by_document(&self, document: String) -> Result<Option<Person>> {
    self.read(move |conn| persons::by_document(conn, &document)).await
  }

  async fn find_by_email(&self, email: String) -> Result<Option<Person>> {
    self.read(move |conn| persons::by_email(conn, &email)).await
  }

  async fn find_login(&self, username: String) -> Result<Option<(Person, String)>> {
    self.read(move |conn| persons::login(conn, &username)).await
  }

  async fn list_persons(&self, filter: &PersonFilter) -> Result<Vec<Person>> {
    let filter = filter.clone();
    self.read(move |conn| persons::list(conn, &filter)).await
  }

  async fn update_person(&self, id: Uuid, patch: PersonPatch) -> Result<Person> {
    self
      .transact(move |tx| {
        let mut person = persons::require(tx, id)?;
        let password_hash = patch.password_hash.clone();
        patch.apply(&mut person)?;
        persons::check_unique(
          tx,
          None,
          person.email.as_deref(),
          person.document.as_deref(),
          Some(id),
        )?;
        persons::update(tx, &person)?;
        if let Some(hash) = password_hash {
          persons::set_password(tx, id, &hash)?;
        }
        Ok(person)
      })
      .await
  }

  // ── Equipment ─────────────────────────────────────────────────────────────

  async fn submit_equipment(&self, submitter_id: Uuid, input: NewEquipment) -> Result<Equipment> {
    let now = self.clock.now();
    let eq = self
      .transact(move |tx| {
        let submitter = persons::require(tx, submitter_id)?;
        let (owner_id, input) = input.resolve_owner(&submitter)?;

        let owner = persons::by_id(tx, owner_id)?;
        if owner.is_none_or(|o| o.role != Role::Trainee) {
          return Err(Rejection::invalid_field("owner_id", "must be an existing trainee").into());
        }
        if equipment::serial_taken(tx, &input.serial)? {
          return Err(Rejection::invalid_field("serial", "is already registered").into());
        }

        let mut eq = Equipment {
          equipment_id:     Uuid::new_v4(),
          owner_id,
          serial:           input.serial,
          brand:            input.brand,
          model:            input.model,
          state:            ReviewState::Pending,
          rejection_reason: None,
          reviewed_by:      None,
          reviewed_at:      None,
          created_at:       now,
        };
        if submitter.can(Capability::ReviewEquipment) {
          eq.state = ReviewState::Approved;
          eq.reviewed_by = Some(submitter.person_id);
          eq.reviewed_at = Some(now);
        }
        equipment::insert(tx, &eq)?;
        Ok(eq)
      })
      .await?;

    tracing::info!(equipment_id = %eq.equipment_id, state = %eq.state, "equipment submitted");
    Ok(eq)
  }

  async fn get_equipment(&self, id: Uuid) -> Result<Option<Equipment>> {
    self.read(move |conn| equipment::by_id(conn, id)).await
  }

  async fn list_equipment(&self, filter: &EquipmentFilter) -> Result<Vec<Equipment>> {
    let filter = filter.clone();
    self.read(move |conn| equipment::list(conn, &filter)).await
  }

  async fn review_equipment(
    &self,
    reviewer_id: Uuid,
    equipment_id: Uuid,
    review: Review,
  ) -> Result<Equipment> {
    let now = self.clock.now();
    let eq = self
      .transact(move |tx| {
        let reviewer = persons::require(tx, reviewer_id)?;
        reviewer.require(Capability::ReviewEquipment)?;
        let review = review.validate()?;
        let mut eq = equipment::by_id(tx, equipment_id)?
          .ok_or_else(|| Rejection::not_found("equipment"))?;
        eq.review(&review, reviewer_id, now);
        equipment::save_review(tx, &eq)?;
        Ok(eq)
      })
      .await?;

    tracing::info!(equipment_id = %eq.equipment_id, state = %eq.state, "equipment reviewed");
    Ok(eq)
  }

  // ── Shifts ────────────────────────────────────────────────────────────────

  async fn start_shift(&self, guard_id: Uuid, site: Site, period: Period) -> Result<Shift> {
    let now = self.clock.now();
    let shift = self
      .transact(move |tx| {
        let guard = persons::require(tx, guard_id)?;
        guard.require(Capability::WorkShifts)?;
        if let Some(open) = shifts::active_for(tx, guard_id)? {
          return Err(Rejection::AlreadyActive(open.shift_id).into());
        }
        let shift = Shift {
          shift_id: Uuid::new_v4(),
          guard_id,
          site,
          period,
          started_at: now,
          ended_at: None,
          active: true,
        };
        shifts::insert(tx, &shift)?;
        Ok(shift)
      })
      .await?;

    tracing::info!(shift_id = %shift.shift_id, %guard_id, site = %site, "shift started");
    Ok(shift)
  }

  async fn end_shift(&self, guard_id: Uuid) -> Result<Shift> {
    let now = self.clock.now();
    self
      .transact(move |tx| {
        let mut shift = shifts::active_for(tx, guard_id)?.ok_or(Rejection::NoActiveShift)?;
        shift.close(now);
        shifts::save_state(tx, &shift)?;
        Ok(shift)
      })
      .await
  }

  async fn force_end_shift(&self, shift_id: Uuid) -> Result<Shift> {
    let now = self.clock.now();
    let shift = self
      .transact(move |tx| {
        let mut shift =
          shifts::by_id(tx, shift_id)?.ok_or_else(|| Rejection::not_found("shift"))?;
        if !shift.is_open() {
          return Err(Rejection::AlreadyClosed(shift_id).into());
        }
        shift.close(now);
        shifts::save_state(tx, &shift)?;
        Ok(shift)
      })
      .await?;

    tracing::warn!(%shift_id, guard_id = %shift.guard_id, "shift force-ended");
    Ok(shift)
  }

  async fn active_shift(&self, guard_id: Uuid) -> Result<Option<Shift>> {
    self.read(move |conn| shifts::active_for(conn, guard_id)).await
  }

  async fn get_shift(&self, shift_id: Uuid) -> Result<Option<Shift>> {
    self.read(move |conn| shifts::by_id(conn, shift_id)).await
  }

  async fn list_shifts(&self, filter: &ShiftFilter) -> Result<Vec<Shift>> {
    let filter = filter.clone();
    self.read(move |conn| shifts::list(conn, &filter)).await
  }

  async fn shift_summary(&self, shift_id: Uuid) -> Result<ShiftSummary> {
    self
      .read(move |conn| {
        shifts::by_id(conn, shift_id)?.ok_or_else(|| Rejection::not_found("shift"))?;
        shifts::summary(conn, shift_id)
      })
      .await
  }

  async fn audit_shifts(&self, apply: bool) -> Result<ShiftAudit> {
    let now = self.clock.now();
    let audit = self
      .transact(move |tx| {
        let mut audit = ShiftAudit::default();
        for s in shifts::all(tx)? {
          audit.total += 1;
          let (defects, repaired) = shift::inspect(&s, now);
          if defects.is_empty() {
            continue;
          }
          tracing::warn!(shift_id = %s.shift_id, ?defects, "inconsistent shift");
          audit.inconsistent += 1;
          if apply && let Some(fixed) = repaired {
            shifts::save_state(tx, &fixed)?;
            audit.repaired += 1;
          }
        }
        Ok(audit)
      })
      .await?;

    tracing::info!(
      total = audit.total,
      inconsistent = audit.inconsistent,
      repaired = audit.repaired,
      "shift audit finished"
    );
    Ok(audit)
  }

  // ── Access ledger ─────────────────────────────────────────────────────────

  async fn register_access(&self, request: RegisterAccess) -> Result<AccessEvent> {
    let clock = self.clock.clone();
    let event = self
      .transact(move |tx| {
        let actor = persons::require(tx, request.actor_id)?;
        let actor_shift = shifts::active_for(tx, actor.person_id)?;
        access::authorize(&actor, actor_shift.as_ref())?;

        let subject = match &request.subject {
          SubjectRef::Id(id) => persons::by_id(tx, *id)?,
          SubjectRef::Document(document) => persons::by_document(tx, document)?,
        }
        .ok_or_else(|| Rejection::not_found("trainee"))?;

        let last_event = ledger::latest_for_subject(tx, subject.person_id)?;
        let requested: BTreeSet<Uuid> = request.equipment_ids.iter().copied().collect();
        let checks = match request.direction {
          Direction::Entry => requested
            .iter()
            .map(|&equipment_id| {
              Ok::<_, Error>(EquipmentCheck {
                equipment_id,
                equipment: equipment::by_id(tx, equipment_id)?,
                last_direction: ledger::equipment_last_direction(tx, equipment_id)?,
              })
            })
            .collect::<Result<Vec<_>>>()?,
          Direction::Exit => Vec::new(),
        };

        let plan = access::decide(&Snapshot {
          actor:       &actor,
          actor_shift: actor_shift.as_ref(),
          subject:     &subject,
          last_event:  last_event.as_ref(),
          direction:   request.direction,
          requested:   &requested,
          equipment:   &checks,
        })?;

        // Never stamp an event earlier than the one it follows.
        let now = clock.now();
        let now = last_event.as_ref().map_or(now, |last| now.max(last.recorded_at));
        let event = plan.into_event(subject.person_id, actor.person_id, now);
        ledger::insert(tx, &event, actor_shift.as_ref().map(|s| s.shift_id))?;
        Ok(event)
      })
      .await?;

    tracing::info!(
      event_id = %event.event_id,
      subject_id = %event.subject_id,
      direction = %event.direction,
      registered_by = ?event.registered_by,
      equipment = event.equipment_ids.len(),
      "access registered"
    );
    Ok(event)
  }

  async fn check_document(&self, actor_id: Uuid, document: String) -> Result<DocumentCheck> {
    self
      .read(move |conn| {
        let actor = persons::require(conn, actor_id)?;
        let shift = shifts::active_for(conn, actor_id)?;
        access::authorize(&actor, shift.as_ref())?;

        let subject = persons::by_document(conn, &document)?
          .ok_or_else(|| Rejection::not_found("trainee"))?;
        access::check_subject(&subject)?;

        let last = ledger::latest_for_subject(conn, subject.person_id)?;
        let approved_equipment = equipment::approved_for(conn, subject.person_id)?;
        let checked_in_equipment = last
          .as_ref()
          .filter(|e| e.direction == Direction::Entry)
          .map(|e| e.equipment_ids.clone())
          .unwrap_or_default();

        Ok(DocumentCheck {
          status: AccessStatus::from_last(last.as_ref()),
          next_direction: access::next_direction(last.as_ref()),
          subject,
          approved_equipment,
          shift,
          checked_in_equipment,
        })
      })
      .await
  }

  async fn last_event(&self, subject_id: Uuid) -> Result<Option<AccessEvent>> {
    self.read(move |conn| ledger::latest_for_subject(conn, subject_id)).await
  }

  async fn list_access_events(&self, filter: &AccessFilter) -> Result<Vec<AccessEvent>> {
    let filter = filter.clone();
    self.read(move |conn| ledger::list(conn, &filter)).await
  }

  // ── Password reset ────────────────────────────────────────────────────────

  async fn create_reset_challenge(
    &self,
    person_id: Uuid,
  ) -> Result<(PasswordResetChallenge, String)> {
    let now = self.clock.now();
    self
      .transact(move |tx| {
        persons::require(tx, person_id)?;
        let (challenge, code) = PasswordResetChallenge::issue(person_id, now);
        challenges::insert(tx, &challenge)?;
        Ok((challenge, code))
      })
      .await
  }

  async fn verify_reset_code(&self, person_id: Uuid, code: String) -> Result<()> {
    let now = self.clock.now();
    self
      .transact(move |tx| check_code(tx, person_id, &code, now))
      .await??;
    Ok(())
  }

  async fn confirm_password_reset(
    &self,
    person_id: Uuid,
    code: String,
    new_password_hash: String,
  ) -> Result<()> {
    let now = self.clock.now();
    self
      .transact(move |tx| {
        let challenge = match check_code(tx, person_id, &code, now)? {
          Ok(challenge) => challenge,
          Err(rejection) => return Ok(Err(rejection)),
        };
        persons::set_password(tx, person_id, &new_password_hash)?;
        challenges::mark_used(tx, challenge.challenge_id, now)?;
        Ok(Ok(()))
      })
      .await??;

    tracing::info!(%person_id, "password reset");
    Ok(())
  }

  // ── Notifications ─────────────────────────────────────────────────────────

  async fn notify(&self, audience: Audience, note: NewNotification) -> Result<usize> {
    let now = self.clock.now();
    self
      .transact(move |tx| {
        let recipients = match audience {
          Audience::Person(id) => vec![persons::require(tx, id)?.person_id],
          Audience::Role(role) => persons::ids_with_role(tx, role)?,
          Audience::Broadcast => persons::all_ids(tx)?,
        };
        notifications::fan_out(tx, &recipients, &note, now)
      })
      .await
  }

  async fn list_notifications(&self, recipient_id: Uuid) -> Result<Vec<Notification>> {
    self.read(move |conn| notifications::list_for(conn, recipient_id)).await
  }

  async fn mark_notification_read(
    &self,
    recipient_id: Uuid,
    notification_id: Uuid,
  ) -> Result<Notification> {
    let now = self.clock.now();
    self
      .transact(move |tx| {
        let mut note = notifications::owned_by(tx, recipient_id, notification_id)?
          .ok_or_else(|| Rejection::not_found("notification"))?;
        if note.read_at.is_none() {
          notifications::mark_read(tx, notification_id, now)?;
          note.read_at = Some(now);
        }
        Ok(note)
      })
      .await
  }
}
