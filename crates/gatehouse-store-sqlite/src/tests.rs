//! Integration tests for `SqliteStore` against an in-memory database.

use std::{
  collections::BTreeSet,
  sync::{Arc, Mutex},
};

use chrono::{DateTime, Duration, TimeZone, Utc};
use gatehouse_core::{
  Rejection,
  access::{AccessEvent, Direction, Presence, RegisterAccess, SubjectRef},
  clock::Clock,
  equipment::{EquipmentProblem, NewEquipment, Review, ReviewOutcome, ReviewState},
  notify::{Audience, NewNotification, Severity},
  person::{NewPerson, Person, PersonPatch, PersonStatus, Role, Site},
  shift::Period,
  store::{AccessFilter, AccessStore, EquipmentFilter, PersonFilter, ShiftFilter, StoreError},
};
use uuid::Uuid;

use crate::{Error, SqliteStore, ledger};

// ─── Fixtures ────────────────────────────────────────────────────────────────

/// A clock that only moves when told to.
struct ManualClock(Mutex<DateTime<Utc>>);

impl ManualClock {
  fn new() -> Arc<Self> {
    Arc::new(Self(Mutex::new(Utc.with_ymd_and_hms(2024, 5, 6, 8, 0, 0).unwrap())))
  }

  fn advance(&self, by: Duration) { *self.0.lock().unwrap() += by; }
}

impl Clock for ManualClock {
  fn now(&self) -> DateTime<Utc> { *self.0.lock().unwrap() }
}

struct Fixture {
  store:   SqliteStore,
  clock:   Arc<ManualClock>,
  admin:   Person,
  guard:   Person,
  trainee: Person,
}

async fn person(store: &SqliteStore, username: &str, role: Role, document: &str) -> Person {
  let mut input = NewPerson::new(username, role, format!("hash-of-{username}"));
  input.email = Some(format!("{username}@example.com"));
  input.document = Some(document.to_owned());
  store.create_person(input).await.unwrap()
}

async fn fixture() -> Fixture {
  let clock = ManualClock::new();
  let store = SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
    .with_clock(clock.clone());
  let admin = person(&store, "admin", Role::Admin, "A-1").await;
  let guard = person(&store, "guard", Role::Guard, "G-1").await;
  let trainee = person(&store, "ana", Role::Trainee, "1001").await;
  Fixture { store, clock, admin, guard, trainee }
}

fn rejection(err: Error) -> Rejection {
  err.into_rejection().expect("expected a business rejection")
}

async fn approved_equipment(f: &Fixture, owner: &Person, serial: &str) -> Uuid {
  let input = NewEquipment {
    owner_id: Some(owner.person_id),
    serial:   serial.into(),
    brand:    "Lenovo".into(),
    model:    "T14".into(),
  };
  f.store
    .submit_equipment(f.admin.person_id, input)
    .await
    .unwrap()
    .equipment_id
}

fn register(actor: &Person, subject: &Person, direction: Direction, eq: &[Uuid]) -> RegisterAccess {
  RegisterAccess {
    actor_id: actor.person_id,
    subject: SubjectRef::Id(subject.person_id),
    direction,
    equipment_ids: eq.to_vec(),
  }
}

async fn events_for(store: &SqliteStore, subject: &Person) -> Vec<AccessEvent> {
  let filter = AccessFilter { subject_id: Some(subject.person_id), ..Default::default() };
  store.list_access_events(&filter).await.unwrap()
}

// ─── Identity ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn create_and_look_up_person() {
  let f = fixture().await;

  let by_doc = f.store.find_by_document(" 1001 ".into()).await.unwrap().unwrap();
  assert_eq!(by_doc.person_id, f.trainee.person_id);

  let by_email = f.store.find_by_email("ANA@example.com".into()).await.unwrap().unwrap();
  assert_eq!(by_email.person_id, f.trainee.person_id);

  let (login, hash) = f.store.find_login("ana".into()).await.unwrap().unwrap();
  assert_eq!(login, f.trainee);
  assert_eq!(hash, "hash-of-ana");

  assert!(f.store.get_person(Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
async fn duplicate_identifiers_are_reported_per_field() {
  let f = fixture().await;
  let mut input = NewPerson::new("ana", Role::Trainee, "h");
  input.document = Some("1001".into());
  input.email = Some("someone@example.com".into());

  match rejection(f.store.create_person(input).await.unwrap_err()) {
    Rejection::Validation { fields, .. } => {
      assert!(fields.contains_key("username"));
      assert!(fields.contains_key("document"));
      assert!(!fields.contains_key("email"));
    }
    other => panic!("unexpected rejection: {other:?}"),
  }
}

#[tokio::test]
async fn patch_person_and_password() {
  let f = fixture().await;
  let patch = PersonPatch {
    status: Some(PersonStatus::Blocked),
    home_site: Some(Some(Site::SantaClara)),
    password_hash: Some("new-hash".into()),
    ..Default::default()
  };
  let updated = f.store.update_person(f.trainee.person_id, patch).await.unwrap();
  assert!(updated.is_blocked());
  assert_eq!(updated.home_site, Some(Site::SantaClara));

  let (_, hash) = f.store.find_login("ana".into()).await.unwrap().unwrap();
  assert_eq!(hash, "new-hash");

  let clash = PersonPatch { document: Some(Some("G-1".into())), ..Default::default() };
  let err = f.store.update_person(f.trainee.person_id, clash).await.unwrap_err();
  assert_eq!(rejection(err).code(), "validation_error");
}

#[tokio::test]
async fn list_persons_by_role_and_text() {
  let f = fixture().await;
  person(&f.store, "bruno", Role::Trainee, "1002").await;

  let trainees = PersonFilter { role: Some(Role::Trainee), ..Default::default() };
  assert_eq!(f.store.list_persons(&trainees).await.unwrap().len(), 2);

  let text = PersonFilter { text: Some("brun".into()), ..Default::default() };
  let found = f.store.list_persons(&text).await.unwrap();
  assert_eq!(found.len(), 1);
  assert_eq!(found[0].username, "bruno");

  let paged = PersonFilter { limit: Some(2), offset: Some(1), ..Default::default() };
  assert_eq!(f.store.list_persons(&paged).await.unwrap().len(), 2);
}

// ─── Equipment ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn trainee_submission_is_pending_and_admin_submission_approved() {
  let f = fixture().await;
  let own = NewEquipment {
    owner_id: None,
    serial:   " SN-1 ".into(),
    brand:    "Dell".into(),
    model:    "XPS".into(),
  };
  let pending = f.store.submit_equipment(f.trainee.person_id, own).await.unwrap();
  assert_eq!(pending.state, ReviewState::Pending);
  assert_eq!(pending.owner_id, f.trainee.person_id);
  assert_eq!(pending.serial, "SN-1");

  let id = approved_equipment(&f, &f.trainee, "SN-2").await;
  let approved = f.store.get_equipment(id).await.unwrap().unwrap();
  assert!(approved.is_approved());
  assert_eq!(approved.reviewed_by, Some(f.admin.person_id));
  assert!(approved.reviewed_at.is_some());

  let mine = EquipmentFilter { owner_id: Some(f.trainee.person_id), ..Default::default() };
  assert_eq!(f.store.list_equipment(&mine).await.unwrap().len(), 2);
  let pending_only = EquipmentFilter { state: Some(ReviewState::Pending), ..Default::default() };
  assert_eq!(f.store.list_equipment(&pending_only).await.unwrap().len(), 1);
  let by_owner_doc = EquipmentFilter { text: Some("1001".into()), ..Default::default() };
  assert_eq!(f.store.list_equipment(&by_owner_doc).await.unwrap().len(), 2);
}

#[tokio::test]
async fn submission_rules() {
  let f = fixture().await;
  approved_equipment(&f, &f.trainee, "SN-1").await;

  let dup = NewEquipment { owner_id: None, serial: "SN-1".into(), brand: String::new(), model: String::new() };
  let err = f.store.submit_equipment(f.trainee.person_id, dup).await.unwrap_err();
  assert!(matches!(rejection(err), Rejection::Validation { fields, .. } if fields.contains_key("serial")));

  let for_guard = NewEquipment {
    owner_id: Some(f.guard.person_id),
    serial:   "SN-9".into(),
    brand:    String::new(),
    model:    String::new(),
  };
  let err = f.store.submit_equipment(f.admin.person_id, for_guard.clone()).await.unwrap_err();
  assert!(matches!(rejection(err), Rejection::Validation { fields, .. } if fields.contains_key("owner_id")));

  let err = f.store.submit_equipment(f.guard.person_id, for_guard).await.unwrap_err();
  assert_eq!(rejection(err), Rejection::Forbidden);
}

#[tokio::test]
async fn review_workflow() {
  let f = fixture().await;
  let own = NewEquipment { owner_id: None, serial: "SN-1".into(), brand: String::new(), model: String::new() };
  let eq = f.store.submit_equipment(f.trainee.person_id, own).await.unwrap();

  let no_reason = Review { outcome: ReviewOutcome::Rejected, reason: None };
  let err = f.store.review_equipment(f.admin.person_id, eq.equipment_id, no_reason).await.unwrap_err();
  assert_eq!(rejection(err).code(), "validation_error");
  let unchanged = f.store.get_equipment(eq.equipment_id).await.unwrap().unwrap();
  assert_eq!(unchanged.state, ReviewState::Pending);

  let approve = Review { outcome: ReviewOutcome::Approved, reason: None };
  let err = f.store.review_equipment(f.guard.person_id, eq.equipment_id, approve.clone()).await.unwrap_err();
  assert_eq!(rejection(err), Rejection::Forbidden);

  let reject = Review { outcome: ReviewOutcome::Rejected, reason: Some("cracked screen".into()) };
  let rejected = f.store.review_equipment(f.admin.person_id, eq.equipment_id, reject).await.unwrap();
  assert_eq!(rejected.state, ReviewState::Rejected);
  assert_eq!(rejected.rejection_reason.as_deref(), Some("cracked screen"));

  f.clock.advance(Duration::minutes(5));
  let approved = f.store.review_equipment(f.admin.person_id, eq.equipment_id, approve).await.unwrap();
  assert!(approved.is_approved());
  assert_eq!(approved.rejection_reason, None);
  assert_eq!(approved.reviewed_at, Some(f.clock.now()));

  let approve = Review { outcome: ReviewOutcome::Approved, reason: None };
  let err = f.store.review_equipment(f.admin.person_id, Uuid::new_v4(), approve).await.unwrap_err();
  assert_eq!(rejection(err).code(), "not_found");
}

// ─── Shifts ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn shift_lifecycle() {
  let f = fixture().await;
  let guard = f.guard.person_id;

  let shift = f.store.start_shift(guard, Site::Cegafe, Period::Morning).await.unwrap();
  assert!(shift.is_open());
  assert_eq!(f.store.active_shift(guard).await.unwrap(), Some(shift.clone()));

  let err = f.store.start_shift(guard, Site::Itedris, Period::Night).await.unwrap_err();
  assert_eq!(rejection(err), Rejection::AlreadyActive(shift.shift_id));

  f.clock.advance(Duration::hours(6));
  let closed = f.store.end_shift(guard).await.unwrap();
  assert!(!closed.active);
  assert_eq!(closed.ended_at, Some(f.clock.now()));
  assert_eq!(f.store.active_shift(guard).await.unwrap(), None);

  let err = f.store.end_shift(guard).await.unwrap_err();
  assert_eq!(rejection(err), Rejection::NoActiveShift);

  let err = f.store.force_end_shift(shift.shift_id).await.unwrap_err();
  assert_eq!(rejection(err), Rejection::AlreadyClosed(shift.shift_id));
  let err = f.store.force_end_shift(Uuid::new_v4()).await.unwrap_err();
  assert_eq!(rejection(err).code(), "not_found");
}

#[tokio::test]
async fn only_guards_work_shifts() {
  let f = fixture().await;
  let err = f.store.start_shift(f.admin.person_id, Site::Cegafe, Period::Morning).await.unwrap_err();
  assert_eq!(rejection(err), Rejection::Forbidden);
}

#[tokio::test]
async fn force_end_closes_open_shift() {
  let f = fixture().await;
  let shift = f.store.start_shift(f.guard.person_id, Site::Gastronomia, Period::Night).await.unwrap();
  let ended = f.store.force_end_shift(shift.shift_id).await.unwrap();
  assert!(!ended.is_open());
  assert_eq!(f.store.active_shift(f.guard.person_id).await.unwrap(), None);

  let listed = f.store
    .list_shifts(&ShiftFilter { guard_id: Some(f.guard.person_id), active: Some(false), ..Default::default() })
    .await
    .unwrap();
  assert_eq!(listed, vec![ended]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_shift_starts_leave_one_open() {
  let f = fixture().await;
  let tasks: Vec<_> = (0..8)
    .map(|_| {
      let store = f.store.clone();
      let guard = f.guard.person_id;
      tokio::spawn(async move { store.start_shift(guard, Site::Cegafe, Period::Afternoon).await })
    })
    .collect();

  let mut started = 0;
  for task in tasks {
    match task.await.unwrap() {
      Ok(_) => started += 1,
      Err(err) => assert!(matches!(rejection(err), Rejection::AlreadyActive(_))),
    }
  }
  assert_eq!(started, 1);

  let open = ShiftFilter { guard_id: Some(f.guard.person_id), active: Some(true), ..Default::default() };
  assert_eq!(f.store.list_shifts(&open).await.unwrap().len(), 1);
}

#[tokio::test]
async fn audit_finds_and_repairs_drifted_shifts() {
  let f = fixture().await;
  let shift = f.store.start_shift(f.guard.person_id, Site::Cegafe, Period::Morning).await.unwrap();
  let id = crate::encode::encode_uuid(shift.shift_id);
  f.store
    .transact(move |tx| {
      tx.execute(
        "UPDATE shifts SET active = 0, ended_at = NULL WHERE shift_id = ?1",
        rusqlite::params![id],
      )?;
      Ok(())
    })
    .await
    .unwrap();

  let dry = f.store.audit_shifts(false).await.unwrap();
  assert_eq!((dry.total, dry.inconsistent, dry.repaired), (1, 1, 0));

  f.clock.advance(Duration::hours(1));
  let applied = f.store.audit_shifts(true).await.unwrap();
  assert_eq!(applied.repaired, 1);
  let fixed = f.store.get_shift(shift.shift_id).await.unwrap().unwrap();
  assert_eq!(fixed.ended_at, Some(f.clock.now()));

  assert_eq!(f.store.audit_shifts(false).await.unwrap().inconsistent, 0);
}

#[tokio::test]
async fn audit_counts_shifts_not_defects() {
  let f = fixture().await;
  let shift = f.store.start_shift(f.guard.person_id, Site::Cegafe, Period::Morning).await.unwrap();
  let id = crate::encode::encode_uuid(shift.shift_id);
  let before = crate::encode::encode_dt(shift.started_at - Duration::hours(1));
  // Still active, and ended before it started.
  f.store
    .transact(move |tx| {
      tx.execute(
        "UPDATE shifts SET ended_at = ?2 WHERE shift_id = ?1",
        rusqlite::params![id, before],
      )?;
      Ok(())
    })
    .await
    .unwrap();

  let audit = f.store.audit_shifts(true).await.unwrap();
  assert_eq!((audit.total, audit.inconsistent, audit.repaired), (1, 1, 1));
  let fixed = f.store.get_shift(shift.shift_id).await.unwrap().unwrap();
  assert_eq!((fixed.active, fixed.ended_at), (false, Some(shift.started_at)));
}

// ─── Access registration ─────────────────────────────────────────────────────

#[tokio::test]
async fn scenario_a_exit_without_entry() {
  let f = fixture().await;
  let err = f.store
    .register_access(register(&f.admin, &f.trainee, Direction::Exit, &[]))
    .await
    .unwrap_err();
  assert_eq!(rejection(err), Rejection::ExitWithoutEntry);
  assert!(events_for(&f.store, &f.trainee).await.is_empty());
}

#[tokio::test]
async fn scenario_b_exit_equipment_order_is_irrelevant() {
  let f = fixture().await;
  let e1 = approved_equipment(&f, &f.trainee, "SN-1").await;
  let e2 = approved_equipment(&f, &f.trainee, "SN-2").await;

  f.store.register_access(register(&f.admin, &f.trainee, Direction::Entry, &[e1, e2])).await.unwrap();
  let exit = f.store
    .register_access(register(&f.admin, &f.trainee, Direction::Exit, &[e2, e1]))
    .await
    .unwrap();
  assert_eq!(exit.equipment_ids, BTreeSet::from([e1, e2]));
}

#[tokio::test]
async fn scenario_c_empty_exit_auto_fills() {
  let f = fixture().await;
  let e1 = approved_equipment(&f, &f.trainee, "SN-1").await;
  f.store.start_shift(f.guard.person_id, Site::Itedris, Period::Morning).await.unwrap();

  let entry = f.store
    .register_access(register(&f.guard, &f.trainee, Direction::Entry, &[e1]))
    .await
    .unwrap();
  f.store.end_shift(f.guard.person_id).await.unwrap();

  let exit = f.store
    .register_access(register(&f.admin, &f.trainee, Direction::Exit, &[]))
    .await
    .unwrap();
  assert_eq!(exit.equipment_ids, BTreeSet::from([e1]));
  assert_eq!(exit.shift_id, entry.shift_id);
  assert_eq!(exit.site, Some(Site::Itedris));
  assert_eq!(exit.registered_by, Some(f.admin.person_id));
}

#[tokio::test]
async fn scenario_d_guard_without_shift() {
  let f = fixture().await;
  let err = f.store
    .register_access(register(&f.guard, &f.trainee, Direction::Entry, &[]))
    .await
    .unwrap_err();
  assert_eq!(rejection(err), Rejection::NoActiveShift);
  assert!(events_for(&f.store, &f.trainee).await.is_empty());
}

#[tokio::test]
async fn scenario_e_someone_elses_equipment() {
  let f = fixture().await;
  let other = person(&f.store, "bruno", Role::Trainee, "1002").await;
  let theirs = approved_equipment(&f, &other, "SN-B").await;

  let err = f.store
    .register_access(register(&f.admin, &f.trainee, Direction::Entry, &[theirs]))
    .await
    .unwrap_err();
  assert_eq!(rejection(err), Rejection::EquipmentInvalid {
    equipment_id: theirs,
    problem:      EquipmentProblem::NotOwned,
  });
  assert!(events_for(&f.store, &f.trainee).await.is_empty());
}

#[tokio::test]
async fn scenario_f_code_expires_after_ttl() {
  let f = fixture().await;
  let (_, code) = f.store.create_reset_challenge(f.trainee.person_id).await.unwrap();
  f.clock.advance(Duration::minutes(11));
  let err = f.store.verify_reset_code(f.trainee.person_id, code).await.unwrap_err();
  assert_eq!(rejection(err), Rejection::Expired);
}

#[tokio::test]
async fn guard_entry_is_bound_to_shift_and_admin_entry_is_not() {
  let f = fixture().await;
  let shift = f.store.start_shift(f.guard.person_id, Site::SantaClara, Period::Night).await.unwrap();
  let entry = f.store
    .register_access(register(&f.guard, &f.trainee, Direction::Entry, &[]))
    .await
    .unwrap();
  assert_eq!(entry.shift_id, Some(shift.shift_id));
  assert_eq!(entry.site, Some(Site::SantaClara));
  assert_eq!(entry.recorded_at, f.clock.now());

  let other = person(&f.store, "bruno", Role::Trainee, "1002").await;
  let unbound = f.store
    .register_access(register(&f.admin, &other, Direction::Entry, &[]))
    .await
    .unwrap();
  assert_eq!((unbound.shift_id, unbound.site), (None, None));

  let summary = f.store.shift_summary(shift.shift_id).await.unwrap();
  assert_eq!((summary.entries, summary.exits, summary.total), (1, 0, 1));
}

#[tokio::test]
async fn register_by_document() {
  let f = fixture().await;
  let request = RegisterAccess {
    actor_id:      f.admin.person_id,
    subject:       SubjectRef::Document("1001".into()),
    direction:     Direction::Entry,
    equipment_ids: vec![],
  };
  let event = f.store.register_access(request).await.unwrap();
  assert_eq!(event.subject_id, f.trainee.person_id);

  let unknown = RegisterAccess {
    actor_id:      f.admin.person_id,
    subject:       SubjectRef::Document("nope".into()),
    direction:     Direction::Entry,
    equipment_ids: vec![],
  };
  let err = f.store.register_access(unknown).await.unwrap_err();
  assert_eq!(rejection(err).code(), "not_found");
}

#[tokio::test]
async fn subject_must_be_an_active_trainee() {
  let f = fixture().await;
  let err = f.store
    .register_access(register(&f.admin, &f.guard, Direction::Entry, &[]))
    .await
    .unwrap_err();
  assert_eq!(rejection(err), Rejection::InvalidSubjectRole);

  let block = PersonPatch { status: Some(PersonStatus::Blocked), ..Default::default() };
  f.store.update_person(f.trainee.person_id, block).await.unwrap();
  let err = f.store
    .register_access(register(&f.admin, &f.trainee, Direction::Entry, &[]))
    .await
    .unwrap_err();
  assert_eq!(rejection(err), Rejection::SubjectBlocked);

  let err = f.store
    .register_access(register(&f.trainee, &f.trainee, Direction::Entry, &[]))
    .await
    .unwrap_err();
  assert_eq!(rejection(err), Rejection::Forbidden);
}

#[tokio::test]
async fn ledger_alternates_even_within_one_instant() {
  let f = fixture().await;
  let steps = [
    (Direction::Entry, None),
    (Direction::Entry, Some(Rejection::DuplicateDirection(Direction::Entry))),
    (Direction::Exit, None),
    (Direction::Exit, Some(Rejection::DuplicateDirection(Direction::Exit))),
    (Direction::Entry, None),
  ];
  // The clock never moves, so ordering rests on insertion order alone.
  for (direction, expected) in steps {
    let result = f.store.register_access(register(&f.admin, &f.trainee, direction, &[])).await;
    match expected {
      None => assert_eq!(result.unwrap().direction, direction),
      Some(rejection_kind) => assert_eq!(rejection(result.unwrap_err()), rejection_kind),
    }
  }

  let last = f.store.last_event(f.trainee.person_id).await.unwrap().unwrap();
  assert_eq!(last.direction, Direction::Entry);
  let directions: Vec<_> = events_for(&f.store, &f.trainee)
    .await
    .into_iter()
    .rev()
    .map(|e| e.direction)
    .collect();
  assert_eq!(directions, vec![Direction::Entry, Direction::Exit, Direction::Entry]);
}

#[tokio::test]
async fn clock_stepping_back_keeps_alternation() {
  let f = fixture().await;
  let e1 = approved_equipment(&f, &f.trainee, "SN-1").await;
  let entry = f.store
    .register_access(register(&f.admin, &f.trainee, Direction::Entry, &[e1]))
    .await
    .unwrap();

  f.clock.advance(Duration::seconds(-1));
  let exit = f.store
    .register_access(register(&f.admin, &f.trainee, Direction::Exit, &[]))
    .await
    .unwrap();
  assert_eq!(exit.recorded_at, entry.recorded_at);

  let err = f.store
    .register_access(register(&f.admin, &f.trainee, Direction::Exit, &[]))
    .await
    .unwrap_err();
  assert_eq!(rejection(err), Rejection::DuplicateDirection(Direction::Exit));

  // The item left with its owner, so it can come back in.
  f.clock.advance(Duration::seconds(-1));
  let again = f.store
    .register_access(register(&f.admin, &f.trainee, Direction::Entry, &[e1]))
    .await
    .unwrap();
  assert!(again.recorded_at >= exit.recorded_at);

  let directions: Vec<_> = events_for(&f.store, &f.trainee)
    .await
    .into_iter()
    .rev()
    .map(|e| e.direction)
    .collect();
  assert_eq!(directions, vec![Direction::Entry, Direction::Exit, Direction::Entry]);
}

#[tokio::test]
async fn exit_counts_toward_the_shift_that_registered_it() {
  let f = fixture().await;
  let first = f.store.start_shift(f.guard.person_id, Site::Cegafe, Period::Night).await.unwrap();
  f.store.register_access(register(&f.guard, &f.trainee, Direction::Entry, &[])).await.unwrap();
  f.clock.advance(Duration::hours(8));
  f.store.end_shift(f.guard.person_id).await.unwrap();

  f.clock.advance(Duration::hours(1));
  let second = f.store.start_shift(f.guard.person_id, Site::Cegafe, Period::Morning).await.unwrap();
  let exit = f.store
    .register_access(register(&f.guard, &f.trainee, Direction::Exit, &[]))
    .await
    .unwrap();
  assert_eq!(exit.shift_id, Some(first.shift_id));

  let s1 = f.store.shift_summary(first.shift_id).await.unwrap();
  assert_eq!((s1.entries, s1.exits, s1.total), (1, 0, 1));
  let s2 = f.store.shift_summary(second.shift_id).await.unwrap();
  assert_eq!((s2.entries, s2.exits, s2.total), (0, 1, 1));
}

#[tokio::test]
async fn exit_rules_use_the_open_entry() {
  let f = fixture().await;
  let e1 = approved_equipment(&f, &f.trainee, "SN-1").await;
  let e2 = approved_equipment(&f, &f.trainee, "SN-2").await;
  f.store.register_access(register(&f.admin, &f.trainee, Direction::Entry, &[e1, e2])).await.unwrap();

  let err = f.store
    .register_access(register(&f.admin, &f.trainee, Direction::Exit, &[e1]))
    .await
    .unwrap_err();
  assert_eq!(rejection(err), Rejection::EquipmentMismatch);

  let dup = f.store
    .register_access(register(&f.admin, &f.trainee, Direction::Exit, &[e2, e1, e2]))
    .await
    .unwrap();
  assert_eq!(dup.equipment_ids.len(), 2);
}

#[tokio::test]
async fn entry_equipment_must_be_known_and_approved() {
  let f = fixture().await;
  let own = NewEquipment { owner_id: None, serial: "SN-P".into(), brand: String::new(), model: String::new() };
  let pending = f.store.submit_equipment(f.trainee.person_id, own).await.unwrap();

  let err = f.store
    .register_access(register(&f.admin, &f.trainee, Direction::Entry, &[pending.equipment_id]))
    .await
    .unwrap_err();
  assert!(matches!(rejection(err), Rejection::EquipmentInvalid { problem: EquipmentProblem::NotApproved, .. }));

  let ghost = Uuid::new_v4();
  let err = f.store
    .register_access(register(&f.admin, &f.trainee, Direction::Entry, &[ghost]))
    .await
    .unwrap_err();
  assert_eq!(rejection(err), Rejection::EquipmentInvalid {
    equipment_id: ghost,
    problem:      EquipmentProblem::Unknown,
  });
}

#[tokio::test]
async fn equipment_cannot_be_checked_in_twice() {
  let f = fixture().await;
  let e1 = approved_equipment(&f, &f.trainee, "SN-1").await;

  // A legacy event left the item checked in under someone else's record.
  let other = person(&f.store, "bruno", Role::Trainee, "1002").await;
  let legacy = AccessEvent {
    event_id:      Uuid::new_v4(),
    subject_id:    other.person_id,
    direction:     Direction::Entry,
    recorded_at:   f.clock.now() - Duration::hours(1),
    registered_by: None,
    shift_id:      None,
    site:          None,
    equipment_ids: BTreeSet::from([e1]),
  };
  f.store.transact(move |tx| ledger::insert(tx, &legacy, None)).await.unwrap();

  let err = f.store
    .register_access(register(&f.admin, &f.trainee, Direction::Entry, &[e1]))
    .await
    .unwrap_err();
  assert_eq!(rejection(err), Rejection::EquipmentAlreadyCheckedIn(e1));
}

#[tokio::test]
async fn equipment_moves_in_and_out_with_its_owner() {
  let f = fixture().await;
  let e1 = approved_equipment(&f, &f.trainee, "SN-1").await;
  for _ in 0..2 {
    f.store.register_access(register(&f.admin, &f.trainee, Direction::Entry, &[e1])).await.unwrap();
    f.clock.advance(Duration::minutes(1));
    f.store.register_access(register(&f.admin, &f.trainee, Direction::Exit, &[])).await.unwrap();
    f.clock.advance(Duration::minutes(1));
  }
  assert_eq!(events_for(&f.store, &f.trainee).await.len(), 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_entries_for_one_subject_yield_one_event() {
  let f = fixture().await;
  let e1 = approved_equipment(&f, &f.trainee, "SN-1").await;

  let tasks: Vec<_> = (0..8)
    .map(|_| {
      let store = f.store.clone();
      let request = register(&f.admin, &f.trainee, Direction::Entry, &[e1]);
      tokio::spawn(async move { store.register_access(request).await })
    })
    .collect();

  let mut accepted = 0;
  for task in tasks {
    match task.await.unwrap() {
      Ok(_) => accepted += 1,
      Err(err) => assert_eq!(rejection(err), Rejection::DuplicateDirection(Direction::Entry)),
    }
  }
  assert_eq!(accepted, 1);
  assert_eq!(events_for(&f.store, &f.trainee).await.len(), 1);
}

#[tokio::test]
async fn document_check_reports_presence_and_equipment() {
  let f = fixture().await;
  let e1 = approved_equipment(&f, &f.trainee, "SN-1").await;

  let err = f.store.check_document(f.guard.person_id, "1001".into()).await.unwrap_err();
  assert_eq!(rejection(err), Rejection::NoActiveShift);

  let shift = f.store.start_shift(f.guard.person_id, Site::Cegafe, Period::Morning).await.unwrap();
  let before = f.store.check_document(f.guard.person_id, "1001".into()).await.unwrap();
  assert_eq!(before.status.status, Presence::NoRecords);
  assert_eq!(before.next_direction, Direction::Entry);
  assert_eq!(before.approved_equipment.len(), 1);
  assert_eq!(before.shift.map(|s| s.shift_id), Some(shift.shift_id));

  f.store.register_access(register(&f.guard, &f.trainee, Direction::Entry, &[e1])).await.unwrap();
  let inside = f.store.check_document(f.guard.person_id, "1001".into()).await.unwrap();
  assert_eq!(inside.status.status, Presence::Inside);
  assert_eq!(inside.next_direction, Direction::Exit);
  assert_eq!(inside.checked_in_equipment, BTreeSet::from([e1]));

  let err = f.store.check_document(f.guard.person_id, "G-1".into()).await.unwrap_err();
  assert_eq!(rejection(err), Rejection::InvalidSubjectRole);
}

#[tokio::test]
async fn list_access_events_filters() {
  let f = fixture().await;
  let other = person(&f.store, "bruno", Role::Trainee, "1002").await;
  f.store.register_access(register(&f.admin, &f.trainee, Direction::Entry, &[])).await.unwrap();
  f.clock.advance(Duration::days(1));
  f.store.register_access(register(&f.admin, &other, Direction::Entry, &[])).await.unwrap();
  f.store.register_access(register(&f.admin, &other, Direction::Exit, &[])).await.unwrap();

  let all = f.store.list_access_events(&AccessFilter::default()).await.unwrap();
  assert_eq!(all.len(), 3);
  assert_eq!(all[0].direction, Direction::Exit);

  let exits = AccessFilter { direction: Some(Direction::Exit), ..Default::default() };
  assert_eq!(f.store.list_access_events(&exits).await.unwrap().len(), 1);

  let today = f.clock.now().date_naive();
  let today_only = AccessFilter { from: Some(today), to: Some(today), ..Default::default() };
  assert_eq!(f.store.list_access_events(&today_only).await.unwrap().len(), 2);

  let by_doc = AccessFilter { text: Some("1001".into()), ..Default::default() };
  assert_eq!(f.store.list_access_events(&by_doc).await.unwrap().len(), 1);
}

// ─── Password reset ──────────────────────────────────────────────────────────

fn wrong(code: &str) -> String {
  if code == "000000" { "000001".into() } else { "000000".into() }
}

#[tokio::test]
async fn reset_code_confirms_once() {
  let f = fixture().await;
  let id = f.trainee.person_id;
  let (_, code) = f.store.create_reset_challenge(id).await.unwrap();

  f.store.verify_reset_code(id, code.clone()).await.unwrap();
  f.store.confirm_password_reset(id, code.clone(), "fresh-hash".into()).await.unwrap();

  let (_, hash) = f.store.find_login("ana".into()).await.unwrap().unwrap();
  assert_eq!(hash, "fresh-hash");

  let err = f.store.verify_reset_code(id, code.clone()).await.unwrap_err();
  assert_eq!(rejection(err), Rejection::NoActiveChallenge);
  let err = f.store.confirm_password_reset(id, code, "again".into()).await.unwrap_err();
  assert_eq!(rejection(err), Rejection::NoActiveChallenge);
}

#[tokio::test]
async fn wrong_codes_lock_the_challenge() {
  let f = fixture().await;
  let id = f.trainee.person_id;
  let (_, code) = f.store.create_reset_challenge(id).await.unwrap();

  for _ in 0..5 {
    let err = f.store.verify_reset_code(id, wrong(&code)).await.unwrap_err();
    assert_eq!(rejection(err), Rejection::InvalidCode);
  }
  let err = f.store.verify_reset_code(id, code.clone()).await.unwrap_err();
  assert_eq!(rejection(err), Rejection::TooManyAttempts);

  let err = f.store.confirm_password_reset(id, code, "x".repeat(8)).await.unwrap_err();
  assert_eq!(rejection(err), Rejection::TooManyAttempts);
  let (_, hash) = f.store.find_login("ana".into()).await.unwrap().unwrap();
  assert_eq!(hash, "hash-of-ana");
}

#[tokio::test]
async fn only_the_latest_challenge_counts() {
  let f = fixture().await;
  let id = f.trainee.person_id;
  let (_, first) = f.store.create_reset_challenge(id).await.unwrap();
  f.clock.advance(Duration::seconds(1));
  let (_, second) = f.store.create_reset_challenge(id).await.unwrap();

  if first != second {
    let err = f.store.verify_reset_code(id, first).await.unwrap_err();
    assert_eq!(rejection(err), Rejection::InvalidCode);
  }
  f.store.verify_reset_code(id, second).await.unwrap();
}

#[tokio::test]
async fn malformed_code_and_missing_challenge() {
  let f = fixture().await;
  let id = f.trainee.person_id;
  let err = f.store.verify_reset_code(id, "123456".into()).await.unwrap_err();
  assert_eq!(rejection(err), Rejection::NoActiveChallenge);

  f.store.create_reset_challenge(id).await.unwrap();
  let err = f.store.verify_reset_code(id, "12ab".into()).await.unwrap_err();
  assert_eq!(rejection(err).code(), "validation_error");
}

// ─── Notifications ───────────────────────────────────────────────────────────

#[tokio::test]
async fn notifications_fan_out_and_mark_read() {
  let f = fixture().await;
  person(&f.store, "admin2", Role::Admin, "A-2").await;

  let note = NewNotification::new(Severity::Warning, "Blocked trainee", "ana tried to enter");
  let sent = f.store.notify(Audience::Role(Role::Admin), note).await.unwrap();
  assert_eq!(sent, 2);

  let inbox = f.store.list_notifications(f.admin.person_id).await.unwrap();
  assert_eq!(inbox.len(), 1);
  assert_eq!(inbox[0].severity, Severity::Warning);
  assert!(inbox[0].read_at.is_none());

  let err = f.store
    .mark_notification_read(f.guard.person_id, inbox[0].notification_id)
    .await
    .unwrap_err();
  assert_eq!(rejection(err).code(), "not_found");

  let read = f.store
    .mark_notification_read(f.admin.person_id, inbox[0].notification_id)
    .await
    .unwrap();
  assert_eq!(read.read_at, Some(f.clock.now()));

  let everyone = NewNotification::new(Severity::Info, "Maintenance", "tonight");
  assert_eq!(f.store.notify(Audience::Broadcast, everyone).await.unwrap(), 4);
  assert_eq!(f.store.list_notifications(f.trainee.person_id).await.unwrap().len(), 1);
}
