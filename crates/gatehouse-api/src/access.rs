//! Handlers for `/access-events`: registration, badge preflight, history and
//! per-shift statistics.

use axum::extract::State;
use chrono::NaiveDate;
use gatehouse_core::{
  Rejection,
  access::{AccessEvent, AccessStatus, Direction, RegisterAccess, SubjectRef},
  notify::{Audience, NewNotification, Severity},
  person::{Capability, Person, Role, Site},
  store::{AccessFilter, AccessStore},
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::{
  AppState, Reply,
  auth::Actor,
  error::ApiError,
  extract::{Body, Params},
};

// ─── Request types ───────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct AccessQuery {
  pub subject_id:    Option<Uuid>,
  pub registered_by: Option<Uuid>,
  pub shift_id:      Option<Uuid>,
  pub direction:     Option<Direction>,
  pub site:          Option<Site>,
  pub from:          Option<NaiveDate>,
  pub to:            Option<NaiveDate>,
  pub q:             Option<String>,
  pub limit:         Option<usize>,
  pub offset:        Option<usize>,
}

impl From<AccessQuery> for AccessFilter {
  fn from(q: AccessQuery) -> Self {
    Self {
      subject_id:    q.subject_id,
      registered_by: q.registered_by,
      shift_id:      q.shift_id,
      direction:     q.direction,
      site:          q.site,
      from:          q.from,
      to:            q.to,
      text:          q.q,
      limit:         q.limit,
      offset:        q.offset,
    }
  }
}

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
  pub limit:  Option<usize>,
  pub offset: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct RegisterById {
  pub subject_id:    Uuid,
  pub direction:     Direction,
  #[serde(default)]
  pub equipment_ids: Vec<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct DocumentRequest {
  pub document: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterByDocument {
  pub document:      String,
  pub direction:     Direction,
  #[serde(default)]
  pub equipment_ids: Vec<Uuid>,
}

// ─── Handlers ────────────────────────────────────────────────────────────────

/// `GET /access-events`
pub async fn list<S>(
  State(state): State<AppState<S>>,
  Actor(actor): Actor,
  Params(query): Params<AccessQuery>,
) -> Result<Reply<serde_json::Value>, ApiError>
where
  S: AccessStore + Clone + 'static,
{
  actor.require(Capability::ViewAllAccess)?;
  let filter = AccessFilter::from(query);
  let events = state.call(state.store.list_access_events(&filter)).await?;
  Ok(Reply::ok(json!({ "events": events })))
}

/// `POST /access-events`
pub async fn register<S>(
  State(state): State<AppState<S>>,
  Actor(actor): Actor,
  Body(body): Body<RegisterById>,
) -> Result<Reply<serde_json::Value>, ApiError>
where
  S: AccessStore + Clone + 'static,
{
  let request = RegisterAccess {
    actor_id:      actor.person_id,
    subject:       SubjectRef::Id(body.subject_id),
    direction:     body.direction,
    equipment_ids: body.equipment_ids,
  };
  let event = run_registration(&state, &actor, request).await?;
  Ok(Reply::created(json!({ "event": event })))
}

/// `POST /access-events/validate-by-document`: what a badge scan would
/// find, without writing anything.
pub async fn validate_by_document<S>(
  State(state): State<AppState<S>>,
  Actor(actor): Actor,
  Body(body): Body<DocumentRequest>,
) -> Result<Reply<serde_json::Value>, ApiError>
where
  S: AccessStore + Clone + 'static,
{
  actor.require(Capability::RegisterAccess)?;
  let check = state
    .call(state.store.check_document(actor.person_id, body.document))
    .await?;
  Ok(Reply::ok(json!(check)))
}

/// `POST /access-events/register-by-document`
pub async fn register_by_document<S>(
  State(state): State<AppState<S>>,
  Actor(actor): Actor,
  Body(body): Body<RegisterByDocument>,
) -> Result<Reply<serde_json::Value>, ApiError>
where
  S: AccessStore + Clone + 'static,
{
  let request = RegisterAccess {
    actor_id:      actor.person_id,
    subject:       SubjectRef::Document(body.document),
    direction:     body.direction,
    equipment_ids: body.equipment_ids,
  };
  let event = run_registration(&state, &actor, request).await?;
  Ok(Reply::created(json!({ "event": event })))
}

/// `GET /access-events/my-history`
pub async fn my_history<S>(
  State(state): State<AppState<S>>,
  Actor(actor): Actor,
  Params(page): Params<PageQuery>,
) -> Result<Reply<serde_json::Value>, ApiError>
where
  S: AccessStore + Clone + 'static,
{
  actor.require(Capability::ViewOwnAccess)?;
  let filter = AccessFilter {
    subject_id: Some(actor.person_id),
    limit: page.limit,
    offset: page.offset,
    ..AccessFilter::default()
  };
  let events = state.call(state.store.list_access_events(&filter)).await?;
  Ok(Reply::ok(json!({ "events": events })))
}

/// `GET /access-events/my-status`
pub async fn my_status<S>(
  State(state): State<AppState<S>>,
  Actor(actor): Actor,
) -> Result<Reply<AccessStatus>, ApiError>
where
  S: AccessStore + Clone + 'static,
{
  actor.require(Capability::ViewOwnAccess)?;
  let last = state.call(state.store.last_event(actor.person_id)).await?;
  Ok(Reply::ok(AccessStatus::from_last(last.as_ref())))
}

/// `GET /access-events/stats`: entry and exit counts for the guard's
/// current shift.
pub async fn stats<S>(
  State(state): State<AppState<S>>,
  Actor(actor): Actor,
) -> Result<Reply<serde_json::Value>, ApiError>
where
  S: AccessStore + Clone + 'static,
{
  actor.require(Capability::WorkShifts)?;
  let shift = state
    .call(state.store.active_shift(actor.person_id))
    .await?
    .ok_or(Rejection::NoActiveShift)?;
  let summary = state.call(state.store.shift_summary(shift.shift_id)).await?;
  Ok(Reply::ok(json!({ "shift": shift, "summary": summary })))
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

async fn run_registration<S>(
  state: &AppState<S>,
  actor: &Person,
  request: RegisterAccess,
) -> Result<AccessEvent, ApiError>
where
  S: AccessStore + Clone + 'static,
{
  let subject = request.subject.clone();
  let direction = request.direction;

  match state.call(state.store.register_access(request)).await {
    Ok(event) => Ok(event),
    Err(ApiError::Rejected(rejection)) => {
      tracing::info!(?subject, %direction, by = %actor.person_id, reason = %rejection, "access refused");
      if rejection == Rejection::SubjectBlocked {
        state.notify_later(
          Audience::Role(Role::Admin),
          NewNotification::new(
            Severity::Warning,
            "Blocked trainee at the gate",
            format!("{} tried to register the {direction} of a blocked trainee.", actor.username),
          )
          .with_data(json!({ "subject": subject_label(&subject), "direction": direction })),
        );
      }
      Err(ApiError::Rejected(rejection))
    }
    Err(other) => Err(other),
  }
}

fn subject_label(subject: &SubjectRef) -> String {
  match subject {
    SubjectRef::Id(id) => id.to_string(),
    SubjectRef::Document(document) => document.clone(),
  }
}
