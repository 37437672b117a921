//! Handlers for `/shifts`.

use axum::extract::State;
use gatehouse_core::{
  Rejection,
  notify::{Audience, NewNotification, Severity},
  person::{Capability, Person, Site},
  shift::{Period, Shift},
  store::{AccessStore, ShiftFilter},
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::{
  AppState, Reply,
  auth::Actor,
  error::ApiError,
  extract::{Body, Params, Segment},
};

#[derive(Debug, Default, Deserialize)]
pub struct ShiftQuery {
  pub guard_id: Option<Uuid>,
  pub site:     Option<Site>,
  pub period:   Option<Period>,
  pub active:   Option<bool>,
  pub limit:    Option<usize>,
  pub offset:   Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct StartShift {
  pub site:   Site,
  pub period: Period,
}

/// `GET /shifts`: admins see every shift, guards only their own.
pub async fn list<S>(
  State(state): State<AppState<S>>,
  Actor(actor): Actor,
  Params(query): Params<ShiftQuery>,
) -> Result<Reply<serde_json::Value>, ApiError>
where
  S: AccessStore + Clone + 'static,
{
  let guard_id = if actor.can(Capability::ViewAllShifts) {
    query.guard_id
  } else if actor.can(Capability::WorkShifts) {
    Some(actor.person_id)
  } else {
    return Err(Rejection::Forbidden.into());
  };

  let filter = ShiftFilter {
    guard_id,
    site: query.site,
    period: query.period,
    active: query.active,
    limit: query.limit,
    offset: query.offset,
  };
  let shifts = state.call(state.store.list_shifts(&filter)).await?;
  Ok(Reply::ok(json!({ "shifts": shifts })))
}

/// `POST /shifts/start`
pub async fn start<S>(
  State(state): State<AppState<S>>,
  Actor(actor): Actor,
  Body(body): Body<StartShift>,
) -> Result<Reply<serde_json::Value>, ApiError>
where
  S: AccessStore + Clone + 'static,
{
  actor.require(Capability::WorkShifts)?;
  let shift = state
    .call(state.store.start_shift(actor.person_id, body.site, body.period))
    .await?;
  Ok(Reply::created(json!({ "shift": shift })))
}

/// `POST /shifts/end`
pub async fn end<S>(
  State(state): State<AppState<S>>,
  Actor(actor): Actor,
) -> Result<Reply<serde_json::Value>, ApiError>
where
  S: AccessStore + Clone + 'static,
{
  actor.require(Capability::WorkShifts)?;
  let shift = state.call(state.store.end_shift(actor.person_id)).await?;
  Ok(Reply::ok(json!({ "shift": shift })))
}

/// `GET /shifts/current`. `shift` is `null` when the guard is off duty.
pub async fn current<S>(
  State(state): State<AppState<S>>,
  Actor(actor): Actor,
) -> Result<Reply<serde_json::Value>, ApiError>
where
  S: AccessStore + Clone + 'static,
{
  actor.require(Capability::WorkShifts)?;
  let shift = state.call(state.store.active_shift(actor.person_id)).await?;
  let reply = Reply::ok(json!({ "shift": shift }));
  Ok(match shift {
    Some(_) => reply,
    None => reply.with_reason("no active shift"),
  })
}

/// `GET /shifts/{id}/summary`: admins, or the guard who worked it.
pub async fn summary<S>(
  State(state): State<AppState<S>>,
  Actor(actor): Actor,
  Segment(id): Segment<Uuid>,
) -> Result<Reply<serde_json::Value>, ApiError>
where
  S: AccessStore + Clone + 'static,
{
  let shift = state
    .call(state.store.get_shift(id))
    .await?
    .ok_or_else(|| Rejection::not_found("shift"))?;
  if !can_view(&actor, &shift) {
    return Err(Rejection::Forbidden.into());
  }
  let summary = state.call(state.store.shift_summary(id)).await?;
  Ok(Reply::ok(json!({ "shift": shift, "summary": summary })))
}

/// `POST /shifts/{id}/force-end`
pub async fn force_end<S>(
  State(state): State<AppState<S>>,
  Actor(actor): Actor,
  Segment(id): Segment<Uuid>,
) -> Result<Reply<serde_json::Value>, ApiError>
where
  S: AccessStore + Clone + 'static,
{
  actor.require(Capability::ForceEndShift)?;
  let shift = state.call(state.store.force_end_shift(id)).await?;
  tracing::warn!(shift_id = %id, guard_id = %shift.guard_id, by = %actor.person_id, "shift force-ended");

  state.notify_later(
    Audience::Person(shift.guard_id),
    NewNotification::new(
      Severity::Warning,
      "Shift ended by an administrator",
      format!("Your {} shift at {} was closed by {}.", shift.period, shift.site, actor.username),
    )
    .with_data(json!({ "shift_id": shift.shift_id })),
  );

  Ok(Reply::ok(json!({ "shift": shift })))
}

fn can_view(actor: &Person, shift: &Shift) -> bool {
  actor.can(Capability::ViewAllShifts)
    || (actor.can(Capability::WorkShifts) && shift.guard_id == actor.person_id)
}
