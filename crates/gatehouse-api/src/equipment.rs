//! Handlers for `/equipment`.

use axum::extract::State;
use gatehouse_core::{
  Rejection,
  equipment::{NewEquipment, Review, ReviewOutcome, ReviewState},
  notify::{Audience, NewNotification, Severity},
  person::{Capability, Role},
  store::{AccessStore, EquipmentFilter},
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
pub struct EquipmentQuery {
  pub owner_id: Option<Uuid>,
  pub state:    Option<ReviewState>,
  pub q:        Option<String>,
  pub limit:    Option<usize>,
  pub offset:   Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct SubmitEquipment {
  pub owner_id: Option<Uuid>,
  pub serial:   String,
  #[serde(default)]
  pub brand:    String,
  #[serde(default)]
  pub model:    String,
}

/// `GET /equipment`: admins see everything, trainees only their own.
pub async fn list<S>(
  State(state): State<AppState<S>>,
  Actor(actor): Actor,
  Params(query): Params<EquipmentQuery>,
) -> Result<Reply<serde_json::Value>, ApiError>
where
  S: AccessStore + Clone + 'static,
{
  let owner_id = if actor.can(Capability::ViewAllEquipment) {
    query.owner_id
  } else if actor.can(Capability::SubmitOwnEquipment) {
    Some(actor.person_id)
  } else {
    return Err(Rejection::Forbidden.into());
  };

  let filter = EquipmentFilter {
    owner_id,
    state: query.state,
    text: query.q,
    limit: query.limit,
    offset: query.offset,
  };
  let equipment = state.call(state.store.list_equipment(&filter)).await?;
  Ok(Reply::ok(json!({ "equipment": equipment })))
}

/// `POST /equipment`
pub async fn submit<S>(
  State(state): State<AppState<S>>,
  Actor(actor): Actor,
  Body(body): Body<SubmitEquipment>,
) -> Result<Reply<serde_json::Value>, ApiError>
where
  S: AccessStore + Clone + 'static,
{
  if !actor.can(Capability::SubmitOwnEquipment) && !actor.can(Capability::SubmitEquipmentForOthers)
  {
    return Err(Rejection::Forbidden.into());
  }

  let input = NewEquipment {
    owner_id: body.owner_id,
    serial:   body.serial,
    brand:    body.brand,
    model:    body.model,
  };
  let equipment = state
    .call(state.store.submit_equipment(actor.person_id, input))
    .await?;

  tracing::info!(
    equipment_id = %equipment.equipment_id,
    owner_id = %equipment.owner_id,
    state = %equipment.state,
    "equipment submitted"
  );

  if equipment.state == ReviewState::Pending {
    state.notify_later(
      Audience::Role(Role::Admin),
      NewNotification::new(
        Severity::Info,
        "Equipment pending review",
        format!(
          "{} submitted {} {} (serial {}) for review.",
          actor.username, equipment.brand, equipment.model, equipment.serial
        ),
      )
      .with_data(json!({ "equipment_id": equipment.equipment_id })),
    );
  }

  Ok(Reply::created(json!({ "equipment": equipment })))
}

/// `GET /equipment/{id}`: admins, or the owner.
pub async fn get_one<S>(
  State(state): State<AppState<S>>,
  Actor(actor): Actor,
  Segment(id): Segment<Uuid>,
) -> Result<Reply<serde_json::Value>, ApiError>
where
  S: AccessStore + Clone + 'static,
{
  let equipment = state
    .call(state.store.get_equipment(id))
    .await?
    .ok_or_else(|| Rejection::not_found("equipment"))?;

  if !actor.can(Capability::ViewAllEquipment) && equipment.owner_id != actor.person_id {
    return Err(Rejection::Forbidden.into());
  }
  Ok(Reply::ok(json!({ "equipment": equipment })))
}

/// `POST /equipment/{id}/review`
pub async fn review<S>(
  State(state): State<AppState<S>>,
  Actor(actor): Actor,
  Segment(id): Segment<Uuid>,
  Body(review): Body<Review>,
) -> Result<Reply<serde_json::Value>, ApiError>
where
  S: AccessStore + Clone + 'static,
{
  actor.require(Capability::ReviewEquipment)?;
  let outcome = review.outcome;
  let equipment = state
    .call(state.store.review_equipment(actor.person_id, id, review))
    .await?;

  tracing::info!(equipment_id = %id, by = %actor.person_id, state = %equipment.state, "equipment reviewed");

  let note = match outcome {
    ReviewOutcome::Approved => NewNotification::new(
      Severity::Info,
      "Equipment approved",
      format!("Your {} {} (serial {}) was approved.", equipment.brand, equipment.model, equipment.serial),
    ),
    ReviewOutcome::Rejected => NewNotification::new(
      Severity::Warning,
      "Equipment rejected",
      format!(
        "Your {} {} (serial {}) was rejected: {}",
        equipment.brand,
        equipment.model,
        equipment.serial,
        equipment.rejection_reason.as_deref().unwrap_or_default()
      ),
    ),
  };
  state.notify_later(
    Audience::Person(equipment.owner_id),
    note.with_data(json!({ "equipment_id": equipment.equipment_id })),
  );

  Ok(Reply::ok(json!({ "equipment": equipment })))
}
