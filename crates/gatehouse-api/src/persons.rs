//! Handlers for `/me` and `/persons`.

use axum::extract::State;
use gatehouse_core::{
  Rejection,
  person::{
    Capability, NewPerson, PersonPatch, PersonStatus, Role, Site, check_password, default_password,
  },
  store::{AccessStore, PersonFilter},
};
use serde::{Deserialize, Deserializer};
use serde_json::json;
use uuid::Uuid;

use crate::{
  AppState, Reply,
  auth::{Actor, hash_password},
  error::ApiError,
  extract::{Body, Params, Segment},
};

// ─── Request types ───────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct PersonQuery {
  pub q:      Option<String>,
  pub role:   Option<Role>,
  pub status: Option<PersonStatus>,
  pub site:   Option<Site>,
  pub limit:  Option<usize>,
  pub offset: Option<usize>,
}

impl From<PersonQuery> for PersonFilter {
  fn from(q: PersonQuery) -> Self {
    Self {
      text:   q.q,
      role:   q.role,
      status: q.status,
      site:   q.site,
      limit:  q.limit,
      offset: q.offset,
    }
  }
}

#[derive(Debug, Deserialize)]
pub struct CreatePerson {
  pub username:         String,
  pub email:            Option<String>,
  #[serde(default)]
  pub first_name:       String,
  #[serde(default)]
  pub last_name:        String,
  pub role:             Role,
  #[serde(default)]
  pub status:           PersonStatus,
  pub home_site:        Option<Site>,
  pub training_program: Option<String>,
  pub document:         Option<String>,
  /// Defaults to [`default_password`] of the document when omitted.
  pub password:         Option<String>,
}

/// Admin patch body. An absent field is left untouched; `null` clears a
/// nullable field.
#[derive(Debug, Default, Deserialize)]
pub struct UpdatePerson {
  #[serde(default, deserialize_with = "present")]
  pub email:            Option<Option<String>>,
  pub first_name:       Option<String>,
  pub last_name:        Option<String>,
  pub role:             Option<Role>,
  pub status:           Option<PersonStatus>,
  #[serde(default, deserialize_with = "present")]
  pub home_site:        Option<Option<Site>>,
  #[serde(default, deserialize_with = "present")]
  pub training_program: Option<Option<String>>,
  #[serde(default, deserialize_with = "present")]
  pub document:         Option<Option<String>>,
  pub password:         Option<String>,
}

/// Marks a field as present, even when its value is `null`.
fn present<'de, D, T>(de: D) -> Result<Option<Option<T>>, D::Error>
where
  D: Deserializer<'de>,
  T: Deserialize<'de>,
{
  Option::<T>::deserialize(de).map(Some)
}

// ─── Handlers ────────────────────────────────────────────────────────────────

/// `GET /me`
pub async fn me<S>(Actor(actor): Actor) -> Reply<serde_json::Value>
where
  S: AccessStore + Clone + 'static,
{
  Reply::ok(json!({ "person": actor }))
}

/// `GET /persons`
pub async fn list<S>(
  State(state): State<AppState<S>>,
  Actor(actor): Actor,
  Params(query): Params<PersonQuery>,
) -> Result<Reply<serde_json::Value>, ApiError>
where
  S: AccessStore + Clone + 'static,
{
  actor.require(Capability::ManagePersons)?;
  let filter = PersonFilter::from(query);
  let persons = state.call(state.store.list_persons(&filter)).await?;
  Ok(Reply::ok(json!({ "persons": persons })))
}

/// `POST /persons`
pub async fn create<S>(
  State(state): State<AppState<S>>,
  Actor(actor): Actor,
  Body(body): Body<CreatePerson>,
) -> Result<Reply<serde_json::Value>, ApiError>
where
  S: AccessStore + Clone + 'static,
{
  actor.require(Capability::ManagePersons)?;

  let password = match body.password {
    Some(password) => {
      check_password(&password)?;
      password
    }
    None => default_password(body.document.as_deref()),
  };

  let input = NewPerson {
    username:         body.username,
    email:            body.email,
    first_name:       body.first_name,
    last_name:        body.last_name,
    role:             body.role,
    status:           body.status,
    home_site:        body.home_site,
    training_program: body.training_program,
    document:         body.document,
    password_hash:    hash_password(&password)?,
  }
  .normalize()?;

  let person = state.call(state.store.create_person(input)).await?;
  tracing::info!(person_id = %person.person_id, role = %person.role, by = %actor.person_id, "person created");
  Ok(Reply::created(json!({ "person": person })))
}

/// `GET /persons/{id}`
pub async fn get_one<S>(
  State(state): State<AppState<S>>,
  Actor(actor): Actor,
  Segment(id): Segment<Uuid>,
) -> Result<Reply<serde_json::Value>, ApiError>
where
  S: AccessStore + Clone + 'static,
{
  actor.require(Capability::ManagePersons)?;
  let person = state
    .call(state.store.get_person(id))
    .await?
    .ok_or_else(|| Rejection::not_found("person"))?;
  Ok(Reply::ok(json!({ "person": person })))
}

/// `PATCH /persons/{id}`
pub async fn update<S>(
  State(state): State<AppState<S>>,
  Actor(actor): Actor,
  Segment(id): Segment<Uuid>,
  Body(body): Body<UpdatePerson>,
) -> Result<Reply<serde_json::Value>, ApiError>
where
  S: AccessStore + Clone + 'static,
{
  actor.require(Capability::ManagePersons)?;

  let password_hash = match body.password.as_deref() {
    Some(password) => {
      check_password(password)?;
      Some(hash_password(password)?)
    }
    None => None,
  };

  let patch = PersonPatch {
    email: body.email,
    first_name: body.first_name,
    last_name: body.last_name,
    role: body.role,
    status: body.status,
    home_site: body.home_site,
    training_program: body.training_program,
    document: body.document,
    password_hash,
  };
  let person = state.call(state.store.update_person(id, patch)).await?;
  tracing::info!(person_id = %id, by = %actor.person_id, "person updated");
  Ok(Reply::ok(json!({ "person": person })))
}
