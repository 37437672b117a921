//! Unauthenticated password reset: request a code by email, verify it, then
//! confirm a new password with it.

use axum::extract::State;
use gatehouse_core::{
  Rejection,
  mail::Email,
  otp::CODE_TTL_MINUTES,
  person::{Person, check_password},
  store::AccessStore,
};
use serde::Deserialize;
use serde_json::json;

use crate::{AppState, Reply, auth::hash_password, error::ApiError, extract::Body};

#[derive(Debug, Deserialize)]
pub struct ResetRequest {
  pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetVerify {
  pub email: String,
  pub code:  String,
}

#[derive(Debug, Deserialize)]
pub struct ResetConfirm {
  pub email:        String,
  pub code:         String,
  pub new_password: String,
}

/// Returned whether or not the address is registered.
const REQUEST_ACK: &str = "if the email is registered, a reset code has been sent";

/// `POST /auth/password-reset/request`
pub async fn request<S>(
  State(state): State<AppState<S>>,
  Body(body): Body<ResetRequest>,
) -> Result<Reply<serde_json::Value>, ApiError>
where
  S: AccessStore + Clone + 'static,
{
  let email = body.email.trim().to_owned();
  if let Some(person) = state.call(state.store.find_by_email(email.clone())).await? {
    let (challenge, code) = state
      .call(state.store.create_reset_challenge(person.person_id))
      .await?;
    tracing::info!(
      person_id = %person.person_id,
      challenge_id = %challenge.challenge_id,
      "password reset requested"
    );
    let to = person.email.unwrap_or(email);
    state.mail_later(Email::password_reset(to, &code, CODE_TTL_MINUTES));
  } else {
    tracing::debug!("password reset requested for an unknown email");
  }
  Ok(Reply::ok(json!({})).with_reason(REQUEST_ACK))
}

/// `POST /auth/password-reset/verify`: checks the code without consuming it.
pub async fn verify<S>(
  State(state): State<AppState<S>>,
  Body(body): Body<ResetVerify>,
) -> Result<Reply<serde_json::Value>, ApiError>
where
  S: AccessStore + Clone + 'static,
{
  let person = known_person(&state, body.email).await?;
  state
    .call(state.store.verify_reset_code(person.person_id, body.code))
    .await?;
  Ok(Reply::ok(json!({ "valid": true })))
}

/// `POST /auth/password-reset/confirm`
pub async fn confirm<S>(
  State(state): State<AppState<S>>,
  Body(body): Body<ResetConfirm>,
) -> Result<Reply<serde_json::Value>, ApiError>
where
  S: AccessStore + Clone + 'static,
{
  check_password(&body.new_password)?;
  let person = known_person(&state, body.email).await?;
  let hash = hash_password(&body.new_password)?;
  state
    .call(state.store.confirm_password_reset(person.person_id, body.code, hash))
    .await?;
  tracing::info!(person_id = %person.person_id, "password reset");
  Ok(Reply::ok(json!({})).with_reason("password updated"))
}

/// An unknown email has no challenge, and is reported exactly like one.
async fn known_person<S>(state: &AppState<S>, email: String) -> Result<Person, ApiError>
where
  S: AccessStore + Clone + 'static,
{
  state
    .call(state.store.find_by_email(email.trim().to_owned()))
    .await?
    .ok_or(ApiError::Rejected(Rejection::NoActiveChallenge))
}
