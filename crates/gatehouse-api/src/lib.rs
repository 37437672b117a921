//! JSON REST API for Gatehouse.
//!
//! Exposes an axum [`Router`] backed by any
//! [`gatehouse_core::store::AccessStore`]. Requests authenticate with HTTP
//! Basic credentials checked against the store; TLS and transport concerns
//! are the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! let app = gatehouse_api::router(state).layer(TraceLayer::new_for_http());
//! ```

pub mod access;
pub mod auth;
pub mod equipment;
pub mod error;
pub mod extract;
pub mod mail;
pub mod notifications;
pub mod password_reset;
pub mod persons;
pub mod shifts;


use std::{future::Future, sync::Arc, time::Duration};

use axum::{
  Json, Router,
  http::StatusCode,
  response::{IntoResponse, Response},
  routing::{get, post},
};
use gatehouse_core::{
  mail::{Email, Mailer},
  notify::{Audience, NewNotification},
  store::{AccessStore, StoreError},
};
use serde::Serialize;

pub use error::ApiError;

// ─── State ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ApiConfig {
  /// Upper bound on every store call made by a handler.
  pub store_timeout: Duration,
  /// Upper bound on one email delivery.
  pub mail_timeout:  Duration,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      store_timeout: Duration::from_secs(5),
      mail_timeout:  Duration::from_secs(10),
    }
  }
}

/// Shared application state threaded through all handlers.
#[derive(Clone)]
pub struct AppState<S> {
  pub store:  Arc<S>,
  pub mailer: Arc<dyn Mailer>,
  pub config: Arc<ApiConfig>,
}

impl<S: AccessStore + 'static> AppState<S> {
  pub fn new(store: S, mailer: Arc<dyn Mailer>, config: ApiConfig) -> Self {
    Self { store: Arc::new(store), mailer, config: Arc::new(config) }
  }

  /// Await a store call under the configured timeout. A call that times out
  /// keeps running on the store and may still commit.
  pub async fn call<T, E: StoreError>(
    &self,
    fut: impl Future<Output = Result<T, E>>,
  ) -> Result<T, ApiError> {
    match tokio::time::timeout(self.config.store_timeout, fut).await {
      Ok(Ok(value)) => Ok(value),
      Ok(Err(err)) => Err(ApiError::from_store(err)),
      Err(_) => Err(ApiError::Timeout),
    }
  }

  /// Fan a notification out in the background. Failures are logged and
  /// never reach the request that triggered them.
  pub fn notify_later(&self, audience: Audience, note: NewNotification) {
    let store = self.store.clone();
    let timeout = self.config.store_timeout;
    tokio::spawn(async move {
      match tokio::time::timeout(timeout, store.notify(audience, note)).await {
        Ok(Ok(recipients)) => tracing::debug!(?audience, recipients, "notification delivered"),
        Ok(Err(e)) => tracing::warn!(?audience, error = %e, "notification failed"),
        Err(_) => tracing::warn!(?audience, "notification timed out"),
      }
    });
  }

  /// Send an email in the background, bounded by the mail timeout.
  pub fn mail_later(&self, email: Email) {
    let mailer = self.mailer.clone();
    let timeout = self.config.mail_timeout;
    tokio::spawn(async move {
      let to = email.to.clone();
      match tokio::time::timeout(timeout, mailer.send(email)).await {
        Ok(Ok(())) => tracing::debug!(%to, "email sent"),
        Ok(Err(e)) => tracing::warn!(%to, error = %e, "email delivery failed"),
        Err(_) => tracing::warn!(%to, "email delivery timed out"),
      }
    });
  }
}

// ─── Envelope ────────────────────────────────────────────────────────────────

/// Successful response body: `{ "allowed": true, "reason": null, ...payload }`.
///
/// `payload` must serialize as a map so its fields can be flattened.
#[derive(Debug, Serialize)]
pub struct Reply<T> {
  allowed: bool,
  reason:  Option<String>,
  #[serde(flatten)]
  payload: T,
  #[serde(skip)]
  status:  StatusCode,
}

impl<T: Serialize> Reply<T> {
  pub fn ok(payload: T) -> Self {
    Self { allowed: true, reason: None, payload, status: StatusCode::OK }
  }

  pub fn created(payload: T) -> Self {
    Self { status: StatusCode::CREATED, ..Self::ok(payload) }
  }

  pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
    self.reason = Some(reason.into());
    self
  }
}

impl<T: Serialize> IntoResponse for Reply<T> {
  fn into_response(self) -> Response { (self.status, Json(self)).into_response() }
}

// ─── Router ──────────────────────────────────────────────────────────────────

/// Build the full router, mounted under `/api`.
pub fn router<S>(state: AppState<S>) -> Router<()>
where
  S: AccessStore + Clone + 'static,
{
  Router::new().nest("/api", api_routes::<S>()).with_state(state)
}

fn api_routes<S>() -> Router<AppState<S>>
where
  S: AccessStore + Clone + 'static,
{
  Router::new()
    // Identity
    .route("/me", get(persons::me::<S>))
    .route("/persons", get(persons::list::<S>).post(persons::create::<S>))
    .route("/persons/{id}", get(persons::get_one::<S>).patch(persons::update::<S>))
    // Equipment
    .route("/equipment", get(equipment::list::<S>).post(equipment::submit::<S>))
    .route("/equipment/{id}", get(equipment::get_one::<S>))
    .route("/equipment/{id}/review", post(equipment::review::<S>))
    // Shifts
    .route("/shifts", get(shifts::list::<S>))
    .route("/shifts/start", post(shifts::start::<S>))
    .route("/shifts/end", post(shifts::end::<S>))
    .route("/shifts/current", get(shifts::current::<S>))
    .route("/shifts/{id}/summary", get(shifts::summary::<S>))
    .route("/shifts/{id}/force-end", post(shifts::force_end::<S>))
    // Access ledger
    .route("/access-events", get(access::list::<S>).post(access::register::<S>))
    .route("/access-events/validate-by-document", post(access::validate_by_document::<S>))
    .route("/access-events/register-by-document", post(access::register_by_document::<S>))
    .route("/access-events/my-history", get(access::my_history::<S>))
    .route("/access-events/my-status", get(access::my_status::<S>))
    .route("/access-events/stats", get(access::stats::<S>))
    // Notifications
    .route("/notifications", get(notifications::list::<S>))
    .route("/notifications/{id}/read", post(notifications::mark_read::<S>))
    // Password reset
    .route("/auth/password-reset/request", post(password_reset::request::<S>))
    .route("/auth/password-reset/verify", post(password_reset::verify::<S>))
    .route("/auth/password-reset/confirm", post(password_reset::confirm::<S>))
}
