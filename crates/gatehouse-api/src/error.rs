//! API error type and [`axum::response::IntoResponse`] implementation.
//!
//! Every failure renders the same envelope as a success, with
//! `"allowed": false`, the human-readable `reason`, and a stable `kind`.

use axum::{
  Json,
  extract::rejection::{JsonRejection, PathRejection, QueryRejection},
  http::{StatusCode, header},
  response::{IntoResponse, Response},
};
use gatehouse_core::{Rejection, store::StoreError};
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error(transparent)]
  Rejected(#[from] Rejection),

  #[error("authentication required")]
  Unauthorized,

  #[error("bad request: {0}")]
  BadRequest(String),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),

  /// The store keeps working on a call after its deadline, so a write may
  /// still commit.
  #[error("the store did not answer in time; the request may still have been applied")]
  Timeout,

  #[error("password hashing failed: {0}")]
  Hash(String),
}

impl ApiError {
  /// Split a backend error into a business rejection or a fault.
  pub fn from_store<E: StoreError>(err: E) -> Self {
    match err.into_rejection() {
      Ok(rejection) => Self::Rejected(rejection),
      Err(fault) => Self::Store(Box::new(fault)),
    }
  }

  pub fn status(&self) -> StatusCode {
    match self {
      Self::Rejected(r) => rejection_status(r),
      Self::Unauthorized => StatusCode::UNAUTHORIZED,
      Self::BadRequest(_) => StatusCode::BAD_REQUEST,
      Self::Store(_) | Self::Hash(_) => StatusCode::INTERNAL_SERVER_ERROR,
      Self::Timeout => StatusCode::SERVICE_UNAVAILABLE,
    }
  }

  pub fn kind(&self) -> &'static str {
    match self {
      Self::Rejected(r) => r.code(),
      Self::Unauthorized => "unauthorized",
      Self::BadRequest(_) => "bad_request",
      Self::Store(_) | Self::Hash(_) => "internal",
      Self::Timeout => "timeout",
    }
  }
}

/// Fixed status per rejection kind.
pub fn rejection_status(rejection: &Rejection) -> StatusCode {
  use Rejection::*;
  match rejection {
    Validation { .. } | NoActiveChallenge | InvalidCode => StatusCode::BAD_REQUEST,
    Forbidden | SubjectBlocked => StatusCode::FORBIDDEN,
    NotFound(_) => StatusCode::NOT_FOUND,
    NoActiveShift
    | ExitWithoutEntry
    | DuplicateDirection(_)
    | InvalidLastEvent
    | EquipmentAlreadyCheckedIn(_)
    | EquipmentMismatch
    | AlreadyActive(_)
    | AlreadyClosed(_) => StatusCode::CONFLICT,
    Expired => StatusCode::GONE,
    InvalidSubjectRole | EquipmentInvalid { .. } => StatusCode::UNPROCESSABLE_ENTITY,
    TooManyAttempts => StatusCode::TOO_MANY_REQUESTS,
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = self.status();
    let reason = match &self {
      ApiError::Store(e) => {
        tracing::error!(error = %e, "store fault");
        "internal server error".to_owned()
      }
      ApiError::Hash(e) => {
        tracing::error!(error = %e, "password hashing failed");
        "internal server error".to_owned()
      }
      ApiError::Timeout => {
        tracing::warn!("store call timed out");
        self.to_string()
      }
      other => other.to_string(),
    };

    let mut body = json!({
      "allowed": false,
      "reason":  reason,
      "kind":    self.kind(),
    });
    if let ApiError::Rejected(Rejection::Validation { fields, .. }) = &self
      && !fields.is_empty()
    {
      body["errors"] = json!(fields);
    }

    let mut response = (status, Json(body)).into_response();
    if matches!(self, ApiError::Unauthorized) {
      response.headers_mut().insert(
        header::WWW_AUTHENTICATE,
        header::HeaderValue::from_static(r#"Basic realm="gatehouse""#),
      );
    }
    response
  }
}

impl From<JsonRejection> for ApiError {
  fn from(rejection: JsonRejection) -> Self { Self::BadRequest(rejection.body_text()) }
}

impl From<QueryRejection> for ApiError {
  fn from(rejection: QueryRejection) -> Self { Self::BadRequest(rejection.body_text()) }
}

impl From<PathRejection> for ApiError {
  fn from(rejection: PathRejection) -> Self { Self::BadRequest(rejection.body_text()) }
}
