//! Error type for `gatehouse-store-sqlite`.

use gatehouse_core::{Rejection, store::StoreError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// A business rule refused the operation; nothing was written.
  #[error(transparent)]
  Rejected(#[from] Rejection),

  #[error("sqlite error: {0}")]
  Sqlite(#[from] rusqlite::Error),

  #[error("database error: {0}")]
  Database(tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("decode error: {0}")]
  Decode(String),
}

impl From<tokio_rusqlite::Error> for Error {
  /// Closures on the connection thread smuggle our own errors out through
  /// `Other`; unwrap them here so rejections keep their identity.
  fn from(err: tokio_rusqlite::Error) -> Self {
    match err {
      tokio_rusqlite::Error::Rusqlite(e) => Self::Sqlite(e),
      tokio_rusqlite::Error::Other(inner) => match inner.downcast::<Error>() {
        Ok(ours) => *ours,
        Err(other) => Self::Database(tokio_rusqlite::Error::Other(other)),
      },
      other => Self::Database(other),
    }
  }
}

impl StoreError for Error {
  fn into_rejection(self) -> std::result::Result<Rejection, Self> {
    match self {
      Self::Rejected(rejection) => Ok(rejection),
      other => Err(other),
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
