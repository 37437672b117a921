//! Outbound email seam.
//!
//! Delivery is best effort: callers spawn the send, bound it with a timeout,
//! and only log the outcome.

use std::{future::Future, pin::Pin};

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Email {
  pub to:      String,
  pub subject: String,
  pub body:    String,
}

impl Email {
  /// The message carrying a password-reset code.
  pub fn password_reset(to: impl Into<String>, code: &str, ttl_minutes: i64) -> Self {
    Self {
      to:      to.into(),
      subject: "Password reset code".to_owned(),
      body:    format!(
        "Your password reset code is {code}.\n\nIt expires in {ttl_minutes} minutes. \
         If you did not ask for it, ignore this message."
      ),
    }
  }
}

pub type MailFuture<'a> =
  Pin<Box<dyn Future<Output = Result<(), Box<dyn std::error::Error + Send + Sync>>> + Send + 'a>>;

/// Something that can deliver an [`Email`].
///
/// Object-safe so the API can hold an `Arc<dyn Mailer>` chosen at startup.
pub trait Mailer: Send + Sync {
  fn send(&self, email: Email) -> MailFuture<'_>;
}
