//! Mailer implementations.

use gatehouse_core::mail::{Email, MailFuture, Mailer};

/// Writes outgoing mail to the log instead of delivering it. The message
/// body, which carries reset codes, is only emitted at `debug`.
#[derive(Debug, Clone)]
pub struct LogMailer {
  pub from: String,
}

impl LogMailer {
  pub fn new(from: impl Into<String>) -> Self { Self { from: from.into() } }
}

impl Mailer for LogMailer {
  fn send(&self, email: Email) -> MailFuture<'_> {
    Box::pin(async move {
      tracing::info!(from = %self.from, to = %email.to, subject = %email.subject, "outgoing email");
      tracing::debug!(to = %email.to, body = %email.body, "outgoing email body");
      Ok(())
    })
  }
}
