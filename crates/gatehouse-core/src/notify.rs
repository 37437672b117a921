//! In-app notifications.
//!
//! Notifications are fan-out copies: one row per recipient, so each person
//! tracks their own read state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use crate::person::Role;

#[derive(
  Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, AsRefStr, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Severity {
  #[default]
  Info,
  Warning,
  Urgent,
}

/// Who receives a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
  Person(Uuid),
  Role(Role),
  Broadcast,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNotification {
  pub severity: Severity,
  pub title:    String,
  pub message:  String,
  pub data:     serde_json::Value,
}

impl NewNotification {
  pub fn new(severity: Severity, title: impl Into<String>, message: impl Into<String>) -> Self {
    Self {
      severity,
      title: title.into(),
      message: message.into(),
      data: serde_json::Value::Null,
    }
  }

  pub fn with_data(mut self, data: serde_json::Value) -> Self {
    self.data = data;
    self
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
  pub notification_id: Uuid,
  pub recipient_id:    Uuid,
  pub severity:        Severity,
  pub title:           String,
  pub message:         String,
  pub data:            serde_json::Value,
  pub created_at:      DateTime<Utc>,
  pub read_at:         Option<DateTime<Utc>>,
}
