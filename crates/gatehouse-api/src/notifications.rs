//! Handlers for `/notifications`. Every person sees only their own.

use axum::extract::State;
use gatehouse_core::store::AccessStore;
use serde_json::json;
use uuid::Uuid;

use crate::{AppState, Reply, auth::Actor, error::ApiError, extract::Segment};

/// `GET /notifications`, newest first.
pub async fn list<S>(
  State(state): State<AppState<S>>,
  Actor(actor): Actor,
) -> Result<Reply<serde_json::Value>, ApiError>
where
  S: AccessStore + Clone + 'static,
{
  let notifications = state
    .call(state.store.list_notifications(actor.person_id))
    .await?;
  let unread = notifications.iter().filter(|n| n.read_at.is_none()).count();
  Ok(Reply::ok(json!({ "notifications": notifications, "unread": unread })))
}

/// `POST /notifications/{id}/read`. Someone else's notification is reported
/// as not found.
pub async fn mark_read<S>(
  State(state): State<AppState<S>>,
  Actor(actor): Actor,
  Segment(id): Segment<Uuid>,
) -> Result<Reply<serde_json::Value>, ApiError>
where
  S: AccessStore + Clone + 'static,
{
  let notification = state
    .call(state.store.mark_notification_read(actor.person_id, id))
    .await?;
  Ok(Reply::ok(json!({ "notification": notification })))
}
