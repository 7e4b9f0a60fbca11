use crate::{
    dto::notification_dto::{BroadcastPayload, NotificationQuery},
    error::Result,
    middleware::auth::Claims,
    models::notification::{EventKind, NewNotificationEvent},
    AppState,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use serde_json::json;
use uuid::Uuid;

#[axum::debug_handler]
pub async fn list_notifications(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<NotificationQuery>,
) -> Result<impl IntoResponse> {
    let actor = state.identity_service.resolve_active(claims.actor_id()?).await?;
    let notifications = state
        .notification_service
        .list_for_actor(actor.id, query.unread_only, query.limit)
        .await?;
    Ok(Json(notifications))
}

#[axum::debug_handler]
pub async fn mark_read(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let actor = state.identity_service.resolve_active(claims.actor_id()?).await?;
    let notification = state.notification_service.mark_read(id, actor.id).await?;
    Ok(Json(notification))
}

#[axum::debug_handler]
pub async fn mark_all_read(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse> {
    let actor = state.identity_service.resolve_active(claims.actor_id()?).await?;
    let updated = state.notification_service.mark_all_read(actor.id).await?;
    Ok(Json(json!({ "updated": updated })))
}

#[axum::debug_handler]
pub async fn unread_count(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse> {
    let actor = state.identity_service.resolve_active(claims.actor_id()?).await?;
    let count = state.notification_service.unread_count(actor.id).await?;
    Ok(Json(json!({ "unread": count })))
}

/// Operator broadcast: durable SYSTEM_BROADCAST event for every targeted
/// actor plus an immediate frame to live subscribers.
#[axum::debug_handler]
pub async fn broadcast(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<BroadcastPayload>,
) -> Result<impl IntoResponse> {
    let actor = state.identity_service.resolve_active(claims.actor_id()?).await?;

    let mut event = NewNotificationEvent::new(
        EventKind::SystemBroadcast,
        json!({ "message": payload.message, "level": payload.level }),
    )
    .source(actor.id);
    if let Some(roles) = &payload.roles {
        event = event.roles(roles.clone());
    }
    if let Some(target_ids) = &payload.target_ids {
        event = event.targets(target_ids.clone());
    }
    let event_id = state.notification_service.submit(&event).await?;

    state
        .push_hub
        .broadcast(&payload.message, &payload.level, payload.roles.as_deref());

    Ok((StatusCode::ACCEPTED, Json(json!({ "event_id": event_id }))))
}
