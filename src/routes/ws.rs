use crate::{
    error::Result,
    middleware::auth::Claims,
    models::actor::ActorInfo,
    services::push_hub::{ClientFrame, ServerFrame},
    AppState,
};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
    Extension,
};
use futures::{SinkExt, StreamExt};

pub async fn ws_upgrade(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse> {
    let actor = state.identity_service.resolve_active(claims.actor_id()?).await?;
    Ok(ws.on_upgrade(move |socket| handle_socket(state, actor, socket)))
}

async fn handle_socket(state: AppState, actor: ActorInfo, socket: WebSocket) {
    let (conn_id, mut rx) = state.push_hub.register(&actor);
    state
        .push_hub
        .send_to(conn_id, ServerFrame::ConnectionEstablished { connection_id: conn_id });

    let (mut sink, mut stream) = socket.split();

    // drains the hub's per-connection queue into the socket
    let send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let Ok(text) = serde_json::to_string(&frame) else {
                continue;
            };
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(message)) = stream.next().await {
        match message {
            Message::Text(text) => {
                let frame = match serde_json::from_str::<ClientFrame>(&text) {
                    Ok(frame) => frame,
                    Err(err) => {
                        tracing::debug!(%conn_id, error = %err, "ignoring malformed client frame");
                        continue;
                    }
                };
                if !handle_client_frame(&state, &actor, conn_id, frame).await {
                    break;
                }
            }
            Message::Ping(_) | Message::Pong(_) => state.push_hub.heartbeat(conn_id),
            Message::Close(_) => break,
            Message::Binary(_) => {}
        }
    }

    state.push_hub.unregister(conn_id);
    send_task.abort();
    tracing::debug!(%conn_id, actor = %actor.id, "push subscriber disconnected");
}

/// Returns false when the connection has been dropped by the hub.
async fn handle_client_frame(
    state: &AppState,
    actor: &ActorInfo,
    conn_id: uuid::Uuid,
    frame: ClientFrame,
) -> bool {
    match frame {
        ClientFrame::Ping => {
            state.push_hub.heartbeat(conn_id);
            state.push_hub.send_to(conn_id, ServerFrame::Pong)
        }
        ClientFrame::GetNotifications { unread_only, limit } => {
            let limit = limit.unwrap_or(50).min(50);
            match state
                .notification_service
                .list_for_actor(actor.id, unread_only, Some(limit))
                .await
            {
                Ok(notifications) => state
                    .push_hub
                    .send_to(conn_id, ServerFrame::NotificationsList { notifications }),
                Err(err) => {
                    tracing::error!(%conn_id, error = %err, "failed to load notifications");
                    true
                }
            }
        }
        ClientFrame::MarkRead { id } => {
            if let Err(err) = state.notification_service.mark_read(id, actor.id).await {
                tracing::debug!(%conn_id, notification = %id, error = %err, "mark_read failed");
            }
            match state.notification_service.unread_count(actor.id).await {
                Ok(count) => state
                    .push_hub
                    .send_to(conn_id, ServerFrame::UnreadCount { count }),
                Err(_) => true,
            }
        }
        ClientFrame::GetUnreadCount => {
            match state.notification_service.unread_count(actor.id).await {
                Ok(count) => state
                    .push_hub
                    .send_to(conn_id, ServerFrame::UnreadCount { count }),
                Err(err) => {
                    tracing::error!(%conn_id, error = %err, "failed to count notifications");
                    true
                }
            }
        }
    }
}
