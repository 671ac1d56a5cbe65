use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use tracing::{error, warn};
use uuid::Uuid;

use tiwill_realtime::advisory::advisory;
use tiwill_realtime::channel::send_message;
use tiwill_realtime::error::RealtimeError;
use tiwill_types::api::{Claims, MarkReadResponse, SendMessageRequest, SendMessageResponse};
use tiwill_types::events::GatewayEvent;
use tiwill_types::models::{Message, Notification, NotificationKind};

use crate::AppState;

/// Full history, ascending by creation time. Viewing doubles as the
/// read-marking trigger, so every refresh re-issues the (idempotent)
/// mark-read write.
///
/// A caller who is not a participant gets an empty list — access denial
/// and "no data" are indistinguishable on purpose.
pub async fn get_messages(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let state = state.clone();
    let user_id = claims.sub;

    let messages = tokio::task::spawn_blocking(move || -> Vec<Message> {
        match state.db.is_participant(conversation_id, user_id) {
            Ok(true) => {}
            Ok(false) => return Vec::new(),
            Err(e) => {
                warn!("participant check failed for {}: {}", conversation_id, e);
                return Vec::new();
            }
        }

        advisory(
            "view-triggered mark read",
            state.db.mark_read(conversation_id, user_id, Utc::now()),
        );

        match state.db.get_messages(conversation_id) {
            Ok(messages) => messages,
            Err(e) => {
                warn!("history fetch failed for {}: {}", conversation_id, e);
                Vec::new()
            }
        }
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    Ok(Json(messages))
}

/// The one must-succeed write: a failed insert is reported to the caller
/// so the UI can show "failed to send". There is no local echo anywhere;
/// the message becomes visible through its own insert event.
pub async fn send_message_handler(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let sender_id = claims.sub;

    let state_send = state.clone();
    let message = tokio::task::spawn_blocking(move || -> Result<Message, StatusCode> {
        let participant = state_send
            .db
            .is_participant(conversation_id, sender_id)
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        if !participant {
            return Err(StatusCode::NOT_FOUND);
        }

        send_message(
            &state_send.db,
            &state_send.dispatcher,
            conversation_id,
            sender_id,
            &req.content,
        )
        .map_err(|e| match e {
            RealtimeError::EmptyMessage => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        })
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })??;

    notify_recipient(&state, &message).await;

    Ok((
        StatusCode::CREATED,
        Json(SendMessageResponse {
            id: message.id,
            conversation_id: message.conversation_id,
            created_at: message.created_at,
        }),
    ))
}

/// Server-side trigger: a message insert creates a notification row for
/// the other participant and fans the event out. Advisory — a failure
/// here never fails the send.
async fn notify_recipient(state: &AppState, message: &Message) {
    let state = state.clone();
    let message = message.clone();

    let created = tokio::task::spawn_blocking(move || -> Option<Notification> {
        let recipient_id =
            advisory(
                "resolve peer",
                state.db.peer_of(message.conversation_id, message.sender_id),
            )
            .flatten()?;

        let notification = Notification {
            id: Uuid::new_v4(),
            recipient_id,
            kind: NotificationKind::Message,
            // Empty title: the fan-out enriches it with the sender's name.
            title: String::new(),
            body: message.content.clone(),
            payload: serde_json::json!({
                "type": "message",
                "conversation_id": message.conversation_id.to_string(),
            }),
            read_at: None,
            created_at: message.created_at,
        };

        advisory(
            "insert notification",
            state.db.insert_notification(&notification),
        )?;

        let event = GatewayEvent::NotificationCreate {
            id: notification.id,
            recipient_id,
            actor_id: message.sender_id,
            kind: notification.kind,
            title: notification.title.clone(),
            body: notification.body.clone(),
            payload: notification.payload.clone(),
            created_at: notification.created_at,
        };
        state.dispatcher.broadcast(event);

        Some(notification)
    })
    .await;

    if let Err(e) = created {
        warn!("notification trigger panicked: {}", e);
    }
}

/// Explicit mark-read endpoint for list views that don't load history.
/// Fire-and-forget semantics surfaced with a count for observability.
pub async fn mark_read(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let state = state.clone();
    let user_id = claims.sub;

    let marked = tokio::task::spawn_blocking(move || {
        match state.db.is_participant(conversation_id, user_id) {
            Ok(true) => advisory(
                "mark read",
                state.db.mark_read(conversation_id, user_id, Utc::now()),
            )
            .unwrap_or(0),
            _ => 0,
        }
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    Ok(Json(MarkReadResponse { marked }))
}
