use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use tracing::{error, warn};
use uuid::Uuid;

use tiwill_types::api::{Claims, NotificationListResponse};

use crate::AppState;

/// The caller's notifications, newest first, with the unread badge count.
/// Fetch failures degrade to an empty list.
pub async fn list_notifications(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let state = state.clone();
    let user_id = claims.sub;

    let response = tokio::task::spawn_blocking(move || {
        let notifications = state.db.list_notifications(user_id).unwrap_or_else(|e| {
            warn!("notification list fetch failed for {}: {}", user_id, e);
            Vec::new()
        });
        let unread_count = state.db.unread_notification_count(user_id).unwrap_or(0);
        NotificationListResponse {
            notifications,
            unread_count,
        }
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    Ok(Json(response))
}

/// Recipient-only, one-way read marking. Marking someone else's
/// notification (or one already read) changes nothing and still returns
/// 204 — denial and no-op are indistinguishable.
pub async fn mark_notification_read(
    State(state): State<AppState>,
    Path(notification_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let state = state.clone();
    let user_id = claims.sub;

    tokio::task::spawn_blocking(move || {
        if let Err(e) = state.db.mark_notification_read(notification_id, user_id, Utc::now()) {
            warn!("notification read-marking failed for {}: {}", notification_id, e);
        }
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    Ok(StatusCode::NO_CONTENT)
}
