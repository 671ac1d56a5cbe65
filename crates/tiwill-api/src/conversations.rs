use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use tracing::error;

use tiwill_realtime::error::RealtimeError;
use tiwill_types::api::{Claims, CreateConversationRequest, CreateConversationResponse};

use crate::AppState;

/// List the caller's conversations, newest activity first, enriched with
/// peer profile, last message and unread count. Degrades to an empty list
/// on failure instead of erroring into the UI.
pub async fn list_conversations(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let state = state.clone();
    let user_id = claims.sub;

    let summaries = tokio::task::spawn_blocking(move || state.store.list(user_id))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    Ok(Json(summaries))
}

/// Idempotent find-or-create: both users, in any call order, converge on
/// one conversation id.
pub async fn create_or_get_conversation(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateConversationRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let state = state.clone();
    let user_id = claims.sub;

    let conversation_id =
        tokio::task::spawn_blocking(move || state.store.create_or_get(user_id, req.other_user_id))
            .await
            .map_err(|e| {
                error!("spawn_blocking join error: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            })?
            .map_err(|e| match e {
                RealtimeError::SelfConversation => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            })?;

    Ok((
        StatusCode::CREATED,
        Json(CreateConversationResponse { conversation_id }),
    ))
}
