use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use tracing::error;

use tiwill_types::api::{Claims, RegisterPushRequest, VapidKeyResponse};
use tiwill_types::models::PushSubscription;

use crate::AppState;

/// Register (or re-register) a device's push subscription. Upsert keyed
/// by endpoint, so repeated grants from the same browser are idempotent
/// and a user can hold one row per device.
pub async fn register_subscription(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<RegisterPushRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let state = state.clone();
    let sub = PushSubscription {
        user_id: claims.sub,
        endpoint: req.endpoint,
        p256dh: req.p256dh,
        auth: req.auth,
    };

    tokio::task::spawn_blocking(move || state.db.upsert_push_subscription(&sub))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(StatusCode::CREATED)
}

/// The VAPID public key clients need to subscribe with the push service.
/// Build-time server config, never user-supplied.
pub async fn vapid_key(State(state): State<AppState>) -> impl IntoResponse {
    Json(VapidKeyResponse {
        public_key: state.vapid_public_key.clone(),
    })
}
