use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use tiwill_api::middleware::require_auth;
use tiwill_api::{AppState, AppStateInner, conversations, messages, notifications, push};
use tiwill_realtime::connection;
use tiwill_realtime::dispatcher::Dispatcher;
use tiwill_realtime::presence::PresenceTracker;

#[derive(Clone)]
struct ServerState {
    db: Arc<tiwill_db::Database>,
    dispatcher: Dispatcher,
    tracker: PresenceTracker,
    jwt_secret: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tiwill=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let jwt_secret =
        std::env::var("TIWILL_JWT_SECRET").unwrap_or_else(|_| "dev-secret-change-me".into());
    let db_path = std::env::var("TIWILL_DB_PATH").unwrap_or_else(|_| "tiwill.db".into());
    let host = std::env::var("TIWILL_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("TIWILL_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;
    let vapid_public_key = std::env::var("TIWILL_VAPID_PUBLIC_KEY").unwrap_or_default();

    // Init database
    let db = Arc::new(tiwill_db::Database::open(&PathBuf::from(&db_path))?);

    // Shared state
    let dispatcher = Dispatcher::new();
    let tracker = PresenceTracker::new(dispatcher.clone());
    let app_state: AppState = Arc::new(AppStateInner::new(
        db.clone(),
        dispatcher.clone(),
        jwt_secret.clone(),
        vapid_public_key,
    ));

    let state = ServerState {
        db,
        dispatcher,
        tracker,
        jwt_secret,
    };

    // Routes
    let public_routes = Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/push/vapid-key", get(push::vapid_key))
        .with_state(app_state.clone());

    let protected_routes = Router::new()
        .route("/conversations", get(conversations::list_conversations))
        .route("/conversations", post(conversations::create_or_get_conversation))
        .route("/conversations/{conversation_id}/messages", get(messages::get_messages))
        .route("/conversations/{conversation_id}/messages", post(messages::send_message_handler))
        .route("/conversations/{conversation_id}/read", post(messages::mark_read))
        .route("/notifications", get(notifications::list_notifications))
        .route("/notifications/{notification_id}/read", post(notifications::mark_notification_read))
        .route("/push/subscriptions", post(push::register_subscription))
        .layer(middleware::from_fn(require_auth))
        .with_state(app_state);

    let ws_route = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(state);

    let app = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("TiWill realtime server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn ws_upgrade(
    State(state): State<ServerState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| {
        connection::handle_connection(
            socket,
            state.db,
            state.dispatcher,
            state.tracker,
            state.jwt_secret,
        )
    })
}
