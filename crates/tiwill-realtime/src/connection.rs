use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tracing::{info, warn};
use uuid::Uuid;

use tiwill_db::Database;
use tiwill_types::api::Claims;
use tiwill_types::events::{GatewayCommand, GatewayEvent};
use tiwill_types::models::{PresenceRecord, PresenceScope};

use crate::advisory::advisory;
use crate::dispatcher::Dispatcher;
use crate::presence::PresenceTracker;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Handle a single WebSocket connection: Identify handshake, Ready, then
/// the event loop. Presence for this user lives exactly as long as the
/// connection.
pub async fn handle_connection(
    socket: WebSocket,
    db: Arc<Database>,
    dispatcher: Dispatcher,
    tracker: PresenceTracker,
    jwt_secret: String,
) {
    let (mut sender, mut receiver) = socket.split();

    let (user_id, display_name) = match wait_for_identify(&mut receiver, &jwt_secret).await {
        Some(identity) => identity,
        None => {
            warn!("WebSocket client failed to identify, closing");
            return;
        }
    };

    info!("{} ({}) connected to gateway", display_name, user_id);

    let ready = GatewayEvent::Ready {
        user_id,
        display_name: display_name.clone(),
    };
    if send_event(&mut sender, &ready).await.is_err() {
        return;
    }

    // Register the targeted channel, then bring the client up to date with
    // the authoritative global presence snapshot before going online.
    let (conn_id, mut user_rx) = dispatcher.register_user_channel(user_id).await;

    let sync = tracker.sync_event(PresenceScope::Global).await;
    if send_event(&mut sender, &sync).await.is_err() {
        dispatcher.unregister_user_channel(user_id, conn_id).await;
        return;
    }

    tracker
        .track(
            PresenceScope::Global,
            PresenceRecord::online(user_id, display_name.clone()),
        )
        .await;

    let mut broadcast_rx = dispatcher.subscribe();
    let dispatcher_recv = dispatcher.clone();
    let tracker_recv = tracker.clone();

    // Per-connection conversation subscriptions, shared between tasks.
    let subscribed: Arc<std::sync::RwLock<HashSet<Uuid>>> =
        Arc::new(std::sync::RwLock::new(HashSet::new()));
    let send_subscriptions = subscribed.clone();

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward broadcasts + targeted events to the client, with heartbeat.
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                result = broadcast_rx.recv() => {
                    let event = match result {
                        Ok(event) => event,
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            warn!("Broadcast receiver lagged by {} events", n);
                            continue;
                        }
                        Err(_) => break,
                    };

                    // Recipient-scoped events only go to their recipient.
                    if let Some(recipient) = event.recipient_id() {
                        if recipient != user_id {
                            continue;
                        }
                    }

                    // Conversation-scoped events only go to subscribers.
                    if let Some(conversation_id) = event.conversation_id() {
                        let subs = send_subscriptions.read()
                            .expect("subscription lock poisoned");
                        if !subs.contains(&conversation_id) {
                            continue;
                        }
                    }

                    if send_event(&mut sender, &event).await.is_err() {
                        break;
                    }
                }
                result = user_rx.recv() => {
                    let event = match result {
                        Some(event) => event,
                        None => break,
                    };
                    if send_event(&mut sender, &event).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(WsMessage::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read commands from the client.
    let db_recv = db.clone();
    let display_name_recv = display_name.clone();
    let recv_subscriptions = subscribed.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                WsMessage::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                    Ok(cmd) => {
                        handle_command(
                            &db_recv,
                            &dispatcher_recv,
                            &tracker_recv,
                            user_id,
                            &display_name_recv,
                            cmd,
                            &recv_subscriptions,
                        )
                        .await;
                    }
                    Err(e) => {
                        warn!(
                            "{} ({}) bad command: {} -- raw: {}",
                            display_name_recv,
                            user_id,
                            e,
                            &text[..text.len().min(200)]
                        );
                    }
                },
                WsMessage::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                WsMessage::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    // Presence cleanup is transport-driven: if a newer connection has
    // taken over for this user, leave its presence alone.
    if dispatcher.owns_user_channel(user_id, conn_id).await {
        tracker.disconnect(user_id).await;
    }
    dispatcher.unregister_user_channel(user_id, conn_id).await;

    info!("{} ({}) disconnected from gateway", display_name, user_id);
}

async fn send_event(
    sender: &mut futures_util::stream::SplitSink<WebSocket, WsMessage>,
    event: &GatewayEvent,
) -> Result<(), axum::Error> {
    let text = serde_json::to_string(event).map_err(axum::Error::new)?;
    sender.send(WsMessage::Text(text.into())).await
}

async fn wait_for_identify(
    receiver: &mut futures_util::stream::SplitStream<WebSocket>,
    jwt_secret: &str,
) -> Option<(Uuid, String)> {
    use jsonwebtoken::{DecodingKey, Validation, decode};

    let timeout = tokio::time::timeout(Duration::from_secs(10), async {
        while let Some(Ok(msg)) = receiver.next().await {
            if let WsMessage::Text(text) = msg {
                if let Ok(GatewayCommand::Identify { token }) =
                    serde_json::from_str::<GatewayCommand>(&text)
                {
                    let token_data = decode::<Claims>(
                        &token,
                        &DecodingKey::from_secret(jwt_secret.as_bytes()),
                        &Validation::default(),
                    )
                    .ok()?;

                    return Some((token_data.claims.sub, token_data.claims.display_name));
                }
            }
        }
        None
    });

    timeout.await.ok().flatten()
}

async fn handle_command(
    db: &Arc<Database>,
    dispatcher: &Dispatcher,
    tracker: &PresenceTracker,
    user_id: Uuid,
    display_name: &str,
    cmd: GatewayCommand,
    subscriptions: &Arc<std::sync::RwLock<HashSet<Uuid>>>,
) {
    match cmd {
        GatewayCommand::Identify { .. } => {} // Already handled

        GatewayCommand::Subscribe { conversation_ids } => {
            // Membership is checked here, not just on the REST path: a
            // conversation id the user does not belong to is dropped
            // silently, same as an empty lookup elsewhere.
            let db = db.clone();
            let permitted: Vec<Uuid> = advisory(
                "subscription membership check",
                tokio::task::spawn_blocking(move || {
                    conversation_ids
                        .into_iter()
                        .filter(|id| {
                            advisory("participant check", db.is_participant(*id, user_id))
                                .unwrap_or(false)
                        })
                        .collect()
                })
                .await,
            )
            .unwrap_or_default();

            info!(
                "{} ({}) subscribing to {} conversations",
                display_name,
                user_id,
                permitted.len()
            );
            {
                let mut subs = subscriptions.write().expect("subscription lock poisoned");
                *subs = permitted.iter().copied().collect();
            }
            // Each freshly subscribed scope starts from an authoritative
            // snapshot; deltas follow over the broadcast.
            for conversation_id in permitted {
                let sync = tracker
                    .sync_event(PresenceScope::Conversation(conversation_id))
                    .await;
                dispatcher.send_to_user(user_id, sync).await;
            }
        }

        GatewayCommand::Track { scope, record } => {
            // Presence is owned by its user; a record published for someone
            // else is dropped.
            if record.user_id != user_id {
                warn!(
                    "{} ({}) tried to track presence for {}",
                    display_name, user_id, record.user_id
                );
                return;
            }
            tracker.track(scope, record).await;
        }

        GatewayCommand::Untrack { scope } => {
            tracker.untrack(scope, user_id).await;
        }
    }
}
