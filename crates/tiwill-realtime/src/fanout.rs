//! Cross-conversation notification fan-out.
//!
//! One global subscription catches notification events for the current
//! user across every thread, instead of N per-conversation subscriptions.
//! Each event runs a fixed decision pipeline: self-filter, participant
//! authorization, viewing suppression, display-name enrichment, dispatch.

use std::sync::{Arc, RwLock};

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::warn;
use uuid::Uuid;

use tiwill_db::Database;
use tiwill_types::events::GatewayEvent;
use tiwill_types::models::NotificationKind;

use crate::error::RealtimeError;
use crate::names::DisplayNameCache;

/// Where the viewer currently is. Drives suppression: a message for the
/// conversation being viewed renders organically through the live channel
/// and must not also toast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Feed,
    Chat(Uuid),
    Elsewhere,
}

/// Shared, cheaply updatable route state.
#[derive(Clone)]
pub struct RouteState(Arc<RwLock<Route>>);

impl RouteState {
    pub fn new(route: Route) -> Self {
        Self(Arc::new(RwLock::new(route)))
    }

    pub fn set(&self, route: Route) {
        if let Ok(mut guard) = self.0.write() {
            *guard = route;
        }
    }

    pub fn get(&self) -> Route {
        self.0.read().map(|r| *r).unwrap_or(Route::Elsewhere)
    }
}

/// The surfaces a decided notification lands on. The in-app toast and the
/// platform-level background notification are side effects behind this
/// trait so the pipeline is testable without any UI.
pub trait AlertSurface: Send + Sync {
    fn toast(&self, title: &str, body: &str);
    fn background_notify(&self, title: &str, body: &str, payload: &serde_json::Value);
    /// Whether the application surface is currently in the foreground.
    fn is_visible(&self) -> bool;
}

/// What the pipeline decided for one event. Returned for observability and
/// tests; the side effects have already run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FanoutOutcome {
    /// Not a notification event, or not addressed to this user.
    Ignored,
    /// The viewer caused the event themselves.
    DroppedSelf,
    /// Not a participant of the target conversation. Indistinguishable
    /// from "no such conversation"; dropped silently either way.
    DroppedUnauthorized,
    /// Viewer is already looking at that conversation.
    SuppressedViewing,
    /// Foreground: toast only, no double-alerting.
    Toasted,
    /// Backgrounded: toast plus platform notification.
    ToastedAndNotified,
}

pub struct NotificationFanout<S: AlertSurface> {
    db: Arc<Database>,
    user_id: Uuid,
    route: RouteState,
    names: DisplayNameCache,
    surface: S,
}

impl<S: AlertSurface> NotificationFanout<S> {
    pub fn new(db: Arc<Database>, user_id: Uuid, route: RouteState, surface: S) -> Self {
        let names = DisplayNameCache::new(db.clone());
        Self {
            db,
            user_id,
            route,
            names,
            surface,
        }
    }

    /// Run one event through the pipeline. No deduplication beyond what
    /// the transport guarantees: a burst of messages is a burst of toasts.
    pub fn handle_event(&self, event: &GatewayEvent) -> Result<FanoutOutcome, RealtimeError> {
        let GatewayEvent::NotificationCreate {
            recipient_id,
            actor_id,
            kind,
            title,
            body,
            payload,
            ..
        } = event
        else {
            return Ok(FanoutOutcome::Ignored);
        };

        if *recipient_id != self.user_id {
            return Ok(FanoutOutcome::Ignored);
        }
        if *actor_id == self.user_id {
            return Ok(FanoutOutcome::DroppedSelf);
        }

        let conversation_id = payload
            .get("conversation_id")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse::<Uuid>().ok());

        // Participant check for conversation-bound events. An unauthorized
        // lookup comes back empty rather than erroring, by design.
        if let Some(conversation_id) = conversation_id {
            if !self.db.is_participant(conversation_id, self.user_id)? {
                return Ok(FanoutOutcome::DroppedUnauthorized);
            }

            if self.route.get() == Route::Chat(conversation_id) {
                return Ok(FanoutOutcome::SuppressedViewing);
            }
        }

        let title = if title.is_empty() && *kind == NotificationKind::Message {
            format!("New message from {}", self.names.resolve(*actor_id))
        } else {
            title.clone()
        };

        self.surface.toast(&title, body);
        if self.surface.is_visible() {
            Ok(FanoutOutcome::Toasted)
        } else {
            self.surface.background_notify(&title, body, payload);
            Ok(FanoutOutcome::ToastedAndNotified)
        }
    }

    /// Consume a broadcast receiver until it closes. A failing or lagging
    /// event never takes the subscription down with it.
    pub fn spawn(self, mut rx: broadcast::Receiver<GatewayEvent>) -> JoinHandle<()>
    where
        S: 'static,
    {
        tokio::spawn(async move {
            loop {
                let event = match rx.recv().await {
                    Ok(event) => event,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("notification fan-out lagged by {} events", n);
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };

                if let Err(e) = self.handle_event(&event) {
                    warn!("notification handler failed: {}", e);
                }
            }
        })
    }
}
