use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{NotificationKind, PresenceRecord, PresenceScope};

/// Events sent over the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms successful authentication
    Ready { user_id: Uuid, display_name: String },

    /// A new message row was inserted into a conversation
    MessageCreate {
        id: Uuid,
        conversation_id: Uuid,
        sender_id: Uuid,
        content: String,
        created_at: DateTime<Utc>,
    },

    /// Authoritative full membership snapshot for a presence scope.
    /// Replaces any local set wholesale.
    PresenceSync {
        scope: PresenceScope,
        records: Vec<PresenceRecord>,
    },

    /// A user joined a presence scope, or replaced their tracked record
    PresenceJoin {
        scope: PresenceScope,
        record: PresenceRecord,
    },

    /// A user left a presence scope (explicitly or by disconnecting)
    PresenceLeave { scope: PresenceScope, user_id: Uuid },

    /// A notification row was created for a recipient
    NotificationCreate {
        id: Uuid,
        recipient_id: Uuid,
        actor_id: Uuid,
        kind: NotificationKind,
        title: String,
        body: String,
        payload: serde_json::Value,
        created_at: DateTime<Utc>,
    },
}

impl GatewayEvent {
    /// Returns the conversation id if this event is scoped to one
    /// conversation. Events that return `None` are global and are delivered
    /// to every authenticated client (notifications are further narrowed to
    /// their recipient at the connection layer).
    pub fn conversation_id(&self) -> Option<Uuid> {
        match self {
            Self::MessageCreate { conversation_id, .. } => Some(*conversation_id),
            Self::PresenceSync { scope, .. }
            | Self::PresenceJoin { scope, .. }
            | Self::PresenceLeave { scope, .. } => match scope {
                PresenceScope::Conversation(id) => Some(*id),
                PresenceScope::Global => None,
            },
            _ => None,
        }
    }

    /// Returns the recipient if this event targets a single user.
    pub fn recipient_id(&self) -> Option<Uuid> {
        match self {
            Self::NotificationCreate { recipient_id, .. } => Some(*recipient_id),
            _ => None,
        }
    }
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Authenticate the WebSocket connection
    Identify { token: String },

    /// Subscribe to conversation-scoped events (messages, presence) for the
    /// given conversations. Replaces the previous subscription set.
    Subscribe { conversation_ids: Vec<Uuid> },

    /// Publish the caller's presence record into a scope. Full replace:
    /// the record overwrites the previously tracked one for this user.
    Track {
        scope: PresenceScope,
        record: PresenceRecord,
    },

    /// Remove the caller's presence record from a scope.
    Untrack { scope: PresenceScope },
}
