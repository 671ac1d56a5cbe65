use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A 1:1 messaging thread between exactly two users.
/// At most one conversation exists per unordered user pair; the pair is
/// stored canonically ordered so the uniqueness constraint can enforce that.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub user_a: Uuid,
    pub user_b: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// The participant that is not `user_id`, if `user_id` is a participant.
    pub fn peer_of(&self, user_id: Uuid) -> Option<Uuid> {
        if self.user_a == user_id {
            Some(self.user_b)
        } else if self.user_b == user_id {
            Some(self.user_a)
        } else {
            None
        }
    }
}

/// Per-user membership row. `last_read_at` is advanced only by the owning
/// user viewing the thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub conversation_id: Uuid,
    pub user_id: Uuid,
    pub last_read_at: Option<DateTime<Utc>>,
}

/// Immutable once created, except for the one-way null -> timestamp
/// transition of `read_at`, performed by the non-sender participant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Message,
    Reaction,
    Badge,
    Level,
}

/// Created server-side in response to domain events; mutated only by the
/// recipient marking it read; never deleted by clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub recipient_id: Uuid,
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    /// Opaque routing payload, e.g. {"conversation_id": ...} or {"post_id": ...}.
    pub payload: serde_json::Value,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// One row per device; upserted keyed by endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushSubscription {
    pub user_id: Uuid,
    pub endpoint: String,
    pub p256dh: String,
    pub auth: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: Uuid,
    pub display_name: String,
}

/// Logical scope of a presence channel: one process-wide "who is online"
/// scope, plus one ephemeral scope per open conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum PresenceScope {
    Global,
    Conversation(Uuid),
}

/// Transient per-user status carried inside the presence record. Typing is
/// not a separate channel: it rides on the same record as online status and
/// disappears with it on disconnect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PresenceStatus {
    Idle,
    Typing,
}

/// Ephemeral presence state for one user in one scope. Never persisted.
///
/// Publishing is full-replace: the whole record overwrites whatever was
/// tracked before for this (scope, user) key. Callers updating one field
/// must resend the rest or they will clobber it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceRecord {
    pub user_id: Uuid,
    pub display_name: String,
    pub online_since: DateTime<Utc>,
    pub status: PresenceStatus,
}

impl PresenceRecord {
    pub fn online(user_id: Uuid, display_name: impl Into<String>) -> Self {
        Self {
            user_id,
            display_name: display_name.into(),
            online_since: Utc::now(),
            status: PresenceStatus::Idle,
        }
    }

    pub fn is_typing(&self) -> bool {
        self.status == PresenceStatus::Typing
    }
}
