use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use tiwill_types::models::{
    Conversation, Message, Notification, PushSubscription, UserProfile,
};

use crate::Database;
use crate::rows::{fmt_ts, kind_from_str, kind_to_str, parse_opt_ts, parse_ts, parse_uuid};

impl Database {
    // -- Profiles --

    pub fn upsert_profile(&self, user_id: Uuid, display_name: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO profiles (user_id, display_name) VALUES (?1, ?2)
                 ON CONFLICT(user_id) DO UPDATE SET display_name = excluded.display_name",
                (user_id.to_string(), display_name),
            )?;
            Ok(())
        })
    }

    pub fn get_profile(&self, user_id: Uuid) -> Result<Option<UserProfile>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT display_name FROM profiles WHERE user_id = ?1",
                    [user_id.to_string()],
                    |row| row.get::<_, String>(0),
                )
                .optional()?;
            Ok(row.map(|display_name| UserProfile {
                user_id,
                display_name,
            }))
        })
    }

    // -- Conversations --

    /// Atomic find-or-create for the 1:1 conversation between two users.
    ///
    /// The pair is canonically ordered before the insert so both call orders
    /// hit the same UNIQUE(user_a, user_b) row; INSERT OR IGNORE followed by
    /// SELECT inside one transaction makes concurrent callers converge on a
    /// single conversation id.
    pub fn find_or_create_conversation(&self, user_id: Uuid, other_user_id: Uuid) -> Result<Uuid> {
        if user_id == other_user_id {
            return Err(anyhow!("cannot open a conversation with yourself"));
        }

        let (a, b) = canonical_pair(user_id, other_user_id);
        let candidate_id = Uuid::new_v4();
        let now = fmt_ts(Utc::now());

        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;

            tx.execute(
                "INSERT OR IGNORE INTO conversations (id, user_a, user_b, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)",
                (
                    candidate_id.to_string(),
                    a.to_string(),
                    b.to_string(),
                    &now,
                ),
            )?;

            let id: String = tx.query_row(
                "SELECT id FROM conversations WHERE user_a = ?1 AND user_b = ?2",
                (a.to_string(), b.to_string()),
                |row| row.get(0),
            )?;

            for uid in [a, b] {
                tx.execute(
                    "INSERT OR IGNORE INTO participants (conversation_id, user_id) VALUES (?1, ?2)",
                    (&id, uid.to_string()),
                )?;
            }

            tx.commit()?;
            parse_uuid(&id, "conversation id")
        })
    }

    pub fn get_conversation(&self, conversation_id: Uuid) -> Result<Option<Conversation>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, user_a, user_b, created_at, updated_at
                     FROM conversations WHERE id = ?1",
                    [conversation_id.to_string()],
                    conversation_from_row,
                )
                .optional()?;
            row.map(parse_conversation).transpose()
        })
    }

    /// All conversations the user participates in, most recently updated
    /// first.
    pub fn list_conversations(&self, user_id: Uuid) -> Result<Vec<Conversation>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT c.id, c.user_a, c.user_b, c.created_at, c.updated_at
                 FROM conversations c
                 JOIN participants p ON p.conversation_id = c.id
                 WHERE p.user_id = ?1
                 ORDER BY c.updated_at DESC",
            )?;

            let rows = stmt
                .query_map([user_id.to_string()], conversation_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            rows.into_iter().map(parse_conversation).collect()
        })
    }

    pub fn is_participant(&self, conversation_id: Uuid, user_id: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT 1 FROM participants WHERE conversation_id = ?1 AND user_id = ?2",
                    (conversation_id.to_string(), user_id.to_string()),
                    |row| row.get::<_, i64>(0),
                )
                .optional()?;
            Ok(row.is_some())
        })
    }

    pub fn peer_of(&self, conversation_id: Uuid, user_id: Uuid) -> Result<Option<Uuid>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT user_id FROM participants
                     WHERE conversation_id = ?1 AND user_id != ?2",
                    (conversation_id.to_string(), user_id.to_string()),
                    |row| row.get::<_, String>(0),
                )
                .optional()?;
            row.map(|s| parse_uuid(&s, "participant user_id")).transpose()
        })
    }

    // -- Messages --

    /// Insert a message and bump the owning conversation's updated_at, in
    /// one transaction.
    pub fn insert_message(&self, message: &Message) -> Result<()> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            tx.execute(
                "INSERT INTO messages (id, conversation_id, sender_id, content, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                (
                    message.id.to_string(),
                    message.conversation_id.to_string(),
                    message.sender_id.to_string(),
                    &message.content,
                    fmt_ts(message.created_at),
                ),
            )?;
            tx.execute(
                "UPDATE conversations SET updated_at = ?1 WHERE id = ?2",
                (
                    fmt_ts(message.created_at),
                    message.conversation_id.to_string(),
                ),
            )?;
            tx.commit()?;
            Ok(())
        })
    }

    /// Full history, ascending by creation time. The live tail is appended
    /// after this in arrival order.
    pub fn get_messages(&self, conversation_id: Uuid) -> Result<Vec<Message>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, conversation_id, sender_id, content, created_at, read_at
                 FROM messages WHERE conversation_id = ?1
                 ORDER BY created_at ASC",
            )?;

            let rows = stmt
                .query_map([conversation_id.to_string()], message_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            rows.into_iter().map(parse_message).collect()
        })
    }

    pub fn last_message(&self, conversation_id: Uuid) -> Result<Option<Message>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, conversation_id, sender_id, content, created_at, read_at
                     FROM messages WHERE conversation_id = ?1
                     ORDER BY created_at DESC LIMIT 1",
                    [conversation_id.to_string()],
                    message_from_row,
                )
                .optional()?;
            row.map(parse_message).transpose()
        })
    }

    /// Messages from the other participant that the reader has not seen yet.
    pub fn unread_count(&self, conversation_id: Uuid, reader_id: Uuid) -> Result<u32> {
        self.with_conn(|conn| {
            let count: u32 = conn.query_row(
                "SELECT COUNT(*) FROM messages
                 WHERE conversation_id = ?1 AND sender_id != ?2 AND read_at IS NULL",
                (conversation_id.to_string(), reader_id.to_string()),
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }

    /// Bulk null -> now transition for every unread message from the other
    /// participant. Conditioned on read_at IS NULL, so repeat calls are
    /// no-ops. Returns how many rows transitioned.
    pub fn mark_read(
        &self,
        conversation_id: Uuid,
        reader_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<usize> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            let marked = tx.execute(
                "UPDATE messages SET read_at = ?3
                 WHERE conversation_id = ?1 AND sender_id != ?2 AND read_at IS NULL",
                (
                    conversation_id.to_string(),
                    reader_id.to_string(),
                    fmt_ts(now),
                ),
            )?;
            tx.execute(
                "UPDATE participants SET last_read_at = ?3
                 WHERE conversation_id = ?1 AND user_id = ?2",
                (
                    conversation_id.to_string(),
                    reader_id.to_string(),
                    fmt_ts(now),
                ),
            )?;
            tx.commit()?;
            Ok(marked)
        })
    }

    // -- Notifications --

    pub fn insert_notification(&self, n: &Notification) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO notifications
                     (id, recipient_id, kind, title, body, payload, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                (
                    n.id.to_string(),
                    n.recipient_id.to_string(),
                    kind_to_str(n.kind),
                    &n.title,
                    &n.body,
                    n.payload.to_string(),
                    fmt_ts(n.created_at),
                ),
            )?;
            Ok(())
        })
    }

    pub fn list_notifications(&self, recipient_id: Uuid) -> Result<Vec<Notification>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, recipient_id, kind, title, body, payload, read_at, created_at
                 FROM notifications WHERE recipient_id = ?1
                 ORDER BY created_at DESC",
            )?;

            let rows = stmt
                .query_map([recipient_id.to_string()], notification_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            rows.into_iter().map(parse_notification).collect()
        })
    }

    pub fn unread_notification_count(&self, recipient_id: Uuid) -> Result<u32> {
        self.with_conn(|conn| {
            let count: u32 = conn.query_row(
                "SELECT COUNT(*) FROM notifications
                 WHERE recipient_id = ?1 AND read_at IS NULL",
                [recipient_id.to_string()],
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }

    /// Only the recipient may mark a notification read; the update is
    /// conditioned on read_at IS NULL. Returns false if nothing changed.
    pub fn mark_notification_read(
        &self,
        notification_id: Uuid,
        recipient_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE notifications SET read_at = ?3
                 WHERE id = ?1 AND recipient_id = ?2 AND read_at IS NULL",
                (
                    notification_id.to_string(),
                    recipient_id.to_string(),
                    fmt_ts(now),
                ),
            )?;
            Ok(changed > 0)
        })
    }

    // -- Push subscriptions --

    /// Upsert keyed by endpoint. A user may hold several rows (multi-device);
    /// re-registering an endpoint rebinds it to the latest user and keys.
    pub fn upsert_push_subscription(&self, sub: &PushSubscription) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO push_subscriptions (endpoint, user_id, p256dh, auth, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(endpoint) DO UPDATE SET
                     user_id = excluded.user_id,
                     p256dh = excluded.p256dh,
                     auth = excluded.auth",
                (
                    &sub.endpoint,
                    sub.user_id.to_string(),
                    &sub.p256dh,
                    &sub.auth,
                    fmt_ts(Utc::now()),
                ),
            )?;
            Ok(())
        })
    }

    pub fn push_subscriptions_for(&self, user_id: Uuid) -> Result<Vec<PushSubscription>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT endpoint, user_id, p256dh, auth FROM push_subscriptions
                 WHERE user_id = ?1",
            )?;

            let rows = stmt
                .query_map([user_id.to_string()], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            rows.into_iter()
                .map(|(endpoint, uid, p256dh, auth)| {
                    Ok(PushSubscription {
                        user_id: parse_uuid(&uid, "push user_id")?,
                        endpoint,
                        p256dh,
                        auth,
                    })
                })
                .collect()
        })
    }
}

/// Canonical ordering of a user pair, by uuid string. Both argument orders
/// map to the same (user_a, user_b) row.
fn canonical_pair(x: Uuid, y: Uuid) -> (Uuid, Uuid) {
    if x.to_string() <= y.to_string() {
        (x, y)
    } else {
        (y, x)
    }
}

type ConversationRow = (String, String, String, String, String);
type MessageRow = (String, String, String, String, String, Option<String>);
type NotificationRow = (
    String,
    String,
    String,
    String,
    String,
    String,
    Option<String>,
    String,
);

fn conversation_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ConversationRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
    ))
}

fn parse_conversation(row: ConversationRow) -> Result<Conversation> {
    let (id, user_a, user_b, created_at, updated_at) = row;
    Ok(Conversation {
        id: parse_uuid(&id, "conversation id")?,
        user_a: parse_uuid(&user_a, "user_a")?,
        user_b: parse_uuid(&user_b, "user_b")?,
        created_at: parse_ts(&created_at, "conversation created_at")?,
        updated_at: parse_ts(&updated_at, "conversation updated_at")?,
    })
}

fn message_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

fn parse_message(row: MessageRow) -> Result<Message> {
    let (id, conversation_id, sender_id, content, created_at, read_at) = row;
    Ok(Message {
        id: parse_uuid(&id, "message id")?,
        conversation_id: parse_uuid(&conversation_id, "message conversation_id")?,
        sender_id: parse_uuid(&sender_id, "message sender_id")?,
        content,
        created_at: parse_ts(&created_at, "message created_at")?,
        read_at: parse_opt_ts(read_at, "message read_at")?,
    })
}

fn notification_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<NotificationRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
    ))
}

fn parse_notification(row: NotificationRow) -> Result<Notification> {
    let (id, recipient_id, kind, title, body, payload, read_at, created_at) = row;
    Ok(Notification {
        id: parse_uuid(&id, "notification id")?,
        recipient_id: parse_uuid(&recipient_id, "notification recipient_id")?,
        kind: kind_from_str(&kind)?,
        title,
        body,
        payload: serde_json::from_str(&payload).unwrap_or(serde_json::Value::Null),
        read_at: parse_opt_ts(read_at, "notification read_at")?,
        created_at: parse_ts(&created_at, "notification created_at")?,
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
