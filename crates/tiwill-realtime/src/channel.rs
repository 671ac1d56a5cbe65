//! Live message channel: history plus live tail for one conversation.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::broadcast;
use tracing::warn;
use uuid::Uuid;

use tiwill_db::Database;
use tiwill_types::events::GatewayEvent;
use tiwill_types::models::Message;

use crate::advisory::advisory;
use crate::dispatcher::Dispatcher;
use crate::error::RealtimeError;

/// Insert a message row and fan the insert event out.
///
/// This is the one must-succeed write of the system: a failed insert
/// propagates to the caller so the UI can show "failed to send". The event
/// is broadcast only after the row is durable, so the live tail reflects
/// commit order.
pub fn send_message(
    db: &Database,
    dispatcher: &Dispatcher,
    conversation_id: Uuid,
    sender_id: Uuid,
    content: &str,
) -> Result<Message, RealtimeError> {
    if content.trim().is_empty() {
        return Err(RealtimeError::EmptyMessage);
    }

    let message = Message {
        id: Uuid::new_v4(),
        conversation_id,
        sender_id,
        content: content.to_string(),
        created_at: Utc::now(),
        read_at: None,
    };

    db.insert_message(&message)?;

    dispatcher.broadcast(GatewayEvent::MessageCreate {
        id: message.id,
        conversation_id,
        sender_id,
        content: message.content.clone(),
        created_at: message.created_at,
    });

    Ok(message)
}

/// An open conversation: ordered history with a live tail appended in
/// arrival order.
///
/// Arrival order is the transport's delivery order, which matches commit
/// order; no client-side re-sorting buffer is kept past the initial
/// historical load.
pub struct MessageChannel {
    conversation_id: Uuid,
    db: Arc<Database>,
    dispatcher: Dispatcher,
    messages: Vec<Message>,
    rx: broadcast::Receiver<GatewayEvent>,
}

impl MessageChannel {
    /// Subscribe first, then load history ascending by creation time, so
    /// no insert can fall between the two.
    pub fn open(
        db: Arc<Database>,
        dispatcher: Dispatcher,
        conversation_id: Uuid,
    ) -> Result<Self, RealtimeError> {
        let rx = dispatcher.subscribe();
        let messages = db.get_messages(conversation_id)?;

        Ok(Self {
            conversation_id,
            db,
            dispatcher,
            messages,
            rx,
        })
    }

    pub fn conversation_id(&self) -> Uuid {
        self.conversation_id
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Wait for the next insert event for this conversation, append it and
    /// return it. Events for other conversations are skipped; a lagged
    /// receiver logs and keeps going.
    pub async fn recv(&mut self) -> Option<Message> {
        loop {
            let event = match self.rx.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("live tail lagged by {} events", n);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            };

            if let GatewayEvent::MessageCreate {
                id,
                conversation_id,
                sender_id,
                content,
                created_at,
            } = event
            {
                if conversation_id != self.conversation_id {
                    continue;
                }
                // Messages already marked read never arrive here; read_at
                // starts null and transitions later.
                let message = Message {
                    id,
                    conversation_id,
                    sender_id,
                    content,
                    created_at,
                    read_at: None,
                };
                self.messages.push(message.clone());
                return Some(message);
            }
        }
    }

    /// Send without local echo: the message shows up in `messages()` only
    /// once its insert event arrives back through `recv`.
    pub fn send(&self, sender_id: Uuid, content: &str) -> Result<Message, RealtimeError> {
        send_message(
            &self.db,
            &self.dispatcher,
            self.conversation_id,
            sender_id,
            content,
        )
    }

    /// Advisory view-triggered read marking. Safe to call on every
    /// re-render; the underlying update is conditioned on read_at IS NULL.
    pub fn mark_read(&self, reader_id: Uuid) -> usize {
        advisory(
            "mark read",
            self.db.mark_read(self.conversation_id, reader_id, Utc::now()),
        )
        .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn setup() -> (Arc<Database>, Dispatcher, Uuid, Uuid, Uuid) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let dispatcher = Dispatcher::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let conversation = db.find_or_create_conversation(a, b).unwrap();
        (db, dispatcher, conversation, a, b)
    }

    #[tokio::test]
    async fn history_then_tail_preserves_order() {
        let (db, dispatcher, conversation, a, b) = setup();

        let t0 = Utc::now();
        for (i, text) in ["one", "two"].iter().enumerate() {
            db.insert_message(&Message {
                id: Uuid::new_v4(),
                conversation_id: conversation,
                sender_id: b,
                content: (*text).into(),
                created_at: t0 + Duration::seconds(i as i64),
                read_at: None,
            })
            .unwrap();
        }

        let mut channel =
            MessageChannel::open(db.clone(), dispatcher.clone(), conversation).unwrap();
        assert_eq!(
            channel.messages().iter().map(|m| m.content.as_str()).collect::<Vec<_>>(),
            ["one", "two"]
        );

        channel.send(a, "three").unwrap();
        channel.send(a, "four").unwrap();
        channel.recv().await.unwrap();
        channel.recv().await.unwrap();

        assert_eq!(
            channel.messages().iter().map(|m| m.content.as_str()).collect::<Vec<_>>(),
            ["one", "two", "three", "four"]
        );
    }

    #[tokio::test]
    async fn late_joiner_history_matches_live_order() {
        let (db, dispatcher, conversation, a, _) = setup();

        let mut live =
            MessageChannel::open(db.clone(), dispatcher.clone(), conversation).unwrap();
        for text in ["m1", "m2", "m3"] {
            live.send(a, text).unwrap();
            live.recv().await.unwrap();
        }

        let late = MessageChannel::open(db, dispatcher, conversation).unwrap();
        let live_order: Vec<_> = live.messages().iter().map(|m| m.id).collect();
        let late_order: Vec<_> = late.messages().iter().map(|m| m.id).collect();
        assert_eq!(live_order, late_order);
    }

    #[test]
    fn blank_content_is_rejected() {
        let (db, dispatcher, conversation, a, _) = setup();
        let channel = MessageChannel::open(db, dispatcher, conversation).unwrap();

        assert!(matches!(
            channel.send(a, ""),
            Err(RealtimeError::EmptyMessage)
        ));
        assert!(matches!(
            channel.send(a, "   \n\t"),
            Err(RealtimeError::EmptyMessage)
        ));
    }

    #[tokio::test]
    async fn no_local_echo_before_the_event_arrives() {
        let (db, dispatcher, conversation, a, _) = setup();
        let mut channel = MessageChannel::open(db, dispatcher, conversation).unwrap();

        let sent = channel.send(a, "hello").unwrap();
        // Not visible yet: visibility waits for the round-trip.
        assert!(channel.messages().is_empty());

        let received = channel.recv().await.unwrap();
        assert_eq!(received.id, sent.id);
        assert_eq!(channel.messages().len(), 1);
    }

    #[tokio::test]
    async fn events_for_other_conversations_are_skipped() {
        let (db, dispatcher, conversation, a, b) = setup();
        let other = db.find_or_create_conversation(a, Uuid::new_v4()).unwrap();

        let mut channel =
            MessageChannel::open(db.clone(), dispatcher.clone(), conversation).unwrap();

        send_message(&db, &dispatcher, other, a, "elsewhere").unwrap();
        send_message(&db, &dispatcher, conversation, b, "here").unwrap();

        let received = channel.recv().await.unwrap();
        assert_eq!(received.content, "here");
        assert_eq!(channel.messages().len(), 1);
    }

    #[test]
    fn view_triggered_mark_read_is_idempotent() {
        let (db, dispatcher, conversation, a, b) = setup();
        let channel = MessageChannel::open(db.clone(), dispatcher.clone(), conversation).unwrap();

        send_message(&db, &dispatcher, conversation, b, "unread").unwrap();

        assert_eq!(channel.mark_read(a), 1);
        // Every re-render may call this again; the second pass is a no-op.
        assert_eq!(channel.mark_read(a), 0);
    }
}
