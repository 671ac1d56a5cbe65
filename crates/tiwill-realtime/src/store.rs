//! Client-facing conversation store: discovery, idempotent pairing and
//! list enrichment.

use std::sync::Arc;

use tracing::warn;
use uuid::Uuid;

use tiwill_db::Database;
use tiwill_types::api::ConversationSummary;
use tiwill_types::models::UserProfile;

use crate::error::RealtimeError;

pub struct ConversationStore {
    db: Arc<Database>,
}

impl ConversationStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Idempotent find-or-create. Correctness lives in the single atomic
    /// DB operation, not here; this layer only rejects self-pairing.
    pub fn create_or_get(&self, user_id: Uuid, other_user_id: Uuid) -> Result<Uuid, RealtimeError> {
        if user_id == other_user_id {
            return Err(RealtimeError::SelfConversation);
        }
        Ok(self.db.find_or_create_conversation(user_id, other_user_id)?)
    }

    /// All of the user's conversations, most recently updated first, each
    /// enriched with peer profile, last message and unread count.
    ///
    /// Partial data beats hard failure: a failed top-level fetch logs and
    /// returns an empty list; a failed enrichment logs and falls back to
    /// defaults so the rest of the list still renders.
    pub fn list(&self, user_id: Uuid) -> Vec<ConversationSummary> {
        let conversations = match self.db.list_conversations(user_id) {
            Ok(rows) => rows,
            Err(e) => {
                warn!("conversation list fetch failed for {}: {}", user_id, e);
                return Vec::new();
            }
        };

        conversations
            .into_iter()
            .map(|conversation| {
                let peer_id = conversation.peer_of(user_id).unwrap_or(user_id);

                let peer = match self.db.get_profile(peer_id) {
                    Ok(Some(profile)) => profile,
                    Ok(None) => fallback_profile(peer_id),
                    Err(e) => {
                        warn!("profile fetch failed for {}: {}", peer_id, e);
                        fallback_profile(peer_id)
                    }
                };

                let last_message = self
                    .db
                    .last_message(conversation.id)
                    .unwrap_or_else(|e| {
                        warn!("last message fetch failed for {}: {}", conversation.id, e);
                        None
                    });

                let unread_count = self
                    .db
                    .unread_count(conversation.id, user_id)
                    .unwrap_or_else(|e| {
                        warn!("unread count fetch failed for {}: {}", conversation.id, e);
                        0
                    });

                ConversationSummary {
                    conversation_id: conversation.id,
                    peer,
                    last_message,
                    unread_count,
                    updated_at: conversation.updated_at,
                }
            })
            .collect()
    }
}

fn fallback_profile(user_id: Uuid) -> UserProfile {
    UserProfile {
        user_id,
        display_name: "unknown".into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use tiwill_types::models::Message;

    fn store() -> (ConversationStore, Arc<Database>) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        (ConversationStore::new(db.clone()), db)
    }

    #[test]
    fn create_or_get_rejects_self() {
        let (store, _) = store();
        let me = Uuid::new_v4();
        assert!(matches!(
            store.create_or_get(me, me),
            Err(RealtimeError::SelfConversation)
        ));
    }

    #[test]
    fn create_or_get_converges_on_one_id() {
        let (store, _) = store();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        let id1 = store.create_or_get(a, b).unwrap();
        let id2 = store.create_or_get(b, a).unwrap();
        assert_eq!(id1, id2);
    }

    #[test]
    fn list_orders_by_recency_and_enriches() {
        let (store, db) = store();
        let me = Uuid::new_v4();
        let friend = Uuid::new_v4();
        let stranger_with_profile = Uuid::new_v4();

        db.upsert_profile(friend, "Friend").unwrap();

        let older = store.create_or_get(me, friend).unwrap();
        let newer = store.create_or_get(me, stranger_with_profile).unwrap();

        let t0 = Utc::now();
        db.insert_message(&Message {
            id: Uuid::new_v4(),
            conversation_id: older,
            sender_id: friend,
            content: "hello".into(),
            created_at: t0,
            read_at: None,
        })
        .unwrap();
        db.insert_message(&Message {
            id: Uuid::new_v4(),
            conversation_id: newer,
            sender_id: stranger_with_profile,
            content: "newer".into(),
            created_at: t0 + Duration::seconds(1),
            read_at: None,
        })
        .unwrap();

        let listed = store.list(me);
        assert_eq!(listed.len(), 2);

        assert_eq!(listed[0].conversation_id, newer);
        // No profile row: metadata degrades to a default, entry still renders.
        assert_eq!(listed[0].peer.display_name, "unknown");
        assert_eq!(listed[0].unread_count, 1);

        assert_eq!(listed[1].conversation_id, older);
        assert_eq!(listed[1].peer.display_name, "Friend");
        assert_eq!(listed[1].last_message.as_ref().unwrap().content, "hello");
    }

    #[test]
    fn list_is_empty_for_user_with_no_conversations() {
        let (store, _) = store();
        assert!(store.list(Uuid::new_v4()).is_empty());
    }
}
