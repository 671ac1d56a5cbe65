//! Explicit subscription registry.
//!
//! Every live channel handle is owned here, keyed by scope, with explicit
//! open/close. Opening a key that is already open closes the previous
//! handle first, so there is exactly one authoritative subscription per
//! scope and no ad hoc subscribe/unsubscribe pairing to reason about.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::task::JoinHandle;
use uuid::Uuid;

use tiwill_types::models::PresenceScope;

/// Identity of one live subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeKey {
    /// Per-conversation message tail
    Messages(Uuid),
    /// Presence channel (global or per-conversation)
    Presence(PresenceScope),
    /// Process-wide notification stream for one recipient
    Notifications(Uuid),
}

/// The running tasks behind one subscription. Aborting them is the
/// teardown; any transport-side cleanup (presence untrack) belongs to the
/// connection that owns the transport.
#[derive(Default)]
pub struct Subscription {
    tasks: Vec<JoinHandle<()>>,
}

impl Subscription {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&mut self, task: JoinHandle<()>) {
        self.tasks.push(task);
    }

    fn close(self) {
        for task in self.tasks {
            task.abort();
        }
    }
}

#[derive(Default)]
pub struct SubscriptionManager {
    table: Mutex<HashMap<ScopeKey, Subscription>>,
}

impl SubscriptionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscription under its key. A previous handle for the
    /// same key is closed first.
    pub fn open(&self, key: ScopeKey, subscription: Subscription) {
        let previous = self
            .table
            .lock()
            .expect("subscription table poisoned")
            .insert(key, subscription);
        if let Some(previous) = previous {
            previous.close();
        }
    }

    pub fn close(&self, key: ScopeKey) {
        let removed = self
            .table
            .lock()
            .expect("subscription table poisoned")
            .remove(&key);
        if let Some(subscription) = removed {
            subscription.close();
        }
    }

    /// Closing a conversation scope tears down both its message tail and
    /// its co-located presence channel.
    pub fn close_conversation(&self, conversation_id: Uuid) {
        self.close(ScopeKey::Messages(conversation_id));
        self.close(ScopeKey::Presence(PresenceScope::Conversation(
            conversation_id,
        )));
    }

    pub fn close_all(&self) {
        let drained: Vec<Subscription> = {
            let mut table = self.table.lock().expect("subscription table poisoned");
            table.drain().map(|(_, sub)| sub).collect()
        };
        for subscription in drained {
            subscription.close();
        }
    }

    pub fn is_open(&self, key: ScopeKey) -> bool {
        self.table
            .lock()
            .expect("subscription table poisoned")
            .contains_key(&key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    /// A subscription whose liveness is observable: when its task is
    /// aborted the sender drops and the receiver closes.
    fn probe() -> (Subscription, mpsc::UnboundedReceiver<()>) {
        let (tx, rx) = mpsc::unbounded_channel::<()>();
        let mut sub = Subscription::new();
        sub.attach(tokio::spawn(async move {
            let _tx = tx;
            futures_util::future::pending::<()>().await;
        }));
        (sub, rx)
    }

    #[tokio::test]
    async fn close_conversation_tears_down_messages_and_presence() {
        let manager = SubscriptionManager::new();
        let conversation = Uuid::new_v4();

        let (messages, mut messages_rx) = probe();
        let (presence, mut presence_rx) = probe();
        manager.open(ScopeKey::Messages(conversation), messages);
        manager.open(
            ScopeKey::Presence(PresenceScope::Conversation(conversation)),
            presence,
        );

        manager.close_conversation(conversation);

        assert!(!manager.is_open(ScopeKey::Messages(conversation)));
        assert!(messages_rx.recv().await.is_none());
        assert!(presence_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn reopening_a_scope_closes_the_previous_handle() {
        let manager = SubscriptionManager::new();
        let key = ScopeKey::Presence(PresenceScope::Global);

        let (first, mut first_rx) = probe();
        manager.open(key, first);
        let (second, _second_rx) = probe();
        manager.open(key, second);

        // The displaced handle is gone; the key stays open.
        assert!(first_rx.recv().await.is_none());
        assert!(manager.is_open(key));
    }

    #[tokio::test]
    async fn close_all_empties_the_registry() {
        let manager = SubscriptionManager::new();
        let user = Uuid::new_v4();

        let (notifications, mut rx) = probe();
        manager.open(ScopeKey::Notifications(user), notifications);
        manager.close_all();

        assert!(!manager.is_open(ScopeKey::Notifications(user)));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn closing_an_unknown_key_is_a_no_op() {
        let manager = SubscriptionManager::new();
        manager.close(ScopeKey::Messages(Uuid::new_v4()));
    }
}
