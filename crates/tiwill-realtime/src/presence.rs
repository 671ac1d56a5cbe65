//! Ephemeral presence registry.
//!
//! One map of records per scope (global, or per conversation). Nothing is
//! persisted: a record lives exactly as long as the connection that
//! published it. Typing rides inside the record rather than on a separate
//! channel, so a disconnect wipes the typing flag together with the online
//! status and no explicit "stopped typing" message is ever needed.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use uuid::Uuid;

use tiwill_types::events::GatewayEvent;
use tiwill_types::models::{PresenceRecord, PresenceScope};

use crate::dispatcher::Dispatcher;

/// Server-side presence registry. Publishes deltas through the dispatcher;
/// new subscribers are brought up to date with an authoritative sync
/// snapshot.
#[derive(Clone)]
pub struct PresenceTracker {
    scopes: Arc<RwLock<HashMap<PresenceScope, HashMap<Uuid, PresenceRecord>>>>,
    dispatcher: Dispatcher,
}

impl PresenceTracker {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            scopes: Arc::new(RwLock::new(HashMap::new())),
            dispatcher,
        }
    }

    /// Publish a user's record into a scope. Full replace: the record
    /// overwrites whatever was tracked before for this (scope, user) key,
    /// typing flag and all. Observers see it as a join delta.
    pub async fn track(&self, scope: PresenceScope, record: PresenceRecord) {
        self.scopes
            .write()
            .await
            .entry(scope)
            .or_default()
            .insert(record.user_id, record.clone());

        self.dispatcher
            .broadcast(GatewayEvent::PresenceJoin { scope, record });
    }

    /// Remove a user's record from one scope.
    pub async fn untrack(&self, scope: PresenceScope, user_id: Uuid) {
        let removed = {
            let mut scopes = self.scopes.write().await;
            let removed = scopes
                .get_mut(&scope)
                .map(|members| members.remove(&user_id).is_some())
                .unwrap_or(false);
            let now_empty = scopes.get(&scope).is_some_and(|members| members.is_empty());
            if now_empty {
                scopes.remove(&scope);
            }
            removed
        };

        if removed {
            self.dispatcher
                .broadcast(GatewayEvent::PresenceLeave { scope, user_id });
        }
    }

    /// Transport-driven leave: drop the user from every scope they were
    /// tracked in. This is what makes presence self-cleaning — there is no
    /// server-side typing timeout and no tombstone row.
    pub async fn disconnect(&self, user_id: Uuid) {
        let affected: Vec<PresenceScope> = {
            let mut scopes = self.scopes.write().await;
            let mut affected = Vec::new();
            scopes.retain(|scope, members| {
                if members.remove(&user_id).is_some() {
                    affected.push(*scope);
                }
                !members.is_empty()
            });
            affected
        };

        for scope in affected {
            self.dispatcher
                .broadcast(GatewayEvent::PresenceLeave { scope, user_id });
        }
    }

    /// Current membership of a scope.
    pub async fn snapshot(&self, scope: PresenceScope) -> Vec<PresenceRecord> {
        self.scopes
            .read()
            .await
            .get(&scope)
            .map(|members| members.values().cloned().collect())
            .unwrap_or_default()
    }

    /// The authoritative sync event a fresh subscriber receives first.
    pub async fn sync_event(&self, scope: PresenceScope) -> GatewayEvent {
        GatewayEvent::PresenceSync {
            scope,
            records: self.snapshot(scope).await,
        }
    }
}

/// Client-side view of one presence scope.
///
/// Sync replaces the set wholesale; join/leave deltas mutate it. Events for
/// other scopes are ignored.
#[derive(Debug, Default)]
pub struct PresenceView {
    scope: Option<PresenceScope>,
    members: HashMap<Uuid, PresenceRecord>,
}

impl PresenceView {
    pub fn new(scope: PresenceScope) -> Self {
        Self {
            scope: Some(scope),
            members: HashMap::new(),
        }
    }

    pub fn apply(&mut self, event: &GatewayEvent) {
        match event {
            GatewayEvent::PresenceSync { scope, records } if self.is_mine(*scope) => {
                self.members = records.iter().map(|r| (r.user_id, r.clone())).collect();
            }
            GatewayEvent::PresenceJoin { scope, record } if self.is_mine(*scope) => {
                self.members.insert(record.user_id, record.clone());
            }
            GatewayEvent::PresenceLeave { scope, user_id } if self.is_mine(*scope) => {
                self.members.remove(user_id);
            }
            _ => {}
        }
    }

    fn is_mine(&self, scope: PresenceScope) -> bool {
        self.scope == Some(scope)
    }

    pub fn online(&self) -> Vec<Uuid> {
        self.members.keys().copied().collect()
    }

    pub fn is_online(&self, user_id: Uuid) -> bool {
        self.members.contains_key(&user_id)
    }

    pub fn record(&self, user_id: Uuid) -> Option<&PresenceRecord> {
        self.members.get(&user_id)
    }

    /// Everyone currently typing in this scope, except the viewer.
    pub fn typing(&self, viewer: Uuid) -> Vec<&PresenceRecord> {
        self.members
            .values()
            .filter(|r| r.user_id != viewer && r.is_typing())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use tiwill_types::models::PresenceStatus;

    fn record(user_id: Uuid) -> PresenceRecord {
        PresenceRecord::online(user_id, "someone")
    }

    #[test]
    fn sync_replaces_and_deltas_mutate() {
        let scope = PresenceScope::Global;
        let mut view = PresenceView::new(scope);

        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();

        view.apply(&GatewayEvent::PresenceSync {
            scope,
            records: vec![record(a), record(b)],
        });
        view.apply(&GatewayEvent::PresenceJoin {
            scope,
            record: record(c),
        });
        view.apply(&GatewayEvent::PresenceLeave { scope, user_id: a });

        let online: HashSet<Uuid> = view.online().into_iter().collect();
        assert_eq!(online, HashSet::from([b, c]));
    }

    #[test]
    fn events_for_other_scopes_are_ignored() {
        let mine = PresenceScope::Conversation(Uuid::new_v4());
        let other = PresenceScope::Conversation(Uuid::new_v4());
        let mut view = PresenceView::new(mine);

        view.apply(&GatewayEvent::PresenceJoin {
            scope: other,
            record: record(Uuid::new_v4()),
        });
        assert!(view.online().is_empty());
    }

    #[tokio::test]
    async fn republish_replaces_the_whole_record() {
        let dispatcher = Dispatcher::new();
        let tracker = PresenceTracker::new(dispatcher.clone());
        let scope = PresenceScope::Conversation(Uuid::new_v4());
        let user = Uuid::new_v4();

        let mut typing = record(user);
        typing.status = PresenceStatus::Typing;
        tracker.track(scope, typing).await;

        let snap = tracker.snapshot(scope).await;
        assert!(snap[0].is_typing());

        // Publishing an idle record clobbers the typing flag; no merge.
        tracker.track(scope, record(user)).await;
        let snap = tracker.snapshot(scope).await;
        assert_eq!(snap.len(), 1);
        assert!(!snap[0].is_typing());
    }

    #[tokio::test]
    async fn disconnect_leaves_no_typing_indicator_behind() {
        let dispatcher = Dispatcher::new();
        let tracker = PresenceTracker::new(dispatcher.clone());
        let global = PresenceScope::Global;
        let thread = PresenceScope::Conversation(Uuid::new_v4());
        let user = Uuid::new_v4();

        tracker.track(global, record(user)).await;
        let mut typing = record(user);
        typing.status = PresenceStatus::Typing;
        tracker.track(thread, typing).await;

        let mut rx = dispatcher.subscribe();
        tracker.disconnect(user).await;

        assert!(tracker.snapshot(global).await.is_empty());
        assert!(tracker.snapshot(thread).await.is_empty());

        // One leave per affected scope, whole record gone.
        let mut leaves = 0;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, GatewayEvent::PresenceLeave { .. }) {
                leaves += 1;
            }
        }
        assert_eq!(leaves, 2);
    }

    #[tokio::test]
    async fn untrack_is_silent_for_unknown_members() {
        let dispatcher = Dispatcher::new();
        let tracker = PresenceTracker::new(dispatcher.clone());
        let mut rx = dispatcher.subscribe();

        tracker.untrack(PresenceScope::Global, Uuid::new_v4()).await;
        assert!(rx.try_recv().is_err());
    }
}
