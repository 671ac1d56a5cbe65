//! End-to-end flow over an in-memory database: pairing, live delivery,
//! read state and presence, wired the way the server wires them.

use std::sync::Arc;

use uuid::Uuid;

use tiwill_db::Database;
use tiwill_realtime::channel::MessageChannel;
use tiwill_realtime::dispatcher::Dispatcher;
use tiwill_realtime::presence::{PresenceTracker, PresenceView};
use tiwill_realtime::store::ConversationStore;
use tiwill_types::models::{PresenceRecord, PresenceScope, PresenceStatus};

struct World {
    db: Arc<Database>,
    dispatcher: Dispatcher,
    tracker: PresenceTracker,
    store: ConversationStore,
    alice: Uuid,
    bob: Uuid,
}

fn world() -> World {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let dispatcher = Dispatcher::new();
    let tracker = PresenceTracker::new(dispatcher.clone());
    let store = ConversationStore::new(db.clone());

    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();
    db.upsert_profile(alice, "Alice").unwrap();
    db.upsert_profile(bob, "Bob").unwrap();

    World {
        db,
        dispatcher,
        tracker,
        store,
        alice,
        bob,
    }
}

#[tokio::test]
async fn messages_flow_from_send_to_unread_to_read() {
    let w = world();
    let conversation = w.store.create_or_get(w.alice, w.bob).unwrap();

    // Bob has the thread open; Alice sends from her side.
    let mut bobs_view =
        MessageChannel::open(w.db.clone(), w.dispatcher.clone(), conversation).unwrap();
    let alices_view =
        MessageChannel::open(w.db.clone(), w.dispatcher.clone(), conversation).unwrap();

    for text in ["hi", "are you there?", "ping"] {
        alices_view.send(w.alice, text).unwrap();
    }
    for _ in 0..3 {
        bobs_view.recv().await.unwrap();
    }

    let received: Vec<&str> = bobs_view.messages().iter().map(|m| m.content.as_str()).collect();
    assert_eq!(received, ["hi", "are you there?", "ping"]);

    // Until Bob views, Alice's messages count as unread for him only.
    assert_eq!(w.db.unread_count(conversation, w.bob).unwrap(), 3);
    assert_eq!(w.db.unread_count(conversation, w.alice).unwrap(), 0);

    assert_eq!(bobs_view.mark_read(w.bob), 3);
    assert_eq!(w.db.unread_count(conversation, w.bob).unwrap(), 0);

    // The summary list reflects all of it.
    let listed = w.store.list(w.alice);
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].peer.display_name, "Bob");
    assert_eq!(listed[0].last_message.as_ref().unwrap().content, "ping");
}

#[tokio::test]
async fn presence_and_messages_are_independent_streams() {
    let w = world();
    let conversation = w.store.create_or_get(w.alice, w.bob).unwrap();
    let scope = PresenceScope::Conversation(conversation);

    let mut rx = w.dispatcher.subscribe();
    let mut bobs_presence = PresenceView::new(scope);

    // Alice is here and typing.
    let mut record = PresenceRecord::online(w.alice, "Alice");
    record.status = PresenceStatus::Typing;
    w.tracker.track(scope, record).await;

    while let Ok(event) = rx.try_recv() {
        bobs_presence.apply(&event);
    }
    assert!(bobs_presence.is_online(w.alice));
    assert_eq!(bobs_presence.typing(w.bob).len(), 1);

    // Her connection drops: no typing indicator survives.
    w.tracker.disconnect(w.alice).await;
    while let Ok(event) = rx.try_recv() {
        bobs_presence.apply(&event);
    }
    assert!(!bobs_presence.is_online(w.alice));
    assert!(bobs_presence.typing(w.bob).is_empty());
}
