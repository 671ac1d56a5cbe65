pub mod conversations;
pub mod messages;
pub mod middleware;
pub mod notifications;
pub mod push;

use std::sync::Arc;

use tiwill_db::Database;
use tiwill_realtime::dispatcher::Dispatcher;
use tiwill_realtime::store::ConversationStore;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub dispatcher: Dispatcher,
    pub store: ConversationStore,
    pub jwt_secret: String,
    /// Build-time VAPID public key clients use to register with the push
    /// service.
    pub vapid_public_key: String,
}

impl AppStateInner {
    pub fn new(
        db: Arc<Database>,
        dispatcher: Dispatcher,
        jwt_secret: String,
        vapid_public_key: String,
    ) -> Self {
        let store = ConversationStore::new(db.clone());
        Self {
            db,
            dispatcher,
            store,
            jwt_secret,
            vapid_public_key,
        }
    }
}
