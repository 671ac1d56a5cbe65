//! Bounded display-name cache for notification enrichment.
//!
//! A chatty sender would otherwise cost one profile lookup per message.
//! Session-scoped: staleness is acceptable, display names rarely change.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use lru::LruCache;
use tracing::warn;
use uuid::Uuid;

use tiwill_db::Database;

const CACHE_CAPACITY: usize = 256;

pub struct DisplayNameCache {
    db: Arc<Database>,
    cache: Mutex<LruCache<Uuid, String>>,
}

impl DisplayNameCache {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(CACHE_CAPACITY).expect("nonzero capacity"),
            )),
        }
    }

    /// Cached-or-fetch. Lookup failures degrade to a placeholder and are
    /// not cached, so a later call can still succeed.
    pub fn resolve(&self, user_id: Uuid) -> String {
        if let Ok(mut cache) = self.cache.lock() {
            if let Some(name) = cache.get(&user_id) {
                return name.clone();
            }
        }

        let name = match self.db.get_profile(user_id) {
            Ok(Some(profile)) => profile.display_name,
            Ok(None) => return "unknown".into(),
            Err(e) => {
                warn!("display name lookup failed for {}: {}", user_id, e);
                return "unknown".into();
            }
        };

        if let Ok(mut cache) = self.cache.lock() {
            cache.put(user_id, name.clone());
        }
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_and_caches() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let user = Uuid::new_v4();
        db.upsert_profile(user, "Ada").unwrap();

        let cache = DisplayNameCache::new(db.clone());
        assert_eq!(cache.resolve(user), "Ada");

        // Second resolve is served from the cache, not the updated row.
        db.upsert_profile(user, "Renamed").unwrap();
        assert_eq!(cache.resolve(user), "Ada");
    }

    #[test]
    fn missing_profile_is_not_cached() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let user = Uuid::new_v4();

        let cache = DisplayNameCache::new(db.clone());
        assert_eq!(cache.resolve(user), "unknown");

        db.upsert_profile(user, "Late").unwrap();
        assert_eq!(cache.resolve(user), "Late");
    }
}
