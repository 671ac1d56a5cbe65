//! Local typing debounce.
//!
//! There is no server-side typing timeout: whoever publishes the typing
//! flag is responsible for clearing it. Each keystroke re-publishes the
//! full presence record with `Typing` and re-arms an idle timer that
//! republishes `Idle` after ~2s of silence. The timer is cancelled on send
//! and on teardown so a stale "stopped typing" publish can never fire
//! after the view is gone.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use uuid::Uuid;

use tiwill_types::models::{PresenceRecord, PresenceScope, PresenceStatus};

use crate::presence::PresenceTracker;

pub const TYPING_IDLE_AFTER: Duration = Duration::from_secs(2);

pub struct TypingDebounce {
    tracker: PresenceTracker,
    scope: PresenceScope,
    user_id: Uuid,
    display_name: String,
    online_since: DateTime<Utc>,
    idle_after: Duration,
    timer: Option<JoinHandle<()>>,
}

impl TypingDebounce {
    pub fn new(
        tracker: PresenceTracker,
        scope: PresenceScope,
        user_id: Uuid,
        display_name: impl Into<String>,
    ) -> Self {
        Self {
            tracker,
            scope,
            user_id,
            display_name: display_name.into(),
            online_since: Utc::now(),
            idle_after: TYPING_IDLE_AFTER,
            timer: None,
        }
    }

    #[cfg(test)]
    fn with_idle_after(mut self, idle_after: Duration) -> Self {
        self.idle_after = idle_after;
        self
    }

    fn record(&self, status: PresenceStatus) -> PresenceRecord {
        // Full payload on every publish; a partial record would clobber
        // the other fields under the replace-on-publish contract.
        PresenceRecord {
            user_id: self.user_id,
            display_name: self.display_name.clone(),
            online_since: self.online_since,
            status,
        }
    }

    /// Publish `Typing` and re-arm the idle timer.
    pub async fn keystroke(&mut self) {
        self.cancel_timer();
        self.tracker
            .track(self.scope, self.record(PresenceStatus::Typing))
            .await;

        let tracker = self.tracker.clone();
        let scope = self.scope;
        let idle = self.record(PresenceStatus::Idle);
        let idle_after = self.idle_after;
        self.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(idle_after).await;
            tracker.track(scope, idle).await;
        }));
    }

    /// Clear the flag now (message sent) and cancel the pending timer.
    pub async fn sent(&mut self) {
        self.cancel_timer();
        self.tracker
            .track(self.scope, self.record(PresenceStatus::Idle))
            .await;
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

impl Drop for TypingDebounce {
    fn drop(&mut self) {
        // Teardown: no stale idle publish may fire after the view is gone.
        self.cancel_timer();
    }
}
