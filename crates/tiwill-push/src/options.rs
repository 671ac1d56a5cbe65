use crate::APP_NAME;
use crate::payload::{NotificationAction, PushData, PushPayload};

/// Constant de-duplication tag: distinct simultaneous pushes without an
/// explicit tag coalesce at the platform notification center. Deliberate
/// collapsing; `renotify` still forces a re-alert on each replacement.
pub const DEFAULT_TAG: &str = "default";

pub const ICON_URL: &str = "/icons/icon-192.png";
pub const BADGE_URL: &str = "/icons/badge-72.png";
pub const VIBRATION_PATTERN: [u32; 3] = [200, 100, 200];

/// Everything the platform needs to render one notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationOptions {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub vibrate: Vec<u32>,
    pub data: PushData,
    pub actions: Vec<NotificationAction>,
    pub tag: String,
    pub renotify: bool,
}

/// Fill every absent payload field with its named default.
pub fn build_notification_options(payload: PushPayload) -> NotificationOptions {
    NotificationOptions {
        title: payload.title.unwrap_or_else(|| APP_NAME.to_string()),
        body: payload.body.unwrap_or_default(),
        icon: ICON_URL.to_string(),
        badge: BADGE_URL.to_string(),
        vibrate: VIBRATION_PATTERN.to_vec(),
        data: payload.data.unwrap_or_default(),
        actions: payload.actions.unwrap_or_else(|| {
            vec![NotificationAction {
                action: "open".into(),
                title: "Open".into(),
            }]
        }),
        tag: payload.tag.unwrap_or_else(|| DEFAULT_TAG.to_string()),
        renotify: true,
    }
}
