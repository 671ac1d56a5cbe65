//! Push delivery bridge.
//!
//! Runs out-of-band from the application: receives opaque push payloads,
//! renders platform notifications and routes notification clicks back to
//! the right deep link. Split into pure functions (payload parsing,
//! option building, URL routing) plus one side-effecting shell, so the
//! routing table is unit-testable without any platform.

pub mod options;
pub mod payload;
pub mod routing;
pub mod worker;

pub use options::{NotificationOptions, build_notification_options};
pub use payload::{PushData, PushPayload, parse_push_payload};
pub use routing::resolve_target_url;
pub use worker::{ClientShell, PushWorker};

/// Fallback notification title.
pub const APP_NAME: &str = "TiWill";
