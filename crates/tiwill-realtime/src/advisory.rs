//! Best-effort write helper.
//!
//! Presence publishes, typing flags and read-marking are advisory: their
//! failure is logged and swallowed, never surfaced or retried. Message
//! send is the one write that must propagate its error; it does NOT go
//! through here.

use tracing::warn;

/// Log-don't-throw wrapper for advisory writes.
pub fn advisory<T, E: std::fmt::Display>(label: &str, result: Result<T, E>) -> Option<T> {
    match result {
        Ok(v) => Some(v),
        Err(e) => {
            warn!("advisory write '{}' failed: {}", label, e);
            None
        }
    }
}
