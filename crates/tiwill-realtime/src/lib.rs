//! Realtime conversation and presence synchronization core.
//!
//! The dispatcher fans events out to connected clients; the presence
//! tracker owns the ephemeral who-is-online/typing registry; the live
//! channel and conversation store mediate message history, delivery and
//! read state; the notification fan-out decides which events interrupt
//! the user.

pub mod advisory;
pub mod channel;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod fanout;
pub mod names;
pub mod presence;
pub mod store;
pub mod subscriptions;
pub mod typing;

pub use error::RealtimeError;
