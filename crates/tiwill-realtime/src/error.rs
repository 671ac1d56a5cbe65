use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum RealtimeError {
    /// Message content was empty or whitespace-only.
    #[error("message content is empty")]
    EmptyMessage,

    /// A user tried to open a conversation with themselves.
    #[error("cannot open a conversation with yourself")]
    SelfConversation,

    /// The user is not a participant of the conversation. Indistinguishable
    /// from "no such conversation" on purpose; access rules live server-side.
    #[error("no access to conversation {0}")]
    NotAParticipant(Uuid),

    #[error(transparent)]
    Db(#[from] anyhow::Error),
}
