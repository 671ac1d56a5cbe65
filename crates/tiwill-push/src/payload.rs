use serde::{Deserialize, Serialize};
use tracing::warn;

/// Routing info carried inside a push payload. `kind` drives the
/// click-routing table; only the id matching the kind is expected to be
/// present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushData {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(rename = "conversationId", default)]
    pub conversation_id: Option<String>,
    #[serde(rename = "postId", default)]
    pub post_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationAction {
    pub action: String,
    pub title: String,
}

/// Wire shape of a push payload. Every field is optional; absent fields
/// fall back to named defaults when the notification options are built.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PushPayload {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub data: Option<PushData>,
    #[serde(default)]
    pub actions: Option<Vec<NotificationAction>>,
    #[serde(default)]
    pub tag: Option<String>,
}

/// Tolerant payload parse. An absent or garbled payload yields `None` and
/// the push event becomes a no-op; there is no retry. A dropped push is
/// acceptable — the in-app fan-out is the primary channel.
pub fn parse_push_payload(raw: Option<&[u8]>) -> Option<PushPayload> {
    let raw = raw?;
    if raw.is_empty() {
        return None;
    }
    match serde_json::from_slice::<PushPayload>(raw) {
        Ok(payload) => Some(payload),
        Err(e) => {
            warn!("dropping malformed push payload: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_body_is_a_no_op() {
        assert!(parse_push_payload(None).is_none());
        assert!(parse_push_payload(Some(b"")).is_none());
    }

    #[test]
    fn malformed_json_is_dropped() {
        assert!(parse_push_payload(Some(b"{not json")).is_none());
    }

    #[test]
    fn empty_object_parses_with_all_fields_absent() {
        let payload = parse_push_payload(Some(b"{}")).unwrap();
        assert!(payload.title.is_none());
        assert!(payload.body.is_none());
        assert!(payload.data.is_none());
        assert!(payload.tag.is_none());
    }

    #[test]
    fn full_payload_round_trips() {
        let raw = br#"{
            "title": "New message",
            "body": "hey",
            "data": {"type": "message", "conversationId": "abc"},
            "actions": [{"action": "open", "title": "Open"}],
            "tag": "msg-abc"
        }"#;
        let payload = parse_push_payload(Some(raw)).unwrap();
        assert_eq!(payload.title.as_deref(), Some("New message"));
        let data = payload.data.unwrap();
        assert_eq!(data.kind.as_deref(), Some("message"));
        assert_eq!(data.conversation_id.as_deref(), Some("abc"));
        assert_eq!(payload.tag.as_deref(), Some("msg-abc"));
    }
}
