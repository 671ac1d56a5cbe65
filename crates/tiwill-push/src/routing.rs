use crate::payload::PushData;

/// Click-routing table: push data to in-app deep link.
///
/// | type      | condition              | target              |
/// |-----------|------------------------|---------------------|
/// | message   | conversationId present | /chat?id=<id>       |
/// | reaction  | postId present         | /feed#post-<id>     |
/// | otherwise | —                      | /feed               |
pub fn resolve_target_url(data: &PushData) -> String {
    match data.kind.as_deref() {
        Some("message") => match &data.conversation_id {
            Some(id) => format!("/chat?id={}", id),
            None => "/feed".to_string(),
        },
        Some("reaction") => match &data.post_id {
            Some(id) => format!("/feed#post-{}", id),
            None => "/feed".to_string(),
        },
        _ => "/feed".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(kind: Option<&str>, conversation: Option<&str>, post: Option<&str>) -> PushData {
        PushData {
            kind: kind.map(String::from),
            conversation_id: conversation.map(String::from),
            post_id: post.map(String::from),
        }
    }

    #[test]
    fn message_routes_to_chat_deep_link() {
        assert_eq!(
            resolve_target_url(&data(Some("message"), Some("abc"), None)),
            "/chat?id=abc"
        );
    }

    #[test]
    fn reaction_routes_to_post_anchor() {
        assert_eq!(
            resolve_target_url(&data(Some("reaction"), None, Some("42"))),
            "/feed#post-42"
        );
    }

    #[test]
    fn everything_else_routes_to_the_feed_root() {
        assert_eq!(resolve_target_url(&PushData::default()), "/feed");
        assert_eq!(resolve_target_url(&data(Some("badge"), None, None)), "/feed");
        // Missing ids degrade to the default target too.
        assert_eq!(resolve_target_url(&data(Some("message"), None, None)), "/feed");
        assert_eq!(resolve_target_url(&data(Some("reaction"), None, None)), "/feed");
    }
}
