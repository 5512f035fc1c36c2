use crate::types::{MessageKind, MessagePayload, UrlLinkPayload};
use serde::Deserialize;

/// URL-link message content as the gateway serializes it. Field names vary
/// between gateway builds, hence the aliases.
#[derive(Debug, Deserialize)]
struct WireUrlContent {
    url: String,
    #[serde(default)]
    title: String,
    #[serde(default, alias = "des")]
    description: String,
    #[serde(default, alias = "thumburl", alias = "thumbUrl")]
    thumbnail_url: String,
}

/// Decodes the URL-link payload carried by a `UrlLink` message.
pub fn parse(payload: &MessagePayload) -> Option<UrlLinkPayload> {
    if payload.kind != MessageKind::UrlLink {
        return None;
    }
    let wire: WireUrlContent = serde_json::from_str(&payload.content).ok()?;
    if wire.url.is_empty() {
        return None;
    }
    Some(UrlLinkPayload {
        url: wire.url,
        title: wire.title,
        description: wire.description,
        thumbnail_url: wire.thumbnail_url,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url_message(content: &str) -> MessagePayload {
        MessagePayload {
            id: "1".into(),
            kind: MessageKind::UrlLink,
            content: content.into(),
            from_account: "wx-a".into(),
            to_account: "wx-self".into(),
            room_id: None,
            timestamp: 1000,
            voice_length: None,
            file_name: None,
            mention_ids: Vec::new(),
        }
    }

    #[test]
    fn decodes_aliased_fields() {
        let parsed = parse(&url_message(
            r#"{"url":"https://example.com","title":"t","des":"d","thumburl":"https://example.com/i.png"}"#,
        ))
        .unwrap();
        assert_eq!(parsed.url, "https://example.com");
        assert_eq!(parsed.description, "d");
        assert_eq!(parsed.thumbnail_url, "https://example.com/i.png");
    }

    #[test]
    fn garbage_or_empty_url_is_rejected() {
        assert!(parse(&url_message("not json")).is_none());
        assert!(parse(&url_message(r#"{"url":"","title":"t"}"#)).is_none());
    }
}
