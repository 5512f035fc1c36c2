use super::{NameRef, RoomLeaveParsed, split_names};
use crate::types::{MessageKind, MessagePayload};
use once_cell::sync::Lazy;
use regex::Regex;

// The logged-in user removed members.
static SELF_REMOVE: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r#"^你将"(.+)"移出了群聊"#).unwrap(),
        Regex::new(r#"^You removed "(.+)" from the group chat"#).unwrap(),
    ]
});

// The logged-in user was removed.
static SELF_REMOVED: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r#"^你被"(.+)"移出群聊"#).unwrap(),
        Regex::new(r#"^You were removed from the group chat by "(.+)""#).unwrap(),
    ]
});

/// Probes a system message for the room-leave shape. Only removals produce
/// system messages on this protocol; voluntary exits are silent.
pub fn parse(payload: &MessagePayload) -> Option<RoomLeaveParsed> {
    if payload.kind != MessageKind::System {
        return None;
    }
    let room_id = payload.room_id.clone()?;
    let text = payload.content.trim();

    for pattern in SELF_REMOVE.iter() {
        if let Some(captures) = pattern.captures(text) {
            return Some(RoomLeaveParsed {
                room_id,
                remover: NameRef::SelfUser,
                leavers: split_names(&captures[1])
                    .into_iter()
                    .map(NameRef::Named)
                    .collect(),
                timestamp: payload.timestamp,
            });
        }
    }
    for pattern in SELF_REMOVED.iter() {
        if let Some(captures) = pattern.captures(text) {
            return Some(RoomLeaveParsed {
                room_id,
                remover: NameRef::Named(captures[1].to_string()),
                leavers: vec![NameRef::SelfUser],
                timestamp: payload.timestamp,
            });
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn system(content: &str) -> MessagePayload {
        MessagePayload {
            id: "1".into(),
            kind: MessageKind::System,
            content: content.into(),
            from_account: String::new(),
            to_account: String::new(),
            room_id: Some("7@chatroom".into()),
            timestamp: 1000,
            voice_length: None,
            file_name: None,
            mention_ids: Vec::new(),
        }
    }

    #[test]
    fn self_removes_members() {
        let parsed = parse(&system(r#"你将"Bob、Carol"移出了群聊"#)).unwrap();
        assert_eq!(parsed.remover, NameRef::SelfUser);
        assert_eq!(
            parsed.leavers,
            vec![NameRef::Named("Bob".into()), NameRef::Named("Carol".into())]
        );
    }

    #[test]
    fn self_was_removed() {
        let parsed = parse(&system(r#"你被"Alice"移出群聊"#)).unwrap();
        assert_eq!(parsed.remover, NameRef::Named("Alice".into()));
        assert_eq!(parsed.leavers, vec![NameRef::SelfUser]);
    }

    #[test]
    fn english_remove() {
        let parsed = parse(&system(r#"You removed "Bob" from the group chat"#)).unwrap();
        assert_eq!(parsed.remover, NameRef::SelfUser);
        assert_eq!(parsed.leavers, vec![NameRef::Named("Bob".into())]);
    }

    #[test]
    fn unrelated_text_is_rejected() {
        assert!(parse(&system("welcome")).is_none());
    }
}
