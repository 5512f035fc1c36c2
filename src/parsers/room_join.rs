use super::{NameRef, RoomJoinParsed, split_names};
use crate::types::{MessageKind, MessagePayload};
use once_cell::sync::Lazy;
use regex::Regex;

// Inviter and invitee list both captured.
static OTHER_INVITE: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r#"^"?(.+?)"?邀请"(.+)"加入了群聊"#).unwrap(),
        Regex::new(r#"^"(.+)" invited "(.+)" to the group chat"#).unwrap(),
    ]
});

// The logged-in user is the inviter.
static SELF_INVITE: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r#"^你邀请"(.+)"加入了群聊"#).unwrap(),
        Regex::new(r#"^You invited (.+) to the group chat"#).unwrap(),
    ]
});

// Joined by scanning a QR code the logged-in user shared.
static SELF_QR_INVITE: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r#"^"(.+)"通过扫描你分享的二维码加入群聊"#).unwrap(),
        Regex::new(r#"^"(.+)" joined the group chat via the QR code you shared"#).unwrap(),
    ]
});

// Joined by scanning a named member's QR code.
static OTHER_QR_INVITE: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r#"^"(.+)"通过扫描"(.+)"分享的二维码加入群聊"#).unwrap(),
        Regex::new(r#"^"(.+)" joined the group chat via the QR code shared by "(.+)""#).unwrap(),
    ]
});

/// Probes a system message for the room-join shape.
pub fn parse(payload: &MessagePayload) -> Option<RoomJoinParsed> {
    if payload.kind != MessageKind::System {
        return None;
    }
    let room_id = payload.room_id.clone()?;
    let text = payload.content.trim();

    for pattern in SELF_INVITE.iter() {
        if let Some(captures) = pattern.captures(text) {
            return Some(RoomJoinParsed {
                room_id,
                inviter: NameRef::SelfUser,
                invitee_names: split_names(&captures[1]),
                timestamp: payload.timestamp,
            });
        }
    }
    for pattern in SELF_QR_INVITE.iter() {
        if let Some(captures) = pattern.captures(text) {
            return Some(RoomJoinParsed {
                room_id,
                inviter: NameRef::SelfUser,
                invitee_names: split_names(&captures[1]),
                timestamp: payload.timestamp,
            });
        }
    }
    for pattern in OTHER_QR_INVITE.iter() {
        if let Some(captures) = pattern.captures(text) {
            return Some(RoomJoinParsed {
                room_id,
                inviter: NameRef::Named(captures[2].to_string()),
                invitee_names: split_names(&captures[1]),
                timestamp: payload.timestamp,
            });
        }
    }
    for pattern in OTHER_INVITE.iter() {
        if let Some(captures) = pattern.captures(text) {
            let inviter = match &captures[1] {
                "你" | "You" => NameRef::SelfUser,
                name => NameRef::Named(name.to_string()),
            };
            return Some(RoomJoinParsed {
                room_id,
                inviter,
                invitee_names: split_names(&captures[2]),
                timestamp: payload.timestamp,
            });
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn system(room: &str, content: &str) -> MessagePayload {
        MessagePayload {
            id: "1".into(),
            kind: MessageKind::System,
            content: content.into(),
            from_account: String::new(),
            to_account: String::new(),
            room_id: Some(room.into()),
            timestamp: 1000,
            voice_length: None,
            file_name: None,
            mention_ids: Vec::new(),
        }
    }

    #[test]
    fn other_invites_other() {
        let parsed = parse(&system("7@chatroom", r#""Alice"邀请"Bob"加入了群聊"#)).unwrap();
        assert_eq!(parsed.inviter, NameRef::Named("Alice".into()));
        assert_eq!(parsed.invitee_names, vec!["Bob"]);
        assert_eq!(parsed.room_id, "7@chatroom");
    }

    #[test]
    fn self_invites_many() {
        let parsed = parse(&system("7@chatroom", r#"你邀请"Bob、Carol"加入了群聊"#)).unwrap();
        assert_eq!(parsed.inviter, NameRef::SelfUser);
        assert_eq!(parsed.invitee_names, vec!["Bob", "Carol"]);
    }

    #[test]
    fn english_invite() {
        let parsed =
            parse(&system("7@chatroom", r#""Alice" invited "Bob" to the group chat"#)).unwrap();
        assert_eq!(parsed.inviter, NameRef::Named("Alice".into()));
        assert_eq!(parsed.invitee_names, vec!["Bob"]);
    }

    #[test]
    fn qr_join_credits_the_sharer() {
        let parsed = parse(&system(
            "7@chatroom",
            r#""Bob"通过扫描"Alice"分享的二维码加入群聊"#,
        ))
        .unwrap();
        assert_eq!(parsed.inviter, NameRef::Named("Alice".into()));
        assert_eq!(parsed.invitee_names, vec!["Bob"]);
    }

    #[test]
    fn non_join_text_is_rejected() {
        assert!(parse(&system("7@chatroom", "ordinary system text")).is_none());
    }

    #[test]
    fn non_system_and_roomless_are_rejected() {
        let mut payload = system("7@chatroom", r#"你邀请"Bob"加入了群聊"#);
        payload.kind = MessageKind::Text;
        assert!(parse(&payload).is_none());

        let mut payload = system("7@chatroom", r#"你邀请"Bob"加入了群聊"#);
        payload.room_id = None;
        assert!(parse(&payload).is_none());
    }
}
