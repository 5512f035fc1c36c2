use crate::types::{
    FriendshipKind, FriendshipPayload, MessageKind, MessagePayload, WireFriendRequest,
    is_contact_id,
};
use once_cell::sync::Lazy;
use regex::Regex;

// Texts the protocol sends when a friend request has been accepted; some
// arrive as plain text messages, some as system messages.
static CONFIRM: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"^我通过了你的朋友验证请求，现在我们可以开始聊天了$").unwrap(),
        Regex::new(r"^你已添加了(.+)，现在可以开始聊天了。$").unwrap(),
        Regex::new(r"刚刚把你添加到通讯录，现在可以开始聊天了").unwrap(),
        Regex::new(r"^I've accepted your friend request\. Now let's chat!$").unwrap(),
        Regex::new(r"^You have added (.+) as your WeChat contact\. Start chatting!$").unwrap(),
    ]
});

// The peer requires verification before we may message them.
static VERIFY: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"开启了朋友验证，你还不是他（她）朋友").unwrap(),
        Regex::new(r"has enabled friend confirmation").unwrap(),
    ]
});

fn probe(payload: &MessagePayload, patterns: &[Regex], kind: FriendshipKind) -> Option<FriendshipPayload> {
    // Friendship signals are direct messages from the peer, never room
    // traffic.
    if payload.room_id.is_some() || !is_contact_id(&payload.from_account) {
        return None;
    }
    if !matches!(payload.kind, MessageKind::Text | MessageKind::System) {
        return None;
    }
    let text = payload.content.trim();
    patterns.iter().any(|p| p.is_match(text)).then(|| FriendshipPayload {
        contact_id: payload.from_account.clone(),
        hello: String::new(),
        kind,
        timestamp: payload.timestamp,
    })
}

/// Probes a text or system message for the "request accepted" shape.
pub fn confirm(payload: &MessagePayload) -> Option<FriendshipPayload> {
    probe(payload, &CONFIRM, FriendshipKind::Confirm)
}

/// Probes a text or system message for the "verification required" shape.
pub fn verify(payload: &MessagePayload) -> Option<FriendshipPayload> {
    probe(payload, &VERIFY, FriendshipKind::Verify)
}

/// Builds the stored record for an inbound friend request push.
pub fn receive(request: &WireFriendRequest, timestamp: i64) -> Option<FriendshipPayload> {
    if request.account.is_empty() {
        return None;
    }
    Some(FriendshipPayload {
        contact_id: request.account.clone(),
        hello: request.content.clone(),
        kind: FriendshipKind::Receive,
        timestamp,
    })
}
