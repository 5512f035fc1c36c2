use super::url;
use crate::types::{MessageKind, MessagePayload, RoomInvitationPayload};
use once_cell::sync::Lazy;
use regex::Regex;

static INVITE_TITLE: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"邀请你加入群聊").unwrap(),
        Regex::new(r"[Ii]nvitation to join .*group").unwrap(),
    ]
});

static ROOM_NAME: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r#"邀请你加入群聊“(.+?)”"#).unwrap(),
        Regex::new(r#"join the group chat "(.+?)""#).unwrap(),
    ]
});

/// Probes a URL-link message for the room-invitation shape. The invitation
/// id is the message id; the stored URL is the token dereferenced on
/// accept.
pub fn parse(payload: &MessagePayload) -> Option<RoomInvitationPayload> {
    if payload.kind != MessageKind::UrlLink {
        return None;
    }
    let link = url::parse(payload)?;
    if !INVITE_TITLE.iter().any(|p| p.is_match(&link.title)) {
        return None;
    }
    let room_name = ROOM_NAME
        .iter()
        .find_map(|p| p.captures(&link.description))
        .map(|captures| captures[1].to_string())
        .unwrap_or_default();
    Some(RoomInvitationPayload {
        id: payload.id.clone(),
        from_user: payload.from_account.clone(),
        receiver: payload.to_account.clone(),
        room_name,
        thumb_url: link.thumbnail_url,
        timestamp: payload.timestamp,
        url: link.url,
    })
}
