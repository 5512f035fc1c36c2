use super::{NameRef, RoomTopicParsed};
use crate::types::{MessageKind, MessagePayload};
use once_cell::sync::Lazy;
use regex::Regex;

static SELF_CHANGE: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r#"^你修改群名为“(.+)”"#).unwrap(),
        Regex::new(r#"^You changed the group name to "(.+)""#).unwrap(),
    ]
});

static OTHER_CHANGE: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r#"^"(.+)"修改群名为“(.+)”"#).unwrap(),
        Regex::new(r#"^"(.+)" changed the group name to "(.+)""#).unwrap(),
    ]
});

/// Probes a system message for the room-topic-change shape.
pub fn parse(payload: &MessagePayload) -> Option<RoomTopicParsed> {
    if payload.kind != MessageKind::System {
        return None;
    }
    let room_id = payload.room_id.clone()?;
    let text = payload.content.trim();

    for pattern in SELF_CHANGE.iter() {
        if let Some(captures) = pattern.captures(text) {
            return Some(RoomTopicParsed {
                room_id,
                changer: NameRef::SelfUser,
                topic: captures[1].to_string(),
                timestamp: payload.timestamp,
            });
        }
    }
    for pattern in OTHER_CHANGE.iter() {
        if let Some(captures) = pattern.captures(text) {
            return Some(RoomTopicParsed {
                room_id,
                changer: NameRef::Named(captures[1].to_string()),
                topic: captures[2].to_string(),
                timestamp: payload.timestamp,
            });
        }
    }
    None
}
