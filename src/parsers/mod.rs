//! Speculative parsers for gateway payloads.
//!
//! Each parser is a pure `payload -> Option<parsed>` function: it inspects
//! a raw message payload and either recognizes its shape or yields `None`.
//! System-type payloads are probed by several parsers in one pass and any
//! subset may match. Side effects of a match (cache invalidation, re-sync
//! triggering, event emission) belong to the client's second pass, never to
//! the parsers themselves.

pub mod friendship;
pub mod new_friend;
pub mod room_invite;
pub mod room_join;
pub mod room_leave;
pub mod room_topic;
pub mod url;

/// A display name in a system message, which may refer to the logged-in
/// user ("You"/"你") instead of naming an account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameRef {
    SelfUser,
    Named(String),
}

/// Result of the room-join system-message parser.
#[derive(Debug, Clone, PartialEq)]
pub struct RoomJoinParsed {
    pub room_id: String,
    pub inviter: NameRef,
    pub invitee_names: Vec<String>,
    pub timestamp: i64,
}

/// Result of the room-leave system-message parser. Leavers are `NameRef`s
/// because "you were removed" names the logged-in user.
#[derive(Debug, Clone, PartialEq)]
pub struct RoomLeaveParsed {
    pub room_id: String,
    pub remover: NameRef,
    pub leavers: Vec<NameRef>,
    pub timestamp: i64,
}

/// Result of the room-topic system-message parser.
#[derive(Debug, Clone, PartialEq)]
pub struct RoomTopicParsed {
    pub room_id: String,
    pub changer: NameRef,
    pub topic: String,
    pub timestamp: i64,
}

/// Splits an enumeration of display names the way the gateway renders it.
pub(crate) fn split_names(names: &str) -> Vec<String> {
    names
        .split(['、', ','])
        .map(|name| name.trim().trim_matches('"').trim_matches('“').trim_matches('”'))
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_lists_split_on_both_separators() {
        assert_eq!(split_names("Ada"), vec!["Ada"]);
        assert_eq!(split_names("Ada、Bob"), vec!["Ada", "Bob"]);
        assert_eq!(split_names("Ada, Bob"), vec!["Ada", "Bob"]);
        assert_eq!(split_names("\"Ada\"、\"Bob\""), vec!["Ada", "Bob"]);
    }
}
