use serde::{Deserialize, Serialize};

/// Discriminator of a stored friendship record: how the event reached us.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FriendshipKind {
    /// Inbound friend request awaiting our acceptance.
    Receive,
    /// The other side accepted; we are now friends.
    Confirm,
    /// The other side requires verification before chatting.
    Verify,
}

/// A friendship event record. Created on a push or a matching text parse,
/// read by the caller, never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FriendshipPayload {
    pub contact_id: String,
    /// Verification text attached to the request, empty otherwise.
    pub hello: String,
    pub kind: FriendshipKind,
    pub timestamp: i64,
}

/// `new-friend` push payload: an inbound friend request.
#[derive(Debug, Clone, Deserialize)]
pub struct WireFriendRequest {
    pub account: String,
    #[serde(default)]
    pub account_alias: String,
    #[serde(default)]
    pub nickname: String,
    #[serde(default)]
    pub thumb: String,
    /// Hello/verification text the requester attached.
    #[serde(default)]
    pub content: String,
}

/// Direction flag of an `add-friend` (request accepted) push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptedBy {
    /// Our outbound request was accepted by the peer.
    Peer,
    /// We accepted a request from someone else.
    Us,
}

impl AcceptedBy {
    pub fn from_wire(code: u8) -> Option<Self> {
        match code {
            1 => Some(AcceptedBy::Peer),
            2 => Some(AcceptedBy::Us),
            _ => None,
        }
    }
}

/// `add-friend` push payload. `data` nests the new contact as JSON text.
#[derive(Debug, Clone, Deserialize)]
pub struct WireFriendAccepted {
    #[serde(rename = "type")]
    pub accepted_type: u8,
    pub data: String,
    #[serde(default)]
    pub v1: String,
}

/// `del-friend` push payload.
#[derive(Debug, Clone, Deserialize)]
pub struct WireFriendDeleted {
    pub account: String,
}

/// `add-friend-before-accept` push payload: the gateway acknowledges our
/// outbound friend request before the peer reacts.
#[derive(Debug, Clone, Deserialize)]
pub struct WireFriendPreAccept {
    #[serde(default)]
    pub my_account: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub to_name: String,
    #[serde(default)]
    pub to_thumb: String,
}

/// Resolved acknowledgement handed to a `friendship_add` waiter.
#[derive(Debug, Clone, PartialEq)]
pub struct FriendAddAck {
    pub my_account: String,
    pub friend_account: String,
    pub friend_phone: String,
    pub friend_thumb: String,
}

impl WireFriendPreAccept {
    pub fn into_ack(self) -> FriendAddAck {
        FriendAddAck {
            my_account: self.my_account,
            friend_account: self.to_name,
            friend_phone: self.phone,
            friend_thumb: self.to_thumb,
        }
    }
}
