use serde::{Deserialize, Serialize};

/// A room member as stored in the membership map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomMemberPayload {
    pub account: String,
    pub account_alias: String,
    /// Display name of the member.
    pub name: String,
    /// Nickname the member set inside this room, empty if none.
    pub room_alias: String,
    pub avatar: String,
}

/// A room record.
///
/// `owner` may stay empty until a detail sync resolves it; a room is
/// *incomplete* while `members` or `owner` is empty, and completeness gates
/// whether a fresh sync is triggered on read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomPayload {
    pub id: String,
    pub name: String,
    pub avatar: String,
    pub owner: String,
    pub disturb: u8,
    pub members: Vec<RoomMemberPayload>,
}

impl RoomPayload {
    pub fn is_complete(&self) -> bool {
        !self.members.is_empty() && !self.owner.is_empty()
    }
}

/// A stored room invitation, written on a matching URL-message parse and
/// read once by the accept operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomInvitationPayload {
    pub id: String,
    pub from_user: String,
    pub receiver: String,
    pub room_name: String,
    pub thumb_url: String,
    pub timestamp: i64,
    /// Invitation token URL, dereferenced on accept.
    pub url: String,
}

/// Outer `room-list` push payload; `info` is a nested JSON string.
#[derive(Debug, Clone, Deserialize)]
pub struct WireRoomListBox {
    pub info: String,
    #[serde(default)]
    pub my_account: String,
}

/// One entry of the decoded room list.
#[derive(Debug, Clone, Deserialize)]
pub struct WireRoomListEntry {
    pub number: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub thumb: String,
}

impl WireRoomListEntry {
    pub fn into_payload(self) -> RoomPayload {
        RoomPayload {
            id: self.number,
            name: self.name,
            avatar: self.thumb,
            owner: String::new(),
            disturb: 0,
            members: Vec::new(),
        }
    }
}

/// `room-info` push payload: the answer to a room detail sync request.
#[derive(Debug, Clone, Deserialize)]
pub struct WireRoomInfo {
    pub number: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub thumb: String,
    /// Owner account id.
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub disturb: u8,
}

/// One member of a `room-member` push.
#[derive(Debug, Clone, Deserialize)]
pub struct WireRoomMember {
    #[serde(rename = "userName")]
    pub user_name: String,
    #[serde(rename = "nickName", default)]
    pub nick_name: String,
    #[serde(rename = "displayName", default)]
    pub display_name: String,
    #[serde(rename = "bigHeadImgUrl", default)]
    pub big_head_img_url: String,
    /// Room id this member list belongs to.
    #[serde(default)]
    pub number: String,
}

impl WireRoomMember {
    pub fn into_payload(self) -> RoomMemberPayload {
        RoomMemberPayload {
            account: self.user_name.clone(),
            account_alias: self.user_name,
            name: self.nick_name,
            room_alias: self.display_name,
            avatar: self.big_head_img_url,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireRoomMemberList {
    #[serde(rename = "memberList")]
    pub member_list: Vec<WireRoomMember>,
}

/// Membership change direction of a `room-join` push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomChange {
    Join,
    Leave,
}

impl RoomChange {
    pub fn from_wire(code: &str) -> Option<Self> {
        match code {
            "1" => Some(RoomChange::Join),
            "2" => Some(RoomChange::Leave),
            _ => None,
        }
    }
}

/// `room-join` push payload (a membership delta, distinct from the
/// system-message join parser).
#[derive(Debug, Clone, Deserialize)]
pub struct WireRoomJoin {
    pub g_number: String,
    pub account: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub my_account: String,
    #[serde(rename = "type")]
    pub change: String,
}

/// `room-qrcode` push payload.
#[derive(Debug, Clone, Deserialize)]
pub struct WireRoomQrcode {
    pub group_number: String,
    pub qrcode: String,
}

/// `room-create` push payload.
#[derive(Debug, Clone, Deserialize)]
pub struct WireRoomCreate {
    /// Id of the freshly created room.
    pub account: String,
    #[serde(default)]
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completeness_requires_members_and_owner() {
        let mut room = RoomPayload {
            id: "1@chatroom".into(),
            name: "team".into(),
            avatar: String::new(),
            owner: String::new(),
            disturb: 0,
            members: Vec::new(),
        };
        assert!(!room.is_complete());

        room.owner = "wx-owner".into();
        assert!(!room.is_complete());

        room.members.push(RoomMemberPayload {
            account: "wx-owner".into(),
            account_alias: "wx-owner".into(),
            name: "Owner".into(),
            room_alias: String::new(),
            avatar: String::new(),
        });
        assert!(room.is_complete());
    }

    #[test]
    fn nested_room_list_decodes() {
        let outer: WireRoomListBox = serde_json::from_str(
            r#"{"info":"[{\"number\":\"9@chatroom\",\"name\":\"dev\",\"thumb\":\"\"}]","my_account":"wx-1"}"#,
        )
        .unwrap();
        let rooms: Vec<WireRoomListEntry> = serde_json::from_str(&outer.info).unwrap();
        assert_eq!(rooms.len(), 1);
        assert_eq!(rooms[0].number, "9@chatroom");
    }
}
