use serde::{Deserialize, Serialize};

/// Message content kinds carried by the gateway's numeric discriminator.
///
/// Simple kinds map 1:1 to a generic message event; `Text`, `UrlLink` and
/// `System` additionally run through the speculative parsers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageKind {
    Text,
    Image,
    Voice,
    Video,
    UrlLink,
    PublicCard,
    PrivateCard,
    MiniProgram,
    Gif,
    Location,
    RedPacket,
    MoneyTransfer,
    System,
    Unknown,
}

impl MessageKind {
    pub fn from_code(code: u32) -> Self {
        match code {
            1 => MessageKind::Text,
            2 => MessageKind::Image,
            3 => MessageKind::Voice,
            4 => MessageKind::Video,
            5 => MessageKind::UrlLink,
            6 => MessageKind::PublicCard,
            7 => MessageKind::PrivateCard,
            8 => MessageKind::MiniProgram,
            9 => MessageKind::Gif,
            10 => MessageKind::Location,
            11 => MessageKind::RedPacket,
            12 => MessageKind::MoneyTransfer,
            13 => MessageKind::System,
            _ => MessageKind::Unknown,
        }
    }

    pub fn code(&self) -> u32 {
        match self {
            MessageKind::Text => 1,
            MessageKind::Image => 2,
            MessageKind::Voice => 3,
            MessageKind::Video => 4,
            MessageKind::UrlLink => 5,
            MessageKind::PublicCard => 6,
            MessageKind::PrivateCard => 7,
            MessageKind::MiniProgram => 8,
            MessageKind::Gif => 9,
            MessageKind::Location => 10,
            MessageKind::RedPacket => 11,
            MessageKind::MoneyTransfer => 12,
            MessageKind::System => 13,
            MessageKind::Unknown => 0,
        }
    }
}

/// A received message as kept in the bounded ephemeral store.
///
/// Inserted on receipt, evicted by capacity or age, never updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessagePayload {
    pub id: String,
    pub kind: MessageKind,
    pub content: String,
    /// Account id of the sender.
    pub from_account: String,
    /// Account id of the receiver (the logged-in user for inbound).
    pub to_account: String,
    /// Room id when the message was posted in a room.
    pub room_id: Option<String>,
    /// Seconds since the epoch.
    pub timestamp: i64,
    /// Voice length in seconds, for voice messages.
    pub voice_length: Option<u32>,
    /// Original file name, for file messages.
    pub file_name: Option<String>,
    /// Account ids mentioned in the message. The sentinel
    /// `announcement@all` stands for "everyone in the room".
    pub mention_ids: Vec<String>,
}

/// The sentinel the gateway uses for an @everyone mention.
pub const MENTION_ALL: &str = "announcement@all";

/// Payload of a URL-link message, also used for sending one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UrlLinkPayload {
    pub url: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub thumbnail_url: String,
}

/// A raw `message` push as it arrives from the gateway.
///
/// `content_type` is absent for "new contact" notifications, which are not
/// messages at all and are parsed straight into a contact upsert.
#[derive(Debug, Clone, Deserialize)]
pub struct WireMessage {
    pub msgid: u64,
    #[serde(default)]
    pub content_type: Option<u32>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub from_account: String,
    #[serde(default)]
    pub to_account: String,
    #[serde(default)]
    pub my_account: String,
    /// Present for room messages.
    #[serde(default)]
    pub g_number: Option<String>,
    #[serde(default)]
    pub send_time: Option<i64>,
    #[serde(default)]
    pub voice_len: Option<u32>,
    #[serde(default)]
    pub file_name: Option<String>,
    /// Comma-joined mentioned account ids, mirroring the send shape.
    #[serde(default)]
    pub to_user: Option<String>,
}

impl WireMessage {
    /// Builds the ephemeral record. Returns `None` when `content_type` is
    /// absent (new-contact notification, handled elsewhere).
    pub fn into_payload(self) -> Option<MessagePayload> {
        let kind = MessageKind::from_code(self.content_type?);
        Some(MessagePayload {
            id: self.msgid.to_string(),
            kind,
            content: self.content,
            from_account: self.from_account,
            to_account: if self.to_account.is_empty() {
                self.my_account
            } else {
                self.to_account
            },
            room_id: self.g_number.filter(|g| !g.is_empty()),
            timestamp: self
                .send_time
                .unwrap_or_else(|| chrono::Utc::now().timestamp()),
            voice_length: self.voice_len,
            file_name: self.file_name,
            mention_ids: self
                .to_user
                .map(|list| {
                    list.split(',')
                        .map(str::trim)
                        .filter(|id| !id.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_codes_round_trip() {
        for code in 1..=13 {
            let kind = MessageKind::from_code(code);
            assert_ne!(kind, MessageKind::Unknown);
            assert_eq!(kind.code(), code);
        }
        assert_eq!(MessageKind::from_code(99), MessageKind::Unknown);
    }

    #[test]
    fn missing_content_type_is_not_a_message() {
        let wire: WireMessage =
            serde_json::from_str(r#"{"msgid":42,"content":"hi"}"#).unwrap();
        assert!(wire.into_payload().is_none());
    }

    #[test]
    fn room_message_keeps_its_room_id() {
        let wire: WireMessage = serde_json::from_str(
            r#"{"msgid":7,"content_type":1,"content":"hi","from_account":"wx-a","g_number":"5@chatroom","send_time":1000}"#,
        )
        .unwrap();
        let payload = wire.into_payload().unwrap();
        assert_eq!(payload.room_id.as_deref(), Some("5@chatroom"));
        assert_eq!(payload.kind, MessageKind::Text);
        assert_eq!(payload.timestamp, 1000);
    }
}
