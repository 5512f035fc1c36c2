use std::sync::Arc;
use tokio::sync::broadcast;

// The size of the broadcast channel buffer.
const CHANNEL_CAPACITY: usize = 100;

/// Scan/login-challenge progress as reported by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStatus {
    Unknown,
    Cancel,
    Waiting,
    Scanned,
    Confirmed,
    Timeout,
}

impl ScanStatus {
    pub fn from_code(code: u8) -> Self {
        match code {
            1 => ScanStatus::Waiting,
            2 => ScanStatus::Scanned,
            3 => ScanStatus::Confirmed,
            4 => ScanStatus::Timeout,
            5 => ScanStatus::Cancel,
            _ => ScanStatus::Unknown,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScanEvent {
    /// QR code content to render, empty when only the status changed.
    pub qrcode: String,
    pub status: ScanStatus,
}

#[derive(Debug, Clone)]
pub struct LoginEvent {
    pub account_alias: String,
}

#[derive(Debug, Clone)]
pub struct LogoutEvent {
    pub contact_id: String,
    pub data: String,
}

/// Emitted alongside logout: the session must be torn down and restarted,
/// not merely re-authenticated.
#[derive(Debug, Clone)]
pub struct ResetEvent {
    pub data: String,
}

#[derive(Debug, Clone)]
pub struct MessageEvent {
    pub message_id: String,
}

#[derive(Debug, Clone)]
pub struct FriendshipEvent {
    pub friendship_id: String,
}

#[derive(Debug, Clone)]
pub struct RoomJoinEvent {
    pub room_id: String,
    pub inviter_id: String,
    /// Resolved invitee account ids; may be empty when name resolution gave
    /// up after its bounded retries.
    pub invitee_ids: Vec<String>,
    pub timestamp: i64,
}

#[derive(Debug, Clone)]
pub struct RoomLeaveEvent {
    pub room_id: String,
    pub remover_id: String,
    pub removee_ids: Vec<String>,
    pub timestamp: i64,
}

#[derive(Debug, Clone)]
pub struct RoomTopicEvent {
    pub room_id: String,
    pub changer_id: String,
    pub old_topic: String,
    pub new_topic: String,
    pub timestamp: i64,
}

#[derive(Debug, Clone)]
pub struct RoomInviteEvent {
    pub room_invitation_id: String,
}

/// Heartbeat echo answering `Client::ding`.
#[derive(Debug, Clone)]
pub struct DongEvent {
    pub data: String,
}

// Macro to generate EventBus fields and constructor
macro_rules! define_event_bus {
    ($(($field:ident, $type:ty)),* $(,)?) => {
        /// Typed event bus with a separate broadcast channel per domain
        /// event, so callers subscribe only to what they consume.
        #[derive(Debug)]
        pub struct EventBus {
            $(
                pub $field: broadcast::Sender<$type>,
            )*
        }

        impl EventBus {
            pub fn new() -> Self {
                Self {
                    $(
                        $field: broadcast::channel(CHANNEL_CAPACITY).0,
                    )*
                }
            }
        }
    };
}

define_event_bus! {
    (message, Arc<MessageEvent>),
    (scan, Arc<ScanEvent>),
    (login, Arc<LoginEvent>),
    (logout, Arc<LogoutEvent>),
    (reset, Arc<ResetEvent>),
    (friendship, Arc<FriendshipEvent>),
    (room_join, Arc<RoomJoinEvent>),
    (room_leave, Arc<RoomLeaveEvent>),
    (room_topic, Arc<RoomTopicEvent>),
    (room_invite, Arc<RoomInviteEvent>),
    (dong, Arc<DongEvent>),
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// Send on a channel nobody subscribed to yet; the error is expected
    /// and dropped.
    pub(crate) fn emit<T>(sender: &broadcast::Sender<Arc<T>>, event: T) {
        let _ = sender.send(Arc::new(event));
    }
}
