use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;

/// Gateway API names the bridge submits over the control channel.
pub mod api {
    pub const GET_LOGIN_USER_INFO: &str = "getLoginUserInfo";
    pub const GET_QRCODE: &str = "getWeChatQRCode";
    pub const LOGOUT: &str = "logoutWeChat";
    pub const CONTACT_LIST: &str = "getContactList";
    pub const CONTACT_INFO: &str = "getContactInfo";
    pub const SET_CONTACT_ALIAS: &str = "setContactAlias";
    pub const SEND_MESSAGE: &str = "sendMessage";
    pub const SEND_URL_LINK: &str = "sendUrlLink";
    pub const AT_ROOM_MEMBER: &str = "atRoomMember";
    pub const ROOM_DETAIL: &str = "getRoomDetail";
    pub const ROOM_MEMBER: &str = "getRoomMember";
    pub const ROOM_CREATE: &str = "createRoom";
    pub const ROOM_ADD: &str = "addRoomMember";
    pub const ROOM_INVITE: &str = "inviteRoomMember";
    pub const ROOM_DEL: &str = "removeRoomMember";
    pub const ROOM_QUIT: &str = "quitRoom";
    pub const ROOM_QRCODE: &str = "getRoomQrcode";
    pub const ROOM_TOPIC: &str = "modifyRoomTopic";
    pub const ROOM_ANNOUNCE: &str = "setRoomAnnouncement";
    pub const ROOM_INVITATION_DETAIL: &str = "getRoomInvitationDetail";
    pub const ADD_FRIEND: &str = "addFriend";
    pub const ACCEPT_FRIEND: &str = "acceptFriend";
}

/// One unsolicited notification from the gateway's control channel.
///
/// A closed union: adding a kind is a compile-time-checked change in the
/// client's dispatcher. Every payload is the opaque JSON text the gateway
/// sent; decoding happens at the handler that knows the shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayEvent {
    Heartbeat,
    Reconnect(String),
    Scan(String),
    Login(String),
    Logout(String),
    NotLogin(String),
    Message(String),
    ContactList(String),
    RoomList(String),
    ContactInfo(String),
    ContactRemark(String),
    RoomInfo(String),
    RoomJoin(String),
    RoomMember(String),
    RoomQrcode(String),
    NewFriend(String),
    AddFriend(String),
    DelFriend(String),
    AddFriendBeforeAccept(String),
    RoomCreate(String),
}

impl GatewayEvent {
    /// Maps a wire event name and payload to a typed event. Unknown names
    /// yield `None` and are logged by the transport, not dropped silently.
    pub fn from_wire(name: &str, data: String) -> Option<Self> {
        let event = match name {
            "heartbeat" => GatewayEvent::Heartbeat,
            "reconnect" => GatewayEvent::Reconnect(data),
            "scan" => GatewayEvent::Scan(data),
            "login" => GatewayEvent::Login(data),
            "logout" => GatewayEvent::Logout(data),
            "not-login" => GatewayEvent::NotLogin(data),
            "message" => GatewayEvent::Message(data),
            "contact-list" => GatewayEvent::ContactList(data),
            "room-list" => GatewayEvent::RoomList(data),
            "contact-info" => GatewayEvent::ContactInfo(data),
            "contact-remark" => GatewayEvent::ContactRemark(data),
            "room-info" => GatewayEvent::RoomInfo(data),
            "room-join" => GatewayEvent::RoomJoin(data),
            "room-member" => GatewayEvent::RoomMember(data),
            "room-qrcode" => GatewayEvent::RoomQrcode(data),
            "new-friend" => GatewayEvent::NewFriend(data),
            "add-friend" => GatewayEvent::AddFriend(data),
            "del-friend" => GatewayEvent::DelFriend(data),
            "add-friend-before-accept" => GatewayEvent::AddFriendBeforeAccept(data),
            "room-create" => GatewayEvent::RoomCreate(data),
            _ => return None,
        };
        Some(event)
    }

    pub fn name(&self) -> &'static str {
        match self {
            GatewayEvent::Heartbeat => "heartbeat",
            GatewayEvent::Reconnect(_) => "reconnect",
            GatewayEvent::Scan(_) => "scan",
            GatewayEvent::Login(_) => "login",
            GatewayEvent::Logout(_) => "logout",
            GatewayEvent::NotLogin(_) => "not-login",
            GatewayEvent::Message(_) => "message",
            GatewayEvent::ContactList(_) => "contact-list",
            GatewayEvent::RoomList(_) => "room-list",
            GatewayEvent::ContactInfo(_) => "contact-info",
            GatewayEvent::ContactRemark(_) => "contact-remark",
            GatewayEvent::RoomInfo(_) => "room-info",
            GatewayEvent::RoomJoin(_) => "room-join",
            GatewayEvent::RoomMember(_) => "room-member",
            GatewayEvent::RoomQrcode(_) => "room-qrcode",
            GatewayEvent::NewFriend(_) => "new-friend",
            GatewayEvent::AddFriend(_) => "add-friend",
            GatewayEvent::DelFriend(_) => "del-friend",
            GatewayEvent::AddFriendBeforeAccept(_) => "add-friend-before-accept",
            GatewayEvent::RoomCreate(_) => "room-create",
        }
    }
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("gateway is not connected")]
    NotConnected,
    #[error("gateway control channel closed")]
    Closed,
    #[error("gateway request timed out")]
    Timeout,
    #[error("gateway rejected {api}: {message}")]
    Rpc { api: String, message: String },
    #[error("transport error: {0}")]
    Transport(String),
}

/// The control-channel collaborator the bridge is built on.
///
/// One persistent connection carries both directions: outbound submissions
/// (`request`/`notify`) and the unsolicited event stream. The stream has a
/// single consumer; `take_events` hands the receiver over once per
/// connection and returns `None` afterwards.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Call/response primitive.
    async fn request(&self, api: &str, data: Value) -> Result<Value, GatewayError>;

    /// Fire-and-forget primitive.
    async fn notify(&self, api: &str) -> Result<(), GatewayError>;

    /// Takes the inbound event stream. `None` when already taken.
    async fn take_events(&self) -> Option<mpsc::Receiver<GatewayEvent>>;

    /// Closes the connection and wakes all waiters with `Closed`.
    async fn stop(&self);
}

/// Builds a fresh gateway connection. The client reconnects by dropping
/// the old gateway and asking the factory for a new one, so transports do
/// not need to support re-arming a consumed event stream.
#[async_trait]
pub trait GatewayFactory: Send + Sync {
    async fn connect(&self) -> Result<std::sync::Arc<dyn Gateway>, GatewayError>;
}
