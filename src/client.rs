use crate::config::{
    BridgeConfig, CONNECT_RETRY_DELAY, MESSAGE_CACHE_AGE, MESSAGE_CACHE_MAX, NAME_RESOLVE_ATTEMPTS,
    RECONNECT_DEBOUNCE, SYNC_INTERVAL,
};
use crate::debounce::ReconnectDebouncer;
use crate::error::BridgeError;
use crate::gateway::{Gateway, GatewayEvent, GatewayFactory, api};
use crate::parsers::{self, NameRef};
use crate::queue::DelayQueueExecutor;
use crate::request::PendingReplies;
use crate::session::{SessionSlot, SessionStore};
use crate::store::cache_manager::CacheManager;
use crate::store::traits::EntityStore;
use crate::types::events::{
    DongEvent, EventBus, FriendshipEvent, LoginEvent, LogoutEvent, MessageEvent, ResetEvent,
    RoomInviteEvent, RoomJoinEvent, RoomLeaveEvent, RoomTopicEvent, ScanEvent, ScanStatus,
};
use crate::types::{
    AcceptedBy, ContactPayload, FriendAddAck, MessageKind, MessagePayload, RoomMemberPayload,
    RoomPayload, WireContactInfo, WireContactList, WireContactRemark, WireFriendAccepted,
    WireFriendDeleted, WireFriendPreAccept, WireFriendRequest, WireLoginInfo, WireMessage,
    WireRoomCreate, WireRoomInfo, WireRoomJoin, WireRoomListBox, WireRoomListEntry,
    WireRoomMemberList, WireRoomQrcode, RoomChange, is_contact_id,
};
use log::{debug, error, info, warn};
use moka::future::Cache as MokaCache;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, Notify, RwLock, mpsc, watch};

/// Connection lifecycle of the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    Disconnected,
    /// Connecting to the gateway.
    Pending,
    /// Control channel is up, nobody is logged in yet.
    Connected,
    LoggedIn,
    PendingStop,
}

pub struct Client {
    config: BridgeConfig,
    factory: Arc<dyn GatewayFactory>,
    gateway: RwLock<Option<Arc<dyn Gateway>>>,
    backend: Arc<dyn EntityStore>,
    session: SessionStore,

    pub event_bus: Arc<EventBus>,
    state_tx: watch::Sender<BridgeState>,
    self_id: RwLock<Option<String>>,

    /// The durable entity cache; `None` until a login event initializes it.
    pub(crate) cache: RwLock<Option<Arc<CacheManager>>>,

    /// Bounded ephemeral store for recently seen message payloads, used for
    /// deferred dereferencing (URL payloads, forwards).
    pub(crate) recent_messages: MokaCache<String, MessagePayload>,

    // Pending-reply registries, one per reply domain.
    pub(crate) contact_replies: PendingReplies<ContactPayload>,
    pub(crate) room_replies: PendingReplies<RoomPayload>,
    pub(crate) room_member_replies: PendingReplies<Vec<RoomMemberPayload>>,
    pub(crate) room_qrcode_replies: PendingReplies<String>,
    pub(crate) friend_add_replies: PendingReplies<FriendAddAck>,
    pub(crate) room_create_replies: PendingReplies<String>,

    // Throttled sync queues, one per synchronization domain so a burst in
    // one domain cannot starve the others.
    pub(crate) sync_contact_queue: DelayQueueExecutor,
    pub(crate) sync_room_queue: DelayQueueExecutor,
    pub(crate) sync_room_member_queue: DelayQueueExecutor,

    reconnect: ReconnectDebouncer,
    reconnect_rx: std::sync::Mutex<Option<mpsc::UnboundedReceiver<String>>>,
    connect_lock: Mutex<()>,
    shutdown: Arc<Notify>,
    is_running: AtomicBool,
}

impl Client {
    pub fn new(
        config: BridgeConfig,
        factory: Arc<dyn GatewayFactory>,
        backend: Arc<dyn EntityStore>,
    ) -> Arc<Self> {
        let (reconnect, reconnect_rx) = ReconnectDebouncer::new(RECONNECT_DEBOUNCE);
        let session = SessionStore::new(&config.store_dir);
        let (state_tx, _) = watch::channel(BridgeState::Disconnected);

        Arc::new(Self {
            config,
            factory,
            gateway: RwLock::new(None),
            backend,
            session,
            event_bus: Arc::new(EventBus::new()),
            state_tx,
            self_id: RwLock::new(None),
            cache: RwLock::new(None),
            recent_messages: MokaCache::builder()
                .max_capacity(MESSAGE_CACHE_MAX)
                .time_to_live(MESSAGE_CACHE_AGE)
                .build(),
            contact_replies: PendingReplies::new(),
            room_replies: PendingReplies::new(),
            room_member_replies: PendingReplies::new(),
            room_qrcode_replies: PendingReplies::new(),
            friend_add_replies: PendingReplies::new(),
            room_create_replies: PendingReplies::new(),
            sync_contact_queue: DelayQueueExecutor::new("contact-sync", SYNC_INTERVAL),
            sync_room_queue: DelayQueueExecutor::new("room-sync", SYNC_INTERVAL),
            sync_room_member_queue: DelayQueueExecutor::new("room-member-sync", SYNC_INTERVAL),
            reconnect,
            reconnect_rx: std::sync::Mutex::new(Some(reconnect_rx)),
            connect_lock: Mutex::new(()),
            shutdown: Arc::new(Notify::new()),
            is_running: AtomicBool::new(false),
        })
    }

    pub fn state(&self) -> watch::Receiver<BridgeState> {
        self.state_tx.subscribe()
    }

    pub async fn self_id(&self) -> Result<String, BridgeError> {
        self.self_id
            .read()
            .await
            .clone()
            .ok_or(BridgeError::NotLoggedIn)
    }

    pub(crate) async fn cache(&self, caller: &'static str) -> Result<Arc<CacheManager>, BridgeError> {
        self.cache
            .read()
            .await
            .clone()
            .ok_or(BridgeError::CacheNotReady(caller))
    }

    pub(crate) async fn gateway(&self) -> Result<Arc<dyn Gateway>, BridgeError> {
        self.gateway
            .read()
            .await
            .clone()
            .ok_or(BridgeError::Gateway(crate::gateway::GatewayError::NotConnected))
    }

    /// Connects to the gateway and starts reacting to its event stream.
    /// Returns once the control channel is up; login happens asynchronously
    /// when the gateway pushes its login event.
    pub async fn connect(self: &Arc<Self>) -> Result<(), BridgeError> {
        self.is_running.store(true, Ordering::SeqCst);
        self.spawn_reconnect_listener();
        self.start_session().await;
        Ok(())
    }

    /// Brings one gateway session up. Connection failures here are never
    /// terminal: the loop retries with a fixed delay until it succeeds or
    /// the client is stopped.
    async fn start_session(self: &Arc<Self>) {
        let _guard = self.connect_lock.lock().await;
        self.state_tx.send_replace(BridgeState::Pending);

        let gateway = loop {
            if !self.is_running.load(Ordering::SeqCst) {
                return;
            }
            match self.factory.connect().await {
                Ok(gateway) => match gateway.notify(api::GET_LOGIN_USER_INFO).await {
                    Ok(()) => break gateway,
                    Err(e) => {
                        info!(target: "Bridge/Client", "gateway probe failed: {e}, retrying in {CONNECT_RETRY_DELAY:?}");
                    }
                },
                Err(e) => {
                    info!(target: "Bridge/Client", "gateway connect failed: {e}, retrying in {CONNECT_RETRY_DELAY:?}");
                }
            }
            tokio::time::sleep(CONNECT_RETRY_DELAY).await;
        };

        let Some(mut events) = gateway.take_events().await else {
            error!(target: "Bridge/Client", "gateway event stream was already consumed");
            self.reconnect.signal("event stream unavailable");
            return;
        };
        *self.gateway.write().await = Some(gateway);

        let client = self.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                client.dispatch(event).await;
            }
            if client.is_running.load(Ordering::SeqCst) {
                client.reconnect.signal("event stream ended");
            }
        });

        self.state_tx.send_replace(BridgeState::Connected);
    }

    /// Debounced reconnect firing: tear the session down and start over.
    fn spawn_reconnect_listener(self: &Arc<Self>) {
        let Some(mut rx) = self.reconnect_rx.lock().unwrap().take() else {
            return;
        };
        let client = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    reason = rx.recv() => match reason {
                        Some(reason) => {
                            info!(target: "Bridge/Client", "reinitializing session: {reason}");
                            client.teardown_session().await;
                            client.start_session().await;
                        }
                        None => break,
                    },
                    _ = client.shutdown.notified() => break,
                }
            }
        });
    }

    async fn teardown_session(&self) {
        if let Some(gateway) = self.gateway.write().await.take() {
            gateway.stop().await;
        }
        // Wake every suspended lookup; they observe the closed registry and
        // return instead of waiting on a connection that is gone.
        self.contact_replies.clear().await;
        self.room_replies.clear().await;
        self.room_member_replies.clear().await;
        self.room_qrcode_replies.clear().await;
        self.friend_add_replies.clear().await;
        self.room_create_replies.clear().await;
        self.state_tx.send_replace(BridgeState::Disconnected);
    }

    /// Orderly shutdown: flushes and releases the cache, closes the gateway
    /// and stops every background task.
    pub async fn stop(&self) -> Result<(), BridgeError> {
        self.state_tx.send_replace(BridgeState::PendingStop);
        self.is_running.store(false, Ordering::SeqCst);
        self.shutdown.notify_waiters();

        if let Some(cache) = self.cache.write().await.take() {
            cache.release().await?;
        }
        self.teardown_session().await;
        Ok(())
    }

    /// Asks the gateway to log the account out. The session teardown runs
    /// when the corresponding logout push arrives.
    pub async fn logout(&self) -> Result<(), BridgeError> {
        let self_id = self.self_id().await?;
        self.gateway()
            .await?
            .request(api::LOGOUT, json!({ "my_account": self_id }))
            .await?;
        Ok(())
    }

    /// Emits a `dong` echo, the liveness probe callers can round-trip.
    pub fn ding(&self, data: Option<String>) {
        EventBus::emit(
            &self.event_bus.dong,
            DongEvent {
                data: data.unwrap_or_else(|| "ding-dong".to_string()),
            },
        );
    }

    /// The single exhaustive dispatcher for the inbound event stream.
    ///
    /// Handlers that may suspend on a pending reply (message
    /// classification, room detail sync, login challenges) are spawned so
    /// the stream keeps draining; the push event that would resolve their
    /// wait arrives on this same stream.
    pub(crate) async fn dispatch(self: &Arc<Self>, event: GatewayEvent) {
        debug!(target: "Bridge/Client", "gateway event: {}", event.name());
        match event {
            GatewayEvent::Heartbeat => self.ding(Some("heartbeat".to_string())),
            GatewayEvent::Reconnect(reason) => self.reconnect.signal(reason),
            GatewayEvent::Scan(data) => self.log_err("scan", self.on_scan(data).await),
            GatewayEvent::Login(data) => {
                let client = self.clone();
                tokio::spawn(async move {
                    let result = client.on_login(data).await;
                    client.log_err("login", result);
                });
            }
            GatewayEvent::Logout(data) => self.log_err("logout", self.on_logout(data).await),
            GatewayEvent::NotLogin(data) => {
                let client = self.clone();
                tokio::spawn(async move {
                    let result = client.on_not_login(data).await;
                    client.log_err("not-login", result);
                });
            }
            GatewayEvent::Message(data) => {
                let client = self.clone();
                tokio::spawn(async move {
                    let result = client.on_message(data).await;
                    client.log_err("message", result);
                });
            }
            GatewayEvent::ContactList(data) => {
                self.log_err("contact-list", self.on_contact_list(data).await)
            }
            GatewayEvent::RoomList(data) => self.log_err("room-list", self.on_room_list(data).await),
            GatewayEvent::ContactInfo(data) => {
                self.log_err("contact-info", self.on_contact_info(data).await)
            }
            GatewayEvent::ContactRemark(data) => {
                self.log_err("contact-remark", self.on_contact_remark(data).await)
            }
            GatewayEvent::RoomInfo(data) => {
                let client = self.clone();
                tokio::spawn(async move {
                    let result = client.on_room_info(data).await;
                    client.log_err("room-info", result);
                });
            }
            GatewayEvent::RoomJoin(data) => {
                self.log_err("room-join", self.on_room_join_push(data).await)
            }
            GatewayEvent::RoomMember(data) => {
                self.log_err("room-member", self.on_room_member(data).await)
            }
            GatewayEvent::RoomQrcode(data) => {
                self.log_err("room-qrcode", self.on_room_qrcode(data).await)
            }
            GatewayEvent::NewFriend(data) => {
                self.log_err("new-friend", self.on_new_friend(data).await)
            }
            GatewayEvent::AddFriend(data) => {
                self.log_err("add-friend", self.on_add_friend(data).await)
            }
            GatewayEvent::DelFriend(data) => {
                self.log_err("del-friend", self.on_del_friend(data).await)
            }
            GatewayEvent::AddFriendBeforeAccept(data) => self.log_err(
                "add-friend-before-accept",
                self.on_friend_pre_accept(data).await,
            ),
            GatewayEvent::RoomCreate(data) => {
                self.log_err("room-create", self.on_room_create(data).await)
            }
        }
    }

    fn log_err(&self, event: &str, result: Result<(), BridgeError>) {
        if let Err(e) = result {
            warn!(target: "Bridge/Client", "{event} handler failed: {e}");
        }
    }

    async fn on_scan(&self, raw: String) -> Result<(), BridgeError> {
        #[derive(Deserialize)]
        struct WireScan {
            #[serde(default)]
            status: Option<u8>,
            #[serde(default)]
            url: String,
        }
        let wire: WireScan = serde_json::from_str(&raw)?;
        let event = match wire.status {
            Some(status) => ScanEvent {
                qrcode: String::new(),
                status: ScanStatus::from_code(status),
            },
            None => ScanEvent {
                qrcode: wire.url,
                status: ScanStatus::Waiting,
            },
        };
        EventBus::emit(&self.event_bus.scan, event);
        Ok(())
    }

    async fn on_login(self: &Arc<Self>, raw: String) -> Result<(), BridgeError> {
        let wire: WireLoginInfo = serde_json::from_str(&raw)?;
        let alias = if wire.account_alias.is_empty() {
            wire.account.clone()
        } else {
            wire.account_alias.clone()
        };
        info!(target: "Bridge/Client", "login succeeded for {alias}");

        let cache = CacheManager::init(self.backend.clone(), alias.clone()).await?;

        let mut self_contact = ContactPayload::stub(wire.account.clone(), wire.name.clone());
        self_contact.account_alias = alias.clone();
        self_contact.avatar = wire.thumb.clone();
        cache.set_contact(&alias, self_contact).await?;

        *self.cache.write().await = Some(cache);
        *self.self_id.write().await = Some(alias.clone());

        let slot = SessionSlot {
            task_id: wire.task_id.clone(),
            account: wire.account.clone(),
            account_alias: alias.clone(),
        };
        if let Err(e) = self.session.save(&slot).await {
            warn!(target: "Bridge/Client", "session slot not saved: {e}");
        }
        self.state_tx.send_replace(BridgeState::LoggedIn);

        EventBus::emit(
            &self.event_bus.login,
            LoginEvent {
                account_alias: alias,
            },
        );

        // Only after the cache is in place: ask for the full contact list.
        self.gateway()
            .await?
            .request(api::CONTACT_LIST, json!({ "my_account": wire.account }))
            .await?;
        Ok(())
    }

    async fn on_logout(&self, raw: String) -> Result<(), BridgeError> {
        let contact_id = self.self_id.read().await.clone().unwrap_or_default();
        info!(target: "Bridge/Client", "logout for {contact_id}");

        if let Some(cache) = self.cache.write().await.take() {
            if let Err(e) = cache.release().await {
                warn!(target: "Bridge/Client", "cache release on logout failed: {e}");
            }
        }
        *self.self_id.write().await = None;
        self.state_tx.send_replace(BridgeState::Connected);

        EventBus::emit(
            &self.event_bus.logout,
            LogoutEvent {
                contact_id,
                data: raw,
            },
        );
        // Logout means the session must be rebuilt from scratch, not merely
        // re-authenticated; the caller layer reacts to `reset`.
        EventBus::emit(
            &self.event_bus.reset,
            ResetEvent {
                data: "reset after logout event".to_string(),
            },
        );
        Ok(())
    }

    async fn on_not_login(&self, raw: String) -> Result<(), BridgeError> {
        debug!(target: "Bridge/Client", "not-login: {raw}");
        let data = match self.session.load().await {
            // A previous identity is known: ask for a challenge scoped to
            // it so the user can reconnect to the same account.
            Some(slot) if !slot.account.is_empty() => json!({ "account": slot.account }),
            _ => json!({}),
        };
        self.gateway().await?.request(api::GET_QRCODE, data).await?;
        Ok(())
    }

    /// Classification of one inbound message payload.
    async fn on_message(self: &Arc<Self>, raw: String) -> Result<(), BridgeError> {
        let wire: WireMessage = serde_json::from_str(&raw)?;

        if wire.content_type.is_none() {
            // Not a message: an unsolicited new-contact notification.
            if let Some(contact) = parsers::new_friend::parse(&raw) {
                let cache = self.cache("on_message").await?;
                cache.set_contact(&contact.account_alias.clone(), contact).await?;
            }
            return Ok(());
        }

        let Some(payload) = wire.into_payload() else {
            return Ok(());
        };
        self.recent_messages
            .insert(payload.id.clone(), payload.clone())
            .await;

        let message_event = MessageEvent {
            message_id: payload.id.clone(),
        };
        match payload.kind {
            MessageKind::Text => {
                self.handle_friendship_message(&payload).await;
                EventBus::emit(&self.event_bus.message, message_event);
            }
            MessageKind::UrlLink => {
                // A URL message is either a room invitation or an ordinary
                // message, never both.
                if !self.handle_room_invite(&payload).await {
                    EventBus::emit(&self.event_bus.message, message_event);
                }
            }
            MessageKind::System => {
                // Protocol control messages are probed by all system
                // parsers in the same pass; any subset may match. A generic
                // message event follows regardless of what matched.
                tokio::join!(
                    self.handle_friendship_message(&payload),
                    self.handle_room_join_message(&payload),
                    self.handle_room_leave_message(&payload),
                    self.handle_room_topic_message(&payload),
                );
                EventBus::emit(&self.event_bus.message, message_event);
            }
            _ => {
                EventBus::emit(&self.event_bus.message, message_event);
            }
        }
        Ok(())
    }

    async fn handle_friendship_message(&self, payload: &MessagePayload) {
        let parsed =
            parsers::friendship::confirm(payload).or_else(|| parsers::friendship::verify(payload));
        let Some(friendship) = parsed else { return };

        let Ok(cache) = self.cache("handle_friendship_message").await else {
            warn!(target: "Bridge/Client", "friendship event before cache init, dropped");
            return;
        };
        if let Err(e) = cache.set_friendship(&payload.id, friendship).await {
            warn!(target: "Bridge/Client", "friendship record not stored: {e}");
            return;
        }
        EventBus::emit(
            &self.event_bus.friendship,
            FriendshipEvent {
                friendship_id: payload.id.clone(),
            },
        );
    }

    /// Returns whether the message was consumed as a room invitation.
    async fn handle_room_invite(&self, payload: &MessagePayload) -> bool {
        let Some(invitation) = parsers::room_invite::parse(payload) else {
            return false;
        };
        let Ok(cache) = self.cache("handle_room_invite").await else {
            warn!(target: "Bridge/Client", "room invitation before cache init, dropped");
            return false;
        };
        if let Err(e) = cache.set_room_invitation(&invitation.id.clone(), invitation).await {
            warn!(target: "Bridge/Client", "room invitation not stored: {e}");
            return false;
        }
        EventBus::emit(
            &self.event_bus.room_invite,
            RoomInviteEvent {
                room_invitation_id: payload.id.clone(),
            },
        );
        true
    }

    /// Maps a display name from a system message to an account id. For
    /// invitees the membership may not have caught up yet: mark it dirty
    /// and retry a bounded number of times, each retry forcing a throttled
    /// re-sync through the member read path.
    pub(crate) async fn resolve_name(self: &Arc<Self>, room_id: &str, name: &NameRef) -> Option<String> {
        match name {
            NameRef::SelfUser => self.self_id().await.ok(),
            NameRef::Named(name) => self
                .room_member_search(room_id, name)
                .await
                .ok()
                .and_then(|ids| ids.into_iter().next()),
        }
    }

    async fn handle_room_join_message(self: &Arc<Self>, payload: &MessagePayload) {
        let Some(parsed) = parsers::room_join::parse(payload) else {
            return;
        };
        let room_id = parsed.room_id.clone();

        let mut invitee_ids: Vec<String> = Vec::new();
        for attempt in 0..NAME_RESOLVE_ATTEMPTS {
            for name in &parsed.invitee_names {
                if let Ok(ids) = self.room_member_search(&room_id, name).await {
                    invitee_ids.extend(ids);
                }
            }
            if !invitee_ids.is_empty() {
                break;
            }
            debug!(target: "Bridge/Client",
                "room-join invitees not resolved yet (attempt {attempt}), marking membership dirty");
            if let Ok(cache) = self.cache("handle_room_join_message").await {
                cache.mark_room_members_dirty(&room_id);
            }
        }
        if invitee_ids.is_empty() && !parsed.invitee_names.is_empty() {
            warn!(target: "Bridge/Client",
                "room-join invitees {:?} not found in {room_id}, emitting empty list",
                parsed.invitee_names);
        }

        let inviter_id = self
            .resolve_name(&room_id, &parsed.inviter)
            .await
            .unwrap_or_default();

        if let Ok(cache) = self.cache("handle_room_join_message").await {
            cache.mark_room_members_dirty(&room_id);
            cache.mark_room_dirty(&room_id);
        }

        EventBus::emit(
            &self.event_bus.room_join,
            RoomJoinEvent {
                room_id,
                inviter_id,
                invitee_ids,
                timestamp: parsed.timestamp,
            },
        );
    }

    async fn handle_room_leave_message(self: &Arc<Self>, payload: &MessagePayload) {
        let Some(parsed) = parsers::room_leave::parse(payload) else {
            return;
        };
        let room_id = parsed.room_id.clone();

        let mut removee_ids = Vec::new();
        for leaver in &parsed.leavers {
            if let Some(id) = self.resolve_name(&room_id, leaver).await {
                removee_ids.push(id);
            }
        }
        let remover_id = self
            .resolve_name(&room_id, &parsed.remover)
            .await
            .unwrap_or_default();

        if let Ok(cache) = self.cache("handle_room_leave_message").await {
            cache.mark_room_members_dirty(&room_id);
            cache.mark_room_dirty(&room_id);
        }

        EventBus::emit(
            &self.event_bus.room_leave,
            RoomLeaveEvent {
                room_id,
                remover_id,
                removee_ids,
                timestamp: parsed.timestamp,
            },
        );
    }

    async fn handle_room_topic_message(self: &Arc<Self>, payload: &MessagePayload) {
        let Some(parsed) = parsers::room_topic::parse(payload) else {
            return;
        };
        let room_id = parsed.room_id.clone();

        let changer_id = self
            .resolve_name(&room_id, &parsed.changer)
            .await
            .unwrap_or_default();

        let Ok(cache) = self.cache("handle_room_topic_message").await else {
            return;
        };
        let old_topic = match cache.get_room(&room_id).await {
            Some(mut room) => {
                let old = room.name.clone();
                room.name = parsed.topic.clone();
                if let Err(e) = cache.set_room(&room_id, room).await {
                    warn!(target: "Bridge/Client", "room rename not stored: {e}");
                }
                old
            }
            None => String::new(),
        };
        // The system event means the rest of the cached payload is stale;
        // the next read must re-sync rather than trust it.
        cache.mark_room_dirty(&room_id);

        EventBus::emit(
            &self.event_bus.room_topic,
            RoomTopicEvent {
                room_id,
                changer_id,
                old_topic,
                new_topic: parsed.topic,
                timestamp: parsed.timestamp,
            },
        );
    }

    async fn on_contact_list(&self, raw: String) -> Result<(), BridgeError> {
        let wire: WireContactList = serde_json::from_str(&raw)?;
        let cache = self.cache("on_contact_list").await?;
        let page = wire.current_page;
        let total = wire.total;
        for contact in wire.info {
            let payload = contact.into_payload();
            cache.set_contact(&payload.account_alias.clone(), payload).await?;
        }
        if page * 100 >= total {
            debug!(target: "Bridge/Client", "contact list loaded, {total} contacts");
        }
        Ok(())
    }

    async fn on_room_list(&self, raw: String) -> Result<(), BridgeError> {
        let wire: WireRoomListBox = serde_json::from_str(&raw)?;
        let rooms: Vec<WireRoomListEntry> = serde_json::from_str(&wire.info)?;
        if rooms.is_empty() {
            warn!(target: "Bridge/Client",
                "gateway pushed an empty room list; room data loads after the account touches a room");
        }
        let cache = self.cache("on_room_list").await?;
        for entry in rooms {
            let fresh = entry.into_payload();
            // Keep what a detail sync already resolved; the list push only
            // refreshes name and avatar.
            let merged = match cache.get_room(&fresh.id).await {
                Some(mut existing) => {
                    existing.name = fresh.name;
                    existing.avatar = fresh.avatar;
                    existing
                }
                None => fresh,
            };
            cache.set_room(&merged.id.clone(), merged).await?;
        }
        Ok(())
    }

    async fn on_contact_info(&self, raw: String) -> Result<(), BridgeError> {
        let wire: WireContactInfo = serde_json::from_str(&raw)?;
        let requested_id = wire.username.clone();
        let payload = wire.into_payload();
        let cache = self.cache("on_contact_info").await?;
        cache
            .set_contact(&payload.account_alias.clone(), payload.clone())
            .await?;
        self.contact_replies.resolve(&requested_id, payload).await;
        Ok(())
    }

    async fn on_contact_remark(&self, raw: String) -> Result<(), BridgeError> {
        let wire: WireContactRemark = serde_json::from_str(&raw)?;
        let cache = self.cache("on_contact_remark").await?;
        if let Some(mut contact) = cache.get_contact(&wire.to_account_alias).await {
            contact.remark = wire.remark;
            cache.set_contact(&wire.to_account_alias, contact).await?;
        }
        Ok(())
    }

    /// Answer to a room detail sync: merge what the push carries, then pull
    /// the member list through the throttled member queue and complete the
    /// room record once it arrives.
    async fn on_room_info(self: &Arc<Self>, raw: String) -> Result<(), BridgeError> {
        let wire: WireRoomInfo = serde_json::from_str(&raw)?;
        let cache = self.cache("on_room_info").await?;
        let room_id = wire.number.clone();

        let mut room = match cache.get_room(&room_id).await {
            Some(mut room) => {
                room.owner = wire.author;
                room.avatar = wire.thumb;
                if !wire.name.is_empty() {
                    room.name = wire.name;
                }
                room
            }
            None => RoomPayload {
                id: room_id.clone(),
                name: wire.name,
                avatar: wire.thumb,
                owner: wire.author,
                disturb: wire.disturb,
                members: Vec::new(),
            },
        };

        let members = self.await_room_members(&room_id).await;
        let Some(members) = members else {
            error!(target: "Bridge/Client", "room member sync abandoned for {room_id}");
            return Ok(());
        };
        room.members = members;
        cache.set_room(&room_id.clone(), room.clone()).await?;
        self.room_replies.resolve(&room_id, room).await;
        Ok(())
    }

    /// Requests the member list for `room_id` and waits for the push,
    /// re-requesting on the reply timeout.
    pub(crate) async fn await_room_members(
        self: &Arc<Self>,
        room_id: &str,
    ) -> Option<Vec<RoomMemberPayload>> {
        let client = self.clone();
        let room_id_owned = room_id.to_string();
        crate::request::wait_with_resync(
            &self.room_member_replies,
            room_id,
            crate::config::REPLY_RETRY_INTERVAL,
            move || {
                let client = client.clone();
                let room_id = room_id_owned.clone();
                async move {
                    client.request_room_members(&room_id).await;
                }
            },
        )
        .await
    }

    /// Submits a member-list sync through its throttled queue.
    pub(crate) async fn request_room_members(self: &Arc<Self>, room_id: &str) {
        let client = self.clone();
        let room_id = room_id.to_string();
        let submitted = self
            .sync_room_member_queue
            .execute(async move {
                let self_id = client.self_id().await?;
                client
                    .gateway()
                    .await?
                    .request(
                        api::ROOM_MEMBER,
                        json!({ "my_account": self_id, "account": room_id }),
                    )
                    .await?;
                Ok(())
            })
            .await;
        if let Err(e) = submitted {
            warn!(target: "Bridge/Client", "member sync not submitted: {e}");
        }
    }

    /// A push of the gateway's own room-join notification (carried beside
    /// the system message): merge the member and make sure the contact
    /// exists.
    async fn on_room_join_push(&self, raw: String) -> Result<(), BridgeError> {
        let wire: WireRoomJoin = serde_json::from_str(&raw)?;
        let Some(change) = RoomChange::from_wire(&wire.change) else {
            debug!(target: "Bridge/Client", "room-join push with unknown change {}", wire.change);
            return Ok(());
        };
        if change != RoomChange::Join {
            return Ok(());
        }
        let cache = self.cache("on_room_join_push").await?;
        let room_id = wire.g_number.clone();

        match cache.get_room_members(&room_id).await {
            None => {
                // Membership unknown; a full detail sync will pick the new
                // member up.
                self.request_room_detail_inline(&room_id).await;
            }
            Some(mut members) => {
                let entry = members
                    .entry(wire.account.clone())
                    .or_insert_with(|| RoomMemberPayload {
                        account: wire.account.clone(),
                        account_alias: wire.account.clone(),
                        name: String::new(),
                        room_alias: String::new(),
                        avatar: String::new(),
                    });
                entry.name = wire.name.clone();
                cache.set_room_members(&room_id, members).await?;

                if cache.get_contact(&wire.account).await.is_none() {
                    cache
                        .set_contact(
                            &wire.account.clone(),
                            ContactPayload::stub(wire.account.clone(), wire.name.clone()),
                        )
                        .await?;
                }
            }
        }
        Ok(())
    }

    /// Fire-and-forget room detail request, outside any reply wait.
    async fn request_room_detail_inline(&self, room_id: &str) {
        let Ok(self_id) = self.self_id().await else { return };
        let Ok(gateway) = self.gateway().await else { return };
        if let Err(e) = gateway
            .request(
                api::ROOM_DETAIL,
                json!({ "my_account": self_id, "account": room_id }),
            )
            .await
        {
            warn!(target: "Bridge/Client", "room detail request failed: {e}");
        }
    }

    /// Member list push: store membership, upsert unknown contacts, then
    /// fan the list out to every waiter.
    async fn on_room_member(&self, raw: String) -> Result<(), BridgeError> {
        let wire: WireRoomMemberList = serde_json::from_str(&raw)?;
        let Some(first) = wire.member_list.first() else {
            debug!(target: "Bridge/Client", "empty room-member push");
            return Ok(());
        };
        let room_id = first.number.clone();
        let cache = self.cache("on_room_member").await?;

        let mut members: Vec<RoomMemberPayload> = Vec::new();
        let mut map: HashMap<String, RoomMemberPayload> = HashMap::new();
        for wire_member in wire.member_list {
            if wire_member.user_name.is_empty() {
                debug!(target: "Bridge/Client", "room member without user name skipped");
                continue;
            }
            let member = wire_member.into_payload();
            if cache.get_contact(&member.account).await.is_none() {
                let mut contact = ContactPayload::stub(member.account.clone(), member.name.clone());
                contact.avatar = member.avatar.clone();
                contact.remark = member.room_alias.clone();
                cache.set_contact(&member.account.clone(), contact).await?;
            }
            map.insert(member.account.clone(), member.clone());
            members.push(member);
        }
        cache.set_room_members(&room_id, map).await?;
        self.room_member_replies.resolve(&room_id, members).await;
        Ok(())
    }

    async fn on_room_qrcode(&self, raw: String) -> Result<(), BridgeError> {
        let wire: WireRoomQrcode = serde_json::from_str(&raw)?;
        self.room_qrcode_replies
            .resolve(&wire.group_number, wire.qrcode)
            .await;
        Ok(())
    }

    async fn on_new_friend(&self, raw: String) -> Result<(), BridgeError> {
        let wire: WireFriendRequest = serde_json::from_str(&raw)?;
        let Ok(cache) = self.cache("on_new_friend").await else {
            debug!(target: "Bridge/Client", "friend request before cache init, dropped");
            return Ok(());
        };
        let Some(friendship) =
            parsers::friendship::receive(&wire, chrono::Utc::now().timestamp())
        else {
            return Ok(());
        };
        let friendship_id = friendship.contact_id.clone();
        cache.set_friendship(&friendship_id, friendship).await?;
        EventBus::emit(
            &self.event_bus.friendship,
            FriendshipEvent { friendship_id },
        );
        Ok(())
    }

    /// A friend request was accepted, in either direction: the gateway
    /// attaches the full contact record, nested as JSON text.
    async fn on_add_friend(&self, raw: String) -> Result<(), BridgeError> {
        let wire: WireFriendAccepted = serde_json::from_str(&raw)?;
        match AcceptedBy::from_wire(wire.accepted_type) {
            Some(AcceptedBy::Peer) => {
                debug!(target: "Bridge/Client", "our friend request was accepted")
            }
            Some(AcceptedBy::Us) => debug!(target: "Bridge/Client", "we accepted a friend request"),
            None => {
                warn!(target: "Bridge/Client", "add-friend with unknown type {}", wire.accepted_type);
                return Ok(());
            }
        }
        let contact: crate::types::WireContact = serde_json::from_str(&wire.data)?;
        let mut payload = contact.into_payload();
        if payload.verify_token.is_empty() {
            payload.verify_token = wire.v1;
        }
        let cache = self.cache("on_add_friend").await?;
        cache
            .set_contact(&payload.account_alias.clone(), payload)
            .await?;
        Ok(())
    }

    async fn on_del_friend(&self, raw: String) -> Result<(), BridgeError> {
        let wire: WireFriendDeleted = serde_json::from_str(&raw)?;
        if wire.account.is_empty() || !is_contact_id(&wire.account) {
            return Ok(());
        }
        let cache = self.cache("on_del_friend").await?;
        cache.delete_contact(&wire.account).await?;
        Ok(())
    }

    async fn on_friend_pre_accept(&self, raw: String) -> Result<(), BridgeError> {
        let wire: WireFriendPreAccept = serde_json::from_str(&raw)?;
        let ack = wire.into_ack();
        // The waiter keyed on the logged-in alias plus whatever peer id it
        // submitted; the push may carry the peer's phone or account name,
        // so every candidate key is tried until one delivers.
        let mut selves = vec![ack.my_account.clone()];
        if let Ok(self_id) = self.self_id().await {
            if !selves.contains(&self_id) {
                selves.push(self_id);
            }
        }
        'outer: for self_part in &selves {
            for peer in [&ack.friend_phone, &ack.friend_account] {
                if peer.is_empty() {
                    continue;
                }
                let key = format!("{self_part}:{peer}");
                if self.friend_add_replies.resolve(&key, ack.clone()).await > 0 {
                    break 'outer;
                }
            }
        }
        Ok(())
    }

    async fn on_room_create(&self, raw: String) -> Result<(), BridgeError> {
        let wire: WireRoomCreate = serde_json::from_str(&raw)?;
        self.room_create_replies
            .resolve(api::ROOM_CREATE, wire.account)
            .await;
        Ok(())
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }
}
