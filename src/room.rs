use crate::client::Client;
use crate::config::{REPLY_RETRY_INTERVAL, ROOM_DIRECT_ADD_LIMIT};
use crate::error::BridgeError;
use crate::gateway::api;
use crate::request::wait_with_resync;
use crate::types::{RoomMemberPayload, RoomPayload, RoomInvitationPayload};
use log::{debug, warn};
use serde_json::json;
use std::sync::Arc;

impl Client {
    /// Returns the room record for `room_id`.
    ///
    /// A cached room is only trusted when it is complete (members and owner
    /// resolved) and not marked dirty; otherwise a throttled detail sync is
    /// submitted and the call suspends until the `room-info` answer
    /// completes the record, re-requesting on timeout.
    pub async fn room_payload(self: &Arc<Self>, room_id: &str) -> Result<RoomPayload, BridgeError> {
        let cache = self.cache("room_payload").await?;
        if let Some(room) = cache.get_room(room_id).await {
            if room.is_complete() && !cache.is_room_dirty(room_id) {
                return Ok(room);
            }
        }

        debug!(target: "Bridge/Room", "room {room_id} incomplete or dirty, syncing");
        let client = self.clone();
        let room_id_owned = room_id.to_string();
        wait_with_resync(&self.room_replies, room_id, REPLY_RETRY_INTERVAL, move || {
            let client = client.clone();
            let room_id = room_id_owned.clone();
            async move {
                client.request_room_detail(&room_id).await;
            }
        })
        .await
        .ok_or_else(|| BridgeError::not_found("room", room_id))
    }

    /// Submits a room detail sync through the throttled room queue.
    async fn request_room_detail(self: &Arc<Self>, room_id: &str) {
        let client = self.clone();
        let room_id = room_id.to_string();
        let submitted = self
            .sync_room_queue
            .execute(async move {
                let self_id = client.self_id().await?;
                client
                    .gateway()
                    .await?
                    .request(
                        api::ROOM_DETAIL,
                        json!({ "my_account": self_id, "account": room_id }),
                    )
                    .await?;
                Ok(())
            })
            .await;
        if let Err(e) = submitted {
            warn!(target: "Bridge/Room", "room sync not submitted: {e}");
        }
    }

    /// All cached room ids.
    pub async fn room_list(&self) -> Result<Vec<String>, BridgeError> {
        Ok(self.cache("room_list").await?.room_ids())
    }

    /// Account ids of everyone in `room_id`.
    ///
    /// Membership is only trusted once a map has been stored and is not
    /// marked dirty; "no map at all" is different from "empty room" and
    /// triggers a sync.
    pub async fn room_member_list(self: &Arc<Self>, room_id: &str) -> Result<Vec<String>, BridgeError> {
        let cache = self.cache("room_member_list").await?;
        if let Some(members) = cache.get_room_members(room_id).await {
            if !cache.are_room_members_dirty(room_id) {
                return Ok(members.keys().cloned().collect());
            }
        }

        debug!(target: "Bridge/Room", "membership of {room_id} unknown or dirty, syncing");
        let members = self
            .await_room_members(room_id)
            .await
            .ok_or_else(|| BridgeError::not_found("room members", room_id))?;
        Ok(members.into_iter().map(|m| m.account).collect())
    }

    /// One member record of a room.
    pub async fn room_member_payload(
        self: &Arc<Self>,
        room_id: &str,
        contact_id: &str,
    ) -> Result<RoomMemberPayload, BridgeError> {
        // Route through the list path so an absent map is synced first.
        self.room_member_list(room_id).await?;
        let cache = self.cache("room_member_payload").await?;
        cache
            .get_room_members(room_id)
            .await
            .and_then(|members| members.get(contact_id).cloned())
            .ok_or_else(|| BridgeError::not_found("room member", contact_id))
    }

    /// Account ids of members whose display name or room nickname equals
    /// `name`. Ambiguity is the caller's problem: all hits are returned.
    pub async fn room_member_search(
        self: &Arc<Self>,
        room_id: &str,
        name: &str,
    ) -> Result<Vec<String>, BridgeError> {
        self.room_member_list(room_id).await?;
        let cache = self.cache("room_member_search").await?;
        let Some(members) = cache.get_room_members(room_id).await else {
            return Ok(Vec::new());
        };
        Ok(members
            .values()
            .filter(|member| member.name == name || member.room_alias == name)
            .map(|member| member.account.clone())
            .collect())
    }

    /// Current topic of a room (the cached name, synced when incomplete).
    pub async fn room_topic(self: &Arc<Self>, room_id: &str) -> Result<String, BridgeError> {
        Ok(self.room_payload(room_id).await?.name)
    }

    /// Renames a room upstream and mirrors the change into the cache.
    pub async fn room_topic_set(&self, room_id: &str, topic: &str) -> Result<(), BridgeError> {
        let self_id = self.self_id().await?;
        self.gateway()
            .await?
            .request(
                api::ROOM_TOPIC,
                json!({ "my_account": self_id, "account": room_id, "name": topic }),
            )
            .await?;

        let cache = self.cache("room_topic_set").await?;
        if let Some(mut room) = cache.get_room(room_id).await {
            room.name = topic.to_string();
            cache.set_room(room_id, room).await?;
        }
        Ok(())
    }

    /// Creates a room and waits for the gateway's `room-create` push to
    /// learn the new room id, then schedules a detail sync for it.
    pub async fn room_create(
        self: &Arc<Self>,
        contact_ids: &[String],
        topic: Option<&str>,
    ) -> Result<String, BridgeError> {
        let self_id = self.self_id().await?;
        let rx = self.room_create_replies.register(api::ROOM_CREATE).await;
        self.gateway()
            .await?
            .request(
                api::ROOM_CREATE,
                json!({
                    "my_account": self_id,
                    "accounts": contact_ids,
                    "name": topic.unwrap_or(""),
                }),
            )
            .await?;
        let room_id = rx
            .await
            .map_err(|_| BridgeError::Gateway(crate::gateway::GatewayError::Closed))?;

        self.request_room_detail(&room_id).await;
        Ok(room_id)
    }

    /// Adds a contact to a room; rooms above the direct-add limit take the
    /// invite path instead, as the protocol requires.
    pub async fn room_add(self: &Arc<Self>, room_id: &str, contact_id: &str) -> Result<(), BridgeError> {
        let self_id = self.self_id().await?;
        let account_id = self.account_id_of(contact_id).await?;
        let room = self.room_payload(room_id).await?;

        let api_name = if room.members.len() < ROOM_DIRECT_ADD_LIMIT {
            api::ROOM_ADD
        } else {
            api::ROOM_INVITE
        };
        self.gateway()
            .await?
            .request(
                api_name,
                json!({ "my_account": self_id, "account": room_id, "to_account": account_id }),
            )
            .await?;
        Ok(())
    }

    /// Removes a contact from a room and mirrors the removal into the
    /// cached membership.
    pub async fn room_del(&self, room_id: &str, contact_id: &str) -> Result<(), BridgeError> {
        let self_id = self.self_id().await?;
        let account_id = self.account_id_of(contact_id).await?;
        self.gateway()
            .await?
            .request(
                api::ROOM_DEL,
                json!({ "my_account": self_id, "account": room_id, "to_account": account_id }),
            )
            .await?;

        let cache = self.cache("room_del").await?;
        if let Some(mut members) = cache.get_room_members(room_id).await {
            members.remove(contact_id);
            members.remove(&account_id);
            cache.set_room_members(room_id, members).await?;
        }
        Ok(())
    }

    pub async fn room_quit(&self, room_id: &str) -> Result<(), BridgeError> {
        let self_id = self.self_id().await?;
        self.gateway()
            .await?
            .request(
                api::ROOM_QUIT,
                json!({ "my_account": self_id, "account": room_id }),
            )
            .await?;
        Ok(())
    }

    /// Requests a room QR code and waits for the corresponding push.
    pub async fn room_qrcode(&self, room_id: &str) -> Result<String, BridgeError> {
        let self_id = self.self_id().await?;
        let rx = self.room_qrcode_replies.register(room_id).await;
        self.gateway()
            .await?
            .request(
                api::ROOM_QRCODE,
                json!({ "my_account": self_id, "account": room_id }),
            )
            .await?;
        rx.await
            .map_err(|_| BridgeError::Gateway(crate::gateway::GatewayError::Closed))
    }

    /// Sets the room announcement. Reading one back is not offered by the
    /// protocol.
    pub async fn room_announce_set(&self, room_id: &str, text: &str) -> Result<(), BridgeError> {
        let self_id = self.self_id().await?;
        self.gateway()
            .await?
            .request(
                api::ROOM_ANNOUNCE,
                json!({ "my_account": self_id, "account": room_id, "content": text }),
            )
            .await?;
        Ok(())
    }

    pub async fn room_announce(&self, _room_id: &str) -> Result<String, BridgeError> {
        Err(BridgeError::Unsupported("reading the room announcement"))
    }

    /// Avatar URL of a room.
    pub async fn room_avatar(&self, room_id: &str) -> Result<String, BridgeError> {
        let cache = self.cache("room_avatar").await?;
        cache
            .get_room(room_id)
            .await
            .map(|room| room.avatar)
            .ok_or_else(|| BridgeError::not_found("room", room_id))
    }

    /// Marks the cached room payload stale so the next read re-syncs.
    pub async fn room_payload_dirty(&self, room_id: &str) -> Result<(), BridgeError> {
        self.cache("room_payload_dirty").await?.mark_room_dirty(room_id);
        Ok(())
    }

    /// Marks the cached membership stale so the next read re-syncs.
    pub async fn room_member_dirty(&self, room_id: &str) -> Result<(), BridgeError> {
        self.cache("room_member_dirty")
            .await?
            .mark_room_members_dirty(room_id);
        Ok(())
    }

    /// The stored invitation record.
    pub async fn room_invitation_payload(
        &self,
        invitation_id: &str,
    ) -> Result<RoomInvitationPayload, BridgeError> {
        let cache = self.cache("room_invitation_payload").await?;
        cache
            .get_room_invitation(invitation_id)
            .await
            .ok_or_else(|| BridgeError::not_found("room invitation", invitation_id))
    }

    /// Accepts a stored invitation by dereferencing its token URL.
    pub async fn room_invitation_accept(&self, invitation_id: &str) -> Result<(), BridgeError> {
        let invitation = self.room_invitation_payload(invitation_id).await?;
        if invitation.url.is_empty() {
            return Err(BridgeError::not_found("room invitation url", invitation_id));
        }
        self.gateway()
            .await?
            .request(api::ROOM_INVITATION_DETAIL, json!({ "url": invitation.url }))
            .await?;
        Ok(())
    }
}
