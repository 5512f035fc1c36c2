use crate::client::Client;
use crate::error::BridgeError;
use crate::gateway::api;
use crate::types::{FriendAddAck, FriendshipPayload};
use log::warn;
use serde_json::json;
use std::sync::Arc;

impl Client {
    /// The stored friendship record for `friendship_id`.
    pub async fn friendship_payload(
        &self,
        friendship_id: &str,
    ) -> Result<FriendshipPayload, BridgeError> {
        let cache = self.cache("friendship_payload").await?;
        cache
            .get_friendship(friendship_id)
            .await
            .ok_or_else(|| BridgeError::not_found("friendship", friendship_id))
    }

    /// Sends a friend request and waits for the gateway's pre-accept
    /// acknowledgement push before returning.
    ///
    /// No timeout retry here: re-submitting a friend request is visible to
    /// the peer, unlike re-requesting a sync.
    pub async fn friendship_add(
        self: &Arc<Self>,
        contact_id: &str,
        hello: &str,
    ) -> Result<FriendAddAck, BridgeError> {
        let self_id = self.self_id().await?;
        let cache = self.cache("friendship_add").await?;
        let target = match cache.get_contact(contact_id).await {
            Some(contact) if !contact.account_alias.is_empty() => contact.account_alias,
            _ => contact_id.to_string(),
        };

        let key = format!("{self_id}:{target}");
        let rx = self.friend_add_replies.register(&key).await;
        self.gateway()
            .await?
            .request(
                api::ADD_FRIEND,
                json!({ "my_account": self_id, "account": target, "content": hello }),
            )
            .await?;
        rx.await
            .map_err(|_| BridgeError::Gateway(crate::gateway::GatewayError::Closed))
    }

    /// Accepts a stored inbound friend request.
    pub async fn friendship_accept(&self, friendship_id: &str) -> Result<(), BridgeError> {
        let cache = self.cache("friendship_accept").await?;
        let Some(friendship) = cache.get_friendship(friendship_id).await else {
            warn!(target: "Bridge/Friendship",
                "no friendship payload for {friendship_id}, nothing to accept");
            return Err(BridgeError::not_found("friendship", friendship_id));
        };
        let self_id = self.self_id().await?;
        self.gateway()
            .await?
            .request(
                api::ACCEPT_FRIEND,
                json!({ "my_account": self_id, "account": friendship.contact_id }),
            )
            .await?;
        Ok(())
    }

    pub async fn friendship_search_phone(&self, _phone: &str) -> Result<String, BridgeError> {
        Err(BridgeError::Unsupported("friendship search by phone"))
    }

    pub async fn friendship_search_weixin(&self, _weixin: &str) -> Result<String, BridgeError> {
        Err(BridgeError::Unsupported("friendship search by account"))
    }
}
