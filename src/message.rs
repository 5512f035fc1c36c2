use crate::client::Client;
use crate::error::BridgeError;
use crate::gateway::api;
use crate::parsers;
use crate::types::{MENTION_ALL, MessageKind, MessagePayload, UrlLinkPayload, is_room_id};
use log::debug;
use serde_json::json;
use std::sync::Arc;

impl Client {
    /// Sends a text message to a contact or room. Mentions go through the
    /// at-member call so the gateway renders them; they only make sense in
    /// rooms.
    pub async fn send_text(
        &self,
        conversation_id: &str,
        text: &str,
        mention_ids: &[String],
    ) -> Result<(), BridgeError> {
        let self_id = self.self_id().await?;
        let gateway = self.gateway().await?;

        if !mention_ids.is_empty() && is_room_id(conversation_id) {
            gateway
                .request(
                    api::AT_ROOM_MEMBER,
                    json!({
                        "my_account": self_id,
                        "account": conversation_id,
                        "to_accounts": mention_ids.join(","),
                        "content": text,
                    }),
                )
                .await?;
        } else {
            gateway
                .request(
                    api::SEND_MESSAGE,
                    json!({
                        "my_account": self_id,
                        "to_account": conversation_id,
                        "content": text,
                        "content_type": MessageKind::Text.code(),
                    }),
                )
                .await?;
        }
        Ok(())
    }

    /// Sends a URL-link card.
    pub async fn send_url(
        &self,
        conversation_id: &str,
        link: &UrlLinkPayload,
    ) -> Result<(), BridgeError> {
        let self_id = self.self_id().await?;
        self.gateway()
            .await?
            .request(
                api::SEND_URL_LINK,
                json!({
                    "my_account": self_id,
                    "to_account": conversation_id,
                    "url": link.url,
                    "title": link.title,
                    "description": link.description,
                    "thumb_url": link.thumbnail_url,
                }),
            )
            .await?;
        Ok(())
    }

    /// A recently seen message from the ephemeral store. Messages evicted
    /// by capacity or age are gone; there is no durable message history.
    pub async fn message_payload(&self, message_id: &str) -> Result<MessagePayload, BridgeError> {
        self.recent_messages
            .get(message_id)
            .await
            .ok_or_else(|| BridgeError::not_found("message", message_id))
    }

    /// The URL-link payload carried by a cached URL message.
    pub async fn message_url(&self, message_id: &str) -> Result<UrlLinkPayload, BridgeError> {
        let payload = self.message_payload(message_id).await?;
        parsers::url::parse(&payload)
            .ok_or_else(|| BridgeError::not_found("url payload in message", message_id))
    }

    /// Forwards a cached message to another conversation. Only kinds the
    /// gateway can re-send from a payload are supported.
    pub async fn forward(
        &self,
        conversation_id: &str,
        message_id: &str,
    ) -> Result<(), BridgeError> {
        let payload = self.message_payload(message_id).await?;
        debug!(target: "Bridge/Message", "forwarding {message_id} to {conversation_id}");
        match payload.kind {
            MessageKind::Text => self.send_text(conversation_id, &payload.content, &[]).await,
            MessageKind::UrlLink => {
                let link = self.message_url(message_id).await?;
                self.send_url(conversation_id, &link).await
            }
            _ => Err(BridgeError::Unsupported("forwarding this message kind")),
        }
    }

    /// Resolved mention list of a cached message. The `announcement@all`
    /// sentinel expands to every room member except the sender.
    pub async fn message_mentions(
        self: &Arc<Self>,
        message_id: &str,
    ) -> Result<Vec<String>, BridgeError> {
        let payload = self.message_payload(message_id).await?;
        let mentions_all =
            payload.mention_ids.len() == 1 && payload.mention_ids[0] == MENTION_ALL;
        if !mentions_all {
            return Ok(payload.mention_ids);
        }
        let Some(room_id) = payload.room_id.as_deref() else {
            return Ok(Vec::new());
        };
        let members = self.room_member_list(room_id).await?;
        Ok(members
            .into_iter()
            .filter(|id| *id != payload.from_account)
            .collect())
    }

    pub async fn message_recall(&self, _message_id: &str) -> Result<(), BridgeError> {
        Err(BridgeError::Unsupported("message recall"))
    }
}
