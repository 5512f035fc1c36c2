use crate::client::Client;
use crate::config::REPLY_RETRY_INTERVAL;
use crate::error::BridgeError;
use crate::gateway::api;
use crate::request::wait_with_resync;
use crate::types::ContactPayload;
use log::{debug, warn};
use serde_json::json;
use std::sync::Arc;

impl Client {
    /// Returns the contact record for `id`.
    ///
    /// On a cache miss this does not fabricate an empty record: it submits
    /// a throttled sync request and suspends until the matching
    /// `contact-info` push resolves it, re-requesting on timeout.
    pub async fn contact_payload(self: &Arc<Self>, id: &str) -> Result<ContactPayload, BridgeError> {
        let cache = self.cache("contact_payload").await?;
        if let Some(contact) = cache.get_contact(id).await {
            return Ok(contact);
        }

        debug!(target: "Bridge/Contact", "contact {id} not cached, syncing");
        let client = self.clone();
        let id_owned = id.to_string();
        wait_with_resync(&self.contact_replies, id, REPLY_RETRY_INTERVAL, move || {
            let client = client.clone();
            let id = id_owned.clone();
            async move {
                client.request_contact_info(&id).await;
            }
        })
        .await
        .ok_or_else(|| BridgeError::not_found("contact", id))
    }

    /// Submits a single-contact sync through the throttled contact queue.
    async fn request_contact_info(self: &Arc<Self>, id: &str) {
        let client = self.clone();
        let id = id.to_string();
        let submitted = self
            .sync_contact_queue
            .execute(async move {
                let self_id = client.self_id().await?;
                client
                    .gateway()
                    .await?
                    .request(
                        api::CONTACT_INFO,
                        json!({ "my_account": self_id, "account": id }),
                    )
                    .await?;
                Ok(())
            })
            .await;
        if let Err(e) = submitted {
            warn!(target: "Bridge/Contact", "contact sync not submitted: {e}");
        }
    }

    /// All cached contact ids.
    pub async fn contact_list(&self) -> Result<Vec<String>, BridgeError> {
        Ok(self.cache("contact_list").await?.contact_ids())
    }

    /// The remark (alias) the user assigned to `contact_id`.
    pub async fn contact_alias(&self, contact_id: &str) -> Result<String, BridgeError> {
        let cache = self.cache("contact_alias").await?;
        cache
            .get_contact(contact_id)
            .await
            .map(|contact| contact.remark)
            .ok_or_else(|| BridgeError::not_found("contact", contact_id))
    }

    /// Sets the remark for `contact_id` upstream, then mirrors it into the
    /// cache once the gateway accepted it.
    pub async fn contact_alias_set(
        &self,
        contact_id: &str,
        alias: &str,
    ) -> Result<(), BridgeError> {
        let self_id = self.self_id().await?;
        self.gateway()
            .await?
            .request(
                api::SET_CONTACT_ALIAS,
                json!({
                    "my_account": self_id,
                    "contact_id": contact_id,
                    "remark": alias,
                }),
            )
            .await?;

        let cache = self.cache("contact_alias_set").await?;
        let mut contact = cache
            .get_contact(contact_id)
            .await
            .ok_or_else(|| BridgeError::not_found("contact", contact_id))?;
        contact.remark = alias.to_string();
        cache.set_contact(contact_id, contact).await?;
        Ok(())
    }

    /// Avatar URL of a contact.
    pub async fn contact_avatar(&self, contact_id: &str) -> Result<String, BridgeError> {
        let cache = self.cache("contact_avatar").await?;
        cache
            .get_contact(contact_id)
            .await
            .map(|contact| contact.avatar)
            .ok_or_else(|| BridgeError::not_found("contact", contact_id))
    }

    /// The protocol has no avatar upload call.
    pub async fn contact_avatar_set(
        &self,
        _contact_id: &str,
        _avatar_url: &str,
    ) -> Result<(), BridgeError> {
        Err(BridgeError::Unsupported("avatar upload"))
    }

    pub async fn contact_self_qrcode(&self) -> Result<String, BridgeError> {
        Err(BridgeError::Unsupported("contact self QR code"))
    }

    pub async fn contact_self_name(&self, _name: &str) -> Result<(), BridgeError> {
        Err(BridgeError::Unsupported("setting the self display name"))
    }

    pub async fn contact_self_signature(&self, _signature: &str) -> Result<(), BridgeError> {
        Err(BridgeError::Unsupported("setting the self signature"))
    }

    /// Resolves the id to submit to the gateway for operations that need
    /// the primary account id rather than the alias.
    pub(crate) async fn account_id_of(&self, contact_id: &str) -> Result<String, BridgeError> {
        let cache = self.cache("account_id_of").await?;
        match cache.get_contact(contact_id).await {
            Some(contact) if !contact.account.is_empty() && contact.account != contact.account_alias => {
                Ok(contact.account)
            }
            Some(contact) if !contact.account_alias.is_empty() => Ok(contact.account_alias),
            _ => Err(BridgeError::not_found("contact", contact_id)),
        }
    }
}
