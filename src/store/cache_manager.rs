use crate::store::error::{Result, StoreError};
use crate::store::traits::EntityStore;
use crate::types::{ContactPayload, FriendshipPayload, RoomInvitationPayload, RoomMemberPayload, RoomPayload};
use dashmap::{DashMap, DashSet};
use log::{debug, warn};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::Arc;

/// The durable entity cache for one logged-in account.
///
/// Holds the working set in concurrent maps and writes through to the
/// pluggable [`EntityStore`]. Reads return `None` for "not present" so
/// callers can tell "unknown, go sync" apart from a real record; for room
/// membership, a stored empty map means "known-empty room", which is
/// distinct from no map at all.
///
/// Writers are always reconciling toward the same upstream truth, so
/// last-write-wins per key is acceptable; the maps guarantee a reader never
/// observes a torn record.
pub struct CacheManager {
    account_id: String,
    backend: Arc<dyn EntityStore>,
    contacts: DashMap<String, ContactPayload>,
    rooms: DashMap<String, RoomPayload>,
    room_members: DashMap<String, HashMap<String, RoomMemberPayload>>,
    friendships: DashMap<String, FriendshipPayload>,
    room_invitations: DashMap<String, RoomInvitationPayload>,
    /// Rooms whose cached payload must not be trusted on the next read.
    dirty_rooms: DashSet<String>,
    /// Rooms whose membership map must not be trusted on the next read.
    dirty_members: DashSet<String>,
}

impl CacheManager {
    /// Opens the cache scoped to `account_id`, warming the in-process maps
    /// from the backend. Entries that no longer deserialize are dropped
    /// with a warning; the cache is self-healing and will re-sync them.
    pub async fn init(
        backend: Arc<dyn EntityStore>,
        account_id: impl Into<String>,
    ) -> Result<Arc<Self>> {
        let account_id = account_id.into();
        let manager = Self {
            contacts: DashMap::new(),
            rooms: DashMap::new(),
            room_members: DashMap::new(),
            friendships: DashMap::new(),
            room_invitations: DashMap::new(),
            dirty_rooms: DashSet::new(),
            dirty_members: DashSet::new(),
            backend,
            account_id,
        };

        manager.warm_section("contacts", &manager.contacts).await?;
        manager.warm_section("rooms", &manager.rooms).await?;
        manager
            .warm_section("room-members", &manager.room_members)
            .await?;
        manager
            .warm_section("friendships", &manager.friendships)
            .await?;
        manager
            .warm_section("room-invitations", &manager.room_invitations)
            .await?;

        debug!(target: "Bridge/Cache",
            "cache for {} warmed: {} contacts, {} rooms",
            manager.account_id,
            manager.contacts.len(),
            manager.rooms.len());
        Ok(Arc::new(manager))
    }

    /// Flushes the backend. The owning client drops its handle afterwards;
    /// a later session calls `init` again.
    pub async fn release(&self) -> Result<()> {
        self.backend.flush().await
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    fn section(&self, name: &str) -> String {
        format!("{}.{}", self.account_id, name)
    }

    async fn warm_section<T: DeserializeOwned>(
        &self,
        name: &str,
        map: &DashMap<String, T>,
    ) -> Result<()> {
        for (key, value) in self.backend.load(&self.section(name)).await? {
            match serde_json::from_slice(&value) {
                Ok(record) => {
                    map.insert(key, record);
                }
                Err(e) => {
                    warn!(target: "Bridge/Cache", "dropping stale {name} entry {key}: {e}");
                }
            }
        }
        Ok(())
    }

    async fn persist<T: Serialize>(&self, name: &str, key: &str, record: &T) -> Result<()> {
        let data = serde_json::to_vec(record)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.backend.put(&self.section(name), key, &data).await
    }

    pub async fn get_contact(&self, id: &str) -> Option<ContactPayload> {
        self.contacts.get(id).map(|r| r.value().clone())
    }

    /// Idempotent upsert keyed by alias id: repeated pushes for the same id
    /// overwrite, never duplicate.
    pub async fn set_contact(&self, id: &str, payload: ContactPayload) -> Result<()> {
        self.persist("contacts", id, &payload).await?;
        self.contacts.insert(id.to_string(), payload);
        Ok(())
    }

    pub async fn delete_contact(&self, id: &str) -> Result<()> {
        self.backend.delete(&self.section("contacts"), id).await?;
        self.contacts.remove(id);
        Ok(())
    }

    pub fn contact_ids(&self) -> Vec<String> {
        self.contacts.iter().map(|r| r.key().clone()).collect()
    }

    pub async fn get_room(&self, id: &str) -> Option<RoomPayload> {
        self.rooms.get(id).map(|r| r.value().clone())
    }

    /// Storing a room also clears its dirty mark: fresh data is trusted
    /// until the next invalidation.
    pub async fn set_room(&self, id: &str, payload: RoomPayload) -> Result<()> {
        self.persist("rooms", id, &payload).await?;
        self.rooms.insert(id.to_string(), payload);
        self.dirty_rooms.remove(id);
        Ok(())
    }

    pub fn room_ids(&self) -> Vec<String> {
        self.rooms.iter().map(|r| r.key().clone()).collect()
    }

    /// `None` means membership was never stored for this room, which is
    /// different from a stored empty map.
    pub async fn get_room_members(&self, room_id: &str) -> Option<HashMap<String, RoomMemberPayload>> {
        self.room_members.get(room_id).map(|r| r.value().clone())
    }

    pub async fn set_room_members(
        &self,
        room_id: &str,
        members: HashMap<String, RoomMemberPayload>,
    ) -> Result<()> {
        self.persist("room-members", room_id, &members).await?;
        self.room_members.insert(room_id.to_string(), members);
        self.dirty_members.remove(room_id);
        Ok(())
    }

    pub fn mark_room_dirty(&self, room_id: &str) {
        self.dirty_rooms.insert(room_id.to_string());
    }

    pub fn is_room_dirty(&self, room_id: &str) -> bool {
        self.dirty_rooms.contains(room_id)
    }

    pub fn mark_room_members_dirty(&self, room_id: &str) {
        self.dirty_members.insert(room_id.to_string());
    }

    pub fn are_room_members_dirty(&self, room_id: &str) -> bool {
        self.dirty_members.contains(room_id)
    }

    pub async fn get_friendship(&self, id: &str) -> Option<FriendshipPayload> {
        self.friendships.get(id).map(|r| r.value().clone())
    }

    pub async fn set_friendship(&self, id: &str, payload: FriendshipPayload) -> Result<()> {
        self.persist("friendships", id, &payload).await?;
        self.friendships.insert(id.to_string(), payload);
        Ok(())
    }

    pub async fn get_room_invitation(&self, id: &str) -> Option<RoomInvitationPayload> {
        self.room_invitations.get(id).map(|r| r.value().clone())
    }

    pub async fn set_room_invitation(
        &self,
        id: &str,
        payload: RoomInvitationPayload,
    ) -> Result<()> {
        self.persist("room-invitations", id, &payload).await?;
        self.room_invitations.insert(id.to_string(), payload);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use crate::types::Gender;

    fn contact(alias: &str, name: &str) -> ContactPayload {
        ContactPayload {
            account: alias.to_string(),
            account_alias: alias.to_string(),
            name: name.to_string(),
            remark: String::new(),
            avatar: String::new(),
            gender: Gender::Unknown,
            province: String::new(),
            city: String::new(),
            signature: String::new(),
            verify_token: String::new(),
        }
    }

    #[tokio::test]
    async fn contact_upsert_is_idempotent() {
        let backend = Arc::new(MemoryStore::new());
        let cache = CacheManager::init(backend, "wx-self").await.unwrap();

        cache.set_contact("wx-1", contact("wx-1", "Ada")).await.unwrap();
        cache.set_contact("wx-1", contact("wx-1", "Ada Lovelace")).await.unwrap();

        assert_eq!(cache.contact_ids().len(), 1);
        assert_eq!(
            cache.get_contact("wx-1").await.unwrap().name,
            "Ada Lovelace"
        );
    }

    #[tokio::test]
    async fn missing_reads_are_none_not_defaults() {
        let backend = Arc::new(MemoryStore::new());
        let cache = CacheManager::init(backend, "wx-self").await.unwrap();

        assert!(cache.get_contact("nobody").await.is_none());
        assert!(cache.get_room("1@chatroom").await.is_none());
        assert!(cache.get_room_members("1@chatroom").await.is_none());
    }

    #[tokio::test]
    async fn empty_membership_differs_from_absent() {
        let backend = Arc::new(MemoryStore::new());
        let cache = CacheManager::init(backend, "wx-self").await.unwrap();

        assert!(cache.get_room_members("1@chatroom").await.is_none());
        cache
            .set_room_members("1@chatroom", HashMap::new())
            .await
            .unwrap();
        let members = cache.get_room_members("1@chatroom").await;
        assert!(members.is_some());
        assert!(members.unwrap().is_empty());
    }

    #[tokio::test]
    async fn dirty_marks_clear_on_fresh_write() {
        let backend = Arc::new(MemoryStore::new());
        let cache = CacheManager::init(backend, "wx-self").await.unwrap();

        cache.mark_room_dirty("9@chatroom");
        cache.mark_room_members_dirty("9@chatroom");
        assert!(cache.is_room_dirty("9@chatroom"));
        assert!(cache.are_room_members_dirty("9@chatroom"));

        cache
            .set_room(
                "9@chatroom",
                RoomPayload {
                    id: "9@chatroom".into(),
                    name: "dev".into(),
                    avatar: String::new(),
                    owner: "wx-1".into(),
                    disturb: 0,
                    members: Vec::new(),
                },
            )
            .await
            .unwrap();
        cache
            .set_room_members("9@chatroom", HashMap::new())
            .await
            .unwrap();

        assert!(!cache.is_room_dirty("9@chatroom"));
        assert!(!cache.are_room_members_dirty("9@chatroom"));
    }

    #[tokio::test]
    async fn warm_up_restores_prior_session() {
        let backend = Arc::new(MemoryStore::new());
        {
            let cache = CacheManager::init(backend.clone(), "wx-self").await.unwrap();
            cache.set_contact("wx-1", contact("wx-1", "Ada")).await.unwrap();
            cache.release().await.unwrap();
        }

        let cache = CacheManager::init(backend, "wx-self").await.unwrap();
        assert_eq!(cache.get_contact("wx-1").await.unwrap().name, "Ada");
    }

    #[tokio::test]
    async fn sections_are_scoped_per_account() {
        let backend = Arc::new(MemoryStore::new());
        {
            let cache = CacheManager::init(backend.clone(), "wx-a").await.unwrap();
            cache.set_contact("wx-1", contact("wx-1", "Ada")).await.unwrap();
        }
        let other = CacheManager::init(backend, "wx-b").await.unwrap();
        assert!(other.get_contact("wx-1").await.is_none());
    }
}
