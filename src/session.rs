use log::debug;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::PathBuf;
use tokio::fs;

/// Session identifiers persisted at login and offered back to the gateway
/// on a `not-login` push, so the same identity can reconnect.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SessionSlot {
    pub task_id: String,
    pub account: String,
    pub account_alias: String,
}

/// JSON-file persistence for the session slot.
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            path: dir.into().join("session.json"),
        }
    }

    pub async fn save(&self, slot: &SessionSlot) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let data = serde_json::to_vec_pretty(slot)?;
        fs::write(&self.path, data).await?;
        debug!(target: "Bridge/Session", "session slot saved for {}", slot.account);
        Ok(())
    }

    /// `None` when no slot was ever written or it no longer parses.
    pub async fn load(&self) -> Option<SessionSlot> {
        let data = fs::read(&self.path).await.ok()?;
        serde_json::from_slice(&data).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn slot_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());

        assert!(store.load().await.is_none());

        let slot = SessionSlot {
            task_id: "task-9".into(),
            account: "user-1".into(),
            account_alias: "wx-1".into(),
        };
        store.save(&slot).await.unwrap();
        assert_eq!(store.load().await.unwrap(), slot);
    }
}
