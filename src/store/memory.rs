use crate::store::error::Result;
use crate::store::traits::EntityStore;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A simple in-memory backend, used by tests and as the default when no
/// store directory is configured.
#[derive(Clone, Default)]
pub struct MemoryStore {
    sections: Arc<RwLock<HashMap<String, HashMap<String, Vec<u8>>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn load(&self, section: &str) -> Result<Vec<(String, Vec<u8>)>> {
        let sections = self.sections.read().await;
        Ok(sections
            .get(section)
            .map(|entries| {
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn put(&self, section: &str, key: &str, value: &[u8]) -> Result<()> {
        let mut sections = self.sections.write().await;
        sections
            .entry(section.to_string())
            .or_default()
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn delete(&self, section: &str, key: &str) -> Result<()> {
        let mut sections = self.sections.write().await;
        if let Some(entries) = sections.get_mut(section) {
            entries.remove(key);
        }
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}
