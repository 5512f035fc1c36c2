use crate::store::error::{Result, StoreError};
use crate::store::traits::EntityStore;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::PathBuf;
use tokio::fs;

/// On-disk entry envelope. File names are sanitized for the filesystem, so
/// the real key travels inside the file.
#[derive(Serialize, Deserialize)]
struct Entry {
    key: String,
    value: Vec<u8>,
}

/// File-backed entity store: one directory per section, one JSON file per
/// key. Good enough for the working sets this bridge holds; swap the trait
/// implementation for anything heavier.
pub struct FileStore {
    base_path: PathBuf,
}

impl FileStore {
    pub async fn new(path: impl Into<PathBuf>) -> io::Result<Self> {
        let base_path = path.into();
        fs::create_dir_all(&base_path).await?;
        Ok(Self { base_path })
    }

    fn section_path(&self, section: &str) -> PathBuf {
        self.base_path.join(Self::sanitize(section))
    }

    fn entry_path(&self, section: &str, key: &str) -> PathBuf {
        self.section_path(section)
            .join(format!("{}.json", Self::sanitize(key)))
    }

    fn sanitize(key: &str) -> String {
        key.replace(|c: char| !c.is_alphanumeric() && c != '.' && c != '-', "_")
    }
}

#[async_trait]
impl EntityStore for FileStore {
    async fn load(&self, section: &str) -> Result<Vec<(String, Vec<u8>)>> {
        let dir = self.section_path(section);
        let mut entries = Vec::new();
        let mut read_dir = match fs::read_dir(&dir).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(entries),
            Err(e) => return Err(StoreError::Io(e)),
        };
        while let Some(file) = read_dir.next_entry().await? {
            let data = fs::read(file.path()).await?;
            let entry: Entry = serde_json::from_slice(&data)
                .map_err(|e| StoreError::Serialization(e.to_string()))?;
            entries.push((entry.key, entry.value));
        }
        Ok(entries)
    }

    async fn put(&self, section: &str, key: &str, value: &[u8]) -> Result<()> {
        let dir = self.section_path(section);
        fs::create_dir_all(&dir).await?;
        let entry = Entry {
            key: key.to_string(),
            value: value.to_vec(),
        };
        let data = serde_json::to_vec(&entry)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        fs::write(self.entry_path(section, key), data)
            .await
            .map_err(StoreError::Io)
    }

    async fn delete(&self, section: &str, key: &str) -> Result<()> {
        match fs::remove_file(self.entry_path(section, key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_load_delete_round_trips_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path()).await.unwrap();

        store.put("rooms", "1@chatroom", b"{\"a\":1}").await.unwrap();
        store.put("rooms", "2@chatroom", b"{\"a\":2}").await.unwrap();

        let mut entries = store.load("rooms").await.unwrap();
        entries.sort();
        assert_eq!(entries.len(), 2);
        // Keys survive the filesystem-unfriendly '@'.
        assert_eq!(entries[0].0, "1@chatroom");
        assert_eq!(entries[0].1, b"{\"a\":1}");

        store.delete("rooms", "1@chatroom").await.unwrap();
        assert_eq!(store.load("rooms").await.unwrap().len(), 1);

        // Deleting a missing key is not an error.
        store.delete("rooms", "1@chatroom").await.unwrap();

        // Unknown section loads empty.
        assert!(store.load("contacts").await.unwrap().is_empty());
    }
}
