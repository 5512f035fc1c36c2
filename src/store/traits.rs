use crate::store::error::Result;
use async_trait::async_trait;

/// The persistent key-value store behind the cache manager.
///
/// Sections are flat namespaces ("contacts", "rooms", ...), keys are entity
/// ids, values are serialized records. The cache manager keeps the working
/// set in memory and writes through; `load` is only called once per section
/// when a session opens.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// All entries of a section.
    async fn load(&self, section: &str) -> Result<Vec<(String, Vec<u8>)>>;

    async fn put(&self, section: &str, key: &str, value: &[u8]) -> Result<()>;

    async fn delete(&self, section: &str, key: &str) -> Result<()>;

    /// Persist anything still buffered. Called on release.
    async fn flush(&self) -> Result<()>;
}
