pub mod error;
pub mod sqlite;

use async_trait::async_trait;

use crate::error::Result;

/// Generic key/value store used by the quota engine and memory cache
/// (§4.B, §4.D, §4.F). Abstracted behind a trait so the quota engine
/// never depends on rusqlite directly.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<()>;

    /// Reads two keys in one call. Implemented as two sequential reads —
    /// see DESIGN.md for why this crate does not offer multi-key atomicity.
    async fn get_pair(&self, k1: &str, k2: &str) -> Result<(Option<String>, Option<String>)> {
        let v1 = self.get(k1).await?;
        let v2 = self.get(k2).await?;
        Ok((v1, v2))
    }

    async fn ping(&self) -> Result<()>;
}

pub use sqlite::SqliteKvStore;
