pub mod error;
pub mod pool;
pub mod sqlite;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub String);

impl JobId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct ReservedJob {
    pub id: JobId,
    pub kind: String,
    pub payload: serde_json::Value,
    pub attempts: u32,
}

/// Durable at-least-once work queue (§4.C, generalized from the teacher's
/// scheduled-fire-time engine to arbitrary retryable work: document
/// parsing, chunk embedding, etc).
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(
        &self,
        kind: &str,
        payload: serde_json::Value,
        dedup_key: Option<&str>,
    ) -> Result<JobId>;

    async fn reserve(&self, kind: &str) -> Result<Option<ReservedJob>>;

    async fn ack(&self, id: &JobId) -> Result<()>;

    async fn fail(&self, id: &JobId, error: &str) -> Result<()>;
}

pub use sqlite::SqliteJobQueue;
