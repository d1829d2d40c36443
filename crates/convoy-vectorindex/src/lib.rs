pub mod error;
pub mod qdrant;
pub mod types;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{FilterMap, ScoredPoint, VectorPoint};

pub use qdrant::QdrantIndex;

/// Uniform interface over the vector backend (§4.J). Every method is
/// tenant-agnostic on its own — callers are responsible for putting
/// `org_id` into `FilterMap` (see `rag`, the only caller that can).
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn ensure_collection(&self) -> Result<()>;
    async fn upsert(&self, points: Vec<VectorPoint>) -> Result<()>;
    async fn search(&self, query: &[f32], limit: usize, filter: FilterMap) -> Result<Vec<ScoredPoint>>;
    async fn delete_by(&self, filter: FilterMap) -> Result<()>;
}
