use std::collections::HashMap;

use serde_json::Value;

/// Equality filter applied to a search or delete call. Every key/value pair
/// is AND-ed together (§4.J). `rag`'s retrieval function is the only
/// public caller with a constructor that can set `org_id`, structurally
/// forcing every search through the tenant filter (§9 Open Question:
/// "Vector tenant filter").
pub type FilterMap = HashMap<String, Value>;

/// A point to upsert: a stable string id, its embedding, and a payload
/// of filterable/retrievable metadata (§4.J, grounded in
/// `QdrantVectorStore::chunk_to_point`'s input shape).
#[derive(Debug, Clone)]
pub struct VectorPoint {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: FilterMap,
}

/// One hit from `VectorIndex::search`, with the original string id and
/// payload restored losslessly (§4.J, grounded in
/// `QdrantVectorStore::scored_point_to_result`).
#[derive(Debug, Clone)]
pub struct ScoredPoint {
    pub id: String,
    pub score: f32,
    pub payload: FilterMap,
}
