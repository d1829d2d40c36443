use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use async_trait::async_trait;
use qdrant_client::qdrant::{
    value::Kind, Condition, CreateCollectionBuilder, DeletePointsBuilder, Distance, Filter,
    PointStruct, QueryPointsBuilder, UpsertPointsBuilder, Value as QdrantValue,
    VectorParamsBuilder,
};
use qdrant_client::Qdrant;
use serde_json::Value as JsonValue;
use tracing::info;

use crate::error::{Result, VectorIndexError};
use crate::types::{FilterMap, ScoredPoint, VectorPoint};
use crate::VectorIndex;

/// Qdrant-backed implementation, directly grounded in
/// `mofa_foundation::rag::qdrant_store::QdrantVectorStore`: same
/// string-id-to-u64 hashing so callers can keep using their own stable
/// chunk/document ids, same create-collection-if-absent startup shape.
pub struct QdrantIndex {
    client: Qdrant,
    collection_name: String,
    vector_dimensions: u64,
}

impl QdrantIndex {
    pub fn new(url: &str, api_key: Option<String>, collection_name: String, vector_dimensions: u64) -> Result<Self> {
        let mut builder = Qdrant::from_url(url);
        if let Some(key) = api_key {
            builder = builder.api_key(key);
        }
        let client = builder
            .build()
            .map_err(|e| VectorIndexError::Client(format!("connection failed: {e}")))?;
        Ok(Self { client, collection_name, vector_dimensions })
    }
}

/// Deterministic string-id to Qdrant point-id mapping. The original string
/// id is preserved in the payload under `_original_id` so retrieval is
/// lossless, same as the teacher.
fn string_id_to_u64(id: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    id.hash(&mut hasher);
    hasher.finish()
}

const PAYLOAD_KEY_ORIGINAL_ID: &str = "_original_id";

fn json_to_qdrant_value(value: &JsonValue) -> QdrantValue {
    match value {
        JsonValue::String(s) => s.clone().into(),
        JsonValue::Bool(b) => (*b).into(),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                i.into()
            } else {
                n.as_f64().unwrap_or(0.0).into()
            }
        }
        other => other.to_string().into(),
    }
}

fn qdrant_value_to_json(value: &QdrantValue) -> JsonValue {
    match &value.kind {
        Some(Kind::StringValue(s)) => JsonValue::String(s.clone()),
        Some(Kind::IntegerValue(i)) => JsonValue::from(*i),
        Some(Kind::DoubleValue(d)) => serde_json::Number::from_f64(*d).map(JsonValue::Number).unwrap_or(JsonValue::Null),
        Some(Kind::BoolValue(b)) => JsonValue::Bool(*b),
        _ => JsonValue::Null,
    }
}

fn point_to_struct(point: &VectorPoint) -> PointStruct {
    let point_id = string_id_to_u64(&point.id);
    let mut payload: std::collections::HashMap<String, QdrantValue> = std::collections::HashMap::new();
    payload.insert(PAYLOAD_KEY_ORIGINAL_ID.to_string(), point.id.clone().into());
    for (key, value) in &point.payload {
        payload.insert(key.clone(), json_to_qdrant_value(value));
    }
    PointStruct::new(point_id, point.vector.clone(), payload)
}

fn scored_point_to_result(point: &qdrant_client::qdrant::ScoredPoint) -> ScoredPoint {
    let payload = &point.payload;
    let id = payload
        .get(PAYLOAD_KEY_ORIGINAL_ID)
        .map(qdrant_value_to_json)
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default();

    let mut out_payload = FilterMap::new();
    for (key, value) in payload {
        if key == PAYLOAD_KEY_ORIGINAL_ID {
            continue;
        }
        out_payload.insert(key.clone(), qdrant_value_to_json(value));
    }

    ScoredPoint { id, score: point.score, payload: out_payload }
}

fn build_filter(filter: &FilterMap) -> Filter {
    let conditions: Vec<Condition> = filter
        .iter()
        .map(|(key, value)| match value {
            JsonValue::String(s) => Condition::matches(key.clone(), s.clone()),
            JsonValue::Bool(b) => Condition::matches(key.clone(), *b),
            JsonValue::Number(n) if n.is_i64() => Condition::matches(key.clone(), n.as_i64().unwrap()),
            other => Condition::matches(key.clone(), other.to_string()),
        })
        .collect();
    Filter::must(conditions)
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn ensure_collection(&self) -> Result<()> {
        let exists = self
            .client
            .collection_exists(&self.collection_name)
            .await
            .map_err(|e| VectorIndexError::Client(format!("collection check failed: {e}")))?;

        if !exists {
            self.client
                .create_collection(
                    CreateCollectionBuilder::new(&self.collection_name)
                        .vectors_config(VectorParamsBuilder::new(self.vector_dimensions, Distance::Cosine)),
                )
                .await
                .map_err(|e| VectorIndexError::Client(format!("create collection failed: {e}")))?;
            info!(collection = %self.collection_name, "created vector collection");
        }
        Ok(())
    }

    async fn upsert(&self, points: Vec<VectorPoint>) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }
        let structs: Vec<PointStruct> = points.iter().map(point_to_struct).collect();
        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection_name, structs).wait(true))
            .await
            .map_err(|e| VectorIndexError::Client(format!("upsert failed: {e}")))?;
        Ok(())
    }

    async fn search(&self, query: &[f32], limit: usize, filter: FilterMap) -> Result<Vec<ScoredPoint>> {
        let qdrant_filter = build_filter(&filter);
        let response = self
            .client
            .query(
                QueryPointsBuilder::new(&self.collection_name)
                    .query(query.to_vec())
                    .filter(qdrant_filter)
                    .limit(limit as u64)
                    .with_payload(true),
            )
            .await
            .map_err(|e| VectorIndexError::Client(format!("search failed: {e}")))?;

        Ok(response.result.iter().map(scored_point_to_result).collect())
    }

    async fn delete_by(&self, filter: FilterMap) -> Result<()> {
        let qdrant_filter = build_filter(&filter);
        self.client
            .delete_points(
                DeletePointsBuilder::new(&self.collection_name)
                    .points(qdrant_filter)
                    .wait(true),
            )
            .await
            .map_err(|e| VectorIndexError::Client(format!("delete failed: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_id_to_u64_is_deterministic() {
        assert_eq!(string_id_to_u64("chunk-1"), string_id_to_u64("chunk-1"));
        assert_ne!(string_id_to_u64("chunk-1"), string_id_to_u64("chunk-2"));
    }

    #[test]
    fn point_round_trips_original_id_and_payload() {
        let mut payload = FilterMap::new();
        payload.insert("org_id".to_string(), JsonValue::String("org-1".to_string()));
        payload.insert("chunk_index".to_string(), JsonValue::Number(3.into()));
        let point = VectorPoint { id: "chunk-9".to_string(), vector: vec![0.1, 0.2], payload };

        let point_struct = point_to_struct(&point);
        let original_id = point_struct.payload.get(PAYLOAD_KEY_ORIGINAL_ID).unwrap();
        assert_eq!(qdrant_value_to_json(original_id), JsonValue::String("chunk-9".to_string()));
    }

    #[test]
    fn build_filter_covers_string_and_numeric_values() {
        let mut filter = FilterMap::new();
        filter.insert("org_id".to_string(), JsonValue::String("org-1".to_string()));
        filter.insert("chunk_index".to_string(), JsonValue::Number(2.into()));
        let qdrant_filter = build_filter(&filter);
        assert_eq!(qdrant_filter.must.len(), 2);
    }
}
