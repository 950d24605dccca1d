//! In-memory providers for development and tests.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use async_trait::async_trait;

use crate::errors::{Result, ValidationError};

use super::{DatabaseProvider, VectorMatch, VectorRecord, VectorStoreProvider};

/// Database provider backed by process memory. Tenants are tracked by id
/// only; there is no relational storage behind it.
#[derive(Default)]
pub struct MemoryDatabaseProvider {
    tenants: RwLock<HashSet<String>>,
}

impl MemoryDatabaseProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_tenant(&self, tenant_id: &str) -> bool {
        self.tenants
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains(tenant_id)
    }
}

#[async_trait]
impl DatabaseProvider for MemoryDatabaseProvider {
    async fn connect(&self) -> Result<()> {
        Ok(())
    }

    async fn init_schema(&self) -> Result<()> {
        Ok(())
    }

    async fn create_tenant(&self, tenant_id: &str) -> Result<()> {
        self.tenants
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(tenant_id.to_string());
        Ok(())
    }

    async fn drop_tenant(&self, tenant_id: &str) -> Result<()> {
        self.tenants
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(tenant_id);
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

struct Collection {
    dimension: usize,
    records: HashMap<String, VectorRecord>,
}

/// Vector store backed by process memory with cosine-similarity search.
#[derive(Default)]
pub struct MemoryVectorStore {
    collections: RwLock<HashMap<String, Collection>>,
}

impl MemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorStoreProvider for MemoryVectorStore {
    async fn connect(&self) -> Result<()> {
        Ok(())
    }

    async fn init_schema(&self, collection: &str, dimension: usize) -> Result<()> {
        let mut collections = self.collections.write().unwrap_or_else(|e| e.into_inner());
        collections.entry(collection.to_string()).or_insert(Collection {
            dimension,
            records: HashMap::new(),
        });
        Ok(())
    }

    async fn store_vector(&self, collection: &str, record: VectorRecord) -> Result<()> {
        let mut collections = self.collections.write().unwrap_or_else(|e| e.into_inner());
        let coll = collections.get_mut(collection).ok_or_else(|| {
            ValidationError::new(format!("unknown collection: '{collection}'"))
        })?;
        if record.vector.len() != coll.dimension {
            return Err(ValidationError::new(format!(
                "vector dimension {} does not match collection dimension {}",
                record.vector.len(),
                coll.dimension
            ))
            .into());
        }
        coll.records.insert(record.id.clone(), record);
        Ok(())
    }

    async fn search_by_vector(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<VectorMatch>> {
        let collections = self.collections.read().unwrap_or_else(|e| e.into_inner());
        let coll = collections.get(collection).ok_or_else(|| {
            ValidationError::new(format!("unknown collection: '{collection}'"))
        })?;
        if vector.len() != coll.dimension {
            return Err(ValidationError::new(format!(
                "query dimension {} does not match collection dimension {}",
                vector.len(),
                coll.dimension
            ))
            .into());
        }

        let mut matches: Vec<VectorMatch> = coll
            .records
            .values()
            .map(|record| VectorMatch {
                id: record.id.clone(),
                score: cosine_similarity(vector, &record.vector),
                payload: record.payload.clone(),
            })
            .collect();
        matches.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        matches.truncate(limit);
        Ok(matches)
    }

    async fn delete_vector(&self, collection: &str, id: &str) -> Result<()> {
        let mut collections = self.collections.write().unwrap_or_else(|e| e.into_inner());
        if let Some(coll) = collections.get_mut(collection) {
            coll.records.remove(id);
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn tenants_can_be_created_and_dropped() {
        let db = MemoryDatabaseProvider::new();
        db.create_tenant("t1").await.unwrap();
        assert!(db.has_tenant("t1"));
        db.drop_tenant("t1").await.unwrap();
        assert!(!db.has_tenant("t1"));
    }

    #[tokio::test]
    async fn search_ranks_by_cosine_similarity() {
        let store = MemoryVectorStore::new();
        store.init_schema("docs", 2).await.unwrap();
        for (id, vector) in [("a", [1.0, 0.0]), ("b", [0.0, 1.0]), ("c", [0.7, 0.7])] {
            store
                .store_vector(
                    "docs",
                    VectorRecord {
                        id: id.to_string(),
                        vector: vector.to_vec(),
                        payload: json!({ "doc": id }),
                    },
                )
                .await
                .unwrap();
        }

        let matches = store.search_by_vector("docs", &[1.0, 0.0], 2).await.unwrap();
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].id, "a");
        assert_eq!(matches[1].id, "c");
        assert!(matches[0].score > matches[1].score);
    }

    #[tokio::test]
    async fn dimension_mismatch_is_a_validation_error() {
        let store = MemoryVectorStore::new();
        store.init_schema("docs", 3).await.unwrap();
        let err = store
            .store_vector(
                "docs",
                VectorRecord {
                    id: "x".into(),
                    vector: vec![1.0, 2.0],
                    payload: json!({}),
                },
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("dimension"));
    }

    #[tokio::test]
    async fn delete_removes_record_from_search() {
        let store = MemoryVectorStore::new();
        store.init_schema("docs", 1).await.unwrap();
        store
            .store_vector(
                "docs",
                VectorRecord {
                    id: "x".into(),
                    vector: vec![1.0],
                    payload: json!({}),
                },
            )
            .await
            .unwrap();
        store.delete_vector("docs", "x").await.unwrap();
        let matches = store.search_by_vector("docs", &[1.0], 10).await.unwrap();
        assert!(matches.is_empty());
    }
}
