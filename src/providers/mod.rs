//! Storage provider selection.
//!
//! Providers are resolved by name from configuration and constructed once at
//! startup; everything downstream receives the trait object. Unknown names
//! fail fast with the list of supported providers.

use std::env;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::context::ExecutionContext;
use crate::errors::{Error, Result};

pub mod memory;
pub mod qdrant;

pub use memory::{MemoryDatabaseProvider, MemoryVectorStore};
pub use qdrant::QdrantVectorStore;

const DEFAULT_PROVIDER: &str = "memory";

/// Provider names and connection settings, typically read from the
/// environment at startup.
#[derive(Debug, Clone, Default)]
pub struct ProviderConfig {
    pub database: String,
    pub vector_store: String,
    pub postgres_uri: Option<String>,
    pub qdrant_url: Option<String>,
    pub qdrant_api_key: Option<String>,
}

impl ProviderConfig {
    /// Read provider selection from the process environment. Unset selectors
    /// fall back to the in-memory providers.
    pub fn from_env() -> Self {
        Self {
            database: env::var("DB_PROVIDER").unwrap_or_else(|_| DEFAULT_PROVIDER.to_string()),
            vector_store: env::var("VECTOR_DB_PROVIDER")
                .unwrap_or_else(|_| DEFAULT_PROVIDER.to_string()),
            postgres_uri: env::var("POSTGRES_URI").ok(),
            qdrant_url: env::var("QDRANT_URL").ok(),
            qdrant_api_key: env::var("QDRANT_API_KEY").ok(),
        }
    }
}

/// One stored vector with its payload.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorRecord {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: Value,
}

/// One similarity-search hit, highest score first.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorMatch {
    pub id: String,
    pub score: f32,
    pub payload: Value,
}

/// Relational storage backend for tenant data.
#[async_trait]
pub trait DatabaseProvider: Send + Sync {
    /// Verify connectivity; called once at startup.
    async fn connect(&self) -> Result<()>;

    /// Create base tables/collections if absent. Idempotent.
    async fn init_schema(&self) -> Result<()>;

    async fn create_tenant(&self, tenant_id: &str) -> Result<()>;

    async fn drop_tenant(&self, tenant_id: &str) -> Result<()>;

    fn name(&self) -> &str;
}

/// Vector similarity storage backend.
#[async_trait]
pub trait VectorStoreProvider: Send + Sync {
    async fn connect(&self) -> Result<()>;

    /// Create the collection with the given dimension if absent. Idempotent.
    async fn init_schema(&self, collection: &str, dimension: usize) -> Result<()>;

    async fn store_vector(&self, collection: &str, record: VectorRecord) -> Result<()>;

    async fn search_by_vector(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<VectorMatch>>;

    async fn delete_vector(&self, collection: &str, id: &str) -> Result<()>;

    fn name(&self) -> &str;
}

/// Resolve the configured database provider by name.
pub fn database_provider(config: &ProviderConfig) -> Result<Arc<dyn DatabaseProvider>> {
    match config.database.as_str() {
        "" | "memory" => Ok(Arc::new(MemoryDatabaseProvider::new())),
        other => Err(Error::Config(format!(
            "unknown database provider: '{other}'. Available: memory"
        ))),
    }
}

/// Resolve the configured vector-store provider by name. Qdrant requires
/// `QDRANT_URL`.
pub fn vector_store_provider(
    config: &ProviderConfig,
    ctx: &ExecutionContext,
) -> Result<Arc<dyn VectorStoreProvider>> {
    match config.vector_store.as_str() {
        "" | "memory" => Ok(Arc::new(MemoryVectorStore::new())),
        "qdrant" => {
            let url = config.qdrant_url.clone().ok_or_else(|| {
                Error::Config("QDRANT_URL is required for the qdrant provider".to_string())
            })?;
            Ok(Arc::new(QdrantVectorStore::new(
                url,
                config.qdrant_api_key.clone(),
                ctx.http().clone(),
            )))
        }
        other => Err(Error::Config(format!(
            "unknown vector store provider: '{other}'. Available: memory, qdrant"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_provider_names_are_rejected() {
        let config = ProviderConfig {
            database: "oracle".into(),
            ..ProviderConfig::default()
        };
        let err = database_provider(&config)
            .err()
            .expect("unknown provider name should fail");
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("oracle"));
        assert!(err.to_string().contains("memory"));
    }

    #[test]
    fn qdrant_requires_url() {
        let ctx = ExecutionContext::builder().build().unwrap();
        let config = ProviderConfig {
            vector_store: "qdrant".into(),
            ..ProviderConfig::default()
        };
        let err = vector_store_provider(&config, &ctx)
            .err()
            .expect("qdrant without a URL should fail");
        assert!(err.to_string().contains("QDRANT_URL"));
    }

    #[test]
    fn empty_selector_falls_back_to_memory() {
        let ctx = ExecutionContext::builder().build().unwrap();
        let config = ProviderConfig::default();
        assert_eq!(database_provider(&config).unwrap().name(), "memory");
        assert_eq!(
            vector_store_provider(&config, &ctx).unwrap().name(),
            "memory"
        );
    }
}
