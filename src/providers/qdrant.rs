//! Qdrant-backed vector store over its HTTP API.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::errors::Result;
use crate::http::{json_or_upstream, transport_error};

use super::{VectorMatch, VectorRecord, VectorStoreProvider};

const UPSTREAM: &str = "Qdrant";

pub struct QdrantVectorStore {
    base: String,
    api_key: Option<String>,
    http: reqwest::Client,
}

impl QdrantVectorStore {
    pub fn new(url: impl Into<String>, api_key: Option<String>, http: reqwest::Client) -> Self {
        Self {
            base: url.into().trim_end_matches('/').to_string(),
            api_key,
            http,
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self.http.request(method, format!("{}{}", self.base, path));
        if let Some(key) = &self.api_key {
            builder = builder.header("api-key", key);
        }
        builder
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<Value> {
        let response = builder.send().await.map_err(transport_error)?;
        json_or_upstream(UPSTREAM, response).await
    }
}

#[async_trait]
impl VectorStoreProvider for QdrantVectorStore {
    async fn connect(&self) -> Result<()> {
        self.send(self.request(reqwest::Method::GET, "/collections"))
            .await?;
        Ok(())
    }

    async fn init_schema(&self, collection: &str, dimension: usize) -> Result<()> {
        // PUT is idempotent on existing collections with the same settings.
        self.send(
            self.request(reqwest::Method::PUT, &format!("/collections/{collection}"))
                .json(&json!({
                    "vectors": { "size": dimension, "distance": "Cosine" }
                })),
        )
        .await?;
        Ok(())
    }

    async fn store_vector(&self, collection: &str, record: VectorRecord) -> Result<()> {
        self.send(
            self.request(
                reqwest::Method::PUT,
                &format!("/collections/{collection}/points"),
            )
            .json(&json!({
                "points": [{
                    "id": record.id,
                    "vector": record.vector,
                    "payload": record.payload,
                }]
            })),
        )
        .await?;
        Ok(())
    }

    async fn search_by_vector(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<VectorMatch>> {
        let body = self
            .send(
                self.request(
                    reqwest::Method::POST,
                    &format!("/collections/{collection}/points/search"),
                )
                .json(&json!({
                    "vector": vector,
                    "limit": limit,
                    "with_payload": true,
                })),
            )
            .await?;

        let hits = body
            .get("result")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();
        Ok(hits
            .into_iter()
            .map(|hit| VectorMatch {
                id: hit
                    .get("id")
                    .map(|v| match v {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .unwrap_or_default(),
                score: hit
                    .get("score")
                    .and_then(|v| v.as_f64())
                    .unwrap_or_default() as f32,
                payload: hit.get("payload").cloned().unwrap_or(Value::Null),
            })
            .collect())
    }

    async fn delete_vector(&self, collection: &str, id: &str) -> Result<()> {
        self.send(
            self.request(
                reqwest::Method::POST,
                &format!("/collections/{collection}/points/delete"),
            )
            .json(&json!({ "points": [id] })),
        )
        .await?;
        Ok(())
    }

    fn name(&self) -> &str {
        "qdrant"
    }
}
