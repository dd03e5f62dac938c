use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::QueryError;

pub mod http;

pub use http::HttpClient;

/// Client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    pub timeout_secs: u64,
    pub pool_size: usize,
    pub auth_token: Option<String>,
}

impl ClientConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    pub fn endpoint(&self) -> String {
        if self.host.starts_with("http://") || self.host.starts_with("https://") {
            format!("{}:{}", self.host.trim_end_matches('/'), self.port)
        } else {
            format!("http://{}:{}", self.host, self.port)
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 19530,
            timeout_secs: 30,
            pool_size: 64,
            auth_token: None,
        }
    }
}

/// One ranked neighbour returned for a query vector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: i64,
    pub distance: f32,
}

/// Hits per query vector, in the order the vectors were submitted.
pub type SearchResults = Vec<Vec<SearchHit>>;

/// The capability the sweep drives.
///
/// Implementations are shared by every worker of a run, so `search` must be
/// safe to call concurrently: one worker's call must never corrupt another's.
#[async_trait]
pub trait SearchClient: Send + Sync {
    /// Establish (and verify) connectivity to the server.
    async fn connect(&self) -> Result<()>;

    fn is_connected(&self) -> bool;

    /// Human-readable address, used in logs and errors.
    fn endpoint(&self) -> String;

    async fn search(
        &self,
        table: &str,
        vectors: &[Vec<f32>],
        top_k: usize,
        nprobe: u32,
    ) -> std::result::Result<SearchResults, QueryError>;
}

/// Collection lifecycle operations used by the `load` and `drop` commands.
/// The sweep itself assumes the collection already exists and is populated.
#[async_trait]
pub trait CollectionAdmin: Send + Sync {
    async fn has_collection(&self, name: &str) -> Result<bool>;

    async fn create_collection(&self, spec: &CollectionSpec) -> Result<()>;

    async fn describe_collection(&self, name: &str) -> Result<serde_json::Value>;

    async fn drop_collection(&self, name: &str) -> Result<()>;

    async fn create_index(&self, spec: &IndexSpec) -> Result<()>;

    async fn describe_index(&self, collection: &str) -> Result<serde_json::Value>;

    async fn drop_index(&self, collection: &str) -> Result<()>;

    /// Insert vectors, returning how many rows the server accepted.
    async fn insert(&self, collection: &str, vectors: &[Vec<f32>]) -> Result<usize>;

    async fn row_count(&self, collection: &str) -> Result<u64>;
}

/// Distance metric of a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum MetricType {
    L2,
    #[default]
    Ip,
    Cosine,
}

impl MetricType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricType::L2 => "L2",
            MetricType::Ip => "IP",
            MetricType::Cosine => "COSINE",
        }
    }
}

/// Index algorithm built over the vector field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum IndexType {
    Flat,
    IvfFlat,
    #[default]
    IvfSq8,
    IvfPq,
    Hnsw,
}

impl IndexType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexType::Flat => "FLAT",
            IndexType::IvfFlat => "IVF_FLAT",
            IndexType::IvfSq8 => "IVF_SQ8",
            IndexType::IvfPq => "IVF_PQ",
            IndexType::Hnsw => "HNSW",
        }
    }

    /// Build parameters for this index type.
    pub fn params(&self, nlist: u32) -> serde_json::Value {
        match self {
            IndexType::Flat => serde_json::json!({}),
            IndexType::IvfFlat | IndexType::IvfSq8 => serde_json::json!({ "nlist": nlist }),
            IndexType::IvfPq => serde_json::json!({ "nlist": nlist, "m": 8, "nbits": 8 }),
            IndexType::Hnsw => serde_json::json!({ "M": 16, "efConstruction": 200 }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CollectionSpec {
    pub name: String,
    pub dimension: usize,
    pub metric: MetricType,
}

#[derive(Debug, Clone)]
pub struct IndexSpec {
    pub collection: String,
    pub index_type: IndexType,
    pub metric: MetricType,
    pub nlist: u32,
}

/// Build a connected HTTP client
pub async fn connect(config: ClientConfig) -> Result<Arc<HttpClient>> {
    let client = HttpClient::new(config)?;
    client.connect().await?;
    Ok(Arc::new(client))
}
