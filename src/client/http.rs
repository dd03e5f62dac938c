use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::{
    ClientConfig, CollectionAdmin, CollectionSpec, IndexSpec, SearchClient, SearchHit,
    SearchResults,
};
use crate::error::QueryError;

const VECTOR_FIELD: &str = "vector";
const PRIMARY_FIELD: &str = "id";
const INDEX_NAME: &str = "vector_index";

/// HTTP client for a Milvus-style REST (v2) vector database.
///
/// `reqwest::Client` pools connections internally, so a single instance is
/// shared by every sweep worker.
#[derive(Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    base_url: String,
    auth_token: Option<String>,
    connected: Arc<AtomicBool>,
}

/// Response envelope: `{"code": 0, "message": "", "data": ...}`.
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: Value,
}

impl HttpClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(config.pool_size)
            .pool_idle_timeout(Duration::from_secs(600))
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(config.timeout_secs))
            .tcp_keepalive(Duration::from_secs(600))
            .tcp_nodelay(true)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: config.endpoint(),
            auth_token: config.auth_token,
            connected: Arc::new(AtomicBool::new(false)),
        })
    }

    async fn call(&self, path: &str, body: Value) -> std::result::Result<Value, QueryError> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.client.post(&url).json(&body);
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| QueryError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(QueryError::Transport(format!("HTTP {} from {}", status, path)));
        }

        let envelope: Envelope = response
            .json()
            .await
            .map_err(|e| QueryError::Malformed(e.to_string()))?;

        if envelope.code != 0 {
            return Err(QueryError::Rejected {
                code: envelope.code,
                message: envelope.message,
            });
        }

        Ok(envelope.data)
    }
}

#[async_trait]
impl SearchClient for HttpClient {
    async fn connect(&self) -> Result<()> {
        let result = self.call("/v2/vectordb/collections/list", json!({})).await;
        self.connected.store(result.is_ok(), Ordering::Release);
        result
            .map(|_| ())
            .with_context(|| format!("Failed to reach {}", self.base_url))
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn endpoint(&self) -> String {
        self.base_url.clone()
    }

    async fn search(
        &self,
        table: &str,
        vectors: &[Vec<f32>],
        top_k: usize,
        nprobe: u32,
    ) -> std::result::Result<SearchResults, QueryError> {
        let body = json!({
            "collectionName": table,
            "data": vectors,
            "annsField": VECTOR_FIELD,
            "limit": top_k,
            "searchParams": { "params": { "nprobe": nprobe } },
        });

        let data = self.call("/v2/vectordb/entities/search", body).await?;
        parse_hits(data, vectors.len(), top_k)
    }
}

#[async_trait]
impl CollectionAdmin for HttpClient {
    async fn has_collection(&self, name: &str) -> Result<bool> {
        let data = self
            .call("/v2/vectordb/collections/has", json!({ "collectionName": name }))
            .await?;
        Ok(data.get("has").and_then(Value::as_bool).unwrap_or(false))
    }

    async fn create_collection(&self, spec: &CollectionSpec) -> Result<()> {
        let body = json!({
            "collectionName": spec.name,
            "schema": {
                "autoId": true,
                "fields": [
                    { "fieldName": PRIMARY_FIELD, "dataType": "Int64", "isPrimary": true },
                    {
                        "fieldName": VECTOR_FIELD,
                        "dataType": "FloatVector",
                        "elementTypeParams": { "dim": spec.dimension.to_string() }
                    }
                ]
            }
        });
        self.call("/v2/vectordb/collections/create", body)
            .await
            .with_context(|| format!("create collection {}", spec.name))?;
        Ok(())
    }

    async fn describe_collection(&self, name: &str) -> Result<Value> {
        let data = self
            .call(
                "/v2/vectordb/collections/describe",
                json!({ "collectionName": name }),
            )
            .await?;
        Ok(data)
    }

    async fn drop_collection(&self, name: &str) -> Result<()> {
        self.call("/v2/vectordb/collections/drop", json!({ "collectionName": name }))
            .await
            .with_context(|| format!("drop collection {name}"))?;
        Ok(())
    }

    async fn create_index(&self, spec: &IndexSpec) -> Result<()> {
        let mut params = spec.index_type.params(spec.nlist);
        if let Some(map) = params.as_object_mut() {
            map.insert("index_type".to_string(), json!(spec.index_type.as_str()));
        }
        let body = json!({
            "collectionName": spec.collection,
            "indexParams": [{
                "fieldName": VECTOR_FIELD,
                "indexName": INDEX_NAME,
                "metricType": spec.metric.as_str(),
                "indexType": spec.index_type.as_str(),
                "params": params,
            }]
        });
        self.call("/v2/vectordb/indexes/create", body)
            .await
            .with_context(|| format!("create index on {}", spec.collection))?;

        // Search needs the collection in memory.
        self.call(
            "/v2/vectordb/collections/load",
            json!({ "collectionName": spec.collection }),
        )
        .await
        .with_context(|| format!("load collection {}", spec.collection))?;
        Ok(())
    }

    async fn describe_index(&self, collection: &str) -> Result<Value> {
        let data = self
            .call(
                "/v2/vectordb/indexes/describe",
                json!({ "collectionName": collection, "indexName": INDEX_NAME }),
            )
            .await?;
        Ok(data)
    }

    async fn drop_index(&self, collection: &str) -> Result<()> {
        self.call(
            "/v2/vectordb/collections/release",
            json!({ "collectionName": collection }),
        )
        .await
        .with_context(|| format!("release collection {collection}"))?;
        self.call(
            "/v2/vectordb/indexes/drop",
            json!({ "collectionName": collection, "indexName": INDEX_NAME }),
        )
        .await
        .with_context(|| format!("drop index on {collection}"))?;
        Ok(())
    }

    async fn insert(&self, collection: &str, vectors: &[Vec<f32>]) -> Result<usize> {
        let rows: Vec<Value> = vectors.iter().map(|v| json!({ VECTOR_FIELD: v })).collect();
        let data = self
            .call(
                "/v2/vectordb/entities/insert",
                json!({ "collectionName": collection, "data": rows }),
            )
            .await
            .with_context(|| format!("insert {} vectors into {}", vectors.len(), collection))?;
        Ok(data
            .get("insertCount")
            .and_then(Value::as_u64)
            .map(|n| n as usize)
            .unwrap_or(vectors.len()))
    }

    async fn row_count(&self, collection: &str) -> Result<u64> {
        let data = self
            .call(
                "/v2/vectordb/collections/get_stats",
                json!({ "collectionName": collection }),
            )
            .await?;
        data.get("rowCount")
            .and_then(|v| v.as_u64().or_else(|| v.as_str().and_then(|s| s.parse().ok())))
            .context("get_stats response has no rowCount")
    }
}

/// Turn a search `data` payload into one hit list per query vector.
///
/// Servers answer either with one array per query vector or with a single
/// flat array holding `top_k` hits per vector back to back.
fn parse_hits(
    data: Value,
    nq: usize,
    top_k: usize,
) -> std::result::Result<SearchResults, QueryError> {
    let items = match data {
        Value::Array(items) => items,
        Value::Null => Vec::new(),
        other => {
            return Err(QueryError::Malformed(format!(
                "expected array of hits, got {other}"
            )))
        }
    };

    let results: SearchResults = if items.iter().all(Value::is_array) && !items.is_empty() {
        let results = items
            .iter()
            .map(|group| {
                group
                    .as_array()
                    .into_iter()
                    .flatten()
                    .map(parse_hit)
                    .collect::<std::result::Result<Vec<_>, _>>()
            })
            .collect::<std::result::Result<SearchResults, _>>()?;
        if results.len() != nq {
            return Err(QueryError::Malformed(format!(
                "{} hit lists for {} query vectors",
                results.len(),
                nq
            )));
        }
        results
    } else {
        let hits = items
            .iter()
            .map(parse_hit)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        if hits.len() > nq.max(1) * top_k {
            return Err(QueryError::Malformed(format!(
                "{} hits returned for {} query vectors at topK {}",
                hits.len(),
                nq,
                top_k
            )));
        }
        if nq <= 1 {
            vec![hits]
        } else {
            let mut groups: SearchResults = hits.chunks(top_k.max(1)).map(<[_]>::to_vec).collect();
            groups.resize(nq, Vec::new());
            groups
        }
    };

    if let Some(list) = results.iter().find(|hits| hits.len() > top_k) {
        return Err(QueryError::Malformed(format!(
            "{} hits returned for topK {}",
            list.len(),
            top_k
        )));
    }
    Ok(results)
}

fn parse_hit(value: &Value) -> std::result::Result<SearchHit, QueryError> {
    let id = value
        .get("id")
        .and_then(|v| v.as_i64().or_else(|| v.as_str().and_then(|s| s.parse().ok())))
        .ok_or_else(|| QueryError::Malformed(format!("hit without numeric id: {value}")))?;
    let distance = value
        .get("distance")
        .and_then(Value::as_f64)
        .ok_or_else(|| QueryError::Malformed(format!("hit without distance: {value}")))?;
    Ok(SearchHit {
        id,
        distance: distance as f32,
    })
}
