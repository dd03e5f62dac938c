use anyhow::{bail, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

use crate::client::{CollectionAdmin, CollectionSpec, IndexSpec};

/// How to create and populate a collection before sweeping it.
#[derive(Debug, Clone)]
pub struct LoadPlan {
    pub collection: CollectionSpec,
    pub index: IndexSpec,
    /// Vectors per insert request.
    pub insert_batch: usize,
    /// Pause after inserting so freshly written rows become visible to stats.
    pub settle: Duration,
}

#[derive(Debug, Clone)]
pub struct LoadReport {
    pub inserted: usize,
    pub row_count: u64,
    pub index: serde_json::Value,
}

/// Create the collection, build its index and insert `vectors`.
pub async fn prepare_collection<C>(
    client: &C,
    plan: &LoadPlan,
    vectors: &[Vec<f32>],
) -> Result<LoadReport>
where
    C: CollectionAdmin + ?Sized,
{
    let name = &plan.collection.name;
    if plan.insert_batch == 0 {
        bail!("insert batch size must be > 0");
    }
    if let Some(bad) = vectors.iter().find(|v| v.len() != plan.collection.dimension) {
        bail!(
            "vector of dimension {} cannot be inserted into {} (dimension {})",
            bad.len(),
            name,
            plan.collection.dimension
        );
    }
    if client.has_collection(name).await? {
        bail!("collection {} already exists; drop it first", name);
    }

    client.create_collection(&plan.collection).await?;
    let description = client.describe_collection(name).await?;
    tracing::info!(collection = %name, description = %description, "collection created");

    client.create_index(&plan.index).await?;
    tracing::info!(
        collection = %name,
        index_type = plan.index.index_type.as_str(),
        metric = plan.index.metric.as_str(),
        nlist = plan.index.nlist,
        "index created"
    );

    let pb = ProgressBar::new(vectors.len() as u64);
    if let Ok(style) = ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} vectors",
    ) {
        pb.set_style(style.progress_chars("#>-"));
    }

    let mut inserted = 0usize;
    for chunk in vectors.chunks(plan.insert_batch) {
        inserted += client.insert(name, chunk).await?;
        pb.inc(chunk.len() as u64);
    }
    pb.finish_with_message("insert complete");

    tokio::time::sleep(plan.settle).await;

    let row_count = client.row_count(name).await?;
    let index = client.describe_index(name).await?;
    tracing::info!(collection = %name, inserted, row_count, "collection ready");

    Ok(LoadReport {
        inserted,
        row_count,
        index,
    })
}

/// Drop the index and then the collection. A missing collection is not an error.
pub async fn teardown_collection<C>(client: &C, name: &str) -> Result<()>
where
    C: CollectionAdmin + ?Sized,
{
    if !client.has_collection(name).await? {
        tracing::warn!(collection = %name, "collection does not exist, nothing to drop");
        return Ok(());
    }

    client.drop_index(name).await?;
    client.drop_collection(name).await?;
    tracing::info!(collection = %name, "collection dropped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{IndexType, MetricType};
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingAdmin {
        exists: bool,
        calls: Mutex<Vec<String>>,
    }

    impl RecordingAdmin {
        fn record(&self, call: impl Into<String>) {
            self.calls.lock().unwrap().push(call.into());
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CollectionAdmin for RecordingAdmin {
        async fn has_collection(&self, _name: &str) -> Result<bool> {
            self.record("has");
            Ok(self.exists)
        }

        async fn create_collection(&self, spec: &CollectionSpec) -> Result<()> {
            self.record(format!("create:{}:{}", spec.name, spec.dimension));
            Ok(())
        }

        async fn describe_collection(&self, _name: &str) -> Result<serde_json::Value> {
            Ok(serde_json::json!({}))
        }

        async fn drop_collection(&self, name: &str) -> Result<()> {
            self.record(format!("drop_collection:{name}"));
            Ok(())
        }

        async fn create_index(&self, spec: &IndexSpec) -> Result<()> {
            self.record(format!("index:{}", spec.index_type.as_str()));
            Ok(())
        }

        async fn describe_index(&self, _collection: &str) -> Result<serde_json::Value> {
            Ok(serde_json::json!({ "indexType": "IVF_SQ8" }))
        }

        async fn drop_index(&self, collection: &str) -> Result<()> {
            self.record(format!("drop_index:{collection}"));
            Ok(())
        }

        async fn insert(&self, _collection: &str, vectors: &[Vec<f32>]) -> Result<usize> {
            self.record(format!("insert:{}", vectors.len()));
            Ok(vectors.len())
        }

        async fn row_count(&self, _collection: &str) -> Result<u64> {
            Ok(5)
        }
    }

    fn plan() -> LoadPlan {
        LoadPlan {
            collection: CollectionSpec {
                name: "ann".to_string(),
                dimension: 2,
                metric: MetricType::Ip,
            },
            index: IndexSpec {
                collection: "ann".to_string(),
                index_type: IndexType::IvfSq8,
                metric: MetricType::Ip,
                nlist: 1024,
            },
            insert_batch: 2,
            settle: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn prepare_creates_indexes_then_inserts_in_chunks() {
        let admin = RecordingAdmin::default();
        let vectors = vec![vec![1.0, 0.0]; 5];

        let report = prepare_collection(&admin, &plan(), &vectors).await.unwrap();

        assert_eq!(report.inserted, 5);
        assert_eq!(report.row_count, 5);
        assert_eq!(
            admin.calls(),
            vec!["has", "create:ann:2", "index:IVF_SQ8", "insert:2", "insert:2", "insert:1"]
        );
    }

    #[tokio::test]
    async fn prepare_refuses_existing_collection() {
        let admin = RecordingAdmin {
            exists: true,
            ..Default::default()
        };
        assert!(prepare_collection(&admin, &plan(), &[]).await.is_err());
        assert_eq!(admin.calls(), vec!["has"]);
    }

    #[tokio::test]
    async fn prepare_rejects_wrong_dimension() {
        let admin = RecordingAdmin::default();
        let vectors = vec![vec![1.0, 0.0, 0.0]];
        assert!(prepare_collection(&admin, &plan(), &vectors).await.is_err());
        assert!(admin.calls().is_empty());
    }

    #[tokio::test]
    async fn teardown_drops_index_before_collection() {
        let admin = RecordingAdmin {
            exists: true,
            ..Default::default()
        };
        teardown_collection(&admin, "ann").await.unwrap();
        assert_eq!(admin.calls(), vec!["has", "drop_index:ann", "drop_collection:ann"]);
    }

    #[tokio::test]
    async fn teardown_of_missing_collection_is_a_no_op() {
        let admin = RecordingAdmin::default();
        teardown_collection(&admin, "ann").await.unwrap();
        assert_eq!(admin.calls(), vec!["has"]);
    }
}
