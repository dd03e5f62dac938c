//! Vector search sweep benchmark
//!
//! Drives a remote vector search service through every (nq, topK)
//! combination of a sweep, running a fixed pool of concurrent workers per
//! combination and reporting the mean cost per batch and per query vector.
//!
//! # Architecture
//!
//! ```text
//! vsbench
//! ├── client/       # SearchClient / CollectionAdmin traits and the HTTP client
//! ├── workload/     # configuration matrix, vector pool, fvecs reader
//! ├── metrics/      # run results, cost derivation, CSV report
//! └── runner/       # per-configuration executor and sweep controller
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use vsbench::{
//!     client, ClientConfig, ConfigurationMatrix, SweepController, SweepParameters, VectorPool,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = client::connect(ClientConfig::new("127.0.0.1", 19530)).await?;
//!     let params = SweepParameters {
//!         table: "ann_1m_sq8".to_string(),
//!         nprobe: 16,
//!         concurrency: 8,
//!         repetitions: 10,
//!         dimension: 128,
//!     };
//!     let matrix = ConfigurationMatrix::new(&[1, 10, 30, 50], &[10, 100, 500, 1024])?;
//!     let pool = VectorPool::from_entropy(10_000, 128);
//!
//!     let controller = SweepController::new(client, params, matrix, pool, "out.csv")?;
//!     let summary = controller.run().await?;
//!     println!("{} rows written", summary.rows.len());
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod metrics;
pub mod runner;
pub mod workload;

pub use client::{ClientConfig, CollectionAdmin, HttpClient, SearchClient, SearchHit, SearchResults};
pub use config::SweepSettings;
pub use error::{QueryError, SweepError};
pub use metrics::{Cost, ReportRow, ReportSink, ResultsReporter, RunResult};
pub use runner::{RunExecutor, SweepController, SweepParameters, SweepSummary};
pub use workload::{Configuration, ConfigurationMatrix, QueryBatch, VectorPool};
