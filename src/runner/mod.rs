use indicatif::{ProgressBar, ProgressStyle};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub mod executor;
pub mod setup;

pub use executor::RunExecutor;
pub use setup::{prepare_collection, teardown_collection, LoadPlan, LoadReport};

use crate::client::SearchClient;
use crate::error::SweepError;
use crate::metrics::{Cost, ReportRow, ReportSink};
use crate::workload::{ConfigurationMatrix, VectorPool};

/// Fixed parameters shared by every configuration of a sweep.
#[derive(Debug, Clone)]
pub struct SweepParameters {
    pub table: String,
    pub nprobe: u32,
    pub concurrency: usize,
    pub repetitions: usize,
    pub dimension: usize,
}

impl SweepParameters {
    pub fn validate(&self) -> Result<(), SweepError> {
        if self.table.trim().is_empty() {
            return Err(SweepError::invalid("table name cannot be empty"));
        }
        if self.concurrency == 0 {
            return Err(SweepError::invalid("concurrency must be at least 1"));
        }
        if self.repetitions == 0 {
            return Err(SweepError::invalid("repetitions must be at least 1"));
        }
        if self.dimension == 0 {
            return Err(SweepError::invalid("dimension must be at least 1"));
        }
        Ok(())
    }

    /// Search calls issued per configuration.
    pub fn total_queries(&self) -> u64 {
        self.repetitions as u64 * self.concurrency as u64
    }
}

/// What a completed sweep produced.
#[derive(Debug, Clone)]
pub struct SweepSummary {
    pub rows: Vec<ReportRow>,
    pub report_path: PathBuf,
    pub failed_queries: u64,
    pub elapsed: Duration,
}

/// Drives the whole matrix, one configuration at a time, appending a report
/// row after each.
pub struct SweepController {
    client: Arc<dyn SearchClient>,
    params: Arc<SweepParameters>,
    matrix: ConfigurationMatrix,
    pool: VectorPool,
    report_path: PathBuf,
}

impl SweepController {
    /// Validate everything that could fail mid-sweep before any worker starts.
    pub fn new(
        client: Arc<dyn SearchClient>,
        params: SweepParameters,
        matrix: ConfigurationMatrix,
        pool: VectorPool,
        report_path: impl Into<PathBuf>,
    ) -> Result<Self, SweepError> {
        params.validate()?;
        if pool.dimension() != params.dimension {
            return Err(SweepError::invalid(format!(
                "vector pool dimension {} does not match table dimension {}",
                pool.dimension(),
                params.dimension
            )));
        }
        pool.ensure_capacity(matrix.max_batch_size())?;

        Ok(Self {
            client,
            params: Arc::new(params),
            matrix,
            pool,
            report_path: report_path.into(),
        })
    }

    /// Run every configuration to completion.
    pub async fn run(self) -> Result<SweepSummary, SweepError> {
        self.run_until(std::future::pending::<()>()).await
    }

    /// Run until the matrix is exhausted or `shutdown` resolves. On shutdown
    /// the in-flight configuration's workers are aborted and the rows written
    /// so far stay in the report.
    pub async fn run_until<F>(self, shutdown: F) -> Result<SweepSummary, SweepError>
    where
        F: Future<Output = ()>,
    {
        if !self.client.is_connected() {
            return Err(SweepError::NotConnected {
                endpoint: self.client.endpoint(),
            });
        }

        let mut sink = ReportSink::open(&self.report_path)?;
        let executor = RunExecutor::new(Arc::clone(&self.client), Arc::clone(&self.params));

        tracing::info!(
            table = %self.params.table,
            nprobe = self.params.nprobe,
            concurrency = self.params.concurrency,
            repetitions = self.params.repetitions,
            nq = ?self.matrix.batch_sizes(),
            topks = ?self.matrix.top_ks(),
            report = %self.report_path.display(),
            "starting sweep"
        );

        let progress = ProgressBar::new(self.matrix.len() as u64);
        if let Ok(style) = ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
        ) {
            progress.set_style(style.progress_chars("#>-"));
        }

        tokio::pin!(shutdown);
        let sweep_started = Instant::now();
        let mut rows = Vec::with_capacity(self.matrix.len());
        let mut failed_queries = 0u64;
        let mut current_group = None;

        for config in self.matrix.iter() {
            if current_group != Some(config.batch_size) {
                if current_group.is_some() {
                    sink.end_group()?;
                }
                sink.write_header()?;
                current_group = Some(config.batch_size);
            }

            progress.set_message(format!("nq={} topk={}", config.batch_size, config.top_k));
            let batch = self.pool.query_batch(config.batch_size)?;

            let run = tokio::select! {
                result = executor.run(config, batch) => result?,
                _ = &mut shutdown => {
                    progress.abandon_with_message("interrupted");
                    tracing::warn!(
                        nq = config.batch_size,
                        topk = config.top_k,
                        completed = rows.len(),
                        "sweep interrupted, aborting in-flight workers"
                    );
                    sink.close()?;
                    return Err(SweepError::Interrupted { completed: rows.len() });
                }
            };

            let row = ReportRow::derive(&run, config.batch_size);
            sink.write_row(&row)?;

            match row.cost {
                Cost::Measured {
                    per_batch_secs,
                    per_vector_secs,
                } => tracing::info!(
                    batch = config.batch_size,
                    topk = config.top_k,
                    cost_per_batch = per_batch_secs,
                    cost_per_vector = per_vector_secs,
                    failed = run.failed_queries,
                    elapsed_ms = run.elapsed.as_millis() as u64,
                    "configuration complete"
                ),
                Cost::Undefined => tracing::warn!(
                    batch = config.batch_size,
                    topk = config.top_k,
                    failed = run.failed_queries,
                    "every search in this configuration failed; cost is undefined"
                ),
            }

            failed_queries += run.failed_queries;
            rows.push(row);
            progress.inc(1);
        }

        if current_group.is_some() {
            sink.end_group()?;
        }
        let report_path = sink.close()?;
        progress.finish_with_message("sweep complete");

        Ok(SweepSummary {
            rows,
            report_path,
            failed_queries,
            elapsed: sweep_started.elapsed(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> SweepParameters {
        SweepParameters {
            table: "bench".to_string(),
            nprobe: 8,
            concurrency: 2,
            repetitions: 3,
            dimension: 4,
        }
    }

    #[test]
    fn total_queries_is_repetitions_times_concurrency() {
        assert_eq!(params().total_queries(), 6);
    }

    #[test]
    fn zero_concurrency_or_repetitions_rejected() {
        let mut p = params();
        p.concurrency = 0;
        assert!(matches!(p.validate(), Err(SweepError::InvalidParameter(_))));

        let mut p = params();
        p.repetitions = 0;
        assert!(matches!(p.validate(), Err(SweepError::InvalidParameter(_))));

        let mut p = params();
        p.table = "  ".to_string();
        assert!(p.validate().is_err());
    }
}
