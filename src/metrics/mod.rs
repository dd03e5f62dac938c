use serde::Serialize;
use std::time::Duration;

pub mod reporter;
pub use reporter::{ReportSink, ResultsReporter};

use crate::workload::Configuration;

/// Outcome of one configuration's run, produced once after all its workers join.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunResult {
    pub config: Configuration,
    /// Wall clock from dispatching the first worker to the last worker finishing.
    pub elapsed: Duration,
    /// `repetitions * concurrency`, counting failed calls.
    pub total_queries: u64,
    pub successful_queries: u64,
    pub failed_queries: u64,
}

impl RunResult {
    pub fn elapsed_millis(&self) -> f64 {
        self.elapsed.as_secs_f64() * 1000.0
    }
}

/// Per-worker tally, merged into a [`RunCollector`] when the worker joins.
#[derive(Debug, Clone, Default)]
pub struct WorkerStats {
    pub worker_id: usize,
    pub successful: u64,
    pub failed: u64,
}

impl WorkerStats {
    pub fn new(worker_id: usize) -> Self {
        Self {
            worker_id,
            ..Self::default()
        }
    }

    pub fn record_success(&mut self) {
        self.successful += 1;
    }

    pub fn record_failure(&mut self) {
        self.failed += 1;
    }
}

/// Collects worker tallies for one configuration.
#[derive(Debug, Default)]
pub struct RunCollector {
    workers_joined: usize,
    successful: u64,
    failed: u64,
}

impl RunCollector {
    pub fn merge(&mut self, worker: &WorkerStats) {
        self.workers_joined += 1;
        self.successful += worker.successful;
        self.failed += worker.failed;
    }

    pub fn workers_joined(&self) -> usize {
        self.workers_joined
    }

    pub fn finalize(
        &self,
        config: Configuration,
        elapsed: Duration,
        total_queries: u64,
    ) -> RunResult {
        RunResult {
            config,
            elapsed,
            total_queries,
            successful_queries: self.successful,
            failed_queries: self.failed,
        }
    }
}

/// Derived costs for one configuration. `Undefined` when no query in the run
/// succeeded, so there is no meaningful time to attribute.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum Cost {
    Measured {
        per_batch_secs: f64,
        per_vector_secs: f64,
    },
    Undefined,
}

/// One line of the report.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ReportRow {
    pub batch_size: usize,
    pub top_k: usize,
    pub cost: Cost,
    pub failed_queries: u64,
}

impl ReportRow {
    /// Derive per-batch and per-vector cost from a run.
    ///
    /// Per-vector cost divides the batch cost linearly by `nq`; batched
    /// search is assumed to have no economies of scale.
    pub fn derive(run: &RunResult, nq: usize) -> Self {
        let cost = if run.total_queries == 0 || run.successful_queries == 0 || nq == 0 {
            Cost::Undefined
        } else {
            let per_batch_secs = run.elapsed_millis() / 1000.0 / run.total_queries as f64;
            Cost::Measured {
                per_batch_secs,
                per_vector_secs: per_batch_secs / nq as f64,
            }
        };

        Self {
            batch_size: run.config.batch_size,
            top_k: run.config.top_k,
            cost,
            failed_queries: run.failed_queries,
        }
    }

    pub fn cost_per_batch_secs(&self) -> Option<f64> {
        match self.cost {
            Cost::Measured { per_batch_secs, .. } => Some(per_batch_secs),
            Cost::Undefined => None,
        }
    }

    pub fn cost_per_vector_secs(&self) -> Option<f64> {
        match self.cost {
            Cost::Measured {
                per_vector_secs, ..
            } => Some(per_vector_secs),
            Cost::Undefined => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(elapsed_ms: u64, total: u64, failed: u64) -> RunResult {
        RunResult {
            config: Configuration::new(10, 100),
            elapsed: Duration::from_millis(elapsed_ms),
            total_queries: total,
            successful_queries: total - failed,
            failed_queries: failed,
        }
    }

    #[test]
    fn costs_follow_elapsed_over_queries() {
        let result = run(1200, 6, 0);
        let row = ReportRow::derive(&result, 10);

        let per_batch = result.elapsed_millis() / 1000.0 / 6.0;
        assert_eq!(row.cost_per_batch_secs(), Some(per_batch));
        assert_eq!(row.cost_per_vector_secs(), Some(per_batch / 10.0));
        assert!((per_batch - 0.2).abs() < 1e-12);
        assert_eq!(row.batch_size, 10);
        assert_eq!(row.top_k, 100);
    }

    #[test]
    fn failed_calls_still_count_towards_total() {
        let row = ReportRow::derive(&run(600, 6, 2), 1);
        assert!((row.cost_per_batch_secs().unwrap() - 0.1).abs() < 1e-12);
        assert_eq!(row.failed_queries, 2);
    }

    #[test]
    fn all_failed_run_has_undefined_cost() {
        let row = ReportRow::derive(&run(600, 6, 6), 10);
        assert_eq!(row.cost, Cost::Undefined);
        assert_eq!(row.cost_per_batch_secs(), None);
    }

    #[test]
    fn zero_elapsed_is_zero_cost() {
        let row = ReportRow::derive(&run(0, 4, 0), 5);
        assert_eq!(row.cost_per_batch_secs(), Some(0.0));
        assert_eq!(row.cost_per_vector_secs(), Some(0.0));
    }

    #[test]
    fn collector_sums_workers() {
        let mut collector = RunCollector::default();
        let mut a = WorkerStats::new(0);
        a.record_success();
        a.record_failure();
        let mut b = WorkerStats::new(1);
        b.record_success();
        collector.merge(&a);
        collector.merge(&b);

        let result = collector.finalize(Configuration::new(1, 10), Duration::from_millis(5), 3);
        assert_eq!(collector.workers_joined(), 2);
        assert_eq!(result.successful_queries, 2);
        assert_eq!(result.failed_queries, 1);
    }
}
