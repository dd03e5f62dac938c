use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;
use tracing::Instrument;

use super::SweepParameters;
use crate::client::SearchClient;
use crate::error::SweepError;
use crate::metrics::{RunCollector, RunResult, WorkerStats};
use crate::workload::{Configuration, QueryBatch};

/// Runs one configuration: `concurrency` workers, each issuing the same
/// search `repetitions` times back to back.
pub struct RunExecutor {
    client: Arc<dyn SearchClient>,
    params: Arc<SweepParameters>,
}

impl RunExecutor {
    pub fn new(client: Arc<dyn SearchClient>, params: Arc<SweepParameters>) -> Self {
        Self { client, params }
    }

    /// Execute the run and wait for every worker to finish.
    ///
    /// The worker group lives only as long as this future. Dropping the
    /// future (sweep abort) drops the `JoinSet`, which aborts any worker still
    /// blocked on a search call.
    pub async fn run(
        &self,
        config: Configuration,
        batch: QueryBatch,
    ) -> Result<RunResult, SweepError> {
        if batch.len() != config.batch_size {
            return Err(SweepError::invalid(format!(
                "query batch holds {} vectors, configuration expects {}",
                batch.len(),
                config.batch_size
            )));
        }

        let concurrency = self.params.concurrency;
        let mut workers = JoinSet::new();

        let started = Instant::now();
        for worker_id in 0..concurrency {
            let client = Arc::clone(&self.client);
            let params = Arc::clone(&self.params);
            let batch = Arc::clone(&batch);
            let span = tracing::debug_span!(
                "worker",
                id = worker_id,
                nq = config.batch_size,
                topk = config.top_k
            );

            workers.spawn(
                run_worker(worker_id, client, params, config, batch).instrument(span),
            );
        }

        let mut collector = RunCollector::default();
        while let Some(joined) = workers.join_next().await {
            let stats = joined.map_err(|e| SweepError::Worker(e.to_string()))?;
            collector.merge(&stats);
        }
        let elapsed = started.elapsed();

        debug_assert_eq!(collector.workers_joined(), concurrency);
        Ok(collector.finalize(config, elapsed, self.params.total_queries()))
    }
}

async fn run_worker(
    worker_id: usize,
    client: Arc<dyn SearchClient>,
    params: Arc<SweepParameters>,
    config: Configuration,
    batch: QueryBatch,
) -> WorkerStats {
    let mut stats = WorkerStats::new(worker_id);

    for repetition in 0..params.repetitions {
        match client
            .search(&params.table, &batch, config.top_k, params.nprobe)
            .await
        {
            Ok(_) => {
                stats.record_success();
                tracing::debug!(repetition, "search completed");
            }
            Err(err) => {
                stats.record_failure();
                tracing::warn!(
                    worker = worker_id,
                    nq = config.batch_size,
                    topk = config.top_k,
                    repetition,
                    error = %err,
                    "search failed"
                );
            }
        }
    }

    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::SearchResults;
    use crate::error::QueryError;
    use crate::workload::VectorPool;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    /// Counts calls; fails every call whose 1-based index is a multiple of `fail_every`.
    struct CountingClient {
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        fail_every: Option<usize>,
        delay: Duration,
        connected: AtomicBool,
    }

    impl CountingClient {
        fn new(fail_every: Option<usize>, delay: Duration) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                fail_every,
                delay,
                connected: AtomicBool::new(true),
            }
        }
    }

    #[async_trait]
    impl SearchClient for CountingClient {
        async fn connect(&self) -> anyhow::Result<()> {
            Ok(())
        }

        fn is_connected(&self) -> bool {
            self.connected.load(Ordering::Relaxed)
        }

        fn endpoint(&self) -> String {
            "counting".to_string()
        }

        async fn search(
            &self,
            _table: &str,
            vectors: &[Vec<f32>],
            _top_k: usize,
            _nprobe: u32,
        ) -> Result<SearchResults, QueryError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            match self.fail_every {
                Some(n) if call % n == 0 => Err(QueryError::Transport("injected".into())),
                _ => Ok(vec![Vec::new(); vectors.len()]),
            }
        }
    }

    fn params(concurrency: usize, repetitions: usize) -> Arc<SweepParameters> {
        Arc::new(SweepParameters {
            table: "bench".to_string(),
            nprobe: 16,
            concurrency,
            repetitions,
            dimension: 4,
        })
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn runs_every_repetition_on_every_worker() {
        let client = Arc::new(CountingClient::new(None, Duration::from_millis(5)));
        let executor = RunExecutor::new(client.clone(), params(4, 3));
        let pool = VectorPool::seeded(8, 4, 1);

        let result = executor
            .run(Configuration::new(2, 10), pool.query_batch(2).unwrap())
            .await
            .unwrap();

        assert_eq!(client.calls.load(Ordering::SeqCst), 12);
        assert_eq!(result.total_queries, 12);
        assert_eq!(result.successful_queries, 12);
        assert_eq!(result.failed_queries, 0);
        assert!(client.max_in_flight.load(Ordering::SeqCst) > 1);
        assert!(client.max_in_flight.load(Ordering::SeqCst) <= 4);
        assert!(result.elapsed >= Duration::from_millis(15));
    }

    #[tokio::test]
    async fn failed_calls_do_not_stop_the_worker() {
        let client = Arc::new(CountingClient::new(Some(3), Duration::ZERO));
        let executor = RunExecutor::new(client.clone(), params(1, 9));
        let pool = VectorPool::seeded(1, 4, 1);

        let result = executor
            .run(Configuration::new(1, 5), pool.query_batch(1).unwrap())
            .await
            .unwrap();

        assert_eq!(client.calls.load(Ordering::SeqCst), 9);
        assert_eq!(result.successful_queries, 6);
        assert_eq!(result.failed_queries, 3);
    }

    #[tokio::test]
    async fn batch_must_match_configuration() {
        let client = Arc::new(CountingClient::new(None, Duration::ZERO));
        let executor = RunExecutor::new(client.clone(), params(1, 1));
        let pool = VectorPool::seeded(4, 4, 1);

        let err = executor
            .run(Configuration::new(3, 5), pool.query_batch(2).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, SweepError::InvalidParameter(_)));
        assert_eq!(client.calls.load(Ordering::SeqCst), 0);
    }
}
