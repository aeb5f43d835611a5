//! Dispatcher - ships filtered batches to the sink through the worker pool

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use contracts::{
    ContractError, DispatchPoolConfig, LogBatch, LogSink, SinkConfig, SinkType, TaskLogConfig,
};
use tracing::{debug, error, info, instrument, warn};

use crate::error::DispatcherError;
use crate::metrics::DispatchMetrics;
use crate::pool::{PoolConfig, PoolStatus, Submission, WorkerPool};
use crate::sinks::{FanoutSink, FileSink, NetworkSink, TracingSink};

/// Asynchronous batch shipper
///
/// A sink failure never reaches the submitter: it is logged, counted and the
/// batch is dropped.
pub struct Dispatcher {
    pool: WorkerPool,
    sink: Arc<dyn LogSink>,
    metrics: Arc<DispatchMetrics>,
}

impl Dispatcher {
    pub fn new(pool_config: &DispatchPoolConfig, sink: Arc<dyn LogSink>) -> Self {
        Self::with_pool(WorkerPool::new(PoolConfig::from(pool_config)), sink)
    }

    /// Create a dispatcher on an existing pool (for testing)
    pub fn with_pool(pool: WorkerPool, sink: Arc<dyn LogSink>) -> Self {
        Self {
            pool,
            sink,
            metrics: Arc::new(DispatchMetrics::new()),
        }
    }

    pub fn sink_name(&self) -> &str {
        self.sink.name()
    }

    pub fn metrics(&self) -> &Arc<DispatchMetrics> {
        &self.metrics
    }

    pub fn pool_status(&self) -> PoolStatus {
        self.pool.status()
    }

    /// Submit a batch for shipment
    ///
    /// Returns immediately unless the pool is saturated, in which case the
    /// batch is shipped on the calling thread before returning.
    #[instrument(
        name = "dispatcher_submit",
        skip(self, batch),
        fields(kind = %batch.kind(), records = batch.len())
    )]
    pub fn submit(&self, batch: LogBatch) -> Submission {
        let kind = batch.kind();
        if batch.is_empty() {
            self.metrics.inc_skipped();
            debug!(kind = %kind, "Empty batch skipped");
            observability::record_submission(kind, Submission::Skipped.as_str());
            return Submission::Skipped;
        }

        self.metrics.inc_submitted();
        let sink = Arc::clone(&self.sink);
        let metrics = Arc::clone(&self.metrics);
        let submission = self
            .pool
            .execute(move || ship(sink.as_ref(), &batch, &metrics));

        if submission == Submission::CallerRan {
            self.metrics.inc_caller_runs();
            warn!(kind = %kind, "Dispatch pool saturated, batch shipped on caller thread");
        }
        observability::record_submission(kind, submission.as_str());

        let status = self.pool.status();
        observability::record_pool_status(status.live, status.idle, status.busy);

        submission
    }

    /// Wait for in-flight shipments; `true` when all finished in time
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        self.pool.wait_idle(timeout)
    }

    /// Stop the pool; later submissions ship on the caller thread
    pub fn shutdown(&self) {
        self.pool.shutdown();
        let snapshot = self.metrics.snapshot();
        info!(
            sink = %self.sink.name(),
            submitted = snapshot.submitted,
            persisted = snapshot.persisted_batches,
            failed = snapshot.failed_batches,
            caller_runs = snapshot.caller_runs,
            "Dispatcher shut down"
        );
    }
}

/// Persist one batch, containing any failure
fn ship(sink: &dyn LogSink, batch: &LogBatch, metrics: &DispatchMetrics) {
    let kind = batch.kind();
    let records = batch.len();

    let result = panic::catch_unwind(AssertUnwindSafe(|| sink.bulk_persist(batch)))
        .unwrap_or_else(|_| Err(ContractError::sink_write(sink.name(), "sink panicked")));

    match result {
        Ok(()) => {
            metrics.record_persisted(records);
            observability::record_shipment(sink.name(), kind, true, records);
            debug!(sink = %sink.name(), kind = %kind, records, "Batch persisted");
        }
        Err(e) => {
            metrics.record_failed(records);
            observability::record_shipment(sink.name(), kind, false, records);
            error!(
                sink = %sink.name(),
                kind = %kind,
                records,
                error = %e,
                "Bulk persist failed, batch discarded"
            );
        }
    }
}

/// Create a sink from configuration
#[instrument(
    name = "dispatcher_create_sink",
    skip(config),
    fields(sink = %config.name, sink_type = ?config.sink_type)
)]
pub fn create_sink(config: &SinkConfig) -> Result<Arc<dyn LogSink>, DispatcherError> {
    match config.sink_type {
        SinkType::Log => Ok(Arc::new(TracingSink::new(&config.name))),
        SinkType::File => {
            let sink = FileSink::from_params(&config.name, &config.params)
                .map_err(|e| DispatcherError::sink_creation(&config.name, e.to_string()))?;
            Ok(Arc::new(sink))
        }
        SinkType::Network => {
            let sink = NetworkSink::from_params(&config.name, &config.params)
                .map_err(|e| DispatcherError::sink_creation(&config.name, e.to_string()))?;
            Ok(Arc::new(sink))
        }
    }
}

/// Build the configured sink route
///
/// No sinks configured means a single log sink; several sinks are combined
/// into a fan-out.
pub fn create_sinks(configs: &[SinkConfig]) -> Result<Arc<dyn LogSink>, DispatcherError> {
    match configs {
        [] => Ok(Arc::new(TracingSink::new("log"))),
        [single] => create_sink(single),
        many => {
            let sinks = many
                .iter()
                .map(create_sink)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Arc::new(FanoutSink::new("fanout", sinks)))
        }
    }
}

/// Convenience function to create a dispatcher from the pipeline config
#[instrument(name = "dispatcher_create", skip(config), fields(sinks = config.sinks.len()))]
pub fn create_dispatcher(config: &TaskLogConfig) -> Result<Dispatcher, DispatcherError> {
    let sink = create_sinks(&config.sinks)?;
    info!(
        sink = %sink.name(),
        min_workers = config.pool.min_workers,
        max_workers = config.pool.max_workers,
        "Dispatcher created"
    );
    Ok(Dispatcher::new(&config.pool, sink))
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{RunnerOutcome, RunnerState};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::mpsc;
    use std::sync::Mutex;
    use std::thread::{self, ThreadId};

    /// Mock sink that records calls
    struct MockSink {
        batches: AtomicU64,
        records: AtomicU64,
        threads: Mutex<Vec<ThreadId>>,
        fail: bool,
    }

    impl MockSink {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                batches: AtomicU64::new(0),
                records: AtomicU64::new(0),
                threads: Mutex::new(Vec::new()),
                fail,
            })
        }
    }

    impl LogSink for MockSink {
        fn name(&self) -> &str {
            "mock"
        }

        fn bulk_persist(&self, batch: &LogBatch) -> Result<(), ContractError> {
            self.batches.fetch_add(1, Ordering::SeqCst);
            self.records.fetch_add(batch.len() as u64, Ordering::SeqCst);
            self.threads.lock().unwrap().push(thread::current().id());
            if self.fail {
                return Err(ContractError::sink_write("mock", "unavailable"));
            }
            Ok(())
        }
    }

    struct PanicSink;

    impl LogSink for PanicSink {
        fn name(&self) -> &str {
            "panic"
        }

        fn bulk_persist(&self, _batch: &LogBatch) -> Result<(), ContractError> {
            panic!("sink exploded")
        }
    }

    fn batch(n: usize) -> LogBatch {
        LogBatch::Runner(
            (0..n)
                .map(|_| RunnerOutcome::new("a", RunnerState::Success))
                .collect(),
        )
    }

    fn pool_config(min: usize, max: usize) -> DispatchPoolConfig {
        DispatchPoolConfig {
            min_workers: min,
            max_workers: max,
            ..Default::default()
        }
    }

    #[test]
    fn test_submit_ships_batch() {
        let sink = MockSink::new(false);
        let dispatcher = Dispatcher::new(&pool_config(1, 2), sink.clone());

        assert_eq!(dispatcher.submit(batch(3)), Submission::Spawned);
        assert!(dispatcher.wait_idle(Duration::from_secs(5)));

        assert_eq!(sink.batches.load(Ordering::SeqCst), 1);
        assert_eq!(sink.records.load(Ordering::SeqCst), 3);
        let snapshot = dispatcher.metrics().snapshot();
        assert_eq!(snapshot.submitted, 1);
        assert_eq!(snapshot.persisted_records, 3);
    }

    #[test]
    fn test_empty_batch_skipped() {
        let sink = MockSink::new(false);
        let dispatcher = Dispatcher::new(&pool_config(1, 2), sink.clone());

        assert_eq!(dispatcher.submit(batch(0)), Submission::Skipped);
        assert_eq!(sink.batches.load(Ordering::SeqCst), 0);
        assert_eq!(dispatcher.metrics().skipped(), 1);
        assert_eq!(dispatcher.pool_status().live, 0);
    }

    #[test]
    fn test_sink_failure_is_contained() {
        let sink = MockSink::new(true);
        let dispatcher = Dispatcher::new(&pool_config(1, 1), sink.clone());

        dispatcher.submit(batch(2));
        assert!(dispatcher.wait_idle(Duration::from_secs(5)));
        dispatcher.submit(batch(1));
        assert!(dispatcher.wait_idle(Duration::from_secs(5)));

        let snapshot = dispatcher.metrics().snapshot();
        assert_eq!(snapshot.failed_batches, 2);
        assert_eq!(snapshot.failed_records, 3);
        assert_eq!(snapshot.persisted_batches, 0);
        assert_eq!(snapshot.completed_batches(), 2);
    }

    #[test]
    fn test_sink_panic_counts_as_failure() {
        let dispatcher = Dispatcher::new(&pool_config(1, 1), Arc::new(PanicSink));

        dispatcher.submit(batch(1));
        assert!(dispatcher.wait_idle(Duration::from_secs(5)));

        assert_eq!(dispatcher.metrics().snapshot().failed_batches, 1);
        assert_eq!(dispatcher.pool_status().live, 1);
    }

    #[test]
    fn test_saturated_pool_ships_on_caller() {
        let sink = MockSink::new(false);
        let pool = WorkerPool::new(PoolConfig {
            min_workers: 0,
            max_workers: 1,
            idle_timeout: Duration::from_secs(20),
            thread_name_prefix: "saturated".to_string(),
        });
        // Occupy the only worker
        let (hold_tx, hold_rx) = mpsc::channel::<()>();
        pool.execute(move || {
            let _ = hold_rx.recv_timeout(Duration::from_secs(5));
        });
        let dispatcher = Dispatcher::with_pool(pool, sink.clone());

        assert_eq!(dispatcher.submit(batch(2)), Submission::CallerRan);
        // Shipped before submit returned, on this thread
        assert_eq!(sink.batches.load(Ordering::SeqCst), 1);
        assert_eq!(
            sink.threads.lock().unwrap().as_slice(),
            &[thread::current().id()]
        );
        assert_eq!(dispatcher.metrics().caller_runs(), 1);

        hold_tx.send(()).unwrap();
        assert!(dispatcher.wait_idle(Duration::from_secs(5)));
    }

    #[test]
    fn test_create_sinks_defaults_to_log() {
        let sink = create_sinks(&[]).unwrap();
        assert_eq!(sink.name(), "log");

        let sink = create_sinks(&[SinkConfig::log("only")]).unwrap();
        assert_eq!(sink.name(), "only");

        let sink = create_sinks(&[SinkConfig::log("a"), SinkConfig::log("b")]).unwrap();
        assert_eq!(sink.name(), "fanout");
    }

    #[test]
    fn test_create_sink_reports_bad_params() {
        let config = SinkConfig {
            name: "udp".to_string(),
            sink_type: SinkType::Network,
            params: HashMap::new(),
        };
        let err = create_sink(&config).err().unwrap();
        assert!(matches!(err, DispatcherError::SinkCreation { .. }));
        assert!(err.to_string().contains("udp"));
    }

    #[test]
    fn test_create_dispatcher_from_config() {
        let config = TaskLogConfig::default();
        let dispatcher = create_dispatcher(&config).unwrap();
        assert_eq!(dispatcher.sink_name(), "log");

        dispatcher.submit(batch(1));
        assert!(dispatcher.wait_idle(Duration::from_secs(5)));
        assert_eq!(dispatcher.metrics().snapshot().persisted_batches, 1);
    }
}
