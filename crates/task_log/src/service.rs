//! TaskLogService - buffered outcome recording and periodic flush
//!
//! Producers call `record_*_outcome` from any thread. A periodic trigger
//! calls `flush_*_logs`, which swaps the buffer, aggregates counters into
//! the metrics store, filters the batch and hands it to the dispatcher.

use std::sync::Arc;
use std::time::Duration;

use contracts::{
    CronerOutcome, DispatchPoolConfig, LogBatch, LogKind, LogLevelLookup, LogSink, MetricsStore,
    RunnerOutcome, SinkConfig, TaskLogConfig,
};
use dispatcher::{create_sinks, DispatchSnapshot, Dispatcher, PoolStatus, Submission};
use tracing::{debug, info, instrument, warn};

use crate::aggregate::{aggregate_croner, aggregate_runner};
use crate::buffer::AppendBuffer;
use crate::error::PipelineError;
use crate::filter;

/// Outcome of one non-empty flush
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushReport {
    pub kind: LogKind,
    /// Records detached from the buffer
    pub records: usize,
    /// Distinct categories aggregated
    pub categories: usize,
    /// Metrics store calls made
    pub counters_written: usize,
    /// Records that passed the log filter
    pub selected: usize,
    pub submission: Submission,
}

/// Buffered task log pipeline
pub struct TaskLogService {
    runner_buffer: AppendBuffer<RunnerOutcome>,
    croner_buffer: AppendBuffer<CronerOutcome>,
    runner_metrics: Arc<dyn MetricsStore>,
    croner_metrics: Arc<dyn MetricsStore>,
    runner_levels: Arc<dyn LogLevelLookup>,
    croner_levels: Arc<dyn LogLevelLookup>,
    dispatcher: Dispatcher,
}

impl TaskLogService {
    pub fn builder(config: &TaskLogConfig) -> TaskLogServiceBuilder {
        TaskLogServiceBuilder::new(config)
    }

    /// Buffer one task execution outcome
    pub fn record_runner_outcome(&self, outcome: RunnerOutcome) {
        self.runner_buffer.append(outcome);
        observability::record_appended(LogKind::Runner);
    }

    /// Buffer one scheduled-job outcome
    ///
    /// An absent run target is stored as `""`.
    pub fn record_croner_outcome(&self, mut outcome: CronerOutcome) {
        if outcome.run_target.is_none() {
            outcome.run_target = Some(String::new());
        }
        self.croner_buffer.append(outcome);
        observability::record_appended(LogKind::Croner);
    }

    /// Flush buffered runner outcomes
    ///
    /// Returns `None` without touching the metrics store or the dispatcher
    /// when nothing was buffered.
    #[instrument(name = "task_log_flush_runner", skip(self))]
    pub fn flush_runner_logs(&self) -> Option<FlushReport> {
        let records = self.runner_buffer.flush_swap()?;
        let total = records.len();

        let aggregation = aggregate_runner(&records);
        let counters_written = aggregation.emit(self.runner_metrics.as_ref());
        let selected = filter::select(records, self.runner_levels.as_ref());

        Some(self.dispatch(
            total,
            aggregation.len(),
            counters_written,
            LogBatch::Runner(selected),
        ))
    }

    /// Flush buffered croner outcomes
    ///
    /// Same contract as [`flush_runner_logs`](Self::flush_runner_logs); the
    /// last next-scheduled time per category is published as a gauge.
    #[instrument(name = "task_log_flush_croner", skip(self))]
    pub fn flush_croner_logs(&self) -> Option<FlushReport> {
        let records = self.croner_buffer.flush_swap()?;
        let total = records.len();

        let aggregation = aggregate_croner(&records);
        let counters_written = aggregation.emit(self.croner_metrics.as_ref());
        for (category, next_run) in aggregation.next_runs() {
            observability::record_next_run(category, next_run.timestamp());
        }
        let selected = filter::select(records, self.croner_levels.as_ref());

        Some(self.dispatch(
            total,
            aggregation.len(),
            counters_written,
            LogBatch::Croner(selected),
        ))
    }

    fn dispatch(
        &self,
        records: usize,
        categories: usize,
        counters_written: usize,
        batch: LogBatch,
    ) -> FlushReport {
        let kind = batch.kind();
        let selected = batch.len();
        observability::record_flush(kind, records, categories);

        let submission = self.dispatcher.submit(batch);
        debug!(
            kind = %kind,
            records,
            categories,
            counters_written,
            selected,
            submission = submission.as_str(),
            "Flush complete"
        );

        FlushReport {
            kind,
            records,
            categories,
            counters_written,
            selected,
            submission,
        }
    }

    /// Records waiting for the next flush, as `(runner, croner)`
    pub fn pending(&self) -> (usize, usize) {
        (self.runner_buffer.len(), self.croner_buffer.len())
    }

    pub fn sink_name(&self) -> &str {
        self.dispatcher.sink_name()
    }

    pub fn dispatch_metrics(&self) -> DispatchSnapshot {
        self.dispatcher.metrics().snapshot()
    }

    pub fn pool_status(&self) -> PoolStatus {
        self.dispatcher.pool_status()
    }

    /// Wait for in-flight shipments without shutting down
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        self.dispatcher.wait_idle(timeout)
    }

    /// Flush both buffers, drain the pool and stop it
    ///
    /// Returns `true` when every shipment finished within `timeout`.
    #[instrument(name = "task_log_shutdown", skip(self))]
    pub fn shutdown(&self, timeout: Duration) -> bool {
        let runner = self.flush_runner_logs();
        let croner = self.flush_croner_logs();

        let drained = self.dispatcher.wait_idle(timeout);
        if !drained {
            warn!(timeout_ms = timeout.as_millis() as u64, "Shipments still running at shutdown");
        }
        self.dispatcher.shutdown();

        info!(
            runner_records = runner.map_or(0, |r| r.records),
            croner_records = croner.map_or(0, |r| r.records),
            drained,
            "Task log service stopped"
        );
        drained
    }
}

/// Builder for [`TaskLogService`]
///
/// Log levels default to the configured category maps and the sink to the
/// configured sink route. Metrics stores have no default.
pub struct TaskLogServiceBuilder {
    pool: DispatchPoolConfig,
    sinks: Vec<SinkConfig>,
    sink: Option<Arc<dyn LogSink>>,
    runner_metrics: Option<Arc<dyn MetricsStore>>,
    croner_metrics: Option<Arc<dyn MetricsStore>>,
    runner_levels: Arc<dyn LogLevelLookup>,
    croner_levels: Arc<dyn LogLevelLookup>,
}

impl TaskLogServiceBuilder {
    pub fn new(config: &TaskLogConfig) -> Self {
        Self {
            pool: config.pool.clone(),
            sinks: config.sinks.clone(),
            sink: None,
            runner_metrics: None,
            croner_metrics: None,
            runner_levels: Arc::new(config.categories.runner.clone()),
            croner_levels: Arc::new(config.categories.croner.clone()),
        }
    }

    /// Use this sink instead of the configured ones
    pub fn sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Use one store for both record kinds
    pub fn metrics_store(mut self, store: Arc<dyn MetricsStore>) -> Self {
        self.runner_metrics = Some(Arc::clone(&store));
        self.croner_metrics = Some(store);
        self
    }

    pub fn runner_metrics(mut self, store: Arc<dyn MetricsStore>) -> Self {
        self.runner_metrics = Some(store);
        self
    }

    pub fn croner_metrics(mut self, store: Arc<dyn MetricsStore>) -> Self {
        self.croner_metrics = Some(store);
        self
    }

    pub fn runner_levels(mut self, lookup: impl LogLevelLookup + 'static) -> Self {
        self.runner_levels = Arc::new(lookup);
        self
    }

    pub fn croner_levels(mut self, lookup: impl LogLevelLookup + 'static) -> Self {
        self.croner_levels = Arc::new(lookup);
        self
    }

    #[instrument(name = "task_log_service_build", skip(self))]
    pub fn build(self) -> Result<TaskLogService, PipelineError> {
        let runner_metrics = self
            .runner_metrics
            .ok_or(PipelineError::MissingCollaborator("runner metrics store"))?;
        let croner_metrics = self
            .croner_metrics
            .ok_or(PipelineError::MissingCollaborator("croner metrics store"))?;

        let sink = match self.sink {
            Some(sink) => sink,
            None => create_sinks(&self.sinks)?,
        };
        let dispatcher = Dispatcher::new(&self.pool, sink);

        info!(
            sink = %dispatcher.sink_name(),
            min_workers = self.pool.min_workers,
            max_workers = self.pool.max_workers,
            "Task log service ready"
        );

        Ok(TaskLogService {
            runner_buffer: AppendBuffer::new(),
            croner_buffer: AppendBuffer::new(),
            runner_metrics,
            croner_metrics,
            runner_levels: self.runner_levels,
            croner_levels: self.croner_levels,
            dispatcher,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use contracts::{ContractError, CronerState, LogLevel, RunnerState};
    use observability::InMemoryMetricsStore;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Sink that keeps every batch it receives
    #[derive(Default)]
    struct CollectingSink {
        batches: Mutex<Vec<LogBatch>>,
    }

    impl CollectingSink {
        fn batches(&self) -> Vec<LogBatch> {
            self.batches.lock().unwrap().clone()
        }
    }

    impl LogSink for CollectingSink {
        fn name(&self) -> &str {
            "collecting"
        }

        fn bulk_persist(&self, batch: &LogBatch) -> Result<(), ContractError> {
            self.batches.lock().unwrap().push(batch.clone());
            Ok(())
        }
    }

    fn service(
        sink: Arc<CollectingSink>,
        store: Arc<InMemoryMetricsStore>,
    ) -> TaskLogService {
        TaskLogService::builder(&TaskLogConfig::default())
            .sink(sink)
            .metrics_store(store)
            .build()
            .unwrap()
    }

    fn at(millis: i64) -> Option<chrono::DateTime<Utc>> {
        Some(Utc.timestamp_millis_opt(1_700_000_000_000 + millis).unwrap())
    }

    #[test]
    fn test_missing_metrics_store_rejected() {
        let result = TaskLogService::builder(&TaskLogConfig::default()).build();
        assert!(matches!(
            result.err(),
            Some(PipelineError::MissingCollaborator(_))
        ));

        let store: Arc<dyn MetricsStore> = Arc::new(InMemoryMetricsStore::new());
        let result = TaskLogService::builder(&TaskLogConfig::default())
            .runner_metrics(store)
            .build();
        assert!(matches!(
            result.err(),
            Some(PipelineError::MissingCollaborator("croner metrics store"))
        ));
    }

    #[test]
    fn test_empty_flush_is_noop() {
        let sink = Arc::new(CollectingSink::default());
        let store = Arc::new(InMemoryMetricsStore::new());
        let service = service(sink.clone(), store.clone());

        assert!(service.flush_runner_logs().is_none());
        assert!(service.flush_croner_logs().is_none());
        assert_eq!(store.call_count(), 0);
        assert_eq!(service.dispatch_metrics().submitted, 0);
        assert!(sink.batches().is_empty());
    }

    #[test]
    fn test_runner_flush_end_to_end() {
        let sink = Arc::new(CollectingSink::default());
        let store = Arc::new(InMemoryMetricsStore::new());
        let service = service(sink.clone(), store.clone());

        for (state, finished) in [(RunnerState::Success, 100), (RunnerState::ProgramError, 50)] {
            let mut outcome = RunnerOutcome::new("A", state);
            outcome.queued_at = at(0);
            outcome.finished_at = at(finished);
            service.record_runner_outcome(outcome);
        }
        assert_eq!(service.pending(), (2, 0));

        let report = service.flush_runner_logs().unwrap();
        assert_eq!(report.kind, LogKind::Runner);
        assert_eq!(report.records, 2);
        assert_eq!(report.categories, 1);
        assert_eq!(report.counters_written, 4);
        assert_eq!(report.selected, 2);
        assert_eq!(service.pending(), (0, 0));

        assert!(service.wait_idle(Duration::from_secs(5)));
        assert_eq!(store.get("A.numAll"), Some(2));
        assert_eq!(store.get("A.numFail"), Some(1));
        assert_eq!(store.get("A.numFailProgram"), Some(1));
        assert_eq!(store.get("A.timeAll"), Some(150));
        assert_eq!(store.get("A.numFailConfig"), None);

        let batches = sink.batches();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 2);
    }

    #[test]
    fn test_croner_target_normalized() {
        let sink = Arc::new(CollectingSink::default());
        let store = Arc::new(InMemoryMetricsStore::new());
        let service = service(sink.clone(), store.clone());

        service.record_croner_outcome(CronerOutcome::new("nightly", CronerState::Success));
        service.flush_croner_logs().unwrap();
        assert!(service.wait_idle(Duration::from_secs(5)));

        match &sink.batches()[0] {
            LogBatch::Croner(records) => {
                assert_eq!(records[0].run_target.as_deref(), Some(""));
            }
            other => panic!("unexpected batch {other:?}"),
        }
        assert_eq!(store.get("nightly.numAll"), Some(1));
    }

    #[test]
    fn test_filtered_out_records_still_counted() {
        let sink = Arc::new(CollectingSink::default());
        let store = Arc::new(InMemoryMetricsStore::new());
        let levels: HashMap<String, LogLevel> =
            [("quiet".to_string(), LogLevel::None)].into_iter().collect();
        let service = TaskLogService::builder(&TaskLogConfig::default())
            .sink(sink.clone())
            .metrics_store(store.clone())
            .runner_levels(levels)
            .build()
            .unwrap();

        service.record_runner_outcome(RunnerOutcome::new("quiet", RunnerState::DataError));
        let report = service.flush_runner_logs().unwrap();

        assert_eq!(report.selected, 0);
        assert_eq!(report.submission, Submission::Skipped);
        assert_eq!(store.get("quiet.numFailData"), Some(1));
        assert!(sink.batches().is_empty());
    }

    #[test]
    fn test_configured_levels_used_by_default() {
        let mut config = TaskLogConfig::default();
        config
            .categories
            .croner
            .insert("muted".to_string(), LogLevel::None);
        let sink = Arc::new(CollectingSink::default());
        let service = TaskLogService::builder(&config)
            .sink(sink.clone())
            .metrics_store(Arc::new(InMemoryMetricsStore::new()))
            .build()
            .unwrap();

        service.record_croner_outcome(CronerOutcome::new("muted", CronerState::Success));
        service.record_croner_outcome(CronerOutcome::new("loud", CronerState::Success));
        let report = service.flush_croner_logs().unwrap();

        assert_eq!(report.records, 2);
        assert_eq!(report.selected, 1);
    }

    #[test]
    fn test_separate_stores_per_kind() {
        let runner_store = Arc::new(InMemoryMetricsStore::new());
        let croner_store = Arc::new(InMemoryMetricsStore::new());
        let service = TaskLogService::builder(&TaskLogConfig::default())
            .sink(Arc::new(CollectingSink::default()))
            .runner_metrics(runner_store.clone())
            .croner_metrics(croner_store.clone())
            .build()
            .unwrap();

        service.record_runner_outcome(RunnerOutcome::new("r", RunnerState::Success));
        service.record_croner_outcome(CronerOutcome::new("c", CronerState::Success));
        service.flush_runner_logs();
        service.flush_croner_logs();

        assert_eq!(runner_store.get("r.numAll"), Some(1));
        assert_eq!(runner_store.get("c.numAll"), None);
        assert_eq!(croner_store.get("c.numAll"), Some(1));
    }

    #[test]
    fn test_shutdown_flushes_pending() {
        let sink = Arc::new(CollectingSink::default());
        let store = Arc::new(InMemoryMetricsStore::new());
        let service = service(sink.clone(), store.clone());

        service.record_runner_outcome(RunnerOutcome::new("r", RunnerState::Success));
        service.record_croner_outcome(CronerOutcome::new("c", CronerState::Success));

        assert!(service.shutdown(Duration::from_secs(5)));
        assert_eq!(sink.batches().len(), 2);
        assert_eq!(service.pending(), (0, 0));
        assert_eq!(service.dispatch_metrics().persisted_records, 2);
    }
}
