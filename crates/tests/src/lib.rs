//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - 合约快照测试
//! - 配置 -> 服务 -> sink 的端到端测试
//! - 并发追加与刷新

#[cfg(test)]
mod contract_tests {
    use contracts::{LogBatch, LogKind, RunnerOutcome, RunnerState};

    #[test]
    fn test_contracts_compile() {
        // 验证 contracts crate 可编译
        let _ = contracts::ConfigVersion::V1;
    }

    #[test]
    fn test_batch_json_shape() {
        let mut outcome = RunnerOutcome::new("app.Sync", RunnerState::DataError);
        outcome.task_id = Some(42);

        let batch = LogBatch::Runner(vec![outcome]);
        assert_eq!(batch.kind(), LogKind::Runner);

        let json = serde_json::to_value(&batch).unwrap();
        assert_eq!(json["kind"], "runner");
        let record = &json["records"][0];
        assert_eq!(record["task_class"], "app.Sync");
        assert_eq!(record["state"], 5);
        assert_eq!(record["task_id"], 42);
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::collections::HashMap;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier, Mutex};
    use std::thread;
    use std::time::Duration;

    use chrono::{TimeDelta, TimeZone, Utc};
    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::{
        ContractError, CronerOutcome, CronerState, LogBatch, LogLevel, LogSink, RunnerOutcome,
        RunnerState, SinkConfig, SinkType, TaskLogConfig,
    };
    use dispatcher::Submission;
    use observability::InMemoryMetricsStore;
    use task_log::TaskLogService;

    const WAIT: Duration = Duration::from_secs(5);

    /// Sink that keeps every batch it receives
    #[derive(Default)]
    struct CollectingSink {
        batches: Mutex<Vec<LogBatch>>,
    }

    impl CollectingSink {
        fn runner_records(&self) -> Vec<RunnerOutcome> {
            self.batches
                .lock()
                .unwrap()
                .iter()
                .filter_map(|b| match b {
                    LogBatch::Runner(records) => Some(records.clone()),
                    LogBatch::Croner(_) => None,
                })
                .flatten()
                .collect()
        }

        fn croner_records(&self) -> Vec<CronerOutcome> {
            self.batches
                .lock()
                .unwrap()
                .iter()
                .filter_map(|b| match b {
                    LogBatch::Croner(records) => Some(records.clone()),
                    LogBatch::Runner(_) => None,
                })
                .flatten()
                .collect()
        }
    }

    impl LogSink for CollectingSink {
        fn name(&self) -> &str {
            "collect"
        }

        fn bulk_persist(&self, batch: &LogBatch) -> Result<(), ContractError> {
            self.batches.lock().unwrap().push(batch.clone());
            Ok(())
        }
    }

    /// Sink that always fails
    #[derive(Default)]
    struct FailingSink {
        calls: AtomicUsize,
    }

    impl LogSink for FailingSink {
        fn name(&self) -> &str {
            "failing"
        }

        fn bulk_persist(&self, _batch: &LogBatch) -> Result<(), ContractError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(ContractError::sink_write("failing", "backend unavailable"))
        }
    }

    fn runner(class: &str, state: RunnerState) -> RunnerOutcome {
        let base = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let mut outcome = RunnerOutcome::new(class, state);
        outcome.queued_at = Some(base);
        outcome.consumed_at = Some(base + TimeDelta::milliseconds(10));
        outcome.run_at = Some(base + TimeDelta::milliseconds(15));
        outcome.finished_at = Some(base + TimeDelta::milliseconds(115));
        outcome
    }

    /// End-to-end test: concurrent producers -> flush -> metrics + sink
    ///
    /// 验证完整的数据流：
    /// 1. 多线程追加 runner 结果
    /// 2. 刷新与追加并发进行
    /// 3. 每条记录恰好被计数和投递一次
    #[test]
    fn test_e2e_concurrent_producers_and_flush() {
        const PRODUCERS: usize = 4;
        const PER_PRODUCER: usize = 500;

        let sink = Arc::new(CollectingSink::default());
        let store = Arc::new(InMemoryMetricsStore::new());
        let service = Arc::new(
            TaskLogService::builder(&TaskLogConfig::default())
                .sink(sink.clone())
                .metrics_store(store.clone())
                .build()
                .unwrap(),
        );

        let barrier = Arc::new(Barrier::new(PRODUCERS + 1));
        let handles: Vec<_> = (0..PRODUCERS)
            .map(|p| {
                let service = Arc::clone(&service);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    for i in 0..PER_PRODUCER {
                        let state = if i % 10 == 0 {
                            RunnerState::PartnerError
                        } else {
                            RunnerState::Success
                        };
                        let mut outcome = runner("app.Sync", state);
                        outcome.task_id = Some((p * PER_PRODUCER + i) as u64);
                        service.record_runner_outcome(outcome);
                    }
                })
            })
            .collect();

        barrier.wait();
        let mut flushed = 0;
        while handles.iter().any(|h| !h.is_finished()) {
            if let Some(report) = service.flush_runner_logs() {
                flushed += report.records;
            }
            thread::sleep(Duration::from_millis(1));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        if let Some(report) = service.flush_runner_logs() {
            flushed += report.records;
        }
        assert!(service.wait_idle(WAIT));

        let total = PRODUCERS * PER_PRODUCER;
        assert_eq!(flushed, total);
        assert_eq!(store.get("app.Sync.numAll"), Some(total as i64));
        assert_eq!(store.get("app.Sync.numFail"), Some((total / 10) as i64));
        assert_eq!(store.get("app.Sync.numFailPartner"), Some((total / 10) as i64));
        assert_eq!(store.get("app.Sync.numFailData"), None);

        let mut ids: Vec<u64> = sink
            .runner_records()
            .iter()
            .map(|r| r.task_id.unwrap())
            .collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), total);
        assert_eq!(service.pending(), (0, 0));
    }

    #[test]
    fn test_e2e_config_to_file_sink() {
        let dir = tempfile::tempdir().unwrap();
        let content = format!(
            r#"
[pool]
min_workers = 1
max_workers = 2

[[sinks]]
name = "files"
sink_type = "file"
params = {{ base_path = "{}" }}

[categories.runner]
"app.Quiet" = "none"
"app.Loud" = "record_all"
"#,
            dir.path().display().to_string().replace('\\', "/")
        );

        let config = ConfigLoader::load_from_str(&content, ConfigFormat::Toml).unwrap();
        let store = Arc::new(InMemoryMetricsStore::new());
        let service = TaskLogService::builder(&config)
            .metrics_store(store.clone())
            .build()
            .unwrap();
        assert_eq!(service.sink_name(), "files");

        service.record_runner_outcome(runner("app.Quiet", RunnerState::Success));
        service.record_runner_outcome(runner("app.Loud", RunnerState::ProgramError));
        service.record_runner_outcome(runner("app.Unlisted", RunnerState::Success));
        service.record_runner_outcome(runner("", RunnerState::Success));

        let report = service.flush_runner_logs().unwrap();
        assert_eq!(report.records, 4);
        assert_eq!(report.selected, 3);
        assert!(service.shutdown(WAIT));

        // Filtered records still count
        assert_eq!(store.get("app.Quiet.numAll"), Some(1));
        assert_eq!(store.get("app.Loud.numFailProgram"), Some(1));

        let runner_dir = dir.path().join("runner");
        let files: Vec<_> = fs::read_dir(&runner_dir).unwrap().collect();
        assert_eq!(files.len(), 1);
        let written = fs::read_to_string(files[0].as_ref().unwrap().path()).unwrap();
        let classes: Vec<String> = written
            .lines()
            .map(|line| {
                let value: serde_json::Value = serde_json::from_str(line).unwrap();
                value["task_class"].as_str().unwrap().to_string()
            })
            .collect();
        assert_eq!(classes, vec!["app.Loud", "app.Unlisted", ""]);
    }

    #[test]
    fn test_e2e_sink_failure_does_not_reach_caller() {
        let sink = Arc::new(FailingSink::default());
        let service = TaskLogService::builder(&TaskLogConfig::default())
            .sink(sink.clone())
            .metrics_store(Arc::new(InMemoryMetricsStore::new()))
            .build()
            .unwrap();

        service.record_runner_outcome(runner("app.Sync", RunnerState::Success));
        let report = service.flush_runner_logs().unwrap();
        assert_ne!(report.submission, Submission::Skipped);
        assert!(service.wait_idle(WAIT));

        // Service keeps accepting and flushing after a failed shipment
        service.record_runner_outcome(runner("app.Sync", RunnerState::Success));
        assert!(service.flush_runner_logs().is_some());
        assert!(service.shutdown(WAIT));

        let metrics = service.dispatch_metrics();
        assert_eq!(metrics.failed_batches, 2);
        assert_eq!(metrics.persisted_batches, 0);
        assert_eq!(sink.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_e2e_fully_filtered_batch_is_not_shipped() {
        let sink = Arc::new(CollectingSink::default());
        let store = Arc::new(InMemoryMetricsStore::new());
        let levels = HashMap::from([("app.Quiet".to_string(), LogLevel::None)]);
        let service = TaskLogService::builder(&TaskLogConfig::default())
            .sink(sink.clone())
            .metrics_store(store.clone())
            .runner_levels(levels)
            .build()
            .unwrap();

        service.record_runner_outcome(runner("app.Quiet", RunnerState::Success));
        let report = service.flush_runner_logs().unwrap();
        assert_eq!(report.selected, 0);
        assert_eq!(report.submission, Submission::Skipped);
        assert!(service.shutdown(WAIT));

        assert!(sink.runner_records().is_empty());
        assert_eq!(store.get("app.Quiet.numAll"), Some(1));
    }

    #[test]
    fn test_e2e_croner_flush() {
        let sink = Arc::new(CollectingSink::default());
        let store = Arc::new(InMemoryMetricsStore::new());
        let service = TaskLogService::builder(&TaskLogConfig::default())
            .sink(sink.clone())
            .croner_metrics(store.clone())
            .runner_metrics(Arc::new(InMemoryMetricsStore::new()))
            .build()
            .unwrap();

        let base = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        for state in [CronerState::Success, CronerState::DataError] {
            let mut outcome = CronerOutcome::new("app.Nightly", state);
            outcome.scheduled_at = Some(base);
            outcome.run_at = Some(base + TimeDelta::milliseconds(5));
            outcome.finished_at = Some(base + TimeDelta::milliseconds(105));
            outcome.next_at = Some(base + TimeDelta::days(1));
            service.record_croner_outcome(outcome);
        }

        let report = service.flush_croner_logs().unwrap();
        assert_eq!(report.records, 2);
        assert_eq!(report.categories, 1);
        assert!(service.flush_croner_logs().is_none());
        assert!(service.shutdown(WAIT));

        assert_eq!(store.get("app.Nightly.numAll"), Some(2));
        assert_eq!(store.get("app.Nightly.numFailData"), Some(1));

        // Absent run target is normalized before shipping
        let shipped = sink.croner_records();
        assert_eq!(shipped.len(), 2);
        assert!(shipped.iter().all(|r| r.run_target.as_deref() == Some("")));
    }

    #[test]
    fn test_e2e_saturated_pool_runs_on_caller() {
        let mut config = TaskLogConfig::default();
        config.pool.min_workers = 1;
        config.pool.max_workers = 1;

        /// Blocks the first shipment until released
        struct GateSink {
            gate: Mutex<bool>,
            released: std::sync::Condvar,
            threads: Mutex<Vec<thread::ThreadId>>,
        }

        impl LogSink for GateSink {
            fn name(&self) -> &str {
                "gate"
            }

            fn bulk_persist(&self, _batch: &LogBatch) -> Result<(), ContractError> {
                self.threads.lock().unwrap().push(thread::current().id());
                let mut open = self.gate.lock().unwrap();
                while !*open {
                    open = self.released.wait(open).unwrap();
                }
                Ok(())
            }
        }

        let sink = Arc::new(GateSink {
            gate: Mutex::new(false),
            released: std::sync::Condvar::new(),
            threads: Mutex::new(Vec::new()),
        });
        let service = Arc::new(
            TaskLogService::builder(&config)
                .sink(sink.clone())
                .metrics_store(Arc::new(InMemoryMetricsStore::new()))
                .build()
                .unwrap(),
        );

        // First batch occupies the only worker
        service.record_runner_outcome(runner("app.A", RunnerState::Success));
        assert_eq!(
            service.flush_runner_logs().unwrap().submission,
            Submission::Spawned
        );
        while sink.threads.lock().unwrap().is_empty() {
            thread::sleep(Duration::from_millis(1));
        }

        // Second batch runs on the flushing thread and blocks it until released
        let flusher = {
            let service = Arc::clone(&service);
            thread::spawn(move || {
                service.record_runner_outcome(runner("app.B", RunnerState::Success));
                let report = service.flush_runner_logs().unwrap();
                (report.submission, thread::current().id())
            })
        };
        while sink.threads.lock().unwrap().len() < 2 {
            thread::sleep(Duration::from_millis(1));
        }
        *sink.gate.lock().unwrap() = true;
        sink.released.notify_all();

        let (submission, flusher_id) = flusher.join().unwrap();
        assert_eq!(submission, Submission::CallerRan);
        assert_eq!(sink.threads.lock().unwrap()[1], flusher_id);
        assert!(service.shutdown(WAIT));
        assert_eq!(service.dispatch_metrics().caller_runs, 1);
    }

    #[test]
    fn test_e2e_invalid_sink_config_fails_build() {
        let mut config = TaskLogConfig::default();
        config.sinks.push(SinkConfig {
            name: "udp".to_string(),
            sink_type: SinkType::Network,
            params: HashMap::from([("addr".to_string(), "not-an-address".to_string())]),
        });

        let result = TaskLogService::builder(&config)
            .metrics_store(Arc::new(InMemoryMetricsStore::new()))
            .build();
        assert!(result.is_err());
    }
}
