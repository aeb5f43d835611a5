//! Pipeline orchestrator - drives the task log service with a synthetic workload.
//!
//! Producer threads append outcomes continuously while a tokio interval
//! triggers flushes on the blocking pool, mirroring how a host process
//! would schedule the periodic flush.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use contracts::{MetricsStore, TaskLogConfig};
use observability::{InMemoryMetricsStore, PrometheusMetricsStore};
use task_log::{FlushReport, TaskLogService};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::{PipelineStats, SyntheticWorkload};

/// Time allowed for in-flight shipments at shutdown
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// One croner outcome per this many runner outcomes
const CRONER_EVERY: u64 = 20;

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Loaded task log configuration
    pub config: TaskLogConfig,

    /// Run time (None = until shutdown signal)
    pub duration: Option<Duration>,

    /// Number of producer threads
    pub producers: usize,

    /// Outcomes per second per producer
    pub rate: u64,

    /// Share of failing outcomes
    pub failure_rate: f64,

    /// Metrics server port (None = disabled)
    pub metrics_port: Option<u16>,
}

/// Main pipeline orchestrator
pub struct Pipeline {
    config: PipelineConfig,
}

/// Fans counter writes out to several stores
struct TeeStore {
    stores: Vec<Arc<dyn MetricsStore>>,
}

impl MetricsStore for TeeStore {
    fn add_counter(&self, name: &str, delta: i64) {
        for store in &self.stores {
            store.add_counter(name, delta);
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct ProducerTally {
    runner: u64,
    croner: u64,
}

impl Pipeline {
    /// Create a new pipeline with the given configuration
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Run until the configured duration elapses or `shutdown` resolves
    ///
    /// Either way the producers are stopped, the buffers flushed and the
    /// dispatcher drained before the statistics are returned.
    pub async fn run<S>(self, shutdown: S) -> Result<PipelineStats>
    where
        S: Future<Output = ()>,
    {
        let start_time = Instant::now();
        let PipelineConfig {
            config,
            duration,
            producers,
            rate,
            failure_rate,
            metrics_port,
        } = self.config;

        if producers == 0 || rate == 0 {
            anyhow::bail!("producers and rate must both be >= 1");
        }

        // Initialize Metrics (optional)
        if let Some(port) = metrics_port {
            observability::init_metrics_only(port)?;
            info!("Metrics endpoint available on port {}", port);
        }

        let runner_counters = Arc::new(InMemoryMetricsStore::new());
        let croner_counters = Arc::new(InMemoryMetricsStore::new());
        let service = TaskLogService::builder(&config)
            .runner_metrics(counter_store(&runner_counters, "task_runner", metrics_port))
            .croner_metrics(counter_store(&croner_counters, "task_croner", metrics_port))
            .build()
            .context("Failed to build task log service")?;
        let service = Arc::new(service);

        let workload = SyntheticWorkload::new(failure_rate);
        info!(
            sink = service.sink_name(),
            producers,
            rate,
            failure_rate = workload.failure_rate(),
            flush_interval_ms = config.flush.interval_ms,
            "Synthetic workload starting"
        );

        let stop = Arc::new(AtomicBool::new(false));
        let handles = spawn_producers(&service, &stop, workload, producers, rate)?;

        let mut stats = PipelineStats {
            sink_name: service.sink_name().to_string(),
            ..Default::default()
        };

        let mut ticker = tokio::time::interval(config.flush.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        let deadline = async move {
            match duration {
                Some(d) => tokio::time::sleep(d).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(deadline);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    for report in flush_both(&service).await?.iter().flatten() {
                        stats.record(report);
                    }
                    let (runner, croner) = service.pending();
                    debug!(runner_pending = runner, croner_pending = croner, "Flush tick");
                }
                _ = &mut deadline => {
                    info!("Run duration reached");
                    break;
                }
                _ = &mut shutdown => {
                    warn!("Received shutdown signal, stopping pipeline...");
                    stats.interrupted = true;
                    break;
                }
            }
        }

        // Stop producers before the final flush so nothing is left behind
        stop.store(true, Ordering::Release);
        let tally = tokio::task::spawn_blocking(move || join_producers(handles))
            .await
            .context("Producer join task failed")??;
        stats.runner_produced = tally.runner;
        stats.croner_produced = tally.croner;

        for report in flush_both(&service).await?.iter().flatten() {
            stats.record(report);
        }

        let svc = Arc::clone(&service);
        stats.drained = tokio::task::spawn_blocking(move || svc.shutdown(SHUTDOWN_TIMEOUT))
            .await
            .context("Shutdown task failed")?;

        stats.dispatch = service.dispatch_metrics();
        stats.counters = prefixed("runner", &runner_counters)
            .chain(prefixed("croner", &croner_counters))
            .collect();
        stats.duration = start_time.elapsed();

        Ok(stats)
    }
}

/// In-memory counters for the summary, teed to Prometheus when enabled
fn counter_store(
    memory: &Arc<InMemoryMetricsStore>,
    namespace: &str,
    metrics_port: Option<u16>,
) -> Arc<dyn MetricsStore> {
    match metrics_port {
        Some(_) => Arc::new(TeeStore {
            stores: vec![
                Arc::clone(memory) as Arc<dyn MetricsStore>,
                Arc::new(PrometheusMetricsStore::new(namespace)),
            ],
        }),
        None => Arc::clone(memory) as Arc<dyn MetricsStore>,
    }
}

fn prefixed<'a>(
    kind: &'a str,
    store: &InMemoryMetricsStore,
) -> impl Iterator<Item = (String, i64)> + 'a {
    store
        .snapshot()
        .into_iter()
        .map(move |(name, value)| (format!("{kind}.{name}"), value))
}

/// Flush both buffers on the blocking pool
async fn flush_both(service: &Arc<TaskLogService>) -> Result<[Option<FlushReport>; 2]> {
    let service = Arc::clone(service);
    tokio::task::spawn_blocking(move || [service.flush_runner_logs(), service.flush_croner_logs()])
        .await
        .context("Flush task failed")
}

fn spawn_producers(
    service: &Arc<TaskLogService>,
    stop: &Arc<AtomicBool>,
    workload: SyntheticWorkload,
    producers: usize,
    rate: u64,
) -> Result<Vec<JoinHandle<ProducerTally>>> {
    let pause = Duration::from_secs_f64(1.0 / rate as f64);

    (0..producers)
        .map(|i| {
            let service = Arc::clone(service);
            let stop = Arc::clone(stop);
            std::thread::Builder::new()
                .name(format!("producer-{i}"))
                .spawn(move || produce(&service, &stop, workload, i as u64, pause))
                .with_context(|| format!("Failed to spawn producer thread {i}"))
        })
        .collect()
}

fn produce(
    service: &TaskLogService,
    stop: &AtomicBool,
    workload: SyntheticWorkload,
    producer_id: u64,
    pause: Duration,
) -> ProducerTally {
    let mut rng = rand::rng();
    let mut tally = ProducerTally::default();

    while !stop.load(Ordering::Acquire) {
        let task_id = (producer_id << 48) | tally.runner;
        service.record_runner_outcome(workload.runner_outcome(&mut rng, task_id));
        tally.runner += 1;

        if tally.runner % CRONER_EVERY == 0 {
            service.record_croner_outcome(workload.croner_outcome(&mut rng));
            tally.croner += 1;
        }

        std::thread::sleep(pause);
    }

    tally
}

fn join_producers(handles: Vec<JoinHandle<ProducerTally>>) -> Result<ProducerTally> {
    let mut total = ProducerTally::default();
    for handle in handles {
        let tally = handle
            .join()
            .map_err(|_| anyhow!("producer thread panicked"))?;
        total.runner += tally.runner;
        total.croner += tally.croner;
    }
    Ok(total)
}
