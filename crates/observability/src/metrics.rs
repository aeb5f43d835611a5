//! 任务日志管道指标模块
//!
//! - 管道自身运行指标 (追加、刷新、分发、投递)
//! - `MetricsStore` 实现：Prometheus (metrics facade) 与内存版本
//! - 刷新批次统计聚合

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, PoisonError};

use contracts::{LogKind, MetricsStore};
use metrics::{counter, gauge, histogram};
use tracing::warn;

/// 记录一条日志被追加到缓冲区
pub fn record_appended(kind: LogKind) {
    counter!("task_log_records_appended_total", "kind" => kind.as_str()).increment(1);
}

/// 记录一次刷新
///
/// 每次刷新得到非空批次时调用。
pub fn record_flush(kind: LogKind, records: usize, categories: usize) {
    counter!("task_log_flushes_total", "kind" => kind.as_str()).increment(1);
    counter!("task_log_records_flushed_total", "kind" => kind.as_str())
        .increment(records as u64);
    histogram!("task_log_flush_batch_size", "kind" => kind.as_str()).record(records as f64);
    gauge!("task_log_flush_categories", "kind" => kind.as_str()).set(categories as f64);
}

/// 记录批次提交方式 (handed_off / spawned / caller_ran / skipped)
pub fn record_submission(kind: LogKind, mode: &'static str) {
    counter!(
        "task_log_submissions_total",
        "kind" => kind.as_str(),
        "mode" => mode
    )
    .increment(1);
}

/// 记录批次投递结果
pub fn record_shipment(sink_name: &str, kind: LogKind, success: bool, records: usize) {
    let status = if success { "success" } else { "failure" };
    counter!(
        "task_log_batches_shipped_total",
        "sink" => sink_name.to_string(),
        "kind" => kind.as_str(),
        "status" => status
    )
    .increment(1);
    counter!(
        "task_log_records_shipped_total",
        "sink" => sink_name.to_string(),
        "kind" => kind.as_str(),
        "status" => status
    )
    .increment(records as u64);
}

/// 记录分发线程池状态
pub fn record_pool_status(live: usize, idle: usize, busy: usize) {
    gauge!("task_log_pool_workers_live").set(live as f64);
    gauge!("task_log_pool_workers_idle").set(idle as f64);
    gauge!("task_log_pool_jobs_busy").set(busy as f64);
}

/// 记录定时任务下次执行时间 (Unix 秒)
pub fn record_next_run(category: &str, next_run_unix_secs: i64) {
    gauge!("task_croner_next_run_timestamp_seconds", "category" => category.to_string())
        .set(next_run_unix_secs as f64);
}

/// 基于 metrics facade 的计数器存储
///
/// 计数器名 `"{category}.{field}"` 映射为 `{namespace}_{field}`，
/// 分类作为 `category` 标签。
///
/// `time*` 耗时累计可能因时钟偏差为负，使用 gauge 保留有符号累加值；
/// 其余字段为单调 counter。
#[derive(Debug, Clone)]
pub struct PrometheusMetricsStore {
    namespace: String,
}

impl PrometheusMetricsStore {
    /// 创建存储，`namespace` 如 `task_runner` / `task_croner`
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    /// 将计数器名拆分为 (分类, 指标名)
    fn metric_name(&self, name: &str) -> (String, String) {
        let (category, field) = name.rsplit_once('.').unwrap_or(("", name));
        (
            category.to_string(),
            format!("{}_{}", self.namespace, to_snake_case(field)),
        )
    }
}

impl MetricsStore for PrometheusMetricsStore {
    fn add_counter(&self, name: &str, delta: i64) {
        let (category, metric) = self.metric_name(name);
        if is_signed_sum(name) {
            gauge!(metric, "category" => category).increment(delta as f64);
            return;
        }
        // Prometheus counters are monotonic
        if delta < 0 {
            warn!(counter = %name, delta, "Negative counter delta skipped");
            return;
        }
        counter!(metric, "category" => category).increment(delta as u64);
    }
}

/// Duration sums (`timeAll`, `timeRun`, ...) may go negative under clock skew
fn is_signed_sum(name: &str) -> bool {
    let field = name.rsplit_once('.').map_or(name, |(_, field)| field);
    field.starts_with("time")
}

fn to_snake_case(field: &str) -> String {
    let mut out = String::with_capacity(field.len() + 4);
    for (i, ch) in field.chars().enumerate() {
        if ch.is_ascii_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

/// 内存计数器存储
///
/// 累加所有写入，便于测试与运行摘要。
#[derive(Debug, Default)]
pub struct InMemoryMetricsStore {
    counters: Mutex<BTreeMap<String, i64>>,
    calls: Mutex<u64>,
}

impl InMemoryMetricsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 读取单个计数器
    pub fn get(&self, name: &str) -> Option<i64> {
        self.counters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .copied()
    }

    /// 所有计数器快照
    pub fn snapshot(&self) -> BTreeMap<String, i64> {
        self.counters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// `add_counter` 调用次数
    pub fn call_count(&self) -> u64 {
        *self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl MetricsStore for InMemoryMetricsStore {
    fn add_counter(&self, name: &str, delta: i64) {
        *self
            .counters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(name.to_string())
            .or_insert(0) += delta;
        *self.calls.lock().unwrap_or_else(PoisonError::into_inner) += 1;
    }
}

/// 刷新统计聚合器
///
/// 在内存中聚合每种日志的刷新批次，便于输出摘要。
#[derive(Debug, Clone, Default)]
pub struct FlushStatsAggregator {
    kinds: HashMap<LogKind, KindStats>,
}

#[derive(Debug, Clone, Default)]
struct KindStats {
    flushes: u64,
    records: u64,
    shipped: u64,
    batch_sizes: RunningStats,
}

impl FlushStatsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// 更新聚合统计
    pub fn update(&mut self, kind: LogKind, records: usize, shipped: usize) {
        let stats = self.kinds.entry(kind).or_default();
        stats.flushes += 1;
        stats.records += records as u64;
        stats.shipped += shipped as u64;
        stats.batch_sizes.push(records as f64);
    }

    /// 生成摘要报告
    pub fn summary(&self, kind: LogKind) -> FlushSummary {
        let stats = self.kinds.get(&kind).cloned().unwrap_or_default();
        FlushSummary {
            kind,
            flushes: stats.flushes,
            records: stats.records,
            shipped: stats.shipped,
            batch_size: StatsSummary::from(&stats.batch_sizes),
        }
    }
}

/// 单种日志的刷新摘要
#[derive(Debug, Clone)]
pub struct FlushSummary {
    pub kind: LogKind,
    pub flushes: u64,
    pub records: u64,
    pub shipped: u64,
    pub batch_size: StatsSummary,
}

impl std::fmt::Display for FlushSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== {} flush summary ===", self.kind)?;
        writeln!(f, "Flushes: {}", self.flushes)?;
        writeln!(f, "Records flushed: {}", self.records)?;
        writeln!(f, "Records shipped: {}", self.shipped)?;
        writeln!(f, "Batch size: {}", self.batch_size)
    }
}

/// 统计摘要
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.1}, max={:.1}, mean={:.1}, std={:.1} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// 在线统计计算器 (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    /// 添加新值
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
            return;
        }

        self.min = self.min.min(value);
        self.max = self.max.max(value);

        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// 样本方差
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }
}
