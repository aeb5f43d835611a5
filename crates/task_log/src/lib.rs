//! # Task Log
//!
//! 任务执行日志缓冲管道。
//!
//! 负责：
//! - 多线程追加 runner / croner 执行结果
//! - 定期刷新：交换缓冲区、按分类聚合计数器写入指标存储
//! - 按分类日志级别过滤 (缺省记录)
//! - 通过有界线程池异步投递到日志 sink
//!
//! ## 使用示例
//!
//! ```ignore
//! use std::sync::Arc;
//! use task_log::{TaskLogConfig, TaskLogService};
//! use observability::PrometheusMetricsStore;
//!
//! let service = TaskLogService::builder(&TaskLogConfig::default())
//!     .runner_metrics(Arc::new(PrometheusMetricsStore::new("task_runner")))
//!     .croner_metrics(Arc::new(PrometheusMetricsStore::new("task_croner")))
//!     .build()?;
//!
//! service.record_runner_outcome(outcome);
//!
//! // Periodic trigger
//! service.flush_runner_logs();
//! service.flush_croner_logs();
//! ```

pub mod aggregate;
pub mod buffer;
pub mod error;
pub mod filter;
mod service;

pub use aggregate::{
    aggregate_croner, aggregate_runner, AccumulatorSpec, Aggregation, CategoryMetrics,
    GroupedAccumulator, Phase, CRONER_SPEC, RUNNER_SPEC,
};
pub use buffer::AppendBuffer;
pub use error::PipelineError;
pub use filter::{select, should_log};
pub use service::{FlushReport, TaskLogService, TaskLogServiceBuilder};

// Re-export contracts types
pub use contracts::{
    CronerOutcome, CronerState, LogBatch, LogKind, LogLevel, RunnerOutcome, RunnerState,
    TaskLogConfig,
};
pub use dispatcher::Submission;
