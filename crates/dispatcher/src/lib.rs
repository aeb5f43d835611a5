//! # Dispatcher
//!
//! 日志批次分发模块。
//!
//! 负责：
//! - 将过滤后的 `LogBatch` 提交到有界工作线程池
//! - 线程池饱和时在调用线程上直接投递 (caller-runs 背压)
//! - 隔离 sink 失败，不影响刷新线程

pub mod dispatcher;
pub mod error;
pub mod metrics;
pub mod pool;
pub mod sinks;

pub use contracts::{LogBatch, LogSink};
pub use dispatcher::{create_dispatcher, create_sink, create_sinks, Dispatcher};
pub use error::DispatcherError;
pub use metrics::{DispatchMetrics, DispatchSnapshot};
pub use pool::{PoolConfig, PoolStatus, Submission, WorkerPool};
pub use sinks::{FanoutSink, FileSink, NetworkSink, TracingSink};
