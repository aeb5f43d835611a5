//! TaskLogConfig - Config Loader 输出
//!
//! 描述完整的管道配置：分发线程池、刷新周期、输出路由、分类日志级别。

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::LogLevel;

/// 配置版本
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// 完整的管道配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskLogConfig {
    /// 配置版本
    #[serde(default)]
    pub version: ConfigVersion,

    /// 分发线程池配置
    #[serde(default)]
    pub pool: DispatchPoolConfig,

    /// 刷新配置
    #[serde(default)]
    pub flush: FlushConfig,

    /// 输出路由配置 (为空时使用日志输出)
    #[serde(default)]
    pub sinks: Vec<SinkConfig>,

    /// 分类日志级别
    #[serde(default)]
    pub categories: CategoryLogConfig,
}

/// 分发线程池配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchPoolConfig {
    /// 常驻线程数
    #[serde(default = "default_min_workers")]
    pub min_workers: usize,

    /// 最大线程数
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// 空闲线程回收时间 (秒)
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    /// 线程名前缀
    #[serde(default = "default_thread_name_prefix")]
    pub thread_name_prefix: String,
}

fn default_min_workers() -> usize {
    1
}

fn default_max_workers() -> usize {
    8
}

fn default_idle_timeout_secs() -> u64 {
    20
}

fn default_thread_name_prefix() -> String {
    "task-log".to_string()
}

impl Default for DispatchPoolConfig {
    fn default() -> Self {
        Self {
            min_workers: default_min_workers(),
            max_workers: default_max_workers(),
            idle_timeout_secs: default_idle_timeout_secs(),
            thread_name_prefix: default_thread_name_prefix(),
        }
    }
}

impl DispatchPoolConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

/// 刷新配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlushConfig {
    /// 刷新周期 (毫秒)
    #[serde(default = "default_flush_interval_ms")]
    pub interval_ms: u64,
}

fn default_flush_interval_ms() -> u64 {
    1000
}

impl Default for FlushConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_flush_interval_ms(),
        }
    }
}

impl FlushConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Sink 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Sink 名称
    pub name: String,

    /// Sink 类型
    pub sink_type: SinkType,

    /// 类型特定参数
    #[serde(default)]
    pub params: HashMap<String, String>,
}

impl SinkConfig {
    /// 默认的日志输出
    pub fn log(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sink_type: SinkType::Log,
            params: HashMap::new(),
        }
    }
}

/// Sink 类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkType {
    /// 日志输出
    Log,
    /// 文件输出 (JSON Lines)
    File,
    /// 网络输出 (UDP)
    Network,
}

/// 分类日志级别 (task_class -> level)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CategoryLogConfig {
    #[serde(default)]
    pub runner: HashMap<String, LogLevel>,

    #[serde(default)]
    pub croner: HashMap<String, LogLevel>,
}
