//! 配置校验模块
//!
//! 校验规则：
//! - max_workers >= 1 且 min_workers <= max_workers
//! - 0 < idle_timeout_secs <= 86400
//! - flush.interval_ms > 0
//! - sink 名称非空且唯一
//! - network sink 的 addr / format 合法

use std::collections::HashSet;
use std::net::SocketAddr;

use contracts::{ContractError, SinkConfig, SinkType, TaskLogConfig};

/// 空闲线程回收时间上限 (一天)
const MAX_IDLE_TIMEOUT_SECS: u64 = 86_400;

/// 校验 TaskLogConfig 配置
///
/// 返回第一个遇到的错误，或 Ok(())。
pub fn validate(config: &TaskLogConfig) -> Result<(), ContractError> {
    validate_pool(config)?;
    validate_flush(config)?;
    validate_sinks(config)?;
    Ok(())
}

/// 校验线程池配置
fn validate_pool(config: &TaskLogConfig) -> Result<(), ContractError> {
    let pool = &config.pool;

    if pool.max_workers == 0 {
        return Err(ContractError::config_validation(
            "pool.max_workers",
            "max_workers must be >= 1",
        ));
    }

    if pool.min_workers > pool.max_workers {
        return Err(ContractError::config_validation(
            "pool.min_workers / pool.max_workers",
            format!(
                "min_workers ({}) must be <= max_workers ({})",
                pool.min_workers, pool.max_workers
            ),
        ));
    }

    if pool.idle_timeout_secs == 0 {
        return Err(ContractError::config_validation(
            "pool.idle_timeout_secs",
            "idle_timeout_secs must be > 0",
        ));
    }

    if pool.idle_timeout_secs > MAX_IDLE_TIMEOUT_SECS {
        return Err(ContractError::config_validation(
            "pool.idle_timeout_secs",
            format!(
                "idle_timeout_secs ({}) must be <= {}",
                pool.idle_timeout_secs, MAX_IDLE_TIMEOUT_SECS
            ),
        ));
    }

    Ok(())
}

/// 校验刷新周期
fn validate_flush(config: &TaskLogConfig) -> Result<(), ContractError> {
    if config.flush.interval_ms == 0 {
        return Err(ContractError::config_validation(
            "flush.interval_ms",
            "interval_ms must be > 0",
        ));
    }
    Ok(())
}

/// 校验 sink 配置
fn validate_sinks(config: &TaskLogConfig) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for (idx, sink) in config.sinks.iter().enumerate() {
        if sink.name.is_empty() {
            return Err(ContractError::config_validation(
                format!("sinks[{}].name", idx),
                "sink name cannot be empty",
            ));
        }
        if !seen.insert(sink.name.as_str()) {
            return Err(ContractError::config_validation(
                format!("sinks[name={}]", sink.name),
                "duplicate sink name",
            ));
        }
        if sink.sink_type == SinkType::Network {
            validate_network_sink(idx, sink)?;
        }
    }
    Ok(())
}

fn validate_network_sink(idx: usize, sink: &SinkConfig) -> Result<(), ContractError> {
    let addr = sink.params.get("addr").ok_or_else(|| {
        ContractError::config_validation(
            format!("sinks[{}].params.addr", idx),
            "network sink requires 'addr'",
        )
    })?;

    if addr.parse::<SocketAddr>().is_err() {
        return Err(ContractError::config_validation(
            format!("sinks[{}].params.addr", idx),
            format!("invalid socket address '{}'", addr),
        ));
    }

    match sink.params.get("format").map(String::as_str) {
        None | Some("json") | Some("bincode") => Ok(()),
        Some(other) => Err(ContractError::config_validation(
            format!("sinks[{}].params.format", idx),
            format!("unknown format '{}', expected json or bincode", other),
        )),
    }
}
