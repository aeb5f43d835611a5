//! Collaborator traits consumed by the pipeline
//!
//! The metrics counter store and the per-category log-level lookup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Per-category log level
///
/// Ordered: a category is shipped to the log sink only when its level is
/// above [`LogLevel::None`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    /// Never ship records of this category
    None,
    /// Ship the record itself
    Record,
    /// Ship the record with its task parameters
    RecordWithParam,
    /// Ship the record with its task result
    RecordWithResult,
    /// Ship everything
    RecordAll,
}

/// Metrics counter store
///
/// Fire-and-forget: implementations swallow their own failures.
pub trait MetricsStore: Send + Sync {
    /// Add `delta` to the counter called `name`
    fn add_counter(&self, name: &str, delta: i64);
}

impl<T: MetricsStore + ?Sized> MetricsStore for Arc<T> {
    fn add_counter(&self, name: &str, delta: i64) {
        (**self).add_counter(name, delta)
    }
}

/// Per-category log-level lookup
pub trait LogLevelLookup: Send + Sync {
    /// Configured level for `task_class`, if any
    fn log_level(&self, task_class: &str) -> Option<LogLevel>;
}

impl LogLevelLookup for HashMap<String, LogLevel> {
    fn log_level(&self, task_class: &str) -> Option<LogLevel> {
        self.get(task_class).copied()
    }
}

impl<T: LogLevelLookup + ?Sized> LogLevelLookup for Arc<T> {
    fn log_level(&self, task_class: &str) -> Option<LogLevel> {
        (**self).log_level(task_class)
    }
}
