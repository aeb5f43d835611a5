//! Fail-open log filter
//!
//! A record is shipped unless its category is explicitly configured off.

use contracts::{Categorized, LogLevel, LogLevelLookup};

/// Whether a record should be shipped to the log sink
///
/// Blank task class or no configured level both mean "log".
pub fn should_log<R, L>(record: &R, lookup: &L) -> bool
where
    R: Categorized + ?Sized,
    L: LogLevelLookup + ?Sized,
{
    let task_class = record.task_class();
    if task_class.trim().is_empty() {
        return true;
    }
    match lookup.log_level(task_class) {
        Some(level) => level > LogLevel::None,
        None => true,
    }
}

/// Keep the records that should be shipped, in their original order
pub fn select<R, L>(records: Vec<R>, lookup: &L) -> Vec<R>
where
    R: Categorized,
    L: LogLevelLookup + ?Sized,
{
    records
        .into_iter()
        .filter(|record| should_log(record, lookup))
        .collect()
}
