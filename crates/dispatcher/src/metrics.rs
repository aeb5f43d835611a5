//! Dispatch metrics for observability

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for one dispatcher
#[derive(Debug, Default)]
pub struct DispatchMetrics {
    /// Non-empty batches submitted
    submitted: AtomicU64,
    /// Batches shipped on the submitting thread
    caller_runs: AtomicU64,
    /// Empty batches skipped
    skipped: AtomicU64,
    /// Batches the sink accepted
    persisted_batches: AtomicU64,
    persisted_records: AtomicU64,
    /// Batches discarded after a sink failure
    failed_batches: AtomicU64,
    failed_records: AtomicU64,
}

impl DispatchMetrics {
    /// Create new metrics instance
    pub fn new() -> Self {
        Self::default()
    }

    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }

    pub fn inc_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn caller_runs(&self) -> u64 {
        self.caller_runs.load(Ordering::Relaxed)
    }

    pub fn inc_caller_runs(&self) {
        self.caller_runs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }

    pub fn inc_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a batch the sink accepted
    pub fn record_persisted(&self, records: usize) {
        self.persisted_batches.fetch_add(1, Ordering::Relaxed);
        self.persisted_records
            .fetch_add(records as u64, Ordering::Relaxed);
    }

    /// Record a batch dropped after a sink failure
    pub fn record_failed(&self, records: usize) {
        self.failed_batches.fetch_add(1, Ordering::Relaxed);
        self.failed_records.fetch_add(records as u64, Ordering::Relaxed);
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> DispatchSnapshot {
        DispatchSnapshot {
            submitted: self.submitted(),
            caller_runs: self.caller_runs(),
            skipped: self.skipped(),
            persisted_batches: self.persisted_batches.load(Ordering::Relaxed),
            persisted_records: self.persisted_records.load(Ordering::Relaxed),
            failed_batches: self.failed_batches.load(Ordering::Relaxed),
            failed_records: self.failed_records.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of dispatch metrics (for reporting)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSnapshot {
    pub submitted: u64,
    pub caller_runs: u64,
    pub skipped: u64,
    pub persisted_batches: u64,
    pub persisted_records: u64,
    pub failed_batches: u64,
    pub failed_records: u64,
}

impl DispatchSnapshot {
    /// Batches that finished either way
    pub fn completed_batches(&self) -> u64 {
        self.persisted_batches + self.failed_batches
    }
}
