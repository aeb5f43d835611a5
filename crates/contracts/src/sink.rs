//! LogSink trait - Dispatcher output interface
//!
//! Defines the abstract interface for the remote log sink.

use serde::Serialize;

use crate::{ContractError, CronerOutcome, LogKind, RunnerOutcome};

/// A flushed and filtered batch of one record kind
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "records", rename_all = "snake_case")]
pub enum LogBatch {
    Runner(Vec<RunnerOutcome>),
    Croner(Vec<CronerOutcome>),
}

impl LogBatch {
    pub fn kind(&self) -> LogKind {
        match self {
            LogBatch::Runner(_) => LogKind::Runner,
            LogBatch::Croner(_) => LogKind::Croner,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            LogBatch::Runner(records) => records.len(),
            LogBatch::Croner(records) => records.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Remote log sink
///
/// Implementations must be safe to call from several dispatch workers at once.
pub trait LogSink: Send + Sync {
    /// Sink name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Persist a whole batch
    ///
    /// # Errors
    /// Returns write error (should include context). The dispatcher logs it
    /// and discards the batch.
    fn bulk_persist(&self, batch: &LogBatch) -> Result<(), ContractError>;
}
