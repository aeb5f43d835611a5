//! TracingSink - logs batch summaries via tracing

use contracts::{ContractError, LogBatch, LogSink};
use tracing::{debug, info, instrument};

/// Sink that logs batch summaries for debugging
pub struct TracingSink {
    name: String,
}

impl TracingSink {
    /// Create a new TracingSink with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    fn log_batch_summary(&self, batch: &LogBatch) {
        let (failures, categories) = match batch {
            LogBatch::Runner(records) => (
                records.iter().filter(|r| r.state.is_failure()).count(),
                distinct(records.iter().map(|r| r.task_class.as_str())),
            ),
            LogBatch::Croner(records) => (
                records.iter().filter(|r| r.state.is_failure()).count(),
                distinct(records.iter().map(|r| r.task_class.as_str())),
            ),
        };

        info!(
            sink = %self.name,
            kind = %batch.kind(),
            records = batch.len(),
            failures,
            task_classes = categories,
            "Log batch received"
        );
    }
}

fn distinct<'a>(classes: impl Iterator<Item = &'a str>) -> usize {
    let mut seen: Vec<&str> = classes.collect();
    seen.sort_unstable();
    seen.dedup();
    seen.len()
}

impl LogSink for TracingSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "tracing_sink_persist",
        skip(self, batch),
        fields(sink = %self.name, kind = %batch.kind())
    )]
    fn bulk_persist(&self, batch: &LogBatch) -> Result<(), ContractError> {
        self.log_batch_summary(batch);
        if let LogBatch::Runner(records) = batch {
            for record in records.iter().filter(|r| r.state.is_failure()) {
                debug!(
                    sink = %self.name,
                    task_class = %record.task_class,
                    task_id = ?record.task_id,
                    state = record.state.code(),
                    error = record.error_info.as_deref().unwrap_or(""),
                    "Failed task"
                );
            }
        }
        Ok(())
    }
}
