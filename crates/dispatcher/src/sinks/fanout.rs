//! FanoutSink - persists every batch to several sinks

use std::sync::Arc;

use contracts::{ContractError, LogBatch, LogSink};
use tracing::{instrument, warn};

/// Sink that forwards each batch to all inner sinks
///
/// Every inner sink is tried; the first error is returned afterwards.
pub struct FanoutSink {
    name: String,
    sinks: Vec<Arc<dyn LogSink>>,
}

impl FanoutSink {
    pub fn new(name: impl Into<String>, sinks: Vec<Arc<dyn LogSink>>) -> Self {
        Self {
            name: name.into(),
            sinks,
        }
    }

    pub fn sink_names(&self) -> Vec<&str> {
        self.sinks.iter().map(|s| s.name()).collect()
    }
}

impl LogSink for FanoutSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "fanout_sink_persist",
        skip(self, batch),
        fields(sinks = self.sinks.len(), kind = %batch.kind())
    )]
    fn bulk_persist(&self, batch: &LogBatch) -> Result<(), ContractError> {
        let mut first_error = None;
        for sink in &self.sinks {
            if let Err(e) = sink.bulk_persist(batch) {
                warn!(sink = %sink.name(), error = %e, "Inner sink failed");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{RunnerOutcome, RunnerState};
    use std::sync::atomic::{AtomicU64, Ordering};

    struct CountingSink {
        name: String,
        calls: AtomicU64,
        fail: bool,
    }

    impl CountingSink {
        fn new(name: &str, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                calls: AtomicU64::new(0),
                fail,
            })
        }
    }

    impl LogSink for CountingSink {
        fn name(&self) -> &str {
            &self.name
        }

        fn bulk_persist(&self, _batch: &LogBatch) -> Result<(), ContractError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(ContractError::sink_write(&self.name, "boom"))
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn test_fanout_tries_every_sink() {
        let first = CountingSink::new("first", true);
        let second = CountingSink::new("second", false);
        let third = CountingSink::new("third", true);
        let sinks: Vec<Arc<dyn LogSink>> = vec![first.clone(), second.clone(), third.clone()];
        let fanout = FanoutSink::new("fanout", sinks);
        assert_eq!(fanout.sink_names(), vec!["first", "second", "third"]);

        let batch = LogBatch::Runner(vec![RunnerOutcome::new("a", RunnerState::Success)]);
        let err = fanout.bulk_persist(&batch).unwrap_err();

        assert!(err.to_string().contains("'first'"));
        assert_eq!(first.calls.load(Ordering::SeqCst), 1);
        assert_eq!(second.calls.load(Ordering::SeqCst), 1);
        assert_eq!(third.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_fanout_ok_when_all_succeed() {
        let sinks: Vec<Arc<dyn LogSink>> =
            vec![CountingSink::new("a", false), CountingSink::new("b", false)];
        let fanout = FanoutSink::new("fanout", sinks);
        let batch = LogBatch::Runner(Vec::new());
        assert!(fanout.bulk_persist(&batch).is_ok());
    }
}
