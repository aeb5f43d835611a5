//! Pipeline statistics and metrics.

use std::collections::BTreeMap;
use std::time::Duration;

use contracts::LogKind;
use dispatcher::{DispatchSnapshot, Submission};
use observability::FlushStatsAggregator;
use task_log::FlushReport;

/// Statistics from a pipeline run
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    /// Runner outcomes produced by the synthetic workload
    pub runner_produced: u64,

    /// Croner outcomes produced by the synthetic workload
    pub croner_produced: u64,

    /// Total duration of the pipeline run
    pub duration: Duration,

    /// Name of the sink route that received batches
    pub sink_name: String,

    /// Stopped by a signal rather than the run duration
    pub interrupted: bool,

    /// All shipments finished before shutdown returned
    pub drained: bool,

    /// Flushes that ran the batch on the flushing thread
    pub caller_runs: u64,

    /// Dispatcher counters at shutdown
    pub dispatch: DispatchSnapshot,

    /// Counter totals written to the metrics stores
    pub counters: BTreeMap<String, i64>,

    /// Per-kind flush aggregates
    pub flushes: FlushStatsAggregator,
}

impl PipelineStats {
    /// Fold one flush report into the aggregates
    pub fn record(&mut self, report: &FlushReport) {
        self.flushes
            .update(report.kind, report.records, report.selected);
        if report.submission == Submission::CallerRan {
            self.caller_runs += 1;
        }
    }

    /// Outcomes produced per second
    pub fn throughput(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs > 0.0 {
            (self.runner_produced + self.croner_produced) as f64 / secs
        } else {
            0.0
        }
    }

    /// Sum of every `*.numFail` counter
    pub fn failures(&self) -> i64 {
        self.counters
            .iter()
            .filter(|(name, _)| name.ends_with(".numFail"))
            .map(|(_, value)| value)
            .sum()
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        println!("\n╔══════════════════════════════════════════════════════════════╗");
        println!("║                    Pipeline Statistics                       ║");
        println!("╚══════════════════════════════════════════════════════════════╝\n");

        println!("📊 Overview");
        println!("   ├─ Duration: {:.2}s", self.duration.as_secs_f64());
        println!("   ├─ Runner outcomes: {}", self.runner_produced);
        println!("   ├─ Croner outcomes: {}", self.croner_produced);
        println!("   ├─ Throughput: {:.2}/s", self.throughput());
        println!("   ├─ Failures counted: {}", self.failures());
        println!("   └─ Stopped by: {}", if self.interrupted { "signal" } else { "duration" });

        for kind in [LogKind::Runner, LogKind::Croner] {
            let summary = self.flushes.summary(kind);
            println!("\n🔄 {} Flushes", kind);
            println!("   ├─ Flushes: {}", summary.flushes);
            println!("   ├─ Records flushed: {}", summary.records);
            println!("   ├─ Records shipped: {}", summary.shipped);
            println!("   └─ Batch size: {}", summary.batch_size);
        }

        println!("\n📤 Dispatch ({})", self.sink_name);
        println!("   ├─ Batches submitted: {}", self.dispatch.submitted);
        println!("   ├─ Caller-runs: {}", self.caller_runs);
        println!(
            "   ├─ Persisted: {} batches / {} records",
            self.dispatch.persisted_batches, self.dispatch.persisted_records
        );
        println!(
            "   ├─ Failed: {} batches / {} records",
            self.dispatch.failed_batches, self.dispatch.failed_records
        );
        println!("   └─ Drained: {}", if self.drained { "yes" } else { "no" });

        if !self.counters.is_empty() {
            println!("\n📈 Category Counters");
            let last = self.counters.len() - 1;
            for (i, (name, value)) in self.counters.iter().enumerate() {
                let prefix = if i == last { "└─" } else { "├─" };
                println!("   {} {}: {}", prefix, name, value);
            }
        }

        println!();
    }
}
