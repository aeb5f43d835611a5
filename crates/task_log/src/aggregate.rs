//! Grouped counter aggregation over a flushed batch
//!
//! One accumulator, described by an [`AccumulatorSpec`], is instantiated for
//! each record kind. Every record lands in exactly one category bucket.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use contracts::{
    Categorized, CronerOutcome, CronerState, LogKind, MetricsStore, RunnerOutcome, RunnerState,
};
use tracing::debug;

/// Slot of the record count in every counter array
pub const NUM_ALL: usize = 0;
/// Slot of the failure count in every counter array
pub const NUM_FAIL: usize = 1;

pub const RUNNER_FIELDS: usize = 10;
pub const CRONER_FIELDS: usize = 8;

type TimestampFn<R> = fn(&R) -> Option<DateTime<Utc>>;

/// A measured interval between two record timestamps
pub struct Phase<R> {
    /// Counter slot receiving the summed milliseconds
    pub slot: usize,
    pub start: TimestampFn<R>,
    pub end: TimestampFn<R>,
}

impl<R> Phase<R> {
    /// Milliseconds from start to end; `None` unless both are present
    ///
    /// Negative values (clock skew) are returned as-is.
    pub fn millis(&self, record: &R) -> Option<i64> {
        let start = (self.start)(record)?;
        let end = (self.end)(record)?;
        Some((end - start).num_milliseconds())
    }
}

/// Describes how one record kind is aggregated
pub struct AccumulatorSpec<R: 'static, const N: usize> {
    pub kind: LogKind,
    /// Counter name suffix for each slot
    pub fields: [&'static str; N],
    /// Failure reason slot, `None` for success or a state without a bucket
    pub reason_slot: fn(&R) -> Option<usize>,
    pub phases: &'static [Phase<R>],
    /// Next-scheduled timestamp retained per category
    pub next_run: Option<TimestampFn<R>>,
}

impl<R: Categorized, const N: usize> AccumulatorSpec<R, N> {
    pub fn accumulator(&'static self) -> GroupedAccumulator<R, N> {
        GroupedAccumulator {
            spec: self,
            groups: BTreeMap::new(),
        }
    }

    /// Aggregate a whole batch
    pub fn aggregate(&'static self, records: &[R]) -> Aggregation<N> {
        let mut accumulator = self.accumulator();
        for record in records {
            accumulator.observe(record);
        }
        accumulator.finish()
    }
}

/// Counters of one category for one flush cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryMetrics<const N: usize> {
    pub counters: [i64; N],
    /// Last observed next-scheduled timestamp (croner only)
    pub next_run: Option<DateTime<Utc>>,
}

impl<const N: usize> Default for CategoryMetrics<N> {
    fn default() -> Self {
        Self {
            counters: [0; N],
            next_run: None,
        }
    }
}

/// Accumulates records into per-category counters
pub struct GroupedAccumulator<R: 'static, const N: usize> {
    spec: &'static AccumulatorSpec<R, N>,
    groups: BTreeMap<String, CategoryMetrics<N>>,
}

impl<R: Categorized, const N: usize> GroupedAccumulator<R, N> {
    pub fn observe(&mut self, record: &R) {
        let spec = self.spec;
        let metrics = self.groups.entry(record.category_key()).or_default();

        metrics.counters[NUM_ALL] += 1;
        if let Some(slot) = (spec.reason_slot)(record) {
            metrics.counters[NUM_FAIL] += 1;
            metrics.counters[slot] += 1;
        }

        for phase in spec.phases {
            if let Some(millis) = phase.millis(record) {
                let sum = &mut metrics.counters[phase.slot];
                *sum = sum.saturating_add(millis);
            }
        }

        // Overwritten on every record, absent included
        if let Some(next_run) = spec.next_run {
            metrics.next_run = next_run(record);
        }
    }

    pub fn finish(self) -> Aggregation<N> {
        let spec = self.spec;
        Aggregation {
            kind: spec.kind,
            fields: &spec.fields,
            groups: self.groups,
        }
    }
}

/// Result of aggregating one batch
#[derive(Debug, Clone)]
pub struct Aggregation<const N: usize> {
    kind: LogKind,
    fields: &'static [&'static str; N],
    groups: BTreeMap<String, CategoryMetrics<N>>,
}

impl<const N: usize> Aggregation<N> {
    pub fn kind(&self) -> LogKind {
        self.kind
    }

    /// Number of categories
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn get(&self, category: &str) -> Option<&CategoryMetrics<N>> {
        self.groups.get(category)
    }

    /// Value of one named counter
    pub fn counter(&self, category: &str, field: &str) -> Option<i64> {
        let slot = self.fields.iter().position(|f| *f == field)?;
        self.groups.get(category).map(|m| m.counters[slot])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CategoryMetrics<N>)> {
        self.groups.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Categories with a retained next-scheduled timestamp
    pub fn next_runs(&self) -> impl Iterator<Item = (&str, DateTime<Utc>)> {
        self.groups
            .iter()
            .filter_map(|(k, v)| v.next_run.map(|t| (k.as_str(), t)))
    }

    /// Write every non-zero counter as `"{category}.{field}"`
    ///
    /// Returns the number of store calls made.
    pub fn emit(&self, store: &dyn MetricsStore) -> usize {
        let mut calls = 0;
        for (category, metrics) in &self.groups {
            for (field, value) in self.fields.iter().zip(metrics.counters.iter()) {
                if *value != 0 {
                    store.add_counter(&format!("{category}.{field}"), *value);
                    calls += 1;
                }
            }
        }
        debug!(kind = %self.kind, categories = self.groups.len(), calls, "Counters emitted");
        calls
    }
}

fn runner_reason(record: &RunnerOutcome) -> Option<usize> {
    match record.state {
        RunnerState::Success => None,
        RunnerState::ProgramError => Some(2),
        RunnerState::ConfigError => Some(3),
        RunnerState::PartnerError => Some(4),
        RunnerState::DataError => Some(5),
    }
}

fn runner_queued(r: &RunnerOutcome) -> Option<DateTime<Utc>> {
    r.queued_at
}

fn runner_consumed(r: &RunnerOutcome) -> Option<DateTime<Utc>> {
    r.consumed_at
}

fn runner_run(r: &RunnerOutcome) -> Option<DateTime<Utc>> {
    r.run_at
}

fn runner_finished(r: &RunnerOutcome) -> Option<DateTime<Utc>> {
    r.finished_at
}

pub static RUNNER_SPEC: AccumulatorSpec<RunnerOutcome, RUNNER_FIELDS> = AccumulatorSpec {
    kind: LogKind::Runner,
    fields: [
        "numAll",
        "numFail",
        "numFailProgram",
        "numFailConfig",
        "numFailPartner",
        "numFailData",
        "timeAll",
        "timeQueue",
        "timeWait",
        "timeRun",
    ],
    reason_slot: runner_reason,
    phases: &[
        Phase {
            slot: 6,
            start: runner_queued,
            end: runner_finished,
        },
        Phase {
            slot: 7,
            start: runner_queued,
            end: runner_consumed,
        },
        Phase {
            slot: 8,
            start: runner_consumed,
            end: runner_run,
        },
        Phase {
            slot: 9,
            start: runner_run,
            end: runner_finished,
        },
    ],
    next_run: None,
};

fn croner_reason(record: &CronerOutcome) -> Option<usize> {
    match record.state {
        CronerState::Success => None,
        CronerState::ProgramError => Some(2),
        CronerState::PartnerError => Some(3),
        CronerState::DataError => Some(4),
    }
}

fn croner_scheduled(r: &CronerOutcome) -> Option<DateTime<Utc>> {
    r.scheduled_at
}

fn croner_run(r: &CronerOutcome) -> Option<DateTime<Utc>> {
    r.run_at
}

fn croner_finished(r: &CronerOutcome) -> Option<DateTime<Utc>> {
    r.finished_at
}

fn croner_next(r: &CronerOutcome) -> Option<DateTime<Utc>> {
    r.next_at
}

pub static CRONER_SPEC: AccumulatorSpec<CronerOutcome, CRONER_FIELDS> = AccumulatorSpec {
    kind: LogKind::Croner,
    fields: [
        "numAll",
        "numFail",
        "numFailProgram",
        "numFailPartner",
        "numFailData",
        "timeAll",
        "timeWait",
        "timeRun",
    ],
    reason_slot: croner_reason,
    phases: &[
        Phase {
            slot: 5,
            start: croner_scheduled,
            end: croner_finished,
        },
        Phase {
            slot: 6,
            start: croner_scheduled,
            end: croner_run,
        },
        Phase {
            slot: 7,
            start: croner_run,
            end: croner_finished,
        },
    ],
    next_run: Some(croner_next),
};

pub fn aggregate_runner(records: &[RunnerOutcome]) -> Aggregation<RUNNER_FIELDS> {
    RUNNER_SPEC.aggregate(records)
}

pub fn aggregate_croner(records: &[CronerOutcome]) -> Aggregation<CRONER_FIELDS> {
    CRONER_SPEC.aggregate(records)
}
