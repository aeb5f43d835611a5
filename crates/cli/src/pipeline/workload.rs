//! Synthetic outcome generator used by `task-log run`.

use chrono::{TimeDelta, Utc};
use contracts::{CronerOutcome, CronerState, RunnerOutcome, RunnerState};
use rand::Rng;

const RUNNER_CLASSES: &[&str] = &[
    "demo.SyncOrders",
    "demo.SendMail",
    "demo.ImportFeed",
    "demo.RebuildIndex",
];

const RUNNER_TAGS: &[Option<&str>] = &[None, None, Some("eu"), Some("us")];

const CRONER_CLASSES: &[&str] = &["demo.NightlyReport", "demo.PurgeSessions"];

const RUNNER_FAILURES: &[RunnerState] = &[
    RunnerState::ProgramError,
    RunnerState::ConfigError,
    RunnerState::PartnerError,
    RunnerState::DataError,
];

const CRONER_FAILURES: &[CronerState] = &[
    CronerState::ProgramError,
    CronerState::PartnerError,
    CronerState::DataError,
];

/// Random but plausible runner / croner outcomes
#[derive(Debug, Clone, Copy)]
pub struct SyntheticWorkload {
    failure_rate: f64,
}

impl SyntheticWorkload {
    /// `failure_rate` is clamped to `0.0..=1.0`
    pub fn new(failure_rate: f64) -> Self {
        let failure_rate = if failure_rate.is_finite() {
            failure_rate.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self { failure_rate }
    }

    pub fn failure_rate(&self) -> f64 {
        self.failure_rate
    }

    /// One finished task execution with all four timestamps set
    pub fn runner_outcome<R: Rng + ?Sized>(&self, rng: &mut R, task_id: u64) -> RunnerOutcome {
        let class = RUNNER_CLASSES[rng.random_range(0..RUNNER_CLASSES.len())];
        let state = if rng.random_bool(self.failure_rate) {
            RUNNER_FAILURES[rng.random_range(0..RUNNER_FAILURES.len())]
        } else {
            RunnerState::Success
        };

        let finished_at = Utc::now();
        let run_at = finished_at - TimeDelta::milliseconds(rng.random_range(1..200));
        let consumed_at = run_at - TimeDelta::milliseconds(rng.random_range(0..5));
        let queued_at = consumed_at - TimeDelta::milliseconds(rng.random_range(0..50));

        let mut outcome = RunnerOutcome::new(class, state);
        outcome.task_id = Some(task_id);
        outcome.task_tag = RUNNER_TAGS[rng.random_range(0..RUNNER_TAGS.len())].map(String::from);
        outcome.queued_at = Some(queued_at);
        outcome.consumed_at = Some(consumed_at);
        outcome.run_at = Some(run_at);
        outcome.finished_at = Some(finished_at);
        if state.is_failure() {
            outcome.error_info = Some(format!("synthetic {state:?}"));
        }
        outcome
    }

    /// One scheduled-job firing; the next firing is a minute out
    pub fn croner_outcome<R: Rng + ?Sized>(&self, rng: &mut R) -> CronerOutcome {
        let class = CRONER_CLASSES[rng.random_range(0..CRONER_CLASSES.len())];
        let state = if rng.random_bool(self.failure_rate) {
            CRONER_FAILURES[rng.random_range(0..CRONER_FAILURES.len())]
        } else {
            CronerState::Success
        };

        let finished_at = Utc::now();
        let run_at = finished_at - TimeDelta::milliseconds(rng.random_range(1..500));
        let scheduled_at = run_at - TimeDelta::milliseconds(rng.random_range(0..20));

        let mut outcome = CronerOutcome::new(class, state);
        outcome.scheduled_at = Some(scheduled_at);
        outcome.run_at = Some(run_at);
        outcome.finished_at = Some(finished_at);
        outcome.next_at = Some(scheduled_at + TimeDelta::seconds(60));
        if state.is_failure() {
            outcome.error_info = Some(format!("synthetic {state:?}"));
        }
        outcome
    }
}
