//! Outcome records - producer input
//!
//! One record per task execution (runner) or per scheduled-job firing
//! (croner). Records are immutable once handed to the pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ContractError;

/// Record kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogKind {
    /// Task execution outcomes
    Runner,
    /// Scheduled-job outcomes
    Croner,
}

impl LogKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogKind::Runner => "runner",
            LogKind::Croner => "croner",
        }
    }
}

impl fmt::Display for LogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A record that belongs to a task category
pub trait Categorized {
    /// Category identifier used for log-level lookup
    fn task_class(&self) -> &str;

    /// Aggregation key combining the task identity fields
    ///
    /// Must be identical for all records of the same logical category.
    fn category_key(&self) -> String;
}

fn join_key(task_class: &str, tag: Option<&str>, target: Option<&str>) -> String {
    let mut key = String::from(task_class);
    if let Some(tag) = tag.filter(|t| !t.is_empty()) {
        key.push('#');
        key.push_str(tag);
    }
    if let Some(target) = target.filter(|t| !t.is_empty()) {
        key.push('@');
        key.push_str(target);
    }
    key
}

/// Runner outcome state (wire codes 1..=5)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum RunnerState {
    #[default]
    Success = 1,
    ProgramError = 2,
    ConfigError = 3,
    PartnerError = 4,
    DataError = 5,
}

impl RunnerState {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn is_failure(self) -> bool {
        self != RunnerState::Success
    }
}

impl From<RunnerState> for u8 {
    fn from(state: RunnerState) -> Self {
        state.code()
    }
}

impl TryFrom<u8> for RunnerState {
    type Error = ContractError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(RunnerState::Success),
            2 => Ok(RunnerState::ProgramError),
            3 => Ok(RunnerState::ConfigError),
            4 => Ok(RunnerState::PartnerError),
            5 => Ok(RunnerState::DataError),
            _ => Err(ContractError::InvalidState {
                kind: LogKind::Runner,
                code,
            }),
        }
    }
}

/// Croner outcome state
///
/// Shares wire codes with [`RunnerState`] but has no config-error state,
/// so code 3 is not a valid croner state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum CronerState {
    #[default]
    Success = 1,
    ProgramError = 2,
    PartnerError = 4,
    DataError = 5,
}

impl CronerState {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn is_failure(self) -> bool {
        self != CronerState::Success
    }
}

impl From<CronerState> for u8 {
    fn from(state: CronerState) -> Self {
        state.code()
    }
}

impl TryFrom<u8> for CronerState {
    type Error = ContractError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(CronerState::Success),
            2 => Ok(CronerState::ProgramError),
            4 => Ok(CronerState::PartnerError),
            5 => Ok(CronerState::DataError),
            _ => Err(ContractError::InvalidState {
                kind: LogKind::Croner,
                code,
            }),
        }
    }
}

/// One task execution outcome
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunnerOutcome {
    /// Task id assigned by the execution subsystem
    #[serde(default)]
    pub task_id: Option<u64>,

    /// Task class (category identifier)
    pub task_class: String,

    /// Optional task tag, part of the category key
    #[serde(default)]
    pub task_tag: Option<String>,

    /// Optional run target, part of the category key
    #[serde(default)]
    pub run_target: Option<String>,

    pub state: RunnerState,

    /// Time the task was enqueued
    pub queued_at: Option<DateTime<Utc>>,
    /// Time a worker picked the task up
    pub consumed_at: Option<DateTime<Utc>>,
    /// Time execution started
    pub run_at: Option<DateTime<Utc>>,
    /// Time execution finished
    pub finished_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub error_info: Option<String>,
}

impl RunnerOutcome {
    pub fn new(task_class: impl Into<String>, state: RunnerState) -> Self {
        Self {
            task_class: task_class.into(),
            state,
            ..Default::default()
        }
    }
}

impl Categorized for RunnerOutcome {
    fn task_class(&self) -> &str {
        &self.task_class
    }

    fn category_key(&self) -> String {
        join_key(
            &self.task_class,
            self.task_tag.as_deref(),
            self.run_target.as_deref(),
        )
    }
}

/// One scheduled-job firing outcome
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CronerOutcome {
    /// Task class (category identifier)
    pub task_class: String,

    #[serde(default)]
    pub task_param: Option<String>,

    /// Run target descriptor, normalized to `""` on ingestion
    #[serde(default)]
    pub run_target: Option<String>,

    pub state: CronerState,

    /// Time the firing was scheduled for
    pub scheduled_at: Option<DateTime<Utc>>,
    /// Time the job started running
    pub run_at: Option<DateTime<Utc>>,
    /// Time the job finished
    pub finished_at: Option<DateTime<Utc>>,
    /// Next scheduled firing
    pub next_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub error_info: Option<String>,
}

impl CronerOutcome {
    pub fn new(task_class: impl Into<String>, state: CronerState) -> Self {
        Self {
            task_class: task_class.into(),
            state,
            ..Default::default()
        }
    }
}

impl Categorized for CronerOutcome {
    fn task_class(&self) -> &str {
        &self.task_class
    }

    fn category_key(&self) -> String {
        join_key(&self.task_class, None, self.run_target.as_deref())
    }
}
