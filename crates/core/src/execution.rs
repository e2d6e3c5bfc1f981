//! Execution, task, and schedule-job records.
//!
//! An [`Execution`] owns its counters; the orchestrator is the only writer.
//! [`Execution::record`] is the single place a counter moves, so the
//! `total == succeed + failed + in_progress + stopped` identity holds after
//! every call.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{PolicyId, Time};

pub type ExecutionId = i64;
pub type TaskId = i64;

// ── Status ──────────────────────────────────────────────────────────

/// Shared state machine for executions and tasks:
/// `Pending → Running → {Success, Failed, Stopped}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    Pending,
    Running,
    Success,
    Failed,
    Stopped,
}

impl Status {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Success | Status::Failed | Status::Stopped)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Pending => write!(f, "Pending"),
            Status::Running => write!(f, "Running"),
            Status::Success => write!(f, "Success"),
            Status::Failed => write!(f, "Failed"),
            Status::Stopped => write!(f, "Stopped"),
        }
    }
}

impl FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Status::Pending),
            "Running" => Ok(Status::Running),
            "Success" => Ok(Status::Success),
            "Failed" => Ok(Status::Failed),
            "Stopped" => Ok(Status::Stopped),
            other => Err(format!("unknown status: '{}'", other)),
        }
    }
}

/// What caused an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerSource {
    Manual,
    Scheduled,
}

impl fmt::Display for TriggerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerSource::Manual => write!(f, "manual"),
            TriggerSource::Scheduled => write!(f, "scheduled"),
        }
    }
}

/// Terminal result of one task, as reported to the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    Succeeded,
    Failed,
    Stopped,
}

impl TaskOutcome {
    pub fn status(&self) -> Status {
        match self {
            TaskOutcome::Succeeded => Status::Success,
            TaskOutcome::Failed => Status::Failed,
            TaskOutcome::Stopped => Status::Stopped,
        }
    }
}

// ── Execution ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    pub id: ExecutionId,
    pub policy_id: PolicyId,
    pub status: Status,
    #[serde(default)]
    pub status_text: String,
    pub dry_run: bool,
    pub trigger: TriggerSource,
    pub total: u32,
    pub succeed: u32,
    pub failed: u32,
    pub in_progress: u32,
    pub stopped: u32,
    pub start_time: Time,
    pub end_time: Option<Time>,
}

impl Execution {
    /// A fresh execution over `total` repositories. Every task is outstanding
    /// until it reports, so `in_progress` starts at `total`.
    pub fn new(
        policy_id: PolicyId,
        trigger: TriggerSource,
        dry_run: bool,
        total: u32,
        now: Time,
    ) -> Self {
        Self {
            id: 0,
            policy_id,
            status: Status::Pending,
            status_text: String::new(),
            dry_run,
            trigger,
            total,
            succeed: 0,
            failed: 0,
            in_progress: total,
            stopped: 0,
            start_time: now,
            end_time: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn counters_consistent(&self) -> bool {
        self.total == self.succeed + self.failed + self.in_progress + self.stopped
    }

    /// Apply one task's terminal outcome. Returns `true` when this call
    /// finalized the execution. Calls on a terminal execution are ignored.
    pub fn record(&mut self, outcome: TaskOutcome, now: Time) -> bool {
        if self.is_terminal() || self.in_progress == 0 {
            return false;
        }
        match outcome {
            TaskOutcome::Succeeded => self.succeed += 1,
            TaskOutcome::Failed => self.failed += 1,
            TaskOutcome::Stopped => self.stopped += 1,
        }
        self.in_progress -= 1;
        if self.status == Status::Pending {
            self.status = Status::Running;
        }
        if self.in_progress == 0 {
            self.finalize(now);
            return true;
        }
        false
    }

    /// Settle the terminal status from the counters.
    pub fn finalize(&mut self, now: Time) {
        if self.failed > 0 {
            self.status = Status::Failed;
            self.status_text = format!("{} of {} task(s) failed", self.failed, self.total);
        } else if self.stopped > 0 {
            self.status = Status::Stopped;
            self.status_text = format!("stopped with {} task(s) not completed", self.stopped);
        } else {
            self.status = Status::Success;
            self.status_text.clear();
        }
        self.end_time = Some(now);
    }
}

// ── Task ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    Image,
    Chart,
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceType::Image => write!(f, "image"),
            ResourceType::Chart => write!(f, "chart"),
        }
    }
}

/// One repository's unit of work. Refers to its execution by id only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub execution_id: ExecutionId,
    pub resource_type: ResourceType,
    /// Repository name.
    pub resource: String,
    pub status: Status,
    #[serde(default)]
    pub status_text: String,
    #[serde(default)]
    pub attempts: u32,
    pub start_time: Option<Time>,
    pub end_time: Option<Time>,
}

impl Task {
    pub fn new(execution_id: ExecutionId, resource_type: ResourceType, resource: &str) -> Self {
        Self {
            id: 0,
            execution_id,
            resource_type,
            resource: resource.to_string(),
            status: Status::Pending,
            status_text: String::new(),
            attempts: 0,
            start_time: None,
            end_time: None,
        }
    }
}

// ── Schedule job ────────────────────────────────────────────────────

/// Binding between a policy and the recurring job firing its trigger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleJob {
    pub id: i64,
    pub policy_id: PolicyId,
    pub job_id: i64,
    pub status: String,
    pub create_time: Time,
    pub update_time: Time,
}
