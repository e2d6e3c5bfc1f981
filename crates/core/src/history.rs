use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{ExecutionId, TaskId, Time};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Retained,
    Deleted,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Retained => write!(f, "retained"),
            Verdict::Deleted => write!(f, "deleted"),
        }
    }
}

/// Append-only audit record of one retain/delete decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct History {
    pub id: i64,
    pub execution_id: ExecutionId,
    pub task_id: TaskId,
    pub repository: String,
    pub tag: String,
    pub verdict: Verdict,
    /// Rule that produced the verdict; `None` when no rule applied.
    pub rule_id: Option<i64>,
    /// Set only when a live delete was attempted and failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub create_time: Time,
}
