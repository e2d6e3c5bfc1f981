//! Record persistence.
//!
//! The engine only ever talks to [`Store`]; the in-memory implementation
//! keeps the persisted layout (one row per record, policy rules and trigger
//! settings as nested JSON documents) so a database-backed store is a drop-in.

mod memory;


use async_trait::async_trait;
use retention_core::{
    Execution, ExecutionId, History, Policy, PolicyId, Query, Result, ScheduleJob, Status, Task,
    TaskId,
};

pub use memory::InMemoryStore;

/// Filter for execution listings.
#[derive(Debug, Clone, Default)]
pub struct ExecutionFilter {
    pub policy_id: Option<PolicyId>,
    /// Match any of these statuses; `None` matches all.
    pub statuses: Option<Vec<Status>>,
}

impl ExecutionFilter {
    pub fn for_policy(policy_id: PolicyId) -> Self {
        Self { policy_id: Some(policy_id), statuses: None }
    }

    /// Executions of the policy that have not reached a terminal status.
    pub fn in_flight(policy_id: PolicyId) -> Self {
        Self {
            policy_id: Some(policy_id),
            statuses: Some(vec![Status::Pending, Status::Running]),
        }
    }

    pub fn non_terminal() -> Self {
        Self { policy_id: None, statuses: Some(vec![Status::Pending, Status::Running]) }
    }

    pub fn matches(&self, execution: &Execution) -> bool {
        if let Some(policy_id) = self.policy_id {
            if execution.policy_id != policy_id {
                return false;
            }
        }
        if let Some(statuses) = &self.statuses {
            if !statuses.contains(&execution.status) {
                return false;
            }
        }
        true
    }
}

/// Create/read/list/update access to retention records. Identifiers are
/// assigned by the store on create. Lists are in ascending id order.
#[async_trait]
pub trait Store: Send + Sync {
    // === Policy operations ===

    async fn create_policy(&self, policy: &Policy) -> Result<PolicyId>;

    /// Full replace of an existing policy.
    async fn update_policy(&self, policy: &Policy) -> Result<()>;

    async fn delete_policy(&self, id: PolicyId) -> Result<()>;

    async fn get_policy(&self, id: PolicyId) -> Result<Option<Policy>>;

    async fn list_policies(&self) -> Result<Vec<Policy>>;

    // === Execution operations ===

    async fn create_execution(&self, execution: &Execution) -> Result<ExecutionId>;

    async fn update_execution(&self, execution: &Execution) -> Result<()>;

    async fn get_execution(&self, id: ExecutionId) -> Result<Option<Execution>>;

    async fn list_executions(
        &self,
        filter: &ExecutionFilter,
        query: &Query,
    ) -> Result<Vec<Execution>>;

    // === Task operations ===

    async fn create_task(&self, task: &Task) -> Result<TaskId>;

    async fn update_task(&self, task: &Task) -> Result<()>;

    async fn get_task(&self, id: TaskId) -> Result<Option<Task>>;

    async fn list_tasks(&self, execution_id: ExecutionId, query: &Query) -> Result<Vec<Task>>;

    // === Schedule job operations ===

    async fn create_schedule_job(&self, job: &ScheduleJob) -> Result<i64>;

    async fn get_schedule_job_by_policy(&self, policy_id: PolicyId) -> Result<Option<ScheduleJob>>;

    async fn delete_schedule_job(&self, id: i64) -> Result<()>;

    // === History operations ===

    async fn append_history(&self, history: &History) -> Result<i64>;

    async fn list_histories(&self, execution_id: ExecutionId, query: &Query) -> Result<Vec<History>>;
}
