//! In-memory [`Store`] implementation.
//!
//! Tables live behind one `tokio::sync::RwLock`. Policies are kept in their
//! persisted shape: scope and trigger kind as columns, trigger settings and
//! the algorithm/rule set as serialized JSON documents, so every read goes
//! through the same decode path a database row would.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use retention_core::{
    Execution, ExecutionId, History, Policy, PolicyDocument, PolicyId, Query, Result,
    RetentionError, Scope, ScheduleJob, Task, TaskId, Time, Trigger,
};
use tokio::sync::RwLock;

use super::{ExecutionFilter, Store};

/// Persisted shape of a policy.
#[derive(Debug, Clone)]
struct PolicyRow {
    id: PolicyId,
    scope_level: String,
    scope_reference: i64,
    trigger_kind: String,
    trigger_settings: String,
    data: String,
    create_time: Time,
    update_time: Time,
}

impl PolicyRow {
    fn encode(policy: &Policy, id: PolicyId, create_time: Time, update_time: Time) -> Result<Self> {
        Ok(Self {
            id,
            scope_level: policy.scope.level.to_string(),
            scope_reference: policy.scope.reference,
            trigger_kind: policy.trigger.kind.to_string(),
            trigger_settings: serde_json::to_string(&policy.trigger.settings)?,
            data: serde_json::to_string(&policy.document())?,
            create_time,
            update_time,
        })
    }

    fn decode(&self) -> Result<Policy> {
        let corrupt = |field: &str, e: String| {
            RetentionError::Persistence(format!("policy {} has corrupt {}: {}", self.id, field, e))
        };
        let level = self.scope_level.parse().map_err(|e| corrupt("scope_level", e))?;
        let kind = self.trigger_kind.parse().map_err(|e| corrupt("trigger_kind", e))?;
        let settings = serde_json::from_str(&self.trigger_settings)
            .map_err(|e| corrupt("trigger_settings", e.to_string()))?;
        let document: PolicyDocument =
            serde_json::from_str(&self.data).map_err(|e| corrupt("data", e.to_string()))?;

        Ok(Policy {
            id: self.id,
            algorithm: document.algorithm,
            rules: document.rules,
            trigger: Trigger { kind, settings },
            scope: Scope { level, reference: self.scope_reference },
            create_time: Some(self.create_time),
            update_time: Some(self.update_time),
        })
    }
}

#[derive(Debug, Default)]
struct Tables {
    next_policy_id: i64,
    next_execution_id: i64,
    next_task_id: i64,
    next_job_id: i64,
    next_history_id: i64,
    policies: BTreeMap<PolicyId, PolicyRow>,
    executions: BTreeMap<ExecutionId, Execution>,
    tasks: BTreeMap<TaskId, Task>,
    schedule_jobs: BTreeMap<i64, ScheduleJob>,
    histories: BTreeMap<i64, History>,
}

fn next(counter: &mut i64) -> i64 {
    *counter += 1;
    *counter
}

/// Process-local store. Records vanish with the process.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
    unavailable: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with a persistence error (or recover).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RetentionError::Persistence("store unavailable".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn create_policy(&self, policy: &Policy) -> Result<PolicyId> {
        self.check()?;
        let mut t = self.tables.write().await;
        let id = next(&mut t.next_policy_id);
        let now = Utc::now();
        let row = PolicyRow::encode(policy, id, now, now)?;
        t.policies.insert(id, row);
        Ok(id)
    }

    async fn update_policy(&self, policy: &Policy) -> Result<()> {
        self.check()?;
        let mut t = self.tables.write().await;
        let create_time = t
            .policies
            .get(&policy.id)
            .map(|row| row.create_time)
            .ok_or_else(|| RetentionError::not_found("policy", policy.id))?;
        let row = PolicyRow::encode(policy, policy.id, create_time, Utc::now())?;
        t.policies.insert(policy.id, row);
        Ok(())
    }

    async fn delete_policy(&self, id: PolicyId) -> Result<()> {
        self.check()?;
        let mut t = self.tables.write().await;
        t.policies
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| RetentionError::not_found("policy", id))
    }

    async fn get_policy(&self, id: PolicyId) -> Result<Option<Policy>> {
        self.check()?;
        let t = self.tables.read().await;
        t.policies.get(&id).map(PolicyRow::decode).transpose()
    }

    async fn list_policies(&self) -> Result<Vec<Policy>> {
        self.check()?;
        let t = self.tables.read().await;
        t.policies.values().map(PolicyRow::decode).collect()
    }

    async fn create_execution(&self, execution: &Execution) -> Result<ExecutionId> {
        self.check()?;
        let mut t = self.tables.write().await;
        let id = next(&mut t.next_execution_id);
        let mut record = execution.clone();
        record.id = id;
        t.executions.insert(id, record);
        Ok(id)
    }

    async fn update_execution(&self, execution: &Execution) -> Result<()> {
        self.check()?;
        let mut t = self.tables.write().await;
        match t.executions.get_mut(&execution.id) {
            Some(existing) => {
                *existing = execution.clone();
                Ok(())
            }
            None => Err(RetentionError::not_found("execution", execution.id)),
        }
    }

    async fn get_execution(&self, id: ExecutionId) -> Result<Option<Execution>> {
        self.check()?;
        Ok(self.tables.read().await.executions.get(&id).cloned())
    }

    async fn list_executions(
        &self,
        filter: &ExecutionFilter,
        query: &Query,
    ) -> Result<Vec<Execution>> {
        self.check()?;
        let t = self.tables.read().await;
        let matching = t
            .executions
            .values()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();
        Ok(query.apply(matching))
    }

    async fn create_task(&self, task: &Task) -> Result<TaskId> {
        self.check()?;
        let mut t = self.tables.write().await;
        let id = next(&mut t.next_task_id);
        let mut record = task.clone();
        record.id = id;
        t.tasks.insert(id, record);
        Ok(id)
    }

    async fn update_task(&self, task: &Task) -> Result<()> {
        self.check()?;
        let mut t = self.tables.write().await;
        match t.tasks.get_mut(&task.id) {
            Some(existing) => {
                *existing = task.clone();
                Ok(())
            }
            None => Err(RetentionError::not_found("task", task.id)),
        }
    }

    async fn get_task(&self, id: TaskId) -> Result<Option<Task>> {
        self.check()?;
        Ok(self.tables.read().await.tasks.get(&id).cloned())
    }

    async fn list_tasks(&self, execution_id: ExecutionId, query: &Query) -> Result<Vec<Task>> {
        self.check()?;
        let t = self.tables.read().await;
        let matching = t
            .tasks
            .values()
            .filter(|task| task.execution_id == execution_id)
            .cloned()
            .collect();
        Ok(query.apply(matching))
    }

    async fn create_schedule_job(&self, job: &ScheduleJob) -> Result<i64> {
        self.check()?;
        let mut t = self.tables.write().await;
        let id = next(&mut t.next_job_id);
        let mut record = job.clone();
        record.id = id;
        t.schedule_jobs.insert(id, record);
        Ok(id)
    }

    async fn get_schedule_job_by_policy(&self, policy_id: PolicyId) -> Result<Option<ScheduleJob>> {
        self.check()?;
        let t = self.tables.read().await;
        Ok(t.schedule_jobs.values().find(|j| j.policy_id == policy_id).cloned())
    }

    async fn delete_schedule_job(&self, id: i64) -> Result<()> {
        self.check()?;
        let mut t = self.tables.write().await;
        t.schedule_jobs
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| RetentionError::not_found("schedule job", id))
    }

    async fn append_history(&self, history: &History) -> Result<i64> {
        self.check()?;
        let mut t = self.tables.write().await;
        let id = next(&mut t.next_history_id);
        let mut record = history.clone();
        record.id = id;
        t.histories.insert(id, record);
        Ok(id)
    }

    async fn list_histories(&self, execution_id: ExecutionId, query: &Query) -> Result<Vec<History>> {
        self.check()?;
        let t = self.tables.read().await;
        let matching = t
            .histories
            .values()
            .filter(|h| h.execution_id == execution_id)
            .cloned()
            .collect();
        Ok(query.apply(matching))
    }
}
