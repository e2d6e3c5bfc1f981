//! [`RetentionManager`]: the service object callers construct with their
//! collaborators and drive policies and executions through.

use std::sync::Arc;

use retention_core::{
    Config, Execution, ExecutionId, History, Policy, PolicyId, Query, Result, RetentionError,
    Task, TriggerSource,
};
use retention_rules::validate_policy;
use tracing::info;

use crate::catalog::RegistryCatalog;
use crate::orchestrator::Orchestrator;
use crate::schedule::ScheduleCapability;
use crate::store::{ExecutionFilter, Store};
use crate::trigger::TriggerScheduler;

pub struct RetentionManager {
    store: Arc<dyn Store>,
    orchestrator: Arc<Orchestrator>,
    scheduler: TriggerScheduler,
}

impl RetentionManager {
    pub fn new(
        store: Arc<dyn Store>,
        catalog: Arc<dyn RegistryCatalog>,
        schedule: Arc<dyn ScheduleCapability>,
        config: &Config,
    ) -> Self {
        let orchestrator =
            Arc::new(Orchestrator::new(store.clone(), catalog, config.executor.clone()));
        let scheduler = TriggerScheduler::new(
            store.clone(),
            schedule,
            orchestrator.clone(),
            config.scheduler.enabled,
        );
        Self { store, orchestrator, scheduler }
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    pub fn scheduler(&self) -> &TriggerScheduler {
        &self.scheduler
    }

    // ── Policies ────────────────────────────────────────────────────

    /// Validate, persist, and (for scheduled triggers) install a policy.
    pub async fn create_policy(&self, policy: &Policy) -> Result<PolicyId> {
        validate_policy(policy)?;
        let id = self.store.create_policy(policy).await?;

        let mut stored = policy.clone();
        stored.id = id;
        if let Err(e) = self.scheduler.install(&stored).await {
            self.store.delete_policy(id).await?;
            return Err(e);
        }

        info!(policy_id = id, scope = %policy.scope, trigger = %policy.trigger.kind, "policy created");
        Ok(id)
    }

    /// Replace a policy's rules, scope, and trigger. The schedule binding is
    /// always reinstalled so a changed cron takes effect.
    pub async fn update_policy(&self, policy: &Policy) -> Result<()> {
        validate_policy(policy)?;
        if self.store.get_policy(policy.id).await?.is_none() {
            return Err(RetentionError::not_found("policy", policy.id));
        }
        self.store.update_policy(policy).await?;
        self.scheduler.reinstall(policy).await?;
        info!(policy_id = policy.id, "policy updated");
        Ok(())
    }

    /// Remove a policy and its schedule. Past executions, tasks, and
    /// histories stay readable.
    pub async fn delete_policy(&self, id: PolicyId) -> Result<()> {
        if self.store.get_policy(id).await?.is_none() {
            return Err(RetentionError::not_found("policy", id));
        }
        self.scheduler.uninstall(id).await?;
        self.store.delete_policy(id).await?;
        info!(policy_id = id, "policy deleted");
        Ok(())
    }

    pub async fn get_policy(&self, id: PolicyId) -> Result<Policy> {
        self.store
            .get_policy(id)
            .await?
            .ok_or_else(|| RetentionError::not_found("policy", id))
    }

    pub async fn list_policies(&self) -> Result<Vec<Policy>> {
        self.store.list_policies().await
    }

    // ── Executions ──────────────────────────────────────────────────

    /// Start a manual execution; scheduled triggers go through the scheduler.
    pub async fn trigger_execution(&self, policy_id: PolicyId, dry_run: bool) -> Result<Execution> {
        self.orchestrator.start(policy_id, TriggerSource::Manual, dry_run).await
    }

    pub async fn stop_execution(&self, id: ExecutionId) -> Result<Execution> {
        self.orchestrator.stop(id).await
    }

    pub async fn wait_execution(&self, id: ExecutionId) -> Result<Execution> {
        self.orchestrator.wait(id).await
    }

    /// Running executions report the orchestrator's live counters.
    pub async fn get_execution(&self, id: ExecutionId) -> Result<Execution> {
        self.orchestrator.execution(id).await
    }

    pub async fn list_executions(&self, policy_id: PolicyId, query: &Query) -> Result<Vec<Execution>> {
        let rows = self
            .store
            .list_executions(&ExecutionFilter::for_policy(policy_id), query)
            .await?;
        Ok(self.orchestrator.overlay(rows).await)
    }

    pub async fn list_tasks(&self, execution_id: ExecutionId, query: &Query) -> Result<Vec<Task>> {
        self.store.list_tasks(execution_id, query).await
    }

    pub async fn list_histories(&self, execution_id: ExecutionId, query: &Query) -> Result<Vec<History>> {
        self.store.list_histories(execution_id, query).await
    }

    // ── Recovery ────────────────────────────────────────────────────

    /// Startup recovery: fail executions a previous process left in flight,
    /// then reinstall every scheduled trigger.
    pub async fn recover(&self) -> Result<usize> {
        let interrupted = self.orchestrator.reconcile().await?;
        let mut installed = 0;
        for policy in self.store.list_policies().await? {
            if self.scheduler.reinstall(&policy).await?.is_some() {
                installed += 1;
            }
        }
        info!(interrupted, installed, "retention engine recovered");
        Ok(interrupted)
    }
}
