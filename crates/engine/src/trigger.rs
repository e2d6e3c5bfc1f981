//! Trigger scheduling.
//!
//! A scheduled policy gets one recurring job on the [`ScheduleCapability`]
//! plus a [`ScheduleJob`] row binding the two. Each fire asks the
//! orchestrator for a live (non-dry) run; a fire that lands while the
//! policy already has a run in flight is skipped, never queued.

use std::sync::{Arc, Weak};

use chrono::Utc;
use futures::FutureExt;
use retention_core::{
    Policy, PolicyId, Result, RetentionError, ScheduleJob, TriggerKind, TriggerSource,
};
use tracing::{debug, info, warn};

use crate::orchestrator::Orchestrator;
use crate::schedule::{JobCallback, ScheduleCapability};
use crate::store::Store;

const JOB_STATUS_SCHEDULED: &str = "scheduled";

pub struct TriggerScheduler {
    store: Arc<dyn Store>,
    capability: Arc<dyn ScheduleCapability>,
    orchestrator: Arc<Orchestrator>,
    enabled: bool,
}

impl TriggerScheduler {
    pub fn new(
        store: Arc<dyn Store>,
        capability: Arc<dyn ScheduleCapability>,
        orchestrator: Arc<Orchestrator>,
        enabled: bool,
    ) -> Self {
        Self { store, capability, orchestrator, enabled }
    }

    /// Install the recurring job for a scheduled policy. Manual policies, and
    /// every policy while scheduling is disabled, get no job.
    pub async fn install(&self, policy: &Policy) -> Result<Option<ScheduleJob>> {
        if policy.trigger.kind != TriggerKind::Schedule {
            return Ok(None);
        }
        let cron = policy.trigger.cron().ok_or_else(|| {
            RetentionError::config(format!("policy {} has a schedule trigger without cron", policy.id))
        })?;
        if !self.enabled {
            info!(policy_id = policy.id, cron, "scheduling disabled, trigger not installed");
            return Ok(None);
        }

        let callback = fire_callback(&self.orchestrator, policy.id);
        let job_id = self.capability.install(cron, callback).await?;

        let now = Utc::now();
        let mut job = ScheduleJob {
            id: 0,
            policy_id: policy.id,
            job_id,
            status: JOB_STATUS_SCHEDULED.to_string(),
            create_time: now,
            update_time: now,
        };
        job.id = match self.store.create_schedule_job(&job).await {
            Ok(id) => id,
            Err(e) => {
                self.capability.cancel(job_id).await?;
                return Err(e);
            }
        };

        let next = self.capability.next_fire(cron, now)?;
        info!(
            policy_id = policy.id,
            job_id,
            cron,
            next_fire = ?next,
            "scheduled trigger installed"
        );
        Ok(Some(job))
    }

    /// Cancel the policy's recurring job and remove its binding, if any.
    pub async fn uninstall(&self, policy_id: PolicyId) -> Result<()> {
        let Some(job) = self.store.get_schedule_job_by_policy(policy_id).await? else {
            debug!(policy_id, "no scheduled trigger to uninstall");
            return Ok(());
        };
        self.capability.cancel(job.job_id).await?;
        self.store.delete_schedule_job(job.id).await?;
        info!(policy_id, job_id = job.job_id, "scheduled trigger uninstalled");
        Ok(())
    }

    pub async fn reinstall(&self, policy: &Policy) -> Result<Option<ScheduleJob>> {
        self.uninstall(policy.id).await?;
        self.install(policy).await
    }

    /// Body of a scheduled fire.
    pub async fn fire(&self, policy_id: PolicyId) {
        fire(&self.orchestrator, policy_id).await;
    }
}

/// The callback holds the orchestrator weakly so an installed job never
/// keeps the engine alive on its own.
fn fire_callback(orchestrator: &Arc<Orchestrator>, policy_id: PolicyId) -> JobCallback {
    let orchestrator: Weak<Orchestrator> = Arc::downgrade(orchestrator);
    Arc::new(move || {
        let orchestrator = orchestrator.clone();
        async move {
            match orchestrator.upgrade() {
                Some(orchestrator) => fire(&orchestrator, policy_id).await,
                None => debug!(policy_id, "scheduled fire after engine shutdown ignored"),
            }
        }
        .boxed()
    })
}

async fn fire(orchestrator: &Arc<Orchestrator>, policy_id: PolicyId) {
    match orchestrator.start(policy_id, TriggerSource::Scheduled, false).await {
        Ok(execution) => {
            info!(policy_id, execution_id = execution.id, "scheduled execution started")
        }
        Err(RetentionError::Conflict { execution_id, .. }) => info!(
            policy_id,
            running = execution_id,
            "scheduled fire skipped, execution already in flight"
        ),
        Err(e) => warn!(policy_id, error = %e, "scheduled execution failed to start"),
    }
}
