//! Execution orchestrator.
//!
//! Owns the execution state machine (`Pending → Running → {Success, Failed,
//! Stopped}`), the process-wide task permit pool, and the live cancel flags.
//!
//! While an execution runs, its authoritative counters live in memory under
//! one mutex. Every task completion updates them there first, then writes the
//! snapshot through to the store with bounded retries. A failed write is
//! superseded by the next one; a finalized execution whose last write failed
//! is kept in memory and flushed again on the next start or reconcile.
//! Each task runs in its own supervised tokio task, so a panic is still
//! counted as a failed task.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use retention_core::config::ExecutorConfig;
use retention_core::{
    Execution, ExecutionId, PolicyId, Query, Repository, Result, RetentionError, Status, Task,
    TaskOutcome, TriggerSource,
};
use retention_rules::CompiledPolicy;
use tokio::sync::{watch, Mutex, Semaphore};
use tokio::task::JoinError;
use tracing::{debug, error, info, warn};

use crate::catalog::RegistryCatalog;
use crate::executor::{TaskContext, TaskExecutor, TaskReport};
use crate::scope::ScopeResolver;
use crate::store::{ExecutionFilter, Store};

/// Status text of executions left behind by a previous process.
pub const INTERRUPTED: &str = "interrupted";

/// Status text of a task whose body panicked.
pub const TASK_PANICKED: &str = "task panicked";

/// An execution this process is driving.
struct LiveExecution {
    /// Authoritative copy. The store row may trail it after a failed write.
    execution: Execution,
    cancel: Arc<AtomicBool>,
    done: watch::Sender<bool>,
}

#[derive(Default)]
struct Counters {
    live: HashMap<ExecutionId, LiveExecution>,
    /// Finalized executions whose terminal state has not reached the store.
    unflushed: HashMap<ExecutionId, Execution>,
}

pub struct Orchestrator {
    store: Arc<dyn Store>,
    resolver: ScopeResolver,
    executor: TaskExecutor,
    config: ExecutorConfig,
    permits: Arc<Semaphore>,
    /// Serializes the in-flight check with execution creation.
    start_lock: Mutex<()>,
    counters: Mutex<Counters>,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn Store>,
        catalog: Arc<dyn RegistryCatalog>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            resolver: ScopeResolver::new(catalog.clone()),
            executor: TaskExecutor::new(store.clone(), catalog),
            store,
            permits: Arc::new(Semaphore::new(config.max_concurrent_tasks.max(1))),
            config,
            start_lock: Mutex::new(()),
            counters: Mutex::new(Counters::default()),
        }
    }

    // ── Start ───────────────────────────────────────────────────────

    /// Start an execution of the policy and dispatch one task per resolved
    /// repository. Returns the execution as created; tasks run in the
    /// background.
    pub async fn start(
        self: &Arc<Self>,
        policy_id: PolicyId,
        trigger: TriggerSource,
        dry_run: bool,
    ) -> Result<Execution> {
        let _start = self.start_lock.lock().await;

        let policy = self
            .store
            .get_policy(policy_id)
            .await?
            .ok_or_else(|| RetentionError::not_found("policy", policy_id))?;
        let compiled = Arc::new(CompiledPolicy::compile(&policy)?);

        let unflushed = self.flush_unflushed().await;
        let in_flight = self
            .store
            .list_executions(&ExecutionFilter::in_flight(policy_id), &Query::default())
            .await?;
        if let Some(existing) = in_flight.iter().find(|e| !unflushed.contains_key(&e.id)) {
            return Err(RetentionError::Conflict { policy_id, execution_id: existing.id });
        }

        let repositories = self.resolver.resolve(&policy.scope).await?;

        let now = Utc::now();
        let mut execution =
            Execution::new(policy_id, trigger, dry_run, repositories.len() as u32, now);
        if repositories.is_empty() {
            execution.finalize(now);
        }
        execution.id = self.store.create_execution(&execution).await?;

        info!(
            policy_id,
            execution_id = execution.id,
            trigger = %trigger,
            dry_run,
            total = execution.total,
            "execution created"
        );
        if execution.is_terminal() {
            return Ok(execution);
        }

        let tasks = match self.create_tasks(&execution, repositories).await {
            Ok(tasks) => tasks,
            Err(e) => {
                self.abort_start(&mut execution, &e).await;
                return Err(e);
            }
        };

        execution.status = Status::Running;
        if let Err(e) = self.store.update_execution(&execution).await {
            self.abort_start(&mut execution, &e).await;
            return Err(e);
        }

        info!(execution_id = execution.id, tasks = tasks.len(), "execution running");

        let cancel = Arc::new(AtomicBool::new(false));
        let (done, _) = watch::channel(false);
        self.counters.lock().await.live.insert(
            execution.id,
            LiveExecution { execution: execution.clone(), cancel: cancel.clone(), done },
        );

        for (task, repository) in tasks {
            let this = Arc::clone(self);
            let worker = Arc::clone(self);
            let policy = compiled.clone();
            let cancel = cancel.clone();
            let execution_id = execution.id;
            let fallback = task.clone();
            tokio::spawn(async move {
                let run = tokio::spawn(async move {
                    worker
                        .drive_task(&policy, execution_id, dry_run, task, repository, &cancel)
                        .await
                });
                let outcome = match run.await {
                    Ok(outcome) => outcome,
                    Err(e) => this.fail_crashed_task(fallback, e).await,
                };
                this.record_outcome(execution_id, outcome).await;
            });
        }

        Ok(execution)
    }

    async fn create_tasks(
        &self,
        execution: &Execution,
        repositories: Vec<Repository>,
    ) -> Result<Vec<(Task, Repository)>> {
        let mut tasks = Vec::with_capacity(repositories.len());
        for repository in repositories {
            let mut task = Task::new(execution.id, repository.resource_type, &repository.name);
            task.id = self.store.create_task(&task).await?;
            tasks.push((task, repository));
        }
        Ok(tasks)
    }

    /// Fail an execution whose tasks could not be dispatched.
    async fn abort_start(&self, execution: &mut Execution, cause: &RetentionError) {
        execution.failed += execution.in_progress;
        execution.in_progress = 0;
        execution.finalize(Utc::now());
        execution.status_text = format!("dispatch failed: {}", cause);
        if let Err(e) = self.store.update_execution(execution).await {
            error!(execution_id = execution.id, error = %e, "failed to mark aborted execution");
        }
    }

    // ── Task lifecycle ──────────────────────────────────────────────

    async fn drive_task(
        &self,
        policy: &CompiledPolicy,
        execution_id: ExecutionId,
        dry_run: bool,
        mut task: Task,
        repository: Repository,
        cancel: &AtomicBool,
    ) -> TaskOutcome {
        let _permit = self.permits.clone().acquire_owned().await;

        if cancel.load(Ordering::SeqCst) {
            task.status = Status::Stopped;
            task.status_text = "stopped before start".into();
            task.end_time = Some(Utc::now());
            self.persist_task(&task).await;
            return TaskOutcome::Stopped;
        }

        task.status = Status::Running;
        task.start_time = Some(Utc::now());
        self.persist_task(&task).await;
        debug!(execution_id, task_id = task.id, repository = %repository.name, "task started");

        let mut attempts = 0u32;
        let ctx = TaskContext {
            policy,
            execution_id,
            task_id: task.id,
            dry_run,
            repository: &repository,
            cancel,
        };
        let timeout = self.config.task_timeout();
        let result = tokio::time::timeout(timeout, self.run_with_retry(ctx, &mut attempts)).await;

        let outcome = match result {
            Err(_) => {
                task.status_text = format!("timed out after {}s", timeout.as_secs());
                TaskOutcome::Failed
            }
            Ok(Err(e)) => {
                task.status_text = e.to_string();
                TaskOutcome::Failed
            }
            Ok(Ok(TaskReport::Completed { failed_deletes, deleted, .. })) if failed_deletes > 0 => {
                task.status_text = format!(
                    "{} of {} tag deletion(s) failed",
                    failed_deletes,
                    failed_deletes + deleted
                );
                TaskOutcome::Failed
            }
            Ok(Ok(TaskReport::Completed { .. })) => {
                task.status_text.clear();
                TaskOutcome::Succeeded
            }
            Ok(Ok(TaskReport::Stopped { processed, remaining, failed_deletes }))
                if failed_deletes > 0 =>
            {
                task.status_text = format!(
                    "{} tag deletion(s) failed; stopped after {} of {} candidate(s)",
                    failed_deletes,
                    processed,
                    processed + remaining
                );
                TaskOutcome::Failed
            }
            Ok(Ok(TaskReport::Stopped { processed, remaining, .. })) => {
                task.status_text = format!(
                    "stopped after {} of {} candidate(s)",
                    processed,
                    processed + remaining
                );
                TaskOutcome::Stopped
            }
        };

        task.attempts = attempts;
        task.status = outcome.status();
        task.end_time = Some(Utc::now());
        self.persist_task(&task).await;

        match outcome {
            TaskOutcome::Failed => warn!(
                execution_id,
                task_id = task.id,
                repository = %task.resource,
                attempts,
                reason = %task.status_text,
                "task failed"
            ),
            _ => debug!(execution_id, task_id = task.id, status = %task.status, "task finished"),
        }
        outcome
    }

    async fn run_with_retry(&self, ctx: TaskContext<'_>, attempts: &mut u32) -> Result<TaskReport> {
        loop {
            *attempts += 1;
            match self.executor.run(ctx).await {
                Err(e)
                    if e.is_transient()
                        && *attempts < self.config.retry_max_attempts
                        && !ctx.cancel.load(Ordering::SeqCst) =>
                {
                    let backoff = self.config.backoff_for(*attempts);
                    warn!(
                        task_id = ctx.task_id,
                        repository = %ctx.repository.name,
                        attempt = *attempts,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "transient task failure, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                }
                other => return other,
            }
        }
    }

    async fn persist_task(&self, task: &Task) {
        if let Err(e) = self.store.update_task(task).await {
            error!(task_id = task.id, error = %e, "failed to persist task state");
        }
    }

    /// A task whose body panicked or was aborted before reporting.
    async fn fail_crashed_task(&self, mut task: Task, cause: JoinError) -> TaskOutcome {
        error!(
            execution_id = task.execution_id,
            task_id = task.id,
            repository = %task.resource,
            panicked = cause.is_panic(),
            "task crashed"
        );
        task.status = Status::Failed;
        task.status_text = if cause.is_panic() {
            TASK_PANICKED.to_string()
        } else {
            "task aborted".to_string()
        };
        task.end_time = Some(Utc::now());
        self.persist_task(&task).await;
        TaskOutcome::Failed
    }

    /// Fold one task outcome into the in-memory counters and write the
    /// snapshot through. When it was the last outstanding task, finalize and
    /// release waiters whether or not the write landed.
    async fn record_outcome(&self, execution_id: ExecutionId, outcome: TaskOutcome) {
        let mut counters = self.counters.lock().await;
        let Some(live) = counters.live.get_mut(&execution_id) else {
            error!(execution_id, "task reported for an execution that is not running");
            return;
        };
        let finalized = live.execution.record(outcome, Utc::now());
        let snapshot = live.execution.clone();

        let persisted = self.persist_execution(&snapshot).await;
        if !finalized {
            return;
        }

        if !persisted {
            counters.unflushed.insert(execution_id, snapshot.clone());
        }
        if let Some(live) = counters.live.remove(&execution_id) {
            let _ = live.done.send(true);
        }
        info!(
            execution_id,
            policy_id = snapshot.policy_id,
            status = %snapshot.status,
            succeed = snapshot.succeed,
            failed = snapshot.failed,
            stopped = snapshot.stopped,
            persisted,
            "execution finished"
        );
    }

    /// Write an execution snapshot, retrying with the task backoff.
    async fn persist_execution(&self, execution: &Execution) -> bool {
        let attempts = self.config.retry_max_attempts.max(1);
        for attempt in 1..=attempts {
            match self.store.update_execution(execution).await {
                Ok(()) => return true,
                Err(e) if attempt < attempts => {
                    warn!(execution_id = execution.id, attempt, error = %e, "execution write failed, retrying");
                    tokio::time::sleep(self.config.backoff_for(attempt)).await;
                }
                Err(e) => {
                    error!(execution_id = execution.id, attempts, error = %e, "execution write failed");
                }
            }
        }
        false
    }

    /// Retry writing finalized executions the store missed. Returns the ones
    /// still unwritten.
    async fn flush_unflushed(&self) -> HashMap<ExecutionId, Execution> {
        let mut counters = self.counters.lock().await;
        let pending: Vec<Execution> = counters.unflushed.values().cloned().collect();
        for execution in pending {
            if self.store.update_execution(&execution).await.is_ok() {
                info!(execution_id = execution.id, "finalized execution flushed");
                counters.unflushed.remove(&execution.id);
            }
        }
        counters.unflushed.clone()
    }

    // ── Stop / wait / recovery ──────────────────────────────────────

    /// The current state of an execution: the in-memory copy while this
    /// process drives it (or holds an unwritten final state), else the store row.
    pub async fn execution(&self, execution_id: ExecutionId) -> Result<Execution> {
        {
            let counters = self.counters.lock().await;
            if let Some(live) = counters.live.get(&execution_id) {
                return Ok(live.execution.clone());
            }
            if let Some(execution) = counters.unflushed.get(&execution_id) {
                return Ok(execution.clone());
            }
        }
        self.load(execution_id).await
    }

    /// Replace store rows with the in-memory copies this process holds.
    pub async fn overlay(&self, executions: Vec<Execution>) -> Vec<Execution> {
        let counters = self.counters.lock().await;
        executions
            .into_iter()
            .map(|row| {
                counters
                    .live
                    .get(&row.id)
                    .map(|live| live.execution.clone())
                    .or_else(|| counters.unflushed.get(&row.id).cloned())
                    .unwrap_or(row)
            })
            .collect()
    }

    /// Request cooperative cancellation. Idempotent; terminal executions are
    /// returned unchanged.
    pub async fn stop(&self, execution_id: ExecutionId) -> Result<Execution> {
        // An execution between creation and dispatch is not live yet.
        let _start = self.start_lock.lock().await;
        {
            let counters = self.counters.lock().await;
            if let Some(live) = counters.live.get(&execution_id) {
                live.cancel.store(true, Ordering::SeqCst);
                info!(execution_id, "stop requested");
                return Ok(live.execution.clone());
            }
            if let Some(execution) = counters.unflushed.get(&execution_id) {
                return Ok(execution.clone());
            }
        }

        let execution = self.load(execution_id).await?;
        if execution.is_terminal() {
            debug!(execution_id, status = %execution.status, "stop on terminal execution ignored");
            return Ok(execution);
        }

        // No task of this process will ever report for it.
        self.settle_orphan(execution_id, TaskOutcome::Stopped).await
    }

    /// Resolve once the execution is terminal.
    pub async fn wait(&self, execution_id: ExecutionId) -> Result<Execution> {
        let receiver = self
            .counters
            .lock()
            .await
            .live
            .get(&execution_id)
            .map(|l| l.done.subscribe());
        if let Some(mut receiver) = receiver {
            let _ = receiver.wait_for(|done| *done).await;
        }
        self.execution(execution_id).await
    }

    /// Fail every non-terminal execution this process is not driving. Run
    /// once at startup so a crashed run cannot block its policy forever.
    pub async fn reconcile(&self) -> Result<usize> {
        let _start = self.start_lock.lock().await;
        let unflushed = self.flush_unflushed().await;
        let pending = self
            .store
            .list_executions(&ExecutionFilter::non_terminal(), &Query::default())
            .await?;
        let mut settled = 0;
        for execution in pending {
            let owned = unflushed.contains_key(&execution.id)
                || self.counters.lock().await.live.contains_key(&execution.id);
            if owned {
                continue;
            }
            self.settle_orphan(execution.id, TaskOutcome::Failed).await?;
            settled += 1;
        }
        if settled > 0 {
            warn!(settled, "interrupted executions marked failed");
        }
        Ok(settled)
    }

    async fn settle_orphan(&self, execution_id: ExecutionId, outcome: TaskOutcome) -> Result<Execution> {
        let _counters = self.counters.lock().await;
        let mut execution = self.load(execution_id).await?;
        if execution.is_terminal() {
            return Ok(execution);
        }

        let text = match outcome {
            TaskOutcome::Failed => INTERRUPTED,
            _ => "stopped",
        };
        for mut task in self.store.list_tasks(execution_id, &Query::default()).await? {
            if task.status.is_terminal() {
                continue;
            }
            task.status = outcome.status();
            task.status_text = text.to_string();
            task.end_time = Some(Utc::now());
            self.store.update_task(&task).await?;
        }

        match outcome {
            TaskOutcome::Failed => execution.failed += execution.in_progress,
            _ => execution.stopped += execution.in_progress,
        }
        execution.in_progress = 0;
        execution.finalize(Utc::now());
        if execution.status == Status::Failed {
            execution.status_text = INTERRUPTED.to_string();
        }
        self.store.update_execution(&execution).await?;
        info!(execution_id, status = %execution.status, "orphaned execution settled");
        Ok(execution)
    }

    async fn load(&self, execution_id: ExecutionId) -> Result<Execution> {
        self.store
            .get_execution(execution_id)
            .await?
            .ok_or_else(|| RetentionError::not_found("execution", execution_id))
    }
}
