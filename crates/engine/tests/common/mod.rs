//! Shared fakes for engine integration tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use retention_core::config::ExecutorConfig;
use retention_core::{
    Algorithm, Candidate, Config, Policy, Repository, Result, RetentionError, Rule, Scope,
    Selector, Trigger,
};
use retention_engine::{
    InMemoryCatalog, InMemoryStore, JobCallback, RegistryCatalog, RetentionManager,
    ScheduleCapability,
};
use serde_json::json;
use tokio::sync::{Notify, Semaphore};

// ── Fault-injecting catalog ─────────────────────────────────────────

/// Wraps [`InMemoryCatalog`] with failure, latency, and gating knobs.
pub struct FaultyCatalog {
    pub inner: InMemoryCatalog,
    transient_list_failures: AtomicU32,
    failing_deletes: Mutex<HashSet<String>>,
    list_delay_ms: AtomicU64,
    gate: Option<Semaphore>,
    entered: AtomicUsize,
    entered_notify: Notify,
    list_calls: AtomicUsize,
    panic_on_list: AtomicBool,
    delete_gate: Option<Semaphore>,
    deletes_entered: AtomicUsize,
    deletes_notify: Notify,
}

impl FaultyCatalog {
    pub fn new() -> Self {
        Self::build(None, None)
    }

    /// Every `list_candidates` call blocks until [`FaultyCatalog::open_gate`].
    pub fn gated() -> Self {
        Self::build(Some(Semaphore::new(0)), None)
    }

    /// Every `delete_tag` call blocks until [`FaultyCatalog::open_delete_gate`].
    pub fn delete_gated() -> Self {
        Self::build(None, Some(Semaphore::new(0)))
    }

    fn build(gate: Option<Semaphore>, delete_gate: Option<Semaphore>) -> Self {
        Self {
            inner: InMemoryCatalog::new(),
            transient_list_failures: AtomicU32::new(0),
            failing_deletes: Mutex::new(HashSet::new()),
            list_delay_ms: AtomicU64::new(0),
            gate,
            entered: AtomicUsize::new(0),
            entered_notify: Notify::new(),
            list_calls: AtomicUsize::new(0),
            panic_on_list: AtomicBool::new(false),
            delete_gate,
            deletes_entered: AtomicUsize::new(0),
            deletes_notify: Notify::new(),
        }
    }

    /// The next `n` listings fail with a transient I/O error.
    pub fn fail_next_listings(&self, n: u32) {
        self.transient_list_failures.store(n, Ordering::SeqCst);
    }

    pub fn fail_delete_of(&self, tag: &str) {
        self.failing_deletes.lock().unwrap().insert(tag.to_string());
    }

    pub fn set_list_delay(&self, delay: Duration) {
        self.list_delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn open_gate(&self) {
        if let Some(gate) = &self.gate {
            gate.add_permits(1);
        }
    }

    /// Wait until `n` listings have started.
    pub async fn wait_entered(&self, n: usize) {
        loop {
            let notified = self.entered_notify.notified();
            if self.entered.load(Ordering::SeqCst) >= n {
                return;
            }
            notified.await;
        }
    }

    /// Every later listing panics.
    pub fn panic_on_list(&self) {
        self.panic_on_list.store(true, Ordering::SeqCst);
    }

    /// Let one gated deletion through.
    pub fn open_delete_gate(&self) {
        if let Some(gate) = &self.delete_gate {
            gate.add_permits(1);
        }
    }

    /// Let every current and future gated deletion through.
    pub fn release_deletes(&self) {
        if let Some(gate) = &self.delete_gate {
            gate.add_permits(Semaphore::MAX_PERMITS / 2);
        }
    }

    /// Wait until `n` deletions have started.
    pub async fn wait_deletes_entered(&self, n: usize) {
        loop {
            let notified = self.deletes_notify.notified();
            if self.deletes_entered.load(Ordering::SeqCst) >= n {
                return;
            }
            notified.await;
        }
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RegistryCatalog for FaultyCatalog {
    async fn project_exists(&self, project_id: i64) -> Result<bool> {
        self.inner.project_exists(project_id).await
    }

    async fn list_repositories(&self, project_id: Option<i64>) -> Result<Vec<Repository>> {
        self.inner.list_repositories(project_id).await
    }

    async fn get_repository(&self, repository_id: i64) -> Result<Option<Repository>> {
        self.inner.get_repository(repository_id).await
    }

    async fn list_candidates(&self, repository: &Repository) -> Result<Vec<Candidate>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.entered.fetch_add(1, Ordering::SeqCst);
        self.entered_notify.notify_waiters();
        if self.panic_on_list.load(Ordering::SeqCst) {
            panic!("catalog listing blew up for {}", repository.name);
        }

        if let Some(gate) = &self.gate {
            let _permit = gate
                .acquire()
                .await
                .map_err(|e| RetentionError::ExternalIo(e.to_string()))?;
        }
        let delay = self.list_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        let remaining = self.transient_list_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.transient_list_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(RetentionError::ExternalIo(format!(
                "registry unreachable while listing {}",
                repository.name
            )));
        }
        self.inner.list_candidates(repository).await
    }

    async fn delete_tag(&self, repository: &Repository, tag: &str) -> Result<()> {
        self.deletes_entered.fetch_add(1, Ordering::SeqCst);
        self.deletes_notify.notify_waiters();
        if let Some(gate) = &self.delete_gate {
            let _permit = gate
                .acquire()
                .await
                .map_err(|e| RetentionError::ExternalIo(e.to_string()))?;
        }
        if self.failing_deletes.lock().unwrap().contains(tag) {
            return Err(RetentionError::ExternalIo(format!(
                "registry refused to delete {}:{}",
                repository.name, tag
            )));
        }
        self.inner.delete_tag(repository, tag).await
    }
}

// ── Manual schedule capability ──────────────────────────────────────

/// Records installed jobs and fires them only when told to.
#[derive(Default)]
pub struct ManualSchedule {
    next_id: AtomicI64,
    jobs: Mutex<BTreeMap<i64, (String, JobCallback)>>,
}

impl ManualSchedule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installed `(job_id, cron)` pairs.
    pub fn jobs(&self) -> Vec<(i64, String)> {
        self.jobs
            .lock()
            .unwrap()
            .iter()
            .map(|(id, (expr, _))| (*id, expr.clone()))
            .collect()
    }

    /// Run every installed callback once, in job id order.
    pub async fn fire_all(&self) {
        let callbacks: Vec<JobCallback> =
            self.jobs.lock().unwrap().values().map(|(_, cb)| cb.clone()).collect();
        for callback in callbacks {
            callback().await;
        }
    }
}

#[async_trait]
impl ScheduleCapability for ManualSchedule {
    fn next_fire(&self, expr: &str, after: DateTime<Utc>) -> Result<Option<DateTime<Utc>>> {
        retention_rules::schedule::next_fire(expr, after)
    }

    async fn install(&self, expr: &str, callback: JobCallback) -> Result<i64> {
        retention_rules::schedule::parse_schedule(expr)?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.jobs.lock().unwrap().insert(id, (expr.to_string(), callback));
        Ok(id)
    }

    async fn cancel(&self, job_id: i64) -> Result<()> {
        self.jobs.lock().unwrap().remove(&job_id);
        Ok(())
    }
}

// ── Fixtures ────────────────────────────────────────────────────────

pub struct Harness {
    pub store: Arc<InMemoryStore>,
    pub catalog: Arc<FaultyCatalog>,
    pub schedule: Arc<ManualSchedule>,
    pub manager: RetentionManager,
}

pub fn fast_executor() -> ExecutorConfig {
    ExecutorConfig {
        max_concurrent_tasks: 4,
        task_timeout_secs: 30,
        retry_max_attempts: 3,
        retry_backoff_ms: 1,
    }
}

pub fn harness(catalog: FaultyCatalog, executor: ExecutorConfig) -> Harness {
    let store = Arc::new(InMemoryStore::new());
    let catalog = Arc::new(catalog);
    let schedule = Arc::new(ManualSchedule::new());
    let config = Config { executor, ..Config::default() };
    let manager = RetentionManager::new(store.clone(), catalog.clone(), schedule.clone(), &config);
    Harness { store, catalog, schedule, manager }
}

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
}

/// Add `count` tags `v0..v{count-1}`, one per day, oldest first.
pub async fn add_daily_tags(catalog: &InMemoryCatalog, repository: &str, count: usize) {
    for i in 0..count {
        catalog
            .add_tag(repository, &format!("v{i}"), base_time() + ChronoDuration::days(i as i64), &[])
            .await;
    }
}

pub fn match_all() -> Vec<Selector> {
    vec![Selector::new("regularExpression", "matches", ".*")]
}

pub fn rule(id: i64, template: &str, num: Option<u64>) -> Rule {
    Rule {
        id,
        priority: id as i32,
        template: template.to_string(),
        params: num.map(|n| ("num".to_string(), json!(n))).into_iter().collect(),
        tag_selectors: match_all(),
        scope_selectors: match_all(),
    }
}

pub fn policy(scope: Scope, trigger: Trigger, rules: Vec<Rule>) -> Policy {
    Policy {
        id: 0,
        algorithm: Algorithm::Or,
        rules,
        trigger,
        scope,
        create_time: None,
        update_time: None,
    }
}
