//! Schedule capability: next-fire computation and recurring callbacks.
//!
//! [`CronCapability`] runs one tokio task per installed job. Each task sleeps
//! until the next cron tick, awaits the callback, and repeats until cancelled.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use retention_core::{Result, RetentionError};
use retention_rules::schedule::{next_fire, parse_schedule};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Body of a recurring job.
pub type JobCallback = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

#[async_trait]
pub trait ScheduleCapability: Send + Sync {
    /// First fire time strictly after `after`.
    fn next_fire(&self, expr: &str, after: DateTime<Utc>) -> Result<Option<DateTime<Utc>>>;

    /// Install a recurring callback and return its job id.
    async fn install(&self, expr: &str, callback: JobCallback) -> Result<i64>;

    /// Cancel a job. Unknown ids are ignored.
    async fn cancel(&self, job_id: i64) -> Result<()>;
}

/// Cron-driven jobs on the tokio runtime.
#[derive(Default)]
pub struct CronCapability {
    next_job_id: AtomicI64,
    jobs: Mutex<HashMap<i64, JoinHandle<()>>>,
}

impl CronCapability {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of installed, uncancelled jobs.
    pub fn active_jobs(&self) -> usize {
        self.jobs.lock().map(|jobs| jobs.len()).unwrap_or(0)
    }
}

#[async_trait]
impl ScheduleCapability for CronCapability {
    fn next_fire(&self, expr: &str, after: DateTime<Utc>) -> Result<Option<DateTime<Utc>>> {
        next_fire(expr, after)
    }

    async fn install(&self, expr: &str, callback: JobCallback) -> Result<i64> {
        let schedule = parse_schedule(expr)?;
        let job_id = self.next_job_id.fetch_add(1, Ordering::SeqCst) + 1;
        let expr_owned = expr.to_string();

        let handle = tokio::spawn(async move {
            loop {
                let Some(next) = schedule.upcoming(Utc).next() else {
                    info!(job_id, cron = %expr_owned, "cron schedule exhausted");
                    break;
                };
                let wait = (next - Utc::now()).to_std().unwrap_or_default();
                debug!(job_id, next = %next, "sleeping until next fire");
                tokio::time::sleep(wait).await;
                callback().await;
            }
        });

        let mut jobs = self
            .jobs
            .lock()
            .map_err(|e| RetentionError::Persistence(format!("job table lock poisoned: {}", e)))?;
        jobs.insert(job_id, handle);
        info!(job_id, cron = %expr, "schedule installed");
        Ok(job_id)
    }

    async fn cancel(&self, job_id: i64) -> Result<()> {
        let removed = self
            .jobs
            .lock()
            .map_err(|e| RetentionError::Persistence(format!("job table lock poisoned: {}", e)))?
            .remove(&job_id);
        match removed {
            Some(handle) => {
                handle.abort();
                info!(job_id, "schedule cancelled");
            }
            None => warn!(job_id, "cancel requested for unknown schedule job"),
        }
        Ok(())
    }
}

impl Drop for CronCapability {
    fn drop(&mut self) {
        if let Ok(jobs) = self.jobs.get_mut() {
            for (_, handle) in jobs.drain() {
                handle.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn counting_callback(counter: Arc<AtomicUsize>) -> JobCallback {
        Arc::new(move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
            .boxed()
        })
    }

    #[tokio::test]
    async fn install_rejects_bad_expression() {
        let cap = CronCapability::new();
        let err = cap
            .install("whenever", counting_callback(Arc::new(AtomicUsize::new(0))))
            .await
            .unwrap_err();
        assert!(matches!(err, RetentionError::Configuration(_)));
        assert_eq!(cap.active_jobs(), 0);
    }

    #[tokio::test]
    async fn every_second_job_fires_and_cancel_stops_it() {
        let cap = CronCapability::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let job = cap.install("* * * * * *", counting_callback(counter.clone())).await.unwrap();
        assert_eq!(cap.active_jobs(), 1);

        tokio::time::sleep(Duration::from_millis(2200)).await;
        assert!(counter.load(Ordering::SeqCst) >= 1);

        cap.cancel(job).await.unwrap();
        assert_eq!(cap.active_jobs(), 0);
        let after_cancel = counter.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(1200)).await;
        assert_eq!(counter.load(Ordering::SeqCst), after_cancel);
    }

    #[tokio::test]
    async fn cancel_unknown_job_is_ok() {
        assert!(CronCapability::new().cancel(42).await.is_ok());
    }
}
