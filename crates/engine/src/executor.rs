//! Per-repository task body.
//!
//! Lists the repository's tags, evaluates the compiled policy, issues (or,
//! on a dry run, skips) deletions, and writes one history row per decision.
//! A failed delete is recorded against its candidate and processing
//! continues; only a failed scan or a store failure aborts the task.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use retention_core::{ExecutionId, History, Repository, Result, TaskId, Verdict};
use retention_rules::CompiledPolicy;
use tracing::{debug, info, warn};

use crate::catalog::RegistryCatalog;
use crate::store::Store;

/// What one task run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskReport {
    Completed {
        retained: usize,
        deleted: usize,
        failed_deletes: usize,
    },
    /// Cancellation was observed between candidates. `failed_deletes` counts
    /// deletions that failed before the stop.
    Stopped {
        processed: usize,
        remaining: usize,
        failed_deletes: usize,
    },
}

/// Everything a task run needs besides its collaborators.
#[derive(Clone, Copy)]
pub struct TaskContext<'a> {
    pub policy: &'a CompiledPolicy,
    pub execution_id: ExecutionId,
    pub task_id: TaskId,
    pub dry_run: bool,
    pub repository: &'a Repository,
    pub cancel: &'a AtomicBool,
}

pub struct TaskExecutor {
    store: Arc<dyn Store>,
    catalog: Arc<dyn RegistryCatalog>,
}

impl TaskExecutor {
    pub fn new(store: Arc<dyn Store>, catalog: Arc<dyn RegistryCatalog>) -> Self {
        Self { store, catalog }
    }

    pub async fn run(&self, ctx: TaskContext<'_>) -> Result<TaskReport> {
        let repository = ctx.repository;
        let candidates = self.catalog.list_candidates(repository).await?;
        let decisions = ctx.policy.evaluate(&repository.name, &candidates, Utc::now());

        let mut retained = 0usize;
        let mut deleted = 0usize;
        let mut failed_deletes = 0usize;

        for (processed, decision) in decisions.iter().enumerate() {
            if ctx.cancel.load(Ordering::SeqCst) {
                info!(
                    execution_id = ctx.execution_id,
                    task_id = ctx.task_id,
                    repository = %repository.name,
                    processed,
                    failed_deletes,
                    "task observed stop request"
                );
                return Ok(TaskReport::Stopped {
                    processed,
                    remaining: decisions.len() - processed,
                    failed_deletes,
                });
            }

            let candidate = &candidates[decision.index];
            let mut error = None;
            match decision.verdict {
                Verdict::Retained => {
                    retained += 1;
                    debug!(repository = %repository.name, tag = %candidate.tag, "tag retained");
                }
                Verdict::Deleted if ctx.dry_run => deleted += 1,
                Verdict::Deleted => match self.catalog.delete_tag(repository, &candidate.tag).await {
                    Ok(()) => {
                        deleted += 1;
                        debug!(repository = %repository.name, tag = %candidate.tag, "tag deleted");
                    }
                    Err(e) => {
                        failed_deletes += 1;
                        warn!(
                            repository = %repository.name,
                            tag = %candidate.tag,
                            error = %e,
                            "tag deletion failed"
                        );
                        error = Some(e.to_string());
                    }
                },
            }

            self.store
                .append_history(&History {
                    id: 0,
                    execution_id: ctx.execution_id,
                    task_id: ctx.task_id,
                    repository: repository.name.clone(),
                    tag: candidate.tag.clone(),
                    verdict: decision.verdict,
                    rule_id: decision.rule_id,
                    error,
                    create_time: Utc::now(),
                })
                .await?;
        }

        info!(
            execution_id = ctx.execution_id,
            task_id = ctx.task_id,
            repository = %repository.name,
            dry_run = ctx.dry_run,
            retained,
            deleted,
            failed_deletes,
            "task evaluated repository"
        );
        Ok(TaskReport::Completed { retained, deleted, failed_deletes })
    }
}
