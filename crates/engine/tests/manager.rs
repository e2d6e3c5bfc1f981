//! Policy lifecycle, schedule bindings, and startup recovery.

mod common;

use chrono::Utc;
use common::*;
use retention_core::{
    Algorithm, Config, Execution, Query, RetentionError, Scope, Selector, Status, Trigger,
    TriggerSource,
};
use retention_engine::{RetentionManager, Store};
use serde_json::json;

#[tokio::test]
async fn policy_round_trips_through_the_store() {
    let h = harness(FaultyCatalog::new(), fast_executor());
    let mut p = policy(
        Scope::project(7),
        Trigger::schedule("0 3 * * *"),
        vec![rule(1, "latestPushedK", Some(5)), rule(2, "nDaysSinceLastPush", Some(30))],
    );
    p.algorithm = Algorithm::And;
    p.rules[0].tag_selectors.push(Selector::new("label", "without", "release"));

    let id = h.manager.create_policy(&p).await.unwrap();
    let stored = h.manager.get_policy(id).await.unwrap();

    assert_eq!(stored.id, id);
    assert_eq!(stored.algorithm, p.algorithm);
    assert_eq!(stored.rules, p.rules);
    assert_eq!(stored.scope, p.scope);
    assert_eq!(stored.trigger, p.trigger);
    assert!(stored.create_time.is_some());
}

#[tokio::test]
async fn invalid_policies_are_rejected_before_persisting() {
    let h = harness(FaultyCatalog::new(), fast_executor());

    let mut bad_template = policy(Scope::system(), Trigger::manual(), vec![rule(1, "keepForever", None)]);
    let mut bad_param = policy(Scope::system(), Trigger::manual(), vec![rule(1, "latestPushedK", None)]);
    bad_param.rules[0].params.insert("num".into(), json!("ten"));
    let bad_cron = policy(Scope::system(), Trigger::schedule("whenever"), vec![rule(1, "always", None)]);
    bad_template.rules[0].tag_selectors = vec![Selector::new("glob", "matches", "*")];

    for p in [bad_template, bad_param, bad_cron] {
        let err = h.manager.create_policy(&p).await.unwrap_err();
        assert!(matches!(err, RetentionError::Configuration(_)), "{err:?}");
    }
    assert!(h.manager.list_policies().await.unwrap().is_empty());
    assert!(h.schedule.jobs().is_empty());
}

#[tokio::test]
async fn scheduled_policy_installs_and_reinstalls_its_job() {
    let h = harness(FaultyCatalog::new(), fast_executor());
    let mut p = policy(Scope::system(), Trigger::schedule("0 3 * * *"), vec![rule(1, "always", None)]);

    let id = h.manager.create_policy(&p).await.unwrap();
    let jobs = h.schedule.jobs();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].1, "0 3 * * *");
    let binding = h.store.get_schedule_job_by_policy(id).await.unwrap().unwrap();
    assert_eq!(binding.job_id, jobs[0].0);

    p.id = id;
    p.trigger = Trigger::schedule("30 1 * * 0");
    h.manager.update_policy(&p).await.unwrap();
    let jobs = h.schedule.jobs();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].1, "30 1 * * 0");
    assert_ne!(jobs[0].0, binding.job_id);

    p.trigger = Trigger::manual();
    h.manager.update_policy(&p).await.unwrap();
    assert!(h.schedule.jobs().is_empty());
    assert!(h.store.get_schedule_job_by_policy(id).await.unwrap().is_none());
}

#[tokio::test]
async fn update_of_missing_policy_is_not_found() {
    let h = harness(FaultyCatalog::new(), fast_executor());
    let mut p = policy(Scope::system(), Trigger::manual(), vec![rule(1, "always", None)]);
    p.id = 41;
    let err = h.manager.update_policy(&p).await.unwrap_err();
    assert!(matches!(err, RetentionError::NotFound { kind: "policy", id: 41 }));
}

#[tokio::test]
async fn scheduled_fire_is_skipped_while_a_run_is_in_flight() {
    let h = harness(FaultyCatalog::gated(), fast_executor());
    h.catalog.inner.add_repository(10, 1, "library/app").await;
    add_daily_tags(&h.catalog.inner, "library/app", 3).await;
    let id = h
        .manager
        .create_policy(&policy(
            Scope::repository(10),
            Trigger::schedule("0 3 * * *"),
            vec![rule(1, "latestPushedK", Some(1))],
        ))
        .await
        .unwrap();

    let manual = h.manager.trigger_execution(id, true).await.unwrap();
    h.catalog.wait_entered(1).await;

    h.schedule.fire_all().await;
    assert_eq!(h.manager.list_executions(id, &Query::default()).await.unwrap().len(), 1);

    h.catalog.open_gate();
    h.manager.wait_execution(manual.id).await.unwrap();

    h.schedule.fire_all().await;
    let executions = h.manager.list_executions(id, &Query::default()).await.unwrap();
    assert_eq!(executions.len(), 2);
    let scheduled = executions.iter().find(|e| e.id != manual.id).unwrap();
    assert_eq!(scheduled.trigger, TriggerSource::Scheduled);
    assert!(!scheduled.dry_run);

    let finished = h.manager.wait_execution(scheduled.id).await.unwrap();
    assert_eq!(finished.status, Status::Success);
    assert_eq!(h.catalog.inner.deleted().await.len(), 2);
}

#[tokio::test]
async fn disabled_scheduling_installs_nothing() {
    let store = std::sync::Arc::new(retention_engine::InMemoryStore::new());
    let schedule = std::sync::Arc::new(ManualSchedule::new());
    let mut config = Config::default();
    config.scheduler.enabled = false;
    let manager = RetentionManager::new(
        store.clone(),
        std::sync::Arc::new(FaultyCatalog::new()),
        schedule.clone(),
        &config,
    );

    let id = manager
        .create_policy(&policy(Scope::system(), Trigger::schedule("0 3 * * *"), vec![rule(1, "always", None)]))
        .await
        .unwrap();
    assert!(schedule.jobs().is_empty());
    assert!(store.get_schedule_job_by_policy(id).await.unwrap().is_none());

    // A direct fire still starts a live run; the system scope here is empty.
    manager.scheduler().fire(id).await;
    let executions = manager.list_executions(id, &Query::default()).await.unwrap();
    assert_eq!(executions.len(), 1);
    assert_eq!(executions[0].trigger, TriggerSource::Scheduled);
    assert_eq!(executions[0].status, Status::Success);
}

#[tokio::test]
async fn deleting_a_policy_keeps_its_executions() {
    let h = harness(FaultyCatalog::new(), fast_executor());
    h.catalog.inner.add_repository(10, 1, "library/app").await;
    add_daily_tags(&h.catalog.inner, "library/app", 3).await;
    let id = h
        .manager
        .create_policy(&policy(
            Scope::repository(10),
            Trigger::schedule("0 3 * * *"),
            vec![rule(1, "latestPushedK", Some(1))],
        ))
        .await
        .unwrap();
    let started = h.manager.trigger_execution(id, true).await.unwrap();
    h.manager.wait_execution(started.id).await.unwrap();

    h.manager.delete_policy(id).await.unwrap();

    assert!(matches!(
        h.manager.get_policy(id).await.unwrap_err(),
        RetentionError::NotFound { kind: "policy", .. }
    ));
    assert!(h.schedule.jobs().is_empty());
    assert_eq!(h.manager.get_execution(started.id).await.unwrap().status, Status::Success);
    assert_eq!(h.manager.list_histories(started.id, &Query::default()).await.unwrap().len(), 3);
    assert!(matches!(
        h.manager.trigger_execution(id, true).await.unwrap_err(),
        RetentionError::NotFound { .. }
    ));
}

async fn orphan(h: &Harness, policy_id: i64, total: u32) -> Execution {
    let mut execution = Execution::new(policy_id, TriggerSource::Manual, false, total, Utc::now());
    execution.status = Status::Running;
    execution.id = h.store.create_execution(&execution).await.unwrap();
    execution
}

#[tokio::test]
async fn recover_fails_orphans_and_unblocks_the_policy() {
    let h = harness(FaultyCatalog::new(), fast_executor());
    h.catalog.inner.add_repository(10, 1, "library/app").await;
    let id = h
        .manager
        .create_policy(&policy(Scope::repository(10), Trigger::schedule("0 3 * * *"), vec![rule(1, "always", None)]))
        .await
        .unwrap();
    let left_behind = orphan(&h, id, 2).await;

    assert!(matches!(
        h.manager.trigger_execution(id, true).await.unwrap_err(),
        RetentionError::Conflict { .. }
    ));

    assert_eq!(h.manager.recover().await.unwrap(), 1);
    let settled = h.manager.get_execution(left_behind.id).await.unwrap();
    assert_eq!(settled.status, Status::Failed);
    assert_eq!(settled.status_text, "interrupted");
    assert_eq!((settled.failed, settled.in_progress), (2, 0));
    assert!(settled.counters_consistent());

    // Schedules come back exactly once.
    assert_eq!(h.schedule.jobs().len(), 1);

    let fresh = h.manager.trigger_execution(id, true).await.unwrap();
    assert_eq!(h.manager.wait_execution(fresh.id).await.unwrap().status, Status::Success);
}

#[tokio::test]
async fn stopping_an_orphan_settles_it_as_stopped() {
    let h = harness(FaultyCatalog::new(), fast_executor());
    let left_behind = orphan(&h, 1, 3).await;

    let stopped = h.manager.stop_execution(left_behind.id).await.unwrap();
    assert_eq!(stopped.status, Status::Stopped);
    assert_eq!(stopped.stopped, 3);
    assert!(stopped.counters_consistent());
    assert!(stopped.end_time.is_some());
}
