//! Retention execution engine.
//!
//! Wires the rule engine to the outside world:
//! - [`store::Store`], [`catalog::RegistryCatalog`], and
//!   [`schedule::ScheduleCapability`] collaborator traits with in-memory and
//!   cron-backed implementations
//! - Scope resolution, bounded-concurrency task dispatch with aggregate
//!   counters, dry runs, cooperative stop
//! - Trigger scheduling with at-most-one execution in flight per policy
//! - [`manager::RetentionManager`], the service object callers use

pub mod catalog;
pub mod executor;
pub mod manager;
pub mod orchestrator;
pub mod schedule;
pub mod scope;
pub mod store;
pub mod trigger;

pub use catalog::{CatalogSnapshot, InMemoryCatalog, RegistryCatalog};
pub use executor::{TaskExecutor, TaskReport};
pub use manager::RetentionManager;
pub use orchestrator::Orchestrator;
pub use schedule::{CronCapability, JobCallback, ScheduleCapability};
pub use scope::ScopeResolver;
pub use store::{ExecutionFilter, InMemoryStore, Store};
pub use trigger::TriggerScheduler;
