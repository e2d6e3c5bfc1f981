//! Retention rule engine.
//!
//! This crate provides:
//! - Tag and repository selectors (label, regular expression, literal)
//! - Retention templates (`latestPushedK`, `recentXdays`, `nDaysSinceLastPush`, `always`)
//! - Per-rule evaluation and AND/OR verdict combination
//! - Eager policy validation, including cron triggers

pub mod evaluator;
pub mod policy;
pub mod schedule;
pub mod selector;
pub mod templates;

pub use evaluator::{combine, CompiledRule, Decision, RuleVerdict};
pub use policy::{validate_policy, CompiledPolicy};
pub use selector::{CompiledSelector, Decoration, SelectorKind, SelectorTarget};
pub use templates::Template;
