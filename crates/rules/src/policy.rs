//! Policy compilation and eager validation.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use retention_core::{
    Algorithm, Candidate, Policy, PolicyId, Result, RetentionError, ScopeLevel, TriggerKind,
};
use tracing::debug;

use crate::evaluator::{combine, CompiledRule, Decision, RuleVerdict};
use crate::schedule::parse_schedule;

/// A policy whose rules have been parsed and validated, ordered by priority.
#[derive(Debug, Clone)]
pub struct CompiledPolicy {
    pub id: PolicyId,
    pub algorithm: Algorithm,
    rules: Vec<CompiledRule>,
}

impl CompiledPolicy {
    pub fn compile(policy: &Policy) -> Result<Self> {
        let mut seen = HashSet::new();
        for rule in &policy.rules {
            if !seen.insert(rule.priority) {
                return Err(RetentionError::config(format!(
                    "duplicate rule priority {} in policy {}",
                    rule.priority, policy.id
                )));
            }
        }

        let rules = policy
            .rules_by_priority()
            .into_iter()
            .map(CompiledRule::compile)
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { id: policy.id, algorithm: policy.algorithm, rules })
    }

    pub fn rules(&self) -> &[CompiledRule] {
        &self.rules
    }

    /// Evaluate every rule in priority order against one repository's
    /// candidates and merge the verdicts. Decisions come back in candidate order.
    pub fn evaluate(
        &self,
        repository: &str,
        candidates: &[Candidate],
        now: DateTime<Utc>,
    ) -> Vec<Decision> {
        let verdicts: Vec<RuleVerdict> = self
            .rules
            .iter()
            .map(|rule| {
                let verdict = rule.evaluate(repository, candidates, now);
                debug!(
                    policy_id = self.id,
                    rule_id = rule.id,
                    template = %rule.template,
                    repository,
                    matched = verdict.matched.len(),
                    retained = verdict.retained.len(),
                    "rule evaluated"
                );
                verdict
            })
            .collect();
        combine(self.algorithm, &verdicts, candidates.len())
    }
}

/// Validate a policy the way create/update does: rules, selectors, templates,
/// scope shape, and the cron expression of a scheduled trigger.
pub fn validate_policy(policy: &Policy) -> Result<()> {
    CompiledPolicy::compile(policy)?;

    if policy.scope.level != ScopeLevel::System && policy.scope.reference <= 0 {
        return Err(RetentionError::config(format!(
            "scope level '{}' requires a positive reference, got {}",
            policy.scope.level, policy.scope.reference
        )));
    }

    if policy.trigger.kind == TriggerKind::Schedule {
        let cron = policy.trigger.cron().ok_or_else(|| {
            RetentionError::config("scheduled trigger requires a 'cron' setting")
        })?;
        parse_schedule(cron)?;
    }

    Ok(())
}
