//! Per-rule evaluation.
//!
//! A rule first narrows one repository's candidates with its selectors:
//! the repository must pass every scope selector and a tag must pass every
//! tag selector. The surviving pool is handed to the rule's template, which
//! picks what to retain. Everything else in the pool is marked for deletion.
//! Candidates outside the pool are not covered by the rule at all.

mod composition;

pub use composition::{combine, Decision};

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use retention_core::{Candidate, Result, RetentionError, Rule};

use crate::selector::{compile_all, CompiledSelector, SelectorTarget};
use crate::templates::Template;

/// A validated rule ready to evaluate.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub id: i64,
    pub priority: i32,
    pub template: Template,
    tag_selectors: Vec<CompiledSelector>,
    scope_selectors: Vec<CompiledSelector>,
}

impl CompiledRule {
    pub fn compile(rule: &Rule) -> Result<Self> {
        let context = |e: RetentionError| match e {
            RetentionError::Configuration(msg) => {
                RetentionError::Configuration(format!("rule {}: {}", rule.id, msg))
            }
            other => other,
        };
        Ok(Self {
            id: rule.id,
            priority: rule.priority,
            template: Template::parse(&rule.template, &rule.params).map_err(context)?,
            tag_selectors: compile_all(&rule.tag_selectors, SelectorTarget::Tag).map_err(context)?,
            scope_selectors: compile_all(&rule.scope_selectors, SelectorTarget::Repository)
                .map_err(context)?,
        })
    }

    pub fn applies_to_repository(&self, repository: &str) -> bool {
        self.scope_selectors.iter().all(|s| s.matches_repository(repository))
    }

    fn admits(&self, candidate: &Candidate) -> bool {
        self.tag_selectors.iter().all(|s| s.matches_candidate(candidate))
    }

    /// Evaluate this rule over one repository's candidates.
    pub fn evaluate(
        &self,
        repository: &str,
        candidates: &[Candidate],
        now: DateTime<Utc>,
    ) -> RuleVerdict {
        let matched: BTreeSet<usize> = if self.applies_to_repository(repository) {
            candidates
                .iter()
                .enumerate()
                .filter(|(_, c)| self.admits(c))
                .map(|(i, _)| i)
                .collect()
        } else {
            BTreeSet::new()
        };
        let retained = self.template.retained(&matched, candidates, now);
        RuleVerdict { rule_id: self.id, matched, retained }
    }
}

/// One rule's view of a repository: which candidates it covers and which of
/// those it keeps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleVerdict {
    pub rule_id: i64,
    pub matched: BTreeSet<usize>,
    pub retained: BTreeSet<usize>,
}

impl RuleVerdict {
    pub fn applies(&self, idx: usize) -> bool {
        self.matched.contains(&idx)
    }

    pub fn deletes(&self, idx: usize) -> bool {
        self.matched.contains(&idx) && !self.retained.contains(&idx)
    }

    pub fn delete_set(&self) -> BTreeSet<usize> {
        self.matched.difference(&self.retained).copied().collect()
    }
}
