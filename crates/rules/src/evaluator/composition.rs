//! Verdict combination across a policy's rules.
//!
//! OR deletes a candidate when any covering rule deletes it. AND deletes it
//! only when every covering rule deletes it. A candidate no rule covers is
//! always retained.

use retention_core::{Algorithm, Verdict};

use super::RuleVerdict;

/// Final decision for one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    /// Index into the candidate list that was evaluated.
    pub index: usize,
    pub verdict: Verdict,
    /// Rule credited with the verdict; `None` when no rule covered the candidate.
    pub rule_id: Option<i64>,
}

/// Merge per-rule verdicts (already in ascending priority order) into one
/// decision per candidate, in candidate order.
pub fn combine(algorithm: Algorithm, verdicts: &[RuleVerdict], candidate_count: usize) -> Vec<Decision> {
    (0..candidate_count)
        .map(|idx| decide(algorithm, verdicts, idx))
        .collect()
}

fn decide(algorithm: Algorithm, verdicts: &[RuleVerdict], idx: usize) -> Decision {
    let covering: Vec<&RuleVerdict> = verdicts.iter().filter(|v| v.applies(idx)).collect();

    let Some(first) = covering.first() else {
        return Decision { index: idx, verdict: Verdict::Retained, rule_id: None };
    };

    let first_retaining = covering.iter().find(|v| !v.deletes(idx));
    let first_deleting = covering.iter().find(|v| v.deletes(idx));

    match algorithm {
        Algorithm::Or => match first_deleting {
            Some(v) => Decision { index: idx, verdict: Verdict::Deleted, rule_id: Some(v.rule_id) },
            None => Decision { index: idx, verdict: Verdict::Retained, rule_id: Some(first.rule_id) },
        },
        Algorithm::And => match first_retaining {
            Some(v) => Decision { index: idx, verdict: Verdict::Retained, rule_id: Some(v.rule_id) },
            None => Decision { index: idx, verdict: Verdict::Deleted, rule_id: Some(first.rule_id) },
        },
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;

    fn verdict(rule_id: i64, matched: &[usize], retained: &[usize]) -> RuleVerdict {
        RuleVerdict {
            rule_id,
            matched: matched.iter().copied().collect(),
            retained: retained.iter().copied().collect(),
        }
    }

    fn deleted(decisions: &[Decision]) -> BTreeSet<usize> {
        decisions
            .iter()
            .filter(|d| d.verdict == Verdict::Deleted)
            .map(|d| d.index)
            .collect()
    }

    #[test]
    fn or_deletes_when_any_rule_deletes() {
        let verdicts = vec![verdict(1, &[0, 1, 2], &[0, 1]), verdict(2, &[1, 2, 3], &[2, 3])];
        let decisions = combine(Algorithm::Or, &verdicts, 5);
        assert_eq!(deleted(&decisions), BTreeSet::from([1, 2]));
        // Every candidate a rule deletes is in the final set.
        for v in &verdicts {
            assert!(v.delete_set().is_subset(&deleted(&decisions)));
        }
        assert_eq!(decisions[2].rule_id, Some(1));
        assert_eq!(decisions[1].rule_id, Some(2));
    }

    #[test]
    fn and_retains_when_any_covering_rule_retains() {
        let verdicts = vec![verdict(1, &[0, 1, 2], &[0, 1]), verdict(2, &[1, 2, 3], &[2, 3])];
        let decisions = combine(Algorithm::And, &verdicts, 5);
        assert!(deleted(&decisions).is_empty());
        assert_eq!(decisions[2].rule_id, Some(2));
    }

    #[test]
    fn and_deletes_when_every_covering_rule_deletes() {
        let verdicts = vec![verdict(1, &[0, 1], &[]), verdict(2, &[1, 2], &[2])];
        let decisions = combine(Algorithm::And, &verdicts, 3);
        // 0: only rule 1 covers and deletes. 1: both delete. 2: rule 2 retains.
        assert_eq!(deleted(&decisions), BTreeSet::from([0, 1]));
        assert_eq!(decisions[1].rule_id, Some(1));
    }

    #[test]
    fn uncovered_candidates_are_retained_without_rule() {
        let verdicts = vec![verdict(1, &[0], &[])];
        for algorithm in [Algorithm::And, Algorithm::Or] {
            let decisions = combine(algorithm, &verdicts, 2);
            assert_eq!(decisions[1].verdict, Verdict::Retained);
            assert_eq!(decisions[1].rule_id, None);
        }
    }

    #[test]
    fn no_rules_retains_everything() {
        let decisions = combine(Algorithm::Or, &[], 3);
        assert!(deleted(&decisions).is_empty());
    }
}
