//! Built-in retention templates.
//!
//! Templates: latestPushedK, recentXdays, nDaysSinceLastPush, always.
//! Each template receives the candidates that passed a rule's selectors and
//! returns the subset to retain. Count-based templates walk candidates in
//! [`recency_order`]: push time desc, creation time desc, tag name asc.

mod params;


use std::collections::{BTreeSet, HashSet};
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use retention_core::{Candidate, Parameters, Result, RetentionError};

use self::params::{expect_only, require_count};

/// A parsed template with its typed parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Template {
    /// Keep the `num` most recently pushed tags.
    LatestPushedK { num: usize },
    /// Keep tags pushed on any of the `num` most recent distinct push days.
    RecentXDays { num: usize },
    /// Keep tags pushed within `num` days of the evaluation instant.
    NDaysSinceLastPush { num: usize },
    /// Keep everything the selectors let through.
    Always,
}

pub const LATEST_PUSHED_K: &str = "latestPushedK";
pub const RECENT_X_DAYS: &str = "recentXdays";
pub const N_DAYS_SINCE_LAST_PUSH: &str = "nDaysSinceLastPush";
pub const ALWAYS: &str = "always";

impl Template {
    pub fn parse(name: &str, params: &Parameters) -> Result<Self> {
        match name {
            LATEST_PUSHED_K => {
                expect_only(name, params, &["num"])?;
                Ok(Template::LatestPushedK { num: require_count(name, params, "num")? })
            }
            RECENT_X_DAYS => {
                expect_only(name, params, &["num"])?;
                Ok(Template::RecentXDays { num: require_count(name, params, "num")? })
            }
            N_DAYS_SINCE_LAST_PUSH => {
                expect_only(name, params, &["num"])?;
                Ok(Template::NDaysSinceLastPush { num: require_count(name, params, "num")? })
            }
            ALWAYS => {
                expect_only(name, params, &[])?;
                Ok(Template::Always)
            }
            other => Err(RetentionError::config(format!("unknown template: '{}'", other))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Template::LatestPushedK { .. } => LATEST_PUSHED_K,
            Template::RecentXDays { .. } => RECENT_X_DAYS,
            Template::NDaysSinceLastPush { .. } => N_DAYS_SINCE_LAST_PUSH,
            Template::Always => ALWAYS,
        }
    }

    /// Indices (into `candidates`) from `pool` that this template retains.
    pub fn retained(
        &self,
        pool: &BTreeSet<usize>,
        candidates: &[Candidate],
        now: DateTime<Utc>,
    ) -> BTreeSet<usize> {
        match *self {
            Template::LatestPushedK { num } => recency_order(pool, candidates)
                .into_iter()
                .take(num)
                .collect(),
            Template::RecentXDays { num } => {
                let mut days = HashSet::new();
                let mut kept = BTreeSet::new();
                for idx in recency_order(pool, candidates) {
                    let day = candidates[idx].pushed_at.date_naive();
                    if days.contains(&day) {
                        kept.insert(idx);
                    } else if days.len() < num {
                        days.insert(day);
                        kept.insert(idx);
                    }
                }
                kept
            }
            Template::NDaysSinceLastPush { num } => {
                // A window reaching past the start of time keeps everything.
                let Some(cutoff) = i64::try_from(num)
                    .ok()
                    .and_then(Duration::try_days)
                    .and_then(|window| now.checked_sub_signed(window))
                else {
                    return pool.clone();
                };
                pool.iter()
                    .copied()
                    .filter(|&idx| candidates[idx].pushed_at >= cutoff)
                    .collect()
            }
            Template::Always => pool.clone(),
        }
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Template::LatestPushedK { num }
            | Template::RecentXDays { num }
            | Template::NDaysSinceLastPush { num } => write!(f, "{}(num={})", self.name(), num),
            Template::Always => write!(f, "{}", self.name()),
        }
    }
}

/// Most recent first; equal timestamps fall back to lexical tag order.
pub fn recency_order(pool: &BTreeSet<usize>, candidates: &[Candidate]) -> Vec<usize> {
    let mut ordered: Vec<usize> = pool.iter().copied().collect();
    ordered.sort_by(|&a, &b| {
        let (ca, cb) = (&candidates[a], &candidates[b]);
        cb.pushed_at
            .cmp(&ca.pushed_at)
            .then_with(|| cb.created_at.cmp(&ca.created_at))
            .then_with(|| ca.tag.cmp(&cb.tag))
    });
    ordered
}
