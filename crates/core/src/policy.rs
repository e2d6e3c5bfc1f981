//! Retention policy configuration.
//!
//! A policy is stored and read as a unit: scope and trigger as columns, the
//! algorithm and rule set as one nested [`PolicyDocument`].

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Time;

pub type PolicyId = i64;

// ── Scope ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeLevel {
    System,
    Project,
    Repository,
}

impl fmt::Display for ScopeLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeLevel::System => write!(f, "system"),
            ScopeLevel::Project => write!(f, "project"),
            ScopeLevel::Repository => write!(f, "repository"),
        }
    }
}

impl FromStr for ScopeLevel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "system" => Ok(ScopeLevel::System),
            "project" => Ok(ScopeLevel::Project),
            "repository" => Ok(ScopeLevel::Repository),
            other => Err(format!("unknown scope level: '{}'", other)),
        }
    }
}

/// What a policy operates on. `reference` is a project id for the project
/// level, a repository id for the repository level, and ignored for system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scope {
    pub level: ScopeLevel,
    #[serde(rename = "ref", default)]
    pub reference: i64,
}

impl Scope {
    pub fn system() -> Self {
        Self { level: ScopeLevel::System, reference: 0 }
    }

    pub fn project(project_id: i64) -> Self {
        Self { level: ScopeLevel::Project, reference: project_id }
    }

    pub fn repository(repository_id: i64) -> Self {
        Self { level: ScopeLevel::Repository, reference: repository_id }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.level {
            ScopeLevel::System => write!(f, "system"),
            level => write!(f, "{} {}", level, self.reference),
        }
    }
}

// ── Trigger ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TriggerKind {
    Manual,
    Schedule,
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerKind::Manual => write!(f, "Manual"),
            TriggerKind::Schedule => write!(f, "Schedule"),
        }
    }
}

impl FromStr for TriggerKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "Manual" => Ok(TriggerKind::Manual),
            "Schedule" => Ok(TriggerKind::Schedule),
            other => Err(format!("unknown trigger kind: '{}'", other)),
        }
    }
}

/// Settings key holding the cron expression of a scheduled trigger.
pub const CRON_SETTING: &str = "cron";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trigger {
    pub kind: TriggerKind,
    #[serde(default)]
    pub settings: BTreeMap<String, serde_json::Value>,
}

impl Trigger {
    pub fn manual() -> Self {
        Self { kind: TriggerKind::Manual, settings: BTreeMap::new() }
    }

    pub fn schedule(cron: &str) -> Self {
        let mut settings = BTreeMap::new();
        settings.insert(CRON_SETTING.to_string(), serde_json::Value::String(cron.to_string()));
        Self { kind: TriggerKind::Schedule, settings }
    }

    /// The cron expression, if the trigger is scheduled and carries one.
    pub fn cron(&self) -> Option<&str> {
        if self.kind != TriggerKind::Schedule {
            return None;
        }
        self.settings.get(CRON_SETTING).and_then(|v| v.as_str())
    }
}

// ── Rules ───────────────────────────────────────────────────────────

/// How per-rule verdicts are merged into one delete-set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Algorithm {
    #[serde(rename = "AND")]
    And,
    #[serde(rename = "OR")]
    Or,
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Algorithm::And => write!(f, "AND"),
            Algorithm::Or => write!(f, "OR"),
        }
    }
}

/// A match predicate as configured. Parsed and validated by the rule engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selector {
    pub kind: String,
    pub decoration: String,
    pub pattern: String,
}

impl Selector {
    pub fn new(kind: &str, decoration: &str, pattern: &str) -> Self {
        Self {
            kind: kind.to_string(),
            decoration: decoration.to_string(),
            pattern: pattern.to_string(),
        }
    }
}

pub type Parameters = BTreeMap<String, serde_json::Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    pub id: i64,
    pub priority: i32,
    pub template: String,
    #[serde(default)]
    pub params: Parameters,
    #[serde(default)]
    pub tag_selectors: Vec<Selector>,
    #[serde(default)]
    pub scope_selectors: Vec<Selector>,
}

/// The nested document persisted alongside a policy row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyDocument {
    pub algorithm: Algorithm,
    pub rules: Vec<Rule>,
}

// ── Policy ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Policy {
    #[serde(default)]
    pub id: PolicyId,
    pub algorithm: Algorithm,
    pub rules: Vec<Rule>,
    pub trigger: Trigger,
    pub scope: Scope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_time: Option<Time>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_time: Option<Time>,
}

impl Policy {
    pub fn document(&self) -> PolicyDocument {
        PolicyDocument {
            algorithm: self.algorithm,
            rules: self.rules.clone(),
        }
    }

    /// Rules in ascending priority order.
    pub fn rules_by_priority(&self) -> Vec<&Rule> {
        let mut rules: Vec<&Rule> = self.rules.iter().collect();
        rules.sort_by_key(|r| r.priority);
        rules
    }
}
