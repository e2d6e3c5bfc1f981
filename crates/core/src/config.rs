use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_parse<T: std::str::FromStr>(profile: &str, key: &str, default: T) -> T {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_bool(profile: &str, key: &str, default: bool) -> bool {
    match profiled_env_opt(profile, key).as_deref() {
        Some("true") | Some("1") | Some("yes") => true,
        Some("false") | Some("0") | Some("no") => false,
        _ => default,
    }
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    #[serde(default)]
    pub profile: String,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `RETENTION_PROFILE`. When set (e.g. `PROD`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("RETENTION_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            executor: ExecutorConfig::from_env_profiled(p),
            scheduler: SchedulerConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!(
            "  executor:   max_concurrent_tasks={}, task_timeout={}s, retry={}x/{}ms",
            self.executor.max_concurrent_tasks,
            self.executor.task_timeout_secs,
            self.executor.retry_max_attempts,
            self.executor.retry_backoff_ms,
        );
        tracing::info!("  scheduler:  enabled={}", self.scheduler.enabled);
    }
}

// ── Executor ──────────────────────────────────────────────────

/// Bounds on task execution. The concurrency limit is process-wide, shared by
/// every execution, to cap pressure on the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    #[serde(default = "default_max_concurrent_tasks")]
    pub max_concurrent_tasks: usize,
    #[serde(default = "default_task_timeout_secs")]
    pub task_timeout_secs: u64,
    /// Total attempts per task, including the first.
    #[serde(default = "default_retry_max_attempts")]
    pub retry_max_attempts: u32,
    /// Backoff before retry `n` is `n * retry_backoff_ms`.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

fn default_max_concurrent_tasks() -> usize { 8 }
fn default_task_timeout_secs() -> u64 { 600 }
fn default_retry_max_attempts() -> u32 { 3 }
fn default_retry_backoff_ms() -> u64 { 500 }

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: default_max_concurrent_tasks(),
            task_timeout_secs: default_task_timeout_secs(),
            retry_max_attempts: default_retry_max_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

impl ExecutorConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            max_concurrent_tasks: profiled_env_parse(
                p,
                "RETENTION_MAX_CONCURRENT_TASKS",
                default_max_concurrent_tasks(),
            )
            .max(1),
            task_timeout_secs: profiled_env_parse(
                p,
                "RETENTION_TASK_TIMEOUT_SECS",
                default_task_timeout_secs(),
            ),
            retry_max_attempts: profiled_env_parse(
                p,
                "RETENTION_RETRY_MAX_ATTEMPTS",
                default_retry_max_attempts(),
            )
            .max(1),
            retry_backoff_ms: profiled_env_parse(
                p,
                "RETENTION_RETRY_BACKOFF_MS",
                default_retry_backoff_ms(),
            ),
        }
    }

    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.task_timeout_secs)
    }

    /// Delay before the given retry (1-based).
    pub fn backoff_for(&self, retry: u32) -> Duration {
        Duration::from_millis(self.retry_backoff_ms.saturating_mul(retry as u64))
    }
}

// ── Scheduler ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// When false, scheduled triggers are persisted but never installed.
    #[serde(default = "default_schedule_enabled")]
    pub enabled: bool,
}

fn default_schedule_enabled() -> bool { true }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { enabled: default_schedule_enabled() }
    }
}

impl SchedulerConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            enabled: profiled_env_bool(p, "RETENTION_SCHEDULE_ENABLED", default_schedule_enabled()),
        }
    }
}
