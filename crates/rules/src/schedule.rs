//! Cron expression helpers shared by policy validation and the schedule runtime.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use cron::Schedule;
use retention_core::{Result, RetentionError};

/// Normalize a 5-field cron expression to 6-field by prepending "0 " for seconds.
///
/// The `cron` crate requires 6 fields: `sec min hour day-of-month month day-of-week`.
/// Triggers may use standard 5-field cron: `min hour day-of-month month day-of-week`.
pub fn normalize_cron(expr: &str) -> String {
    let trimmed = expr.trim();
    let field_count = trimmed.split_whitespace().count();
    if field_count == 5 {
        format!("0 {}", trimmed)
    } else {
        // Already 6-field or non-standard; pass through as-is.
        trimmed.to_string()
    }
}

/// Parse a trigger's cron expression, mapping failures to a configuration error.
pub fn parse_schedule(expr: &str) -> Result<Schedule> {
    let normalized = normalize_cron(expr);
    Schedule::from_str(&normalized)
        .map_err(|e| RetentionError::config(format!("invalid cron expression '{}': {}", expr, e)))
}

/// First fire time strictly after `after`.
pub fn next_fire(expr: &str, after: DateTime<Utc>) -> Result<Option<DateTime<Utc>>> {
    Ok(parse_schedule(expr)?.after(&after).next())
}
