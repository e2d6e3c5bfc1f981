use retention_core::{Parameters, Result, RetentionError};

/// Reject parameters a template does not understand.
pub(super) fn expect_only(template: &str, params: &Parameters, allowed: &[&str]) -> Result<()> {
    match params.keys().find(|k| !allowed.contains(&k.as_str())) {
        Some(unknown) => Err(RetentionError::config(format!(
            "template '{}' does not accept parameter '{}'",
            template, unknown
        ))),
        None => Ok(()),
    }
}

/// Largest accepted count. Keeps day windows inside chrono's range.
pub const MAX_COUNT: u64 = 1_000_000;

/// A required non-negative integer parameter, at most [`MAX_COUNT`].
pub(super) fn require_count(template: &str, params: &Parameters, key: &str) -> Result<usize> {
    let value = params.get(key).ok_or_else(|| {
        RetentionError::config(format!("template '{}' requires parameter '{}'", template, key))
    })?;
    let n = value.as_u64().ok_or_else(|| {
        RetentionError::config(format!(
            "template '{}' parameter '{}' must be a non-negative integer, got {}",
            template, key, value
        ))
    })?;
    if n > MAX_COUNT {
        return Err(RetentionError::config(format!(
            "template '{}' parameter '{}' must be at most {}, got {}",
            template, key, MAX_COUNT, n
        )));
    }
    usize::try_from(n).map_err(|_| {
        RetentionError::config(format!("template '{}' parameter '{}' out of range", template, key))
    })
}
